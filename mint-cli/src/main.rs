//! Mint CLI
//!
//! Command-line interface for the LIGHTCAT mint API.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use mint_client::MintClient;
use mint_types::{
    CreateInvoiceRequest, ExportFormat, ExportQuery, InvoiceFilter, InvoiceId, InvoiceStatus,
    LeaderboardPeriod, LeaderboardQuery,
};

#[derive(Parser)]
#[command(name = "mint")]
#[command(author, version, about = "LIGHTCAT mint API CLI client", long_about = None)]
struct Cli {
    /// Base URL of the mint API
    #[arg(long, env = "MINT_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Admin API key
    #[arg(long, env = "MINT_API_KEY")]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a game score and print the tier pass
    Play {
        #[arg(long)]
        score: u32,
        /// Game length in seconds
        #[arg(long, default_value = "30")]
        duration: u32,
        /// Game session id; a random one is used when omitted
        #[arg(long)]
        session: Option<String>,
    },
    /// Show the best scores
    Leaderboard {
        /// daily, weekly or all_time
        #[arg(long, default_value = "daily")]
        period: String,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Price a purchase
    Quote {
        #[arg(long)]
        batches: i64,
    },
    /// Show sale progress
    Stats,
    /// Invoice operations
    Invoice {
        #[command(subcommand)]
        action: InvoiceCommands,
    },
    /// Operator actions (require an API key)
    Admin {
        #[command(subcommand)]
        action: AdminCommands,
    },
    /// API key management
    Key {
        #[command(subcommand)]
        action: KeyCommands,
    },
    /// Buyer notification tools
    Notify {
        #[command(subcommand)]
        action: NotifyCommands,
    },
    /// Bootstrap the first API key
    Bootstrap {
        /// Name for the new API key
        #[arg(long, default_value = "bootstrap-key")]
        name: String,
    },
    /// Check API health
    Health,
}

#[derive(Subcommand)]
enum InvoiceCommands {
    /// Create a purchase invoice
    Create {
        /// Bitcoin address of the buyer
        #[arg(long)]
        wallet: String,
        /// RGB invoice to receive the tokens
        #[arg(long)]
        rgb_invoice: String,
        #[arg(long)]
        batches: i64,
        /// Tier pass from `mint play`
        #[arg(long, env = "MINT_TIER_PASS")]
        tier_pass: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// Get invoice details
    Get {
        /// Invoice ID (UUID)
        id: String,
    },
    /// Ask the server to poll the Lightning gateway now
    Check {
        /// Invoice ID (UUID)
        id: String,
    },
    /// Download the RGB consignment of a delivered invoice
    Consignment {
        /// Invoice ID (UUID)
        id: String,
        /// Output file
        #[arg(long, short)]
        out: PathBuf,
    },
    /// List a wallet's purchases
    Wallet {
        /// Bitcoin address
        address: String,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// List invoices
    List {
        /// pending, paid, delivered, expired, cancelled, distribution_failed, refund_due or refunded
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        wallet: Option<String>,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        offset: Option<i64>,
    },
    /// Retry a failed token distribution
    Retry {
        /// Invoice ID (UUID)
        id: String,
    },
    /// Record a refund
    Refund {
        /// Invoice ID (UUID)
        id: String,
        #[arg(long)]
        reason: String,
    },
    /// Bar a wallet from buying
    Ban {
        /// Bitcoin address
        address: String,
        #[arg(long)]
        reason: String,
    },
    /// Lift a wallet ban
    Unban {
        /// Bitcoin address
        address: String,
    },
    /// List banned wallets
    Bans,
    /// Export purchases as JSON or CSV
    Export {
        /// json or csv
        #[arg(long, default_value = "json")]
        format: String,
        /// Earliest creation time, RFC 3339
        #[arg(long)]
        from: Option<String>,
        /// Latest creation time, RFC 3339
        #[arg(long)]
        to: Option<String>,
        /// Output file; stdout when omitted
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Stop accepting new invoices
    Close,
    /// Accept new invoices again
    Open,
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Create a new API key
    Create {
        /// Name for the new key
        #[arg(long)]
        name: String,
    },
    /// List all API keys
    List,
    /// Delete (deactivate) an API key
    Delete {
        /// API key ID (UUID)
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand)]
enum NotifyCommands {
    /// Run a local relay that prints the notifications the server sends
    Listen {
        /// Port to listen on
        #[arg(long, default_value = "4000")]
        port: u16,
    },
}

fn parse_invoice_id(s: &str) -> Result<InvoiceId> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("Invalid invoice ID: {}", s))
}

fn parse_status(s: &str) -> Result<InvoiceStatus> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("Unknown invoice status: {}", s))
}

fn parse_period(s: &str) -> Result<LeaderboardPeriod> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| anyhow::anyhow!("Unknown leaderboard period: {}", s))
}

fn parse_format(s: &str) -> Result<ExportFormat> {
    serde_json::from_value(serde_json::Value::String(s.to_ascii_lowercase()))
        .map_err(|_| anyhow::anyhow!("Export format must be json or csv, got {}", s))
}

fn parse_time(s: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&chrono::Utc))
        .map_err(|_| anyhow::anyhow!("Invalid RFC 3339 time: {}", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut client = MintClient::new(&cli.api_url);
    if let Some(key) = cli.api_key {
        client = client.with_api_key(key);
    }

    match cli.command {
        Commands::Health => {
            let healthy = client.health().await?;
            if healthy {
                println!("✓ API is healthy");
            } else {
                println!("✗ API is not healthy");
                std::process::exit(1);
            }
        }

        Commands::Play {
            score,
            duration,
            session,
        } => {
            let session = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let pass = client.submit_score(&session, score, duration).await?;
            println!("{}", serde_json::to_string_pretty(&pass)?);
        }

        Commands::Leaderboard { period, limit } => {
            let board = client
                .leaderboard(&LeaderboardQuery {
                    period: Some(parse_period(&period)?),
                    limit,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&board)?);
        }

        Commands::Quote { batches } => {
            let quote = client.quote(batches).await?;
            println!("{}", serde_json::to_string_pretty(&quote)?);
        }

        Commands::Stats => {
            let stats = client.sales_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Commands::Invoice { action } => match action {
            InvoiceCommands::Create {
                wallet,
                rgb_invoice,
                batches,
                tier_pass,
                email,
            } => {
                let invoice = client
                    .create_invoice(&CreateInvoiceRequest {
                        wallet_address: wallet,
                        rgb_invoice,
                        batch_count: batches,
                        tier_pass: Some(tier_pass),
                        email,
                    })
                    .await?;
                println!("{}", serde_json::to_string_pretty(&invoice)?);
            }
            InvoiceCommands::Get { id } => {
                let invoice = client.get_invoice(parse_invoice_id(&id)?).await?;
                println!("{}", serde_json::to_string_pretty(&invoice)?);
            }
            InvoiceCommands::Check { id } => {
                let invoice = client.check_invoice(parse_invoice_id(&id)?).await?;
                println!("{}", serde_json::to_string_pretty(&invoice)?);
            }
            InvoiceCommands::Consignment { id, out } => {
                let bytes = client
                    .download_consignment(parse_invoice_id(&id)?)
                    .await?;
                tokio::fs::write(&out, &bytes).await?;
                println!("✓ Wrote {} bytes to {}", bytes.len(), out.display());
            }
            InvoiceCommands::Wallet { address } => {
                let history = client.wallet_invoices(&address).await?;
                println!("{}", serde_json::to_string_pretty(&history)?);
            }
        },

        Commands::Admin { action } => match action {
            AdminCommands::List {
                status,
                wallet,
                limit,
                offset,
            } => {
                let filter = InvoiceFilter {
                    status: status.as_deref().map(parse_status).transpose()?,
                    wallet,
                    limit,
                    offset,
                };
                let invoices = client.list_invoices(&filter).await?;
                println!("{}", serde_json::to_string_pretty(&invoices)?);
            }
            AdminCommands::Retry { id } => {
                let invoice = client.retry_distribution(parse_invoice_id(&id)?).await?;
                println!("{}", serde_json::to_string_pretty(&invoice)?);
            }
            AdminCommands::Refund { id, reason } => {
                let invoice = client.refund(parse_invoice_id(&id)?, &reason).await?;
                println!("{}", serde_json::to_string_pretty(&invoice)?);
            }
            AdminCommands::Ban { address, reason } => {
                let ban = client.ban_wallet(&address, &reason).await?;
                println!("{}", serde_json::to_string_pretty(&ban)?);
            }
            AdminCommands::Unban { address } => {
                client.unban_wallet(&address).await?;
                println!("✓ Wallet unbanned");
            }
            AdminCommands::Bans => {
                let bans = client.list_banned_wallets().await?;
                println!("{}", serde_json::to_string_pretty(&bans)?);
            }
            AdminCommands::Export {
                format,
                from,
                to,
                out,
            } => {
                let query = ExportQuery {
                    format: Some(parse_format(&format)?),
                    from: from.as_deref().map(parse_time).transpose()?,
                    to: to.as_deref().map(parse_time).transpose()?,
                };
                let bytes = client.export_purchases(&query).await?;
                match out {
                    Some(path) => {
                        tokio::fs::write(&path, &bytes).await?;
                        println!("✓ Wrote {} bytes to {}", bytes.len(), path.display());
                    }
                    None => print!("{}", String::from_utf8_lossy(&bytes)),
                }
            }
            AdminCommands::Close => {
                let state = client.close_mint().await?;
                println!("{}", serde_json::to_string_pretty(&state)?);
            }
            AdminCommands::Open => {
                let state = client.open_mint().await?;
                println!("{}", serde_json::to_string_pretty(&state)?);
            }
        },

        Commands::Key { action } => match action {
            KeyCommands::Create { name } => {
                let api_key = client.create_api_key(&name).await?;
                println!("{}", api_key);
            }
            KeyCommands::List => {
                let keys = client.list_api_keys().await?;
                println!("{}", serde_json::to_string_pretty(&keys)?);
            }
            KeyCommands::Delete { id } => {
                client.delete_api_key(&id).await?;
                println!("✓ API key deleted");
            }
        },

        Commands::Notify { action } => match action {
            NotifyCommands::Listen { port } => {
                let app =
                    axum::Router::new().route("/notify", axum::routing::post(handle_notification));
                let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
                println!("Listening for notifications on http://{}/notify", addr);
                let listener = tokio::net::TcpListener::bind(&addr).await?;
                axum::serve(listener, app).await?;
            }
        },

        Commands::Bootstrap { name } => {
            let api_key = client.bootstrap(&name).await?;
            println!("{}", api_key);
        }
    }

    Ok(())
}

async fn handle_notification(
    headers: axum::http::HeaderMap,
    body: String,
) -> impl axum::response::IntoResponse {
    println!("POST /notify HTTP/1.1");
    for (name, value) in &headers {
        println!("{}: {:?}", name, value);
    }
    println!();
    println!("{}", body);
    println!("----------------------------------------");
    axum::http::StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_period_and_format() {
        assert_eq!(parse_period("all_time").unwrap(), LeaderboardPeriod::AllTime);
        assert!(parse_period("monthly").is_err());
        assert_eq!(parse_format("CSV").unwrap(), ExportFormat::Csv);
        assert!(parse_format("xml").is_err());
    }

    #[test]
    fn test_parse_time_normalizes_to_utc() {
        let t = parse_time("2026-03-01T12:00:00+02:00").unwrap();
        assert_eq!(t.to_rfc3339(), "2026-03-01T10:00:00+00:00");
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn test_cli_parses_admin_export() {
        let cli = Cli::try_parse_from(["mint", "admin", "export", "--format", "csv"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Admin {
                action: AdminCommands::Export { .. }
            }
        ));
    }
}
