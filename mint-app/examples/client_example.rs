//! Client example walking through a full token purchase against a local server.
//!
//! Run with: cargo run -p mint-app --example client_example --no-default-features --features sqlite

use std::net::SocketAddr;
use std::sync::Arc;

use mint_client::MintClient;
use mint_hex::outbound::{MockDistributor, MockGateway};
use mint_hex::{MintConfig, MintService, inbound::HttpServer};
use mint_repo::build_repo;
use mint_types::{CreateInvoiceRequest, InvoiceFilter, InvoiceStatus};
use tempfile::tempdir;
use tokio::net::TcpListener;

const WALLET: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";
const RGB_INVOICE: &str = "rgb:2bFVTT$W-utxob:egXsFnw-5Eud7WKYn-7DVQvcPbc-rR69YmgmG-veacwmUFo";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt().with_env_filter("info").init();

    // Bind to any free port and hand the listener to the server
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr: SocketAddr = listener.local_addr()?;

    // Use a temp file-backed SQLite DB
    let tmp = tempdir()?;
    let db_path = tmp.path().join("mint.db");
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());

    println!("🚀 Starting server on {addr}...");
    println!("   Database: {db_url}");

    // Build repository (handles connection and migration)
    let repo = build_repo(&db_url).await?;

    // Keep a handle on the mock gateway so the demo can "pay" invoices
    let gateway = Arc::new(MockGateway::new());
    let service = Arc::new(MintService::new(
        repo,
        gateway.clone(),
        Arc::new(MockDistributor::new()),
        MintConfig::default(),
    ));
    let router = HttpServer::new(service).router();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router.into_make_service()).await {
            eprintln!("server error: {e}");
        }
    });

    let client = MintClient::new(format!("http://{addr}"));

    // ─────────────────────────────────────────────────────────────────────────
    // Demo: Full purchase flow
    // ─────────────────────────────────────────────────────────────────────────

    let health = client.health().await?;
    println!("✅ Server health: {health}");

    let stats = client.sales_stats().await?;
    println!(
        "✅ Sale open: {} of {} batches remaining",
        stats.batches_remaining, stats.total_batches
    );

    // Without a tier pass the mint stays locked
    let locked = client
        .create_invoice(&CreateInvoiceRequest {
            wallet_address: WALLET.to_string(),
            rgb_invoice: RGB_INVOICE.to_string(),
            batch_count: 1,
            tier_pass: None,
            email: None,
        })
        .await;
    assert!(locked.is_err());
    println!("✅ Locked without a tier pass: {}", locked.unwrap_err());

    // Play the game
    let pass = client
        .submit_score(&uuid::Uuid::new_v4().to_string(), 21, 30)
        .await?;
    println!(
        "✅ Earned {:?} tier, up to {} batches",
        pass.tier, pass.max_batches
    );

    let quote = client.quote(3).await?;
    println!(
        "✅ Quote: {} batches = {} sats ({} BTC)",
        quote.batch_count, quote.total_sats, quote.btc
    );

    // Create the invoice
    let invoice = client
        .create_invoice(&CreateInvoiceRequest {
            wallet_address: WALLET.to_string(),
            rgb_invoice: RGB_INVOICE.to_string(),
            batch_count: 3,
            tier_pass: Some(pass.tier_pass.clone()),
            email: None,
        })
        .await?;
    println!(
        "✅ Invoice {} for {} sats, pay: {}",
        invoice.reference, invoice.amount_sats, invoice.payment_request
    );

    // Settle it on the mock Lightning node, then have the server poll
    gateway.settle(&invoice.payment_hash);
    let invoice = client.check_invoice(invoice.id).await?;
    assert_eq!(invoice.status, InvoiceStatus::Delivered);
    println!(
        "✅ Paid and delivered {} tokens (transfer {})",
        invoice.token_amount,
        invoice.transfer_id.as_deref().unwrap_or("-")
    );

    let consignment = client.download_consignment(invoice.id).await?;
    println!("✅ Consignment: {} bytes", consignment.len());

    let history = client.wallet_invoices(WALLET).await?;
    println!(
        "✅ Wallet history: {} invoices, {} tokens delivered",
        history.invoices.len(),
        history.tokens_delivered
    );

    // ─────────────────────────────────────────────────────────────────────────
    // Demo: Operator view
    // ─────────────────────────────────────────────────────────────────────────

    let key = client.bootstrap("demo").await?;
    println!("✅ Bootstrap key generated");
    let admin = client.with_api_key(key);

    let delivered = admin
        .list_invoices(&InvoiceFilter {
            status: Some(InvoiceStatus::Delivered),
            ..Default::default()
        })
        .await?;
    println!("✅ Delivered invoices: {}", delivered.len());

    let stats = admin.sales_stats().await?;
    println!(
        "✅ Sold {} batches to {} buyers ({:.4}%)",
        stats.batches_sold, stats.unique_buyers, stats.percent_sold
    );

    println!("\n🎉 Demo complete!");
    Ok(())
}
