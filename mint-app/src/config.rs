//! Configuration loading from environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use mint_repo::notifications::DEFAULT_RETRY_BACKOFF;
use mint_types::domain::DEFAULT_SCORES_PER_HOUR;
use mint_types::domain::sale::{INVOICE_EXPIRY_MINUTES, SATS_PER_BATCH};

/// Which RGB distributor to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RgbMode {
    /// Deterministic fake consignments
    Mock,
    /// Shell out to the `rgb` wallet CLI
    Cli,
}

impl FromStr for RgbMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Ok(RgbMode::Mock),
            "cli" => Ok(RgbMode::Cli),
            other => anyhow::bail!("RGB_MODE must be `mock` or `cli`, got `{}`", other),
        }
    }
}

/// LND REST connection settings.
pub struct LndConfig {
    pub rest_url: String,
    pub macaroon_hex: String,
}

/// `rgb` CLI settings, required when `RGB_MODE=cli`.
pub struct RgbConfig {
    pub mode: RgbMode,
    pub binary: PathBuf,
    pub network: String,
    pub wallet: String,
    pub contract_id: String,
    pub data_dir: PathBuf,
}

/// Application configuration.
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub rate_limit_per_minute: u32,
    /// None means a random secret is generated at startup
    pub tier_pass_secret: Option<String>,
    pub webhook_secret: Option<String>,
    /// None selects the in-memory mock gateway
    pub lnd: Option<LndConfig>,
    pub mock_settle_after: Option<Duration>,
    pub rgb: RgbConfig,
    pub notify_relay_url: Option<String>,
    pub notify_secret: Option<String>,
    pub payment_poll_interval: Duration,
    pub notify_poll_interval: Duration,
    /// Base delay before a failed notification is retried
    pub notify_retry_backoff: Duration,
    pub invoice_expiry_minutes: i64,
    pub sats_per_batch: i64,
    pub distribution_grace_minutes: i64,
    pub scores_per_hour: i64,
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(key) {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, v)),
        None => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let port = parsed("PORT", 3000u16)?;

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let lnd = match optional("LND_REST_URL") {
            Some(rest_url) => Some(LndConfig {
                rest_url,
                macaroon_hex: optional("LND_MACAROON").ok_or_else(|| {
                    anyhow::anyhow!("LND_MACAROON is required when LND_REST_URL is set")
                })?,
            }),
            None => None,
        };

        let mock_settle_after = match optional("MOCK_SETTLE_AFTER_SECS") {
            Some(_) => Some(Duration::from_secs(parsed("MOCK_SETTLE_AFTER_SECS", 0u64)?)),
            None => None,
        };

        let mode = match optional("RGB_MODE") {
            Some(v) => v.parse()?,
            None => RgbMode::Mock,
        };
        let rgb = RgbConfig {
            mode,
            binary: optional("RGB_BINARY")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("rgb")),
            network: optional("RGB_NETWORK").unwrap_or_else(|| "regtest".to_string()),
            wallet: optional("RGB_WALLET").unwrap_or_default(),
            contract_id: optional("RGB_CONTRACT_ID").unwrap_or_default(),
            data_dir: optional("RGB_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/rgb")),
        };
        if rgb.mode == RgbMode::Cli && (rgb.wallet.is_empty() || rgb.contract_id.is_empty()) {
            anyhow::bail!("RGB_WALLET and RGB_CONTRACT_ID are required when RGB_MODE=cli");
        }

        let invoice_expiry_minutes = parsed("INVOICE_EXPIRY_MINUTES", INVOICE_EXPIRY_MINUTES)?;
        if invoice_expiry_minutes <= 0 {
            anyhow::bail!("INVOICE_EXPIRY_MINUTES must be positive");
        }
        let sats_per_batch = parsed("SATS_PER_BATCH", SATS_PER_BATCH)?;
        if sats_per_batch <= 0 {
            anyhow::bail!("SATS_PER_BATCH must be positive");
        }

        let distribution_grace_minutes = parsed("DISTRIBUTION_GRACE_MINUTES", 10i64)?;
        if distribution_grace_minutes <= 0 {
            anyhow::bail!("DISTRIBUTION_GRACE_MINUTES must be positive");
        }
        let scores_per_hour = parsed("SCORES_PER_HOUR", DEFAULT_SCORES_PER_HOUR)?;
        if scores_per_hour <= 0 {
            anyhow::bail!("SCORES_PER_HOUR must be positive");
        }

        Ok(Self {
            port,
            database_url,
            rate_limit_per_minute: parsed("RATE_LIMIT_PER_MINUTE", 100u32)?,
            tier_pass_secret: optional("TIER_PASS_SECRET"),
            webhook_secret: optional("LIGHTNING_WEBHOOK_SECRET"),
            lnd,
            mock_settle_after,
            rgb,
            notify_relay_url: optional("NOTIFY_RELAY_URL"),
            notify_secret: optional("NOTIFY_SECRET"),
            payment_poll_interval: Duration::from_millis(parsed(
                "PAYMENT_POLL_INTERVAL_MS",
                3_000u64,
            )?),
            notify_poll_interval: Duration::from_millis(parsed(
                "NOTIFY_POLL_INTERVAL_MS",
                1_000u64,
            )?),
            notify_retry_backoff: Duration::from_millis(parsed(
                "NOTIFY_RETRY_BACKOFF_MS",
                DEFAULT_RETRY_BACKOFF.as_millis() as u64,
            )?),
            invoice_expiry_minutes,
            sats_per_batch,
            distribution_grace_minutes,
            scores_per_hour,
        })
    }
}
