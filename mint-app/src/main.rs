//! # Mint Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the repository adapter
//! - Pick the Lightning gateway and RGB distributor
//! - Start the payment watcher and notification worker
//! - Start the HTTP server

mod config;

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::global;
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace as sdktrace};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use mint_hex::outbound::{LndGateway, MockDistributor, MockGateway, RgbCliConfig, RgbCliDistributor};
use mint_hex::{MintConfig, MintService, PaymentWatcher, inbound::HttpServer};
use mint_repo::build_repo;
use mint_repo::notifications::NotificationWorker;
use mint_types::{PaymentGateway, SaleParams, Sats, TokenDistributor};

use config::{Config, RgbMode};

const LND_TIMEOUT: Duration = Duration::from_secs(30);
const RGB_TRANSFER_TIMEOUT: Duration = Duration::from_secs(120);

fn init_tracer() -> anyhow::Result<(sdktrace::Tracer, sdktrace::SdkTracerProvider)> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    // Use gRPC exporter with batch processing (non-blocking)
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()?;

    let provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();

    global::set_tracer_provider(provider.clone());

    use opentelemetry::trace::TracerProvider as _;
    Ok((provider.tracer("mint-service"), provider))
}

fn build_gateway(config: &Config) -> anyhow::Result<Arc<dyn PaymentGateway>> {
    match &config.lnd {
        Some(lnd) => {
            tracing::info!("Using LND gateway at {}", lnd.rest_url);
            Ok(Arc::new(LndGateway::new(
                &lnd.rest_url,
                &lnd.macaroon_hex,
                LND_TIMEOUT,
            )?))
        }
        None => {
            tracing::warn!("LND_REST_URL not set, using the mock Lightning gateway");
            Ok(match config.mock_settle_after {
                Some(delay) => Arc::new(MockGateway::settling_after(delay)),
                None => Arc::new(MockGateway::new()),
            })
        }
    }
}

fn build_distributor(config: &Config) -> Arc<dyn TokenDistributor> {
    match config.rgb.mode {
        RgbMode::Cli => {
            tracing::info!(network = %config.rgb.network, "Using rgb CLI distributor");
            Arc::new(RgbCliDistributor::new(RgbCliConfig {
                binary: config.rgb.binary.clone(),
                network: config.rgb.network.clone(),
                wallet: config.rgb.wallet.clone(),
                contract_id: config.rgb.contract_id.clone(),
                data_dir: config.rgb.data_dir.clone(),
                timeout: RGB_TRANSFER_TIMEOUT,
            }))
        }
        RgbMode::Mock => {
            tracing::warn!("RGB_MODE=mock, consignments are not real transfers");
            Arc::new(MockDistributor::new())
        }
    }
}

fn build_mint_config(config: &Config) -> anyhow::Result<MintConfig> {
    let tier_pass_secret = match &config.tier_pass_secret {
        Some(secret) => secret.clone(),
        None => {
            tracing::warn!("TIER_PASS_SECRET not set, tier passes will not survive a restart");
            mint_repo::security::generate_api_key()
        }
    };

    Ok(MintConfig {
        sale: SaleParams {
            sats_per_batch: Sats::new(config.sats_per_batch)?,
            invoice_expiry: chrono::Duration::minutes(config.invoice_expiry_minutes),
            ..SaleParams::default()
        },
        tier_pass_secret,
        webhook_secret: config.webhook_secret.clone(),
        distribution_grace: chrono::Duration::minutes(config.distribution_grace_minutes),
        score_submissions_per_hour: config.scores_per_hour,
        ..MintConfig::default()
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // OpenTelemetry export only when a collector is configured
    let (telemetry, otel_provider) = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let (tracer, provider) = init_tracer()?;
        (
            Some(tracing_opentelemetry::layer().with_tracer(tracer)),
            Some(provider),
        )
    } else {
        (None, None)
    };

    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mint_app=debug,mint_hex=debug".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .with(telemetry)
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting mint server on port {}", config.port);
    tracing::info!("Using database: {}", config.database_url);

    // Build repository (handles connection and migration)
    let repo = build_repo(&config.database_url).await?;

    let service = Arc::new(MintService::new(
        repo.clone(),
        build_gateway(&config)?,
        build_distributor(&config),
        build_mint_config(&config)?,
    ));

    // Background loops
    tokio::spawn(PaymentWatcher::new(service.clone(), config.payment_poll_interval).run());
    if config.notify_relay_url.is_none() {
        tracing::warn!("NOTIFY_RELAY_URL not set, notifications are logged and dropped");
    }
    tokio::spawn(
        NotificationWorker::new(
            repo,
            config.notify_relay_url.clone(),
            config.notify_secret.clone(),
        )
        .with_poll_interval(config.notify_poll_interval)
        .with_retry_backoff(config.notify_retry_backoff)
        .run(),
    );

    // Create and run the HTTP server
    let server = HttpServer::with_rate_limit(service, config.rate_limit_per_minute);
    let addr = format!("0.0.0.0:{}", config.port);

    server.run(&addr).await?;

    // Ensure traces are flushed before exit
    if let Some(provider) = otel_provider {
        let _ = provider.shutdown();
    }
    Ok(())
}
