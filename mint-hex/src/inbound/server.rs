//! HTTP Server configuration and startup.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

use mint_types::InvoiceRepository;

use super::auth::auth_middleware;
use super::handlers::{self, AppState};
use super::rate_limit::{RateLimiterState, rate_limit_middleware};
use crate::MintService;

/// HTTP Server for the mint API.
pub struct HttpServer<R: InvoiceRepository> {
    state: Arc<AppState<R>>,
    rate_limiter: Arc<RateLimiterState>,
}

impl<R: InvoiceRepository> HttpServer<R> {
    /// Creates a new HTTP server with the given service.
    ///
    /// The service is shared with the background payment watcher.
    pub fn new(service: Arc<MintService<R>>) -> Self {
        Self {
            state: Arc::new(AppState { service }),
            rate_limiter: Arc::new(RateLimiterState::default()), // 100 req/min default
        }
    }

    /// Creates a new HTTP server with custom rate limiting.
    pub fn with_rate_limit(service: Arc<MintService<R>>, requests_per_minute: u32) -> Self {
        Self {
            state: Arc::new(AppState { service }),
            rate_limiter: Arc::new(RateLimiterState::new(
                requests_per_minute,
                Duration::from_secs(60),
            )),
        }
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        // Build HTTP metrics layer (uses globally set MeterProvider)
        let metrics = axum_otel_metrics::HttpMetricsLayerBuilder::new().build();

        Router::new()
            .route("/health", get(handlers::health))
            .route("/api-docs/openapi.json", get(handlers::openapi_json))
            // Game and sale
            .route("/api/game/score", post(handlers::submit_score::<R>))
            .route("/api/game/leaderboard", get(handlers::leaderboard::<R>))
            .route("/api/sale/quote", get(handlers::quote::<R>))
            .route("/api/sale/stats", get(handlers::sales_stats::<R>))
            // Invoices
            .route("/api/invoices", post(handlers::create_invoice::<R>))
            .route("/api/invoices/{id}", get(handlers::get_invoice::<R>))
            .route("/api/invoices/{id}/check", post(handlers::check_invoice::<R>))
            .route(
                "/api/invoices/{id}/consignment",
                get(handlers::download_consignment::<R>),
            )
            .route(
                "/api/wallets/{address}/invoices",
                get(handlers::wallet_invoices::<R>),
            )
            .route("/webhooks/lightning", post(handlers::lightning_webhook::<R>))
            // Keys
            .route("/api/bootstrap", post(handlers::bootstrap::<R>))
            .route(
                "/api/keys",
                post(handlers::create_api_key::<R>).get(handlers::list_api_keys::<R>),
            )
            .route("/api/keys/{id}", delete(handlers::delete_api_key::<R>))
            // Admin
            .route(
                "/api/admin/invoices",
                get(handlers::admin_list_invoices::<R>),
            )
            .route(
                "/api/admin/invoices/{id}/retry",
                post(handlers::admin_retry_distribution::<R>),
            )
            .route(
                "/api/admin/invoices/{id}/refund",
                post(handlers::admin_refund::<R>),
            )
            .route(
                "/api/admin/wallets/banned",
                get(handlers::admin_list_banned_wallets::<R>),
            )
            .route(
                "/api/admin/wallets/{address}/ban",
                post(handlers::admin_ban_wallet::<R>).delete(handlers::admin_unban_wallet::<R>),
            )
            .route(
                "/api/admin/export/purchases",
                get(handlers::admin_export_purchases::<R>),
            )
            .route("/api/admin/mint/close", post(handlers::admin_close_mint::<R>))
            .route("/api/admin/mint/open", post(handlers::admin_open_mint::<R>))
            .layer(metrics)
            .layer(middleware::from_fn_with_state(
                self.rate_limiter.clone(),
                rate_limit_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                auth_middleware::<R>,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Runs the server on the given address with graceful shutdown.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
