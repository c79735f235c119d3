//! HTTP Inbound Adapter
//!
//! Axum-based HTTP server that drives the application layer.

mod auth;
mod extract;
pub(crate) mod handlers;
mod rate_limit;
mod server;

pub use handlers::WEBHOOK_SIGNATURE_HEADER;
pub use server::HttpServer;
