//! # Mint Hex
//!
//! Application service layer and adapters for the LIGHTCAT mint service.
//!
//! ## Architecture
//!
//! - `service/` - Application service (orchestrates the purchase lifecycle)
//! - `inbound/` - HTTP adapter (Axum server)
//! - `outbound/` - Lightning gateway and RGB distributor adapters
//! - `watcher/` - Background payment reconciliation
//!
//! The service is generic over `R: InvoiceRepository`, allowing
//! different repository implementations to be injected.

pub mod inbound;
pub mod openapi;
pub mod outbound;
pub mod service;
pub mod watcher;


pub use service::{MintConfig, MintService};
pub use watcher::PaymentWatcher;
