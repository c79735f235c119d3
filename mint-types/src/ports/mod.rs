//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The application layer depends on these traits, not concrete implementations.

mod distributor;
mod gateway;
mod repository;

pub use distributor::{Consignment, Distribution, TokenDistributor};
pub use gateway::{GatewayInvoice, PaymentGateway, PaymentState};
pub use repository::InvoiceRepository;
