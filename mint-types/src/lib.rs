//! # Mint Types
//!
//! Domain types and port traits for the LIGHTCAT mint service.
//! This crate has ZERO external IO dependencies - only data structures,
//! business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Pure domain types (Invoice, Tier, SaleParams, Sats, GameScore)
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Data Transfer Objects for API boundaries
//! - `error/` - Domain and application error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    ApiKey, ApiKeyId, BannedWallet, DeliveryStatus, GameScore, Invoice, InvoiceId, InvoiceStatus,
    LeaderboardPeriod, NewInvoice, Notification, NotificationKind, Quote, SaleParams, SalesStats,
    Sats, Tier, TierPass, TransitionUpdate,
};
pub use dto::*;
pub use error::{AppError, DistributionError, DomainError, GatewayError, RepoError};
pub use ports::{
    Consignment, Distribution, GatewayInvoice, InvoiceRepository, PaymentGateway, PaymentState,
    TokenDistributor,
};
