//! Error types for the mint service.

use crate::domain::InvoiceStatus;

/// Domain-level errors (business rule violations).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Amount overflow")]
    AmountOverflow,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid batch count: {0}")]
    InvalidBatchCount(String),

    #[error("Invalid tier pass: {0}")]
    InvalidTierPass(String),

    #[error("Mint is locked: play the game to unlock a purchase tier")]
    MintLocked,

    #[error("Mint is closed")]
    MintClosed,

    #[error("Wallet {0} is banned from the sale")]
    WalletBanned(String),

    #[error("Insufficient supply: {available} batches available, {requested} requested")]
    InsufficientSupply { available: i64, requested: i64 },

    #[error("Wallet limit exceeded: tier allows {limit} batches, wallet holds {held}, requested {requested}")]
    WalletLimitExceeded {
        limit: i64,
        held: i64,
        requested: i64,
    },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: InvoiceStatus,
        to: InvoiceStatus,
    },
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Errors from the Lightning payment gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway request failed: {0}")]
    Http(String),

    #[error("Gateway rejected request: {0}")]
    Rejected(String),

    #[error("Payment not found at gateway")]
    NotFound,

    #[error("Unexpected gateway response: {0}")]
    InvalidResponse(String),
}

/// Errors from the RGB token distributor.
#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Transfer timed out after {0} seconds")]
    Timeout(u64),

    #[error("Consignment unavailable: {0}")]
    Consignment(String),
}

/// Application-level errors (for HTTP responses).
///
/// Maps cleanly to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    #[error("Bad gateway: {0}")]
    BadGateway(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::MintLocked | DomainError::WalletBanned(_) => {
                AppError::Forbidden(err.to_string())
            }
            DomainError::MintClosed
            | DomainError::InsufficientSupply { .. }
            | DomainError::WalletLimitExceeded { .. }
            | DomainError::InvalidTransition { .. } => AppError::Conflict(err.to_string()),
            DomainError::AmountOverflow => AppError::Internal(err.to_string()),
            DomainError::ValidationError(msg) => AppError::BadRequest(msg),
            e => AppError::BadRequest(e.to_string()),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
            RepoError::Conflict(e) => AppError::Conflict(e),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::BadGateway(err.to_string())
    }
}
