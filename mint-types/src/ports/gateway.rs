//! Lightning payment gateway port.

use crate::domain::Sats;
use crate::error::GatewayError;

/// An invoice issued by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayInvoice {
    /// BOLT11 payment request
    pub payment_request: String,
    /// Hex encoded payment hash
    pub payment_hash: String,
}

/// Payment state as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentState {
    Open,
    Settled { amount_paid_sats: i64 },
    Cancelled,
}

#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    async fn create_invoice(
        &self,
        amount: Sats,
        memo: &str,
        expiry_secs: i64,
    ) -> Result<GatewayInvoice, GatewayError>;

    async fn lookup(&self, payment_hash: &str) -> Result<PaymentState, GatewayError>;
}
