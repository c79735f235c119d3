//! RGB token distribution port.

use crate::domain::InvoiceId;
use crate::error::DistributionError;

/// A transfer to perform for a paid invoice.
#[derive(Debug, Clone)]
pub struct Distribution {
    pub invoice_id: InvoiceId,
    pub rgb_invoice: String,
    pub token_amount: i64,
}

/// The result of a successful transfer.
#[derive(Debug, Clone)]
pub struct Consignment {
    pub transfer_id: String,
    /// Raw consignment file the buyer imports into their wallet
    pub bytes: Vec<u8>,
}

#[async_trait::async_trait]
pub trait TokenDistributor: Send + Sync + 'static {
    async fn distribute(&self, distribution: Distribution) -> Result<Consignment, DistributionError>;
}
