//! Token sale parameters, pricing and statistics.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::sats::Sats;
use crate::error::DomainError;

/// Total LIGHTCAT supply.
pub const TOTAL_TOKEN_SUPPLY: i64 = 21_000_000;
/// Tokens delivered per purchased batch.
pub const TOKENS_PER_BATCH: i64 = 700;
/// Batches offered in the public sale (93% of supply / 700).
pub const TOTAL_BATCHES_FOR_SALE: i64 = 27_900;
/// Default price of one batch.
pub const SATS_PER_BATCH: i64 = 2_000;
/// Default lifetime of an unpaid invoice.
pub const INVOICE_EXPIRY_MINUTES: i64 = 15;
/// Smallest purchase.
pub const MIN_BATCH_PURCHASE: i64 = 1;

/// Sale parameters. Defaults match the published tokenomics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaleParams {
    pub total_batches: i64,
    pub tokens_per_batch: i64,
    pub sats_per_batch: Sats,
    pub invoice_expiry: Duration,
}

impl Default for SaleParams {
    fn default() -> Self {
        Self {
            total_batches: TOTAL_BATCHES_FOR_SALE,
            tokens_per_batch: TOKENS_PER_BATCH,
            sats_per_batch: Sats::new(SATS_PER_BATCH).unwrap_or(Sats::zero()),
            invoice_expiry: Duration::minutes(INVOICE_EXPIRY_MINUTES),
        }
    }
}

impl SaleParams {
    /// Batches still available given how many are sold or reserved.
    pub fn remaining_batches(&self, taken: i64) -> i64 {
        (self.total_batches - taken).max(0)
    }

    /// Prices a purchase of `batch_count` batches.
    pub fn quote(&self, batch_count: i64) -> Result<Quote, DomainError> {
        Quote::for_batches(batch_count, self)
    }

    pub fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.invoice_expiry
    }
}

/// Price of a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub batch_count: i64,
    pub total_sats: Sats,
    pub total_tokens: i64,
}

impl Quote {
    pub fn for_batches(batch_count: i64, params: &SaleParams) -> Result<Quote, DomainError> {
        if batch_count < MIN_BATCH_PURCHASE {
            return Err(DomainError::InvalidBatchCount(format!(
                "Minimum {} batch required",
                MIN_BATCH_PURCHASE
            )));
        }

        let total_sats = params.sats_per_batch.checked_mul(batch_count)?;
        let total_tokens = params
            .tokens_per_batch
            .checked_mul(batch_count)
            .ok_or(DomainError::AmountOverflow)?;

        Ok(Quote {
            batch_count,
            total_sats,
            total_tokens,
        })
    }

    /// Lightning memo shown in the buyer's wallet.
    pub fn memo(&self) -> String {
        format!(
            "LIGHTCAT Purchase - {} batch{} ({} tokens)",
            self.batch_count,
            if self.batch_count == 1 { "" } else { "es" },
            self.total_tokens
        )
    }
}

/// Aggregated sale figures, derived from the invoice table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesStats {
    /// Batches in paid, delivered or distribution-failed invoices.
    pub batches_sold: i64,
    /// Batches held by pending invoices that have not expired.
    pub batches_reserved: i64,
    pub tokens_sold: i64,
    pub sats_received: i64,
    pub unique_buyers: i64,
    pub mint_closed: bool,
    pub last_sale_at: Option<DateTime<Utc>>,
}

impl SalesStats {
    pub fn batches_taken(&self) -> i64 {
        self.batches_sold + self.batches_reserved
    }

    pub fn percent_sold(&self, params: &SaleParams) -> f64 {
        if params.total_batches <= 0 {
            return 100.0;
        }
        (self.batches_sold as f64 / params.total_batches as f64) * 100.0
    }

    pub fn is_sold_out(&self, params: &SaleParams) -> bool {
        self.batches_sold >= params.total_batches
    }
}
