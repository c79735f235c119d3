//! Invoice domain model and its status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::sats::Sats;
use super::tier::Tier;
use crate::error::DomainError;

/// Unique identifier for an Invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct InvoiceId(Uuid);

impl InvoiceId {
    /// Creates a new random InvoiceId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an InvoiceId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns the UUID value.
    pub fn into_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for InvoiceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for InvoiceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle of a purchase invoice.
///
/// `pending` invoices settle to `paid`, run out to `expired` or are
/// `cancelled` by the processor. A late settlement of an `expired` invoice
/// goes through [`InvoiceRepository::settle_expired`](crate::InvoiceRepository::settle_expired),
/// which re-checks the sale under its lock: `paid` if the batches still fit,
/// `refund_due` otherwise. `paid` invoices end up `delivered` or
/// `distribution_failed`; the latter can be put back to `paid` for a retry.
/// Anything that took money can be `refunded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Delivered,
    Expired,
    Cancelled,
    DistributionFailed,
    /// Paid after expiry, when the sale could no longer hold the batches
    RefundDue,
    Refunded,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 8] = [
        InvoiceStatus::Pending,
        InvoiceStatus::Paid,
        InvoiceStatus::Delivered,
        InvoiceStatus::Expired,
        InvoiceStatus::Cancelled,
        InvoiceStatus::DistributionFailed,
        InvoiceStatus::RefundDue,
        InvoiceStatus::Refunded,
    ];

    /// Statuses whose batches count as sold.
    pub const SOLD: [InvoiceStatus; 3] = [
        InvoiceStatus::Paid,
        InvoiceStatus::Delivered,
        InvoiceStatus::DistributionFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Delivered => "delivered",
            InvoiceStatus::Expired => "expired",
            InvoiceStatus::Cancelled => "cancelled",
            InvoiceStatus::DistributionFailed => "distribution_failed",
            InvoiceStatus::RefundDue => "refund_due",
            InvoiceStatus::Refunded => "refunded",
        }
    }

    /// The statuses an invoice may move to `self` from.
    pub fn allowed_sources(&self) -> &'static [InvoiceStatus] {
        match self {
            InvoiceStatus::Pending => &[],
            InvoiceStatus::Paid => &[InvoiceStatus::Pending, InvoiceStatus::DistributionFailed],
            InvoiceStatus::Delivered => &[InvoiceStatus::Paid],
            InvoiceStatus::Expired => &[InvoiceStatus::Pending],
            InvoiceStatus::Cancelled => &[InvoiceStatus::Pending],
            InvoiceStatus::DistributionFailed => &[InvoiceStatus::Paid],
            InvoiceStatus::RefundDue => &[InvoiceStatus::Expired],
            InvoiceStatus::Refunded => &[
                InvoiceStatus::Paid,
                InvoiceStatus::Delivered,
                InvoiceStatus::DistributionFailed,
                InvoiceStatus::RefundDue,
            ],
        }
    }

    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        next.allowed_sources().contains(self)
    }

    pub fn is_sold(&self) -> bool {
        Self::SOLD.contains(self)
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| DomainError::ValidationError(format!("Unknown invoice status: {}", s)))
    }
}

/// Builds a human-readable payment reference: `LCAT-<base36 millis>-<hex>`.
pub fn payment_reference(now: DateTime<Utc>, entropy: u32) -> String {
    let mut millis = now.timestamp_millis().max(0) as u64;
    let mut digits = Vec::new();
    loop {
        let d = (millis % 36) as u32;
        digits.push(std::char::from_digit(d, 36).unwrap_or('0'));
        millis /= 36;
        if millis == 0 {
            break;
        }
    }
    let stamp: String = digits.iter().rev().collect();
    format!("LCAT-{}-{:08x}", stamp, entropy).to_uppercase()
}

/// A purchase invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub reference: String,
    pub wallet_address: String,
    pub rgb_invoice: String,
    pub email: Option<String>,
    pub tier: Tier,
    pub batch_count: i64,
    pub token_amount: i64,
    pub amount_sats: Sats,
    /// BOLT11 payment request
    pub payment_request: String,
    pub payment_hash: String,
    pub status: InvoiceStatus,
    /// Hex encoded RGB consignment, present once delivered
    pub consignment: Option<String>,
    pub transfer_id: Option<String>,
    pub failure_reason: Option<String>,
    pub refund_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// A pending invoice whose deadline has passed.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == InvoiceStatus::Pending && now >= self.expires_at
    }

    /// Consignment download name, e.g. `lightcat_consignment_<id>_5x700_2026-01-31.rgb`.
    pub fn consignment_filename(&self, tokens_per_batch: i64) -> String {
        let date = self.delivered_at.unwrap_or(self.updated_at);
        format!(
            "lightcat_consignment_{}_{}x{}_{}.rgb",
            self.id,
            self.batch_count,
            tokens_per_batch,
            date.format("%Y-%m-%d")
        )
    }
}

/// A validated invoice ready to be stored as `pending`.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub id: InvoiceId,
    pub reference: String,
    pub wallet_address: String,
    pub rgb_invoice: String,
    pub email: Option<String>,
    pub tier: Tier,
    pub batch_count: i64,
    pub token_amount: i64,
    pub amount_sats: Sats,
    pub payment_request: String,
    pub payment_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewInvoice {
    /// The in-memory invoice this record becomes once inserted.
    pub fn into_invoice(self) -> Invoice {
        Invoice {
            id: self.id,
            reference: self.reference,
            wallet_address: self.wallet_address,
            rgb_invoice: self.rgb_invoice,
            email: self.email,
            tier: self.tier,
            batch_count: self.batch_count,
            token_amount: self.token_amount,
            amount_sats: self.amount_sats,
            payment_request: self.payment_request,
            payment_hash: self.payment_hash,
            status: InvoiceStatus::Pending,
            consignment: None,
            transfer_id: None,
            failure_reason: None,
            refund_reason: None,
            created_at: self.created_at,
            expires_at: self.expires_at,
            paid_at: None,
            delivered_at: None,
            updated_at: self.created_at,
        }
    }
}

/// Field changes applied together with a status transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionUpdate {
    pub paid_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub consignment: Option<String>,
    pub transfer_id: Option<String>,
    pub failure_reason: Option<String>,
    pub refund_reason: Option<String>,
}

impl TransitionUpdate {
    pub fn paid(at: DateTime<Utc>) -> Self {
        Self {
            paid_at: Some(at),
            ..Default::default()
        }
    }

    pub fn delivered(at: DateTime<Utc>, transfer_id: String, consignment: String) -> Self {
        Self {
            delivered_at: Some(at),
            transfer_id: Some(transfer_id),
            consignment: Some(consignment),
            ..Default::default()
        }
    }

    /// Paid too late to deliver; the reason tells the operator why.
    pub fn refund_due(at: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            paid_at: Some(at),
            failure_reason: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            failure_reason: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn refunded(reason: impl Into<String>) -> Self {
        Self {
            refund_reason: Some(reason.into()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_settlement_transitions() {
        assert!(InvoiceStatus::Pending.can_transition_to(InvoiceStatus::Paid));
        assert!(InvoiceStatus::Expired.can_transition_to(InvoiceStatus::RefundDue));
        assert!(InvoiceStatus::RefundDue.can_transition_to(InvoiceStatus::Refunded));
        assert!(InvoiceStatus::Paid.can_transition_to(InvoiceStatus::Delivered));
        assert!(InvoiceStatus::Paid.can_transition_to(InvoiceStatus::DistributionFailed));
        assert!(InvoiceStatus::DistributionFailed.can_transition_to(InvoiceStatus::Paid));
    }

    #[test]
    fn test_forbidden_transitions() {
        assert!(!InvoiceStatus::Delivered.can_transition_to(InvoiceStatus::Paid));
        assert!(!InvoiceStatus::Cancelled.can_transition_to(InvoiceStatus::Paid));
        assert!(!InvoiceStatus::Pending.can_transition_to(InvoiceStatus::Delivered));
        assert!(!InvoiceStatus::Pending.can_transition_to(InvoiceStatus::Refunded));
        assert!(!InvoiceStatus::Refunded.can_transition_to(InvoiceStatus::Paid));
        // Late settlement only happens under the sale lock, never as a bare update
        assert!(!InvoiceStatus::Expired.can_transition_to(InvoiceStatus::Paid));
        assert!(!InvoiceStatus::RefundDue.can_transition_to(InvoiceStatus::Paid));
        assert!(!InvoiceStatus::RefundDue.is_sold());
        for status in InvoiceStatus::ALL {
            assert!(!status.can_transition_to(InvoiceStatus::Pending));
        }
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in InvoiceStatus::ALL {
            assert_eq!(status.as_str().parse::<InvoiceStatus>().unwrap(), status);
        }
        assert!("settled".parse::<InvoiceStatus>().is_err());
    }

    #[test]
    fn test_payment_reference_shape() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let reference = payment_reference(now, 0xdeadbeef);
        assert_eq!(reference, "LCAT-LOYW3V28-DEADBEEF");
    }
}
