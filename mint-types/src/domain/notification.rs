use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::invoice::InvoiceId;

/// Maximum delivery attempts before a notification is marked failed.
pub const MAX_NOTIFICATION_ATTEMPTS: i32 = 5;

/// Longest wait between two delivery attempts.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(15 * 60);

/// Wait before retrying a delivery that has failed `attempts` times.
///
/// Doubles from `base` with every failure and caps at [`MAX_RETRY_DELAY`].
pub fn retry_delay(attempts: i32, base: Duration) -> Duration {
    let exponent = attempts.saturating_sub(1).clamp(0, 16) as u32;
    base.saturating_mul(1 << exponent).min(MAX_RETRY_DELAY)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    InvoiceCreated,
    PaymentConfirmed,
    TokensDelivered,
    DistributionFailed,
    PaymentCancelled,
    InvoiceExpired,
    RefundDue,
}

impl AsRef<str> for NotificationKind {
    fn as_ref(&self) -> &str {
        match self {
            Self::InvoiceCreated => "invoice_created",
            Self::PaymentConfirmed => "payment_confirmed",
            Self::TokensDelivered => "tokens_delivered",
            Self::DistributionFailed => "distribution_failed",
            Self::PaymentCancelled => "payment_cancelled",
            Self::InvoiceExpired => "invoice_expired",
            Self::RefundDue => "refund_due",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DeliveryStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AsRef<str> for DeliveryStatus {
    fn as_ref(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

/// An outbound buyer notification waiting in the outbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub invoice_id: InvoiceId,
    pub kind: NotificationKind,
    pub recipient: String,
    pub payload: serde_json::Value,
    pub status: DeliveryStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    /// Earliest time a failed delivery is tried again
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn new(
        invoice_id: InvoiceId,
        kind: NotificationKind,
        recipient: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            invoice_id,
            kind,
            recipient: recipient.into(),
            payload,
            status: DeliveryStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            processed_at: None,
            next_attempt_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_doubles_then_caps() {
        let base = Duration::from_secs(5);
        assert_eq!(retry_delay(1, base), Duration::from_secs(5));
        assert_eq!(retry_delay(2, base), Duration::from_secs(10));
        assert_eq!(retry_delay(4, base), Duration::from_secs(40));
        assert_eq!(retry_delay(30, base), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(3, Duration::ZERO), Duration::ZERO);
    }
}
