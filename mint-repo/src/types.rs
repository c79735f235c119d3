//! Database row types shared by the SQLite and PostgreSQL adapters.
//!
//! Both backends decode ids as `Uuid` and timestamps as `DateTime<Utc>`;
//! SQLite stores them as BLOB and TEXT, PostgreSQL as UUID and TIMESTAMPTZ.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use mint_types::{
    ApiKey, ApiKeyId, BannedWallet, DeliveryStatus, GameScore, Invoice, InvoiceId, InvoiceStatus,
    Notification, NotificationKind, RepoError, SalesStats, Sats, Tier,
};

/// Column list matching [`DbInvoice`].
pub const INVOICE_COLUMNS: &str = "id, reference, wallet_address, rgb_invoice, email, tier, \
    batch_count, token_amount, amount_sats, payment_request, payment_hash, status, consignment, \
    transfer_id, failure_reason, refund_reason, created_at, expires_at, paid_at, delivered_at, \
    updated_at";

/// Column list matching [`DbNotification`].
pub const NOTIFICATION_COLUMNS: &str = "id, invoice_id, kind, recipient, payload, status, \
    attempts, last_error, created_at, processed_at, next_attempt_at";

/// Column list matching [`DbApiKey`].
pub const API_KEY_COLUMNS: &str = "id, name, key_hash, is_active, created_at, last_used_at";

/// Column list matching [`DbGameScore`].
pub const GAME_SCORE_COLUMNS: &str =
    "id, session_id, score, duration_secs, tier, client_ip, created_at";

/// Column list matching [`DbBannedWallet`].
pub const BANNED_WALLET_COLUMNS: &str = "wallet_address, reason, banned_at";

/// Reason stored on a late payment the sale can no longer honour.
pub fn late_payment_reason(err: &mint_types::DomainError) -> String {
    format!("Paid after expiry, refund required: {}", err)
}

// ─────────────────────────────────────────────────────────────────────────────
// Database row structs (derive FromRow for automatic mapping)
// ─────────────────────────────────────────────────────────────────────────────

/// Invoice row from database.
#[derive(FromRow)]
pub struct DbInvoice {
    pub id: Uuid,
    pub reference: String,
    pub wallet_address: String,
    pub rgb_invoice: String,
    pub email: Option<String>,
    pub tier: String,
    pub batch_count: i64,
    pub token_amount: i64,
    pub amount_sats: i64,
    pub payment_request: String,
    pub payment_hash: String,
    pub status: String,
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

/// Notification outbox row from database.
#[derive(FromRow)]
pub struct DbNotification {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub kind: String,
    pub recipient: String,
    pub payload: String,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

/// API key row from database.
#[derive(FromRow)]
pub struct DbApiKey {
    pub id: Uuid,
    pub name: String,
    pub key_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Game score row from database.
#[derive(FromRow)]
pub struct DbGameScore {
    pub id: Uuid,
    pub session_id: String,
    pub score: i64,
    pub duration_secs: i64,
    pub tier: Option<String>,
    pub client_ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(FromRow)]
pub struct DbBannedWallet {
    pub wallet_address: String,
    pub reason: String,
    pub banned_at: DateTime<Utc>,
}

/// Aggregates over the invoice table.
#[derive(FromRow)]
pub struct DbSalesTotals {
    pub batches_sold: i64,
    pub batches_reserved: i64,
    pub tokens_sold: i64,
    pub sats_received: i64,
    pub unique_buyers: i64,
    pub last_sale_at: Option<DateTime<Utc>>,
}

/// Batches held by a wallet, or by the whole sale.
#[derive(FromRow)]
pub struct DbReserved {
    pub reserved: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// SQL helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Renders statuses as a SQL list of string literals, e.g. `'paid', 'delivered'`.
///
/// Only the fixed status names are ever interpolated.
pub fn status_list(statuses: &[InvoiceStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_status(s: &str) -> Result<InvoiceStatus, RepoError> {
    s.parse()
        .map_err(|_| RepoError::Database(format!("Unknown invoice status: {}", s)))
}

fn parse_tier(s: &str) -> Result<Tier, RepoError> {
    s.parse()
        .map_err(|_| RepoError::Database(format!("Unknown tier: {}", s)))
}

fn parse_kind(s: &str) -> Result<NotificationKind, RepoError> {
    match s {
        "invoice_created" => Ok(NotificationKind::InvoiceCreated),
        "payment_confirmed" => Ok(NotificationKind::PaymentConfirmed),
        "tokens_delivered" => Ok(NotificationKind::TokensDelivered),
        "distribution_failed" => Ok(NotificationKind::DistributionFailed),
        "payment_cancelled" => Ok(NotificationKind::PaymentCancelled),
        "invoice_expired" => Ok(NotificationKind::InvoiceExpired),
        "refund_due" => Ok(NotificationKind::RefundDue),
        _ => Err(RepoError::Database(format!(
            "Unknown notification kind: {}",
            s
        ))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Domain conversion
// ─────────────────────────────────────────────────────────────────────────────

impl DbInvoice {
    /// Convert database row to domain Invoice.
    pub fn into_domain(self) -> Result<Invoice, RepoError> {
        Ok(Invoice {
            id: InvoiceId::from_uuid(self.id),
            reference: self.reference,
            wallet_address: self.wallet_address,
            rgb_invoice: self.rgb_invoice,
            email: self.email,
            tier: parse_tier(&self.tier)?,
            batch_count: self.batch_count,
            token_amount: self.token_amount,
            amount_sats: Sats::new(self.amount_sats).map_err(RepoError::Domain)?,
            payment_request: self.payment_request,
            payment_hash: self.payment_hash,
            status: parse_status(&self.status)?,
            consignment: self.consignment,
            transfer_id: self.transfer_id,
            failure_reason: self.failure_reason,
            refund_reason: self.refund_reason,
            created_at: self.created_at,
            expires_at: self.expires_at,
            paid_at: self.paid_at,
            delivered_at: self.delivered_at,
            updated_at: self.updated_at,
        })
    }
}

impl DbNotification {
    pub fn into_domain(self) -> Result<Notification, RepoError> {
        let status = match self.status.as_str() {
            "PENDING" => DeliveryStatus::Pending,
            "PROCESSING" => DeliveryStatus::Processing,
            "COMPLETED" => DeliveryStatus::Completed,
            "FAILED" => DeliveryStatus::Failed,
            _ => DeliveryStatus::Pending,
        };

        let payload: serde_json::Value = serde_json::from_str(&self.payload)
            .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(Notification {
            id: self.id,
            invoice_id: InvoiceId::from_uuid(self.invoice_id),
            kind: parse_kind(&self.kind)?,
            recipient: self.recipient,
            payload,
            status,
            attempts: self.attempts,
            last_error: self.last_error,
            created_at: self.created_at,
            processed_at: self.processed_at,
            next_attempt_at: self.next_attempt_at,
        })
    }
}

impl DbGameScore {
    pub fn into_domain(self) -> Result<GameScore, RepoError> {
        let narrow = |v: i64| {
            u32::try_from(v).map_err(|_| RepoError::Database(format!("Score out of range: {}", v)))
        };
        Ok(GameScore {
            id: self.id,
            session_id: self.session_id,
            score: narrow(self.score)?,
            duration_secs: narrow(self.duration_secs)?,
            tier: self.tier.as_deref().map(parse_tier).transpose()?,
            client_ip: self.client_ip,
            created_at: self.created_at,
        })
    }
}

impl From<DbBannedWallet> for BannedWallet {
    fn from(row: DbBannedWallet) -> Self {
        BannedWallet {
            wallet_address: row.wallet_address,
            reason: row.reason,
            banned_at: row.banned_at,
        }
    }
}

impl DbApiKey {
    /// Convert database row to domain ApiKey.
    pub fn into_domain(self) -> ApiKey {
        ApiKey {
            id: ApiKeyId::from_uuid(self.id),
            name: self.name,
            key_hash: self.key_hash,
            is_active: self.is_active,
            created_at: self.created_at,
            last_used_at: self.last_used_at,
        }
    }
}

impl DbSalesTotals {
    pub fn into_domain(self, mint_closed: bool) -> SalesStats {
        SalesStats {
            batches_sold: self.batches_sold,
            batches_reserved: self.batches_reserved,
            tokens_sold: self.tokens_sold,
            sats_received: self.sats_received,
            unique_buyers: self.unique_buyers,
            mint_closed,
            last_sale_at: self.last_sale_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_list() {
        assert_eq!(
            status_list(&InvoiceStatus::SOLD),
            "'paid', 'delivered', 'distribution_failed'"
        );
    }
}
