//! Data Transfer Objects (DTOs) for requests and responses.

use chrono::{DateTime, Utc};
use fiat_rates::FiatAmount;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{
    GameScore, Invoice, InvoiceId, InvoiceStatus, LeaderboardPeriod, MAX_LEADERBOARD_SIZE, Tier,
};

/// Default page size for invoice listings.
pub const DEFAULT_PAGE_SIZE: i64 = 50;
/// Largest page an admin listing may request.
pub const MAX_PAGE_SIZE: i64 = 500;

// ─────────────────────────────────────────────────────────────────────────────
// Game DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// A finished game, submitted to unlock a purchase tier.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScoreSubmission {
    /// Client generated game session id
    #[schema(example = "3f0c2a9e-5b1d-4e8a-9c7f-1a2b3c4d5e6f")]
    pub session_id: String,
    #[schema(example = 21)]
    pub score: u32,
    /// How long the game lasted, in seconds
    #[schema(example = 30)]
    pub duration_secs: u32,
}

/// A signed tier pass to present when creating an invoice.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TierPassResponse {
    pub tier: Tier,
    /// Batches a wallet may buy at this tier
    #[schema(example = 20)]
    pub max_batches: u32,
    pub tier_pass: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LeaderboardQuery {
    /// `daily` (default), `weekly` or `all_time`
    pub period: Option<LeaderboardPeriod>,
    /// Entries to return, 10 by default and at most 100
    pub limit: Option<i64>,
}

impl LeaderboardQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(10).clamp(1, MAX_LEADERBOARD_SIZE)
    }
}

/// One leaderboard row. Sessions and addresses are never exposed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LeaderboardEntry {
    #[schema(example = 1)]
    pub rank: usize,
    #[schema(example = 34)]
    pub score: u32,
    pub tier: Option<Tier>,
    pub played_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LeaderboardResponse {
    pub period: LeaderboardPeriod,
    pub entries: Vec<LeaderboardEntry>,
}

impl LeaderboardResponse {
    /// Ranks scores that are already sorted best first.
    pub fn ranked(period: LeaderboardPeriod, scores: Vec<GameScore>) -> Self {
        let entries = scores
            .into_iter()
            .enumerate()
            .map(|(i, s)| LeaderboardEntry {
                rank: i + 1,
                score: s.score,
                tier: s.tier,
                played_at: s.created_at,
            })
            .collect();
        Self { period, entries }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sale DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct QuoteQuery {
    /// Number of batches to price
    pub batches: i64,
}

/// Price preview for a purchase.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuoteResponse {
    #[schema(example = 5)]
    pub batch_count: i64,
    #[schema(example = 2000)]
    pub sats_per_batch: i64,
    #[schema(example = 10000)]
    pub total_sats: i64,
    #[schema(example = 3500)]
    pub total_tokens: i64,
    /// Total in BTC with 8 decimals
    #[schema(example = "0.00010000")]
    pub btc: String,
    /// Rough USD estimate at the reference rate
    pub approx_usd: FiatAmount,
}

/// Public sale progress.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SalesStatsResponse {
    #[schema(example = 27900)]
    pub total_batches: i64,
    pub batches_sold: i64,
    /// Batches held by unpaid, unexpired invoices
    pub batches_reserved: i64,
    pub batches_remaining: i64,
    pub tokens_sold: i64,
    pub sats_received: i64,
    pub unique_buyers: i64,
    #[schema(example = 12.5)]
    pub percent_sold: f64,
    pub sold_out: bool,
    pub mint_closed: bool,
    pub last_sale_at: Option<DateTime<Utc>>,
    pub approx_usd_raised: FiatAmount,
}

// ─────────────────────────────────────────────────────────────────────────────
// Invoice DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to create a purchase invoice.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateInvoiceRequest {
    /// Bitcoin address of the buyer, used for per-wallet limits
    #[schema(example = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq")]
    pub wallet_address: String,
    /// RGB invoice the tokens are sent to
    #[schema(example = "rgb:2bFVTT$W-utxob:egXsFnw-5Eud7WKYn-7DVQvcPbc-rR69YmgmG-veacwmUFo")]
    pub rgb_invoice: String,
    #[schema(example = 5)]
    pub batch_count: i64,
    /// Tier pass from `/api/game/score`. Without one the mint is locked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier_pass: Option<String>,
    /// Optional address for payment notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// An invoice as exposed over the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvoiceResponse {
    pub id: InvoiceId,
    #[schema(example = "LCAT-LOYW3V28-DEADBEEF")]
    pub reference: String,
    pub status: InvoiceStatus,
    pub wallet_address: String,
    pub rgb_invoice: String,
    pub tier: Tier,
    pub batch_count: i64,
    pub token_amount: i64,
    pub amount_sats: i64,
    /// BOLT11 payment request to pay
    pub payment_request: String,
    pub payment_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_reason: Option<String>,
    /// Whether `/consignment` can be downloaded
    pub consignment_available: bool,
}

impl From<Invoice> for InvoiceResponse {
    fn from(invoice: Invoice) -> Self {
        let consignment_available =
            invoice.status == InvoiceStatus::Delivered && invoice.consignment.is_some();
        Self {
            id: invoice.id,
            reference: invoice.reference,
            status: invoice.status,
            wallet_address: invoice.wallet_address,
            rgb_invoice: invoice.rgb_invoice,
            tier: invoice.tier,
            batch_count: invoice.batch_count,
            token_amount: invoice.token_amount,
            amount_sats: invoice.amount_sats.get(),
            payment_request: invoice.payment_request,
            payment_hash: invoice.payment_hash,
            created_at: invoice.created_at,
            expires_at: invoice.expires_at,
            paid_at: invoice.paid_at,
            delivered_at: invoice.delivered_at,
            transfer_id: invoice.transfer_id,
            failure_reason: invoice.failure_reason,
            refund_reason: invoice.refund_reason,
            consignment_available,
        }
    }
}

/// Purchases made by one wallet.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WalletHistoryResponse {
    pub wallet_address: String,
    pub invoices: Vec<InvoiceResponse>,
    /// Batches in paid or delivered invoices
    pub batches_purchased: i64,
    pub tokens_delivered: i64,
}

/// Admin listing filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    pub wallet: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl InvoiceFilter {
    pub fn for_wallet(wallet: impl Into<String>) -> Self {
        Self {
            wallet: Some(wallet.into()),
            limit: Some(MAX_PAGE_SIZE),
            ..Default::default()
        }
    }

    /// Page size clamped to `1..=MAX_PAGE_SIZE`.
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway webhook DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Payment update pushed by the Lightning gateway.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LightningWebhook {
    #[serde(alias = "paymentHash")]
    pub payment_hash: String,
    /// `paid`, `settled` or `cancelled`
    #[schema(example = "paid")]
    pub status: String,
}

/// What the service did with a webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// The invoice moved to a new status
    Applied,
    /// The transition had already happened
    AlreadyHandled,
    /// No invoice with that payment hash, or a status we do not act on
    Ignored,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: WebhookOutcome,
}

// ─────────────────────────────────────────────────────────────────────────────
// Admin DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefundRequest {
    #[schema(example = "Buyer sent the wrong RGB invoice")]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MintStateResponse {
    pub mint_closed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BanWalletRequest {
    #[schema(example = "Chargeback abuse")]
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

/// Purchase export window. Bounds are inclusive and optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ExportQuery {
    /// `json` (default) or `csv`
    pub format: Option<ExportFormat>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// One purchase as it appears in the operator export.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PurchaseRecord {
    pub reference: String,
    pub id: InvoiceId,
    pub wallet_address: String,
    pub email: Option<String>,
    pub tier: Tier,
    pub batch_count: i64,
    pub token_amount: i64,
    pub amount_sats: i64,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub transfer_id: Option<String>,
    pub refund_reason: Option<String>,
}

impl From<Invoice> for PurchaseRecord {
    fn from(invoice: Invoice) -> Self {
        Self {
            reference: invoice.reference,
            id: invoice.id,
            wallet_address: invoice.wallet_address,
            email: invoice.email,
            tier: invoice.tier,
            batch_count: invoice.batch_count,
            token_amount: invoice.token_amount,
            amount_sats: invoice.amount_sats.get(),
            status: invoice.status,
            created_at: invoice.created_at,
            paid_at: invoice.paid_at,
            delivered_at: invoice.delivered_at,
            transfer_id: invoice.transfer_id,
            refund_reason: invoice.refund_reason,
        }
    }
}
