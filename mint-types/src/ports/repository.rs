//! Repository port trait.
//!
//! This is the primary port in our hexagonal architecture.
//! Adapters (Postgres, SQLite) implement this trait.

use chrono::{DateTime, Utc};

use crate::domain::{
    ApiKey, ApiKeyId, BannedWallet, GameScore, Invoice, InvoiceId, InvoiceStatus, NewInvoice,
    Notification, SalesStats, TransitionUpdate,
};
use crate::dto::InvoiceFilter;
use crate::error::RepoError;

/// The repository port for the invoice lifecycle.
///
/// Every status change goes through [`InvoiceRepository::transition`], a
/// conditional update that only succeeds from the statuses returned by
/// [`InvoiceStatus::allowed_sources`]. Concurrent callers racing on the same
/// invoice therefore see exactly one winner.
#[async_trait::async_trait]
pub trait InvoiceRepository: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────────
    // Invoice Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Inserts a pending invoice while holding the sale lock.
    ///
    /// MUST be atomic: rejects with `MintClosed`, `WalletBanned`,
    /// `InsufficientSupply` or `WalletLimitExceeded` when the reservation does
    /// not fit, counting paid, delivered, distribution-failed and unexpired
    /// pending invoices.
    async fn create_invoice(
        &self,
        invoice: NewInvoice,
        total_batches: i64,
    ) -> Result<Invoice, RepoError>;

    /// Gets an invoice by ID.
    async fn get_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, RepoError>;

    /// Finds an invoice by its Lightning payment hash.
    async fn find_by_payment_hash(&self, payment_hash: &str)
    -> Result<Option<Invoice>, RepoError>;

    /// Lists invoices, newest first.
    async fn list_invoices(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, RepoError>;

    /// Lists pending invoices, oldest first.
    async fn list_pending(&self, limit: i64) -> Result<Vec<Invoice>, RepoError>;

    /// Moves an invoice to `to` if its current status allows it.
    ///
    /// Returns `None` when the invoice is missing or already left the
    /// allowed source statuses.
    async fn transition(
        &self,
        id: InvoiceId,
        to: InvoiceStatus,
        update: TransitionUpdate,
    ) -> Result<Option<Invoice>, RepoError>;

    /// Applies a payment that arrived after the invoice expired.
    ///
    /// Takes the same sale lock as [`InvoiceRepository::create_invoice`] and
    /// re-checks the supply and the wallet's tier limit. The invoice moves to
    /// `paid` when its batches still fit and to `refund_due` (with the reason
    /// in `failure_reason`) when they do not. Returns `None` when the invoice
    /// is missing or no longer `expired`.
    async fn settle_expired(
        &self,
        id: InvoiceId,
        paid_at: DateTime<Utc>,
        total_batches: i64,
    ) -> Result<Option<Invoice>, RepoError>;

    /// Expires every pending invoice whose deadline is at or before `now`.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Invoice>, RepoError>;

    /// Claims `paid` invoices untouched since `stalled_before`.
    ///
    /// Claimed rows get a fresh `updated_at`, so two watchers never pick the
    /// same invoice in the same window.
    async fn claim_stalled_paid(
        &self,
        stalled_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Invoice>, RepoError>;

    /// Every invoice created inside the window, oldest first.
    async fn export_invoices(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Invoice>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Sale State
    // ─────────────────────────────────────────────────────────────────────────────

    /// Aggregates sale progress; pending invoices count as reserved until `now`.
    async fn sales_stats(&self, now: DateTime<Utc>) -> Result<SalesStats, RepoError>;

    async fn set_mint_closed(&self, closed: bool) -> Result<(), RepoError>;

    /// Bars a wallet from new invoices. Banning again replaces the reason.
    async fn ban_wallet(&self, ban: BannedWallet) -> Result<BannedWallet, RepoError>;

    /// Lifts a ban. Returns false if the wallet was not banned.
    async fn unban_wallet(&self, wallet_address: &str) -> Result<bool, RepoError>;

    async fn list_banned_wallets(&self) -> Result<Vec<BannedWallet>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Game Scores
    // ─────────────────────────────────────────────────────────────────────────────

    async fn record_score(&self, score: &GameScore) -> Result<(), RepoError>;

    /// Scores submitted from `client_ip` at or after `since`.
    async fn count_scores_since(
        &self,
        client_ip: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, RepoError>;

    /// Best scores first; ties go to the earlier game.
    async fn top_scores(
        &self,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<GameScore>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Notification Outbox
    // ─────────────────────────────────────────────────────────────────────────────

    async fn enqueue_notification(&self, notification: Notification) -> Result<(), RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // API Keys
    // ─────────────────────────────────────────────────────────────────────────────

    /// Finds an active key by the SHA-256 hash of the raw key.
    async fn verify_api_key_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepoError>;

    /// Creates a key and returns it together with the raw key (shown once).
    async fn create_api_key(&self, name: &str) -> Result<(ApiKey, String), RepoError>;

    async fn count_api_keys(&self) -> Result<i64, RepoError>;

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, RepoError>;

    /// Deactivates a key. Returns false if no active key had that id.
    async fn delete_api_key(&self, id: ApiKeyId) -> Result<bool, RepoError>;
}
