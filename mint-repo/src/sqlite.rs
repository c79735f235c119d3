//! SQLite repository adapter.
#![allow(clippy::collapsible_if)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use uuid::Uuid;

use mint_types::{
    ApiKey, ApiKeyId, BannedWallet, DeliveryStatus, DomainError, GameScore, Invoice,
    InvoiceFilter, InvoiceId, InvoiceRepository, InvoiceStatus, NewInvoice, Notification,
    RepoError, SalesStats, TransitionUpdate,
};

use crate::types::{
    API_KEY_COLUMNS, BANNED_WALLET_COLUMNS, DbApiKey, DbBannedWallet, DbGameScore, DbInvoice,
    DbNotification, DbReserved, DbSalesTotals, GAME_SCORE_COLUMNS, INVOICE_COLUMNS,
    NOTIFICATION_COLUMNS, late_payment_reason, status_list,
};

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Repository
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite repository implementation.
///
/// Intended for local runs and tests. Writers are serialized by SQLite's
/// database lock, which stands in for the row lock Postgres takes.
#[derive(Clone)]
pub struct SqliteRepo {
    pool: SqlitePool,
}

const MIGRATIONS: [(&str, &str); 4] = [
    ("0001", include_str!("../migrations/0001_create_invoices.sql")),
    ("0002", include_str!("../migrations/0002_create_notifications.sql")),
    ("0003", include_str!("../migrations/0003_create_api_keys.sql")),
    ("0004", include_str!("../migrations/0004_create_scores_and_bans.sql")),
];

/// Runs all database migrations, one statement at a time.
async fn run_migrations(pool: &SqlitePool) -> Result<(), anyhow::Error> {
    for (name, sql) in MIGRATIONS {
        for statement in sql.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt)
                    .execute(pool)
                    .await
                    .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
            }
        }
    }
    Ok(())
}

fn map_insert_error(e: sqlx::Error) -> RepoError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => RepoError::Conflict(db.message().to_string()),
        _ => RepoError::Database(e.to_string()),
    }
}

/// Takes the database write lock for the rest of the transaction.
///
/// Writing first makes SQLite upgrade straight to the write lock, so the
/// reads that follow see no concurrent reservation.
async fn lock_sale(db_tx: &mut Transaction<'_, Sqlite>, now: DateTime<Utc>) -> Result<(), RepoError> {
    sqlx::query(r#"UPDATE sale_state SET updated_at = ? WHERE id = 1"#)
        .bind(now)
        .execute(&mut **db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;
    Ok(())
}

/// Checks that `batch_count` more batches fit the sale and the wallet's limit.
///
/// Must run under [`lock_sale`]. Counts sold invoices and pending ones that
/// have not expired at `now`.
async fn check_reservation(
    db_tx: &mut Transaction<'_, Sqlite>,
    wallet_address: &str,
    batch_count: i64,
    wallet_limit: i64,
    total_batches: i64,
    now: DateTime<Utc>,
) -> Result<(), RepoError> {
    let sold = status_list(&InvoiceStatus::SOLD);

    let taken: DbReserved = sqlx::query_as(&format!(
        r#"SELECT COALESCE(SUM(batch_count), 0) AS reserved FROM invoices
           WHERE status IN ({}) OR (status = 'pending' AND expires_at > ?)"#,
        sold
    ))
    .bind(now)
    .fetch_one(&mut **db_tx)
    .await
    .map_err(|e| RepoError::Database(e.to_string()))?;

    let available = (total_batches - taken.reserved).max(0);
    if batch_count > available {
        return Err(RepoError::Domain(DomainError::InsufficientSupply {
            available,
            requested: batch_count,
        }));
    }

    let held: DbReserved = sqlx::query_as(&format!(
        r#"SELECT COALESCE(SUM(batch_count), 0) AS reserved FROM invoices
           WHERE wallet_address = ?
             AND (status IN ({}) OR (status = 'pending' AND expires_at > ?))"#,
        sold
    ))
    .bind(wallet_address)
    .bind(now)
    .fetch_one(&mut **db_tx)
    .await
    .map_err(|e| RepoError::Database(e.to_string()))?;

    if held.reserved + batch_count > wallet_limit {
        return Err(RepoError::Domain(DomainError::WalletLimitExceeded {
            limit: wallet_limit,
            held: held.reserved,
            requested: batch_count,
        }));
    }

    Ok(())
}

impl SqliteRepo {
    /// Creates a new SQLite repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to `:memory:` is its own database, so keep exactly one alive.
        let in_memory = database_url.contains(":memory:");
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the database schema (for testing with existing pool).
    pub async fn create_schema(&self) -> Result<(), RepoError> {
        run_migrations(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl InvoiceRepository for SqliteRepo {
    async fn create_invoice(
        &self,
        invoice: NewInvoice,
        total_batches: i64,
    ) -> Result<Invoice, RepoError> {
        let now = Utc::now();

        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        lock_sale(&mut db_tx, now).await?;

        let (mint_closed,): (bool,) =
            sqlx::query_as(r#"SELECT mint_closed FROM sale_state WHERE id = 1"#)
                .fetch_one(&mut *db_tx)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

        if mint_closed {
            return Err(RepoError::Domain(DomainError::MintClosed));
        }

        let banned: Option<(String,)> =
            sqlx::query_as(r#"SELECT wallet_address FROM banned_wallets WHERE wallet_address = ?"#)
                .bind(&invoice.wallet_address)
                .fetch_optional(&mut *db_tx)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

        if banned.is_some() {
            return Err(RepoError::Domain(DomainError::WalletBanned(
                invoice.wallet_address.clone(),
            )));
        }

        check_reservation(
            &mut db_tx,
            &invoice.wallet_address,
            invoice.batch_count,
            invoice.tier.max_batches() as i64,
            total_batches,
            now,
        )
        .await?;

        sqlx::query(
            r#"INSERT INTO invoices (id, reference, wallet_address, rgb_invoice, email, tier,
                   batch_count, token_amount, amount_sats, payment_request, payment_hash, status,
                   created_at, expires_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?)"#,
        )
        .bind(invoice.id.into_uuid())
        .bind(&invoice.reference)
        .bind(&invoice.wallet_address)
        .bind(&invoice.rgb_invoice)
        .bind(&invoice.email)
        .bind(invoice.tier.as_str())
        .bind(invoice.batch_count)
        .bind(invoice.token_amount)
        .bind(invoice.amount_sats.get())
        .bind(&invoice.payment_request)
        .bind(&invoice.payment_hash)
        .bind(invoice.created_at)
        .bind(invoice.expires_at)
        .bind(invoice.created_at)
        .execute(&mut *db_tx)
        .await
        .map_err(map_insert_error)?;

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok(invoice.into_invoice())
    }

    async fn get_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, RepoError> {
        let row: Option<DbInvoice> = sqlx::query_as(&format!(
            "SELECT {} FROM invoices WHERE id = ?",
            INVOICE_COLUMNS
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbInvoice::into_domain).transpose()
    }

    async fn find_by_payment_hash(
        &self,
        payment_hash: &str,
    ) -> Result<Option<Invoice>, RepoError> {
        let row: Option<DbInvoice> = sqlx::query_as(&format!(
            "SELECT {} FROM invoices WHERE payment_hash = ?",
            INVOICE_COLUMNS
        ))
        .bind(payment_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbInvoice::into_domain).transpose()
    }

    async fn list_invoices(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, RepoError> {
        let status = filter.status.map(|s| s.as_str());

        let rows: Vec<DbInvoice> = sqlx::query_as(&format!(
            r#"SELECT {} FROM invoices
               WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR wallet_address = ?2)
               ORDER BY created_at DESC
               LIMIT ?3 OFFSET ?4"#,
            INVOICE_COLUMNS
        ))
        .bind(status)
        .bind(&filter.wallet)
        .bind(filter.limit())
        .bind(filter.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbInvoice::into_domain).collect()
    }

    async fn list_pending(&self, limit: i64) -> Result<Vec<Invoice>, RepoError> {
        let rows: Vec<DbInvoice> = sqlx::query_as(&format!(
            r#"SELECT {} FROM invoices WHERE status = 'pending' ORDER BY created_at ASC LIMIT ?"#,
            INVOICE_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbInvoice::into_domain).collect()
    }

    async fn transition(
        &self,
        id: InvoiceId,
        to: InvoiceStatus,
        update: TransitionUpdate,
    ) -> Result<Option<Invoice>, RepoError> {
        let sources = to.allowed_sources();
        if sources.is_empty() {
            return Ok(None);
        }

        let row: Option<DbInvoice> = sqlx::query_as(&format!(
            r#"UPDATE invoices SET
                   status = ?1,
                   updated_at = ?2,
                   paid_at = COALESCE(?3, paid_at),
                   delivered_at = COALESCE(?4, delivered_at),
                   consignment = COALESCE(?5, consignment),
                   transfer_id = COALESCE(?6, transfer_id),
                   failure_reason = CASE WHEN ?1 = 'delivered' THEN NULL
                                         ELSE COALESCE(?7, failure_reason) END,
                   refund_reason = COALESCE(?8, refund_reason)
               WHERE id = ?9 AND status IN ({})
               RETURNING {}"#,
            status_list(sources),
            INVOICE_COLUMNS
        ))
        .bind(to.as_str())
        .bind(Utc::now())
        .bind(update.paid_at)
        .bind(update.delivered_at)
        .bind(update.consignment)
        .bind(update.transfer_id)
        .bind(update.failure_reason)
        .bind(update.refund_reason)
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbInvoice::into_domain).transpose()
    }

    async fn settle_expired(
        &self,
        id: InvoiceId,
        paid_at: DateTime<Utc>,
        total_batches: i64,
    ) -> Result<Option<Invoice>, RepoError> {
        let now = Utc::now();

        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        lock_sale(&mut db_tx, now).await?;

        let row: Option<DbInvoice> = sqlx::query_as(&format!(
            "SELECT {} FROM invoices WHERE id = ? AND status = 'expired'",
            INVOICE_COLUMNS
        ))
        .bind(id.into_uuid())
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let Some(invoice) = row.map(DbInvoice::into_domain).transpose()? else {
            return Ok(None);
        };

        let (to, reason) = match check_reservation(
            &mut db_tx,
            &invoice.wallet_address,
            invoice.batch_count,
            invoice.tier.max_batches() as i64,
            total_batches,
            now,
        )
        .await
        {
            Ok(()) => (InvoiceStatus::Paid, None),
            Err(RepoError::Domain(e)) => (InvoiceStatus::RefundDue, Some(late_payment_reason(&e))),
            Err(e) => return Err(e),
        };

        let row: Option<DbInvoice> = sqlx::query_as(&format!(
            r#"UPDATE invoices SET status = ?, updated_at = ?, paid_at = ?, failure_reason = ?
               WHERE id = ? AND status = 'expired'
               RETURNING {}"#,
            INVOICE_COLUMNS
        ))
        .bind(to.as_str())
        .bind(now)
        .bind(paid_at)
        .bind(reason)
        .bind(id.into_uuid())
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        row.map(DbInvoice::into_domain).transpose()
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Invoice>, RepoError> {
        let rows: Vec<DbInvoice> = sqlx::query_as(&format!(
            r#"UPDATE invoices SET status = 'expired', updated_at = ?1
               WHERE status = 'pending' AND expires_at <= ?1
               RETURNING {}"#,
            INVOICE_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbInvoice::into_domain).collect()
    }

    async fn claim_stalled_paid(
        &self,
        stalled_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Invoice>, RepoError> {
        let rows: Vec<DbInvoice> = sqlx::query_as(&format!(
            r#"UPDATE invoices SET updated_at = ?1
               WHERE id IN (
                   SELECT id FROM invoices
                   WHERE status = 'paid' AND updated_at <= ?2
                   ORDER BY updated_at ASC
                   LIMIT ?3
               )
               AND status = 'paid' AND updated_at <= ?2
               RETURNING {}"#,
            INVOICE_COLUMNS
        ))
        .bind(Utc::now())
        .bind(stalled_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbInvoice::into_domain).collect()
    }

    async fn export_invoices(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Invoice>, RepoError> {
        let rows: Vec<DbInvoice> = sqlx::query_as(&format!(
            r#"SELECT {} FROM invoices
               WHERE (?1 IS NULL OR created_at >= ?1) AND (?2 IS NULL OR created_at <= ?2)
               ORDER BY created_at ASC"#,
            INVOICE_COLUMNS
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbInvoice::into_domain).collect()
    }

    async fn sales_stats(&self, now: DateTime<Utc>) -> Result<SalesStats, RepoError> {
        let sold = status_list(&InvoiceStatus::SOLD);

        let totals: DbSalesTotals = sqlx::query_as(&format!(
            r#"SELECT
                   COALESCE(SUM(CASE WHEN status IN ({sold}) THEN batch_count ELSE 0 END), 0) AS batches_sold,
                   COALESCE(SUM(CASE WHEN status = 'pending' AND expires_at > ?1 THEN batch_count ELSE 0 END), 0) AS batches_reserved,
                   COALESCE(SUM(CASE WHEN status IN ({sold}) THEN token_amount ELSE 0 END), 0) AS tokens_sold,
                   COALESCE(SUM(CASE WHEN status IN ({sold}) THEN amount_sats ELSE 0 END), 0) AS sats_received,
                   COUNT(DISTINCT CASE WHEN status IN ({sold}) THEN wallet_address END) AS unique_buyers,
                   MAX(CASE WHEN status IN ({sold}) THEN paid_at END) AS last_sale_at
               FROM invoices"#
        ))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let (mint_closed,): (bool,) =
            sqlx::query_as(r#"SELECT mint_closed FROM sale_state WHERE id = 1"#)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(totals.into_domain(mint_closed))
    }

    async fn set_mint_closed(&self, closed: bool) -> Result<(), RepoError> {
        sqlx::query(r#"UPDATE sale_state SET mint_closed = ?, updated_at = ? WHERE id = 1"#)
            .bind(closed)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(())
    }

    async fn ban_wallet(&self, ban: BannedWallet) -> Result<BannedWallet, RepoError> {
        let row: DbBannedWallet = sqlx::query_as(&format!(
            r#"INSERT INTO banned_wallets (wallet_address, reason, banned_at) VALUES (?, ?, ?)
               ON CONFLICT (wallet_address) DO UPDATE SET reason = excluded.reason
               RETURNING {}"#,
            BANNED_WALLET_COLUMNS
        ))
        .bind(&ban.wallet_address)
        .bind(&ban.reason)
        .bind(ban.banned_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(row.into())
    }

    async fn unban_wallet(&self, wallet_address: &str) -> Result<bool, RepoError> {
        let result = sqlx::query(r#"DELETE FROM banned_wallets WHERE wallet_address = ?"#)
            .bind(wallet_address)
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_banned_wallets(&self) -> Result<Vec<BannedWallet>, RepoError> {
        let rows: Vec<DbBannedWallet> = sqlx::query_as(&format!(
            "SELECT {} FROM banned_wallets ORDER BY banned_at DESC",
            BANNED_WALLET_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn record_score(&self, score: &GameScore) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO game_scores (id, session_id, score, duration_secs, tier, client_ip, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(score.id)
        .bind(&score.session_id)
        .bind(i64::from(score.score))
        .bind(i64::from(score.duration_secs))
        .bind(score.tier.map(|t| t.as_str()))
        .bind(&score.client_ip)
        .bind(score.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(())
    }

    async fn count_scores_since(
        &self,
        client_ip: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, RepoError> {
        let row: (i64,) = sqlx::query_as(
            r#"SELECT COUNT(*) FROM game_scores WHERE client_ip = ? AND created_at >= ?"#,
        )
        .bind(client_ip)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(row.0)
    }

    async fn top_scores(
        &self,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<GameScore>, RepoError> {
        let rows: Vec<DbGameScore> = sqlx::query_as(&format!(
            r#"SELECT {} FROM game_scores
               WHERE ?1 IS NULL OR created_at >= ?1
               ORDER BY score DESC, created_at ASC
               LIMIT ?2"#,
            GAME_SCORE_COLUMNS
        ))
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbGameScore::into_domain).collect()
    }

    async fn enqueue_notification(&self, notification: Notification) -> Result<(), RepoError> {
        sqlx::query(
            r#"INSERT INTO notifications (id, invoice_id, kind, recipient, payload, status, attempts, created_at)
               VALUES (?, ?, ?, ?, ?, 'PENDING', 0, ?)"#,
        )
        .bind(notification.id)
        .bind(notification.invoice_id.into_uuid())
        .bind(notification.kind.as_ref())
        .bind(&notification.recipient)
        .bind(notification.payload.to_string())
        .bind(notification.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(())
    }

    async fn verify_api_key_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepoError> {
        let row: Option<DbApiKey> = sqlx::query_as(&format!(
            r#"UPDATE api_keys SET last_used_at = ?
               WHERE key_hash = ? AND is_active = 1
               RETURNING {}"#,
            API_KEY_COLUMNS
        ))
        .bind(Utc::now())
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(row.map(DbApiKey::into_domain))
    }

    async fn create_api_key(&self, name: &str) -> Result<(ApiKey, String), RepoError> {
        let raw_key = crate::security::generate_api_key();
        let api_key = ApiKey::new(name.to_string(), crate::security::hash_api_key(&raw_key));

        sqlx::query(
            r#"INSERT INTO api_keys (id, name, key_hash, is_active, created_at) VALUES (?, ?, ?, 1, ?)"#,
        )
        .bind(*api_key.id.as_uuid())
        .bind(&api_key.name)
        .bind(&api_key.key_hash)
        .bind(api_key.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok((api_key, raw_key))
    }

    async fn count_api_keys(&self) -> Result<i64, RepoError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(row.0)
    }

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, RepoError> {
        let rows: Vec<DbApiKey> = sqlx::query_as(&format!(
            "SELECT {} FROM api_keys WHERE is_active = 1 ORDER BY created_at DESC",
            API_KEY_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(DbApiKey::into_domain).collect())
    }

    async fn delete_api_key(&self, id: ApiKeyId) -> Result<bool, RepoError> {
        let result = sqlx::query(r#"UPDATE api_keys SET is_active = 0 WHERE id = ? AND is_active = 1"#)
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Notification Outbox (Internal)
// ─────────────────────────────────────────────────────────────────────────────
impl SqliteRepo {
    /// Claims up to `limit` due notifications by marking them PROCESSING.
    ///
    /// A notification is due once its `next_attempt_at` is unset or at or before `now`.
    pub async fn get_pending_notifications(
        &self,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, RepoError> {
        let rows = sqlx::query_as::<_, DbNotification>(&format!(
            r#"
            UPDATE notifications SET status = 'PROCESSING'
            WHERE id IN (
                SELECT id FROM notifications
                WHERE status = 'PENDING'
                  AND (next_attempt_at IS NULL OR next_attempt_at <= ?)
                ORDER BY created_at ASC
                LIMIT ?
            )
            RETURNING {}
            "#,
            NOTIFICATION_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(|row| row.into_domain()).collect()
    }

    /// Records a delivery attempt. `next_attempt_at` schedules the retry of a
    /// notification put back to PENDING.
    pub async fn update_notification_status(
        &self,
        id: Uuid,
        status: DeliveryStatus,
        last_error: Option<String>,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            UPDATE notifications
            SET status = ?, processed_at = ?, last_error = ?, next_attempt_at = ?,
                attempts = attempts + 1
            WHERE id = ?
            "#,
        )
        .bind(status.to_string())
        .bind(Utc::now())
        .bind(last_error)
        .bind(next_attempt_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(())
    }
}
