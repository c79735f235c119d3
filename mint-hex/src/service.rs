//! Mint Application Service
//!
//! Orchestrates the purchase lifecycle through the repository, gateway and
//! distributor ports: tier pass → invoice → payment → distribution → notify.
//! Contains NO infrastructure logic - pure business orchestration.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use fiat_rates::{FiatCode, format_btc, sats_to_fiat};
use serde_json::json;
use tracing::{debug, error, info, warn};

use mint_repo::security::{reference_entropy, sign_tier_pass, verify_signature, verify_tier_pass};
use mint_types::domain::validation::{
    validate_batch_count, validate_email, validate_game_score, validate_game_session,
    validate_lightning_invoice, validate_payment_hash, validate_rgb_invoice,
    validate_wallet_address,
};
use mint_types::domain::{DEFAULT_SCORES_PER_HOUR, payment_reference};
use mint_types::{
    AppError, BanWalletRequest, BannedWallet, CreateInvoiceRequest, Distribution, DomainError,
    ExportFormat, ExportQuery, GameScore, Invoice, InvoiceFilter, InvoiceId, InvoiceRepository,
    InvoiceResponse, InvoiceStatus, LeaderboardQuery, LeaderboardResponse, LightningWebhook,
    MintStateResponse, NewInvoice, Notification, NotificationKind, PaymentGateway, PaymentState,
    PurchaseRecord, QuoteResponse, SaleParams, SalesStatsResponse, ScoreSubmission, Tier,
    TierPass, TierPassResponse, TokenDistributor, TransitionUpdate, WalletHistoryResponse,
    WebhookAck, WebhookOutcome,
};

/// Pending invoices examined per watcher pass.
pub const RECONCILE_BATCH: i64 = 200;

const CSV_HEADER: &str = "reference,id,wallet_address,email,tier,batch_count,token_amount,\
amount_sats,status,created_at,paid_at,delivered_at,transfer_id,refund_reason";

/// A rendered purchase export, ready to be sent as a download.
#[derive(Debug, Clone)]
pub struct PurchaseExport {
    pub content_type: &'static str,
    pub filename: String,
    pub body: Vec<u8>,
}

/// Runtime settings for the service.
#[derive(Debug, Clone)]
pub struct MintConfig {
    pub sale: SaleParams,
    /// HMAC key for tier passes
    pub tier_pass_secret: String,
    pub tier_pass_ttl: Duration,
    /// Shared secret for `X-Signature` on gateway webhooks; unsigned webhooks are accepted when unset
    pub webhook_secret: Option<String>,
    /// How long an invoice may sit in `paid` before the watcher redistributes it
    pub distribution_grace: Duration,
    /// Score submissions accepted per client address per hour
    pub score_submissions_per_hour: i64,
}

impl Default for MintConfig {
    fn default() -> Self {
        Self {
            sale: SaleParams::default(),
            tier_pass_secret: "dev-tier-pass-secret".into(),
            tier_pass_ttl: Duration::hours(24),
            webhook_secret: None,
            distribution_grace: Duration::minutes(10),
            score_submissions_per_hour: DEFAULT_SCORES_PER_HOUR,
        }
    }
}

/// Application service for the token sale.
///
/// Generic over `R: InvoiceRepository` - the adapter is injected at compile time.
/// The gateway and distributor are trait objects so they can be picked at
/// startup from configuration (mock or real).
pub struct MintService<R: InvoiceRepository> {
    repo: R,
    gateway: Arc<dyn PaymentGateway>,
    distributor: Arc<dyn TokenDistributor>,
    config: MintConfig,
}

impl<R: InvoiceRepository> MintService<R> {
    pub fn new(
        repo: R,
        gateway: Arc<dyn PaymentGateway>,
        distributor: Arc<dyn TokenDistributor>,
        config: MintConfig,
    ) -> Self {
        Self {
            repo,
            gateway,
            distributor,
            config,
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn config(&self) -> &MintConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Game gate
    // ─────────────────────────────────────────────────────────────────────────────

    /// Records a finished game and turns it into a signed tier pass.
    ///
    /// `client_ip` is the caller's forwarded address; each address may submit
    /// `score_submissions_per_hour` games per hour.
    #[tracing::instrument(skip(self, req), fields(session_id = %req.session_id, score = req.score))]
    pub async fn submit_score(
        &self,
        req: ScoreSubmission,
        client_ip: Option<String>,
    ) -> Result<TierPassResponse, AppError> {
        validate_game_session(&req.session_id)?;
        validate_game_score(req.score, req.duration_secs)?;

        let now = Utc::now();
        if let Some(ip) = &client_ip {
            let recent = self
                .repo
                .count_scores_since(ip, now - Duration::hours(1))
                .await?;
            if recent >= self.config.score_submissions_per_hour {
                warn!(client_ip = %ip, recent, "Score submissions throttled");
                return Err(AppError::TooManyRequests(
                    "Too many score submissions, try again later".into(),
                ));
            }
        }

        self.repo
            .record_score(&GameScore::new(
                req.session_id.clone(),
                req.score,
                req.duration_secs,
                client_ip,
                now,
            ))
            .await?;

        let tier = Tier::from_score(req.score).ok_or_else(|| {
            AppError::BadRequest(format!(
                "Score {} does not unlock a tier (minimum {})",
                req.score,
                Tier::BRONZE_MIN_SCORE
            ))
        })?;

        let pass = TierPass {
            tier,
            expires_at: now + self.config.tier_pass_ttl,
            session_id: req.session_id,
        };
        let token = sign_tier_pass(&pass, &self.config.tier_pass_secret);

        info!(%tier, "Tier pass issued");
        Ok(TierPassResponse {
            tier,
            max_batches: tier.max_batches(),
            tier_pass: token,
            expires_at: pass.expires_at,
        })
    }

    /// Best scores of the requested period, highest first.
    pub async fn leaderboard(&self, query: LeaderboardQuery) -> Result<LeaderboardResponse, AppError> {
        let period = query.period.unwrap_or_default();
        let scores = self
            .repo
            .top_scores(period.since(Utc::now()), query.limit())
            .await?;
        Ok(LeaderboardResponse::ranked(period, scores))
    }

    /// Resolves an optional tier pass token. No token means no tier.
    pub fn verify_tier_pass(
        &self,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Tier>, AppError> {
        match token.map(str::trim).filter(|t| !t.is_empty()) {
            None => Ok(None),
            Some(token) => {
                let pass = verify_tier_pass(token, &self.config.tier_pass_secret, now)?;
                Ok(Some(pass.tier))
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Sale figures
    // ─────────────────────────────────────────────────────────────────────────────

    /// Prices a purchase without reserving anything.
    pub fn quote(&self, batches: i64) -> Result<QuoteResponse, AppError> {
        let quote = self.config.sale.quote(batches)?;
        Ok(QuoteResponse {
            batch_count: quote.batch_count,
            sats_per_batch: self.config.sale.sats_per_batch.get(),
            total_sats: quote.total_sats.get(),
            total_tokens: quote.total_tokens,
            btc: format_btc(quote.total_sats.get()),
            approx_usd: sats_to_fiat(quote.total_sats.get(), FiatCode::USD),
        })
    }

    pub async fn sales_stats(&self) -> Result<SalesStatsResponse, AppError> {
        let stats = self.repo.sales_stats(Utc::now()).await?;
        let params = &self.config.sale;

        Ok(SalesStatsResponse {
            total_batches: params.total_batches,
            batches_sold: stats.batches_sold,
            batches_reserved: stats.batches_reserved,
            batches_remaining: params.remaining_batches(stats.batches_taken()),
            tokens_sold: stats.tokens_sold,
            sats_received: stats.sats_received,
            unique_buyers: stats.unique_buyers,
            percent_sold: stats.percent_sold(params),
            sold_out: stats.is_sold_out(params),
            mint_closed: stats.mint_closed,
            last_sale_at: stats.last_sale_at,
            approx_usd_raised: sats_to_fiat(stats.sats_received, FiatCode::USD),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Invoice Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Creates a Lightning invoice for a batch purchase.
    #[tracing::instrument(skip(self, req), fields(wallet = %req.wallet_address, batches = req.batch_count))]
    pub async fn create_invoice(&self, req: CreateInvoiceRequest) -> Result<Invoice, AppError> {
        let now = Utc::now();

        let wallet_address = req.wallet_address.trim().to_string();
        let rgb_invoice = req.rgb_invoice.trim().to_string();
        validate_wallet_address(&wallet_address)?;
        validate_rgb_invoice(&rgb_invoice)?;
        let email = match req.email.as_deref().map(str::trim) {
            Some(e) if !e.is_empty() => {
                validate_email(e)?;
                Some(e.to_string())
            }
            _ => None,
        };

        let tier = self
            .verify_tier_pass(req.tier_pass.as_deref(), now)?
            .ok_or(DomainError::MintLocked)?;
        validate_batch_count(req.batch_count, Some(tier))?;

        let quote = self.config.sale.quote(req.batch_count)?;

        // Fail fast before asking the gateway for an invoice. The insert re-checks atomically.
        let stats = self.repo.sales_stats(now).await?;
        if stats.mint_closed {
            return Err(DomainError::MintClosed.into());
        }
        let available = self.config.sale.remaining_batches(stats.batches_taken());
        if quote.batch_count > available {
            return Err(DomainError::InsufficientSupply {
                available,
                requested: quote.batch_count,
            }
            .into());
        }

        let expiry_secs = self.config.sale.invoice_expiry.num_seconds();
        let issued = self
            .gateway
            .create_invoice(quote.total_sats, &quote.memo(), expiry_secs)
            .await?;
        validate_lightning_invoice(&issued.payment_request)
            .and_then(|_| validate_payment_hash(&issued.payment_hash))
            .map_err(|e| AppError::BadGateway(e.to_string()))?;

        let new_invoice = NewInvoice {
            id: InvoiceId::new(),
            reference: payment_reference(now, reference_entropy()),
            wallet_address,
            rgb_invoice,
            email,
            tier,
            batch_count: quote.batch_count,
            token_amount: quote.total_tokens,
            amount_sats: quote.total_sats,
            payment_request: issued.payment_request,
            payment_hash: issued.payment_hash,
            created_at: now,
            expires_at: self.config.sale.expiry_from(now),
        };

        let invoice = self
            .repo
            .create_invoice(new_invoice, self.config.sale.total_batches)
            .await?;

        info!(invoice_id = %invoice.id, reference = %invoice.reference, "Invoice created");
        self.notify(&invoice, NotificationKind::InvoiceCreated).await;

        Ok(invoice)
    }

    /// Gets an invoice by ID.
    pub async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, AppError> {
        self.repo
            .get_invoice(id)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| AppError::NotFound(format!("Invoice {}", id))))
    }

    /// Asks the gateway about an invoice and applies whatever changed.
    #[tracing::instrument(skip(self), fields(invoice_id = %id))]
    pub async fn check_payment(&self, id: InvoiceId) -> Result<Invoice, AppError> {
        let invoice = self.get_invoice(id).await?;
        self.reconcile(invoice, Utc::now()).await
    }

    async fn reconcile(&self, invoice: Invoice, now: DateTime<Utc>) -> Result<Invoice, AppError> {
        // Expired invoices are still checked: a late payment is honoured.
        if !matches!(
            invoice.status,
            InvoiceStatus::Pending | InvoiceStatus::Expired
        ) {
            return Ok(invoice);
        }

        match self.gateway.lookup(&invoice.payment_hash).await {
            Ok(PaymentState::Settled { amount_paid_sats }) => {
                if amount_paid_sats < invoice.amount_sats.get() {
                    warn!(
                        invoice_id = %invoice.id,
                        paid = amount_paid_sats,
                        expected = invoice.amount_sats.get(),
                        "Underpaid invoice left unsettled"
                    );
                    return Ok(invoice);
                }
                let id = invoice.id;
                match self.settle(invoice).await? {
                    Some(settled) => Ok(settled),
                    None => self.get_invoice(id).await,
                }
            }
            Ok(PaymentState::Cancelled) => self.cancel(invoice).await,
            Ok(PaymentState::Open) => self.expire_if_overdue(invoice, now).await,
            Err(e) if invoice.is_overdue(now) => {
                warn!(invoice_id = %invoice.id, "Gateway lookup failed for overdue invoice: {}", e);
                self.expire_if_overdue(invoice, now).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn expire_if_overdue(
        &self,
        invoice: Invoice,
        now: DateTime<Utc>,
    ) -> Result<Invoice, AppError> {
        if invoice.status != InvoiceStatus::Pending || !invoice.is_overdue(now) {
            return Ok(invoice);
        }
        match self
            .repo
            .transition(invoice.id, InvoiceStatus::Expired, TransitionUpdate::default())
            .await?
        {
            Some(expired) => {
                info!(invoice_id = %expired.id, "Invoice expired");
                self.notify(&expired, NotificationKind::InvoiceExpired).await;
                Ok(expired)
            }
            None => self.get_invoice(invoice.id).await,
        }
    }

    async fn cancel(&self, invoice: Invoice) -> Result<Invoice, AppError> {
        match self
            .repo
            .transition(invoice.id, InvoiceStatus::Cancelled, TransitionUpdate::default())
            .await?
        {
            Some(cancelled) => {
                info!(invoice_id = %cancelled.id, "Invoice cancelled by gateway");
                self.notify(&cancelled, NotificationKind::PaymentCancelled)
                    .await;
                Ok(cancelled)
            }
            None => self.get_invoice(invoice.id).await,
        }
    }

    /// Handles a payment update pushed by the Lightning gateway.
    ///
    /// `signature` is the `X-Signature` header, checked against the raw body
    /// when a webhook secret is configured.
    #[tracing::instrument(skip(self, signature, body))]
    pub async fn handle_gateway_webhook(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookAck, AppError> {
        if let Some(secret) = &self.config.webhook_secret {
            let valid = signature.is_some_and(|sig| verify_signature(body, sig, secret));
            if !valid {
                warn!("Rejected webhook with missing or invalid signature");
                return Err(AppError::Unauthorized("Invalid webhook signature".into()));
            }
        }

        let event: LightningWebhook = serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("Invalid webhook payload: {}", e)))?;

        let Some(invoice) = self.repo.find_by_payment_hash(&event.payment_hash).await? else {
            info!(payment_hash = %event.payment_hash, "Webhook for unknown payment hash ignored");
            return Ok(WebhookAck {
                received: true,
                outcome: WebhookOutcome::Ignored,
            });
        };

        let outcome = match event.status.to_ascii_lowercase().as_str() {
            "paid" | "settled" => match self.settle(invoice).await? {
                Some(_) => WebhookOutcome::Applied,
                None => WebhookOutcome::AlreadyHandled,
            },
            "cancelled" | "canceled" => {
                let before = invoice.status;
                let after = self.cancel(invoice).await?;
                if before == InvoiceStatus::Pending && after.status == InvoiceStatus::Cancelled {
                    WebhookOutcome::Applied
                } else {
                    WebhookOutcome::AlreadyHandled
                }
            }
            other => {
                debug!(status = other, "Webhook status not acted on");
                WebhookOutcome::Ignored
            }
        };

        Ok(WebhookAck {
            received: true,
            outcome,
        })
    }

    /// Marks an invoice paid and distributes its tokens.
    ///
    /// Returns `None` when another caller already settled it, so exactly one
    /// settlement ever reaches the distributor. A payment that arrives after
    /// expiry is only honoured if the sale still has room for it; otherwise
    /// the invoice is left `refund_due` and nothing is distributed.
    pub async fn settle(&self, invoice: Invoice) -> Result<Option<Invoice>, AppError> {
        let paid_at = Utc::now();
        let total_batches = self.config.sale.total_batches;

        let settled = match invoice.status {
            InvoiceStatus::Pending => match self
                .repo
                .transition(invoice.id, InvoiceStatus::Paid, TransitionUpdate::paid(paid_at))
                .await?
            {
                Some(paid) => Some(paid),
                // Expired between the read and the write.
                None => {
                    self.repo
                        .settle_expired(invoice.id, paid_at, total_batches)
                        .await?
                }
            },
            InvoiceStatus::Expired => {
                self.repo
                    .settle_expired(invoice.id, paid_at, total_batches)
                    .await?
            }
            _ => None,
        };

        let Some(paid) = settled else {
            debug!(invoice_id = %invoice.id, status = %invoice.status, "Settlement already handled");
            return Ok(None);
        };

        if paid.status == InvoiceStatus::RefundDue {
            warn!(
                invoice_id = %paid.id,
                amount = %paid.amount_sats,
                reason = paid.failure_reason.as_deref().unwrap_or_default(),
                "Late payment cannot be honoured, refund due"
            );
            self.notify(&paid, NotificationKind::RefundDue).await;
            return Ok(Some(paid));
        }

        info!(invoice_id = %paid.id, amount = %paid.amount_sats, "Payment confirmed");
        self.notify(&paid, NotificationKind::PaymentConfirmed).await;

        self.distribute(paid).await.map(Some)
    }

    /// Sends the tokens for a paid invoice and records the outcome.
    #[tracing::instrument(skip(self, invoice), fields(invoice_id = %invoice.id, tokens = invoice.token_amount))]
    async fn distribute(&self, invoice: Invoice) -> Result<Invoice, AppError> {
        let distribution = Distribution {
            invoice_id: invoice.id,
            rgb_invoice: invoice.rgb_invoice.clone(),
            token_amount: invoice.token_amount,
        };

        let (to, update, kind) = match self.distributor.distribute(distribution).await {
            Ok(consignment) => {
                info!(transfer_id = %consignment.transfer_id, "Tokens distributed");
                (
                    InvoiceStatus::Delivered,
                    TransitionUpdate::delivered(
                        Utc::now(),
                        consignment.transfer_id,
                        hex::encode(consignment.bytes),
                    ),
                    NotificationKind::TokensDelivered,
                )
            }
            Err(e) => {
                error!("Token distribution failed: {}", e);
                (
                    InvoiceStatus::DistributionFailed,
                    TransitionUpdate::failed(e.to_string()),
                    NotificationKind::DistributionFailed,
                )
            }
        };

        match self.repo.transition(invoice.id, to, update).await? {
            Some(updated) => {
                self.notify(&updated, kind).await;
                Ok(updated)
            }
            None => self.get_invoice(invoice.id).await,
        }
    }

    /// Returns the consignment file for a delivered invoice.
    pub async fn consignment(&self, id: InvoiceId) -> Result<(String, Vec<u8>), AppError> {
        let invoice = self.get_invoice(id).await?;

        let encoded = match (&invoice.status, &invoice.consignment) {
            (InvoiceStatus::Delivered, Some(encoded)) => encoded,
            _ => {
                return Err(AppError::Conflict(format!(
                    "Consignment not available for invoice in status {}",
                    invoice.status
                )));
            }
        };
        let bytes = hex::decode(encoded)
            .map_err(|e| AppError::Internal(format!("Stored consignment is corrupt: {}", e)))?;

        Ok((
            invoice.consignment_filename(self.config.sale.tokens_per_batch),
            bytes,
        ))
    }

    /// Lists a wallet's purchases with totals.
    pub async fn wallet_history(&self, address: &str) -> Result<WalletHistoryResponse, AppError> {
        validate_wallet_address(address)?;

        let invoices = self
            .repo
            .list_invoices(&InvoiceFilter::for_wallet(address))
            .await?;

        let batches_purchased = invoices
            .iter()
            .filter(|i| i.status.is_sold())
            .map(|i| i.batch_count)
            .sum();
        let tokens_delivered = invoices
            .iter()
            .filter(|i| i.status == InvoiceStatus::Delivered)
            .map(|i| i.token_amount)
            .sum();

        Ok(WalletHistoryResponse {
            wallet_address: address.to_string(),
            invoices: invoices.into_iter().map(InvoiceResponse::from).collect(),
            batches_purchased,
            tokens_delivered,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Admin Operations
    // ─────────────────────────────────────────────────────────────────────────────

    pub async fn list_invoices(&self, filter: InvoiceFilter) -> Result<Vec<Invoice>, AppError> {
        self.repo.list_invoices(&filter).await.map_err(Into::into)
    }

    /// Retries distribution for an invoice whose transfer failed.
    #[tracing::instrument(skip(self), fields(invoice_id = %id))]
    pub async fn retry_distribution(&self, id: InvoiceId) -> Result<Invoice, AppError> {
        let invoice = self.get_invoice(id).await?;
        if invoice.status != InvoiceStatus::DistributionFailed {
            return Err(DomainError::InvalidTransition {
                from: invoice.status,
                to: InvoiceStatus::Paid,
            }
            .into());
        }

        let paid = self
            .repo
            .transition(id, InvoiceStatus::Paid, TransitionUpdate::paid(Utc::now()))
            .await?
            .ok_or_else(|| AppError::Conflict("Invoice changed while retrying".into()))?;

        info!("Retrying token distribution");
        self.distribute(paid).await
    }

    /// Records a refund. The payout itself happens outside the service.
    #[tracing::instrument(skip(self, reason), fields(invoice_id = %id))]
    pub async fn refund(&self, id: InvoiceId, reason: &str) -> Result<Invoice, AppError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::BadRequest("Refund reason is required".into()));
        }

        let invoice = self.get_invoice(id).await?;
        if !invoice.status.can_transition_to(InvoiceStatus::Refunded) {
            return Err(DomainError::InvalidTransition {
                from: invoice.status,
                to: InvoiceStatus::Refunded,
            }
            .into());
        }

        let refunded = self
            .repo
            .transition(id, InvoiceStatus::Refunded, TransitionUpdate::refunded(reason))
            .await?
            .ok_or_else(|| AppError::Conflict("Invoice changed while refunding".into()))?;

        warn!(amount = %refunded.amount_sats, "Invoice refunded: {}", reason);
        Ok(refunded)
    }

    /// Bars a wallet from creating invoices. Banning again replaces the reason.
    #[tracing::instrument(skip(self, req))]
    pub async fn ban_wallet(
        &self,
        wallet_address: &str,
        req: BanWalletRequest,
    ) -> Result<BannedWallet, AppError> {
        let wallet_address = wallet_address.trim();
        validate_wallet_address(wallet_address)?;

        let ban = BannedWallet::new(wallet_address, &req.reason, Utc::now())?;
        let ban = self.repo.ban_wallet(ban).await?;
        warn!(reason = %ban.reason, "Wallet banned");
        Ok(ban)
    }

    #[tracing::instrument(skip(self))]
    pub async fn unban_wallet(&self, wallet_address: &str) -> Result<(), AppError> {
        if !self.repo.unban_wallet(wallet_address.trim()).await? {
            return Err(AppError::NotFound(format!(
                "Wallet {} is not banned",
                wallet_address
            )));
        }
        info!("Wallet unbanned");
        Ok(())
    }

    pub async fn list_banned_wallets(&self) -> Result<Vec<BannedWallet>, AppError> {
        self.repo.list_banned_wallets().await.map_err(Into::into)
    }

    /// Renders every invoice created in the window as JSON or CSV.
    pub async fn export_purchases(&self, query: ExportQuery) -> Result<PurchaseExport, AppError> {
        if let (Some(from), Some(to)) = (query.from, query.to) {
            if from > to {
                return Err(AppError::BadRequest(
                    "Export window starts after it ends".into(),
                ));
            }
        }

        let records: Vec<PurchaseRecord> = self
            .repo
            .export_invoices(query.from, query.to)
            .await?
            .into_iter()
            .map(PurchaseRecord::from)
            .collect();
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");

        let export = match query.format.unwrap_or_default() {
            ExportFormat::Json => PurchaseExport {
                content_type: "application/json",
                filename: format!("purchases-{}.json", stamp),
                body: serde_json::to_vec_pretty(&records)
                    .map_err(|e| AppError::Internal(e.to_string()))?,
            },
            ExportFormat::Csv => PurchaseExport {
                content_type: "text/csv; charset=utf-8",
                filename: format!("purchases-{}.csv", stamp),
                body: purchases_csv(&records).into_bytes(),
            },
        };

        info!(count = records.len(), filename = %export.filename, "Purchases exported");
        Ok(export)
    }

    pub async fn set_mint_closed(&self, closed: bool) -> Result<MintStateResponse, AppError> {
        self.repo.set_mint_closed(closed).await?;
        info!(mint_closed = closed, "Mint state changed");
        Ok(MintStateResponse {
            mint_closed: closed,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Background reconciliation
    // ─────────────────────────────────────────────────────────────────────────────

    /// Expires every overdue pending invoice.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Invoice>, AppError> {
        let expired = self.repo.expire_overdue(now).await?;
        for invoice in &expired {
            self.notify(invoice, NotificationKind::InvoiceExpired).await;
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Expired overdue invoices");
        }
        Ok(expired)
    }

    /// Redistributes invoices left in `paid` longer than the grace period,
    /// e.g. after a crash between payment and distribution.
    pub async fn resume_stalled_distributions(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let stalled = self
            .repo
            .claim_stalled_paid(now - self.config.distribution_grace, RECONCILE_BATCH)
            .await?;

        let mut resumed = 0;
        for invoice in stalled {
            let id = invoice.id;
            warn!(invoice_id = %id, paid_at = ?invoice.paid_at, "Resuming stalled distribution");
            match self.distribute(invoice).await {
                Ok(_) => resumed += 1,
                Err(e) => error!(invoice_id = %id, "Stalled distribution failed again: {}", e),
            }
        }
        Ok(resumed)
    }

    /// One watcher pass: expire stale invoices, poll the gateway for the rest,
    /// then pick up distributions that never finished.
    ///
    /// Returns the number of invoices that changed status.
    pub async fn reconcile_pending(&self) -> Result<usize, AppError> {
        let now = Utc::now();
        let mut changed = self.expire_overdue(now).await?.len();
        changed += self.resume_stalled_distributions(now).await?;

        for invoice in self.repo.list_pending(RECONCILE_BATCH).await? {
            let id = invoice.id;
            match self.reconcile(invoice, now).await {
                Ok(updated) if updated.status != InvoiceStatus::Pending => changed += 1,
                Ok(_) => {}
                Err(e) => warn!(invoice_id = %id, "Payment check failed: {}", e),
            }
        }

        Ok(changed)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Notifications
    // ─────────────────────────────────────────────────────────────────────────────

    /// Queues a buyer notification. Buyers without an email get none.
    async fn notify(&self, invoice: &Invoice, kind: NotificationKind) {
        let Some(email) = &invoice.email else {
            return;
        };

        let payload = json!({
            "reference": invoice.reference,
            "status": invoice.status,
            "batch_count": invoice.batch_count,
            "token_amount": invoice.token_amount,
            "amount_sats": invoice.amount_sats.get(),
            "payment_request": invoice.payment_request,
            "expires_at": invoice.expires_at,
            "transfer_id": invoice.transfer_id,
            "failure_reason": invoice.failure_reason,
        });

        if let Err(e) = self
            .repo
            .enqueue_notification(Notification::new(invoice.id, kind, email, payload))
            .await
        {
            warn!(invoice_id = %invoice.id, %kind, "Failed to queue notification: {}", e);
        }
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn purchases_csv(records: &[PurchaseRecord]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for r in records {
        let row = [
            r.reference.clone(),
            r.id.to_string(),
            r.wallet_address.clone(),
            r.email.clone().unwrap_or_default(),
            r.tier.to_string(),
            r.batch_count.to_string(),
            r.token_amount.to_string(),
            r.amount_sats.to_string(),
            r.status.to_string(),
            r.created_at.to_rfc3339(),
            r.paid_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            r.delivered_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            r.transfer_id.clone().unwrap_or_default(),
            r.refund_reason.clone().unwrap_or_default(),
        ];
        let fields: Vec<String> = row.iter().map(|f| csv_field(f)).collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}
