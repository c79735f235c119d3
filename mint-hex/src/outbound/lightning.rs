//! Lightning payment gateway adapters.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use mint_types::{GatewayError, GatewayInvoice, PaymentGateway, PaymentState, Sats};

// ─────────────────────────────────────────────────────────────────────────────
// LND REST
// ─────────────────────────────────────────────────────────────────────────────

/// Talks to an LND node over its REST proxy.
pub struct LndGateway {
    client: reqwest::Client,
    base_url: String,
    macaroon_hex: String,
}

#[derive(Debug, Deserialize)]
struct AddInvoiceResponse {
    payment_request: String,
}

#[derive(Debug, Deserialize)]
struct PayReqResponse {
    payment_hash: String,
}

#[derive(Debug, Deserialize)]
struct LookupInvoiceResponse {
    #[serde(default)]
    state: String,
    /// LND encodes int64 fields as JSON strings
    #[serde(default)]
    amt_paid_sat: Option<String>,
}

impl LndGateway {
    pub fn new(
        base_url: impl Into<String>,
        macaroon_hex: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            macaroon_hex: macaroon_hex.into(),
        })
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, GatewayError> {
        let resp = request
            .header("Grpc-Metadata-macaroon", &self.macaroon_hex)
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected(format!("HTTP {}: {}", status, body)));
        }

        resp.json::<T>()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for LndGateway {
    #[tracing::instrument(skip(self, memo), fields(amount = %amount))]
    async fn create_invoice(
        &self,
        amount: Sats,
        memo: &str,
        expiry_secs: i64,
    ) -> Result<GatewayInvoice, GatewayError> {
        let created: AddInvoiceResponse = self
            .send(
                self.client
                    .post(format!("{}/v1/invoices", self.base_url))
                    .json(&serde_json::json!({
                        "value": amount.get().to_string(),
                        "memo": memo,
                        "expiry": expiry_secs.to_string(),
                    })),
            )
            .await?;

        // The add-invoice reply carries the hash as base64; the decoded request gives it in hex.
        let decoded: PayReqResponse = self
            .send(self.client.get(format!(
                "{}/v1/payreq/{}",
                self.base_url, created.payment_request
            )))
            .await?;

        Ok(GatewayInvoice {
            payment_request: created.payment_request,
            payment_hash: decoded.payment_hash,
        })
    }

    async fn lookup(&self, payment_hash: &str) -> Result<PaymentState, GatewayError> {
        let invoice: LookupInvoiceResponse = self
            .send(
                self.client
                    .get(format!("{}/v1/invoice/{}", self.base_url, payment_hash)),
            )
            .await?;

        match invoice.state.as_str() {
            "SETTLED" => {
                let amount_paid_sats = invoice
                    .amt_paid_sat
                    .as_deref()
                    .unwrap_or("0")
                    .parse::<i64>()
                    .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
                Ok(PaymentState::Settled { amount_paid_sats })
            }
            "CANCELED" => Ok(PaymentState::Cancelled),
            // ACCEPTED is a held HTLC, not yet settled
            "OPEN" | "ACCEPTED" => Ok(PaymentState::Open),
            other => Err(GatewayError::InvalidResponse(format!(
                "Unknown invoice state: {}",
                other
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory mock
// ─────────────────────────────────────────────────────────────────────────────

/// How long the mock remembers an invoice after it expires.
pub const DEFAULT_MOCK_RETENTION: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
struct MockInvoice {
    amount_sats: i64,
    issued_at: Instant,
    expires_at: Instant,
    settled: bool,
    cancelled: bool,
}

/// In-memory gateway for development and tests.
///
/// Invoices settle on their own once `settle_after` has elapsed since issue,
/// or immediately through [`MockGateway::settle`]. Invoices are forgotten
/// `retention` after their expiry, so a long-running dev server stays bounded.
pub struct MockGateway {
    invoices: DashMap<String, MockInvoice>,
    settle_after: Option<Duration>,
    retention: Duration,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self {
            invoices: DashMap::new(),
            settle_after: None,
            retention: DEFAULT_MOCK_RETENTION,
        }
    }
}

impl MockGateway {
    /// A gateway whose invoices only settle when told to.
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway that reports every invoice paid once `delay` has passed.
    pub fn settling_after(delay: Duration) -> Self {
        Self {
            settle_after: Some(delay),
            ..Self::default()
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    fn prune(&self, now: Instant) {
        let retention = self.retention;
        self.invoices
            .retain(|_, invoice| now < invoice.expires_at + retention);
    }

    /// Marks an invoice as paid. Returns false for unknown hashes.
    pub fn settle(&self, payment_hash: &str) -> bool {
        match self.invoices.get_mut(payment_hash) {
            Some(mut invoice) => {
                invoice.settled = true;
                true
            }
            None => false,
        }
    }

    pub fn cancel(&self, payment_hash: &str) -> bool {
        match self.invoices.get_mut(payment_hash) {
            Some(mut invoice) => {
                invoice.cancelled = true;
                true
            }
            None => false,
        }
    }

    pub fn invoice_count(&self) -> usize {
        self.invoices.len()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_invoice(
        &self,
        amount: Sats,
        _memo: &str,
        expiry_secs: i64,
    ) -> Result<GatewayInvoice, GatewayError> {
        let now = Instant::now();
        self.prune(now);

        let mut preimage = [0u8; 32];
        rand::rng().fill_bytes(&mut preimage);
        let payment_hash = hex::encode(Sha256::digest(preimage));

        // BOLT11 amounts are written in nano-BTC; 1 sat = 10n
        let payment_request = format!(
            "lnbc{}n1pmock{}",
            amount.get() * 10,
            &payment_hash[..40]
        );

        self.invoices.insert(
            payment_hash.clone(),
            MockInvoice {
                amount_sats: amount.get(),
                issued_at: now,
                expires_at: now + Duration::from_secs(expiry_secs.max(0) as u64),
                settled: false,
                cancelled: false,
            },
        );

        Ok(GatewayInvoice {
            payment_request,
            payment_hash,
        })
    }

    async fn lookup(&self, payment_hash: &str) -> Result<PaymentState, GatewayError> {
        let invoice = self
            .invoices
            .get(payment_hash)
            .ok_or(GatewayError::NotFound)?;

        if invoice.cancelled {
            return Ok(PaymentState::Cancelled);
        }
        let auto_settled = self
            .settle_after
            .is_some_and(|delay| invoice.issued_at.elapsed() >= delay);
        if invoice.settled || auto_settled {
            return Ok(PaymentState::Settled {
                amount_paid_sats: invoice.amount_sats,
            });
        }
        Ok(PaymentState::Open)
    }
}
