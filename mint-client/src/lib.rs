//! # Mint Client SDK
//!
//! A typed Rust client for the LIGHTCAT mint API.

use mint_types::{
    BanWalletRequest, BannedWallet, CreateInvoiceRequest, ExportQuery, InvoiceFilter, InvoiceId,
    InvoiceResponse, LeaderboardQuery, LeaderboardResponse, MintStateResponse, QuoteResponse,
    RefundRequest, SalesStatsResponse, ScoreSubmission, TierPassResponse, WalletHistoryResponse,
};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// An admin API key as listed by the server. The raw key is never returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeySummary {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

#[derive(Deserialize)]
struct KeyCreated {
    api_key: String,
}

/// Mint API client.
pub struct MintClient {
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

impl MintClient {
    /// Creates a new client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            http: Client::new(),
        }
    }

    /// Sets the API key used for admin endpoints.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Checks if the API is healthy.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Buyer
    // ─────────────────────────────────────────────────────────────────────────

    /// Submits a finished game and returns the tier pass.
    pub async fn submit_score(
        &self,
        session_id: &str,
        score: u32,
        duration_secs: u32,
    ) -> Result<TierPassResponse, ClientError> {
        let req = ScoreSubmission {
            session_id: session_id.to_string(),
            score,
            duration_secs,
        };
        self.post("/api/game/score", &req).await
    }

    pub async fn leaderboard(
        &self,
        query: &LeaderboardQuery,
    ) -> Result<LeaderboardResponse, ClientError> {
        let req = self
            .http
            .get(format!("{}/api/game/leaderboard", self.base_url))
            .query(query);
        self.send(req).await
    }

    pub async fn quote(&self, batches: i64) -> Result<QuoteResponse, ClientError> {
        self.get(&format!("/api/sale/quote?batches={}", batches))
            .await
    }

    pub async fn sales_stats(&self) -> Result<SalesStatsResponse, ClientError> {
        self.get("/api/sale/stats").await
    }

    /// Creates a purchase invoice.
    pub async fn create_invoice(
        &self,
        req: &CreateInvoiceRequest,
    ) -> Result<InvoiceResponse, ClientError> {
        self.post("/api/invoices", req).await
    }

    pub async fn get_invoice(&self, id: InvoiceId) -> Result<InvoiceResponse, ClientError> {
        self.get(&format!("/api/invoices/{}", id)).await
    }

    /// Asks the server to poll the gateway for this invoice.
    pub async fn check_invoice(&self, id: InvoiceId) -> Result<InvoiceResponse, ClientError> {
        self.post(&format!("/api/invoices/{}/check", id), &serde_json::json!({}))
            .await
    }

    /// Downloads the RGB consignment of a delivered invoice.
    pub async fn download_consignment(&self, id: InvoiceId) -> Result<Vec<u8>, ClientError> {
        let req = self
            .http
            .get(format!("{}/api/invoices/{}/consignment", self.base_url, id));
        self.download(req).await
    }

    pub async fn wallet_invoices(
        &self,
        address: &str,
    ) -> Result<WalletHistoryResponse, ClientError> {
        self.get(&format!("/api/wallets/{}/invoices", address))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Admin
    // ─────────────────────────────────────────────────────────────────────────

    /// Creates the first API key. Only works on a server with no keys.
    pub async fn bootstrap(&self, name: &str) -> Result<String, ClientError> {
        let created: KeyCreated = self
            .post("/api/bootstrap", &serde_json::json!({ "name": name }))
            .await?;
        Ok(created.api_key)
    }

    pub async fn create_api_key(&self, name: &str) -> Result<String, ClientError> {
        let created: KeyCreated = self
            .post("/api/keys", &serde_json::json!({ "name": name }))
            .await?;
        Ok(created.api_key)
    }

    pub async fn list_api_keys(&self) -> Result<Vec<ApiKeySummary>, ClientError> {
        self.get("/api/keys").await
    }

    pub async fn delete_api_key(&self, id: &str) -> Result<(), ClientError> {
        self.delete(&format!("/api/keys/{}", id)).await
    }

    pub async fn list_invoices(
        &self,
        filter: &InvoiceFilter,
    ) -> Result<Vec<InvoiceResponse>, ClientError> {
        let req = self
            .http
            .get(format!("{}/api/admin/invoices", self.base_url))
            .query(filter);
        self.send(req).await
    }

    pub async fn retry_distribution(&self, id: InvoiceId) -> Result<InvoiceResponse, ClientError> {
        self.post(
            &format!("/api/admin/invoices/{}/retry", id),
            &serde_json::json!({}),
        )
        .await
    }

    pub async fn refund(&self, id: InvoiceId, reason: &str) -> Result<InvoiceResponse, ClientError> {
        let req = RefundRequest {
            reason: reason.to_string(),
        };
        self.post(&format!("/api/admin/invoices/{}/refund", id), &req)
            .await
    }

    pub async fn ban_wallet(
        &self,
        address: &str,
        reason: &str,
    ) -> Result<BannedWallet, ClientError> {
        let req = BanWalletRequest {
            reason: reason.to_string(),
        };
        self.post(&format!("/api/admin/wallets/{}/ban", address), &req)
            .await
    }

    pub async fn unban_wallet(&self, address: &str) -> Result<(), ClientError> {
        self.delete(&format!("/api/admin/wallets/{}/ban", address))
            .await
    }

    pub async fn list_banned_wallets(&self) -> Result<Vec<BannedWallet>, ClientError> {
        self.get("/api/admin/wallets/banned").await
    }

    /// Purchase export in the requested format, as the server rendered it.
    pub async fn export_purchases(&self, query: &ExportQuery) -> Result<Vec<u8>, ClientError> {
        let req = self
            .http
            .get(format!("{}/api/admin/export/purchases", self.base_url))
            .query(query);
        self.download(req).await
    }

    pub async fn close_mint(&self) -> Result<MintStateResponse, ClientError> {
        self.post("/api/admin/mint/close", &serde_json::json!({}))
            .await
    }

    pub async fn open_mint(&self) -> Result<MintStateResponse, ClientError> {
        self.post("/api/admin/mint/open", &serde_json::json!({}))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Plumbing
    // ─────────────────────────────────────────────────────────────────────────

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let req = self.http.get(format!("{}{}", self.base_url, path));
        self.send(req).await
    }

    async fn post<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let req = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body);
        self.send(req).await
    }

    async fn delete(&self, path: &str) -> Result<(), ClientError> {
        let resp = self
            .authorize(self.http.delete(format!("{}{}", self.base_url, path)))
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(Self::api_error(resp).await)
        }
    }

    /// Raw response body, for consignments and exports.
    async fn download(&self, req: RequestBuilder) -> Result<Vec<u8>, ClientError> {
        let resp = self.authorize(req).send().await?;
        if resp.status().is_success() {
            Ok(resp.bytes().await?.to_vec())
        } else {
            Err(Self::api_error(resp).await)
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let resp = self.authorize(req).send().await?;
        self.handle_response(resp).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, ClientError> {
        if resp.status().is_success() {
            let body = resp.text().await?;
            Ok(serde_json::from_str(&body)?)
        } else {
            Err(Self::api_error(resp).await)
        }
    }

    async fn api_error(resp: reqwest::Response) -> ClientError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
            .unwrap_or(body);
        ClientError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = MintClient::new("http://localhost:3000");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_client_with_trailing_slash() {
        let client = MintClient::new("http://localhost:3000/");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_client_with_api_key() {
        let client = MintClient::new("http://localhost:3000").with_api_key("test-key");
        assert_eq!(client.api_key, Some("test-key".to_string()));
    }

    #[test]
    fn test_authorize_adds_bearer_header() {
        let client = MintClient::new("http://localhost:3000").with_api_key("sk_abc");
        let req = client
            .authorize(client.http.get("http://localhost:3000/api/keys"))
            .build()
            .unwrap();
        assert_eq!(req.headers()["authorization"], "Bearer sk_abc");

        let anonymous = MintClient::new("http://localhost:3000");
        let req = anonymous
            .authorize(anonymous.http.get("http://localhost:3000/health"))
            .build()
            .unwrap();
        assert!(req.headers().get("authorization").is_none());
    }

    #[test]
    fn test_query_structs_encode_as_query_string() {
        let client = MintClient::new("http://localhost:3000");
        let req = client
            .http
            .get("http://localhost:3000/api/game/leaderboard")
            .query(&LeaderboardQuery {
                period: Some(mint_types::LeaderboardPeriod::AllTime),
                limit: Some(5),
            })
            .build()
            .unwrap();
        assert_eq!(req.url().query(), Some("period=all_time&limit=5"));

        let req = client
            .http
            .get("http://localhost:3000/api/admin/export/purchases")
            .query(&ExportQuery {
                format: Some(mint_types::ExportFormat::Csv),
                ..Default::default()
            })
            .build()
            .unwrap();
        assert_eq!(req.url().query(), Some("format=csv"));
    }
}
