//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use utoipa::OpenApi;

use mint_types::{
    ApiKeyId, AppError, BanWalletRequest, CreateInvoiceRequest, ExportQuery, InvoiceFilter,
    InvoiceId, InvoiceRepository, InvoiceResponse, LeaderboardQuery, QuoteQuery, RefundRequest,
    ScoreSubmission,
};

use super::extract::{ApiJson, ApiQuery};
use super::rate_limit::client_address;
use crate::MintService;
use crate::openapi::ApiDoc;

/// Header carrying the gateway's HMAC of the webhook body.
pub const WEBHOOK_SIGNATURE_HEADER: &str = "X-Signature";

/// Application state shared across handlers.
pub struct AppState<R: InvoiceRepository> {
    pub service: Arc<MintService<R>>,
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, msg.clone()),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
            "code": status.as_u16()
        });

        (status, Json(body)).into_response()
    }
}

fn parse_invoice_id(id: &str) -> Result<InvoiceId, ApiError> {
    id.parse()
        .map_err(|_| AppError::BadRequest("Invalid invoice ID".into()).into())
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// OpenAPI document.
pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// ─────────────────────────────────────────────────────────────────────────────
// Game and sale
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state, headers, req), fields(session_id = %req.session_id))]
pub async fn submit_score<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<ScoreSubmission>,
) -> Result<impl IntoResponse, ApiError> {
    let pass = state
        .service
        .submit_score(req, client_address(&headers))
        .await?;
    Ok((StatusCode::CREATED, Json(pass)))
}

pub async fn leaderboard<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
    ApiQuery(query): ApiQuery<LeaderboardQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.leaderboard(query).await?))
}

pub async fn quote<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
    ApiQuery(query): ApiQuery<QuoteQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let quote = state.service.quote(query.batches)?;
    Ok(Json(quote))
}

#[tracing::instrument(skip(state))]
pub async fn sales_stats<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state.service.sales_stats().await?;
    Ok(Json(stats))
}

// ─────────────────────────────────────────────────────────────────────────────
// Invoices
// ─────────────────────────────────────────────────────────────────────────────

/// Create a purchase invoice.
#[tracing::instrument(skip(state, req), fields(wallet = %req.wallet_address, batches = req.batch_count))]
pub async fn create_invoice<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
    ApiJson(req): ApiJson<CreateInvoiceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invoice = state.service.create_invoice(req).await?;
    Ok((StatusCode::CREATED, Json(InvoiceResponse::from(invoice))))
}

/// Get invoice by ID.
#[tracing::instrument(skip(state), fields(invoice_id = %id))]
pub async fn get_invoice<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let invoice_id = parse_invoice_id(&id)?;
    let invoice = state.service.get_invoice(invoice_id).await?;
    Ok(Json(InvoiceResponse::from(invoice)))
}

/// Ask the gateway for the latest payment state.
#[tracing::instrument(skip(state), fields(invoice_id = %id))]
pub async fn check_invoice<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let invoice_id = parse_invoice_id(&id)?;
    let invoice = state.service.check_payment(invoice_id).await?;
    Ok(Json(InvoiceResponse::from(invoice)))
}

/// Download the RGB consignment of a delivered invoice.
#[tracing::instrument(skip(state), fields(invoice_id = %id))]
pub async fn download_consignment<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let invoice_id = parse_invoice_id(&id)?;
    let (filename, bytes) = state.service.consignment(invoice_id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    ))
}

#[tracing::instrument(skip(state), fields(wallet = %address))]
pub async fn wallet_invoices<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(address): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let history = state.service.wallet_history(&address).await?;
    Ok(Json(history))
}

/// Payment update from the Lightning gateway.
///
/// The raw body is kept so the signature can be checked before parsing.
#[tracing::instrument(skip(state, headers, body))]
pub async fn lightning_webhook<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let ack = state
        .service
        .handle_gateway_webhook(signature, &body)
        .await?;
    Ok(Json(ack))
}

// ─────────────────────────────────────────────────────────────────────────────
// Admin
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state))]
pub async fn admin_list_invoices<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
    ApiQuery(filter): ApiQuery<InvoiceFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let invoices = state.service.list_invoices(filter).await?;
    let response: Vec<InvoiceResponse> = invoices.into_iter().map(Into::into).collect();
    Ok(Json(response))
}

#[tracing::instrument(skip(state), fields(invoice_id = %id))]
pub async fn admin_retry_distribution<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let invoice_id = parse_invoice_id(&id)?;
    let invoice = state.service.retry_distribution(invoice_id).await?;
    Ok(Json(InvoiceResponse::from(invoice)))
}

#[tracing::instrument(skip(state, req), fields(invoice_id = %id))]
pub async fn admin_refund<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<RefundRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invoice_id = parse_invoice_id(&id)?;
    let invoice = state.service.refund(invoice_id, &req.reason).await?;
    Ok(Json(InvoiceResponse::from(invoice)))
}

#[tracing::instrument(skip(state, req), fields(wallet = %address))]
pub async fn admin_ban_wallet<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(address): Path<String>,
    ApiJson(req): ApiJson<BanWalletRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ban = state.service.ban_wallet(&address, req).await?;
    Ok(Json(ban))
}

#[tracing::instrument(skip(state), fields(wallet = %address))]
pub async fn admin_unban_wallet<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(address): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.unban_wallet(&address).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn admin_list_banned_wallets<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.list_banned_wallets().await?))
}

/// Download every purchase in the window as JSON or CSV.
#[tracing::instrument(skip(state))]
pub async fn admin_export_purchases<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
    ApiQuery(query): ApiQuery<ExportQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let export = state.service.export_purchases(query).await?;

    Ok((
        [
            (header::CONTENT_TYPE, export.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export.filename),
            ),
        ],
        export.body,
    ))
}

pub async fn admin_close_mint<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.set_mint_closed(true).await?))
}

pub async fn admin_open_mint<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.set_mint_closed(false).await?))
}

// ─────────────────────────────────────────────────────────────────────────────
// API Key Management
// ─────────────────────────────────────────────────────────────────────────────

/// Bootstrap endpoint - creates the first API key.
///
/// This endpoint only works when there are NO existing API keys in the system.
/// It returns the raw API key (only shown once) that should be saved securely.
#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct BootstrapRequest {
    /// Name for the API key
    #[schema(example = "mint-admin")]
    pub name: String,
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct BootstrapResponse {
    /// The generated API key (shown only once)
    #[schema(example = "sk_abc123xyz...")]
    pub api_key: String,
    /// Informational message
    pub message: String,
}

#[tracing::instrument(skip(state), fields(key_name = %req.name))]
pub async fn bootstrap<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
    ApiJson(req): ApiJson<BootstrapRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let key_count = state
        .service
        .repo()
        .count_api_keys()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    if key_count > 0 {
        return Err(AppError::BadRequest(
            "Bootstrap not allowed: API keys already exist. Use an existing key to create new ones.".into()
        ).into());
    }

    let (_api_key, raw_key) = state
        .service
        .repo()
        .create_api_key(&req.name)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(BootstrapResponse {
            api_key: raw_key,
            message: "First API key created. Save this key securely - it won't be shown again!"
                .into(),
        }),
    ))
}

/// Request to create a new API key.
#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct CreateApiKeyRequest {
    /// Name for the API key
    #[schema(example = "ops-dashboard")]
    pub name: String,
}

/// Response containing API key info (without the raw key).
#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ApiKeyInfo {
    pub id: ApiKeyId,
    pub name: String,
    pub is_active: bool,
    /// When the key was created (ISO 8601)
    #[schema(value_type = String, example = "2024-01-01T00:00:00Z")]
    pub created_at: String,
    /// When the key was last used (ISO 8601)
    #[schema(value_type = Option<String>)]
    pub last_used_at: Option<String>,
}

/// Create a new API key (requires authentication).
#[tracing::instrument(skip(state), fields(key_name = %req.name))]
pub async fn create_api_key<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
    ApiJson(req): ApiJson<CreateApiKeyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() {
        return Err(AppError::BadRequest("API key name cannot be empty".into()).into());
    }

    let (_api_key, raw_key) = state
        .service
        .repo()
        .create_api_key(&req.name)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(BootstrapResponse {
            api_key: raw_key,
            message: "API key created. Save this key securely - it won't be shown again!".into(),
        }),
    ))
}

/// List all active API keys (without exposing raw keys).
#[tracing::instrument(skip(state))]
pub async fn list_api_keys<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
) -> Result<impl IntoResponse, ApiError> {
    let keys = state
        .service
        .repo()
        .list_api_keys()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let response: Vec<ApiKeyInfo> = keys
        .into_iter()
        .map(|k| ApiKeyInfo {
            id: k.id,
            name: k.name,
            is_active: k.is_active,
            created_at: k.created_at.to_rfc3339(),
            last_used_at: k.last_used_at.map(|dt| dt.to_rfc3339()),
        })
        .collect();

    Ok(Json(response))
}

/// Delete (deactivate) an API key.
#[tracing::instrument(skip(state), fields(key_id = %id))]
pub async fn delete_api_key<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let key_id: ApiKeyId = id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid API key ID".into()))?;

    let deleted = state
        .service
        .repo()
        .delete_api_key(key_id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    if deleted {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(AppError::NotFound("API key not found".into()).into())
    }
}
