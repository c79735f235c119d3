//! Authentication middleware for the admin surface.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use mint_types::{ApiKeyId, InvoiceRepository};

use super::handlers::AppState;

/// Set on requests whose API key the middleware verified.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AuthenticatedKey(pub ApiKeyId);

/// Extracts the API key from the Authorization header.
/// Expected format: "Bearer <api_key>" or just "<api_key>"
fn extract_api_key(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;
    Some(header.strip_prefix("Bearer ").unwrap_or(header))
}

/// Whether a request needs an API key.
///
/// Buyers, the game and the gateway webhook are anonymous. Only key
/// management and `/api/admin` are protected, and the bootstrap call
/// guards itself.
fn requires_api_key(method: &Method, path: &str) -> bool {
    if path == "/api/bootstrap" && method == Method::POST {
        return false;
    }
    path.starts_with("/api/admin") || path.starts_with("/api/keys")
}

/// Authentication middleware that validates API keys.
///
/// Hashes the presented key with SHA-256 and looks the hash up in the
/// repository. Missing, unknown or revoked keys get a 401.
pub async fn auth_middleware<R: InvoiceRepository>(
    State(state): State<Arc<AppState<R>>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if !requires_api_key(request.method(), request.uri().path()) {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    let api_key = match extract_api_key(auth_header) {
        Some(key) if !key.is_empty() => key,
        _ => {
            return unauthorized_response("Missing or invalid Authorization header");
        }
    };

    let key_hash = mint_repo::security::hash_api_key(api_key);

    match state.service.repo().verify_api_key_hash(&key_hash).await {
        Ok(Some(key)) => {
            tracing::debug!(key_name = %key.name, "Admin request authenticated");
            request.extensions_mut().insert(AuthenticatedKey(key.id));
            next.run(request).await
        }
        Ok(None) => unauthorized_response("Invalid API key"),
        Err(e) => {
            tracing::error!("API key verification failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Internal server error",
                    "code": 500
                })),
            )
                .into_response()
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": message,
            "code": 401
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_api_key_bearer() {
        assert_eq!(
            extract_api_key(Some("Bearer sk_test_123")),
            Some("sk_test_123")
        );
    }

    #[test]
    fn test_extract_api_key_raw() {
        assert_eq!(extract_api_key(Some("sk_test_123")), Some("sk_test_123"));
    }

    #[test]
    fn test_extract_api_key_none() {
        assert_eq!(extract_api_key(None), None);
    }

    #[test]
    fn test_public_routes_skip_auth() {
        assert!(!requires_api_key(&Method::POST, "/api/invoices"));
        assert!(!requires_api_key(&Method::GET, "/api/sale/stats"));
        assert!(!requires_api_key(&Method::POST, "/webhooks/lightning"));
        assert!(!requires_api_key(&Method::POST, "/api/bootstrap"));
    }

    #[test]
    fn test_admin_routes_need_key() {
        assert!(requires_api_key(&Method::GET, "/api/admin/invoices"));
        assert!(requires_api_key(&Method::POST, "/api/admin/mint/close"));
        assert!(requires_api_key(&Method::GET, "/api/keys"));
        assert!(requires_api_key(&Method::DELETE, "/api/keys/abc"));
    }
}
