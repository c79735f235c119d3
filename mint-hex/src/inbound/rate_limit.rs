//! Rate limiting middleware using Governor.
//!
//! Implements per-client rate limiting with a token bucket algorithm.
//! Admin callers are keyed by the API key the auth layer verified, everyone
//! else by the forwarded client address. An unverified Authorization header
//! never picks the bucket.

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use serde_json::json;
use std::{num::NonZeroU32, sync::Arc, time::Duration};

use super::auth::AuthenticatedKey;

/// Rate limiter state shared across requests.
pub struct RateLimiterState {
    /// Per-key rate limiters
    limiters: DashMap<String, Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>>,
    /// Default quota for new keys
    quota: Quota,
}

impl Default for RateLimiterState {
    fn default() -> Self {
        Self::new(100, Duration::from_secs(60))
    }
}

impl RateLimiterState {
    /// Creates a new rate limiter state.
    ///
    /// `requests` is the burst allowed per `period`; zero is treated as one.
    pub fn new(requests: u32, period: Duration) -> Self {
        let burst = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(period / burst.get())
            .unwrap_or_else(|| Quota::per_minute(burst))
            .allow_burst(burst);

        Self {
            limiters: DashMap::new(),
            quota,
        }
    }

    /// Returns true if the request is allowed, false if rate limited.
    pub fn check(&self, key: &str) -> bool {
        let limiter = self
            .limiters
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::direct(self.quota)));

        limiter.check().is_ok()
    }
}

/// First address in `x-forwarded-for`, as set by the reverse proxy.
pub(crate) fn client_address(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

/// Picks the bucket a request is counted against.
fn client_key(request: &Request<Body>) -> String {
    if let Some(AuthenticatedKey(id)) = request.extensions().get::<AuthenticatedKey>() {
        return format!("key:{}", id);
    }
    client_address(request.headers()).unwrap_or_else(|| "anonymous".to_string())
}

/// Rate limiting middleware.
///
/// Health checks and gateway webhooks are never limited.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if path == "/health" || path.starts_with("/webhooks/") {
        return next.run(request).await;
    }

    let key = client_key(&request);

    if !limiter.check(&key) {
        tracing::warn!(client = %key, "Rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "Rate limit exceeded. Please try again later.",
                "retry_after_seconds": 60
            })),
        )
            .into_response();
    }

    next.run(request).await
}
