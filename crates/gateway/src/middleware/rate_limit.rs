//! Rate limiting middleware.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use common::{AppError, AppResult, RateLimitConfig};

use crate::state::AppState;

/// Fixed-window request counter.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count a request; returns the count in the window and whether it is allowed.
    async fn hit(&self, identifier: &str, max_requests: u64, window_seconds: u64) -> AppResult<(u64, bool)>;

    /// Check the backend is reachable.
    async fn ping(&self) -> AppResult<()>;

    fn backend(&self) -> &'static str;
}

/// Process-local counters for single-instance deployments and tests.
#[derive(Default)]
pub struct LocalRateLimiter {
    windows: Mutex<HashMap<String, (Instant, u64)>>,
}

impl LocalRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimiter for LocalRateLimiter {
    async fn hit(&self, identifier: &str, max_requests: u64, window_seconds: u64) -> AppResult<(u64, bool)> {
        let now = Instant::now();
        let window = Duration::from_secs(window_seconds);
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| AppError::internal("rate limiter lock poisoned"))?;

        let entry = windows.entry(identifier.to_string()).or_insert((now, 0));
        if now.duration_since(entry.0) >= window {
            *entry = (now, 0);
        }
        entry.1 += 1;

        Ok((entry.1, entry.1 <= max_requests))
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Rate limit middleware for authenticated endpoints.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let limits = state.config.rate_limit.clone();
    rate_limit_internal(state, connect_info, request, next, limits).await
}

/// Rate limit middleware for auth endpoints (stricter).
pub async fn rate_limit_auth_middleware(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let limits = state.config.auth_rate_limit.clone();
    rate_limit_internal(state, connect_info, request, next, limits).await
}

async fn rate_limit_internal(
    state: AppState,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
    limits: RateLimitConfig,
) -> Response {
    let ip = get_client_ip(&request, connect_info);
    let identifier = format!("{}:{}", request.uri().path(), ip);

    let (count, allowed) = match state
        .limiter
        .hit(&identifier, limits.max_requests, limits.window_seconds)
        .await
    {
        Ok(result) => result,
        Err(e) => {
            // Fail closed
            warn!(backend = state.limiter.backend(), error = %e, "Rate limiter unavailable");
            return rate_limit_exceeded_response(&limits);
        }
    };

    if !allowed {
        return rate_limit_exceeded_response(&limits);
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(limits.max_requests));
    headers.insert(
        "X-RateLimit-Remaining",
        HeaderValue::from(limits.max_requests.saturating_sub(count)),
    );

    response
}

fn get_client_ip(request: &Request<Body>, connect_info: Option<ConnectInfo<SocketAddr>>) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
    {
        if let Some(ip) = forwarded.split(',').next() {
            return ip.trim().to_string();
        }
    }

    if let Some(real_ip) = request
        .headers()
        .get("X-Real-IP")
        .and_then(|h| h.to_str().ok())
    {
        return real_ip.to_string();
    }

    connect_info
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn rate_limit_exceeded_response(limits: &RateLimitConfig) -> Response {
    let mut response = AppError::TooManyRequests.into_response();

    let headers = response.headers_mut();
    headers.insert("Retry-After", HeaderValue::from(limits.window_seconds));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
    headers.insert("X-RateLimit-Limit", HeaderValue::from(limits.max_requests));

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn local_limiter_counts_per_identifier() {
        let limiter = LocalRateLimiter::new();
        assert_eq!(limiter.hit("a", 2, 60).await.unwrap(), (1, true));
        assert_eq!(limiter.hit("a", 2, 60).await.unwrap(), (2, true));
        assert_eq!(limiter.hit("a", 2, 60).await.unwrap(), (3, false));
        assert_eq!(limiter.hit("b", 2, 60).await.unwrap(), (1, true));
    }

    #[tokio::test]
    async fn local_limiter_resets_after_window() {
        let limiter = LocalRateLimiter::new();
        limiter.hit("a", 1, 0).await.unwrap();
        assert_eq!(limiter.hit("a", 1, 0).await.unwrap(), (1, true));
        assert_ok!(limiter.ping().await);
    }
}
