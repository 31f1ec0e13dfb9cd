//! Per-client fixed-window rate limiting
//!
//! Runs at the edge before authentication, so unauthenticated flooding
//! is capped too. Fixed windows, not sliding: a client can burst up to
//! the limit at the end of one window and again at the start of the
//! next. That boundary burst is an accepted trade-off of the scheme.
//!
//! The check-reset-increment sequence for one client key runs under
//! that key's map entry guard, so two concurrent requests can never
//! both claim the last slot, and a window reset can never lose an
//! increment.

use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;

use crate::{error::ErrorBody, middleware::correlation_id};

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RETRY_AFTER_HEADER: &str = "retry-after";

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests admitted per window per client key.
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
    /// Map size past which an insert of a new key triggers eviction of
    /// idle entries.
    pub evict_threshold: usize,
    /// Entries idle for this many windows past their reset are evicted.
    pub max_idle_windows: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
            evict_threshold: 1024,
            max_idle_windows: 2,
        }
    }
}

#[derive(Debug)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// Verdict for a single request against its client's window.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the window resets, rounded up. Meaningful as a
    /// retry hint only when `allowed` is false.
    pub retry_after_secs: u64,
}

/// Concurrent fixed-window counter keyed by client.
///
/// Keys are created lazily on first sight and evicted once idle past
/// the configured horizon, keeping the map bounded under churn of
/// distinct clients.
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count one request for `key` and decide whether it is admitted.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        let now = Instant::now();
        let is_new = !self.windows.contains_key(key);

        let decision = {
            let mut entry = self
                .windows
                .entry(key.to_string())
                .or_insert_with(|| Window {
                    count: 0,
                    reset_at: now + self.config.window,
                });
            let window = entry.value_mut();

            if now >= window.reset_at {
                window.count = 0;
                window.reset_at = now + self.config.window;
            }

            window.count += 1;

            RateLimitDecision {
                allowed: window.count <= self.config.max_requests,
                limit: self.config.max_requests,
                remaining: self.config.max_requests.saturating_sub(window.count),
                retry_after_secs: secs_until(window.reset_at, now),
            }
        };

        if is_new && self.windows.len() > self.config.evict_threshold {
            self.evict_idle(now);
        }

        decision
    }

    /// Number of client keys currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    fn evict_idle(&self, now: Instant) {
        let horizon = self.config.window * self.config.max_idle_windows;
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.reset_at) < horizon);
        let evicted = before - self.windows.len();
        if evicted > 0 {
            tracing::debug!(evicted, "evicted idle rate-limit windows");
        }
    }
}

fn secs_until(deadline: Instant, now: Instant) -> u64 {
    let remaining = deadline.saturating_duration_since(now);
    let secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 { secs + 1 } else { secs }
}

#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
}

/// Edge middleware applying the limiter to every inbound request.
///
/// Admitted requests continue with quota headers attached to the
/// response; rejected ones answer immediately with 429 and a
/// retry-after hint, and are never forwarded.
pub async fn rate_limit(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(&request);
    let decision = state.limiter.check(&key);

    if !decision.allowed {
        let path = request.uri().path().to_string();
        tracing::warn!(client = %key, path, "rate limit exceeded");

        let body = ErrorBody::new(
            StatusCode::TOO_MANY_REQUESTS,
            format!(
                "Rate limit exceeded. Maximum {} requests per {} seconds allowed. Try again in {} seconds.",
                decision.limit,
                state.limiter.config().window.as_secs(),
                decision.retry_after_secs
            ),
        )
        .with_path(path)
        .with_correlation_id(correlation_id(request.headers()));

        let mut response = body.into_response();
        let headers = response.headers_mut();
        headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
        headers.insert(REMAINING_HEADER, HeaderValue::from(0u32));
        headers.insert(
            RETRY_AFTER_HEADER,
            HeaderValue::from(decision.retry_after_secs),
        );
        return response;
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    response
}

/// Derive the client key, most specific source first: the first
/// `X-Forwarded-For` entry, then `X-Real-IP`, then the transport peer
/// address. Requests with none of these share the `"unknown"` bucket.
fn client_key(request: &Request) -> String {
    let headers = request.headers();

    if let Some(ip) = first_forwarded_for(headers) {
        return ip;
    }

    if let Some(ip) = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return ip.to_string();
    }

    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    "unknown".to_string()
}

fn first_forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
