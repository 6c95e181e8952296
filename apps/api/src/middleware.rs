//! Request middleware: per-client rate limiting, request metrics, timing and
//! security headers.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{debug, warn};

use crate::errors::AppError;

/// Fixed-window request counter keyed by client address.
#[derive(Clone)]
pub struct RateLimiter {
    // client -> (request_count, window_start)
    limits: Arc<RwLock<HashMap<String, (u32, Instant)>>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            limits: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    /// Counts the request and reports whether it is within the limit.
    pub async fn check(&self, client: &str) -> bool {
        let mut limits = self.limits.write().await;
        let now = Instant::now();

        let state = limits.entry(client.to_string()).or_insert((0, now));

        if now.duration_since(state.1) >= self.window {
            state.0 = 1;
            state.1 = now;
            return true;
        }

        state.0 += 1;
        if state.0 > self.max_requests {
            warn!("Rate limit exceeded for client {}", client);
            false
        } else {
            debug!("Rate limit OK for {} ({}/{})", client, state.0, self.max_requests);
            true
        }
    }

    /// Forgets clients whose window has closed.
    pub async fn prune(&self) {
        let now = Instant::now();
        let window = self.window;
        self.limits
            .write()
            .await
            .retain(|_, (_, start)| now.duration_since(*start) < window);
    }
}

/// Response times kept for the rolling average.
const RESPONSE_TIME_WINDOW: usize = 1000;

#[derive(Default)]
struct MetricsInner {
    requests_total: u64,
    success_count: u64,
    error_count: u64,
    response_times: VecDeque<Duration>,
    requests_by_endpoint: BTreeMap<String, u64>,
}

/// Request counters shared by `track_metrics` and the metrics endpoint.
#[derive(Clone)]
pub struct RequestMetrics {
    inner: Arc<RwLock<MetricsInner>>,
    started_at: std::time::Instant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub success_count: u64,
    /// Responses with status 400 and above.
    pub error_count: u64,
    pub success_rate: f64,
    /// Over the last `RESPONSE_TIME_WINDOW` requests.
    pub average_response_time_ms: f64,
    /// Keyed by method and route template, e.g. `GET /api/v1/analysis/:id`.
    pub requests_by_endpoint: BTreeMap<String, u64>,
    pub uptime_secs: u64,
}

impl Default for RequestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsInner::default())),
            started_at: std::time::Instant::now(),
        }
    }

    pub async fn record(&self, endpoint: &str, status: StatusCode, elapsed: Duration) {
        let mut inner = self.inner.write().await;
        inner.requests_total += 1;
        *inner
            .requests_by_endpoint
            .entry(endpoint.to_string())
            .or_insert(0) += 1;

        if status.as_u16() >= 400 {
            inner.error_count += 1;
        } else {
            inner.success_count += 1;
        }

        if inner.response_times.len() == RESPONSE_TIME_WINDOW {
            inner.response_times.pop_front();
        }
        inner.response_times.push_back(elapsed);
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read().await;
        let average_response_time_ms = if inner.response_times.is_empty() {
            0.0
        } else {
            let total: Duration = inner.response_times.iter().sum();
            total.as_secs_f64() * 1000.0 / inner.response_times.len() as f64
        };

        MetricsSnapshot {
            requests_total: inner.requests_total,
            success_count: inner.success_count,
            error_count: inner.error_count,
            success_rate: inner.success_count as f64 / inner.requests_total.max(1) as f64,
            average_response_time_ms,
            requests_by_endpoint: inner.requests_by_endpoint.clone(),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

/// Counts every response, including ones the rate limiter turns away.
pub async fn track_metrics(
    State(metrics): State<RequestMetrics>,
    request: Request,
    next: Next,
) -> Response {
    let endpoint = format!(
        "{} {}",
        request.method(),
        request
            .extensions()
            .get::<MatchedPath>()
            .map_or("unmatched", |path| path.as_str())
    );
    let started = std::time::Instant::now();
    let response = next.run(request).await;
    metrics
        .record(&endpoint, response.status(), started.elapsed())
        .await;
    response
}

/// First `X-Forwarded-For` entry, else the peer address, else "unknown".
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let client = client_key(request.headers(), peer);

    if !limiter.check(&client).await {
        return AppError::RateLimited.into_response();
    }
    next.run(request).await
}

/// Adds `X-Process-Time` (seconds) to every response.
pub async fn process_time(request: Request, next: Next) -> Response {
    let started = std::time::Instant::now();
    let mut response = next.run(request).await;
    let elapsed = format!("{:.3}", started.elapsed().as_secs_f64());
    if let Ok(value) = HeaderValue::from_str(&elapsed) {
        response
            .headers_mut()
            .insert(HeaderName::from_static("x-process-time"), value);
    }
    response
}

pub fn security_headers() -> [SetResponseHeaderLayer<HeaderValue>; 4] {
    [
        SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ),
        SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ),
        SetResponseHeaderLayer::overriding(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ),
        SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ),
    ]
}
