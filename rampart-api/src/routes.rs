//! HTTP routes of the demo server.
//!
//! - `GET /health` - liveness, no dependencies checked
//! - `GET /stats` - cache statistics, limiter settings and uptime
//! - `GET /fib/:n` - Fibonacci numbers, memoized through the shared cache
//!
//! Every route sits behind the rate limiting middleware.

use axum::{
    extract::{Path, State},
    http::Uri,
    middleware::from_fn_with_state,
    routing::get,
    Json, Router,
};
use rampart_cache::{CacheStats, CallArgs, Ttl};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::error::{ApiError, ApiResult};
use crate::middleware::rate_limit_middleware;
use crate::state::AppState;

/// Largest `n` whose Fibonacci number fits in a `u64`.
pub const MAX_FIB_INPUT: u64 = 93;

const MEMO_PREFIX: &str = "api";

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub enabled: bool,
    pub capacity: u32,
    pub requests_per_minute: u32,
    pub tracked_clients: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub cache: CacheStats,
    pub hit_rate: f64,
    pub rate_limit: RateLimitInfo,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FibResponse {
    pub n: u64,
    pub value: u64,
}

// ============================================================================
// HANDLERS
// ============================================================================

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_secs(),
    })
}

async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let cache = state.cache.get_stats();
    let limiter = state.rate_limit.config();
    Json(StatsResponse {
        hit_rate: cache.hit_rate(),
        cache,
        rate_limit: RateLimitInfo {
            enabled: limiter.enabled,
            capacity: limiter.capacity,
            requests_per_minute: limiter.requests_per_minute,
            tracked_clients: state.rate_limit.store().tracked_clients(),
        },
        uptime_seconds: state.uptime_secs(),
    })
}

async fn fib(State(state): State<AppState>, Path(raw): Path<String>) -> ApiResult<Json<FibResponse>> {
    let n: u64 = raw
        .parse()
        .map_err(|_| ApiError::invalid_input(format!("'{}' is not a non-negative integer", raw)))?;
    if n > MAX_FIB_INPUT {
        return Err(ApiError::invalid_range("n", 0, MAX_FIB_INPUT));
    }

    let args = CallArgs::new().arg(&n)?;
    let memo = state.cache.cached(Ttl::Default, MEMO_PREFIX);
    let cached = memo
        .call("fib", &args, || async move { Value::from(fibonacci(n)) })
        .await;

    let value = cached
        .as_u64()
        .ok_or_else(|| ApiError::internal_error("cached fib value is not an integer"))?;
    Ok(Json(FibResponse { n, value }))
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found("No route matches the request")
        .with_details(serde_json::json!({ "path": uri.path() }))
}

/// Iterative Fibonacci; `n` must be at most [`MAX_FIB_INPUT`].
pub fn fibonacci(n: u64) -> u64 {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    a
}

// ============================================================================
// ROUTER
// ============================================================================

/// Build the application router with tracing and rate limiting applied.
pub fn create_router(state: AppState) -> Router {
    let layers = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(state.rate_limit.clone(), rate_limit_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/fib/:n", get(fib))
        .fallback(not_found)
        .layer(layers)
        .with_state(state)
}
