//! rampart API - HTTP boundary
//!
//! Wires the multi-tier cache and the token-bucket limiter into an axum
//! application:
//! - [`middleware::rate_limit_middleware`] admits or rejects each request
//! - [`AppState`] owns the cache and limiter with an explicit lifecycle
//! - [`routes::create_router`] assembles the demo routes

pub mod config;
pub mod error;
pub mod macros;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use middleware::{rate_limit_middleware, RateLimitError, RateLimitState};
pub use routes::create_router;
pub use state::{ApiCache, AppState};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
