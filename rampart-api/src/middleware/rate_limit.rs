//! Rate limiting middleware.
//!
//! Every request is charged one token from its client's bucket before the
//! handler runs. Clients are keyed by address (the trusted proxy header's
//! first hop if configured, else the peer address) and optionally by a
//! hash of their user agent.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use rampart_core::ConfigError;
use rampart_limiter::{BucketRegistry, ClientIdentity, Decision, LimiterConfig, RateLimitStore};
use serde::Serialize;

/// Retry hint used when a request could never be admitted.
const FALLBACK_RETRY_AFTER_SECS: u64 = 60;

/// State for rate limiting middleware.
#[derive(Clone)]
pub struct RateLimitState {
    config: Arc<LimiterConfig>,
    store: Arc<dyn RateLimitStore>,
}

impl RateLimitState {
    /// Build state backed by an in-process [`BucketRegistry`].
    pub fn new(config: LimiterConfig) -> Result<Self, ConfigError> {
        let registry = BucketRegistry::from_config(&config)?;
        Ok(Self::with_store(config, Arc::new(registry)))
    }

    /// Build state over any store, e.g. one shared between instances.
    pub fn with_store(config: LimiterConfig, store: Arc<dyn RateLimitStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RateLimitStore> {
        &self.store
    }

    /// Charge one request to `identity`.
    pub fn check(&self, identity: &ClientIdentity) -> Decision {
        self.store.check(&identity.key(), 1.0)
    }

    /// Work out who a request should be charged to.
    ///
    /// Without connection info (e.g. in-process tests) every request falls
    /// back to one shared unspecified address.
    pub fn identify(&self, request: &Request) -> ClientIdentity {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let headers = request.headers();
        let proxy_value = self
            .config
            .trusted_proxy_header
            .as_deref()
            .and_then(|name| headers.get(name))
            .and_then(|value| value.to_str().ok());
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok());

        ClientIdentity::resolve(&self.config, peer, proxy_value, user_agent)
    }
}

impl std::fmt::Debug for RateLimitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitState")
            .field("config", &self.config)
            .field("store", &self.store)
            .finish()
    }
}

/// JSON body of a rejection.
#[derive(Debug, Serialize)]
struct RateLimitBody {
    error: &'static str,
    remaining_requests: u64,
    retry_after: u64,
}

/// Error type for rate limit middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitError {
    /// Seconds until at least one token is available
    pub retry_after: u64,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let body = RateLimitBody {
            error: "rate_limited",
            remaining_requests: 0,
            retry_after: self.retry_after,
        };
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(self.retry_after));
        response
    }
}

/// Rate limiting middleware.
///
/// Passes requests straight through when the limiter is disabled. When a
/// client's bucket is empty, returns 429 Too Many Requests with a
/// Retry-After header and never calls the handler.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    if !state.is_enabled() {
        return Ok(next.run(request).await);
    }

    let identity = state.identify(&request);
    let decision = state.check(&identity);
    match decision {
        Decision::Admitted { .. } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(
                HeaderName::from_static("x-ratelimit-limit"),
                HeaderValue::from(state.store.capacity().floor() as u64),
            );
            headers.insert(
                HeaderName::from_static("x-ratelimit-remaining"),
                HeaderValue::from(decision.remaining()),
            );
            Ok(response)
        }
        Decision::Rejected { .. } => {
            let retry_after = decision
                .retry_after_secs()
                .unwrap_or(FALLBACK_RETRY_AFTER_SECS);
            tracing::debug!(client = %identity, retry_after, "request rate limited");
            Err(RateLimitError { retry_after })
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
