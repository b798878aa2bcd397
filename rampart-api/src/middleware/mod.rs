//! Middleware for the rampart API.

pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, RateLimitError, RateLimitState};
