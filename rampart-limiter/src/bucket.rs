//! Continuous token bucket.
//!
//! Tokens accrue at `refill_rate` per second up to `capacity`. Refill is
//! computed lazily on each call, so an idle bucket costs nothing.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rampart_core::{system_clock, ConfigError, SharedClock};
use serde::Serialize;

/// Outcome of asking a bucket for tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Decision {
    /// Tokens were taken. `remaining` is what is left afterwards.
    Admitted { remaining: f64 },
    /// Nothing was taken. `retry_after` is the wait until enough tokens will
    /// have accrued, or `None` if the request can never be satisfied.
    Rejected { retry_after: Option<Duration> },
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted { .. })
    }

    /// Whole tokens left after an admission, zero after a rejection.
    pub fn remaining(&self) -> u64 {
        match self {
            Decision::Admitted { remaining } => remaining.floor() as u64,
            Decision::Rejected { .. } => 0,
        }
    }

    /// Retry hint in whole seconds, rounded up and at least 1.
    ///
    /// `None` for admissions and for requests that can never succeed.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Decision::Rejected {
                retry_after: Some(wait),
            } => Some((wait.as_secs_f64().ceil() as u64).max(1)),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A single token bucket.
///
/// Refill and decrement happen in one critical section, so two callers can
/// never both spend the same token.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
    clock: SharedClock,
}

impl TokenBucket {
    /// Create a full bucket. `refill_rate` is in tokens per second.
    pub fn new(capacity: f64, refill_rate: f64) -> Result<Self, ConfigError> {
        Self::with_clock(capacity, refill_rate, system_clock())
    }

    pub fn with_clock(capacity: f64, refill_rate: f64, clock: SharedClock) -> Result<Self, ConfigError> {
        validate_rates(capacity, refill_rate)?;
        Ok(Self::from_parts(capacity, refill_rate, clock))
    }

    /// Construct without validation. Callers must have run [`validate_rates`].
    pub(crate) fn from_parts(capacity: f64, refill_rate: f64, clock: SharedClock) -> Self {
        let now = clock.now();
        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: now,
            }),
            clock,
        }
    }

    /// Try to take `amount` tokens.
    ///
    /// A rejection leaves the bucket unchanged. An `amount` above capacity
    /// (or a negative one) is rejected with no retry hint.
    pub fn check(&self, amount: f64) -> Decision {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.refill(&mut state, now);

        if !(0.0..=self.capacity).contains(&amount) {
            return Decision::Rejected { retry_after: None };
        }

        if state.tokens >= amount {
            state.tokens -= amount;
            return Decision::Admitted {
                remaining: state.tokens,
            };
        }

        // A wait too long for `Duration` is reported as never.
        let retry_after = if self.refill_rate > 0.0 {
            let deficit = amount - state.tokens;
            Duration::try_from_secs_f64(deficit / self.refill_rate).ok()
        } else {
            None
        };
        Decision::Rejected { retry_after }
    }

    /// Take `amount` tokens if available.
    pub fn consume(&self, amount: f64) -> bool {
        self.check(amount).is_admitted()
    }

    /// Tokens currently available, after refill.
    pub fn available(&self) -> f64 {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.refill(&mut state, now);
        state.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill);
        if elapsed.is_zero() {
            return;
        }
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity);
        state.last_refill = now;
    }
}

/// Check bucket parameters: capacity must be positive, refill non-negative,
/// both finite.
pub fn validate_rates(capacity: f64, refill_rate: f64) -> Result<(), ConfigError> {
    if !capacity.is_finite() || capacity <= 0.0 {
        return Err(ConfigError::invalid("capacity", capacity, "must be a positive number"));
    }
    if !refill_rate.is_finite() || refill_rate < 0.0 {
        return Err(ConfigError::invalid(
            "refill_rate",
            refill_rate,
            "must be zero or a positive number",
        ));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rampart_core::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn bucket(capacity: f64, refill_rate: f64) -> (TokenBucket, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let bucket = TokenBucket::with_clock(capacity, refill_rate, clock.clone()).expect("bucket");
        (bucket, clock)
    }

    #[test]
    fn test_burst_then_one_per_minute() {
        let (bucket, clock) = bucket(5.0, 1.0 / 60.0);

        for _ in 0..5 {
            assert!(bucket.consume(1.0));
        }
        assert!(!bucket.consume(1.0));

        clock.advance(Duration::from_secs(60));
        assert!(bucket.consume(1.0));
        assert!(!bucket.consume(1.0));
    }

    #[test]
    fn test_idle_bucket_caps_at_capacity() {
        let (bucket, clock) = bucket(3.0, 10.0);
        assert!(bucket.consume(3.0));
        clock.advance(Duration::from_secs(3600));
        assert_eq!(bucket.available(), 3.0);
    }

    #[test]
    fn test_oversized_request_is_never_satisfiable() {
        let (bucket, clock) = bucket(2.0, 1.0);
        assert_eq!(bucket.check(3.0), Decision::Rejected { retry_after: None });
        clock.advance(Duration::from_secs(3600));
        assert!(!bucket.consume(3.0));
        assert_eq!(bucket.available(), 2.0);
    }

    #[test]
    fn test_rejection_leaves_tokens_untouched() {
        let (bucket, _clock) = bucket(2.0, 1.0);
        assert!(bucket.consume(1.5));
        assert!(!bucket.consume(1.0));
        assert_eq!(bucket.available(), 0.5);
    }

    #[test]
    fn test_retry_after_reflects_deficit() {
        let (bucket, _clock) = bucket(1.0, 0.5);
        assert!(bucket.consume(1.0));

        let decision = bucket.check(1.0);
        assert_eq!(
            decision,
            Decision::Rejected {
                retry_after: Some(Duration::from_secs(2))
            }
        );
        assert_eq!(decision.retry_after_secs(), Some(2));
    }

    #[test]
    fn test_retry_after_secs_rounds_up_to_at_least_one() {
        let short = Decision::Rejected {
            retry_after: Some(Duration::from_millis(10)),
        };
        let long = Decision::Rejected {
            retry_after: Some(Duration::from_millis(2_100)),
        };
        assert_eq!(short.retry_after_secs(), Some(1));
        assert_eq!(long.retry_after_secs(), Some(3));
        assert_eq!(Decision::Admitted { remaining: 1.0 }.retry_after_secs(), None);
    }

    #[test]
    fn test_zero_refill_never_recovers() {
        let (bucket, clock) = bucket(1.0, 0.0);
        assert!(bucket.consume(1.0));
        clock.advance(Duration::from_secs(86_400));
        assert_eq!(bucket.check(1.0), Decision::Rejected { retry_after: None });
    }

    #[test]
    fn test_unrepresentable_wait_has_no_retry_hint() {
        let (bucket, _clock) = bucket(1.0, 1e-20);
        assert!(bucket.consume(1.0));
        assert_eq!(bucket.check(1.0), Decision::Rejected { retry_after: None });
    }

    #[test]
    fn test_invalid_parameters_are_rejected() {
        assert!(TokenBucket::new(0.0, 1.0).is_err());
        assert!(TokenBucket::new(f64::NAN, 1.0).is_err());
        assert!(TokenBucket::new(1.0, -1.0).is_err());
        assert!(TokenBucket::new(1.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_concurrent_consumers_never_overspend() {
        let (bucket, _clock) = bucket(100.0, 0.0);
        let bucket = Arc::new(bucket);
        let admitted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bucket = Arc::clone(&bucket);
                let admitted = Arc::clone(&admitted);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        if bucket.consume(1.0) {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread");
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 100);
        assert_eq!(bucket.available(), 0.0);
    }
}
