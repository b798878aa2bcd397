//! rampart core - shared building blocks
//!
//! Error taxonomy, the clock abstraction used by every time-dependent
//! component, and environment parsing helpers. No cache or limiter logic
//! lives here.

pub mod clock;
pub mod env;
pub mod error;

pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use error::{CacheError, ConfigError, KeyError, RampartError, RampartResult};
