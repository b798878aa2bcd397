//! Wire format for values crossing into the remote tier.
//!
//! Values are wrapped in an envelope carrying the TTL they were written with
//! (so promotion into L1 can reuse it) and encoded as MessagePack with named
//! fields. Any value that implements `Serialize + DeserializeOwned`
//! round-trips, including enums and maps with non-string keys.

use std::time::Duration;

use rampart_core::CacheError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct EnvelopeRef<'a, V> {
    ttl_ms: Option<u64>,
    value: &'a V,
}

#[derive(Deserialize)]
struct Envelope<V> {
    ttl_ms: Option<u64>,
    value: V,
}

/// Encode a value and its TTL.
pub fn encode<V: Serialize>(value: &V, ttl: Option<Duration>) -> Result<Vec<u8>, CacheError> {
    let envelope = EnvelopeRef {
        ttl_ms: ttl.map(ttl_to_millis),
        value,
    };
    rmp_serde::to_vec_named(&envelope).map_err(|e| CacheError::Serialization {
        reason: e.to_string(),
    })
}

/// Whole milliseconds, rounded up so a sub-millisecond TTL survives.
fn ttl_to_millis(ttl: Duration) -> u64 {
    let millis = ttl.as_nanos().div_ceil(1_000_000);
    millis.min(u128::from(u64::MAX)) as u64
}

/// Decode a value and the TTL it was written with.
pub fn decode<V: DeserializeOwned>(bytes: &[u8]) -> Result<(V, Option<Duration>), CacheError> {
    let envelope: Envelope<V> =
        rmp_serde::from_slice(bytes).map_err(|e| CacheError::Deserialization {
            reason: e.to_string(),
        })?;
    Ok((envelope.value, envelope.ttl_ms.map(Duration::from_millis)))
}
