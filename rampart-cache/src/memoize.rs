//! Memoization over a [`MultiTierCache`].
//!
//! A call is identified by a function name plus its arguments. Positional
//! arguments keep their order; keyword arguments are sorted by name, so
//! `f(1, b=1, c=2)` and `f(1, c=2, b=1)` share a key while `f(1, b=2, c=2)`
//! does not. Argument values are encoded as canonical JSON (object keys
//! sorted at every depth) and hashed with SHA-256, keeping keys bounded in
//! length regardless of argument size.
//!
//! JSON has no NaN or infinity and would encode them as `null`, colliding
//! with `None`. Arguments containing non-finite floats are rejected.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use rampart_core::KeyError;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::entry::Ttl;
use crate::multi_tier::{CacheValue, MultiTierCache};

/// Arguments of one memoized call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    positional: Vec<Value>,
    keyword: BTreeMap<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, KeyError> {
        let position = self.positional.len();
        let encoded = encode_argument(value).map_err(|reason| KeyError::Positional { position, reason })?;
        self.positional.push(encoded);
        Ok(self)
    }

    /// Add a keyword argument. Each name may be given once.
    pub fn kwarg<T: Serialize + ?Sized>(mut self, name: impl Into<String>, value: &T) -> Result<Self, KeyError> {
        let name = name.into();
        if self.keyword.contains_key(&name) {
            return Err(KeyError::DuplicateKeyword { name });
        }
        let encoded = encode_argument(value).map_err(|reason| KeyError::Keyword {
            name: name.clone(),
            reason,
        })?;
        self.keyword.insert(name, encoded);
        Ok(self)
    }

    /// Canonical text form of the arguments.
    pub fn canonical(&self) -> String {
        let keyword: Map<String, Value> = self
            .keyword
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let encoded = Value::Array(vec![
            Value::Array(self.positional.clone()),
            Value::Object(keyword),
        ]);
        encoded.to_string()
    }

    /// Hex SHA-256 of the canonical form.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical().as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }
}

/// Encode one argument as canonical JSON.
fn encode_argument<T: Serialize + ?Sized>(value: &T) -> Result<Value, String> {
    // MessagePack keeps NaN and infinities, so the float check runs on it.
    let packed = rmp_serde::to_vec(value).map_err(|e| e.to_string())?;
    rmp_serde::from_slice::<FiniteFloats>(&packed).map_err(|e| e.to_string())?;
    let encoded = serde_json::to_value(value).map_err(|e| e.to_string())?;
    Ok(canonicalize(encoded))
}

/// Walks any self-describing value and fails on a NaN or infinite float.
struct FiniteFloats;

impl<'de> Deserialize<'de> for FiniteFloats {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FiniteFloatsVisitor)
    }
}

struct FiniteFloatsVisitor;

impl<'de> Visitor<'de> for FiniteFloatsVisitor {
    type Value = FiniteFloats;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any value without NaN or infinite floats")
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<FiniteFloats, E> {
        if v.is_finite() {
            Ok(FiniteFloats)
        } else {
            Err(E::custom(format!("non-finite float {} has no canonical encoding", v)))
        }
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<FiniteFloats, E> {
        Ok(FiniteFloats)
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> Result<FiniteFloats, E> {
        Ok(FiniteFloats)
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> Result<FiniteFloats, E> {
        Ok(FiniteFloats)
    }

    fn visit_i128<E: de::Error>(self, _: i128) -> Result<FiniteFloats, E> {
        Ok(FiniteFloats)
    }

    fn visit_u128<E: de::Error>(self, _: u128) -> Result<FiniteFloats, E> {
        Ok(FiniteFloats)
    }

    fn visit_str<E: de::Error>(self, _: &str) -> Result<FiniteFloats, E> {
        Ok(FiniteFloats)
    }

    fn visit_bytes<E: de::Error>(self, _: &[u8]) -> Result<FiniteFloats, E> {
        Ok(FiniteFloats)
    }

    fn visit_none<E: de::Error>(self) -> Result<FiniteFloats, E> {
        Ok(FiniteFloats)
    }

    fn visit_unit<E: de::Error>(self) -> Result<FiniteFloats, E> {
        Ok(FiniteFloats)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<FiniteFloats, D::Error> {
        FiniteFloats::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<FiniteFloats, A::Error> {
        while seq.next_element::<FiniteFloats>()?.is_some() {}
        Ok(FiniteFloats)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<FiniteFloats, A::Error> {
        while map.next_entry::<FiniteFloats, FiniteFloats>()?.is_some() {}
        Ok(FiniteFloats)
    }
}

/// Rebuild objects with their keys inserted in sorted order, at every depth.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Cache key for one call: `<prefix>:<function>:<digest>`.
pub fn cache_key(key_prefix: &str, function: &str, args: &CallArgs) -> String {
    if key_prefix.is_empty() {
        format!("{}:{}", function, args.digest())
    } else {
        format!("{}:{}:{}", key_prefix, function, args.digest())
    }
}

/// Caches the results of function calls in a [`MultiTierCache`].
///
/// Created with [`MultiTierCache::cached`].
pub struct Memoizer<V> {
    cache: Arc<MultiTierCache<V>>,
    ttl: Ttl,
    key_prefix: String,
}

impl<V: CacheValue> Memoizer<V> {
    pub(crate) fn new(cache: Arc<MultiTierCache<V>>, ttl: Ttl, key_prefix: String) -> Self {
        Self {
            cache,
            ttl,
            key_prefix,
        }
    }

    pub fn key_for(&self, function: &str, args: &CallArgs) -> String {
        cache_key(&self.key_prefix, function, args)
    }

    /// Return the cached result of `function(args)`, or run `compute` and
    /// cache what it returns.
    pub async fn call<F, Fut>(&self, function: &str, args: &CallArgs, compute: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let key = self.key_for(function, args);
        if let Some(hit) = self.cache.get(&key).await {
            return hit;
        }
        let value = compute().await;
        self.cache.set(key, value.clone(), self.ttl).await;
        value
    }

    /// Like [`call`](Self::call) for fallible functions. Errors are returned
    /// as-is and never cached.
    pub async fn try_call<F, Fut, E>(&self, function: &str, args: &CallArgs, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let key = self.key_for(function, args);
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }
        let value = compute().await?;
        self.cache.set(key, value.clone(), self.ttl).await;
        Ok(value)
    }

    /// Drop the cached result of one call.
    pub async fn invalidate(&self, function: &str, args: &CallArgs) -> bool {
        self.cache.delete(&self.key_for(function, args)).await
    }

    pub fn cache(&self) -> &Arc<MultiTierCache<V>> {
        &self.cache
    }
}

impl<V> Clone for Memoizer<V> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            ttl: self.ttl,
            key_prefix: self.key_prefix.clone(),
        }
    }
}
