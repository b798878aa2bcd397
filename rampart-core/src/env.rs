//! Environment variable helpers shared by the configuration layers.
//!
//! Missing variables yield the default. Present but unparsable variables
//! also yield the default and emit a warning, so a typo never prevents the
//! service from starting.

use std::str::FromStr;

/// Read and parse an environment variable, falling back to `default`.
pub fn parse_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => parse_value(name, &raw).unwrap_or(default),
        Err(_) => default,
    }
}

/// Read and parse an optional environment variable. Empty values count as unset.
pub fn parse_opt<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    if raw.trim().is_empty() {
        return None;
    }
    parse_value(name, &raw)
}

/// Read a boolean flag. Accepts `true/false`, `1/0`, `yes/no`, `on/off`.
pub fn flag_or(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(raw) => parse_flag(&raw).unwrap_or_else(|| {
            tracing::warn!(variable = name, value = %raw, "ignoring unparsable flag");
            default
        }),
        Err(_) => default,
    }
}

/// Read a string variable, treating empty values as unset.
pub fn string_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Option<T> {
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "ignoring unparsable value");
            None
        }
    }
}
