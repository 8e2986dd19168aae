//! Duration strings in configuration documents.
//!
//! Accepts `"250ms"`, `"1s"`, `"1m30s"`, `"1.5h"` (units `ns`, `us`, `µs`,
//! `ms`, `s`, `m`, `h`) or a bare integer count of nanoseconds.

use serde::{de, Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Error returned for a malformed duration string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid duration {input:?}: {reason}")]
pub struct DurationError {
    input: String,
    reason: &'static str,
}

impl DurationError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

fn unit_nanos(unit: &str) -> Option<u64> {
    let nanos = match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60 * 1_000_000_000,
        "h" => 3600 * 1_000_000_000,
        _ => return None,
    };
    Some(nanos)
}

/// Fraction digits beyond this are below nanosecond resolution for every unit.
const MAX_FRACTION_DIGITS: usize = 18;

fn leading_digits(s: &str) -> (&str, &str) {
    s.split_at(s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len()))
}

/// Parse a duration string such as `"1m30s"`.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DurationError::new(input, "empty"));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.starts_with('-') {
        return Err(DurationError::new(input, "negative durations are not allowed"));
    }

    let overflow = || DurationError::new(input, "overflow");
    let mut rest = s.strip_prefix('+').unwrap_or(s);
    let mut total: u64 = 0;

    while !rest.is_empty() {
        let (whole, after) = leading_digits(rest);
        let (fraction, after) = match after.strip_prefix('.') {
            Some(tail) => leading_digits(tail),
            None => ("", after),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(DurationError::new(input, "expected a number"));
        }

        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        if unit_len == 0 {
            return Err(DurationError::new(input, "missing unit"));
        }
        let scale = unit_nanos(&after[..unit_len])
            .ok_or_else(|| DurationError::new(input, "unknown unit"))?;
        rest = &after[unit_len..];

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(overflow)?;

        if !fraction.is_empty() {
            let digits = &fraction[..fraction.len().min(MAX_FRACTION_DIGITS)];
            let numerator: u128 = digits.parse().map_err(|_| overflow())?;
            let denominator = 10u128.pow(digits.len() as u32);
            // Always below `scale`, so it fits in u64.
            let part = (numerator * u128::from(scale) / denominator) as u64;
            nanos = nanos.checked_add(part).ok_or_else(overflow)?;
        }

        total = total.checked_add(nanos).ok_or_else(overflow)?;
    }

    Ok(Duration::from_nanos(total))
}

/// Render a duration in the same notation `parse_duration` accepts.
pub fn format_duration(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }
    let nanos = d.as_nanos();
    if nanos % 1_000_000_000 == 0 {
        format!("{}s", d.as_secs())
    } else if nanos % 1_000_000 == 0 {
        format!("{}ms", d.as_millis())
    } else if nanos % 1_000 == 0 {
        format!("{}us", d.as_micros())
    } else {
        format!("{}ns", nanos)
    }
}

/// Serde adapter for `#[serde(with = "crate::config::duration")]`.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Nanos(u64),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Nanos(n) => Ok(Duration::from_nanos(n)),
        Repr::Text(s) => parse_duration(&s).map_err(de::Error::custom),
    }
}

pub fn serialize<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*d))
}
