//! Timestamp parsing and ordered timestamp keys.
//!
//! Frame requests carry timestamps in seconds. Operators and the CLI may
//! also write them as `HH:MM:SS(.mmm)` or `MM:SS(.mmm)`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Parse a timestamp string to seconds.
///
/// Supports `HH:MM:SS(.mmm)`, `MM:SS(.mmm)` and `SS(.mmm)`.
///
/// # Examples
/// ```
/// use rawframe_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("00:01:30").unwrap(), 90.0);
/// assert_eq!(parse_timestamp("01:30.5").unwrap(), 90.5);
/// assert_eq!(parse_timestamp("9.99").unwrap(), 9.99);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    let parts: Vec<&str> = ts.split(':').collect();
    if parts.len() > 3 {
        return Err(TimestampError::InvalidFormat(ts.to_string()));
    }

    const NAMES: [&str; 3] = ["hours", "minutes", "seconds"];
    let offset = 3 - parts.len();

    let mut total = 0.0;
    for (i, part) in parts.iter().enumerate() {
        let name = NAMES[offset + i];
        let value: f64 = part
            .parse()
            .map_err(|_| TimestampError::InvalidValue(name, part.to_string()))?;
        if !value.is_finite() {
            return Err(TimestampError::InvalidValue(name, part.to_string()));
        }
        if value < 0.0 {
            return Err(TimestampError::Negative);
        }
        total = total * 60.0 + value;
    }

    Ok(total)
}

/// Timestamp parsing error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("Timestamp cannot be empty")]
    Empty,

    #[error("Timestamp cannot be negative")]
    Negative,

    #[error("Invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("Invalid timestamp format '{0}'. Use HH:MM:SS, MM:SS or seconds")]
    InvalidFormat(String),
}

/// Totally ordered timestamp, usable as a map key for batch results.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TimestampKey(pub f64);

impl TimestampKey {
    pub fn seconds(&self) -> f64 {
        self.0
    }
}

impl PartialEq for TimestampKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimestampKey {}

impl PartialOrd for TimestampKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimestampKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl From<f64> for TimestampKey {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl fmt::Display for TimestampKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_parse_formats() {
        assert_eq!(parse_timestamp("01:00:00").unwrap(), 3600.0);
        assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
        assert_eq!(parse_timestamp(" 10.5 ").unwrap(), 10.5);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_timestamp(""), Err(TimestampError::Empty));
        assert_eq!(parse_timestamp("-1"), Err(TimestampError::Negative));
        assert!(matches!(
            parse_timestamp("1:2:3:4"),
            Err(TimestampError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_timestamp("ab:10"),
            Err(TimestampError::InvalidValue("minutes", _))
        ));
        assert!(parse_timestamp("inf").is_err());
    }

    #[test]
    fn test_timestamp_key_ordering() {
        let mut map = BTreeMap::new();
        map.insert(TimestampKey(2.0), "b");
        map.insert(TimestampKey(0.5), "a");
        map.insert(TimestampKey(10.0), "c");
        let keys: Vec<f64> = map.keys().map(|k| k.seconds()).collect();
        assert_eq!(keys, vec![0.5, 2.0, 10.0]);
        assert_eq!(TimestampKey(1.0), TimestampKey::from(1.0));
    }
}
