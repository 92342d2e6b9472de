//! TTL Module
//!
//! Normalizes the time-to-live accepted by `set` into whole seconds.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::error::{CacheError, Result};

// == TTL ==
/// Time-to-live accepted by `Cache::set`.
///
/// `None` at the call site means the entry never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Whole seconds from now
    Seconds(i64),
    /// Time from now; truncated to whole seconds
    Duration(Duration),
    /// Absolute deadline
    Until(DateTime<Utc>),
}

// == Expiry ==
/// Outcome of TTL normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// No expiration
    Persistent,
    /// Expire this many seconds after the write
    Seconds(u64),
    /// Negative TTL; the write must not happen
    Rejected,
}

impl Ttl {
    /// Resolves the TTL to whole seconds relative to `now`.
    pub fn seconds_from(self, now: DateTime<Utc>) -> i64 {
        match self {
            Ttl::Seconds(seconds) => seconds,
            Ttl::Duration(duration) => duration.num_seconds(),
            Ttl::Until(deadline) => deadline.timestamp() - now.timestamp(),
        }
    }

    /// Reads a TTL from a dynamic JSON value.
    ///
    /// `null` means no expiration, an integer is whole seconds and an RFC 3339
    /// string is a deadline. Anything else is an `InvalidArgument`.
    pub fn from_json(value: &Value) -> Result<Option<Ttl>> {
        match value {
            Value::Null => Ok(None),
            Value::Number(n) => n.as_i64().map(|s| Some(Ttl::Seconds(s))).ok_or_else(|| {
                CacheError::InvalidArgument(format!("TTL must be an integer, got {}", n))
            }),
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|deadline| Some(Ttl::Until(deadline.with_timezone(&Utc))))
                .map_err(|_| {
                    CacheError::InvalidArgument(format!(
                        "TTL can be an integer, null, or an RFC 3339 deadline, got {:?}",
                        s
                    ))
                }),
            other => Err(CacheError::InvalidArgument(format!(
                "TTL can be an integer, null, or an RFC 3339 deadline, got {}",
                other
            ))),
        }
    }
}

/// Normalizes an optional TTL against `now`.
pub fn ttl_calc(ttl: Option<Ttl>, now: DateTime<Utc>) -> Expiry {
    let Some(ttl) = ttl else {
        return Expiry::Persistent;
    };
    match u64::try_from(ttl.seconds_from(now)) {
        Ok(seconds) => Expiry::Seconds(seconds),
        Err(_) => Expiry::Rejected,
    }
}

/// Unix timestamp `seconds` after `now`, as passed to EXPIREAT.
///
/// Redis converts the deadline to milliseconds, so a deadline whose
/// millisecond form overflows `i64` is an `InvalidArgument`.
pub fn expiry_deadline(now: DateTime<Utc>, seconds: u64) -> Result<i64> {
    i64::try_from(seconds)
        .ok()
        .and_then(|seconds| now.timestamp().checked_add(seconds))
        .filter(|deadline| deadline.checked_mul(1000).is_some())
        .ok_or_else(|| CacheError::InvalidArgument(format!("TTL out of range: {} seconds", seconds)))
}

impl From<i64> for Ttl {
    fn from(seconds: i64) -> Self {
        Ttl::Seconds(seconds)
    }
}

impl From<Duration> for Ttl {
    fn from(duration: Duration) -> Self {
        Ttl::Duration(duration)
    }
}

impl From<DateTime<Utc>> for Ttl {
    fn from(deadline: DateTime<Utc>) -> Self {
        Ttl::Until(deadline)
    }
}

impl TryFrom<std::time::Duration> for Ttl {
    type Error = CacheError;

    fn try_from(duration: std::time::Duration) -> Result<Self> {
        Duration::from_std(duration)
            .map(Ttl::Duration)
            .map_err(|e| CacheError::InvalidArgument(format!("TTL out of range: {}", e)))
    }
}
