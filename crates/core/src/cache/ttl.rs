//! Expiry reporting and best-effort results.

use std::time::Duration;

use super::CacheError;

/// Store reply for `TTL`/`PTTL` when the key exists without an expiry.
pub const TTL_PERSISTENT: i64 = -1;
/// Store reply for `TTL`/`PTTL` when the key does not exist.
pub const TTL_MISSING: i64 = -2;

/// Remaining time to live of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// The key expires after the given duration.
    Expires(Duration),
    /// The key exists and has no expiry (store sentinel `-1`).
    Persistent,
    /// The key does not exist (store sentinel `-2`).
    Missing,
}

impl Ttl {
    /// Interprets a `TTL` reply (seconds).
    pub fn from_secs(raw: i64) -> Self {
        match raw {
            TTL_PERSISTENT => Self::Persistent,
            TTL_MISSING => Self::Missing,
            secs => Self::Expires(Duration::from_secs(secs.max(0) as u64)),
        }
    }

    /// Interprets a `PTTL` reply (milliseconds).
    pub fn from_millis(raw: i64) -> Self {
        match raw {
            TTL_PERSISTENT => Self::Persistent,
            TTL_MISSING => Self::Missing,
            millis => Self::Expires(Duration::from_millis(millis.max(0) as u64)),
        }
    }

    /// Returns the remaining duration, if the key expires.
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Self::Expires(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the store's raw reply in seconds, sentinels included.
    pub fn as_raw_secs(&self) -> i64 {
        match self {
            Self::Expires(d) => d.as_secs() as i64,
            Self::Persistent => TTL_PERSISTENT,
            Self::Missing => TTL_MISSING,
        }
    }

    /// Returns the store's raw reply in milliseconds, sentinels included.
    pub fn as_raw_millis(&self) -> i64 {
        match self {
            Self::Expires(d) => d.as_millis() as i64,
            Self::Persistent => TTL_PERSISTENT,
            Self::Missing => TTL_MISSING,
        }
    }
}

impl Default for Ttl {
    fn default() -> Self {
        Self::Expires(Duration::ZERO)
    }
}

/// Result of an advisory read.
///
/// Queue length, purge counts and TTLs are informational; a store failure is
/// not propagated as an `Err` but kept here so callers can still inspect it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory<T> {
    Known(T),
    Unknown(CacheError),
}

impl<T> Advisory<T> {
    pub fn known(self) -> Option<T> {
        match self {
            Self::Known(value) => Some(value),
            Self::Unknown(_) => None,
        }
    }

    pub fn error(&self) -> Option<&CacheError> {
        match self {
            Self::Known(_) => None,
            Self::Unknown(err) => Some(err),
        }
    }

    pub fn unwrap_or(self, fallback: T) -> T {
        self.known().unwrap_or(fallback)
    }

    /// Converts back into a regular `Result`.
    pub fn into_result(self) -> Result<T, CacheError> {
        match self {
            Self::Known(value) => Ok(value),
            Self::Unknown(err) => Err(err),
        }
    }
}

impl<T: Default> Advisory<T> {
    /// Returns the value, or the type's zero value when the read failed.
    pub fn value_or_default(self) -> T {
        self.known().unwrap_or_default()
    }
}

impl<T> From<Result<T, CacheError>> for Advisory<T> {
    fn from(result: Result<T, CacheError>) -> Self {
        match result {
            Ok(value) => Self::Known(value),
            Err(err) => Self::Unknown(err),
        }
    }
}
