use std::time::Duration;

use async_trait::async_trait;

use super::{CompareAndDelete, FloorDecrement, Result};

/// Primitive operations of the backing key-value store.
///
/// Keys passed here are already composed physical keys. A `ttl` of `None`
/// or `Some(Duration::ZERO)` means "no expiry"; durations are honoured with
/// millisecond precision.
#[async_trait]
pub trait Store: Send + Sync {
    /// Checks that the store answers requests.
    async fn ping(&self) -> Result<()>;

    /// Releases the connection. Calling it again is a no-op.
    async fn close(&self) -> Result<()>;

    /// Gets the raw bytes stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Sets `key` to `value`, replacing any previous value and expiry.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()>;

    /// Sets `key` only if it does not exist. Returns true if the key was set.
    async fn set_nx(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<bool>;

    /// Deletes `key`, returning the number of keys removed (0 or 1).
    async fn del(&self, key: &str) -> Result<u64>;

    /// Raw `TTL` reply in seconds (`-1` no expiry, `-2` missing).
    async fn ttl(&self, key: &str) -> Result<i64>;

    /// Raw `PTTL` reply in milliseconds (`-1` no expiry, `-2` missing).
    async fn pttl(&self, key: &str) -> Result<i64>;

    /// Sets an expiry on an existing key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Deletes `key` only if it currently holds `expected`, atomically.
    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<CompareAndDelete>;

    /// Adds `delta` to the integer at `key` and refreshes its expiry in one
    /// atomic unit. Returns the new value.
    async fn incr_by(&self, key: &str, delta: i64, ttl: Option<Duration>) -> Result<i64>;

    /// Subtracts `delta` from the integer at `key`. Returns the new value.
    async fn decr_by(&self, key: &str, delta: i64) -> Result<i64>;

    /// Decrements the integer at `key` unless it is absent or at zero.
    async fn decr_min_zero(&self, key: &str) -> Result<FloorDecrement>;

    /// Appends to the tail of the list at `key`. Returns the new length.
    async fn rpush(&self, key: &str, value: &[u8]) -> Result<u64>;

    /// Removes and returns the head of the list at `key`.
    async fn lpop(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Waits up to `timeout` for the list at `key` to have a head, then
    /// removes and returns it.
    async fn blpop(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>>;

    /// Length of the list at `key`; 0 when absent.
    async fn llen(&self, key: &str) -> Result<u64>;

    /// Adds members to the set at `key`. Returns how many were new.
    async fn sadd(&self, key: &str, members: &[String]) -> Result<u64>;

    /// Removes members from the set at `key`. Returns how many were present.
    async fn srem(&self, key: &str, members: &[String]) -> Result<u64>;

    /// All members of the set at `key`; empty when absent.
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    /// Cardinality of the set at `key`; 0 when absent.
    async fn scard(&self, key: &str) -> Result<u64>;

    async fn sismember(&self, key: &str, member: &str) -> Result<bool>;

    /// Up to `count` distinct random members of the set at `key`.
    async fn srandmember(&self, key: &str, count: usize) -> Result<Vec<String>>;
}

/// Returns the expiry to apply, treating zero as "no expiry".
pub fn effective_ttl(ttl: Option<Duration>) -> Option<Duration> {
    ttl.filter(|d| !d.is_zero())
}

/// Converts a duration to whole milliseconds for `PX`/`PEXPIRE`, rounding
/// sub-millisecond durations up so they still expire.
pub fn ttl_millis(ttl: Duration) -> u64 {
    let millis = ttl.as_millis().min(u64::MAX as u128) as u64;
    if millis == 0 && !ttl.is_zero() {
        1
    } else {
        millis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_ttl() {
        assert_eq!(effective_ttl(None), None);
        assert_eq!(effective_ttl(Some(Duration::ZERO)), None);
        assert_eq!(
            effective_ttl(Some(Duration::from_millis(10))),
            Some(Duration::from_millis(10))
        );
    }

    #[test]
    fn test_ttl_millis_rounds_up_sub_millisecond() {
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::from_millis(10)), 10);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2000);
    }
}
