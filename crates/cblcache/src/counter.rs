//! Atomic integer counters.

use std::time::Duration;

use cblcache_core::cache::{effective_ttl, CacheError, CacheValue, Module, Result, Store};

use crate::handle::Cache;

/// Counter operations of a [`Cache`].
pub struct Counters<'a, S: Store> {
    cache: &'a Cache<S>,
}

impl<S: Store> Cache<S> {
    pub fn counters(&self) -> Counters<'_, S> {
        Counters { cache: self }
    }
}

impl<S: Store> Counters<'_, S> {
    fn key(&self, name: &str) -> String {
        self.cache.module_key(Module::Counter, name)
    }

    /// Adds one and refreshes the expiry. Returns the new value.
    pub async fn incr(&self, name: &str, expire: Option<Duration>) -> Result<i64> {
        self.incr_by(name, 1, expire).await
    }

    /// Adds `n` and refreshes the expiry in one atomic unit.
    ///
    /// A missing counter starts at zero. `None` or a zero duration leaves the
    /// expiry untouched.
    pub async fn incr_by(&self, name: &str, n: i64, expire: Option<Duration>) -> Result<i64> {
        let key = self.key(name);
        let value = self
            .cache
            .store()
            .incr_by(&key, n, effective_ttl(expire))
            .await?;
        tracing::trace!(counter = %key, value, "incr");
        Ok(value)
    }

    /// Subtracts one. The expiry is untouched.
    pub async fn decr(&self, name: &str) -> Result<i64> {
        self.decr_by(name, 1).await
    }

    pub async fn decr_by(&self, name: &str, n: i64) -> Result<i64> {
        let key = self.key(name);
        let value = self.cache.store().decr_by(&key, n).await?;
        tracing::trace!(counter = %key, value, "decr");
        Ok(value)
    }

    /// Subtracts one unless the counter is already at zero.
    ///
    /// # Errors
    ///
    /// - `CacheError::NotFound` if the counter does not exist
    /// - `CacheError::CounterAtFloor` if it is zero or below (value unchanged)
    /// - `CacheError::Decode` if it does not hold an integer
    pub async fn decr_min_zero(&self, name: &str) -> Result<i64> {
        let key = self.key(name);
        let outcome = self.cache.store().decr_min_zero(&key).await?;
        tracing::trace!(counter = %key, ?outcome, "decr min zero");
        outcome.into_result()
    }

    /// Sets the counter to zero with the given expiry.
    pub async fn reset(&self, name: &str, expire: Option<Duration>) -> Result<()> {
        let key = self.key(name);
        self.cache.store().set(&key, b"0", expire).await?;
        tracing::debug!(counter = %key, "reset");
        Ok(())
    }

    /// Current value.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::NotFound` if the counter does not exist.
    pub async fn get(&self, name: &str) -> Result<i64> {
        let bytes = self
            .cache
            .store()
            .get(&self.key(name))
            .await?
            .ok_or(CacheError::NotFound)?;
        i64::decode(&bytes)
    }

    /// Removes the counter. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let removed = self.cache.store().del(&self.key(name)).await?;
        Ok(removed > 0)
    }
}
