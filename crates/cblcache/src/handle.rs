//! The cache handle and its scalar operations.

use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use cblcache_core::cache::{
    deserialize_object, serialize_object, Advisory, CacheError, CacheValue, KeyComposer, Module,
    Result, Store, Ttl,
};

use crate::config::CacheConfig;
use crate::lock::LockRelease;

#[cfg(feature = "memory")]
use crate::cache::MemoryStore;
#[cfg(feature = "redis")]
use crate::cache::RedisStore;

/// Namespaced handle over a [`Store`].
///
/// Built once at startup and cloned into every task that needs it; clones
/// share the underlying connection.
pub struct Cache<S: Store> {
    store: Arc<S>,
    keys: KeyComposer,
    lock_poll_interval: Duration,
    lock_release: LockRelease,
}

impl<S: Store> Clone for Cache<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            keys: self.keys.clone(),
            lock_poll_interval: self.lock_poll_interval,
            lock_release: self.lock_release,
        }
    }
}

#[cfg(feature = "redis")]
impl Cache<RedisStore> {
    /// Connects to Redis and checks liveness with `PING`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the server is unreachable.
    pub async fn connect(config: &CacheConfig) -> Result<Self> {
        let store = RedisStore::connect(&config.redis_url()).await?;
        tracing::info!(
            app = %config.app_name,
            addr = %config.redis_addr,
            db = config.redis_db,
            "init cache success"
        );
        Ok(Self::with_store(store, config))
    }
}

#[cfg(feature = "memory")]
impl Cache<MemoryStore> {
    /// Builds a handle over a fresh in-memory store.
    pub fn in_memory(config: &CacheConfig) -> Self {
        Self::with_store(MemoryStore::new(config.memory_max_entries), config)
    }
}

impl<S: Store> Cache<S> {
    /// Builds a handle over any store.
    pub fn with_store(store: S, config: &CacheConfig) -> Self {
        Self::with_shared_store(Arc::new(store), config)
    }

    /// Builds a handle over a store that other handles may also use.
    pub fn with_shared_store(store: Arc<S>, config: &CacheConfig) -> Self {
        Self {
            store,
            keys: KeyComposer::new(config.app_name.clone()),
            lock_poll_interval: config.lock_poll_interval(),
            lock_release: config.lock_release,
        }
    }

    /// Releases the connection. Later operations fail with
    /// `ConnectionFailed("cache closed")`.
    pub async fn close(&self) -> Result<()> {
        self.store.close().await?;
        tracing::info!(app = %self.keys.prefix(), "close cache");
        Ok(())
    }

    /// The underlying store, for commands this crate does not wrap.
    ///
    /// Keys passed to it are not namespaced; use [`Cache::keys`] to compose
    /// them.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn keys(&self) -> &KeyComposer {
        &self.keys
    }

    pub(crate) fn module_key(&self, module: Module, key: &str) -> String {
        self.keys.compose_module(module, key)
    }

    pub(crate) fn lock_poll_interval(&self) -> Duration {
        self.lock_poll_interval
    }

    pub(crate) fn lock_release(&self) -> LockRelease {
        self.lock_release
    }

    async fn set_bytes(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let full_key = self.keys.compose(key);
        self.store.set(&full_key, value, ttl).await?;
        tracing::debug!(key = %full_key, ttl = ?ttl, "cache set");
        Ok(())
    }

    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>> {
        let full_key = self.keys.compose(key);
        match self.store.get(&full_key).await? {
            Some(bytes) => {
                tracing::trace!(key = %full_key, "cache hit");
                Ok(bytes)
            }
            None => {
                tracing::trace!(key = %full_key, "cache miss");
                Err(CacheError::NotFound)
            }
        }
    }

    async fn set_value<V: CacheValue>(
        &self,
        key: &str,
        value: &V,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.set_bytes(key, &value.encode(), ttl).await
    }

    async fn get_value<V: CacheValue>(&self, key: &str) -> Result<V> {
        V::decode(&self.get_bytes(key).await?)
    }

    pub async fn set_string(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.set_bytes(key, value.as_bytes(), ttl).await
    }

    pub async fn get_string(&self, key: &str) -> Result<String> {
        self.get_value(key).await
    }

    pub async fn set_int(&self, key: &str, value: i32, ttl: Option<Duration>) -> Result<()> {
        self.set_value(key, &value, ttl).await
    }

    pub async fn get_int(&self, key: &str) -> Result<i32> {
        self.get_value(key).await
    }

    pub async fn set_int64(&self, key: &str, value: i64, ttl: Option<Duration>) -> Result<()> {
        self.set_value(key, &value, ttl).await
    }

    pub async fn get_int64(&self, key: &str) -> Result<i64> {
        self.get_value(key).await
    }

    pub async fn set_float64(&self, key: &str, value: f64, ttl: Option<Duration>) -> Result<()> {
        self.set_value(key, &value, ttl).await
    }

    pub async fn get_float64(&self, key: &str) -> Result<f64> {
        self.get_value(key).await
    }

    /// Stores `true` as `1` and `false` as `0`.
    pub async fn set_bool(&self, key: &str, value: bool, ttl: Option<Duration>) -> Result<()> {
        self.set_value(key, &value, ttl).await
    }

    pub async fn get_bool(&self, key: &str) -> Result<bool> {
        self.get_value(key).await
    }

    /// Stores `value` as JSON.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Serialize` if the value cannot be encoded.
    pub async fn set_object<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let bytes = serialize_object(value)?;
        self.set_bytes(key, &bytes, ttl).await
    }

    /// Reads a JSON object.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::NotFound` when absent and `CacheError::Decode`
    /// when the stored bytes are not valid JSON for `T`.
    pub async fn get_object<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        deserialize_object(&self.get_bytes(key).await?)
    }

    /// Deletes a key. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let full_key = self.keys.compose(key);
        let removed = self.store.del(&full_key).await?;
        tracing::debug!(key = %full_key, removed, "cache delete");
        Ok(removed > 0)
    }

    /// Remaining time to live, at second resolution.
    pub async fn ttl(&self, key: &str) -> Advisory<Ttl> {
        self.store
            .ttl(&self.keys.compose(key))
            .await
            .map(Ttl::from_secs)
            .into()
    }

    /// Remaining time to live, at millisecond resolution.
    pub async fn pttl(&self, key: &str) -> Advisory<Ttl> {
        self.store
            .pttl(&self.keys.compose(key))
            .await
            .map(Ttl::from_millis)
            .into()
    }
}
