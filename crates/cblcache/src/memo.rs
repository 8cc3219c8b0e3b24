//! Cache-aside memoization of JSON objects.

use std::future::Future;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use cblcache_core::cache::Store;

use crate::handle::Cache;

impl<S: Store> Cache<S> {
    /// Returns the object cached under `key`, or loads, stores and returns it.
    ///
    /// Any read failure (missing key, stale shape, unreachable store) counts as
    /// a miss. A failed write-back is logged and the loaded value is still
    /// returned; only `loader` errors are propagated.
    pub async fn get_or_set_object<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        loader: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.get_object::<T>(key).await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_not_found() => {
                tracing::debug!(key, error = %err, "memo read failed, reloading");
            }
            Err(_) => {}
        }

        let value = loader().await?;
        if let Err(err) = self.set_object(key, &value, ttl).await {
            tracing::warn!(key, error = %err, "memo write-back failed");
        }
        Ok(value)
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Deserialize;

    use crate::cache::MemoryStore;
    use crate::config::CacheConfig;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct LunarDay {
        year: i32,
        month: u8,
        day: u8,
    }

    fn cache() -> Cache<MemoryStore> {
        Cache::in_memory(&CacheConfig::new("cblcache"))
    }

    fn day() -> LunarDay {
        LunarDay {
            year: 2024,
            month: 8,
            day: 15,
        }
    }

    #[tokio::test]
    async fn test_loader_runs_once() {
        let cache = cache();
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        for _ in 0..3 {
            let loader = move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(day())
            };
            let value: Result<LunarDay, String> = cache
                .get_or_set_object("lunar.2024-09-17", Some(Duration::from_secs(60)), loader)
                .await;
            assert_eq!(value, Ok(day()));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_shape_is_reloaded() {
        let cache = cache();
        cache.set_string("lunar.today", "not json", None).await.unwrap();

        let value: Result<LunarDay, String> = cache
            .get_or_set_object("lunar.today", None, || async { Ok(day()) })
            .await;

        assert_eq!(value, Ok(day()));
        assert_eq!(cache.get_object::<LunarDay>("lunar.today").await, Ok(day()));
    }

    #[tokio::test]
    async fn test_loader_error_is_returned_and_not_cached() {
        let cache = cache();

        let value: Result<LunarDay, String> = cache
            .get_or_set_object("lunar.bad", None, || async {
                Err("upstream unavailable".to_string())
            })
            .await;

        assert_eq!(value, Err("upstream unavailable".to_string()));
        assert!(cache
            .get_object::<LunarDay>("lunar.bad")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_closed_cache_still_loads() {
        let cache = cache();
        cache.close().await.unwrap();

        let value: Result<LunarDay, String> = cache
            .get_or_set_object("lunar.offline", None, || async { Ok(day()) })
            .await;

        assert_eq!(value, Ok(day()));
    }
}
