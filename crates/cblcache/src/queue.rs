//! FIFO message queues backed by store lists.

use std::time::Duration;

use cblcache_core::cache::{Advisory, CacheError, Module, Result, Store};

use crate::handle::Cache;

/// Shortest wait of a blocking pop; the store counts timeouts in seconds.
pub const MIN_BLOCKING_TIMEOUT: Duration = Duration::from_secs(1);

/// Queue operations of a [`Cache`].
pub struct Queues<'a, S: Store> {
    cache: &'a Cache<S>,
}

impl<S: Store> Cache<S> {
    pub fn queues(&self) -> Queues<'_, S> {
        Queues { cache: self }
    }
}

impl<S: Store> Queues<'_, S> {
    fn key(&self, name: &str) -> String {
        self.cache.module_key(Module::Queue, name)
    }

    /// Appends a payload to the tail of the queue.
    pub async fn push(&self, name: &str, payload: &[u8]) -> Result<()> {
        let key = self.key(name);
        let len = self.cache.store().rpush(&key, payload).await?;
        tracing::trace!(queue = %key, len, "push");
        Ok(())
    }

    /// Removes and returns the head of the queue.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::NotFound` when the queue is empty.
    pub async fn pop(&self, name: &str) -> Result<Vec<u8>> {
        self.cache
            .store()
            .lpop(&self.key(name))
            .await?
            .ok_or(CacheError::NotFound)
    }

    /// Waits for the head of the queue for up to `timeout` (at least one
    /// second) and removes it.
    ///
    /// Each payload is delivered to exactly one waiter.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::NotFound` if nothing arrives in time.
    pub async fn blocking_pop(&self, name: &str, timeout: Duration) -> Result<Vec<u8>> {
        let key = self.key(name);
        let timeout = timeout.max(MIN_BLOCKING_TIMEOUT);
        match self.cache.store().blpop(&key, timeout).await? {
            Some(payload) => Ok(payload),
            None => {
                tracing::trace!(queue = %key, ?timeout, "blocking pop timed out");
                Err(CacheError::NotFound)
            }
        }
    }

    /// Number of queued payloads; 0 for a queue that does not exist.
    pub async fn length(&self, name: &str) -> Advisory<u64> {
        self.cache.store().llen(&self.key(name)).await.into()
    }

    /// Drops the whole queue. Reports how many keys were removed (0 or 1).
    pub async fn purge(&self, name: &str) -> Advisory<u64> {
        let key = self.key(name);
        let result = self.cache.store().del(&key).await;
        if let Ok(removed) = result {
            tracing::debug!(queue = %key, removed, "purge");
        }
        result.into()
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use tokio::time::Instant;

    use crate::cache::MemoryStore;
    use crate::config::CacheConfig;

    fn cache() -> Cache<MemoryStore> {
        Cache::in_memory(&CacheConfig::new("cblcache"))
    }

    #[tokio::test]
    async fn test_queue_is_fifo() {
        let cache = cache();
        let queues = cache.queues();

        for i in 0..1000 {
            queues.push("jobs", format!("{i}").as_bytes()).await.unwrap();
        }
        assert_eq!(queues.length("jobs").await, Advisory::Known(1000));

        for i in 0..1000 {
            let payload = queues.pop("jobs").await.unwrap();
            assert_eq!(payload, format!("{i}").into_bytes());
        }
        assert_eq!(queues.pop("jobs").await, Err(CacheError::NotFound));
    }

    #[tokio::test]
    async fn test_length_and_purge() {
        let cache = cache();
        let queues = cache.queues();

        assert_eq!(queues.length("q").await, Advisory::Known(0));
        assert_eq!(queues.purge("q").await, Advisory::Known(0));

        queues.push("q", b"a").await.unwrap();
        queues.push("q", b"b").await.unwrap();

        assert_eq!(queues.length("q").await, Advisory::Known(2));
        assert_eq!(queues.purge("q").await, Advisory::Known(1));
        assert_eq!(queues.length("q").await, Advisory::Known(0));
    }

    #[tokio::test]
    async fn test_blocking_pop_receives_push() {
        let cache = cache();

        let producer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cache.queues().push("events", b"ready").await.unwrap();
            })
        };

        let payload = cache
            .queues()
            .blocking_pop("events", Duration::from_secs(5))
            .await
            .unwrap();

        producer.await.unwrap();
        assert_eq!(payload, b"ready".to_vec());
    }

    #[tokio::test]
    async fn test_blocking_pop_times_out_after_floor() {
        let cache = cache();

        let start = Instant::now();
        let result = cache
            .queues()
            .blocking_pop("empty", Duration::from_millis(10))
            .await;

        assert_eq!(result, Err(CacheError::NotFound));
        assert!(start.elapsed() >= MIN_BLOCKING_TIMEOUT);
    }

    #[tokio::test]
    async fn test_queue_names_do_not_collide_with_locks() {
        let cache = cache();
        cache.queues().push("shared", b"x").await.unwrap();

        assert!(cache
            .locks()
            .lock("shared", "t", Duration::from_secs(1))
            .await
            .unwrap());
        assert_eq!(cache.queues().length("shared").await, Advisory::Known(1));
    }

    #[tokio::test]
    async fn test_closed_cache_length_is_unknown() {
        let cache = cache();
        cache.close().await.unwrap();

        let advisory = cache.queues().length("q").await;
        assert!(advisory.error().is_some());
        assert_eq!(advisory.value_or_default(), 0);
    }
}
