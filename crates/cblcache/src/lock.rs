//! Distributed locks keyed by name and owned by a caller-chosen ticket.
//!
//! A lock is a single store entry whose value is the owner's ticket. It is
//! created with `SET NX` and an expiry, which is the only protection against
//! an owner that crashes while holding it; there is no lease renewal.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use cblcache_core::cache::{CacheError, CompareAndDelete, Module, Result, Store};

use crate::handle::Cache;

/// How [`Locks::unlock`] releases a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockRelease {
    /// Reads the ticket, then deletes the entry if it matches.
    ///
    /// The lock can expire and be taken by another owner between the two
    /// steps, in which case the new owner's lock is deleted.
    #[default]
    ReadThenDelete,
    /// Checks and deletes in one server-side script.
    CompareAndDelete,
}

impl LockRelease {
    /// Parses `read-then-delete` or `compare-and-delete`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "read-then-delete" => Some(Self::ReadThenDelete),
            "compare-and-delete" => Some(Self::CompareAndDelete),
            _ => None,
        }
    }
}

/// Generates a random ticket identifying one lock owner.
pub fn new_ticket() -> String {
    Uuid::new_v4().to_string()
}

/// Lock operations of a [`Cache`].
pub struct Locks<'a, S: Store> {
    cache: &'a Cache<S>,
}

impl<S: Store> Cache<S> {
    pub fn locks(&self) -> Locks<'_, S> {
        Locks { cache: self }
    }
}

impl<S: Store> Locks<'_, S> {
    fn key(&self, name: &str) -> String {
        self.cache.module_key(Module::Lock, name)
    }

    /// Attempts to take the lock once. Returns true iff this call created it.
    pub async fn lock(&self, name: &str, ticket: &str, expire: Duration) -> Result<bool> {
        let key = self.key(name);
        let acquired = self
            .cache
            .store()
            .set_nx(&key, ticket.as_bytes(), Some(expire))
            .await?;
        tracing::debug!(lock = %key, ticket, acquired, "lock");
        Ok(acquired)
    }

    /// Releases the lock if `ticket` owns it.
    ///
    /// An absent (or expired) lock counts as released.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::UnlockTicketMismatch` if another ticket holds the
    /// lock; the lock is left in place.
    pub async fn unlock(&self, name: &str, ticket: &str) -> Result<()> {
        let key = self.key(name);
        let outcome = match self.cache.lock_release() {
            LockRelease::ReadThenDelete => self.read_then_delete(&key, ticket).await?,
            LockRelease::CompareAndDelete => {
                self.cache
                    .store()
                    .compare_and_delete(&key, ticket.as_bytes())
                    .await?
            }
        };

        match outcome {
            CompareAndDelete::Deleted => {
                tracing::debug!(lock = %key, ticket, "unlock");
                Ok(())
            }
            CompareAndDelete::Missing => {
                tracing::debug!(lock = %key, ticket, "unlock on absent lock");
                Ok(())
            }
            CompareAndDelete::Mismatch { held_by } => {
                tracing::warn!(lock = %key, ticket, held_by = %held_by, "unlock rejected");
                Err(CacheError::UnlockTicketMismatch { held_by })
            }
        }
    }

    async fn read_then_delete(&self, key: &str, ticket: &str) -> Result<CompareAndDelete> {
        let store = self.cache.store();
        let Some(held) = store.get(key).await? else {
            return Ok(CompareAndDelete::Missing);
        };

        if held != ticket.as_bytes() {
            return Ok(CompareAndDelete::Mismatch {
                held_by: String::from_utf8_lossy(&held).into_owned(),
            });
        }

        store.del(key).await?;
        Ok(CompareAndDelete::Deleted)
    }

    /// Retries [`Locks::lock`] until it succeeds or `timeout` elapses.
    ///
    /// Attempts are spaced by the configured poll interval. Returns false on
    /// timeout; `Duration::MAX` waits until the lock is free. Waiters are not
    /// served in any particular order.
    pub async fn try_lock(
        &self,
        name: &str,
        ticket: &str,
        expire: Duration,
        timeout: Duration,
    ) -> Result<bool> {
        self.try_lock_with_cancel(name, ticket, expire, timeout, std::future::pending::<()>())
            .await
    }

    /// Like [`Locks::try_lock`], but also gives up as soon as `cancel`
    /// completes.
    pub async fn try_lock_with_cancel<F>(
        &self,
        name: &str,
        ticket: &str,
        expire: Duration,
        timeout: Duration,
        cancel: F,
    ) -> Result<bool>
    where
        F: Future,
    {
        // A timeout too large to represent means "no deadline".
        let deadline = Instant::now().checked_add(timeout);
        tokio::pin!(cancel);

        loop {
            if self.lock(name, ticket, expire).await? {
                return Ok(true);
            }

            let mut wait = self.cache.lock_poll_interval();
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    tracing::debug!(lock = name, ticket, "try_lock timed out");
                    return Ok(false);
                }
                wait = wait.min(deadline - now);
            }

            tokio::select! {
                _ = &mut cancel => {
                    tracing::debug!(lock = name, ticket, "try_lock cancelled");
                    return Ok(false);
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::cache::MemoryStore;
    use crate::config::CacheConfig;

    fn cache_with(release: LockRelease) -> Cache<MemoryStore> {
        Cache::in_memory(&CacheConfig {
            lock_release: release,
            ..CacheConfig::new("cblcache")
        })
    }

    #[test]
    fn test_lock_release_parse() {
        assert_eq!(
            LockRelease::parse("read-then-delete"),
            Some(LockRelease::ReadThenDelete)
        );
        assert_eq!(
            LockRelease::parse(" Compare-And-Delete "),
            Some(LockRelease::CompareAndDelete)
        );
        assert_eq!(LockRelease::parse("cas"), None);
    }

    #[test]
    fn test_new_ticket_is_unique() {
        let a = new_ticket();
        let b = new_ticket();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let cache = cache_with(LockRelease::ReadThenDelete);
        let locks = cache.locks();
        let expire = Duration::from_secs(10);

        assert!(locks.lock("awesomelock", "t1", expire).await.unwrap());
        assert!(!locks.lock("awesomelock", "t2", expire).await.unwrap());

        locks.unlock("awesomelock", "t1").await.unwrap();
        assert!(locks.lock("awesomelock", "t2", expire).await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_expires() {
        let cache = cache_with(LockRelease::ReadThenDelete);
        let locks = cache.locks();

        assert!(locks
            .lock("l", "t1", Duration::from_millis(10))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(locks.lock("l", "t2", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_lock_has_single_winner() {
        let cache = cache_with(LockRelease::ReadThenDelete);
        let winners = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..10)
            .map(|i| {
                let cache = cache.clone();
                let winners = Arc::clone(&winners);
                tokio::spawn(async move {
                    let ticket = format!("ticket-{i}");
                    if cache
                        .locks()
                        .lock("contended", &ticket, Duration::from_secs(10))
                        .await
                        .unwrap()
                    {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    async fn assert_unlock_requires_owner(release: LockRelease) {
        let cache = cache_with(release);
        let locks = cache.locks();
        locks
            .lock("owned", "t1", Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(
            locks.unlock("owned", "t2").await,
            Err(CacheError::UnlockTicketMismatch {
                held_by: "t1".to_string()
            })
        );
        assert!(!locks
            .lock("owned", "t3", Duration::from_secs(10))
            .await
            .unwrap());

        locks.unlock("owned", "t1").await.unwrap();
        assert!(locks
            .lock("owned", "t3", Duration::from_secs(10))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_unlock_requires_owner_read_then_delete() {
        assert_unlock_requires_owner(LockRelease::ReadThenDelete).await;
    }

    #[tokio::test]
    async fn test_unlock_requires_owner_compare_and_delete() {
        assert_unlock_requires_owner(LockRelease::CompareAndDelete).await;
    }

    #[tokio::test]
    async fn test_unlock_absent_lock_is_ok() {
        for release in [LockRelease::ReadThenDelete, LockRelease::CompareAndDelete] {
            let cache = cache_with(release);
            assert_eq!(cache.locks().unlock("never", "t1").await, Ok(()));
        }
    }

    #[tokio::test]
    async fn test_try_lock_waits_for_release() {
        let cache = cache_with(LockRelease::ReadThenDelete);
        cache
            .locks()
            .lock("busy", "holder", Duration::from_secs(10))
            .await
            .unwrap();

        let releaser = {
            let cache = cache.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cache.locks().unlock("busy", "holder").await.unwrap();
            })
        };

        let acquired = cache
            .locks()
            .try_lock(
                "busy",
                "waiter",
                Duration::from_secs(10),
                Duration::from_secs(2),
            )
            .await
            .unwrap();

        releaser.await.unwrap();
        assert!(acquired);
    }

    #[tokio::test]
    async fn test_try_lock_times_out() {
        let cache = cache_with(LockRelease::ReadThenDelete);
        let locks = cache.locks();
        locks
            .lock("busy", "holder", Duration::from_secs(10))
            .await
            .unwrap();

        let start = Instant::now();
        let acquired = locks
            .try_lock(
                "busy",
                "waiter",
                Duration::from_secs(10),
                Duration::from_millis(50),
            )
            .await
            .unwrap();

        assert!(!acquired);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_try_lock_with_cancel() {
        let cache = cache_with(LockRelease::ReadThenDelete);
        let locks = cache.locks();
        locks
            .lock("busy", "holder", Duration::from_secs(10))
            .await
            .unwrap();

        let start = Instant::now();
        let acquired = locks
            .try_lock_with_cancel(
                "busy",
                "waiter",
                Duration::from_secs(10),
                Duration::from_secs(10),
                tokio::time::sleep(Duration::from_millis(30)),
            )
            .await
            .unwrap();

        assert!(!acquired);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_try_lock_without_deadline() {
        let cache = cache_with(LockRelease::ReadThenDelete);
        cache
            .locks()
            .lock("busy", "holder", Duration::from_secs(10))
            .await
            .unwrap();

        let releaser = {
            let cache = cache.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                cache.locks().unlock("busy", "holder").await.unwrap();
            })
        };

        let acquired = cache
            .locks()
            .try_lock("busy", "waiter", Duration::from_secs(10), Duration::MAX)
            .await
            .unwrap();

        releaser.await.unwrap();
        assert!(acquired);

        let cancelled = cache
            .locks()
            .try_lock_with_cancel(
                "busy",
                "late",
                Duration::from_secs(10),
                Duration::MAX,
                tokio::time::sleep(Duration::from_millis(30)),
            )
            .await
            .unwrap();
        assert!(!cancelled);
    }

    #[tokio::test]
    async fn test_lock_survives_capacity_pressure() {
        let cache = Cache::in_memory(&CacheConfig {
            memory_max_entries: 4,
            ..CacheConfig::new("cblcache")
        });
        let locks = cache.locks();
        assert!(locks
            .lock("held", "t1", Duration::from_secs(10))
            .await
            .unwrap());

        for i in 0..20 {
            cache
                .set_int(&format!("filler.{i}"), i, None)
                .await
                .unwrap();
        }

        assert!(!locks
            .lock("held", "t2", Duration::from_secs(10))
            .await
            .unwrap());
        assert_eq!(
            locks.unlock("held", "t2").await,
            Err(CacheError::UnlockTicketMismatch {
                held_by: "t1".to_string()
            })
        );
    }
}
