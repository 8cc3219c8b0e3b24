//! Unordered sets of unique string members.

use std::time::Duration;

use cblcache_core::cache::{Advisory, CacheError, Module, Result, Store, Ttl};

use crate::handle::Cache;

/// Set operations of a [`Cache`].
pub struct Sets<'a, S: Store> {
    cache: &'a Cache<S>,
}

impl<S: Store> Cache<S> {
    pub fn sets(&self) -> Sets<'_, S> {
        Sets { cache: self }
    }
}

impl<S: Store> Sets<'_, S> {
    fn key(&self, name: &str) -> String {
        self.cache.module_key(Module::Set, name)
    }

    /// All members, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::NotFound` when the set does not exist.
    pub async fn members(&self, name: &str) -> Result<Vec<String>> {
        let members = self.cache.store().smembers(&self.key(name)).await?;
        if members.is_empty() {
            return Err(CacheError::NotFound);
        }
        Ok(members)
    }

    /// Adds members, returning how many were not already present.
    pub async fn add(&self, name: &str, members: &[String]) -> Result<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let key = self.key(name);
        let added = self.cache.store().sadd(&key, members).await?;
        tracing::trace!(set = %key, added, "add");
        Ok(added)
    }

    /// Removes members, returning how many were present.
    pub async fn remove(&self, name: &str, members: &[String]) -> Result<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let key = self.key(name);
        let removed = self.cache.store().srem(&key, members).await?;
        tracing::trace!(set = %key, removed, "remove");
        Ok(removed)
    }

    pub async fn count(&self, name: &str) -> Result<u64> {
        self.cache.store().scard(&self.key(name)).await
    }

    pub async fn is_member(&self, name: &str, member: &str) -> Result<bool> {
        self.cache.store().sismember(&self.key(name), member).await
    }

    /// Up to `n` distinct members picked at random.
    pub async fn random_sample(&self, name: &str, n: usize) -> Result<Vec<String>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        self.cache.store().srandmember(&self.key(name), n).await
    }

    /// Removes the whole set. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let removed = self.cache.store().del(&self.key(name)).await?;
        Ok(removed > 0)
    }

    pub async fn ttl(&self, name: &str) -> Advisory<Ttl> {
        self.cache
            .store()
            .ttl(&self.key(name))
            .await
            .map(Ttl::from_secs)
            .into()
    }

    pub async fn pttl(&self, name: &str) -> Advisory<Ttl> {
        self.cache
            .store()
            .pttl(&self.key(name))
            .await
            .map(Ttl::from_millis)
            .into()
    }

    /// Sets the expiry of the whole set. Returns false if it does not exist.
    pub async fn set_expiry(&self, name: &str, expire: Duration) -> Result<bool> {
        self.cache.store().expire(&self.key(name), expire).await
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::cache::MemoryStore;
    use crate::config::CacheConfig;

    fn cache() -> Cache<MemoryStore> {
        Cache::in_memory(&CacheConfig::new("cblcache"))
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_membership_and_count() {
        let cache = cache();
        let sets = cache.sets();

        assert_eq!(sets.add("tags", &strings(&["a", "b", "c"])).await, Ok(3));
        assert_eq!(sets.add("tags", &strings(&["c", "d"])).await, Ok(1));
        assert_eq!(sets.count("tags").await, Ok(4));
        assert_eq!(sets.is_member("tags", "a").await, Ok(true));
        assert_eq!(sets.is_member("tags", "z").await, Ok(false));

        let members: HashSet<String> = sets.members("tags").await.unwrap().into_iter().collect();
        assert_eq!(members, strings(&["a", "b", "c", "d"]).into_iter().collect());

        assert_eq!(sets.remove("tags", &strings(&["a", "z"])).await, Ok(1));
        assert_eq!(sets.count("tags").await, Ok(3));
    }

    #[tokio::test]
    async fn test_missing_set() {
        let cache = cache();
        let sets = cache.sets();

        assert_eq!(sets.members("none").await, Err(CacheError::NotFound));
        assert_eq!(sets.count("none").await, Ok(0));
        assert_eq!(sets.is_member("none", "a").await, Ok(false));
        assert_eq!(sets.random_sample("none", 3).await, Ok(Vec::new()));
        assert_eq!(sets.ttl("none").await, Advisory::Known(Ttl::Missing));
        assert_eq!(sets.set_expiry("none", Duration::from_secs(1)).await, Ok(false));
    }

    #[tokio::test]
    async fn test_emptied_set_is_not_found() {
        let cache = cache();
        let sets = cache.sets();

        sets.add("s", &strings(&["only"])).await.unwrap();
        sets.remove("s", &strings(&["only"])).await.unwrap();

        assert_eq!(sets.members("s").await, Err(CacheError::NotFound));
    }

    #[tokio::test]
    async fn test_random_sample_is_distinct() {
        let cache = cache();
        let sets = cache.sets();
        let all = strings(&["a", "b", "c", "d", "e"]);
        sets.add("letters", &all).await.unwrap();

        let sample = sets.random_sample("letters", 3).await.unwrap();
        let unique: HashSet<&String> = sample.iter().collect();
        assert_eq!(sample.len(), 3);
        assert_eq!(unique.len(), 3);
        assert!(sample.iter().all(|m| all.contains(m)));

        assert_eq!(sets.random_sample("letters", 10).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_set_expiry() {
        let cache = cache();
        let sets = cache.sets();
        sets.add("s", &strings(&["a"])).await.unwrap();

        assert_eq!(sets.ttl("s").await, Advisory::Known(Ttl::Persistent));
        assert_eq!(sets.set_expiry("s", Duration::from_millis(10)).await, Ok(true));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sets.count("s").await, Ok(0));
        assert!(!sets.delete("s").await.unwrap());
    }
}
