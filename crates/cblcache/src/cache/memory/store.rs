//! In-memory store with LRU eviction.
//!
//! Mirrors the Redis semantics the cache layer relies on:
//! - values, lists and sets live under one keyspace and reject commands of
//!   the wrong kind with a `WRONGTYPE` error
//! - expiry is lazy (entries are dropped when touched after their deadline)
//! - lists and sets disappear when their last element is removed
//! - every command runs under one mutex, which gives the same per-command
//!   atomicity as a single-threaded Redis server
//!
//! When the store is full, inserting a new key evicts the least recently
//! used entry that is not a live lock. Entries written with `set_nx` are
//! pinned until they expire or are deleted; if every entry is pinned the
//! insert fails with an out-of-memory error, like Redis under `noeviction`.
//!
//! Expiries too far in the future to be represented are treated as "no
//! expiry", and blocking pops with such a timeout wait without a deadline.

use std::collections::{HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use rand::seq::IteratorRandom;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use cblcache_core::cache::{
    effective_ttl, CacheError, CompareAndDelete, FloorDecrement, Result, Store, TTL_MISSING,
    TTL_PERSISTENT,
};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";
const NOT_AN_INTEGER: &str = "ERR value is not an integer or out of range";
const OUT_OF_MEMORY: &str = "OOM every entry is a live lock, cannot evict";

#[derive(Debug, Clone)]
enum Value {
    Bytes(Vec<u8>),
    List(VecDeque<Vec<u8>>),
    Set(HashSet<String>),
}

/// A single entry with optional expiration.
#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
    /// Exempt from LRU eviction while live.
    pinned: bool,
}

impl Entry {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: effective_ttl(ttl).and_then(deadline_after),
            pinned: false,
        }
    }

    fn pinned(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            pinned: true,
            ..Self::new(value, ttl)
        }
    }

    /// Returns true if this entry has expired.
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() >= exp)
    }

    fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|exp| exp.saturating_duration_since(Instant::now()))
    }
}

type Entries = LruCache<String, Entry>;

/// `now + d`, or `None` when the instant is not representable.
fn deadline_after(d: Duration) -> Option<Instant> {
    Instant::now().checked_add(d)
}

/// Inserts `entry` under `key`, evicting the least recently used unpinned
/// entry if the store is full.
fn insert(entries: &mut Entries, key: &str, entry: Entry) -> Result<()> {
    if !entries.contains(key) && entries.len() >= entries.cap().get() {
        let victim = entries
            .iter()
            .rev()
            .find(|(_, e)| !e.pinned || e.is_expired())
            .map(|(k, _)| k.clone());
        match victim {
            Some(victim) => {
                entries.pop(&victim);
            }
            None => return Err(CacheError::OperationFailed(OUT_OF_MEMORY.to_string())),
        }
    }
    entries.put(key.to_string(), entry);
    Ok(())
}

/// Returns the live entry for `key`, dropping it first if it has expired.
fn live<'a>(entries: &'a mut Entries, key: &str) -> Option<&'a mut Entry> {
    if entries.peek(key).is_some_and(Entry::is_expired) {
        entries.pop(key);
        return None;
    }
    entries.get_mut(key)
}

fn wrong_type() -> CacheError {
    CacheError::OperationFailed(WRONGTYPE.to_string())
}

/// Parses a plain decimal integer (`-?[0-9]+`), the only form the store's
/// integer commands accept.
fn parse_integer(bytes: &[u8]) -> Option<i64> {
    let digits = bytes.strip_prefix(b"-").unwrap_or(bytes);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// In-memory store implementation.
///
/// Thread-safe via a tokio `Mutex` around an `LruCache`. Blocking pops wait
/// on a `Notify` that every push wakes.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
    pushed: Notify,
    closed: AtomicBool,
}

impl MemoryStore {
    /// Creates a new in-memory store holding at most `max_entries` keys.
    ///
    /// A capacity of 0 is treated as 1.
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            pushed: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(CacheError::ConnectionFailed("cache closed".to_string()))
        } else {
            Ok(())
        }
    }

    /// Applies `delta` to an integer entry, creating it at zero if absent.
    async fn add(&self, key: &str, delta: i64, ttl: Option<Duration>) -> Result<i64> {
        self.check_open()?;
        let mut entries = self.entries.lock().await;

        let value = match live(&mut entries, key) {
            Some(entry) => {
                let Value::Bytes(bytes) = &mut entry.value else {
                    return Err(wrong_type());
                };
                let current = parse_integer(bytes)
                    .ok_or_else(|| CacheError::OperationFailed(NOT_AN_INTEGER.to_string()))?;
                let next = current
                    .checked_add(delta)
                    .ok_or_else(|| CacheError::OperationFailed(NOT_AN_INTEGER.to_string()))?;
                *bytes = next.to_string().into_bytes();
                if let Some(ttl) = effective_ttl(ttl) {
                    entry.expires_at = deadline_after(ttl);
                }
                next
            }
            None => {
                let entry = Entry::new(Value::Bytes(delta.to_string().into_bytes()), ttl);
                insert(&mut entries, key, entry)?;
                delta
            }
        };

        Ok(value)
    }

    /// Looks up a set entry; `None` when absent.
    fn set_of<'a>(entries: &'a mut Entries, key: &str) -> Result<Option<&'a mut HashSet<String>>> {
        match live(entries, key) {
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => Ok(Some(set)),
            Some(_) => Err(wrong_type()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        self.check_open()
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_open()?;
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key) {
            Some(Entry {
                value: Value::Bytes(bytes),
                ..
            }) => Ok(Some(bytes.clone())),
            Some(_) => Err(wrong_type()),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        self.check_open()?;
        let mut entries = self.entries.lock().await;
        insert(&mut entries, key, Entry::new(Value::Bytes(value.to_vec()), ttl))
    }

    async fn set_nx(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<bool> {
        self.check_open()?;
        let mut entries = self.entries.lock().await;
        if live(&mut entries, key).is_some() {
            return Ok(false);
        }
        insert(
            &mut entries,
            key,
            Entry::pinned(Value::Bytes(value.to_vec()), ttl),
        )?;
        Ok(true)
    }

    async fn del(&self, key: &str) -> Result<u64> {
        self.check_open()?;
        let mut entries = self.entries.lock().await;
        let existed = live(&mut entries, key).is_some();
        entries.pop(key);
        Ok(u64::from(existed))
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        let millis = self.pttl(key).await?;
        if millis < 0 {
            return Ok(millis);
        }
        // Redis rounds to the nearest second.
        Ok((millis + 500) / 1000)
    }

    async fn pttl(&self, key: &str) -> Result<i64> {
        self.check_open()?;
        let mut entries = self.entries.lock().await;
        Ok(match live(&mut entries, key) {
            Some(entry) => match entry.remaining() {
                Some(left) => left.as_millis() as i64,
                None => TTL_PERSISTENT,
            },
            None => TTL_MISSING,
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.check_open()?;
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key) {
            Some(entry) => {
                entry.expires_at = deadline_after(ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<CompareAndDelete> {
        self.check_open()?;
        let mut entries = self.entries.lock().await;
        let outcome = match live(&mut entries, key) {
            None => CompareAndDelete::Missing,
            Some(Entry {
                value: Value::Bytes(bytes),
                ..
            }) if bytes.as_slice() == expected => CompareAndDelete::Deleted,
            Some(Entry {
                value: Value::Bytes(bytes),
                ..
            }) => CompareAndDelete::Mismatch {
                held_by: String::from_utf8_lossy(bytes).into_owned(),
            },
            Some(_) => return Err(wrong_type()),
        };

        if outcome == CompareAndDelete::Deleted {
            entries.pop(key);
        }
        Ok(outcome)
    }

    async fn incr_by(&self, key: &str, delta: i64, ttl: Option<Duration>) -> Result<i64> {
        self.add(key, delta, ttl).await
    }

    async fn decr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let delta = delta
            .checked_neg()
            .ok_or_else(|| CacheError::OperationFailed(NOT_AN_INTEGER.to_string()))?;
        self.add(key, delta, None).await
    }

    async fn decr_min_zero(&self, key: &str) -> Result<FloorDecrement> {
        self.check_open()?;
        let mut entries = self.entries.lock().await;
        let Some(entry) = live(&mut entries, key) else {
            return Ok(FloorDecrement::Missing);
        };
        let Value::Bytes(bytes) = &mut entry.value else {
            return Err(wrong_type());
        };
        let Some(current) = parse_integer(bytes) else {
            return Ok(FloorDecrement::NotInteger);
        };
        if current <= 0 {
            return Ok(FloorDecrement::AtFloor(current));
        }

        let next = current - 1;
        *bytes = next.to_string().into_bytes();
        Ok(FloorDecrement::Decremented(next))
    }

    async fn rpush(&self, key: &str, value: &[u8]) -> Result<u64> {
        self.check_open()?;
        let len = {
            let mut entries = self.entries.lock().await;
            match live(&mut entries, key) {
                Some(Entry {
                    value: Value::List(list),
                    ..
                }) => {
                    list.push_back(value.to_vec());
                    list.len()
                }
                Some(_) => return Err(wrong_type()),
                None => {
                    let list = VecDeque::from([value.to_vec()]);
                    insert(&mut entries, key, Entry::new(Value::List(list), None))?;
                    1
                }
            }
        };

        self.pushed.notify_waiters();
        Ok(len as u64)
    }

    async fn lpop(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_open()?;
        let mut entries = self.entries.lock().await;
        let (head, now_empty) = match live(&mut entries, key) {
            Some(Entry {
                value: Value::List(list),
                ..
            }) => {
                let head = list.pop_front();
                (head, list.is_empty())
            }
            Some(_) => return Err(wrong_type()),
            None => return Ok(None),
        };

        if now_empty {
            entries.pop(key);
        }
        Ok(head)
    }

    async fn blpop(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let deadline = deadline_after(timeout);

        loop {
            // Register for wake-ups before looking, so a push between the
            // check and the wait is not missed.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(head) = self.lpop(key).await? {
                return Ok(Some(head));
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(None);
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn llen(&self, key: &str) -> Result<u64> {
        self.check_open()?;
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key) {
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Ok(list.len() as u64),
            Some(_) => Err(wrong_type()),
            None => Ok(0),
        }
    }

    async fn sadd(&self, key: &str, members: &[String]) -> Result<u64> {
        self.check_open()?;
        let mut entries = self.entries.lock().await;
        if let Some(set) = Self::set_of(&mut entries, key)? {
            let added = members.iter().filter(|m| set.insert((*m).clone())).count();
            return Ok(added as u64);
        }

        let set: HashSet<String> = members.iter().cloned().collect();
        let added = set.len() as u64;
        if added > 0 {
            insert(&mut entries, key, Entry::new(Value::Set(set), None))?;
        }
        Ok(added)
    }

    async fn srem(&self, key: &str, members: &[String]) -> Result<u64> {
        self.check_open()?;
        let mut entries = self.entries.lock().await;
        let (removed, now_empty) = match Self::set_of(&mut entries, key)? {
            Some(set) => {
                let removed = members.iter().filter(|m| set.remove(m.as_str())).count();
                (removed as u64, set.is_empty())
            }
            None => return Ok(0),
        };

        if now_empty {
            entries.pop(key);
        }
        Ok(removed)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.check_open()?;
        let mut entries = self.entries.lock().await;
        Ok(Self::set_of(&mut entries, key)?
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        self.check_open()?;
        let mut entries = self.entries.lock().await;
        Ok(Self::set_of(&mut entries, key)?.map_or(0, |set| set.len() as u64))
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        self.check_open()?;
        let mut entries = self.entries.lock().await;
        Ok(Self::set_of(&mut entries, key)?.is_some_and(|set| set.contains(member)))
    }

    async fn srandmember(&self, key: &str, count: usize) -> Result<Vec<String>> {
        self.check_open()?;
        let mut entries = self.entries.lock().await;
        let Some(set) = Self::set_of(&mut entries, key)? else {
            return Ok(Vec::new());
        };
        Ok(set
            .iter()
            .cloned()
            .choose_multiple(&mut rand::rng(), count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store() -> MemoryStore {
        MemoryStore::new(100)
    }

    #[tokio::test]
    async fn test_memory_set_and_get() {
        let store = store();
        store.set("k", b"hello world", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"hello world".to_vec()));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_ttl_sentinels() {
        let store = store();
        store.set("forever", b"v", None).await.unwrap();
        store
            .set("soon", b"v", Some(Duration::from_secs(30)))
            .await
            .unwrap();

        assert_eq!(store.ttl("forever").await.unwrap(), TTL_PERSISTENT);
        assert_eq!(store.pttl("missing").await.unwrap(), TTL_MISSING);
        assert_eq!(store.ttl("soon").await.unwrap(), 30);
        let millis = store.pttl("soon").await.unwrap();
        assert!(millis > 29_000 && millis <= 30_000);
    }

    #[tokio::test]
    async fn test_memory_lazy_expiry() {
        let store = store();
        store
            .set("k", b"v", Some(Duration::from_millis(10)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.ttl("k").await.unwrap(), TTL_MISSING);
        assert!(store.set_nx("k", b"again", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_wrong_type() {
        let store = store();
        store.rpush("list", b"x").await.unwrap();

        let result = store.get("list").await;
        assert_eq!(result, Err(CacheError::OperationFailed(WRONGTYPE.to_string())));
    }

    #[tokio::test]
    async fn test_memory_incr_on_non_integer() {
        let store = store();
        store.set("k", b"abc", None).await.unwrap();
        assert!(matches!(
            store.incr_by("k", 1, None).await,
            Err(CacheError::OperationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_list_removed_when_drained() {
        let store = store();
        store.rpush("q", b"only").await.unwrap();
        assert_eq!(store.lpop("q").await.unwrap(), Some(b"only".to_vec()));
        assert_eq!(store.del("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_memory_blpop_wakes_on_push() {
        let store = Arc::new(store());

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.blpop("q", Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.rpush("q", b"payload").await.unwrap();

        let popped = waiter.await.unwrap().unwrap();
        assert_eq!(popped, Some(b"payload".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_blpop_single_delivery() {
        let store = Arc::new(store());

        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.blpop("q", Duration::from_millis(300)).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.rpush("q", b"one").await.unwrap();

        let mut delivered = 0;
        for waiter in waiters {
            if waiter.await.unwrap().unwrap().is_some() {
                delivered += 1;
            }
        }
        assert_eq!(delivered, 1);
    }

    #[tokio::test]
    async fn test_memory_srandmember_distinct() {
        let store = store();
        let members: Vec<String> = (0..5).map(|i| format!("m{i}")).collect();
        store.sadd("s", &members).await.unwrap();

        let sample = store.srandmember("s", 3).await.unwrap();
        let unique: HashSet<&String> = sample.iter().collect();
        assert_eq!(sample.len(), 3);
        assert_eq!(unique.len(), 3);

        assert_eq!(store.srandmember("s", 50).await.unwrap().len(), 5);
        assert!(store.srandmember("missing", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_lru_eviction() {
        let store = MemoryStore::new(2);
        store.set("a", b"1", None).await.unwrap();
        store.set("b", b"2", None).await.unwrap();
        store.set("c", b"3", None).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("c").await.unwrap(), Some(b"3".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_closed_store_rejects_commands() {
        let store = store();
        store.close().await.unwrap();
        store.close().await.unwrap();

        assert!(matches!(
            store.get("k").await,
            Err(CacheError::ConnectionFailed(_))
        ));
        assert!(store.ping().await.is_err());
    }

    #[tokio::test]
    async fn test_memory_unrepresentable_ttl_means_no_expiry() {
        let store = store();
        store.set("k", b"v", Some(Duration::MAX)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.pttl("k").await.unwrap(), TTL_PERSISTENT);

        let half = Duration::from_secs(u64::MAX / 2);
        assert_eq!(store.incr_by("c", 1, Some(half)).await.unwrap(), 1);
        assert_eq!(store.incr_by("c", 1, Some(half)).await.unwrap(), 2);

        store.sadd("s", &["a".to_string()]).await.unwrap();
        assert!(store.expire("s", Duration::MAX).await.unwrap());
        assert_eq!(store.scard("s").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_blpop_without_deadline() {
        let store = Arc::new(store());

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.blpop("q", Duration::MAX).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.rpush("q", b"late").await.unwrap();

        assert_eq!(waiter.await.unwrap().unwrap(), Some(b"late".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_eviction_skips_live_locks() {
        let store = MemoryStore::new(2);
        assert!(store
            .set_nx("lock", b"t1", Some(Duration::from_secs(10)))
            .await
            .unwrap());
        store.set("a", b"1", None).await.unwrap();
        store.set("b", b"2", None).await.unwrap();

        assert_eq!(store.get("lock").await.unwrap(), Some(b"t1".to_vec()));
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("b").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_full_of_locks_rejects_inserts() {
        let store = MemoryStore::new(1);
        assert!(store.set_nx("lock", b"t1", None).await.unwrap());

        assert!(matches!(
            store.set("other", b"v", None).await,
            Err(CacheError::OperationFailed(_))
        ));
        assert_eq!(store.get("lock").await.unwrap(), Some(b"t1".to_vec()));

        store.del("lock").await.unwrap();
        store.set("other", b"v", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_expired_lock_is_evictable() {
        let store = MemoryStore::new(1);
        assert!(store
            .set_nx("lock", b"t1", Some(Duration::from_millis(10)))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(20)).await;

        store.set("other", b"v", None).await.unwrap();
        assert_eq!(store.get("other").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_decr_min_zero_rejects_non_decimal_integers() {
        let store = store();
        for raw in ["0x10", "1e3", "1.0", " 5", "+5", "99999999999999999999"] {
            store.set("c", raw.as_bytes(), None).await.unwrap();
            assert_eq!(
                store.decr_min_zero("c").await.unwrap(),
                FloorDecrement::NotInteger,
                "value {raw:?}"
            );
        }
    }
}
