//! Namespaced cache, distributed lock, message queue, counter and set
//! helpers over a key-value store.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use cblcache::{Cache, CacheConfig};
//!
//! # async fn run() -> cblcache::Result<()> {
//! let cache = Cache::connect(&CacheConfig::new("shop")).await?;
//!
//! cache.set_string("greeting", "hello", Some(Duration::from_secs(60))).await?;
//! let ticket = cblcache::new_ticket();
//! if cache.locks().lock("checkout", &ticket, Duration::from_secs(5)).await? {
//!     cache.queues().push("orders", b"order-42").await?;
//!     cache.locks().unlock("checkout", &ticket).await?;
//! }
//! cache.close().await
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod counter;
pub mod handle;
pub mod lock;
mod memo;
pub mod queue;
pub mod set;

pub use cblcache_core::cache::{Advisory, CacheError, Result, Store, Ttl};
pub use config::CacheConfig;
pub use counter::Counters;
pub use handle::Cache;
pub use lock::{new_ticket, LockRelease, Locks};
pub use queue::{Queues, MIN_BLOCKING_TIMEOUT};
pub use set::Sets;

#[cfg(feature = "memory")]
pub use cache::MemoryStore;
#[cfg(feature = "redis")]
pub use cache::RedisStore;
