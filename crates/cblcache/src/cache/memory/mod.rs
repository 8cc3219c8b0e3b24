//! In-memory store backend.
//!
//! Provides a thread-safe, LRU-bounded store with TTL support for tests and
//! single-process deployments that want the cache API without a server.

mod store;

pub use store::MemoryStore;
