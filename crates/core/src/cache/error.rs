use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The key, queue, counter or set does not exist.
    #[error("key not exist")]
    NotFound,
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
    #[error("Cache connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Cache operation failed: {0}")]
    OperationFailed(String),
    /// A lock release was attempted with a ticket that does not own the lock.
    #[error("Lock is held by another ticket: {held_by}")]
    UnlockTicketMismatch { held_by: String },
    /// A floor-at-zero decrement was refused because the counter is at zero.
    #[error("Counter is already at zero")]
    CounterAtFloor,
}

impl CacheError {
    /// Returns true for the "key absent" case callers are expected to branch on.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
