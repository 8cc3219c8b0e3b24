//! Server-side scripts and the interpretation of their replies.
//!
//! Both scripts operate on `KEYS[1]` only and reply with a two-element array
//! `{status, payload}` so that every backend can share the decoding below.

use super::{CacheError, Result};

/// Decrements `KEYS[1]` unless it is absent or already at (or below) zero.
///
/// Replies `{0, new_value}`, `{1, 0}` when absent, `{2, current}` at the floor
/// and `{3, 0}` when the stored value is not a plain decimal 64-bit integer.
pub const DECR_MIN_ZERO: &str = r#"
local value = redis.call('GET', KEYS[1])
if not value then
    return {1, 0}
end
if not string.match(value, '^-?%d+$') then
    return {3, 0}
end
local n = tonumber(value)
if n < -9223372036854775808 then
    return {3, 0}
end
if n <= 0 then
    return {2, n}
end
local reply = redis.pcall('DECR', KEYS[1])
if type(reply) == 'table' and reply.err then
    return {3, 0}
end
return {0, reply}
"#;

/// Deletes `KEYS[1]` only if it holds `ARGV[1]`.
///
/// Replies `{1, ''}` after deleting, `{0, ''}` when absent and
/// `{-1, current}` when another ticket holds the key.
pub const COMPARE_AND_DELETE: &str = r#"
local value = redis.call('GET', KEYS[1])
if not value then
    return {0, ''}
end
if value == ARGV[1] then
    redis.call('DEL', KEYS[1])
    return {1, ''}
end
return {-1, value}
"#;

/// Outcome of a floor-at-zero decrement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FloorDecrement {
    Decremented(i64),
    AtFloor(i64),
    Missing,
    NotInteger,
}

impl FloorDecrement {
    /// Decodes the `{status, value}` reply of [`DECR_MIN_ZERO`].
    pub fn from_reply(status: i64, value: i64) -> Result<Self> {
        match status {
            0 => Ok(Self::Decremented(value)),
            1 => Ok(Self::Missing),
            2 => Ok(Self::AtFloor(value)),
            3 => Ok(Self::NotInteger),
            other => Err(CacheError::OperationFailed(format!(
                "unexpected decrement script status {other}"
            ))),
        }
    }

    /// Maps the outcome to the counter's public contract.
    pub fn into_result(self) -> Result<i64> {
        match self {
            Self::Decremented(value) => Ok(value),
            Self::AtFloor(_) => Err(CacheError::CounterAtFloor),
            Self::Missing => Err(CacheError::NotFound),
            Self::NotInteger => Err(CacheError::Decode(
                "counter value is not an integer".to_string(),
            )),
        }
    }
}

/// Outcome of a conditional delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompareAndDelete {
    Deleted,
    Missing,
    Mismatch { held_by: String },
}

impl CompareAndDelete {
    /// Decodes the `{status, holder}` reply of [`COMPARE_AND_DELETE`].
    pub fn from_reply(status: i64, holder: String) -> Result<Self> {
        match status {
            1 => Ok(Self::Deleted),
            0 => Ok(Self::Missing),
            -1 => Ok(Self::Mismatch { held_by: holder }),
            other => Err(CacheError::OperationFailed(format!(
                "unexpected unlock script status {other}"
            ))),
        }
    }
}
