//! Keyed counter storage.
//!
//! A [`CounterStore`] holds two shapes of data:
//!
//! ```text
//! {key}  -> { field: integer, ... }   flat field set, one per (scope, kind)
//! {key}  -> integer                   single scalar, one per scope
//! ```
//!
//! Absence is never an error: an unwritten field set reads back empty and an unwritten scalar
//! reads back as `None`. Failures are split into transport problems (the caller may retry) and
//! decode problems (the stored data itself is bad).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Subject -> count for a single key.
pub type CounterMap = HashMap<String, i64>;

#[async_trait]
pub trait CounterStore: Send + Sync + core::fmt::Debug {
    /// Full field set stored under `key`, or an empty map when the key was never written.
    async fn read_fields(&self, key: &str) -> StoreResult<CounterMap>;

    /// Replaces the whole field set under `key` in a single round trip. An empty map removes the
    /// key entirely.
    async fn write_fields(&self, key: &str, fields: &CounterMap) -> StoreResult<()>;

    /// Atomically adds `delta` to one field, creating it at zero first if needed, and returns the
    /// resulting value.
    async fn increment_field(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64>;

    /// Lifts every listed field to at least the given value in one atomic step. Fields already
    /// higher, and fields not listed, are left alone; the key is never removed.
    async fn raise_fields(&self, key: &str, floors: &CounterMap) -> StoreResult<()>;

    async fn get_scalar(&self, key: &str) -> StoreResult<Option<i64>>;

    async fn set_scalar(&self, key: &str, value: i64) -> StoreResult<()>;
}

pub type StoreResult<T> = core::result::Result<T, StoreErr>;

#[derive(Debug, Error)]
pub enum StoreErr {
    #[error("store transport failure: {0}")]
    Transport(#[from] ::redis::RedisError),

    #[error("store round trip exceeded {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Decode(#[from] DecodeErr),

    #[error("adding {delta} to '{key}[{field}]' overflows")]
    Overflow {
        key: String,
        field: String,
        delta: i64,
    },
}

impl StoreErr {
    /// Transport failures and timeouts may succeed on a later attempt; corrupt data and
    /// overflowing counters will not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreErr::Transport(_) | StoreErr::Timeout(_))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot decode {value:?} stored at '{location}' as a non-negative integer")]
pub struct DecodeErr {
    pub location: String,
    pub value: String,
}

impl DecodeErr {
    pub fn new(location: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            value: value.into(),
        }
    }
}

/// Parses a raw stored value, rejecting anything that isn't a non-negative integer.
pub(crate) fn decode_count(location: impl FnOnce() -> String, raw: &str) -> StoreResult<i64> {
    match raw.trim().parse::<i64>() {
        Ok(value) if value >= 0 => Ok(value),
        _ => Err(DecodeErr::new(location(), raw).into()),
    }
}

pub(crate) fn decode_fields(key: &str, raw: HashMap<String, String>) -> StoreResult<CounterMap> {
    raw.into_iter()
        .map(|(field, value)| -> StoreResult<(String, i64)> {
            let count = decode_count(|| format!("{key}[{field}]"), &value)?;
            Ok((field, count))
        })
        .collect()
}
