//! TTL cache abstraction for resolved boundaries.
//!
//! The resolver never reads the wall clock itself: it asks a [`Clock`] for
//! the current time and hands explicit expiry instants to the
//! [`BoundaryCache`]. Tests drive expiry with [`ManualClock`].

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

use crate::ResolvedBoundary;

/// Errors from a cache backend.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The backing store failed.
    #[error("Cache backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },

    /// A stored entry could not be (de)serialized.
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// [`Clock`] reading the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// [`Clock`] that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at `now`.
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Key-value store for resolved boundaries with per-entry expiry.
pub trait BoundaryCache: Send + Sync {
    /// Returns the entry stored under `key` if it expires after `now`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backend cannot be read.
    fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<ResolvedBoundary>, CacheError>;

    /// Stores `value` under `key` until `expires_at`, replacing any
    /// previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backend cannot be written.
    fn put(
        &self,
        key: &str,
        value: &ResolvedBoundary,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CacheError>;
}

/// Process-local [`BoundaryCache`].
#[derive(Debug, Default)]
pub struct MemoryBoundaryCache {
    entries: Mutex<BTreeMap<String, (ResolvedBoundary, DateTime<Utc>)>>,
}

impl MemoryBoundaryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BoundaryCache for MemoryBoundaryCache {
    fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<ResolvedBoundary>, CacheError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(value, _)| value.clone()))
    }

    fn put(
        &self,
        key: &str,
        value: &ResolvedBoundary,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), (value.clone(), expires_at));
        Ok(())
    }
}
