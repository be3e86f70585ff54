//! Boundary lookup cache stored in `DuckDB`.
//!
//! One row per query key holding the resolved boundary as JSON and its
//! expiry as epoch milliseconds. Entries are replaced on write and ignored
//! once expired; [`DuckDbBoundaryCache::purge_expired`] removes them.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use duckdb::Connection;
use species_map_boundary::ResolvedBoundary;
use species_map_boundary::cache::{BoundaryCache, CacheError};

use crate::DbError;

/// [`BoundaryCache`] persisted in a `DuckDB` file.
pub struct DuckDbBoundaryCache {
    conn: Mutex<Connection>,
}

impl DuckDbBoundaryCache {
    /// Opens (or creates) the cache database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            crate::paths::ensure_dir(parent)?;
        }

        Self::from_connection(Connection::open(path)?)
    }

    /// Opens a cache that lives only as long as this value.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn in_memory() -> Result<Self, DbError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DbError> {
        create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Deletes entries that expired at or before `now`. Returns how many
    /// were removed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the delete fails.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, DbError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = conn.execute(
            "DELETE FROM boundary_cache WHERE expires_at <= ?",
            duckdb::params![now.timestamp_millis()],
        )?;
        if removed > 0 {
            log::debug!("Purged {removed} expired boundary cache entries");
        }
        Ok(removed)
    }

    /// Number of stored entries, expired or not.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub fn len(&self) -> Result<usize, DbError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM boundary_cache", [], |row| {
            row.get(0)
        })?;
        usize::try_from(count).map_err(|e| DbError::Conversion {
            message: e.to_string(),
        })
    }

    fn lookup(&self, key: &str, now: DateTime<Utc>) -> Result<Option<String>, DbError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt =
            conn.prepare("SELECT payload FROM boundary_cache WHERE query_key = ? AND expires_at > ?")?;
        let mut rows = stmt.query(duckdb::params![key, now.timestamp_millis()])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn store(&self, key: &str, payload: &str, expires_at: DateTime<Utc>) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT OR REPLACE INTO boundary_cache (query_key, payload, expires_at)
             VALUES (?, ?, ?)",
            duckdb::params![key, payload, expires_at.timestamp_millis()],
        )?;
        Ok(())
    }
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS boundary_cache (
            query_key TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            expires_at BIGINT NOT NULL
        );",
    )?;
    Ok(())
}

fn backend(e: &DbError) -> CacheError {
    CacheError::Backend {
        message: e.to_string(),
    }
}

impl BoundaryCache for DuckDbBoundaryCache {
    fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<ResolvedBoundary>, CacheError> {
        let Some(payload) = self.lookup(key, now).map_err(|e| backend(&e))? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&payload)?))
    }

    fn put(
        &self,
        key: &str,
        value: &ResolvedBoundary,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_string(value)?;
        self.store(key, &payload, expires_at)
            .map_err(|e| backend(&e))
    }
}
