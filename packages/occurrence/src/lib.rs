#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! GBIF occurrence retrieval.
//!
//! Pages through the GBIF occurrence search once per threat status,
//! merging every page into a single identifier-keyed [`OccurrenceSet`].
//! Each page request is wrapped in [`retry::retry_with_policy`] so
//! transient failures (connection errors, HTTP 429, HTTP 5xx) are retried
//! with exponential backoff before anything reaches the caller.

pub mod collection;
pub mod gbif;
pub mod progress;
pub mod retry;

pub use collection::OccurrenceSet;
pub use gbif::{DEFAULT_BASE_URL, FetchOptions, OccurrenceFetcher};
pub use progress::{NullProgress, ProgressCallback, null_progress};
pub use retry::{RetryError, RetryPolicy, retry_with_policy};

use species_map_http::HttpError;
use species_map_occurrence_models::ThreatStatus;

/// Errors from occurrence retrieval.
#[derive(Debug, thiserror::Error)]
pub enum OccurrenceError {
    /// A page kept failing with transient errors until the retry budget
    /// ran out. `source` is the final attempt's error, unchanged.
    #[error("Occurrence page {status}@{offset} still failing after {attempts} attempts: {source}")]
    Transient {
        /// Status being paged.
        status: ThreatStatus,
        /// Offset of the failing page.
        offset: u64,
        /// Attempts made.
        attempts: u32,
        /// Error from the last attempt.
        source: HttpError,
    },

    /// A page failed with an error that retrying will not fix.
    #[error("Occurrence page {status}@{offset} failed: {source}")]
    Failed {
        /// Status being paged.
        status: ThreatStatus,
        /// Offset of the failing page.
        offset: u64,
        /// The error.
        source: HttpError,
    },
}

impl OccurrenceError {
    /// The HTTP error behind this failure.
    #[must_use]
    pub const fn http_error(&self) -> &HttpError {
        match self {
            Self::Transient { source, .. } | Self::Failed { source, .. } => source,
        }
    }
}
