#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! State conservation status enrichment.
//!
//! Loads the state natural heritage reference table (CSV) and left-joins
//! it onto fetched occurrences by scientific name. Every occurrence is
//! kept; `has_status` marks the ones whose match carries a state
//! conservation rank.

pub mod enrich;
pub mod reference;

pub use enrich::{EnrichedOccurrence, EnrichedTable, HAS_STATUS_COLUMN, enrich, match_name};
pub use reference::{ReferenceTable, StatusReferenceRow};

/// Errors from status enrichment.
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    /// The reference table could not be opened or read.
    #[error("Status reference table unavailable ({path}): {message}")]
    ReferenceTableUnavailable {
        /// Where the table was read from.
        path: String,
        /// What went wrong.
        message: String,
    },
}
