//! The conservation status reference table.
//!
//! A CSV export with one row per taxon. Only the columns below are read;
//! any others are ignored. Empty cells are treated as missing.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::StatusError;

/// Header of the join column.
pub const SCIENTIFIC_NAME_COLUMN: &str = "Scientific name";

/// Header of the column that decides `has_status`.
pub const STATE_RANK_COLUMN: &str = "State conservation status rank";

/// Reference columns carried into the output, in output order.
pub const REFERENCE_COLUMNS: [&str; 6] = [
    "Primary common name",
    "Global conservation status rank",
    STATE_RANK_COLUMN,
    "Federal protection",
    "State protection",
    "Species of greatest conservation need",
];

/// One row of the reference table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StatusReferenceRow {
    #[serde(rename = "Scientific name")]
    pub scientific_name: Option<String>,
    #[serde(rename = "Primary common name")]
    pub common_name: Option<String>,
    #[serde(rename = "Global conservation status rank")]
    pub global_rank: Option<String>,
    #[serde(rename = "State conservation status rank")]
    pub state_rank: Option<String>,
    #[serde(rename = "Federal protection")]
    pub federal_protection: Option<String>,
    #[serde(rename = "State protection")]
    pub state_protection: Option<String>,
    #[serde(rename = "Species of greatest conservation need")]
    pub greatest_conservation_need: Option<String>,
}

impl StatusReferenceRow {
    /// Values of [`REFERENCE_COLUMNS`], in the same order.
    #[must_use]
    pub fn values(&self) -> [Option<&str>; 6] {
        [
            self.common_name.as_deref(),
            self.global_rank.as_deref(),
            self.state_rank.as_deref(),
            self.federal_protection.as_deref(),
            self.state_protection.as_deref(),
            self.greatest_conservation_need.as_deref(),
        ]
    }

    /// Whether this row carries a state conservation rank.
    #[must_use]
    pub const fn has_state_rank(&self) -> bool {
        self.state_rank.is_some()
    }
}

/// Reference rows indexed by exact scientific name.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    rows: Vec<StatusReferenceRow>,
    by_name: BTreeMap<String, usize>,
}

impl ReferenceTable {
    /// Reads the reference CSV at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::ReferenceTableUnavailable`] if the file
    /// cannot be opened, lacks a required column, or contains a row that
    /// cannot be parsed.
    pub fn load(path: &Path) -> Result<Self, StatusError> {
        let label = path.display().to_string();
        let file = std::fs::File::open(path).map_err(|e| StatusError::ReferenceTableUnavailable {
            path: label.clone(),
            message: e.to_string(),
        })?;
        let table = Self::from_reader(file, &label)?;
        log::info!("Loaded {} status reference rows from {label}", table.len());
        Ok(table)
    }

    /// Reads reference CSV from `reader`. `label` names the source in
    /// errors.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::ReferenceTableUnavailable`] if a required
    /// column is missing or a row cannot be parsed.
    pub fn from_reader(reader: impl Read, label: &str) -> Result<Self, StatusError> {
        let unavailable = |message: String| StatusError::ReferenceTableUnavailable {
            path: label.to_owned(),
            message,
        };

        let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|e| unavailable(e.to_string()))?
            .clone();
        for required in std::iter::once(SCIENTIFIC_NAME_COLUMN).chain(REFERENCE_COLUMNS) {
            if !headers.iter().any(|h| h == required) {
                return Err(unavailable(format!("missing column {required:?}")));
            }
        }

        let rows = csv_reader
            .deserialize::<StatusReferenceRow>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| unavailable(e.to_string()))?;

        Ok(Self::from_rows(rows))
    }

    /// Indexes `rows` by scientific name.
    ///
    /// Rows without a scientific name are dropped. When a name repeats,
    /// the first row wins.
    #[must_use]
    pub fn from_rows(rows: impl IntoIterator<Item = StatusReferenceRow>) -> Self {
        let mut table = Self::default();
        for row in rows {
            let Some(name) = row.scientific_name.clone().filter(|n| !n.is_empty()) else {
                log::debug!("Skipping status reference row without a scientific name");
                continue;
            };
            if table.by_name.contains_key(&name) {
                log::warn!("Duplicate status reference row for {name:?}, keeping the first");
                continue;
            }
            table.by_name.insert(name, table.rows.len());
            table.rows.push(row);
        }
        table
    }

    /// Row whose scientific name equals `name` exactly.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&StatusReferenceRow> {
        self.by_name.get(name).map(|&i| &self.rows[i])
    }

    /// Number of indexed rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
