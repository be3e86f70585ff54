#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Threat status codes and occurrence record types.
//!
//! GBIF occurrence records are loosely typed JSON objects. They are kept
//! as [`OccurrenceRecord`] maps and only projected onto a fixed column
//! set ([`OCCURRENCE_COLUMNS`]) when the output table is built.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Field holding GBIF's record identifier.
pub const IDENTIFIER_FIELD: &str = "gbifID";

/// IUCN Red List category, as used by GBIF's `iucnRedListCategory` filter.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
pub enum ThreatStatus {
    /// Extinct.
    #[serde(rename = "EX")]
    #[strum(serialize = "EX")]
    Extinct,
    /// Extinct in the wild.
    #[serde(rename = "EW")]
    #[strum(serialize = "EW")]
    ExtinctInTheWild,
    /// Critically endangered.
    #[serde(rename = "CR")]
    #[strum(serialize = "CR")]
    CriticallyEndangered,
    /// Endangered.
    #[serde(rename = "EN")]
    #[strum(serialize = "EN")]
    Endangered,
    /// Vulnerable.
    #[serde(rename = "VU")]
    #[strum(serialize = "VU")]
    Vulnerable,
    /// Near threatened.
    #[serde(rename = "NT")]
    #[strum(serialize = "NT")]
    NearThreatened,
    /// Least concern.
    #[serde(rename = "LC")]
    #[strum(serialize = "LC")]
    LeastConcern,
    /// Data deficient.
    #[serde(rename = "DD")]
    #[strum(serialize = "DD")]
    DataDeficient,
    /// Not evaluated.
    #[serde(rename = "NE")]
    #[strum(serialize = "NE")]
    NotEvaluated,
}

impl ThreatStatus {
    /// The statuses fetched when the caller does not choose: CR, EN, VU, NT.
    pub const DEFAULT: [Self; 4] = [
        Self::CriticallyEndangered,
        Self::Endangered,
        Self::Vulnerable,
        Self::NearThreatened,
    ];

    /// Human-readable category name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Extinct => "Extinct",
            Self::ExtinctInTheWild => "Extinct in the wild",
            Self::CriticallyEndangered => "Critically endangered",
            Self::Endangered => "Endangered",
            Self::Vulnerable => "Vulnerable",
            Self::NearThreatened => "Near threatened",
            Self::LeastConcern => "Least concern",
            Self::DataDeficient => "Data deficient",
            Self::NotEvaluated => "Not evaluated",
        }
    }
}

/// A single GBIF occurrence: a free-form JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OccurrenceRecord {
    fields: serde_json::Map<String, serde_json::Value>,
}

impl OccurrenceRecord {
    /// Wraps a JSON object.
    #[must_use]
    pub const fn new(fields: serde_json::Map<String, serde_json::Value>) -> Self {
        Self { fields }
    }

    /// Returns the raw value of `field`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.fields.get(field)
    }

    /// Returns `field` if it holds a non-empty string.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// All fields.
    #[must_use]
    pub const fn fields(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.fields
    }

    /// The record's GBIF identifier, if it carries a usable one.
    ///
    /// Null, zero, empty and non-scalar identifiers are treated as absent.
    #[must_use]
    pub fn identifier(&self) -> Option<String> {
        match self.fields.get(IDENTIFIER_FIELD)? {
            serde_json::Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }
}

impl OccurrenceRecord {
    /// Projects `column` out of this record.
    ///
    /// Missing fields and values that do not fit the column type become
    /// [`Cell::Null`]. Numeric strings are accepted for numeric columns.
    /// Text columns render non-string scalars and nested values as JSON.
    #[must_use]
    pub fn cell(&self, column: &Column) -> Cell {
        use serde_json::Value;

        let Some(value) = self.fields.get(column.name) else {
            return Cell::Null;
        };

        match (column.kind, value) {
            (_, Value::Null) => Cell::Null,
            (ColumnKind::Integer, Value::Number(n)) => n.as_i64().map_or(Cell::Null, Cell::Integer),
            (ColumnKind::Integer, Value::String(s)) => {
                s.trim().parse().map_or(Cell::Null, Cell::Integer)
            }
            (ColumnKind::Float, Value::Number(n)) => n.as_f64().map_or(Cell::Null, Cell::Float),
            (ColumnKind::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map_or(Cell::Null, Cell::Float),
            (ColumnKind::Boolean, Value::Bool(b)) => Cell::Boolean(*b),
            (ColumnKind::Text, Value::String(s)) => Cell::Text(s.clone()),
            (ColumnKind::Text, other) => Cell::Text(other.to_string()),
            _ => Cell::Null,
        }
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for OccurrenceRecord {
    fn from(fields: serde_json::Map<String, serde_json::Value>) -> Self {
        Self::new(fields)
    }
}

/// Identity of a record within one fetch session.
///
/// Records without an identifier get a synthetic key built from where they
/// were seen. Synthetic keys are a separate variant, so they can never
/// collide with a real identifier, but they are not stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordKey {
    /// GBIF identifier.
    Id(String),
    /// Position-derived key for a record without an identifier.
    Synthetic {
        /// Status whose page contained the record.
        status: ThreatStatus,
        /// Offset of that page.
        offset: u64,
        /// Number of records accumulated when this one was seen.
        ordinal: usize,
    },
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => f.write_str(id),
            Self::Synthetic {
                status,
                offset,
                ordinal,
            } => write!(f, "{status}-{offset}-{ordinal}"),
        }
    }
}

/// Storage type of an output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// 64-bit integer.
    Integer,
    /// 64-bit float.
    Float,
    /// Text.
    Text,
    /// Boolean flag.
    Boolean,
}

/// A named, typed output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Column name in the output table (and field name in the GBIF record
    /// for occurrence columns).
    pub name: &'static str,
    /// Storage type.
    pub kind: ColumnKind,
}

impl Column {
    /// A text column.
    #[must_use]
    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Text,
        }
    }
}

const fn text(name: &'static str) -> Column {
    Column::text(name)
}

/// A single typed value in the output table.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Missing value.
    Null,
    /// 64-bit integer.
    Integer(i64),
    /// 64-bit float.
    Float(f64),
    /// Text.
    Text(String),
    /// Boolean flag.
    Boolean(bool),
}

impl Cell {
    /// Text cell, or null when `value` is `None`.
    #[must_use]
    pub fn text(value: Option<&str>) -> Self {
        value.map_or(Self::Null, |s| Self::Text(s.to_owned()))
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Occurrence fields kept in the output table, in output order.
pub const OCCURRENCE_COLUMNS: &[Column] = &[
    Column {
        name: IDENTIFIER_FIELD,
        kind: ColumnKind::Integer,
    },
    text("scientificName"),
    text("vernacularName"),
    Column {
        name: "decimalLatitude",
        kind: ColumnKind::Float,
    },
    Column {
        name: "decimalLongitude",
        kind: ColumnKind::Float,
    },
    text("eventDate"),
    text("basisOfRecord"),
    text("datasetKey"),
    text("datasetName"),
    text("occurrenceStatus"),
    text("iucnRedListCategory"),
    text("kingdom"),
    text("phylum"),
    text("class"),
    text("order"),
    text("family"),
    text("genus"),
    text("species"),
    text("recordedBy"),
    text("identifiedBy"),
    text("institutionCode"),
    text("catalogNumber"),
    text("references"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr as _;

    fn record(value: serde_json::Value) -> OccurrenceRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn status_codes_round_trip() {
        for status in ThreatStatus::DEFAULT {
            assert_eq!(ThreatStatus::from_str(status.as_ref()).unwrap(), status);
        }
        assert_eq!(ThreatStatus::CriticallyEndangered.to_string(), "CR");
        assert!(ThreatStatus::from_str("XX").is_err());
    }

    #[test]
    fn identifier_accepts_numbers_and_strings() {
        assert_eq!(
            record(serde_json::json!({"gbifID": 4_011_867_340_u64})).identifier(),
            Some("4011867340".to_string())
        );
        assert_eq!(
            record(serde_json::json!({"gbifID": "abc"})).identifier(),
            Some("abc".to_string())
        );
    }

    #[test]
    fn falsy_identifiers_are_absent() {
        for value in [
            serde_json::json!({}),
            serde_json::json!({"gbifID": null}),
            serde_json::json!({"gbifID": 0}),
            serde_json::json!({"gbifID": ""}),
            serde_json::json!({"gbifID": [1]}),
        ] {
            assert_eq!(record(value.clone()).identifier(), None, "{value}");
        }
    }

    #[test]
    fn synthetic_key_never_equals_real_id() {
        let synthetic = RecordKey::Synthetic {
            status: ThreatStatus::Endangered,
            offset: 0,
            ordinal: 3,
        };
        assert_eq!(synthetic.to_string(), "EN-0-3");
        assert_ne!(synthetic, RecordKey::Id("EN-0-3".to_string()));
    }

    #[test]
    fn cells_follow_column_kind() {
        let r = record(serde_json::json!({
            "gbifID": "4011867340",
            "decimalLatitude": 41.85,
            "decimalLongitude": "-74.15",
            "scientificName": "Lynx rufus (Schreber, 1777)",
            "year": 2024,
            "issues": ["COORDINATE_ROUNDED"],
            "species": null,
        }));

        assert_eq!(r.cell(&OCCURRENCE_COLUMNS[0]), Cell::Integer(4_011_867_340));
        assert_eq!(r.cell(&OCCURRENCE_COLUMNS[3]), Cell::Float(41.85));
        assert_eq!(r.cell(&OCCURRENCE_COLUMNS[4]), Cell::Float(-74.15));
        assert_eq!(
            r.cell(&Column::text("scientificName")),
            Cell::Text("Lynx rufus (Schreber, 1777)".to_string())
        );
        assert_eq!(r.cell(&Column::text("year")), Cell::Text("2024".to_string()));
        assert_eq!(
            r.cell(&Column::text("issues")),
            Cell::Text(r#"["COORDINATE_ROUNDED"]"#.to_string())
        );
        assert!(r.cell(&Column::text("species")).is_null());
        assert!(r.cell(&Column::text("genus")).is_null());
    }

    #[test]
    fn mistyped_numeric_values_are_null() {
        let r = record(serde_json::json!({"gbifID": "abc", "decimalLatitude": true}));
        assert!(r.cell(&OCCURRENCE_COLUMNS[0]).is_null());
        assert!(r.cell(&OCCURRENCE_COLUMNS[3]).is_null());
    }

    #[test]
    fn column_names_are_unique() {
        let mut names: Vec<&str> = OCCURRENCE_COLUMNS.iter().map(|c| c.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), OCCURRENCE_COLUMNS.len());
    }
}
