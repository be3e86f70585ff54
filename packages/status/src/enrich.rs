//! Left join of occurrences onto the status reference table.

use species_map_occurrence_models::{
    Cell, Column, ColumnKind, OCCURRENCE_COLUMNS, OccurrenceRecord,
};

use crate::reference::{REFERENCE_COLUMNS, ReferenceTable, StatusReferenceRow};

/// Name of the output flag column.
pub const HAS_STATUS_COLUMN: &str = "has_status";

/// Join key for `record`: `species` when non-empty, else `scientificName`.
///
/// Returns `None` when neither field holds a non-empty string; such
/// records never match.
#[must_use]
pub fn match_name(record: &OccurrenceRecord) -> Option<&str> {
    record
        .get_str("species")
        .or_else(|| record.get_str("scientificName"))
}

/// An occurrence with its reference match, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedOccurrence {
    /// The fetched occurrence.
    pub record: OccurrenceRecord,
    /// Matched reference row, `None` when the join found nothing.
    pub reference: Option<StatusReferenceRow>,
    /// Whether the match carries a state conservation rank.
    pub has_status: bool,
}

impl EnrichedOccurrence {
    /// Cells in [`EnrichedTable::columns`] order.
    #[must_use]
    pub fn cells(&self) -> Vec<Cell> {
        let reference = self
            .reference
            .as_ref()
            .map_or([None; REFERENCE_COLUMNS.len()], StatusReferenceRow::values);

        OCCURRENCE_COLUMNS
            .iter()
            .map(|column| self.record.cell(column))
            .chain(reference.into_iter().map(Cell::text))
            .chain(std::iter::once(Cell::Boolean(self.has_status)))
            .collect()
    }
}

/// Enriched occurrences with a fixed column layout.
///
/// The layout is the same whether or not there are rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichedTable {
    rows: Vec<EnrichedOccurrence>,
}

impl EnrichedTable {
    /// Output columns: occurrence fields, reference columns, then
    /// [`HAS_STATUS_COLUMN`].
    #[must_use]
    pub fn columns() -> Vec<Column> {
        OCCURRENCE_COLUMNS
            .iter()
            .copied()
            .chain(REFERENCE_COLUMNS.into_iter().map(Column::text))
            .chain(std::iter::once(Column {
                name: HAS_STATUS_COLUMN,
                kind: ColumnKind::Boolean,
            }))
            .collect()
    }

    #[must_use]
    pub fn rows(&self) -> &[EnrichedOccurrence] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows with `has_status` set.
    #[must_use]
    pub fn with_status_count(&self) -> usize {
        self.rows.iter().filter(|row| row.has_status).count()
    }
}

/// Left-joins `occurrences` onto `reference` by [`match_name`].
///
/// Every occurrence yields exactly one row, in input order. Matching is
/// exact string equality.
#[must_use]
pub fn enrich(occurrences: Vec<OccurrenceRecord>, reference: &ReferenceTable) -> EnrichedTable {
    let rows: Vec<EnrichedOccurrence> = occurrences
        .into_iter()
        .map(|record| {
            let matched = match_name(&record).and_then(|name| reference.lookup(name)).cloned();
            let has_status = matched
                .as_ref()
                .is_some_and(StatusReferenceRow::has_state_rank);
            EnrichedOccurrence {
                record,
                reference: matched,
                has_status,
            }
        })
        .collect();

    log::info!(
        "Enriched {} occurrences, {} with state conservation status",
        rows.len(),
        rows.iter().filter(|row| row.has_status).count()
    );

    EnrichedTable { rows }
}
