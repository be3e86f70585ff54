//! Identifier-keyed accumulation of occurrence records.

use std::collections::BTreeMap;

use species_map_occurrence_models::{OccurrenceRecord, RecordKey};

/// Records keyed by [`RecordKey`], in order of first sighting.
///
/// Inserting an existing key replaces the stored record in place: the
/// position stays that of the first sighting, the value is the latest.
/// Nothing is ever removed.
#[derive(Debug, Clone, Default)]
pub struct OccurrenceSet {
    records: Vec<(RecordKey, OccurrenceRecord)>,
    index: BTreeMap<RecordKey, usize>,
}

impl OccurrenceSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `record` under `key`. Returns `true` if the key was new.
    pub fn insert(&mut self, key: RecordKey, record: OccurrenceRecord) -> bool {
        if let Some(&position) = self.index.get(&key) {
            self.records[position].1 = record;
            return false;
        }
        self.index.insert(key.clone(), self.records.len());
        self.records.push((key, record));
        true
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Looks up the record stored under `key`.
    #[must_use]
    pub fn get(&self, key: &RecordKey) -> Option<&OccurrenceRecord> {
        self.index.get(key).map(|&position| &self.records[position].1)
    }

    /// Iterates keys and records in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&RecordKey, &OccurrenceRecord)> {
        self.records.iter().map(|(key, record)| (key, record))
    }

    /// Consumes the set, yielding records in first-seen order.
    #[must_use]
    pub fn into_records(self) -> Vec<OccurrenceRecord> {
        self.records.into_iter().map(|(_, record)| record).collect()
    }
}
