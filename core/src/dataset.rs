//! The unified, deduplicated, time-ordered dataset.
//!
//! RULE: A UnifiedDataset is built once by the ingestion pipeline and is
//! immutable afterwards. Detectors receive it behind an Arc and only read.

use crate::{
    record::TransactionRecord,
    types::{RecordId, SubjectId},
};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Default, Serialize)]
pub struct UnifiedDataset {
    records: Vec<TransactionRecord>,
    /// Subject → ascending indices into `records` of every record touching it.
    subject_index: BTreeMap<SubjectId, Vec<usize>>,
    #[serde(skip)]
    id_index: HashMap<RecordId, usize>,
}

impl UnifiedDataset {
    /// Deduplicate on (operator, raw_native_id), sort and index.
    ///
    /// Returns the dataset and the number of duplicate records dropped.
    /// The result is independent of the order of `records`.
    pub fn from_records(mut records: Vec<TransactionRecord>) -> (Self, usize) {
        records.sort_by(canonical_cmp);

        let before = records.len();
        let mut seen: HashSet<(crate::record::Operator, String)> = HashSet::with_capacity(before);
        records.retain(|r| seen.insert((r.source_operator, r.raw_native_id.clone())));
        let dropped = before - records.len();

        let mut subject_index: BTreeMap<SubjectId, Vec<usize>> = BTreeMap::new();
        let mut id_index = HashMap::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            id_index.insert(record.record_id.clone(), idx);
            subject_index
                .entry(record.originating_identifier.clone())
                .or_default()
                .push(idx);
            if let Some(term) = &record.terminating_identifier {
                if term != &record.originating_identifier {
                    subject_index.entry(term.clone()).or_default().push(idx);
                }
            }
        }

        (Self { records, subject_index, id_index }, dropped)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn get(&self, idx: usize) -> Option<&TransactionRecord> {
        self.records.get(idx)
    }

    pub fn by_id(&self, record_id: &str) -> Option<&TransactionRecord> {
        self.id_index.get(record_id).map(|&i| &self.records[i])
    }

    /// Position of a record in dataset order.
    pub fn position_of(&self, record_id: &str) -> Option<usize> {
        self.id_index.get(record_id).copied()
    }

    pub fn contains_id(&self, record_id: &str) -> bool {
        self.id_index.contains_key(record_id)
    }

    /// All subjects in ascending order.
    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.subject_index.keys().map(String::as_str)
    }

    pub fn subject_count(&self) -> usize {
        self.subject_index.len()
    }

    /// Indices of every record touching `subject`, in dataset order.
    pub fn indices_for(&self, subject: &str) -> &[usize] {
        self.subject_index.get(subject).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every record touching `subject`, in dataset order.
    pub fn records_for<'a>(&'a self, subject: &str) -> impl Iterator<Item = &'a TransactionRecord> + 'a {
        self.indices_for(subject).iter().map(move |&i| &self.records[i])
    }

    /// Records originated by `subject`, in dataset order.
    pub fn originated_by<'a>(&'a self, subject: &'a str) -> impl Iterator<Item = &'a TransactionRecord> + 'a {
        self.records_for(subject).filter(move |r| r.originating_identifier == subject)
    }

    pub fn time_span(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        match (self.records.first(), self.records.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
            _ => None,
        }
    }
}

/// Total order over records: dataset sort key first, then the remaining
/// fields so that duplicates with the same identity resolve the same way
/// whatever order the sources arrived in.
fn canonical_cmp(a: &TransactionRecord, b: &TransactionRecord) -> Ordering {
    a.sort_key()
        .cmp(&b.sort_key())
        .then_with(|| a.record_type.cmp(&b.record_type))
        .then_with(|| a.originating_identifier.cmp(&b.originating_identifier))
        .then_with(|| a.terminating_identifier.cmp(&b.terminating_identifier))
        .then_with(|| cmp_opt_f64(a.amount, b.amount))
        .then_with(|| a.duration.cmp(&b.duration))
        .then_with(|| a.cell_id().cmp(&b.cell_id()))
        .then_with(|| a.device_imei.cmp(&b.device_imei))
        .then_with(|| cmp_opt_f64(a.coordinates().map(|c| c.lat), b.coordinates().map(|c| c.lat)))
        .then_with(|| cmp_opt_f64(a.coordinates().map(|c| c.lon), b.coordinates().map(|c| c.lon)))
}

fn cmp_opt_f64(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
    }
}
