//! Ingestion pipeline: raw sources into one UnifiedDataset.
//!
//! RULES:
//!   - One bad source never aborts the batch. Its failure is recorded and
//!     the remaining sources proceed.
//!   - Sources are normalized in parallel on the bounded worker pool, but
//!     the dataset is sorted and deduplicated afterwards, so the result is
//!     independent of completion order and of argument order.

use crate::{
    adapter::{normalize_owned, AdapterRegistry, ExportLayout, NormalizeOutcome, OperatorAdapter},
    dataset::UnifiedDataset,
    error::{AnalysisError, AnalysisResult},
    record::{normalize_subject, Operator},
    types::SubjectId,
};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

/// One raw export and the operator that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub path: PathBuf,
    pub operator: Operator,
    /// Account holder, for single-account statements without an owner
    /// column.
    pub owner: Option<SubjectId>,
}

impl SourceSpec {
    pub fn new(path: impl Into<PathBuf>, operator: Operator) -> Self {
        Self { path: path.into(), operator, owner: None }
    }

    pub fn with_owner(mut self, owner: impl Into<SubjectId>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Parse a runner argument of the form `operator:path[#owner]`.
    pub fn parse(arg: &str) -> Result<Self, String> {
        let (op, rest) = arg
            .split_once(':')
            .ok_or_else(|| format!("expected operator:path, got '{arg}'"))?;
        let operator = op.parse::<Operator>()?;
        let (path, owner) = match rest.rsplit_once('#') {
            Some((path, owner)) => {
                let owner = normalize_subject(owner).ok_or_else(|| format!("invalid owner in '{arg}'"))?;
                (path, Some(owner))
            }
            None => (rest, None),
        };
        if path.is_empty() {
            return Err(format!("empty path in '{arg}'"));
        }
        Ok(Self { path: path.into(), operator, owner })
    }
}

/// An in-memory export, for collaborators that already hold the bytes.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    pub label: String,
    pub operator: Operator,
    pub bytes: Vec<u8>,
    pub owner: Option<SubjectId>,
}

impl InMemorySource {
    pub fn new(label: impl Into<String>, operator: Operator, bytes: impl Into<Vec<u8>>) -> Self {
        Self { label: label.into(), operator, bytes: bytes.into(), owner: None }
    }

    pub fn with_owner(mut self, owner: impl Into<SubjectId>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

/// What happened to one source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub operator: Operator,
    pub layout: Option<ExportLayout>,
    pub records: usize,
    pub rows_skipped: usize,
    pub skip_samples: Vec<String>,
}

/// A source that could not be ingested at all.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IngestionFailure {
    pub source: String,
    pub operator: Operator,
    pub reason: String,
}

impl IngestionFailure {
    pub fn to_error(&self) -> AnalysisError {
        AnalysisError::Ingestion { path: self.source.clone(), reason: self.reason.clone() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionOutcome {
    pub dataset: UnifiedDataset,
    pub sources: Vec<SourceReport>,
    pub failures: Vec<IngestionFailure>,
    pub duplicates_dropped: usize,
}

impl IngestionOutcome {
    /// True when at least one source failed while others succeeded.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty() && !self.sources.is_empty()
    }

    pub fn rows_skipped(&self) -> usize {
        self.sources.iter().map(|s| s.rows_skipped).sum()
    }
}

pub struct IngestionPipeline {
    registry: AdapterRegistry,
}

impl IngestionPipeline {
    pub fn new(registry: AdapterRegistry) -> Self {
        Self { registry }
    }

    /// Ingest files from disk on `pool`.
    pub fn ingest(&self, sources: &[SourceSpec], pool: &ThreadPool) -> IngestionOutcome {
        let results: Vec<(String, Operator, AnalysisResult<NormalizeOutcome>)> = pool.install(|| {
            sources
                .par_iter()
                .map(|spec| {
                    let label = spec.path.display().to_string();
                    let result = self.normalize_file(spec);
                    (label, spec.operator, result)
                })
                .collect()
        });
        self.assemble(results)
    }

    /// Ingest exports already held in memory on `pool`.
    pub fn ingest_in_memory(&self, sources: &[InMemorySource], pool: &ThreadPool) -> IngestionOutcome {
        let results: Vec<(String, Operator, AnalysisResult<NormalizeOutcome>)> = pool.install(|| {
            sources
                .par_iter()
                .map(|src| {
                    let result = self
                        .adapter_for(src.operator)
                        .and_then(|adapter| normalize_owned(adapter.as_ref(), src.bytes.as_slice(), src.owner.as_deref()));
                    (src.label.clone(), src.operator, result)
                })
                .collect()
        });
        self.assemble(results)
    }

    fn adapter_for(&self, operator: Operator) -> AnalysisResult<Arc<dyn OperatorAdapter>> {
        self.registry
            .get(operator)
            .ok_or_else(|| AnalysisError::schema(operator, "no adapter registered for operator"))
    }

    fn normalize_file(&self, spec: &SourceSpec) -> AnalysisResult<NormalizeOutcome> {
        let adapter = self.adapter_for(spec.operator)?;
        let file = File::open(&spec.path)?;
        normalize_owned(adapter.as_ref(), BufReader::new(file), spec.owner.as_deref())
    }

    fn assemble(&self, results: Vec<(String, Operator, AnalysisResult<NormalizeOutcome>)>) -> IngestionOutcome {
        let mut records = Vec::new();
        let mut reports = Vec::new();
        let mut failures = Vec::new();

        for (source, operator, result) in results {
            match result {
                Ok(outcome) => {
                    log::info!(
                        "Ingested {source} ({operator} {:?}): {} records, {} rows skipped",
                        outcome.layout,
                        outcome.records.len(),
                        outcome.rows_skipped
                    );
                    reports.push(SourceReport {
                        source,
                        operator,
                        layout: Some(outcome.layout),
                        records: outcome.records.len(),
                        rows_skipped: outcome.rows_skipped,
                        skip_samples: outcome.skip_samples,
                    });
                    records.extend(outcome.records);
                }
                Err(e) => {
                    log::warn!("Source {source} ({operator}) failed: {e}");
                    failures.push(IngestionFailure { source, operator, reason: e.to_string() });
                }
            }
        }

        let (dataset, duplicates_dropped) = UnifiedDataset::from_records(records);
        if duplicates_dropped > 0 {
            log::info!("Dropped {duplicates_dropped} duplicate records across sources");
        }
        log::info!(
            "Unified dataset: {} records, {} subjects, {} failed sources",
            dataset.len(),
            dataset.subject_count(),
            failures.len()
        );

        IngestionOutcome { dataset, sources: reports, failures, duplicates_dropped }
    }
}

impl Default for IngestionPipeline {
    fn default() -> Self {
        Self::new(AdapterRegistry::with_defaults())
    }
}
