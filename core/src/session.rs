//! Analysis session: ingest → detect → aggregate.
//!
//! RULES:
//!   - Stage order is fixed. The cancellation token is checked before
//!     each stage; a cancelled session keeps whatever dataset it built.
//!   - Source, row and detector problems become SessionIssues and the run
//!     continues. Only aggregation failures, cancellation and
//!     infrastructure errors end a session early.

use crate::{
    aggregator::aggregate,
    cancel::CancellationToken,
    config::AnalysisConfig,
    dataset::UnifiedDataset,
    detection::{DetectionContext, DetectionEngine},
    error::AnalysisResult,
    event::SessionEvent,
    finding::ResultSet,
    ingestion::{InMemorySource, IngestionOutcome, IngestionPipeline, SourceReport, SourceSpec},
    pool::worker_pool,
    summary::{summarize, DatasetSummary},
    types::SessionId,
};
use chrono::{DateTime, Utc};
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const STAGE_INGEST: &str = "ingest";
pub const STAGE_DETECT: &str = "detect";
pub const STAGE_AGGREGATE: &str = "aggregate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    SourceFailed,
    RowsSkipped,
    DetectorSkipped,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceFailed => "source_failed",
            Self::RowsSkipped => "rows_skipped",
            Self::DetectorSkipped => "detector_skipped",
        }
    }
}

/// A non-fatal problem surfaced to the analyst.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionIssue {
    pub stage: String,
    pub kind: IssueKind,
    /// Source label or detector name.
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub started_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
    pub duplicates_dropped: usize,
    pub raw_findings: usize,
    pub dataset: Arc<UnifiedDataset>,
    pub results: ResultSet,
    pub summary: DatasetSummary,
    pub issues: Vec<SessionIssue>,
    pub events: Vec<SessionEvent>,
}

pub struct AnalysisSession {
    id: SessionId,
    config: AnalysisConfig,
    pipeline: IngestionPipeline,
    engine: DetectionEngine,
    token: CancellationToken,
    pool: ThreadPool,
    started_at: DateTime<Utc>,
    events: Vec<SessionEvent>,
    issues: Vec<SessionIssue>,
    dataset: Option<Arc<UnifiedDataset>>,
    runs: usize,
}

impl AnalysisSession {
    /// New session with the default adapters and detectors.
    pub fn new(config: AnalysisConfig) -> AnalysisResult<Self> {
        Self::with_parts(config, IngestionPipeline::default(), DetectionEngine::with_defaults())
    }

    pub fn with_parts(config: AnalysisConfig, pipeline: IngestionPipeline, engine: DetectionEngine) -> AnalysisResult<Self> {
        // Detector sections are checked per detector at run time.
        config.detection.check_overlap()?;
        let pool = worker_pool(config.worker_threads)?;
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            config,
            pipeline,
            engine,
            token: CancellationToken::new(),
            pool,
            started_at: Utc::now(),
            events: Vec::new(),
            issues: Vec::new(),
            dataset: None,
            runs: 0,
        })
    }

    /// Observe an externally created token instead of the session's own.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Id of the current (or most recent) run.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Handle that cancels this session from another thread.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn events(&self) -> &[SessionEvent] {
        &self.events
    }

    /// The dataset built so far, if ingestion completed.
    pub fn dataset(&self) -> Option<Arc<UnifiedDataset>> {
        self.dataset.clone()
    }

    pub fn run(&mut self, sources: &[SourceSpec]) -> AnalysisResult<SessionReport> {
        self.start(sources.len());
        self.checkpoint(STAGE_INGEST)?;
        let outcome = self.pipeline.ingest(sources, &self.pool);
        self.finish(outcome)
    }

    pub fn run_in_memory(&mut self, sources: &[InMemorySource]) -> AnalysisResult<SessionReport> {
        self.start(sources.len());
        self.checkpoint(STAGE_INGEST)?;
        let outcome = self.pipeline.ingest_in_memory(sources, &self.pool);
        self.finish(outcome)
    }

    /// Every run starts clean. A rerun gets its own id so its report can
    /// be stored next to the earlier one.
    fn start(&mut self, sources: usize) {
        if self.runs > 0 {
            self.id = uuid::Uuid::new_v4().to_string();
        }
        self.runs += 1;
        self.events.clear();
        self.issues.clear();
        self.dataset = None;
        self.started_at = Utc::now();
        log::info!("Session {} started with {sources} sources", self.id);
        self.events.push(SessionEvent::SessionStarted { session_id: self.id.clone(), sources });
    }

    fn checkpoint(&mut self, stage: &str) -> AnalysisResult<()> {
        if let Err(e) = self.token.check(stage) {
            log::warn!("Session {} cancelled before {stage}", self.id);
            self.events.push(SessionEvent::SessionCancelled { session_id: self.id.clone(), stage: stage.to_string() });
            return Err(e);
        }
        Ok(())
    }

    fn finish(&mut self, outcome: IngestionOutcome) -> AnalysisResult<SessionReport> {
        let IngestionOutcome { dataset, sources, failures, duplicates_dropped } = outcome;

        // ── Ingest bookkeeping ─────────────────────────────
        for report in &sources {
            self.events.push(SessionEvent::SourceIngested {
                source: report.source.clone(),
                operator: report.operator,
                records: report.records,
                rows_skipped: report.rows_skipped,
            });
            if report.rows_skipped > 0 {
                self.issues.push(SessionIssue {
                    stage: STAGE_INGEST.to_string(),
                    kind: IssueKind::RowsSkipped,
                    subject: report.source.clone(),
                    message: format!("{} malformed rows skipped", report.rows_skipped),
                });
            }
        }
        for failure in &failures {
            self.events.push(SessionEvent::SourceFailed {
                source: failure.source.clone(),
                operator: failure.operator,
                reason: failure.reason.clone(),
            });
            self.issues.push(SessionIssue {
                stage: STAGE_INGEST.to_string(),
                kind: IssueKind::SourceFailed,
                subject: failure.source.clone(),
                message: failure.to_error().to_string(),
            });
        }
        self.events.push(SessionEvent::DatasetAssembled {
            records: dataset.len(),
            subjects: dataset.subject_count(),
            duplicates_dropped,
        });
        let dataset = Arc::new(dataset);
        self.dataset = Some(Arc::clone(&dataset));

        // ── Detect ─────────────────────────────────────────
        self.checkpoint(STAGE_DETECT)?;
        let ctx = DetectionContext::from_config(&self.config);
        let detection = self.engine.detect(&dataset, &ctx, &self.pool);
        for run in &detection.runs {
            if !run.skipped {
                self.events.push(SessionEvent::DetectorCompleted { detector: run.detector.clone(), findings: run.findings });
            }
        }
        for warning in &detection.warnings {
            self.events.push(SessionEvent::DetectorSkipped {
                detector: warning.detector.clone(),
                reason: warning.reason.clone(),
            });
            self.issues.push(SessionIssue {
                stage: STAGE_DETECT.to_string(),
                kind: IssueKind::DetectorSkipped,
                subject: warning.detector.clone(),
                message: warning.reason.clone(),
            });
        }

        // ── Aggregate ──────────────────────────────────────
        self.checkpoint(STAGE_AGGREGATE)?;
        let raw_findings = detection.findings.len();
        let results = aggregate(detection.findings, self.config.detection.overlap_ratio, &dataset)?;
        self.events.push(SessionEvent::FindingsAggregated { raw: raw_findings, merged: results.len() });
        self.events.push(SessionEvent::SessionCompleted { session_id: self.id.clone(), findings: results.len() });
        log::info!(
            "Session {} complete: {} records, {} findings, {} issues",
            self.id,
            dataset.len(),
            results.len(),
            self.issues.len()
        );

        Ok(SessionReport {
            session_id: self.id.clone(),
            started_at: self.started_at,
            sources,
            duplicates_dropped,
            raw_findings,
            summary: summarize(&dataset),
            dataset,
            results,
            issues: self.issues.clone(),
            events: self.events.clone(),
        })
    }
}
