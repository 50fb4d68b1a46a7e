//! Session events: the audit trail of one analysis run.
//!
//! RULE: Every stage transition of an AnalysisSession is recorded as a
//! SessionEvent, in order. Collaborators observe progress only through
//! this log; they never read session internals.

use crate::{
    record::Operator,
    types::SessionId,
};
use serde::{Deserialize, Serialize};

/// Every event emitted during a session.
/// Variants may be added; existing ones are never renamed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    // ── Session events ─────────────────────────────
    SessionStarted {
        session_id: SessionId,
        sources: usize,
    },
    SessionCompleted {
        session_id: SessionId,
        findings: usize,
    },
    SessionCancelled {
        session_id: SessionId,
        stage: String,
    },

    // ── Ingestion events ───────────────────────────
    SourceIngested {
        source: String,
        operator: Operator,
        records: usize,
        rows_skipped: usize,
    },
    SourceFailed {
        source: String,
        operator: Operator,
        reason: String,
    },
    DatasetAssembled {
        records: usize,
        subjects: usize,
        duplicates_dropped: usize,
    },

    // ── Detection events ───────────────────────────
    DetectorCompleted {
        detector: String,
        findings: usize,
    },
    DetectorSkipped {
        detector: String,
        reason: String,
    },

    // ── Aggregation events ─────────────────────────
    FindingsAggregated {
        raw: usize,
        merged: usize,
    },
}

impl SessionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::SessionCompleted { .. } => "session_completed",
            Self::SessionCancelled { .. } => "session_cancelled",
            Self::SourceIngested { .. } => "source_ingested",
            Self::SourceFailed { .. } => "source_failed",
            Self::DatasetAssembled { .. } => "dataset_assembled",
            Self::DetectorCompleted { .. } => "detector_completed",
            Self::DetectorSkipped { .. } => "detector_skipped",
            Self::FindingsAggregated { .. } => "findings_aggregated",
        }
    }

    /// Stage that produced the event.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } | Self::SessionCompleted { .. } | Self::SessionCancelled { .. } => "session",
            Self::SourceIngested { .. } | Self::SourceFailed { .. } | Self::DatasetAssembled { .. } => "ingest",
            Self::DetectorCompleted { .. } | Self::DetectorSkipped { .. } => "detect",
            Self::FindingsAggregated { .. } => "aggregate",
        }
    }
}

/// A persisted event log row.
#[derive(Debug, Clone, PartialEq)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub session_id: SessionId,
    pub seq: u64,
    pub stage: String,
    pub event_type: String,
    pub payload: String, // JSON-serialized SessionEvent
}

impl EventLogEntry {
    pub fn from_event(session_id: &str, seq: u64, event: &SessionEvent) -> serde_json::Result<Self> {
        Ok(Self {
            id: None,
            session_id: session_id.to_string(),
            seq,
            stage: event.stage().to_string(),
            event_type: event.event_type().to_string(),
            payload: serde_json::to_string(event)?,
        })
    }

    pub fn decode(&self) -> serde_json::Result<SessionEvent> {
        serde_json::from_str(&self.payload)
    }
}
