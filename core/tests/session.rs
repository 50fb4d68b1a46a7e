//! Session lifecycle: stage order, detector skips and cancellation.

use cdr_forensics_core::{
    adapter::{AdapterRegistry, ExportLayout, Header, MtnAdapter, OperatorAdapter, RawRow},
    cancel::CancellationToken,
    config::AnalysisConfig,
    detection::DetectionEngine,
    error::{AnalysisError, AnalysisResult},
    event::SessionEvent,
    ingestion::{InMemorySource, IngestionPipeline},
    record::{Operator, TransactionRecord},
    session::{AnalysisSession, IssueKind, STAGE_DETECT},
};
use std::sync::Arc;

/// Six sub-threshold transfers from one sender inside a minute.
const TELECEL_BURST: &str = "Transaction ID,Date,Type,Sender,Receiver,Amount\n\
    TX1,2024-03-04 10:00:00,Transfer,0201111111,0202222221,900.00\n\
    TX2,2024-03-04 10:00:10,Transfer,0201111111,0202222222,900.00\n\
    TX3,2024-03-04 10:00:20,Transfer,0201111111,0202222223,900.00\n\
    TX4,2024-03-04 10:00:30,Transfer,0201111111,0202222224,900.00\n\
    TX5,2024-03-04 10:00:40,Transfer,0201111111,0202222225,900.00\n\
    TX6,2024-03-04 10:00:50,Transfer,0201111111,0202222226,900.00\n";

const MTN_CDR: &str = "record_id,calling_no,called_no,duration,event_date_time,imei,call_type\n\
    C1,0241111111,0242222222,60,2024-03-04 09:00:00,,Voice\n";

fn telecel() -> InMemorySource {
    InMemorySource::new("telecel", Operator::Telecel, TELECEL_BURST.as_bytes())
}

fn mtn() -> InMemorySource {
    InMemorySource::new("mtn", Operator::Mtn, MTN_CDR.as_bytes())
}

#[test]
fn full_run_merges_burst_and_structuring() {
    let mut session = AnalysisSession::new(AnalysisConfig::default_test()).expect("session");
    let report = session.run_in_memory(&[telecel(), mtn()]).expect("run");

    assert_eq!(report.dataset.len(), 7);
    assert!(report.issues.is_empty(), "unexpected issues: {:?}", report.issues);
    assert!(report.raw_findings >= 2);

    let merged: Vec<_> = report.results.for_subject("0201111111").collect();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].detector_name, "burst+structuring");
    assert_eq!(merged[0].record_ids.len(), 6);

    assert!(matches!(report.events.first(), Some(SessionEvent::SessionStarted { sources: 2, .. })));
    assert!(matches!(report.events.last(), Some(SessionEvent::SessionCompleted { findings: 1, .. })));
    let completed = report
        .events
        .iter()
        .filter(|e| matches!(e, SessionEvent::DetectorCompleted { .. }))
        .count();
    assert_eq!(completed, DetectionEngine::with_defaults().detector_names().len());
}

#[test]
fn misconfigured_detector_is_skipped_and_others_run() {
    let mut config = AnalysisConfig::default_test();
    config.detection.burst_window_seconds = 0;
    let mut session = AnalysisSession::new(config).expect("session");
    let report = session.run_in_memory(&[telecel()]).expect("run");

    assert_eq!(report.issues.len(), 1);
    let issue = &report.issues[0];
    assert_eq!(issue.stage, STAGE_DETECT);
    assert_eq!(issue.kind, IssueKind::DetectorSkipped);
    assert_eq!(issue.subject, "burst");
    assert!(report.events.iter().any(|e| matches!(e, SessionEvent::DetectorSkipped { detector, .. } if detector == "burst")));

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results.findings()[0].detector_name, "structuring");
}

#[test]
fn disabled_detector_produces_no_issue() {
    let mut config = AnalysisConfig::default_test();
    config.detection.disabled_detectors = vec!["structuring".into()];
    let mut session = AnalysisSession::new(config).expect("session");
    let report = session.run_in_memory(&[telecel()]).expect("run");

    assert!(report.issues.is_empty());
    assert_eq!(report.results.findings()[0].detector_name, "burst");
}

#[test]
fn failed_source_becomes_an_issue() {
    let broken = InMemorySource::new("broken", Operator::Mtn, &b"foo,bar\n1,2\n"[..]);
    let mut session = AnalysisSession::new(AnalysisConfig::default_test()).expect("session");
    let report = session.run_in_memory(&[telecel(), broken]).expect("run");

    assert_eq!(report.dataset.len(), 6);
    assert!(report
        .issues
        .iter()
        .any(|i| i.kind == IssueKind::SourceFailed && i.subject == "broken"));
}

#[test]
fn rerun_reports_only_its_own_issues_and_events() {
    let broken = || InMemorySource::new("broken", Operator::Mtn, &b"foo,bar\n1,2\n"[..]);
    let mut session = AnalysisSession::new(AnalysisConfig::default_test()).expect("session");

    let first = session.run_in_memory(&[telecel(), broken()]).expect("first run");
    let second = session.run_in_memory(&[telecel(), broken()]).expect("second run");

    assert_eq!(first.issues.len(), 1);
    assert_eq!(second.issues, first.issues);
    assert_eq!(second.events.len(), first.events.len());
    assert_ne!(second.session_id, first.session_id);
    assert_eq!(session.id(), second.session_id);
    assert!(matches!(
        second.events.first(),
        Some(SessionEvent::SessionStarted { session_id, .. }) if *session_id == second.session_id
    ));
}

#[test]
fn cancelled_before_ingest_builds_nothing() {
    let mut session = AnalysisSession::new(AnalysisConfig::default_test()).expect("session");
    session.cancellation_token().cancel();

    let err = session.run_in_memory(&[telecel()]).unwrap_err();
    assert!(matches!(err, AnalysisError::Cancelled { ref stage } if stage == "ingest"));
    assert!(session.dataset().is_none());
    assert!(matches!(session.events().last(), Some(SessionEvent::SessionCancelled { .. })));
}

/// MTN adapter that cancels the session as soon as it sees a header.
struct CancellingAdapter {
    inner: MtnAdapter,
    token: CancellationToken,
}

impl OperatorAdapter for CancellingAdapter {
    fn operator(&self) -> Operator {
        self.inner.operator()
    }

    fn parse_header(&self, header: &Header) -> AnalysisResult<ExportLayout> {
        self.token.cancel();
        self.inner.parse_header(header)
    }

    fn map_row_to_record(&self, layout: ExportLayout, row: &RawRow<'_>) -> AnalysisResult<TransactionRecord> {
        self.inner.map_row_to_record(layout, row)
    }
}

#[test]
fn cancelled_during_ingest_keeps_the_dataset() {
    let token = CancellationToken::new();
    let mut registry = AdapterRegistry::empty();
    registry.register(Arc::new(CancellingAdapter { inner: MtnAdapter, token: token.clone() }));
    let mut session = AnalysisSession::with_parts(
        AnalysisConfig::default_test(),
        IngestionPipeline::new(registry),
        DetectionEngine::with_defaults(),
    )
    .expect("session")
    .with_cancellation_token(token);

    let err = session.run_in_memory(&[mtn()]).unwrap_err();
    assert!(matches!(err, AnalysisError::Cancelled { ref stage } if stage == "detect"));
    let dataset = session.dataset().expect("dataset survives cancellation");
    assert_eq!(dataset.len(), 1);
    assert!(session.events().iter().any(|e| matches!(e, SessionEvent::DatasetAssembled { records: 1, .. })));
}
