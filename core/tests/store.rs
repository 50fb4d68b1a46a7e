//! Session store: a saved report reads back unchanged.

use cdr_forensics_core::{
    config::AnalysisConfig,
    finding::Severity,
    ingestion::InMemorySource,
    record::Operator,
    session::{AnalysisSession, IssueKind, SessionReport},
    store::SessionStore,
};

const TELECEL_CASH: &str = "Transaction ID,Date,Type,Sender,Receiver,Amount\n\
    TX1,2024-03-04 10:00:00,Transfer,0201111111,0202222221,900.00\n\
    TX2,2024-03-04 10:00:10,Transfer,0201111111,0202222222,900.00\n\
    TX3,2024-03-04 10:00:20,Transfer,0201111111,0202222223,900.00\n\
    TX4,2024-03-04 10:00:30,Transfer,0201111111,0202222224,900.00\n\
    TX5,2024-03-04 10:00:40,Transfer,0201111111,0202222225,900.00\n\
    TX6,2024-03-04 10:00:50,Transfer,0201111111,0202222226,900.00\n\
    TX7,2024-03-04 11:00:00,Cash Out,0203333333,,not-a-number\n";

fn report() -> SessionReport {
    let source = InMemorySource::new("telecel", Operator::Telecel, TELECEL_CASH.as_bytes());
    let mut session = AnalysisSession::new(AnalysisConfig::default_test()).expect("session");
    session.run_in_memory(&[source]).expect("run")
}

fn store() -> SessionStore {
    let store = SessionStore::in_memory().expect("store");
    store.migrate().expect("migrate");
    store
}

#[test]
fn saved_report_round_trips() {
    let report = report();
    let mut store = store();
    store.save_report(&report).expect("save");

    let sid = report.session_id.as_str();
    assert_eq!(store.session_ids().expect("ids"), vec![report.session_id.clone()]);
    assert_eq!(store.record_count(sid).expect("records"), report.dataset.len());
    assert_eq!(store.finding_count(sid).expect("findings"), report.results.len());
    assert_eq!(store.findings(sid).expect("findings"), report.results.findings().to_vec());
}

#[test]
fn issues_and_events_are_persisted_in_order() {
    let report = report();
    assert!(report.issues.iter().any(|i| i.kind == IssueKind::RowsSkipped));

    let mut store = store();
    store.save_report(&report).expect("save");
    let sid = report.session_id.as_str();

    assert_eq!(store.issues(sid).expect("issues"), report.issues);
    let events = store.events(sid).expect("events");
    assert_eq!(events.len(), report.events.len());
    for (entry, event) in events.iter().zip(&report.events) {
        assert_eq!(entry.event_type, event.event_type());
        assert_eq!(&entry.decode().expect("decode"), event);
    }
}

#[test]
fn severity_filter_matches_result_set() {
    let report = report();
    let mut store = store();
    store.save_report(&report).expect("save");
    let sid = report.session_id.as_str();

    for severity in [Severity::Low, Severity::Medium, Severity::High] {
        let stored = store.findings_by_severity(sid, severity).expect("query");
        assert_eq!(stored.len(), report.results.with_severity(severity).count());
    }
}

#[test]
fn saving_the_same_session_twice_fails() {
    let report = report();
    let mut store = store();
    store.save_report(&report).expect("save");
    assert!(store.save_report(&report).is_err());
    assert_eq!(store.record_count(&report.session_id).expect("records"), report.dataset.len());
}

#[test]
fn two_runs_of_one_session_are_stored_side_by_side() {
    let source = InMemorySource::new("telecel", Operator::Telecel, TELECEL_CASH.as_bytes());
    let mut session = AnalysisSession::new(AnalysisConfig::default_test()).expect("session");
    let first = session.run_in_memory(&[source.clone()]).expect("first run");
    let second = session.run_in_memory(&[source]).expect("second run");

    let mut store = store();
    store.save_report(&first).expect("save first");
    store.save_report(&second).expect("save second");

    assert_eq!(store.session_ids().expect("ids").len(), 2);
    assert_eq!(store.issues(&second.session_id).expect("issues"), first.issues);
    assert_eq!(store.events(&second.session_id).expect("events").len(), first.events.len());
}
