//! Ingestion: operator tagging, order independence, partial failure and
//! cross-source deduplication.

use cdr_forensics_core::{
    ingestion::{InMemorySource, IngestionPipeline, SourceSpec},
    pool::worker_pool,
    record::{Operator, RecordType},
};

const TELECEL_CASH: &str = "Transaction ID,Date,Type,Sender,Receiver,Amount\n\
    TX1,2024-03-04 10:00:00,Transfer,0201111111,0202222222,150.00\n\
    TX2,2024-03-04 10:05:00,Cash Out,0202222222,,100.00\n";

const MTN_CDR: &str = "record_id,calling_no,called_no,duration,event_date_time,imei,call_type\n\
    C1,233241111111,0242222222,60,2024-03-04 09:00:00,356938035643809,Voice\n\
    C2,0242222222,0241111111,30,2024-03-04 10:00:00,,Voice\n\
    C3,0242222222,0241111111,,2024-03-04 10:02:00,,SMS\n";

const AIRTELTIGO_CASH: &str = "Receipt No.,Owner Number,Completion Time,Details,Transaction Status,Paid In,Withdrawn,Opposite Party\n\
    R1,0271111111,2024-03-04 08:00:00,Cash In,Completed,500,,0279999999 - Agent\n\
    R2,0271111111,2024-03-04 08:30:00,Transfer,Completed,,200,0201111111 - Kofi\n";

fn source(label: &str, operator: Operator, body: &str) -> InMemorySource {
    InMemorySource::new(label, operator, body.as_bytes())
}

#[test]
fn dataset_is_independent_of_source_order() {
    let pool = worker_pool(3).expect("pool");
    let pipeline = IngestionPipeline::default();
    let a = source("telecel", Operator::Telecel, TELECEL_CASH);
    let b = source("mtn", Operator::Mtn, MTN_CDR);
    let c = source("at", Operator::AirtelTigo, AIRTELTIGO_CASH);

    let forward = pipeline.ingest_in_memory(&[a.clone(), b.clone(), c.clone()], &pool);
    let backward = pipeline.ingest_in_memory(&[c, a, b], &pool);

    assert_eq!(forward.dataset.len(), 7);
    assert_eq!(forward.dataset.records(), backward.dataset.records());

    let times: Vec<_> = forward.dataset.records().iter().map(|r| r.timestamp).collect();
    let mut sorted = times.clone();
    sorted.sort();
    assert_eq!(times, sorted, "dataset must be time ordered");
}

#[test]
fn records_carry_operator_and_normalized_subjects() {
    let pool = worker_pool(1).expect("pool");
    let outcome = IngestionPipeline::default().ingest_in_memory(&[source("mtn", Operator::Mtn, MTN_CDR)], &pool);

    let first = outcome.dataset.by_id("MTN:C1").expect("record C1");
    assert_eq!(first.source_operator, Operator::Mtn);
    assert_eq!(first.originating_identifier, "0241111111");
    assert_eq!(first.device_imei.as_deref(), Some("356938035643809"));
    let sms = outcome.dataset.by_id("MTN:C3").expect("record C3");
    assert_eq!(sms.record_type, RecordType::Sms);
    assert_eq!(outcome.dataset.indices_for("0241111111").len(), 3);
}

#[test]
fn one_malformed_source_does_not_abort_the_batch() {
    let pool = worker_pool(2).expect("pool");
    let broken = source("broken", Operator::Mtn, "foo,bar\n1,2\n");
    let outcome = IngestionPipeline::default().ingest_in_memory(
        &[
            source("telecel", Operator::Telecel, TELECEL_CASH),
            broken,
            source("at", Operator::AirtelTigo, AIRTELTIGO_CASH),
        ],
        &pool,
    );

    assert!(outcome.is_partial());
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].source, "broken");
    assert_eq!(outcome.sources.len(), 2);
    assert_eq!(outcome.dataset.len(), 4);
}

#[test]
fn same_export_twice_is_deduplicated() {
    let pool = worker_pool(2).expect("pool");
    let outcome = IngestionPipeline::default().ingest_in_memory(
        &[
            source("copy-1", Operator::Telecel, TELECEL_CASH),
            source("copy-2", Operator::Telecel, TELECEL_CASH),
        ],
        &pool,
    );
    assert_eq!(outcome.dataset.len(), 2);
    assert_eq!(outcome.duplicates_dropped, 2);
}

#[test]
fn missing_file_is_reported_as_failure() {
    let pool = worker_pool(1).expect("pool");
    let outcome = IngestionPipeline::default()
        .ingest(&[SourceSpec::new("/nonexistent/cdr-forensics/missing.csv", Operator::Mtn)], &pool);
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.dataset.is_empty());
    assert!(!outcome.is_partial());
}

#[test]
fn statement_owner_comes_with_the_source() {
    const STATEMENT: &str = "Receipt No.,Completion Time,Details,Transaction Status,Paid In,Withdrawn,Balance,Opposite Party\n\
        R1,2024-03-04 08:00:00,Cash In,Completed,500,,500,0279999999 - Agent\n\
        R2,2024-03-04 08:30:00,Cash Out,Completed,,450,50,0279999999 - Agent\n";
    let pool = worker_pool(1).expect("pool");
    let pipeline = IngestionPipeline::default();

    let owned = source("at", Operator::AirtelTigo, STATEMENT).with_owner("0271111111");
    let outcome = pipeline.ingest_in_memory(&[owned], &pool);
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.dataset.len(), 2);
    assert_eq!(outcome.dataset.indices_for("0271111111").len(), 2);

    let anonymous = pipeline.ingest_in_memory(&[source("at", Operator::AirtelTigo, STATEMENT)], &pool);
    assert!(anonymous.failures.is_empty(), "header must still be recognised");
    assert!(anonymous.dataset.is_empty());
    assert_eq!(anonymous.rows_skipped(), 2);
}
