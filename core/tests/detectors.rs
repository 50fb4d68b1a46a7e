//! Detector scenarios on hand-built datasets.

use cdr_forensics_core::{
    config::AnalysisConfig,
    dataset::UnifiedDataset,
    detection::{
        BurstDetector, CircularFlowDetector, DetectionContext, Detector, DeviceSharingDetector,
        RapidCashoutDetector, StructuringDetector, VelocityDetector,
    },
    finding::{Finding, Severity},
    record::{Coordinates, Operator, RecordType, TransactionRecord},
};
use chrono::{Duration, NaiveDate, NaiveDateTime};

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(12, 0, 0).unwrap()
}

fn transfer(id: &str, secs: i64, from: &str, to: &str, amount: f64) -> TransactionRecord {
    TransactionRecord::new(
        Operator::Mtn,
        id,
        t0() + Duration::seconds(secs),
        RecordType::MobileMoneyTransfer,
        from,
        Some(to.to_string()),
    )
    .with_amount(amount)
}

fn dataset(records: Vec<TransactionRecord>) -> UnifiedDataset {
    UnifiedDataset::from_records(records).0
}

fn evaluate(detector: &dyn Detector, data: &UnifiedDataset, config: &AnalysisConfig) -> Vec<Finding> {
    detector.check_config(&config.detection).expect("valid config");
    detector.evaluate(data, &DetectionContext::from_config(config)).expect("evaluate")
}

// ── Burst ───────────────────────────────────────────────────────────────────

#[test]
fn six_transfers_in_a_minute_is_one_burst() {
    let records = (0..6).map(|i| transfer(&format!("B{i}"), i * 10, "0240000001", "0240000009", 50.0)).collect();
    let data = dataset(records);
    let mut config = AnalysisConfig::default_test();
    config.detection.burst_threshold_count = 5;
    config.detection.burst_window_seconds = 60;

    let findings = evaluate(&BurstDetector, &data, &config);
    assert_eq!(findings.len(), 1);
    let f = &findings[0];
    assert_eq!(f.detector_name, "burst");
    assert_eq!(f.primary_subject(), "0240000001");
    assert_eq!(f.record_ids.len(), 6);
    assert!((f.score - 1.2).abs() < 1e-9);
}

#[test]
fn spread_out_transfers_are_not_a_burst() {
    let records = (0..6).map(|i| transfer(&format!("B{i}"), i * 120, "0240000001", "0240000009", 50.0)).collect();
    let data = dataset(records);
    assert!(evaluate(&BurstDetector, &data, &AnalysisConfig::default_test()).is_empty());
}

// ── Structuring ─────────────────────────────────────────────────────────────

#[test]
fn four_sub_threshold_transfers_in_an_hour_are_structuring() {
    let records = (0..4)
        .map(|i| transfer(&format!("S{i}"), i * 900, "0240000002", &format!("024000010{i}"), 900.0))
        .collect();
    let data = dataset(records);
    let mut config = AnalysisConfig::default_test();
    config.detection.structuring_threshold_amount = 1_000.0;
    config.detection.structuring_window_seconds = 3_600;

    let findings = evaluate(&StructuringDetector, &data, &config);
    assert_eq!(findings.len(), 1);
    assert!(findings[0].score >= 3.6 - 1e-9, "score {}", findings[0].score);
    assert_eq!(findings[0].severity, Severity::High);
    assert_eq!(findings[0].record_ids.len(), 4);
}

#[test]
fn amounts_at_or_above_threshold_are_not_structuring() {
    let records = (0..4).map(|i| transfer(&format!("S{i}"), i * 60, "0240000002", "0240000003", 1_000.0)).collect();
    let data = dataset(records);
    assert!(evaluate(&StructuringDetector, &data, &AnalysisConfig::default_test()).is_empty());
}

// ── Circular flow ───────────────────────────────────────────────────────────

fn ring() -> UnifiedDataset {
    dataset(vec![
        transfer("R1", 0, "A", "B", 1_000.0),
        transfer("R2", 600, "B", "C", 950.0),
        transfer("R3", 1_200, "C", "A", 900.0),
        transfer("X1", 300, "A", "D", 40.0),
    ])
}

#[test]
fn ring_inside_horizon_is_found_once() {
    let mut config = AnalysisConfig::default_test();
    config.detection.circular_horizon_seconds = 3_600;
    let findings = evaluate(&CircularFlowDetector, &ring(), &config);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].record_ids, vec!["MTN:R1", "MTN:R2", "MTN:R3"]);
    assert_eq!(findings[0].subjects, vec!["A", "B", "C"]);
    assert_eq!(findings[0].severity, Severity::High);
}

#[test]
fn ring_outside_horizon_is_ignored() {
    let mut config = AnalysisConfig::default_test();
    config.detection.circular_horizon_seconds = 300;
    assert!(evaluate(&CircularFlowDetector, &ring(), &config).is_empty());
}

// ── Velocity ────────────────────────────────────────────────────────────────

fn call_at(id: &str, secs: i64, lat: f64, lon: f64) -> TransactionRecord {
    TransactionRecord::new(
        Operator::Mtn,
        id,
        t0() + Duration::seconds(secs),
        RecordType::Call,
        "0240000004",
        Some("0240000005".to_string()),
    )
    .with_duration(30)
    .with_location(None, Coordinates::new(lat, lon))
}

#[test]
fn accra_to_kumasi_in_ten_minutes_is_flagged() {
    let data = dataset(vec![call_at("V1", 0, 5.6037, -0.1870), call_at("V2", 600, 6.6885, -1.6244)]);
    let findings = evaluate(&VelocityDetector, &data, &AnalysisConfig::default_test());
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].record_ids, vec!["MTN:V1", "MTN:V2"]);
    assert!(findings[0].score > 9.0);
}

#[test]
fn cell_catalog_supplies_missing_coordinates() {
    let mut config = AnalysisConfig::default_test();
    config.cell_sites.insert("KSI-1".into(), Coordinates::new(6.6885, -1.6244).unwrap());
    let far = TransactionRecord::new(
        Operator::Mtn,
        "V2",
        t0() + Duration::seconds(600),
        RecordType::Call,
        "0240000004",
        None,
    )
    .with_location(Some("KSI-1"), None);
    let data = dataset(vec![call_at("V1", 0, 5.6037, -0.1870), far]);
    assert_eq!(evaluate(&VelocityDetector, &data, &config).len(), 1);
}

#[test]
fn a_day_long_trip_is_plausible() {
    let data = dataset(vec![call_at("V1", 0, 5.6037, -0.1870), call_at("V2", 86_400, 6.6885, -1.6244)]);
    assert!(evaluate(&VelocityDetector, &data, &AnalysisConfig::default_test()).is_empty());
}

// ── Rapid cash-out ──────────────────────────────────────────────────────────

#[test]
fn inflow_cashed_out_within_window_is_flagged() {
    let cash_out = TransactionRecord::new(
        Operator::AirtelTigo,
        "R2",
        t0() + Duration::minutes(20),
        RecordType::MobileMoneyCashout,
        "0275550001",
        Some("0279999999".to_string()),
    )
    .with_amount(4_900.0);
    let data = dataset(vec![transfer("IN", 0, "0241234567", "0275550001", 5_000.0), cash_out]);

    let findings = evaluate(&RapidCashoutDetector, &data, &AnalysisConfig::default_test());
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].primary_subject(), "0275550001");
    assert_eq!(findings[0].severity, Severity::High);
    assert!((findings[0].score - 0.98).abs() < 1e-9);
}

#[test]
fn small_or_late_outflows_are_ignored() {
    let data = dataset(vec![
        transfer("IN", 0, "0241234567", "0275550001", 5_000.0),
        transfer("SMALL", 60, "0275550001", "0240000001", 500.0),
        transfer("LATE", 7_200, "0275550001", "0240000001", 5_000.0),
    ]);
    assert!(evaluate(&RapidCashoutDetector, &data, &AnalysisConfig::default_test()).is_empty());
}

// ── Device sharing ──────────────────────────────────────────────────────────

#[test]
fn handset_shared_by_three_subjects_is_flagged() {
    let call = |id: &str, secs: i64, from: &str| {
        TransactionRecord::new(Operator::Mtn, id, t0() + Duration::seconds(secs), RecordType::Call, from, None)
            .with_duration(10)
            .with_imei("356938035643809")
    };
    let data = dataset(vec![
        call("D1", 0, "0245550021"),
        call("D2", 10, "0245550020"),
        call("D3", 20, "0245550020"),
        call("D4", 30, "0245550022"),
    ]);
    let findings = evaluate(&DeviceSharingDetector, &data, &AnalysisConfig::default_test());
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].subjects, vec!["0245550020", "0245550021", "0245550022"]);
    assert_eq!(findings[0].record_ids.len(), 4);
    assert!((findings[0].score - 1.5).abs() < 1e-9);
}
