//! Rapid cash-out detector: funds received and moved on almost at once.
//!
//! An inflow (cash-in or incoming transfer) of at least
//! `rapid_cashout_min_amount` is paired with the first later outflow
//! (cash-out or outgoing transfer) by the same subject inside the window
//! that moves at least `rapid_cashout_min_ratio` of it.
//! Score = outflow / inflow. A cash-out retaining 95% is high severity.

use crate::{
    config::DetectionConfig,
    dataset::UnifiedDataset,
    detection::{DetectionContext, Detector},
    error::AnalysisResult,
    finding::{Finding, Severity},
    record::{RecordType, TransactionRecord},
};

pub struct RapidCashoutDetector;

fn is_inflow(record: &TransactionRecord, subject: &str) -> bool {
    record.terminating_identifier.as_deref() == Some(subject)
        && matches!(record.record_type, RecordType::MobileMoneyCashin | RecordType::MobileMoneyTransfer)
}

fn is_outflow(record: &TransactionRecord, subject: &str) -> bool {
    record.originating_identifier == subject
        && matches!(record.record_type, RecordType::MobileMoneyCashout | RecordType::MobileMoneyTransfer)
}

impl Detector for RapidCashoutDetector {
    fn name(&self) -> &'static str {
        "rapid_cashout"
    }

    fn check_config(&self, config: &DetectionConfig) -> AnalysisResult<()> {
        config.check_rapid_cashout()
    }

    fn evaluate(&self, dataset: &UnifiedDataset, ctx: &DetectionContext<'_>) -> AnalysisResult<Vec<Finding>> {
        let cfg = ctx.config;
        let mut findings = Vec::new();

        for subject in dataset.subjects() {
            let records: Vec<&TransactionRecord> =
                dataset.records_for(subject).filter(|r| r.amount.is_some()).collect();

            for (i, inflow) in records.iter().enumerate() {
                let Some(in_amount) = inflow.amount else { continue };
                if !is_inflow(inflow, subject) || in_amount < cfg.rapid_cashout_min_amount {
                    continue;
                }
                let t0 = inflow.epoch_seconds();
                let outflow = records[i + 1..]
                    .iter()
                    .take_while(|r| r.epoch_seconds() - t0 <= cfg.rapid_cashout_window_seconds)
                    .find(|r| {
                        r.epoch_seconds() > t0
                            && is_outflow(r, subject)
                            && r.amount.is_some_and(|a| a >= cfg.rapid_cashout_min_ratio * in_amount)
                    });
                let Some(outflow) = outflow else { continue };
                let out_amount = outflow.amount.unwrap_or(0.0);
                let ratio = out_amount / in_amount;
                let severity = if outflow.record_type == RecordType::MobileMoneyCashout && ratio >= 0.95 {
                    Severity::High
                } else {
                    Severity::Medium
                };
                let gap = outflow.epoch_seconds() - t0;
                findings.push(Finding {
                    detector_name: self.name().to_string(),
                    severity,
                    subjects: vec![subject.to_string()],
                    record_ids: vec![inflow.record_id.clone(), outflow.record_id.clone()],
                    explanation: format!(
                        "received {in_amount:.2} and moved out {out_amount:.2} ({}) {gap}s later",
                        outflow.record_type
                    ),
                    score: ratio,
                });
            }
        }
        Ok(findings)
    }
}
