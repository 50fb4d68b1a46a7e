//! Structuring detector: many sub-threshold transfers that together reach
//! the reporting threshold.
//!
//! Only mobile-money transfers and cash-outs strictly below the threshold
//! count. Score = cluster sum / threshold. Severity is high at 3, medium
//! at 1.5.

use crate::{
    config::DetectionConfig,
    dataset::UnifiedDataset,
    detection::{flagged_clusters, DetectionContext, Detector},
    error::AnalysisResult,
    finding::{Finding, Severity},
    record::{RecordType, TransactionRecord},
};

pub struct StructuringDetector;

impl Detector for StructuringDetector {
    fn name(&self) -> &'static str {
        "structuring"
    }

    fn check_config(&self, config: &DetectionConfig) -> AnalysisResult<()> {
        config.check_structuring()
    }

    fn evaluate(&self, dataset: &UnifiedDataset, ctx: &DetectionContext<'_>) -> AnalysisResult<Vec<Finding>> {
        let cfg = ctx.config;
        let threshold = cfg.structuring_threshold_amount;
        let window = cfg.structuring_window_seconds;
        let min_count = cfg.structuring_min_transactions;
        let mut findings = Vec::new();

        for subject in dataset.subjects() {
            let records: Vec<(&TransactionRecord, f64)> = dataset
                .originated_by(subject)
                .filter(|r| {
                    matches!(r.record_type, RecordType::MobileMoneyTransfer | RecordType::MobileMoneyCashout)
                })
                .filter_map(|r| r.amount.filter(|&a| a > 0.0 && a < threshold).map(|a| (r, a)))
                .collect();
            if records.len() < min_count {
                continue;
            }

            let times: Vec<i64> = records.iter().map(|(r, _)| r.epoch_seconds()).collect();
            // prefix[k] = sum of the first k amounts
            let mut prefix = Vec::with_capacity(records.len() + 1);
            prefix.push(0.0);
            for (_, amount) in &records {
                let last = prefix[prefix.len() - 1];
                prefix.push(last + amount);
            }

            let clusters = flagged_clusters(&times, window, |i, j| {
                j - i + 1 >= min_count && prefix[j + 1] - prefix[i] >= threshold
            });

            for cluster in clusters {
                let members = &records[cluster.start..=cluster.end];
                let total = prefix[cluster.end + 1] - prefix[cluster.start];
                let score = total / threshold;
                findings.push(Finding {
                    detector_name: self.name().to_string(),
                    severity: Severity::from_score(score, 1.5, 3.0),
                    subjects: vec![subject.to_string()],
                    record_ids: members.iter().map(|(r, _)| r.record_id.clone()).collect(),
                    explanation: format!(
                        "{} transactions each below {:.2} totalling {:.2} within {}s windows",
                        members.len(),
                        threshold,
                        total,
                        window
                    ),
                    score,
                });
            }
        }
        Ok(findings)
    }
}
