//! Burst detector: too many transactions from one subject in a short window.
//!
//! Score = peak window count / threshold. Severity is high at 2x the
//! threshold, medium at 1.5x.

use crate::{
    config::DetectionConfig,
    dataset::UnifiedDataset,
    detection::{flagged_clusters, DetectionContext, Detector},
    error::AnalysisResult,
    finding::{Finding, Severity},
    record::TransactionRecord,
};

pub struct BurstDetector;

impl Detector for BurstDetector {
    fn name(&self) -> &'static str {
        "burst"
    }

    fn check_config(&self, config: &DetectionConfig) -> AnalysisResult<()> {
        config.check_burst()
    }

    fn evaluate(&self, dataset: &UnifiedDataset, ctx: &DetectionContext<'_>) -> AnalysisResult<Vec<Finding>> {
        let cfg = ctx.config;
        let threshold = cfg.burst_threshold_count;
        let window = cfg.burst_window_seconds;
        let mut findings = Vec::new();

        for subject in dataset.subjects() {
            let records: Vec<&TransactionRecord> = dataset
                .originated_by(subject)
                .filter(|r| cfg.burst_record_types.contains(&r.record_type))
                .collect();
            if records.len() <= threshold {
                continue;
            }
            let times: Vec<i64> = records.iter().map(|r| r.epoch_seconds()).collect();
            let clusters = flagged_clusters(&times, window, |i, j| j - i + 1 > threshold);

            for cluster in clusters {
                let peak = peak_window_count(&times[cluster.start..=cluster.end], window);
                let members = &records[cluster.start..=cluster.end];
                let score = peak as f64 / threshold as f64;
                findings.push(Finding {
                    detector_name: self.name().to_string(),
                    severity: Severity::from_score(score, 1.5, 2.0),
                    subjects: vec![subject.to_string()],
                    record_ids: members.iter().map(|r| r.record_id.clone()).collect(),
                    explanation: format!(
                        "{} transactions between {} and {}; peak {} within {}s exceeds limit of {}",
                        members.len(),
                        members[0].timestamp,
                        members[members.len() - 1].timestamp,
                        peak,
                        window,
                        threshold
                    ),
                    score,
                });
            }
        }
        Ok(findings)
    }
}

/// Largest number of ascending `times` that fit inside one window.
fn peak_window_count(times: &[i64], window: i64) -> usize {
    let mut peak = 0;
    let mut i = 0;
    for j in 0..times.len() {
        while times[j] - times[i] > window {
            i += 1;
        }
        peak = peak.max(j - i + 1);
    }
    peak
}
