//! Device sharing detector: one handset (IMEI) used by many subjects.
//!
//! Score = distinct originating subjects / `device_max_subjects`. Severity
//! is high at twice the limit. The primary subject is the heaviest user
//! of the device.

use crate::{
    config::DetectionConfig,
    dataset::UnifiedDataset,
    detection::{DetectionContext, Detector},
    error::AnalysisResult,
    finding::{Finding, Severity},
};
use std::collections::BTreeMap;

pub struct DeviceSharingDetector;

impl Detector for DeviceSharingDetector {
    fn name(&self) -> &'static str {
        "device_sharing"
    }

    fn check_config(&self, config: &DetectionConfig) -> AnalysisResult<()> {
        config.check_device_sharing()
    }

    fn evaluate(&self, dataset: &UnifiedDataset, ctx: &DetectionContext<'_>) -> AnalysisResult<Vec<Finding>> {
        let limit = ctx.config.device_max_subjects;
        // imei → (subject → record count, record indices)
        let mut devices: BTreeMap<&str, (BTreeMap<&str, usize>, Vec<usize>)> = BTreeMap::new();
        for (idx, record) in dataset.records().iter().enumerate() {
            let Some(imei) = record.device_imei.as_deref() else { continue };
            let entry = devices.entry(imei).or_default();
            *entry.0.entry(record.originating_identifier.as_str()).or_insert(0) += 1;
            entry.1.push(idx);
        }

        let records = dataset.records();
        let mut findings = Vec::new();
        for (imei, (users, indices)) in devices {
            if users.len() <= limit {
                continue;
            }
            let mut ranked: Vec<(&str, usize)> = users.into_iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
            let score = ranked.len() as f64 / limit as f64;
            findings.push(Finding {
                detector_name: self.name().to_string(),
                severity: if score >= 2.0 { Severity::High } else { Severity::Medium },
                explanation: format!(
                    "IMEI {imei} used by {} subjects across {} records (limit {limit})",
                    ranked.len(),
                    indices.len()
                ),
                subjects: ranked.iter().map(|(s, _)| s.to_string()).collect(),
                record_ids: indices.iter().map(|&i| records[i].record_id.clone()).collect(),
                score,
            });
        }
        Ok(findings)
    }
}
