//! Velocity detector: consecutive locations of one subject that imply an
//! impossible travel speed.
//!
//! Locations come from the record's own coordinates, falling back to the
//! cell-site catalog by cell id. Score = implied speed / max speed, capped
//! at 100 (a zero time gap over real distance hits the cap). Severity is
//! high at 5, medium at 2.

use crate::{
    config::DetectionConfig,
    dataset::UnifiedDataset,
    detection::{DetectionContext, Detector},
    error::AnalysisResult,
    finding::{Finding, Severity},
    record::{Coordinates, TransactionRecord},
};

const MAX_SCORE: f64 = 100.0;

pub struct VelocityDetector;

fn locate(record: &TransactionRecord, ctx: &DetectionContext<'_>) -> Option<Coordinates> {
    record
        .coordinates()
        .or_else(|| record.cell_id().and_then(|cell| ctx.cell_sites.get(cell).copied()))
}

impl Detector for VelocityDetector {
    fn name(&self) -> &'static str {
        "velocity"
    }

    fn check_config(&self, config: &DetectionConfig) -> AnalysisResult<()> {
        config.check_velocity()
    }

    fn evaluate(&self, dataset: &UnifiedDataset, ctx: &DetectionContext<'_>) -> AnalysisResult<Vec<Finding>> {
        let cfg = ctx.config;
        let mut findings = Vec::new();

        for subject in dataset.subjects() {
            let located: Vec<(&TransactionRecord, Coordinates)> = dataset
                .originated_by(subject)
                .filter_map(|r| locate(r, ctx).map(|c| (r, c)))
                .collect();

            for pair in located.windows(2) {
                let (a, pa) = pair[0];
                let (b, pb) = pair[1];
                let distance = pa.haversine_km(&pb);
                if distance < cfg.velocity_min_distance_km {
                    continue;
                }
                let gap = b.epoch_seconds() - a.epoch_seconds();
                let speed = if gap > 0 { distance / (gap as f64 / 3600.0) } else { f64::INFINITY };
                if speed <= cfg.velocity_max_speed_kmh {
                    continue;
                }
                let score = (speed / cfg.velocity_max_speed_kmh).min(MAX_SCORE);
                let speed_text = if speed.is_finite() { format!("{speed:.0} km/h") } else { "instantaneous".to_string() };
                findings.push(Finding {
                    detector_name: self.name().to_string(),
                    severity: Severity::from_score(score, 2.0, 5.0),
                    subjects: vec![subject.to_string()],
                    record_ids: vec![a.record_id.clone(), b.record_id.clone()],
                    explanation: format!(
                        "moved {distance:.1} km in {gap}s ({speed_text}) between {} and {}",
                        a.timestamp, b.timestamp
                    ),
                    score,
                });
            }
        }
        Ok(findings)
    }
}
