//! Anomaly detection engine.
//!
//! RULES:
//!   - Every detector implements Detector. Detectors only read the
//!     dataset and return findings that carry record ids by value.
//!   - Detectors run in parallel on the bounded worker pool, but their
//!     findings are concatenated in registration order, so output never
//!     depends on scheduling.
//!   - A detector whose configuration section is invalid, or whose
//!     evaluation fails, is skipped with a warning. Siblings still run.

pub mod burst;
pub mod circular_flow;
pub mod device_sharing;
pub mod rapid_cashout;
pub mod structuring;
pub mod velocity;

pub use burst::BurstDetector;
pub use circular_flow::CircularFlowDetector;
pub use device_sharing::DeviceSharingDetector;
pub use rapid_cashout::RapidCashoutDetector;
pub use structuring::StructuringDetector;
pub use velocity::VelocityDetector;

use crate::{
    config::{AnalysisConfig, DetectionConfig},
    dataset::UnifiedDataset,
    error::AnalysisResult,
    finding::Finding,
    pool::worker_pool,
    record::Coordinates,
};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Read-only inputs a detector may consult besides the dataset.
#[derive(Debug, Clone, Copy)]
pub struct DetectionContext<'a> {
    pub config: &'a DetectionConfig,
    /// Cell id → site coordinates.
    pub cell_sites: &'a BTreeMap<String, Coordinates>,
}

impl<'a> DetectionContext<'a> {
    pub fn from_config(config: &'a AnalysisConfig) -> Self {
        Self { config: &config.detection, cell_sites: &config.cell_sites }
    }
}

/// The contract every detector must fulfill.
pub trait Detector: Send + Sync {
    /// Unique stable name. Also used in findings and `disabled_detectors`.
    fn name(&self) -> &'static str;

    /// Validate only this detector's section of the configuration.
    fn check_config(&self, config: &DetectionConfig) -> AnalysisResult<()>;

    /// Scan the dataset. Must be deterministic for a given dataset and
    /// configuration.
    fn evaluate(&self, dataset: &UnifiedDataset, ctx: &DetectionContext<'_>) -> AnalysisResult<Vec<Finding>>;
}

/// A detector that was skipped, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorWarning {
    pub detector: String,
    pub reason: String,
}

/// Per-detector accounting for one detection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorRun {
    pub detector: String,
    pub findings: usize,
    pub skipped: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionOutcome {
    pub findings: Vec<Finding>,
    pub warnings: Vec<DetectorWarning>,
    pub runs: Vec<DetectorRun>,
}

enum RunResult {
    Disabled,
    Skipped(String),
    Found(Vec<Finding>),
}

pub struct DetectionEngine {
    detectors: Vec<Box<dyn Detector>>,
}

impl DetectionEngine {
    pub fn empty() -> Self {
        Self { detectors: Vec::new() }
    }

    /// Engine with every built-in detector, in fixed registration order.
    pub fn with_defaults() -> Self {
        let mut engine = Self::empty();
        engine.register(Box::new(BurstDetector));
        engine.register(Box::new(StructuringDetector));
        engine.register(Box::new(CircularFlowDetector));
        engine.register(Box::new(VelocityDetector));
        engine.register(Box::new(RapidCashoutDetector));
        engine.register(Box::new(DeviceSharingDetector));
        engine
    }

    pub fn register(&mut self, detector: Box<dyn Detector>) {
        self.detectors.push(detector);
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// Run every enabled detector on `pool`.
    pub fn detect(&self, dataset: &UnifiedDataset, ctx: &DetectionContext<'_>, pool: &ThreadPool) -> DetectionOutcome {
        let results: Vec<RunResult> = pool.install(|| {
            self.detectors
                .par_iter()
                .map(|detector| run_one(detector.as_ref(), dataset, ctx))
                .collect()
        });

        let mut outcome = DetectionOutcome::default();
        for (detector, result) in self.detectors.iter().zip(results) {
            let name = detector.name();
            match result {
                RunResult::Disabled => {
                    log::debug!("Detector {name} disabled by configuration");
                }
                RunResult::Skipped(reason) => {
                    log::warn!("Detector {name} skipped: {reason}");
                    outcome.warnings.push(DetectorWarning { detector: name.to_string(), reason });
                    outcome.runs.push(DetectorRun { detector: name.to_string(), findings: 0, skipped: true });
                }
                RunResult::Found(findings) => {
                    log::info!("Detector {name}: {} findings", findings.len());
                    outcome.runs.push(DetectorRun {
                        detector: name.to_string(),
                        findings: findings.len(),
                        skipped: false,
                    });
                    outcome.findings.extend(findings);
                }
            }
        }
        outcome
    }
}

impl Default for DetectionEngine {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn run_one(detector: &dyn Detector, dataset: &UnifiedDataset, ctx: &DetectionContext<'_>) -> RunResult {
    if ctx.config.is_disabled(detector.name()) {
        return RunResult::Disabled;
    }
    if let Err(e) = detector.check_config(ctx.config) {
        return RunResult::Skipped(e.to_string());
    }
    match detector.evaluate(dataset, ctx) {
        Ok(findings) => RunResult::Found(findings),
        Err(e) => RunResult::Skipped(e.to_string()),
    }
}

/// Run the default detectors over `dataset` on a pool sized by `config`.
pub fn detect(dataset: &UnifiedDataset, config: &AnalysisConfig) -> AnalysisResult<DetectionOutcome> {
    let pool = worker_pool(config.worker_threads)?;
    let ctx = DetectionContext::from_config(config);
    Ok(DetectionEngine::with_defaults().detect(dataset, &ctx, &pool))
}

// ── Shared window scan ──────────────────────────────────────────────────────

/// A maximal run of positions `start..=end` covered by flagged windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cluster {
    pub start: usize,
    pub end: usize,
}

/// Slide a window of `window` seconds over ascending `times`. For every
/// right edge `j`, the left edge `i` is the earliest position with
/// `times[j] - times[i] <= window`; `flagged(i, j)` decides whether that
/// window is anomalous. Overlapping flagged windows merge into clusters.
pub(crate) fn flagged_clusters<F>(times: &[i64], window: i64, mut flagged: F) -> Vec<Cluster>
where
    F: FnMut(usize, usize) -> bool,
{
    let mut clusters = Vec::new();
    let mut current: Option<Cluster> = None;
    let mut i = 0;
    for j in 0..times.len() {
        while times[j] - times[i] > window {
            i += 1;
        }
        if !flagged(i, j) {
            continue;
        }
        match current.as_mut() {
            Some(c) if i <= c.end => c.end = j,
            _ => {
                if let Some(done) = current.take() {
                    clusters.push(done);
                }
                current = Some(Cluster { start: i, end: j });
            }
        }
    }
    clusters.extend(current);
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_windows_merge_into_one_cluster() {
        let times = [0, 10, 20, 30, 40, 50, 500, 510];
        let clusters = flagged_clusters(&times, 60, |i, j| j - i + 1 > 3);
        assert_eq!(clusters, vec![Cluster { start: 0, end: 5 }]);
    }

    #[test]
    fn separated_windows_stay_apart() {
        let times = [0, 1, 2, 1000, 1001, 1002];
        let clusters = flagged_clusters(&times, 10, |i, j| j - i + 1 >= 3);
        assert_eq!(clusters, vec![Cluster { start: 0, end: 2 }, Cluster { start: 3, end: 5 }]);
    }

    #[test]
    fn default_engine_registration_order_is_fixed() {
        let names = DetectionEngine::with_defaults().detector_names();
        assert_eq!(
            names,
            vec!["burst", "structuring", "circular_flow", "velocity", "rapid_cashout", "device_sharing"]
        );
    }
}
