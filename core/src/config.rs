//! Analysis configuration.
//!
//! RULE: Every tunable threshold lives here as a named, typed field.
//! Configurations are validated when loaded, so a bad value fails before
//! any file is read. Detectors re-check only their own section and are
//! skipped (not aborted) when it is invalid.

use crate::{
    error::{AnalysisError, AnalysisResult},
    record::{Coordinates, RecordType},
    types::Seconds,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MAX_WORKER_THREADS: usize = 64;
const DEFAULT_WORKER_THREADS: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    // ── Burst ─────────────────────────────────────
    pub burst_threshold_count: usize,
    pub burst_window_seconds: Seconds,
    pub burst_record_types: Vec<RecordType>,

    // ── Structuring ───────────────────────────────
    pub structuring_threshold_amount: f64,
    pub structuring_window_seconds: Seconds,
    pub structuring_min_transactions: usize,

    // ── Circular flow ─────────────────────────────
    pub circular_max_depth: usize,
    pub circular_horizon_seconds: Seconds,
    pub circular_max_paths: usize,

    // ── Velocity / location ───────────────────────
    pub velocity_max_speed_kmh: f64,
    pub velocity_min_distance_km: f64,

    // ── Rapid cash-out ────────────────────────────
    pub rapid_cashout_window_seconds: Seconds,
    pub rapid_cashout_min_amount: f64,
    pub rapid_cashout_min_ratio: f64,

    // ── Device sharing ────────────────────────────
    pub device_max_subjects: usize,

    // ── Aggregation ───────────────────────────────
    pub overlap_ratio: f64,

    /// Detector names that are not run at all.
    pub disabled_detectors: Vec<String>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            burst_threshold_count: 5,
            burst_window_seconds: 60,
            burst_record_types: vec![
                RecordType::MobileMoneyTransfer,
                RecordType::MobileMoneyCashout,
                RecordType::MobileMoneyCashin,
            ],
            structuring_threshold_amount: 1_000.0,
            structuring_window_seconds: 86_400,
            structuring_min_transactions: 2,
            circular_max_depth: 4,
            circular_horizon_seconds: 86_400,
            circular_max_paths: 100_000,
            velocity_max_speed_kmh: 120.0,
            velocity_min_distance_km: 5.0,
            rapid_cashout_window_seconds: 3_600,
            rapid_cashout_min_amount: 1_000.0,
            rapid_cashout_min_ratio: 0.8,
            device_max_subjects: 2,
            overlap_ratio: 0.5,
            disabled_detectors: Vec::new(),
        }
    }
}

impl DetectionConfig {
    /// Validate every section. Returns the first problem found.
    pub fn validate(&self) -> AnalysisResult<()> {
        self.check_burst()?;
        self.check_structuring()?;
        self.check_circular()?;
        self.check_velocity()?;
        self.check_rapid_cashout()?;
        self.check_device_sharing()?;
        self.check_overlap()?;
        Ok(())
    }

    pub fn check_burst(&self) -> AnalysisResult<()> {
        require("burst", self.burst_threshold_count >= 1, "burst_threshold_count must be >= 1")?;
        require("burst", self.burst_window_seconds > 0, "burst_window_seconds must be > 0")?;
        require("burst", !self.burst_record_types.is_empty(), "burst_record_types must not be empty")
    }

    pub fn check_structuring(&self) -> AnalysisResult<()> {
        require(
            "structuring",
            positive(self.structuring_threshold_amount),
            "structuring_threshold_amount must be a positive amount",
        )?;
        require("structuring", self.structuring_window_seconds > 0, "structuring_window_seconds must be > 0")?;
        require(
            "structuring",
            self.structuring_min_transactions >= 2,
            "structuring_min_transactions must be >= 2",
        )
    }

    pub fn check_circular(&self) -> AnalysisResult<()> {
        require("circular_flow", self.circular_max_depth >= 2, "circular_max_depth must be >= 2")?;
        require("circular_flow", self.circular_max_depth <= 12, "circular_max_depth must be <= 12")?;
        require("circular_flow", self.circular_horizon_seconds > 0, "circular_horizon_seconds must be > 0")?;
        require("circular_flow", self.circular_max_paths > 0, "circular_max_paths must be > 0")
    }

    pub fn check_velocity(&self) -> AnalysisResult<()> {
        require("velocity", positive(self.velocity_max_speed_kmh), "velocity_max_speed_kmh must be > 0")?;
        require(
            "velocity",
            self.velocity_min_distance_km.is_finite() && self.velocity_min_distance_km >= 0.0,
            "velocity_min_distance_km must be >= 0",
        )
    }

    pub fn check_rapid_cashout(&self) -> AnalysisResult<()> {
        require(
            "rapid_cashout",
            self.rapid_cashout_window_seconds > 0,
            "rapid_cashout_window_seconds must be > 0",
        )?;
        require(
            "rapid_cashout",
            positive(self.rapid_cashout_min_amount),
            "rapid_cashout_min_amount must be > 0",
        )?;
        require(
            "rapid_cashout",
            self.rapid_cashout_min_ratio > 0.0 && self.rapid_cashout_min_ratio <= 1.0,
            "rapid_cashout_min_ratio must be in (0, 1]",
        )
    }

    pub fn check_device_sharing(&self) -> AnalysisResult<()> {
        require("device_sharing", self.device_max_subjects >= 1, "device_max_subjects must be >= 1")
    }

    pub fn check_overlap(&self) -> AnalysisResult<()> {
        require(
            "aggregator",
            (0.0..=1.0).contains(&self.overlap_ratio),
            "overlap_ratio must be in [0, 1]",
        )
    }

    pub fn is_disabled(&self, detector: &str) -> bool {
        self.disabled_detectors.iter().any(|d| d == detector)
    }
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

fn require(detector: &str, ok: bool, reason: &str) -> AnalysisResult<()> {
    if ok {
        Ok(())
    } else {
        Err(AnalysisError::detector_config(detector, reason))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Size of the bounded pool used for ingestion and detection.
    pub worker_threads: usize,
    pub detection: DetectionConfig,
    /// Cell id → site coordinates, used when an export row carries only
    /// a cell id.
    pub cell_sites: BTreeMap<String, Coordinates>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            detection: DetectionConfig::default(),
            cell_sites: BTreeMap::new(),
        }
    }
}

impl AnalysisConfig {
    /// Load and validate a JSON configuration file.
    /// In tests, use AnalysisConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: AnalysisConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        log::info!(
            "Loaded config from {path}: {} worker threads, {} cell sites",
            config.worker_threads,
            config.cell_sites.len()
        );
        Ok(config)
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        if self.worker_threads == 0 || self.worker_threads > MAX_WORKER_THREADS {
            return Err(AnalysisError::Other(anyhow::anyhow!(
                "worker_threads must be in 1..={MAX_WORKER_THREADS}, got {}",
                self.worker_threads
            )));
        }
        self.detection.validate()
    }

    /// Config with hardcoded defaults for use in unit tests.
    /// Two workers keep parallel paths exercised without oversubscribing CI.
    pub fn default_test() -> Self {
        Self {
            worker_threads: 2,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(AnalysisConfig::default().validate().is_ok());
        assert!(AnalysisConfig::default_test().validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let json = r#"{ "detection": { "burst_threshold_count": 9 }, "cell_sites": { "ACC-1": { "lat": 5.6, "lon": -0.19 } } }"#;
        let cfg: AnalysisConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.detection.burst_threshold_count, 9);
        assert_eq!(cfg.detection.burst_window_seconds, 60);
        assert_eq!(cfg.worker_threads, DEFAULT_WORKER_THREADS);
        assert!(cfg.cell_sites.contains_key("ACC-1"));
    }

    #[test]
    fn out_of_range_values_fail_fast() {
        let mut cfg = AnalysisConfig::default_test();
        cfg.detection.overlap_ratio = 1.5;
        assert!(matches!(cfg.validate(), Err(AnalysisError::DetectorConfig { .. })));

        let mut cfg = AnalysisConfig::default_test();
        cfg.detection.circular_max_depth = 1;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("circular_flow"));

        let mut cfg = AnalysisConfig::default_test();
        cfg.worker_threads = 0;
        assert!(cfg.validate().is_err());
    }
}
