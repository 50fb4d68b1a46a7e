//! Detector findings and the aggregated result set.

use crate::types::{RecordId, SubjectId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Map a ratio-style score onto a severity with two cut points.
    pub fn from_score(score: f64, medium_at: f64, high_at: f64) -> Self {
        if score >= high_at {
            Self::High
        } else if score >= medium_at {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One flagged anomaly. Record ids are held by value; a finding never
/// borrows from the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub detector_name: String,
    pub severity: Severity,
    /// Primary subject first.
    pub subjects: Vec<SubjectId>,
    pub record_ids: Vec<RecordId>,
    pub explanation: String,
    pub score: f64,
}

impl Finding {
    pub fn primary_subject(&self) -> &str {
        self.subjects.first().map(String::as_str).unwrap_or("")
    }

    /// Detector names contributing to this finding. Merged findings from
    /// several detectors carry a `a+b` composite name.
    pub fn detectors(&self) -> impl Iterator<Item = &str> {
        self.detector_name.split('+')
    }
}

/// The aggregated, ordered, immutable findings handed to reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    findings: Vec<Finding>,
}

impl ResultSet {
    pub(crate) fn from_sorted(findings: Vec<Finding>) -> Self {
        Self { findings }
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter()
    }

    pub fn for_subject<'a>(&'a self, subject: &'a str) -> impl Iterator<Item = &'a Finding> + 'a {
        self.findings.iter().filter(move |f| f.subjects.iter().any(|s| s == subject))
    }

    pub fn from_detector<'a>(&'a self, detector: &'a str) -> impl Iterator<Item = &'a Finding> + 'a {
        self.findings.iter().filter(move |f| f.detectors().any(|d| d == detector))
    }

    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.severity == severity)
    }

    pub fn count_by_severity(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for f in &self.findings {
            *counts.entry(f.severity).or_insert(0) += 1;
        }
        counts
    }
}
