//! Result aggregator: merge overlapping findings and order them.
//!
//! RULES:
//!   - Two findings merge when they share a primary subject and their
//!     record overlap |A∩B| / min(|A|,|B|) reaches the configured ratio.
//!     Findings from different detectors merge into a composite `a+b`.
//!   - Merging repeats until nothing changes, and the input is put in a
//!     canonical order first, so the result does not depend on the order
//!     detectors returned their findings.
//!   - A finding that names a record id absent from the dataset is a
//!     broken invariant and aborts aggregation.

use crate::{
    dataset::UnifiedDataset,
    error::{AnalysisError, AnalysisResult},
    finding::{Finding, ResultSet},
};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

/// Aggregate raw detector findings into an ordered ResultSet.
pub fn aggregate(findings: Vec<Finding>, overlap_ratio: f64, dataset: &UnifiedDataset) -> AnalysisResult<ResultSet> {
    if !(0.0..=1.0).contains(&overlap_ratio) {
        return Err(AnalysisError::Aggregation {
            reason: format!("overlap_ratio {overlap_ratio} outside [0, 1]"),
        });
    }

    let mut working = Vec::with_capacity(findings.len());
    for finding in findings {
        working.push(validate(finding, dataset)?);
    }
    let input_count = working.len();
    working.sort_by(|a, b| canonical_cmp(a, b, dataset));

    loop {
        let merged = merge_pass(&mut working, overlap_ratio, dataset);
        if !merged {
            break;
        }
    }

    working.sort_by(report_cmp);
    log::info!("Aggregated {input_count} findings into {}", working.len());
    Ok(ResultSet::from_sorted(working))
}

fn validate(finding: Finding, dataset: &UnifiedDataset) -> AnalysisResult<Finding> {
    if finding.subjects.is_empty() || finding.record_ids.is_empty() {
        return Err(AnalysisError::Aggregation {
            reason: format!("{} finding has no subjects or no records", finding.detector_name),
        });
    }
    if let Some(missing) = finding.record_ids.iter().find(|id| !dataset.contains_id(id)) {
        return Err(AnalysisError::Aggregation {
            reason: format!("{} finding references unknown record {missing}", finding.detector_name),
        });
    }
    Ok(finding)
}

fn overlap(a: &Finding, b: &Finding) -> f64 {
    let set: HashSet<&str> = a.record_ids.iter().map(String::as_str).collect();
    let shared = b.record_ids.iter().filter(|id| set.contains(id.as_str())).count();
    let smaller = a.record_ids.len().min(b.record_ids.len());
    if shared == 0 || smaller == 0 {
        0.0
    } else {
        shared as f64 / smaller as f64
    }
}

/// One merge sweep. Returns true if anything merged.
fn merge_pass(findings: &mut Vec<Finding>, ratio: f64, dataset: &UnifiedDataset) -> bool {
    let mut changed = false;
    let mut i = 0;
    while i < findings.len() {
        let mut j = i + 1;
        while j < findings.len() {
            let mergeable = findings[i].primary_subject() == findings[j].primary_subject() && {
                let shared = overlap(&findings[i], &findings[j]);
                shared > 0.0 && shared >= ratio
            };
            if mergeable {
                let other = findings.remove(j);
                findings[i] = merge(&findings[i], other, dataset);
                changed = true;
            } else {
                j += 1;
            }
        }
        i += 1;
    }
    changed
}

fn merge(a: &Finding, b: Finding, dataset: &UnifiedDataset) -> Finding {
    let names: BTreeSet<&str> = a.detectors().chain(b.detectors()).collect();
    let detector_name = names.into_iter().collect::<Vec<_>>().join("+");

    let mut subjects = a.subjects.clone();
    for s in &b.subjects {
        if !subjects.contains(s) {
            subjects.push(s.clone());
        }
    }

    let mut record_ids: Vec<String> = a.record_ids.iter().chain(&b.record_ids).cloned().collect();
    record_ids.sort_by(|x, y| position(dataset, x).cmp(&position(dataset, y)).then_with(|| x.cmp(y)));
    record_ids.dedup();

    let mut explanation = a.explanation.clone();
    for part in b.explanation.split(" | ") {
        if !a.explanation.split(" | ").any(|p| p == part) {
            explanation.push_str(" | ");
            explanation.push_str(part);
        }
    }

    Finding {
        detector_name,
        severity: a.severity.max(b.severity),
        subjects,
        record_ids,
        explanation,
        score: a.score.max(b.score),
    }
}

/// Dataset position of a record id. Ids are validated before merging.
fn position(dataset: &UnifiedDataset, id: &str) -> usize {
    dataset.position_of(id).unwrap_or(usize::MAX)
}

/// Input order for merging: independent of detector return order.
fn canonical_cmp(a: &Finding, b: &Finding, dataset: &UnifiedDataset) -> Ordering {
    a.primary_subject()
        .cmp(b.primary_subject())
        .then_with(|| a.detector_name.cmp(&b.detector_name))
        .then_with(|| first_position(a, dataset).cmp(&first_position(b, dataset)))
        .then_with(|| a.record_ids.cmp(&b.record_ids))
        .then_with(|| b.score.total_cmp(&a.score))
}

fn first_position(f: &Finding, dataset: &UnifiedDataset) -> usize {
    f.record_ids
        .first()
        .map(|id| position(dataset, id))
        .unwrap_or(usize::MAX)
}

/// Report order: severity desc, score desc, subject asc, detector asc,
/// first record id asc.
fn report_cmp(a: &Finding, b: &Finding) -> Ordering {
    b.severity
        .cmp(&a.severity)
        .then_with(|| b.score.total_cmp(&a.score))
        .then_with(|| a.primary_subject().cmp(b.primary_subject()))
        .then_with(|| a.detector_name.cmp(&b.detector_name))
        .then_with(|| a.record_ids.first().cmp(&b.record_ids.first()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::Severity;

    fn finding(detector: &str, subject: &str, ids: &[&str], severity: Severity, score: f64) -> Finding {
        Finding {
            detector_name: detector.to_string(),
            severity,
            subjects: vec![subject.to_string()],
            record_ids: ids.iter().map(|s| s.to_string()).collect(),
            explanation: format!("{detector} on {subject}"),
            score,
        }
    }

    #[test]
    fn overlap_uses_smaller_set() {
        let a = finding("burst", "A", &["1", "2", "3", "4"], Severity::Low, 1.0);
        let b = finding("burst", "A", &["3", "4"], Severity::Low, 1.0);
        assert_eq!(overlap(&a, &b), 1.0);
        let c = finding("burst", "A", &["9"], Severity::Low, 1.0);
        assert_eq!(overlap(&a, &c), 0.0);
    }

    #[test]
    fn report_order_is_severity_then_score() {
        let mut v = vec![
            finding("burst", "B", &["1"], Severity::Low, 9.0),
            finding("burst", "A", &["2"], Severity::High, 1.0),
            finding("velocity", "A", &["3"], Severity::High, 2.0),
        ];
        v.sort_by(report_cmp);
        assert_eq!(v[0].detector_name, "velocity");
        assert_eq!(v[1].detector_name, "burst");
        assert_eq!(v[2].severity, Severity::Low);
    }
}
