//! Circular-flow detector: money that leaves a subject and comes back
//! through a chain of transfers.
//!
//! The transfer graph is an arena: subjects are node indices and edges are
//! indices into a time-ordered edge list. The search walks forward in time
//! only (each hop strictly later than the previous), so every cycle is
//! found exactly once, from its earliest edge. Work is bounded by depth,
//! horizon and `circular_max_paths`.
//!
//! Score = hops x (min amount / max amount). Severity is high with at
//! least 3 hops and retention of 0.8, medium at retention 0.5.

use crate::{
    config::DetectionConfig,
    dataset::UnifiedDataset,
    detection::{DetectionContext, Detector},
    error::AnalysisResult,
    finding::{Finding, Severity},
    record::RecordType,
};
use std::collections::HashMap;

pub struct CircularFlowDetector;

struct Edge {
    from: usize,
    to: usize,
    time: i64,
    amount: f64,
    record: usize,
}

struct TransferGraph {
    nodes: Vec<String>,
    edges: Vec<Edge>,
    /// Node → ascending edge indices leaving it.
    outgoing: Vec<Vec<usize>>,
}

impl TransferGraph {
    fn build(dataset: &UnifiedDataset) -> Self {
        let mut node_ids: HashMap<&str, usize> = HashMap::new();
        let mut nodes: Vec<String> = Vec::new();
        let mut edges = Vec::new();

        for (idx, record) in dataset.records().iter().enumerate() {
            if record.record_type != RecordType::MobileMoneyTransfer {
                continue;
            }
            let Some(to) = record.terminating_identifier.as_deref() else { continue };
            let from = record.originating_identifier.as_str();
            if from == to {
                continue;
            }
            let from = intern(&mut node_ids, &mut nodes, from);
            let to = intern(&mut node_ids, &mut nodes, to);
            edges.push(Edge {
                from,
                to,
                time: record.epoch_seconds(),
                amount: record.amount.filter(|a| *a > 0.0).unwrap_or(1.0),
                record: idx,
            });
        }

        let mut outgoing = vec![Vec::new(); nodes.len()];
        for (e, edge) in edges.iter().enumerate() {
            outgoing[edge.from].push(e);
        }
        Self { nodes, edges, outgoing }
    }
}

fn intern<'a>(ids: &mut HashMap<&'a str, usize>, nodes: &mut Vec<String>, name: &'a str) -> usize {
    *ids.entry(name).or_insert_with(|| {
        nodes.push(name.to_string());
        nodes.len() - 1
    })
}

struct Frame {
    node: usize,
    next: usize,
}

/// Find cycles as lists of edge indices, in order of their first edge.
/// Returns the cycles and whether the path budget ran out.
fn find_cycles(graph: &TransferGraph, max_depth: usize, horizon: i64, max_paths: usize) -> (Vec<Vec<usize>>, bool) {
    let mut cycles = Vec::new();
    let mut on_path = vec![false; graph.nodes.len()];
    let mut explored = 0usize;

    for (e0, first) in graph.edges.iter().enumerate() {
        let start = first.from;
        let mut path = vec![e0];
        on_path[start] = true;
        on_path[first.to] = true;
        let mut stack = vec![Frame { node: first.to, next: 0 }];

        while let Some(frame) = stack.last_mut() {
            let adj = &graph.outgoing[frame.node];
            if frame.next >= adj.len() || path.len() >= max_depth {
                stack.pop();
                if let Some(e) = path.pop() {
                    on_path[graph.edges[e].to] = false;
                }
                continue;
            }
            let cand = adj[frame.next];
            frame.next += 1;

            let last = &graph.edges[path[path.len() - 1]];
            let edge = &graph.edges[cand];
            if cand <= path[path.len() - 1] || edge.time <= last.time {
                continue;
            }
            if edge.time - first.time > horizon {
                // Later edges from this node are later still.
                frame.next = adj.len();
                continue;
            }

            explored += 1;
            if explored > max_paths {
                on_path.iter_mut().for_each(|v| *v = false);
                return (cycles, true);
            }

            if edge.to == start {
                let mut cycle = path.clone();
                cycle.push(cand);
                cycles.push(cycle);
                continue;
            }
            if on_path[edge.to] || path.len() + 2 > max_depth {
                continue;
            }
            path.push(cand);
            on_path[edge.to] = true;
            stack.push(Frame { node: edge.to, next: 0 });
        }
        on_path[start] = false;
    }
    (cycles, false)
}

impl Detector for CircularFlowDetector {
    fn name(&self) -> &'static str {
        "circular_flow"
    }

    fn check_config(&self, config: &DetectionConfig) -> AnalysisResult<()> {
        config.check_circular()
    }

    fn evaluate(&self, dataset: &UnifiedDataset, ctx: &DetectionContext<'_>) -> AnalysisResult<Vec<Finding>> {
        let cfg = ctx.config;
        let graph = TransferGraph::build(dataset);
        let (cycles, truncated) =
            find_cycles(&graph, cfg.circular_max_depth, cfg.circular_horizon_seconds, cfg.circular_max_paths);
        if truncated {
            log::warn!(
                "circular_flow search stopped after {} paths; results are partial",
                cfg.circular_max_paths
            );
        }

        let records = dataset.records();
        let findings = cycles
            .into_iter()
            .map(|cycle| {
                let edges: Vec<&Edge> = cycle.iter().map(|&e| &graph.edges[e]).collect();
                let hops = edges.len();
                let min = edges.iter().map(|e| e.amount).fold(f64::INFINITY, f64::min);
                let max = edges.iter().map(|e| e.amount).fold(0.0, f64::max);
                let retention = if max > 0.0 { min / max } else { 0.0 };
                let score = hops as f64 * retention;
                let severity = if hops >= 3 && retention >= 0.8 {
                    Severity::High
                } else if retention >= 0.5 {
                    Severity::Medium
                } else {
                    Severity::Low
                };
                let subjects: Vec<String> = edges.iter().map(|e| graph.nodes[e.from].clone()).collect();
                let span = edges[hops - 1].time - edges[0].time;
                Finding {
                    detector_name: self.name().to_string(),
                    severity,
                    explanation: format!(
                        "funds cycle {} -> {} over {hops} hops in {span}s, retention {:.2}",
                        subjects.join(" -> "),
                        subjects[0],
                        retention
                    ),
                    subjects,
                    record_ids: edges.iter().map(|e| records[e.record].record_id.clone()).collect(),
                    score,
                }
            })
            .collect();
        Ok(findings)
    }
}
