//! cdr-runner: headless analysis runner for operator exports.
//!
//! Usage:
//!   cdr-runner --source mtn:exports/mtn_cdr.csv --source airteltigo:exports/at_cash.csv#0271234567
//!   cdr-runner --synthetic --seed 7 --out-dir ./synthetic --db session.db
//!   cdr-runner --source telecel:cash.csv --config analysis.json --json

use anyhow::{bail, Result};
use cdr_forensics_core::{
    config::AnalysisConfig,
    ingestion::SourceSpec,
    session::{AnalysisSession, SessionReport},
    store::SessionStore,
    synth::{generate_exports, PlantedPattern},
};
use std::env;
use std::path::Path;

#[derive(serde::Serialize)]
struct JsonOutput<'a> {
    report: &'a SessionReport,
    planted: &'a [PlantedPattern],
    db: Option<&'a str>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let threads = parse_arg(&args, "--threads", 0usize);
    let top = parse_arg(&args, "--top", 20usize);
    let json = args.iter().any(|a| a == "--json");
    let synthetic = args.iter().any(|a| a == "--synthetic");
    let config_path = flag_value(&args, "--config");
    let db = flag_value(&args, "--db");
    let out_dir = flag_value(&args, "--out-dir").unwrap_or("./synthetic");

    let mut config = match config_path {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    if threads > 0 {
        config.worker_threads = threads;
        config.validate()?;
    }

    let mut sources = Vec::new();
    for value in flag_values(&args, "--source") {
        sources.push(SourceSpec::parse(value).map_err(|e| anyhow::anyhow!("--source {value}: {e}"))?);
    }
    let mut planted = Vec::new();
    if synthetic {
        let generated = generate_exports(seed, Path::new(out_dir))?;
        sources.extend(generated.sources);
        planted = generated.planted;
    }
    if sources.is_empty() {
        bail!("no sources given; pass --source operator:path or --synthetic");
    }

    if !json {
        println!("CDR Forensics: cdr-runner");
        println!("  sources:   {}", sources.len());
        println!("  threads:   {}", config.worker_threads);
        println!("  config:    {}", config_path.unwrap_or("(defaults)"));
        println!("  db:        {}", db.unwrap_or("(not persisted)"));
        if synthetic {
            println!("  synthetic: seed={seed} out_dir={out_dir}");
        }
        println!();
    }

    let mut session = AnalysisSession::new(config)?;
    let report = session.run(&sources)?;

    if let Some(path) = db {
        let mut store = SessionStore::open(path)?;
        store.migrate()?;
        store.save_report(&report)?;
        log::info!("Persisted session {} to {path}", report.session_id);
    }

    if json {
        let output = JsonOutput { report: &report, planted: &planted, db };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_summary(&report, &planted, top);
    }
    Ok(())
}

fn print_summary(report: &SessionReport, planted: &[PlantedPattern], top: usize) {
    let summary = &report.summary;
    println!("=== RUN SUMMARY ===");
    println!("  session_id:     {}", report.session_id);
    println!("  sources ok:     {}", report.sources.len());
    println!("  records:        {}", summary.records);
    println!("  subjects:       {}", summary.subjects);
    println!("  duplicates:     {}", report.duplicates_dropped);
    println!("  call seconds:   {} (avg {:.1})", summary.total_call_seconds, summary.avg_call_seconds);
    println!("  cash in:        {:.2}", summary.cashin_total);
    println!("  cash out:       {:.2}", summary.cashout_total);
    println!("  transfers:      {:.2}", summary.transfer_total);
    println!("  raw findings:   {}", report.raw_findings);
    println!("  findings:       {}", report.results.len());
    for (severity, count) in report.results.count_by_severity() {
        println!("    {:<8} {count}", severity.as_str());
    }

    if !report.issues.is_empty() {
        println!();
        println!("=== ISSUES ===");
        for issue in &report.issues {
            println!("  [{}] {} {}: {}", issue.stage, issue.kind.as_str(), issue.subject, issue.message);
        }
    }

    println!();
    println!("=== TOP FINDINGS ===");
    if report.results.is_empty() {
        println!("  (none)");
    }
    for f in report.results.iter().take(top) {
        println!(
            "  {:<6} {:<28} {:<12} score={:<7.2} records={:<3} {}",
            f.severity.as_str(),
            f.detector_name,
            f.primary_subject(),
            f.score,
            f.record_ids.len(),
            f.explanation
        );
    }

    if !planted.is_empty() {
        println!();
        println!("=== PLANTED PATTERNS ===");
        for p in planted {
            let found = report
                .results
                .for_subject(&p.subject)
                .any(|f| f.detectors().any(|d| d == p.detector));
            println!(
                "  {:<15} {:<12} {:<10} {}",
                p.detector,
                p.subject,
                p.operator.to_string(),
                if found { "found" } else { "MISSED" }
            );
        }
    }
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

/// Every value of a repeatable flag, in order.
fn flag_values<'a>(args: &'a [String], flag: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    args.windows(2).filter(move |w| w[0] == flag).map(|w| w[1].as_str())
}
