//! SQLite persistence for finished sessions.
//!
//! RULE: Only store.rs talks to the database.
//! Sessions and reports never execute SQL directly.

use crate::{
    error::AnalysisResult,
    event::EventLogEntry,
    finding::{Finding, Severity},
    session::{SessionIssue, SessionReport},
};
use rusqlite::{params, Connection};

pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    /// Open (or create) the session database at `path`.
    pub fn open(path: &str) -> AnalysisResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode: readers are not blocked while a report is written.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> AnalysisResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> AnalysisResult<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Save ───────────────────────────────────────────────────

    /// Persist a finished report in one transaction.
    pub fn save_report(&mut self, report: &SessionReport) -> AnalysisResult<()> {
        let tx = self.conn.transaction()?;
        let sid = report.session_id.as_str();

        tx.execute(
            "INSERT INTO session (session_id, started_at, record_count, subject_count, raw_finding_count,
                                  finding_count, duplicates_dropped, summary_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                sid,
                report.started_at.to_rfc3339(),
                report.dataset.len() as i64,
                report.dataset.subject_count() as i64,
                report.raw_findings as i64,
                report.results.len() as i64,
                report.duplicates_dropped as i64,
                serde_json::to_string(&report.summary)?,
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO record (session_id, record_id, seq, timestamp, operator, record_type, originating,
                                     terminating, amount, duration, cell_id, latitude, longitude, device_imei)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            )?;
            for (seq, r) in report.dataset.records().iter().enumerate() {
                let coords = r.coordinates();
                stmt.execute(params![
                    sid,
                    r.record_id,
                    seq as i64,
                    r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                    r.source_operator.code(),
                    r.record_type.as_str(),
                    r.originating_identifier,
                    r.terminating_identifier,
                    r.amount,
                    r.duration,
                    r.cell_id(),
                    coords.map(|c| c.lat),
                    coords.map(|c| c.lon),
                    r.device_imei,
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO finding (session_id, rank, detector_name, severity, primary_subject, subjects_json,
                                      record_ids_json, explanation, score)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for (rank, f) in report.results.iter().enumerate() {
                stmt.execute(params![
                    sid,
                    rank as i64,
                    f.detector_name,
                    f.severity.as_str(),
                    f.primary_subject(),
                    serde_json::to_string(&f.subjects)?,
                    serde_json::to_string(&f.record_ids)?,
                    f.explanation,
                    f.score,
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO session_issue (session_id, stage, kind, subject, message)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for issue in &report.issues {
                stmt.execute(params![sid, issue.stage, issue.kind.as_str(), issue.subject, issue.message])?;
            }
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO event_log (session_id, seq, stage, event_type, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (seq, event) in report.events.iter().enumerate() {
                let entry = EventLogEntry::from_event(sid, seq as u64, event)?;
                stmt.execute(params![entry.session_id, entry.seq as i64, entry.stage, entry.event_type, entry.payload])?;
            }
        }

        tx.commit()?;
        log::info!(
            "Saved session {sid}: {} records, {} findings",
            report.dataset.len(),
            report.results.len()
        );
        Ok(())
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn session_ids(&self) -> AnalysisResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT session_id FROM session ORDER BY started_at, session_id")?;
        let ids = stmt.query_map([], |row| row.get(0))?.collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    pub fn record_count(&self, session_id: &str) -> AnalysisResult<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM record WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    pub fn finding_count(&self, session_id: &str) -> AnalysisResult<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM finding WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Findings in report order.
    pub fn findings(&self, session_id: &str) -> AnalysisResult<Vec<Finding>> {
        self.query_findings(
            "SELECT detector_name, severity, subjects_json, record_ids_json, explanation, score
             FROM finding WHERE session_id = ?1 ORDER BY rank ASC",
            params![session_id],
        )
    }

    pub fn findings_by_severity(&self, session_id: &str, severity: Severity) -> AnalysisResult<Vec<Finding>> {
        self.query_findings(
            "SELECT detector_name, severity, subjects_json, record_ids_json, explanation, score
             FROM finding WHERE session_id = ?1 AND severity = ?2 ORDER BY rank ASC",
            params![session_id, severity.as_str()],
        )
    }

    fn query_findings(&self, sql: &str, args: impl rusqlite::Params) -> AnalysisResult<Vec<Finding>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, f64>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut findings = Vec::with_capacity(rows.len());
        for (detector_name, severity, subjects, record_ids, explanation, score) in rows {
            findings.push(Finding {
                detector_name,
                severity: serde_json::from_value(serde_json::Value::String(severity))?,
                subjects: serde_json::from_str(&subjects)?,
                record_ids: serde_json::from_str(&record_ids)?,
                explanation,
                score,
            });
        }
        Ok(findings)
    }

    pub fn issues(&self, session_id: &str) -> AnalysisResult<Vec<SessionIssue>> {
        let mut stmt = self.conn.prepare(
            "SELECT stage, kind, subject, message FROM session_issue WHERE session_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut issues = Vec::with_capacity(rows.len());
        for (stage, kind, subject, message) in rows {
            issues.push(SessionIssue {
                stage,
                kind: serde_json::from_value(serde_json::Value::String(kind))?,
                subject,
                message,
            });
        }
        Ok(issues)
    }

    pub fn events(&self, session_id: &str) -> AnalysisResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, seq, stage, event_type, payload
             FROM event_log WHERE session_id = ?1 ORDER BY seq ASC",
        )?;
        let entries = stmt
            .query_map(params![session_id], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    session_id: row.get(1)?,
                    seq: row.get::<_, i64>(2)? as u64,
                    stage: row.get(3)?,
                    event_type: row.get(4)?,
                    payload: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}
