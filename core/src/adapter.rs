//! Operator adapters: raw export rows into TransactionRecords.
//!
//! RULE: Every network export schema is handled by exactly one
//! OperatorAdapter. The ingestion pipeline picks adapters by Operator
//! through the AdapterRegistry and never looks at raw columns itself.
//!
//! Each adapter recognises two layouts from the header line: a CDR
//! (call/SMS) export and a mobile-money statement export.

pub mod airteltigo;
pub mod mtn;
pub mod telecel;

use crate::{
    error::{AnalysisError, AnalysisResult},
    record::{normalize_subject, CellLocation, Coordinates, Operator, RecordType, TransactionRecord},
    types::SubjectId,
};
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::sync::Arc;

pub use airteltigo::AirtelTigoAdapter;
pub use mtn::MtnAdapter;
pub use telecel::TelecelAdapter;

/// Reasons kept per source for the session summary; the rest are counted.
const MAX_SKIP_SAMPLES: usize = 5;

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportLayout {
    Cdr,
    MobileMoney,
}

// ── Header & rows ────────────────────────────────────────────────────────────

/// Column positions keyed by case-folded, trimmed column name.
#[derive(Debug, Clone)]
pub struct Header {
    columns: HashMap<String, usize>,
}

impl Header {
    pub fn from_record(record: &StringRecord) -> Self {
        let columns = record
            .iter()
            .enumerate()
            .map(|(i, name)| (fold(name), i))
            .collect();
        Self { columns }
    }

    pub fn has(&self, name: &str) -> bool {
        self.columns.contains_key(&fold(name))
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.get(&fold(name)).copied()
    }

    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required.iter().copied().filter(|c| !self.has(c)).collect()
    }
}

fn fold(name: &str) -> String {
    name.trim_start_matches('\u{feff}').trim().to_ascii_lowercase()
}

/// One data row viewed through its header.
pub struct RawRow<'a> {
    header: &'a Header,
    fields: &'a StringRecord,
    /// Account holder supplied with the source, for single-account
    /// statements that never name their owner.
    source_owner: Option<&'a str>,
    pub line: u64,
}

impl<'a> RawRow<'a> {
    pub fn new(header: &'a Header, fields: &'a StringRecord, line: u64) -> Self {
        Self { header, fields, source_owner: None, line }
    }

    pub fn with_source_owner(mut self, owner: Option<&'a str>) -> Self {
        self.source_owner = owner;
        self
    }

    /// Trimmed, non-empty value of `column`, if present.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let idx = self.header.position(column)?;
        let value = self.fields.get(idx)?.trim();
        (!value.is_empty()).then_some(value)
    }

    /// First non-empty value among several alternative column names.
    pub fn get_any(&self, columns: &[&str]) -> Option<&'a str> {
        columns.iter().find_map(|c| self.get(c))
    }

    pub fn require(&self, operator: Operator, column: &str) -> AnalysisResult<&'a str> {
        self.get(column).ok_or_else(|| {
            AnalysisError::schema(operator, format!("line {}: empty '{column}'", self.line))
        })
    }

    pub fn subject(&self, operator: Operator, column: &str) -> AnalysisResult<SubjectId> {
        let raw = self.require(operator, column)?;
        normalize_subject(raw).ok_or_else(|| {
            AnalysisError::schema(operator, format!("line {}: invalid identifier '{raw}' in '{column}'", self.line))
        })
    }

    /// Owner from `column` when the export has it, else the owner given
    /// with the source.
    pub fn owner(&self, operator: Operator, column: &str) -> AnalysisResult<SubjectId> {
        if self.get(column).is_some() {
            return self.subject(operator, column);
        }
        let raw = self.source_owner.ok_or_else(|| {
            AnalysisError::schema(
                operator,
                format!("line {}: no '{column}' column and no owner given for the source", self.line),
            )
        })?;
        normalize_subject(raw).ok_or_else(|| {
            AnalysisError::schema(operator, format!("line {}: invalid source owner '{raw}'", self.line))
        })
    }

    pub fn timestamp(&self, operator: Operator, column: &str) -> AnalysisResult<NaiveDateTime> {
        let raw = self.require(operator, column)?;
        parse_timestamp(raw).ok_or_else(|| {
            AnalysisError::schema(operator, format!("line {}: unparseable timestamp '{raw}'", self.line))
        })
    }

    pub fn location(&self, cell_columns: &[&str]) -> Option<CellLocation> {
        let cell_id = self.get_any(cell_columns).map(str::to_string);
        let coordinates = match (self.get_any(&["latitude", "lat"]), self.get_any(&["longitude", "lon", "long"])) {
            (Some(lat), Some(lon)) => match (lat.parse::<f64>(), lon.parse::<f64>()) {
                (Ok(lat), Ok(lon)) => Coordinates::new(lat, lon),
                _ => None,
            },
            _ => None,
        };
        CellLocation::from_parts(cell_id, coordinates)
    }

    pub fn imei(&self) -> Option<String> {
        self.get("imei")
            .map(|v| v.strip_suffix(".0").unwrap_or(v))
            .filter(|v| !v.eq_ignore_ascii_case("nan"))
            .map(str::to_string)
    }
}

// ── Adapter contract ─────────────────────────────────────────────────────────

/// The contract every operator adapter must fulfill.
pub trait OperatorAdapter: Send + Sync {
    fn operator(&self) -> Operator;

    /// Decide the export layout from the header, or fail the whole source.
    fn parse_header(&self, header: &Header) -> AnalysisResult<ExportLayout>;

    /// Map one data row. A failure skips only this row.
    fn map_row_to_record(&self, layout: ExportLayout, row: &RawRow<'_>) -> AnalysisResult<TransactionRecord>;

    /// Semantic checks shared by every operator. Adapters may extend.
    fn validate_row(&self, record: &TransactionRecord) -> AnalysisResult<()> {
        validate_common(record)
    }
}

pub fn validate_common(record: &TransactionRecord) -> AnalysisResult<()> {
    let op = record.source_operator;
    if record.originating_identifier.is_empty() {
        return Err(AnalysisError::schema(op, format!("{}: empty originating identifier", record.record_id)));
    }
    if let Some(amount) = record.amount {
        if !amount.is_finite() || amount < 0.0 {
            return Err(AnalysisError::schema(op, format!("{}: invalid amount {amount}", record.record_id)));
        }
    }
    if let Some(duration) = record.duration {
        if duration < 0 {
            return Err(AnalysisError::schema(op, format!("{}: negative duration {duration}", record.record_id)));
        }
    }
    if record.record_type.is_mobile_money() && record.amount.is_none() {
        return Err(AnalysisError::schema(op, format!("{}: mobile money record without amount", record.record_id)));
    }
    if record.record_type == RecordType::MobileMoneyTransfer && record.terminating_identifier.is_none() {
        return Err(AnalysisError::schema(op, format!("{}: transfer without counterparty", record.record_id)));
    }
    Ok(())
}

/// Pick the layout whose required columns are all present, or report the
/// columns missing from the closest candidate.
pub fn detect_layout(
    operator: Operator,
    header: &Header,
    cdr_columns: &[&str],
    money_columns: &[&str],
) -> AnalysisResult<ExportLayout> {
    let missing_cdr = header.missing(cdr_columns);
    if missing_cdr.is_empty() {
        return Ok(ExportLayout::Cdr);
    }
    let missing_money = header.missing(money_columns);
    if missing_money.is_empty() {
        return Ok(ExportLayout::MobileMoney);
    }
    let (layout, missing) = if missing_money.len() < missing_cdr.len() {
        ("mobile money", missing_money)
    } else {
        ("CDR", missing_cdr)
    };
    Err(AnalysisError::schema(
        operator,
        format!("not a recognised export; {layout} layout is missing columns: {}", missing.join(", ")),
    ))
}

// ── Normalization ────────────────────────────────────────────────────────────

/// Result of normalizing one source.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizeOutcome {
    pub operator: Operator,
    pub layout: ExportLayout,
    pub records: Vec<TransactionRecord>,
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub skip_samples: Vec<String>,
}

/// Normalize a delimited-text export through `adapter`.
///
/// Fails only when the header cannot be mapped; bad rows are skipped and
/// counted on the outcome.
pub fn normalize<R: Read>(adapter: &dyn OperatorAdapter, input: R) -> AnalysisResult<NormalizeOutcome> {
    normalize_owned(adapter, input, None)
}

/// As [`normalize`], with the account holder of a single-account export.
pub fn normalize_owned<R: Read>(
    adapter: &dyn OperatorAdapter,
    mut input: R,
    owner: Option<&str>,
) -> AnalysisResult<NormalizeOutcome> {
    let operator = adapter.operator();
    let mut bytes = Vec::new();
    input.read_to_end(&mut bytes)?;
    let delimiter = sniff_delimiter(&bytes);

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(bytes.as_slice());

    let header_record = reader.headers()?.clone();
    if header_record.iter().all(|h| h.trim().is_empty()) {
        return Err(AnalysisError::schema(operator, "export has no header line"));
    }
    let header = Header::from_record(&header_record);
    let layout = adapter.parse_header(&header)?;

    let mut records = Vec::new();
    let mut rows_read = 0usize;
    let mut rows_skipped = 0usize;
    let mut skip_samples = Vec::new();

    for (i, row) in reader.records().enumerate() {
        let line = i as u64 + 2;
        let mapped = row
            .map_err(AnalysisError::from)
            .and_then(|fields| {
                if fields.iter().all(|f| f.trim().is_empty()) {
                    return Ok(None);
                }
                let raw = RawRow::new(&header, &fields, line).with_source_owner(owner);
                let record = adapter.map_row_to_record(layout, &raw)?;
                adapter.validate_row(&record)?;
                Ok(Some(record))
            });
        match mapped {
            Ok(None) => continue,
            Ok(Some(record)) => {
                rows_read += 1;
                records.push(record);
            }
            Err(e) => {
                rows_read += 1;
                rows_skipped += 1;
                if skip_samples.len() < MAX_SKIP_SAMPLES {
                    skip_samples.push(e.to_string());
                }
            }
        }
    }

    if rows_skipped > 0 {
        log::warn!("{operator} {layout:?} export: skipped {rows_skipped} of {rows_read} rows");
    }
    log::debug!("{operator} {layout:?} export: {} records normalized", records.len());

    Ok(NormalizeOutcome { operator, layout, records, rows_read, rows_skipped, skip_samples })
}

/// Choose between comma, semicolon and tab from the header line.
fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let first_line = bytes.split(|&b| b == b'\n').next().unwrap_or(&[]);
    [b',', b';', b'\t']
        .into_iter()
        .max_by_key(|d| (first_line.iter().filter(|&&b| b == *d).count(), *d == b','))
        .unwrap_or(b',')
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Adapters by operator. New networks register here; the pipeline is
/// unchanged.
#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: BTreeMap<Operator, Arc<dyn OperatorAdapter>>,
}

impl AdapterRegistry {
    pub fn empty() -> Self {
        Self { adapters: BTreeMap::new() }
    }

    /// Registry with the built-in MTN, Telecel and AirtelTigo adapters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(MtnAdapter));
        registry.register(Arc::new(TelecelAdapter));
        registry.register(Arc::new(AirtelTigoAdapter));
        registry
    }

    /// Register an adapter, replacing any previous one for its operator.
    pub fn register(&mut self, adapter: Arc<dyn OperatorAdapter>) {
        self.adapters.insert(adapter.operator(), adapter);
    }

    pub fn get(&self, operator: Operator) -> Option<Arc<dyn OperatorAdapter>> {
        self.adapters.get(&operator).cloned()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ── Field parsing ────────────────────────────────────────────────────────────

/// Parse an export timestamp. Embedded newlines (a known spreadsheet
/// artefact) are removed first.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let cleaned: String = raw.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    let cleaned = cleaned.trim();
    let cleaned = cleaned.split('.').next().unwrap_or(cleaned);
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(cleaned, fmt).ok())
}

/// Parse a monetary amount, tolerating currency labels and thousands
/// separators (`GHS 1,250.00`). Empty means zero is NOT assumed.
///
/// `.` is the only decimal separator. A comma must group exactly three
/// digits before any `.`; anything else (`1.250,00`, `12,5`) is rejected.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let kept: Vec<char> = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    if !commas_group_thousands(&kept) {
        return None;
    }
    let cleaned: String = kept.into_iter().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn commas_group_thousands(chars: &[char]) -> bool {
    let dot = chars.iter().position(|c| *c == '.');
    chars.iter().enumerate().filter(|(_, c)| **c == ',').all(|(i, _)| {
        let group_end = i + 4;
        dot.map_or(true, |d| i < d)
            && i > 0
            && chars.len() >= group_end
            && chars[i + 1..group_end].iter().all(char::is_ascii_digit)
            && chars.get(group_end).map_or(true, |c| matches!(c, ',' | '.'))
    })
}

/// Parse a duration in seconds: `125`, `125.0` or `HH:MM:SS` / `MM:SS`.
pub fn parse_duration(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.contains(':') {
        let mut total = 0i64;
        for part in raw.split(':') {
            let part = part.trim().parse::<i64>().ok()?;
            total = total.checked_mul(60)?.checked_add(part)?;
        }
        return Some(total);
    }
    let value = raw.parse::<f64>().ok()?;
    value.is_finite().then(|| value.round() as i64)
}

/// Deterministic native id for exports without an id column.
pub fn content_key(
    kind: &str,
    timestamp: NaiveDateTime,
    from: &str,
    to: Option<&str>,
    magnitude: Option<f64>,
) -> String {
    let magnitude = magnitude.map(|m| format!("{m:.2}")).unwrap_or_else(|| "-".into());
    format!(
        "{kind}-{}-{from}-{}-{magnitude}",
        timestamp.format("%Y%m%d%H%M%S"),
        to.unwrap_or("-"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_in_every_supported_format() {
        for raw in [
            "2024-03-01 10:15:30",
            "2024-03-01\n10:15:30",
            "01/03/2024 10:15:30",
            "01-03-2024 10:15:30",
            "2024/03/01 10:15:30",
            "2024-03-01T10:15:30",
            "2024-03-01 10:15:30.000",
        ] {
            let ts = parse_timestamp(raw).unwrap_or_else(|| panic!("failed on {raw:?}"));
            assert_eq!(ts.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-03-01 10:15:30");
        }
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn amounts_and_durations() {
        assert_eq!(parse_amount("GHS 1,250.50"), Some(1250.5));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_duration("125"), Some(125));
        assert_eq!(parse_duration("125.4"), Some(125));
        assert_eq!(parse_duration("00:02:05"), Some(125));
        assert_eq!(parse_duration("abc"), None);
        assert_eq!(parse_duration("9223372036854775807:00"), None);
    }

    #[test]
    fn ambiguous_separators_are_rejected() {
        assert_eq!(parse_amount("1,250,000.75"), Some(1_250_000.75));
        assert_eq!(parse_amount("1,250"), Some(1250.0));
        assert_eq!(parse_amount("1.250,00"), None);
        assert_eq!(parse_amount("12,50"), None);
        assert_eq!(parse_amount(",500"), None);
    }

    #[test]
    fn overflowing_duration_skips_only_its_row() {
        let csv = "calling_no,called_no,duration,event_date_time\n\
                   0241111111,0242222222,9223372036854775807:00,2024-03-01 09:00:00\n\
                   0241111111,0242222222,00:01:00,2024-03-01 09:05:00\n";
        let out = normalize(&MtnAdapter, csv.as_bytes()).expect("header maps");
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.rows_skipped, 1);
        assert_eq!(out.records[0].duration, Some(60));
    }

    #[test]
    fn delimiter_sniffing() {
        assert_eq!(sniff_delimiter(b"a;b;c\n1;2;3"), b';');
        assert_eq!(sniff_delimiter(b"a\tb\tc\n"), b'\t');
        assert_eq!(sniff_delimiter(b"a,b,c\n"), b',');
        assert_eq!(sniff_delimiter(b"single\n"), b',');
    }
}
