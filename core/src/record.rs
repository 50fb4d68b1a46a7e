//! The canonical, operator-agnostic transaction record.
//!
//! RULE: Records are created by adapters and never mutated once they
//! enter a UnifiedDataset. Everything downstream reads them by reference
//! or copies their ids by value.

use crate::types::{RecordId, SubjectId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Network that produced an export. Declaration order is the tie-break
/// order used when sorting records with equal timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "MTN")]
    Mtn,
    Telecel,
    AirtelTigo,
}

impl Operator {
    pub const ALL: [Operator; 3] = [Operator::Mtn, Operator::Telecel, Operator::AirtelTigo];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Mtn => "MTN",
            Self::Telecel => "TELECEL",
            Self::AirtelTigo => "AIRTELTIGO",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Mtn => "MTN",
            Self::Telecel => "Telecel",
            Self::AirtelTigo => "AirtelTigo",
        };
        f.write_str(label)
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "mtn" => Ok(Self::Mtn),
            "telecel" | "vodafone" => Ok(Self::Telecel),
            "airteltigo" | "at" | "airtel" | "tigo" => Ok(Self::AirtelTigo),
            _ => Err(format!("unknown operator '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Call,
    Sms,
    MobileMoneyTransfer,
    MobileMoneyCashout,
    MobileMoneyCashin,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Sms => "sms",
            Self::MobileMoneyTransfer => "mobile_money_transfer",
            Self::MobileMoneyCashout => "mobile_money_cashout",
            Self::MobileMoneyCashin => "mobile_money_cashin",
        }
    }

    pub fn is_mobile_money(&self) -> bool {
        matches!(
            self,
            Self::MobileMoneyTransfer | Self::MobileMoneyCashout | Self::MobileMoneyCashin
        )
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "call" => Ok(Self::Call),
            "sms" => Ok(Self::Sms),
            "mobile_money_transfer" => Ok(Self::MobileMoneyTransfer),
            "mobile_money_cashout" => Ok(Self::MobileMoneyCashout),
            "mobile_money_cashin" => Ok(Self::MobileMoneyCashin),
            other => Err(format!("unknown record type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon);
        valid.then_some(Self { lat, lon })
    }

    /// Great-circle distance in kilometres.
    pub fn haversine_km(&self, other: &Coordinates) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = (other.lat - self.lat).to_radians();
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// Where the handset was served from. Either part may be missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CellLocation {
    pub cell_id: Option<String>,
    pub coordinates: Option<Coordinates>,
}

impl CellLocation {
    pub fn from_parts(cell_id: Option<String>, coordinates: Option<Coordinates>) -> Option<Self> {
        if cell_id.is_none() && coordinates.is_none() {
            None
        } else {
            Some(Self { cell_id, coordinates })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub record_id: RecordId,
    pub raw_native_id: String,
    pub timestamp: NaiveDateTime,
    pub source_operator: Operator,
    pub record_type: RecordType,
    pub originating_identifier: SubjectId,
    pub terminating_identifier: Option<SubjectId>,
    pub amount: Option<f64>,
    pub duration: Option<i64>,
    pub location_cell: Option<CellLocation>,
    pub device_imei: Option<String>,
}

impl TransactionRecord {
    /// A bare record; optional fields are filled with the `with_*` methods.
    pub fn new(
        operator: Operator,
        raw_native_id: impl Into<String>,
        timestamp: NaiveDateTime,
        record_type: RecordType,
        originating: impl Into<SubjectId>,
        terminating: Option<SubjectId>,
    ) -> Self {
        let raw_native_id = raw_native_id.into();
        Self {
            record_id: Self::record_id_for(operator, &raw_native_id),
            raw_native_id,
            timestamp,
            source_operator: operator,
            record_type,
            originating_identifier: originating.into(),
            terminating_identifier: terminating,
            amount: None,
            duration: None,
            location_cell: None,
            device_imei: None,
        }
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_duration(mut self, seconds: i64) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn with_location(mut self, cell_id: Option<&str>, coordinates: Option<Coordinates>) -> Self {
        self.location_cell = CellLocation::from_parts(cell_id.map(str::to_string), coordinates);
        self
    }

    pub fn with_imei(mut self, imei: impl Into<String>) -> Self {
        self.device_imei = Some(imei.into());
        self
    }

    pub fn record_id_for(operator: Operator, raw_native_id: &str) -> RecordId {
        format!("{}:{}", operator.code(), raw_native_id)
    }

    /// Every subject this record touches, originator first.
    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.originating_identifier.as_str())
            .chain(self.terminating_identifier.as_deref())
    }

    pub fn involves(&self, subject: &str) -> bool {
        self.subjects().any(|s| s == subject)
    }

    /// The other party relative to `subject`, if any.
    pub fn counterparty_of(&self, subject: &str) -> Option<&str> {
        if self.originating_identifier == subject {
            self.terminating_identifier.as_deref()
        } else if self.terminating_identifier.as_deref() == Some(subject) {
            Some(self.originating_identifier.as_str())
        } else {
            None
        }
    }

    /// Seconds since the epoch, treating the export's local time as UTC.
    /// Only differences are ever used, so the offset cancels out.
    pub fn epoch_seconds(&self) -> i64 {
        self.timestamp.and_utc().timestamp()
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.location_cell.as_ref().and_then(|l| l.coordinates)
    }

    pub fn cell_id(&self) -> Option<&str> {
        self.location_cell.as_ref().and_then(|l| l.cell_id.as_deref())
    }

    /// Sort key that makes the dataset order total and deterministic.
    pub fn sort_key(&self) -> (NaiveDateTime, Operator, &str) {
        (self.timestamp, self.source_operator, self.raw_native_id.as_str())
    }
}

/// Normalize a raw phone number or account string into a subject id.
///
/// Strips separators, spreadsheet float artefacts (`233241234567.0`) and
/// rewrites the Ghana country prefix to the local leading zero. Returns
/// None for empty or placeholder values.
pub fn normalize_subject(raw: &str) -> Option<SubjectId> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    if trimmed.is_empty() || matches!(trimmed.to_ascii_lowercase().as_str(), "nan" | "none" | "null" | "-" | "0") {
        return None;
    }

    let has_letters = trimmed.chars().any(|c| c.is_ascii_alphabetic());
    if has_letters {
        // Wallet or merchant account codes are kept verbatim, upper-cased.
        return Some(trimmed.to_ascii_uppercase());
    }

    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let local = if let Some(rest) = digits.strip_prefix("00233") {
        format!("0{rest}")
    } else if digits.len() == 12 && digits.starts_with("233") {
        format!("0{}", &digits[3..])
    } else if digits.len() == 9 {
        format!("0{digits}")
    } else {
        digits
    };
    Some(local)
}
