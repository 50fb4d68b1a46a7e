//! Dataset and per-subject summaries for chart and report collaborators.
//!
//! Pure data: nothing here renders or writes anything.

use crate::{
    dataset::UnifiedDataset,
    record::{CellLocation, Coordinates, Operator, RecordType, TransactionRecord},
    types::SubjectId,
};
use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

const TOP_N: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ranked {
    pub key: String,
    pub count: usize,
}

/// Six-hour slices of the day used for location habits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePeriod {
    /// 00:00 to 05:59.
    Night,
    Morning,
    Afternoon,
    /// 18:00 to 23:59.
    Evening,
}

impl TimePeriod {
    pub fn of(timestamp: NaiveDateTime) -> Self {
        match timestamp.hour() {
            0..=5 => Self::Night,
            6..=11 => Self::Morning,
            12..=17 => Self::Afternoon,
            _ => Self::Evening,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Night => "night",
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
        }
    }
}

/// Where a subject was last seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastLocation {
    pub timestamp: NaiveDateTime,
    pub record_id: String,
    pub location: CellLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub records: usize,
    pub subjects: usize,
    pub by_operator: BTreeMap<Operator, usize>,
    pub by_record_type: BTreeMap<RecordType, usize>,
    pub first_timestamp: Option<NaiveDateTime>,
    pub last_timestamp: Option<NaiveDateTime>,
    pub total_call_seconds: i64,
    pub avg_call_seconds: f64,
    pub cashin_total: f64,
    pub cashout_total: f64,
    pub transfer_total: f64,
    /// Records per hour of day, 0..24.
    pub hourly: [usize; 24],
    /// Records per weekday, Monday first.
    pub weekday: [usize; 7],
    pub top_originators: Vec<Ranked>,
    pub top_imeis: Vec<Ranked>,
    pub top_cells: Vec<Ranked>,
    /// Coordinates as `"lat,lon"` rounded to 4 places (about 11 m).
    pub top_coordinates: Vec<Ranked>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectProfile {
    pub subject: SubjectId,
    pub records: usize,
    pub first_activity: Option<NaiveDateTime>,
    pub last_activity: Option<NaiveDateTime>,
    pub calls_made: usize,
    pub calls_received: usize,
    pub total_call_seconds: i64,
    pub money_in: f64,
    pub money_out: f64,
    pub hourly: [usize; 24],
    /// Both directions.
    pub top_contacts: Vec<Ranked>,
    pub top_outgoing_contacts: Vec<Ranked>,
    pub top_incoming_contacts: Vec<Ranked>,
    pub top_cells: Vec<Ranked>,
    pub top_coordinates: Vec<Ranked>,
    pub imeis: Vec<Ranked>,
    pub last_location: Option<LastLocation>,
    /// Most frequent cell (or coordinate pair) per period of the day.
    pub location_by_period: BTreeMap<TimePeriod, Ranked>,
}

#[derive(Default)]
struct Counter<'a>(HashMap<Cow<'a, str>, usize>);

impl<'a> Counter<'a> {
    fn add(&mut self, key: impl Into<Cow<'a, str>>) {
        *self.0.entry(key.into()).or_insert(0) += 1;
    }

    /// Highest counts first, ties by key.
    fn top(self, n: usize) -> Vec<Ranked> {
        let mut v: Vec<Ranked> = self
            .0
            .into_iter()
            .map(|(key, count)| Ranked { key: key.into_owned(), count })
            .collect();
        v.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
        v.truncate(n);
        v
    }
}

fn is_call(r: &TransactionRecord) -> bool {
    r.record_type == RecordType::Call
}

fn coordinate_key(c: Coordinates) -> String {
    format!("{:.4},{:.4}", c.lat, c.lon)
}

/// Cell id when known, else the rounded coordinates.
fn location_key(r: &TransactionRecord) -> Option<Cow<'_, str>> {
    r.cell_id()
        .map(Cow::Borrowed)
        .or_else(|| r.coordinates().map(|c| Cow::Owned(coordinate_key(c))))
}

pub fn summarize(dataset: &UnifiedDataset) -> DatasetSummary {
    let mut by_operator = BTreeMap::new();
    let mut by_record_type = BTreeMap::new();
    let mut hourly = [0usize; 24];
    let mut weekday = [0usize; 7];
    let (mut call_seconds, mut calls) = (0i64, 0usize);
    let (mut cashin, mut cashout, mut transfer) = (0.0, 0.0, 0.0);
    let mut originators = Counter::default();
    let mut imeis = Counter::default();
    let mut cells = Counter::default();
    let mut coordinates = Counter::default();

    for r in dataset.records() {
        *by_operator.entry(r.source_operator).or_insert(0) += 1;
        *by_record_type.entry(r.record_type).or_insert(0) += 1;
        hourly[r.timestamp.hour() as usize] += 1;
        weekday[r.timestamp.weekday().num_days_from_monday() as usize] += 1;
        originators.add(&r.originating_identifier);
        if let Some(imei) = r.device_imei.as_deref() {
            imeis.add(imei);
        }
        if let Some(cell) = r.cell_id() {
            cells.add(cell);
        }
        if let Some(c) = r.coordinates() {
            coordinates.add(coordinate_key(c));
        }
        if is_call(r) {
            calls += 1;
            call_seconds += r.duration.unwrap_or(0);
        }
        let amount = r.amount.unwrap_or(0.0);
        match r.record_type {
            RecordType::MobileMoneyCashin => cashin += amount,
            RecordType::MobileMoneyCashout => cashout += amount,
            RecordType::MobileMoneyTransfer => transfer += amount,
            RecordType::Call | RecordType::Sms => {}
        }
    }

    let span = dataset.time_span();
    DatasetSummary {
        records: dataset.len(),
        subjects: dataset.subject_count(),
        by_operator,
        by_record_type,
        first_timestamp: span.map(|s| s.0),
        last_timestamp: span.map(|s| s.1),
        total_call_seconds: call_seconds,
        avg_call_seconds: if calls > 0 { call_seconds as f64 / calls as f64 } else { 0.0 },
        cashin_total: cashin,
        cashout_total: cashout,
        transfer_total: transfer,
        hourly,
        weekday,
        top_originators: originators.top(TOP_N),
        top_imeis: imeis.top(TOP_N),
        top_cells: cells.top(TOP_N),
        top_coordinates: coordinates.top(TOP_N),
    }
}

/// Profile of one subject. Unknown subjects yield an empty profile.
pub fn subject_profile(dataset: &UnifiedDataset, subject: &str) -> SubjectProfile {
    let mut profile = SubjectProfile {
        subject: subject.to_string(),
        records: 0,
        first_activity: None,
        last_activity: None,
        calls_made: 0,
        calls_received: 0,
        total_call_seconds: 0,
        money_in: 0.0,
        money_out: 0.0,
        hourly: [0; 24],
        top_contacts: Vec::new(),
        top_outgoing_contacts: Vec::new(),
        top_incoming_contacts: Vec::new(),
        top_cells: Vec::new(),
        top_coordinates: Vec::new(),
        imeis: Vec::new(),
        last_location: None,
        location_by_period: BTreeMap::new(),
    };
    let mut contacts = Counter::default();
    let mut outgoing_contacts = Counter::default();
    let mut incoming_contacts = Counter::default();
    let mut cells = Counter::default();
    let mut coordinates = Counter::default();
    let mut imeis = Counter::default();
    let mut by_period: BTreeMap<TimePeriod, Counter<'_>> = BTreeMap::new();

    for r in dataset.records_for(subject) {
        profile.records += 1;
        profile.first_activity.get_or_insert(r.timestamp);
        profile.last_activity = Some(r.timestamp);
        profile.hourly[r.timestamp.hour() as usize] += 1;
        let outgoing = r.originating_identifier == subject;

        if let Some(other) = r.counterparty_of(subject) {
            contacts.add(other);
            if outgoing {
                outgoing_contacts.add(other);
            } else {
                incoming_contacts.add(other);
            }
        }
        if outgoing {
            // Location and handset describe the originator's side.
            if let Some(cell) = r.cell_id() {
                cells.add(cell);
            }
            if let Some(c) = r.coordinates() {
                coordinates.add(coordinate_key(c));
            }
            if let Some(key) = location_key(r) {
                by_period.entry(TimePeriod::of(r.timestamp)).or_default().add(key);
            }
            if let Some(location) = r.location_cell.clone() {
                profile.last_location =
                    Some(LastLocation { timestamp: r.timestamp, record_id: r.record_id.clone(), location });
            }
            if let Some(imei) = r.device_imei.as_deref() {
                imeis.add(imei);
            }
        }
        if is_call(r) {
            if outgoing {
                profile.calls_made += 1;
            } else {
                profile.calls_received += 1;
            }
            profile.total_call_seconds += r.duration.unwrap_or(0);
        }
        if let Some(amount) = r.amount.filter(|_| r.record_type.is_mobile_money()) {
            match r.record_type {
                RecordType::MobileMoneyCashin => profile.money_in += amount,
                RecordType::MobileMoneyCashout => profile.money_out += amount,
                _ if outgoing => profile.money_out += amount,
                _ => profile.money_in += amount,
            }
        }
    }

    profile.top_contacts = contacts.top(TOP_N);
    profile.top_outgoing_contacts = outgoing_contacts.top(TOP_N);
    profile.top_incoming_contacts = incoming_contacts.top(TOP_N);
    profile.top_cells = cells.top(TOP_N);
    profile.top_coordinates = coordinates.top(TOP_N);
    profile.imeis = imeis.top(TOP_N);
    profile.location_by_period = by_period
        .into_iter()
        .filter_map(|(period, counter)| counter.top(1).pop().map(|top| (period, top)))
        .collect();
    profile
}
