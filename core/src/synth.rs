//! Synthetic operator exports for demos and end-to-end tests.
//!
//! Each operator gets one CDR file and one mobile-money file, written in
//! that operator's own column layout. Background traffic is random but
//! seeded; a handful of known patterns are planted on fixed subjects so
//! the detectors have something to find.
//!
//! RULE: The same seed always produces byte-identical files.

use crate::{
    error::AnalysisResult,
    ingestion::SourceSpec,
    record::{Coordinates, Operator},
    rng::{RngBank, StreamRng, StreamSlot},
};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::path::{Path, PathBuf};

const POOL_SIZE: usize = 24;
const BACKGROUND_CALLS: usize = 240;
const BACKGROUND_MONEY: usize = 90;
const SPAN_DAYS: i64 = 7;
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const ACCRA: (f64, f64) = (5.6037, -0.1870);
const KUMASI: (f64, f64) = (6.6885, -1.6244);

/// A pattern deliberately planted in the generated data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlantedPattern {
    pub detector: &'static str,
    pub subject: String,
    pub operator: Operator,
}

#[derive(Debug, Clone)]
pub struct SyntheticExports {
    pub sources: Vec<SourceSpec>,
    pub planted: Vec<PlantedPattern>,
}

fn base_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 4)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

fn fmt_time(t: NaiveDateTime) -> String {
    t.format(TIME_FORMAT).to_string()
}

fn random_time(rng: &mut StreamRng) -> NaiveDateTime {
    base_time() + Duration::seconds(rng.range_i64(0, SPAN_DAYS * 86_400))
}

/// Subscriber numbers in the 1_000_000..5_000_000 block. Planted subjects
/// live in the 555xxxx block, so the two never collide.
fn subscriber_pool(rng: &mut StreamRng, prefix: &str) -> Vec<String> {
    (0..POOL_SIZE)
        .map(|_| format!("{prefix}{:07}", rng.range_i64(1_000_000, 5_000_000)))
        .collect()
}

fn imei_for(rng: &mut StreamRng) -> String {
    format!("35{:013}", rng.next_u64_below(10_000_000_000_000))
}

/// A point within about 2 km of central Accra.
fn near_accra(rng: &mut StreamRng) -> Coordinates {
    let lat = ACCRA.0 + rng.range_f64(-0.01, 0.01);
    let lon = ACCRA.1 + rng.range_f64(-0.01, 0.01);
    Coordinates { lat, lon }
}

fn two_distinct<'a>(rng: &mut StreamRng, pool: &'a [String]) -> (&'a str, &'a str) {
    let a = rng.next_u64_below(pool.len() as u64) as usize;
    let b = (a + 1 + rng.next_u64_below(pool.len() as u64 - 1) as usize) % pool.len();
    (&pool[a], &pool[b])
}

/// Rows are sorted by their time column before writing.
struct Table {
    header: Vec<&'static str>,
    rows: Vec<(NaiveDateTime, Vec<String>)>,
}

impl Table {
    fn new(header: &[&'static str]) -> Self {
        Self { header: header.to_vec(), rows: Vec::new() }
    }

    fn push(&mut self, at: NaiveDateTime, row: Vec<String>) {
        self.rows.push((at, row));
    }

    fn write(mut self, path: &Path) -> AnalysisResult<()> {
        // Stable sort keeps generation order among equal timestamps.
        self.rows.sort_by_key(|(t, _)| *t);
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.header)?;
        for (_, row) in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Write all six exports into `dir` (created if missing).
pub fn generate_exports(seed: u64, dir: &Path) -> AnalysisResult<SyntheticExports> {
    std::fs::create_dir_all(dir)?;
    let bank = RngBank::new(seed);
    let mut out = SyntheticExports { sources: Vec::new(), planted: Vec::new() };

    let mut rng = bank.for_slot(StreamSlot::for_operator(Operator::Mtn));
    write_mtn(&mut rng, dir, &mut out)?;
    let mut rng = bank.for_slot(StreamSlot::for_operator(Operator::Telecel));
    write_telecel(&mut rng, dir, &mut out)?;
    let mut rng = bank.for_slot(StreamSlot::for_operator(Operator::AirtelTigo));
    write_airteltigo(&mut rng, dir, &mut out)?;

    log::info!(
        "Generated {} synthetic exports in {} with {} planted patterns (seed={seed})",
        out.sources.len(),
        dir.display(),
        out.planted.len()
    );
    Ok(out)
}

fn register(out: &mut SyntheticExports, dir: &Path, file: &str, operator: Operator) -> PathBuf {
    let path = dir.join(file);
    out.sources.push(SourceSpec::new(path.clone(), operator));
    path
}

// ── MTN ─────────────────────────────────────────────────────────────────────

fn write_mtn(rng: &mut StreamRng, dir: &Path, out: &mut SyntheticExports) -> AnalysisResult<()> {
    let op = Operator::Mtn;
    let pool = subscriber_pool(rng, "024");
    let imeis: Vec<String> = pool.iter().map(|_| imei_for(rng)).collect();

    let mut cdr = Table::new(&[
        "record_id", "calling_no", "called_no", "duration", "event_date_time", "latitude", "longitude", "imei",
        "call_type",
    ]);
    let mut seq = 0usize;
    let mut cdr_row = |cdr: &mut Table, at: NaiveDateTime, from: &str, to: &str, secs: i64, at_coords: Coordinates, imei: &str| {
        seq += 1;
        cdr.push(
            at,
            vec![
                format!("M{seq:06}"),
                from.to_string(),
                to.to_string(),
                secs.to_string(),
                fmt_time(at),
                format!("{:.5}", at_coords.lat),
                format!("{:.5}", at_coords.lon),
                imei.to_string(),
                "Voice".to_string(),
            ],
        );
    };

    for _ in 0..BACKGROUND_CALLS {
        let caller = rng.next_u64_below(pool.len() as u64) as usize;
        let callee = (caller + 1 + rng.next_u64_below(pool.len() as u64 - 1) as usize) % pool.len();
        let at = random_time(rng);
        let secs = rng.range_i64(5, 600);
        let coords = near_accra(rng);
        cdr_row(&mut cdr, at, &pool[caller], &pool[callee], secs, coords, &imeis[caller]);
    }

    // Velocity: Accra then Kumasi ten minutes later.
    let traveller = "0245550003";
    let t = base_time() + Duration::hours(30);
    let accra = Coordinates { lat: ACCRA.0, lon: ACCRA.1 };
    let kumasi = Coordinates { lat: KUMASI.0, lon: KUMASI.1 };
    cdr_row(&mut cdr, t, traveller, &pool[0], 40, accra, "359000000000031");
    cdr_row(&mut cdr, t + Duration::minutes(10), traveller, &pool[1], 55, kumasi, "359000000000031");
    out.planted.push(PlantedPattern { detector: "velocity", subject: traveller.to_string(), operator: op });

    // Device sharing: three numbers on one handset.
    let shared_imei = "356938035643809";
    let sharers = ["0245550020", "0245550021", "0245550022"];
    let t = base_time() + Duration::hours(50);
    for (i, sharer) in sharers.iter().enumerate() {
        let calls = if i == 0 { 3 } else { 1 };
        for k in 0..calls {
            let at = t + Duration::minutes((i * 90 + k * 20) as i64);
            cdr_row(&mut cdr, at, sharer, &pool[2 + i], 30, near_accra(rng), shared_imei);
        }
    }
    out.planted.push(PlantedPattern { detector: "device_sharing", subject: sharers[0].to_string(), operator: op });
    cdr.write(&register(out, dir, "mtn_cdr.csv", op))?;

    let mut momo = Table::new(&[
        "TRANSACTION REFERENCE", "TRANSACTION TYPE", "FROM PHONE NUMBER", "TO PHONE NUMBER", "FROM AMOUNT", "DATE",
    ]);
    let mut reference = 0usize;
    let mut momo_row = |momo: &mut Table, at: NaiveDateTime, kind: &str, from: &str, to: &str, amount: f64| {
        reference += 1;
        momo.push(
            at,
            vec![
                format!("MP{reference:07}"),
                kind.to_string(),
                from.to_string(),
                to.to_string(),
                format!("{amount:.2}"),
                fmt_time(at),
            ],
        );
    };

    for _ in 0..BACKGROUND_MONEY {
        let (from, to) = two_distinct(rng, &pool);
        let at = random_time(rng);
        let amount = rng.range_f64(1_200.0, 4_000.0).round();
        let kind = if rng.chance(0.2) { "CASH_OUT" } else { "TRANSFER" };
        let to = if kind == "CASH_OUT" { "" } else { to };
        momo_row(&mut momo, at, kind, from, to, amount);
    }

    // Burst: eight transfers inside one minute, each above the
    // structuring threshold.
    let burster = "0245550001";
    let t = base_time() + Duration::hours(20);
    for i in 0..8 {
        let at = t + Duration::seconds(i * 7);
        momo_row(&mut momo, at, "TRANSFER", burster, &pool[i as usize], 1_500.0);
    }
    out.planted.push(PlantedPattern { detector: "burst", subject: burster.to_string(), operator: op });

    // Structuring: four transfers of 900 within an hour.
    let structurer = "0245550002";
    let t = base_time() + Duration::hours(44);
    for i in 0..4 {
        let at = t + Duration::minutes(i * 15);
        momo_row(&mut momo, at, "TRANSFER", structurer, &pool[10 + i as usize], 900.0);
    }
    out.planted.push(PlantedPattern { detector: "structuring", subject: structurer.to_string(), operator: op });

    // Circular flow: A → B → C → A over twenty minutes.
    let ring = ["0245550010", "0245550011", "0245550012"];
    let t = base_time() + Duration::hours(70);
    momo_row(&mut momo, t, "TRANSFER", ring[0], ring[1], 2_000.0);
    momo_row(&mut momo, t + Duration::minutes(10), "TRANSFER", ring[1], ring[2], 1_950.0);
    momo_row(&mut momo, t + Duration::minutes(20), "TRANSFER", ring[2], ring[0], 1_900.0);
    out.planted.push(PlantedPattern { detector: "circular_flow", subject: ring[0].to_string(), operator: op });
    momo.write(&register(out, dir, "mtn_momo.csv", op))
}

// ── Telecel ─────────────────────────────────────────────────────────────────

fn write_telecel(rng: &mut StreamRng, dir: &Path, out: &mut SyntheticExports) -> AnalysisResult<()> {
    let op = Operator::Telecel;
    let pool = subscriber_pool(rng, "020");

    let mut cdr = Table::new(&["Record ID", "A Number", "B Number", "Service", "Start Time", "Duration", "Cell ID"]);
    for i in 0..BACKGROUND_CALLS {
        let (a, b) = two_distinct(rng, &pool);
        let at = random_time(rng);
        let sms = rng.chance(0.25);
        let (service, duration) = if sms { ("SMS", String::new()) } else { ("Voice", rng.range_i64(5, 900).to_string()) };
        let cell = format!("TC-{:03}", rng.next_u64_below(40));
        cdr.push(
            at,
            vec![format!("T{:06}", i + 1), a.to_string(), b.to_string(), service.to_string(), fmt_time(at), duration, cell],
        );
    }
    cdr.write(&register(out, dir, "telecel_cdr.csv", op))?;

    let mut cash = Table::new(&["Transaction ID", "Date", "Type", "Sender", "Receiver", "Amount"]);
    let mut txn = 0usize;
    let mut cash_row = |cash: &mut Table, at: NaiveDateTime, kind: &str, from: &str, to: &str, amount: f64| {
        txn += 1;
        cash.push(
            at,
            vec![format!("TX{txn:07}"), fmt_time(at), kind.to_string(), from.to_string(), to.to_string(), format!("{amount:.2}")],
        );
    };
    for _ in 0..BACKGROUND_MONEY {
        let (from, to) = two_distinct(rng, &pool);
        let at = random_time(rng);
        let amount = rng.range_f64(1_100.0, 3_000.0).round();
        cash_row(&mut cash, at, "Transfer", from, to, amount);
    }

    // Structuring through cash-outs: three withdrawals of 950 in 3 hours.
    let structurer = "0205550001";
    let t = base_time() + Duration::hours(100);
    for i in 0..3 {
        cash_row(&mut cash, t + Duration::hours(i), "Cash Out", structurer, "", 950.0);
    }
    out.planted.push(PlantedPattern { detector: "structuring", subject: structurer.to_string(), operator: op });
    cash.write(&register(out, dir, "telecel_cash.csv", op))
}

// ── AirtelTigo ──────────────────────────────────────────────────────────────

fn write_airteltigo(rng: &mut StreamRng, dir: &Path, out: &mut SyntheticExports) -> AnalysisResult<()> {
    let op = Operator::AirtelTigo;
    let pool = subscriber_pool(rng, "027");
    let owner = pool[0].clone();
    let owner_imei = imei_for(rng);

    let mut cdr = Table::new(&[
        "Owner Number", "Outgoing", "Incoming", "Duration", "Call Type", "Event Date & Time", "Latitude", "Longitude",
        "Cell Details", "IMEI",
    ]);
    for _ in 0..BACKGROUND_CALLS / 2 {
        let other = rng.pick(&pool[1..]).cloned().unwrap_or_default();
        let at = random_time(rng);
        let outgoing = rng.chance(0.5);
        let (out_no, in_no) = if outgoing { (other, "0".to_string()) } else { ("0".to_string(), other) };
        let coords = near_accra(rng);
        cdr.push(
            at,
            vec![
                owner.clone(),
                out_no,
                in_no,
                rng.range_i64(5, 700).to_string(),
                "Voice".to_string(),
                fmt_time(at),
                format!("{:.5}", coords.lat),
                format!("{:.5}", coords.lon),
                format!("AT-{:03}", rng.next_u64_below(25)),
                owner_imei.clone(),
            ],
        );
    }
    cdr.write(&register(out, dir, "airteltigo_cdr.csv", op))?;

    let mut cash = Table::new(&[
        "Receipt No.", "Owner Number", "Completion Time", "Details", "Transaction Status", "Paid In", "Withdrawn",
        "Opposite Party",
    ]);
    let mut receipt = 0usize;
    let mut cash_row =
        |cash: &mut Table, at: NaiveDateTime, owner: &str, details: &str, status: &str, paid_in: Option<f64>, withdrawn: Option<f64>, opposite: &str| {
            receipt += 1;
            cash.push(
                at,
                vec![
                    format!("R{receipt:07}"),
                    owner.to_string(),
                    fmt_time(at),
                    details.to_string(),
                    status.to_string(),
                    paid_in.map(|a| format!("{a:.2}")).unwrap_or_default(),
                    withdrawn.map(|a| format!("{a:.2}")).unwrap_or_default(),
                    opposite.to_string(),
                ],
            );
        };

    for _ in 0..BACKGROUND_MONEY {
        let other = rng.pick(&pool[1..]).cloned().unwrap_or_default();
        let at = random_time(rng);
        let amount = rng.range_f64(50.0, 400.0).round();
        let status = if rng.chance(0.05) { "Failed" } else { "Completed" };
        let opposite = format!("{other} - Subscriber");
        if rng.chance(0.5) {
            cash_row(&mut cash, at, &owner, "Transfer", status, Some(amount), None, &opposite);
        } else {
            cash_row(&mut cash, at, &owner, "Transfer", status, None, Some(amount), &opposite);
        }
    }

    // Rapid cash-out: a large inflow withdrawn twenty minutes later.
    let mule = "0275550001";
    let t = base_time() + Duration::hours(80);
    let sender = format!("{} - Sender", pool[1]);
    cash_row(&mut cash, t, mule, "Transfer", "Completed", Some(5_000.0), None, &sender);
    cash_row(&mut cash, t + Duration::minutes(20), mule, "Cash Out", "Completed", None, Some(4_900.0), "0279999999 - Agent");
    out.planted.push(PlantedPattern { detector: "rapid_cashout", subject: mule.to_string(), operator: op });
    cash.write(&register(out, dir, "airteltigo_cash.csv", op))
}
