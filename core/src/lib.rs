//! Forensic analysis core for Ghanaian operator exports.
//!
//! Call detail records and mobile-money statements from MTN, Telecel and
//! AirtelTigo are normalized into one time-ordered dataset, scanned by a
//! set of anomaly detectors, and reduced to an ordered result set.
//!
//! Pipeline: adapter → ingestion → detection → aggregator, driven by
//! session. Only store.rs touches SQLite.

pub mod adapter;
pub mod aggregator;
pub mod cancel;
pub mod config;
pub mod dataset;
pub mod detection;
pub mod error;
pub mod event;
pub mod finding;
pub mod ingestion;
pub mod pool;
pub mod record;
pub mod rng;
pub mod session;
pub mod store;
pub mod summary;
pub mod synth;
pub mod types;
