//! Shared primitive types used across the entire analysis core.

/// A subject identifier: a normalized phone number or wallet account.
pub type SubjectId = String;

/// A dataset-unique record identifier, `"{OPERATOR}:{raw_native_id}"`.
pub type RecordId = String;

/// The canonical analysis session identifier.
pub type SessionId = String;

/// Seconds, used for every configured window and horizon.
pub type Seconds = i64;
