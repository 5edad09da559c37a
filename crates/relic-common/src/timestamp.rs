//! Timestamps for run directories and ledger rows

use chrono::{DateTime, SecondsFormat, Utc};

/// Length of a run timestamp (`YYYYMMDDHHMMSS`)
pub const RUN_TIMESTAMP_LEN: usize = 14;

/// Digits-only UTC timestamp to second precision, e.g. `20240101093000`.
///
/// Lexicographic order of these strings equals chronological order.
pub fn run_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d%H%M%S").to_string()
}

/// ISO 8601 UTC timestamp to second precision, e.g. `2024-01-01T09:30:00+00:00`
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Current time as a run timestamp
pub fn run_timestamp_now() -> String {
    run_timestamp(Utc::now())
}

/// Current time as an ISO 8601 timestamp
pub fn iso_timestamp_now() -> String {
    iso_timestamp(Utc::now())
}

/// Whether a directory name looks like a run timestamp
pub fn is_run_timestamp(name: &str) -> bool {
    name.len() == RUN_TIMESTAMP_LEN && name.bytes().all(|b| b.is_ascii_digit())
}
