//! Timestamps in the encodings templates expect.
use chrono::{DateTime, Utc};

/// Seconds between 1601-01-01 and the Unix epoch
const NTTIME_EPOCH_OFFSET: i64 = 11_644_473_600;

/// Counts 100ns intervals since 1601-01-01, as used by `whenChanged`-style integer attributes
pub fn nttime(at: DateTime<Utc>) -> i64 {
    (at.timestamp() + NTTIME_EPOCH_OFFSET) * 10_000_000
        + i64::from(at.timestamp_subsec_nanos() / 100)
}

/// Formats a generalized time, as used by `whenCreated`
pub fn ldaptime(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d%H%M%S.0Z").to_string()
}

/// Formats a date stamp suitable for a DNS zone serial number
pub fn datestring(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d%H").to_string()
}
