//! Cache entry layout and validity rules
//!
//! Entries carry their schema version, write timestamp, and effective TTL.
//! Validity is not a sliding TTL alone: upstream data refreshes on a daily
//! batch cadence, so entries written before the most recent local-noon
//! cutoff are stale no matter what their TTL says. The TTL still bounds
//! staleness within a day.

use chrono::{DateTime, Duration, Local, LocalResult, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// One stored cache entry. Serialized as JSON under its cache key; the
/// field names are part of the persisted layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Schema version the payload was written under.
    pub version: String,
    /// The cached payload, returned verbatim on a hit.
    pub data: Value,
    /// Write instant, milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Effective lifetime in milliseconds. Zero or absent disables the
    /// TTL bound (the daily cutoff still applies).
    #[serde(rename = "ttlMs", default)]
    pub ttl_ms: Option<i64>,
}

impl CacheEntry {
    pub fn new(version: impl Into<String>, data: Value, now: DateTime<Local>, ttl_ms: Option<i64>) -> Self {
        Self {
            version: version.into(),
            data,
            timestamp: now.timestamp_millis(),
            ttl_ms,
        }
    }

    /// Whether this entry may still be served at `now`.
    ///
    /// Requires all of: matching schema version, written after the last
    /// daily cutoff, and within TTL (when one is in effect).
    pub fn is_valid(&self, now: DateTime<Local>, expected_version: &str, default_ttl_ms: i64) -> bool {
        if self.version != expected_version {
            return false;
        }
        if self.timestamp <= last_cutoff_ms(now) {
            return false;
        }
        let ttl = self.ttl_ms.unwrap_or(default_ttl_ms);
        if ttl > 0 && now.timestamp_millis() - self.timestamp > ttl {
            return false;
        }
        true
    }
}

/// The next daily cutoff instant: today's local noon if it has not passed
/// yet, otherwise tomorrow's.
pub fn next_noon(now: DateTime<Local>) -> DateTime<Local> {
    let naive_noon = match now.date_naive().and_hms_opt(12, 0, 0) {
        Some(naive) => naive,
        None => return now,
    };
    let noon = match Local.from_local_datetime(&naive_noon) {
        LocalResult::Single(t) => t,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => now,
    };
    if now > noon {
        noon + Duration::days(1)
    } else {
        noon
    }
}

/// The most recent cutoff: entries written at or before this instant are
/// stale regardless of TTL.
pub fn last_cutoff_ms(now: DateTime<Local>) -> i64 {
    next_noon(now).timestamp_millis() - DAY_MS
}
