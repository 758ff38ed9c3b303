pub mod bills;
pub mod config;
pub mod link;
pub mod stats;
pub mod vision;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Parse a stored timestamp. We write RFC 3339 ourselves, but rows created
/// through SQLite column defaults carry "YYYY-MM-DD HH:MM:SS" without a
/// timezone, so fall back to parsing that as naive UTC.
pub fn parse_ts(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}
