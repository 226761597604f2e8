//! Serialized state types shared by the daemon (writer) and the viewer (reader).
//!
//! The on-disk format is a JSON object keyed by decimal pid:
//!
//! ```json
//! {
//!   "4242": {
//!     "commandLine": "python train.py --epochs 10",
//!     "startTime": "2026-10-16T09:12:44Z",
//!     "username": "al",
//!     "lastChecked": "2026-10-16T11:40:02.318270114Z",
//!     "auxMetrics": { "used_memory_mib": 10240 }
//!   }
//! }
//! ```
//!
//! Unknown fields are ignored so newer daemons can append fields without breaking
//! older viewers. The pre-1.0 field names (`cmdline`, `start_time`, `last_checked`,
//! `gpu_info`) are accepted as aliases.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Opaque per-process accelerator payload (e.g. `{"used_memory_mib": 1024}`).
pub type AuxMetrics = serde_json::Map<String, serde_json::Value>;

/// Tracked entries keyed by pid. Ordered so the state file is stable between writes.
pub type TrackedSet = BTreeMap<u32, TrackedEntry>;

/// Key under which [`crate::gpu`] stores per-process accelerator memory.
pub const GPU_MEMORY_KEY: &str = "used_memory_mib";

/// One tracked target process.
///
/// `command_line`, `owner` and `started_at` are captured on first observation and
/// never change for the life of the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEntry {
    #[serde(rename = "commandLine", alias = "cmdline")]
    pub command_line: String,
    #[serde(rename = "startTime", alias = "start_time", with = "timestamp")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "username")]
    pub owner: String,
    #[serde(rename = "lastChecked", alias = "last_checked", with = "timestamp")]
    pub last_checked_at: DateTime<Utc>,
    #[serde(rename = "auxMetrics", alias = "gpu_info", default)]
    pub aux_metrics: Option<AuxMetrics>,
}

impl TrackedEntry {
    /// Accelerator memory in MiB, if the payload carries it.
    ///
    /// Understands the numeric form written by this crate and the legacy
    /// `{"used_memory": "1234 MiB"}` string form.
    pub fn gpu_memory_mib(&self) -> Option<u64> {
        let metrics = self.aux_metrics.as_ref()?;
        if let Some(value) = metrics.get(GPU_MEMORY_KEY).and_then(|v| v.as_u64()) {
            return Some(value);
        }
        metrics
            .get("used_memory")
            .and_then(|v| v.as_str())
            .and_then(|s| s.trim().trim_end_matches("MiB").trim().parse().ok())
    }

    /// Wall-clock time since the process was created.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.started_at)
    }
}

/// Formats a duration the way operators read it: `2d 3h 4m`, `3h 4m 5s`, `4m 5s`, `5s`.
///
/// Negative durations (clock stepped backwards) keep a leading `-`.
pub fn format_duration(duration: Duration) -> String {
    let sign = if duration < Duration::zero() { "-" } else { "" };
    let total = duration.num_seconds().unsigned_abs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    if days > 0 {
        format!("{sign}{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{sign}{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{sign}{minutes}m {seconds}s")
    } else {
        format!("{sign}{seconds}s")
    }
}

/// RFC 3339 timestamps on write; RFC 3339 or naive local time on read.
pub(crate) mod timestamp {
    use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw:?}")))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        // Older state files carry naive local time.
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry_with_metrics(metrics: serde_json::Value) -> TrackedEntry {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();
        TrackedEntry {
            command_line: "python train.py".to_string(),
            started_at: at,
            owner: "al".to_string(),
            last_checked_at: at,
            aux_metrics: metrics.as_object().cloned(),
        }
    }

    #[test]
    fn format_duration_picks_largest_units() {
        assert_eq!(format_duration(Duration::seconds(5)), "5s");
        assert_eq!(format_duration(Duration::seconds(65)), "1m 5s");
        assert_eq!(format_duration(Duration::seconds(3_725)), "1h 2m 5s");
        assert_eq!(format_duration(Duration::seconds(2 * 86_400 + 3_660)), "2d 1h 1m");
    }

    #[test]
    fn format_duration_keeps_sign_for_clock_skew() {
        assert_eq!(format_duration(Duration::seconds(-70)), "-1m 10s");
    }

    #[test]
    fn gpu_memory_reads_numeric_and_legacy_forms() {
        let numeric = entry_with_metrics(serde_json::json!({ "used_memory_mib": 2048 }));
        assert_eq!(numeric.gpu_memory_mib(), Some(2048));

        let legacy = entry_with_metrics(serde_json::json!({ "used_memory": "1234 MiB" }));
        assert_eq!(legacy.gpu_memory_mib(), Some(1234));

        let absent = entry_with_metrics(serde_json::Value::Null);
        assert_eq!(absent.gpu_memory_mib(), None);
    }

    #[test]
    fn timestamp_parses_naive_local_time() {
        let parsed = timestamp::parse("2024-03-01T12:30:00.250000").unwrap();
        let expected = chrono::Local
            .with_ymd_and_hms(2024, 3, 1, 12, 30, 0)
            .unwrap()
            .with_timezone(&Utc)
            + Duration::milliseconds(250);
        assert_eq!(parsed, expected);
    }

    #[test]
    fn timestamp_rejects_garbage() {
        assert!(timestamp::parse("yesterday").is_none());
    }
}
