use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Version markers written by the bundled sources and the transform step.
pub const VERSION_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Completed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown sync status: {0}")]
pub struct UnknownSyncStatus(pub String);

impl FromStr for SyncStatus {
    type Err = UnknownSyncStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "completed" => Ok(SyncStatus::Completed),
            other => Err(UnknownSyncStatus(other.to_string())),
        }
    }
}

/// One row per logical dataset.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DatasetVersion {
    pub dataset_name: String,
    pub last_synced_version: String,
    pub last_sync_date: DateTime<Utc>,
    pub sync_status: SyncStatus,
}

impl DatasetVersion {
    pub fn completed(dataset_name: impl Into<String>, version: impl Into<String>) -> Self {
        DatasetVersion {
            dataset_name: dataset_name.into(),
            last_synced_version: version.into(),
            last_sync_date: Utc::now(),
            sync_status: SyncStatus::Completed,
        }
    }
}

pub fn format_version_date(ts: DateTime<Utc>) -> String {
    ts.format(VERSION_DATE_FORMAT).to_string()
}

pub fn today_version() -> String {
    format_version_date(Utc::now())
}

/// Reads the date prefix of a version marker; `None` for markers that
/// are not dates (fixed tags, garbage).
pub fn parse_version_date(version: &str) -> Option<NaiveDate> {
    let head = version.get(..10).unwrap_or(version);
    NaiveDate::parse_from_str(head, VERSION_DATE_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn version_dates_round_trip_through_markers() {
        let ts = Utc.with_ymd_and_hms(2023, 11, 5, 17, 30, 0).unwrap();
        let marker = format_version_date(ts);

        assert_eq!(marker, "2023-11-05");
        assert_eq!(parse_version_date(&marker), Some(ts.date_naive()));
    }

    #[test]
    fn datetime_markers_use_date_prefix() {
        assert_eq!(
            parse_version_date("2023-11-05T17:30:00Z"),
            NaiveDate::from_ymd_opt(2023, 11, 5)
        );
        assert_eq!(parse_version_date("v1"), None);
    }

    #[test]
    fn sync_status_parses_case_insensitively() {
        assert_eq!("COMPLETED".parse::<SyncStatus>().unwrap(), SyncStatus::Completed);
        assert!("running".parse::<SyncStatus>().is_err());
    }
}
