//! Run windows: the `[start, end)` interval one pipeline invocation owns.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status of a run window, stored as text in `run_windows.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }

    /// `true` once the run can no longer change status.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown run status: {0}")]
pub struct UnknownRunStatus(pub String);

impl FromStr for RunStatus {
    type Err = UnknownRunStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            other => Err(UnknownRunStatus(other.to_string())),
        }
    }
}

/// Start of the UTC hour containing `ts`; rollups are bucketed on it.
#[must_use]
pub fn hour_bucket(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(Duration::hours(1)).unwrap_or(ts)
}

/// Half-open time interval `[start, end)`, computed before a run row exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowBounds {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl WindowBounds {
    /// The window of length `interval` that ends (exclusively) at `now`.
    #[must_use]
    pub fn ending_at(now: DateTime<Utc>, interval: Duration) -> Self {
        Self {
            start: now - interval,
            end: now,
        }
    }

    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }

    #[must_use]
    pub fn length(&self) -> Duration {
        self.end - self.start
    }

    /// Window length in whole minutes, never less than one.
    #[must_use]
    pub fn whole_minutes(&self) -> i64 {
        self.length().num_minutes().max(1)
    }
}

/// A persisted run window: bounds plus the database identity every record
/// of the run is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunWindow {
    pub id: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl RunWindow {
    #[must_use]
    pub fn new(id: i64, bounds: WindowBounds) -> Self {
        Self {
            id,
            start: bounds.start,
            end: bounds.end,
        }
    }

    /// The rollup bucket this window's records are aggregated into.
    #[must_use]
    pub fn bucket_start(&self) -> DateTime<Utc> {
        hour_bucket(self.start)
    }

    #[must_use]
    pub fn bounds(&self) -> WindowBounds {
        WindowBounds {
            start: self.start,
            end: self.end,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, 0).unwrap()
    }

    #[test]
    fn ending_at_subtracts_interval() {
        let bounds = WindowBounds::ending_at(at(12, 5), Duration::minutes(5));
        assert_eq!(bounds.start, at(12, 0));
        assert_eq!(bounds.end, at(12, 5));
        assert_eq!(bounds.whole_minutes(), 5);
    }

    #[test]
    fn contains_is_half_open() {
        let bounds = WindowBounds::ending_at(at(12, 5), Duration::minutes(5));
        assert!(bounds.contains(at(12, 0)));
        assert!(bounds.contains(at(12, 4)));
        assert!(!bounds.contains(at(12, 5)));
    }

    #[test]
    fn bucket_is_the_hour_of_the_window_start() {
        let window = RunWindow::new(1, WindowBounds::ending_at(at(13, 2), Duration::minutes(5)));
        assert_eq!(window.bucket_start(), at(12, 0));
        assert_eq!(hour_bucket(at(13, 0)), at(13, 0));
    }

    #[test]
    fn run_status_round_trips_through_text() {
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Succeeded,
            RunStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
        assert!("queued".parse::<RunStatus>().is_err());
    }

    #[test]
    fn only_succeeded_and_failed_are_terminal() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Succeeded.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }
}
