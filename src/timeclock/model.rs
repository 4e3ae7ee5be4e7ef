//! Time-entry rows, duration formatting, and summary types.

use chrono::{Datelike, Months, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TimeEntry {
    pub id: i64,
    pub user_id: i64,
    pub task_id: i64,
    pub start_time: i64,
    /// NULL while the timer is running.  For every user at most one row may
    /// have this NULL at any instant (enforced by a partial unique index).
    pub end_time: Option<i64>,
    pub duration_seconds: Option<i64>,
    pub comment: Option<String>,
    pub created_at: i64,
}

/// A time entry as reported to callers: joined with its task title, with the
/// duration always populated (live-computed for open entries, never written
/// back) and pre-formatted.
#[derive(Debug, Clone, Serialize)]
pub struct EntryView {
    pub id: i64,
    pub task_id: i64,
    pub task_title: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub duration_seconds: i64,
    pub duration_formatted: String,
    pub comment: Option<String>,
}

/// Filter for `TimeEntryEngine::list_entries`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EntryFilter {
    pub task_id: Option<i64>,
    /// Inclusive lower bound on start_time (unix seconds).
    pub start_time: Option<i64>,
    /// Inclusive upper bound on start_time (unix seconds).
    pub end_time: Option<i64>,
    pub limit: i64,
}

impl Default for EntryFilter {
    fn default() -> Self {
        Self {
            task_id: None,
            start_time: None,
            end_time: None,
            limit: 100,
        }
    }
}

/// Reporting period for `TimeEntryEngine::summary`.  Boundaries are computed
/// on UTC calendar days; weeks start on Monday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryPeriod {
    Today,
    Yesterday,
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
}

impl SummaryPeriod {
    /// Half-open `[start, end)` unix-second bounds relative to `today`.
    pub fn bounds(self, today: NaiveDate) -> (i64, i64) {
        let monday = today - chrono::Duration::days(today.weekday().num_days_from_monday() as i64);
        let month_start = today.with_day(1).unwrap_or(today);
        match self {
            SummaryPeriod::Today => (day_start(today), day_start(today + chrono::Duration::days(1))),
            SummaryPeriod::Yesterday => {
                (day_start(today - chrono::Duration::days(1)), day_start(today))
            }
            SummaryPeriod::ThisWeek => {
                (day_start(monday), day_start(today + chrono::Duration::days(1)))
            }
            SummaryPeriod::LastWeek => (
                day_start(monday - chrono::Duration::days(7)),
                day_start(monday),
            ),
            SummaryPeriod::ThisMonth => {
                (day_start(month_start), day_start(month_start + Months::new(1)))
            }
            SummaryPeriod::LastMonth => (
                day_start(month_start - Months::new(1)),
                day_start(month_start),
            ),
        }
    }
}

fn day_start(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Per-task slice of a time summary.
#[derive(Debug, Clone, Serialize)]
pub struct TaskTime {
    pub task_id: i64,
    pub title: String,
    pub duration_seconds: i64,
    pub duration_formatted: String,
    /// Share of the period total, rounded to one decimal place.
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeSummary {
    pub period: SummaryPeriod,
    pub start_time: i64,
    pub end_time: i64,
    pub total_seconds: i64,
    pub total_formatted: String,
    pub by_task: Vec<TaskTime>,
    pub active_entry: Option<EntryView>,
}

/// Render whole seconds as "{s}s", "{m}m {s}s" or "{h}h {m}m {s}s".
/// Pure and exact: callers floor to whole seconds before formatting.
pub fn format_duration(seconds: i64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    let (minutes, seconds) = (seconds / 60, seconds % 60);
    if minutes < 60 {
        return format!("{minutes}m {seconds}s");
    }
    let (hours, minutes) = (minutes / 60, minutes % 60);
    format!("{hours}h {minutes}m {seconds}s")
}
