//! Statistics Aggregator: read-only dashboard counts derived from tasks.
//!
//! No caching layer — every call reflects the store at call time, at the
//! cost of repeated computation.

use serde::Serialize;
use sqlx::{QueryBuilder, SqlitePool};

use crate::error::EngineResult;
use crate::storage::unixepoch;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub not_started: i64,
    pub in_progress: i64,
    pub paused: i64,
    pub completed: i64,
    pub cancelled: i64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PriorityCounts {
    pub low: i64,
    pub medium: i64,
    pub high: i64,
    pub urgent: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UpcomingDeadline {
    pub title: String,
    pub deadline: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskStatsReport {
    pub status_counts: StatusCounts,
    pub priority_counts: PriorityCounts,
    /// completed / total × 100; 0 when there are no tasks.
    pub completion_rate: f64,
    /// Future deadlines only, soonest first.
    pub upcoming_deadlines: Vec<UpcomingDeadline>,
}

pub struct StatsAggregator {
    pool: SqlitePool,
}

impl StatsAggregator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Aggregate task counts.  `user_id = None` spans all tasks; otherwise
    /// only tasks the user created or is assigned to.
    pub async fn task_stats(&self, user_id: Option<i64>) -> EngineResult<TaskStatsReport> {
        let status_rows = self.grouped_counts("status", user_id).await?;
        let mut status_counts = StatusCounts::default();
        for (status, count) in status_rows {
            match status.as_deref() {
                Some("not_started") => status_counts.not_started = count,
                Some("in_progress") => status_counts.in_progress = count,
                Some("paused") => status_counts.paused = count,
                Some("completed") => status_counts.completed = count,
                Some("cancelled") => status_counts.cancelled = count,
                _ => {}
            }
        }

        let priority_rows = self.grouped_counts("priority", user_id).await?;
        let mut priority_counts = PriorityCounts::default();
        for (priority, count) in priority_rows {
            match priority.as_deref() {
                Some("low") => priority_counts.low = count,
                Some("medium") => priority_counts.medium = count,
                Some("high") => priority_counts.high = count,
                Some("urgent") => priority_counts.urgent = count,
                _ => {} // tasks without a priority are counted nowhere
            }
        }

        let total = status_counts.not_started
            + status_counts.in_progress
            + status_counts.paused
            + status_counts.completed
            + status_counts.cancelled;
        let completion_rate = if total > 0 {
            status_counts.completed as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        let mut qb = QueryBuilder::new("SELECT title, deadline FROM tasks WHERE ");
        push_user_filter(&mut qb, user_id);
        qb.push(" AND deadline IS NOT NULL AND deadline > ")
            .push_bind(unixepoch())
            .push(" ORDER BY deadline ASC");
        let upcoming_deadlines: Vec<UpcomingDeadline> =
            qb.build_query_as().fetch_all(&self.pool).await?;

        Ok(TaskStatsReport {
            status_counts,
            priority_counts,
            completion_rate,
            upcoming_deadlines,
        })
    }

    async fn grouped_counts(
        &self,
        column: &str,
        user_id: Option<i64>,
    ) -> EngineResult<Vec<(Option<String>, i64)>> {
        // `column` is one of two fixed identifiers, never caller input.
        let mut qb = QueryBuilder::new(format!("SELECT {column}, COUNT(*) FROM tasks WHERE "));
        push_user_filter(&mut qb, user_id);
        qb.push(format!(" GROUP BY {column}"));
        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }
}

fn push_user_filter(qb: &mut QueryBuilder<'_, sqlx::Sqlite>, user_id: Option<i64>) {
    match user_id {
        Some(uid) => {
            qb.push("(created_by = ")
                .push_bind(uid)
                .push(" OR assigned_to = ")
                .push_bind(uid)
                .push(")");
        }
        None => {
            qb.push("1=1");
        }
    }
}
