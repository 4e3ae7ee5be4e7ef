//! Timer lifecycle: start, pause, stop, live duration reads, summaries.
//!
//! The central invariant — at most one open entry per user — is enforced by
//! the store (partial unique index on `time_entries(user_id)` where
//! `end_time IS NULL`), with the in-transaction pre-check only providing the
//! friendly error.  A failed precondition never leaves a write behind: every
//! mutating operation is one transaction.

use sqlx::{QueryBuilder, SqlitePool};

use crate::error::{EngineError, EngineResult};
use crate::storage::unixepoch;
use crate::tasks::TaskStatus;

use super::model::*;

#[derive(sqlx::FromRow)]
struct OpenEntryRow {
    id: i64,
    task_id: i64,
    start_time: i64,
    comment: Option<String>,
    task_title: String,
}

#[derive(sqlx::FromRow)]
struct ListedEntryRow {
    id: i64,
    task_id: i64,
    task_title: String,
    start_time: i64,
    end_time: Option<i64>,
    duration_seconds: Option<i64>,
    comment: Option<String>,
}

impl ListedEntryRow {
    /// Closed entries report their stored duration; open ones a live one.
    fn into_view(self, now: i64) -> EntryView {
        let duration = self
            .duration_seconds
            .unwrap_or_else(|| (now - self.start_time).max(0));
        EntryView {
            id: self.id,
            task_id: self.task_id,
            task_title: self.task_title,
            start_time: self.start_time,
            end_time: self.end_time,
            duration_seconds: duration,
            duration_formatted: format_duration(duration),
            comment: self.comment,
        }
    }
}

pub struct TimeEntryEngine {
    pool: SqlitePool,
}

impl TimeEntryEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a timer on a task.  The task must be visible to the user
    /// (creator or assignee — otherwise reads as not found), must not be in
    /// a terminal state, and the user must have no open entry.  A task not
    /// yet `in_progress` is moved there in the same transaction.
    pub async fn start(
        &self,
        user_id: i64,
        task_id: i64,
        comment: Option<&str>,
    ) -> EngineResult<i64> {
        let mut tx = self.pool.begin().await?;

        let task: Option<(i64, TaskStatus)> = sqlx::query_as(
            "SELECT id, status FROM tasks WHERE id = ? AND (assigned_to = ? OR created_by = ?)",
        )
        .bind(task_id)
        .bind(user_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let (_, status) =
            task.ok_or_else(|| EngineError::not_found("task not found or not assigned to you"))?;

        if status.is_terminal() {
            return Err(EngineError::invalid_state(format!(
                "cannot track time for a {} task",
                status.as_str()
            )));
        }

        let open: Option<(i64,)> = sqlx::query_as(
            "SELECT task_id FROM time_entries WHERE user_id = ? AND end_time IS NULL",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some((open_task_id,)) = open {
            return Err(EngineError::ActiveEntryConflict {
                task_id: open_task_id,
            });
        }

        if status != TaskStatus::InProgress {
            sqlx::query("UPDATE tasks SET status = 'in_progress' WHERE id = ?")
                .bind(task_id)
                .execute(&mut *tx)
                .await?;
        }

        let now = unixepoch();
        let inserted = sqlx::query(
            "INSERT INTO time_entries (user_id, task_id, start_time, comment, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(task_id)
        .bind(now)
        .bind(comment)
        .bind(now)
        .execute(&mut *tx)
        .await;

        let entry_id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(e) => {
                // The pre-check ran inside this transaction, so a unique
                // violation here means another process opened an entry
                // concurrently.  Roll back and report the conflict.
                drop(tx);
                let err = EngineError::from(e);
                if err.is_unique_violation() {
                    let open: Option<(i64,)> = sqlx::query_as(
                        "SELECT task_id FROM time_entries WHERE user_id = ? AND end_time IS NULL",
                    )
                    .bind(user_id)
                    .fetch_optional(&self.pool)
                    .await?;
                    return Err(EngineError::ActiveEntryConflict {
                        task_id: open.map(|(t,)| t).unwrap_or(task_id),
                    });
                }
                return Err(err);
            }
        };

        tx.commit().await?;
        Ok(entry_id)
    }

    /// Close the user's open entry and set the owning task to `paused`.
    pub async fn pause(&self, user_id: i64) -> EngineResult<EntryView> {
        let view = self.close_open_entry(user_id, None, true).await?;
        Ok(view)
    }

    /// Close the user's open entry without forcing a task status change.
    /// A supplied comment overwrites the one recorded at start; otherwise
    /// the original comment is preserved.
    pub async fn stop(&self, user_id: i64, comment: Option<&str>) -> EngineResult<EntryView> {
        let view = self.close_open_entry(user_id, comment, false).await?;
        Ok(view)
    }

    async fn close_open_entry(
        &self,
        user_id: i64,
        comment_override: Option<&str>,
        pause_task: bool,
    ) -> EngineResult<EntryView> {
        let mut tx = self.pool.begin().await?;

        let open: Option<OpenEntryRow> = sqlx::query_as(
            "SELECT te.id, te.task_id, te.start_time, te.comment, t.title AS task_title \
             FROM time_entries te \
             JOIN tasks t ON te.task_id = t.id \
             WHERE te.user_id = ? AND te.end_time IS NULL",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let open = open.ok_or_else(|| EngineError::not_found("no active time entry found"))?;

        let now = unixepoch();
        // Clock skew guard: a backdated system clock must not produce a
        // negative duration.
        let duration = (now - open.start_time).max(0);
        let comment = comment_override
            .map(str::to_string)
            .or(open.comment.clone());

        let closed = sqlx::query(
            "UPDATE time_entries SET end_time = ?, duration_seconds = ?, comment = ? \
             WHERE id = ? AND end_time IS NULL",
        )
        .bind(now)
        .bind(duration)
        .bind(&comment)
        .bind(open.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if closed == 0 {
            return Err(EngineError::not_found("no active time entry found"));
        }

        if pause_task {
            sqlx::query("UPDATE tasks SET status = 'paused' WHERE id = ?")
                .bind(open.task_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(EntryView {
            id: open.id,
            task_id: open.task_id,
            task_title: open.task_title,
            start_time: open.start_time,
            end_time: Some(now),
            duration_seconds: duration,
            duration_formatted: format_duration(duration),
            comment,
        })
    }

    /// The user's currently running timer, if any, with a live duration.
    /// Read-only: nothing is persisted.
    pub async fn active_entry(&self, user_id: i64) -> EngineResult<Option<EntryView>> {
        let open: Option<OpenEntryRow> = sqlx::query_as(
            "SELECT te.id, te.task_id, te.start_time, te.comment, t.title AS task_title \
             FROM time_entries te \
             JOIN tasks t ON te.task_id = t.id \
             WHERE te.user_id = ? AND te.end_time IS NULL",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(open.map(|row| {
            let duration = (unixepoch() - row.start_time).max(0);
            EntryView {
                id: row.id,
                task_id: row.task_id,
                task_title: row.task_title,
                start_time: row.start_time,
                end_time: None,
                duration_seconds: duration,
                duration_formatted: format_duration(duration),
                comment: row.comment,
            }
        }))
    }

    pub async fn list_entries(
        &self,
        user_id: i64,
        filter: EntryFilter,
    ) -> EngineResult<Vec<EntryView>> {
        let mut qb = QueryBuilder::new(
            "SELECT te.id, te.task_id, te.start_time, te.end_time, te.duration_seconds, \
                    te.comment, t.title AS task_title \
             FROM time_entries te \
             JOIN tasks t ON te.task_id = t.id \
             WHERE te.user_id = ",
        );
        qb.push_bind(user_id);
        if let Some(task_id) = filter.task_id {
            qb.push(" AND te.task_id = ").push_bind(task_id);
        }
        if let Some(start) = filter.start_time {
            qb.push(" AND te.start_time >= ").push_bind(start);
        }
        if let Some(end) = filter.end_time {
            qb.push(" AND te.start_time <= ").push_bind(end);
        }
        qb.push(" ORDER BY te.start_time DESC LIMIT ").push_bind(filter.limit);

        let rows: Vec<ListedEntryRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        let now = unixepoch();
        Ok(rows.into_iter().map(|r| r.into_view(now)).collect())
    }

    /// Aggregate closed entries within a calendar period, including a
    /// per-task breakdown and the live active entry.
    pub async fn summary(&self, user_id: i64, period: SummaryPeriod) -> EngineResult<TimeSummary> {
        let today = chrono::Utc::now().date_naive();
        let (start, end) = period.bounds(today);

        let (total,): (Option<i64>,) = sqlx::query_as(
            "SELECT SUM(duration_seconds) FROM time_entries \
             WHERE user_id = ? AND start_time >= ? AND start_time < ? \
               AND end_time IS NOT NULL",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;
        let total = total.unwrap_or(0);

        let by_task_rows: Vec<(i64, String, i64)> = sqlx::query_as(
            "SELECT t.id, t.title, SUM(te.duration_seconds) AS task_duration \
             FROM time_entries te \
             JOIN tasks t ON te.task_id = t.id \
             WHERE te.user_id = ? AND te.start_time >= ? AND te.start_time < ? \
               AND te.end_time IS NOT NULL \
             GROUP BY t.id \
             ORDER BY task_duration DESC",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        let by_task = by_task_rows
            .into_iter()
            .map(|(task_id, title, seconds)| TaskTime {
                task_id,
                title,
                duration_seconds: seconds,
                duration_formatted: format_duration(seconds),
                percentage: if total > 0 {
                    (seconds as f64 / total as f64 * 1000.0).round() / 10.0
                } else {
                    0.0
                },
            })
            .collect();

        Ok(TimeSummary {
            period,
            start_time: start,
            end_time: end,
            total_seconds: total,
            total_formatted: format_duration(total),
            by_task,
            active_entry: self.active_entry(user_id).await?,
        })
    }
}
