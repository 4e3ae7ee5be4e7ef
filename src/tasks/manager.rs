//! Task lifecycle operations: CRUD, status transitions, permission checks.

use sqlx::{QueryBuilder, SqlitePool};
use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::notifications::{NotificationDispatcher, NotificationKind};
use crate::storage::unixepoch;

use super::model::*;

pub struct TaskManager {
    pool: SqlitePool,
    notifier: NotificationDispatcher,
}

impl TaskManager {
    pub fn new(pool: SqlitePool, notifier: NotificationDispatcher) -> Self {
        Self { pool, notifier }
    }

    /// Create a task.  When the task is assigned to someone other than its
    /// creator, a `task` notification is emitted to the assignee —
    /// best-effort: a failed insert is logged, never propagated.
    pub async fn create(&self, new: NewTask) -> EngineResult<i64> {
        let title = new.title.trim();
        if title.len() < 3 {
            return Err(EngineError::validation(
                "task title must be at least 3 characters long",
            ));
        }

        if let Some(assignee) = new.assigned_to {
            if !self.user_exists(assignee).await? {
                return Err(EngineError::validation("assigned user not found"));
            }
        }

        let task_id = sqlx::query(
            "INSERT INTO tasks \
             (title, description, status, priority, created_by, assigned_to, created_at, deadline, estimated_hours) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(title)
        .bind(&new.description)
        .bind(new.status)
        .bind(new.priority)
        .bind(new.created_by)
        .bind(new.assigned_to)
        .bind(unixepoch())
        .bind(new.deadline)
        .bind(new.estimated_hours)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        if let Some(assignee) = new.assigned_to {
            if assignee != new.created_by {
                let message = format!("You have been assigned a new task: {title}");
                if let Err(e) = self
                    .notifier
                    .notify(
                        assignee,
                        "New Task Assigned",
                        &message,
                        NotificationKind::Task,
                        Some(task_id),
                    )
                    .await
                {
                    warn!(task_id, err = %e, "assignment notification failed");
                }
            }
        }

        Ok(task_id)
    }

    /// Patch a task.  Only the creator or the current assignee may update;
    /// a reassignment to a new user notifies them.  Setting the status to
    /// `Completed` stamps `completed_at` in the same statement.
    pub async fn update(
        &self,
        task_id: i64,
        acting_user_id: i64,
        patch: TaskPatch,
    ) -> EngineResult<()> {
        let task: Task = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| EngineError::not_found("task not found"))?;

        if acting_user_id != task.created_by && Some(acting_user_id) != task.assigned_to {
            return Err(EngineError::permission(
                "you don't have permission to update this task",
            ));
        }

        if patch.is_empty() {
            return Err(EngineError::NoOp);
        }

        if let Some(assignee) = patch.assigned_to {
            if !self.user_exists(assignee).await? {
                return Err(EngineError::validation("assigned user not found"));
            }
        }

        let mut qb = QueryBuilder::new("UPDATE tasks SET ");
        let mut sep = qb.separated(", ");
        if let Some(v) = &patch.title {
            sep.push("title = ").push_bind_unseparated(v);
        }
        if let Some(v) = &patch.description {
            sep.push("description = ").push_bind_unseparated(v);
        }
        if let Some(v) = patch.status {
            sep.push("status = ").push_bind_unseparated(v);
        }
        if let Some(v) = patch.priority {
            sep.push("priority = ").push_bind_unseparated(v);
        }
        if let Some(v) = patch.deadline {
            sep.push("deadline = ").push_bind_unseparated(v);
        }
        if let Some(v) = patch.estimated_hours {
            sep.push("estimated_hours = ").push_bind_unseparated(v);
        }
        if let Some(v) = patch.assigned_to {
            sep.push("assigned_to = ").push_bind_unseparated(v);
        }
        // completed_at is stamped on the transition into `completed` and is
        // deliberately not cleared when a task is later reopened.
        if patch.status == Some(TaskStatus::Completed) {
            sep.push("completed_at = ").push_bind_unseparated(unixepoch());
        }
        qb.push(" WHERE id = ").push_bind(task_id);
        qb.build().execute(&self.pool).await?;

        if let Some(new_assignee) = patch.assigned_to {
            if Some(new_assignee) != task.assigned_to && new_assignee != acting_user_id {
                let title = patch.title.as_deref().unwrap_or(&task.title);
                let message = format!("You have been assigned to task: {title}");
                if let Err(e) = self
                    .notifier
                    .notify(
                        new_assignee,
                        "Task Assigned",
                        &message,
                        NotificationKind::Task,
                        Some(task_id),
                    )
                    .await
                {
                    warn!(task_id, err = %e, "reassignment notification failed");
                }
            }
        }

        Ok(())
    }

    /// Delete a task.  Creator-only.  A task with logged time entries is
    /// cancelled instead of removed so time-entry references stay valid.
    pub async fn delete(&self, task_id: i64, acting_user_id: i64) -> EngineResult<DeleteOutcome> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT created_by FROM tasks WHERE id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        let (created_by,) = row.ok_or_else(|| EngineError::not_found("task not found"))?;

        if acting_user_id != created_by {
            return Err(EngineError::permission(
                "you don't have permission to delete this task",
            ));
        }

        let (entry_count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM time_entries WHERE task_id = ?")
                .bind(task_id)
                .fetch_one(&self.pool)
                .await?;

        if entry_count > 0 {
            sqlx::query("UPDATE tasks SET status = 'cancelled' WHERE id = ?")
                .bind(task_id)
                .execute(&self.pool)
                .await?;
            Ok(DeleteOutcome::Cancelled)
        } else {
            sqlx::query("DELETE FROM tasks WHERE id = ?")
                .bind(task_id)
                .execute(&self.pool)
                .await?;
            Ok(DeleteOutcome::Deleted)
        }
    }

    /// Fetch a task as seen by `viewer_id`.  Access is filtered, not merely
    /// permission-checked: a task the viewer has no relation to reads as
    /// absent, so existence is never leaked.
    pub async fn get(&self, task_id: i64, viewer_id: i64) -> EngineResult<Option<Task>> {
        Ok(sqlx::query_as(
            "SELECT * FROM tasks WHERE id = ? AND (created_by = ? OR assigned_to = ?)",
        )
        .bind(task_id)
        .bind(viewer_id)
        .bind(viewer_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn list(&self, filter: TaskFilter) -> EngineResult<Vec<Task>> {
        let mut qb = QueryBuilder::new("SELECT * FROM tasks WHERE 1=1");
        if let Some(viewer) = filter.viewer_id {
            qb.push(" AND (created_by = ")
                .push_bind(viewer)
                .push(" OR assigned_to = ")
                .push_bind(viewer)
                .push(")");
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(priority) = filter.priority {
            qb.push(" AND priority = ").push_bind(priority);
        }
        if let Some(search) = &filter.search {
            let pattern = format!("%{search}%");
            qb.push(" AND (title LIKE ")
                .push_bind(pattern.clone())
                .push(" OR description LIKE ")
                .push_bind(pattern)
                .push(")");
        }
        qb.push(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }
        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    async fn user_exists(&self, user_id: i64) -> EngineResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}
