//! Task data model: closed status/priority enumerations and row types.

use serde::{Deserialize, Serialize};

/// Task lifecycle state.  `Completed` and `Cancelled` are terminal: no
/// further time tracking is permitted against the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    Paused,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "not_started",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Option<TaskPriority>,
    pub created_by: i64,
    pub assigned_to: Option<i64>,
    pub created_at: i64,
    pub deadline: Option<i64>,
    /// Stamped when the task first transitions into `Completed`.  Never
    /// cleared on later edits, including a reopen back to `InProgress`.
    pub completed_at: Option<i64>,
    pub estimated_hours: Option<f64>,
}

/// Input for `TaskManager::create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_status")]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    pub created_by: i64,
    #[serde(default)]
    pub assigned_to: Option<i64>,
    #[serde(default)]
    pub deadline: Option<i64>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
}

fn default_status() -> TaskStatus {
    TaskStatus::NotStarted
}

/// Typed partial update for `TaskManager::update`.
///
/// Only this fixed allow-list of fields may be patched; each `Some` field is
/// compiled into the minimal UPDATE statement.  An all-`None` patch is a
/// `NoOp` failure, not a silent success.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub deadline: Option<i64>,
    pub estimated_hours: Option<f64>,
    pub assigned_to: Option<i64>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.deadline.is_none()
            && self.estimated_hours.is_none()
            && self.assigned_to.is_none()
    }
}

/// Filter for `TaskManager::list`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskFilter {
    /// Restrict to tasks the viewer created or is assigned to.
    pub viewer_id: Option<i64>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    /// Case-insensitive substring match on title or description.
    pub search: Option<String>,
    pub limit: Option<i64>,
}

/// Outcome of `TaskManager::delete`.  A task with logged time is never
/// hard-deleted; it is cancelled instead to preserve time-entry referential
/// integrity, and callers can tell the two outcomes apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    Cancelled,
}
