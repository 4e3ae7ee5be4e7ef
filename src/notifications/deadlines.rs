//! Periodic deadline sweep.
//!
//! Designed to run on a fixed interval (hourly by default).  Idempotent
//! within the dedup window: a task that already produced a `deadline`
//! notification in the trailing 24 hours is skipped.  Across window
//! boundaries a task may be notified again with tier-appropriate wording —
//! accepted behavior, not a duplicate.

use tracing::{info, warn};

use crate::error::EngineResult;
use crate::storage::unixepoch;

use super::dispatcher::{NotificationDispatcher, NotificationKind};

/// Trailing span used to suppress repeat alerts for the same deadline.
const DEDUP_WINDOW_SECS: i64 = 24 * 3600;
/// Look-ahead horizon: only deadlines within the next 24h are announced.
const LOOKAHEAD_SECS: i64 = 24 * 3600;

#[derive(Debug, sqlx::FromRow)]
struct DueTask {
    id: i64,
    title: String,
    deadline: i64,
    assigned_to: i64,
}

impl NotificationDispatcher {
    /// Sweep non-terminal tasks whose deadline falls in (now, now+24h) and
    /// alert each assignee once per dedup window.  Returns the number of
    /// notifications created.
    pub async fn scan_deadlines(&self) -> EngineResult<u64> {
        let now = unixepoch();
        let due: Vec<DueTask> = sqlx::query_as(
            "SELECT t.id, t.title, t.deadline, t.assigned_to \
             FROM tasks t \
             WHERE t.assigned_to IS NOT NULL \
               AND t.deadline IS NOT NULL \
               AND t.deadline > ? \
               AND t.deadline < ? \
               AND t.status NOT IN ('completed', 'cancelled') \
               AND NOT EXISTS ( \
                   SELECT 1 FROM notifications n \
                   WHERE n.related_id = t.id \
                     AND n.type = 'deadline' \
                     AND n.created_at > ?)",
        )
        .bind(now)
        .bind(now + LOOKAHEAD_SECS)
        .bind(now - DEDUP_WINDOW_SECS)
        .fetch_all(&self.pool)
        .await?;

        let mut created = 0u64;
        for task in due {
            let hours_remaining = (task.deadline - now) as f64 / 3600.0;
            let (title, message) = deadline_wording(&task.title, hours_remaining);
            match self
                .notify(
                    task.assigned_to,
                    &title,
                    &message,
                    NotificationKind::Deadline,
                    Some(task.id),
                )
                .await
            {
                Ok(_) => created += 1,
                Err(e) => warn!(task_id = task.id, err = %e, "deadline notification failed"),
            }
        }

        if created > 0 {
            info!(created, "deadline scan produced notifications");
        }
        Ok(created)
    }
}

/// Severity-tiered wording: ≤2h urgent, ≤8h same-day, otherwise upcoming.
fn deadline_wording(task_title: &str, hours_remaining: f64) -> (String, String) {
    if hours_remaining <= 2.0 {
        (
            "URGENT: Task Deadline in Less Than 2 Hours".to_string(),
            format!("Task '{task_title}' is due in less than 2 hours!"),
        )
    } else if hours_remaining <= 8.0 {
        (
            "Task Deadline Today".to_string(),
            format!(
                "Task '{task_title}' is due in {} hours!",
                hours_remaining as i64
            ),
        )
    } else {
        (
            "Upcoming Task Deadline".to_string(),
            format!(
                "Task '{task_title}' is due in {} hours!",
                hours_remaining as i64
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    async fn seeded() -> (NotificationDispatcher, sqlx::SqlitePool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path()).await.unwrap();
        let pool = storage.pool();
        for name in ["alice", "bob"] {
            sqlx::query("INSERT INTO users (username) VALUES (?)")
                .bind(name)
                .execute(&pool)
                .await
                .unwrap();
        }
        (NotificationDispatcher::new(pool.clone()), pool, dir)
    }

    async fn insert_task(pool: &sqlx::SqlitePool, title: &str, deadline_offset: i64) -> i64 {
        sqlx::query(
            "INSERT INTO tasks (title, status, created_by, assigned_to, deadline) \
             VALUES (?, 'not_started', 1, 2, ?)",
        )
        .bind(title)
        .bind(unixepoch() + deadline_offset)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    #[tokio::test]
    async fn test_scan_is_idempotent_within_window() {
        let (d, pool, _dir) = seeded().await;
        insert_task(&pool, "Due soon", 3 * 3600).await;

        assert_eq!(d.scan_deadlines().await.unwrap(), 1);
        // Second sweep inside the same dedup window adds nothing.
        assert_eq!(d.scan_deadlines().await.unwrap(), 0);
        assert_eq!(d.unread_count(2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_scan_skips_terminal_and_distant_tasks() {
        let (d, pool, _dir) = seeded().await;
        let done = insert_task(&pool, "Done", 3 * 3600).await;
        sqlx::query("UPDATE tasks SET status = 'completed' WHERE id = ?")
            .bind(done)
            .execute(&pool)
            .await
            .unwrap();
        insert_task(&pool, "Next week", 7 * 24 * 3600).await;
        insert_task(&pool, "Already past", -3600).await;

        assert_eq!(d.scan_deadlines().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_severity_tiers() {
        let (urgent_title, urgent_msg) = deadline_wording("Ship it", 1.5);
        assert!(urgent_title.contains("URGENT"));
        assert!(urgent_msg.contains("less than 2 hours"));

        let (today_title, today_msg) = deadline_wording("Ship it", 5.9);
        assert_eq!(today_title, "Task Deadline Today");
        assert!(today_msg.contains("due in 5 hours"));

        let (title, msg) = deadline_wording("Ship it", 20.0);
        assert_eq!(title, "Upcoming Task Deadline");
        assert!(msg.contains("due in 20 hours"));
    }
}
