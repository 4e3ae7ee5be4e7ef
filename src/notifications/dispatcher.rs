//! Notification records and read-state management.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::{EngineError, EngineResult};
use crate::storage::unixepoch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum NotificationKind {
    Task,
    Deadline,
    Message,
    System,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub message: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// References the triggering entity (a task for `task`/`deadline`).
    pub related_id: Option<i64>,
    pub created_at: i64,
    pub read_at: Option<i64>,
}

/// Side-effect sink for the task and time-entry components, and the owner of
/// per-user notification state.  Cheap to clone — wraps the shared pool.
#[derive(Clone)]
pub struct NotificationDispatcher {
    pub(crate) pool: SqlitePool,
}

impl NotificationDispatcher {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn notify(
        &self,
        user_id: i64,
        title: &str,
        message: &str,
        kind: NotificationKind,
        related_id: Option<i64>,
    ) -> EngineResult<i64> {
        if title.trim().is_empty() {
            return Err(EngineError::validation("notification title cannot be empty"));
        }
        if message.trim().is_empty() {
            return Err(EngineError::validation(
                "notification message cannot be empty",
            ));
        }

        let id = sqlx::query(
            "INSERT INTO notifications (user_id, title, message, type, related_id, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(title)
        .bind(message)
        .bind(kind)
        .bind(related_id)
        .bind(unixepoch())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn mark_read(&self, notification_id: i64, user_id: i64) -> EngineResult<()> {
        self.check_owner(notification_id, user_id).await?;
        sqlx::query("UPDATE notifications SET read_at = ? WHERE id = ?")
            .bind(unixepoch())
            .bind(notification_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Mark every unread notification for `user_id`; returns how many.
    pub async fn mark_all_read(&self, user_id: i64) -> EngineResult<u64> {
        let n = sqlx::query(
            "UPDATE notifications SET read_at = ? WHERE user_id = ? AND read_at IS NULL",
        )
        .bind(unixepoch())
        .bind(user_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(n)
    }

    pub async fn delete(&self, notification_id: i64, user_id: i64) -> EngineResult<()> {
        self.check_owner(notification_id, user_id).await?;
        sqlx::query("DELETE FROM notifications WHERE id = ?")
            .bind(notification_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list(
        &self,
        user_id: i64,
        unread_only: bool,
        limit: i64,
    ) -> EngineResult<Vec<Notification>> {
        let rows = if unread_only {
            sqlx::query_as(
                "SELECT * FROM notifications WHERE user_id = ? AND read_at IS NULL \
                 ORDER BY created_at DESC, id DESC LIMIT ?",
            )
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as(
                "SELECT * FROM notifications WHERE user_id = ? \
                 ORDER BY created_at DESC, id DESC LIMIT ?",
            )
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };
        Ok(rows)
    }

    pub async fn unread_count(&self, user_id: i64) -> EngineResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND read_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn check_owner(&self, notification_id: i64, user_id: i64) -> EngineResult<()> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT user_id FROM notifications WHERE id = ?")
                .bind(notification_id)
                .fetch_optional(&self.pool)
                .await?;
        match row {
            None => Err(EngineError::not_found("notification not found")),
            Some((owner,)) if owner != user_id => Err(EngineError::permission(
                "you don't have permission to access this notification",
            )),
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    async fn test_dispatcher() -> (NotificationDispatcher, tempfile::TempDir) {
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
        (NotificationDispatcher::new(pool), dir)
    }

    #[tokio::test]
    async fn test_rejects_empty_title_and_message() {
        let (d, _dir) = test_dispatcher().await;
        let err = d
            .notify(1, "  ", "body", NotificationKind::System, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        let err = d
            .notify(1, "title", "", NotificationKind::System, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_read_state_toggles() {
        let (d, _dir) = test_dispatcher().await;
        let id = d
            .notify(1, "Hello", "world", NotificationKind::Message, None)
            .await
            .unwrap();
        assert_eq!(d.unread_count(1).await.unwrap(), 1);

        d.mark_read(id, 1).await.unwrap();
        assert_eq!(d.unread_count(1).await.unwrap(), 0);

        let all = d.list(1, false, 50).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].read_at.is_some());
        assert!(d.list(1, true, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_user_gets_permission_error() {
        let (d, _dir) = test_dispatcher().await;
        let id = d
            .notify(1, "Hello", "world", NotificationKind::Message, None)
            .await
            .unwrap();
        let err = d.mark_read(id, 2).await.unwrap_err();
        assert!(matches!(err, EngineError::Permission(_)));
        let err = d.delete(id, 2).await.unwrap_err();
        assert!(matches!(err, EngineError::Permission(_)));
        // Still present and unread for the owner.
        assert_eq!(d.unread_count(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mark_all_read_counts() {
        let (d, _dir) = test_dispatcher().await;
        for i in 0..3 {
            d.notify(1, "n", &format!("m{i}"), NotificationKind::System, None)
                .await
                .unwrap();
        }
        d.notify(2, "n", "other user", NotificationKind::System, None)
            .await
            .unwrap();

        assert_eq!(d.mark_all_read(1).await.unwrap(), 3);
        assert_eq!(d.mark_all_read(1).await.unwrap(), 0);
        assert_eq!(d.unread_count(2).await.unwrap(), 1);
    }
}
