//! End-to-end lifecycle flows across the task, timeclock, notification, and
//! stats components, wired the same way the daemon wires them.

use std::sync::Arc;

use tempfile::TempDir;
use tempod::config::DaemonConfig;
use tempod::error::EngineError;
use tempod::storage::{unixepoch, Storage};
use tempod::tasks::{DeleteOutcome, NewTask, TaskFilter, TaskPatch, TaskStatus};
use tempod::timeclock::{EntryFilter, SummaryPeriod};
use tempod::AppContext;

const ALICE: i64 = 1;
const BOB: i64 = 2;

async fn setup() -> (TempDir, AppContext) {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(Storage::new(dir.path()).await.unwrap());
    for (id, username, role) in [(ALICE, "alice", "employer"), (BOB, "bob", "employee")] {
        sqlx::query("INSERT INTO users (id, username, role) VALUES (?, ?, ?)")
            .bind(id)
            .bind(username)
            .bind(role)
            .execute(&storage.pool())
            .await
            .unwrap();
    }
    let config = Arc::new(DaemonConfig::new(None, Some(dir.path().into()), None, None));
    let ctx = AppContext::new(config, storage);
    (dir, ctx)
}

fn new_task(title: &str, created_by: i64, assigned_to: Option<i64>) -> NewTask {
    NewTask {
        title: title.to_string(),
        description: None,
        status: TaskStatus::NotStarted,
        priority: None,
        created_by,
        assigned_to,
        deadline: None,
        estimated_hours: None,
    }
}

#[tokio::test]
async fn assign_track_complete_flow() {
    let (_dir, ctx) = setup().await;

    // Alice assigns a task to Bob — Bob gets an assignment notification.
    let task_id = ctx
        .tasks
        .create(new_task("Quarterly report", ALICE, Some(BOB)))
        .await
        .unwrap();
    assert_eq!(ctx.notifier.unread_count(BOB).await.unwrap(), 1);

    // Bob starts a timer — the task moves to in_progress.
    let entry_id = ctx.timeclock.start(BOB, task_id, None).await.unwrap();
    let task = ctx.tasks.get(task_id, BOB).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::InProgress);

    // Backdate the entry so the closed duration is meaningful.
    sqlx::query("UPDATE time_entries SET start_time = start_time - 3600 WHERE id = ?")
        .bind(entry_id)
        .execute(&ctx.storage.pool())
        .await
        .unwrap();

    let view = ctx.timeclock.stop(BOB, Some("drafted sections 1-3")).await.unwrap();
    assert!(view.duration_seconds >= 3600);
    assert!(view.duration_formatted.starts_with("1h"));

    // Bob completes the task — completed_at is stamped.
    ctx.tasks
        .update(
            task_id,
            BOB,
            TaskPatch {
                status: Some(TaskStatus::Completed),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let task = ctx.tasks.get(task_id, BOB).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.completed_at.is_some());

    // Stats for Bob see one completed task at a 100% completion rate.
    let report = ctx.stats.task_stats(Some(BOB)).await.unwrap();
    assert_eq!(report.status_counts.completed, 1);
    assert_eq!(report.completion_rate, 100.0);
}

#[tokio::test]
async fn concurrent_starts_yield_exactly_one_open_entry() {
    let (_dir, ctx) = setup().await;

    let a = ctx.tasks.create(new_task("First task", BOB, None)).await.unwrap();
    let b = ctx.tasks.create(new_task("Second task", BOB, None)).await.unwrap();

    let (r1, r2) = tokio::join!(
        ctx.timeclock.start(BOB, a, None),
        ctx.timeclock.start(BOB, b, None)
    );

    let oks = [r1.is_ok(), r2.is_ok()].iter().filter(|&&ok| ok).count();
    assert_eq!(oks, 1, "exactly one start must win");
    let conflict = if r1.is_err() { r1.unwrap_err() } else { r2.unwrap_err() };
    assert!(matches!(conflict, EngineError::ActiveEntryConflict { .. }));

    // The store agrees: one open entry for Bob.
    let (open,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM time_entries WHERE user_id = ? AND end_time IS NULL",
    )
    .bind(BOB)
    .fetch_one(&ctx.storage.pool())
    .await
    .unwrap();
    assert_eq!(open, 1);
}

#[tokio::test]
async fn delete_becomes_cancel_once_time_is_logged() {
    let (_dir, ctx) = setup().await;

    let task_id = ctx
        .tasks
        .create(new_task("Prototype spike", ALICE, Some(BOB)))
        .await
        .unwrap();
    ctx.timeclock.start(BOB, task_id, None).await.unwrap();
    ctx.timeclock.stop(BOB, None).await.unwrap();

    // Assignee cannot delete at all.
    let err = ctx.tasks.delete(task_id, BOB).await.unwrap_err();
    assert!(matches!(err, EngineError::Permission(_)));

    // Creator deletes — but logged time downgrades it to a cancel.
    let outcome = ctx.tasks.delete(task_id, ALICE).await.unwrap();
    assert_eq!(outcome, DeleteOutcome::Cancelled);
    let task = ctx.tasks.get(task_id, ALICE).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);

    // The history survives the cancel.
    let entries = ctx
        .timeclock
        .list_entries(BOB, EntryFilter::default())
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].task_id, task_id);

    // With no time logged, delete really deletes.
    let bare = ctx.tasks.create(new_task("Empty task", ALICE, None)).await.unwrap();
    assert_eq!(
        ctx.tasks.delete(bare, ALICE).await.unwrap(),
        DeleteOutcome::Deleted
    );
    assert!(ctx.tasks.get(bare, ALICE).await.unwrap().is_none());
}

#[tokio::test]
async fn cancelled_task_rejects_new_timers() {
    let (_dir, ctx) = setup().await;

    let task_id = ctx
        .tasks
        .create(new_task("Doomed task", ALICE, Some(BOB)))
        .await
        .unwrap();
    ctx.timeclock.start(BOB, task_id, None).await.unwrap();
    ctx.timeclock.stop(BOB, None).await.unwrap();
    ctx.tasks.delete(task_id, ALICE).await.unwrap();

    let err = ctx.timeclock.start(BOB, task_id, None).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
    assert_eq!(err.to_string(), "cannot track time for a cancelled task");
}

#[tokio::test]
async fn deadline_sweep_notifies_once_per_day() {
    let (_dir, ctx) = setup().await;

    let mut task = new_task("Ship the release", ALICE, Some(BOB));
    task.deadline = Some(unixepoch() + 5 * 3600);
    let task_id = ctx.tasks.create(task).await.unwrap();

    // Clear the assignment notification so only sweep output remains.
    ctx.notifier.mark_all_read(BOB).await.unwrap();

    assert_eq!(ctx.notifier.scan_deadlines().await.unwrap(), 1);
    assert_eq!(ctx.notifier.scan_deadlines().await.unwrap(), 0);

    let unread = ctx.notifier.list(BOB, true, 10).await.unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].title, "Task Deadline Today");
    assert_eq!(unread[0].related_id, Some(task_id));

    // Reading it does not re-open the dedup window.
    ctx.notifier.mark_read(unread[0].id, BOB).await.unwrap();
    assert_eq!(ctx.notifier.scan_deadlines().await.unwrap(), 0);
}

#[tokio::test]
async fn summary_reflects_only_the_requested_period() {
    let (_dir, ctx) = setup().await;

    let task_id = ctx
        .tasks
        .create(new_task("Ongoing work", BOB, None))
        .await
        .unwrap();

    let entry_id = ctx.timeclock.start(BOB, task_id, None).await.unwrap();
    sqlx::query("UPDATE time_entries SET start_time = start_time - 1800 WHERE id = ?")
        .bind(entry_id)
        .execute(&ctx.storage.pool())
        .await
        .unwrap();
    ctx.timeclock.stop(BOB, None).await.unwrap();

    // An old entry well outside this week.
    let old_start = unixepoch() - 30 * 86_400;
    sqlx::query(
        "INSERT INTO time_entries (user_id, task_id, start_time, end_time, duration_seconds) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(BOB)
    .bind(task_id)
    .bind(old_start)
    .bind(old_start + 7200)
    .bind(7200)
    .execute(&ctx.storage.pool())
    .await
    .unwrap();

    let today = ctx.timeclock.summary(BOB, SummaryPeriod::Today).await.unwrap();
    assert!(today.total_seconds >= 1800 && today.total_seconds < 7200);
    assert_eq!(today.by_task.len(), 1);
    assert_eq!(today.by_task[0].task_id, task_id);

    let yesterday = ctx
        .timeclock
        .summary(BOB, SummaryPeriod::Yesterday)
        .await
        .unwrap();
    assert_eq!(yesterday.total_seconds, 0);
}

#[tokio::test]
async fn task_list_visibility_is_per_viewer() {
    let (_dir, ctx) = setup().await;

    ctx.tasks.create(new_task("Alice private", ALICE, None)).await.unwrap();
    ctx.tasks.create(new_task("Shared with Bob", ALICE, Some(BOB))).await.unwrap();
    ctx.tasks.create(new_task("Bob private", BOB, None)).await.unwrap();

    let bob_view = ctx
        .tasks
        .list(TaskFilter {
            viewer_id: Some(BOB),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(bob_view.len(), 2);
    assert!(bob_view.iter().all(|t| t.title != "Alice private"));

    // Unfiltered list sees everything (admin surface).
    let all = ctx.tasks.list(TaskFilter::default()).await.unwrap();
    assert_eq!(all.len(), 3);
}
