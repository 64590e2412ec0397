//! Selection reconciliation and the cancel flow.

use std::sync::Arc;

use jobsync_engine::{CancelSelectionPolicy, CollectionView, PollControl, Reconciler, SyncError};
use jobsync_models::{CollectionQuery, Task, TaskId, TaskStatus};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

use super::fake::{completed, task, FakeApi};

struct Fixture {
    api: Arc<FakeApi>,
    view: Arc<CollectionView<Task>>,
    reconciler: Arc<Reconciler>,
}

fn fixture(policy: CancelSelectionPolicy) -> Fixture {
    let api = Arc::new(FakeApi::new());
    api.put_task(task("t-run", TaskStatus::Running, 40.0, 10));
    api.put_task(task("t-queued", TaskStatus::Queued, 0.0, 5));
    api.put_task(completed("t-done", json!({"clips": 3}), 30));

    let view = Arc::new(CollectionView::new(api.clone(), CollectionQuery::new(10)));
    let reconciler = Arc::new(Reconciler::new(api.clone(), policy));
    reconciler.attach(&view);

    Fixture {
        api,
        view,
        reconciler,
    }
}

fn id(s: &str) -> TaskId {
    TaskId::from(s)
}

#[tokio::test]
async fn test_cancel_completed_task_is_invalid_without_network() {
    let f = fixture(CancelSelectionPolicy::default());
    assert_ok!(f.reconciler.select(id("t-done")).await);
    f.api.reset_calls();

    let err = assert_err!(f.reconciler.cancel(&id("t-done")).await);
    assert!(matches!(err, SyncError::InvalidState(_)));
    assert_eq!(f.api.total_calls(), 0);
}

#[tokio::test]
async fn test_cancel_uses_view_cache_when_nothing_is_selected() {
    let f = fixture(CancelSelectionPolicy::default());
    assert_ok!(f.view.refresh().await);
    f.api.reset_calls();

    let err = assert_err!(f.reconciler.cancel(&id("t-done")).await);
    assert!(matches!(err, SyncError::InvalidState(_)));
    assert_eq!(f.api.total_calls(), 0);
}

#[tokio::test]
async fn test_cancel_uncached_task_fetches_once() {
    let f = fixture(CancelSelectionPolicy::default());

    let err = assert_err!(f.reconciler.cancel(&id("t-done")).await);
    assert!(matches!(err, SyncError::InvalidState(_)));
    assert_eq!(f.api.calls("get_task"), 1);
    assert_eq!(f.api.calls("cancel_task"), 0);
}

#[tokio::test]
async fn test_cancel_running_task_shows_cancelled_everywhere() {
    let f = fixture(CancelSelectionPolicy::ShowTerminal);
    assert_ok!(f.view.refresh().await);
    assert_ok!(f.reconciler.select(id("t-run")).await);
    let lists_before = f.api.calls("list_tasks");

    assert_ok!(f.reconciler.cancel(&id("t-run")).await);

    let selection = f.reconciler.state();
    assert_eq!(selection.selected, Some(id("t-run")));
    assert_eq!(
        selection.record.as_ref().map(|t| t.status),
        Some(TaskStatus::Cancelled)
    );
    assert!(selection.is_terminal());

    assert_eq!(
        f.view.find(&id("t-run")).map(|t| t.status),
        Some(TaskStatus::Cancelled)
    );
    assert_eq!(f.api.calls("cancel_task"), 1);
    assert_eq!(f.api.calls("list_tasks"), lists_before + 1);
    assert_eq!(f.api.task_status("t-run"), Some(TaskStatus::Cancelled));
}

#[tokio::test]
async fn test_clear_policy_drops_selection_after_cancel() {
    let f = fixture(CancelSelectionPolicy::Clear);
    assert_ok!(f.view.refresh().await);
    assert_ok!(f.reconciler.select(id("t-queued")).await);

    assert_ok!(f.reconciler.cancel(&id("t-queued")).await);

    assert!(f.reconciler.selected_id().is_none());
    assert_eq!(
        f.view.find(&id("t-queued")).map(|t| t.status),
        Some(TaskStatus::Cancelled)
    );
}

#[tokio::test]
async fn test_cancel_racing_completion_is_invalid_state() {
    let f = fixture(CancelSelectionPolicy::default());
    assert_ok!(f.reconciler.select(id("t-run")).await);

    // The task finishes server-side after the selection was fetched.
    f.api.put_task(completed("t-run", json!({"clips": 1}), 40));
    f.api.reset_calls();

    let err = assert_err!(f.reconciler.cancel(&id("t-run")).await);
    assert!(matches!(err, SyncError::InvalidState(_)));
    assert_eq!(f.api.calls("cancel_task"), 1);
    assert_eq!(f.api.calls("get_task"), 1);

    let selection = f.reconciler.state();
    assert_eq!(
        selection.record.as_ref().map(|t| t.status),
        Some(TaskStatus::Completed)
    );
}

#[tokio::test]
async fn test_cancel_vanished_task_clears_selection() {
    let f = fixture(CancelSelectionPolicy::default());
    assert_ok!(f.reconciler.select(id("t-run")).await);
    f.api.remove_task("t-run");

    let err = assert_err!(f.reconciler.cancel(&id("t-run")).await);
    assert!(err.is_not_found());

    let selection = f.reconciler.state();
    assert!(selection.selected.is_none());
    assert!(matches!(selection.error, Some(SyncError::NotFound(_))));
}

#[tokio::test]
async fn test_select_missing_task_leaves_no_selection() {
    let f = fixture(CancelSelectionPolicy::default());

    let err = assert_err!(f.reconciler.select(id("nope")).await);
    assert!(err.is_not_found());
    assert!(f.reconciler.selected_id().is_none());
    assert!(f.reconciler.state().error.is_some());
}

#[tokio::test]
async fn test_list_refresh_updates_selection() {
    let f = fixture(CancelSelectionPolicy::default());
    assert_ok!(f.reconciler.select(id("t-run")).await);
    f.api.reset_calls();

    f.api.put_task(task("t-run", TaskStatus::Running, 80.0, 20));
    assert_ok!(f.view.refresh().await);

    let record = f.reconciler.selection().unwrap();
    assert_eq!(record.progress, 80.0);
    assert_eq!(f.api.calls("get_task"), 0);
}

#[tokio::test]
async fn test_refresh_selection_controls_polling() {
    let f = fixture(CancelSelectionPolicy::default());
    assert_eq!(f.reconciler.refresh_selection().await, PollControl::Stop);

    assert_ok!(f.reconciler.select(id("t-run")).await);
    assert_eq!(f.reconciler.refresh_selection().await, PollControl::Continue);

    let mut failed = task("t-run", TaskStatus::Failed, 40.0, 20);
    failed.error_message = Some("decoder crashed".to_string());
    f.api.put_task(failed);
    assert_eq!(f.reconciler.refresh_selection().await, PollControl::Stop);
    assert_eq!(
        f.reconciler.selection().and_then(|t| t.error_message),
        Some("decoder crashed".to_string())
    );

    // Terminal selections are not fetched again.
    f.api.reset_calls();
    assert_eq!(f.reconciler.refresh_selection().await, PollControl::Stop);
    assert_eq!(f.api.total_calls(), 0);
}

#[tokio::test]
async fn test_removed_selection_stops_polling_and_clears() {
    let f = fixture(CancelSelectionPolicy::default());
    assert_ok!(f.reconciler.select(id("t-queued")).await);
    f.api.remove_task("t-queued");

    assert_eq!(f.reconciler.refresh_selection().await, PollControl::Stop);
    assert!(f.reconciler.selected_id().is_none());
}

#[tokio::test]
async fn test_late_selection_response_does_not_undo_cancel() {
    let f = fixture(CancelSelectionPolicy::default());
    assert_ok!(f.reconciler.select(id("t-run")).await);

    // A poll whose response (still `running`) arrives after the cancel.
    let gate = f.api.gate_next_get();
    let reconciler = f.reconciler.clone();
    let poll = tokio::spawn(async move { reconciler.refresh_selection().await });
    f.api.wait_for_calls("get_task", 2).await;

    assert_ok!(f.reconciler.cancel(&id("t-run")).await);
    assert_eq!(
        f.reconciler.selection().map(|t| t.status),
        Some(TaskStatus::Cancelled)
    );

    gate.send(()).unwrap();
    assert_eq!(poll.await.unwrap(), PollControl::Stop);

    let selection = f.reconciler.state();
    assert_eq!(
        selection.record.as_ref().map(|t| t.status),
        Some(TaskStatus::Cancelled)
    );
    assert!(!selection.loading);
}
