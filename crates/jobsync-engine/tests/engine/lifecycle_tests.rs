//! End-to-end flows through the composed monitors.

use std::sync::Arc;
use std::time::Duration;

use jobsync_client::{ClientError, VideoUpload};
use jobsync_engine::{EngineConfig, SubmissionPhase, TaskMonitor, VideoLibrary};
use jobsync_models::{TaskId, TaskStatus, TaskType, VideoStatus};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

use super::fake::{completed, task, FakeApi};

const TICK: Duration = Duration::from_secs(5);

#[tokio::test(start_paused = true)]
async fn test_upload_process_and_follow_to_completion() {
    let api = Arc::new(FakeApi::new());
    let config = EngineConfig::default();
    let library = VideoLibrary::new(api.clone(), &config);
    let monitor = TaskMonitor::new(api.clone(), &config);
    assert_ok!(monitor.start().await);

    api.next_ticket("T");
    let submission = assert_ok!(
        library
            .submit(VideoUpload::from_bytes("derby.mp4", vec![0u8; 2048]), TaskType::Analysis)
            .await
    );
    let ticket = assert_ok!(submission.processing);
    assert_eq!(ticket.task_id, TaskId::from("T"));
    assert_eq!(ticket.status, TaskStatus::Pending);
    assert_eq!(
        library.phase(&submission.receipt.id),
        Some(SubmissionPhase::Processing {
            task_id: TaskId::from("T")
        })
    );
    assert_eq!(
        library.state().items().first().map(|v| v.status),
        Some(VideoStatus::Processing)
    );

    let payload = json!({"detections": 42, "events": ["goal"]});
    api.script_task(
        "T",
        vec![
            task("T", TaskStatus::Pending, 0.0, 0),
            task("T", TaskStatus::Queued, 0.0, 1),
            task("T", TaskStatus::Running, 0.0, 2),
            task("T", TaskStatus::Running, 57.0, 3),
            task("T", TaskStatus::Running, 100.0, 4),
            completed("T", payload.clone(), 5),
        ],
    );

    let selected = assert_ok!(monitor.select(TaskId::from("T")).await);
    assert_eq!(selected.status, TaskStatus::Pending);
    assert!(monitor.selection_poller().is_running());

    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut seen = Vec::new();
    for _ in 0..5 {
        tokio::time::sleep(TICK).await;
        let record = monitor.selection().record.unwrap();
        seen.push((record.status, record.progress));
    }
    assert_eq!(
        seen,
        vec![
            (TaskStatus::Queued, 0.0),
            (TaskStatus::Running, 0.0),
            (TaskStatus::Running, 57.0),
            (TaskStatus::Running, 100.0),
            (TaskStatus::Completed, 100.0),
        ]
    );

    let selection = monitor.selection();
    assert_eq!(selection.selected, Some(TaskId::from("T")));
    assert_eq!(selection.record.and_then(|t| t.result), Some(payload));
    assert!(!monitor.selection_poller().is_running());
    assert!(monitor.list_poller().is_running());

    // The selection is no longer fetched; the list keeps polling.
    let gets = api.calls("get_task");
    let lists = api.calls("list_tasks");
    tokio::time::sleep(TICK * 4).await;
    assert_eq!(api.calls("get_task"), gets);
    assert!(api.calls("list_tasks") >= lists + 4);
    assert_eq!(
        monitor.view().find(&TaskId::from("T")).map(|t| t.status),
        Some(TaskStatus::Completed)
    );

    monitor.shutdown().await;
    library.shutdown().await;
    assert!(!monitor.list_poller().is_running());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_running_task_without_waiting_for_a_tick() {
    let api = Arc::new(FakeApi::new());
    api.put_task(task("R", TaskStatus::Running, 35.0, 10));
    api.put_task(task("Q", TaskStatus::Queued, 0.0, 5));

    let monitor = TaskMonitor::new(api.clone(), &EngineConfig::default());
    assert_ok!(monitor.start().await);
    assert_ok!(monitor.select(TaskId::from("R")).await);
    assert!(monitor.selection_poller().is_running());

    let mut updates = monitor.subscribe();
    updates.borrow_and_update();

    assert_ok!(monitor.cancel(&TaskId::from("R")).await);

    // No time has passed; the view was refreshed by the cancel itself.
    assert!(updates.has_changed().unwrap());
    let state = updates.borrow_and_update().clone();
    let cancelled = state.items().iter().find(|t| t.task_id.as_str() == "R");
    assert_eq!(cancelled.map(|t| t.status), Some(TaskStatus::Cancelled));

    let selection = monitor.selection();
    assert_eq!(
        selection.record.map(|t| t.status),
        Some(TaskStatus::Cancelled)
    );
    assert!(!monitor.selection_poller().is_running());
    assert!(monitor.list_poller().is_running());

    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_auto_refresh_toggle() {
    let api = Arc::new(FakeApi::new());
    let monitor = TaskMonitor::new(api.clone(), &EngineConfig::default());
    assert_ok!(monitor.start().await);
    assert!(monitor.auto_refresh());

    tokio::time::sleep(TICK * 2 + Duration::from_millis(100)).await;
    assert_eq!(api.calls("list_tasks"), 3);

    monitor.set_auto_refresh(false);
    tokio::time::sleep(TICK * 4).await;
    assert_eq!(api.calls("list_tasks"), 3);

    // Manual refresh keeps working with polling off.
    assert_ok!(monitor.refresh().await);
    assert_eq!(api.calls("list_tasks"), 4);

    monitor.set_auto_refresh(true);
    tokio::time::sleep(TICK + Duration::from_millis(100)).await;
    assert_eq!(api.calls("list_tasks"), 5);
    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_selecting_another_task_restarts_selection_polling() {
    let api = Arc::new(FakeApi::new());
    api.put_task(completed("done", json!({}), 3));
    api.put_task(task("live", TaskStatus::Running, 12.0, 2));

    let monitor = TaskMonitor::new(api.clone(), &EngineConfig::default());
    assert_ok!(monitor.select(TaskId::from("done")).await);
    assert!(!monitor.selection_poller().is_running());

    assert_ok!(monitor.select(TaskId::from("live")).await);
    assert!(monitor.selection_poller().is_running());

    let gets = api.calls("get_task");
    tokio::time::sleep(TICK + Duration::from_millis(100)).await;
    assert_eq!(api.calls("get_task"), gets + 1);

    monitor.clear();
    assert!(!monitor.selection_poller().is_running());
    assert!(monitor.selection().selected.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_selection_recovers_after_transient_failure() {
    let api = Arc::new(FakeApi::new());
    api.put_task(task("R", TaskStatus::Running, 20.0, 4));
    let monitor = TaskMonitor::new(api.clone(), &EngineConfig::default());

    api.fail_next_get(ClientError::transport("connection reset"));
    let err = assert_err!(monitor.select(TaskId::from("R")).await);
    assert!(err.is_retryable());
    assert!(monitor.selection_poller().is_running());
    assert!(monitor.selection().error.is_some());

    tokio::time::sleep(TICK + Duration::from_millis(100)).await;
    let selection = monitor.selection();
    assert_eq!(selection.record.map(|t| t.status), Some(TaskStatus::Running));
    assert!(selection.error.is_none());
    assert!(monitor.selection_poller().is_running());
    monitor.shutdown().await;
}
