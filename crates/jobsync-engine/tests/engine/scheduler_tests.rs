//! Poll scheduler driving a collection view.

use std::sync::Arc;
use std::time::Duration;

use jobsync_engine::{CollectionView, PollScheduler};
use jobsync_models::{CollectionQuery, Task, TaskId, TaskStatus};

use super::fake::{task, FakeApi};

#[tokio::test(start_paused = true)]
async fn test_slow_refreshes_never_stack() {
    let api = Arc::new(FakeApi::new());
    api.put_task(task("t-1", TaskStatus::Running, 10.0, 1));
    api.set_list_delay(Duration::from_secs(12));

    let view = Arc::new(CollectionView::<Task>::new(api.clone(), CollectionQuery::new(10)));
    let scheduler = PollScheduler::new("tasks", Duration::from_secs(5), view.clone());
    scheduler.start();

    // Ticks at 5, 10 and 15; the refresh started at 5 runs until 17.
    tokio::time::sleep(Duration::from_secs(16)).await;
    assert_eq!(api.calls("list_tasks"), 1);
    assert_eq!(api.max_lists_in_flight(), 1);
    assert!(view.state().loading);

    // Tick 20 starts the next refresh; 25 and 30 are skipped.
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(api.calls("list_tasks"), 2);
    assert_eq!(api.max_lists_in_flight(), 1);
    assert!(view.state().loaded);

    // Stopping mid-refresh drops it; its result is never applied.
    api.put_task(task("t-2", TaskStatus::Queued, 0.0, 1));
    scheduler.stop();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(api.calls("list_tasks"), 2);
    assert!(view.find(&TaskId::from("t-2")).is_none());
    assert!(!view.state().loading);
}

#[tokio::test(start_paused = true)]
async fn test_closed_view_stops_its_scheduler() {
    let api = Arc::new(FakeApi::new());
    let view = Arc::new(CollectionView::<Task>::new(api.clone(), CollectionQuery::new(10)));
    let scheduler = PollScheduler::new("tasks", Duration::from_secs(5), view.clone());
    scheduler.start();

    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(api.calls("list_tasks"), 1);

    view.close();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!scheduler.is_running());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(api.calls("list_tasks"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_stop() {
    let api = Arc::new(FakeApi::new());
    let view = Arc::new(CollectionView::<Task>::new(api.clone(), CollectionQuery::new(10)));
    let scheduler = PollScheduler::new("tasks", Duration::from_secs(5), view.clone());

    scheduler.start();
    tokio::time::sleep(Duration::from_millis(10_100)).await;
    scheduler.stop();
    assert_eq!(api.calls("list_tasks"), 2);

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(api.calls("list_tasks"), 2);

    scheduler.start();
    assert_eq!(scheduler.generation(), 2);
    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(api.calls("list_tasks"), 3);
    scheduler.shutdown().await;
}
