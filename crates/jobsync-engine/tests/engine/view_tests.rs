//! Collection view: paging rules, fetch ordering, coalescing and teardown.

use std::sync::Arc;

use jobsync_client::ClientError;
use jobsync_engine::{CollectionView, FetchOutcome, SyncError};
use jobsync_models::{CollectionQuery, QueryPatch, Task, TaskId, TaskStatus};
use tokio_test::{assert_err, assert_ok};

use super::fake::{task, FakeApi};

fn seeded(count: usize) -> Arc<FakeApi> {
    let api = Arc::new(FakeApi::new());
    for i in 0..count {
        api.put_task(task(&format!("t-{i:02}"), TaskStatus::Running, 10.0, 1));
    }
    api
}

fn ids(view: &CollectionView<Task>) -> Vec<String> {
    view.state()
        .items()
        .iter()
        .map(|t| t.task_id.to_string())
        .collect()
}

#[tokio::test]
async fn test_filter_resets_skip_and_page_sets_it() {
    let api = seeded(35);
    let view = CollectionView::<Task>::new(api.clone(), CollectionQuery::new(10));

    assert_ok!(view.refresh().await);
    assert_eq!(view.state().page_count(), 4);

    assert_ok!(view.set_page(2).await);
    assert_eq!(view.query().skip(), 20);
    assert_eq!(ids(&view).first().map(String::as_str), Some("t-20"));

    assert_ok!(view.set_filter(QueryPatch::status(Some(TaskStatus::Running))).await);
    assert_eq!(view.query().skip(), 0);

    assert_ok!(view.set_page(3).await);
    assert_eq!(view.query().skip(), 30);
    assert_eq!(view.state().items().len(), 5);

    assert_ok!(view.set_filter(QueryPatch::search(Some("match".to_string()))).await);
    assert_eq!(view.query().skip(), 0);

    let sent: Vec<u64> = api.task_queries().iter().map(|q| q.skip()).collect();
    assert_eq!(sent, vec![0, 20, 0, 30, 0]);
}

#[tokio::test]
async fn test_page_is_clamped_once_total_is_known() {
    let api = seeded(35);
    let view = CollectionView::<Task>::new(api.clone(), CollectionQuery::new(10));
    assert_ok!(view.refresh().await);

    assert_ok!(view.set_page(9).await);
    assert_eq!(view.state().page(), 3);
    assert!(!view.state().has_next());
    assert!(view.state().has_previous());

    // An empty result still has a valid page 0.
    assert_ok!(view.set_filter(QueryPatch::status(Some(TaskStatus::Completed))).await);
    assert_eq!(view.state().snapshot.total, 0);
    assert_ok!(view.set_page(5).await);
    assert_eq!(view.query().skip(), 0);
    assert_eq!(view.state().page_count(), 1);
}

#[tokio::test]
async fn test_stale_query_response_is_discarded() {
    let api = Arc::new(FakeApi::new());
    api.put_task(task("run-1", TaskStatus::Running, 40.0, 1));
    api.put_task(task("done-1", TaskStatus::Completed, 100.0, 2));
    let view = CollectionView::<Task>::new(api.clone(), CollectionQuery::new(10));

    let release_first = api.gate_next_list();
    let (first, second, _) = tokio::join!(
        view.set_filter(QueryPatch::status(Some(TaskStatus::Running))),
        view.set_filter(QueryPatch::status(Some(TaskStatus::Completed))),
        async {
            api.wait_for_calls("list_tasks", 2).await;
            release_first.send(()).unwrap();
        }
    );

    assert_eq!(assert_ok!(second), FetchOutcome::Applied);
    assert_eq!(assert_ok!(first), FetchOutcome::Discarded);

    let state = view.state();
    assert_eq!(state.query.status(), Some(&TaskStatus::Completed));
    assert_eq!(ids(&view), vec!["done-1"]);
    assert!(!state.loading);
}

#[tokio::test]
async fn test_identical_refreshes_are_coalesced() {
    let api = seeded(3);
    let view = CollectionView::<Task>::new(api.clone(), CollectionQuery::new(10));

    let gate = api.gate_next_list();
    let (first, second, _) = tokio::join!(view.refresh(), view.refresh(), async {
        api.wait_for_calls("list_tasks", 1).await;
        assert!(view.state().loading);
        gate.send(()).unwrap();
    });

    assert_eq!(assert_ok!(first), FetchOutcome::Applied);
    assert_eq!(assert_ok!(second), FetchOutcome::Coalesced);
    assert_eq!(api.calls("list_tasks"), 1);
    assert_eq!(view.state().items().len(), 3);
}

#[tokio::test]
async fn test_coalesced_refresh_reports_shared_failure() {
    let api = seeded(3);
    let view = CollectionView::<Task>::new(api.clone(), CollectionQuery::new(10));

    api.fail_next_list(ClientError::transport("connection reset"));
    let gate = api.gate_next_list();
    let (first, second, _) = tokio::join!(view.refresh(), view.refresh(), async {
        api.wait_for_calls("list_tasks", 1).await;
        gate.send(()).unwrap();
    });

    assert!(matches!(assert_err!(first), SyncError::Transport(_)));
    assert!(matches!(assert_err!(second), SyncError::Transport(_)));
    assert_eq!(api.calls("list_tasks"), 1);
    assert!(view.state().error.is_some());
}

#[tokio::test]
async fn test_invalidate_bypasses_outstanding_fetch() {
    let api = seeded(2);
    let view = CollectionView::<Task>::new(api.clone(), CollectionQuery::new(10));

    let gate = api.gate_next_list();
    let (first, second) = tokio::join!(view.refresh(), async {
        api.wait_for_calls("list_tasks", 1).await;
        view.invalidate();
        let outcome = view.refresh().await;
        gate.send(()).unwrap();
        outcome
    });

    assert_eq!(assert_ok!(second), FetchOutcome::Applied);
    assert_eq!(assert_ok!(first), FetchOutcome::Discarded);
    assert_eq!(api.calls("list_tasks"), 2);
}

#[tokio::test]
async fn test_failed_refresh_keeps_last_snapshot() {
    let api = seeded(2);
    let view = CollectionView::<Task>::new(api.clone(), CollectionQuery::new(10));
    assert_ok!(view.refresh().await);

    api.fail_next_list(ClientError::unavailable("maintenance"));
    let err = assert_err!(view.refresh().await);
    assert!(err.is_retryable());

    let state = view.state();
    assert_eq!(state.items().len(), 2);
    assert!(matches!(state.error, Some(SyncError::ServerUnavailable(_))));

    assert_ok!(view.refresh().await);
    assert!(view.state().error.is_none());
}

#[tokio::test]
async fn test_close_discards_outstanding_response() {
    let api = seeded(2);
    let view = CollectionView::<Task>::new(api.clone(), CollectionQuery::new(10));

    let gate = api.gate_next_list();
    let (outcome, _) = tokio::join!(view.refresh(), async {
        api.wait_for_calls("list_tasks", 1).await;
        view.close();
        gate.send(()).unwrap();
    });

    assert_eq!(assert_ok!(outcome), FetchOutcome::Discarded);
    let state = view.state();
    assert!(state.closed);
    assert!(!state.loaded);
    assert!(state.items().is_empty());

    assert!(matches!(view.refresh().await, Err(SyncError::Closed(_))));
    assert!(matches!(
        view.set_filter(QueryPatch::limit(5)).await,
        Err(SyncError::Closed(_))
    ));
    assert_eq!(api.calls("list_tasks"), 1);
}

#[tokio::test]
async fn test_replace_record_only_touches_present_items() {
    let api = seeded(2);
    let view = CollectionView::<Task>::new(api.clone(), CollectionQuery::new(10));
    assert_ok!(view.refresh().await);

    let mut updates = view.subscribe();
    updates.borrow_and_update();

    let cancelled = task("t-01", TaskStatus::Cancelled, 10.0, 2);
    assert!(view.replace_record(cancelled));
    assert!(updates.has_changed().unwrap());
    assert_eq!(
        view.find(&TaskId::from("t-01")).map(|t| t.status),
        Some(TaskStatus::Cancelled)
    );

    assert!(!view.replace_record(task("elsewhere", TaskStatus::Cancelled, 0.0, 2)));
}
