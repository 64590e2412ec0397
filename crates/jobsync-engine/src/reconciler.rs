//! Lifecycle reconciliation of the selected task.
//!
//! The [`Reconciler`] holds at most one selected task and keeps it aligned
//! with every task record observed, whether fetched for the selection or
//! seen in an attached collection view. It also owns the cancel flow.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use jobsync_client::ResourceApi;
use jobsync_models::{CancelAck, Task, TaskId};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::scheduler::{PollControl, PollTarget};
use crate::view::{CollectionView, RecordObserver};

/// What a matching selection shows after a successful cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelSelectionPolicy {
    /// Keep the selection, marked `cancelled`.
    #[default]
    ShowTerminal,
    /// Drop the selection.
    Clear,
}

impl CancelSelectionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelSelectionPolicy::ShowTerminal => "show_terminal",
            CancelSelectionPolicy::Clear => "clear",
        }
    }
}

impl fmt::Display for CancelSelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CancelSelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "show_terminal" | "show" => Ok(CancelSelectionPolicy::ShowTerminal),
            "clear" => Ok(CancelSelectionPolicy::Clear),
            other => Err(format!("unknown cancel selection policy: {}", other)),
        }
    }
}

/// Observable selection state.
#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    pub selected: Option<TaskId>,
    /// Latest record for the selected id, once fetched
    pub record: Option<Task>,
    pub loading: bool,
    pub error: Option<SyncError>,
}

impl SelectionState {
    pub fn is_terminal(&self) -> bool {
        self.record.as_ref().is_some_and(Task::is_terminal)
    }
}

#[derive(Default)]
struct Selection {
    /// Bumped on every select/clear so late fetches for an old selection are dropped
    generation: u64,
    state: SelectionState,
}

impl Selection {
    fn matches(&self, id: &TaskId) -> bool {
        self.state.selected.as_ref() == Some(id)
    }

    /// Replace the record unless the held one is newer or the status
    /// change would step backwards.
    fn accept(&mut self, task: &Task) -> bool {
        if !self.matches(&task.task_id) {
            return false;
        }
        if let Some(held) = &self.state.record {
            if task.updated_at < held.updated_at || !held.status.can_transition_to(task.status) {
                return false;
            }
            if held == task {
                return false;
            }
        }
        self.state.record = Some(task.clone());
        true
    }

    fn clear(&mut self) {
        self.generation += 1;
        self.state = SelectionState::default();
    }
}

/// Keeps the selected task aligned with the latest observed records.
pub struct Reconciler {
    api: Arc<dyn ResourceApi>,
    policy: CancelSelectionPolicy,
    selection: Mutex<Selection>,
    views: Mutex<Vec<Weak<CollectionView<Task>>>>,
    tx: watch::Sender<SelectionState>,
}

impl Reconciler {
    pub fn new(api: Arc<dyn ResourceApi>, policy: CancelSelectionPolicy) -> Self {
        let (tx, _) = watch::channel(SelectionState::default());
        Self {
            api,
            policy,
            selection: Mutex::new(Selection::default()),
            views: Mutex::new(Vec::new()),
            tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Selection> {
        self.selection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, selection: &Selection) {
        self.tx.send_replace(selection.state.clone());
    }

    pub fn policy(&self) -> CancelSelectionPolicy {
        self.policy
    }

    pub fn subscribe(&self) -> watch::Receiver<SelectionState> {
        self.tx.subscribe()
    }

    pub fn state(&self) -> SelectionState {
        self.lock().state.clone()
    }

    pub fn selected_id(&self) -> Option<TaskId> {
        self.lock().state.selected.clone()
    }

    pub fn selection(&self) -> Option<Task> {
        self.lock().state.record.clone()
    }

    /// Observe snapshots of a task view and refresh it after cancellations.
    pub fn attach(self: &Arc<Self>, view: &Arc<CollectionView<Task>>) {
        let observer: Weak<Reconciler> = Arc::downgrade(self);
        view.add_observer(observer);
        self.live_views_mut().push(Arc::downgrade(view));
    }

    fn live_views_mut(&self) -> MutexGuard<'_, Vec<Weak<CollectionView<Task>>>> {
        let mut views = self.views.lock().unwrap_or_else(PoisonError::into_inner);
        views.retain(|v| v.strong_count() > 0);
        views
    }

    fn live_views(&self) -> Vec<Arc<CollectionView<Task>>> {
        self.live_views_mut().iter().filter_map(Weak::upgrade).collect()
    }

    /// Feed a freshly fetched record. Returns whether the selection changed.
    pub fn observe_record(&self, task: &Task) -> bool {
        let mut selection = self.lock();
        let changed = selection.accept(task);
        if changed {
            debug!(task_id = %task.task_id, status = %task.status, "Selection updated");
            self.publish(&selection);
        }
        changed
    }

    /// Select a task and fetch its full record.
    pub async fn select(&self, id: TaskId) -> SyncResult<Task> {
        let cached = self.cached(&id);
        let generation = {
            let mut selection = self.lock();
            let same = selection.matches(&id);
            selection.generation += 1;
            selection.state.selected = Some(id.clone());
            selection.state.loading = true;
            selection.state.error = None;
            if !same {
                selection.state.record = cached;
            }
            self.publish(&selection);
            selection.generation
        };

        self.fetch_selected(&id, generation).await
    }

    /// Drop the selection.
    pub fn clear(&self) {
        let mut selection = self.lock();
        selection.clear();
        self.publish(&selection);
    }

    /// Re-fetch the selected task. Returns `Stop` once the selection is
    /// empty or terminal.
    pub async fn refresh_selection(&self) -> PollControl {
        let (id, generation) = {
            let mut selection = self.lock();
            let Some(id) = selection.state.selected.clone() else {
                return PollControl::Stop;
            };
            if selection.state.is_terminal() {
                return PollControl::Stop;
            }
            selection.state.loading = true;
            self.publish(&selection);
            (id, selection.generation)
        };

        let result = self.fetch_selected(&id, generation).await;

        // The selection changed meanwhile (reselected, cleared or cancelled);
        // decide from what it holds now.
        {
            let selection = self.lock();
            if selection.generation != generation {
                return if selection.state.selected.is_none() || selection.state.is_terminal() {
                    PollControl::Stop
                } else {
                    PollControl::Continue
                };
            }
        }

        match result {
            Ok(task) if task.is_terminal() => PollControl::Stop,
            Err(SyncError::NotFound(_)) => PollControl::Stop,
            _ => PollControl::Continue,
        }
    }

    async fn fetch_selected(&self, id: &TaskId, generation: u64) -> SyncResult<Task> {
        let result = self.api.get_task(id).await.map_err(SyncError::from);

        let mut selection = self.lock();
        if selection.generation != generation {
            debug!(task_id = %id, "Selection changed while fetching, dropping result");
            return result;
        }

        selection.state.loading = false;
        match &result {
            Ok(task) => {
                selection.state.error = None;
                selection.accept(task);
            }
            Err(SyncError::NotFound(_)) => {
                info!(task_id = %id, "Selected task no longer exists");
                let err = result.clone().err();
                selection.clear();
                selection.state.error = err;
            }
            Err(e) => {
                warn!(task_id = %id, "Failed to refresh selected task: {}", e);
                selection.state.error = Some(e.clone());
            }
        }
        self.publish(&selection);
        result
    }

    /// Cached record for `id` from attached views.
    fn cached(&self, id: &TaskId) -> Option<Task> {
        self.live_views().iter().find_map(|view| view.find(id))
    }

    /// Selection first, then attached views.
    fn cached_status(&self, id: &TaskId) -> Option<Task> {
        {
            let selection = self.lock();
            if let Some(record) = selection.state.record.as_ref().filter(|t| &t.task_id == id) {
                return Some(record.clone());
            }
        }
        self.cached(id)
    }

    /// Cancel a pending, queued or running task.
    ///
    /// A task already in a terminal state yields `InvalidState` without any
    /// network call when its status is cached.
    pub async fn cancel(&self, id: &TaskId) -> SyncResult<CancelAck> {
        let current = match self.cached_status(id) {
            Some(task) => task,
            None => match self.api.get_task(id).await {
                Ok(task) => {
                    self.observe_record(&task);
                    task
                }
                Err(e) => {
                    let err = SyncError::from(e);
                    if err.is_not_found() {
                        self.clear_if_selected(id, err.clone());
                    }
                    return Err(err);
                }
            },
        };

        if !current.status.is_cancellable() {
            return Err(SyncError::invalid_state(format!(
                "task {} is already {}",
                id, current.status
            )));
        }

        match self.api.cancel_task(id).await {
            Ok(ack) => {
                info!(task_id = %id, "Task cancelled");
                let cancelled = current.as_cancelled();
                self.apply_cancelled(&cancelled);
                self.refresh_views(&cancelled).await;
                Ok(ack)
            }
            Err(e) => {
                let err = SyncError::from(e);
                if !err.is_not_found() {
                    return Err(err);
                }
                // Either gone, or it reached a terminal state first.
                let err = self.resolve_cancel_race(id, err).await;
                self.refresh_views(&current).await;
                Err(err)
            }
        }
    }

    async fn resolve_cancel_race(&self, id: &TaskId, not_found: SyncError) -> SyncError {
        match self.api.get_task(id).await {
            Ok(task) => {
                self.observe_record(&task);
                if task.is_terminal() {
                    SyncError::invalid_state(format!("task {} is already {}", id, task.status))
                } else {
                    not_found
                }
            }
            Err(e) => {
                let err = SyncError::from(e);
                if err.is_not_found() {
                    self.clear_if_selected(id, err.clone());
                    err
                } else {
                    not_found
                }
            }
        }
    }

    fn apply_cancelled(&self, cancelled: &Task) {
        let mut selection = self.lock();
        if !selection.matches(&cancelled.task_id) {
            return;
        }
        match self.policy {
            CancelSelectionPolicy::ShowTerminal => {
                // Drop selection fetches issued before the cancel.
                selection.generation += 1;
                selection.state.loading = false;
                selection.state.record = Some(cancelled.clone());
                selection.state.error = None;
            }
            CancelSelectionPolicy::Clear => selection.clear(),
        }
        self.publish(&selection);
    }

    fn clear_if_selected(&self, id: &TaskId, err: SyncError) {
        let mut selection = self.lock();
        if selection.matches(id) {
            selection.clear();
            selection.state.error = Some(err);
            self.publish(&selection);
        }
    }

    /// Show the local terminal record in every view that holds it, then
    /// force a refresh that bypasses any outstanding fetch.
    async fn refresh_views(&self, record: &Task) {
        for view in self.live_views() {
            if record.is_terminal() {
                view.replace_record(record.clone());
            }
            view.invalidate();
            if let Err(e) = view.refresh().await {
                warn!(task_id = %record.task_id, "Refresh after cancel failed: {}", e);
            }
        }
    }
}

impl RecordObserver<Task> for Reconciler {
    fn observe(&self, records: &[Task]) {
        let selected = self.selected_id();
        if let Some(task) = selected.and_then(|id| records.iter().find(|t| t.task_id == id)) {
            self.observe_record(task);
        }
    }
}

#[async_trait]
impl PollTarget for Reconciler {
    async fn poll(&self) -> PollControl {
        self.refresh_selection().await
    }
}
