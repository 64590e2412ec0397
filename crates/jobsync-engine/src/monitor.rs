//! Composed monitors over the engine parts.
//!
//! [`TaskMonitor`] wires a task view, a reconciler and two schedulers
//! together. [`VideoLibrary`] pairs a video view with the submission
//! pipeline.

use std::sync::Arc;

use jobsync_client::{ResourceApi, VideoUpload};
use jobsync_models::{
    CancelAck, CollectionQuery, QueryPatch, Task, TaskId, TaskStatus, TaskTicket, TaskType,
    UploadReceipt, Video, VideoId, VideoStatus,
};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::SyncResult;
use crate::pipeline::{Submission, SubmissionPhase, SubmissionPipeline};
use crate::reconciler::{Reconciler, SelectionState};
use crate::scheduler::{PollScheduler, PollTarget};
use crate::view::{CollectionView, FetchOutcome, ViewState};

/// Task list plus one selected task, both kept fresh by polling.
///
/// List polling runs while auto-refresh is on. Selection polling runs
/// while a non-terminal task is selected and stops on its own once the
/// task reaches a terminal status.
pub struct TaskMonitor {
    view: Arc<CollectionView<Task>>,
    reconciler: Arc<Reconciler>,
    list_poller: PollScheduler,
    selection_poller: PollScheduler,
}

impl TaskMonitor {
    pub fn new(api: Arc<dyn ResourceApi>, config: &EngineConfig) -> Self {
        Self::with_query(api, config, CollectionQuery::new(config.page_size))
    }

    pub fn with_query(
        api: Arc<dyn ResourceApi>,
        config: &EngineConfig,
        query: CollectionQuery<TaskStatus>,
    ) -> Self {
        let view = Arc::new(CollectionView::new(Arc::clone(&api), query));
        let reconciler = Arc::new(Reconciler::new(api, config.cancel_selection));
        reconciler.attach(&view);

        let list_target: Arc<dyn PollTarget> = view.clone();
        let selection_target: Arc<dyn PollTarget> = reconciler.clone();

        Self {
            list_poller: PollScheduler::new("task_list", config.poll_interval, list_target),
            selection_poller: PollScheduler::new(
                "task_selection",
                config.poll_interval,
                selection_target,
            ),
            view,
            reconciler,
        }
    }

    pub fn view(&self) -> &Arc<CollectionView<Task>> {
        &self.view
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn list_poller(&self) -> &PollScheduler {
        &self.list_poller
    }

    pub fn selection_poller(&self) -> &PollScheduler {
        &self.selection_poller
    }

    pub fn state(&self) -> ViewState<Task> {
        self.view.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState<Task>> {
        self.view.subscribe()
    }

    pub fn selection(&self) -> SelectionState {
        self.reconciler.state()
    }

    pub fn subscribe_selection(&self) -> watch::Receiver<SelectionState> {
        self.reconciler.subscribe()
    }

    /// Load the first snapshot and start list polling. Polling starts even
    /// when the initial load fails.
    pub async fn start(&self) -> SyncResult<FetchOutcome> {
        let outcome = self.view.refresh().await;
        self.list_poller.start();
        outcome
    }

    pub fn set_auto_refresh(&self, enabled: bool) {
        if enabled {
            self.list_poller.start();
        } else {
            self.list_poller.stop();
        }
    }

    pub fn auto_refresh(&self) -> bool {
        self.list_poller.is_running()
    }

    pub async fn set_filter(&self, patch: QueryPatch<TaskStatus>) -> SyncResult<FetchOutcome> {
        self.view.set_filter(patch).await
    }

    pub async fn set_page(&self, page: u64) -> SyncResult<FetchOutcome> {
        self.view.set_page(page).await
    }

    pub async fn refresh(&self) -> SyncResult<FetchOutcome> {
        self.view.refresh().await
    }

    /// Select a task and keep it polled until it is terminal.
    pub async fn select(&self, id: TaskId) -> SyncResult<Task> {
        let result = self.reconciler.select(id).await;
        match &result {
            Ok(task) if task.is_terminal() => self.selection_poller.stop(),
            Err(e) if e.is_not_found() => self.selection_poller.stop(),
            // Transient failures keep polling so the selection recovers.
            _ => self.selection_poller.start(),
        }
        result
    }

    pub fn clear(&self) {
        self.selection_poller.stop();
        self.reconciler.clear();
    }

    pub async fn cancel(&self, id: &TaskId) -> SyncResult<CancelAck> {
        let result = self.reconciler.cancel(id).await;
        let selection = self.reconciler.state();
        if selection.selected.is_none() || selection.is_terminal() {
            self.selection_poller.stop();
        }
        result
    }

    /// Stop both schedulers and tear the view down.
    pub async fn shutdown(&self) {
        self.selection_poller.shutdown().await;
        self.list_poller.shutdown().await;
        self.view.close();
        info!("Task monitor stopped");
    }
}

/// Video list plus the two-phase submission flow.
pub struct VideoLibrary {
    view: Arc<CollectionView<Video>>,
    pipeline: SubmissionPipeline,
    poller: PollScheduler,
}

impl VideoLibrary {
    pub fn new(api: Arc<dyn ResourceApi>, config: &EngineConfig) -> Self {
        let view = Arc::new(CollectionView::new(
            Arc::clone(&api),
            CollectionQuery::new(config.page_size),
        ));
        let target: Arc<dyn PollTarget> = view.clone();

        Self {
            poller: PollScheduler::new("video_list", config.poll_interval, target),
            pipeline: SubmissionPipeline::new(api, config.upload.clone()),
            view,
        }
    }

    pub fn view(&self) -> &Arc<CollectionView<Video>> {
        &self.view
    }

    pub fn pipeline(&self) -> &SubmissionPipeline {
        &self.pipeline
    }

    pub fn state(&self) -> ViewState<Video> {
        self.view.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState<Video>> {
        self.view.subscribe()
    }

    pub fn phase(&self, video_id: &VideoId) -> Option<SubmissionPhase> {
        self.pipeline.phase(video_id)
    }

    pub async fn start(&self) -> SyncResult<FetchOutcome> {
        let outcome = self.view.refresh().await;
        self.poller.start();
        outcome
    }

    pub fn set_auto_refresh(&self, enabled: bool) {
        if enabled {
            self.poller.start();
        } else {
            self.poller.stop();
        }
    }

    pub async fn set_filter(&self, patch: QueryPatch<VideoStatus>) -> SyncResult<FetchOutcome> {
        self.view.set_filter(patch).await
    }

    pub async fn set_page(&self, page: u64) -> SyncResult<FetchOutcome> {
        self.view.set_page(page).await
    }

    pub async fn refresh(&self) -> SyncResult<FetchOutcome> {
        self.view.refresh().await
    }

    pub async fn upload(&self, upload: VideoUpload) -> SyncResult<UploadReceipt> {
        let receipt = self.pipeline.upload(upload).await?;
        self.refresh_after_change().await;
        Ok(receipt)
    }

    pub async fn request_processing(
        &self,
        video_id: &VideoId,
        process_type: TaskType,
    ) -> SyncResult<TaskTicket> {
        let ticket = self.pipeline.request_processing(video_id, process_type).await?;
        self.refresh_after_change().await;
        Ok(ticket)
    }

    pub async fn submit(&self, upload: VideoUpload, process_type: TaskType) -> SyncResult<Submission> {
        let submission = self.pipeline.submit(upload, process_type).await?;
        self.refresh_after_change().await;
        Ok(submission)
    }

    async fn refresh_after_change(&self) {
        if self.view.is_closed() {
            return;
        }
        self.view.invalidate();
        if let Err(e) = self.view.refresh().await {
            warn!("Video list refresh after submission failed: {}", e);
        }
    }

    pub async fn shutdown(&self) {
        self.poller.shutdown().await;
        self.view.close();
        info!("Video library stopped");
    }
}
