//! Two-phase submission: upload a video, then request its processing.
//!
//! The phases fail independently. A failed processing request leaves the
//! uploaded video in place and can be retried on its own.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use jobsync_client::{ResourceApi, UploadLimits, VideoUpload};
use jobsync_models::{TaskId, TaskTicket, TaskType, UploadReceipt, VideoId};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{SyncError, SyncResult};

/// Videos whose phase is remembered; the least recently updated go first.
const DEFAULT_PHASE_HISTORY: usize = 256;

/// Where a submitted video stands, as far as this pipeline knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionPhase {
    Uploaded,
    Requesting,
    Processing { task_id: TaskId },
    ProcessingFailed { error: SyncError },
}

impl SubmissionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionPhase::Uploaded => "uploaded",
            SubmissionPhase::Requesting => "requesting",
            SubmissionPhase::Processing { .. } => "processing",
            SubmissionPhase::ProcessingFailed { .. } => "processing_failed",
        }
    }
}

/// Outcome of [`SubmissionPipeline::submit`]: the upload succeeded, the
/// processing request may not have.
#[derive(Debug, Clone)]
pub struct Submission {
    pub receipt: UploadReceipt,
    pub processing: SyncResult<TaskTicket>,
}

/// Removes a video from the in-flight set when its request settles.
struct RequestGuard<'a> {
    pipeline: &'a SubmissionPipeline,
    video_id: VideoId,
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        self.pipeline.requests().remove(&self.video_id);
    }
}

/// Sequences uploads and processing requests.
pub struct SubmissionPipeline {
    api: Arc<dyn ResourceApi>,
    limits: UploadLimits,
    in_flight: Mutex<HashSet<VideoId>>,
    phases: watch::Sender<HashMap<VideoId, SubmissionPhase>>,
    /// Phase map keys, least recently updated first
    recency: Mutex<VecDeque<VideoId>>,
    history: usize,
}

impl SubmissionPipeline {
    pub fn new(api: Arc<dyn ResourceApi>, limits: UploadLimits) -> Self {
        let (phases, _) = watch::channel(HashMap::new());
        Self {
            api,
            limits,
            in_flight: Mutex::new(HashSet::new()),
            phases,
            recency: Mutex::new(VecDeque::new()),
            history: DEFAULT_PHASE_HISTORY,
        }
    }

    /// Remember phases for at most `history` videos.
    pub fn with_phase_history(mut self, history: usize) -> Self {
        self.history = history.max(1);
        self
    }

    fn requests(&self) -> MutexGuard<'_, HashSet<VideoId>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, video_id: &VideoId, phase: SubmissionPhase) {
        let mut recency = self.recency.lock().unwrap_or_else(PoisonError::into_inner);
        recency.retain(|id| id != video_id);
        recency.push_back(video_id.clone());
        let excess = recency.len().saturating_sub(self.history);
        let evicted: Vec<VideoId> = recency.drain(..excess).collect();

        self.phases.send_modify(|phases| {
            phases.insert(video_id.clone(), phase);
            for id in &evicted {
                phases.remove(id);
            }
        });
    }

    /// Subscribe to per-video phase changes.
    pub fn subscribe(&self) -> watch::Receiver<HashMap<VideoId, SubmissionPhase>> {
        self.phases.subscribe()
    }

    pub fn phase(&self, video_id: &VideoId) -> Option<SubmissionPhase> {
        self.phases.borrow().get(video_id).cloned()
    }

    pub fn is_requesting(&self, video_id: &VideoId) -> bool {
        self.requests().contains(video_id)
    }

    /// Phase 1: upload. Type and size are checked before any I/O.
    pub async fn upload(&self, upload: VideoUpload) -> SyncResult<UploadReceipt> {
        self.limits.validate(&upload)?;

        let filename = upload.filename().to_string();
        let receipt = self.api.upload_video(upload).await?;
        info!(video_id = %receipt.id, filename = %filename, "Video uploaded");

        self.set_phase(&receipt.id, SubmissionPhase::Uploaded);
        Ok(receipt)
    }

    /// Phase 2: request processing of an uploaded video.
    ///
    /// A second request for a video whose request is still pending is
    /// rejected with `AlreadyInProgress` without a network call.
    pub async fn request_processing(
        &self,
        video_id: &VideoId,
        process_type: TaskType,
    ) -> SyncResult<TaskTicket> {
        if !self.requests().insert(video_id.clone()) {
            return Err(SyncError::already_in_progress(format!(
                "processing request for video {} is pending",
                video_id
            )));
        }
        let _guard = RequestGuard {
            pipeline: self,
            video_id: video_id.clone(),
        };

        self.set_phase(video_id, SubmissionPhase::Requesting);

        match self.api.process_video(video_id, process_type).await {
            Ok(ticket) => {
                info!(
                    video_id = %video_id,
                    task_id = %ticket.task_id,
                    process_type = %process_type,
                    "Processing requested"
                );
                self.set_phase(
                    video_id,
                    SubmissionPhase::Processing {
                        task_id: ticket.task_id.clone(),
                    },
                );
                Ok(ticket)
            }
            Err(e) => {
                let error = SyncError::from(e);
                warn!(video_id = %video_id, "Processing request failed: {}", error);
                self.set_phase(
                    video_id,
                    SubmissionPhase::ProcessingFailed {
                        error: error.clone(),
                    },
                );
                Err(error)
            }
        }
    }

    /// Run both phases. Fails only if the upload fails; the processing
    /// outcome is reported separately.
    pub async fn submit(&self, upload: VideoUpload, process_type: TaskType) -> SyncResult<Submission> {
        let receipt = self.upload(upload).await?;
        let processing = self.request_processing(&receipt.id, process_type).await;
        Ok(Submission { receipt, processing })
    }
}
