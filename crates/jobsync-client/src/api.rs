//! The resource API seam.

use async_trait::async_trait;
use futures::future::BoxFuture;
use jobsync_models::{
    CancelAck, CollectionQuery, Detection, Event, FrameRange, HealthStatus, Resource, Snapshot,
    Task, TaskId, TaskStatus, TaskTicket, TaskType, UploadReceipt, Video, VideoId, VideoStatus,
};

use crate::error::ClientResult;
use crate::upload::VideoUpload;

/// Request/response operations against the platform API.
///
/// Implementations do no caching; every call is one remote operation.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    async fn list_videos(&self, query: &CollectionQuery<VideoStatus>) -> ClientResult<Snapshot<Video>>;

    async fn list_tasks(&self, query: &CollectionQuery<TaskStatus>) -> ClientResult<Snapshot<Task>>;

    async fn get_video(&self, id: &VideoId) -> ClientResult<Video>;

    async fn get_task(&self, id: &TaskId) -> ClientResult<Task>;

    /// Upload a video. Implementations validate the payload before any I/O.
    async fn upload_video(&self, upload: VideoUpload) -> ClientResult<UploadReceipt>;

    /// Request processing of an uploaded video; the server creates a task.
    async fn process_video(&self, id: &VideoId, process_type: TaskType) -> ClientResult<TaskTicket>;

    async fn cancel_task(&self, id: &TaskId) -> ClientResult<CancelAck>;

    async fn health(&self) -> ClientResult<HealthStatus>;

    async fn video_detections(&self, id: &VideoId, frames: FrameRange) -> ClientResult<Vec<Detection>>;

    async fn video_events(&self, id: &VideoId, event_type: Option<&str>) -> ClientResult<Vec<Event>>;
}

/// A resource kind that can be listed through [`ResourceApi`].
pub trait Fetchable: Resource {
    fn list<'a>(
        api: &'a dyn ResourceApi,
        query: &'a CollectionQuery<Self::Status>,
    ) -> BoxFuture<'a, ClientResult<Snapshot<Self>>>;
}

impl Fetchable for Video {
    fn list<'a>(
        api: &'a dyn ResourceApi,
        query: &'a CollectionQuery<VideoStatus>,
    ) -> BoxFuture<'a, ClientResult<Snapshot<Video>>> {
        api.list_videos(query)
    }
}

impl Fetchable for Task {
    fn list<'a>(
        api: &'a dyn ResourceApi,
        query: &'a CollectionQuery<TaskStatus>,
    ) -> BoxFuture<'a, ClientResult<Snapshot<Task>>> {
        api.list_tasks(query)
    }
}
