//! Shared data models for JobSync clients.
//!
//! This crate provides Serde-serializable types for:
//! - Videos and processing tasks as returned by the platform API
//! - Collection queries, patches and snapshots for paged listings
//! - Detection and event records produced by video analysis
//! - Request/response envelopes for the REST endpoints

pub mod analysis;
pub mod error;
pub mod query;
pub mod resource;
pub mod task;
pub mod timestamp;
pub mod video;

// Re-export common types
pub use analysis::{Detection, DetectionsResponse, Event, EventsResponse, FrameRange};
pub use error::{ModelError, ModelResult};
pub use query::{CollectionQuery, QueryPatch};
pub use resource::{HealthStatus, Resource, ResourceKind, Snapshot};
pub use task::{CancelAck, ProcessRequest, Task, TaskId, TaskOutcome, TaskPage, TaskStatus, TaskTicket, TaskType};
pub use video::{UploadReceipt, Video, VideoId, VideoPage, VideoStatus};
