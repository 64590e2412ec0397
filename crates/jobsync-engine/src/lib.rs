//! Lifecycle synchronization engine for long-running processing tasks.
//!
//! This crate provides:
//! - Paginated collection views with last-query-wins fetch ordering
//! - Cancellable poll schedulers that never stack refreshes
//! - A reconciler keeping the selected task aligned with fresh records
//! - The two-phase upload and processing submission pipeline
//! - Composed task and video monitors

pub mod config;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod pipeline;
pub mod reconciler;
pub mod scheduler;
pub mod view;

pub use config::EngineConfig;
pub use error::{SyncError, SyncResult};
pub use monitor::{TaskMonitor, VideoLibrary};
pub use pipeline::{Submission, SubmissionPhase, SubmissionPipeline};
pub use reconciler::{CancelSelectionPolicy, Reconciler, SelectionState};
pub use scheduler::{PollControl, PollScheduler, PollTarget};
pub use view::{CollectionView, FetchOutcome, RecordObserver, ViewState};
