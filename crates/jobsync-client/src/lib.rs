//! Resource client for the video processing platform API.
//!
//! This crate provides:
//! - The [`ResourceApi`] trait consumed by the synchronization engine
//! - A reqwest-backed implementation with typed errors and retries for reads
//! - Client-side upload validation (media type and size ceiling)
//! - Request metrics through the `metrics` facade

pub mod api;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod retry;
pub mod upload;

pub use api::{Fetchable, ResourceApi};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use http::HttpResourceClient;
pub use retry::{with_retry, RetryConfig};
pub use upload::{format_bytes, media_type_for, UploadLimits, VideoUpload, DEFAULT_MAX_UPLOAD_BYTES};
