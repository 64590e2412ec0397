//! Engine configuration.

use std::time::Duration;

use jobsync_client::UploadLimits;
use jobsync_models::query::DEFAULT_PAGE_SIZE;

use crate::reconciler::CancelSelectionPolicy;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Period of list and selection polling
    pub poll_interval: Duration,
    /// Page size of collection views
    pub page_size: u32,
    /// What a matching selection shows after a successful cancel
    pub cancel_selection: CancelSelectionPolicy,
    /// Client-side upload checks run by the submission pipeline
    pub upload: UploadLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            page_size: DEFAULT_PAGE_SIZE,
            cancel_selection: CancelSelectionPolicy::default(),
            upload: UploadLimits::default(),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            poll_interval: Duration::from_secs(
                std::env::var("JOBSYNC_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|secs: &u64| *secs > 0)
                    .unwrap_or(5),
            ),
            page_size: std::env::var("JOBSYNC_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|size: &u32| *size > 0)
                .unwrap_or(DEFAULT_PAGE_SIZE),
            cancel_selection: std::env::var("JOBSYNC_CANCEL_SELECTION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            upload: UploadLimits::from_env(),
        }
    }
}
