//! Engine metrics.

use metrics::counter;

/// Metric name constants.
pub mod names {
    /// Responses discarded because their query was superseded or the view closed.
    pub const STALE_RESPONSES_TOTAL: &str = "jobsync_view_stale_responses_total";

    /// Poll ticks skipped because the previous refresh was still outstanding.
    pub const POLL_TICKS_SKIPPED_TOTAL: &str = "jobsync_poll_ticks_skipped_total";
}

pub fn record_stale_response(view: &'static str) {
    counter!(names::STALE_RESPONSES_TOTAL, "view" => view).increment(1);
}

pub fn record_skipped_tick(scheduler: &str) {
    counter!(names::POLL_TICKS_SKIPPED_TOTAL, "scheduler" => scheduler.to_string()).increment(1);
}
