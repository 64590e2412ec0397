//! Detection and event records produced by video analysis.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::timestamp;
use crate::video::VideoId;

/// Objects detected in a single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    pub id: i64,
    pub video_id: VideoId,
    pub frame_number: u64,
    /// Detector output, one entry per object (opaque)
    #[serde(default)]
    pub objects: Vec<serde_json::Value>,
    /// Seconds from the start of the video
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(with = "timestamp::flexible")]
    #[schemars(with = "DateTime<Utc>")]
    pub created_at: DateTime<Utc>,
}

/// Response of `GET /videos/{id}/detections`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionsResponse {
    pub video_id: VideoId,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

/// A higher-level event derived from detections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Event {
    pub id: i64,
    pub video_id: VideoId,
    pub event_type: String,
    #[serde(default)]
    pub frame_number: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
    #[serde(with = "timestamp::flexible")]
    #[schemars(with = "DateTime<Utc>")]
    pub created_at: DateTime<Utc>,
}

/// Response of `GET /videos/{id}/events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsResponse {
    pub video_id: VideoId,
    #[serde(default)]
    pub events: Vec<Event>,
}

/// Inclusive frame window for detection queries. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameRange {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl FrameRange {
    pub fn new(start: Option<u64>, end: Option<u64>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, frame: u64) -> bool {
        self.start.map_or(true, |s| frame >= s) && self.end.map_or(true, |e| frame <= e)
    }

    /// A range whose start lies after its end matches nothing.
    pub fn is_empty(&self) -> bool {
        matches!((self.start, self.end), (Some(s), Some(e)) if s > e)
    }

    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(start) = self.start {
            params.push(("frame_start", start.to_string()));
        }
        if let Some(end) = self.end {
            params.push(("frame_end", end.to_string()));
        }
        params
    }
}
