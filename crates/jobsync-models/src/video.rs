//! Video models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::resource::{Resource, ResourceKind, Snapshot};
use crate::timestamp;

/// Opaque video identifier.
///
/// The API emits integer ids; both JSON numbers and strings are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<i64> for VideoId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

impl<'de> Deserialize<'de> for VideoId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(n) => VideoId(n.to_string()),
            Raw::Text(s) => VideoId(s),
        })
    }
}

/// Video lifecycle status.
///
/// Moves forward only (`uploaded -> processing -> completed`), except that
/// `failed` is reachable from any other status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    #[default]
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl VideoStatus {
    pub const ALL: &'static [VideoStatus] = &[
        VideoStatus::Uploaded,
        VideoStatus::Processing,
        VideoStatus::Completed,
        VideoStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Uploaded => "uploaded",
            VideoStatus::Processing => "processing",
            VideoStatus::Completed => "completed",
            VideoStatus::Failed => "failed",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            VideoStatus::Uploaded => 0,
            VideoStatus::Processing => 1,
            VideoStatus::Completed => 2,
            VideoStatus::Failed => 3,
        }
    }

    pub fn can_transition_to(&self, next: VideoStatus) -> bool {
        *self == next || next == VideoStatus::Failed || next.rank() > self.rank()
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VideoStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uploaded" => Ok(VideoStatus::Uploaded),
            "processing" => Ok(VideoStatus::Processing),
            "completed" => Ok(VideoStatus::Completed),
            "failed" => Ok(VideoStatus::Failed),
            _ => Err(ModelError::UnknownStatus {
                kind: "video",
                value: s.to_string(),
            }),
        }
    }
}

/// An uploaded video as held by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Video {
    pub id: VideoId,

    /// Display name (the name the file was uploaded with)
    pub original_name: String,

    /// Storage filename
    pub filename: String,

    #[serde(default)]
    pub status: VideoStatus,

    /// Size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(with = "timestamp::flexible")]
    #[schemars(with = "DateTime<Utc>")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "timestamp::flexible")]
    #[schemars(with = "DateTime<Utc>")]
    pub updated_at: DateTime<Utc>,
}

impl Video {
    pub fn display_name(&self) -> &str {
        &self.original_name
    }

    /// Whether the record was touched after creation.
    pub fn was_updated(&self) -> bool {
        self.updated_at != self.created_at
    }
}

impl Resource for Video {
    type Id = VideoId;
    type Status = VideoStatus;

    const KIND: ResourceKind = ResourceKind::Video;

    fn id(&self) -> &VideoId {
        &self.id
    }

    fn status(&self) -> VideoStatus {
        self.status
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn check_invariants(&self) -> ModelResult<()> {
        if self.updated_at < self.created_at {
            return Err(ModelError::invariant(
                "video",
                &self.id,
                "updated_at precedes created_at",
            ));
        }
        Ok(())
    }
}

/// Wire envelope of `GET /videos/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoPage {
    pub videos: Vec<Video>,
    #[serde(default)]
    pub count: u64,
}

impl From<VideoPage> for Snapshot<Video> {
    fn from(page: VideoPage) -> Self {
        Snapshot::new(page.videos, page.count)
    }
}

/// Response of `POST /videos/upload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UploadReceipt {
    pub id: VideoId,
    pub filename: String,
    #[serde(default)]
    pub status: VideoStatus,
    #[serde(default)]
    pub message: Option<String>,
}
