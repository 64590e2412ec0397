//! Processing task models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::resource::{Resource, ResourceKind, Snapshot};
use crate::timestamp;
use crate::video::VideoId;

/// Server-assigned task identifier (never reused).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, as shown in compact listings.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Task lifecycle status.
///
/// `pending -> queued -> running -> {completed | failed | cancelled}`;
/// `pending` and `queued` may also go straight to `cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: &'static [TaskStatus] = &[
        TaskStatus::Pending,
        TaskStatus::Queued,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// No further transitions are defined from a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether a cancel request is legal from this status.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            TaskStatus::Pending | TaskStatus::Queued | TaskStatus::Running
        )
    }

    /// Whether `next` is a legal successor of this status.
    ///
    /// Steps may be skipped (a poll can miss `queued`), but never reversed.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (a, b) if *a == b => true,
            (Pending, Queued | Running | Completed | Failed | Cancelled) => true,
            (Queued, Running | Completed | Failed | Cancelled) => true,
            (Running, Completed | Failed | Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "queued" => Ok(TaskStatus::Queued),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" | "canceled" => Ok(TaskStatus::Cancelled),
            _ => Err(ModelError::UnknownStatus {
                kind: "task",
                value: s.to_string(),
            }),
        }
    }
}

/// Kind of work a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    Analysis,
    Annotation,
    Training,
    #[serde(other)]
    Other,
}

impl TaskType {
    pub const KNOWN: &'static [TaskType] =
        &[TaskType::Analysis, TaskType::Annotation, TaskType::Training];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Analysis => "analysis",
            TaskType::Annotation => "annotation",
            TaskType::Training => "training",
            TaskType::Other => "other",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "analysis" => Ok(TaskType::Analysis),
            "annotation" => Ok(TaskType::Annotation),
            "training" => Ok(TaskType::Training),
            _ => Err(ModelError::UnknownTaskType(s.to_string())),
        }
    }
}

/// A background processing task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Task {
    pub task_id: TaskId,

    #[serde(default)]
    pub status: TaskStatus,

    /// Progress percentage (0-100)
    #[serde(default)]
    pub progress: f64,

    /// Opaque success payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,

    /// Video that spawned this task, when the server reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<VideoId>,

    #[serde(with = "timestamp::flexible")]
    #[schemars(with = "DateTime<Utc>")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "timestamp::flexible")]
    #[schemars(with = "DateTime<Utc>")]
    pub updated_at: DateTime<Utc>,
}

/// What a task produced, derived from `result` / `error_message`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaskOutcome<'a> {
    Success(&'a serde_json::Value),
    Failure(&'a str),
    None,
}

impl Task {
    /// Create a fresh pending task record.
    pub fn new(task_id: impl Into<TaskId>) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Pending,
            progress: 0.0,
            result: None,
            error_message: None,
            task_type: None,
            video_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn outcome(&self) -> TaskOutcome<'_> {
        match (&self.result, &self.error_message) {
            (Some(result), _) => TaskOutcome::Success(result),
            (None, Some(message)) => TaskOutcome::Failure(message),
            (None, None) => TaskOutcome::None,
        }
    }

    /// Local copy marked as cancelled, keeping the server timestamps so that
    /// the next server record for this id supersedes it.
    pub fn as_cancelled(&self) -> Self {
        Self {
            status: TaskStatus::Cancelled,
            result: None,
            error_message: None,
            ..self.clone()
        }
    }
}

impl Resource for Task {
    type Id = TaskId;
    type Status = TaskStatus;

    const KIND: ResourceKind = ResourceKind::Task;

    fn id(&self) -> &TaskId {
        &self.task_id
    }

    fn status(&self) -> TaskStatus {
        self.status
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn check_invariants(&self) -> ModelResult<()> {
        let violation =
            |reason: &str| -> ModelResult<()> { Err(ModelError::invariant("task", &self.task_id, reason)) };

        if !(0.0..=100.0).contains(&self.progress) {
            return violation("progress outside [0, 100]");
        }
        if self.result.is_some() && self.error_message.is_some() {
            return violation("both result and error_message present");
        }
        if self.result.is_some() && self.status != TaskStatus::Completed {
            return violation("result present on a task that has not completed");
        }
        if self.error_message.is_some() && self.status != TaskStatus::Failed {
            return violation("error_message present on a task that has not failed");
        }
        if self.updated_at < self.created_at {
            return violation("updated_at precedes created_at");
        }
        Ok(())
    }
}

/// Wire envelope of `GET /tasks/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub count: u64,
}

impl From<TaskPage> for Snapshot<Task> {
    fn from(page: TaskPage) -> Self {
        Snapshot::new(page.tasks, page.count)
    }
}

/// Body of `POST /videos/{id}/process`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProcessRequest {
    pub process_type: TaskType,
}

/// Response of `POST /videos/{id}/process`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskTicket {
    pub task_id: TaskId,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `DELETE /tasks/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CancelAck {
    #[serde(default)]
    pub message: String,
}
