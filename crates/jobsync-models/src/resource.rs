//! Resource abstraction shared by videos and tasks.

use std::fmt;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ModelResult;

/// Kind of server-owned resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Video,
    Task,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Video => "video",
            ResourceKind::Task => "task",
        }
    }

    /// Collection path relative to the API prefix.
    pub fn collection_path(&self) -> &'static str {
        match self {
            ResourceKind::Video => "/videos/",
            ResourceKind::Task => "/tasks/",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A server-owned record with an identity and a lifecycle status.
pub trait Resource: Clone + fmt::Debug + Send + Sync + 'static {
    type Id: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;
    type Status: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static;

    const KIND: ResourceKind;

    fn id(&self) -> &Self::Id;

    fn status(&self) -> Self::Status;

    fn updated_at(&self) -> DateTime<Utc>;

    /// Check the record-level invariants of the data model.
    fn check_invariants(&self) -> ModelResult<()>;
}

/// Result of executing one collection query: one page plus the total count.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<R> {
    pub items: Vec<R>,
    pub total: u64,
}

impl<R> Default for Snapshot<R> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

impl<R: Resource> Snapshot<R> {
    pub fn new(items: Vec<R>, total: u64) -> Self {
        // The reported count can lag the page it came with.
        let total = total.max(items.len() as u64);
        Self { items, total }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Find an item by id.
    pub fn find(&self, id: &R::Id) -> Option<&R> {
        self.items.iter().find(|item| item.id() == id)
    }

    /// Replace the item with the same id, returning whether one was found.
    pub fn replace(&mut self, record: R) -> bool {
        match self.items.iter_mut().find(|item| item.id() == record.id()) {
            Some(slot) => {
                *slot = record;
                true
            }
            None => false,
        }
    }

    /// Number of pages for the given page size (at least one).
    pub fn page_count(&self, limit: u32) -> u64 {
        let limit = u64::from(limit.max(1));
        self.total.div_ceil(limit).max(1)
    }
}

/// Service health report.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self.status.as_str(), "healthy" | "ok")
    }
}
