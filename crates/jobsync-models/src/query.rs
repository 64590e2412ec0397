//! Collection queries for paged listings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::task::TaskType;

/// Default page size used by listings.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// A request descriptor for one page of a collection.
///
/// Two queries are equivalent when every field matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionQuery<S> {
    skip: u64,
    limit: u32,
    status: Option<S>,
    task_type: Option<TaskType>,
    search: Option<String>,
}

impl<S> Default for CollectionQuery<S> {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_PAGE_SIZE,
            status: None,
            task_type: None,
            search: None,
        }
    }
}

impl<S> CollectionQuery<S> {
    /// Create a first-page query with the given page size (at least 1).
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: S) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn skip(&self) -> u64 {
        self.skip
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn status(&self) -> Option<&S> {
        self.status.as_ref()
    }

    pub fn task_type(&self) -> Option<TaskType> {
        self.task_type
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    /// Zero-based page index derived from `skip`.
    pub fn page(&self) -> u64 {
        self.skip / u64::from(self.limit)
    }

    /// Move to a page, leaving the filters untouched.
    pub fn set_page(&mut self, page: u64) {
        self.skip = page.saturating_mul(u64::from(self.limit));
    }

    /// Merge a patch into this query. Any patch resets to the first page.
    pub fn apply(&mut self, patch: QueryPatch<S>) {
        if let Some(limit) = patch.limit {
            self.limit = limit.max(1);
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(task_type) = patch.task_type {
            self.task_type = task_type;
        }
        if let Some(search) = patch.search {
            self.search = search.filter(|s| !s.trim().is_empty());
        }
        self.skip = 0;
    }
}

impl<S: fmt::Display> CollectionQuery<S> {
    /// Query-string parameters in wire order.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("skip", self.skip.to_string()),
            ("limit", self.limit.to_string()),
        ];
        if let Some(status) = &self.status {
            params.push(("status_filter", status.to_string()));
        }
        if let Some(task_type) = self.task_type {
            params.push(("task_type", task_type.to_string()));
        }
        if let Some(search) = &self.search {
            params.push(("search", search.clone()));
        }
        params
    }
}

/// A partial query update.
///
/// `None` leaves a field untouched; `Some(None)` clears a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPatch<S> {
    pub limit: Option<u32>,
    pub status: Option<Option<S>>,
    pub task_type: Option<Option<TaskType>>,
    pub search: Option<Option<String>>,
}

impl<S> Default for QueryPatch<S> {
    fn default() -> Self {
        Self {
            limit: None,
            status: None,
            task_type: None,
            search: None,
        }
    }
}

impl<S> QueryPatch<S> {
    pub fn status(status: Option<S>) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn task_type(task_type: Option<TaskType>) -> Self {
        Self {
            task_type: Some(task_type),
            ..Self::default()
        }
    }

    pub fn search(search: Option<String>) -> Self {
        Self {
            search: Some(search),
            ..Self::default()
        }
    }

    pub fn limit(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }
}
