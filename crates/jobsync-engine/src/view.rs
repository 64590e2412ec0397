//! Paginated collection views.
//!
//! A [`CollectionView`] holds a filtered, paged window over one resource
//! kind. All mutation goes through a single mutex; network calls happen
//! outside of it. Every response is checked against the query revision it
//! was issued for, so a response for a superseded query is never applied.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use jobsync_client::{Fetchable, ResourceApi};
use jobsync_models::{CollectionQuery, QueryPatch, Resource, Snapshot};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::metrics::record_stale_response;
use crate::scheduler::{PollControl, PollTarget};

/// Receives every snapshot a view applies.
pub trait RecordObserver<R: Resource>: Send + Sync {
    fn observe(&self, records: &[R]);
}

/// What became of a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The response replaced the view's snapshot.
    Applied,
    /// The response belonged to a superseded query or a closed view.
    Discarded,
    /// An identical fetch was already outstanding and its response was
    /// applied; no request was issued. A failure of that fetch is returned
    /// to every caller that joined it.
    Coalesced,
}

/// Observable state of a view.
#[derive(Debug, Clone)]
pub struct ViewState<R: Resource> {
    pub query: CollectionQuery<R::Status>,
    pub snapshot: Snapshot<R>,
    pub loading: bool,
    /// Whether any snapshot has been applied yet
    pub loaded: bool,
    pub closed: bool,
    /// Last fetch error; cleared by the next successful fetch
    pub error: Option<SyncError>,
}

impl<R: Resource> ViewState<R> {
    pub fn items(&self) -> &[R] {
        &self.snapshot.items
    }

    pub fn page(&self) -> u64 {
        self.query.page()
    }

    pub fn page_count(&self) -> u64 {
        self.snapshot.page_count(self.query.limit())
    }

    pub fn has_next(&self) -> bool {
        self.page() + 1 < self.page_count()
    }

    pub fn has_previous(&self) -> bool {
        self.page() > 0
    }
}

/// Result of a fetch once it has settled, shared with coalesced callers.
type Settled = Option<SyncResult<FetchOutcome>>;

struct InFlight {
    seq: u64,
    revision: u64,
    done: watch::Receiver<Settled>,
}

struct Inner<R: Resource> {
    query: CollectionQuery<R::Status>,
    /// Bumped on every query change and on invalidation
    revision: u64,
    next_seq: u64,
    applied_seq: u64,
    in_flight: Option<InFlight>,
    snapshot: Snapshot<R>,
    loaded: bool,
    closed: bool,
    error: Option<SyncError>,
    observers: Vec<Weak<dyn RecordObserver<R>>>,
}

impl<R: Resource> Inner<R> {
    fn state(&self) -> ViewState<R> {
        ViewState {
            query: self.query.clone(),
            snapshot: self.snapshot.clone(),
            loading: self.in_flight.is_some(),
            loaded: self.loaded,
            closed: self.closed,
            error: self.error.clone(),
        }
    }

    /// Release the in-flight slot if `seq` still holds it.
    fn finish(&mut self, seq: u64) -> bool {
        if self.in_flight.as_ref().is_some_and(|f| f.seq == seq) {
            self.in_flight = None;
            true
        } else {
            false
        }
    }

    fn live_observers(&mut self) -> Vec<Arc<dyn RecordObserver<R>>> {
        self.observers.retain(|o| o.strong_count() > 0);
        self.observers.iter().filter_map(Weak::upgrade).collect()
    }
}

enum Start<S> {
    Join(watch::Receiver<Settled>),
    Issue {
        seq: u64,
        revision: u64,
        query: CollectionQuery<S>,
        done: watch::Sender<Settled>,
    },
}

/// Releases the in-flight slot when a fetch completes or is dropped, and
/// hands the outcome to coalesced callers.
struct FlightGuard<'a, R: Fetchable> {
    view: &'a CollectionView<R>,
    seq: u64,
    done: watch::Sender<Settled>,
    outcome: Settled,
}

impl<R: Fetchable> Drop for FlightGuard<'_, R> {
    fn drop(&mut self) {
        let mut inner = self.view.lock();
        if inner.finish(self.seq) {
            self.view.publish(&inner);
        }
        drop(inner);
        // A fetch dropped before settling applied nothing.
        let outcome = self.outcome.take().unwrap_or(Ok(FetchOutcome::Discarded));
        self.done.send_replace(Some(outcome));
    }
}

/// A filtered, paged window over one resource kind.
pub struct CollectionView<R: Fetchable> {
    api: Arc<dyn ResourceApi>,
    inner: Mutex<Inner<R>>,
    tx: watch::Sender<ViewState<R>>,
}

impl<R: Fetchable> CollectionView<R> {
    pub fn new(api: Arc<dyn ResourceApi>, query: CollectionQuery<R::Status>) -> Self {
        let inner = Inner {
            query,
            revision: 0,
            next_seq: 1,
            applied_seq: 0,
            in_flight: None,
            snapshot: Snapshot::default(),
            loaded: false,
            closed: false,
            error: None,
            observers: Vec::new(),
        };
        let (tx, _) = watch::channel(inner.state());

        Self {
            api,
            inner: Mutex::new(inner),
            tx,
        }
    }

    fn name(&self) -> &'static str {
        R::KIND.as_str()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<R>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &Inner<R>) {
        self.tx.send_replace(inner.state());
    }

    /// Subscribe to state changes. Do not hold a borrow of the receiver
    /// across calls into the view.
    pub fn subscribe(&self) -> watch::Receiver<ViewState<R>> {
        self.tx.subscribe()
    }

    pub fn state(&self) -> ViewState<R> {
        self.lock().state()
    }

    pub fn query(&self) -> CollectionQuery<R::Status> {
        self.lock().query.clone()
    }

    pub fn snapshot(&self) -> Snapshot<R> {
        self.lock().snapshot.clone()
    }

    /// Cached record with the given id, if the current page holds it.
    pub fn find(&self, id: &R::Id) -> Option<R> {
        self.lock().snapshot.find(id).cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Register an observer of applied snapshots. Held weakly.
    pub fn add_observer(&self, observer: Weak<dyn RecordObserver<R>>) {
        self.lock().observers.push(observer);
    }

    /// Merge a filter patch into the query, reset to the first page and fetch.
    pub async fn set_filter(&self, patch: QueryPatch<R::Status>) -> SyncResult<FetchOutcome> {
        {
            let mut inner = self.lock();
            if inner.closed {
                return Err(self.closed_error());
            }
            inner.query.apply(patch);
            inner.revision += 1;
            self.publish(&inner);
        }
        self.fetch().await
    }

    /// Move to a page and fetch. Once the total is known the index is
    /// clamped to the last page; page 0 is always valid.
    pub async fn set_page(&self, page: u64) -> SyncResult<FetchOutcome> {
        {
            let mut inner = self.lock();
            if inner.closed {
                return Err(self.closed_error());
            }
            let page = if inner.loaded {
                page.min(inner.snapshot.page_count(inner.query.limit()) - 1)
            } else {
                page
            };
            let before = inner.query.skip();
            inner.query.set_page(page);
            if inner.query.skip() != before {
                inner.revision += 1;
                self.publish(&inner);
            }
        }
        self.fetch().await
    }

    /// Re-issue the current query.
    pub async fn refresh(&self) -> SyncResult<FetchOutcome> {
        self.fetch().await
    }

    /// Treat the current query as new: an outstanding response will be
    /// discarded and the next refresh always issues a request.
    pub fn invalidate(&self) {
        let mut inner = self.lock();
        inner.revision += 1;
    }

    /// Replace a record already on the current page, returning whether it
    /// was present.
    pub fn replace_record(&self, record: R) -> bool {
        let mut inner = self.lock();
        if inner.closed {
            return false;
        }
        let replaced = inner.snapshot.replace(record);
        if replaced {
            self.publish(&inner);
        }
        replaced
    }

    /// Tear the view down. Outstanding responses are discarded and later
    /// operations fail with `Closed`.
    pub fn close(&self) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        inner.revision += 1;
        inner.in_flight = None;
        inner.observers.clear();
        self.publish(&inner);
        debug!(view = %self.name(), "View closed");
    }

    fn closed_error(&self) -> SyncError {
        SyncError::closed(format!("{} view", self.name()))
    }

    async fn fetch(&self) -> SyncResult<FetchOutcome> {
        let start = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(self.closed_error());
            }

            let joinable = inner
                .in_flight
                .as_ref()
                .filter(|flight| flight.revision == inner.revision)
                .map(|flight| flight.done.clone());

            match joinable {
                Some(done) => Start::Join(done),
                None => {
                    let seq = inner.next_seq;
                    let revision = inner.revision;
                    let (done, rx) = watch::channel(None);
                    inner.next_seq += 1;
                    inner.in_flight = Some(InFlight {
                        seq,
                        revision,
                        done: rx,
                    });
                    self.publish(&inner);
                    Start::Issue {
                        seq,
                        revision,
                        query: inner.query.clone(),
                        done,
                    }
                }
            }
        };

        let (seq, revision, query, done) = match start {
            Start::Join(mut done) => {
                // The guard always settles before its sender drops.
                let settled = match done.wait_for(Option::is_some).await {
                    Ok(settled) => (*settled).clone(),
                    Err(_) => None,
                };
                return match settled {
                    Some(Ok(FetchOutcome::Applied)) | None => Ok(FetchOutcome::Coalesced),
                    Some(other) => other,
                };
            }
            Start::Issue {
                seq,
                revision,
                query,
                done,
            } => (seq, revision, query, done),
        };

        let mut guard = FlightGuard {
            view: self,
            seq,
            done,
            outcome: None,
        };

        let result = R::list(self.api.as_ref(), &query).await;

        let (outcome, notify) = {
            let mut inner = self.lock();
            inner.finish(seq);

            if inner.closed || revision != inner.revision || seq < inner.applied_seq {
                debug!(
                    view = %self.name(),
                    seq,
                    revision,
                    current_revision = inner.revision,
                    "Discarding stale response"
                );
                record_stale_response(self.name());
                if !inner.closed {
                    self.publish(&inner);
                }
                guard.outcome = Some(Ok(FetchOutcome::Discarded));
                return Ok(FetchOutcome::Discarded);
            }

            inner.applied_seq = seq;
            match result {
                Ok(snapshot) => {
                    inner.snapshot = snapshot;
                    inner.loaded = true;
                    inner.error = None;
                    self.publish(&inner);
                    let observers = inner.live_observers();
                    let records = if observers.is_empty() {
                        Vec::new()
                    } else {
                        inner.snapshot.items.clone()
                    };
                    (Ok(FetchOutcome::Applied), Some((observers, records)))
                }
                Err(e) => {
                    let err = SyncError::from(e);
                    warn!(view = %self.name(), "Refresh failed, keeping last snapshot: {}", err);
                    inner.error = Some(err.clone());
                    self.publish(&inner);
                    (Err(err), None)
                }
            }
        };

        if let Some((observers, records)) = notify {
            for observer in observers {
                observer.observe(&records);
            }
        }

        guard.outcome = Some(outcome.clone());
        outcome
    }
}

#[async_trait]
impl<R: Fetchable> PollTarget for CollectionView<R> {
    async fn poll(&self) -> PollControl {
        match self.refresh().await {
            Err(SyncError::Closed(_)) => PollControl::Stop,
            // Failures are recorded in the view state; polling continues.
            _ => PollControl::Continue,
        }
    }
}
