//! Periodic refresh scheduling.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metrics::record_skipped_tick;

/// Whether a poll target wants to keep being polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollControl {
    Continue,
    Stop,
}

/// Something a [`PollScheduler`] refreshes.
#[async_trait]
pub trait PollTarget: Send + Sync {
    async fn poll(&self) -> PollControl;
}

enum SchedulerState {
    Stopped,
    Running {
        generation: u64,
        cancel: CancellationToken,
        handle: JoinHandle<()>,
    },
}

struct SchedulerInner {
    name: String,
    period: Duration,
    target: Arc<dyn PollTarget>,
    state: Mutex<SchedulerState>,
    generation: Mutex<u64>,
}

impl SchedulerInner {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop only if `generation` is still the running one.
    fn stop_generation(&self, generation: u64) {
        let mut state = self.lock();
        if matches!(*state, SchedulerState::Running { generation: g, .. } if g == generation) {
            if let SchedulerState::Running { cancel, .. } =
                std::mem::replace(&mut *state, SchedulerState::Stopped)
            {
                cancel.cancel();
            }
            info!(scheduler = %self.name, generation, "Polling finished");
        }
    }
}

/// Drives periodic refreshes of a [`PollTarget`].
///
/// Every tick starts one poll unless the previous one is still outstanding,
/// in which case the tick is skipped. Stopping cancels the timer and drops
/// any outstanding poll, so its result is never applied.
pub struct PollScheduler {
    inner: Arc<SchedulerInner>,
}

impl PollScheduler {
    pub fn new(name: impl Into<String>, period: Duration, target: Arc<dyn PollTarget>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                name: name.into(),
                period,
                target,
                state: Mutex::new(SchedulerState::Stopped),
                generation: Mutex::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn period(&self) -> Duration {
        self.inner.period
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.inner.lock(), SchedulerState::Running { .. })
    }

    /// Number of times polling has been started.
    pub fn generation(&self) -> u64 {
        *self.inner.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start polling. The first poll happens one period from now.
    /// No-op when already running. Must be called within a Tokio runtime.
    pub fn start(&self) {
        let mut state = self.inner.lock();
        if matches!(*state, SchedulerState::Running { .. }) {
            return;
        }

        let generation = {
            let mut generation = self.inner.generation.lock().unwrap_or_else(PoisonError::into_inner);
            *generation += 1;
            *generation
        };
        let cancel = CancellationToken::new();

        info!(
            scheduler = %self.inner.name,
            generation,
            period_ms = self.inner.period.as_millis() as u64,
            "Polling started"
        );

        let handle = tokio::spawn(run_loop(
            Arc::downgrade(&self.inner),
            Arc::clone(&self.inner.target),
            self.inner.name.clone(),
            self.inner.period,
            generation,
            cancel.clone(),
        ));

        *state = SchedulerState::Running {
            generation,
            cancel,
            handle,
        };
    }

    /// Stop polling. No-op when already stopped.
    pub fn stop(&self) {
        self.take_running();
    }

    /// Stop polling and wait for the timer task to exit.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.take_running() {
            let _ = handle.await;
        }
    }

    fn take_running(&self) -> Option<JoinHandle<()>> {
        let mut state = self.inner.lock();
        match std::mem::replace(&mut *state, SchedulerState::Stopped) {
            SchedulerState::Running {
                generation,
                cancel,
                handle,
            } => {
                cancel.cancel();
                debug!(scheduler = %self.inner.name, generation, "Polling stopped");
                Some(handle)
            }
            SchedulerState::Stopped => None,
        }
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.take_running();
    }
}

async fn run_loop(
    scheduler: Weak<SchedulerInner>,
    target: Arc<dyn PollTarget>,
    name: String,
    period: Duration,
    generation: u64,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut in_flight: Option<BoxFuture<'static, PollControl>> = None;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            control = next_control(&mut in_flight) => {
                if control == PollControl::Stop {
                    if let Some(scheduler) = scheduler.upgrade() {
                        scheduler.stop_generation(generation);
                    }
                    break;
                }
            }

            _ = ticker.tick() => {
                if in_flight.is_some() {
                    debug!(scheduler = %name, generation, "Previous poll still outstanding, skipping tick");
                    record_skipped_tick(&name);
                    continue;
                }
                let target = Arc::clone(&target);
                in_flight = Some(Box::pin(async move { target.poll().await }));
            }
        }
    }
}

/// Resolve the outstanding poll, or never when there is none.
fn next_control<'a>(
    slot: &'a mut Option<BoxFuture<'static, PollControl>>,
) -> impl Future<Output = PollControl> + 'a {
    async move {
        match slot {
            Some(fut) => {
                let control = fut.await;
                *slot = None;
                control
            }
            None => std::future::pending().await,
        }
    }
}
