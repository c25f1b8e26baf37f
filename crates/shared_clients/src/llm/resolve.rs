//! Exactly-once resolution for a single completion request.
//!
//! Three parties race to finish a request: the response reader, a transport
//! failure and the timeout watchdog. Whoever calls [`Resolver::resolve`]
//! first moves the request from `Pending` to `Resolved`; every later call is
//! a no-op that reports `false`.

use super::error::{LlmError, Phase};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResolveState {
    Pending,
    Resolved,
}

pub(crate) struct Resolver<T> {
    slot: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> Resolver<T> {
    pub(crate) fn new() -> (Arc<Self>, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let resolver = Self {
            slot: Mutex::new(Some(tx)),
        };
        (Arc::new(resolver), rx)
    }

    /// Returns `true` if this call performed the `Pending -> Resolved`
    /// transition.
    pub(crate) fn resolve(&self, value: T) -> bool {
        let sender = self.slot.lock().take();
        match sender {
            Some(tx) => {
                // receiver gone means the caller was cancelled; still resolved
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    pub(crate) fn state(&self) -> ResolveState {
        if self.slot.lock().is_some() {
            ResolveState::Pending
        } else {
            ResolveState::Resolved
        }
    }
}

/// Deadline for the current phase. Re-armed with the full budget when the
/// first byte arrives so a slow start does not eat into body time.
pub(crate) struct PhaseTimer {
    budget: Duration,
    current: Mutex<(Phase, Instant)>,
}

impl PhaseTimer {
    pub(crate) fn start(budget: Duration) -> Arc<Self> {
        Arc::new(Self {
            budget,
            current: Mutex::new((Phase::FirstByte, Instant::now() + budget)),
        })
    }

    pub(crate) fn rearm(&self, phase: Phase) {
        *self.current.lock() = (phase, Instant::now() + self.budget);
    }

    pub(crate) fn current(&self) -> (Phase, Instant) {
        *self.current.lock()
    }

    pub(crate) fn budget(&self) -> Duration {
        self.budget
    }
}

/// Sleep until the active deadline passes, then try to resolve the request
/// as timed out. Returns `true` only when the timeout won the race.
pub(crate) async fn run_watchdog<T>(
    timer: Arc<PhaseTimer>,
    resolver: Arc<Resolver<Result<T, LlmError>>>,
) -> bool {
    loop {
        let (_, deadline) = timer.current();
        tokio::time::sleep_until(deadline).await;

        if resolver.state() == ResolveState::Resolved {
            return false;
        }
        let (phase, deadline) = timer.current();
        if deadline > Instant::now() {
            // re-armed while we slept
            continue;
        }
        return resolver.resolve(Err(LlmError::timeout(phase, timer.budget())));
    }
}

/// Aborts the spawned tasks of a request when the caller stops waiting.
pub(crate) struct AbortOnDrop(pub(crate) Vec<tokio::task::AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}
