//! Run context and cancellation.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use crate::dispatch::DispatchStore;
use crate::inspect::ResolutionStore;
use crate::run::phase::RunPhase;

/// Operator-initiated cancellation signal.
///
/// Every `cancel()` bumps a generation counter. A phase that has already
/// honored one cancel (the settlement wait ending early) compares against
/// the generation it started with, so it only stops on a *subsequent*
/// cancel rather than the one that brought it into being.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<u32>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        // send_modify updates the value even with no live receivers.
        self.tx.send_modify(|generation| *generation += 1);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow() > 0
    }

    /// Number of cancels issued so far.
    pub fn generation(&self) -> u32 {
        *self.tx.borrow()
    }

    /// Wait until the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if *rx.borrow() > 0 {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() > 0 {
                return;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Explicit run state threaded through every phase: the two append-only
/// stores, the phase, and the cancellation token. No module-level state.
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub dispatches: Arc<DispatchStore>,
    pub resolutions: Arc<ResolutionStore>,
    pub cancel: CancelToken,
    phase: Mutex<RunPhase>,
}

impl RunContext {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            dispatches: Arc::new(DispatchStore::new()),
            resolutions: Arc::new(ResolutionStore::new()),
            cancel,
            phase: Mutex::new(RunPhase::Initializing),
        }
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.lock().unwrap()
    }

    /// Advance to the next phase. The orchestrator only ever performs valid
    /// transitions; an invalid one is a harness bug, logged and refused.
    pub fn advance(&self, to: RunPhase) {
        let mut phase = self.phase.lock().unwrap();
        if !phase.can_transition_to(to) {
            tracing::error!(from = %*phase, %to, "Refusing invalid phase transition");
            return;
        }
        tracing::info!(run_id = %self.run_id, from = %*phase, %to, "Phase transition");
        *phase = to;
    }
}
