//! Timeout Supervisor Module
//!
//! Per-operation timer racing the operation's own completion. Exactly one of
//! the two wins, decided by a compare-and-swap on the supervisor state.
//!
//! # States
//! - `Armed`: created when the operation starts
//! - `Fired`: the timer elapsed first; the operation is cancelled and every
//!   waiter receives [`FetchError::TimedOut`](crate::error::FetchError::TimedOut)
//! - `Disarmed`: the operation completed first; the timer can no longer fire
//!
//! Both terminal states are final.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const DISARMED: u8 = 2;

// == Supervisor State ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Armed,
    Fired,
    Disarmed,
}

// == Timeout Supervisor ==
/// Enforces a maximum wait on one in-flight operation.
#[derive(Debug)]
pub struct TimeoutSupervisor {
    state: AtomicU8,
    timeout: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl TimeoutSupervisor {
    // == Constructor ==
    /// Creates an armed supervisor. The timer does not run until
    /// [`start`](Self::start) is called.
    pub fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(ARMED),
            timeout,
            timer: Mutex::new(None),
        })
    }

    /// Returns the duration the supervisor was armed with.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the current state; `Fired` and `Disarmed` never change again.
    pub fn state(&self) -> SupervisorState {
        match self.state.load(Ordering::Acquire) {
            ARMED => SupervisorState::Armed,
            FIRED => SupervisorState::Fired,
            _ => SupervisorState::Disarmed,
        }
    }

    // == Start ==
    /// Spawns the timer task; `on_expiry` runs once if the timeout elapses
    /// while the supervisor is still armed.
    ///
    /// Does nothing if the supervisor already left the armed state, e.g.
    /// because the operation completed synchronously. Must be called from
    /// within a Tokio runtime.
    pub fn start<F>(self: &Arc<Self>, on_expiry: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.state() != SupervisorState::Armed {
            return;
        }

        let supervisor = Arc::clone(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(supervisor.timeout).await;
            if supervisor.transition(FIRED) {
                warn!(
                    timeout_ms = supervisor.timeout.as_millis() as u64,
                    "operation timed out, cancelling"
                );
                on_expiry();
            }
        });

        let mut slot = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if self.state() == SupervisorState::Armed {
            *slot = Some(timer);
        } else {
            // Disarmed while spawning
            timer.abort();
        }
    }

    // == Disarm ==
    /// Marks the operation as completed and stops the timer.
    ///
    /// Returns false if the timer already fired, in which case the caller's
    /// result is late and must be discarded.
    pub fn disarm(&self) -> bool {
        if !self.transition(DISARMED) {
            return false;
        }
        if let Some(timer) = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            timer.abort();
        }
        true
    }

    fn transition(&self, to: u8) -> bool {
        self.state
            .compare_exchange(ARMED, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
