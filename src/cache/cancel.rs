//! Cancellation Handle Module
//!
//! Best-effort cancellation signal shared between the cache and its collaborators.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

type CancelHook = Box<dyn FnOnce() + Send>;

// == Cancellation Handle ==
/// Handle returned by a collaborator for one running operation.
///
/// Cancelling is a signal, not a guarantee: the collaborator may still finish
/// and invoke its completion. `cancel` is safe to call any number of times,
/// including after the operation completed; hooks run at most once.
#[derive(Clone, Default)]
pub struct CancellationHandle {
    inner: Arc<HandleInner>,
}

#[derive(Default)]
struct HandleInner {
    cancelled: AtomicBool,
    hooks: Mutex<Vec<CancelHook>>,
}

impl CancellationHandle {
    /// Creates a handle that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    // == Cancel ==
    /// Signals cancellation and runs every registered hook once.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let hooks = std::mem::take(
            &mut *self
                .inner
                .hooks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for hook in hooks {
            hook();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    // == On Cancel ==
    /// Registers `hook` to run when the handle is cancelled.
    ///
    /// Runs `hook` immediately if the handle was already cancelled.
    pub fn on_cancel(&self, hook: impl FnOnce() + Send + 'static) {
        {
            let mut hooks = self
                .inner
                .hooks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !self.is_cancelled() {
                hooks.push(Box::new(hook));
                return;
            }
        }
        hook();
    }

    /// Forwards cancellation of this handle to `other`.
    pub fn link(&self, other: CancellationHandle) {
        self.on_cancel(move || other.cancel());
    }
}

impl fmt::Debug for CancellationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
