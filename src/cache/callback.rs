//! Callback Cache Module
//!
//! Coalescing engine: at most one in-flight operation per key, with every
//! registered callback receiving the single outcome exactly once.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::cache::{CancellationHandle, CoalescingStats};
use crate::error::{FetchError, Result};

/// A waiter's completion, invoked once with the operation outcome.
pub type Callback<T> = Box<dyn FnOnce(Result<T>) + Send>;

// == Cache Status ==
/// Outcome of registering a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// A new in-flight entry was created; the caller must start the operation
    FirstCallbackAddedToList,
    /// The callback joined an operation already in flight; the caller must not start another
    AddedToExistingList,
}

// == In-Flight Entry ==
/// Bookkeeping for one started-but-unfinished operation.
///
/// Destroyed the moment its outcome is fanned out; never reused.
struct InFlightEntry<T> {
    /// Pending callbacks in registration order
    callbacks: Vec<Callback<T>>,
    /// Handle of the underlying operation, once known
    cancellation: Option<CancellationHandle>,
}

struct State<K, T> {
    entries: HashMap<K, InFlightEntry<T>>,
    stats: CoalescingStats,
}

// == Callback Cache ==
/// Deduplicates concurrent requests by key and fans one result out to all waiters.
///
/// Cloning is cheap and yields a handle to the same cache. The internal lock
/// only guards the key map; callbacks are always invoked after it is released,
/// so a callback may call back into the cache.
pub struct CallbackCache<K, T> {
    state: Arc<Mutex<State<K, T>>>,
}

impl<K, T> Clone for CallbackCache<K, T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<K, T> Default for CallbackCache<K, T> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                entries: HashMap::new(),
                stats: CoalescingStats::new(),
            })),
        }
    }
}

impl<K, T> CallbackCache<K, T>
where
    K: Eq + Hash + Debug,
    T: Clone,
{
    // == Constructor ==
    /// Creates an empty cache with no in-flight entries.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State<K, T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // == Add ==
    /// Registers `callback` to be invoked once with the eventual result for `key`.
    ///
    /// Returns [`CacheStatus::FirstCallbackAddedToList`] if this call created the
    /// in-flight entry, in which case the caller owns starting the operation.
    pub fn add<F>(&self, key: K, callback: F) -> CacheStatus
    where
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let mut state = self.lock();
        let status = match state.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().callbacks.push(Box::new(callback));
                trace!(
                    key = ?occupied.key(),
                    waiters = occupied.get().callbacks.len(),
                    "joined in-flight operation"
                );
                CacheStatus::AddedToExistingList
            }
            Entry::Vacant(vacant) => {
                debug!(key = ?vacant.key(), "first callback registered, operation must start");
                vacant.insert(InFlightEntry {
                    callbacks: vec![Box::new(callback)],
                    cancellation: None,
                });
                CacheStatus::FirstCallbackAddedToList
            }
        };
        match status {
            CacheStatus::FirstCallbackAddedToList => state.stats.record_first_registration(),
            CacheStatus::AddedToExistingList => state.stats.record_join(),
        }
        status
    }

    // == Attach Cancellation ==
    /// Stores the handle of the operation started for `key`.
    ///
    /// Returns false if the entry was already resolved.
    pub fn attach_cancellation(&self, key: &K, handle: CancellationHandle) -> bool {
        match self.lock().entries.get_mut(key) {
            Some(entry) => {
                entry.cancellation = Some(handle);
                true
            }
            None => false,
        }
    }

    // == Complete ==
    /// Delivers `result` to every callback registered under `key`, in
    /// registration order, then forgets the key.
    ///
    /// A key with no entry is a no-op, which is what makes late or duplicate
    /// completions harmless. Returns the number of callbacks invoked.
    pub fn complete(&self, key: &K, result: Result<T>) -> usize {
        let Some(entry) = self.take_entry(key) else {
            self.lock().stats.record_discarded();
            debug!(?key, "completion for unknown key discarded");
            return 0;
        };
        deliver(entry.callbacks, result)
    }

    // == Cancel In Flight ==
    /// Resolves the entry for `key` with `error` and cancels its operation.
    ///
    /// Removing the entry and fanning out happen before the underlying
    /// operation can complete through [`complete`](Self::complete), so a late
    /// completion finds nothing to deliver. Returns the number of callbacks invoked.
    pub fn cancel_in_flight(&self, key: &K, error: FetchError) -> usize {
        let Some(entry) = self.take_entry(key) else {
            return 0;
        };
        if let Some(handle) = &entry.cancellation {
            handle.cancel();
        }
        deliver(entry.callbacks, Err(error))
    }

    fn take_entry(&self, key: &K) -> Option<InFlightEntry<T>> {
        let mut state = self.lock();
        let entry = state.entries.remove(key)?;
        state.stats.record_completion(entry.callbacks.len());
        Some(entry)
    }

    /// Returns true while an operation for `key` is registered and unresolved.
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Returns the number of keys currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns a snapshot of the coalescing counters.
    pub fn stats(&self) -> CoalescingStats {
        self.lock().stats.clone()
    }
}

/// Hands `result` to `completion` from a freshly spawned task.
///
/// Used for outcomes known at request time, so that no completion ever runs
/// on the requesting caller's stack. Must be called from within a Tokio runtime.
pub(crate) fn deliver_later<T, F>(completion: F, result: Result<T>)
where
    T: Send + 'static,
    F: FnOnce(Result<T>) + Send + 'static,
{
    tokio::spawn(async move { completion(result) });
}

/// Invokes every callback with its own copy of `result`; the last one takes ownership.
fn deliver<T: Clone>(callbacks: Vec<Callback<T>>, result: Result<T>) -> usize {
    let count = callbacks.len();
    let mut callbacks = callbacks.into_iter();
    let last = callbacks.next_back();
    for callback in callbacks {
        callback(result.clone());
    }
    if let Some(callback) = last {
        callback(result);
    }
    count
}

impl<K, T> Debug for CallbackCache<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("CallbackCache")
            .field("in_flight", &state.entries.len())
            .field("stats", &state.stats)
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder() -> (Arc<Mutex<Vec<(usize, Result<u32>)>>>, impl Fn(usize) -> Callback<u32>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let make = move |id: usize| -> Callback<u32> {
            let sink = sink.clone();
            Box::new(move |result| sink.lock().unwrap().push((id, result)))
        };
        (log, make)
    }

    #[test]
    fn test_first_add_then_join() {
        let cache: CallbackCache<&str, u32> = CallbackCache::new();

        assert_eq!(cache.add("k", |_| {}), CacheStatus::FirstCallbackAddedToList);
        assert_eq!(cache.add("k", |_| {}), CacheStatus::AddedToExistingList);
        assert_eq!(cache.add("other", |_| {}), CacheStatus::FirstCallbackAddedToList);
        assert_eq!(cache.in_flight_count(), 2);

        let stats = cache.stats();
        assert_eq!(stats.first_registrations, 2);
        assert_eq!(stats.joined, 1);
    }

    #[test]
    fn test_complete_delivers_in_registration_order() {
        let cache: CallbackCache<&str, u32> = CallbackCache::new();
        let (log, make) = recorder();

        for id in 0..4 {
            cache.add("k", make(id));
        }
        let delivered = cache.complete(&"k", Ok(7));

        assert_eq!(delivered, 4);
        let log = log.lock().unwrap();
        let ids: Vec<usize> = log.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert!(log.iter().all(|(_, r)| r == &Ok(7)));
        assert!(!cache.is_in_flight(&"k"));
    }

    #[test]
    fn test_complete_unknown_key_is_noop() {
        let cache: CallbackCache<&str, u32> = CallbackCache::new();
        assert_eq!(cache.complete(&"missing", Ok(1)), 0);
        assert_eq!(cache.stats().discarded_completions, 1);
    }

    #[test]
    fn test_cancel_unknown_key_is_not_a_discarded_completion() {
        let cache: CallbackCache<&str, u32> = CallbackCache::new();
        let err = FetchError::OperationFailed("gone".to_string());

        assert_eq!(cache.cancel_in_flight(&"missing", err), 0);
        assert_eq!(cache.stats().discarded_completions, 0);

        cache.add("k", |_| {});
        cache.cancel_in_flight(&"k", FetchError::Internal("stop".to_string()));
        cache.complete(&"k", Ok(1));
        assert_eq!(cache.stats().discarded_completions, 1);
    }

    #[tokio::test]
    async fn test_deliver_later_runs_off_caller_stack() {
        let ran = Arc::new(AtomicUsize::new(0));
        let (sender, receiver) = tokio::sync::oneshot::channel();
        let counter = ran.clone();

        deliver_later(
            move |result: Result<u32>| {
                counter.fetch_add(1, Ordering::SeqCst);
                sender.send(result).ok();
            },
            Ok(5),
        );
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        assert_eq!(receiver.await.unwrap(), Ok(5));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_second_complete_is_noop() {
        let cache: CallbackCache<&str, u32> = CallbackCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        cache.add("k", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(cache.complete(&"k", Ok(1)), 1);
        assert_eq!(cache.complete(&"k", Ok(2)), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_is_forwarded_to_all_waiters() {
        let cache: CallbackCache<&str, u32> = CallbackCache::new();
        let (log, make) = recorder();
        cache.add("k", make(0));
        cache.add("k", make(1));

        let err = FetchError::OperationFailed("boom".to_string());
        cache.complete(&"k", Err(err.clone()));

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|(_, r)| r == &Err(err.clone())));
    }

    #[test]
    fn test_callback_can_reenter_cache() {
        let cache: CallbackCache<&str, u32> = CallbackCache::new();
        let retry_status = Arc::new(Mutex::new(None));

        let inner_cache = cache.clone();
        let status_slot = retry_status.clone();
        cache.add("k", move |_| {
            let status = inner_cache.add("k", |_| {});
            *status_slot.lock().unwrap() = Some(status);
        });
        cache.complete(&"k", Ok(1));

        assert_eq!(
            *retry_status.lock().unwrap(),
            Some(CacheStatus::FirstCallbackAddedToList)
        );
        assert!(cache.is_in_flight(&"k"));
    }

    #[test]
    fn test_cancel_in_flight_cancels_and_fans_out() {
        let cache: CallbackCache<&str, u32> = CallbackCache::new();
        let (log, make) = recorder();
        let handle = CancellationHandle::new();

        cache.add("k", make(0));
        cache.add("k", make(1));
        assert!(cache.attach_cancellation(&"k", handle.clone()));

        let timeout = FetchError::TimedOut {
            timeout: std::time::Duration::from_millis(10),
        };
        assert_eq!(cache.cancel_in_flight(&"k", timeout.clone()), 2);
        assert!(handle.is_cancelled());

        // Late success after cancellation is dropped
        assert_eq!(cache.complete(&"k", Ok(9)), 0);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|(_, r)| r == &Err(timeout.clone())));
    }

    #[test]
    fn test_attach_after_completion_returns_false() {
        let cache: CallbackCache<&str, u32> = CallbackCache::new();
        cache.add("k", |_| {});
        cache.complete(&"k", Ok(1));
        assert!(!cache.attach_cancellation(&"k", CancellationHandle::new()));
    }

    #[test]
    fn test_concurrent_adds_start_exactly_one_operation() {
        let cache: CallbackCache<u8, u32> = CallbackCache::new();
        let delivered = Arc::new(AtomicUsize::new(0));

        let firsts: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let cache = cache.clone();
                    let delivered = delivered.clone();
                    s.spawn(move || {
                        let status = cache.add(1, move |_| {
                            delivered.fetch_add(1, Ordering::SeqCst);
                        });
                        usize::from(status == CacheStatus::FirstCallbackAddedToList)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(firsts, 1);
        assert_eq!(cache.complete(&1, Ok(0)), 16);
        assert_eq!(delivered.load(Ordering::SeqCst), 16);
    }
}
