//! Listener that delivers every broadcast to the waiters suspended at that moment.

use std::any::type_name;
use std::fmt;
use std::mem;
use std::sync::{Arc, OnceLock};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::Listener;

/// A listener on which every broadcast starts a fresh delivery round.
///
/// A broadcast releases exactly the threads that were suspended in [`wait()`][Listener::wait]
/// when it fired and hands each of them the broadcast value. There is no queueing of missed
/// values: a thread that calls `wait()` after a broadcast has completed always waits for the
/// next one, even if a value has been delivered before.
///
/// Concurrent broadcasts are serialized. A waiter always receives the value of the round it was
/// suspended in, never the value of a later round that happened to fire before it woke up.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::thread;
///
/// use listeners::{Listener, RepeatListener};
///
/// let listener = Arc::new(RepeatListener::new());
///
/// let waiter = thread::spawn({
///     let listener = Arc::clone(&listener);
///     move || listener.wait()
/// });
///
/// // Keep broadcasting until the waiter has joined a round and collected it.
/// while !waiter.is_finished() {
///     listener.broadcast(42);
///     thread::yield_now();
/// }
///
/// assert_eq!(waiter.join().unwrap(), 42);
/// ```
pub struct RepeatListener<V> {
    rounds: Mutex<Rounds<V>>,

    // Notified (outside the lock) after every broadcast.
    round_completed: Condvar,
}

/// One delivery round.
///
/// Every waiter holds a reference to the round it joined, so the strong count of a round tells
/// how many waiters it still has.
struct Round<V> {
    value: OnceLock<V>,
}

struct Rounds<V> {
    /// The round that threads calling `wait()` join.
    pending: Arc<Round<V>>,

    /// The round filled by the most recent broadcast.
    delivered: Option<Arc<Round<V>>>,
}

impl<V> Round<V> {
    fn new() -> Self {
        Self {
            value: OnceLock::new(),
        }
    }
}

impl<V> RepeatListener<V> {
    /// Creates a listener with no waiters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rounds: Mutex::new(Rounds {
                pending: Arc::new(Round::new()),
                delivered: None,
            }),
            round_completed: Condvar::new(),
        }
    }

    /// Number of threads currently suspended in `wait()`, waiting for the next broadcast.
    ///
    /// Under concurrent use the result may be stale the instant it is returned.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        let rounds = self.rounds.lock();

        // The listener itself holds one reference, the rest belong to waiters.
        Arc::strong_count(&rounds.pending).saturating_sub(1)
    }
}

impl<V> Default for RepeatListener<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for RepeatListener<V> {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("waiter_count", &self.waiter_count())
            .finish_non_exhaustive()
    }
}

impl<V> Listener<V> for RepeatListener<V>
where
    V: Clone + Send + Sync,
{
    #[cfg_attr(test, mutants::skip)] // Tampering leaves waiters parked forever.
    fn broadcast(&self, value: V) {
        let mut rounds = self.rounds.lock();

        // Late arrivals join a fresh round and wait for the next broadcast.
        let round = mem::replace(&mut rounds.pending, Arc::new(Round::new()));
        let waiters = Arc::strong_count(&round).saturating_sub(1);

        // Rounds are swapped out under the lock before being filled, so each is filled once.
        let filled = round.value.set(value).is_ok();
        debug_assert!(filled, "a delivery round was filled twice");

        rounds.delivered = Some(round);
        drop(rounds);

        self.round_completed.notify_all();

        trace!(waiters, "broadcast round delivered");
    }

    fn receive(&self) -> Option<V> {
        let rounds = self.rounds.lock();
        let round = rounds.delivered.as_ref()?;

        // Once the last waiter of the round has collected the value, the window is closed.
        if Arc::strong_count(round) > 1 {
            round.value.get().cloned()
        } else {
            None
        }
    }

    #[cfg_attr(test, mutants::skip)] // Tampering leaves waiters parked forever.
    fn wait(&self) -> V {
        let mut rounds = self.rounds.lock();
        let round = Arc::clone(&rounds.pending);

        loop {
            if let Some(value) = round.value.get() {
                // `round` is released before `rounds`, so `receive()` never observes a waiter
                // that has already returned.
                return value.clone();
            }

            self.round_completed.wait(&mut rounds);
        }
    }
}
