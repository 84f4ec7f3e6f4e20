//! Listener that keeps the first broadcast value forever.

use std::any::type_name;
use std::fmt;
use std::sync::OnceLock;

use rsevents::{Awaitable, EventState, ManualResetEvent};
use tracing::trace;

use crate::Listener;

/// A listener on which at most one broadcast has any effect.
///
/// Once a value has been broadcast, every past and future [`wait()`][Listener::wait] and
/// [`receive()`][Listener::receive] observes that same value without blocking. Later broadcasts
/// are silently ignored: some observers may already have returned the first value and all
/// observers must agree on it.
///
/// This is the policy to use for coalescing requests, because callers that arrive after the
/// producer has finished still get the result instead of waiting for a broadcast that will
/// never come.
///
/// # Example
///
/// ```rust
/// use listeners::{Listener, OnceListener};
///
/// let listener = OnceListener::new();
/// assert_eq!(listener.receive(), None);
///
/// listener.broadcast("first");
/// listener.broadcast("second");
///
/// assert_eq!(listener.receive(), Some("first"));
/// assert_eq!(listener.wait(), "first");
/// ```
pub struct OnceListener<V> {
    value: OnceLock<V>,

    // Set after `value` has been filled. Waiters that find `value` empty park on this.
    delivered: ManualResetEvent,
}

impl<V> OnceListener<V> {
    /// Creates a listener that has not received a value yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: OnceLock::new(),
            delivered: ManualResetEvent::new(EventState::Unset),
        }
    }

    /// Whether a value has been broadcast.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        self.value.get().is_some()
    }
}

impl<V> Default for OnceListener<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for OnceListener<V> {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("is_delivered", &self.is_delivered())
            .finish_non_exhaustive()
    }
}

impl<V> Listener<V> for OnceListener<V>
where
    V: Clone + Send + Sync,
{
    fn broadcast(&self, value: V) {
        if self.value.set(value).is_err() {
            trace!("ignoring broadcast on an already delivered one-shot listener");
            return;
        }

        self.delivered.set();
        trace!("one-shot value delivered");
    }

    fn receive(&self) -> Option<V> {
        self.value.get().cloned()
    }

    #[cfg_attr(test, mutants::skip)] // Tampering leaves waiters parked forever.
    fn wait(&self) -> V {
        loop {
            if let Some(value) = self.value.get() {
                return value.clone();
            }

            // The event is only ever set after the value is stored, so the next iteration finds it.
            self.delivered.wait();
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use static_assertions::assert_impl_all;
    use testing::{spin_until, with_watchdog};

    use super::*;

    assert_impl_all!(OnceListener<String>: Send, Sync);

    #[test]
    fn receive_is_empty_before_broadcast() {
        let listener = OnceListener::<u8>::new();

        assert_eq!(listener.receive(), None);
        assert!(!listener.is_delivered());
    }

    #[test]
    fn wait_after_broadcast_returns_immediately() {
        with_watchdog(|| {
            let listener = OnceListener::new();
            listener.broadcast(7_u64);

            assert!(listener.is_delivered());
            assert_eq!(listener.wait(), 7);
            assert_eq!(listener.wait(), 7);
        });
    }

    #[test]
    fn second_broadcast_is_ignored() {
        let listener = OnceListener::new();
        listener.broadcast("first".to_string());
        listener.broadcast("second".to_string());

        assert_eq!(listener.receive().as_deref(), Some("first"));
    }

    #[test]
    fn default_is_undelivered() {
        let listener = OnceListener::<i32>::default();
        assert!(!listener.is_delivered());
    }

    #[cfg_attr(miri, ignore)] // Many threads, slow under Miri.
    #[test]
    fn waiters_before_and_after_broadcast_see_same_value() {
        with_watchdog(|| {
            const EARLY: usize = 8;
            const LATE: usize = 8;

            let listener = Arc::new(OnceListener::new());
            let started = Arc::new(AtomicUsize::new(0));

            let early = (0..EARLY)
                .map(|_| {
                    let listener = Arc::clone(&listener);
                    let started = Arc::clone(&started);

                    thread::spawn(move || {
                        started.fetch_add(1, Ordering::Relaxed);
                        listener.wait()
                    })
                })
                .collect::<Vec<_>>();

            spin_until(|| started.load(Ordering::Relaxed) == EARLY);

            listener.broadcast(312_u32);
            listener.broadcast(999);

            let late = (0..LATE)
                .map(|_| {
                    let listener = Arc::clone(&listener);
                    thread::spawn(move || listener.wait())
                })
                .collect::<Vec<_>>();

            for handle in early.into_iter().chain(late) {
                assert_eq!(handle.join().unwrap(), 312);
            }

            assert_eq!(listener.receive(), Some(312));
        });
    }

    #[cfg_attr(miri, ignore)] // Many threads, slow under Miri.
    #[test]
    fn racing_broadcasts_agree_on_one_value() {
        with_watchdog(|| {
            let listener = Arc::new(OnceListener::new());

            let producers = (0..8_u32)
                .map(|i| {
                    let listener = Arc::clone(&listener);
                    thread::spawn(move || listener.broadcast(i))
                })
                .collect::<Vec<_>>();

            let observed = listener.wait();

            for handle in producers {
                handle.join().unwrap();
            }

            assert_eq!(listener.receive(), Some(observed));
            assert_eq!(listener.wait(), observed);
        });
    }
}
