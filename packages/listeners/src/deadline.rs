//! Timer-driven broadcasts that bound how long waiters can be suspended.

use std::any::type_name;
use std::fmt;
use std::panic;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::Listener;

/// A pending broadcast armed by [`broadcast_after()`].
///
/// Dropping the `Deadline` does not disarm it; the broadcast still happens when the delay
/// elapses. Use [`cancel()`][Self::cancel] to disarm it.
pub struct Deadline {
    shared: Arc<DeadlineShared>,
    timer: JoinHandle<bool>,
}

struct DeadlineShared {
    state: Mutex<DeadlineState>,
    state_changed: Condvar,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum DeadlineState {
    Armed,
    Cancelled,
    Fired,
}

/// Broadcasts `value` on `listener` once `delay` has elapsed, unless cancelled first.
///
/// This is how a producer guarantees forward progress for waiters: if the real result is not
/// available in time, the waiters are released with a sentinel value instead of waiting forever.
/// The timer runs on its own thread, so the calling thread is free to wait on the same listener.
///
/// Against a [`OnceListener`][crate::OnceListener], whichever broadcast comes first wins, so the
/// producer can arm the deadline up front and broadcast the real result whenever it is ready.
///
/// # Panics
///
/// Panics if the timer thread cannot be spawned.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use listeners::{Listener, OnceListener, broadcast_after};
///
/// let listener = Arc::new(OnceListener::<Option<u32>>::new());
/// let _deadline = broadcast_after(Arc::clone(&listener), Duration::from_millis(10), None);
///
/// // Nobody produces a real value, so the deadline releases us with the sentinel.
/// assert_eq!(listener.wait(), None);
/// ```
pub fn broadcast_after<L, V>(listener: Arc<L>, delay: Duration, value: V) -> Deadline
where
    L: Listener<V> + ?Sized + 'static,
    V: Send + 'static,
{
    let shared = Arc::new(DeadlineShared {
        state: Mutex::new(DeadlineState::Armed),
        state_changed: Condvar::new(),
    });

    let timer = thread::Builder::new()
        .name("listeners-deadline".to_string())
        .spawn({
            let shared = Arc::clone(&shared);
            move || {
                if !shared.expire(delay) {
                    return false;
                }

                listener.broadcast(value);
                debug!(?delay, "deadline fired");
                true
            }
        })
        .expect("failed to spawn deadline timer thread: thread spawning failure is not supported");

    Deadline { shared, timer }
}

impl Deadline {
    /// Disarms the deadline.
    ///
    /// Returns `true` if the deadline was still armed and will now never broadcast, `false` if it
    /// has already fired or been cancelled.
    pub fn cancel(&self) -> bool {
        let mut state = self.shared.state.lock();

        if *state != DeadlineState::Armed {
            return false;
        }

        *state = DeadlineState::Cancelled;
        drop(state);

        self.shared.state_changed.notify_all();
        true
    }

    /// Whether the deadline is still waiting for its delay to elapse.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        *self.shared.state.lock() == DeadlineState::Armed
    }

    /// Waits for the timer to finish and returns whether it broadcast its value.
    ///
    /// # Panics
    ///
    /// Resumes the panic if the broadcast performed by the timer panicked.
    #[must_use]
    pub fn join(self) -> bool {
        match self.timer.join() {
            Ok(fired) => fired,
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}

impl fmt::Debug for Deadline {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("state", &*self.shared.state.lock())
            .finish_non_exhaustive()
    }
}

impl DeadlineShared {
    /// Sleeps until `delay` has elapsed or the deadline is cancelled.
    ///
    /// Returns `true` if the delay elapsed while the deadline was armed, in which case the
    /// deadline is now marked as fired.
    #[cfg_attr(test, mutants::skip)] // Tampering makes timers sleep forever.
    fn expire(&self, delay: Duration) -> bool {
        // A delay too large to represent as an instant is as good as never firing.
        let fire_at = Instant::now().checked_add(delay);

        let mut state = self.state.lock();

        while *state == DeadlineState::Armed {
            match fire_at {
                Some(fire_at) => {
                    if self.state_changed.wait_until(&mut state, fire_at).timed_out() {
                        break;
                    }
                }
                None => self.state_changed.wait(&mut state),
            }
        }

        if *state != DeadlineState::Armed {
            return false;
        }

        *state = DeadlineState::Fired;
        true
    }
}
