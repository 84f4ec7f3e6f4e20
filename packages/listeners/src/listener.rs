use std::fmt::Debug;
use std::sync::Arc;

use crate::{OnceListener, RepeatListener};

/// The pending-or-resolved result for one key.
///
/// A producer delivers a value with [`broadcast()`][Self::broadcast] and any number of consumers
/// obtain it with [`wait()`][Self::wait] or [`receive()`][Self::receive]. Which consumers a
/// broadcast reaches depends on the delivery policy of the implementing type:
///
/// * [`RepeatListener`] delivers a broadcast only to the waiters suspended when it fires.
/// * [`OnceListener`] delivers the first broadcast to every past and future waiter.
///
/// Implementations must be safe to use from any number of threads at the same time without any
/// external locking.
///
/// # Unbounded waiting
///
/// [`wait()`][Self::wait] has no built-in timeout. Calling it on a listener that never receives
/// a broadcast suspends the calling thread forever, leaking the thread and whatever it owns.
/// This is part of the contract, not an error condition. To bound a wait, race it against a
/// deadline that broadcasts a sentinel value, see [`broadcast_after()`][crate::broadcast_after].
pub trait Listener<V>: Debug + Send + Sync {
    /// Delivers `value` to waiters, according to the delivery policy of the listener.
    fn broadcast(&self, value: V);

    /// Returns the currently delivered value without blocking, if one is available.
    ///
    /// For a one-shot listener this is the broadcast value once one exists. For a repeatable
    /// listener a value is only available while the waiters of the most recent broadcast are
    /// still collecting it.
    #[must_use]
    fn receive(&self) -> Option<V>;

    /// Blocks the calling thread until a value is delivered and returns it.
    ///
    /// A one-shot listener returns immediately if a value has already been broadcast. A
    /// repeatable listener always waits for the next broadcast that starts after this call.
    #[must_use]
    fn wait(&self) -> V;
}

/// A listener shared between every caller that looked it up in a [`Registry`][crate::Registry].
///
/// Two handles refer to the same listener if [`Arc::ptr_eq()`] says so.
pub type SharedListener<V> = Arc<dyn Listener<V>>;

/// Creates a [`RepeatListener`] behind a [`SharedListener`].
///
/// This is the default factory of a [`Registry`][crate::Registry].
#[must_use]
pub fn repeatable<V>() -> SharedListener<V>
where
    V: Clone + Send + Sync + 'static,
{
    Arc::new(RepeatListener::new())
}

/// Creates a [`OnceListener`] behind a [`SharedListener`].
///
/// Pass this to [`Registry::with_factory()`][crate::Registry::with_factory] to coalesce requests
/// so that late arrivals still see the already produced result.
#[must_use]
pub fn once<V>() -> SharedListener<V>
where
    V: Clone + Send + Sync + 'static,
{
    Arc::new(OnceListener::new())
}
