#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing and examples in the listeners workspace.
//!
//! Most tests in this workspace park threads on listeners. A bug in a listener does not make such
//! a test fail, it makes it hang, so blocking tests run under [`with_watchdog()`].

use std::env;
use std::panic;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Runs `test_fn` on a separate thread and fails if it does not finish in time.
///
/// The limit is 10 seconds, or 60 seconds under Miri where thread synchronization is
/// dramatically slower. A test that exceeds it is reported as a panic instead of hanging the
/// test run. The hung thread itself cannot be stopped and is leaked.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", `test_fn` runs directly on the
/// calling thread so that mutation testing can detect hanging mutations through its own timeouts.
///
/// # Panics
///
/// Panics if the test exceeds the time limit. Panics from `test_fn` are propagated.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let answer = with_watchdog(|| 6 * 7);
/// assert_eq!(answer, 42);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let timeout = if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    };

    let (tx, rx) = mpsc::channel();

    let test_thread = thread::spawn(move || {
        // If this fails, the watchdog has already given up on us.
        drop(tx.send(test_fn()));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_thread.join().expect("test thread finished but failed to join");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test exceeded {timeout:?} timeout, probably a thread is waiting forever");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_thread.join() {
            Ok(()) => panic!("test thread disconnected without a result"),
            Err(payload) => panic::resume_unwind(payload),
        },
    }
}

/// Yields the current thread until `condition` returns `true`.
///
/// Used to wait for a state that other threads reach on their own schedule, such as a waiter
/// being suspended on a listener before the test broadcasts to it. Combine with
/// [`with_watchdog()`] so that a condition that never comes true fails the test.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::thread;
///
/// use testing::spin_until;
///
/// let flag = Arc::new(AtomicBool::new(false));
///
/// thread::spawn({
///     let flag = Arc::clone(&flag);
///     move || flag.store(true, Ordering::Release)
/// });
///
/// spin_until(|| flag.load(Ordering::Acquire));
/// ```
pub fn spin_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    // Yield for a while, then back off to sleeping so a slow condition does not burn a core.
    const YIELD_PHASE: Duration = Duration::from_millis(10);
    const SLEEP_INTERVAL: Duration = Duration::from_micros(100);

    let started = Instant::now();

    while !condition() {
        if started.elapsed() < YIELD_PHASE {
            thread::yield_now();
        } else {
            thread::sleep(SLEEP_INTERVAL);
        }
    }
}
