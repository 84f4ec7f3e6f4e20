//! Coalescing concurrent lookups of the same record into one expensive fetch.
//!
//! Eight threads ask for the same user profile at the same time. Only the first one performs the
//! fetch, the rest wait for its result. A deadline guarantees that the waiters are released even
//! if the fetch stalls.
//!
//! Run with `RUST_LOG=listeners=trace` to see the registry and listener activity.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use listeners::{Registry, broadcast_after};
use tracing_subscriber::EnvFilter;

type Profile = Result<String, &'static str>;

const FETCH_DURATION: Duration = Duration::from_millis(50);
const FETCH_DEADLINE: Duration = Duration::from_secs(1);

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let registry = Arc::new(Registry::<u64, Profile>::with_factory(listeners::once));
    let fetches = Arc::new(AtomicUsize::new(0));

    let callers = (0..8)
        .map(|caller| {
            let registry = Arc::clone(&registry);
            let fetches = Arc::clone(&fetches);

            thread::spawn(move || {
                let profile = lookup_profile(&registry, &fetches, 42);
                println!("caller {caller} got {profile:?}");
            })
        })
        .collect::<Vec<_>>();

    for caller in callers {
        caller.join().expect("caller thread panicked");
    }

    println!(
        "{} fetch(es) performed, {} registry entries left",
        fetches.load(Ordering::Relaxed),
        registry.len()
    );
}

fn lookup_profile(
    registry: &Registry<u64, Profile>,
    fetches: &AtomicUsize,
    user_id: u64,
) -> Profile {
    let (listener, existed) = registry.get_or_create(user_id);

    if !existed {
        // We are the producer. Make sure the waiters are released even if the fetch stalls.
        let deadline =
            broadcast_after(Arc::clone(&listener), FETCH_DEADLINE, Err("fetch timed out"));

        fetches.fetch_add(1, Ordering::Relaxed);
        thread::sleep(FETCH_DURATION);
        listener.broadcast(Ok(format!("profile of user {user_id}")));

        deadline.cancel();

        // Resolved entries are not evicted automatically. Callers that already hold the
        // listener still see the value; new callers will trigger a new fetch.
        registry.delete(&user_id);
    }

    listener.wait()
}
