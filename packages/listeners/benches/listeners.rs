//! Registry and listener throughput under coalescing workloads.
//!
//! Keys are drawn from a mix of "known" keys (answered from a local map without touching the
//! registry) and fresh keys that go through the registry, where the first caller produces the
//! value and everyone else waits for it.

#![expect(missing_docs, reason = "benchmarks")]

use std::collections::HashSet;
use std::hint::black_box;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};
use listeners::{Listener, Registry, RepeatListener, SharedListener, broadcast_after};
use rand::distr::{Alphanumeric, SampleString};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const KEY_COUNT: usize = 10_000;
const KEY_LEN: usize = 10;
const DISPERSION_LEN: usize = 500;
const WORKER_THREADS: usize = 4;
const FAN_OUT_WAITERS: usize = 4;

const VALUE: u32 = 312;

// The producer does no real work; its deadline is what releases the waiters.
const PRODUCE_DELAY: Duration = Duration::from_millis(1);

// A repeatable listener drops broadcasts that fire before a waiter is suspended, so every caller
// of a repeatable key arms its own, later broadcast to avoid hanging on a missed round.
const RESEND_DELAY: Duration = Duration::from_millis(50);

struct Keys {
    known: HashSet<String>,

    // One sequence of lookups per worker, each half known and half fresh keys.
    dispersions: Vec<Vec<String>>,
}

impl Keys {
    fn generate(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let known = (0..KEY_COUNT)
            .map(|_| Alphanumeric.sample_string(&mut rng, KEY_LEN))
            .collect::<Vec<_>>();
        let fresh = (0..KEY_COUNT)
            .map(|_| Alphanumeric.sample_string(&mut rng, KEY_LEN))
            .collect::<Vec<_>>();

        let dispersions = (0..WORKER_THREADS)
            .map(|_| {
                (0..DISPERSION_LEN)
                    .map(|_| {
                        let pool = if rng.random_bool(0.5) { &known } else { &fresh };
                        pool[rng.random_range(0..KEY_COUNT)].clone()
                    })
                    .collect()
            })
            .collect();

        Self {
            known: known.into_iter().collect(),
            dispersions,
        }
    }
}

/// Resolves every key in `dispersion`. The first caller of a fresh key becomes its producer and
/// arms a short deadline that broadcasts the value; everyone waits for it. The producer removes
/// the entry once it has been released.
///
/// With `resend`, every caller also arms a later broadcast of its own, which repeatable
/// listeners need because they do not keep values for callers that arrive after a broadcast.
fn resolve_all(
    registry: &Registry<String, u32>,
    known: &HashSet<String>,
    dispersion: &[String],
    resend: bool,
) {
    for key in dispersion {
        if known.contains(key) {
            continue;
        }

        let (listener, existed) = registry.get_or_create(key.clone());

        let producer =
            (!existed).then(|| broadcast_after(Arc::clone(&listener), PRODUCE_DELAY, VALUE));
        let backstop =
            resend.then(|| broadcast_after(Arc::clone(&listener), RESEND_DELAY, VALUE));

        assert_eq!(listener.wait(), VALUE);

        if let Some(backstop) = backstop {
            backstop.cancel();
        }

        if producer.is_some() {
            registry.delete(key);
        }
    }
}

fn resolve_all_in_parallel(registry: &Registry<String, u32>, keys: &Keys, resend: bool) {
    thread::scope(|s| {
        for dispersion in &keys.dispersions {
            let known = &keys.known;
            s.spawn(move || resolve_all(registry, known, dispersion, resend));
        }
    });
}

fn entrypoint(c: &mut Criterion) {
    let keys = Keys::generate(0x5EED);

    let mut g = c.benchmark_group("registry");

    g.bench_function("get_or_create_hit", |b| {
        let registry = Registry::<String, u32>::with_factory(listeners::once);
        let key = "present".to_string();
        registry.get_or_create(key.clone());

        b.iter(|| black_box(registry.get_or_create(black_box(key.clone()))));
    });

    g.bench_function("get_or_create_then_delete", |b| {
        let registry = Registry::<String, u32>::with_factory(listeners::once);
        let key = "transient".to_string();

        b.iter(|| {
            black_box(registry.get_or_create(black_box(key.clone())));
            black_box(registry.delete(&key));
        });
    });

    g.finish();

    let mut g = c.benchmark_group("coalesce");

    // Every fresh key costs at least one deadline delay.
    g.sample_size(10);

    g.bench_function("once_single_thread", |b| {
        let registry = Registry::<String, u32>::with_factory(listeners::once);
        let dispersion = keys.dispersions.first().expect("at least one dispersion");

        b.iter(|| resolve_all(&registry, &keys.known, dispersion, false));
    });

    g.bench_function("once_multi_thread", |b| {
        let registry = Registry::<String, u32>::with_factory(listeners::once);

        b.iter(|| resolve_all_in_parallel(&registry, &keys, false));
    });

    g.bench_function("resend_single_thread", |b| {
        let registry = Registry::<String, u32>::new();
        let dispersion = keys.dispersions.first().expect("at least one dispersion");

        b.iter(|| resolve_all(&registry, &keys.known, dispersion, true));
    });

    g.bench_function("resend_multi_thread", |b| {
        let registry = Registry::<String, u32>::new();

        b.iter(|| resolve_all_in_parallel(&registry, &keys, true));
    });

    g.finish();

    let mut g = c.benchmark_group("repeat");

    g.bench_function("fan_out", |b| {
        b.iter(|| {
            let listener = Arc::new(RepeatListener::new());
            let shared: SharedListener<u32> = Arc::clone(&listener) as SharedListener<u32>;

            thread::scope(|s| {
                for _ in 0..FAN_OUT_WAITERS {
                    let shared = Arc::clone(&shared);
                    s.spawn(move || assert_eq!(shared.wait(), VALUE));
                }

                while listener.waiter_count() < FAN_OUT_WAITERS {
                    thread::yield_now();
                }

                listener.broadcast(VALUE);
            });
        });
    });

    g.finish();
}

criterion_group!(benches, entrypoint);
criterion_main!(benches);
