#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Keyed request coalescing.
//!
//! When many threads ask for "the same thing" at the same time, only one of them should do the
//! work and everyone else should receive its result. This crate provides the two building blocks
//! for that pattern:
//!
//! * A [`Listener`] is the pending-or-resolved result for one key. A producer delivers a value
//!   with [`Listener::broadcast()`], consumers obtain it with [`Listener::wait()`] (blocking) or
//!   [`Listener::receive()`] (non-blocking).
//! * A [`Registry`] maps keys to listeners and guarantees that concurrent first-time requests for
//!   a key agree on exactly one listener instance. The single caller that created it is told so
//!   and becomes responsible for broadcasting the result.
//!
//! Two delivery policies are provided:
//!
//! * [`RepeatListener`] delivers each broadcast to the waiters suspended at the moment it fires.
//!   Waiters arriving later wait for the next broadcast. This is the registry default.
//! * [`OnceListener`] keeps the first broadcast forever. Every past and future waiter observes
//!   that value and later broadcasts are ignored.
//!
//! # Example
//!
//! ```rust
//! use std::thread;
//!
//! use listeners::Registry;
//!
//! let registry = Registry::<&str, u32>::with_factory(listeners::once);
//!
//! thread::scope(|s| {
//!     for _ in 0..4 {
//!         s.spawn(|| {
//!             let (listener, existed) = registry.get_or_create("answer");
//!
//!             if !existed {
//!                 // We are the one caller responsible for producing the value.
//!                 listener.broadcast(42);
//!             }
//!
//!             assert_eq!(listener.wait(), 42);
//!         });
//!     }
//! });
//!
//! assert_eq!(registry.len(), 1);
//! ```
//!
//! # Waiting forever
//!
//! [`Listener::wait()`] has no timeout. If no broadcast ever happens, the waiting thread stays
//! suspended for the rest of the process lifetime, together with everything it owns. Producers
//! guarantee forward progress, for example by arming a [`broadcast_after()`] deadline that
//! delivers a sentinel value if the real result does not arrive in time.
//!
//! # Cleanup
//!
//! The registry never evicts anything on its own. Resolved entries stay bound to their key until
//! [`Registry::delete()`] is called, typically by the producer right after broadcasting.

mod builder;
mod deadline;
mod listener;
mod one_shot;
mod registry;
mod repeating;

pub use builder::*;
pub use deadline::*;
pub use listener::*;
pub use one_shot::*;
pub use registry::*;
pub use repeating::*;
