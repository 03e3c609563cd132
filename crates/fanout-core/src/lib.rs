#![forbid(unsafe_code)]

//! Core: the hash-chained, low-allocation callback registry.
//!
//! # Role in fanout
//! `fanout-core` owns the storage structure underneath the `fanout`
//! wrappers: prime-sized bucket tables, a dense entry array chained through
//! indices, the cursor that locks the table during an invocation pass, and
//! the disposal lifecycle.
//!
//! # Primary responsibilities
//! - **capacity**: prime table sizing and growth.
//! - **callback**: opaque, identity-compared callback handles and the
//!   [`Fingerprint`] bucket-routing hash.
//! - **registry**: subscribe/unsubscribe/snapshot/iterate/dispose with
//!   amortized O(1) mutation and zero steady-state heap allocation.
//!
//! # How it fits in the system
//! The `fanout` crate layers two invocation flavors on top: `Notifier`
//! (no-argument multicast) and `Broadcast<E>` (typed event bus with a
//! mutable payload reference). Both drive this registry once per logical
//! tick of the embedding program. Everything here is single-threaded by
//! design; there is no internal locking, only the structural cursor guard.

pub mod callback;
pub mod capacity;
pub mod registry;

pub use callback::{Callback, Fingerprint};
pub use capacity::DEFAULT_CAPACITY;
pub use registry::{Cursor, Registry, RegistryError};
