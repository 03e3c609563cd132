#![forbid(unsafe_code)]

//! Low-allocation multicast notifier and typed event bus.
//!
//! # Role in fanout
//! This crate is the invocation layer over `fanout-core`: it decides the
//! call shape of the callbacks and drives a full registry scan on demand,
//! typically once per logical tick of the embedding program.
//!
//! # Primary responsibilities
//! - **[`Notifier`]**: fires every subscribed no-argument callback.
//! - **[`Broadcast<E>`]**: fires every subscribed handler with a mutable
//!   reference to a caller-supplied payload, and offers a lazily-created
//!   shared bus per payload type.
//!
//! # How it fits in the system
//! Both wrappers are thin: subscription, duplicate detection, snapshotting
//! and the iteration lock all live in `fanout_core::Registry`. Everything
//! is single-threaded; callbacks that want to subscribe or unsubscribe
//! mid-pass get [`RegistryError::Iterating`] and must defer the mutation
//! until the pass completes.
//!
//! ```
//! use fanout::{Notifier, Thunk};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let notifier = Notifier::new();
//! let hits = Rc::new(Cell::new(0));
//!
//! let hits_in = Rc::clone(&hits);
//! let thunk = Thunk::new(move || hits_in.set(hits_in.get() + 1));
//! notifier.subscribe(thunk.clone()).unwrap();
//!
//! notifier.notify().unwrap();
//! assert_eq!(hits.get(), 1);
//!
//! notifier.unsubscribe(&thunk).unwrap();
//! notifier.notify().unwrap();
//! assert_eq!(hits.get(), 1);
//! ```

pub mod broadcast;
pub mod notifier;

pub use broadcast::{Broadcast, Handler};
pub use fanout_core::{Callback, Fingerprint, Registry, RegistryError};
pub use notifier::{Notifier, Thunk};
