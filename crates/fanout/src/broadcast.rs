#![forbid(unsafe_code)]

//! Typed event bus delivering a mutable payload reference.
//!
//! [`Broadcast<E>`] fires every subscribed [`Handler<E>`] with `&mut E`,
//! so handlers can both read and amend the event as it flows through the
//! subscriber list in subscription order.
//!
//! One bus per payload type can also be obtained lazily through
//! [`Broadcast::shared`]. The whole system is single-threaded by design,
//! so the shared instance is thread-local: each thread that asks gets its
//! own bus for `E`.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use fanout_core::{Callback, Registry, RegistryError};
use tracing::trace;

/// A typed event handler, called with a mutable reference to the payload.
pub type Handler<E> = Callback<dyn Fn(&mut E)>;

/// An event bus for payload type `E`.
///
/// Cloning a `Broadcast` yields another handle to the same registry.
///
/// ```
/// use fanout::{Broadcast, Handler};
///
/// struct Damage {
///     amount: u32,
/// }
///
/// let bus = Broadcast::new();
/// let handler = Handler::new(|event: &mut Damage| event.amount *= 2);
/// bus.subscribe(handler).unwrap();
///
/// let mut event = Damage { amount: 10 };
/// bus.emit(&mut event).unwrap();
/// assert_eq!(event.amount, 20);
/// ```
pub struct Broadcast<E: 'static> {
    registry: Registry<Handler<E>>,
}

// Manual Clone/Default/Debug: none of them require anything of `E`.
impl<E: 'static> Clone for Broadcast<E> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<E: 'static> Default for Broadcast<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> std::fmt::Debug for Broadcast<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcast")
            .field("len", &self.len())
            .finish()
    }
}

thread_local! {
    /// Per-thread map from payload type to its shared bus, type-erased.
    static SHARED: RefCell<HashMap<TypeId, Box<dyn Any>>> = RefCell::new(HashMap::new());
}

impl<E: 'static> Broadcast<E> {
    /// Bus with the default registry capacity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    /// Bus sized for at least `capacity` subscribers before growing.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            registry: Registry::with_capacity(capacity),
        }
    }

    /// The lazily-created shared bus for payload type `E` on this thread.
    ///
    /// Every call returns a handle to the same underlying registry, so
    /// subscriptions made through one handle are visible to all of them.
    #[must_use]
    pub fn shared() -> Self {
        SHARED.with(|map| {
            let mut map = map.borrow_mut();
            map.entry(TypeId::of::<E>())
                .or_insert_with(|| Box::new(Self::new()))
                .downcast_ref::<Self>()
                .expect("shared entry keyed by TypeId::of::<E> holds a Broadcast<E>")
                .clone()
        })
    }

    /// Subscribe a handler. Keep a clone of it to unsubscribe later.
    pub fn subscribe(&self, handler: Handler<E>) -> Result<(), RegistryError> {
        self.registry.subscribe(handler)
    }

    /// Unsubscribe a previously subscribed handler; a no-op if absent.
    pub fn unsubscribe(&self, handler: &Handler<E>) -> Result<(), RegistryError> {
        self.registry.unsubscribe(handler)
    }

    /// Snapshot of the subscribed handlers in invocation order.
    pub fn to_vec(&self) -> Result<Vec<Handler<E>>, RegistryError> {
        self.registry.to_vec()
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Whether no handlers are subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Deliver `event` to every currently subscribed handler once, in
    /// subscription order, each receiving a mutable reference to the same
    /// payload.
    ///
    /// The registry is locked for the duration of the pass: a handler
    /// that tries to subscribe or unsubscribe gets
    /// [`RegistryError::Iterating`]. A panicking handler propagates after
    /// the lock is released.
    pub fn emit(&self, event: &mut E) -> Result<(), RegistryError> {
        let cursor = self.registry.cursor()?;
        trace!(count = cursor.remaining(), "emit pass");
        for handler in cursor {
            handler.call(event);
        }
        Ok(())
    }

    /// Dispose the underlying registry. Idempotent; afterwards every
    /// operation except another `dispose` fails with
    /// [`RegistryError::Disposed`].
    pub fn dispose(&self) {
        self.registry.dispose();
    }
}

/// Convenience for handlers bound to a receiver object: the receiver's
/// identity routes the handler's hash bucket and is kept alive by the
/// handle.
pub fn bound_handler<E: 'static, R: 'static>(
    receiver: &Rc<R>,
    func: impl Fn(&mut E) + 'static,
) -> Handler<E> {
    Handler::bound(receiver, func)
}
