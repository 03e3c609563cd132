#![forbid(unsafe_code)]

//! No-argument multicast notifier.

use fanout_core::{Callback, Registry, RegistryError};
use tracing::trace;

/// A no-argument callback handle.
pub type Thunk = Callback<dyn Fn()>;

/// Invokes every subscribed [`Thunk`] on demand, in subscription order.
///
/// Cloning a `Notifier` yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct Notifier {
    registry: Registry<Thunk>,
}

impl Notifier {
    /// Notifier with the default registry capacity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    /// Notifier sized for at least `capacity` subscribers before growing.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            registry: Registry::with_capacity(capacity),
        }
    }

    /// Subscribe a thunk. Keep a clone of it to unsubscribe later.
    pub fn subscribe(&self, thunk: Thunk) -> Result<(), RegistryError> {
        self.registry.subscribe(thunk)
    }

    /// Unsubscribe a previously subscribed thunk; a no-op if absent.
    pub fn unsubscribe(&self, thunk: &Thunk) -> Result<(), RegistryError> {
        self.registry.unsubscribe(thunk)
    }

    /// Snapshot of the subscribed thunks in invocation order.
    pub fn to_vec(&self) -> Result<Vec<Thunk>, RegistryError> {
        self.registry.to_vec()
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Whether no thunks are subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Invoke every currently subscribed thunk once, in subscription
    /// order.
    ///
    /// The registry is locked for the duration of the pass: a thunk that
    /// tries to subscribe or unsubscribe gets
    /// [`RegistryError::Iterating`]. A panicking thunk propagates after
    /// the lock is released.
    pub fn notify(&self) -> Result<(), RegistryError> {
        let cursor = self.registry.cursor()?;
        trace!(count = cursor.remaining(), "notify pass");
        for thunk in cursor {
            thunk.call();
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

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("len", &self.len())
            .finish()
    }
}
