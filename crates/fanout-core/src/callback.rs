#![forbid(unsafe_code)]

//! Callback handles and their hash identity.
//!
//! A [`Callback`] is an opaque, clonable handle to a unit of deferred
//! work: a shared function plus an optional bound receiver. Handles
//! compare equal iff they share the same function allocation, so clones
//! of the handle returned at subscription time are the currency for
//! duplicate detection and unsubscription. This replaces delegate
//! method/target reflection with plain allocation identity.
//!
//! The [`Fingerprint`] trait supplies the registry's bucket-routing hash:
//! the identity of the bound receiver when one is present, otherwise the
//! identity of the function itself. It is a routing key only — equal
//! handles always have equal fingerprints, but equal fingerprints do not
//! imply equal handles.

use std::any::Any;
use std::rc::Rc;

/// Bucket-routing hash for registry handles.
///
/// Implementations must be stable for the lifetime of the handle and
/// consistent with equality: `a == b` implies
/// `a.fingerprint() == b.fingerprint()`. Collisions between unequal
/// handles are expected and handled by chaining.
pub trait Fingerprint {
    /// Stable hash of this handle's identity.
    fn fingerprint(&self) -> u32;
}

/// An opaque callback handle: a shared function plus an optional receiver
/// the function is bound to.
///
/// `F` is the unsized call shape, e.g. `dyn Fn()` or `dyn Fn(&mut E)`.
/// Cloning is cheap (two reference-count bumps) and clones compare equal
/// to the original.
pub struct Callback<F: ?Sized> {
    func: Rc<F>,
    /// Held strongly so the address backing [`Fingerprint`] cannot be
    /// recycled while any clone of the handle is live.
    receiver: Option<Rc<dyn Any>>,
}

impl<F: ?Sized> Callback<F> {
    /// Whether this handle was bound to a receiver at construction.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.receiver.is_some()
    }
}

impl Callback<dyn Fn()> {
    /// Wrap a free function or closure taking no arguments.
    pub fn new(func: impl Fn() + 'static) -> Self {
        Self {
            func: Rc::new(func),
            receiver: None,
        }
    }

    /// Wrap a closure bound to `receiver`. The receiver's identity becomes
    /// the handle's fingerprint, so callbacks bound to one receiver land
    /// in the same hash chain.
    pub fn bound<R: 'static>(receiver: &Rc<R>, func: impl Fn() + 'static) -> Self {
        let receiver: Rc<dyn Any> = receiver.clone();
        Self {
            func: Rc::new(func),
            receiver: Some(receiver),
        }
    }

    /// Invoke the callback.
    pub fn call(&self) {
        (self.func)();
    }
}

impl<E: 'static> Callback<dyn Fn(&mut E)> {
    /// Wrap a free function or closure taking a mutable payload reference.
    pub fn new(func: impl Fn(&mut E) + 'static) -> Self {
        Self {
            func: Rc::new(func),
            receiver: None,
        }
    }

    /// Wrap a payload closure bound to `receiver`; see
    /// [`Callback::<dyn Fn()>::bound`].
    pub fn bound<R: 'static>(receiver: &Rc<R>, func: impl Fn(&mut E) + 'static) -> Self {
        let receiver: Rc<dyn Any> = receiver.clone();
        Self {
            func: Rc::new(func),
            receiver: Some(receiver),
        }
    }

    /// Invoke the callback with `event`.
    pub fn call(&self, event: &mut E) {
        (self.func)(event);
    }
}

// Manual Clone: `F` itself need not be `Clone`, only the `Rc`s are copied.
impl<F: ?Sized> Clone for Callback<F> {
    fn clone(&self) -> Self {
        Self {
            func: Rc::clone(&self.func),
            receiver: self.receiver.clone(),
        }
    }
}

/// Identity equality: same function allocation, regardless of receiver.
impl<F: ?Sized> PartialEq for Callback<F> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.func, &other.func)
    }
}

impl<F: ?Sized> Eq for Callback<F> {}

impl<F: ?Sized> Fingerprint for Callback<F> {
    fn fingerprint(&self) -> u32 {
        let addr = match &self.receiver {
            Some(receiver) => Rc::as_ptr(receiver).cast::<()>() as usize,
            None => Rc::as_ptr(&self.func).cast::<()>() as usize,
        };
        fold_addr(addr)
    }
}

impl<F: ?Sized> std::fmt::Debug for Callback<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callback")
            .field("func", &Rc::as_ptr(&self.func).cast::<()>())
            .field("bound", &self.receiver.is_some())
            .finish()
    }
}

/// Fold a pointer-width address into the 32-bit fingerprint domain.
/// Allocator alignment zeroes the low bits, so the high half is mixed in
/// rather than truncated away.
fn fold_addr(addr: usize) -> u32 {
    let wide = addr as u64;
    ((wide >> 32) ^ wide) as u32
}
