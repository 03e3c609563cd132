#![forbid(unsafe_code)]

//! The hash-chained callback registry.
//!
//! Storage is two parallel arrays sized to the same prime capacity:
//!
//! - `entries`: live handles packed densely into `[0, count)`, each
//!   carrying its fingerprint and the 0-based index of the previous entry
//!   in its hash chain (`-1` terminates a chain).
//! - `buckets`: `buckets[hash % capacity]` holds `1 + index` of the chain
//!   head, with `0` meaning "no chain". The 1-offset keeps the full index
//!   domain usable without a separate occupancy flag.
//!
//! Chaining through indices of the dense array is what makes the structure
//! low-allocation: there is no per-subscriber node, and steady-state
//! subscribe/unsubscribe never touch the allocator. Removal swap-compacts
//! the dense prefix (the last live entry moves into the hole), so a full
//! invocation pass is a plain range scan instead of a linked walk.
//!
//! A [`Registry`] is a shared handle (`Rc<RefCell<..>>`, clone to share)
//! in the same manner as the runtime's observable values; all methods take
//! `&self` and no `RefCell` borrow is ever held across a callback
//! invocation.
//!
//! # Invariants
//!
//! 1. `count <= capacity`, and `capacity` is always a prime produced by
//!    [`crate::capacity::table_size_for`].
//! 2. Every live entry is reachable from exactly one bucket by following
//!    `prev` links, and no chain is longer than `capacity`.
//! 3. No two live entries hold equal handles.
//! 4. Slots at indices `>= count` are cleared (`None` handle, hash 0,
//!    `prev == -1`), so a stale chain link can never be dereferenced.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | `Disposed` | any operation after `dispose()` | error, state unchanged |
//! | `Iterating` | mutation while a [`Cursor`] is open | error, state unchanged |
//! | `AlreadySubscribed` | subscribing a duplicate handle | error, state unchanged |
//! | `CollisionLimit` | a chain walk exceeding `capacity` steps | error; internal corruption guard |

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::callback::Fingerprint;
use crate::capacity::{self, DEFAULT_CAPACITY};

/// Errors surfaced by registry operations.
///
/// `Disposed` and `Iterating` are caller-sequencing violations; correct
/// callers never see them. `CollisionLimit` cannot fire unless the
/// internal linkage is corrupt and should be treated as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry was disposed; it is permanently unusable.
    Disposed,
    /// A structural mutation was attempted while a cursor was open.
    Iterating,
    /// An equal handle is already subscribed.
    AlreadySubscribed,
    /// A hash chain walk exceeded the table capacity.
    CollisionLimit,
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disposed => write!(f, "registry has been disposed"),
            Self::Iterating => write!(f, "registry is locked by an open cursor"),
            Self::AlreadySubscribed => write!(f, "handle is already subscribed"),
            Self::CollisionLimit => write!(f, "hash chain walk exceeded table capacity"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// One slot of the dense entry array.
struct Entry<H> {
    handle: Option<H>,
    hash: u32,
    prev: i32,
}

impl<H> Entry<H> {
    fn cleared() -> Self {
        Self {
            handle: None,
            hash: 0,
            prev: -1,
        }
    }

    fn clear(&mut self) {
        self.handle = None;
        self.hash = 0;
        self.prev = -1;
    }
}

fn cleared_entries<H>(len: usize) -> Vec<Entry<H>> {
    let mut entries = Vec::with_capacity(len);
    entries.resize_with(len, Entry::cleared);
    entries
}

struct Inner<H> {
    buckets: Vec<u32>,
    entries: Vec<Entry<H>>,
    capacity: usize,
    count: usize,
    /// Open-cursor depth. A depth count rather than a flag, so a nested
    /// cursor dropped early cannot unlock an outer pass.
    live_cursors: u32,
    disposed: bool,
}

impl<H> Inner<H> {
    fn check_mutable(&self) -> Result<(), RegistryError> {
        if self.disposed {
            return Err(RegistryError::Disposed);
        }
        if self.live_cursors > 0 {
            return Err(RegistryError::Iterating);
        }
        Ok(())
    }

    fn bucket_of(&self, hash: u32) -> usize {
        (hash as usize) % self.capacity
    }

    fn grow(&mut self) {
        let next = capacity::grow_size(self.capacity);
        debug!(from = self.capacity, to = next, count = self.count, "growing registry");

        let source = std::mem::take(&mut self.entries);
        self.capacity = next;
        self.buckets = vec![0; next];

        // Re-home live entries in index order; stored hashes are reused,
        // only the bucket linkage is recomputed against the new table.
        let mut entries: Vec<Entry<H>> = Vec::with_capacity(next);
        for (index, mut entry) in source.into_iter().take(self.count).enumerate() {
            let bucket = (entry.hash as usize) % next;
            entry.prev = self.buckets[bucket] as i32 - 1;
            self.buckets[bucket] = (index + 1) as u32;
            entries.push(entry);
        }
        entries.resize_with(next, Entry::cleared);
        self.entries = entries;
    }

    /// Unlink the entry at `index` from its chain (`pred` is the chain
    /// node visited just before it, `-1` if it was the head), then
    /// swap-compact the dense prefix.
    fn remove_at(&mut self, index: usize, pred: i32, bucket: usize) -> Result<(), RegistryError> {
        enum Link {
            Bucket(usize),
            Chain(usize),
        }

        let removed_prev = self.entries[index].prev;
        let last = self.count - 1;

        // Swap-compaction moves the last live entry into the hole, so
        // exactly one link must be repointed from `last` to `index`.
        // Resolve that link before mutating anything: a corrupted chain
        // then surfaces as an error with the table untouched.
        let repoint = if index == last {
            None
        } else if removed_prev == last as i32 {
            // The removed entry sits directly in front of the moved one
            // in its chain; the unlink below hands its predecessor the
            // reference to `last`.
            Some(if pred < 0 {
                Link::Bucket(bucket)
            } else {
                Link::Chain(pred as usize)
            })
        } else {
            let moved_bucket = (self.entries[last].hash as usize) % self.capacity;
            if self.buckets[moved_bucket] as i32 - 1 == last as i32 {
                Some(Link::Bucket(moved_bucket))
            } else {
                let mut steps = 0usize;
                let mut walk = self.buckets[moved_bucket] as i32 - 1;
                loop {
                    if walk < 0 || steps > self.capacity {
                        return Err(RegistryError::CollisionLimit);
                    }
                    if self.entries[walk as usize].prev == last as i32 {
                        break;
                    }
                    walk = self.entries[walk as usize].prev;
                    steps += 1;
                }
                Some(Link::Chain(walk as usize))
            }
        };

        if pred < 0 {
            self.buckets[bucket] = (removed_prev + 1) as u32;
        } else {
            self.entries[pred as usize].prev = removed_prev;
        }
        self.count = last;

        let Some(link) = repoint else {
            self.entries[index].clear();
            return Ok(());
        };
        match link {
            Link::Bucket(head) => self.buckets[head] = (index + 1) as u32,
            Link::Chain(node) => self.entries[node].prev = index as i32,
        }
        let moved = std::mem::replace(&mut self.entries[last], Entry::cleared());
        self.entries[index] = moved;
        Ok(())
    }
}

/// A publish/subscribe registry of callback handles with amortized O(1)
/// subscribe/unsubscribe and zero steady-state heap allocation.
///
/// Cloning a `Registry` yields another handle to the **same** storage.
///
/// ```
/// use fanout_core::{Callback, Registry};
///
/// let registry: Registry<Callback<dyn Fn()>> = Registry::new();
/// let handle = Callback::<dyn Fn()>::new(|| {});
///
/// registry.subscribe(handle.clone()).unwrap();
/// assert_eq!(registry.len(), 1);
///
/// registry.unsubscribe(&handle).unwrap();
/// assert!(registry.is_empty());
/// ```
pub struct Registry<H> {
    inner: Rc<RefCell<Inner<H>>>,
}

// Manual Clone: shares the same storage regardless of `H: Clone`.
impl<H> Clone for Registry<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<H> std::fmt::Debug for Registry<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Registry")
            .field("count", &inner.count)
            .field("capacity", &inner.capacity)
            .field("disposed", &inner.disposed)
            .finish()
    }
}

impl<H: Fingerprint + PartialEq + Clone> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Fingerprint + PartialEq + Clone> Registry<H> {
    /// Create a registry with the default capacity
    /// ([`DEFAULT_CAPACITY`], already prime).
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a registry able to hold at least `requested` handles before
    /// its first grow. The actual capacity is the next usable table size.
    #[must_use]
    pub fn with_capacity(requested: usize) -> Self {
        let capacity = capacity::table_size_for(requested);
        Self {
            inner: Rc::new(RefCell::new(Inner {
                buckets: vec![0; capacity],
                entries: cleared_entries(capacity),
                capacity,
                count: 0,
                live_cursors: 0,
                disposed: false,
            })),
        }
    }

    /// Number of currently subscribed handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().count
    }

    /// Whether no handles are subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current table capacity. Grows (never shrinks) on demand; zero once
    /// disposed.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.borrow().capacity
    }

    /// Whether [`Registry::dispose`] has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().disposed
    }

    /// Subscribe `handle`.
    ///
    /// Amortized O(1); O(count) when a grow is triggered. Fails with
    /// [`RegistryError::AlreadySubscribed`] if an equal handle is live.
    pub fn subscribe(&self, handle: H) -> Result<(), RegistryError> {
        let mut inner = self.inner.borrow_mut();
        inner.check_mutable()?;

        if inner.count >= inner.capacity {
            inner.grow();
        }

        let hash = handle.fingerprint();
        let bucket = inner.bucket_of(hash);

        // Duplicate scan over the target chain before appending.
        let head = inner.buckets[bucket] as i32 - 1;
        let mut steps = 0usize;
        let mut walk = head;
        while walk >= 0 {
            let entry = &inner.entries[walk as usize];
            if entry.handle.as_ref() == Some(&handle) {
                return Err(RegistryError::AlreadySubscribed);
            }
            walk = entry.prev;
            steps += 1;
            if steps > inner.capacity {
                return Err(RegistryError::CollisionLimit);
            }
        }

        let slot = inner.count;
        inner.entries[slot] = Entry {
            handle: Some(handle),
            hash,
            prev: head,
        };
        inner.count += 1;
        inner.buckets[bucket] = inner.count as u32; // slot + 1
        trace!(slot, hash, "subscribed");
        Ok(())
    }

    /// Unsubscribe the live handle equal to `handle`.
    ///
    /// Amortized O(1). Removing a handle that is not subscribed is a
    /// no-op, not an error.
    pub fn unsubscribe(&self, handle: &H) -> Result<(), RegistryError> {
        let mut inner = self.inner.borrow_mut();
        inner.check_mutable()?;

        let hash = handle.fingerprint();
        let bucket = inner.bucket_of(hash);

        let mut pred: i32 = -1;
        let mut steps = 0usize;
        let mut walk = inner.buckets[bucket] as i32 - 1;
        while walk >= 0 {
            let index = walk as usize;
            if inner.entries[index].handle.as_ref() == Some(handle) {
                inner.remove_at(index, pred, bucket)?;
                trace!(slot = index, hash, "unsubscribed");
                return Ok(());
            }
            pred = walk;
            walk = inner.entries[index].prev;
            steps += 1;
            if steps > inner.capacity {
                return Err(RegistryError::CollisionLimit);
            }
        }
        Ok(())
    }

    /// Snapshot of all live handles in storage order. O(count).
    ///
    /// Allowed while a cursor is open; only the dense prefix is read.
    pub fn to_vec(&self) -> Result<Vec<H>, RegistryError> {
        let inner = self.inner.borrow();
        if inner.disposed {
            return Err(RegistryError::Disposed);
        }
        Ok(inner.entries[..inner.count]
            .iter()
            .filter_map(|entry| entry.handle.clone())
            .collect())
    }

    /// Open an iteration cursor over the handles currently subscribed.
    ///
    /// While any cursor is open, `subscribe` and `unsubscribe` fail with
    /// [`RegistryError::Iterating`]; the lock is released when the cursor
    /// is dropped, on every exit path.
    pub fn cursor(&self) -> Result<Cursor<H>, RegistryError> {
        let mut inner = self.inner.borrow_mut();
        if inner.disposed {
            return Err(RegistryError::Disposed);
        }
        inner.live_cursors += 1;
        let count = inner.count;
        drop(inner);
        Ok(Cursor {
            inner: Rc::clone(&self.inner),
            index: 0,
            count,
        })
    }

    /// Dispose the registry: clear every live slot, release both arrays,
    /// and enter the terminal disposed state.
    ///
    /// Idempotent and infallible; only the first call has any effect.
    /// Every other operation fails with [`RegistryError::Disposed`]
    /// afterwards.
    pub fn dispose(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.disposed {
            return;
        }
        debug!(count = inner.count, "disposing registry");
        inner.entries = Vec::new();
        inner.buckets = Vec::new();
        inner.count = 0;
        inner.capacity = 0;
        inner.disposed = true;
    }

    /// Recompute chain reachability from scratch and cross-check every
    /// structural invariant, independently of the operations that
    /// maintained them. Intended for tests; O(count²).
    pub fn debug_validate(&self) -> Result<(), String> {
        let inner = self.inner.borrow();
        if inner.disposed {
            if inner.count != 0 || !inner.entries.is_empty() || !inner.buckets.is_empty() {
                return Err("disposed registry still holds storage".into());
            }
            return Ok(());
        }
        if inner.entries.len() != inner.capacity || inner.buckets.len() != inner.capacity {
            return Err("array lengths disagree with capacity".into());
        }
        if inner.count > inner.capacity {
            return Err(format!(
                "count {} exceeds capacity {}",
                inner.count, inner.capacity
            ));
        }

        for index in 0..inner.count {
            let entry = &inner.entries[index];
            let Some(handle) = entry.handle.as_ref() else {
                return Err(format!("live slot {index} holds no handle"));
            };
            if handle.fingerprint() != entry.hash {
                return Err(format!("slot {index} stores a stale fingerprint"));
            }
            for earlier in 0..index {
                if inner.entries[earlier].handle.as_ref() == Some(handle) {
                    return Err(format!("slots {earlier} and {index} hold equal handles"));
                }
            }
        }
        for (index, entry) in inner.entries.iter().enumerate().skip(inner.count) {
            if entry.handle.is_some() || entry.hash != 0 || entry.prev != -1 {
                return Err(format!("slot {index} past the live range is not cleared"));
            }
        }

        let mut seen = vec![false; inner.count];
        for (bucket, &head) in inner.buckets.iter().enumerate() {
            let mut steps = 0usize;
            let mut walk = head as i32 - 1;
            while walk >= 0 {
                let index = walk as usize;
                if index >= inner.count {
                    return Err(format!("bucket {bucket} chain reaches dead slot {index}"));
                }
                if seen[index] {
                    return Err(format!("entry {index} is reachable twice"));
                }
                seen[index] = true;
                let entry = &inner.entries[index];
                if (entry.hash as usize) % inner.capacity != bucket {
                    return Err(format!(
                        "entry {index} filed under bucket {bucket}, fingerprint routes to {}",
                        (entry.hash as usize) % inner.capacity
                    ));
                }
                walk = entry.prev;
                steps += 1;
                if steps > inner.capacity {
                    return Err(format!("bucket {bucket} chain exceeds capacity"));
                }
            }
        }
        if let Some(index) = seen.iter().position(|reached| !reached) {
            return Err(format!("entry {index} is unreachable from any bucket"));
        }
        Ok(())
    }
}

/// A finite, non-restartable cursor over the handles present when it was
/// opened.
///
/// Holding a cursor locks the registry against structural mutation;
/// dropping it releases the lock on every exit path, including unwinding
/// out of a callback mid-pass. Handles are yielded strictly in storage
/// order over the range captured at open time. No `RefCell` borrow is
/// held between steps, so a callback invoked with a yielded handle can
/// still reach the registry — and gets a proper [`RegistryError::Iterating`]
/// instead of a borrow panic if it tries to mutate.
pub struct Cursor<H> {
    inner: Rc<RefCell<Inner<H>>>,
    index: usize,
    count: usize,
}

impl<H> Cursor<H> {
    /// Handles not yet yielded from the captured range.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.count.saturating_sub(self.index)
    }
}

impl<H: Clone> Iterator for Cursor<H> {
    type Item = H;

    fn next(&mut self) -> Option<H> {
        if self.index >= self.count {
            return None;
        }
        let slot = self.index;
        self.index += 1;
        // Storage only changes under an open cursor if the registry was
        // disposed mid-pass; the scan then ends early.
        let inner = self.inner.borrow();
        inner.entries.get(slot).and_then(|entry| entry.handle.clone())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (0, Some(remaining))
    }
}

impl<H> Drop for Cursor<H> {
    fn drop(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.live_cursors = inner.live_cursors.saturating_sub(1);
    }
}

impl<H> std::fmt::Debug for Cursor<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("index", &self.index)
            .field("count", &self.count)
            .finish()
    }
}
