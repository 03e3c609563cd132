//! Property-based invariant tests for the fanout-core registry.
//!
//! These tests verify structural invariants that must hold for **any**
//! sequence of subscribe/unsubscribe operations, with fingerprints chosen
//! to force heavy bucket collisions:
//!
//! 1. `to_vec()` always equals a swap-remove `Vec` model, element for
//!    element (dense storage order is deterministic).
//! 2. No two live handles are ever equal, and duplicate subscription
//!    leaves the registry unchanged.
//! 3. Unsubscribing an absent handle is a no-op.
//! 4. Chain linkage survives every operation: each live entry is
//!    reachable from exactly one bucket, tail slots are cleared, and no
//!    chain exceeds the capacity (checked by an independent
//!    recomputation, `debug_validate`).
//! 5. Growth preserves membership and order.
//! 6. Disposal is idempotent and terminal.
//!
//! Invariant 4 is the interesting one: the swap-compaction on removal has
//! to redirect the one link that referenced the relocated entry's old
//! slot, and the edge cases (moved entry is a chain head vs. mid-chain)
//! only show up under collision-heavy histories like the ones generated
//! here.

use fanout_core::{Fingerprint, Registry, RegistryError};
use proptest::prelude::*;

/// Test handle: routing fingerprint plus a distinct identity.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Key {
    fingerprint: u32,
    id: u32,
}

impl Fingerprint for Key {
    fn fingerprint(&self) -> u32 {
        self.fingerprint
    }
}

/// Keys draw fingerprints from a tiny domain so chains stay long and
/// collide across growth boundaries.
fn key_strategy() -> impl Strategy<Value = Key> {
    (0u32..6, 0u32..48).prop_map(|(fingerprint, id)| Key { fingerprint, id })
}

#[derive(Clone, Debug)]
enum Op {
    Subscribe(Key),
    Unsubscribe(Key),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => key_strategy().prop_map(Op::Subscribe),
        1 => key_strategy().prop_map(Op::Unsubscribe),
    ]
}

fn op_sequence(max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(op_strategy(), 0..=max_len)
}

/// Apply one operation to both the registry and the `Vec` model. The
/// model mirrors dense storage exactly: append on subscribe, swap-remove
/// on unsubscribe.
fn apply(registry: &Registry<Key>, model: &mut Vec<Key>, op: &Op) {
    match op {
        Op::Subscribe(key) => match registry.subscribe(key.clone()) {
            Ok(()) => model.push(key.clone()),
            Err(RegistryError::AlreadySubscribed) => {
                assert!(model.contains(key), "spurious duplicate rejection");
            }
            Err(other) => panic!("unexpected subscribe error: {other}"),
        },
        Op::Unsubscribe(key) => {
            registry.unsubscribe(key).expect("unsubscribe failed");
            if let Some(position) = model.iter().position(|live| live == key) {
                model.swap_remove(position);
            }
        }
    }
}

proptest! {
    // ─────────────────────────────────────────────────────────────────
    // 1 + 2 + 3 + 4: registry matches the model after every operation
    // ─────────────────────────────────────────────────────────────────
    #[test]
    fn registry_matches_swap_remove_model(ops in op_sequence(120), requested in 0usize..10) {
        let registry = Registry::with_capacity(requested);
        let mut model: Vec<Key> = Vec::new();

        for op in &ops {
            apply(&registry, &mut model, op);
            prop_assert_eq!(registry.len(), model.len());
            prop_assert_eq!(&registry.to_vec().unwrap(), &model);
            let validation = registry.debug_validate();
            prop_assert!(validation.is_ok(), "invariant broken: {:?}", validation);
        }
    }

    // ─────────────────────────────────────────────────────────────────
    // 5: growth preserves membership and order
    // ─────────────────────────────────────────────────────────────────
    #[test]
    fn growth_preserves_membership(count in 1usize..64, fingerprints in proptest::collection::vec(0u32..6, 64)) {
        let registry = Registry::with_capacity(2);
        let keys: Vec<Key> = (0..count)
            .map(|id| Key { fingerprint: fingerprints[id], id: id as u32 })
            .collect();

        for key in &keys {
            registry.subscribe(key.clone()).unwrap();
        }

        prop_assert!(registry.capacity() >= count);
        prop_assert_eq!(registry.to_vec().unwrap(), keys);
        prop_assert!(registry.debug_validate().is_ok());
    }

    // ─────────────────────────────────────────────────────────────────
    // 2: duplicate subscription leaves state untouched
    // ─────────────────────────────────────────────────────────────────
    #[test]
    fn duplicate_subscribe_changes_nothing(ops in op_sequence(40), dup in key_strategy()) {
        let registry = Registry::with_capacity(3);
        let mut model: Vec<Key> = Vec::new();
        for op in &ops {
            apply(&registry, &mut model, op);
        }
        registry.subscribe(dup.clone()).ok();
        let before = registry.to_vec().unwrap();

        prop_assert_eq!(
            registry.subscribe(dup),
            Err(RegistryError::AlreadySubscribed)
        );
        prop_assert_eq!(registry.to_vec().unwrap(), before);
        prop_assert!(registry.debug_validate().is_ok());
    }

    // ─────────────────────────────────────────────────────────────────
    // 6: disposal is idempotent and terminal
    // ─────────────────────────────────────────────────────────────────
    #[test]
    fn dispose_is_idempotent_and_terminal(ops in op_sequence(40), probe in key_strategy()) {
        let registry = Registry::with_capacity(5);
        let mut model: Vec<Key> = Vec::new();
        for op in &ops {
            apply(&registry, &mut model, op);
        }

        registry.dispose();
        registry.dispose();

        prop_assert!(registry.is_disposed());
        prop_assert_eq!(registry.len(), 0);
        prop_assert_eq!(registry.subscribe(probe.clone()), Err(RegistryError::Disposed));
        prop_assert_eq!(registry.unsubscribe(&probe), Err(RegistryError::Disposed));
        prop_assert_eq!(registry.to_vec(), Err(RegistryError::Disposed));
        prop_assert!(registry.debug_validate().is_ok());
    }

    // ─────────────────────────────────────────────────────────────────
    // Guard: the cursor locks out mutation for any prior history
    // ─────────────────────────────────────────────────────────────────
    #[test]
    fn cursor_locks_mutation_for_any_history(ops in op_sequence(40), probe in key_strategy()) {
        let registry = Registry::with_capacity(5);
        let mut model: Vec<Key> = Vec::new();
        for op in &ops {
            apply(&registry, &mut model, op);
        }

        let cursor = registry.cursor().unwrap();
        prop_assert_eq!(
            registry.subscribe(probe.clone()),
            Err(RegistryError::Iterating)
        );
        prop_assert_eq!(registry.unsubscribe(&probe), Err(RegistryError::Iterating));

        // The cursor still yields exactly the snapshot, in order.
        let yielded: Vec<Key> = cursor.collect();
        prop_assert_eq!(&yielded, &model);

        // Dropped cursor releases the lock.
        registry.unsubscribe(&probe).unwrap();
        prop_assert!(registry.debug_validate().is_ok());
    }
}
