#![forbid(unsafe_code)]

//! Prime table sizing.
//!
//! Bucket counts are always prime so that `hash % capacity` spreads
//! clustered identity hashes across the table. Sizes are found by trial
//! division starting from a floor of [`MIN_TABLE_SIZE`]; growth doubles
//! the current size and rounds up to the next prime. Both functions are
//! pure and total: every integer eventually reaches a prime.

/// Smallest usable table size (also the smallest prime).
pub const MIN_TABLE_SIZE: usize = 2;

/// Default requested capacity for a new registry.
pub const DEFAULT_CAPACITY: usize = 7;

/// Factor applied to the current size before re-priming on growth.
const GROWTH_FACTOR: usize = 2;

/// Round `requested` up to the smallest usable table size: the first
/// prime `>= max(requested, MIN_TABLE_SIZE)`.
#[must_use]
pub fn table_size_for(requested: usize) -> usize {
    let mut size = requested.max(MIN_TABLE_SIZE);
    while !is_prime(size) {
        size += 1;
    }
    size
}

/// The table size after growing from `current`.
#[must_use]
pub fn grow_size(current: usize) -> usize {
    table_size_for(current * GROWTH_FACTOR)
}

/// Trial-division primality check; divisor range is bounded by √value,
/// which is plenty for table-size magnitudes.
fn is_prime(value: usize) -> bool {
    if value < MIN_TABLE_SIZE {
        return false;
    }
    let mut divisor = MIN_TABLE_SIZE;
    while divisor * divisor <= value {
        if value % divisor == 0 {
            return false;
        }
        divisor += 1;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_applies_to_small_requests() {
        assert_eq!(table_size_for(0), 2);
        assert_eq!(table_size_for(1), 2);
        assert_eq!(table_size_for(2), 2);
    }

    #[test]
    fn primes_are_returned_unchanged() {
        for prime in [2, 3, 5, 7, 11, 13, 17, 97] {
            assert_eq!(table_size_for(prime), prime);
        }
    }

    #[test]
    fn composites_round_up() {
        assert_eq!(table_size_for(4), 5);
        assert_eq!(table_size_for(8), 11);
        assert_eq!(table_size_for(14), 17);
        assert_eq!(table_size_for(90), 97);
    }

    #[test]
    fn grow_doubles_then_primes() {
        assert_eq!(grow_size(7), 17); // 14 -> 17
        assert_eq!(grow_size(17), 37); // 34 -> 37
        assert_eq!(grow_size(2), 5); // 4 -> 5
    }

    #[test]
    fn is_prime_basics() {
        assert!(!is_prime(0));
        assert!(!is_prime(1));
        assert!(is_prime(2));
        assert!(is_prime(3));
        assert!(!is_prime(9));
        assert!(is_prime(7919));
        assert!(!is_prime(7917));
    }
}
