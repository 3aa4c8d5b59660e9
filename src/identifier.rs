//! Issues router-wide unique identifiers.
//!
//! WAMP ids are non-negative integers bounded to 53 bits so that they survive
//! a round trip through a JSON number without loss of precision. Session ids,
//! request ids, subscription ids, registration ids, and publication ids are
//! all drawn from this same generator.

use rand::{thread_rng, Rng};

use crate::ID;

const ID_MAX: u64 = 1u64.rotate_left(53);

/// Returns a fresh random id in the range `[1, 2^53)`.
///
/// Ids are drawn from a CSPRNG rather than a counter: the router may be
/// sharded across several OS threads (one per connection, in this crate's
/// threading model) and a shared counter would need its own lock, which
/// would just move the contention elsewhere.
#[inline]
pub fn next_id() -> ID {
    thread_rng().gen_range(1..ID_MAX)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ids_are_in_range() {
        for _ in 0..1000 {
            let id = next_id();
            assert!(id >= 1);
            assert!(id < ID_MAX);
        }
    }

    #[test]
    fn ids_fit_in_53_bits() {
        let id = next_id();
        assert_eq!(id & !(ID_MAX - 1), 0);
    }
}
