//! Twin-prime table sizes.
//!
//! Each entry `p` is the upper member of a twin-prime pair, so both `p` and
//! `p - 2` are prime. Double hashing probes with a jump in `1..=p-2`, which is
//! co-prime with `p` and therefore visits every slot.

const TWIN_PRIMES: [usize; 54] = [
    5, 13, 19, 31, 61, 103, 151, 229, 349, 523, 811, 1153, 1621, 2311, 3253, 4639, 6553, 9241,
    13003, 18253, 25579, 35839, 50263, 70381, 98563, 138079, 193381, 270763, 379189, 531103,
    743551, 1041121, 1457959, 2041201, 2857711, 4000939, 5601391, 7841959, 10978819, 15370471,
    21518713, 30126379, 42177253, 59048683, 82668799, 115736839, 162031873, 226845109,
    317583199, 444616483, 622463089, 871448491, 1220028223, 1708039513,
];

/// Smallest table size that is at least `n`.
pub(crate) fn twin_prime_at_least(n: usize) -> usize {
    match TWIN_PRIMES.binary_search(&n) {
        Ok(i) => TWIN_PRIMES[i],
        Err(i) if i < TWIN_PRIMES.len() => TWIN_PRIMES[i],
        Err(_) => TWIN_PRIMES[TWIN_PRIMES.len() - 1],
    }
}
