/*!
    Deterministic RNG helpers for reproducible tests

    Every random fixture takes an explicit `StdRng` so a failing case can be
    replayed from its seed. Benches use the same seeds (benches/bench_config.rs).
*/

use crate::core_canvas::crdt::Site;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

/// Default seed for deterministic tests
pub const DEFAULT_TEST_SEED: u64 = 42;

/// Create a deterministic RNG with the default seed
pub fn test_rng() -> StdRng {
    test_rng_with_seed(DEFAULT_TEST_SEED)
}

/// Create a deterministic RNG with a custom seed
pub fn test_rng_with_seed(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// A site id drawn from `rng` rather than the OS
pub fn deterministic_site(rng: &mut impl Rng) -> Site {
    Site(Uuid::from_u128(rng.random()))
}
