use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Random number generator derived from `base_seed` and something identifying its user, e.g.
/// the car count of a run. Equal inputs yield equal sequences.
pub fn get_rnd<H: Hash>(base_seed: u64, hash: H) -> SmallRng {
    let mut hasher = DefaultHasher::new();
    hash.hash(&mut hasher);
    base_seed.hash(&mut hasher);
    let combined_seed = hasher.finish();

    SmallRng::seed_from_u64(combined_seed)
}

/// Generator owned by the run with `n_cars` cars. Unseeded runs draw their seed from the OS.
pub fn run_rnd(base_seed: Option<u64>, n_cars: usize) -> SmallRng {
    match base_seed {
        Some(seed) => get_rnd(seed, n_cars),
        None => SmallRng::from_os_rng(),
    }
}
