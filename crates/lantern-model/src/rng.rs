//! Random draws for `Probability` checks.
//!
//! The run seed picks the ChaCha8 key and the check's binding index picks
//! the stream, so no two checks of a run, and no check in two runs with
//! different seeds, share draws.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub fn check_rng(run_seed: u64, check_index: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(run_seed);
    rng.set_stream(check_index);
    rng
}
