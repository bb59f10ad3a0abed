//! Seeded random number generation.
//!
//! A run owns exactly one generator. Map generation, heuristic choices,
//! base substitution and movement shuffles all draw from it in a fixed
//! order, so a seed plus the recorded external decisions replays a game.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Generator type used throughout the simulation.
pub type GameRng = ChaCha8Rng;

/// Create the run generator from a seed.
#[must_use]
pub fn seeded_rng(seed: u64) -> GameRng {
    ChaCha8Rng::seed_from_u64(seed)
}
