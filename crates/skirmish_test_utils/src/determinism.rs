//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! A game must be a pure function of its configuration, its seed and the
//! actions fed to it, or replays and training data become worthless.
//! Sources of non-determinism include:
//!
//! - **Floating-point math**: averages and rewards use
//!   [`skirmish_core::math::Fixed`].
//!
//! - **HashMap iteration order**: units live in a `BTreeMap` and are always
//!   visited in id order.
//!
//! - **Ambient randomness**: every draw comes from the engine's seeded
//!   generator, in a fixed order.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: individual phases (movement, combat, purchasing)
//! 2. **Property tests**: random seeds and actions still replay exactly
//! 3. **Integration tests**: full games are reproducible
//! 4. **Parallel tests**: running N games in parallel all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use tracing::warn;

use skirmish_core::decision::{Controllers, HumanSource};
use skirmish_core::engine::TurnEngine;
use skirmish_core::team::Team;
use skirmish_core::world::World;

use crate::fixtures::TestGame;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of turns simulated.
    pub turns: u32,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Turns: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.turns,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Result of parallel game runs.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// Final state hash from each game.
    pub hashes: Vec<u64>,
    /// Number of turns each game ran.
    pub turns: u32,
    /// Number of games run.
    pub num_sims: usize,
}

impl ParallelSimResult {
    /// Check if all games produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all games matched.
    ///
    /// # Panics
    ///
    /// Panics if games produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel games diverged!\n\
                 Games: {}\n\
                 Turns: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_sims,
                self.turns,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `turns` - Number of turns to simulate per run
/// * `setup` - Function to create initial state
/// * `step` - Function to advance by one turn
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```
/// use skirmish_test_utils::determinism::verify_determinism;
/// use skirmish_test_utils::fixtures::TestGame;
///
/// let result = verify_determinism(
///     3,
///     25,
///     || TestGame::seeded(11, 500),
///     |game| { game.step(); },
///     TestGame::state_hash,
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    turns: u32,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..turns {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        turns,
    }
}

/// Play the same game twice and compare final hashes.
pub fn verify_game_determinism<F>(setup_fn: F, num_turns: u32) -> bool
where
    F: Fn() -> TestGame,
{
    verify_determinism(
        2,
        num_turns,
        &setup_fn,
        |game| {
            game.step();
        },
        TestGame::state_hash,
    )
    .is_deterministic
}

/// Run N games on scoped threads and collect final hashes.
///
/// Catches non-determinism that only shows up under thread scheduling
/// variations or differing memory layouts.
///
/// # Panics
///
/// Panics if a game thread panics.
pub fn run_parallel_games_scoped<F>(setup_fn: F, num_sims: usize, num_turns: u32) -> ParallelSimResult
where
    F: Fn() -> TestGame + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut game = setup_fn();
                    for _ in 0..num_turns {
                        game.step();
                    }
                    game.state_hash()
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    ParallelSimResult {
        hashes,
        turns: num_turns,
        num_sims,
    }
}

/// Compare two games turn by turn, finding the first divergence.
///
/// # Returns
///
/// `None` if the games stay identical, `Some(turn)` for the first turn
/// after which their hashes differ (0 for differing initial states).
pub fn find_first_divergence<F>(setup_fn: F, num_turns: u32) -> Option<u32>
where
    F: Fn() -> TestGame,
{
    let mut first = setup_fn();
    let mut second = setup_fn();

    if first.state_hash() != second.state_hash() {
        return Some(0);
    }

    for turn in 1..=num_turns {
        first.step();
        second.step();

        if first.state_hash() != second.state_hash() {
            warn!(
                turn,
                units_a = first.engine.world().living_unit_count(Team::A),
                units_b = first.engine.world().living_unit_count(Team::B),
                "Games diverged"
            );
            return Some(turn);
        }
    }

    None
}

fn idle_controllers() -> Controllers {
    Controllers::new(
        Box::new(HumanSource::default()),
        Box::new(HumanSource::default()),
    )
}

/// Verify that a world round-trip through bincode preserves state exactly,
/// and that the restored world keeps evolving identically.
pub fn verify_serialization_determinism<F>(setup_fn: F, num_turns: u32) -> bool
where
    F: Fn() -> TestGame,
{
    let mut game = setup_fn();
    for _ in 0..num_turns {
        game.step();
    }

    let hash_before = game.state_hash();
    let Ok(bytes) = game.engine.world().serialize() else {
        return false;
    };
    let Ok(restored) = World::deserialize(&bytes) else {
        return false;
    };
    if restored.state_hash() != hash_before {
        return false;
    }

    let rng = game.engine.rng_mut().clone();
    let mut original = game.engine;
    let mut copy = TurnEngine::from_world(restored, rng);
    let mut controllers_a = idle_controllers();
    let mut controllers_b = idle_controllers();
    for _ in 0..10 {
        original.process_turn(&mut controllers_a);
        copy.process_turn(&mut controllers_b);
    }
    original.state_hash() == copy.state_hash()
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for determinism testing.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing of the simulation.
pub mod strategies {
    use proptest::prelude::*;
    use skirmish_core::action::Action;
    use skirmish_core::math::Position;
    use skirmish_core::team::Team;
    use skirmish_core::unit::UnitKind;

    /// Generate a cell on the default 64x64 map.
    pub fn arb_position() -> impl Strategy<Value = Position> {
        (0i32..64, 0i32..64).prop_map(|(x, y)| Position::new(x, y))
    }

    /// Generate a team.
    pub fn arb_team() -> impl Strategy<Value = Team> {
        prop_oneof![Just(Team::A), Just(Team::B)]
    }

    /// Generate a unit kind.
    pub fn arb_unit_kind() -> impl Strategy<Value = UnitKind> {
        proptest::sample::select(UnitKind::ALL.to_vec())
    }

    /// Generate an action, including stale base indices and unknown unit
    /// codes.
    pub fn arb_action() -> impl Strategy<Value = Action> {
        prop_oneof![
            1 => Just(Action::Wait),
            4 => (-1i32..5, -1i32..6).prop_map(|(base_index, unit_type)| Action::Spawn {
                base_index,
                unit_type,
            }),
        ]
    }

    /// Generate a per-turn action script for one team.
    pub fn arb_action_script(max_turns: usize) -> impl Strategy<Value = Vec<Vec<Action>>> {
        proptest::collection::vec(proptest::collection::vec(arb_action(), 0..4), 0..max_turns)
    }

    /// Generate a game seed.
    pub fn arb_seed() -> impl Strategy<Value = u64> {
        any::<u64>()
    }

    /// Generate hp values (1-300).
    pub fn arb_hp() -> impl Strategy<Value = i32> {
        1i32..300
    }

    /// Parameters for spawning a test unit.
    #[derive(Debug, Clone)]
    pub struct TestUnitParams {
        /// Owning team.
        pub team: Team,
        /// Unit kind.
        pub kind: UnitKind,
        /// Cell.
        pub position: Position,
        /// Starting hp, clamped to the kind's maximum.
        pub hp: i32,
    }

    /// Generate parameters for a test unit.
    pub fn arb_unit_params() -> impl Strategy<Value = TestUnitParams> {
        (arb_team(), arb_unit_kind(), arb_position(), arb_hp()).prop_map(
            |(team, kind, position, hp)| TestUnitParams {
                team,
                kind,
                position,
                hp,
            },
        )
    }

    /// Generate a list of unit spawn parameters.
    pub fn arb_unit_list(max_units: usize) -> impl Strategy<Value = Vec<TestUnitParams>> {
        proptest::collection::vec(arb_unit_params(), 1..max_units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{open_engine, scripted_controllers, spawn_row};
    use proptest::prelude::*;
    use skirmish_core::config::GameConfig;
    use skirmish_core::math::Position;
    use skirmish_core::team::Team;
    use skirmish_core::unit::UnitKind;

    // =========================================================================
    // Basic determinism tests
    // =========================================================================

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 100, || 0u64, |n| *n += 1, |n| *n);

        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![100, 100, 100]);
    }

    #[test]
    fn test_heuristic_game_determinism() {
        assert!(verify_game_determinism(|| TestGame::seeded(42, 500), 120));
    }

    #[test]
    fn test_find_divergence_on_deterministic_game() {
        let divergence = find_first_divergence(|| TestGame::seeded(7, 500), 60);
        assert!(divergence.is_none(), "Expected no divergence");
    }

    #[test]
    fn test_different_seeds_diverge() {
        let result = verify_determinism(
            2,
            30,
            {
                let seeds = std::cell::Cell::new(0u64);
                move || {
                    seeds.set(seeds.get() + 1);
                    TestGame::seeded(seeds.get(), 500)
                }
            },
            |game| {
                game.step();
            },
            TestGame::state_hash,
        );
        assert!(!result.is_deterministic);
        assert_eq!(result.unique_hashes().len(), 2);
    }

    // =========================================================================
    // Serialization round-trip tests
    // =========================================================================

    #[test]
    fn test_serialization_preserves_fresh_game() {
        assert!(verify_serialization_determinism(|| TestGame::seeded(1, 500), 0));
    }

    #[test]
    fn test_serialization_preserves_battle() {
        assert!(verify_serialization_determinism(|| TestGame::seeded(9, 500), 80));
    }

    // =========================================================================
    // Scripted scenarios
    // =========================================================================

    fn skirmish_scenario() -> TestGame {
        let mut engine = open_engine(GameConfig::default());
        spawn_row(engine.world_mut(), Team::A, UnitKind::Infantry, Position::new(28, 30), 4);
        spawn_row(engine.world_mut(), Team::A, UnitKind::Doctor, Position::new(28, 28), 2);
        spawn_row(engine.world_mut(), Team::B, UnitKind::Caster, Position::new(28, 33), 3);
        spawn_row(engine.world_mut(), Team::B, UnitKind::Archer, Position::new(28, 35), 3);
        let (controllers, _) = scripted_controllers();
        TestGame {
            engine,
            controllers,
        }
    }

    #[test]
    fn test_skirmish_determinism() {
        let result = verify_determinism(
            3,
            40,
            skirmish_scenario,
            |g| {
                g.step();
            },
            TestGame::state_hash,
        );
        result.assert_deterministic();
    }

    #[test]
    fn test_parallel_heuristic_games() {
        let result = run_parallel_games_scoped(|| TestGame::seeded(5, 500), 4, 60);
        result.assert_deterministic();
        assert_eq!(result.num_sims, 4);
    }

    #[test]
    fn test_compute_hash_stable() {
        assert_eq!(compute_hash(&(1u32, "a")), compute_hash(&(1u32, "a")));
        assert_ne!(compute_hash(&1u32), compute_hash(&2u32));
    }

    // =========================================================================
    // Property-based tests using proptest
    // =========================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// Any seed yields a reproducible game.
        #[test]
        fn prop_any_seed_is_deterministic(seed in strategies::arb_seed()) {
            prop_assert!(verify_game_determinism(move || TestGame::seeded(seed, 500), 40));
        }

        /// Arbitrary action scripts, stale indices and bad unit codes
        /// included, replay identically.
        #[test]
        fn prop_action_scripts_are_replayable(
            script_a in strategies::arb_action_script(20),
            script_b in strategies::arb_action_script(20),
        ) {
            let run = || {
                let mut engine = open_engine(GameConfig::default());
                let (mut controllers, inboxes) = scripted_controllers();
                for turn in 0..20 {
                    for (script, inbox) in [(&script_a, &inboxes[0]), (&script_b, &inboxes[1])] {
                        inbox.clear();
                        if let Some(actions) = script.get(turn) {
                            for action in actions {
                                inbox.push(*action);
                            }
                        }
                    }
                    engine.process_turn(&mut controllers);
                }
                engine.state_hash()
            };
            prop_assert_eq!(run(), run());
        }

        /// Random unit layouts fight out identically.
        #[test]
        fn prop_unit_layouts_are_deterministic(units in strategies::arb_unit_list(20)) {
            let setup = || {
                let mut engine = open_engine(GameConfig::default());
                for params in &units {
                    let world = engine.world_mut();
                    if world.is_free(params.position, None) {
                        let id = world.spawn_unit(params.team, params.kind, params.position);
                        if let Some(unit) = world.unit_mut(id) {
                            unit.set_hp(params.hp);
                        }
                    }
                }
                let (controllers, _) = scripted_controllers();
                TestGame { engine, controllers }
            };
            let result = verify_determinism(2, 30, setup, |g| { g.step(); }, TestGame::state_hash);
            prop_assert!(result.is_deterministic);
        }
    }

    // =========================================================================
    // Stress tests (only run explicitly with --ignored)
    // =========================================================================

    #[test]
    #[ignore = "Long-running stress test"]
    fn stress_test_full_games() {
        let result = verify_determinism(
            5,
            500,
            || TestGame::seeded(77, 500),
            |g| {
                g.step();
            },
            TestGame::state_hash,
        );
        result.assert_deterministic();
    }

    #[test]
    #[ignore = "Long-running stress test"]
    fn stress_test_parallel_many_games() {
        let result = run_parallel_games_scoped(|| TestGame::seeded(13, 500), 16, 500);
        result.assert_deterministic();
    }
}
