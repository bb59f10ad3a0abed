//! Single game execution for headless testing.
//!
//! Runs one rule-based game to completion on the calling thread, collecting
//! [`GameMetrics`] and optionally a replay.
//!
//! # Defensive Coding Principles
//!
//! - The turn loop is bounded by the configured turn ceiling
//! - Progress is logged at regular intervals
//! - Slow turns are reported, runaway turns abort the game

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use skirmish_core::config::GameConfig;
use skirmish_core::decision::{ControllerKind, Controllers};
use skirmish_core::engine::TurnEngine;
use skirmish_core::error::{GameError, Result};
use skirmish_core::replay::Replay;
use skirmish_core::team::Team;

use crate::metrics::{GameMetrics, MetricsCollector};

// =============================================================================
// WATCHDOG LIMITS
// =============================================================================

/// Progress logging interval (turns).
const PROGRESS_LOG_INTERVAL: u32 = 100;

/// Wall-clock time after which a single turn counts as a hang.
const TURN_TIMEOUT_MS: u128 = 5_000;

/// Turns slower than this are logged as warnings.
const SLOW_TURN_THRESHOLD_MS: u128 = 100;

/// Turns allowed past the configured ceiling before the loop gives up.
const TURN_CEILING_SLACK: u32 = 2;

/// High-level game runner for headless testing.
#[derive(Debug, Clone, Default)]
pub struct GameRunner {
    /// Turn ceiling used when a setup leaves it at 0.
    pub default_max_turns: u32,
}

impl GameRunner {
    /// Create a new game runner.
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_max_turns: GameConfig::default().max_turns,
        }
    }

    /// Run a game with the given setup.
    pub fn run(&self, mut setup: GameSetup) -> Result<GameResult> {
        if setup.config.max_turns == 0 {
            setup.config.max_turns = self.default_max_turns;
        }
        run_game(setup)
    }
}

/// One game to play.
#[derive(Debug, Clone)]
pub struct GameSetup {
    /// Game ID for tracking.
    pub game_id: String,
    /// Scenario label carried into metrics and replays.
    pub scenario: String,
    /// Rules, seed included.
    pub config: GameConfig,
    /// Record a replay of the game.
    pub record_replay: bool,
}

impl GameSetup {
    /// Default rules with `seed`.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self::with_config(GameConfig::default().with_seed(seed))
    }

    /// Setup for explicit rules.
    #[must_use]
    pub fn with_config(config: GameConfig) -> Self {
        Self {
            game_id: format!("game_{}", config.seed),
            scenario: "default".to_string(),
            config,
            record_replay: false,
        }
    }

    /// Set the scenario label.
    #[must_use]
    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = scenario.into();
        self
    }

    /// Record a replay.
    #[must_use]
    pub fn recording(mut self) -> Self {
        self.record_replay = true;
        self
    }
}

/// Outcome of [`run_game`].
#[derive(Debug, Clone)]
pub struct GameResult {
    /// Collected metrics.
    pub metrics: GameMetrics,
    /// Final world hash.
    pub final_state_hash: u64,
    /// Replay, when recording was requested.
    pub replay: Option<Replay>,
}

/// Play a rule-based game to completion.
///
/// # Errors
///
/// Fails if the world cannot be built from `setup.config`.
pub fn run_game(setup: GameSetup) -> Result<GameResult> {
    let game_start = Instant::now();
    let seed = setup.config.seed;
    let max_turns = setup.config.max_turns;
    info!(
        game_id = %setup.game_id,
        seed,
        max_turns,
        scenario = %setup.scenario,
        "Starting game simulation"
    );

    let kinds = [ControllerKind::Heuristic; 2];
    let mut replay = setup
        .record_replay
        .then(|| Replay::new(setup.scenario.clone(), setup.config.clone(), kinds));

    let mut engine = TurnEngine::new(setup.config)?.with_recording(setup.record_replay);
    let mut controllers = Controllers::heuristic(engine.rng_mut());

    let mut collector = MetricsCollector::new(&setup.game_id, &setup.scenario, seed);
    collector.track_units(engine.world());

    let hard_limit = max_turns.saturating_add(TURN_CEILING_SLACK);
    let mut last_progress_log = Instant::now();

    while !engine.is_game_over() {
        if engine.turn() > hard_limit {
            error!(
                turn = engine.turn(),
                max_turns,
                "FATAL: Game ran past its turn ceiling - aborting"
            );
            return Err(GameError::InvalidState(format!(
                "game {} did not end by turn {hard_limit}",
                setup.game_id
            )));
        }

        let turn_start = Instant::now();
        let report = engine.process_turn(&mut controllers);
        let turn_duration = turn_start.elapsed();
        collector.observe_turn(&report, engine.world());

        if turn_duration.as_millis() > TURN_TIMEOUT_MS {
            error!(
                turn = report.turn,
                duration_ms = turn_duration.as_millis(),
                timeout_ms = TURN_TIMEOUT_MS,
                "FATAL: Turn took too long - possible infinite loop"
            );
            return Err(GameError::InvalidState(format!(
                "turn {} of game {} exceeded {TURN_TIMEOUT_MS} ms",
                report.turn, setup.game_id
            )));
        }
        if turn_duration.as_millis() > SLOW_TURN_THRESHOLD_MS {
            warn!(
                turn = report.turn,
                duration_ms = turn_duration.as_millis(),
                threshold_ms = SLOW_TURN_THRESHOLD_MS,
                units = engine.world().units().count(),
                "Slow turn detected - possible performance issue"
            );
        }

        if report.turn % PROGRESS_LOG_INTERVAL == 0
            || last_progress_log.elapsed() > Duration::from_secs(5)
        {
            let world = engine.world();
            debug!(
                turn = report.turn,
                max_turns,
                units_a = world.living_unit_count(Team::A),
                units_b = world.living_unit_count(Team::B),
                base_hp_a = world.total_base_hp(Team::A),
                base_hp_b = world.total_base_hp(Team::B),
                "Game progress"
            );
            last_progress_log = Instant::now();
        }
    }

    if let Some(replay) = replay.as_mut() {
        replay.finalize_from(&mut engine);
    }

    let metrics = collector.finalize(engine.world());
    info!(
        game_id = %metrics.game_id,
        duration_turns = metrics.duration_turns,
        duration_ms = game_start.elapsed().as_millis(),
        winner = ?metrics.winner,
        win_condition = %metrics.win_condition,
        events_recorded = metrics.events.len(),
        "Game simulation complete"
    );

    Ok(GameResult {
        final_state_hash: metrics.final_state_hash,
        metrics,
        replay,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_core::replay::ReplayPlayer;

    #[test]
    fn test_game_finishes_within_ceiling() {
        let result = run_game(GameSetup::with_config(
            GameConfig::default().with_seed(5).with_max_turns(60),
        ))
        .unwrap();

        assert!(result.metrics.duration_turns <= 61);
        assert_ne!(result.metrics.win_condition, "unfinished");
        assert_eq!(result.final_state_hash, result.metrics.final_state_hash);
    }

    #[test]
    fn test_run_game_deterministic() {
        let setup = GameSetup::with_config(GameConfig::default().with_seed(12345).with_max_turns(120));
        let first = run_game(setup.clone()).unwrap();
        let second = run_game(setup).unwrap();

        assert_eq!(first.metrics.winner, second.metrics.winner);
        assert_eq!(first.metrics.duration_turns, second.metrics.duration_turns);
        assert_eq!(first.final_state_hash, second.final_state_hash);
    }

    #[test]
    fn test_recorded_game_replays() {
        let setup = GameSetup::with_config(GameConfig::default().with_seed(77).with_max_turns(80))
            .recording();
        let result = run_game(setup).unwrap();
        let replay = result.replay.unwrap();
        assert_eq!(replay.final_hash, result.final_state_hash);

        let mut player = ReplayPlayer::new(replay).unwrap();
        player.verify().unwrap();
    }

    #[test]
    fn test_runner_fills_default_ceiling() {
        let runner = GameRunner {
            default_max_turns: 30,
        };
        let mut setup = GameSetup::seeded(9);
        setup.config.max_turns = 0;
        let result = runner.run(setup).unwrap();
        assert!(result.metrics.duration_turns <= 31);
    }
}
