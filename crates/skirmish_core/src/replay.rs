//! Replay system for recording and playing back games.
//!
//! A game is a pure function of its configuration and of the actions its
//! non-heuristic controllers returned, so a replay stores only those.
//! Heuristic controllers are re-created from the engine generator in team
//! order at game start, exactly as the live run did.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::action::Action;
use crate::config::GameConfig;
use crate::decision::{
    ControllerKind, Controllers, DecisionSource, HeuristicSource, RecordedDecision, ReplaySource,
};
use crate::engine::TurnEngine;
use crate::error::{GameError, Result};
use crate::rng::GameRng;
use crate::team::Team;
use crate::unit::UnitKind;

/// Replay file format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// Build the controllers of a game from their kinds.
///
/// Heuristic teams get a fresh [`HeuristicSource`] seeded from `rng`; every
/// other team is served by `other`.
pub fn build_controllers(
    kinds: [ControllerKind; 2],
    rng: &mut GameRng,
    mut other: impl FnMut(Team, ControllerKind) -> Box<dyn DecisionSource>,
) -> Controllers {
    let mut make = |team: Team| -> Box<dyn DecisionSource> {
        match kinds[team.index()] {
            ControllerKind::Heuristic => Box::new(HeuristicSource::new(rng)),
            kind => other(team, kind),
        }
    };
    let a = make(Team::A);
    let b = make(Team::B);
    Controllers::new(a, b)
}

/// Complete replay data structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replay {
    /// Replay format version.
    pub version: u32,
    /// Free-form label of the game.
    pub scenario_id: String,
    /// Configuration the game ran with, seed included.
    pub config: GameConfig,
    /// Controller kind of each team.
    pub controllers: [ControllerKind; 2],
    /// Decisions in the order they were made.
    pub decisions: Vec<RecordedDecision>,
    /// Turn counter when recording stopped.
    pub final_turn: u32,
    /// Final state hash for verification.
    pub final_hash: u64,
}

impl Replay {
    /// Empty replay of a game about to start.
    #[must_use]
    pub fn new(
        scenario_id: impl Into<String>,
        config: GameConfig,
        controllers: [ControllerKind; 2],
    ) -> Self {
        Self {
            version: REPLAY_VERSION,
            scenario_id: scenario_id.into(),
            config,
            controllers,
            decisions: Vec::new(),
            final_turn: 0,
            final_hash: 0,
        }
    }

    /// Append recorded decisions.
    pub fn record_decisions(&mut self, decisions: impl IntoIterator<Item = RecordedDecision>) {
        self.decisions.extend(decisions);
    }

    /// Finalize the replay with end-game state.
    pub fn finalize(&mut self, final_turn: u32, final_hash: u64) {
        self.final_turn = final_turn;
        self.final_hash = final_hash;
    }

    /// Finalize from a recording engine, draining its decision log.
    pub fn finalize_from(&mut self, engine: &mut TurnEngine) {
        self.record_decisions(engine.take_history());
        self.finalize(engine.turn(), engine.state_hash());
    }

    /// Save the replay to a file.
    ///
    /// # Errors
    /// Returns an error if serialization or file writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize replay: {e}")))?;
        std::fs::write(path.as_ref(), bytes)?;
        Ok(())
    }

    /// Load a replay from a file.
    ///
    /// # Errors
    /// Returns an error if file reading or deserialization fails, or if the
    /// file was written by another format version.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let replay: Self = bincode::deserialize(&bytes)
            .map_err(|e| GameError::InvalidState(format!("Failed to deserialize replay: {e}")))?;

        if replay.version != REPLAY_VERSION {
            return Err(GameError::InvalidState(format!(
                "Replay version mismatch: expected {REPLAY_VERSION}, got {}",
                replay.version
            )));
        }

        Ok(replay)
    }

    /// Decisions made during `turn`.
    #[must_use]
    pub fn decisions_at_turn(&self, turn: u32) -> Vec<&RecordedDecision> {
        self.decisions.iter().filter(|d| d.turn == turn).collect()
    }

    /// Number of turns played.
    #[must_use]
    pub const fn duration(&self) -> u32 {
        self.final_turn
    }

    /// Number of recorded decisions.
    #[must_use]
    pub fn decision_count(&self) -> usize {
        self.decisions.len()
    }

    /// Controllers that reproduce the recorded game.
    pub fn controllers(&self, rng: &mut GameRng) -> Controllers {
        build_controllers(self.controllers, rng, |team, kind| {
            Box::new(ReplaySource::new(team, kind, &self.decisions))
        })
    }
}

/// Replay playback controller.
#[derive(Debug)]
pub struct ReplayPlayer {
    replay: Replay,
    engine: TurnEngine,
    controllers: Controllers,
    direct_index: usize,
}

impl ReplayPlayer {
    /// Create a new replay player from a replay.
    ///
    /// # Errors
    /// Returns an error if the recorded configuration cannot build a world.
    pub fn new(replay: Replay) -> Result<Self> {
        let (engine, controllers) = Self::start(&replay)?;
        Ok(Self {
            replay,
            engine,
            controllers,
            direct_index: 0,
        })
    }

    fn start(replay: &Replay) -> Result<(TurnEngine, Controllers)> {
        let mut engine = TurnEngine::new(replay.config.clone())?;
        let controllers = replay.controllers(engine.rng_mut());
        Ok((engine, controllers))
    }

    /// Advance the replay by one turn.
    ///
    /// Returns true if there are more turns to play.
    pub fn advance(&mut self) -> bool {
        if self.is_finished() {
            return false;
        }

        let turn = self.engine.turn();
        let direct: Vec<RecordedDecision> = self
            .replay
            .decisions
            .iter()
            .filter(|d| d.direct && d.turn == turn)
            .copied()
            .collect();
        for decision in direct {
            if let Action::Spawn {
                base_index,
                unit_type,
            } = decision.action
            {
                let kind = UnitKind::from_code(unit_type);
                let index = usize::try_from(base_index).ok();
                if let (Some(kind), Some(index)) = (kind, index) {
                    self.engine.purchase_direct(decision.team, kind, index);
                }
            }
            self.direct_index += 1;
        }

        self.engine.process_turn(&mut self.controllers);
        !self.is_finished()
    }

    /// Seek to a specific turn by replaying from the start.
    ///
    /// # Errors
    /// Returns an error if the initial state cannot be rebuilt.
    pub fn seek(&mut self, target_turn: u32) -> Result<()> {
        let (engine, controllers) = Self::start(&self.replay)?;
        self.engine = engine;
        self.controllers = controllers;
        self.direct_index = 0;

        while self.engine.turn() < target_turn && self.advance() {}
        Ok(())
    }

    /// Get the current turn.
    #[must_use]
    pub const fn current_turn(&self) -> u32 {
        self.engine.turn()
    }

    /// The engine being driven.
    #[must_use]
    pub const fn engine(&self) -> &TurnEngine {
        &self.engine
    }

    /// Get the replay being played.
    #[must_use]
    pub const fn replay(&self) -> &Replay {
        &self.replay
    }

    /// Direct purchases applied so far.
    #[must_use]
    pub const fn direct_purchases_applied(&self) -> usize {
        self.direct_index
    }

    /// Check if the replay has finished.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.engine.turn() >= self.replay.final_turn || self.engine.is_game_over()
    }

    /// Play to the end and compare the final state hash.
    ///
    /// # Errors
    /// Returns [`GameError::ReplayDesync`] on a hash mismatch.
    pub fn verify(&mut self) -> Result<()> {
        self.seek(self.replay.final_turn)?;
        let actual = self.engine.state_hash();
        if actual == self.replay.final_hash {
            Ok(())
        } else {
            Err(GameError::ReplayDesync {
                turn: self.engine.turn(),
                expected: self.replay.final_hash,
                actual,
            })
        }
    }

    /// Get progress as a percentage (0-100).
    #[must_use]
    pub fn progress_percent(&self) -> f64 {
        if self.replay.final_turn == 0 {
            100.0
        } else {
            f64::from(self.engine.turn()) / f64::from(self.replay.final_turn) * 100.0
        }
    }
}
