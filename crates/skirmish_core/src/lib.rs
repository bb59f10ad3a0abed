//! # Skirmish Core
//!
//! Deterministic simulation core of a two-team grid combat game.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No threads or process IO
//! - Randomness only from one seeded generator per run
//! - Fixed-point math wherever averages or ratios are taken
//!
//! This separation enables:
//! - Headless batch runs and training data generation
//! - Replay recording and verification
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`world`] - Map, bases, units and economies behind one owner
//! - [`engine`] - The per-turn phase pipeline
//! - [`combat`] - Heal, attack and siege resolution
//! - [`heuristics`] - Unit movement and the rule-based purchase agent
//! - [`decision`] - Pluggable decision sources per team
//! - [`action`] - The purchase action format and its execution
//! - [`export`] - Team-relative state snapshots for external policies
//! - [`replay`] - Recording and verified playback
//! - [`math`] - Grid positions and fixed-point helpers

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod action;
pub mod combat;
pub mod config;
pub mod decision;
pub mod economy;
pub mod engine;
pub mod error;
pub mod events;
pub mod export;
pub mod heuristics;
pub mod map;
pub mod math;
pub mod replay;
pub mod rng;
pub mod team;
pub mod unit;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::action::{apply_action, apply_payload, Action, ActionOutcome, RejectReason};
    pub use crate::combat::{resolve_combat, CombatReport};
    pub use crate::config::GameConfig;
    pub use crate::decision::{
        ActionInbox, ControllerKind, Controllers, DecisionContext, DecisionSource,
        HeuristicSource, HumanSource, RecordedDecision, ReplaySource,
    };
    pub use crate::economy::TeamEconomy;
    pub use crate::engine::{DecisionRecord, TurnEngine, TurnReport};
    pub use crate::error::{GameError, Result};
    pub use crate::events::{EventKind, GameEvent};
    pub use crate::export::StateExport;
    pub use crate::map::{GameMap, MapConfig, TerrainCell};
    pub use crate::math::{Fixed, Position};
    pub use crate::replay::{build_controllers, Replay, ReplayPlayer};
    pub use crate::rng::{seeded_rng, GameRng};
    pub use crate::team::Team;
    pub use crate::unit::{Base, BaseId, Unit, UnitId, UnitKind};
    pub use crate::world::{EndCondition, Outcome, World};
}
