//! Notable events emitted while a turn resolves.
//!
//! Events feed the training logger, metrics and spectator output. They carry
//! no simulation authority: nothing reads them back into the world.

use serde::{Deserialize, Serialize};

use crate::team::Team;
use crate::unit::{BaseId, UnitId};

/// Category of a [`GameEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A unit was purchased.
    Spawn,
    /// A unit moved.
    Move,
    /// A unit attacked.
    Attack,
    /// A unit was killed.
    Kill,
    /// A base lost hp.
    BaseDamaged,
    /// The game ended.
    GameOver,
}

/// One event.
///
/// `team` is the acting team, except for [`EventKind::BaseDamaged`] where it
/// is the owner of the damaged base and [`EventKind::GameOver`] where it is
/// the winner (absent on a draw).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Category.
    pub kind: EventKind,
    /// Team the event is attributed to.
    pub team: Option<Team>,
    /// Turn the event happened in.
    pub turn: u32,
    /// Short human-readable text.
    pub description: String,
    /// Acting unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<UnitId>,
    /// Affected unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<UnitId>,
    /// Base involved (spawn origin or damaged base).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_id: Option<BaseId>,
    /// Damage applied.
    #[serde(default)]
    pub damage: i32,
    /// Energy credited.
    #[serde(default)]
    pub reward_energy: i32,
}

impl GameEvent {
    /// Create an event with no optional fields set.
    #[must_use]
    pub fn new(kind: EventKind, team: Option<Team>, turn: u32, description: impl Into<String>) -> Self {
        Self {
            kind,
            team,
            turn,
            description: description.into(),
            unit_id: None,
            target_id: None,
            base_id: None,
            damage: 0,
            reward_energy: 0,
        }
    }

    /// Set the acting unit.
    #[must_use]
    pub fn with_unit(mut self, unit_id: UnitId) -> Self {
        self.unit_id = Some(unit_id);
        self
    }

    /// Set the affected unit.
    #[must_use]
    pub fn with_target(mut self, target_id: UnitId) -> Self {
        self.target_id = Some(target_id);
        self
    }

    /// Set the base involved.
    #[must_use]
    pub fn with_base(mut self, base_id: BaseId) -> Self {
        self.base_id = Some(base_id);
        self
    }

    /// Set the damage applied.
    #[must_use]
    pub fn with_damage(mut self, damage: i32) -> Self {
        self.damage = damage;
        self
    }

    /// Set the energy credited.
    #[must_use]
    pub fn with_reward(mut self, reward_energy: i32) -> Self {
        self.reward_energy = reward_energy;
        self
    }
}
