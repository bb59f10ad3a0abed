//! Purchase actions and their execution.
//!
//! An [`Action`] is what a decision source hands back each poll. On the wire
//! it is the flat record `{"action_type": 0|1, "base_id": i, "unit_type": k}`
//! where `base_id` is an index into the acting team's base list.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{GameError, Result};
use crate::rng::GameRng;
use crate::team::Team;
use crate::unit::{UnitId, UnitKind};
use crate::world::World;

/// Wire code of [`Action::Wait`].
pub const ACTION_WAIT: i32 = 0;

/// Wire code of [`Action::Spawn`].
pub const ACTION_SPAWN: i32 = 1;

/// A team decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawAction", into = "RawAction")]
pub enum Action {
    /// Do nothing this poll.
    #[default]
    Wait,
    /// Buy a unit at one of the team's bases.
    Spawn {
        /// Index into the team's base list. Out of range or dead bases are
        /// replaced by a random living base when executed.
        base_index: i32,
        /// Unit kind code (0..=4). Any other value fails execution.
        unit_type: i32,
    },
}

impl Action {
    /// Spawn action for a known unit kind.
    #[must_use]
    pub const fn spawn(base_index: i32, kind: UnitKind) -> Self {
        Self::Spawn {
            base_index,
            unit_type: kind.code(),
        }
    }

    /// Whether this is [`Action::Wait`].
    #[must_use]
    pub const fn is_wait(&self) -> bool {
        matches!(self, Self::Wait)
    }

    /// Parse an action payload.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::MalformedAction`] if the payload is not a valid
    /// action record.
    ///
    /// # Example
    ///
    /// ```
    /// use skirmish_core::action::Action;
    ///
    /// let action = Action::from_json(r#"{"action_type": 1, "base_id": 2, "unit_type": 3}"#).unwrap();
    /// assert_eq!(action, Action::Spawn { base_index: 2, unit_type: 3 });
    /// assert!(Action::from_json("{}").is_err());
    /// ```
    pub fn from_json(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).map_err(|e| GameError::MalformedAction(e.to_string()))
    }

    /// Encode as an action payload.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::MalformedAction`] if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| GameError::MalformedAction(e.to_string()))
    }
}

/// Flat wire form of [`Action`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawAction {
    action_type: i32,
    #[serde(default = "unset")]
    base_id: i32,
    #[serde(default = "unset")]
    unit_type: i32,
}

const fn unset() -> i32 {
    -1
}

impl TryFrom<RawAction> for Action {
    type Error = String;

    fn try_from(raw: RawAction) -> std::result::Result<Self, Self::Error> {
        match raw.action_type {
            ACTION_WAIT => Ok(Self::Wait),
            ACTION_SPAWN => Ok(Self::Spawn {
                base_index: raw.base_id,
                unit_type: raw.unit_type,
            }),
            other => Err(format!("unknown action_type {other}")),
        }
    }
}

impl From<Action> for RawAction {
    fn from(action: Action) -> Self {
        match action {
            Action::Wait => Self {
                action_type: ACTION_WAIT,
                base_id: unset(),
                unit_type: unset(),
            },
            Action::Spawn {
                base_index,
                unit_type,
            } => Self {
                action_type: ACTION_SPAWN,
                base_id: base_index,
                unit_type,
            },
        }
    }
}

/// Why an action failed to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// The unit kind code is not one of the five kinds.
    InvalidUnitKind(i32),
    /// The team could not afford the unit.
    InsufficientEnergy,
    /// No free cell near the chosen base.
    NoSpawnCell,
    /// The payload could not be parsed.
    Malformed,
}

/// Result of executing an [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionOutcome {
    /// The action was a wait.
    Waited,
    /// A unit was bought.
    Spawned {
        /// New unit.
        unit_id: UnitId,
        /// Team-relative index of the base actually used.
        base_index: usize,
        /// Kind bought.
        kind: UnitKind,
    },
    /// The team has no living base; nothing happened but the action counts
    /// as executed.
    NoLivingBase,
    /// The action could not be executed. The world is unchanged.
    Rejected(RejectReason),
}

impl ActionOutcome {
    /// Everything except a rejection counts as success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }

    /// Whether polling the same team again this turn is pointless.
    #[must_use]
    pub const fn ends_polling(&self) -> bool {
        matches!(self, Self::Waited | Self::Rejected(_))
    }
}

/// Execute `action` for `team`.
///
/// A stale base index (out of range or destroyed) is replaced by a random
/// living base drawn from `rng`. Failures never mutate the world.
pub fn apply_action(world: &mut World, team: Team, action: Action, rng: &mut GameRng) -> ActionOutcome {
    let Action::Spawn {
        base_index,
        unit_type,
    } = action
    else {
        return ActionOutcome::Waited;
    };

    let requested = usize::try_from(base_index)
        .ok()
        .and_then(|index| world.team_base_id(team, index).map(|id| (index, id)))
        .filter(|(_, id)| world.base(*id).is_some_and(crate::unit::Base::is_alive));

    let (index, base_id) = match requested {
        Some(found) => found,
        None => {
            let living = world.living_base_indices(team);
            if living.is_empty() {
                return ActionOutcome::NoLivingBase;
            }
            let index = living[rng.gen_range(0..living.len())];
            match world.team_base_id(team, index) {
                Some(id) => (index, id),
                None => return ActionOutcome::NoLivingBase,
            }
        }
    };

    let Some(kind) = UnitKind::from_code(unit_type) else {
        warn!(%team, unit_type, "Rejected action with invalid unit kind");
        return ActionOutcome::Rejected(RejectReason::InvalidUnitKind(unit_type));
    };

    let Some(base_pos) = world.base(base_id).map(|b| b.position) else {
        return ActionOutcome::NoLivingBase;
    };

    match world.purchase_unit(team, kind, base_pos) {
        Ok(unit_id) => ActionOutcome::Spawned {
            unit_id,
            base_index: index,
            kind,
        },
        Err(GameError::InsufficientEnergy { .. }) => {
            ActionOutcome::Rejected(RejectReason::InsufficientEnergy)
        }
        Err(_) => ActionOutcome::Rejected(RejectReason::NoSpawnCell),
    }
}

/// Parse and execute a raw payload. Malformed payloads are logged and
/// rejected without touching the world.
pub fn apply_payload(world: &mut World, team: Team, payload: &str, rng: &mut GameRng) -> ActionOutcome {
    match Action::from_json(payload) {
        Ok(action) => apply_action(world, team, action, rng),
        Err(err) => {
            warn!(%team, error = %err, "Ignoring malformed action");
            ActionOutcome::Rejected(RejectReason::Malformed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::map::GameMap;
    use crate::math::Position;
    use crate::rng::seeded_rng;

    fn open_world() -> World {
        World::with_map(GameConfig::default(), GameMap::new(64)).unwrap()
    }

    #[test]
    fn test_wire_format() {
        let json = Action::spawn(1, UnitKind::Cavalry).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["action_type"], 1);
        assert_eq!(value["base_id"], 1);
        assert_eq!(value["unit_type"], 2);

        let wait: serde_json::Value = serde_json::from_str(&Action::Wait.to_json().unwrap()).unwrap();
        assert_eq!(wait["action_type"], 0);
        assert_eq!(wait["base_id"], -1);
    }

    #[test]
    fn test_wait_needs_only_type() {
        assert_eq!(Action::from_json(r#"{"action_type": 0}"#).unwrap(), Action::Wait);
    }

    #[test]
    fn test_unknown_action_type_is_malformed() {
        let err = Action::from_json(r#"{"action_type": 7}"#).unwrap_err();
        assert!(matches!(err, GameError::MalformedAction(_)));
    }

    #[test]
    fn test_wait_is_idempotent() {
        let mut world = open_world();
        let mut rng = seeded_rng(1);
        let before = world.state_hash();
        assert_eq!(apply_action(&mut world, Team::A, Action::Wait, &mut rng), ActionOutcome::Waited);
        assert_eq!(apply_action(&mut world, Team::A, Action::Wait, &mut rng), ActionOutcome::Waited);
        assert_eq!(world.state_hash(), before);
    }

    #[test]
    fn test_spawn_at_requested_base() {
        let mut world = open_world();
        let mut rng = seeded_rng(1);
        let outcome = apply_action(&mut world, Team::B, Action::spawn(2, UnitKind::Archer), &mut rng);
        let ActionOutcome::Spawned { unit_id, base_index, kind } = outcome else {
            panic!("expected spawn, got {outcome:?}");
        };
        assert_eq!(base_index, 2);
        assert_eq!(kind, UnitKind::Archer);
        let unit = world.unit(unit_id).unwrap();
        assert!(unit.position.chebyshev(Position::new(58, 44)) <= 3);
        assert_eq!(world.energy(Team::B), 120);
    }

    #[test]
    fn test_stale_base_is_substituted() {
        let mut world = open_world();
        let mut rng = seeded_rng(1);
        world.base_mut(0).unwrap().take_damage(10_000);
        world.base_mut(1).unwrap().take_damage(10_000);

        for requested in [0, 1, 9, -4] {
            let outcome =
                apply_action(&mut world, Team::A, Action::spawn(requested, UnitKind::Doctor), &mut rng);
            assert!(matches!(outcome, ActionOutcome::Spawned { base_index: 2, .. }));
            world.add_energy(Team::A, 80);
        }
    }

    #[test]
    fn test_no_living_base_is_noop_success() {
        let mut world = open_world();
        let mut rng = seeded_rng(1);
        for id in 0..3 {
            world.base_mut(id).unwrap().take_damage(10_000);
        }
        let outcome = apply_action(&mut world, Team::A, Action::spawn(0, UnitKind::Archer), &mut rng);
        assert_eq!(outcome, ActionOutcome::NoLivingBase);
        assert!(outcome.is_success());
        assert!(!outcome.ends_polling());
        assert_eq!(world.energy(Team::A), 200);
    }

    #[test]
    fn test_invalid_kind_fails() {
        let mut world = open_world();
        let mut rng = seeded_rng(1);
        let action = Action::Spawn { base_index: 0, unit_type: 9 };
        let outcome = apply_action(&mut world, Team::A, action, &mut rng);
        assert_eq!(outcome, ActionOutcome::Rejected(RejectReason::InvalidUnitKind(9)));
        assert_eq!(world.energy(Team::A), 200);
    }

    #[test]
    fn test_unaffordable_spawn_fails() {
        let mut world = open_world();
        let mut rng = seeded_rng(1);
        assert!(world.spend_energy(Team::A, 150));
        let outcome = apply_action(&mut world, Team::A, Action::spawn(0, UnitKind::Cavalry), &mut rng);
        assert_eq!(outcome, ActionOutcome::Rejected(RejectReason::InsufficientEnergy));
        assert_eq!(world.energy(Team::A), 50);
    }

    #[test]
    fn test_malformed_payload_rejected() {
        let mut world = open_world();
        let mut rng = seeded_rng(1);
        let outcome = apply_payload(&mut world, Team::A, "not json", &mut rng);
        assert_eq!(outcome, ActionOutcome::Rejected(RejectReason::Malformed));
    }
}
