//! Unit kinds, units and bases.
//!
//! [`UnitKind`] carries the fixed stat table. [`Unit`] and [`Base`] are the
//! mutable per-entity state owned by the [`World`](crate::world::World) arena.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::math::Position;
use crate::team::Team;

/// Stable unit identifier, assigned in spawn order and never reused.
pub type UnitId = u64;

/// Index of a base inside the world's base arena.
pub type BaseId = usize;

/// Maximum hp of every base.
pub const BASE_MAX_HP: i32 = 5000;

/// Caster area-burst radius (Manhattan, around the primary target).
pub const CASTER_AOE_RADIUS: i32 = 1;

/// Doctor heal per turn per ally.
pub const DOCTOR_HEAL_AMOUNT: i32 = 30;

/// Doctor heal radius (Manhattan).
pub const DOCTOR_HEAL_RADIUS: i32 = 2;

/// Fixed combat statistics of a unit kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStats {
    /// Maximum and starting hp.
    pub max_hp: i32,
    /// Raw attack damage.
    pub attack: i32,
    /// Attack range (Chebyshev).
    pub attack_range: i32,
    /// Vision range (Chebyshev).
    pub vision_range: i32,
    /// Cells moved per turn.
    pub speed: i32,
    /// Flat damage reduction.
    pub armor: i32,
    /// Purchase cost in energy.
    pub cost: i32,
}

/// The five combat roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// Ranged damage dealer.
    Archer,
    /// Armored melee.
    Infantry,
    /// Fast melee.
    Cavalry,
    /// Ranged area damage.
    Caster,
    /// Heals nearby allies.
    Doctor,
}

impl UnitKind {
    /// All kinds in code order.
    pub const ALL: [Self; 5] = [
        Self::Archer,
        Self::Infantry,
        Self::Cavalry,
        Self::Caster,
        Self::Doctor,
    ];

    /// Stat table.
    ///
    /// # Example
    ///
    /// ```
    /// use skirmish_core::unit::UnitKind;
    ///
    /// let stats = UnitKind::Infantry.stats();
    /// assert_eq!(stats.max_hp, 180);
    /// assert_eq!(stats.armor, 20);
    /// ```
    #[must_use]
    pub const fn stats(self) -> UnitStats {
        match self {
            Self::Archer => UnitStats {
                max_hp: 100,
                attack: 50,
                attack_range: 3,
                vision_range: 7,
                speed: 1,
                armor: 5,
                cost: 80,
            },
            Self::Infantry => UnitStats {
                max_hp: 180,
                attack: 70,
                attack_range: 1,
                vision_range: 4,
                speed: 1,
                armor: 20,
                cost: 80,
            },
            Self::Cavalry => UnitStats {
                max_hp: 170,
                attack: 60,
                attack_range: 1,
                vision_range: 5,
                speed: 3,
                armor: 15,
                cost: 100,
            },
            Self::Caster => UnitStats {
                max_hp: 90,
                attack: 50,
                attack_range: 3,
                vision_range: 7,
                speed: 1,
                armor: 0,
                cost: 100,
            },
            Self::Doctor => UnitStats {
                max_hp: 120,
                attack: 10,
                attack_range: 1,
                vision_range: 3,
                speed: 1,
                armor: 5,
                cost: 80,
            },
        }
    }

    /// Purchase cost in energy.
    #[must_use]
    pub const fn cost(self) -> i32 {
        self.stats().cost
    }

    /// Energy credited to the killer's team (half the cost, floored).
    #[must_use]
    pub const fn kill_reward(self) -> i32 {
        self.cost() / 2
    }

    /// Numeric code used by action payloads (0..=4).
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Archer => 0,
            Self::Infantry => 1,
            Self::Cavalry => 2,
            Self::Caster => 3,
            Self::Doctor => 4,
        }
    }

    /// Kind from its numeric code.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Archer),
            1 => Some(Self::Infantry),
            2 => Some(Self::Cavalry),
            3 => Some(Self::Caster),
            4 => Some(Self::Doctor),
            _ => None,
        }
    }

    /// Kind from a case-insensitive name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Archer => "Archer",
            Self::Infantry => "Infantry",
            Self::Cavalry => "Cavalry",
            Self::Caster => "Caster",
            Self::Doctor => "Doctor",
        }
    }

    /// Melee kinds have an attack range of at most one cell.
    #[must_use]
    pub const fn is_melee(self) -> bool {
        self.stats().attack_range <= 1
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A purchased combat unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Stable identifier.
    pub id: UnitId,
    /// Combat role.
    pub kind: UnitKind,
    /// Owning team.
    pub team: Team,
    /// Current cell.
    pub position: Position,
    hp: i32,
    max_hp: i32,
    alive: bool,
    /// Enemies this unit saw itself at the last vision refresh.
    pub last_turn_visible: BTreeSet<UnitId>,
    /// Enemies relayed by teammates within communication range.
    pub shared_visible: BTreeSet<UnitId>,
}

impl Unit {
    /// Create a unit at full health.
    #[must_use]
    pub fn new(id: UnitId, kind: UnitKind, team: Team, position: Position) -> Self {
        let max_hp = kind.stats().max_hp;
        Self {
            id,
            kind,
            team,
            position,
            hp: max_hp,
            max_hp,
            alive: true,
            last_turn_visible: BTreeSet::new(),
            shared_visible: BTreeSet::new(),
        }
    }

    /// Current hp.
    #[must_use]
    pub const fn hp(&self) -> i32 {
        self.hp
    }

    /// Maximum hp.
    #[must_use]
    pub const fn max_hp(&self) -> i32 {
        self.max_hp
    }

    /// Whether the unit is still in play.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.alive
    }

    /// Kind statistics.
    #[must_use]
    pub const fn stats(&self) -> UnitStats {
        self.kind.stats()
    }

    /// Apply incoming damage after armor.
    ///
    /// Returns the hp actually removed.
    ///
    /// # Example
    ///
    /// ```
    /// use skirmish_core::math::Position;
    /// use skirmish_core::team::Team;
    /// use skirmish_core::unit::{Unit, UnitKind};
    ///
    /// let mut archer = Unit::new(1, UnitKind::Archer, Team::B, Position::new(0, 0));
    /// assert_eq!(archer.take_damage(70), 65);
    /// assert_eq!(archer.hp(), 35);
    /// ```
    pub fn take_damage(&mut self, amount: i32) -> i32 {
        let actual = (amount - self.stats().armor).max(0);
        let before = self.hp;
        self.hp -= actual;
        if self.hp <= 0 {
            self.hp = 0;
            self.alive = false;
        }
        before - self.hp
    }

    /// Set hp, clamped to `[0, max_hp]`; reaching zero kills the unit.
    pub fn set_hp(&mut self, value: i32) {
        self.hp = value.clamp(0, self.max_hp);
        if self.hp == 0 {
            self.alive = false;
        }
    }

    /// Whether `target` is within attack range (Chebyshev).
    #[must_use]
    pub const fn can_attack(&self, target: Position) -> bool {
        self.position.chebyshev(target) <= self.stats().attack_range
    }

    /// Whether `target` is within vision range (Chebyshev).
    #[must_use]
    pub const fn can_see(&self, target: Position) -> bool {
        self.position.chebyshev(target) <= self.stats().vision_range
    }

    /// Whether `enemy` is visible directly or through relayed vision.
    #[must_use]
    pub fn detects(&self, enemy: &Unit) -> bool {
        self.can_see(enemy.position) || self.shared_visible.contains(&enemy.id)
    }
}

/// A team base: a fixed, unarmored damage sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Base {
    /// Arena index.
    pub id: BaseId,
    /// Owning team.
    pub team: Team,
    /// Cell occupied by the base.
    pub position: Position,
    hp: i32,
    max_hp: i32,
}

impl Base {
    /// Create a base at full health.
    #[must_use]
    pub const fn new(id: BaseId, team: Team, position: Position, max_hp: i32) -> Self {
        Self {
            id,
            team,
            position,
            hp: max_hp,
            max_hp,
        }
    }

    /// Current hp.
    #[must_use]
    pub const fn hp(&self) -> i32 {
        self.hp
    }

    /// Maximum hp.
    #[must_use]
    pub const fn max_hp(&self) -> i32 {
        self.max_hp
    }

    /// A base is in play while it has hp left.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.hp > 0
    }

    /// Apply full damage (bases have no armor), clamped at zero.
    ///
    /// Returns the hp actually removed.
    pub fn take_damage(&mut self, amount: i32) -> i32 {
        let before = self.hp;
        self.hp = (self.hp - amount.max(0)).max(0);
        before - self.hp
    }
}
