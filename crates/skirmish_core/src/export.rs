//! State export for external policies and the training logger.
//!
//! [`StateExport`] is a flat, team-relative record of the world. Its JSON
//! field names are the contract with external policy processes and must not
//! change.

use serde::{Deserialize, Serialize};

use crate::math::fixed_mean;
use crate::team::Team;
use crate::unit::{Base, UnitKind};
use crate::world::World;

/// Maximum number of bases listed per side.
pub const MAX_LISTED_BASES: usize = 5;

/// Manhattan radius for the unit counts around an own base.
pub const BASE_SURROUNDINGS_RADIUS: i32 = 3;

/// Row that splits the frontline counts.
pub const FRONTLINE_ROW: i32 = 10;

/// Distance reported when a team has no living base to measure from.
pub const NO_BASE_DISTANCE: i32 = 9999;

/// Winner value while the game runs or after a draw.
pub const NO_WINNER: i32 = -1;

/// One of the caller's bases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnBaseExport {
    /// Remaining hp.
    pub hp: i32,
    /// Maximum hp.
    pub max_hp: i32,
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
    /// Living own units within [`BASE_SURROUNDINGS_RADIUS`].
    pub nearby_allies: usize,
    /// Living enemy units within [`BASE_SURROUNDINGS_RADIUS`].
    pub nearby_enemies: usize,
}

/// One of the opponent's bases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnemyBaseExport {
    /// Remaining hp.
    pub hp: i32,
    /// Maximum hp.
    pub max_hp: i32,
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
    /// Manhattan distance to the caller's closest living base.
    pub distance_to_nearest_my_base: i32,
}

/// Living units per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    /// Archers.
    pub archer_count: usize,
    /// Infantry.
    pub infantry_count: usize,
    /// Cavalry.
    pub cavalry_count: usize,
    /// Casters.
    pub caster_count: usize,
    /// Doctors.
    pub doctor_count: usize,
}

impl KindCounts {
    fn add(&mut self, kind: UnitKind) {
        match kind {
            UnitKind::Archer => self.archer_count += 1,
            UnitKind::Infantry => self.infantry_count += 1,
            UnitKind::Cavalry => self.cavalry_count += 1,
            UnitKind::Caster => self.caster_count += 1,
            UnitKind::Doctor => self.doctor_count += 1,
        }
    }

    /// Count for one kind.
    #[must_use]
    pub const fn get(&self, kind: UnitKind) -> usize {
        match kind {
            UnitKind::Archer => self.archer_count,
            UnitKind::Infantry => self.infantry_count,
            UnitKind::Cavalry => self.cavalry_count,
            UnitKind::Caster => self.caster_count,
            UnitKind::Doctor => self.doctor_count,
        }
    }

    /// Sum over all kinds.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.archer_count
            + self.infantry_count
            + self.cavalry_count
            + self.caster_count
            + self.doctor_count
    }
}

/// Where the armies stand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    /// Mean column of own units (0 without units).
    pub my_avg_x: f64,
    /// Mean row of own units.
    pub my_avg_y: f64,
    /// Mean column of enemy units.
    pub enemy_avg_x: f64,
    /// Mean row of enemy units.
    pub enemy_avg_y: f64,
    /// Own units below [`FRONTLINE_ROW`].
    pub my_front_soldier_count: usize,
    /// Enemy units above [`FRONTLINE_ROW`].
    pub enemy_front_soldier_count: usize,
}

/// Team-relative snapshot of the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateExport {
    /// Current turn.
    pub turn: u32,
    /// Caller's team index.
    pub my_team: u8,
    /// Caller's energy.
    pub my_energy: i32,
    /// Opponent's energy.
    pub enemy_energy: i32,
    /// Caller's remaining base hp.
    pub my_total_base_hp: i32,
    /// Opponent's remaining base hp.
    pub enemy_total_base_hp: i32,
    /// Caller's living bases.
    pub my_base_count: usize,
    /// Opponent's living bases.
    pub enemy_base_count: usize,
    /// Hp restored by the caller's doctors last combat.
    pub my_heal_done: i32,
    /// Hp restored by the opponent's doctors last combat.
    pub enemy_heal_done: i32,
    /// Caller's living units.
    pub my_soldier_count: usize,
    /// Opponent's living units.
    pub enemy_soldier_count: usize,
    /// Caller's bases, highest hp first.
    pub my_bases: Vec<OwnBaseExport>,
    /// Opponent's bases, highest hp first.
    pub enemy_bases: Vec<EnemyBaseExport>,
    /// Caller's units per kind.
    pub my_soldier_types: KindCounts,
    /// Opponent's units per kind.
    pub enemy_soldier_types: KindCounts,
    /// Army positions.
    pub soldier_distribution: Distribution,
    /// Whether the game has ended.
    pub game_over: bool,
    /// Winning team index, or [`NO_WINNER`].
    pub winner: i32,
}

fn sorted_by_hp<'w>(world: &'w World, team: Team) -> Vec<&'w Base> {
    let mut bases: Vec<&Base> = world.team_bases(team).collect();
    bases.sort_by(|a, b| b.hp().cmp(&a.hp()));
    bases.truncate(MAX_LISTED_BASES);
    bases
}

impl StateExport {
    /// Capture the world from `team`'s point of view.
    ///
    /// `heal_totals` are the per-team heal figures of the last combat.
    #[must_use]
    pub fn capture(world: &World, team: Team, heal_totals: [i32; 2]) -> Self {
        let enemy = team.opponent();

        let my_bases = sorted_by_hp(world, team)
            .into_iter()
            .map(|base| {
                let (mut allies, mut enemies) = (0, 0);
                for unit in world.living_units() {
                    if unit.position.manhattan(base.position) <= BASE_SURROUNDINGS_RADIUS {
                        if unit.team == team {
                            allies += 1;
                        } else {
                            enemies += 1;
                        }
                    }
                }
                OwnBaseExport {
                    hp: base.hp(),
                    max_hp: base.max_hp(),
                    x: base.position.x,
                    y: base.position.y,
                    nearby_allies: allies,
                    nearby_enemies: enemies,
                }
            })
            .collect();

        let enemy_bases = sorted_by_hp(world, enemy)
            .into_iter()
            .map(|base| EnemyBaseExport {
                hp: base.hp(),
                max_hp: base.max_hp(),
                x: base.position.x,
                y: base.position.y,
                distance_to_nearest_my_base: world
                    .team_bases(team)
                    .filter(|b| b.is_alive())
                    .map(|b| b.position.manhattan(base.position))
                    .min()
                    .unwrap_or(NO_BASE_DISTANCE),
            })
            .collect();

        let mut my_types = KindCounts::default();
        let mut enemy_types = KindCounts::default();
        let (mut my_sum_x, mut my_sum_y, mut enemy_sum_x, mut enemy_sum_y) = (0i64, 0i64, 0i64, 0i64);
        let (mut my_front, mut enemy_front) = (0, 0);

        for unit in world.living_units() {
            let pos = unit.position;
            if unit.team == team {
                my_types.add(unit.kind);
                my_sum_x += i64::from(pos.x);
                my_sum_y += i64::from(pos.y);
                if pos.y > FRONTLINE_ROW {
                    my_front += 1;
                }
            } else {
                enemy_types.add(unit.kind);
                enemy_sum_x += i64::from(pos.x);
                enemy_sum_y += i64::from(pos.y);
                if pos.y < FRONTLINE_ROW {
                    enemy_front += 1;
                }
            }
        }

        let my_count = my_types.total();
        let enemy_count = enemy_types.total();
        let soldier_distribution = Distribution {
            my_avg_x: fixed_mean(my_sum_x, my_count).to_num(),
            my_avg_y: fixed_mean(my_sum_y, my_count).to_num(),
            enemy_avg_x: fixed_mean(enemy_sum_x, enemy_count).to_num(),
            enemy_avg_y: fixed_mean(enemy_sum_y, enemy_count).to_num(),
            my_front_soldier_count: my_front,
            enemy_front_soldier_count: enemy_front,
        };

        let outcome = world.outcome();
        let winner = outcome
            .and_then(|o| o.winner)
            .map_or(NO_WINNER, |t| i32::from(u8::from(t)));

        Self {
            turn: world.turn(),
            my_team: u8::from(team),
            my_energy: world.energy(team),
            enemy_energy: world.energy(enemy),
            my_total_base_hp: world.total_base_hp(team),
            enemy_total_base_hp: world.total_base_hp(enemy),
            my_base_count: world.living_base_count(team),
            enemy_base_count: world.living_base_count(enemy),
            my_heal_done: heal_totals[team.index()],
            enemy_heal_done: heal_totals[enemy.index()],
            my_soldier_count: my_count,
            enemy_soldier_count: enemy_count,
            my_bases,
            enemy_bases,
            my_soldier_types: my_types,
            enemy_soldier_types: enemy_types,
            soldier_distribution,
            game_over: outcome.is_some(),
            winner,
        }
    }

    /// Encode as the JSON payload sent to external policies.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
