//! Combat resolution.
//!
//! Runs once per turn, after movement, in three strict phases:
//!
//! 1. **Heal**: every living Doctor restores hp to living teammates within
//!    Manhattan [`DOCTOR_HEAL_RADIUS`], capped at max hp.
//! 2. **Attack**: every living unit attacks the first enemy in spawn order
//!    within its attack range. Casters additionally burst every living enemy
//!    within Manhattan [`CASTER_AOE_RADIUS`] of that first target.
//! 3. **Siege**: every living unit damages every living enemy base within
//!    its attack range.
//!
//! Damage gets the home-field multiplier when the attacker stands within
//! home-field range of one of its own living bases; unit armor is
//! subtracted afterwards, bases take the full amount.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::events::{EventKind, GameEvent};
use crate::math::Position;
use crate::team::Team;
use crate::unit::{Unit, UnitId, UnitKind, CASTER_AOE_RADIUS, DOCTOR_HEAL_AMOUNT, DOCTOR_HEAL_RADIUS};
use crate::world::World;

/// Result of one combat resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatReport {
    /// Hp actually restored this turn, indexed by team.
    pub heal_totals: [i32; 2],
    /// Attacks, kills and base damage in resolution order.
    pub events: Vec<GameEvent>,
}

impl CombatReport {
    /// Heal done by a team this turn.
    #[must_use]
    pub const fn heal_done(&self, team: Team) -> i32 {
        self.heal_totals[team.index()]
    }

    /// Number of kills credited to a team.
    #[must_use]
    pub fn kills_by(&self, team: Team) -> usize {
        self.events
            .iter()
            .filter(|e| e.kind == EventKind::Kill && e.team == Some(team))
            .count()
    }
}

/// Outgoing damage of `attacker` before the defender's armor.
///
/// # Example
///
/// ```
/// use skirmish_core::combat::outgoing_damage;
/// use skirmish_core::config::GameConfig;
/// use skirmish_core::map::GameMap;
/// use skirmish_core::math::Position;
/// use skirmish_core::team::Team;
/// use skirmish_core::unit::UnitKind;
/// use skirmish_core::world::World;
///
/// let mut world = World::with_map(GameConfig::default(), GameMap::new(64)).unwrap();
/// let near = world.spawn_unit(Team::A, UnitKind::Infantry, Position::new(9, 13));
/// let far = world.spawn_unit(Team::A, UnitKind::Infantry, Position::new(30, 30));
/// assert_eq!(outgoing_damage(&world, world.unit(near).unwrap()), 84);
/// assert_eq!(outgoing_damage(&world, world.unit(far).unwrap()), 70);
/// ```
#[must_use]
pub fn outgoing_damage(world: &World, attacker: &Unit) -> i32 {
    let raw = attacker.stats().attack;
    if world.has_home_field(attacker.team, attacker.position) {
        world.config().apply_home_field(raw)
    } else {
        raw
    }
}

/// Resolve heal, attack and siege phases for the current turn.
pub fn resolve_combat(world: &mut World) -> CombatReport {
    let mut report = CombatReport::default();
    let ids = world.unit_ids();

    heal_phase(world, &ids, &mut report);
    attack_phase(world, &ids, &mut report);
    siege_phase(world, &ids, &mut report);

    report
}

fn heal_phase(world: &mut World, ids: &[UnitId], report: &mut CombatReport) {
    let doctors: Vec<(UnitId, Team, Position)> = ids
        .iter()
        .filter_map(|id| world.unit(*id))
        .filter(|u| u.is_alive() && u.kind == UnitKind::Doctor)
        .map(|u| (u.id, u.team, u.position))
        .collect();

    for (doctor_id, team, pos) in doctors {
        for &id in ids {
            if id == doctor_id {
                continue;
            }
            let Some(ally) = world.unit_mut(id) else {
                continue;
            };
            if !ally.is_alive()
                || ally.team != team
                || ally.position.manhattan(pos) > DOCTOR_HEAL_RADIUS
            {
                continue;
            }
            let before = ally.hp();
            ally.set_hp(before + DOCTOR_HEAL_AMOUNT);
            report.heal_totals[team.index()] += ally.hp() - before;
        }
    }
}

fn attack_phase(world: &mut World, ids: &[UnitId], report: &mut CombatReport) {
    for &attacker_id in ids {
        let Some(attacker) = world.unit(attacker_id).filter(|u| u.is_alive()) else {
            continue;
        };

        let Some((primary, primary_pos)) = ids
            .iter()
            .filter_map(|id| world.unit(*id))
            .find(|u| u.is_alive() && u.team != attacker.team && attacker.can_attack(u.position))
            .map(|u| (u.id, u.position))
        else {
            continue;
        };

        let targets: Vec<UnitId> = if attacker.kind == UnitKind::Caster {
            ids.iter()
                .filter_map(|id| world.unit(*id))
                .filter(|u| {
                    u.is_alive()
                        && u.team != attacker.team
                        && u.position.manhattan(primary_pos) <= CASTER_AOE_RADIUS
                })
                .map(|u| u.id)
                .collect()
        } else {
            vec![primary]
        };

        let damage = outgoing_damage(world, attacker);
        for target in targets {
            strike(world, attacker_id, target, damage, report);
        }
    }
}

fn strike(
    world: &mut World,
    attacker_id: UnitId,
    target_id: UnitId,
    damage: i32,
    report: &mut CombatReport,
) {
    let Some(team) = world.unit(attacker_id).map(|u| u.team) else {
        return;
    };
    let turn = world.turn();
    let Some(target) = world.unit_mut(target_id) else {
        return;
    };

    let dealt = target.take_damage(damage);
    let victim_kind = target.kind;
    let killed = !target.is_alive();

    report.events.push(
        GameEvent::new(EventKind::Attack, Some(team), turn, format!("{team} hits {victim_kind}"))
            .with_unit(attacker_id)
            .with_target(target_id)
            .with_damage(dealt),
    );

    if killed {
        let reward = victim_kind.kill_reward();
        world.add_energy(team, reward);
        debug!(turn, %team, attacker = attacker_id, victim = target_id, %victim_kind, reward, "Unit killed");
        report.events.push(
            GameEvent::new(EventKind::Kill, Some(team), turn, format!("{team} killed {victim_kind}"))
                .with_unit(attacker_id)
                .with_target(target_id)
                .with_reward(reward),
        );
    }
}

fn siege_phase(world: &mut World, ids: &[UnitId], report: &mut CombatReport) {
    let turn = world.turn();

    for &attacker_id in ids {
        let Some(attacker) = world.unit(attacker_id).filter(|u| u.is_alive()) else {
            continue;
        };
        let team = attacker.team;
        let damage = outgoing_damage(world, attacker);
        let in_range: Vec<usize> = world
            .bases()
            .iter()
            .filter(|b| b.team != team && b.is_alive() && attacker.can_attack(b.position))
            .map(|b| b.id)
            .collect();

        for base_id in in_range {
            let Some(base) = world.base_mut(base_id) else {
                continue;
            };
            base.take_damage(damage);
            let owner = base.team;
            report.events.push(
                GameEvent::new(
                    EventKind::BaseDamaged,
                    Some(owner),
                    turn,
                    format!("{team} hit {owner} base {base_id}"),
                )
                .with_unit(attacker_id)
                .with_base(base_id)
                .with_damage(damage),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::map::GameMap;

    fn open_world() -> World {
        World::with_map(GameConfig::default(), GameMap::new(64)).unwrap()
    }

    #[test]
    fn test_plain_hit_subtracts_armor() {
        let mut world = open_world();
        world.spawn_unit(Team::A, UnitKind::Infantry, Position::new(30, 30));
        let archer = world.spawn_unit(Team::B, UnitKind::Archer, Position::new(31, 30));

        resolve_combat(&mut world);

        let archer = world.unit(archer).unwrap();
        assert_eq!(archer.hp(), 35);
        assert!(archer.is_alive());
    }

    #[test]
    fn test_home_field_hit() {
        let mut world = open_world();
        // Manhattan 2 from team A's base at (8, 12).
        world.spawn_unit(Team::A, UnitKind::Infantry, Position::new(9, 13));
        let archer = world.spawn_unit(Team::B, UnitKind::Archer, Position::new(10, 13));

        resolve_combat(&mut world);

        assert_eq!(world.unit(archer).unwrap().hp(), 21);
    }

    #[test]
    fn test_heal_capped_at_max() {
        let mut world = open_world();
        world.spawn_unit(Team::A, UnitKind::Doctor, Position::new(30, 30));
        let ally = world.spawn_unit(Team::A, UnitKind::Infantry, Position::new(31, 31));
        world.unit_mut(ally).unwrap().set_hp(150);

        let report = resolve_combat(&mut world);
        assert_eq!(world.unit(ally).unwrap().hp(), 180);
        assert_eq!(report.heal_done(Team::A), 30);

        world.unit_mut(ally).unwrap().set_hp(170);
        let report = resolve_combat(&mut world);
        assert_eq!(world.unit(ally).unwrap().hp(), 180);
        assert_eq!(report.heal_done(Team::A), 10);
    }

    #[test]
    fn test_doctor_does_not_heal_itself() {
        let mut world = open_world();
        let doctor = world.spawn_unit(Team::A, UnitKind::Doctor, Position::new(30, 30));
        world.unit_mut(doctor).unwrap().set_hp(60);

        let report = resolve_combat(&mut world);
        assert_eq!(world.unit(doctor).unwrap().hp(), 60);
        assert_eq!(report.heal_done(Team::A), 0);
    }

    #[test]
    fn test_single_target_first_match() {
        let mut world = open_world();
        world.spawn_unit(Team::A, UnitKind::Archer, Position::new(30, 30));
        let first = world.spawn_unit(Team::B, UnitKind::Caster, Position::new(33, 30));
        let second = world.spawn_unit(Team::B, UnitKind::Caster, Position::new(31, 30));

        resolve_combat(&mut world);

        // The closer caster spawned later: spawn order decides, not distance.
        assert_eq!(world.unit(first).unwrap().hp(), 40);
        // One attack per unit: the second caster is untouched.
        assert_eq!(world.unit(second).unwrap().hp(), 90);
    }

    #[test]
    fn test_caster_burst_hits_adjacent_enemies() {
        let mut world = open_world();
        world.spawn_unit(Team::A, UnitKind::Caster, Position::new(30, 30));
        let primary = world.spawn_unit(Team::B, UnitKind::Archer, Position::new(33, 30));
        let adjacent = world.spawn_unit(Team::B, UnitKind::Archer, Position::new(34, 30));
        let diagonal = world.spawn_unit(Team::B, UnitKind::Archer, Position::new(34, 31));

        resolve_combat(&mut world);

        assert_eq!(world.unit(primary).unwrap().hp(), 55);
        assert_eq!(world.unit(adjacent).unwrap().hp(), 55);
        // Manhattan 2 from the primary target: outside the burst.
        assert_eq!(world.unit(diagonal).unwrap().hp(), 100);
    }

    #[test]
    fn test_kill_credits_half_cost() {
        let mut world = open_world();
        world.spawn_unit(Team::A, UnitKind::Infantry, Position::new(30, 30));
        let victim = world.spawn_unit(Team::B, UnitKind::Cavalry, Position::new(31, 30));
        world.unit_mut(victim).unwrap().set_hp(10);
        let before_a = world.energy(Team::A);
        let before_b = world.energy(Team::B);

        let report = resolve_combat(&mut world);

        assert!(!world.unit(victim).unwrap().is_alive());
        assert_eq!(world.energy(Team::A), before_a + 50);
        assert_eq!(world.energy(Team::B), before_b);
        assert_eq!(report.kills_by(Team::A), 1);
    }

    #[test]
    fn test_dead_units_do_not_strike_back() {
        let mut world = open_world();
        world.spawn_unit(Team::A, UnitKind::Infantry, Position::new(30, 30));
        let victim = world.spawn_unit(Team::B, UnitKind::Infantry, Position::new(31, 30));
        world.unit_mut(victim).unwrap().set_hp(1);

        let report = resolve_combat(&mut world);

        let attacks_by_b = report
            .events
            .iter()
            .filter(|e| e.kind == EventKind::Attack && e.team == Some(Team::B))
            .count();
        assert_eq!(attacks_by_b, 0);
    }

    #[test]
    fn test_siege_hits_every_base_in_range() {
        let mut world = open_world();
        // Team B base at (10, 49); archer range 3.
        world.spawn_unit(Team::A, UnitKind::Archer, Position::new(12, 47));

        let report = resolve_combat(&mut world);

        assert_eq!(world.base(3).unwrap().hp(), 4950);
        let siege: Vec<_> = report
            .events
            .iter()
            .filter(|e| e.kind == EventKind::BaseDamaged)
            .collect();
        assert_eq!(siege.len(), 1);
        assert_eq!(siege[0].team, Some(Team::B));
        assert_eq!(siege[0].damage, 50);
        assert_eq!(siege[0].base_id, Some(3));
    }

    #[test]
    fn test_siege_ignores_dead_bases() {
        let mut world = open_world();
        world.base_mut(3).unwrap().take_damage(10_000);
        world.spawn_unit(Team::A, UnitKind::Archer, Position::new(12, 47));
        let report = resolve_combat(&mut world);
        assert!(report.events.is_empty());
    }
}
