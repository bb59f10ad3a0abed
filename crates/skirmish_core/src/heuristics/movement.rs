//! Per-unit movement heuristics.
//!
//! Units have no pathfinding. Every step they look at the eight surrounding
//! cells, ranked by direction toward their target and by how crowded each
//! cell is with teammates, and take the first free one.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::math::Position;
use crate::rng::GameRng;
use crate::unit::{Unit, UnitId, UnitKind};
use crate::world::{World, CROWD_RADIUS};

/// Teammates within [`CROWD_RADIUS`] at which a unit counts as crowded.
pub const CROWDED_THRESHOLD: usize = 6;

/// Teammates within [`CROWD_RADIUS`] at which a unit stops moving unless
/// it is close to a fight.
pub const VERY_CROWDED_THRESHOLD: usize = 8;

/// Extra Chebyshev distance beyond attack range that counts as engaged.
pub const ENGAGE_MARGIN: i32 = 2;

/// Manhattan distance at which an Archer retreats from melee enemies.
pub const RETREAT_TRIGGER: i32 = 2;

/// Chance (out of ten) that the direction toward the target is skewed.
const PERTURB_CHANCE: u32 = 3;

/// A completed relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    /// Cell at the start of the phase.
    pub from: Position,
    /// Cell at the end of the phase.
    pub to: Position,
}

/// Nearest enemy `unit` detects, directly or through relayed vision.
///
/// Distances are Manhattan; ties go to the earlier-spawned enemy.
#[must_use]
pub fn find_nearest_enemy<'w>(world: &'w World, unit: &Unit) -> Option<&'w Unit> {
    let mut nearest: Option<(&Unit, i32)> = None;
    for enemy in world.living_units() {
        if enemy.team == unit.team || !unit.detects(enemy) {
            continue;
        }
        let distance = unit.position.manhattan(enemy.position);
        if nearest.map_or(true, |(_, best)| distance < best) {
            nearest = Some((enemy, distance));
        }
    }
    nearest.map(|(enemy, _)| enemy)
}

/// Cell of the nearest living enemy base, or the map centre when every
/// enemy base is destroyed.
#[must_use]
pub fn enemy_base_target(world: &World, unit: &Unit) -> Position {
    let mut nearest: Option<(Position, i32)> = None;
    for base in world.team_bases(unit.team.opponent()) {
        if !base.is_alive() {
            continue;
        }
        let distance = unit.position.manhattan(base.position);
        if nearest.map_or(true, |(_, best)| distance < best) {
            nearest = Some((base.position, distance));
        }
    }
    nearest.map_or_else(|| world.map().center(), |(pos, _)| pos)
}

/// Where `unit` is heading this step.
#[must_use]
pub fn movement_target(world: &World, unit: &Unit) -> Position {
    find_nearest_enemy(world, unit).map_or_else(|| enemy_base_target(world, unit), |e| e.position)
}

fn random_sign(rng: &mut GameRng) -> i32 {
    if rng.gen_range(0..2) == 0 {
        1
    } else {
        -1
    }
}

/// Ranked cells for the next step of `unit`.
///
/// Heads for [`movement_target`], skewing the direction sideways three
/// times in ten. Returns an empty list when staying put beats every
/// alternative.
pub fn move_candidates(world: &World, unit: &Unit, rng: &mut GameRng) -> Vec<Position> {
    let (mut dx, mut dy) = unit.position.step_toward(movement_target(world, unit));

    if rng.gen_range(0..10) < PERTURB_CHANCE {
        if rng.gen_range(0..2) == 0 {
            if dx != 0 {
                dy = if dy == 0 { random_sign(rng) } else { -dy };
            }
        } else if dy != 0 {
            dx = if dx == 0 { random_sign(rng) } else { -dx };
        }
    }

    rank_candidates(world, unit, (dx, dy))
}

/// Rank the eight neighbours of `unit` for a step in `direction`.
///
/// The diagonal toward the target comes first, then the two axis steps,
/// then everything else; ties within a tier go to the less crowded cell.
/// When the best cell holds [`CROWDED_THRESHOLD`] or more teammates but the
/// current one does not, the list is empty.
#[must_use]
pub fn rank_candidates(world: &World, unit: &Unit, direction: (i32, i32)) -> Vec<Position> {
    let current = unit.position;
    let (dx, dy) = direction;

    let mut ranked: Vec<(Position, u8)> = Vec::with_capacity(8);
    if dx != 0 && dy != 0 {
        ranked.push((current.offset(dx, dy), 1));
    }
    if dx != 0 {
        ranked.push((current.offset(dx, 0), 2));
    }
    if dy != 0 {
        ranked.push((current.offset(0, dy), 2));
    }
    for i in -1..=1 {
        for j in -1..=1 {
            if i == 0 && j == 0 {
                continue;
            }
            let pos = current.offset(i, j);
            if !ranked.iter().any(|(p, _)| *p == pos) {
                ranked.push((pos, 3));
            }
        }
    }

    let mut scored: Vec<(Position, u8, usize)> = ranked
        .into_iter()
        .map(|(pos, priority)| (pos, priority, world.crowdedness_at(pos, unit.team, CROWD_RADIUS)))
        .collect();
    scored.sort_by_key(|(_, priority, crowd)| (*priority, *crowd));

    let here = world.crowdedness_at(current, unit.team, CROWD_RADIUS);
    if scored
        .first()
        .is_some_and(|(_, _, crowd)| *crowd >= CROWDED_THRESHOLD && here < CROWDED_THRESHOLD)
    {
        return Vec::new();
    }

    scored.into_iter().map(|(pos, _, _)| pos).collect()
}

/// Cells that step away from `threat`: diagonal first, then each axis, then
/// the lateral offsets of each axis.
///
/// # Example
///
/// ```
/// use skirmish_core::heuristics::movement::retreat_positions;
/// use skirmish_core::math::Position;
///
/// let cells = retreat_positions(Position::new(5, 5), Position::new(6, 6));
/// assert_eq!(cells[0], Position::new(4, 4));
/// ```
#[must_use]
pub fn retreat_positions(current: Position, threat: Position) -> Vec<Position> {
    let (tx, ty) = current.step_toward(threat);
    let (dx, dy) = (-tx, -ty);

    let mut cells = Vec::with_capacity(7);
    if dx != 0 && dy != 0 {
        cells.push(current.offset(dx, dy));
    }
    if dx != 0 {
        cells.push(current.offset(dx, 0));
    }
    if dy != 0 {
        cells.push(current.offset(0, dy));
    }
    if dy != 0 {
        cells.push(current.offset(1, dy));
        cells.push(current.offset(-1, dy));
    }
    if dx != 0 {
        cells.push(current.offset(dx, 1));
        cells.push(current.offset(dx, -1));
    }
    cells
}

fn is_engaged(world: &World, unit: &Unit) -> bool {
    let reach = unit.stats().attack_range + ENGAGE_MARGIN;
    world
        .living_units()
        .any(|e| e.team != unit.team && unit.position.chebyshev(e.position) <= reach)
}

fn has_target_in_range(world: &World, unit: &Unit) -> bool {
    world
        .living_units()
        .any(|e| e.team != unit.team && unit.can_attack(e.position))
}

fn nearest_melee_threat(world: &World, unit: &Unit) -> Option<Position> {
    let mut nearest: Option<(Position, i32)> = None;
    for enemy in world.living_units() {
        if enemy.team == unit.team || !enemy.kind.is_melee() {
            continue;
        }
        let distance = unit.position.manhattan(enemy.position);
        if distance <= RETREAT_TRIGGER && nearest.map_or(true, |(_, best)| distance < best) {
            nearest = Some((enemy.position, distance));
        }
    }
    nearest.map(|(pos, _)| pos)
}

fn first_free(world: &World, id: UnitId, cells: &[Position]) -> Option<Position> {
    cells.iter().copied().find(|pos| world.is_free(*pos, Some(id)))
}

fn disperse_cells(world: &World, unit: &Unit) -> Vec<Position> {
    let Some(home) = world.team_bases(unit.team).next().map(|b| b.position) else {
        return Vec::new();
    };
    let (dx, dy) = home.step_toward(unit.position);
    if dx == 0 && dy == 0 {
        return Vec::new();
    }
    vec![
        unit.position.offset(dx, dy),
        unit.position.offset(dx, 0),
        unit.position.offset(0, dy),
    ]
}

fn fallback_neighbors(current: Position) -> Vec<Position> {
    vec![
        current.offset(1, 0),
        current.offset(-1, 0),
        current.offset(0, 1),
        current.offset(0, -1),
        current.offset(1, 1),
        current.offset(1, -1),
        current.offset(-1, 1),
        current.offset(-1, -1),
    ]
}

fn fallback_diamond(current: Position) -> Vec<Position> {
    let mut cells = Vec::with_capacity(12);
    for i in -2..=2_i32 {
        for j in -2..=2_i32 {
            if i.abs() + j.abs() <= 2 && (i != 0 || j != 0) {
                cells.push(current.offset(i, j));
            }
        }
    }
    cells
}

/// Move one unit for this turn.
///
/// Returns where it went, or `None` if it stayed put.
pub fn process_unit_behavior(world: &mut World, id: UnitId, rng: &mut GameRng) -> Option<Relocation> {
    let unit = world.unit(id).filter(|u| u.is_alive())?.clone();
    let from = unit.position;

    let nearby = world.count_nearby_allies(id, CROWD_RADIUS);
    let crowded = nearby >= CROWDED_THRESHOLD;
    if nearby >= VERY_CROWDED_THRESHOLD && !is_engaged(world, &unit) {
        return None;
    }

    if unit.kind == UnitKind::Archer {
        if has_target_in_range(world, &unit) {
            return None;
        }
        if let Some(threat) = nearest_melee_threat(world, &unit) {
            if let Some(cell) = first_free(world, id, &retreat_positions(from, threat)) {
                world.move_unit(id, cell);
                return Some(Relocation { from, to: cell });
            }
        }
    }

    for step in 0..unit.stats().speed {
        if crowded && step == 0 {
            let Some(current) = world.unit(id) else {
                break;
            };
            let cells = disperse_cells(world, current);
            if let Some(cell) = first_free(world, id, &cells) {
                world.move_unit(id, cell);
                continue;
            }
        }

        let Some(current) = world.unit(id) else {
            break;
        };
        let here = current.position;
        let candidates = move_candidates(world, current, rng);
        if candidates.is_empty() {
            break;
        }
        if let Some(cell) = first_free(world, id, &candidates) {
            world.move_unit(id, cell);
            continue;
        }

        let mut neighbors = fallback_neighbors(here);
        neighbors.shuffle(rng);
        if let Some(cell) = first_free(world, id, &neighbors) {
            world.move_unit(id, cell);
            continue;
        }

        let mut diamond = fallback_diamond(here);
        diamond.shuffle(rng);
        match first_free(world, id, &diamond) {
            Some(cell) => {
                world.move_unit(id, cell);
            }
            None => break,
        }
    }

    let to = world.unit(id)?.position;
    (to != from).then_some(Relocation { from, to })
}
