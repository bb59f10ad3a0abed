//! The world state.
//!
//! [`World`] owns the map, the base arena, the unit arena and both team
//! economies. Every mutation of the simulation goes through it; units and
//! bases are addressed by stable id rather than by reference.
//!
//! Units live in a `BTreeMap` keyed by [`UnitId`], so "unit-list order" used
//! by first-match targeting is spawn order everywhere.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::GameConfig;
use crate::economy::TeamEconomy;
use crate::error::{GameError, Result};
use crate::map::{GameMap, TerrainCell};
use crate::math::Position;
use crate::rng::GameRng;
use crate::team::Team;
use crate::unit::{Base, BaseId, Unit, UnitId, UnitKind};

/// Radius (Manhattan) of the crowdedness metric.
pub const CROWD_RADIUS: i32 = 2;

/// Half-width of the box searched around a base when placing a new unit.
pub const SPAWN_SEARCH_RADIUS: i32 = 3;

/// How the game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndCondition {
    /// The turn ceiling was reached; remaining base hp decided.
    TimeLimit,
    /// One team lost all of its bases.
    Elimination,
    /// Both teams lost their last bases in the same turn.
    MutualElimination,
}

/// Terminal state of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Outcome {
    /// Winning team, `None` on a draw.
    pub winner: Option<Team>,
    /// What ended the game.
    pub condition: EndCondition,
}

impl Outcome {
    /// A decided game.
    #[must_use]
    pub const fn victory(winner: Team, condition: EndCondition) -> Self {
        Self {
            winner: Some(winner),
            condition,
        }
    }

    /// A drawn game.
    #[must_use]
    pub const fn draw() -> Self {
        Self {
            winner: None,
            condition: EndCondition::MutualElimination,
        }
    }
}

/// The complete simulation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    config: GameConfig,
    map: GameMap,
    bases: Vec<Base>,
    units: BTreeMap<UnitId, Unit>,
    next_unit_id: UnitId,
    economies: [TeamEconomy; 2],
    turn: u32,
    outcome: Option<Outcome>,
}

impl World {
    /// Build the world: generate terrain, place both teams' bases and fund
    /// both economies.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidPosition`] if a configured base lies off
    /// the map.
    pub fn new(config: GameConfig, rng: &mut GameRng) -> Result<Self> {
        let map = GameMap::initialize(&config.map, rng);
        Self::with_map(config, map)
    }

    /// Build the world on a prepared map (no terrain generation).
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidPosition`] if a configured base lies off
    /// the map.
    pub fn with_map(config: GameConfig, mut map: GameMap) -> Result<Self> {
        let mut bases = Vec::with_capacity(config.bases_a.len() + config.bases_b.len());
        let layout = config
            .bases_a
            .iter()
            .map(|pos| (Team::A, *pos))
            .chain(config.bases_b.iter().map(|pos| (Team::B, *pos)));

        for (team, pos) in layout {
            if !map.set_terrain_at(pos, TerrainCell::BaseMarker(team)) {
                return Err(GameError::InvalidPosition { x: pos.x, y: pos.y });
            }
            bases.push(Base::new(bases.len(), team, pos, config.base_hp));
        }

        let economies = [
            TeamEconomy::new(config.initial_energy),
            TeamEconomy::new(config.initial_energy),
        ];

        debug!(
            map_size = map.size(),
            bases = bases.len(),
            obstacles = map.obstacle_count(),
            "World initialized"
        );

        Ok(Self {
            config,
            map,
            bases,
            units: BTreeMap::new(),
            next_unit_id: 1,
            economies,
            turn: 0,
            outcome: None,
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Rules this world was built with.
    #[must_use]
    pub const fn config(&self) -> &GameConfig {
        &self.config
    }

    /// The terrain grid.
    #[must_use]
    pub const fn map(&self) -> &GameMap {
        &self.map
    }

    /// Current turn number.
    #[must_use]
    pub const fn turn(&self) -> u32 {
        self.turn
    }

    /// Advance the turn counter.
    pub fn advance_turn(&mut self) {
        self.turn += 1;
    }

    /// Terminal state, if the game has ended.
    #[must_use]
    pub const fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Whether the game has ended.
    #[must_use]
    pub const fn is_game_over(&self) -> bool {
        self.outcome.is_some()
    }

    /// Record the terminal state. The first outcome wins.
    pub fn set_game_over(&mut self, outcome: Outcome) {
        if self.outcome.is_none() {
            self.outcome = Some(outcome);
        }
    }

    /// All bases in arena order (team A first).
    #[must_use]
    pub fn bases(&self) -> &[Base] {
        &self.bases
    }

    /// Base by arena id.
    #[must_use]
    pub fn base(&self, id: BaseId) -> Option<&Base> {
        self.bases.get(id)
    }

    /// Mutable base by arena id.
    pub fn base_mut(&mut self, id: BaseId) -> Option<&mut Base> {
        self.bases.get_mut(id)
    }

    /// A team's bases in layout order, dead ones included.
    pub fn team_bases(&self, team: Team) -> impl Iterator<Item = &Base> + '_ {
        self.bases.iter().filter(move |b| b.team == team)
    }

    /// Resolve a team-relative base index to an arena id.
    #[must_use]
    pub fn team_base_id(&self, team: Team, index: usize) -> Option<BaseId> {
        self.team_bases(team).nth(index).map(|b| b.id)
    }

    /// Team-relative index of a base.
    #[must_use]
    pub fn team_base_index(&self, id: BaseId) -> Option<usize> {
        let base = self.bases.get(id)?;
        self.team_bases(base.team).position(|b| b.id == id)
    }

    /// Team-relative indices of a team's living bases.
    #[must_use]
    pub fn living_base_indices(&self, team: Team) -> Vec<usize> {
        self.team_bases(team)
            .enumerate()
            .filter(|(_, b)| b.is_alive())
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of living bases of a team.
    #[must_use]
    pub fn living_base_count(&self, team: Team) -> usize {
        self.team_bases(team).filter(|b| b.is_alive()).count()
    }

    /// Sum of remaining base hp of a team.
    #[must_use]
    pub fn total_base_hp(&self, team: Team) -> i32 {
        self.team_bases(team).map(Base::hp).sum()
    }

    /// Unit by id.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// Mutable unit by id.
    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.get_mut(&id)
    }

    /// All units in spawn order, including ones killed this turn.
    pub fn units(&self) -> impl Iterator<Item = &Unit> + '_ {
        self.units.values()
    }

    /// Living units in spawn order.
    pub fn living_units(&self) -> impl Iterator<Item = &Unit> + '_ {
        self.units.values().filter(|u| u.is_alive())
    }

    /// Snapshot of unit ids in spawn order.
    #[must_use]
    pub fn unit_ids(&self) -> Vec<UnitId> {
        self.units.keys().copied().collect()
    }

    /// Number of living units of a team.
    #[must_use]
    pub fn living_unit_count(&self, team: Team) -> usize {
        self.living_units().filter(|u| u.team == team).count()
    }

    /// Team economy.
    #[must_use]
    pub const fn economy(&self, team: Team) -> &TeamEconomy {
        &self.economies[team.index()]
    }

    /// Current energy of a team.
    #[must_use]
    pub const fn energy(&self, team: Team) -> i32 {
        self.economies[team.index()].energy()
    }

    /// Credit energy to a team.
    pub fn add_energy(&mut self, team: Team, amount: i32) {
        self.economies[team.index()].deposit(amount);
    }

    /// Atomic check-and-spend. Returns false and leaves the balance untouched
    /// when the team cannot afford `amount`.
    pub fn spend_energy(&mut self, team: Team, amount: i32) -> bool {
        self.economies[team.index()].spend(amount)
    }

    // ------------------------------------------------------------------
    // Spatial queries
    // ------------------------------------------------------------------

    /// Whether a living unit other than `exclude` stands on `pos`.
    #[must_use]
    pub fn is_occupied(&self, pos: Position, exclude: Option<UnitId>) -> bool {
        self.living_units()
            .any(|u| u.position == pos && Some(u.id) != exclude)
    }

    /// Whether a unit may step onto `pos`: walkable terrain and no living unit.
    #[must_use]
    pub fn is_free(&self, pos: Position, exclude: Option<UnitId>) -> bool {
        self.map.is_walkable(pos) && !self.is_occupied(pos, exclude)
    }

    /// Living units of `team` within Manhattan `radius` of `pos`.
    #[must_use]
    pub fn crowdedness_at(&self, pos: Position, team: Team, radius: i32) -> usize {
        self.living_units()
            .filter(|u| u.team == team && u.position.manhattan(pos) <= radius)
            .count()
    }

    /// Living teammates of `id` within Manhattan `radius`, excluding itself.
    #[must_use]
    pub fn count_nearby_allies(&self, id: UnitId, radius: i32) -> usize {
        let Some(unit) = self.units.get(&id) else {
            return 0;
        };
        self.living_units()
            .filter(|u| u.id != id && u.team == unit.team)
            .filter(|u| u.position.manhattan(unit.position) <= radius)
            .count()
    }

    /// Whether `pos` is within home-field range of a living base of `team`.
    #[must_use]
    pub fn has_home_field(&self, team: Team, pos: Position) -> bool {
        let range = self.config.home_field_range;
        self.team_bases(team)
            .any(|b| b.is_alive() && b.position.manhattan(pos) <= range)
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Place a unit without charging energy. Returns its id.
    pub fn spawn_unit(&mut self, team: Team, kind: UnitKind, pos: Position) -> UnitId {
        let id = self.next_unit_id;
        self.next_unit_id += 1;
        self.units.insert(id, Unit::new(id, kind, team, pos));
        trace!(unit_id = id, %team, %kind, %pos, "Unit spawned");
        id
    }

    /// Move a unit. Returns false if the unit does not exist.
    pub fn move_unit(&mut self, id: UnitId, pos: Position) -> bool {
        match self.units.get_mut(&id) {
            Some(unit) => {
                unit.position = pos;
                true
            }
            None => false,
        }
    }

    /// Find the cell a new unit of `team` would be placed on around `base_pos`.
    ///
    /// Scans the box of half-width [`SPAWN_SEARCH_RADIUS`] column by column,
    /// skipping the centre, and keeps the first free cell with the lowest
    /// crowdedness. Falls back to the base cell itself if it is unoccupied.
    #[must_use]
    pub fn find_spawn_position(&self, team: Team, base_pos: Position) -> Option<Position> {
        let mut best: Option<(Position, usize)> = None;

        for dx in -SPAWN_SEARCH_RADIUS..=SPAWN_SEARCH_RADIUS {
            for dy in -SPAWN_SEARCH_RADIUS..=SPAWN_SEARCH_RADIUS {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let pos = base_pos.offset(dx, dy);
                if !self.is_free(pos, None) {
                    continue;
                }
                let crowd = self.crowdedness_at(pos, team, CROWD_RADIUS);
                if best.map_or(true, |(_, c)| crowd < c) {
                    best = Some((pos, crowd));
                }
            }
        }

        best.map(|(pos, _)| pos).or_else(|| {
            (self.map.is_walkable(base_pos) && !self.is_occupied(base_pos, None))
                .then_some(base_pos)
        })
    }

    /// Purchase a unit next to the base at `base_pos`.
    ///
    /// Energy is spent first and refunded if no cell is free.
    ///
    /// # Errors
    ///
    /// [`GameError::InsufficientEnergy`] or [`GameError::NoSpawnCell`]; the
    /// world is unchanged in both cases.
    pub fn purchase_unit(&mut self, team: Team, kind: UnitKind, base_pos: Position) -> Result<UnitId> {
        let cost = kind.cost();
        if !self.spend_energy(team, cost) {
            return Err(GameError::InsufficientEnergy {
                team,
                required: cost,
                available: self.energy(team),
            });
        }

        let Some(pos) = self.find_spawn_position(team, base_pos) else {
            self.economies[team.index()].refund(cost);
            return Err(GameError::NoSpawnCell {
                x: base_pos.x,
                y: base_pos.y,
            });
        };

        Ok(self.spawn_unit(team, kind, pos))
    }

    /// Purchase entry point: true on success, false with no state change
    /// otherwise.
    pub fn purchase(&mut self, team: Team, kind: UnitKind, base_pos: Position) -> bool {
        match self.purchase_unit(team, kind, base_pos) {
            Ok(_) => true,
            Err(err) => {
                debug!(%team, %kind, error = %err, "Purchase failed");
                false
            }
        }
    }

    /// Refresh vision: every living unit records the enemies it sees, then
    /// merges the sightings of living teammates within communication range.
    pub fn update_vision(&mut self) {
        let living: Vec<(UnitId, Team, Position)> = self
            .living_units()
            .map(|u| (u.id, u.team, u.position))
            .collect();

        let sightings: Vec<(UnitId, BTreeSet<UnitId>)> = self
            .living_units()
            .map(|observer| {
                let seen = living
                    .iter()
                    .filter(|(_, team, pos)| *team != observer.team && observer.can_see(*pos))
                    .map(|(id, _, _)| *id)
                    .collect();
                (observer.id, seen)
            })
            .collect();

        for (id, seen) in sightings {
            if let Some(unit) = self.units.get_mut(&id) {
                unit.last_turn_visible = seen;
            }
        }

        let range = self.config.communication_range;
        let relayed: Vec<(UnitId, BTreeSet<UnitId>)> = self
            .living_units()
            .map(|unit| {
                let shared = self
                    .living_units()
                    .filter(|mate| mate.id != unit.id && mate.team == unit.team)
                    .filter(|mate| mate.position.chebyshev(unit.position) <= range)
                    .flat_map(|mate| mate.last_turn_visible.iter().copied())
                    .collect();
                (unit.id, shared)
            })
            .collect();

        for (id, shared) in relayed {
            if let Some(unit) = self.units.get_mut(&id) {
                unit.shared_visible = shared;
            }
        }
    }

    /// Drop units whose liveness became false. Returns the removed ids.
    pub fn remove_dead_units(&mut self) -> Vec<UnitId> {
        let dead: Vec<UnitId> = self
            .units
            .values()
            .filter(|u| !u.is_alive())
            .map(|u| u.id)
            .collect();
        for id in &dead {
            self.units.remove(id);
        }
        dead
    }

    // ------------------------------------------------------------------
    // Determinism support
    // ------------------------------------------------------------------

    /// Hash of the gameplay-relevant state.
    ///
    /// Two worlds with equal hashes had the same turn, energies, base hp and
    /// unit placement.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.turn.hash(&mut hasher);
        for economy in &self.economies {
            economy.energy().hash(&mut hasher);
        }

        for base in &self.bases {
            base.id.hash(&mut hasher);
            base.hp().hash(&mut hasher);
        }

        self.units.len().hash(&mut hasher);
        for unit in self.units.values() {
            unit.id.hash(&mut hasher);
            unit.kind.hash(&mut hasher);
            unit.team.hash(&mut hasher);
            unit.position.hash(&mut hasher);
            unit.hp().hash(&mut hasher);
            unit.is_alive().hash(&mut hasher);
        }

        self.outcome.hash(&mut hasher);
        hasher.finish()
    }

    /// Serialize the world to bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize world: {e}")))
    }

    /// Deserialize a world from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| GameError::InvalidState(format!("Failed to deserialize world: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapConfig;

    fn open_world() -> World {
        let config = GameConfig::default().with_map(MapConfig::open(64));
        World::with_map(config, GameMap::new(64)).unwrap()
    }

    #[test]
    fn test_initial_layout() {
        let world = open_world();
        assert_eq!(world.bases().len(), 6);
        assert_eq!(world.living_base_count(Team::A), 3);
        assert_eq!(world.total_base_hp(Team::B), 15_000);
        assert_eq!(world.energy(Team::A), 200);
        assert_eq!(
            world.map().terrain_at(Position::new(35, 56)),
            Some(TerrainCell::BaseMarker(Team::B))
        );
        assert_eq!(world.team_base_id(Team::B, 0), Some(3));
        assert_eq!(world.team_base_index(4), Some(1));
    }

    #[test]
    fn test_base_off_map_is_fatal() {
        let config = GameConfig::default()
            .with_bases(vec![Position::new(100, 100)], vec![Position::new(1, 1)]);
        let result = World::with_map(config, GameMap::new(64));
        assert!(matches!(result, Err(GameError::InvalidPosition { x: 100, y: 100 })));
    }

    #[test]
    fn test_generated_world_keeps_base_cells_walkable() {
        let mut rng = crate::rng::seeded_rng(3);
        let world = World::new(GameConfig::default(), &mut rng).unwrap();
        for base in world.bases() {
            assert!(world.map().is_walkable(base.position));
        }
    }

    #[test]
    fn test_purchase_exact_cost() {
        let mut world = open_world();
        let base = world.bases()[0].position;
        world.economies[0] = TeamEconomy::new(80);
        assert!(world.purchase(Team::A, UnitKind::Archer, base));
        assert_eq!(world.energy(Team::A), 0);
        assert_eq!(world.living_unit_count(Team::A), 1);
    }

    #[test]
    fn test_purchase_one_short_fails_cleanly() {
        let mut world = open_world();
        let base = world.bases()[0].position;
        world.economies[0] = TeamEconomy::new(79);
        assert!(!world.purchase(Team::A, UnitKind::Archer, base));
        assert_eq!(world.energy(Team::A), 79);
        assert_eq!(world.living_unit_count(Team::A), 0);
    }

    #[test]
    fn test_spawn_prefers_least_crowded_cell() {
        let mut world = open_world();
        let base = Position::new(20, 20);
        let first = world.find_spawn_position(Team::A, base).unwrap();
        // Column -3 is scanned first and every cell is empty.
        assert_eq!(first, Position::new(17, 17));

        world.spawn_unit(Team::A, UnitKind::Infantry, Position::new(17, 17));
        let second = world.find_spawn_position(Team::A, base).unwrap();
        assert_eq!(world.crowdedness_at(second, Team::A, CROWD_RADIUS), 0);
        assert_ne!(second, Position::new(17, 17));
    }

    #[test]
    fn test_spawn_falls_back_to_base_cell() {
        let mut world = open_world();
        let base = Position::new(20, 20);
        for dx in -3..=3 {
            for dy in -3..=3 {
                if dx != 0 || dy != 0 {
                    world.spawn_unit(Team::A, UnitKind::Infantry, base.offset(dx, dy));
                }
            }
        }
        assert_eq!(world.find_spawn_position(Team::A, base), Some(base));

        world.spawn_unit(Team::A, UnitKind::Infantry, base);
        let before = world.energy(Team::A);
        assert!(!world.purchase(Team::A, UnitKind::Archer, base));
        assert_eq!(world.energy(Team::A), before);
    }

    #[test]
    fn test_vision_relay() {
        let mut world = open_world();
        let scout = world.spawn_unit(Team::A, UnitKind::Archer, Position::new(30, 30));
        let rear = world.spawn_unit(Team::A, UnitKind::Infantry, Position::new(30, 44));
        let far = world.spawn_unit(Team::A, UnitKind::Infantry, Position::new(30, 50));
        let enemy = world.spawn_unit(Team::B, UnitKind::Cavalry, Position::new(30, 25));

        world.update_vision();

        let scout = world.unit(scout).unwrap();
        assert!(scout.last_turn_visible.contains(&enemy));
        assert!(scout.shared_visible.is_empty());

        let rear = world.unit(rear).unwrap();
        assert!(rear.last_turn_visible.is_empty());
        assert!(rear.shared_visible.contains(&enemy));

        // 20 rows away from the scout: out of communication range.
        let far = world.unit(far).unwrap();
        assert!(far.shared_visible.is_empty());
    }

    #[test]
    fn test_remove_dead_units() {
        let mut world = open_world();
        let a = world.spawn_unit(Team::A, UnitKind::Archer, Position::new(30, 30));
        let b = world.spawn_unit(Team::B, UnitKind::Archer, Position::new(31, 30));
        world.unit_mut(a).unwrap().take_damage(1000);
        assert_eq!(world.remove_dead_units(), vec![a]);
        assert!(world.unit(a).is_none());
        assert!(world.unit(b).is_some());
    }

    #[test]
    fn test_occupancy_ignores_dead_units() {
        let mut world = open_world();
        let pos = Position::new(30, 30);
        let id = world.spawn_unit(Team::A, UnitKind::Archer, pos);
        assert!(world.is_occupied(pos, None));
        assert!(!world.is_occupied(pos, Some(id)));
        world.unit_mut(id).unwrap().take_damage(1000);
        assert!(!world.is_occupied(pos, None));
    }

    #[test]
    fn test_home_field() {
        let mut world = open_world();
        assert!(world.has_home_field(Team::A, Position::new(11, 15)));
        assert!(!world.has_home_field(Team::A, Position::new(12, 15)));
        world.base_mut(0).unwrap().take_damage(10_000);
        assert!(!world.has_home_field(Team::A, Position::new(11, 15)));
    }

    #[test]
    fn test_serialization_round_trip_preserves_hash() {
        let mut world = open_world();
        world.spawn_unit(Team::A, UnitKind::Doctor, Position::new(12, 12));
        world.advance_turn();
        let bytes = world.serialize().unwrap();
        let restored = World::deserialize(&bytes).unwrap();
        assert_eq!(world.state_hash(), restored.state_hash());
    }

    #[test]
    fn test_first_outcome_sticks() {
        let mut world = open_world();
        world.set_game_over(Outcome::victory(Team::A, EndCondition::Elimination));
        world.set_game_over(Outcome::draw());
        assert_eq!(world.outcome().unwrap().winner, Some(Team::A));
    }
}
