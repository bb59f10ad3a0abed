//! Test fixtures and helpers.
//!
//! Pre-built worlds, engines and scripted controllers for consistent
//! testing.

use skirmish_core::action::Action;
use skirmish_core::config::GameConfig;
use skirmish_core::decision::{ActionInbox, Controllers, HumanSource};
use skirmish_core::engine::{TurnEngine, TurnReport};
use skirmish_core::map::GameMap;
use skirmish_core::math::{Fixed, Position};
use skirmish_core::rng::seeded_rng;
use skirmish_core::team::Team;
use skirmish_core::unit::{UnitId, UnitKind};
use skirmish_core::world::World;

/// Seed used by fixtures that don't care about the seed.
pub const FIXTURE_SEED: u64 = 0x5EED;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> Fixed {
    Fixed::from_num(n)
}

/// Default-sized world without obstacles, bases at their default cells.
///
/// # Panics
///
/// Panics if the default base layout does not fit the map.
#[must_use]
pub fn open_world() -> World {
    open_world_with(GameConfig::default())
}

/// Obstacle-free world for `config`.
///
/// # Panics
///
/// Panics if a configured base lies outside the map.
#[must_use]
pub fn open_world_with(config: GameConfig) -> World {
    let map = GameMap::new(config.map.size);
    World::with_map(config, map).expect("fixture bases fit the map")
}

/// Engine over an obstacle-free world.
#[must_use]
pub fn open_engine(config: GameConfig) -> TurnEngine {
    TurnEngine::from_world(open_world_with(config), seeded_rng(FIXTURE_SEED))
}

/// Spawn `count` units of one kind in a horizontal row.
pub fn spawn_row(
    world: &mut World,
    team: Team,
    kind: UnitKind,
    start: Position,
    count: i32,
) -> Vec<UnitId> {
    (0..count)
        .map(|i| world.spawn_unit(team, kind, start.offset(i, 0)))
        .collect()
}

/// Controllers that only act on queued actions, with the two inboxes.
#[must_use]
pub fn scripted_controllers() -> (Controllers, [ActionInbox; 2]) {
    let inboxes = [ActionInbox::new(), ActionInbox::new()];
    let controllers = Controllers::new(
        Box::new(HumanSource::new(inboxes[0].clone())),
        Box::new(HumanSource::new(inboxes[1].clone())),
    );
    (controllers, inboxes)
}

/// Queue the same spawn several times.
pub fn queue_spawns(inbox: &ActionInbox, base_index: i32, kind: UnitKind, count: usize) {
    for _ in 0..count {
        inbox.push(Action::spawn(base_index, kind));
    }
}

/// A complete game: engine plus both controllers.
#[derive(Debug)]
pub struct TestGame {
    /// The engine.
    pub engine: TurnEngine,
    /// Both teams' decision sources.
    pub controllers: Controllers,
}

impl TestGame {
    /// Rule-based agents on both sides, generated map.
    ///
    /// # Panics
    ///
    /// Panics if `config` cannot build a world.
    #[must_use]
    pub fn heuristic(config: GameConfig) -> Self {
        let mut engine = TurnEngine::new(config).expect("valid config");
        let controllers = Controllers::heuristic(engine.rng_mut());
        Self {
            engine,
            controllers,
        }
    }

    /// Rule-based agents with the given seed and turn ceiling.
    #[must_use]
    pub fn seeded(seed: u64, max_turns: u32) -> Self {
        Self::heuristic(GameConfig::default().with_seed(seed).with_max_turns(max_turns))
    }

    /// Play one turn.
    pub fn step(&mut self) -> TurnReport {
        self.engine.process_turn(&mut self.controllers)
    }

    /// Play until the game ends or `max_turns` turns have been played.
    ///
    /// Returns the number of turns played.
    pub fn run(&mut self, max_turns: u32) -> u32 {
        let mut played = 0;
        while played < max_turns && !self.engine.is_game_over() {
            self.step();
            played += 1;
        }
        played
    }

    /// Hash of the world state.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        self.engine.state_hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_world_has_no_obstacles() {
        let world = open_world();
        assert_eq!(world.map().obstacle_count(), 0);
        assert_eq!(world.bases().len(), 6);
    }

    #[test]
    fn test_spawn_row_layout() {
        let mut world = open_world();
        let ids = spawn_row(&mut world, Team::A, UnitKind::Infantry, Position::new(20, 20), 3);
        assert_eq!(ids.len(), 3);
        assert_eq!(world.unit(ids[2]).unwrap().position, Position::new(22, 20));
    }

    #[test]
    fn test_scripted_controllers_spawn() {
        let mut engine = open_engine(GameConfig::default());
        let (mut controllers, inboxes) = scripted_controllers();
        queue_spawns(&inboxes[1], 0, UnitKind::Archer, 2);
        let report = engine.process_turn(&mut controllers);
        assert_eq!(report.spawns_by(Team::B), 2);
        assert_eq!(report.spawns_by(Team::A), 0);
    }

    #[test]
    fn test_game_runs_to_ceiling() {
        let mut game = TestGame::seeded(3, 20);
        let played = game.run(1000);
        assert!(played <= 21);
        assert!(game.engine.is_game_over());
    }
}
