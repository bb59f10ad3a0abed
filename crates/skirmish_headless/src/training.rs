//! Training data logger.
//!
//! Records one episode entry per turn (team B's pre-decision state, both
//! teams' actions, shaped rewards and notable events) and appends the whole
//! game to a JSON file of the form `{"games": [...]}` when the run ends.
//!
//! Rewards are computed in fixed point and only converted to floats for the
//! file.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use skirmish_core::action::Action;
use skirmish_core::decision::ControllerKind;
use skirmish_core::engine::TurnReport;
use skirmish_core::events::{EventKind, GameEvent};
use skirmish_core::export::{StateExport, NO_WINNER};
use skirmish_core::math::Fixed;
use skirmish_core::team::Team;
use skirmish_core::world::World;

use crate::config::GameMode;

/// Reward per enemy unit killed.
pub const KILL_REWARD: i32 = 10;

/// Reward for winning, penalty for losing.
pub const GAME_OVER_REWARD: i32 = 1000;

/// Reward or penalty for a threatened base.
pub const DEFENSE_REWARD: i32 = 5;

/// Chebyshev radius in which an enemy threatens a base.
pub const THREAT_RADIUS: i32 = 5;

/// Divisor of damage dealt to enemy bases (0.05 per point).
const ENEMY_BASE_DAMAGE_DIVISOR: i32 = 20;

/// Divisor of damage taken by own bases (0.1 per point).
const OWN_BASE_DAMAGE_DIVISOR: i32 = 10;

/// Error type for training log output.
#[derive(Error, Debug)]
pub enum TrainingLogError {
    /// Reading, writing or renaming failed.
    #[error("Training log I/O failed for {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Encoding failed.
    #[error("Failed to encode training log: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Game description at the top of each logged game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameLogMetadata {
    /// Local start time, `%Y-%m-%dT%H:%M:%S`.
    pub date: String,
    /// Mode name.
    pub mode: String,
    /// Team A controller name.
    pub team0_type: String,
    /// Team B controller name.
    pub team1_type: String,
}

/// Per-team reward of one turn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TurnReward {
    /// Team A.
    pub team0: f64,
    /// Team B.
    pub team1: f64,
}

/// One logged event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedEvent {
    /// Event description.
    #[serde(rename = "type")]
    pub kind: String,
    /// Attributed team index, -1 when none.
    pub team: i32,
}

/// One turn of training data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    /// Turn number.
    pub turn: u32,
    /// Team B's view before its decisions.
    pub state: StateExport,
    /// Team A's applied action.
    pub team0_action: Action,
    /// Team B's applied action.
    pub team1_action: Action,
    /// Shaped rewards.
    pub reward: TurnReward,
    /// Spawns, kills, base damage and game over.
    pub events: Vec<LoggedEvent>,
}

/// End-of-game figures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GameLogSummary {
    /// Turns recorded.
    pub total_turns: u32,
    /// Winning team index, -1 for none.
    pub winner: i32,
    /// Wall-clock length of the game.
    pub duration_seconds: f64,
}

/// A complete logged game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameLog {
    /// Game description.
    pub metadata: GameLogMetadata,
    /// One entry per turn.
    pub episodes: Vec<EpisodeRecord>,
    /// End-of-game figures.
    pub summary: GameLogSummary,
}

/// Shaped reward of `team` for one turn.
///
/// `world` is the state after the turn, used to find threatened bases.
#[must_use]
pub fn turn_reward(team: Team, events: &[GameEvent], world: &World) -> Fixed {
    let mut reward = Fixed::ZERO;

    for event in events {
        match event.kind {
            EventKind::Kill if event.team == Some(team) => {
                reward += Fixed::from_num(KILL_REWARD);
            }
            EventKind::BaseDamaged if event.team == Some(team) => {
                reward -= Fixed::from_num(event.damage) / Fixed::from_num(OWN_BASE_DAMAGE_DIVISOR);
            }
            EventKind::BaseDamaged => {
                reward += Fixed::from_num(event.damage) / Fixed::from_num(ENEMY_BASE_DAMAGE_DIVISOR);
            }
            // A draw carries no winner and rewards nobody.
            EventKind::GameOver => match event.team {
                Some(winner) if winner == team => reward += Fixed::from_num(GAME_OVER_REWARD),
                Some(_) => reward -= Fixed::from_num(GAME_OVER_REWARD),
                None => {}
            },
            _ => {}
        }
    }

    let spawned = |base: Option<usize>| {
        events.iter().any(|e| {
            e.kind == EventKind::Spawn && e.team == Some(team) && (base.is_none() || e.base_id == base)
        })
    };
    let spawned_anywhere = spawned(None);

    for base in world.team_bases(team).filter(|b| b.is_alive()) {
        let threatened = world
            .living_units()
            .any(|u| u.team != team && u.position.chebyshev(base.position) <= THREAT_RADIUS);
        if !threatened {
            continue;
        }
        if spawned(Some(base.id)) {
            reward += Fixed::from_num(DEFENSE_REWARD);
        } else {
            reward -= Fixed::from_num(DEFENSE_REWARD);
            if !spawned_anywhere {
                reward -= Fixed::from_num(DEFENSE_REWARD);
            }
        }
    }

    reward
}

fn team_index(team: Option<Team>) -> i32 {
    team.map_or(NO_WINNER, |t| t.index() as i32)
}

/// Collects one game of training data and appends it to a file.
#[derive(Debug)]
pub struct TrainingLogger {
    path: PathBuf,
    metadata: GameLogMetadata,
    episodes: Vec<EpisodeRecord>,
    total_turns: u32,
    started: Instant,
}

impl TrainingLogger {
    /// Start logging a game.
    #[must_use]
    pub fn start(path: impl Into<PathBuf>, mode: GameMode, controllers: [ControllerKind; 2]) -> Self {
        Self {
            path: path.into(),
            metadata: GameLogMetadata {
                date: chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
                mode: mode.name().to_string(),
                team0_type: controllers[0].name().to_string(),
                team1_type: controllers[1].name().to_string(),
            },
            episodes: Vec::new(),
            total_turns: 0,
            started: Instant::now(),
        }
    }

    /// Output file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries recorded so far.
    #[must_use]
    pub fn episodes(&self) -> &[EpisodeRecord] {
        &self.episodes
    }

    /// Record one processed turn. `world` is the state after the turn.
    pub fn record_turn(&mut self, report: &TurnReport, world: &World) {
        let state = report
            .training_state
            .clone()
            .unwrap_or_else(|| StateExport::capture(world, Team::B, report.heal_totals));

        let reward = TurnReward {
            team0: turn_reward(Team::A, &report.events, world).to_num(),
            team1: turn_reward(Team::B, &report.events, world).to_num(),
        };

        let events = report
            .events
            .iter()
            .filter(|e| {
                matches!(
                    e.kind,
                    EventKind::Spawn | EventKind::Kill | EventKind::BaseDamaged | EventKind::GameOver
                )
            })
            .map(|e| LoggedEvent {
                kind: e.description.clone(),
                team: team_index(e.team),
            })
            .collect();

        self.episodes.push(EpisodeRecord {
            turn: report.turn,
            state,
            team0_action: report.applied_actions[0],
            team1_action: report.applied_actions[1],
            reward,
            events,
        });
        self.total_turns = report.turn + 1;
    }

    /// Close the game and build its log entry.
    #[must_use]
    pub fn end_game(self, winner: Option<Team>) -> (PathBuf, GameLog) {
        let log = GameLog {
            metadata: self.metadata,
            episodes: self.episodes,
            summary: GameLogSummary {
                total_turns: self.total_turns,
                winner: team_index(winner),
                duration_seconds: self.started.elapsed().as_secs_f64(),
            },
        };
        (self.path, log)
    }

    /// Close the game and append it to the output file.
    ///
    /// Consumes the logger, so a game is written at most once.
    pub fn finish(self, winner: Option<Team>) -> Result<PathBuf, TrainingLogError> {
        let (path, log) = self.end_game(winner);
        append_game(&path, &log)?;
        info!(path = %path.display(), turns = log.summary.total_turns, "Training log appended");
        Ok(path)
    }
}

/// Append `log` to the `{"games": [...]}` file at `path`.
///
/// The new content is written to a sibling `.tmp` file first and renamed
/// over the original. An unreadable or foreign file is replaced.
pub fn append_game(path: &Path, log: &GameLog) -> Result<(), TrainingLogError> {
    let io_err = |source| TrainingLogError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut games = match std::fs::read_to_string(path) {
        Ok(existing) => existing_games(&existing).unwrap_or_else(|| {
            warn!(path = %path.display(), "Existing training log has no games list, starting over");
            Vec::new()
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(io_err(e)),
    };
    games.push(serde_json::to_value(log)?);

    let document = serde_json::json!({ "games": games });
    let text = serde_json::to_string_pretty(&document)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(&tmp, text).map_err(io_err)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(e));
    }
    Ok(())
}

fn existing_games(text: &str) -> Option<Vec<serde_json::Value>> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    match value.get("games")? {
        serde_json::Value::Array(games) => Some(games.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_core::config::GameConfig;
    use skirmish_core::map::GameMap;
    use skirmish_core::math::Position;
    use skirmish_core::unit::UnitKind;

    fn open_world() -> World {
        let config = GameConfig::default();
        let map = GameMap::new(config.map.size);
        World::with_map(config, map).unwrap()
    }

    fn event(kind: EventKind, team: Option<Team>) -> GameEvent {
        GameEvent::new(kind, team, 0, format!("{kind:?}"))
    }

    #[test]
    fn test_kill_and_base_damage_rewards() {
        let world = open_world();
        let events = vec![
            event(EventKind::Kill, Some(Team::A)),
            event(EventKind::BaseDamaged, Some(Team::B)).with_damage(100),
            event(EventKind::BaseDamaged, Some(Team::A)).with_damage(50),
        ];

        // 10 + 100 * 0.05 - 50 * 0.1
        assert_eq!(turn_reward(Team::A, &events, &world), Fixed::from_num(10));
        // -100 * 0.1 + 50 * 0.05
        assert_eq!(turn_reward(Team::B, &events, &world), Fixed::from_num(-7.5));
    }

    #[test]
    fn test_game_over_rewards() {
        let world = open_world();
        let won = vec![event(EventKind::GameOver, Some(Team::B))];
        assert_eq!(turn_reward(Team::B, &won, &world), Fixed::from_num(1000));
        assert_eq!(turn_reward(Team::A, &won, &world), Fixed::from_num(-1000));

        let draw = vec![event(EventKind::GameOver, None)];
        assert_eq!(turn_reward(Team::A, &draw, &world), Fixed::ZERO);
        assert_eq!(turn_reward(Team::B, &draw, &world), Fixed::ZERO);
    }

    #[test]
    fn test_threatened_base_without_spawn() {
        let mut world = open_world();
        let base = world.team_bases(Team::A).next().unwrap().position;
        world.spawn_unit(Team::B, UnitKind::Infantry, base.offset(3, 3));

        assert_eq!(turn_reward(Team::A, &[], &world), Fixed::from_num(-10));
        // Spawning elsewhere halves the penalty.
        let other_base = world.team_base_id(Team::A, 1).unwrap();
        let spawn = vec![event(EventKind::Spawn, Some(Team::A)).with_base(other_base)];
        assert_eq!(turn_reward(Team::A, &spawn, &world), Fixed::from_num(-5));
    }

    #[test]
    fn test_threatened_base_defended() {
        let mut world = open_world();
        let base_id = world.team_base_id(Team::A, 0).unwrap();
        let base = world.base(base_id).unwrap().position;
        world.spawn_unit(Team::B, UnitKind::Archer, Position::new(base.x + 5, base.y));

        let spawn = vec![event(EventKind::Spawn, Some(Team::A)).with_base(base_id)];
        assert_eq!(turn_reward(Team::A, &spawn, &world), Fixed::from_num(5));
    }

    #[test]
    fn test_record_and_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        let world = open_world();

        let mut logger = TrainingLogger::start(
            &path,
            GameMode::Training,
            [ControllerKind::Heuristic, ControllerKind::External],
        );
        let report = TurnReport {
            turn: 0,
            events: vec![
                event(EventKind::Kill, Some(Team::B)),
                event(EventKind::Move, Some(Team::B)),
            ],
            ..TurnReport::default()
        };
        logger.record_turn(&report, &world);
        assert_eq!(logger.episodes().len(), 1);
        assert_eq!(logger.episodes()[0].events.len(), 1);
        assert!((logger.episodes()[0].reward.team1 - 10.0).abs() < 1e-9);
        logger.finish(Some(Team::B)).unwrap();

        let second = TrainingLogger::start(&path, GameMode::Training, [ControllerKind::Heuristic; 2]);
        second.finish(None).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let games = value["games"].as_array().unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(games[0]["metadata"]["team1_type"], "external");
        assert_eq!(games[0]["summary"]["winner"], 1);
        assert_eq!(games[0]["summary"]["total_turns"], 1);
        assert_eq!(games[0]["episodes"][0]["events"][0]["team"], 1);
        assert_eq!(games[0]["episodes"][0]["team0_action"]["action_type"], 0);
        assert_eq!(games[1]["summary"]["winner"], -1);
        assert!(!dir.path().join("log.json.tmp").exists());
    }

    #[test]
    fn test_foreign_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(&path, "not json at all").unwrap();

        TrainingLogger::start(&path, GameMode::Training, [ControllerKind::Heuristic; 2])
            .finish(Some(Team::A))
            .unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["games"].as_array().unwrap().len(), 1);
    }
}
