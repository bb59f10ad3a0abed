//! Run configuration.
//!
//! A [`RunConfig`] fixes everything about a run that is not game rules: the
//! mode, who controls each team, pacing and output files. The game rules
//! themselves live in the nested [`GameConfig`].

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use skirmish_core::config::GameConfig;
use skirmish_core::decision::ControllerKind;
use skirmish_core::team::Team;

/// Training log written when no path is configured.
pub const DEFAULT_TRAINING_LOG: &str = "game_log.json";

/// Wall-clock length of a paced turn.
pub const DEFAULT_TURN_DURATION_MS: u64 = 250;

/// Error type for configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File not found.
    #[error("Config file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// Values that cannot work together.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// How a run is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Unthrottled, with the training logger.
    Training,
    /// Paced, rendered to the terminal.
    Spectate,
    /// Paced, driven by commands on stdin.
    #[default]
    Interactive,
}

impl GameMode {
    /// Lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Training => "training",
            Self::Spectate => "spectate",
            Self::Interactive => "interactive",
        }
    }

    /// Whether turns are stretched to the configured duration.
    #[must_use]
    pub const fn is_paced(self) -> bool {
        !matches!(self, Self::Training)
    }
}

impl std::fmt::Display for GameMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "training" | "train" => Ok(Self::Training),
            "spectate" | "spectator" => Ok(Self::Spectate),
            "interactive" | "normal" => Ok(Self::Interactive),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

/// How to reach an external policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Program and arguments.
    pub command: Vec<String>,
    /// How long to wait for one answer.
    pub timeout_ms: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            command: vec!["python3".to_string(), "python/infer.py".to_string()],
            timeout_ms: 2_000,
        }
    }
}

impl PolicyConfig {
    /// Answer timeout as a duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Everything needed to start a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Mode of the run.
    pub mode: GameMode,
    /// Controller of team A and team B.
    pub controllers: [ControllerKind; 2],
    /// Paced turn length.
    pub turn_duration_ms: u64,
    /// External policy process.
    pub policy: PolicyConfig,
    /// Training log path. Training runs fall back to [`DEFAULT_TRAINING_LOG`].
    pub training_log: Option<PathBuf>,
    /// Where to save a replay of the run.
    pub replay_out: Option<PathBuf>,
    /// Render the board every this many turns (0 disables).
    pub render_every: u32,
    /// Game rules.
    pub game: GameConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: GameMode::Interactive,
            controllers: [ControllerKind::Human, ControllerKind::Heuristic],
            turn_duration_ms: DEFAULT_TURN_DURATION_MS,
            policy: PolicyConfig::default(),
            training_log: None,
            replay_out: None,
            render_every: 0,
            game: GameConfig::default(),
        }
    }
}

impl RunConfig {
    /// Load a run configuration from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string.
    pub fn from_ron_str(ron: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(ron)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.uses(ControllerKind::External) && self.policy.command.is_empty() {
            return Err(ConfigError::Invalid(
                "an external controller needs a policy command".to_string(),
            ));
        }
        if self.game.purchases_per_turn == 0 {
            return Err(ConfigError::Invalid(
                "purchases_per_turn must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the mode.
    pub fn with_mode(mut self, mode: GameMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set both controllers.
    pub fn with_controllers(mut self, team_a: ControllerKind, team_b: ControllerKind) -> Self {
        self.controllers = [team_a, team_b];
        self
    }

    /// Set the paced turn length.
    pub fn with_turn_duration(mut self, ms: u64) -> Self {
        self.turn_duration_ms = ms;
        self
    }

    /// Set the policy command line.
    pub fn with_policy_command(mut self, command: Vec<String>) -> Self {
        self.policy.command = command;
        self
    }

    /// Set the training log path.
    pub fn with_training_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.training_log = Some(path.into());
        self
    }

    /// Set the replay output path.
    pub fn with_replay_out(mut self, path: impl Into<PathBuf>) -> Self {
        self.replay_out = Some(path.into());
        self
    }

    /// Set the render interval.
    pub fn with_render_every(mut self, turns: u32) -> Self {
        self.render_every = turns;
        self
    }

    /// Set the game rules.
    pub fn with_game(mut self, game: GameConfig) -> Self {
        self.game = game;
        self
    }

    /// Controller of one team.
    #[must_use]
    pub const fn controller(&self, team: Team) -> ControllerKind {
        self.controllers[team.index()]
    }

    /// Whether either team uses `kind`.
    #[must_use]
    pub fn uses(&self, kind: ControllerKind) -> bool {
        self.controllers.contains(&kind)
    }

    /// Paced turn length, or `None` when unthrottled.
    #[must_use]
    pub const fn pacing(&self) -> Option<Duration> {
        if self.mode.is_paced() {
            Some(Duration::from_millis(self.turn_duration_ms))
        } else {
            None
        }
    }

    /// Path of the training log, if this run writes one.
    #[must_use]
    pub fn training_log_path(&self) -> Option<PathBuf> {
        match self.mode {
            GameMode::Training => Some(
                self.training_log
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_TRAINING_LOG)),
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.mode, GameMode::Interactive);
        assert_eq!(config.controller(Team::A), ControllerKind::Human);
        assert_eq!(config.controller(Team::B), ControllerKind::Heuristic);
        assert_eq!(config.pacing(), Some(Duration::from_millis(250)));
        assert!(config.training_log_path().is_none());
    }

    #[test]
    fn test_training_is_unthrottled_and_logs() {
        let config = RunConfig::default().with_mode(GameMode::Training);
        assert!(config.pacing().is_none());
        assert_eq!(
            config.training_log_path(),
            Some(PathBuf::from(DEFAULT_TRAINING_LOG))
        );
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("train".parse::<GameMode>(), Ok(GameMode::Training));
        assert_eq!("Spectate".parse::<GameMode>(), Ok(GameMode::Spectate));
        assert!("replay".parse::<GameMode>().is_err());
    }

    #[test]
    fn test_from_ron_partial() {
        let config = RunConfig::from_ron_str(
            "(mode: spectate, controllers: (heuristic, heuristic), render_every: 5)",
        )
        .unwrap();
        assert_eq!(config.mode, GameMode::Spectate);
        assert_eq!(config.render_every, 5);
        assert_eq!(config.turn_duration_ms, DEFAULT_TURN_DURATION_MS);
        assert!(!config.uses(ControllerKind::Human));
    }

    #[test]
    fn test_external_needs_command() {
        let config = RunConfig::default()
            .with_controllers(ControllerKind::Heuristic, ControllerKind::External)
            .with_policy_command(Vec::new());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = RunConfig::load("/definitely/not/here.ron").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
