//! Error types for the skirmish simulation.
//!
//! Only construction, configuration and IO failures travel as [`GameError`]
//! through `?`. Failures inside a turn (insufficient energy, no spawn cell,
//! malformed actions) are converted to no-op outcomes by the engine so that
//! a turn always completes.

use thiserror::Error;

use crate::team::Team;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all simulation errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// Position lies outside the grid.
    #[error("Position ({x}, {y}) is outside the map")]
    InvalidPosition {
        /// X coordinate.
        x: i32,
        /// Y coordinate.
        y: i32,
    },

    /// Unit kind code does not name one of the five kinds.
    #[error("Invalid unit kind code: {0}")]
    InvalidUnitKind(i32),

    /// Unit identifier not present in the world.
    #[error("Unit not found: {0}")]
    UnitNotFound(u64),

    /// Base index does not exist for the team.
    #[error("Unknown base {index} for {team}")]
    UnknownBase {
        /// Owning team.
        team: Team,
        /// Index into the team's base list.
        index: usize,
    },

    /// Not enough energy for a purchase.
    #[error("Insufficient energy for {team}: need {required}, have {available}")]
    InsufficientEnergy {
        /// Purchasing team.
        team: Team,
        /// Cost of the purchase.
        required: i32,
        /// Balance at the time of the attempt.
        available: i32,
    },

    /// No walkable, unoccupied cell near the base.
    #[error("No spawn cell available near ({x}, {y})")]
    NoSpawnCell {
        /// Base X coordinate.
        x: i32,
        /// Base Y coordinate.
        y: i32,
    },

    /// Action payload could not be parsed.
    #[error("Malformed action: {0}")]
    MalformedAction(String),

    /// Configuration file could not be parsed.
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] ron::error::SpannedError),

    /// Underlying IO failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),

    /// Replay diverged from its recording.
    #[error("Replay desync at turn {turn}: expected hash {expected}, got {actual}")]
    ReplayDesync {
        /// Turn where the check ran.
        turn: u32,
        /// Recorded hash.
        expected: u64,
        /// Hash produced by playback.
        actual: u64,
    },
}
