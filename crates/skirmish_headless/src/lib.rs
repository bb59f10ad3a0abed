//! Headless runner for the grid skirmish simulation.
//!
//! This crate runs games without graphics:
//!
//! - **Interactive runs**: a person or script drives a team with JSON
//!   commands on stdin, with responses on stdout
//! - **Training runs**: unthrottled games against an external policy,
//!   logged with shaped rewards for learning
//! - **Spectate runs**: paced games rendered as ASCII
//! - **Batch runs**: many rule-based games in parallel for balance metrics
//! - **Replay verification**: check that replays reproduce the same state
//!
//! # Protocol
//!
//! Communication uses JSON lines (one JSON object per line):
//!
//! - **stdin**: Commands (purchase, action, state, status, reconfigure, stop)
//! - **stdout**: Responses (JSON)
//! - **stderr**: Logs (human-readable)
//!
//! See [`protocol`] module for the full command and response reference.
//!
//! # Example
//!
//! ```bash
//! # Run interactively
//! echo '{"cmd":"status"}' | cargo run -p skirmish_headless
//!
//! # Collect training data
//! cargo run -p skirmish_headless -- run --mode training --team-a heuristic --team-b external
//!
//! # Verify determinism
//! cargo run -p skirmish_headless -- replay game.replay --verify
//! ```

pub mod ascii_visualizer;
pub mod batch;
pub mod config;
pub mod game_runner;
pub mod metrics;
pub mod orchestrator;
pub mod policy;
pub mod protocol;
pub mod runner;
pub mod training;

pub use ascii_visualizer::{render_world, AsciiConfig};
pub use batch::{run_batch, BatchConfig, BatchResults};
pub use config::{ConfigError, GameMode, PolicyConfig, RunConfig};
pub use game_runner::{run_game, GameRunner, GameSetup};
pub use metrics::{BatchSummary, GameMetrics, MetricsCollector};
pub use orchestrator::{Orchestrator, OrchestratorError, OrchestratorState, RunSummary, StatusReport};
pub use policy::{ExternalPolicy, PolicyError};
pub use protocol::{Command, Response};
pub use runner::InteractiveRunner;
pub use training::{TrainingLogError, TrainingLogger};
