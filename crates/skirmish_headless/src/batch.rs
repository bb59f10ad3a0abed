//! Batch game runner for balance testing.
//!
//! Runs multiple rule-based games in parallel using rayon to collect balance
//! metrics across many seeds efficiently.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use skirmish_core::config::GameConfig;
use skirmish_core::team::Team;

use crate::game_runner::{run_game, GameSetup};
use crate::metrics::{BatchSummary, GameMetrics};

/// Configuration for a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Scenario label
    pub scenario: String,
    /// Number of games to run
    pub game_count: u32,
    /// Maximum parallel games (0 = use rayon default)
    pub parallel_games: u32,
    /// Output directory for results
    pub output_dir: PathBuf,
    /// Starting seed; game `i` uses `seed_start + i`
    pub seed_start: u64,
    /// Rules shared by every game (the seed is overridden per game)
    pub game: GameConfig,
    /// Save a replay of every game under `output_dir/replays`
    pub save_replays: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            scenario: "default".to_string(),
            game_count: 100,
            parallel_games: 0,
            output_dir: PathBuf::from("results"),
            seed_start: 0,
            game: GameConfig::default(),
            save_replays: false,
        }
    }
}

impl BatchConfig {
    /// Create config for a labelled scenario
    pub fn new(scenario: &str, game_count: u32) -> Self {
        Self {
            scenario: scenario.to_string(),
            game_count,
            ..Default::default()
        }
    }

    /// Set output directory
    pub fn with_output(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }

    /// Set seed start
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }

    /// Set the turn ceiling of every game
    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.game.max_turns = max_turns;
        self
    }

    /// Set the game rules
    pub fn with_game(mut self, game: GameConfig) -> Self {
        self.game = game;
        self
    }

    /// Save replays of every game
    pub fn with_replays(mut self, save: bool) -> Self {
        self.save_replays = save;
        self
    }

    fn setup_for(&self, seed: u64) -> GameSetup {
        let mut setup = GameSetup::with_config(self.game.clone().with_seed(seed))
            .with_scenario(self.scenario.clone());
        setup.record_replay = self.save_replays;
        setup
    }
}

/// Results from a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used
    pub config: BatchConfig,
    /// Individual game metrics
    pub games: Vec<GameMetrics>,
    /// Aggregate summary
    pub summary: BatchSummary,
    /// Total runtime
    pub duration_seconds: f64,
    /// Errors encountered
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results to JSON file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load results from JSON file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}

/// Error during batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchError {
    /// Game index
    pub game_index: u32,
    /// Seed used
    pub seed: u64,
    /// Error message
    pub message: String,
}

/// Live progress of a batch run, shared by the worker threads.
#[derive(Debug)]
pub struct BatchProgress {
    scenario: String,
    total: u32,
    completed: AtomicU32,
    wins: [AtomicU32; 2],
    started: Instant,
}

impl BatchProgress {
    /// Tracker for `total` games of `scenario`.
    pub fn new(scenario: &str, total: u32) -> Self {
        Self {
            scenario: scenario.to_string(),
            total,
            completed: AtomicU32::new(0),
            wins: [AtomicU32::new(0), AtomicU32::new(0)],
            started: Instant::now(),
        }
    }

    /// Count one finished game; `None` is a draw.
    pub fn record(&self, winner: Option<Team>) {
        if let Some(team) = winner {
            self.wins[team.index()].fetch_add(1, Ordering::Relaxed);
        }
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Games finished so far.
    pub fn current(&self) -> u32 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Share of the batch finished, in percent.
    pub fn percentage(&self) -> f64 {
        f64::from(self.current()) / f64::from(self.total.max(1)) * 100.0
    }

    /// Remaining time at the average pace so far.
    pub fn eta(&self) -> Duration {
        let completed = self.current();
        if completed == 0 {
            return Duration::ZERO;
        }
        let per_game = self.started.elapsed().as_secs_f64() / f64::from(completed);
        Duration::from_secs_f64(per_game * f64::from(self.total.saturating_sub(completed)))
    }

    /// Fraction of finished games won by `team`.
    pub fn win_rate(&self, team: Team) -> f64 {
        let completed = self.current();
        if completed == 0 {
            return 0.0;
        }
        f64::from(self.wins[team.index()].load(Ordering::Relaxed)) / f64::from(completed)
    }

    /// Fraction of finished games without a winner.
    pub fn draw_rate(&self) -> f64 {
        let completed = self.current();
        if completed == 0 {
            return 0.0;
        }
        let decided: u32 = self.wins.iter().map(|w| w.load(Ordering::Relaxed)).sum();
        f64::from(completed.saturating_sub(decided)) / f64::from(completed)
    }

    /// One-line status, e.g. `[default] 40/200 (20.0%) eta 1m05s | Team A 47.5% | Team B 50.0% | draws 2.5%`.
    pub fn status_line(&self) -> String {
        let eta = self.eta().as_secs();
        let mut line = format!(
            "[{}] {}/{} ({:.1}%) eta {}m{:02}s",
            self.scenario,
            self.current(),
            self.total,
            self.percentage(),
            eta / 60,
            eta % 60
        );
        for team in Team::ALL {
            line.push_str(&format!(" | {team} {:.1}%", self.win_rate(team) * 100.0));
        }
        line.push_str(&format!(" | draws {:.1}%", self.draw_rate() * 100.0));
        line
    }
}

/// Run one game of the batch.
fn run_single_game(seed: u64, config: &BatchConfig) -> Result<GameMetrics, String> {
    let result = run_game(config.setup_for(seed)).map_err(|e| e.to_string())?;

    if let Some(replay) = &result.replay {
        let path = config
            .output_dir
            .join("replays")
            .join(format!("{}.replay", result.metrics.game_id));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        replay.save(&path).map_err(|e| e.to_string())?;
    }

    Ok(result.metrics)
}

/// Run a batch of games
pub fn run_batch(config: BatchConfig) -> BatchResults {
    let start = Instant::now();
    let progress = BatchProgress::new(&config.scenario, config.game_count);

    info!(
        games = config.game_count,
        scenario = %config.scenario,
        seed_start = config.seed_start,
        max_turns = config.game.max_turns,
        "Starting batch run"
    );

    let run_all = || -> Vec<Result<GameMetrics, BatchError>> {
        (0..config.game_count)
            .into_par_iter()
            .map(|i| {
                let seed = config.seed_start.wrapping_add(u64::from(i));

                match run_single_game(seed, &config) {
                    Ok(metrics) => {
                        progress.record(metrics.winning_team());

                        let completed = progress.current();
                        if completed % 10 == 0 {
                            debug!(completed, total = config.game_count, "Batch progress");
                        }
                        if completed % 100 == 0 {
                            info!("{}", progress.status_line());
                        }

                        Ok(metrics)
                    }
                    Err(e) => {
                        warn!(game = i, seed, error = %e, "Game failed");
                        Err(BatchError {
                            game_index: i,
                            seed,
                            message: e,
                        })
                    }
                }
            })
            .collect()
    };

    // A dedicated pool when a width is requested, the global pool otherwise.
    let results = if config.parallel_games > 0 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_games as usize)
            .build()
        {
            Ok(pool) => pool.install(run_all),
            Err(e) => {
                warn!(error = %e, "Failed to build thread pool, using the global pool");
                run_all()
            }
        }
    } else {
        run_all()
    };

    let (games, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    let mut games: Vec<GameMetrics> = games.into_iter().filter_map(Result::ok).collect();
    let errors: Vec<BatchError> = errors.into_iter().filter_map(Result::err).collect();
    games.sort_by_key(|g| g.seed);

    let summary = BatchSummary::from_games(&games);
    let duration_seconds = start.elapsed().as_secs_f64();

    info!(
        "Batch complete: {} games in {:.1}s ({:.1} games/sec)",
        games.len(),
        duration_seconds,
        games.len() as f64 / duration_seconds.max(0.001)
    );

    BatchResults {
        config,
        games,
        summary,
        duration_seconds,
        errors,
    }
}

/// Verify determinism by running the same seed several times.
///
/// Every run must end on the same turn with the same winner and the same
/// final world hash.
pub fn verify_determinism(game: &GameConfig, seed: u64, runs: u32) -> bool {
    let results: Vec<GameMetrics> = (0..runs)
        .filter_map(|run| {
            let setup = GameSetup::with_config(game.clone().with_seed(seed));
            match run_game(setup) {
                Ok(result) => Some(result.metrics),
                Err(e) => {
                    warn!(run, seed, error = %e, "Verification run failed");
                    None
                }
            }
        })
        .collect();

    if results.len() != runs as usize {
        return false;
    }
    let Some(first) = results.first() else {
        return true;
    };
    results.iter().all(|r| {
        r.winner == first.winner
            && r.duration_turns == first.duration_turns
            && r.win_condition == first.win_condition
            && r.final_state_hash == first.final_state_hash
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_batch(games: u32) -> BatchConfig {
        BatchConfig::new("test", games).with_max_turns(60)
    }

    #[test]
    fn test_batch_config_default() {
        let config = BatchConfig::default();
        assert_eq!(config.game_count, 100);
        assert_eq!(config.scenario, "default");
        assert_eq!(config.game.max_turns, 500);
    }

    #[test]
    fn test_batch_config_builder() {
        let config = BatchConfig::new("custom_scenario", 500)
            .with_output(PathBuf::from("/tmp/results"))
            .with_seed(12345)
            .with_max_turns(80);

        assert_eq!(config.scenario, "custom_scenario");
        assert_eq!(config.game_count, 500);
        assert_eq!(config.seed_start, 12345);
        assert_eq!(config.game.max_turns, 80);
    }

    #[test]
    fn test_progress_tracking() {
        let progress = BatchProgress::new("duel", 100);
        assert_eq!(progress.current(), 0);
        assert_eq!(progress.percentage(), 0.0);
        assert_eq!(progress.draw_rate(), 0.0);

        progress.record(Some(Team::A));
        progress.record(Some(Team::B));
        progress.record(Some(Team::A));
        progress.record(None);

        assert_eq!(progress.current(), 4);
        assert!((progress.win_rate(Team::A) - 0.5).abs() < 1e-9);
        assert!((progress.win_rate(Team::B) - 0.25).abs() < 1e-9);
        assert!((progress.draw_rate() - 0.25).abs() < 1e-9);

        let line = progress.status_line();
        assert!(line.starts_with("[duel] 4/100 (4.0%)"));
        assert!(line.ends_with("| Team A 50.0% | Team B 25.0% | draws 25.0%"));
    }

    #[test]
    fn test_run_batch_small() {
        let results = run_batch(short_batch(6));

        assert_eq!(results.games.len(), 6);
        assert!(results.errors.is_empty());
        assert!(results.duration_seconds > 0.0);
        assert_eq!(results.summary.total_games, 6);
        let seeds: Vec<u64> = results.games.iter().map(|g| g.seed).collect();
        assert_eq!(seeds, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_run_batch_with_own_pool() {
        let mut config = short_batch(4);
        config.parallel_games = 2;
        let results = run_batch(config);
        assert_eq!(results.games.len(), 4);
    }

    #[test]
    fn test_verify_determinism() {
        assert!(verify_determinism(&GameConfig::default().with_max_turns(60), 12345, 3));
    }

    #[test]
    fn test_batch_results_save_load() {
        let results = run_batch(short_batch(3));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");

        results.save(&path).unwrap();
        assert!(path.exists());

        let loaded = BatchResults::load(&path).unwrap();
        assert_eq!(loaded.games.len(), 3);
        assert_eq!(loaded.config.scenario, "test");
    }

    #[test]
    fn test_batch_saves_replays() {
        let dir = tempfile::tempdir().unwrap();
        let config = short_batch(2)
            .with_output(dir.path().to_path_buf())
            .with_replays(true);
        let results = run_batch(config);

        assert!(results.errors.is_empty());
        let replay = dir.path().join("replays").join("game_1.replay");
        assert!(replay.exists());
    }
}
