//! Headless skirmish runner.
//!
//! Runs the simulation without graphics. Interactive runs are driven by JSON
//! commands on stdin with responses on stdout; training and spectate runs
//! play to the end on their own.
//!
//! # Usage
//!
//! ```bash
//! # Interactive mode - team A takes commands from stdin
//! cargo run -p skirmish_headless
//!
//! # Train against the rule-based agent with an external policy as team B
//! cargo run -p skirmish_headless -- run --mode training --team-b external --policy "python3 python/infer.py"
//!
//! # Watch two rule-based agents, rendering every 10 turns
//! cargo run -p skirmish_headless -- run --mode spectate --team-a heuristic --render-every 10
//!
//! # Run batch balance test
//! cargo run -p skirmish_headless -- batch --count 1000 --output results/
//!
//! # Verify a saved replay
//! cargo run -p skirmish_headless -- replay game.replay --verify
//! ```
//!
//! # Protocol
//!
//! Input (stdin): JSON commands, one per line
//! Output (stdout): JSON responses, one per line
//! Logs (stderr): Debug information
//!
//! See the protocol module for command/response format.

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skirmish_core::config::GameConfig;
use skirmish_core::decision::{ControllerKind, Controllers};
use skirmish_core::engine::TurnEngine;
use skirmish_core::replay::{Replay, ReplayPlayer};
use skirmish_core::team::Team;
use skirmish_headless::{
    batch::{run_batch, verify_determinism, BatchConfig},
    config::{GameMode, RunConfig},
    orchestrator::{Orchestrator, RunSummary},
    runner::InteractiveRunner,
};

#[derive(Parser)]
#[command(name = "skirmish_headless")]
#[command(about = "Headless two-team grid skirmish runner")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single game
    Run(RunArgs),

    /// Run batch of rule-based games for balance testing
    Batch {
        /// Number of games to run
        #[arg(short, long, default_value = "100")]
        count: u32,

        /// Maximum parallel games (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Starting random seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Turn ceiling per game
        #[arg(long)]
        max_turns: Option<u32>,

        /// Save a replay of every game
        #[arg(long)]
        replays: bool,

        /// Game rules file (RON)
        #[arg(long)]
        rules: Option<PathBuf>,
    },

    /// Verify determinism
    Verify {
        /// Seed to test
        #[arg(long, default_value = "12345")]
        seed: u64,

        /// Number of runs to compare
        #[arg(short, long, default_value = "3")]
        runs: u32,

        /// Turn ceiling per run
        #[arg(long)]
        max_turns: Option<u32>,
    },

    /// Replay a recorded game
    Replay {
        /// Replay file path
        file: PathBuf,

        /// Verify final state hash
        #[arg(long)]
        verify: bool,
    },

    /// Run performance benchmark
    Benchmark {
        /// Number of turns to simulate
        #[arg(short, long, default_value = "500")]
        turns: u32,

        /// Random seed
        #[arg(long, default_value = "0")]
        seed: u64,
    },
}

#[derive(clap::Args, Default)]
struct RunArgs {
    /// Run configuration file (RON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Mode: training, spectate or interactive
    #[arg(short, long)]
    mode: Option<GameMode>,

    /// Controller of team A: human, external or heuristic
    #[arg(long)]
    team_a: Option<ControllerKind>,

    /// Controller of team B: human, external or heuristic
    #[arg(long)]
    team_b: Option<ControllerKind>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Turn ceiling
    #[arg(long)]
    max_turns: Option<u32>,

    /// Paced turn length in milliseconds
    #[arg(long)]
    turn_ms: Option<u64>,

    /// External policy command line
    #[arg(long)]
    policy: Option<String>,

    /// External policy answer timeout in milliseconds
    #[arg(long)]
    policy_timeout_ms: Option<u64>,

    /// Training log file
    #[arg(long)]
    training_log: Option<PathBuf>,

    /// Save a replay of the run
    #[arg(long)]
    replay_out: Option<PathBuf>,

    /// Render the board every N turns
    #[arg(long)]
    render_every: Option<u32>,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging to stderr (stdout is for protocol)
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::from_level(log_level).into())
                .from_env_lossy(),
        )
        .init();

    match cli.command {
        Some(Commands::Run(args)) => cmd_run(args),
        Some(Commands::Batch {
            count,
            parallel,
            output,
            seed,
            max_turns,
            replays,
            rules,
        }) => cmd_batch(count, parallel, output, seed, max_turns, replays, rules),
        Some(Commands::Verify {
            seed,
            runs,
            max_turns,
        }) => cmd_verify(seed, runs, max_turns),
        Some(Commands::Replay { file, verify }) => cmd_replay(file, verify),
        Some(Commands::Benchmark { turns, seed }) => cmd_benchmark(turns, seed),
        None => {
            // Default: interactive mode
            cmd_run(RunArgs::default());
        }
    }
}

fn load_rules(path: Option<PathBuf>) -> GameConfig {
    match path {
        Some(path) => GameConfig::load(&path).unwrap_or_else(|e| {
            eprintln!("Failed to load rules '{}': {}", path.display(), e);
            std::process::exit(1);
        }),
        None => GameConfig::default(),
    }
}

fn build_run_config(args: RunArgs) -> RunConfig {
    let mut config = match &args.config {
        Some(path) => RunConfig::load(path).unwrap_or_else(|e| {
            eprintln!("Failed to load config '{}': {}", path.display(), e);
            std::process::exit(1);
        }),
        None => RunConfig::default(),
    };

    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(kind) = args.team_a {
        config.controllers[Team::A.index()] = kind;
    }
    if let Some(kind) = args.team_b {
        config.controllers[Team::B.index()] = kind;
    }
    if let Some(seed) = args.seed {
        config.game.seed = seed;
    }
    if let Some(max_turns) = args.max_turns {
        config.game.max_turns = max_turns;
    }
    if let Some(ms) = args.turn_ms {
        config.turn_duration_ms = ms;
    }
    if let Some(policy) = args.policy {
        config.policy.command = policy.split_whitespace().map(String::from).collect();
    }
    if let Some(ms) = args.policy_timeout_ms {
        config.policy.timeout_ms = ms;
    }
    if args.training_log.is_some() {
        config.training_log = args.training_log;
    }
    if args.replay_out.is_some() {
        config.replay_out = args.replay_out;
    }
    if let Some(every) = args.render_every {
        config.render_every = every;
    }

    if let Err(e) = config.validate() {
        eprintln!("{e}");
        std::process::exit(1);
    }
    config
}

/// Run a single game
fn cmd_run(args: RunArgs) {
    let config = build_run_config(args);
    tracing::info!(
        mode = %config.mode,
        team_a = %config.controllers[0],
        team_b = %config.controllers[1],
        seed = config.game.seed,
        "Starting session"
    );

    let result = if config.mode == GameMode::Interactive {
        InteractiveRunner::new(config).run_stdio()
    } else {
        let mut orchestrator = Orchestrator::new(config);
        orchestrator.start().and_then(|()| orchestrator.wait())
    };

    match result {
        Ok(summary) => print_summary(&summary),
        Err(e) => {
            tracing::error!(error = %e, "Run failed");
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    }
}

fn print_summary(summary: &RunSummary) {
    eprintln!("\n{}", "=".repeat(50));
    eprintln!("GAME COMPLETE");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Turns: {}", summary.turns);
    match summary.outcome {
        Some(outcome) => match outcome.winner {
            Some(team) => eprintln!("Winner: {team} ({:?})", outcome.condition),
            None => eprintln!("Result: draw ({:?})", outcome.condition),
        },
        None => eprintln!("Result: stopped before the end"),
    }
    eprintln!("Final state hash: {:016x}", summary.final_hash);
    if let Some(path) = &summary.training_log {
        eprintln!("Training log: {}", path.display());
    }
    if let Some(path) = &summary.replay {
        eprintln!("Replay: {}", path.display());
    }
}

/// Run batch of games for balance testing
fn cmd_batch(
    count: u32,
    parallel: u32,
    output: PathBuf,
    seed: u64,
    max_turns: Option<u32>,
    replays: bool,
    rules: Option<PathBuf>,
) {
    let batch_start = Instant::now();
    let mut game = load_rules(rules);
    if let Some(max_turns) = max_turns {
        game.max_turns = max_turns;
    }

    let num_cpus = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    tracing::info!(
        count,
        parallel,
        seed,
        output = %output.display(),
        cpus_available = num_cpus,
        max_turns = game.max_turns,
        replays,
        "Batch configuration"
    );

    if let Err(e) = std::fs::create_dir_all(&output) {
        tracing::error!(error = %e, path = %output.display(), "Failed to create output directory");
        eprintln!(
            "FATAL: Cannot create output directory '{}': {}",
            output.display(),
            e
        );
        std::process::exit(1);
    }

    let mut config = BatchConfig::new("default", count)
        .with_output(output.clone())
        .with_seed(seed)
        .with_game(game)
        .with_replays(replays);
    config.parallel_games = parallel;

    let results = run_batch(config);

    tracing::info!(
        games_completed = results.games.len(),
        games_failed = results.errors.len(),
        total_duration_secs = format!("{:.1}", batch_start.elapsed().as_secs_f64()),
        "Batch execution finished"
    );

    let results_path = output.join("batch_results.json");
    if let Err(e) = results.save(&results_path) {
        tracing::error!(error = %e, path = %results_path.display(), "Failed to save results");
        eprintln!("FATAL: Failed to save results: {}", e);
        std::process::exit(1);
    }

    let summary = &results.summary;
    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BATCH COMPLETE");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Games played: {}", results.games.len());
    if !results.errors.is_empty() {
        eprintln!("Games FAILED: {}", results.errors.len());
    }
    eprintln!("Duration: {:.1}s", results.duration_seconds);
    eprintln!(
        "Throughput: {:.1} games/sec",
        results.games.len() as f64 / results.duration_seconds.max(0.001)
    );
    eprintln!(
        "Average length: {:.1} turns ({}..{})",
        summary.avg_duration_turns, summary.min_duration_turns, summary.max_duration_turns
    );
    eprintln!("Draws: {}", summary.draws);
    eprintln!("\nWin Rates:");
    let mut rates: Vec<_> = summary.win_rates.iter().collect();
    rates.sort_by(|a, b| a.0.cmp(b.0));
    for (team, rate) in rates {
        eprintln!("  {}: {:.1}%", team, rate * 100.0);
    }
    if !summary.is_balanced(0.1) {
        if let Some(team) = summary.dominant_team(0.1) {
            eprintln!("\nImbalance: {team} wins noticeably more often");
        }
    }

    if !results.errors.is_empty() {
        eprintln!("\nGAME FAILURES:");
        for error in results.errors.iter().take(10) {
            eprintln!(
                "  Game {} (seed {}): {}",
                error.game_index, error.seed, error.message
            );
        }
        if results.errors.len() > 10 {
            eprintln!("  ... and {} more failures", results.errors.len() - 10);
        }
    }

    eprintln!("\nResults saved to: {}", results_path.display());
}

/// Verify determinism
fn cmd_verify(seed: u64, runs: u32, max_turns: Option<u32>) {
    let mut game = GameConfig::default();
    if let Some(max_turns) = max_turns {
        game.max_turns = max_turns;
    }
    tracing::info!(seed, runs, max_turns = game.max_turns, "Verifying determinism");

    if verify_determinism(&game, seed, runs) {
        eprintln!("PASS: All {} runs produced identical results", runs);
    } else {
        eprintln!("FAIL: Non-determinism detected!");
        std::process::exit(1);
    }
}

/// Replay a recorded game
fn cmd_replay(file: PathBuf, verify: bool) {
    if verify {
        tracing::info!("Verifying replay: {}", file.display());
    } else {
        tracing::info!("Playing replay: {}", file.display());
    }

    let replay = match Replay::load(&file) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to load replay: {}", e);
            std::process::exit(1);
        }
    };

    eprintln!("Loaded replay:");
    eprintln!("  Scenario: {}", replay.scenario_id);
    eprintln!("  Seed: {}", replay.config.seed);
    eprintln!(
        "  Controllers: {} vs {}",
        replay.controllers[0], replay.controllers[1]
    );
    eprintln!("  Decisions: {}", replay.decision_count());
    eprintln!("  Duration: {} turns", replay.duration());

    let mut player = match ReplayPlayer::new(replay) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to create replay player: {}", e);
            std::process::exit(1);
        }
    };

    if verify {
        eprintln!("Verifying replay...");
        match player.verify() {
            Ok(()) => {
                eprintln!("PASS: Replay verification successful");
                eprintln!("  Expected hash: {:016x}", player.replay().final_hash);
                eprintln!("  Actual hash:   {:016x}", player.engine().state_hash());
            }
            Err(e) => {
                eprintln!("FAIL: {}", e);
                eprintln!("  Expected: {:016x}", player.replay().final_hash);
                eprintln!("  Actual:   {:016x}", player.engine().state_hash());
                std::process::exit(1);
            }
        }
    } else {
        let mut last_percent = 0;
        while player.advance() {
            let percent = player.progress_percent() as u32;
            if percent > last_percent && percent % 10 == 0 {
                eprintln!("Progress: {}%", percent);
                last_percent = percent;
            }
        }

        let world = player.engine().world();
        eprintln!("Replay complete at turn {}", player.current_turn());
        eprintln!("Final state hash: {:016x}", player.engine().state_hash());
        eprintln!("\nFinal State:");
        for team in Team::ALL {
            eprintln!(
                "  {}: {} units, base hp {}",
                team,
                world.living_unit_count(team),
                world.total_base_hp(team)
            );
        }
        if let Some(outcome) = world.outcome() {
            eprintln!("  Outcome: {:?}", outcome);
        }
    }
}

/// Run benchmark
fn cmd_benchmark(turns: u32, seed: u64) {
    tracing::info!(turns, seed, "Running benchmark");

    let config = GameConfig::default().with_seed(seed).with_max_turns(turns);
    let mut engine = match TurnEngine::new(config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Failed to build world: {}", e);
            std::process::exit(1);
        }
    };
    let mut controllers = Controllers::heuristic(engine.rng_mut());

    let start = Instant::now();
    let mut played = 0u32;
    while !engine.is_game_over() && played < turns {
        engine.process_turn(&mut controllers);
        played += 1;
    }
    let elapsed = start.elapsed();
    let tps = f64::from(played) / elapsed.as_secs_f64().max(1e-9);

    let world = engine.world();
    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BENCHMARK RESULTS");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Turns: {}", played);
    eprintln!("Duration: {:.3}s", elapsed.as_secs_f64());
    eprintln!("Turns/second: {:.1}", tps);
    eprintln!(
        "ms/turn: {:.4}",
        elapsed.as_secs_f64() * 1000.0 / f64::from(played.max(1))
    );
    eprintln!(
        "Final units: {} vs {}",
        world.living_unit_count(Team::A),
        world.living_unit_count(Team::B)
    );
    eprintln!("State hash: {:016x}", engine.state_hash());
}
