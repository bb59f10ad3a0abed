//! Turn orchestrator.
//!
//! Owns a running game on a background thread and exposes it to other
//! threads through a command channel. The state machine is
//! `Idle -> Running -> Stopped`:
//!
//! - [`Orchestrator::start`] builds the world and spawns the turn loop.
//! - Purchases, queued actions, state exports, status queries and
//!   reconfiguration are requests answered by the loop between turns, so the
//!   world has a single owner and never needs locking.
//! - [`Orchestrator::stop`] is idempotent: it asks the loop to exit and joins
//!   it. End-of-run side effects (training log, replay file) happen exactly
//!   once, when the turn loop ends.
//!
//! Paced modes stretch every turn to the configured duration and answer
//! requests while waiting; training runs unthrottled and only drains pending
//! requests between turns.

use std::io::Write;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use skirmish_core::action::Action;
use skirmish_core::decision::{ActionInbox, ControllerKind, Controllers, DecisionSource, HumanSource};
use skirmish_core::engine::{TurnEngine, TurnReport};
use skirmish_core::error::GameError;
use skirmish_core::export::StateExport;
use skirmish_core::replay::{build_controllers, Replay};
use skirmish_core::rng::GameRng;
use skirmish_core::team::Team;
use skirmish_core::unit::UnitKind;
use skirmish_core::world::Outcome;

use crate::ascii_visualizer::{render_world, AsciiConfig};
use crate::config::{GameMode, PolicyConfig, RunConfig};
use crate::policy::ExternalPolicy;
use crate::training::TrainingLogger;

/// Turns between progress lines.
const PROGRESS_INTERVAL: u32 = 10;

/// Turns between speed reports in unthrottled runs.
const SPEED_REPORT_INTERVAL: u32 = 1000;

/// Error type for orchestrator operations.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// The game could not be built.
    #[error("Failed to initialize game: {0}")]
    Init(#[from] GameError),
    /// `start` was called twice.
    #[error("Orchestrator was already started")]
    AlreadyStarted,
    /// The turn loop is not running.
    #[error("Orchestrator is not running")]
    NotRunning,
    /// An action was queued for a team no person controls.
    #[error("{0} is not human-controlled")]
    NotHuman(Team),
    /// The turn loop thread could not be spawned.
    #[error("Failed to spawn turn loop: {0}")]
    Spawn(#[source] std::io::Error),
    /// The turn loop panicked.
    #[error("Turn loop panicked")]
    Panicked,
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    /// Created, not started.
    Idle,
    /// Turn loop alive.
    Running,
    /// Stopped for good.
    Stopped,
}

/// Snapshot of a running game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Lifecycle state.
    pub state: OrchestratorState,
    /// Current turn.
    pub turn: u32,
    /// Whether the game has ended.
    pub game_over: bool,
    /// Winning team, once decided.
    pub winner: Option<Team>,
    /// Living units per team.
    pub units: [usize; 2],
    /// Total base hp per team.
    pub base_hp: [i32; 2],
    /// Energy per team.
    pub energy: [i32; 2],
    /// Controller per team.
    pub controllers: [ControllerKind; 2],
    /// Actions waiting in each human inbox.
    pub pending_actions: [usize; 2],
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Turns processed.
    pub turns: u32,
    /// Result, `None` when stopped before the end.
    pub outcome: Option<Outcome>,
    /// Final world hash.
    pub final_hash: u64,
    /// Training log written.
    pub training_log: Option<PathBuf>,
    /// Replay written.
    pub replay: Option<PathBuf>,
}

enum Request {
    Purchase {
        team: Team,
        kind: UnitKind,
        base: usize,
        reply: Sender<bool>,
    },
    QueueAction {
        team: Team,
        action: Action,
        reply: Sender<Result<usize, OrchestratorError>>,
    },
    State {
        team: Team,
        reply: Sender<StateExport>,
    },
    Status {
        reply: Sender<StatusReport>,
    },
    Reconfigure {
        controllers: [ControllerKind; 2],
        reply: Sender<()>,
    },
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Runs one game in the background.
pub struct Orchestrator {
    config: RunConfig,
    state: OrchestratorState,
    requests: Option<Sender<Request>>,
    finished: Option<Receiver<RunSummary>>,
    handle: Option<JoinHandle<RunSummary>>,
    summary: Option<RunSummary>,
}

impl Orchestrator {
    /// Orchestrator for `config`, not yet started.
    #[must_use]
    pub const fn new(config: RunConfig) -> Self {
        Self {
            config,
            state: OrchestratorState::Idle,
            requests: None,
            finished: None,
            handle: None,
            summary: None,
        }
    }

    /// Run configuration.
    #[must_use]
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Build the world and start the turn loop.
    ///
    /// # Errors
    ///
    /// Fails if already started or if the world cannot be built.
    pub fn start(&mut self) -> Result<(), OrchestratorError> {
        if self.state != OrchestratorState::Idle {
            return Err(OrchestratorError::AlreadyStarted);
        }

        let turn_loop = TurnLoop::new(&self.config)?;
        let (tx, rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("turn-loop".into())
            .spawn(move || turn_loop.run(&rx, &done_tx))
            .map_err(OrchestratorError::Spawn)?;

        info!(
            mode = %self.config.mode,
            team_a = %self.config.controllers[0],
            team_b = %self.config.controllers[1],
            seed = self.config.game.seed,
            "Orchestrator started"
        );

        self.requests = Some(tx);
        self.finished = Some(done_rx);
        self.handle = Some(handle);
        self.state = OrchestratorState::Running;
        Ok(())
    }

    fn call<T>(&self, make: impl FnOnce(Sender<T>) -> Request) -> Result<T, OrchestratorError> {
        let requests = self.requests.as_ref().ok_or(OrchestratorError::NotRunning)?;
        let (reply, answer) = mpsc::channel();
        requests
            .send(make(reply))
            .map_err(|_| OrchestratorError::NotRunning)?;
        answer.recv().map_err(|_| OrchestratorError::NotRunning)
    }

    /// Buy a unit for `team` at its base `base`.
    ///
    /// Returns `Ok(false)` if the purchase failed or the game is over.
    pub fn purchase(&self, team: Team, kind: UnitKind, base: usize) -> Result<bool, OrchestratorError> {
        self.call(|reply| Request::Purchase {
            team,
            kind,
            base,
            reply,
        })
    }

    /// Queue an action for a human-controlled team. Returns the queue length.
    pub fn queue_action(&self, team: Team, action: Action) -> Result<usize, OrchestratorError> {
        self.call(|reply| Request::QueueAction { team, action, reply })?
    }

    /// Team-relative state export.
    pub fn export_state(&self, team: Team) -> Result<StateExport, OrchestratorError> {
        self.call(|reply| Request::State { team, reply })
    }

    /// Current status.
    pub fn status(&self) -> Result<StatusReport, OrchestratorError> {
        self.call(|reply| Request::Status { reply })
    }

    /// Replace both decision sources. Human inboxes start empty.
    pub fn reconfigure(&mut self, team_a: ControllerKind, team_b: ControllerKind) -> Result<(), OrchestratorError> {
        let controllers = [team_a, team_b];
        self.call(|reply| Request::Reconfigure { controllers, reply })?;
        self.config.controllers = controllers;
        Ok(())
    }

    /// The run summary, once the game has ended.
    pub fn poll_finished(&mut self) -> Option<RunSummary> {
        if self.summary.is_none() {
            self.summary = self.finished.as_ref().and_then(|rx| rx.try_recv().ok());
        }
        self.summary.clone()
    }

    /// Block until the game ends by itself, then stop.
    ///
    /// Interactive runs keep answering requests after the end, so this
    /// stops them once the summary is in.
    pub fn wait(&mut self) -> Result<RunSummary, OrchestratorError> {
        if self.summary.is_none() {
            let finished = self.finished.as_ref().ok_or(OrchestratorError::NotRunning)?;
            self.summary = finished.recv().ok();
        }
        self.stop()
    }

    /// Stop the turn loop and join it. Safe to call repeatedly.
    pub fn stop(&mut self) -> Result<RunSummary, OrchestratorError> {
        match self.state {
            OrchestratorState::Idle => {
                self.state = OrchestratorState::Stopped;
                return Err(OrchestratorError::NotRunning);
            }
            OrchestratorState::Stopped => {
                return self.summary.clone().ok_or(OrchestratorError::NotRunning);
            }
            OrchestratorState::Running => {}
        }

        if let Some(requests) = self.requests.take() {
            let _ = requests.send(Request::Stop);
        }
        self.state = OrchestratorState::Stopped;
        let joined = self.handle.take().map(JoinHandle::join);
        self.finished = None;

        match joined {
            Some(Ok(summary)) => {
                info!(turns = summary.turns, outcome = ?summary.outcome, "Orchestrator stopped");
                self.summary = Some(summary.clone());
                Ok(summary)
            }
            Some(Err(_)) => {
                error!("Turn loop panicked");
                Err(OrchestratorError::Panicked)
            }
            None => self.summary.clone().ok_or(OrchestratorError::NotRunning),
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if self.state == OrchestratorState::Running {
            let _ = self.stop();
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("mode", &self.config.mode)
            .field("state", &self.state)
            .finish()
    }
}

/// Decision sources for `kinds`, heuristic ones seeded from `rng` in team order.
fn make_controllers(
    kinds: [ControllerKind; 2],
    rng: &mut GameRng,
    policy: &PolicyConfig,
) -> (Controllers, [Option<ActionInbox>; 2]) {
    let mut inboxes: [Option<ActionInbox>; 2] = [None, None];
    let controllers = build_controllers(kinds, rng, |team, kind| -> Box<dyn DecisionSource> {
        match kind {
            ControllerKind::External => Box::new(ExternalPolicy::connect(policy)),
            _ => {
                let inbox = ActionInbox::new();
                inboxes[team.index()] = Some(inbox.clone());
                Box::new(HumanSource::new(inbox))
            }
        }
    });
    (controllers, inboxes)
}

/// State owned by the turn loop thread.
struct TurnLoop {
    engine: TurnEngine,
    controllers: Controllers,
    inboxes: [Option<ActionInbox>; 2],
    kinds: [ControllerKind; 2],
    mode: GameMode,
    policy: PolicyConfig,
    pacing: Option<std::time::Duration>,
    render_every: u32,
    logger: Option<TrainingLogger>,
    replay: Option<(Replay, PathBuf)>,
}

impl TurnLoop {
    fn new(config: &RunConfig) -> Result<Self, GameError> {
        let log_path = config.training_log_path();
        let record = config.replay_out.is_some();

        let mut engine = TurnEngine::new(config.game.clone())?
            .with_recording(record)
            .with_training_snapshots(log_path.is_some());
        let (controllers, inboxes) = make_controllers(config.controllers, engine.rng_mut(), &config.policy);

        let logger = log_path.map(|path| TrainingLogger::start(path, config.mode, config.controllers));
        let replay = config.replay_out.clone().map(|path| {
            (
                Replay::new(config.mode.name(), config.game.clone(), config.controllers),
                path,
            )
        });

        Ok(Self {
            engine,
            controllers,
            inboxes,
            kinds: config.controllers,
            mode: config.mode,
            policy: config.policy.clone(),
            pacing: config.pacing(),
            render_every: config.render_every,
            logger,
            replay,
        })
    }

    fn run(mut self, requests: &Receiver<Request>, finished: &Sender<RunSummary>) -> RunSummary {
        let started = Instant::now();
        let mut flow = Flow::Continue;

        while flow == Flow::Continue && !self.engine.is_game_over() {
            let turn_start = Instant::now();
            let report = self.engine.process_turn(&mut self.controllers);
            self.after_turn(&report, started);

            flow = match self.pacing {
                Some(duration) => self.serve_until(requests, turn_start + duration),
                None => self.drain(requests),
            };
        }

        let summary = self.finish();
        let _ = finished.send(summary.clone());

        // Keep answering queries until told to stop.
        if flow == Flow::Continue && self.mode == GameMode::Interactive {
            for request in requests.iter() {
                if self.handle(request) == Flow::Stop {
                    break;
                }
            }
        }
        summary
    }

    fn serve_until(&mut self, requests: &Receiver<Request>, deadline: Instant) -> Flow {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Flow::Continue;
            }
            match requests.recv_timeout(remaining) {
                Ok(request) => {
                    if self.handle(request) == Flow::Stop {
                        return Flow::Stop;
                    }
                }
                Err(RecvTimeoutError::Timeout) => return Flow::Continue,
                Err(RecvTimeoutError::Disconnected) => return Flow::Stop,
            }
        }
    }

    fn drain(&mut self, requests: &Receiver<Request>) -> Flow {
        loop {
            match requests.try_recv() {
                Ok(request) => {
                    if self.handle(request) == Flow::Stop {
                        return Flow::Stop;
                    }
                }
                Err(TryRecvError::Empty) => return Flow::Continue,
                Err(TryRecvError::Disconnected) => return Flow::Stop,
            }
        }
    }

    fn after_turn(&mut self, report: &TurnReport, started: Instant) {
        let world = self.engine.world();

        if let Some(logger) = self.logger.as_mut() {
            logger.record_turn(report, world);
        }

        if report.turn % PROGRESS_INTERVAL == 0 {
            info!(
                turn = report.turn,
                units_a = world.living_unit_count(Team::A),
                units_b = world.living_unit_count(Team::B),
                base_hp_a = world.total_base_hp(Team::A),
                base_hp_b = world.total_base_hp(Team::B),
                energy_a = world.energy(Team::A),
                energy_b = world.energy(Team::B),
                "Turn progress"
            );
        }

        if self.pacing.is_none() && report.turn > 0 && report.turn % SPEED_REPORT_INTERVAL == 0 {
            let elapsed = started.elapsed().as_secs_f64();
            let turns_per_sec = if elapsed > 0.0 {
                f64::from(report.turn) / elapsed
            } else {
                0.0
            };
            info!(turn = report.turn, turns_per_sec, "Simulation speed");
        }

        if self.render_every > 0 && report.turn % self.render_every == 0 {
            let frame = render_world(world, &AsciiConfig::default());
            // Stdout carries the protocol in interactive runs.
            let written = if self.mode == GameMode::Interactive {
                std::io::stderr().lock().write_all(frame.as_bytes())
            } else {
                std::io::stdout().lock().write_all(frame.as_bytes())
            };
            if let Err(e) = written {
                debug!(error = %e, "Render output failed");
            }
        }

        if let Some(outcome) = report.outcome {
            info!(turn = report.turn, winner = ?outcome.winner, condition = ?outcome.condition, "Game over");
        }
    }

    fn handle(&mut self, request: Request) -> Flow {
        match request {
            Request::Purchase {
                team,
                kind,
                base,
                reply,
            } => {
                let bought = !self.engine.is_game_over() && self.engine.purchase_direct(team, kind, base);
                debug!(team = %team, kind = kind.name(), base, bought, "Direct purchase");
                let _ = reply.send(bought);
            }
            Request::QueueAction { team, action, reply } => {
                let queued = match &self.inboxes[team.index()] {
                    Some(inbox) => {
                        inbox.push(action);
                        Ok(inbox.len())
                    }
                    None => Err(OrchestratorError::NotHuman(team)),
                };
                let _ = reply.send(queued);
            }
            Request::State { team, reply } => {
                let _ = reply.send(self.engine.export_state(team));
            }
            Request::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Request::Reconfigure { controllers, reply } => {
                self.reconfigure(controllers);
                let _ = reply.send(());
            }
            Request::Stop => return Flow::Stop,
        }
        Flow::Continue
    }

    fn status(&self) -> StatusReport {
        let world = self.engine.world();
        StatusReport {
            state: OrchestratorState::Running,
            turn: world.turn(),
            game_over: world.is_game_over(),
            winner: world.outcome().and_then(|o| o.winner),
            units: Team::ALL.map(|t| world.living_unit_count(t)),
            base_hp: Team::ALL.map(|t| world.total_base_hp(t)),
            energy: Team::ALL.map(|t| world.energy(t)),
            controllers: self.kinds,
            pending_actions: Team::ALL.map(|t| self.inboxes[t.index()].as_ref().map_or(0, ActionInbox::len)),
        }
    }

    fn reconfigure(&mut self, kinds: [ControllerKind; 2]) {
        let (controllers, inboxes) = make_controllers(kinds, self.engine.rng_mut(), &self.policy);
        self.controllers = controllers;
        self.inboxes = inboxes;
        self.kinds = kinds;

        // The recorded controllers no longer describe the game.
        if self.replay.take().is_some() {
            warn!("Replay recording dropped after reconfiguration");
        }
        info!(team_a = %kinds[0], team_b = %kinds[1], turn = self.engine.turn(), "Decision sources reconfigured");
    }

    fn finish(&mut self) -> RunSummary {
        let outcome = self.engine.world().outcome();
        let winner = outcome.and_then(|o| o.winner);

        let training_log = self.logger.take().and_then(|logger| match logger.finish(winner) {
            Ok(path) => Some(path),
            Err(e) => {
                error!(error = %e, "Failed to write training log");
                None
            }
        });

        let replay = self.replay.take().and_then(|(mut replay, path)| {
            replay.finalize_from(&mut self.engine);
            match replay.save(&path) {
                Ok(()) => {
                    info!(path = %path.display(), decisions = replay.decision_count(), "Replay saved");
                    Some(path)
                }
                Err(e) => {
                    error!(error = %e, path = %path.display(), "Failed to save replay");
                    None
                }
            }
        });

        RunSummary {
            turns: self.engine.turn(),
            outcome,
            final_hash: self.engine.state_hash(),
            training_log,
            replay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_core::config::GameConfig;

    fn fast_config(mode: GameMode) -> RunConfig {
        RunConfig::default()
            .with_mode(mode)
            .with_controllers(ControllerKind::Heuristic, ControllerKind::Heuristic)
            .with_turn_duration(1)
            .with_game(GameConfig::default().with_seed(3).with_max_turns(40))
    }

    #[test]
    fn test_lifecycle() {
        let mut orchestrator = Orchestrator::new(fast_config(GameMode::Spectate));
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
        assert!(matches!(orchestrator.status(), Err(OrchestratorError::NotRunning)));

        orchestrator.start().unwrap();
        assert_eq!(orchestrator.state(), OrchestratorState::Running);
        assert!(matches!(orchestrator.start(), Err(OrchestratorError::AlreadyStarted)));

        let first = orchestrator.stop().unwrap();
        let second = orchestrator.stop().unwrap();
        assert_eq!(first, second);
        assert_eq!(orchestrator.state(), OrchestratorState::Stopped);
    }

    #[test]
    fn test_training_runs_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("train.json");
        let config = fast_config(GameMode::Training).with_training_log(&log);

        let mut orchestrator = Orchestrator::new(config);
        orchestrator.start().unwrap();
        let summary = orchestrator.wait().unwrap();

        assert!(summary.outcome.is_some());
        assert_eq!(summary.training_log.as_deref(), Some(log.as_path()));

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&log).unwrap()).unwrap();
        let games = value["games"].as_array().unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(
            games[0]["episodes"].as_array().unwrap().len() as u32,
            summary.turns
        );
    }

    #[test]
    fn test_same_seed_same_result() {
        let run = || {
            let mut orchestrator = Orchestrator::new(fast_config(GameMode::Training));
            orchestrator.start().unwrap();
            orchestrator.wait().unwrap()
        };
        let (a, b) = (run(), run());
        assert_eq!(a.final_hash, b.final_hash);
        assert_eq!(a.outcome, b.outcome);
    }

    #[test]
    fn test_requests_while_running() {
        let config = RunConfig::default()
            .with_mode(GameMode::Interactive)
            .with_controllers(ControllerKind::Human, ControllerKind::Heuristic)
            .with_turn_duration(20)
            .with_game(GameConfig::default().with_seed(8).with_max_turns(500));

        let mut orchestrator = Orchestrator::new(config);
        orchestrator.start().unwrap();

        assert!(orchestrator.purchase(Team::A, UnitKind::Archer, 0).unwrap());
        assert!(!orchestrator.purchase(Team::A, UnitKind::Archer, 9).unwrap());

        let pending = orchestrator
            .queue_action(Team::A, Action::spawn(1, UnitKind::Infantry))
            .unwrap();
        assert_eq!(pending, 1);
        assert!(matches!(
            orchestrator.queue_action(Team::B, Action::Wait),
            Err(OrchestratorError::NotHuman(Team::B))
        ));

        let export = orchestrator.export_state(Team::A).unwrap();
        assert_eq!(export.my_team, 0);

        let status = orchestrator.status().unwrap();
        assert_eq!(status.controllers, [ControllerKind::Human, ControllerKind::Heuristic]);
        assert!(!status.game_over);

        orchestrator
            .reconfigure(ControllerKind::Heuristic, ControllerKind::Human)
            .unwrap();
        assert_eq!(
            orchestrator.status().unwrap().controllers,
            [ControllerKind::Heuristic, ControllerKind::Human]
        );
        assert!(orchestrator.queue_action(Team::B, Action::Wait).is_ok());

        let summary = orchestrator.stop().unwrap();
        assert!(summary.outcome.is_none());
        assert!(matches!(orchestrator.status(), Err(OrchestratorError::NotRunning)));
    }

    #[test]
    fn test_replay_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.replay");
        let config = fast_config(GameMode::Training).with_replay_out(&path);

        let mut orchestrator = Orchestrator::new(config);
        orchestrator.start().unwrap();
        let summary = orchestrator.wait().unwrap();

        let replay = Replay::load(&path).unwrap();
        assert_eq!(summary.replay.as_deref(), Some(path.as_path()));
        assert_eq!(replay.final_hash, summary.final_hash);
    }
}
