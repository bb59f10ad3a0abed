//! Interactive runner.
//!
//! Bridges the JSON-lines protocol to a running [`Orchestrator`]: commands
//! are read on a separate thread, answered one response line each, and the
//! game result is announced as soon as the game ends.

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::RunConfig;
use crate::orchestrator::{Orchestrator, OrchestratorError, RunSummary};
use crate::protocol::{Command, Response};

/// How long to wait for input before checking for the end of the game.
const INPUT_POLL_MS: u64 = 50;

/// Runs a game driven by protocol commands.
#[derive(Debug)]
pub struct InteractiveRunner {
    orchestrator: Orchestrator,
}

impl InteractiveRunner {
    /// Runner for `config`.
    #[must_use]
    pub const fn new(config: RunConfig) -> Self {
        Self {
            orchestrator: Orchestrator::new(config),
        }
    }

    /// Serve stdin and stdout until `stop` or end of input.
    pub fn run_stdio(self) -> Result<RunSummary, OrchestratorError> {
        self.run(io::BufReader::new(io::stdin()), io::stdout().lock())
    }

    /// Serve `input` and write responses to `output`.
    ///
    /// # Errors
    ///
    /// Fails if the game cannot start.
    pub fn run<R, W>(mut self, input: R, mut output: W) -> Result<RunSummary, OrchestratorError>
    where
        R: BufRead + Send + 'static,
        W: Write,
    {
        self.orchestrator.start()?;
        let config = self.orchestrator.config();
        emit(&mut output, &Response::ready(config.mode.name(), config.controllers));

        let (tx, lines) = mpsc::channel();
        thread::Builder::new()
            .name("command-reader".into())
            .spawn(move || {
                for line in input.lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })
            .map_err(OrchestratorError::Spawn)?;

        let mut announced = false;
        loop {
            if !announced {
                if let Some(summary) = self.orchestrator.poll_finished() {
                    emit(&mut output, &Response::game_over(&summary));
                    announced = true;
                }
            }

            let line = match lines.recv_timeout(Duration::from_millis(INPUT_POLL_MS)) {
                Ok(line) => line,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Command input closed");
                    break;
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match Command::from_json(line) {
                Ok(Command::Stop) => break,
                Ok(cmd) => {
                    let response = self.execute(cmd);
                    emit(&mut output, &response);
                }
                Err(e) => {
                    warn!(error = %e, "Unparsable command");
                    emit(&mut output, &Response::error(format!("Parse error: {e}"), None));
                }
            }
        }

        let summary = self.orchestrator.stop()?;
        if !announced && summary.outcome.is_some() {
            emit(&mut output, &Response::game_over(&summary));
        }
        emit(&mut output, &Response::Bye { turns: summary.turns });
        Ok(summary)
    }

    fn execute(&mut self, cmd: Command) -> Response {
        let name = cmd.name();
        let result = match cmd {
            Command::Purchase {
                team,
                unit_kind,
                base,
            } => self
                .orchestrator
                .purchase(team, unit_kind, base)
                .map(|success| Response::Purchased { success }),
            Command::Action { team, action } => self
                .orchestrator
                .queue_action(team, action)
                .map(|pending| Response::Queued { team, pending }),
            Command::State { team } => self
                .orchestrator
                .export_state(team)
                .map(|export| Response::State {
                    export: Box::new(export),
                }),
            Command::Status => self.orchestrator.status().map(Response::Status),
            Command::Reconfigure { team_a, team_b } => self
                .orchestrator
                .reconfigure(team_a, team_b)
                .map(|()| Response::Reconfigured { team_a, team_b }),
            Command::Stop => Ok(Response::Bye { turns: 0 }),
        };
        result.unwrap_or_else(|e| Response::error(e.to_string(), Some(name)))
    }
}

fn emit<W: Write>(output: &mut W, response: &Response) {
    if output
        .write_all(response.to_json_line().as_bytes())
        .and_then(|()| output.flush())
        .is_err()
    {
        warn!("Failed to write response");
    }
}
