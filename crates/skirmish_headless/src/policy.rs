//! External policy bridge.
//!
//! Runs a policy program as a child process and talks to it in JSON lines:
//! one state export written to its stdin per decision, one action read back
//! from its stdout. A background thread owns the stdout reader so that every
//! answer can be awaited with a timeout.
//!
//! Every request carries a `request_id` next to the state fields and the
//! answer must echo it:
//!
//! ```text
//! -> {"request_id":7,"turn":12,"my_team":1,...}
//! <- {"request_id":7,"action_type":1,"base_id":0,"unit_type":2}
//! ```
//!
//! Answers with any other id belong to a request that already timed out and
//! are discarded.
//!
//! A policy that cannot be started, answers late, answers garbage or exits
//! never stalls the game: the decision degrades to [`Action::Wait`].

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use skirmish_core::action::Action;
use skirmish_core::decision::{ControllerKind, DecisionContext, DecisionSource};
use skirmish_core::export::StateExport;
use skirmish_core::rng::GameRng;

use crate::config::PolicyConfig;

/// Error type for policy process communication.
#[derive(Error, Debug)]
pub enum PolicyError {
    /// No program configured.
    #[error("Policy command is empty")]
    EmptyCommand,
    /// The program could not be started.
    #[error("Failed to start policy '{command}': {source}")]
    Spawn {
        /// Program name.
        command: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Writing the request failed.
    #[error("Policy I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// No answer in time.
    #[error("Policy did not answer within {0:?}")]
    Timeout(Duration),
    /// The process closed its output.
    #[error("Policy process is gone")]
    Disconnected,
    /// The answer is not an action.
    #[error("Malformed policy answer: {0}")]
    Malformed(String),
    /// The request could not be encoded.
    #[error("Failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One request line.
#[derive(Serialize)]
struct PolicyRequest<'a> {
    request_id: u64,
    #[serde(flatten)]
    state: &'a StateExport,
}

/// Id echoed by the policy; the action fields sit beside it.
#[derive(Deserialize)]
struct AnswerId {
    request_id: u64,
}

struct PolicyProcess {
    child: Child,
    stdin: ChildStdin,
    answers: Receiver<String>,
}

impl PolicyProcess {
    fn spawn(command: &[String]) -> Result<Self, PolicyError> {
        let (program, args) = command.split_first().ok_or(PolicyError::EmptyCommand)?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| PolicyError::Spawn {
                command: program.clone(),
                source,
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(PolicyError::Disconnected);
        };

        let (tx, answers) = mpsc::channel();
        // Detached: a grandchild holding stdout open must not block drop.
        thread::Builder::new()
            .name("policy-reader".into())
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            child,
            stdin,
            answers,
        })
    }
}

impl Drop for PolicyProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Decision source backed by a policy process.
pub struct ExternalPolicy {
    process: Option<PolicyProcess>,
    timeout: Duration,
    failures: u32,
    next_request: u64,
}

impl ExternalPolicy {
    /// Start the configured policy program.
    pub fn spawn(config: &PolicyConfig) -> Result<Self, PolicyError> {
        let process = PolicyProcess::spawn(&config.command)?;
        debug!(command = ?config.command, "Policy process started");
        Ok(Self {
            process: Some(process),
            timeout: config.timeout(),
            failures: 0,
            next_request: 0,
        })
    }

    /// Start the policy, or fall back to a source that always waits.
    #[must_use]
    pub fn connect(config: &PolicyConfig) -> Self {
        Self::spawn(config).unwrap_or_else(|e| {
            warn!(error = %e, "External policy unavailable, team will wait");
            Self::unavailable(config.timeout())
        })
    }

    /// A policy with no process behind it.
    #[must_use]
    pub const fn unavailable(timeout: Duration) -> Self {
        Self {
            process: None,
            timeout,
            failures: 0,
            next_request: 0,
        }
    }

    /// Whether a process is attached.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.process.is_some()
    }

    /// Decisions that fell back to waiting.
    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    /// Send one state and wait for the answer to it.
    pub fn request(&mut self, state: &StateExport) -> Result<Action, PolicyError> {
        let process = self.process.as_mut().ok_or(PolicyError::Disconnected)?;
        self.next_request += 1;
        let request_id = self.next_request;

        let mut line = serde_json::to_string(&PolicyRequest { request_id, state })?;
        line.push('\n');
        process.stdin.write_all(line.as_bytes())?;
        process.stdin.flush()?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let answer = match process.answers.recv_timeout(remaining) {
                Ok(answer) => answer,
                Err(RecvTimeoutError::Timeout) => return Err(PolicyError::Timeout(self.timeout)),
                Err(RecvTimeoutError::Disconnected) => return Err(PolicyError::Disconnected),
            };
            let answer = answer.trim();
            let id = serde_json::from_str::<AnswerId>(answer)
                .map_err(|e| PolicyError::Malformed(e.to_string()))?
                .request_id;
            if id != request_id {
                debug!(expected = request_id, got = id, "Discarding stale policy answer");
                continue;
            }
            return Action::from_json(answer).map_err(|e| PolicyError::Malformed(e.to_string()));
        }
    }

    /// Requests sent so far.
    #[must_use]
    pub const fn requests_sent(&self) -> u64 {
        self.next_request
    }
}

impl std::fmt::Debug for ExternalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalPolicy")
            .field("available", &self.is_available())
            .field("timeout", &self.timeout)
            .field("failures", &self.failures)
            .finish()
    }
}

impl DecisionSource for ExternalPolicy {
    fn decide(&mut self, ctx: &DecisionContext<'_>, _rng: &mut GameRng) -> Action {
        if self.process.is_none() {
            return Action::Wait;
        }
        match self.request(&ctx.export()) {
            Ok(action) => action,
            Err(e) => {
                self.failures += 1;
                warn!(team = %ctx.team, turn = ctx.world.turn(), error = %e, "Policy decision failed, waiting");
                if matches!(e, PolicyError::Disconnected | PolicyError::Io(_)) {
                    self.process = None;
                }
                Action::Wait
            }
        }
    }

    fn kind(&self) -> ControllerKind {
        ControllerKind::External
    }
}
