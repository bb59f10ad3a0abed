//! JSON protocol for interactive runs.
//!
//! The interactive runner talks JSON lines (one JSON object per line):
//!
//! **Input (stdin):** commands from a person or a driving script
//! **Output (stdout):** responses and the final result
//!
//! # Protocol Flow
//!
//! 1. Runner starts, outputs `{"type":"ready",...}`
//! 2. The game runs in the background at the configured pace
//! 3. Commands are answered as they arrive
//! 4. On game end, outputs `{"type":"game_over",...}`, then `{"type":"bye",...}`
//!    once `stop` is received or input closes
//!
//! # Example Session
//!
//! ```text
//! <- {"type":"ready","version":"1.0","mode":"interactive","team_a":"human","team_b":"heuristic"}
//! -> {"cmd":"purchase","team":0,"unit_kind":"archer","base":1}
//! <- {"type":"purchased","success":true}
//! -> {"cmd":"action","team":0,"action":{"action_type":1,"base_id":0,"unit_type":2}}
//! <- {"type":"queued","team":0,"pending":1}
//! -> {"cmd":"status"}
//! <- {"type":"status","state":"running","turn":12,...}
//! -> {"cmd":"stop"}
//! <- {"type":"bye","turns":12}
//! ```

use serde::{Deserialize, Serialize};

use skirmish_core::action::Action;
use skirmish_core::decision::ControllerKind;
use skirmish_core::export::StateExport;
use skirmish_core::team::Team;
use skirmish_core::unit::UnitKind;
use skirmish_core::world::EndCondition;

use crate::orchestrator::{RunSummary, StatusReport};

/// Protocol version announced in the ready line.
pub const PROTOCOL_VERSION: &str = "1.0";

// ============================================================================
// Input Commands (driver -> runner)
// ============================================================================

/// Commands accepted by the interactive runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Buy a unit right away.
    Purchase {
        team: Team,
        unit_kind: UnitKind,
        /// Team-relative base index.
        #[serde(default)]
        base: usize,
    },

    /// Queue an action for a human-controlled team's next poll.
    Action { team: Team, action: Action },

    /// Team-relative state export.
    State { team: Team },

    /// Orchestrator status.
    Status,

    /// Replace both teams' decision sources.
    Reconfigure {
        team_a: ControllerKind,
        team_b: ControllerKind,
    },

    /// Stop the game and exit.
    Stop,
}

impl Command {
    /// Parse a command from a JSON line.
    pub fn from_json(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Command name, as used in the `cmd` tag.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Purchase { .. } => "purchase",
            Self::Action { .. } => "action",
            Self::State { .. } => "state",
            Self::Status => "status",
            Self::Reconfigure { .. } => "reconfigure",
            Self::Stop => "stop",
        }
    }
}

// ============================================================================
// Output Responses (runner -> driver)
// ============================================================================

/// Responses written by the interactive runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Runner is ready to accept commands.
    Ready {
        version: String,
        mode: String,
        team_a: ControllerKind,
        team_b: ControllerKind,
    },

    /// Result of a purchase.
    Purchased { success: bool },

    /// Action accepted into a team's inbox.
    Queued { team: Team, pending: usize },

    /// State export.
    State { export: Box<StateExport> },

    /// Orchestrator status.
    Status(StatusReport),

    /// Decision sources replaced.
    Reconfigured {
        team_a: ControllerKind,
        team_b: ControllerKind,
    },

    /// Error processing a command.
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cmd: Option<String>,
    },

    /// The game has ended.
    GameOver {
        /// Winning team, absent on a draw.
        winner: Option<Team>,
        condition: Option<EndCondition>,
        turns: u32,
        final_hash: u64,
    },

    /// Runner is exiting.
    Bye { turns: u32 },
}

impl Response {
    /// Create a ready response.
    #[must_use]
    pub fn ready(mode: &str, controllers: [ControllerKind; 2]) -> Self {
        Self::Ready {
            version: PROTOCOL_VERSION.to_string(),
            mode: mode.to_string(),
            team_a: controllers[0],
            team_b: controllers[1],
        }
    }

    /// Create an error response.
    pub fn error(message: impl Into<String>, cmd: Option<&str>) -> Self {
        Self::Error {
            message: message.into(),
            cmd: cmd.map(String::from),
        }
    }

    /// Create a game over response.
    #[must_use]
    pub fn game_over(summary: &RunSummary) -> Self {
        Self::GameOver {
            winner: summary.outcome.and_then(|o| o.winner),
            condition: summary.outcome.map(|o| o.condition),
            turns: summary.turns,
            final_hash: summary.final_hash,
        }
    }

    /// Serialize to a JSON line (with newline).
    #[must_use]
    pub fn to_json_line(&self) -> String {
        let mut json = serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"type":"error","message":"serialization failed"}"#.to_string());
        json.push('\n');
        json
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_purchase() {
        let cmd = Command::from_json(r#"{"cmd":"purchase","team":1,"unit_kind":"archer","base":2}"#)
            .unwrap();
        assert_eq!(
            cmd,
            Command::Purchase {
                team: Team::B,
                unit_kind: UnitKind::Archer,
                base: 2
            }
        );
    }

    #[test]
    fn test_purchase_base_defaults_to_first() {
        let cmd = Command::from_json(r#"{"cmd":"purchase","team":0,"unit_kind":"cavalry"}"#).unwrap();
        assert!(matches!(cmd, Command::Purchase { base: 0, .. }));
    }

    #[test]
    fn test_parse_action() {
        let cmd = Command::from_json(
            r#"{"cmd":"action","team":0,"action":{"action_type":1,"base_id":0,"unit_type":4}}"#,
        )
        .unwrap();
        match cmd {
            Command::Action { team, action } => {
                assert_eq!(team, Team::A);
                assert_eq!(
                    action,
                    Action::Spawn {
                        base_index: 0,
                        unit_type: 4
                    }
                );
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_reconfigure_and_simple() {
        let cmd =
            Command::from_json(r#"{"cmd":"reconfigure","team_a":"heuristic","team_b":"external"}"#)
                .unwrap();
        assert_eq!(cmd.name(), "reconfigure");
        assert_eq!(Command::from_json(r#"{"cmd":"stop"}"#).unwrap(), Command::Stop);
        assert_eq!(Command::from_json(r#"{"cmd":"status"}"#).unwrap(), Command::Status);
    }

    #[test]
    fn test_reject_unknown() {
        assert!(Command::from_json(r#"{"cmd":"teleport"}"#).is_err());
        assert!(Command::from_json(r#"{"cmd":"state","team":5}"#).is_err());
        assert!(Command::from_json("not json").is_err());
    }

    #[test]
    fn test_response_lines() {
        let line = Response::ready("interactive", [ControllerKind::Human, ControllerKind::Heuristic])
            .to_json_line();
        assert!(line.ends_with('\n'));
        assert!(line.contains(r#""type":"ready""#));
        assert!(line.contains(r#""team_a":"human""#));

        let error = Response::error("bad", Some("state")).to_json_line();
        assert!(error.contains(r#""cmd":"state""#));

        let purchased = Response::Purchased { success: false }.to_json_line();
        assert_eq!(purchased, "{\"type\":\"purchased\",\"success\":false}\n");
    }
}
