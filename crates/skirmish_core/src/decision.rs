//! Pluggable decision sources.
//!
//! Each team's purchases come from a [`DecisionSource`]. The engine polls it
//! up to the per-turn cap, executes every returned action immediately and
//! reports the outcome back before asking again.
//!
//! Sources shipped here need no IO: the rule-based [`HeuristicSource`], the
//! queue-backed [`HumanSource`] and the recording-backed [`ReplaySource`].
//! Process-backed policies live with the orchestrator.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionOutcome};
use crate::export::StateExport;
use crate::heuristics::PurchaseQueue;
use crate::rng::GameRng;
use crate::team::Team;
use crate::world::World;

/// Who controls a team's purchases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerKind {
    /// Actions queued by a person through the command interface.
    Human,
    /// An external policy process.
    External,
    /// The built-in rule-based agent.
    Heuristic,
}

impl ControllerKind {
    /// Lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::External => "external",
            Self::Heuristic => "heuristic",
        }
    }
}

impl std::fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ControllerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "external" | "policy" | "ai_policy" => Ok(Self::External),
            "heuristic" | "rule" | "ai_rule" => Ok(Self::Heuristic),
            other => Err(format!("unknown controller '{other}'")),
        }
    }
}

/// What a source sees when asked for a decision.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'w> {
    /// Current world.
    pub world: &'w World,
    /// Team being polled.
    pub team: Team,
    /// Zero-based poll number within this turn.
    pub attempt: u32,
    /// Heal figures of the previous combat, for the state export.
    pub heal_totals: [i32; 2],
}

impl DecisionContext<'_> {
    /// Team-relative state export.
    #[must_use]
    pub fn export(&self) -> StateExport {
        StateExport::capture(self.world, self.team, self.heal_totals)
    }
}

/// Origin of one team's purchase decisions.
pub trait DecisionSource: Send {
    /// Return the next action. Sources that cannot answer return
    /// [`Action::Wait`].
    fn decide(&mut self, ctx: &DecisionContext<'_>, rng: &mut GameRng) -> Action;

    /// Learn how the last action went.
    fn observe_outcome(&mut self, _action: &Action, _outcome: &ActionOutcome, _rng: &mut GameRng) {}

    /// Controller category.
    fn kind(&self) -> ControllerKind;
}

/// The rule-based agent.
#[derive(Debug, Clone)]
pub struct HeuristicSource {
    queue: PurchaseQueue,
}

impl HeuristicSource {
    /// Agent with a freshly seeded purchase queue.
    #[must_use]
    pub fn new(rng: &mut GameRng) -> Self {
        Self {
            queue: PurchaseQueue::new(rng),
        }
    }

    /// Agent with a fixed purchase plan.
    #[must_use]
    pub const fn with_queue(queue: PurchaseQueue) -> Self {
        Self { queue }
    }

    /// Current plan.
    #[must_use]
    pub const fn queue(&self) -> &PurchaseQueue {
        &self.queue
    }
}

impl DecisionSource for HeuristicSource {
    fn decide(&mut self, ctx: &DecisionContext<'_>, rng: &mut GameRng) -> Action {
        self.queue.decide(ctx.world, ctx.team, rng)
    }

    fn observe_outcome(&mut self, action: &Action, outcome: &ActionOutcome, rng: &mut GameRng) {
        if !action.is_wait() && matches!(outcome, ActionOutcome::Spawned { .. }) {
            self.queue.advance(rng);
        }
    }

    fn kind(&self) -> ControllerKind {
        ControllerKind::Heuristic
    }
}

/// Thread-safe queue of actions waiting to be polled.
#[derive(Debug, Clone, Default)]
pub struct ActionInbox {
    queue: Arc<Mutex<VecDeque<Action>>>,
}

impl ActionInbox {
    /// Empty inbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an action for the next poll.
    pub fn push(&self, action: Action) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(action);
    }

    /// Take the oldest queued action.
    #[must_use]
    pub fn pop(&self) -> Option<Action> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Number of queued actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything queued.
    pub fn clear(&self) {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Actions entered by a person, drained one per poll.
#[derive(Debug, Clone, Default)]
pub struct HumanSource {
    inbox: ActionInbox,
}

impl HumanSource {
    /// Source reading from `inbox`.
    #[must_use]
    pub const fn new(inbox: ActionInbox) -> Self {
        Self { inbox }
    }

    /// Handle for queueing actions from another thread.
    #[must_use]
    pub fn inbox(&self) -> ActionInbox {
        self.inbox.clone()
    }
}

impl DecisionSource for HumanSource {
    fn decide(&mut self, _ctx: &DecisionContext<'_>, _rng: &mut GameRng) -> Action {
        self.inbox.pop().unwrap_or(Action::Wait)
    }

    fn kind(&self) -> ControllerKind {
        ControllerKind::Human
    }
}

/// One polled decision, as recorded for replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedDecision {
    /// Turn of the poll.
    pub turn: u32,
    /// Polled team.
    pub team: Team,
    /// Returned action.
    pub action: Action,
    /// True for purchases made through the direct entry point between
    /// turns rather than by polling.
    pub direct: bool,
}

/// Plays back recorded decisions of one team.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    team: Team,
    original: ControllerKind,
    pending: VecDeque<RecordedDecision>,
}

impl ReplaySource {
    /// Source replaying the polled decisions of `team` from `decisions`.
    #[must_use]
    pub fn new(team: Team, original: ControllerKind, decisions: &[RecordedDecision]) -> Self {
        let pending = decisions
            .iter()
            .filter(|d| d.team == team && !d.direct)
            .copied()
            .collect();
        Self {
            team,
            original,
            pending,
        }
    }

    /// Decisions not yet replayed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl DecisionSource for ReplaySource {
    fn decide(&mut self, ctx: &DecisionContext<'_>, _rng: &mut GameRng) -> Action {
        debug_assert_eq!(ctx.team, self.team);
        match self.pending.front() {
            Some(next) if next.turn == ctx.world.turn() => {
                self.pending.pop_front().map_or(Action::Wait, |d| d.action)
            }
            _ => Action::Wait,
        }
    }

    fn kind(&self) -> ControllerKind {
        self.original
    }
}

/// Both teams' decision sources.
pub struct Controllers {
    sources: [Box<dyn DecisionSource>; 2],
}

impl Controllers {
    /// Pair of sources, team A first.
    #[must_use]
    pub fn new(team_a: Box<dyn DecisionSource>, team_b: Box<dyn DecisionSource>) -> Self {
        Self {
            sources: [team_a, team_b],
        }
    }

    /// Two heuristic agents, seeded in team order.
    #[must_use]
    pub fn heuristic(rng: &mut GameRng) -> Self {
        let a = HeuristicSource::new(rng);
        let b = HeuristicSource::new(rng);
        Self::new(Box::new(a), Box::new(b))
    }

    /// Source of `team`.
    pub fn get_mut(&mut self, team: Team) -> &mut dyn DecisionSource {
        self.sources[team.index()].as_mut()
    }

    /// Controller category of `team`.
    #[must_use]
    pub fn kind(&self, team: Team) -> ControllerKind {
        self.sources[team.index()].kind()
    }

    /// Swap in a new source for `team`, returning the old one.
    pub fn replace(&mut self, team: Team, source: Box<dyn DecisionSource>) -> Box<dyn DecisionSource> {
        std::mem::replace(&mut self.sources[team.index()], source)
    }
}

impl std::fmt::Debug for Controllers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controllers")
            .field("team_a", &self.kind(Team::A))
            .field("team_b", &self.kind(Team::B))
            .finish()
    }
}
