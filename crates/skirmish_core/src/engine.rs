//! The turn engine.
//!
//! [`TurnEngine`] advances the world one turn at a time in a fixed phase
//! order:
//!
//! 1. income for both teams
//! 2. vision refresh
//! 3. training snapshot of team B (when enabled)
//! 4. team A decisions, then team B decisions
//! 5. movement of every living unit in id order
//! 6. combat
//! 7. removal of dead units
//! 8. end-of-game check
//! 9. turn counter increment
//!
//! All randomness comes from the engine's seeded generator, so a run is a
//! pure function of its configuration, its seed and the actions its
//! decision sources return.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::action::{apply_action, Action, ActionOutcome};
use crate::combat::resolve_combat;
use crate::config::GameConfig;
use crate::decision::{ControllerKind, Controllers, DecisionContext, RecordedDecision};
use crate::error::Result;
use crate::events::{EventKind, GameEvent};
use crate::export::StateExport;
use crate::heuristics::process_unit_behavior;
use crate::rng::{seeded_rng, GameRng};
use crate::team::Team;
use crate::unit::UnitKind;
use crate::world::{EndCondition, Outcome, World};

/// One executed decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Polled team.
    pub team: Team,
    /// Action returned by the source.
    pub action: Action,
    /// What happened when it was executed.
    pub outcome: ActionOutcome,
}

/// Everything that happened during one turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnReport {
    /// Turn number the report belongs to.
    pub turn: u32,
    /// Spawns, moves, attacks, kills, base damage and game over, in order.
    pub events: Vec<GameEvent>,
    /// Hp restored by doctors, indexed by team.
    pub heal_totals: [i32; 2],
    /// Executed decisions in polling order.
    pub decisions: Vec<DecisionRecord>,
    /// Last successful non-wait action per team, `Wait` if none.
    pub applied_actions: [Action; 2],
    /// Team B's view before its decisions, when snapshots are enabled.
    pub training_state: Option<StateExport>,
    /// Number of units that changed cell.
    pub units_moved: usize,
    /// Units removed after combat.
    pub units_removed: usize,
    /// Set on the turn the game ended.
    pub outcome: Option<Outcome>,
}

impl TurnReport {
    /// Events of one kind.
    pub fn events_of(&self, kind: EventKind) -> impl Iterator<Item = &GameEvent> + '_ {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    /// Number of units bought by `team`.
    #[must_use]
    pub fn spawns_by(&self, team: Team) -> usize {
        self.decisions
            .iter()
            .filter(|d| d.team == team && matches!(d.outcome, ActionOutcome::Spawned { .. }))
            .count()
    }
}

/// Drives a [`World`] turn by turn.
#[derive(Debug, Clone)]
pub struct TurnEngine {
    world: World,
    rng: GameRng,
    heal_totals: [i32; 2],
    record: bool,
    history: Vec<RecordedDecision>,
    training_snapshots: bool,
}

impl TurnEngine {
    /// Engine over a freshly generated world.
    ///
    /// The generator is seeded from `config.seed` and used first for map
    /// generation.
    ///
    /// # Errors
    ///
    /// Fails if a configured base lies outside the map.
    ///
    /// # Example
    ///
    /// ```
    /// use skirmish_core::config::GameConfig;
    /// use skirmish_core::decision::Controllers;
    /// use skirmish_core::engine::TurnEngine;
    ///
    /// let mut engine = TurnEngine::new(GameConfig::default().with_seed(7)).unwrap();
    /// let mut controllers = Controllers::heuristic(engine.rng_mut());
    /// let report = engine.process_turn(&mut controllers);
    /// assert_eq!(report.turn, 0);
    /// assert_eq!(engine.turn(), 1);
    /// ```
    pub fn new(config: GameConfig) -> Result<Self> {
        let mut rng = seeded_rng(config.seed);
        let world = World::new(config, &mut rng)?;
        Ok(Self::from_world(world, rng))
    }

    /// Engine over an existing world.
    #[must_use]
    pub const fn from_world(world: World, rng: GameRng) -> Self {
        Self {
            world,
            rng,
            heal_totals: [0, 0],
            record: false,
            history: Vec::new(),
            training_snapshots: false,
        }
    }

    /// Record every polled decision for replay.
    #[must_use]
    pub const fn with_recording(mut self, record: bool) -> Self {
        self.record = record;
        self
    }

    /// Capture team B's state export each turn.
    #[must_use]
    pub const fn with_training_snapshots(mut self, enabled: bool) -> Self {
        self.training_snapshots = enabled;
        self
    }

    /// Current world.
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Mutable world, for scenario setup.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The engine's generator.
    pub fn rng_mut(&mut self) -> &mut GameRng {
        &mut self.rng
    }

    /// Current turn.
    #[must_use]
    pub const fn turn(&self) -> u32 {
        self.world.turn()
    }

    /// Whether the game has ended.
    #[must_use]
    pub const fn is_game_over(&self) -> bool {
        self.world.is_game_over()
    }

    /// Heal figures of the last combat.
    #[must_use]
    pub const fn heal_totals(&self) -> [i32; 2] {
        self.heal_totals
    }

    /// Recorded decisions so far.
    #[must_use]
    pub fn history(&self) -> &[RecordedDecision] {
        &self.history
    }

    /// Take the recorded decisions, leaving the log empty.
    pub fn take_history(&mut self) -> Vec<RecordedDecision> {
        std::mem::take(&mut self.history)
    }

    /// Hash of the world state.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        self.world.state_hash()
    }

    /// Team-relative export of the current state.
    #[must_use]
    pub fn export_state(&self, team: Team) -> StateExport {
        StateExport::capture(&self.world, team, self.heal_totals)
    }

    /// Execute one action for `team` with the engine's generator.
    pub fn execute_action(&mut self, team: Team, action: Action) -> ActionOutcome {
        apply_action(&mut self.world, team, action, &mut self.rng)
    }

    /// Buy a unit at a team base outside of polling, as a person at the
    /// controls would between turns.
    ///
    /// Returns false if the base index is unknown or the purchase failed.
    pub fn purchase_direct(&mut self, team: Team, kind: UnitKind, base_index: usize) -> bool {
        let Some(base_pos) = self
            .world
            .team_base_id(team, base_index)
            .and_then(|id| self.world.base(id))
            .map(|b| b.position)
        else {
            return false;
        };
        let bought = self.world.purchase(team, kind, base_pos);
        if bought && self.record {
            self.history.push(RecordedDecision {
                turn: self.world.turn(),
                team,
                action: Action::spawn(i32::try_from(base_index).unwrap_or(-1), kind),
                direct: true,
            });
        }
        bought
    }

    /// Advance the game by one turn.
    ///
    /// Does nothing once the game is over; the returned report is then empty.
    pub fn process_turn(&mut self, controllers: &mut Controllers) -> TurnReport {
        let turn = self.world.turn();
        let mut report = TurnReport {
            turn,
            ..TurnReport::default()
        };
        if self.world.is_game_over() {
            return report;
        }

        let income = self.world.config().energy_per_turn;
        for team in Team::ALL {
            self.world.add_energy(team, income);
        }

        self.world.update_vision();

        if self.training_snapshots {
            report.training_state = Some(self.export_state(Team::B));
        }

        for team in Team::ALL {
            self.poll_team(team, controllers, &mut report);
        }

        for id in self.world.unit_ids() {
            if !self.world.unit(id).is_some_and(crate::unit::Unit::is_alive) {
                continue;
            }
            if let Some(relocation) = process_unit_behavior(&mut self.world, id, &mut self.rng) {
                trace!(unit = id, from = %relocation.from, to = %relocation.to, "Unit moved");
                let team = self.world.unit(id).map(|u| u.team);
                report.events.push(
                    GameEvent::new(
                        EventKind::Move,
                        team,
                        turn,
                        format!("Move {} -> {}", relocation.from, relocation.to),
                    )
                    .with_unit(id),
                );
                report.units_moved += 1;
            }
        }

        let combat = resolve_combat(&mut self.world);
        self.heal_totals = combat.heal_totals;
        report.heal_totals = combat.heal_totals;
        report.events.extend(combat.events);

        report.units_removed = self.world.remove_dead_units().len();

        if let Some(outcome) = self.check_end_conditions() {
            report.events.push(game_over_event(turn, outcome));
            report.outcome = Some(outcome);
        }

        debug!(
            turn,
            units_a = self.world.living_unit_count(Team::A),
            units_b = self.world.living_unit_count(Team::B),
            moved = report.units_moved,
            removed = report.units_removed,
            "Turn processed"
        );

        self.world.advance_turn();
        report
    }

    fn poll_team(&mut self, team: Team, controllers: &mut Controllers, report: &mut TurnReport) {
        let cap = self.world.config().purchases_per_turn;
        let snapshot_first = self.training_snapshots
            && team == Team::B
            && controllers.kind(team) == ControllerKind::External;

        for attempt in 0..cap {
            let ctx = DecisionContext {
                world: &self.world,
                team,
                attempt,
                heal_totals: self.heal_totals,
            };
            let pre_decision = (snapshot_first && attempt == 0).then(|| ctx.export());
            let source = controllers.get_mut(team);
            let action = source.decide(&ctx, &mut self.rng);

            if self.record {
                self.history.push(RecordedDecision {
                    turn: self.world.turn(),
                    team,
                    action,
                    direct: false,
                });
            }

            let outcome = apply_action(&mut self.world, team, action, &mut self.rng);
            source.observe_outcome(&action, &outcome, &mut self.rng);
            report.decisions.push(DecisionRecord {
                team,
                action,
                outcome,
            });

            if let ActionOutcome::Spawned {
                unit_id,
                base_index,
                kind,
            } = outcome
            {
                report.applied_actions[team.index()] = action;
                if pre_decision.is_some() {
                    report.training_state = pre_decision;
                }
                let mut event = GameEvent::new(
                    EventKind::Spawn,
                    Some(team),
                    report.turn,
                    format!("Spawn {}", kind.name()),
                )
                .with_unit(unit_id);
                if let Some(base_id) = self.world.team_base_id(team, base_index) {
                    event = event.with_base(base_id);
                }
                report.events.push(event);
            }

            if outcome.ends_polling() {
                break;
            }
        }
    }

    /// Decide whether the game ended this turn and latch the outcome.
    ///
    /// At the turn ceiling team A wins only with strictly more remaining
    /// base hp; ties go to team B. Otherwise a team without living bases
    /// loses, and if both lost their last bases the game is a draw.
    pub fn check_end_conditions(&mut self) -> Option<Outcome> {
        if self.world.is_game_over() {
            return None;
        }

        let outcome = if self.world.turn() >= self.world.config().max_turns {
            let hp_a = self.world.total_base_hp(Team::A);
            let hp_b = self.world.total_base_hp(Team::B);
            let winner = if hp_a > hp_b { Team::A } else { Team::B };
            Outcome::victory(winner, EndCondition::TimeLimit)
        } else {
            let a_alive = self.world.living_base_count(Team::A) > 0;
            let b_alive = self.world.living_base_count(Team::B) > 0;
            match (a_alive, b_alive) {
                (true, true) => return None,
                (false, false) => Outcome::draw(),
                (false, true) => Outcome::victory(Team::B, EndCondition::Elimination),
                (true, false) => Outcome::victory(Team::A, EndCondition::Elimination),
            }
        };

        info!(
            turn = self.world.turn(),
            winner = ?outcome.winner,
            condition = ?outcome.condition,
            "Game over"
        );
        self.world.set_game_over(outcome);
        Some(outcome)
    }
}

fn game_over_event(turn: u32, outcome: Outcome) -> GameEvent {
    let description = match (outcome.condition, outcome.winner) {
        (EndCondition::TimeLimit, Some(team)) => format!("Time limit reached - {team} wins"),
        (EndCondition::Elimination, Some(team)) => format!("Elimination - {team} wins"),
        _ => "All bases destroyed - draw".to_string(),
    };
    GameEvent::new(EventKind::GameOver, outcome.winner, turn, description)
}
