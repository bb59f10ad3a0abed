//! Game metrics collection for balance analysis.
//!
//! [`MetricsCollector`] digests the [`TurnReport`]s of one game into
//! [`GameMetrics`]; [`BatchSummary`] aggregates many games.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use skirmish_core::action::ActionOutcome;
use skirmish_core::engine::TurnReport;
use skirmish_core::events::EventKind;
use skirmish_core::team::Team;
use skirmish_core::unit::{UnitId, UnitKind};
use skirmish_core::world::{EndCondition, Outcome, World};

/// Stable key of a team in metric maps.
#[must_use]
pub const fn team_key(team: Team) -> &'static str {
    match team {
        Team::A => "team_a",
        Team::B => "team_b",
    }
}

/// Stable name of an end condition.
#[must_use]
pub const fn condition_name(condition: EndCondition) -> &'static str {
    match condition {
        EndCondition::TimeLimit => "time_limit",
        EndCondition::Elimination => "elimination",
        EndCondition::MutualElimination => "mutual_elimination",
    }
}

/// Complete metrics for a single game.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameMetrics {
    /// Unique game identifier.
    pub game_id: String,
    /// Scenario label.
    pub scenario: String,
    /// Random seed used.
    pub seed: u64,
    /// Turns played.
    pub duration_turns: u32,
    /// Winning team key (None = draw or unfinished).
    pub winner: Option<String>,
    /// How the game ended.
    pub win_condition: String,
    /// Per-team metrics.
    pub teams: HashMap<String, TeamMetrics>,
    /// Timed events log.
    pub events: Vec<TimedEvent>,
    /// Final world state hash (for determinism validation).
    pub final_state_hash: u64,
}

impl GameMetrics {
    /// Create a new game metrics instance.
    #[must_use]
    pub fn new(game_id: impl Into<String>, scenario: impl Into<String>, seed: u64) -> Self {
        Self {
            game_id: game_id.into(),
            scenario: scenario.into(),
            seed,
            ..Default::default()
        }
    }

    /// Get or create team metrics.
    pub fn team_mut(&mut self, team: Team) -> &mut TeamMetrics {
        self.teams
            .entry(team_key(team).to_string())
            .or_insert_with(|| TeamMetrics::new(team))
    }

    /// Metrics of one team, if anything was recorded for it.
    #[must_use]
    pub fn team(&self, team: Team) -> Option<&TeamMetrics> {
        self.teams.get(team_key(team))
    }

    /// Record a timed event.
    pub fn record_event(&mut self, turn: u32, event_type: EventType, team: Team, details: &str) {
        self.events.push(TimedEvent {
            turn,
            event_type,
            team: team_key(team).to_string(),
            details: details.to_string(),
        });
    }

    /// Winning team, decoded from its key.
    #[must_use]
    pub fn winning_team(&self) -> Option<Team> {
        let winner = self.winner.as_deref()?;
        Team::ALL.into_iter().find(|t| team_key(*t) == winner)
    }

    /// Finalize the game with outcome.
    pub fn finalize(&mut self, duration: u32, outcome: Option<Outcome>) {
        self.duration_turns = duration;
        match outcome {
            Some(outcome) => {
                self.winner = outcome.winner.map(|t| team_key(t).to_string());
                self.win_condition = condition_name(outcome.condition).to_string();
            }
            None => {
                self.winner = None;
                self.win_condition = "unfinished".to_string();
            }
        }
    }
}

/// Metrics for a single team in a game.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamMetrics {
    /// Team key.
    pub team: String,

    // === Economy ===
    /// Energy received from income and kill rewards.
    pub energy_earned: i64,
    /// Energy spent on units.
    pub energy_spent: i64,
    /// Energy credited by kills.
    pub kill_rewards: i64,
    /// Energy left at the end.
    pub final_energy: i32,

    // === Military ===
    /// Units bought by kind.
    pub units_produced: HashMap<String, u32>,
    /// Units lost by kind.
    pub units_lost: HashMap<String, u32>,
    /// Enemy units killed by kind.
    pub units_killed: HashMap<String, u32>,
    /// Enemy bases destroyed.
    pub bases_destroyed: u32,
    /// Own bases lost.
    pub bases_lost: u32,
    /// Own base hp left at the end.
    pub remaining_base_hp: i32,

    // === Combat ===
    /// Damage dealt to enemy units.
    pub unit_damage_dealt: i64,
    /// Damage taken by own units.
    pub unit_damage_taken: i64,
    /// Damage dealt to enemy bases.
    pub base_damage_dealt: i64,
    /// Damage taken by own bases.
    pub base_damage_taken: i64,
    /// Hp restored by doctors.
    pub heal_done: i64,
    /// Kill/death ratio.
    pub kd_ratio: f64,

    // === Timing ===
    /// Turn of the first attack on the enemy.
    pub first_attack_turn: Option<u32>,
    /// Turn of the first purchase.
    pub first_purchase_turn: Option<u32>,
    /// Maximum living units at once.
    pub peak_army_size: u32,
}

impl TeamMetrics {
    /// Create new team metrics.
    #[must_use]
    pub fn new(team: Team) -> Self {
        Self {
            team: team_key(team).to_string(),
            ..Default::default()
        }
    }

    /// Record a unit purchase.
    pub fn record_unit_produced(&mut self, kind: UnitKind) {
        *self.units_produced.entry(kind.name().to_string()).or_default() += 1;
        self.energy_spent += i64::from(kind.cost());
    }

    /// Record a unit death.
    pub fn record_unit_lost(&mut self, kind: UnitKind) {
        *self.units_lost.entry(kind.name().to_string()).or_default() += 1;
    }

    /// Record an enemy unit kill.
    pub fn record_unit_killed(&mut self, kind: UnitKind, reward: i32) {
        *self.units_killed.entry(kind.name().to_string()).or_default() += 1;
        self.kill_rewards += i64::from(reward);
    }

    /// Total units bought.
    #[must_use]
    pub fn total_produced(&self) -> u32 {
        self.units_produced.values().sum()
    }

    /// Calculate final stats.
    pub fn calculate_derived_stats(&mut self) {
        let total_killed: u32 = self.units_killed.values().sum();
        let total_lost: u32 = self.units_lost.values().sum();
        // Kept finite so results survive a JSON round trip.
        self.kd_ratio = if total_lost > 0 || total_killed > 0 {
            f64::from(total_killed) / f64::from(total_lost.max(1))
        } else {
            1.0
        };
    }

    fn update_peak_army(&mut self, size: usize) {
        self.peak_army_size = self.peak_army_size.max(size as u32);
    }
}

/// A timed event during the game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedEvent {
    /// Turn when the event occurred.
    pub turn: u32,
    /// Type of event.
    pub event_type: EventType,
    /// Team involved.
    pub team: String,
    /// Event details.
    pub details: String,
}

/// Types of events that can be recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// Unit was bought.
    UnitProduced,
    /// Unit was killed.
    UnitKilled,
    /// Base was destroyed.
    BaseDestroyed,
    /// First attack on the enemy.
    FirstAttack,
    /// The game ended.
    GameOver,
}

/// Summary statistics across multiple games.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Total games played.
    pub total_games: u32,
    /// Games won by each team.
    pub wins_by_team: HashMap<String, u32>,
    /// Win rates by team.
    pub win_rates: HashMap<String, f64>,
    /// Average game duration in turns.
    pub avg_duration_turns: f64,
    /// Shortest game.
    pub min_duration_turns: u32,
    /// Longest game.
    pub max_duration_turns: u32,
    /// Draws count.
    pub draws: u32,
    /// Games decided at the turn limit.
    pub time_limit_games: u32,

    // === Aggregated Stats ===
    /// Average units bought per game by team.
    pub avg_units_produced: HashMap<String, f64>,
    /// Average energy spent per game by team.
    pub avg_energy_spent: HashMap<String, f64>,
    /// Average K/D ratio by team.
    pub avg_kd_ratio: HashMap<String, f64>,
    /// First attack timing (team -> avg turn).
    pub avg_first_attack_turn: HashMap<String, f64>,
}

impl BatchSummary {
    /// Calculate summary from a list of game metrics.
    #[must_use]
    pub fn from_games(games: &[GameMetrics]) -> Self {
        if games.is_empty() {
            return Self::default();
        }

        let mut summary = Self {
            total_games: games.len() as u32,
            ..Default::default()
        };

        let mut duration_sum = 0u64;
        let mut min_duration = u32::MAX;
        let mut max_duration = 0u32;

        let mut team_units: HashMap<String, Vec<u32>> = HashMap::new();
        let mut team_spent: HashMap<String, Vec<i64>> = HashMap::new();
        let mut team_kd: HashMap<String, Vec<f64>> = HashMap::new();
        let mut team_first_attack: HashMap<String, Vec<u32>> = HashMap::new();

        for game in games {
            duration_sum += u64::from(game.duration_turns);
            min_duration = min_duration.min(game.duration_turns);
            max_duration = max_duration.max(game.duration_turns);

            if let Some(winner) = &game.winner {
                *summary.wins_by_team.entry(winner.clone()).or_default() += 1;
            } else {
                summary.draws += 1;
            }
            if game.win_condition == condition_name(EndCondition::TimeLimit) {
                summary.time_limit_games += 1;
            }

            for (key, team) in &game.teams {
                team_units.entry(key.clone()).or_default().push(team.total_produced());
                team_spent.entry(key.clone()).or_default().push(team.energy_spent);
                team_kd.entry(key.clone()).or_default().push(team.kd_ratio);
                if let Some(turn) = team.first_attack_turn {
                    team_first_attack.entry(key.clone()).or_default().push(turn);
                }
            }
        }

        summary.avg_duration_turns = duration_sum as f64 / games.len() as f64;
        summary.min_duration_turns = min_duration;
        summary.max_duration_turns = max_duration;

        for (team, wins) in &summary.wins_by_team {
            summary
                .win_rates
                .insert(team.clone(), f64::from(*wins) / f64::from(summary.total_games));
        }

        for (team, values) in team_units {
            let avg = f64::from(values.iter().sum::<u32>()) / values.len() as f64;
            summary.avg_units_produced.insert(team, avg);
        }

        for (team, values) in team_spent {
            let avg = values.iter().sum::<i64>() as f64 / values.len() as f64;
            summary.avg_energy_spent.insert(team, avg);
        }

        for (team, values) in team_kd {
            let finite: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
            let avg = finite.iter().sum::<f64>() / finite.len().max(1) as f64;
            summary.avg_kd_ratio.insert(team, avg);
        }

        for (team, values) in team_first_attack {
            let avg = values.iter().map(|&t| f64::from(t)).sum::<f64>() / values.len() as f64;
            summary.avg_first_attack_turn.insert(team, avg);
        }

        summary
    }

    /// Check if team balance is within acceptable range.
    #[must_use]
    pub fn is_balanced(&self, threshold: f64) -> bool {
        self.win_rates.values().all(|rate| (rate - 0.5).abs() <= threshold)
    }

    /// Get the dominant team (if any).
    #[must_use]
    pub fn dominant_team(&self, threshold: f64) -> Option<&String> {
        self.win_rates
            .iter()
            .find(|(_, rate)| **rate > 0.5 + threshold)
            .map(|(team, _)| team)
    }
}

/// Metrics collector that digests turn reports during a game.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    metrics: GameMetrics,
    current_turn: u32,
    /// Kind and team of every unit seen, for attributing kills.
    roster: HashMap<UnitId, (Team, UnitKind)>,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    #[must_use]
    pub fn new(game_id: &str, scenario: &str, seed: u64) -> Self {
        let mut metrics = GameMetrics::new(game_id, scenario, seed);
        for team in Team::ALL {
            metrics.team_mut(team);
        }
        Self {
            metrics,
            current_turn: 0,
            roster: HashMap::new(),
        }
    }

    /// Remember the units already on the field, e.g. placed by a scenario.
    pub fn track_units(&mut self, world: &World) {
        for unit in world.living_units() {
            self.roster.entry(unit.id).or_insert((unit.team, unit.kind));
        }
    }

    /// Digest one turn. `world` is the state after the turn.
    pub fn observe_turn(&mut self, report: &TurnReport, world: &World) {
        self.current_turn = report.turn;

        for decision in &report.decisions {
            if let ActionOutcome::Spawned { unit_id, kind, .. } = decision.outcome {
                self.roster.insert(unit_id, (decision.team, kind));
                let metrics = self.metrics.team_mut(decision.team);
                metrics.record_unit_produced(kind);
                metrics.first_purchase_turn.get_or_insert(report.turn);
                self.metrics
                    .record_event(report.turn, EventType::UnitProduced, decision.team, kind.name());
            }
        }

        for event in &report.events {
            let Some(team) = event.team else {
                continue;
            };
            match event.kind {
                EventKind::Attack => {
                    let damage = i64::from(event.damage);
                    self.metrics.team_mut(team).unit_damage_dealt += damage;
                    self.metrics.team_mut(team.opponent()).unit_damage_taken += damage;
                    self.on_first_attack(team);
                }
                EventKind::Kill => {
                    let victim = event.target_id.and_then(|id| self.roster.get(&id).copied());
                    if let Some((victim_team, kind)) = victim {
                        self.metrics.team_mut(team).record_unit_killed(kind, event.reward_energy);
                        self.metrics.team_mut(victim_team).record_unit_lost(kind);
                        self.metrics
                            .record_event(report.turn, EventType::UnitKilled, victim_team, kind.name());
                    }
                }
                EventKind::BaseDamaged => {
                    // `team` owns the damaged base.
                    let damage = i64::from(event.damage);
                    self.metrics.team_mut(team).base_damage_taken += damage;
                    self.metrics.team_mut(team.opponent()).base_damage_dealt += damage;
                    self.on_first_attack(team.opponent());
                    let destroyed = event
                        .base_id
                        .and_then(|id| world.base(id))
                        .is_some_and(|b| !b.is_alive());
                    if destroyed {
                        self.on_base_destroyed(team, event.base_id);
                    }
                }
                EventKind::GameOver => {
                    self.metrics
                        .record_event(report.turn, EventType::GameOver, team, &event.description);
                }
                EventKind::Spawn | EventKind::Move => {}
            }
        }

        for team in Team::ALL {
            let heal = i64::from(report.heal_totals[team.index()]);
            let metrics = self.metrics.team_mut(team);
            metrics.heal_done += heal;
            metrics.update_peak_army(world.living_unit_count(team));
        }
    }

    fn on_first_attack(&mut self, team: Team) {
        let turn = self.current_turn;
        let metrics = self.metrics.team_mut(team);
        if metrics.first_attack_turn.is_none() {
            metrics.first_attack_turn = Some(turn);
            self.metrics
                .record_event(turn, EventType::FirstAttack, team, "First attack");
        }
    }

    fn on_base_destroyed(&mut self, owner: Team, base_id: Option<usize>) {
        // Several hits in the same turn may each see the base dead.
        let details = format!("base {}", base_id.unwrap_or_default());
        let already = self.metrics.events.iter().any(|e| {
            e.event_type == EventType::BaseDestroyed && e.team == team_key(owner) && e.details == details
        });
        if already {
            return;
        }
        self.metrics.team_mut(owner).bases_lost += 1;
        self.metrics.team_mut(owner.opponent()).bases_destroyed += 1;
        self.metrics
            .record_event(self.current_turn, EventType::BaseDestroyed, owner, &details);
    }

    /// Finalize against the final world and return the metrics.
    #[must_use]
    pub fn finalize(mut self, world: &World) -> GameMetrics {
        for team in Team::ALL {
            let economy = world.economy(team);
            let metrics = self.metrics.team_mut(team);
            metrics.final_energy = economy.energy();
            metrics.energy_earned = economy.total_earned;
            metrics.remaining_base_hp = world.total_base_hp(team);
            metrics.calculate_derived_stats();
        }
        self.metrics.finalize(world.turn(), world.outcome());
        self.metrics.final_state_hash = world.state_hash();
        self.metrics
    }

    /// Get current metrics (immutable).
    #[must_use]
    pub fn current(&self) -> &GameMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_core::config::GameConfig;
    use skirmish_core::decision::{Controllers, HumanSource};
    use skirmish_core::engine::TurnEngine;
    use skirmish_core::map::GameMap;
    use skirmish_core::math::Position;
    use skirmish_core::rng::seeded_rng;

    fn open_engine() -> TurnEngine {
        let config = GameConfig::default();
        let map = GameMap::new(config.map.size);
        TurnEngine::from_world(World::with_map(config, map).unwrap(), seeded_rng(1))
    }

    fn idle_controllers() -> Controllers {
        Controllers::new(Box::new(HumanSource::default()), Box::new(HumanSource::default()))
    }

    #[test]
    fn test_game_metrics_new() {
        let metrics = GameMetrics::new("game_001", "skirmish", 12345);
        assert_eq!(metrics.game_id, "game_001");
        assert_eq!(metrics.seed, 12345);
    }

    #[test]
    fn test_winning_team_from_outcome() {
        let mut metrics = GameMetrics::new("game_002", "skirmish", 7);
        assert_eq!(metrics.winning_team(), None);

        metrics.finalize(120, Some(Outcome::victory(Team::B, EndCondition::Elimination)));
        assert_eq!(metrics.winning_team(), Some(Team::B));
        assert_eq!(metrics.win_condition, "elimination");

        metrics.finalize(90, Some(Outcome::draw()));
        assert_eq!(metrics.winning_team(), None);
    }

    #[test]
    fn test_team_metrics_recording() {
        let mut team = TeamMetrics::new(Team::A);
        team.record_unit_produced(UnitKind::Infantry);
        team.record_unit_produced(UnitKind::Infantry);
        team.record_unit_killed(UnitKind::Archer, 40);

        assert_eq!(team.units_produced.get("Infantry"), Some(&2));
        assert_eq!(team.units_killed.get("Archer"), Some(&1));
        assert_eq!(team.energy_spent, 160);
        assert_eq!(team.kill_rewards, 40);
    }

    #[test]
    fn test_kd_ratio_calculation() {
        let mut team = TeamMetrics::new(Team::B);
        team.record_unit_killed(UnitKind::Infantry, 40);
        team.record_unit_killed(UnitKind::Infantry, 40);
        team.record_unit_lost(UnitKind::Doctor);
        team.calculate_derived_stats();

        assert!((team.kd_ratio - 2.0).abs() < 0.001);
    }

    #[test]
    fn test_batch_summary() {
        let mut game1 = GameMetrics::new("g1", "test", 1);
        game1.winner = Some("team_a".to_string());
        game1.duration_turns = 100;

        let mut game2 = GameMetrics::new("g2", "test", 2);
        game2.winner = Some("team_b".to_string());
        game2.duration_turns = 200;

        let mut game3 = GameMetrics::new("g3", "test", 3);
        game3.duration_turns = 300;

        let summary = BatchSummary::from_games(&[game1, game2, game3]);

        assert_eq!(summary.total_games, 3);
        assert_eq!(summary.wins_by_team.get("team_a"), Some(&1));
        assert_eq!(summary.draws, 1);
        assert_eq!(summary.min_duration_turns, 100);
        assert_eq!(summary.max_duration_turns, 300);
        assert!((summary.avg_duration_turns - 200.0).abs() < 0.001);
    }

    #[test]
    fn test_balance_check() {
        let mut summary = BatchSummary::default();
        summary.win_rates.insert("team_a".to_string(), 0.52);
        summary.win_rates.insert("team_b".to_string(), 0.48);

        assert!(summary.is_balanced(0.1));
        assert!(!summary.is_balanced(0.01));
        assert_eq!(summary.dominant_team(0.01).map(String::as_str), Some("team_a"));
    }

    #[test]
    fn test_collector_attributes_kills() {
        let mut engine = open_engine();
        engine
            .world_mut()
            .spawn_unit(Team::A, UnitKind::Archer, Position::new(30, 30));
        let archer = engine
            .world_mut()
            .spawn_unit(Team::B, UnitKind::Archer, Position::new(32, 30));
        engine.world_mut().unit_mut(archer).unwrap().set_hp(1);

        let mut collector = MetricsCollector::new("g", "test", 1);
        collector.track_units(engine.world());
        let mut controllers = idle_controllers();
        let report = engine.process_turn(&mut controllers);
        collector.observe_turn(&report, engine.world());

        let metrics = collector.finalize(engine.world());
        let a = metrics.team(Team::A).unwrap();
        let b = metrics.team(Team::B).unwrap();
        assert_eq!(a.units_killed.get("Archer"), Some(&1));
        assert_eq!(b.units_lost.get("Archer"), Some(&1));
        assert_eq!(a.kill_rewards, 40);
        assert_eq!(a.first_attack_turn, Some(0));
        assert_eq!(metrics.win_condition, "unfinished");
    }

    #[test]
    fn test_collector_counts_purchases() {
        let mut engine = open_engine();
        let mut collector = MetricsCollector::new("g", "test", 1);
        let inbox = skirmish_core::decision::ActionInbox::new();
        inbox.push(skirmish_core::action::Action::spawn(0, UnitKind::Cavalry));
        let mut controllers = Controllers::new(
            Box::new(HumanSource::new(inbox)),
            Box::new(HumanSource::default()),
        );

        let report = engine.process_turn(&mut controllers);
        collector.observe_turn(&report, engine.world());

        let metrics = collector.current();
        let a = metrics.team(Team::A).unwrap();
        assert_eq!(a.units_produced.get("Cavalry"), Some(&1));
        assert_eq!(a.energy_spent, 100);
        assert_eq!(a.first_purchase_turn, Some(0));
        assert_eq!(a.peak_army_size, 1);
    }
}
