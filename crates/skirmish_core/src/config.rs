//! Game configuration.
//!
//! Every tunable constant of a match lives in [`GameConfig`]. The defaults
//! reproduce the standard 64x64, three-bases-per-team ruleset; configs can
//! also be loaded from RON files.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::economy::{ENERGY_PER_TURN, INITIAL_ENERGY};
use crate::error::Result;
use crate::map::MapConfig;
use crate::math::Position;
use crate::unit::BASE_MAX_HP;

/// Default turn ceiling.
pub const MAX_TURNS: u32 = 500;

/// Default cap on purchase decisions per team per turn.
pub const PURCHASES_PER_TURN: u32 = 3;

/// Chebyshev range within which teammates relay sightings.
pub const COMMUNICATION_RANGE: i32 = 15;

/// Manhattan range to an own living base that grants the home-field bonus.
pub const HOME_FIELD_RANGE: i32 = 6;

/// Complete configuration of one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Terrain generation.
    pub map: MapConfig,
    /// Seed of the run generator.
    pub seed: u64,
    /// Turn number at which the time limit decides the game.
    pub max_turns: u32,
    /// Starting energy per team.
    pub initial_energy: i32,
    /// Income per team per turn.
    pub energy_per_turn: i32,
    /// Hp of every base.
    pub base_hp: i32,
    /// Decisions polled per team per turn.
    pub purchases_per_turn: u32,
    /// Vision relay range.
    pub communication_range: i32,
    /// Home-field bonus range.
    pub home_field_range: i32,
    /// Home-field multiplier numerator.
    pub home_field_numerator: i32,
    /// Home-field multiplier denominator.
    pub home_field_denominator: i32,
    /// Team A base cells.
    pub bases_a: Vec<Position>,
    /// Team B base cells.
    pub bases_b: Vec<Position>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            map: MapConfig::default(),
            seed: 0,
            max_turns: MAX_TURNS,
            initial_energy: INITIAL_ENERGY,
            energy_per_turn: ENERGY_PER_TURN,
            base_hp: BASE_MAX_HP,
            purchases_per_turn: PURCHASES_PER_TURN,
            communication_range: COMMUNICATION_RANGE,
            home_field_range: HOME_FIELD_RANGE,
            home_field_numerator: 6,
            home_field_denominator: 5,
            bases_a: vec![
                Position::new(8, 12),
                Position::new(32, 5),
                Position::new(55, 18),
            ],
            bases_b: vec![
                Position::new(10, 49),
                Position::new(35, 56),
                Position::new(58, 44),
            ],
        }
    }
}

impl GameConfig {
    /// Load a config from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Parse a config from a RON string. Missing fields keep their defaults.
    pub fn from_ron_str(ron: &str) -> Result<Self> {
        Ok(ron::from_str(ron)?)
    }

    /// Set the seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the turn ceiling.
    #[must_use]
    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Set the map configuration.
    #[must_use]
    pub fn with_map(mut self, map: MapConfig) -> Self {
        self.map = map;
        self
    }

    /// Set both teams' starting energy.
    #[must_use]
    pub fn with_initial_energy(mut self, energy: i32) -> Self {
        self.initial_energy = energy;
        self
    }

    /// Set the per-turn income.
    #[must_use]
    pub fn with_energy_per_turn(mut self, energy: i32) -> Self {
        self.energy_per_turn = energy;
        self
    }

    /// Replace the base layout.
    #[must_use]
    pub fn with_bases(mut self, bases_a: Vec<Position>, bases_b: Vec<Position>) -> Self {
        self.bases_a = bases_a;
        self.bases_b = bases_b;
        self
    }

    /// Apply the home-field multiplier, truncating toward zero.
    ///
    /// # Example
    ///
    /// ```
    /// use skirmish_core::config::GameConfig;
    ///
    /// assert_eq!(GameConfig::default().apply_home_field(70), 84);
    /// ```
    #[must_use]
    pub const fn apply_home_field(&self, damage: i32) -> i32 {
        if self.home_field_denominator == 0 {
            return damage;
        }
        damage * self.home_field_numerator / self.home_field_denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GameConfig::default();
        assert_eq!(config.max_turns, 500);
        assert_eq!(config.initial_energy, 200);
        assert_eq!(config.energy_per_turn, 30);
        assert_eq!(config.base_hp, 5000);
        assert_eq!(config.bases_a.len(), 3);
        assert_eq!(config.bases_b[0], Position::new(10, 49));
    }

    #[test]
    fn test_home_field_truncates() {
        let config = GameConfig::default();
        assert_eq!(config.apply_home_field(50), 60);
        assert_eq!(config.apply_home_field(10), 12);
        assert_eq!(config.apply_home_field(7), 8);
    }

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let config = GameConfig::from_ron_str("(seed: 77, max_turns: 40)").unwrap();
        assert_eq!(config.seed, 77);
        assert_eq!(config.max_turns, 40);
        assert_eq!(config.energy_per_turn, 30);
        assert_eq!(config.map.size, 64);
    }

    #[test]
    fn test_bad_ron_is_an_error() {
        assert!(GameConfig::from_ron_str("(seed: \"nope\")").is_err());
    }

    #[test]
    fn test_builders() {
        let config = GameConfig::default()
            .with_seed(9)
            .with_max_turns(10)
            .with_initial_energy(0)
            .with_energy_per_turn(0);
        assert_eq!(config.seed, 9);
        assert_eq!(config.max_turns, 10);
        assert_eq!(config.initial_energy, 0);
        assert_eq!(config.energy_per_turn, 0);
    }
}
