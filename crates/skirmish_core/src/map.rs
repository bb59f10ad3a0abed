//! Terrain grid and procedural obstacle generation.
//!
//! The map is a fixed square grid of [`TerrainCell`]s. Obstacles are
//! scattered as small Mountain/River clusters grown from random seed cells,
//! while two home exclusion rectangles are always kept clear.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::math::Position;
use crate::rng::GameRng;
use crate::team::Team;

/// Inclusive axis-aligned rectangle of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRect {
    /// Lowest column.
    pub min_x: i32,
    /// Lowest row.
    pub min_y: i32,
    /// Highest column (inclusive).
    pub max_x: i32,
    /// Highest row (inclusive).
    pub max_y: i32,
}

impl CellRect {
    /// Create a rectangle from inclusive bounds.
    #[must_use]
    pub const fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Whether the rectangle contains `pos`.
    #[must_use]
    pub const fn contains(&self, pos: Position) -> bool {
        pos.x >= self.min_x && pos.x <= self.max_x && pos.y >= self.min_y && pos.y <= self.max_y
    }
}

/// Map configuration for procedural generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    /// Width and height in cells.
    pub size: i32,
    /// One obstacle seed per this many cells.
    pub obstacle_divisor: i32,
    /// Chance (percent) that an orthogonal neighbour joins a cluster.
    pub neighbor_chance: u32,
    /// Chance (percent) that a cell two steps out joins a cluster.
    pub outer_chance: u32,
    /// Zones that never hold obstacles.
    pub exclusion_zones: Vec<CellRect>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            size: 64,
            obstacle_divisor: 70,
            neighbor_chance: 70,
            outer_chance: 40,
            exclusion_zones: vec![CellRect::new(2, 2, 8, 8), CellRect::new(55, 55, 61, 61)],
        }
    }
}

impl MapConfig {
    /// Open map without any obstacles.
    #[must_use]
    pub fn open(size: i32) -> Self {
        Self {
            size,
            obstacle_divisor: 0,
            ..Default::default()
        }
    }

    /// Set the grid size.
    #[must_use]
    pub fn with_size(mut self, size: i32) -> Self {
        self.size = size;
        self
    }

    /// Set the obstacle divisor (0 disables obstacles).
    #[must_use]
    pub fn with_obstacle_divisor(mut self, divisor: i32) -> Self {
        self.obstacle_divisor = divisor;
        self
    }

    /// Number of obstacle seeds placed by [`GameMap::initialize`].
    #[must_use]
    pub const fn obstacle_seed_count(&self) -> i32 {
        if self.obstacle_divisor <= 0 {
            0
        } else {
            self.size * self.size / self.obstacle_divisor
        }
    }
}

/// Terrain of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TerrainCell {
    /// Open ground.
    #[default]
    Plain,
    /// Impassable high ground.
    Mountain,
    /// Impassable water.
    River,
    /// Cell under one of the team's bases.
    BaseMarker(Team),
}

impl TerrainCell {
    /// Plain ground and base markers are walkable.
    #[must_use]
    pub const fn is_walkable(self) -> bool {
        matches!(self, Self::Plain | Self::BaseMarker(_))
    }

    /// Mountain and River are obstacles.
    #[must_use]
    pub const fn is_obstacle(self) -> bool {
        matches!(self, Self::Mountain | Self::River)
    }
}

/// The terrain grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMap {
    size: i32,
    /// Row-major terrain.
    cells: Vec<TerrainCell>,
}

impl GameMap {
    /// All-plain map of the given size.
    #[must_use]
    pub fn new(size: i32) -> Self {
        let size = size.max(1);
        Self {
            size,
            cells: vec![TerrainCell::Plain; (size * size) as usize],
        }
    }

    /// Fill with Plain terrain and scatter obstacle clusters.
    ///
    /// # Example
    ///
    /// ```
    /// use skirmish_core::map::{GameMap, MapConfig};
    /// use skirmish_core::math::Position;
    /// use skirmish_core::rng::seeded_rng;
    ///
    /// let mut rng = seeded_rng(7);
    /// let map = GameMap::initialize(&MapConfig::default(), &mut rng);
    /// assert!(map.is_walkable(Position::new(5, 5)));
    /// ```
    #[must_use]
    pub fn initialize(config: &MapConfig, rng: &mut GameRng) -> Self {
        let mut map = Self::new(config.size);
        map.generate_obstacles(config, rng);
        map
    }

    /// Grid size (width == height).
    #[must_use]
    pub const fn size(&self) -> i32 {
        self.size
    }

    /// Center cell, used as the fallback movement target.
    #[must_use]
    pub const fn center(&self) -> Position {
        Position::new(self.size / 2, self.size / 2)
    }

    /// Whether `pos` lies on the grid.
    #[must_use]
    pub const fn is_valid_position(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.x < self.size && pos.y >= 0 && pos.y < self.size
    }

    /// Whether a unit may stand on `pos` (terrain only; occupancy is the world's concern).
    #[must_use]
    pub fn is_walkable(&self, pos: Position) -> bool {
        self.terrain_at(pos).is_some_and(TerrainCell::is_walkable)
    }

    /// Terrain at `pos`, `None` off the grid.
    #[must_use]
    pub fn terrain_at(&self, pos: Position) -> Option<TerrainCell> {
        self.index(pos).map(|idx| self.cells[idx])
    }

    /// Overwrite terrain at `pos`. Returns false off the grid.
    pub fn set_terrain_at(&mut self, pos: Position, terrain: TerrainCell) -> bool {
        match self.index(pos) {
            Some(idx) => {
                self.cells[idx] = terrain;
                true
            }
            None => false,
        }
    }

    /// Count of obstacle cells.
    #[must_use]
    pub fn obstacle_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_obstacle()).count()
    }

    /// Row-major iterator over `(position, terrain)`.
    pub fn cells(&self) -> impl Iterator<Item = (Position, TerrainCell)> + '_ {
        let size = self.size;
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, cell)| (Position::new(i as i32 % size, i as i32 / size), *cell))
    }

    fn index(&self, pos: Position) -> Option<usize> {
        if self.is_valid_position(pos) {
            Some((pos.y * self.size + pos.x) as usize)
        } else {
            None
        }
    }

    fn is_excluded(config: &MapConfig, pos: Position) -> bool {
        config.exclusion_zones.iter().any(|zone| zone.contains(pos))
    }

    fn can_grow_into(&self, config: &MapConfig, pos: Position) -> bool {
        self.is_valid_position(pos)
            && !Self::is_excluded(config, pos)
            && self.terrain_at(pos) == Some(TerrainCell::Plain)
    }

    fn generate_obstacles(&mut self, config: &MapConfig, rng: &mut GameRng) {
        let seeds = config.obstacle_seed_count();
        let mut placed = 0;

        for _ in 0..seeds {
            let seed = Position::new(rng.gen_range(0..self.size), rng.gen_range(0..self.size));
            if Self::is_excluded(config, seed) || self.terrain_at(seed) != Some(TerrainCell::Plain)
            {
                continue;
            }

            let terrain = if rng.gen_range(0..2) == 0 {
                TerrainCell::Mountain
            } else {
                TerrainCell::River
            };
            self.set_terrain_at(seed, terrain);
            placed += 1;

            for (dx, dy) in [(0, -1), (0, 1), (-1, 0), (1, 0)] {
                let near = seed.offset(dx, dy);
                if self.can_grow_into(config, near)
                    && rng.gen_range(0..=100) < config.neighbor_chance
                {
                    self.set_terrain_at(near, terrain);
                }
            }

            for (dx, dy) in [(0, -2), (0, 2), (-2, 0), (2, 0)] {
                let far = seed.offset(dx, dy);
                if self.can_grow_into(config, far) && rng.gen_range(0..=100) < config.outer_chance
                {
                    self.set_terrain_at(far, terrain);
                }
            }
        }

        // Home zones stay clear regardless of what grew into them.
        for zone in &config.exclusion_zones {
            for y in zone.min_y..=zone.max_y {
                for x in zone.min_x..=zone.max_x {
                    let pos = Position::new(x, y);
                    if self.terrain_at(pos).is_some_and(TerrainCell::is_obstacle) {
                        self.set_terrain_at(pos, TerrainCell::Plain);
                    }
                }
            }
        }

        debug!(
            seeds,
            placed,
            obstacle_cells = self.obstacle_count(),
            "Generated obstacles"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::seeded_rng;

    #[test]
    fn test_default_config() {
        let config = MapConfig::default();
        assert_eq!(config.size, 64);
        assert_eq!(config.obstacle_seed_count(), 58);
        assert_eq!(MapConfig::open(64).obstacle_seed_count(), 0);
    }

    #[test]
    fn test_open_map_is_all_plain() {
        let mut rng = seeded_rng(1);
        let map = GameMap::initialize(&MapConfig::open(16), &mut rng);
        assert_eq!(map.obstacle_count(), 0);
        assert!(map.cells().all(|(_, c)| c == TerrainCell::Plain));
    }

    #[test]
    fn test_bounds() {
        let map = GameMap::new(8);
        assert!(map.is_valid_position(Position::new(0, 0)));
        assert!(map.is_valid_position(Position::new(7, 7)));
        assert!(!map.is_valid_position(Position::new(8, 0)));
        assert!(!map.is_valid_position(Position::new(0, -1)));
        assert!(!map.is_walkable(Position::new(-1, 3)));
        assert_eq!(map.terrain_at(Position::new(9, 9)), None);
    }

    #[test]
    fn test_walkability_by_terrain() {
        let mut map = GameMap::new(8);
        let pos = Position::new(3, 4);
        assert!(map.set_terrain_at(pos, TerrainCell::Mountain));
        assert!(!map.is_walkable(pos));
        map.set_terrain_at(pos, TerrainCell::River);
        assert!(!map.is_walkable(pos));
        map.set_terrain_at(pos, TerrainCell::BaseMarker(Team::B));
        assert!(map.is_walkable(pos));
        assert!(!map.set_terrain_at(Position::new(8, 8), TerrainCell::Plain));
    }

    #[test]
    fn test_exclusion_zones_stay_clear() {
        for seed in 0..20 {
            let mut rng = seeded_rng(seed);
            let config = MapConfig::default();
            let map = GameMap::initialize(&config, &mut rng);
            for zone in &config.exclusion_zones {
                for y in zone.min_y..=zone.max_y {
                    for x in zone.min_x..=zone.max_x {
                        assert!(map.is_walkable(Position::new(x, y)));
                    }
                }
            }
        }
    }

    #[test]
    fn test_obstacles_are_generated() {
        let mut rng = seeded_rng(99);
        let map = GameMap::initialize(&MapConfig::default(), &mut rng);
        let count = map.obstacle_count();
        // At least one seed lands outside the exclusion zones; clusters stay small.
        assert!(count > 0);
        assert!(count < 58 * 9);
    }

    #[test]
    fn test_generation_is_seeded() {
        let a = GameMap::initialize(&MapConfig::default(), &mut seeded_rng(5));
        let b = GameMap::initialize(&MapConfig::default(), &mut seeded_rng(5));
        assert_eq!(a, b);
    }
}
