//! Grid positions and fixed-point helpers.
//!
//! The board is an integer grid, so distances are exact integers.
//! Averages and reward shaping go through [`Fixed`] instead of floats
//! so that telemetry is identical on every platform.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for derived (non-grid) quantities.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Integer cell coordinate on the square grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Position {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl Position {
    /// Create a new position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan (taxicab) distance.
    ///
    /// # Example
    ///
    /// ```
    /// use skirmish_core::math::Position;
    ///
    /// assert_eq!(Position::new(0, 0).manhattan(Position::new(3, -4)), 7);
    /// ```
    #[must_use]
    pub const fn manhattan(self, other: Self) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    /// Chebyshev (king-move) distance.
    ///
    /// # Example
    ///
    /// ```
    /// use skirmish_core::math::Position;
    ///
    /// assert_eq!(Position::new(0, 0).chebyshev(Position::new(3, -4)), 4);
    /// ```
    #[must_use]
    pub const fn chebyshev(self, other: Self) -> i32 {
        let dx = (self.x - other.x).abs();
        let dy = (self.y - other.y).abs();
        if dx > dy {
            dx
        } else {
            dy
        }
    }

    /// Position shifted by `(dx, dy)`.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Unit step (-1, 0 or 1 per axis) pointing from `self` toward `target`.
    #[must_use]
    pub const fn step_toward(self, target: Self) -> (i32, i32) {
        ((target.x - self.x).signum(), (target.y - self.y).signum())
    }

    /// The eight surrounding cells, row-major from `(-1, -1)`.
    #[must_use]
    pub fn neighbors(self) -> [Self; 8] {
        [
            self.offset(-1, -1),
            self.offset(-1, 0),
            self.offset(-1, 1),
            self.offset(0, -1),
            self.offset(0, 1),
            self.offset(1, -1),
            self.offset(1, 0),
            self.offset(1, 1),
        ]
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Mean of integer samples as a fixed-point number (zero when empty).
#[must_use]
pub fn fixed_mean(sum: i64, count: usize) -> Fixed {
    if count == 0 {
        return Fixed::ZERO;
    }
    Fixed::from_num(sum) / Fixed::from_num(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distances() {
        let a = Position::new(2, 3);
        let b = Position::new(5, 1);
        assert_eq!(a.manhattan(b), 5);
        assert_eq!(a.chebyshev(b), 3);
        assert_eq!(a.manhattan(a), 0);
        assert_eq!(a.chebyshev(a), 0);
    }

    #[test]
    fn test_step_toward() {
        let origin = Position::new(10, 10);
        assert_eq!(origin.step_toward(Position::new(20, 5)), (1, -1));
        assert_eq!(origin.step_toward(Position::new(10, 30)), (0, 1));
        assert_eq!(origin.step_toward(origin), (0, 0));
    }

    #[test]
    fn test_neighbors_are_adjacent_and_distinct() {
        let center = Position::new(4, 4);
        let neighbors = center.neighbors();
        for n in neighbors {
            assert_eq!(center.chebyshev(n), 1);
        }
        let mut sorted = neighbors.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 8);
    }

    #[test]
    fn test_fixed_mean() {
        assert_eq!(fixed_mean(0, 0), Fixed::ZERO);
        assert_eq!(fixed_mean(9, 2), Fixed::from_num(4.5));
    }
}
