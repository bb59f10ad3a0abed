//! Team identifiers.

use serde::{Deserialize, Serialize};

/// One of the two sides.
///
/// Serializes as its numeric index (0 or 1) so exported state and action
/// payloads stay compatible with external policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Team {
    /// Team A (index 0).
    A,
    /// Team B (index 1).
    B,
}

impl Team {
    /// Both teams in index order.
    pub const ALL: [Self; 2] = [Self::A, Self::B];

    /// Numeric index (0 for A, 1 for B).
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }

    /// Team from a numeric index.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::A),
            1 => Some(Self::B),
            _ => None,
        }
    }

    /// The opposing team.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    /// Display name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::A => "Team A",
            Self::B => "Team B",
        }
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl From<Team> for u8 {
    fn from(team: Team) -> Self {
        team.index() as u8
    }
}

impl TryFrom<u8> for Team {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_index(value as usize).ok_or_else(|| format!("invalid team index {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_round_trip() {
        for team in Team::ALL {
            assert_eq!(Team::from_index(team.index()), Some(team));
        }
        assert_eq!(Team::from_index(2), None);
    }

    #[test]
    fn test_opponent() {
        assert_eq!(Team::A.opponent(), Team::B);
        assert_eq!(Team::B.opponent().opponent(), Team::B);
    }

    #[test]
    fn test_serializes_as_index() {
        assert_eq!(serde_json::to_string(&Team::B).unwrap(), "1");
        let team: Team = serde_json::from_str("0").unwrap();
        assert_eq!(team, Team::A);
        assert!(serde_json::from_str::<Team>("7").is_err());
    }
}
