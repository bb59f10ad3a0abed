//! ASCII battle visualizer for spectate runs.
//!
//! Renders the grid one character per cell: bases as `A`/`B` (`x` once
//! destroyed), units by kind letter (uppercase for team A, lowercase for team
//! B), mountains `^`, rivers `~`.

use skirmish_core::map::TerrainCell;
use skirmish_core::math::Position;
use skirmish_core::team::Team;
use skirmish_core::unit::UnitKind;
use skirmish_core::world::World;

/// ASCII visualization configuration.
#[derive(Debug, Clone)]
pub struct AsciiConfig {
    /// Show the legend and per-team counts.
    pub show_legend: bool,
    /// Use colored output (ANSI).
    pub use_color: bool,
}

impl Default for AsciiConfig {
    fn default() -> Self {
        Self {
            show_legend: true,
            use_color: true,
        }
    }
}

/// Character representation of a unit.
fn unit_char(kind: UnitKind, team: Team) -> char {
    let base = match kind {
        UnitKind::Archer => 'R',
        UnitKind::Infantry => 'I',
        UnitKind::Cavalry => 'C',
        UnitKind::Caster => 'M',
        UnitKind::Doctor => 'D',
    };
    match team {
        Team::A => base,
        Team::B => base.to_ascii_lowercase(),
    }
}

fn terrain_char(cell: TerrainCell) -> char {
    match cell {
        TerrainCell::Mountain => '^',
        TerrainCell::River => '~',
        TerrainCell::Plain | TerrainCell::BaseMarker(_) => '.',
    }
}

/// ANSI color codes.
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const BLUE: &str = "\x1b[34m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const GRAY: &str = "\x1b[90m";
    pub const RED: &str = "\x1b[31m";
}

const fn team_color(team: Team) -> &'static str {
    match team {
        Team::A => colors::BLUE,
        Team::B => colors::YELLOW,
    }
}

/// Render the world as ASCII art.
#[must_use]
pub fn render_world(world: &World, config: &AsciiConfig) -> String {
    let size = usize::try_from(world.map().size()).unwrap_or(0);
    let mut grid: Vec<Vec<(char, &'static str)>> = vec![vec![('.', ""); size]; size];

    let mut place = |pos: Position, ch: char, color: &'static str| {
        if let (Ok(x), Ok(y)) = (usize::try_from(pos.x), usize::try_from(pos.y)) {
            if let Some(cell) = grid.get_mut(y).and_then(|row| row.get_mut(x)) {
                *cell = (ch, color);
            }
        }
    };

    for (pos, cell) in world.map().cells() {
        let ch = terrain_char(cell);
        if ch != '.' {
            place(pos, ch, colors::GRAY);
        }
    }
    for base in world.bases() {
        if base.is_alive() {
            let ch = if base.team == Team::A { 'A' } else { 'B' };
            place(base.position, ch, team_color(base.team));
        } else {
            place(base.position, 'x', colors::RED);
        }
    }
    for unit in world.living_units() {
        place(unit.position, unit_char(unit.kind, unit.team), team_color(unit.team));
    }

    let (bold, reset) = if config.use_color {
        (colors::BOLD, colors::RESET)
    } else {
        ("", "")
    };

    let mut output = String::new();
    output.push_str(&format!("{bold}== Turn {} =={reset}\n", world.turn()));
    output.push('+');
    output.push_str(&"-".repeat(size));
    output.push_str("+\n");

    for row in &grid {
        output.push('|');
        for (ch, color) in row {
            if config.use_color && !color.is_empty() {
                output.push_str(color);
                output.push(*ch);
                output.push_str(colors::RESET);
            } else {
                output.push(*ch);
            }
        }
        output.push_str("|\n");
    }

    output.push('+');
    output.push_str(&"-".repeat(size));
    output.push_str("+\n");

    if config.show_legend {
        output.push_str("R=Archer I=Infantry C=Cavalry M=Caster D=Doctor (UPPER=Team A lower=Team B)\n");
        for team in Team::ALL {
            let (color, reset) = if config.use_color {
                (team_color(team), colors::RESET)
            } else {
                ("", "")
            };
            output.push_str(&format!(
                "{color}{team}{reset}: {} units, {} bases, base hp {}, energy {}\n",
                world.living_unit_count(team),
                world.living_base_count(team),
                world.total_base_hp(team),
                world.energy(team),
            ));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_core::config::GameConfig;
    use skirmish_core::map::GameMap;

    fn plain() -> AsciiConfig {
        AsciiConfig {
            use_color: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_unit_char() {
        assert_eq!(unit_char(UnitKind::Infantry, Team::A), 'I');
        assert_eq!(unit_char(UnitKind::Infantry, Team::B), 'i');
        assert_eq!(unit_char(UnitKind::Archer, Team::B), 'r');
        assert_eq!(unit_char(UnitKind::Doctor, Team::A), 'D');
    }

    #[test]
    fn test_render_open_world() {
        let config = GameConfig::default();
        let mut map = GameMap::new(config.map.size);
        map.set_terrain_at(Position::new(0, 0), TerrainCell::Mountain);
        map.set_terrain_at(Position::new(1, 0), TerrainCell::River);
        let mut world = World::with_map(config, map).unwrap();
        world.spawn_unit(Team::A, UnitKind::Cavalry, Position::new(20, 20));
        world.spawn_unit(Team::B, UnitKind::Caster, Position::new(21, 20));

        let output = render_world(&world, &plain());
        let rows: Vec<&str> = output.lines().collect();

        assert_eq!(rows[0], "== Turn 0 ==");
        // Header, top border, then grid rows.
        assert!(rows[2].starts_with("|^~."));
        assert_eq!(&rows[2 + 20][21..23], "Cm");
        assert_eq!(rows[2 + 12].chars().nth(9), Some('A'));
        assert_eq!(rows[2 + 49].chars().nth(11), Some('B'));
        assert!(output.contains("Team A: 1 units, 3 bases"));
    }

    #[test]
    fn test_render_without_legend() {
        let config = GameConfig::default();
        let world = World::with_map(config.clone(), GameMap::new(config.map.size)).unwrap();
        let output = render_world(
            &world,
            &AsciiConfig {
                show_legend: false,
                use_color: false,
            },
        );
        assert_eq!(output.lines().count(), 1 + 2 + 64);
    }
}
