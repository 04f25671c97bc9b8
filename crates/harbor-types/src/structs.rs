//! Core entity structs: grid geometry, the crane, and ship records.

use serde::{Deserialize, Serialize};

use crate::enums::Command;
use crate::ids::Address;

/// Smallest coordinate a ship can occupy.
pub const GRID_LOWER_BOUND: u8 = 2;

/// Largest coordinate a ship can occupy.
pub const GRID_UPPER_BOUND: u8 = 30;

/// Maximum number of ships a single game admits.
pub const MAX_SHIPS: usize = 10;

// ---------------------------------------------------------------------------
// Grid geometry
// ---------------------------------------------------------------------------

/// A cell on the harbor grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct GridPoint {
    /// Horizontal coordinate (RIGHT increases it).
    pub x: u8,
    /// Vertical coordinate (UP increases it).
    pub y: u8,
}

impl GridPoint {
    /// Build a point from its coordinates.
    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to another point.
    pub fn distance(self, other: Self) -> u16 {
        let dx = u16::from(self.x.abs_diff(other.x));
        let dy = u16::from(self.y.abs_diff(other.y));
        dx.saturating_add(dy)
    }

    /// The point one step away in the direction of `command`, clamped to
    /// `bounds`.
    ///
    /// A step that would leave the bounds is a no-op on that axis. Points
    /// that start outside the bounds (the crane's power-on position) can
    /// only move towards them. Non-movement commands return `self`.
    pub const fn step(self, command: Command, bounds: GridBounds) -> Self {
        let Self { x, y } = self;
        match command {
            Command::Up if y < bounds.upper => Self::new(x, y.saturating_add(1)),
            Command::Down if y > bounds.lower => Self::new(x, y.saturating_sub(1)),
            Command::Right if x < bounds.upper => Self::new(x.saturating_add(1), y),
            Command::Left if x > bounds.lower => Self::new(x.saturating_sub(1), y),
            _ => self,
        }
    }
}

impl core::fmt::Display for GridPoint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Inclusive square bounds of the playable grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridBounds {
    /// Smallest allowed coordinate on both axes.
    pub lower: u8,
    /// Largest allowed coordinate on both axes.
    pub upper: u8,
}

impl GridBounds {
    /// The standard harbor grid, `[2, 30]` on both axes.
    pub const STANDARD: Self = Self {
        lower: GRID_LOWER_BOUND,
        upper: GRID_UPPER_BOUND,
    };

    /// Whether `point` lies inside the bounds.
    pub const fn contains(self, point: GridPoint) -> bool {
        point.x >= self.lower
            && point.x <= self.upper
            && point.y >= self.lower
            && point.y <= self.upper
    }

    /// Number of cells along one axis.
    pub fn side(self) -> u16 {
        u16::from(self.upper.saturating_sub(self.lower)).saturating_add(1)
    }
}

impl Default for GridBounds {
    fn default() -> Self {
        Self::STANDARD
    }
}

// ---------------------------------------------------------------------------
// Crane
// ---------------------------------------------------------------------------

/// The crane's observable state, broadcast after every round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CraneState {
    /// Current crane position.
    pub position: GridPoint,
    /// Whether cargo was placed at `position` in the last applied command.
    pub cargo_here: bool,
}

impl CraneState {
    /// A crane at `position` with no cargo placed.
    pub const fn at(position: GridPoint) -> Self {
        Self {
            position,
            cargo_here: false,
        }
    }

    /// Apply a winning vote.
    ///
    /// Every applied command resets `cargo_here`; `PlaceCargo` then sets it.
    /// Non-voting commands leave the state untouched and return `false`.
    pub const fn apply(&mut self, command: Command, bounds: GridBounds) -> bool {
        if !command.is_vote() {
            return false;
        }
        self.cargo_here = matches!(command, Command::PlaceCargo);
        self.position = self.position.step(command, bounds);
        true
    }
}

// ---------------------------------------------------------------------------
// Ships
// ---------------------------------------------------------------------------

/// What the crane knows about one ship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShipRecord {
    /// The ship's radio address.
    pub address: Address,
    /// Whether the ship has joined the game.
    pub in_game: bool,
    /// Where the ship is moored.
    pub position: GridPoint,
    /// Whether cargo has been delivered. Never goes back to `false`.
    pub cargo_loaded: bool,
    /// Seconds after game start by which the ship wants its cargo.
    pub load_deadline: u16,
}

impl ShipRecord {
    /// A freshly registered ship without cargo.
    pub const fn new(address: Address, position: GridPoint, load_deadline: u16) -> Self {
        Self {
            address,
            in_game: true,
            position,
            cargo_loaded: false,
            load_deadline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDS: GridBounds = GridBounds::STANDARD;

    #[test]
    fn up_increases_y_and_right_increases_x() {
        let p = GridPoint::new(10, 10);
        assert_eq!(p.step(Command::Up, BOUNDS), GridPoint::new(10, 11));
        assert_eq!(p.step(Command::Down, BOUNDS), GridPoint::new(10, 9));
        assert_eq!(p.step(Command::Right, BOUNDS), GridPoint::new(11, 10));
        assert_eq!(p.step(Command::Left, BOUNDS), GridPoint::new(9, 10));
    }

    #[test]
    fn steps_never_leave_the_grid() {
        let low = GridPoint::new(GRID_LOWER_BOUND, GRID_LOWER_BOUND);
        assert_eq!(low.step(Command::Left, BOUNDS), low);
        assert_eq!(low.step(Command::Down, BOUNDS), low);

        let high = GridPoint::new(GRID_UPPER_BOUND, GRID_UPPER_BOUND);
        assert_eq!(high.step(Command::Right, BOUNDS), high);
        assert_eq!(high.step(Command::Up, BOUNDS), high);
    }

    #[test]
    fn outside_point_only_moves_towards_grid() {
        let origin = GridPoint::new(0, 0);
        assert_eq!(origin.step(Command::Down, BOUNDS), origin);
        assert_eq!(origin.step(Command::Left, BOUNDS), origin);
        assert_eq!(origin.step(Command::Up, BOUNDS), GridPoint::new(0, 1));
        assert_eq!(origin.step(Command::Right, BOUNDS), GridPoint::new(1, 0));
    }

    #[test]
    fn manhattan_distance() {
        let a = GridPoint::new(2, 30);
        let b = GridPoint::new(30, 2);
        assert_eq!(a.distance(b), 56);
        assert_eq!(a.distance(a), 0);
    }

    #[test]
    fn apply_resets_and_sets_cargo_flag() {
        let mut crane = CraneState::at(GridPoint::new(5, 5));
        assert!(crane.apply(Command::PlaceCargo, BOUNDS));
        assert!(crane.cargo_here);
        assert_eq!(crane.position, GridPoint::new(5, 5));

        assert!(crane.apply(Command::Up, BOUNDS));
        assert!(!crane.cargo_here);
        assert_eq!(crane.position, GridPoint::new(5, 6));
    }

    #[test]
    fn apply_ignores_non_votes() {
        let mut crane = CraneState::at(GridPoint::new(5, 5));
        crane.cargo_here = true;
        assert!(!crane.apply(Command::NothingToDo, BOUNDS));
        assert!(!crane.apply(Command::CurrentLocation, BOUNDS));
        assert!(crane.cargo_here);
    }

    #[test]
    fn standard_bounds() {
        assert!(BOUNDS.contains(GridPoint::new(2, 30)));
        assert!(!BOUNDS.contains(GridPoint::new(1, 30)));
        assert!(!BOUNDS.contains(GridPoint::new(2, 31)));
        assert_eq!(BOUNDS.side(), 29);
    }
}
