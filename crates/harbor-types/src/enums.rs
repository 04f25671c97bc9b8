//! Enumeration types for the Harbor game.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Crane commands
// ---------------------------------------------------------------------------

/// A command a ship can send to the crane.
///
/// Only the five commands in [`Command::VOTING`] take part in the crane's
/// plurality vote and in ship consensus. `CurrentLocation` asks the crane
/// for a unicast location reply, `NothingToDo` and `NoCommand` are
/// abstentions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Command {
    /// No command (also the "undecided" consensus value).
    NoCommand = 0,
    /// Move the crane one cell up (y + 1).
    Up = 1,
    /// Move the crane one cell down (y - 1).
    Down = 2,
    /// Move the crane one cell left (x - 1).
    Left = 3,
    /// Move the crane one cell right (x + 1).
    Right = 4,
    /// Drop cargo at the crane's current position.
    PlaceCargo = 5,
    /// Ask the crane to report its position.
    CurrentLocation = 6,
    /// Explicit abstention.
    NothingToDo = 7,
}

impl Command {
    /// The commands that count as votes, in histogram order.
    pub const VOTING: [Self; 5] = [
        Self::Up,
        Self::Down,
        Self::Left,
        Self::Right,
        Self::PlaceCargo,
    ];

    /// Decode a command from its wire value.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::NoCommand),
            1 => Some(Self::Up),
            2 => Some(Self::Down),
            3 => Some(Self::Left),
            4 => Some(Self::Right),
            5 => Some(Self::PlaceCargo),
            6 => Some(Self::CurrentLocation),
            7 => Some(Self::NothingToDo),
            _ => None,
        }
    }

    /// The wire value of this command.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether this command takes part in voting.
    pub const fn is_vote(self) -> bool {
        self.vote_index().is_some()
    }

    /// Position of this command in [`Command::VOTING`], if it is a vote.
    pub const fn vote_index(self) -> Option<usize> {
        match self {
            Self::Up => Some(0),
            Self::Down => Some(1),
            Self::Left => Some(2),
            Self::Right => Some(3),
            Self::PlaceCargo => Some(4),
            Self::NoCommand | Self::CurrentLocation | Self::NothingToDo => None,
        }
    }
}

impl core::fmt::Display for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::NoCommand => "NO_COMMAND",
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::PlaceCargo => "PLACE_CARGO",
            Self::CurrentLocation => "CURRENT_LOCATION",
            Self::NothingToDo => "NOTHING_TO_DO",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Cargo status
// ---------------------------------------------------------------------------

/// Delivery status of a ship's cargo as seen by a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CargoStatus {
    /// The crane has placed cargo at the ship.
    Received,
    /// The ship is known and still waiting for cargo.
    Pending,
    /// The registry has no record of this ship.
    Unknown,
}

impl CargoStatus {
    /// Whether the ship is known and still waiting for cargo.
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }
}

// ---------------------------------------------------------------------------
// Radio channels
// ---------------------------------------------------------------------------

/// Logical radio channel a message travels on.
///
/// Handlers are registered per channel, so every message kind belongs to
/// exactly one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Crane commands and crane location broadcasts.
    Crane,
    /// Registry queries and responses.
    System,
    /// Ship-to-ship coordination.
    Ship,
}

impl Channel {
    /// All channels.
    pub const ALL: [Self; 3] = [Self::Crane, Self::System, Self::Ship];

    /// The channel identifier used on the air.
    pub const fn id(self) -> u8 {
        match self {
            Self::Crane => 6,
            Self::System => 7,
            Self::Ship => 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_wire_values_round_trip() {
        for value in 0..=7_u8 {
            let cmd = Command::from_u8(value);
            assert_eq!(cmd.map(Command::as_u8), Some(value));
        }
        assert_eq!(Command::from_u8(8), None);
        assert_eq!(Command::from_u8(255), None);
    }

    #[test]
    fn only_movement_and_place_cargo_vote() {
        let votes: Vec<Command> = (0..=7_u8)
            .filter_map(Command::from_u8)
            .filter(|c| c.is_vote())
            .collect();
        assert_eq!(votes, Command::VOTING.to_vec());
        assert!(!Command::NothingToDo.is_vote());
        assert!(!Command::CurrentLocation.is_vote());
        assert!(!Command::NoCommand.is_vote());
    }

    #[test]
    fn vote_index_matches_voting_order() {
        for (i, cmd) in Command::VOTING.iter().enumerate() {
            assert_eq!(cmd.vote_index(), Some(i));
        }
    }

    #[test]
    fn channel_ids_are_distinct() {
        assert_eq!(Channel::Crane.id(), 6);
        assert_eq!(Channel::System.id(), 7);
        assert_eq!(Channel::Ship.id(), 8);
    }
}
