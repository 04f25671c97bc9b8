//! Crane commands overheard from other ships.
//!
//! Ships broadcast their crane commands, so every ship can see what the
//! others voted for in the current crane round. The table is cleared when
//! the crane announces a new round.

use std::collections::BTreeMap;

use harbor_types::{Address, Command};

/// The latest command heard from each ship this crane round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedCommands {
    commands: BTreeMap<Address, Command>,
}

impl ObservedCommands {
    /// An empty table.
    pub const fn new() -> Self {
        Self {
            commands: BTreeMap::new(),
        }
    }

    /// Record `command` from `ship`, replacing its earlier one.
    ///
    /// Location requests and `NoCommand` carry no intent and are skipped.
    pub fn record(&mut self, ship: Address, command: Command) {
        if matches!(command, Command::CurrentLocation | Command::NoCommand) {
            return;
        }
        self.commands.insert(ship, command);
    }

    /// The last command heard from `ship` this round.
    pub fn last_from(&self, ship: Address) -> Option<Command> {
        self.commands.get(&ship).copied()
    }

    /// The most frequently heard voting command.
    ///
    /// Ties go to the first command in [`Command::VOTING`] order.
    pub fn most_popular(&self) -> Option<Command> {
        let mut best: Option<(Command, usize)> = None;
        for candidate in Command::VOTING {
            let count = self.commands.values().filter(|c| **c == candidate).count();
            if count > 0 && best.is_none_or(|(_, top)| count > top) {
                best = Some((candidate, count));
            }
        }
        best.map(|(command, _)| command)
    }

    /// Forget everything heard.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Number of ships heard this round.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing was heard this round.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
