//! Ship-side mirror of the crane's database.
//!
//! A ship learns about the others from roster replies (which addresses
//! exist), per-ship query replies (where they are moored), delivered-cargo
//! rosters, and crane broadcasts: a location broadcast with the cargo flag
//! set means the ship moored under the crane has been served.

use harbor_types::{Address, GridPoint, ShipRecord};
use tracing::debug;

use crate::registry::{Registry, ShipTable};

/// A ship's local view of every ship in the game.
#[derive(Debug, Clone, Default)]
pub struct ShipDirectory {
    table: ShipTable,
}

impl ShipDirectory {
    /// An empty directory.
    pub const fn new() -> Self {
        Self {
            table: ShipTable::new(),
        }
    }

    /// Merge a record from a WELCOME or SHIP reply.
    ///
    /// Cargo stays delivered once any source reported it delivered.
    pub fn upsert(&mut self, mut record: ShipRecord) {
        if let Some(known) = self.table.lookup(record.address) {
            record.cargo_loaded |= known.cargo_loaded;
        }
        self.table.insert(record);
    }

    /// Addresses in `roster` that this directory has no record of yet.
    pub fn unknown_in(&self, roster: &[Address]) -> Vec<Address> {
        roster
            .iter()
            .copied()
            .filter(|addr| self.table.lookup(*addr).is_none())
            .collect()
    }

    /// Apply a delivered-cargo roster.
    pub fn note_delivered(&mut self, ships: &[Address]) {
        for ship in ships {
            self.table.mark_cargo_delivered(*ship);
        }
    }

    /// Apply a crane location broadcast.
    ///
    /// Returns the ship newly marked as served, if the crane placed cargo
    /// at a known mooring.
    pub fn on_crane_location(&mut self, position: GridPoint, cargo_placed: bool) -> Option<Address> {
        if !cargo_placed {
            return None;
        }
        let ship = self.table.ship_at(position)?;
        if self.table.mark_cargo_delivered(ship) {
            debug!(ship = %ship, position = %position, "Observed cargo delivery");
            return Some(ship);
        }
        None
    }

    /// Number of ships known.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether no ship is known.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Registry for ShipDirectory {
    fn lookup(&self, ship: Address) -> Option<&ShipRecord> {
        self.table.lookup(ship)
    }

    fn all_known_addresses(&self) -> Vec<Address> {
        self.table.all_known_addresses()
    }

    fn mark_cargo_delivered(&mut self, ship: Address) -> bool {
        self.table.mark_cargo_delivered(ship)
    }

    fn ship_at(&self, position: GridPoint) -> Option<Address> {
        self.table.ship_at(position)
    }
}
