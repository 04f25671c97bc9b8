//! The [`Registry`] capability shared by the crane and the ships.

use std::collections::BTreeMap;

use harbor_types::{Address, CargoStatus, GridPoint, ShipRecord};

/// Read access to a table of ships plus the one mutation strategies need.
///
/// Implemented by the crane's [`ShipDatabase`] and each ship's
/// [`ShipDirectory`]; tactics and negotiators are written against this
/// trait only.
///
/// [`ShipDatabase`]: crate::ShipDatabase
/// [`ShipDirectory`]: crate::ShipDirectory
pub trait Registry {
    /// The record for `ship`, if known.
    fn lookup(&self, ship: Address) -> Option<&ShipRecord>;

    /// Every known ship address, ascending.
    fn all_known_addresses(&self) -> Vec<Address>;

    /// Record that `ship` received its cargo.
    ///
    /// Returns `true` if the status changed. Delivery is monotonic.
    fn mark_cargo_delivered(&mut self, ship: Address) -> bool;

    /// The ship moored at `position`, if any.
    fn ship_at(&self, position: GridPoint) -> Option<Address>;

    /// Delivery status of `ship`.
    fn cargo_status(&self, ship: Address) -> CargoStatus {
        match self.lookup(ship) {
            Some(record) if record.cargo_loaded => CargoStatus::Received,
            Some(_) => CargoStatus::Pending,
            None => CargoStatus::Unknown,
        }
    }

    /// Manhattan distance from `ship` to the crane at `crane`.
    fn distance_to_crane(&self, ship: Address, crane: GridPoint) -> Option<u16> {
        self.lookup(ship).map(|r| r.position.distance(crane))
    }

    /// The ship still waiting for cargo that is nearest to `point`.
    ///
    /// Ties go to the lowest address.
    fn nearest_pending(&self, point: GridPoint) -> Option<ShipRecord> {
        self.all_known_addresses()
            .into_iter()
            .filter_map(|addr| self.lookup(addr).copied())
            .filter(|r| !r.cargo_loaded)
            .min_by_key(|r| (r.position.distance(point), r.address))
    }

    /// Number of known ships still waiting for cargo.
    fn pending_count(&self) -> usize {
        self.all_known_addresses()
            .into_iter()
            .filter(|addr| self.cargo_status(*addr).is_pending())
            .count()
    }
}

/// Ordered ship storage used by both registries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShipTable {
    ships: BTreeMap<Address, ShipRecord>,
}

impl ShipTable {
    /// An empty table.
    pub const fn new() -> Self {
        Self {
            ships: BTreeMap::new(),
        }
    }

    /// Number of ships stored.
    pub fn len(&self) -> usize {
        self.ships.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.ships.is_empty()
    }

    /// Insert or replace a record.
    pub fn insert(&mut self, record: ShipRecord) {
        self.ships.insert(record.address, record);
    }

    /// Iterate over all records in address order.
    pub fn iter(&self) -> impl Iterator<Item = &ShipRecord> {
        self.ships.values()
    }
}

impl Registry for ShipTable {
    fn lookup(&self, ship: Address) -> Option<&ShipRecord> {
        self.ships.get(&ship)
    }

    fn all_known_addresses(&self) -> Vec<Address> {
        self.ships.keys().copied().collect()
    }

    fn mark_cargo_delivered(&mut self, ship: Address) -> bool {
        match self.ships.get_mut(&ship) {
            Some(record) if !record.cargo_loaded => {
                record.cargo_loaded = true;
                true
            }
            _ => false,
        }
    }

    fn ship_at(&self, position: GridPoint) -> Option<Address> {
        self.ships
            .values()
            .find(|r| r.position == position)
            .map(|r| r.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ShipTable {
        let mut t = ShipTable::new();
        t.insert(ShipRecord::new(Address(1), GridPoint::new(2, 2), 300));
        t.insert(ShipRecord::new(Address(2), GridPoint::new(10, 10), 300));
        t.insert(ShipRecord::new(Address(3), GridPoint::new(4, 4), 300));
        t
    }

    #[test]
    fn cargo_status_covers_all_cases() {
        let mut t = table();
        assert_eq!(t.cargo_status(Address(1)), CargoStatus::Pending);
        assert!(t.mark_cargo_delivered(Address(1)));
        assert_eq!(t.cargo_status(Address(1)), CargoStatus::Received);
        assert_eq!(t.cargo_status(Address(99)), CargoStatus::Unknown);
    }

    #[test]
    fn delivery_is_monotonic() {
        let mut t = table();
        assert!(t.mark_cargo_delivered(Address(2)));
        assert!(!t.mark_cargo_delivered(Address(2)));
        assert!(!t.mark_cargo_delivered(Address(99)));
        assert_eq!(t.cargo_status(Address(2)), CargoStatus::Received);
    }

    #[test]
    fn nearest_pending_skips_served_ships() {
        let mut t = table();
        let crane = GridPoint::new(3, 3);
        assert_eq!(t.nearest_pending(crane).map(|r| r.address), Some(Address(1)));
        t.mark_cargo_delivered(Address(1));
        t.mark_cargo_delivered(Address(3));
        assert_eq!(t.nearest_pending(crane).map(|r| r.address), Some(Address(2)));
        assert_eq!(t.pending_count(), 1);
    }

    #[test]
    fn ship_at_and_distance() {
        let t = table();
        assert_eq!(t.ship_at(GridPoint::new(4, 4)), Some(Address(3)));
        assert_eq!(t.ship_at(GridPoint::new(5, 5)), None);
        assert_eq!(
            t.distance_to_crane(Address(2), GridPoint::new(0, 0)),
            Some(20)
        );
        assert_eq!(t.distance_to_crane(Address(9), GridPoint::new(0, 0)), None);
    }
}
