//! Crane-side ship database.
//!
//! Ships join by sending a WELCOME. The first WELCOME from an address
//! registers it at a random grid cell no other ship occupies, with a
//! loading deadline drawn from the [`LoadingWindow`] and capped at the end
//! of the game. Later WELCOMEs from the same ship return the existing
//! record unchanged.

use harbor_types::{Address, GridBounds, GridPoint, ShipRecord};
use rand::Rng;
use tracing::{debug, info};

use crate::error::WorldError;
use crate::registry::{Registry, ShipTable};

/// Range of loading deadlines, in seconds after registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadingWindow {
    /// Earliest deadline offset.
    pub min_secs: u16,
    /// Latest deadline offset.
    pub max_secs: u16,
}

/// Outcome of a WELCOME.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The ship was not known and has just been registered.
    New(ShipRecord),
    /// The ship was already registered.
    Existing(ShipRecord),
}

impl Registration {
    /// The ship's record either way.
    pub const fn record(&self) -> &ShipRecord {
        match self {
            Self::New(r) | Self::Existing(r) => r,
        }
    }
}

/// The crane's authoritative table of ships.
#[derive(Debug, Clone)]
pub struct ShipDatabase {
    table: ShipTable,
    capacity: usize,
    bounds: GridBounds,
    window: LoadingWindow,
    game_duration_secs: u16,
}

impl ShipDatabase {
    /// An empty database.
    pub const fn new(
        capacity: usize,
        bounds: GridBounds,
        window: LoadingWindow,
        game_duration_secs: u16,
    ) -> Self {
        Self {
            table: ShipTable::new(),
            capacity,
            bounds,
            window,
            game_duration_secs,
        }
    }

    /// Register `ship` on its WELCOME, `now_secs` after game start.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::RegistryFull`] when `capacity` ships are
    /// already registered, or [`WorldError::NoFreeCell`] when the grid has
    /// no unoccupied cell left.
    pub fn register<R: Rng + ?Sized>(
        &mut self,
        ship: Address,
        now_secs: u16,
        rng: &mut R,
    ) -> Result<Registration, WorldError> {
        if let Some(existing) = self.table.lookup(ship) {
            debug!(ship = %ship, "Ship re-sent welcome");
            return Ok(Registration::Existing(*existing));
        }
        if self.table.len() >= self.capacity {
            return Err(WorldError::RegistryFull {
                capacity: self.capacity,
            });
        }

        let position = self.free_cell(rng)?;
        let lo = self.window.min_secs.min(self.window.max_secs);
        let hi = self.window.min_secs.max(self.window.max_secs);
        let offset = rng.random_range(lo..=hi);
        let load_deadline = now_secs
            .saturating_add(offset)
            .min(self.game_duration_secs);

        let record = ShipRecord::new(ship, position, load_deadline);
        self.table.insert(record);
        info!(
            ship = %ship,
            position = %position,
            load_deadline,
            registered = self.table.len(),
            "Ship registered"
        );
        Ok(Registration::New(record))
    }

    /// Pick a uniformly random cell that no registered ship occupies.
    fn free_cell<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<GridPoint, WorldError> {
        let free: Vec<GridPoint> = (self.bounds.lower..=self.bounds.upper)
            .flat_map(|x| (self.bounds.lower..=self.bounds.upper).map(move |y| GridPoint::new(x, y)))
            .filter(|p| self.table.ship_at(*p).is_none())
            .collect();
        if free.is_empty() {
            return Err(WorldError::NoFreeCell);
        }
        let index = rng.random_range(0..free.len());
        free.get(index).copied().ok_or(WorldError::NoFreeCell)
    }

    /// Addresses of every ship whose cargo was delivered.
    pub fn delivered_ships(&self) -> Vec<Address> {
        self.table
            .iter()
            .filter(|r| r.cargo_loaded)
            .map(|r| r.address)
            .collect()
    }

    /// Whether every registered ship has its cargo.
    pub fn all_delivered(&self) -> bool {
        !self.table.is_empty() && self.table.iter().all(|r| r.cargo_loaded)
    }

    /// Number of registered ships.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether no ship has registered yet.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// All records in address order.
    pub fn records(&self) -> impl Iterator<Item = &ShipRecord> {
        self.table.iter()
    }

    /// Insert a record directly, bypassing random placement.
    ///
    /// Used to stage fixed scenarios.
    pub fn insert(&mut self, record: ShipRecord) {
        self.table.insert(record);
    }
}

impl Registry for ShipDatabase {
    fn lookup(&self, ship: Address) -> Option<&ShipRecord> {
        self.table.lookup(ship)
    }

    fn all_known_addresses(&self) -> Vec<Address> {
        self.table.all_known_addresses()
    }

    fn mark_cargo_delivered(&mut self, ship: Address) -> bool {
        let changed = self.table.mark_cargo_delivered(ship);
        if changed {
            info!(ship = %ship, "Cargo delivered");
        }
        changed
    }

    fn ship_at(&self, position: GridPoint) -> Option<Address> {
        self.table.ship_at(position)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    const WINDOW: LoadingWindow = LoadingWindow {
        min_secs: 150,
        max_secs: 600,
    };

    fn database(capacity: usize, duration: u16) -> ShipDatabase {
        ShipDatabase::new(capacity, GridBounds::STANDARD, WINDOW, duration)
    }

    #[test]
    fn registration_places_ships_on_distinct_cells() {
        let mut db = database(10, 900);
        let mut rng = SmallRng::seed_from_u64(7);
        let mut cells = BTreeSet::new();
        for raw in 1..=10 {
            let reg = db.register(Address(raw), 0, &mut rng).unwrap();
            let record = *reg.record();
            assert!(matches!(reg, Registration::New(_)));
            assert!(GridBounds::STANDARD.contains(record.position));
            assert!(cells.insert(record.position));
            assert!((150..=600).contains(&record.load_deadline));
        }
        assert_eq!(db.len(), 10);
    }

    #[test]
    fn welcome_is_idempotent() {
        let mut db = database(10, 900);
        let mut rng = SmallRng::seed_from_u64(1);
        let first = *db.register(Address(4), 0, &mut rng).unwrap().record();
        let again = db.register(Address(4), 30, &mut rng).unwrap();
        assert_eq!(again, Registration::Existing(first));
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut db = database(2, 900);
        let mut rng = SmallRng::seed_from_u64(3);
        db.register(Address(1), 0, &mut rng).unwrap();
        db.register(Address(2), 0, &mut rng).unwrap();
        assert_eq!(
            db.register(Address(3), 0, &mut rng),
            Err(WorldError::RegistryFull { capacity: 2 })
        );
    }

    #[test]
    fn deadline_is_capped_at_game_end() {
        let mut db = database(10, 400);
        let mut rng = SmallRng::seed_from_u64(11);
        for raw in 1..=5 {
            let record = *db.register(Address(raw), 380, &mut rng).unwrap().record();
            assert_eq!(record.load_deadline, 400);
        }
    }

    #[test]
    fn full_grid_has_no_free_cell() {
        let bounds = GridBounds { lower: 2, upper: 2 };
        let mut db = ShipDatabase::new(5, bounds, WINDOW, 900);
        let mut rng = SmallRng::seed_from_u64(5);
        let record = *db.register(Address(1), 0, &mut rng).unwrap().record();
        assert_eq!(record.position, GridPoint::new(2, 2));
        assert_eq!(
            db.register(Address(2), 0, &mut rng),
            Err(WorldError::NoFreeCell)
        );
    }

    #[test]
    fn delivered_ships_tracks_marks() {
        let mut db = database(10, 900);
        let mut rng = SmallRng::seed_from_u64(9);
        db.register(Address(1), 0, &mut rng).unwrap();
        db.register(Address(2), 0, &mut rng).unwrap();
        assert!(!db.all_delivered());
        db.mark_cargo_delivered(Address(2));
        assert_eq!(db.delivered_ships(), vec![Address(2)]);
        db.mark_cargo_delivered(Address(1));
        assert!(db.all_delivered());
    }
}
