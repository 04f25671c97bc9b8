//! Error types for the `harbor-world` crate.

use harbor_types::Address;

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// The registry already holds its maximum number of ships.
    #[error("registry is full ({capacity} ships)")]
    RegistryFull {
        /// Maximum number of ships.
        capacity: usize,
    },

    /// Every grid cell is already occupied by a ship.
    #[error("no free mooring left on the grid")]
    NoFreeCell,

    /// The ship is not registered.
    #[error("ship {0} is not registered")]
    UnknownShip(Address),
}
