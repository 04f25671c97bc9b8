//! Shared type definitions for the Harbor crane-loading game.
//!
//! This crate is the single source of truth for the vocabulary spoken by
//! the crane and the ships: node addresses, crane commands, grid geometry,
//! ship records, and the binary message codec carried over the radio.
//!
//! # Modules
//!
//! - [`ids`] -- Node addresses, the well-known crane address, frame
//!   destinations
//! - [`enums`] -- Crane commands, cargo status, radio channels
//! - [`structs`] -- Grid points, grid bounds, crane state, ship records
//! - [`wire`] -- Packet encoding and strict length-checked decoding

pub mod enums;
pub mod ids;
pub mod structs;
pub mod wire;

// Re-export all public types at crate root for convenience.
pub use enums::{CargoStatus, Channel, Command};
pub use ids::{Address, CRANE_ADDRESS, Destination};
pub use structs::{
    CraneState, GRID_LOWER_BOUND, GRID_UPPER_BOUND, GridBounds, GridPoint, MAX_SHIPS, ShipRecord,
};
pub use wire::{Message, MessageKind, Packet, WireError};
