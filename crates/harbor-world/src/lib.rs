//! Ship registries for the Harbor game.
//!
//! Both sides of the radio keep a table of ships: the crane owns the
//! authoritative [`ShipDatabase`] that registers ships and records cargo
//! deliveries, and every ship keeps a [`ShipDirectory`] mirrored from query
//! replies and crane broadcasts. Strategies only see the [`Registry`] trait.
//!
//! # Modules
//!
//! - [`database`] -- Crane-side registration with unique random moorings
//!   and per-ship loading deadlines.
//! - [`directory`] -- Ship-side mirror of the database.
//! - [`error`] -- Error types for registry operations.
//! - [`registry`] -- The [`Registry`] trait and the shared [`ShipTable`].
//!
//! [`Registry`]: registry::Registry
//! [`ShipTable`]: registry::ShipTable

pub mod database;
pub mod directory;
pub mod error;
pub mod registry;

pub use database::{LoadingWindow, Registration, ShipDatabase};
pub use directory::ShipDirectory;
pub use error::WorldError;
pub use registry::{Registry, ShipTable};
