//! Runtime for the Harbor game.
//!
//! Wires the synchronous crane and ship state machines to a simulated
//! broadcast radio and runs each node as a tokio task.
//!
//! # Modules
//!
//! - [`config`] -- YAML configuration (`harbor-config.yaml`) and validation.
//! - [`crane_node`] -- The crane actor: radio, round timer, game end.
//! - [`error`] -- [`GameError`].
//! - [`radio`] -- Lossy broadcast medium with per-node transmit queues.
//! - [`runner`] -- [`run_game`]: one full game from start to report.
//! - [`ship_node`] -- The ship actor: radio, ticks, timers and votes.
//!
//! [`GameError`]: error::GameError
//! [`run_game`]: runner::run_game

pub mod config;
pub mod crane_node;
pub mod error;
pub mod radio;
pub mod runner;
pub mod ship_node;

pub use config::{ConfigError, GameConfig};
pub use crane_node::{CraneNode, CraneReport, GameEnd};
pub use error::GameError;
pub use radio::{Frame, Inbox, Radio, RadioSettings, Transmitter};
pub use runner::{GameReport, log_game_end, run_game};
pub use ship_node::{ShipNode, ShipSummary, ShipTiming};
