//! Ship side of the Harbor game.
//!
//! Ships cannot move the crane themselves; they can only vote. This crate
//! holds everything a ship uses to decide its vote, from the per-round
//! tactic down to the coordination protocols that let ships agree on
//! whom the crane should serve.
//!
//! Like `harbor-crane`, all types are synchronous state machines. The
//! async ship node in `harbor-core` feeds them radio traffic and timers.
//!
//! # Modules
//!
//! - [`command_table`] -- Crane commands overheard from other ships.
//! - [`consensus`] -- Randomized two-phase agreement on one command per
//!   crane round.
//! - [`cooperation`] -- Nearest-ship pairing handshake and hand-over.
//! - [`coordinator`] -- The [`Coordinator`] trait every strategy
//!   implements.
//! - [`neighbourhood`] -- Rooted three-ship neighbourhoods.
//! - [`ship`] -- [`Ship`] tying directory, crane state and coordinator
//!   together.
//! - [`strategy`] -- Building a coordinator from settings.
//! - [`tactics`] -- [`Tactic`] and the shared `go_to_destination` move.
//!
//! [`Coordinator`]: coordinator::Coordinator
//! [`Ship`]: ship::Ship
//! [`Tactic`]: tactics::Tactic

pub mod command_table;
pub mod consensus;
pub mod cooperation;
pub mod coordinator;
pub mod neighbourhood;
pub mod ship;
pub mod strategy;
pub mod tactics;

pub use command_table::ObservedCommands;
pub use consensus::{
    AbortReason, ConsensusCoordinator, ConsensusEngine, ConsensusPhase, ConsensusSettings, Effect,
    ProposalWeights,
};
pub use cooperation::{CoopStatus, CooperationSession, NearestPolicy, Negotiator, choose_destination};
pub use coordinator::{Action, Coordinator, FixedTactic, ShipView, StrategyKind};
pub use neighbourhood::{RootedStrategy, elect_root, rank, two_nearest};
pub use ship::{Ship, ShipSettings};
pub use strategy::StrategySettings;
pub use tactics::{AxisPriority, MoveSettings, Strategy, Tactic, TacticContext, go_to_destination, step_toward};
