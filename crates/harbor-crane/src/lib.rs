//! Crane side of the Harbor game.
//!
//! The crane is the only actuator in the game. Every round it applies the
//! plurality winner of the ships' votes, and it answers the registry query
//! protocol that lets ships join and learn about each other.
//!
//! All types here are synchronous state machines; the async node that
//! drives them from the radio lives in `harbor-core`.
//!
//! # Modules
//!
//! - [`arbitrator`] -- Per-round vote collection and plurality selection
//!   with random tie-break.
//! - [`clock`] -- Game clock started by the first radio message.
//! - [`crane`] -- [`Crane`] composing the arbitrator, the ship database and
//!   the clock behind one message handler.
//! - [`system`] -- Replies to WELCOME and registry queries.
//!
//! [`Crane`]: crane::Crane

pub mod arbitrator;
pub mod clock;
pub mod crane;
pub mod system;

pub use arbitrator::{
    ArbitratorSettings, CommandArbitrator, IgnoreReason, RoundOutcome, Submission, plurality_winner,
};
pub use clock::GameClock;
pub use crane::{Crane, CraneSettings, Outgoing, StartPosition};
pub use system::QueryContext;
