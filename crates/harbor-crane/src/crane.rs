//! The crane: arbitrator, ship database and game clock behind one handler.
//!
//! The first radio message of any kind starts the game. At that moment
//! the tie-break generator is seeded, the clock starts, and the crane
//! leaves its power-on position for its start cell.

use std::time::Duration;

use harbor_types::{Address, Destination, GridPoint, Message};
use harbor_world::{LoadingWindow, ShipDatabase};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::arbitrator::{ArbitratorSettings, CommandArbitrator, RoundOutcome, Submission};
use crate::clock::GameClock;
use crate::system::{self, QueryContext};

/// Where the crane goes when the game starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPosition {
    /// A uniformly random cell inside the grid.
    #[default]
    Random,
    /// Stay at the power-on position.
    PowerOn,
    /// A fixed cell.
    Fixed {
        /// Horizontal coordinate.
        x: u8,
        /// Vertical coordinate.
        y: u8,
    },
}

/// Everything needed to build a [`Crane`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CraneSettings {
    /// Arbitration rules.
    pub arbitrator: ArbitratorSettings,
    /// Position before the game starts.
    pub power_on: GridPoint,
    /// Position once the game starts.
    pub start: StartPosition,
    /// Length of the game.
    pub game_duration: Duration,
    /// Range of per-ship loading deadlines.
    pub loading_window: LoadingWindow,
    /// Fixed seed for reproducible games.
    pub seed: Option<u64>,
}

/// A message the crane wants on the air.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    /// Who should receive it.
    pub destination: Destination,
    /// What to send.
    pub message: Message,
}

impl Outgoing {
    /// A broadcast.
    pub const fn broadcast(message: Message) -> Self {
        Self {
            destination: Destination::Broadcast,
            message,
        }
    }

    /// A unicast to `to`.
    pub const fn unicast(to: Address, message: Message) -> Self {
        Self {
            destination: Destination::Unicast(to),
            message,
        }
    }
}

/// The crane node's state.
#[derive(Debug, Clone)]
pub struct Crane {
    settings: CraneSettings,
    arbitrator: CommandArbitrator,
    database: ShipDatabase,
    clock: GameClock,
    rng: SmallRng,
}

impl Crane {
    /// A powered-on crane waiting for the first message.
    pub fn new(settings: CraneSettings) -> Self {
        let game_secs = u16::try_from(settings.game_duration.as_secs()).unwrap_or(u16::MAX);
        let rng = settings.seed.map_or_else(
            || SmallRng::from_rng(&mut rand::rng()),
            |seed| SmallRng::seed_from_u64(seed.wrapping_add(1)),
        );
        Self {
            arbitrator: CommandArbitrator::new(settings.arbitrator, settings.power_on, settings.seed),
            database: ShipDatabase::new(
                settings.arbitrator.max_voters,
                settings.arbitrator.bounds,
                settings.loading_window,
                game_secs,
            ),
            clock: GameClock::new(settings.game_duration),
            rng,
            settings,
        }
    }

    /// Handle one decoded message received at `now`.
    pub fn on_message(&mut self, sender: Address, message: &Message, now: Instant) -> Vec<Outgoing> {
        if !self.clock.is_started() {
            self.start_game(now);
        }
        match message {
            Message::CraneCommand { command } => {
                match self.arbitrator.submit_command(sender, *command, &self.database) {
                    Submission::LocationRequested => {
                        vec![Outgoing::unicast(sender, self.location_message())]
                    }
                    Submission::Stored | Submission::Ignored(_) => Vec::new(),
                }
            }
            _ if message.channel() == harbor_types::Channel::System => {
                let ctx = QueryContext {
                    elapsed_secs: self.clock.elapsed_secs(now),
                    seconds_left: self.clock.seconds_left(now),
                };
                system::answer(&mut self.database, &mut self.rng, ctx, sender, message)
                    .map(|reply| Outgoing::unicast(sender, reply))
                    .into_iter()
                    .collect()
            }
            _ => {
                debug!(sender = %sender, kind = ?message.kind(), "Crane ignores message");
                Vec::new()
            }
        }
    }

    fn start_game(&mut self, now: Instant) {
        self.clock.start(now);
        self.arbitrator.seed_on_first_message();
        let bounds = self.settings.arbitrator.bounds;
        let position = match self.settings.start {
            StartPosition::Random => GridPoint::new(
                self.rng.random_range(bounds.lower..=bounds.upper),
                self.rng.random_range(bounds.lower..=bounds.upper),
            ),
            StartPosition::PowerOn => self.settings.power_on,
            StartPosition::Fixed { x, y } => GridPoint::new(x, y),
        };
        self.arbitrator.place(position);
        info!(
            position = %position,
            duration_secs = self.clock.duration_secs(),
            "Game started"
        );
    }

    /// Close the current crane round.
    ///
    /// Returns the outcome and, when the round is broadcast, the location
    /// message to send to every ship.
    pub fn on_round_timer(&mut self) -> (RoundOutcome, Option<Outgoing>) {
        let outcome = self.arbitrator.on_round_timer(&mut self.database);
        let broadcast = outcome
            .broadcast
            .then(|| Outgoing::broadcast(self.location_message()));
        (outcome, broadcast)
    }

    fn location_message(&self) -> Message {
        let state = self.arbitrator.state();
        Message::CraneLocation {
            position: state.position,
            cargo_placed: state.cargo_here,
            crane_round: self.arbitrator.crane_round(),
        }
    }

    /// The ship database.
    pub const fn database(&self) -> &ShipDatabase {
        &self.database
    }

    /// The game clock.
    pub const fn clock(&self) -> &GameClock {
        &self.clock
    }

    /// The arbitrator.
    pub const fn arbitrator(&self) -> &CommandArbitrator {
        &self.arbitrator
    }

    /// Whether the game is over at `now`.
    pub fn is_over(&self, now: Instant) -> bool {
        self.clock.is_over(now)
    }
}
