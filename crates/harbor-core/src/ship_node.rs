//! A ship as an async actor.
//!
//! Owns a [`Ship`] and multiplexes its inputs: radio frames, the strategy
//! and registry ticks, the coordinator's timer and the per-round vote
//! deadline. Votes go out `vote_lead` before the crane round is expected
//! to close, measured from the last crane location heard.
//!
//! The node also stops on its own once the game time last reported by the
//! crane has run out, plus one crane round of grace. The crane reports
//! whole seconds rounded down, so one more second is added.

use std::time::Duration;

use harbor_ships::{Action, Ship};
use harbor_types::{Address, CargoStatus, Destination, Message};
use harbor_world::Registry;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::radio::{Frame, Inbox, Transmitter};

/// Timers of a ship node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShipTiming {
    /// Strategy tick period.
    pub strategy_tick: Duration,
    /// Registry refresh period.
    pub registry_tick: Duration,
    /// Expected length of a crane round.
    pub round_interval: Duration,
    /// How long before the round closes the vote is sent.
    pub vote_lead: Duration,
    /// Delay before the first transmission.
    pub startup_delay: Duration,
}

/// What a ship knew by the end of the game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShipSummary {
    /// The ship's address.
    pub address: Address,
    /// Whether the crane ever answered its WELCOME.
    pub registered: bool,
    /// Whether the ship believes it was served.
    pub served: bool,
    /// Ships in its directory, itself included.
    pub known_ships: usize,
    /// Ships it believes are still waiting.
    pub pending_ships: usize,
}

/// The ship node.
pub struct ShipNode {
    ship: Ship,
    inbox: Inbox,
    tx: Transmitter,
    timing: ShipTiming,
    vote_at: Option<Instant>,
    timer_at: Option<Instant>,
    game_ends_at: Option<Instant>,
}

impl ShipNode {
    /// Wire a ship to the radio.
    pub const fn new(ship: Ship, inbox: Inbox, tx: Transmitter, timing: ShipTiming) -> Self {
        Self {
            ship,
            inbox,
            tx,
            timing,
            vote_at: None,
            timer_at: None,
            game_ends_at: None,
        }
    }

    /// Run until `shutdown` flips or the medium goes away.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ShipSummary {
        tokio::select! {
            () = tokio::time::sleep(self.timing.startup_delay) => {}
            _ = shutdown.changed() => return self.summary(),
        }
        let actions = self.ship.on_start();
        self.apply(actions);

        let mut strategy = ticker(self.timing.strategy_tick);
        let mut registry = ticker(self.timing.registry_tick);
        loop {
            tokio::select! {
                frame = self.inbox.recv() => match frame {
                    Some(frame) => self.on_frame(&frame),
                    None => break,
                },
                _ = strategy.tick() => {
                    let actions = self.ship.on_strategy_tick();
                    self.apply(actions);
                }
                _ = registry.tick() => {
                    let actions = self.ship.on_registry_tick();
                    self.apply(actions);
                }
                () = until(self.vote_at) => {
                    self.vote_at = None;
                    if let Some(action) = self.ship.vote() {
                        self.apply(vec![action]);
                    }
                }
                () = until(self.timer_at) => {
                    self.timer_at = None;
                    let actions = self.ship.on_timeout();
                    self.apply(actions);
                }
                () = until(self.game_ends_at) => {
                    debug!(ship = %self.ship.address(), "Game time is up");
                    break;
                }
                _ = shutdown.changed() => break,
            }
        }
        self.summary()
    }

    fn on_frame(&mut self, frame: &Frame) {
        let Some(packet) = frame.decode() else {
            return;
        };
        let actions = self.ship.on_message(packet.sender, &packet.message);
        self.apply(actions);
        if matches!(packet.message, Message::GameTimeResponse { .. }) {
            self.note_game_time();
        }
    }

    fn note_game_time(&mut self) {
        if let Some(secs) = self.ship.seconds_left() {
            let left = Duration::from_secs(u64::from(secs).saturating_add(1))
                .saturating_add(self.timing.round_interval);
            self.game_ends_at = Instant::now().checked_add(left);
        }
    }

    fn apply(&mut self, actions: Vec<Action>) {
        let now = Instant::now();
        for action in actions {
            match action {
                Action::Broadcast(message) => {
                    self.tx.send(Destination::Broadcast, message);
                }
                Action::Unicast(to, message) => {
                    self.tx.send(Destination::Unicast(to), message);
                }
                Action::ArmTimer(delay) => self.timer_at = now.checked_add(delay),
                Action::DisarmTimer => self.timer_at = None,
                Action::ScheduleVote => {
                    let wait = self.timing.round_interval.saturating_sub(self.timing.vote_lead);
                    self.vote_at = now.checked_add(wait);
                    debug!(ship = %self.ship.address(), wait_ms = wait.as_millis(), "Vote scheduled");
                }
            }
        }
    }

    fn summary(&self) -> ShipSummary {
        let directory = self.ship.directory();
        ShipSummary {
            address: self.ship.address(),
            registered: self.ship.is_registered(),
            served: directory.cargo_status(self.ship.address()) == CargoStatus::Received,
            known_ships: directory.len(),
            pending_ships: directory.pending_count(),
        }
    }
}

/// An interval whose first tick is one period away.
fn ticker(period: Duration) -> tokio::time::Interval {
    let start = Instant::now().checked_add(period).unwrap_or_else(Instant::now);
    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Sleep until `deadline`, forever if there is none.
async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
