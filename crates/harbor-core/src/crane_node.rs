//! The crane as an async actor.
//!
//! Owns a [`Crane`] and drives it from the radio and the round timer. The
//! timer starts with the game, on the first message received, and the
//! node stops when the game clock runs out (or, optionally, once every
//! expected ship is registered and served).

use std::time::Duration;

use harbor_crane::Crane;
use harbor_types::{CraneState, ShipRecord};
use harbor_world::Registry;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::radio::{Frame, Inbox, Transmitter};

/// What the crane saw by the end of the game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CraneReport {
    /// Crane rounds played.
    pub crane_rounds: u32,
    /// Crane state at the end.
    pub final_state: CraneState,
    /// Every registered ship.
    pub ships: Vec<ShipRecord>,
    /// Why the game ended.
    pub end: GameEnd,
}

/// Why the crane stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameEnd {
    /// The game clock ran out.
    TimeUp,
    /// Every expected ship was served.
    AllServed,
    /// The runner asked the node to stop.
    Shutdown,
}

/// The crane node.
#[derive(Debug)]
pub struct CraneNode {
    crane: Crane,
    inbox: Inbox,
    tx: Transmitter,
    round_interval: Duration,
    expected_ships: Option<usize>,
    rounds: Option<Interval>,
}

impl CraneNode {
    /// Wire a crane to the radio.
    ///
    /// With `expected_ships`, the game ends early once that many ships
    /// are registered and all of them are served.
    pub const fn new(
        crane: Crane,
        inbox: Inbox,
        tx: Transmitter,
        round_interval: Duration,
        expected_ships: Option<usize>,
    ) -> Self {
        Self {
            crane,
            inbox,
            tx,
            round_interval,
            expected_ships,
            rounds: None,
        }
    }

    /// Run until the game ends or `shutdown` flips.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> CraneReport {
        let end = loop {
            tokio::select! {
                frame = self.inbox.recv() => match frame {
                    Some(frame) => self.on_frame(&frame),
                    None => break GameEnd::Shutdown,
                },
                () = next_tick(self.rounds.as_mut()) => {
                    if let Some(end) = self.on_round() {
                        break end;
                    }
                }
                _ = shutdown.changed() => break GameEnd::Shutdown,
            }
        };
        info!(
            end = ?end,
            crane_rounds = self.crane.arbitrator().crane_round(),
            served = self.crane.database().delivered_ships().len(),
            registered = self.crane.database().len(),
            "Game over"
        );
        CraneReport {
            crane_rounds: self.crane.arbitrator().crane_round(),
            final_state: self.crane.arbitrator().state(),
            ships: self.crane.database().records().copied().collect(),
            end,
        }
    }

    fn on_frame(&mut self, frame: &Frame) {
        let Some(packet) = frame.decode() else {
            return;
        };
        let now = Instant::now();
        for out in self.crane.on_message(packet.sender, &packet.message, now) {
            self.tx.send(out.destination, out.message);
        }
        if self.rounds.is_none() && self.crane.clock().is_started() {
            let mut rounds = tokio::time::interval_at(
                now.checked_add(self.round_interval).unwrap_or(now),
                self.round_interval,
            );
            rounds.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.rounds = Some(rounds);
        }
    }

    /// Close a round; `Some` when the game is over.
    fn on_round(&mut self) -> Option<GameEnd> {
        let (outcome, broadcast) = self.crane.on_round_timer();
        if let Some(out) = broadcast {
            self.tx.send(out.destination, out.message);
        }
        if self.crane.is_over(Instant::now()) {
            return Some(GameEnd::TimeUp);
        }
        let database = self.crane.database();
        let everyone_served = self
            .expected_ships
            .is_some_and(|expected| database.len() >= expected && database.all_delivered());
        if everyone_served {
            debug!(crane_round = outcome.crane_round, "Every ship served");
            return Some(GameEnd::AllServed);
        }
        None
    }
}

/// Wait for the next round tick, forever if the game has not started.
async fn next_tick(rounds: Option<&mut Interval>) {
    match rounds {
        Some(rounds) => {
            rounds.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use harbor_crane::{ArbitratorSettings, CraneSettings, StartPosition};
    use harbor_types::{Address, CRANE_ADDRESS, Command, Destination, GridPoint, Message};
    use harbor_world::LoadingWindow;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;
    use crate::radio::{Radio, RadioSettings};

    fn crane(duration_secs: u64) -> Crane {
        Crane::new(CraneSettings {
            arbitrator: ArbitratorSettings::default(),
            power_on: GridPoint::new(0, 0),
            start: StartPosition::Fixed { x: 10, y: 10 },
            game_duration: Duration::from_secs(duration_secs),
            loading_window: LoadingWindow {
                min_secs: 10,
                max_secs: 20,
            },
            seed: Some(3),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn game_starts_on_first_message_and_rounds_follow() {
        let radio = Radio::new(RadioSettings::default());
        let node = CraneNode::new(
            crane(30),
            radio.attach(CRANE_ADDRESS, SmallRng::seed_from_u64(1)),
            radio.transmitter(CRANE_ADDRESS).0,
            Duration::from_secs(3),
            None,
        );
        let mut ship_rx = radio.attach(Address(1), SmallRng::seed_from_u64(2));
        let (ship_tx, _gate) = radio.transmitter(Address(1));
        let (_stop, shutdown) = watch::channel(false);
        let crane_task = tokio::spawn(node.run(shutdown));

        ship_tx.send(Destination::Unicast(CRANE_ADDRESS), Message::Welcome);
        let welcome = ship_rx.recv().await.unwrap().decode().unwrap();
        let Message::WelcomeResponse(record) = welcome.message else {
            panic!("expected a welcome response, got {:?}", welcome.message);
        };
        assert_eq!(record.address, Address(1));

        ship_tx.send(
            Destination::Unicast(CRANE_ADDRESS),
            Message::CraneCommand {
                command: Command::Left,
            },
        );
        let location = ship_rx.recv().await.unwrap().decode().unwrap();
        assert_eq!(
            location.message,
            Message::CraneLocation {
                position: GridPoint::new(9, 10),
                cargo_placed: false,
                crane_round: 1,
            }
        );

        let report = crane_task.await.unwrap();
        assert_eq!(report.end, GameEnd::TimeUp);
        assert_eq!(report.crane_rounds, 10);
        assert_eq!(report.ships.len(), 1);
    }
}
