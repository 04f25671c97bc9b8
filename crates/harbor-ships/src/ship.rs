//! A ship: directory upkeep, crane-round tracking and voting around one
//! [`Coordinator`].
//!
//! The ship registers with WELCOME (retried on every registry tick until
//! answered), keeps its directory fresh from roster queries and crane
//! broadcasts, forwards ship-to-ship traffic to its coordinator, and casts
//! one crane vote per crane round from the coordinator's tactic. A ship
//! parroting another one votes again as soon as it overhears that ship's
//! vote, so it never has to guess which of the two goes on air first.

use harbor_types::{Address, CRANE_ADDRESS, Command, CraneState, GridPoint, Message};
use harbor_world::ShipDirectory;
use tracing::{debug, info};

use crate::command_table::ObservedCommands;
use crate::coordinator::{Action, Coordinator, ShipView};
use crate::tactics::{MoveSettings, Strategy, Tactic, TacticContext};

/// Per-ship options that do not depend on the strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShipSettings {
    /// This ship's radio address.
    pub address: Address,
    /// Movement preferences.
    pub moves: MoveSettings,
    /// Broadcast crane votes so other ships can observe them.
    pub broadcast_commands: bool,
}

impl ShipSettings {
    /// Default options for `address`.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            moves: MoveSettings::default(),
            broadcast_commands: true,
        }
    }
}

/// The ship node's state.
pub struct Ship {
    settings: ShipSettings,
    directory: ShipDirectory,
    observed: ObservedCommands,
    crane: CraneState,
    crane_round: Option<u32>,
    registered: bool,
    seconds_left: Option<u16>,
    voted: Option<Command>,
    coordinator: Box<dyn Coordinator>,
}

impl Ship {
    /// An unregistered ship running `coordinator`.
    pub fn new(settings: ShipSettings, coordinator: Box<dyn Coordinator>) -> Self {
        Self {
            settings,
            directory: ShipDirectory::new(),
            observed: ObservedCommands::new(),
            crane: CraneState::at(GridPoint::new(0, 0)),
            crane_round: None,
            registered: false,
            seconds_left: None,
            voted: None,
            coordinator,
        }
    }

    /// This ship's address.
    pub const fn address(&self) -> Address {
        self.settings.address
    }

    /// Whether the crane answered our WELCOME.
    pub const fn is_registered(&self) -> bool {
        self.registered
    }

    /// The ship's view of the fleet.
    pub const fn directory(&self) -> &ShipDirectory {
        &self.directory
    }

    /// Last crane state heard.
    pub const fn crane(&self) -> CraneState {
        self.crane
    }

    /// Crane round of the last location heard.
    pub const fn crane_round(&self) -> Option<u32> {
        self.crane_round
    }

    /// Seconds left in the game, as last reported by the crane.
    pub const fn seconds_left(&self) -> Option<u16> {
        self.seconds_left
    }

    /// The running coordinator.
    pub fn coordinator(&self) -> &dyn Coordinator {
        self.coordinator.as_ref()
    }

    /// Commands overheard this crane round.
    pub const fn observed(&self) -> &ObservedCommands {
        &self.observed
    }

    /// First transmission: ask to join the game.
    pub fn on_start(&self) -> Vec<Action> {
        debug!(ship = %self.address(), "Joining the game");
        vec![Self::to_crane(Message::Welcome)]
    }

    /// Registry refresh: retry WELCOME until registered, then poll the
    /// rosters.
    pub fn on_registry_tick(&self) -> Vec<Action> {
        if self.registered {
            vec![
                Self::to_crane(Message::AllShipsQuery),
                Self::to_crane(Message::AllCargoQuery),
                Self::to_crane(Message::GameTimeQuery),
            ]
        } else {
            debug!(ship = %self.address(), "Retrying WELCOME");
            vec![Self::to_crane(Message::Welcome)]
        }
    }

    /// Strategy tick.
    pub fn on_strategy_tick(&mut self) -> Vec<Action> {
        if !self.registered {
            return Vec::new();
        }
        let view = ShipView::new(
            self.settings.address,
            self.crane,
            self.crane_round.unwrap_or(0),
            &self.directory,
        );
        self.coordinator.on_tick(&view)
    }

    /// The coordinator's timer fired.
    pub fn on_timeout(&mut self) -> Vec<Action> {
        let view = ShipView::new(
            self.settings.address,
            self.crane,
            self.crane_round.unwrap_or(0),
            &self.directory,
        );
        self.coordinator.on_timeout(&view)
    }

    /// Handle one decoded message from `sender`.
    pub fn on_message(&mut self, sender: Address, message: &Message) -> Vec<Action> {
        match message {
            Message::WelcomeResponse(record) if record.address == self.address() => {
                if !self.registered {
                    info!(
                        ship = %self.address(),
                        position = %record.position,
                        deadline = record.load_deadline,
                        "Registered with the crane"
                    );
                }
                self.registered = true;
                self.directory.upsert(*record);
                vec![
                    Self::to_crane(Message::CraneCommand {
                        command: Command::CurrentLocation,
                    }),
                    Self::to_crane(Message::AllShipsQuery),
                ]
            }
            Message::ShipResponse(record) => {
                self.directory.upsert(*record);
                Vec::new()
            }
            Message::AllShipsResponse(roster) => self
                .directory
                .unknown_in(roster)
                .into_iter()
                .map(|ship| Self::to_crane(Message::ShipQuery { ship }))
                .collect(),
            Message::AllCargoResponse(delivered) => {
                self.directory.note_delivered(delivered);
                Vec::new()
            }
            Message::GameTimeResponse { seconds_left } => {
                self.seconds_left = Some(*seconds_left);
                Vec::new()
            }
            Message::CraneLocation {
                position,
                cargo_placed,
                crane_round,
            } => self.on_crane_location(*position, *cargo_placed, *crane_round),
            Message::CraneCommand { command } if sender != CRANE_ADDRESS => {
                self.observed.record(sender, *command);
                if self.registered
                    && self.crane_round.is_some()
                    && self.coordinator.tactic() == Tactic::Parrot(sender)
                {
                    return self.vote().into_iter().collect();
                }
                Vec::new()
            }
            _ if message.channel() == harbor_types::Channel::Ship => {
                if !self.registered {
                    return Vec::new();
                }
                let view = ShipView::new(
                    self.settings.address,
                    self.crane,
                    self.crane_round.unwrap_or(0),
                    &self.directory,
                );
                self.coordinator.on_ship_message(sender, message, &view)
            }
            _ => {
                debug!(ship = %self.address(), sender = %sender, kind = ?message.kind(), "Ship ignores message");
                Vec::new()
            }
        }
    }

    fn on_crane_location(
        &mut self,
        position: GridPoint,
        cargo_placed: bool,
        crane_round: u32,
    ) -> Vec<Action> {
        if self.crane_round.is_some_and(|known| crane_round < known) {
            debug!(ship = %self.address(), crane_round, "Stale crane location");
            return Vec::new();
        }
        self.crane = CraneState {
            position,
            cargo_here: cargo_placed,
        };
        self.directory.on_crane_location(position, cargo_placed);
        if self.crane_round == Some(crane_round) {
            return Vec::new();
        }

        self.crane_round = Some(crane_round);
        self.observed.clear();
        self.voted = None;
        if !self.registered {
            return Vec::new();
        }
        let view = ShipView::new(self.settings.address, self.crane, crane_round, &self.directory);
        let mut actions = self.coordinator.on_crane_round(&view);
        actions.push(Action::ScheduleVote);
        actions
    }

    /// The command the current tactic picks right now.
    pub fn next_command(&self) -> Command {
        let ctx = TacticContext {
            crane: self.crane,
            registry: &self.directory,
            observed: &self.observed,
            consensus: self.coordinator.consensus_command(),
            moves: self.settings.moves,
        };
        self.coordinator.tactic().compute_next_command(&ctx)
    }

    /// Cast this crane round's vote.
    ///
    /// Abstentions are not sent, and neither is a repeat of the vote
    /// already cast this crane round.
    pub fn vote(&mut self) -> Option<Action> {
        let command = self.next_command();
        if !command.is_vote() {
            debug!(ship = %self.address(), command = %command, "Abstaining");
            return None;
        }
        if self.voted == Some(command) {
            return None;
        }
        self.voted = Some(command);
        debug!(ship = %self.address(), command = %command, "Voting");
        let message = Message::CraneCommand { command };
        Some(if self.settings.broadcast_commands {
            Action::Broadcast(message)
        } else {
            Self::to_crane(message)
        })
    }

    const fn to_crane(message: Message) -> Action {
        Action::Unicast(CRANE_ADDRESS, message)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use harbor_types::ShipRecord;
    use harbor_world::Registry;

    use super::*;
    use crate::coordinator::FixedTactic;
    use crate::cooperation::{NearestPolicy, Negotiator};
    use crate::neighbourhood::RootedStrategy;

    fn registered(me: u16, position: GridPoint, coordinator: Box<dyn Coordinator>) -> Ship {
        let mut ship = Ship::new(ShipSettings::new(Address(me)), coordinator);
        ship.on_message(
            CRANE_ADDRESS,
            &Message::WelcomeResponse(ShipRecord::new(Address(me), position, 400)),
        );
        ship
    }

    fn location(x: u8, y: u8, cargo_placed: bool, crane_round: u32) -> Message {
        Message::CraneLocation {
            position: GridPoint::new(x, y),
            cargo_placed,
            crane_round,
        }
    }

    #[test]
    fn welcome_is_retried_until_answered() {
        let mut ship = Ship::new(
            ShipSettings::new(Address(2)),
            Box::new(FixedTactic::idle()),
        );
        assert_eq!(
            ship.on_start(),
            vec![Action::Unicast(CRANE_ADDRESS, Message::Welcome)]
        );
        assert_eq!(
            ship.on_registry_tick(),
            vec![Action::Unicast(CRANE_ADDRESS, Message::Welcome)]
        );

        let actions = ship.on_message(
            CRANE_ADDRESS,
            &Message::WelcomeResponse(ShipRecord::new(Address(2), GridPoint::new(4, 9), 300)),
        );
        assert!(ship.is_registered());
        assert_eq!(
            actions.first(),
            Some(&Action::Unicast(
                CRANE_ADDRESS,
                Message::CraneCommand {
                    command: Command::CurrentLocation
                }
            ))
        );
        assert!(ship.on_registry_tick().contains(&Action::Unicast(
            CRANE_ADDRESS,
            Message::AllShipsQuery
        )));
    }

    #[test]
    fn somebody_elses_welcome_reply_is_ignored() {
        let mut ship = Ship::new(
            ShipSettings::new(Address(2)),
            Box::new(FixedTactic::idle()),
        );
        ship.on_message(
            CRANE_ADDRESS,
            &Message::WelcomeResponse(ShipRecord::new(Address(5), GridPoint::new(4, 9), 300)),
        );
        assert!(!ship.is_registered());
        assert!(ship.directory().is_empty());
    }

    #[test]
    fn roster_triggers_queries_for_unknown_ships_only() {
        let mut ship = registered(2, GridPoint::new(4, 9), Box::new(FixedTactic::idle()));
        let actions = ship.on_message(
            CRANE_ADDRESS,
            &Message::AllShipsResponse(vec![Address(2), Address(3), Address(7)]),
        );
        assert_eq!(
            actions,
            vec![
                Action::Unicast(CRANE_ADDRESS, Message::ShipQuery { ship: Address(3) }),
                Action::Unicast(CRANE_ADDRESS, Message::ShipQuery { ship: Address(7) }),
            ]
        );
    }

    #[test]
    fn new_crane_round_clears_observations_and_schedules_a_vote() {
        let mut ship = registered(2, GridPoint::new(4, 9), Box::new(FixedTactic::popular()));
        assert_eq!(ship.on_message(CRANE_ADDRESS, &location(10, 10, false, 1)), vec![Action::ScheduleVote]);

        ship.on_message(Address(5), &Message::CraneCommand { command: Command::Left });
        ship.on_message(Address(6), &Message::CraneCommand { command: Command::Left });
        assert_eq!(ship.next_command(), Command::Left);

        // The same round again, as a unicast reply: no second vote.
        assert!(ship.on_message(CRANE_ADDRESS, &location(10, 10, false, 1)).is_empty());
        assert_eq!(ship.observed().len(), 2);
        // An older round is ignored outright.
        assert!(ship.on_message(CRANE_ADDRESS, &location(3, 3, false, 0)).is_empty());
        assert_eq!(ship.crane().position, GridPoint::new(10, 10));

        assert_eq!(ship.on_message(CRANE_ADDRESS, &location(9, 10, false, 2)), vec![Action::ScheduleVote]);
        assert!(ship.observed().is_empty());
        assert_eq!(ship.next_command(), Command::NothingToDo);
    }

    #[test]
    fn cargo_broadcast_marks_the_ship_under_the_crane() {
        let mut ship = registered(2, GridPoint::new(4, 9), Box::new(FixedTactic::idle()));
        ship.on_message(
            CRANE_ADDRESS,
            &Message::ShipResponse(ShipRecord::new(Address(3), GridPoint::new(6, 6), 300)),
        );
        ship.on_message(CRANE_ADDRESS, &location(6, 6, true, 4));
        assert!(!ship.directory().cargo_status(Address(3)).is_pending());
        assert!(ship.directory().cargo_status(Address(2)).is_pending());
    }

    #[test]
    fn self_serving_ship_votes_towards_itself() {
        let mut ship = registered(2, GridPoint::new(4, 9), Box::new(FixedTactic::self_serve(Address(2))));
        ship.on_message(CRANE_ADDRESS, &location(8, 9, false, 1));
        assert_eq!(
            ship.vote(),
            Some(Action::Broadcast(Message::CraneCommand { command: Command::Left }))
        );

        let mut settings = ShipSettings::new(Address(2));
        settings.broadcast_commands = false;
        let mut quiet = Ship::new(settings, Box::new(FixedTactic::self_serve(Address(2))));
        quiet.on_message(
            CRANE_ADDRESS,
            &Message::WelcomeResponse(ShipRecord::new(Address(2), GridPoint::new(4, 9), 300)),
        );
        quiet.on_message(CRANE_ADDRESS, &location(4, 9, false, 1));
        assert_eq!(
            quiet.vote(),
            Some(Action::Unicast(
                CRANE_ADDRESS,
                Message::CraneCommand { command: Command::PlaceCargo }
            ))
        );
    }

    #[test]
    fn idle_ship_abstains() {
        let mut ship = registered(2, GridPoint::new(4, 9), Box::new(FixedTactic::idle()));
        ship.on_message(CRANE_ADDRESS, &location(8, 9, false, 1));
        assert_eq!(ship.vote(), None);
    }

    #[test]
    fn ship_traffic_reaches_the_coordinator() {
        let mut ship = registered(
            2,
            GridPoint::new(4, 9),
            Box::new(Negotiator::new(NearestPolicy::WithoutCargo)),
        );
        ship.on_message(
            CRANE_ADDRESS,
            &Message::ShipResponse(ShipRecord::new(Address(3), GridPoint::new(5, 9), 300)),
        );
        ship.on_message(CRANE_ADDRESS, &location(20, 20, false, 1));

        let actions = ship.on_message(Address(3), &Message::StartCoop { target: Address(2) });
        assert!(
            actions
                .iter()
                .any(|a| matches!(a, Action::Unicast(to, Message::AnswerCoop { .. }) if *to == Address(3))),
            "{actions:?}"
        );
    }

    #[test]
    fn follower_repeats_its_root_within_the_round() {
        let mut follower = registered(2, GridPoint::new(12, 12), Box::new(RootedStrategy::new()));
        follower.on_message(
            CRANE_ADDRESS,
            &Message::ShipResponse(ShipRecord::new(Address(3), GridPoint::new(10, 10), 300)),
        );
        follower.on_message(CRANE_ADDRESS, &location(4, 10, false, 1));
        follower.on_strategy_tick();
        assert_eq!(follower.coordinator().tactic(), Tactic::Parrot(Address(3)));

        // Both vote deadlines fire together: nothing heard yet, so abstain.
        assert_eq!(follower.vote(), None);

        let right = Message::CraneCommand { command: Command::Right };
        assert_eq!(
            follower.on_message(Address(3), &right),
            vec![Action::Broadcast(right.clone())]
        );
        // A repeated broadcast of the same vote is not echoed twice.
        assert!(follower.on_message(Address(3), &right).is_empty());
        assert_eq!(follower.vote(), None);

        // Other ships' votes are only observed.
        assert!(
            follower
                .on_message(Address(5), &Message::CraneCommand { command: Command::Up })
                .is_empty()
        );

        // A new crane round allows a fresh echo of the same command.
        follower.on_message(CRANE_ADDRESS, &location(5, 10, false, 2));
        assert_eq!(
            follower.on_message(Address(3), &right),
            vec![Action::Broadcast(right)]
        );
    }
}
