//! Pluggable ship strategies.
//!
//! A ship runs exactly one [`Coordinator`] at a time. The coordinator sees
//! ship-to-ship traffic, periodic ticks, crane round boundaries and its own
//! timer, and answers each with [`Action`]s for the node to carry out. Its
//! only output towards the crane is the [`Tactic`] it currently holds.

use std::time::Duration;

use harbor_types::{Address, Command, CraneState, Message};
use harbor_world::Registry;
use serde::Deserialize;

use crate::tactics::Tactic;

/// Something the node must do on a coordinator's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send to every ship on the message's channel.
    Broadcast(Message),
    /// Send to a single node.
    Unicast(Address, Message),
    /// (Re)arm the coordinator's timer to fire after the given delay.
    ArmTimer(Duration),
    /// Cancel the coordinator's timer.
    DisarmTimer,
    /// Schedule this ship's crane vote for the current round.
    ScheduleVote,
}

/// Read-only snapshot of the ship's world handed to coordinators.
#[derive(Clone, Copy)]
pub struct ShipView<'a> {
    /// This ship's address.
    pub me: Address,
    /// Last crane state heard.
    pub crane: CraneState,
    /// Crane round of the last location broadcast.
    pub crane_round: u32,
    /// The ship's directory.
    pub registry: &'a dyn Registry,
}

impl<'a> ShipView<'a> {
    /// Snapshot of a ship's state.
    pub const fn new(
        me: Address,
        crane: CraneState,
        crane_round: u32,
        registry: &'a dyn Registry,
    ) -> Self {
        Self {
            me,
            crane,
            crane_round,
            registry,
        }
    }

    /// Known ships other than this one, ascending.
    pub fn others(&self) -> Vec<Address> {
        self.registry
            .all_known_addresses()
            .into_iter()
            .filter(|addr| *addr != self.me)
            .collect()
    }

    /// Number of ships taking part, this one included.
    pub fn fleet_size(&self) -> usize {
        self.others().len().saturating_add(1)
    }
}

/// Which coordinator a ship runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Pair with the nearest ship and serve the pair.
    #[default]
    Cooperation,
    /// Follow the root of the three-ship neighbourhood.
    Neighbourhood,
    /// Agree on every crane command with randomized consensus.
    Consensus,
    /// Always drive the crane to this ship.
    SelfServe,
    /// Copy the most popular command heard.
    Popular,
    /// Never vote.
    Idle,
}

/// A ship strategy.
pub trait Coordinator: Send {
    /// Which strategy this is.
    fn kind(&self) -> StrategyKind;

    /// The tactic the ship should follow right now.
    fn tactic(&self) -> Tactic;

    /// Value agreed by consensus for the current crane round.
    fn consensus_command(&self) -> Option<Command> {
        None
    }

    /// Periodic strategy tick.
    fn on_tick(&mut self, view: &ShipView<'_>) -> Vec<Action>;

    /// The crane announced a new round.
    fn on_crane_round(&mut self, _view: &ShipView<'_>) -> Vec<Action> {
        Vec::new()
    }

    /// A ship-channel message arrived from `sender`.
    fn on_ship_message(
        &mut self,
        sender: Address,
        message: &Message,
        view: &ShipView<'_>,
    ) -> Vec<Action>;

    /// The coordinator's timer fired.
    fn on_timeout(&mut self, _view: &ShipView<'_>) -> Vec<Action> {
        Vec::new()
    }
}

/// A coordinator that never changes its tactic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedTactic {
    kind: StrategyKind,
    tactic: Tactic,
}

impl FixedTactic {
    /// Drive the crane to `me` for the whole game.
    pub const fn self_serve(me: Address) -> Self {
        Self {
            kind: StrategyKind::SelfServe,
            tactic: Tactic::ToAddress(me),
        }
    }

    /// Copy the most popular command.
    pub const fn popular() -> Self {
        Self {
            kind: StrategyKind::Popular,
            tactic: Tactic::Popular,
        }
    }

    /// Never vote.
    pub const fn idle() -> Self {
        Self {
            kind: StrategyKind::Idle,
            tactic: Tactic::DoNothing,
        }
    }
}

impl Coordinator for FixedTactic {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn tactic(&self) -> Tactic {
        self.tactic
    }

    fn on_tick(&mut self, _view: &ShipView<'_>) -> Vec<Action> {
        Vec::new()
    }

    fn on_ship_message(
        &mut self,
        _sender: Address,
        _message: &Message,
        _view: &ShipView<'_>,
    ) -> Vec<Action> {
        Vec::new()
    }
}
