//! Pairwise cooperation between nearest ships.
//!
//! A ship invites its nearest neighbour with `StartCoop`. The neighbour
//! accepts only if the inviter is its own nearest neighbour too, and
//! proposes which of the two the crane should serve first. The inviter
//! checks the proposal against its own view and confirms. Both then drive
//! the crane to the agreed ship, hand over to the other one once it is
//! served, and go back to searching when the pair is done.
//!
//! There are no retry counters: unless a session is active, every tick
//! drops any half-finished handshake and sends a fresh invitation.

use harbor_types::{Address, Message};
use serde::Deserialize;
use tracing::{debug, info};

use crate::coordinator::{Action, Coordinator, ShipView, StrategyKind};
use crate::tactics::Tactic;

/// Which ships count when looking for the nearest neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NearestPolicy {
    /// Every other known ship.
    AnyShip,
    /// Only ships still waiting for cargo.
    #[default]
    WithoutCargo,
}

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoopStatus {
    /// No partner; inviting the nearest ship every tick.
    #[default]
    Searching,
    /// Accepted an invitation, waiting for the confirmation.
    Pending,
    /// Paired and serving `destination`.
    Active,
}

/// The current pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CooperationSession {
    /// The other ship of the pair.
    pub partner: Option<Address>,
    /// The ship the pair drives the crane to.
    pub destination: Option<Address>,
    /// Handshake progress.
    pub status: CoopStatus,
}

/// The cooperation state machine of one ship.
#[derive(Debug, Clone, Default)]
pub struct Negotiator {
    policy: NearestPolicy,
    session: CooperationSession,
    tactic: Tactic,
}

impl Negotiator {
    /// A searching negotiator.
    pub fn new(policy: NearestPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// The current session.
    pub const fn session(&self) -> CooperationSession {
        self.session
    }

    /// The nearest other ship to this one under the configured policy.
    ///
    /// Ties go to the lowest address.
    pub fn nearest_neighbour(&self, view: &ShipView<'_>) -> Option<Address> {
        let here = view.registry.lookup(view.me)?.position;
        view.others()
            .into_iter()
            .filter_map(|addr| view.registry.lookup(addr).copied())
            .filter(|r| self.policy == NearestPolicy::AnyShip || !r.cargo_loaded)
            .min_by_key(|r| (r.position.distance(here), r.address))
            .map(|r| r.address)
    }

    fn reset(&mut self) {
        self.session = CooperationSession::default();
        self.tactic = Tactic::DoNothing;
    }

    fn enter(&mut self, status: CoopStatus, partner: Address, destination: Address) {
        self.session = CooperationSession {
            partner: Some(partner),
            destination: Some(destination),
            status,
        };
        self.tactic = Tactic::ToAddress(destination);
    }

    /// While active: hand over or retire once the destination is served.
    fn check_active(&mut self, view: &ShipView<'_>) {
        let (Some(partner), Some(destination)) = (self.session.partner, self.session.destination)
        else {
            self.reset();
            return;
        };
        if view.registry.cargo_status(destination).is_pending() {
            return;
        }
        let other = if destination == view.me { partner } else { view.me };
        if view.registry.cargo_status(other).is_pending() {
            info!(ship = %view.me, destination = %other, "Cooperation hands over");
            self.enter(CoopStatus::Active, partner, other);
        } else {
            info!(ship = %view.me, partner = %partner, "Cooperation finished");
            self.reset();
        }
    }

    fn on_start(&mut self, sender: Address, view: &ShipView<'_>) -> Vec<Action> {
        let refuse = Message::AnswerCoop {
            coop_addr: view.me,
            agreement: false,
        };
        if self.session.status == CoopStatus::Active {
            let reply = match (self.session.partner, self.session.destination) {
                (Some(partner), Some(destination)) if partner == sender => Message::AnswerCoop {
                    coop_addr: destination,
                    agreement: true,
                },
                _ => refuse,
            };
            return vec![Action::Unicast(sender, reply)];
        }
        if self.nearest_neighbour(view) != Some(sender) {
            debug!(ship = %view.me, inviter = %sender, "Invitation from a ship that is not nearest");
            return vec![Action::Unicast(sender, refuse)];
        }
        match choose_destination(sender, view.me, view) {
            Some(destination) => {
                self.enter(CoopStatus::Pending, sender, destination);
                vec![Action::Unicast(
                    sender,
                    Message::AnswerCoop {
                        coop_addr: destination,
                        agreement: true,
                    },
                )]
            }
            None => vec![Action::Unicast(sender, refuse)],
        }
    }

    fn on_answer(
        &mut self,
        sender: Address,
        coop_addr: Address,
        agreement: bool,
        view: &ShipView<'_>,
    ) -> Vec<Action> {
        if self.session.status == CoopStatus::Active {
            return Vec::new();
        }
        let expected = choose_destination(view.me, sender, view);
        let consistent = agreement
            && self.nearest_neighbour(view) == Some(sender)
            && expected == Some(coop_addr);
        if consistent {
            info!(ship = %view.me, partner = %sender, destination = %coop_addr, "Cooperation active");
            self.enter(CoopStatus::Active, sender, coop_addr);
        }
        vec![Action::Unicast(
            sender,
            Message::ConfirmCoop {
                coop_addr,
                agreement: consistent,
            },
        )]
    }

    fn on_confirm(&mut self, sender: Address, coop_addr: Address, agreement: bool, me: Address) {
        if self.session.partner != Some(sender) {
            return;
        }
        match self.session.status {
            CoopStatus::Pending if agreement && (coop_addr == sender || coop_addr == me) => {
                info!(ship = %me, partner = %sender, destination = %coop_addr, "Cooperation active");
                self.enter(CoopStatus::Active, sender, coop_addr);
            }
            CoopStatus::Pending => self.reset(),
            CoopStatus::Active | CoopStatus::Searching => {}
        }
    }
}

/// The ship of the pair the crane should serve first.
///
/// Only ships still waiting for cargo qualify; of two, the one nearer the
/// crane wins, an exact tie goes to the lower address so that both sides
/// of a crossed handshake agree. `None` when both are served.
pub fn choose_destination(a: Address, b: Address, view: &ShipView<'_>) -> Option<Address> {
    let crane = view.crane.position;
    let candidate = |addr: Address| {
        view.registry
            .lookup(addr)
            .filter(|r| !r.cargo_loaded)
            .map(|r| (r.position.distance(crane), addr))
    };
    match (candidate(a), candidate(b)) {
        (Some(x), Some(y)) => Some(x.min(y).1),
        (Some((_, only)), None) | (None, Some((_, only))) => Some(only),
        (None, None) => None,
    }
}

impl Coordinator for Negotiator {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Cooperation
    }

    fn tactic(&self) -> Tactic {
        self.tactic
    }

    fn on_tick(&mut self, view: &ShipView<'_>) -> Vec<Action> {
        if self.session.status == CoopStatus::Active {
            self.check_active(view);
            return Vec::new();
        }
        self.reset();
        match self.nearest_neighbour(view) {
            Some(neighbour) => vec![Action::Unicast(
                neighbour,
                Message::StartCoop { target: neighbour },
            )],
            None => {
                if view.registry.cargo_status(view.me).is_pending() {
                    self.tactic = Tactic::ToAddress(view.me);
                }
                Vec::new()
            }
        }
    }

    fn on_ship_message(
        &mut self,
        sender: Address,
        message: &Message,
        view: &ShipView<'_>,
    ) -> Vec<Action> {
        match *message {
            Message::StartCoop { target } if target == view.me => self.on_start(sender, view),
            Message::AnswerCoop {
                coop_addr,
                agreement,
            } => self.on_answer(sender, coop_addr, agreement, view),
            Message::ConfirmCoop {
                coop_addr,
                agreement,
            } => {
                self.on_confirm(sender, coop_addr, agreement, view.me);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }
}
