//! Rooted neighbourhoods.
//!
//! Each ship looks at itself and its two nearest neighbours, ranks the
//! three by distance to the crane and elects as root the first one still
//! waiting for cargo. The root drives the crane to itself; everyone else
//! parrots the root's command so the neighbourhood votes as one.
//!
//! Roots and followers announce themselves (`RootClaim`, `BranchInfo`).
//! When the elected root is itself following another root, a ship follows
//! that one instead, up to [`MAX_ROOT_HOPS`] hops.

use std::collections::BTreeMap;

use harbor_types::{Address, GridPoint, Message};
use harbor_world::Registry;
use tracing::debug;

use crate::coordinator::{Action, Coordinator, ShipView, StrategyKind};
use crate::tactics::Tactic;

/// Longest chain of announced roots followed from the elected one.
pub const MAX_ROOT_HOPS: usize = 3;

/// The two nearest other ships, nearest first. Ties go to the lower
/// address.
pub fn two_nearest(view: &ShipView<'_>) -> (Option<Address>, Option<Address>) {
    let Some(here) = view.registry.lookup(view.me).map(|r| r.position) else {
        return (None, None);
    };
    let mut others: Vec<(u16, Address)> = view
        .others()
        .into_iter()
        .filter_map(|addr| {
            view.registry
                .lookup(addr)
                .map(|r| (r.position.distance(here), addr))
        })
        .collect();
    others.sort_unstable();
    let mut nearest = others.into_iter().map(|(_, addr)| addr);
    (nearest.next(), nearest.next())
}

/// Order `entries` by distance to the crane, nearest first.
///
/// Missing and unknown entries count as infinitely far. The sort is
/// stable, so equal distances keep their input order.
pub fn rank(
    entries: [Option<Address>; 3],
    registry: &dyn Registry,
    crane: GridPoint,
) -> Vec<Option<Address>> {
    let mut ranked = entries.to_vec();
    ranked.sort_by_key(|entry| {
        entry
            .and_then(|addr| registry.distance_to_crane(addr, crane))
            .map_or(u32::MAX, u32::from)
    });
    ranked
}

/// The first ranked ship still waiting for cargo.
///
/// Ships of unknown status are skipped. `None` means the whole
/// neighbourhood has been served.
pub fn elect_root(ranked: &[Option<Address>], registry: &dyn Registry) -> Option<Address> {
    ranked
        .iter()
        .flatten()
        .copied()
        .find(|addr| registry.cargo_status(*addr).is_pending())
}

/// The rooted-neighbourhood coordinator.
#[derive(Debug, Clone, Default)]
pub struct RootedStrategy {
    tactic: Tactic,
    follows: BTreeMap<Address, Address>,
}

impl RootedStrategy {
    /// A strategy that has not ranked anything yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow announced roots from `root`, never revisiting a ship and
    /// never moving to a served one.
    fn resolve(&self, root: Address, view: &ShipView<'_>) -> Address {
        let mut current = root;
        let mut visited = vec![view.me, root];
        for _ in 0..MAX_ROOT_HOPS {
            match self.follows.get(&current) {
                Some(next)
                    if !visited.contains(next)
                        && view.registry.cargo_status(*next).is_pending() =>
                {
                    visited.push(*next);
                    current = *next;
                }
                _ => break,
            }
        }
        current
    }
}

impl Coordinator for RootedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Neighbourhood
    }

    fn tactic(&self) -> Tactic {
        self.tactic
    }

    fn on_tick(&mut self, view: &ShipView<'_>) -> Vec<Action> {
        let (n1, n2) = two_nearest(view);
        let ranked = rank([Some(view.me), n1, n2], view.registry, view.crane.position);
        match elect_root(&ranked, view.registry) {
            Some(root) if root == view.me => {
                self.tactic = Tactic::ToAddress(view.me);
                vec![Action::Broadcast(Message::RootClaim)]
            }
            Some(root) => {
                let resolved = self.resolve(root, view);
                if resolved != root {
                    debug!(ship = %view.me, elected = %root, following = %resolved, "Root chain resolved");
                }
                self.tactic = Tactic::Parrot(resolved);
                vec![Action::Broadcast(Message::BranchInfo { root: resolved })]
            }
            None => {
                self.tactic = Tactic::DoNothing;
                Vec::new()
            }
        }
    }

    fn on_ship_message(
        &mut self,
        sender: Address,
        message: &Message,
        _view: &ShipView<'_>,
    ) -> Vec<Action> {
        match *message {
            Message::RootClaim => {
                self.follows.remove(&sender);
            }
            Message::BranchInfo { root } if root != sender => {
                self.follows.insert(sender, root);
            }
            _ => {}
        }
        Vec::new()
    }
}
