//! Crane tactics: turning a ship's intent into the command it sends.
//!
//! Every strategy ends up choosing one [`Tactic`]. Right before the crane
//! round closes, the ship asks its tactic for the next command through the
//! [`Strategy`] capability. Movement tactics share [`go_to_destination`],
//! which steps the crane one cell towards a target and places cargo once
//! it is there.

use harbor_types::{Address, Command, CraneState, GridPoint};
use harbor_world::Registry;
use serde::Deserialize;

use crate::command_table::ObservedCommands;

/// Which axis the crane is moved along first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisPriority {
    /// Close the horizontal gap before the vertical one.
    #[default]
    XFirst,
    /// Close the vertical gap before the horizontal one.
    YFirst,
}

/// Movement preferences shared by every tactic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveSettings {
    /// Axis order for [`go_to_destination`].
    pub axis: AxisPriority,
    /// Place cargo whenever the crane stops over an unserved ship, even on
    /// the way to another target.
    pub always_place_cargo: bool,
}

impl Default for MoveSettings {
    fn default() -> Self {
        Self {
            axis: AxisPriority::XFirst,
            always_place_cargo: true,
        }
    }
}

/// What a ship knows when it picks its command.
#[derive(Clone, Copy)]
pub struct TacticContext<'a> {
    /// Last crane state heard.
    pub crane: CraneState,
    /// The ship's view of the fleet.
    pub registry: &'a dyn Registry,
    /// Commands heard from other ships this crane round.
    pub observed: &'a ObservedCommands,
    /// Value agreed by consensus this crane round, if any.
    pub consensus: Option<Command>,
    /// Movement preferences.
    pub moves: MoveSettings,
}

/// Anything that can pick the next crane command.
pub trait Strategy {
    /// The command to send for the current crane round.
    fn compute_next_command(&self, ctx: &TacticContext<'_>) -> Command;
}

/// The crane tactic a ship currently follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tactic {
    /// Abstain.
    #[default]
    DoNothing,
    /// Drive the crane to a ship and load it.
    ToAddress(Address),
    /// Drive the crane to a cell and place cargo there.
    ToLocation(GridPoint),
    /// Repeat what another ship sent this round.
    Parrot(Address),
    /// Send the most popular command heard this round.
    Popular,
    /// Send whatever the fleet agreed on by consensus.
    ConsensusOnly,
}

impl Strategy for Tactic {
    fn compute_next_command(&self, ctx: &TacticContext<'_>) -> Command {
        match *self {
            Self::DoNothing => Command::NothingToDo,
            Self::ToAddress(ship) => match ctx.registry.lookup(ship) {
                Some(record) if !record.cargo_loaded => go_to_destination(record.position, ctx),
                _ => Command::NothingToDo,
            },
            Self::ToLocation(target) => go_to_destination(target, ctx),
            Self::Parrot(ship) => ctx
                .observed
                .last_from(ship)
                .unwrap_or(Command::NothingToDo),
            Self::Popular => ctx.observed.most_popular().unwrap_or(Command::NothingToDo),
            Self::ConsensusOnly => ctx.consensus.unwrap_or(Command::NothingToDo),
        }
    }
}

/// One command that brings the crane closer to `target`.
///
/// If cargo was not placed at the crane's cell last round and an unserved
/// ship is moored there, `always_place_cargo` places cargo first. At the
/// target the answer is `PlaceCargo` until cargo is placed, then
/// `NothingToDo` for as long as the crane stays.
pub fn go_to_destination(target: GridPoint, ctx: &TacticContext<'_>) -> Command {
    let crane = ctx.crane;
    if !crane.cargo_here && ctx.moves.always_place_cargo {
        let unserved_here = ctx
            .registry
            .ship_at(crane.position)
            .is_some_and(|ship| ctx.registry.cargo_status(ship).is_pending());
        if unserved_here {
            return Command::PlaceCargo;
        }
    }
    if crane.position == target {
        return if crane.cargo_here {
            Command::NothingToDo
        } else {
            Command::PlaceCargo
        };
    }
    step_toward(crane.position, target, ctx.moves.axis)
}

/// The single move from `from` towards `to`, or `PlaceCargo` when they
/// coincide.
pub fn step_toward(from: GridPoint, to: GridPoint, axis: AxisPriority) -> Command {
    let horizontal = match from.x.cmp(&to.x) {
        core::cmp::Ordering::Less => Some(Command::Right),
        core::cmp::Ordering::Greater => Some(Command::Left),
        core::cmp::Ordering::Equal => None,
    };
    let vertical = match from.y.cmp(&to.y) {
        core::cmp::Ordering::Less => Some(Command::Up),
        core::cmp::Ordering::Greater => Some(Command::Down),
        core::cmp::Ordering::Equal => None,
    };
    let (first, second) = match axis {
        AxisPriority::XFirst => (horizontal, vertical),
        AxisPriority::YFirst => (vertical, horizontal),
    };
    first.or(second).unwrap_or(Command::PlaceCargo)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use harbor_types::{GridBounds, ShipRecord};
    use harbor_world::ShipTable;

    use super::*;

    fn fleet() -> ShipTable {
        let mut t = ShipTable::new();
        t.insert(ShipRecord::new(Address(1), GridPoint::new(5, 8), 600));
        t.insert(ShipRecord::new(Address(2), GridPoint::new(12, 3), 600));
        t
    }

    fn ctx<'a>(
        crane: CraneState,
        registry: &'a ShipTable,
        observed: &'a ObservedCommands,
        axis: AxisPriority,
    ) -> TacticContext<'a> {
        TacticContext {
            crane,
            registry,
            observed,
            consensus: None,
            moves: MoveSettings {
                axis,
                always_place_cargo: true,
            },
        }
    }

    #[test]
    fn axis_priority_selects_first_move() {
        let from = GridPoint::new(2, 2);
        let to = GridPoint::new(5, 8);
        assert_eq!(step_toward(from, to, AxisPriority::XFirst), Command::Right);
        assert_eq!(step_toward(from, to, AxisPriority::YFirst), Command::Up);
        assert_eq!(step_toward(to, from, AxisPriority::XFirst), Command::Left);
        assert_eq!(step_toward(to, from, AxisPriority::YFirst), Command::Down);
        assert_eq!(step_toward(to, to, AxisPriority::XFirst), Command::PlaceCargo);
    }

    #[test]
    fn driving_to_a_ship_reaches_it_and_loads_once() {
        let mut reg = fleet();
        let observed = ObservedCommands::new();
        let mut crane = CraneState::at(GridPoint::new(20, 20));
        let tactic = Tactic::ToAddress(Address(1));
        let mut placed = false;
        for _ in 0..60 {
            let command = tactic.compute_next_command(&ctx(crane, &reg, &observed, AxisPriority::XFirst));
            if command == Command::NothingToDo {
                break;
            }
            crane.apply(command, GridBounds::STANDARD);
            if command == Command::PlaceCargo {
                placed = true;
                let ship = reg.ship_at(crane.position);
                assert_eq!(ship, Some(Address(1)));
                reg.mark_cargo_delivered(Address(1));
            }
        }
        assert!(placed);
        assert_eq!(crane.position, GridPoint::new(5, 8));
    }

    #[test]
    fn go_to_destination_is_a_fixpoint_at_target() {
        let reg = fleet();
        let observed = ObservedCommands::new();
        let target = GridPoint::new(9, 9);
        let mut crane = CraneState::at(target);
        crane.cargo_here = true;
        for _ in 0..10 {
            let c = ctx(crane, &reg, &observed, AxisPriority::YFirst);
            assert_eq!(go_to_destination(target, &c), Command::NothingToDo);
        }
        crane.cargo_here = false;
        let c = ctx(crane, &reg, &observed, AxisPriority::YFirst);
        assert_eq!(go_to_destination(target, &c), Command::PlaceCargo);
    }

    #[test]
    fn opportunistic_cargo_for_ship_under_crane() {
        let reg = fleet();
        let observed = ObservedCommands::new();
        // Crane passes over ship 2 on the way elsewhere.
        let crane = CraneState::at(GridPoint::new(12, 3));
        let c = ctx(crane, &reg, &observed, AxisPriority::XFirst);
        assert_eq!(go_to_destination(GridPoint::new(20, 20), &c), Command::PlaceCargo);

        let mut no_detour = c;
        no_detour.moves.always_place_cargo = false;
        assert_eq!(go_to_destination(GridPoint::new(20, 20), &no_detour), Command::Right);
    }

    #[test]
    fn to_address_abstains_for_served_or_unknown_ships() {
        let mut reg = fleet();
        reg.mark_cargo_delivered(Address(2));
        let observed = ObservedCommands::new();
        let c = ctx(CraneState::at(GridPoint::new(2, 2)), &reg, &observed, AxisPriority::XFirst);
        assert_eq!(Tactic::ToAddress(Address(2)).compute_next_command(&c), Command::NothingToDo);
        assert_eq!(Tactic::ToAddress(Address(9)).compute_next_command(&c), Command::NothingToDo);
    }

    #[test]
    fn observing_tactics_read_the_table() {
        let reg = fleet();
        let mut observed = ObservedCommands::new();
        let crane = CraneState::at(GridPoint::new(2, 2));
        {
            let c = ctx(crane, &reg, &observed, AxisPriority::XFirst);
            assert_eq!(Tactic::Parrot(Address(1)).compute_next_command(&c), Command::NothingToDo);
            assert_eq!(Tactic::Popular.compute_next_command(&c), Command::NothingToDo);
            assert_eq!(Tactic::ConsensusOnly.compute_next_command(&c), Command::NothingToDo);
            assert_eq!(Tactic::DoNothing.compute_next_command(&c), Command::NothingToDo);
        }
        observed.record(Address(1), Command::Down);
        observed.record(Address(2), Command::Down);
        let mut c = ctx(crane, &reg, &observed, AxisPriority::XFirst);
        c.consensus = Some(Command::Left);
        assert_eq!(Tactic::Parrot(Address(1)).compute_next_command(&c), Command::Down);
        assert_eq!(Tactic::Popular.compute_next_command(&c), Command::Down);
        assert_eq!(Tactic::ConsensusOnly.compute_next_command(&c), Command::Left);
    }

    #[test]
    fn to_location_drives_to_a_cell() {
        let reg = fleet();
        let observed = ObservedCommands::new();
        let c = ctx(CraneState::at(GridPoint::new(3, 3)), &reg, &observed, AxisPriority::YFirst);
        assert_eq!(
            Tactic::ToLocation(GridPoint::new(3, 10)).compute_next_command(&c),
            Command::Up
        );
    }
}
