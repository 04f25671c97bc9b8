//! Crane command arbitration.
//!
//! Ships vote for the next crane move by sending crane commands. The
//! arbitrator keeps the latest vote of every known ship for the current
//! round. When the round timer fires it tallies the five voting commands,
//! applies the plurality winner (ties broken uniformly at random), and
//! clears the votes for the next round.
//!
//! # Round rules
//!
//! - Only registered ships vote; a later vote from the same ship in the
//!   same round replaces the earlier one.
//! - `CurrentLocation` is a request for a unicast location reply, not a
//!   vote. `NothingToDo` and `NoCommand` are abstentions.
//! - A round without votes leaves the crane where it is.
//! - The tie-break generator is seeded when the first radio message of the
//!   game arrives, not at construction.

use std::collections::BTreeMap;

use harbor_types::{Address, Command, CraneState, GridBounds, GridPoint, MAX_SHIPS};
use harbor_world::Registry;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

/// Number of voting commands, the histogram width.
const VOTE_BUCKETS: usize = Command::VOTING.len();

/// Tunables for the arbitrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbitratorSettings {
    /// Grid the crane is clamped to.
    pub bounds: GridBounds,
    /// Maximum number of distinct voters per round.
    pub max_voters: usize,
    /// Whether rounds without a winner still broadcast the crane state.
    pub broadcast_idle_rounds: bool,
}

impl Default for ArbitratorSettings {
    fn default() -> Self {
        Self {
            bounds: GridBounds::STANDARD,
            max_voters: MAX_SHIPS,
            broadcast_idle_rounds: true,
        }
    }
}

/// Result of submitting a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The command is this ship's vote for the round.
    Stored,
    /// The ship asked for the crane's location.
    LocationRequested,
    /// The command was dropped.
    Ignored(IgnoreReason),
}

/// Why a submitted command was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The sender is not a registered ship.
    UnknownShip,
    /// `NothingToDo` or `NoCommand`.
    Abstention,
    /// The round already holds the maximum number of voters.
    TableFull,
}

/// What happened at a round boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundOutcome {
    /// Rounds completed, including this one.
    pub crane_round: u32,
    /// Votes per command in [`Command::VOTING`] order.
    pub tally: [u32; VOTE_BUCKETS],
    /// The applied command, `None` when nobody voted.
    pub winner: Option<Command>,
    /// Crane state after the round.
    pub state: CraneState,
    /// Ship that received cargo this round, if any.
    pub delivered: Option<Address>,
    /// Whether the new state should be broadcast.
    pub broadcast: bool,
}

/// Collects votes and applies the plurality winner once per round.
#[derive(Debug, Clone)]
pub struct CommandArbitrator {
    settings: ArbitratorSettings,
    state: CraneState,
    votes: BTreeMap<Address, Command>,
    seed: Option<u64>,
    rng: Option<SmallRng>,
    crane_round: u32,
}

impl CommandArbitrator {
    /// A crane at `position` with no votes.
    ///
    /// With `seed` set the tie-break sequence is reproducible; otherwise it
    /// is drawn from the OS when the game starts.
    pub const fn new(settings: ArbitratorSettings, position: GridPoint, seed: Option<u64>) -> Self {
        Self {
            settings,
            state: CraneState::at(position),
            votes: BTreeMap::new(),
            seed,
            rng: None,
            crane_round: 0,
        }
    }

    /// Seed the tie-break generator if it has not been seeded yet.
    pub fn seed_on_first_message(&mut self) {
        if self.rng.is_none() {
            self.rng = Some(tie_break_rng(self.seed));
        }
    }

    /// Move the crane without a vote, e.g. to its randomized start cell.
    pub const fn place(&mut self, position: GridPoint) {
        self.state = CraneState::at(position);
    }

    /// Current crane state.
    pub const fn state(&self) -> CraneState {
        self.state
    }

    /// Rounds completed so far.
    pub const fn crane_round(&self) -> u32 {
        self.crane_round
    }

    /// Number of votes held for the current round.
    pub fn pending_votes(&self) -> usize {
        self.votes.len()
    }

    /// Submit `command` from `ship`.
    pub fn submit_command(
        &mut self,
        ship: Address,
        command: Command,
        registry: &dyn Registry,
    ) -> Submission {
        match command {
            Command::CurrentLocation => return Submission::LocationRequested,
            Command::NothingToDo | Command::NoCommand => {
                return Submission::Ignored(IgnoreReason::Abstention);
            }
            Command::Up | Command::Down | Command::Left | Command::Right | Command::PlaceCargo => {}
        }
        if registry.lookup(ship).is_none() {
            debug!(ship = %ship, command = %command, "Vote from unregistered ship dropped");
            return Submission::Ignored(IgnoreReason::UnknownShip);
        }
        if !self.votes.contains_key(&ship) && self.votes.len() >= self.settings.max_voters {
            warn!(ship = %ship, max_voters = self.settings.max_voters, "Vote table full");
            return Submission::Ignored(IgnoreReason::TableFull);
        }
        self.votes.insert(ship, command);
        Submission::Stored
    }

    /// Close the current round.
    ///
    /// A `PlaceCargo` win marks the ship moored under the crane (if any) as
    /// served in `registry`.
    pub fn on_round_timer(&mut self, registry: &mut dyn Registry) -> RoundOutcome {
        let tally = self.tally();
        let winner = if tally.iter().all(|c| *c == 0) {
            None
        } else {
            let seed = self.seed;
            let rng = self.rng.get_or_insert_with(|| tie_break_rng(seed));
            plurality_winner(&tally, rng)
        };

        let mut delivered = None;
        if let Some(command) = winner {
            self.state.apply(command, self.settings.bounds);
            if command == Command::PlaceCargo {
                delivered = registry
                    .ship_at(self.state.position)
                    .filter(|ship| registry.mark_cargo_delivered(*ship));
            }
        }

        self.votes.clear();
        self.crane_round = self.crane_round.saturating_add(1);

        let outcome = RoundOutcome {
            crane_round: self.crane_round,
            tally,
            winner,
            state: self.state,
            delivered,
            broadcast: winner.is_some() || self.settings.broadcast_idle_rounds,
        };
        match winner {
            Some(command) => info!(
                crane_round = outcome.crane_round,
                command = %command,
                position = %self.state.position,
                cargo_here = self.state.cargo_here,
                "Crane round applied"
            ),
            None => debug!(crane_round = outcome.crane_round, "Crane round without votes"),
        }
        outcome
    }

    fn tally(&self) -> [u32; VOTE_BUCKETS] {
        let mut counts = [0_u32; VOTE_BUCKETS];
        for command in self.votes.values() {
            if let Some(slot) = command.vote_index().and_then(|i| counts.get_mut(i)) {
                *slot = slot.saturating_add(1);
            }
        }
        counts
    }
}

fn tie_break_rng(seed: Option<u64>) -> SmallRng {
    seed.map_or_else(
        || SmallRng::from_rng(&mut rand::rng()),
        SmallRng::seed_from_u64,
    )
}

/// The command with the most votes, ties broken uniformly at random.
///
/// Returns `None` when every count is zero.
pub fn plurality_winner<R: Rng + ?Sized>(
    tally: &[u32; VOTE_BUCKETS],
    rng: &mut R,
) -> Option<Command> {
    let max = tally.iter().copied().max().filter(|m| *m > 0)?;
    let tied: Vec<Command> = Command::VOTING
        .iter()
        .zip(tally.iter())
        .filter(|(_, count)| **count == max)
        .map(|(command, _)| *command)
        .collect();
    let pick = rng.random_range(0..tied.len());
    tied.get(pick).copied()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use harbor_types::{GRID_LOWER_BOUND, GRID_UPPER_BOUND, ShipRecord};
    use harbor_world::ShipTable;

    use super::*;

    fn registry(ships: &[(u16, u8, u8)]) -> ShipTable {
        let mut table = ShipTable::new();
        for (addr, x, y) in ships {
            table.insert(ShipRecord::new(Address(*addr), GridPoint::new(*x, *y), 600));
        }
        table
    }

    fn arbitrator(position: GridPoint) -> CommandArbitrator {
        let mut arb = CommandArbitrator::new(ArbitratorSettings::default(), position, Some(42));
        arb.seed_on_first_message();
        arb
    }

    #[test]
    fn plurality_picks_a_maximum_bucket() {
        let mut rng = SmallRng::seed_from_u64(1);
        let tally = [1, 4, 2, 4, 0];
        for _ in 0..200 {
            let winner = plurality_winner(&tally, &mut rng).unwrap();
            assert!(winner == Command::Down || winner == Command::Right);
        }
        assert_eq!(
            plurality_winner(&[0, 0, 0, 0, 3], &mut rng),
            Some(Command::PlaceCargo)
        );
    }

    #[test]
    fn no_votes_leaves_crane_unchanged() {
        let mut reg = registry(&[(1, 5, 5)]);
        let mut arb = arbitrator(GridPoint::new(10, 10));
        let before = arb.state();
        let outcome = arb.on_round_timer(&mut reg);
        assert_eq!(outcome.winner, None);
        assert_eq!(outcome.state, before);
        assert!(outcome.broadcast);
        assert_eq!(outcome.crane_round, 1);
    }

    #[test]
    fn idle_rounds_can_stay_silent() {
        let mut reg = registry(&[]);
        let settings = ArbitratorSettings {
            broadcast_idle_rounds: false,
            ..ArbitratorSettings::default()
        };
        let mut arb = CommandArbitrator::new(settings, GridPoint::new(10, 10), Some(1));
        assert!(!arb.on_round_timer(&mut reg).broadcast);
    }

    #[test]
    fn tie_between_up_and_down_is_fair() {
        let mut rng = SmallRng::seed_from_u64(2024);
        let tally = [3, 3, 0, 0, 0];
        let trials = 4000;
        let ups = (0..trials)
            .filter(|_| plurality_winner(&tally, &mut rng) == Some(Command::Up))
            .count();
        // Expect roughly half; allow a wide band.
        assert!(ups > 1700 && ups < 2300, "ups = {ups}");
    }

    #[test]
    fn latest_vote_per_ship_wins() {
        let mut reg = registry(&[(1, 5, 5), (2, 6, 6)]);
        let mut arb = arbitrator(GridPoint::new(10, 10));
        assert_eq!(arb.submit_command(Address(1), Command::Up, &reg), Submission::Stored);
        assert_eq!(arb.submit_command(Address(1), Command::Left, &reg), Submission::Stored);
        assert_eq!(arb.submit_command(Address(2), Command::Left, &reg), Submission::Stored);
        assert_eq!(arb.pending_votes(), 2);
        let outcome = arb.on_round_timer(&mut reg);
        assert_eq!(outcome.winner, Some(Command::Left));
        assert_eq!(outcome.state.position, GridPoint::new(9, 10));
        assert_eq!(arb.pending_votes(), 0);
    }

    #[test]
    fn non_votes_and_strangers_are_dropped() {
        let reg = registry(&[(1, 5, 5)]);
        let mut arb = arbitrator(GridPoint::new(10, 10));
        assert_eq!(
            arb.submit_command(Address(1), Command::CurrentLocation, &reg),
            Submission::LocationRequested
        );
        assert_eq!(
            arb.submit_command(Address(1), Command::NothingToDo, &reg),
            Submission::Ignored(IgnoreReason::Abstention)
        );
        assert_eq!(
            arb.submit_command(Address(9), Command::Up, &reg),
            Submission::Ignored(IgnoreReason::UnknownShip)
        );
        assert_eq!(arb.pending_votes(), 0);
    }

    #[test]
    fn vote_table_is_bounded() {
        let reg = registry(&[(1, 2, 2), (2, 3, 3), (3, 4, 4)]);
        let settings = ArbitratorSettings {
            max_voters: 2,
            ..ArbitratorSettings::default()
        };
        let mut arb = CommandArbitrator::new(settings, GridPoint::new(10, 10), Some(1));
        assert_eq!(arb.submit_command(Address(1), Command::Up, &reg), Submission::Stored);
        assert_eq!(arb.submit_command(Address(2), Command::Up, &reg), Submission::Stored);
        assert_eq!(
            arb.submit_command(Address(3), Command::Up, &reg),
            Submission::Ignored(IgnoreReason::TableFull)
        );
        // An existing voter may still change its vote.
        assert_eq!(arb.submit_command(Address(2), Command::Down, &reg), Submission::Stored);
    }

    #[test]
    fn crane_is_clamped_at_both_bounds() {
        let mut reg = registry(&[(1, 5, 5)]);
        let low = GridPoint::new(GRID_LOWER_BOUND, GRID_LOWER_BOUND);
        let mut arb = arbitrator(low);
        arb.submit_command(Address(1), Command::Left, &reg);
        assert_eq!(arb.on_round_timer(&mut reg).state.position, low);
        arb.submit_command(Address(1), Command::Down, &reg);
        assert_eq!(arb.on_round_timer(&mut reg).state.position, low);

        let high = GridPoint::new(GRID_UPPER_BOUND, GRID_UPPER_BOUND);
        arb.place(high);
        arb.submit_command(Address(1), Command::Right, &reg);
        assert_eq!(arb.on_round_timer(&mut reg).state.position, high);
        arb.submit_command(Address(1), Command::Up, &reg);
        assert_eq!(arb.on_round_timer(&mut reg).state.position, high);
    }

    #[test]
    fn place_cargo_at_origin_sets_flag_without_delivery() {
        // Three ships vote PLACE_CARGO while the crane is still at its
        // power-on position.
        let mut reg = registry(&[(1, 5, 5), (2, 8, 8), (3, 12, 3)]);
        let mut arb = arbitrator(GridPoint::new(0, 0));
        for ship in 1..=3 {
            arb.submit_command(Address(ship), Command::PlaceCargo, &reg);
        }
        let outcome = arb.on_round_timer(&mut reg);
        assert_eq!(outcome.winner, Some(Command::PlaceCargo));
        assert_eq!(outcome.state.position, GridPoint::new(0, 0));
        assert!(outcome.state.cargo_here);
        assert_eq!(outcome.delivered, None);
        assert_eq!(outcome.tally, [0, 0, 0, 0, 3]);
    }

    #[test]
    fn place_cargo_marks_ship_under_crane_once() {
        let mut reg = registry(&[(1, 5, 5)]);
        let mut arb = arbitrator(GridPoint::new(5, 5));
        arb.submit_command(Address(1), Command::PlaceCargo, &reg);
        let first = arb.on_round_timer(&mut reg);
        assert_eq!(first.delivered, Some(Address(1)));
        assert!(reg.lookup(Address(1)).unwrap().cargo_loaded);

        arb.submit_command(Address(1), Command::PlaceCargo, &reg);
        assert_eq!(arb.on_round_timer(&mut reg).delivered, None);
    }

    #[test]
    fn moving_clears_cargo_flag() {
        let mut reg = registry(&[(1, 5, 5)]);
        let mut arb = arbitrator(GridPoint::new(5, 5));
        arb.submit_command(Address(1), Command::PlaceCargo, &reg);
        assert!(arb.on_round_timer(&mut reg).state.cargo_here);
        arb.submit_command(Address(1), Command::Up, &reg);
        assert!(!arb.on_round_timer(&mut reg).state.cargo_here);
    }
}
