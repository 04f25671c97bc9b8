//! Randomized binary-free consensus on one crane command per crane round.
//!
//! A Ben-Or style protocol. Every ship enters a new crane round with a
//! random proposal drawn from [`ProposalWeights`] and then runs numbered
//! consensus rounds of two phases:
//!
//! 1. Broadcast the proposal and wait for a two-thirds quorum of phase-1
//!    votes. If one command holds a strict majority of the fleet, it is the
//!    tentative value; otherwise the ship is undecided.
//! 2. Broadcast the tentative value with a decided flag and wait for the
//!    same quorum of phase-2 votes. If at least half of them are decided
//!    on one value, that value is final. Otherwise the next round starts
//!    from a decided value seen (all decided votes of a round agree), or
//!    from a fresh random proposal that usually repeats the most common
//!    phase-1 value heard.
//!
//! A ship that reaches a decision plays one more round with the decided
//! value so that peers still working towards it keep their quorum. A phase
//! that misses its quorum retransmits once and then gives up on the crane
//! round. The engine is a plain state machine: callers feed it
//! messages and timer expiries and carry out the returned [`Effect`]s.

use std::collections::BTreeMap;
use std::time::Duration;

use harbor_types::{Address, Command, Message};
use rand::Rng;
use rand::rngs::SmallRng;
use tracing::{debug, info, warn};

use crate::coordinator::{Action, Coordinator, ShipView, StrategyKind};
use crate::tactics::{AxisPriority, Tactic, step_toward};

// ---------------------------------------------------------------------------
// Settings and proposal weights
// ---------------------------------------------------------------------------

/// Timing and limits of the consensus engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsensusSettings {
    /// How long a phase waits for its quorum before retransmitting.
    pub phase_timeout: Duration,
    /// Consensus rounds allowed within one crane round.
    pub max_rounds: u16,
    /// Retransmissions of a phase message before the crane round is
    /// abandoned.
    pub retransmits: u8,
}

impl Default for ConsensusSettings {
    fn default() -> Self {
        Self {
            phase_timeout: Duration::from_millis(250),
            max_rounds: 8,
            retransmits: 1,
        }
    }
}

/// Relative weights of the five voting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposalWeights {
    weights: [u32; 5],
}

impl ProposalWeights {
    /// Every command equally likely.
    pub const fn uniform() -> Self {
        Self { weights: [1; 5] }
    }

    /// `preferred` weighs `weight`, every other command 1.
    pub fn toward(preferred: Command, weight: u32) -> Self {
        let mut weights = [1; 5];
        if let Some(slot) = preferred.vote_index().and_then(|i| weights.get_mut(i)) {
            *slot = weight;
        }
        Self { weights }
    }

    /// Always propose `command`.
    pub fn only(command: Command) -> Self {
        let mut weights = [0; 5];
        match command.vote_index().and_then(|i| weights.get_mut(i)) {
            Some(slot) => *slot = 1,
            None => return Self::uniform(),
        }
        Self { weights }
    }

    /// Weight of `command`, zero for non-voting commands.
    pub fn weight_of(&self, command: Command) -> u32 {
        command
            .vote_index()
            .and_then(|i| self.weights.get(i))
            .copied()
            .unwrap_or(0)
    }

    /// Draw a command with probability proportional to its weight.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Command {
        let total = self
            .weights
            .iter()
            .fold(0_u32, |acc, w| acc.saturating_add(*w));
        if total == 0 {
            return Self::uniform().draw(rng);
        }
        let pick = rng.random_range(0..total);
        let mut cumulative: u32 = 0;
        for (command, weight) in Command::VOTING.iter().zip(self.weights.iter()) {
            cumulative = cumulative.saturating_add(*weight);
            if pick < cumulative {
                return *command;
            }
        }
        Command::PlaceCargo
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Chance that an undecided ship repeats the most common phase-1 value
/// instead of drawing from its weights.
const FOLLOW_MODE_PROBABILITY: f64 = 0.9;

/// Where the engine is within a crane round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusPhase {
    /// Waiting for the next crane round.
    Idle,
    /// Collecting proposals.
    Phase1,
    /// Collecting tentative values.
    Phase2,
}

/// Why a crane round was given up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// A phase missed its quorum after every retransmission.
    QuorumTimeout(ConsensusPhase),
    /// The consensus round limit was reached without a decision.
    RoundLimit,
}

/// Something the caller must carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Broadcast a consensus message to every ship.
    Broadcast(Message),
    /// (Re)arm the phase timer.
    ArmTimer(Duration),
    /// Cancel the phase timer.
    DisarmTimer,
    /// The fleet agreed on a command for this crane round.
    Decided {
        /// The agreed command.
        value: Command,
        /// Consensus round the decision was reached in.
        round: u16,
    },
    /// This crane round ends without a decision.
    Aborted(AbortReason),
}

/// A phase-2 vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ratification {
    value: Command,
    decided: bool,
}

/// Votes of one consensus round.
#[derive(Debug, Clone, Default)]
struct RoundVotes {
    proposals: BTreeMap<Address, Command>,
    ratifications: BTreeMap<Address, Ratification>,
}

impl RoundVotes {
    fn clear(&mut self) {
        self.proposals.clear();
        self.ratifications.clear();
    }
}

/// The consensus state machine of one ship.
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    me: Address,
    settings: ConsensusSettings,
    rng: SmallRng,
    weights: ProposalWeights,
    phase: ConsensusPhase,
    crane_round: u32,
    round: u16,
    fleet: usize,
    proposal: Command,
    ratification: Ratification,
    current: RoundVotes,
    ahead: RoundVotes,
    attempts: u8,
    decided: Option<Command>,
}

impl ConsensusEngine {
    /// An idle engine for ship `me`.
    pub fn new(me: Address, settings: ConsensusSettings, rng: SmallRng) -> Self {
        Self {
            me,
            settings,
            rng,
            weights: ProposalWeights::uniform(),
            phase: ConsensusPhase::Idle,
            crane_round: 0,
            round: 0,
            fleet: 1,
            proposal: Command::NoCommand,
            ratification: Ratification {
                value: Command::NoCommand,
                decided: false,
            },
            current: RoundVotes::default(),
            ahead: RoundVotes::default(),
            attempts: 0,
            decided: None,
        }
    }

    /// Current phase.
    pub const fn phase(&self) -> ConsensusPhase {
        self.phase
    }

    /// Current consensus round, starting at 1 in every crane round.
    pub const fn round(&self) -> u16 {
        self.round
    }

    /// Crane round the engine is working on.
    pub const fn crane_round(&self) -> u32 {
        self.crane_round
    }

    /// The value proposed in the current round.
    pub const fn proposal(&self) -> Command {
        self.proposal
    }

    /// The agreed value of the current crane round.
    pub const fn decided(&self) -> Option<Command> {
        self.decided
    }

    /// Phase-1 and phase-2 votes needed: two thirds of the fleet,
    /// rounded up.
    pub fn quorum(&self) -> usize {
        self.fleet
            .saturating_mul(2)
            .saturating_add(2)
            .checked_div(3)
            .unwrap_or(1)
            .max(1)
    }

    /// Phase-1 votes one value needs to become tentative: a strict
    /// majority of the fleet.
    pub fn majority(&self) -> usize {
        self.fleet
            .checked_div(2)
            .unwrap_or(0)
            .saturating_add(1)
    }

    /// Begin `crane_round` with `fleet` participants, this ship included.
    pub fn start_crane_round(
        &mut self,
        crane_round: u32,
        fleet: usize,
        weights: ProposalWeights,
    ) -> Vec<Effect> {
        self.crane_round = crane_round;
        self.fleet = fleet.max(1);
        self.weights = weights;
        self.round = 1;
        self.decided = None;
        self.current.clear();
        self.ahead.clear();

        let proposal = self.weights.draw(&mut self.rng);
        debug!(ship = %self.me, crane_round, proposal = %proposal, "Consensus starts");
        let mut effects = Vec::new();
        self.enter_phase1(proposal, &mut effects);
        self.drive(&mut effects);
        effects
    }

    /// Feed a message from `sender`. Non-consensus messages are ignored.
    pub fn on_message(&mut self, sender: Address, message: &Message) -> Vec<Effect> {
        let mut effects = Vec::new();
        let capacity = self.fleet;
        match *message {
            Message::ConsensusPhase1 {
                crane_round,
                round,
                value,
            } if value.is_vote() => {
                if let Some(votes) = self.votes_for(crane_round, round) {
                    store(&mut votes.proposals, sender, value, capacity);
                }
            }
            Message::ConsensusPhase2 {
                crane_round,
                round,
                value,
                decided,
            } if value.is_vote() || !decided => {
                if let Some(votes) = self.votes_for(crane_round, round) {
                    store(
                        &mut votes.ratifications,
                        sender,
                        Ratification { value, decided },
                        capacity,
                    );
                }
            }
            _ => return effects,
        }
        self.drive(&mut effects);
        effects
    }

    /// The phase timer fired.
    pub fn on_timeout(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.phase == ConsensusPhase::Idle {
            return effects;
        }
        if self.attempts < self.settings.retransmits {
            self.attempts = self.attempts.saturating_add(1);
            debug!(ship = %self.me, round = self.round, phase = ?self.phase, "Consensus retransmits");
            effects.push(Effect::Broadcast(self.phase_message()));
            effects.push(Effect::ArmTimer(self.settings.phase_timeout));
        } else if self.decided.is_some() {
            debug!(ship = %self.me, round = self.round, "Closing round after decision");
            self.phase = ConsensusPhase::Idle;
        } else {
            warn!(
                ship = %self.me,
                crane_round = self.crane_round,
                round = self.round,
                phase = ?self.phase,
                "Consensus quorum not reached"
            );
            effects.push(Effect::Aborted(AbortReason::QuorumTimeout(self.phase)));
            self.phase = ConsensusPhase::Idle;
        }
        effects
    }

    /// Buffers for a vote, or `None` if the vote is stale or too early.
    fn votes_for(&mut self, crane_round: u32, round: u16) -> Option<&mut RoundVotes> {
        if self.phase == ConsensusPhase::Idle || crane_round != self.crane_round {
            return None;
        }
        if round == self.round {
            Some(&mut self.current)
        } else if Some(round) == self.round.checked_add(1) {
            Some(&mut self.ahead)
        } else {
            None
        }
    }

    fn phase_message(&self) -> Message {
        match self.phase {
            ConsensusPhase::Phase2 => Message::ConsensusPhase2 {
                crane_round: self.crane_round,
                round: self.round,
                value: self.ratification.value,
                decided: self.ratification.decided,
            },
            ConsensusPhase::Phase1 | ConsensusPhase::Idle => Message::ConsensusPhase1 {
                crane_round: self.crane_round,
                round: self.round,
                value: self.proposal,
            },
        }
    }

    fn enter_phase1(&mut self, proposal: Command, effects: &mut Vec<Effect>) {
        self.phase = ConsensusPhase::Phase1;
        self.proposal = proposal;
        self.attempts = 0;
        self.current.proposals.insert(self.me, proposal);
        effects.push(Effect::Broadcast(self.phase_message()));
        effects.push(Effect::ArmTimer(self.settings.phase_timeout));
    }

    fn enter_phase2(&mut self, effects: &mut Vec<Effect>) {
        let (value, count) = most_common(self.current.proposals.values().copied())
            .unwrap_or((Command::NoCommand, 0));
        self.ratification = if let Some(decided) = self.decided {
            Ratification {
                value: decided,
                decided: true,
            }
        } else if count >= self.majority() {
            Ratification {
                value,
                decided: true,
            }
        } else {
            Ratification {
                value: Command::NoCommand,
                decided: false,
            }
        };
        self.phase = ConsensusPhase::Phase2;
        self.attempts = 0;
        self.current.ratifications.insert(self.me, self.ratification);
        effects.push(Effect::Broadcast(self.phase_message()));
        effects.push(Effect::ArmTimer(self.settings.phase_timeout));
    }

    /// Close the current consensus round on a phase-2 quorum.
    fn conclude_round(&mut self, effects: &mut Vec<Effect>) {
        if self.decided.is_some() {
            self.phase = ConsensusPhase::Idle;
            effects.push(Effect::DisarmTimer);
            return;
        }
        let received = self.current.ratifications.len();
        let decided_values = self
            .current
            .ratifications
            .values()
            .filter(|r| r.decided)
            .map(|r| r.value);
        let top = most_common(decided_values);

        if let Some((value, count)) = top {
            if count.saturating_mul(2) >= received {
                info!(
                    ship = %self.me,
                    crane_round = self.crane_round,
                    round = self.round,
                    value = %value,
                    "Consensus reached"
                );
                self.decided = Some(value);
                effects.push(Effect::Decided {
                    value,
                    round: self.round,
                });
                self.advance(value, effects);
                return;
            }
        }

        if self.round >= self.settings.max_rounds {
            debug!(ship = %self.me, crane_round = self.crane_round, "Consensus round limit");
            self.phase = ConsensusPhase::Idle;
            effects.push(Effect::DisarmTimer);
            effects.push(Effect::Aborted(AbortReason::RoundLimit));
            return;
        }

        let next = match top {
            Some((value, _)) => value,
            None => self.fresh_proposal(),
        };
        self.advance(next, effects);
    }

    /// Start the next consensus round proposing `proposal`.
    fn advance(&mut self, proposal: Command, effects: &mut Vec<Effect>) {
        self.round = self.round.saturating_add(1);
        self.current = std::mem::take(&mut self.ahead);
        self.enter_phase1(proposal, effects);
    }

    /// A new proposal when no decided value was seen.
    fn fresh_proposal(&mut self) -> Command {
        match most_common(self.current.proposals.values().copied()) {
            Some((mode, _)) if self.rng.random_bool(FOLLOW_MODE_PROBABILITY) => mode,
            _ => self.weights.draw(&mut self.rng),
        }
    }

    /// Advance through every phase whose quorum is already met.
    fn drive(&mut self, effects: &mut Vec<Effect>) {
        loop {
            let quorum = self.quorum();
            match self.phase {
                ConsensusPhase::Phase1 if self.current.proposals.len() >= quorum => {
                    self.enter_phase2(effects);
                }
                ConsensusPhase::Phase2 if self.current.ratifications.len() >= quorum => {
                    self.conclude_round(effects);
                }
                _ => break,
            }
        }
    }
}

/// Store `value` from `sender` unless the buffer is full of other ships.
fn store<V>(buffer: &mut BTreeMap<Address, V>, sender: Address, value: V, capacity: usize) {
    if !buffer.contains_key(&sender) && buffer.len() >= capacity {
        warn!(sender = %sender, capacity, "Consensus vote buffer full");
        return;
    }
    buffer.insert(sender, value);
}

/// The most frequent voting command and its count. Ties go to the lowest
/// command.
fn most_common(values: impl Iterator<Item = Command>) -> Option<(Command, usize)> {
    let mut counts = [0_usize; 5];
    for value in values {
        if let Some(slot) = value.vote_index().and_then(|i| counts.get_mut(i)) {
            *slot = slot.saturating_add(1);
        }
    }
    let mut best: Option<(Command, usize)> = None;
    for (command, count) in Command::VOTING.iter().zip(counts) {
        if count > 0 && best.is_none_or(|(_, top)| count > top) {
            best = Some((*command, count));
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Consensus-driven ship strategy.
///
/// Every crane round the fleet agrees on one command. Proposals lean
/// towards the move that brings the crane to the unserved ship nearest to
/// it, so honest ships with the same view converge quickly.
#[derive(Debug, Clone)]
pub struct ConsensusCoordinator {
    engine: ConsensusEngine,
    preferred_weight: u32,
    axis: AxisPriority,
}

impl ConsensusCoordinator {
    /// Wrap an engine.
    pub const fn new(engine: ConsensusEngine, preferred_weight: u32, axis: AxisPriority) -> Self {
        Self {
            engine,
            preferred_weight,
            axis,
        }
    }

    fn weights(&self, view: &ShipView<'_>) -> ProposalWeights {
        let crane = view.crane.position;
        view.registry.nearest_pending(crane).map_or_else(ProposalWeights::uniform, |target| {
            let preferred = if target.position == crane && view.crane.cargo_here {
                Command::NothingToDo
            } else {
                step_toward(crane, target.position, self.axis)
            };
            ProposalWeights::toward(preferred, self.preferred_weight)
        })
    }

    fn actions(me: Address, effects: Vec<Effect>) -> Vec<Action> {
        effects
            .into_iter()
            .filter_map(|effect| match effect {
                Effect::Broadcast(message) => Some(Action::Broadcast(message)),
                Effect::ArmTimer(delay) => Some(Action::ArmTimer(delay)),
                Effect::DisarmTimer => Some(Action::DisarmTimer),
                Effect::Decided { .. } => None,
                Effect::Aborted(reason) => {
                    debug!(ship = %me, reason = ?reason, "Consensus abandoned this crane round");
                    None
                }
            })
            .collect()
    }
}

impl Coordinator for ConsensusCoordinator {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Consensus
    }

    fn tactic(&self) -> Tactic {
        Tactic::ConsensusOnly
    }

    fn consensus_command(&self) -> Option<Command> {
        self.engine.decided()
    }

    fn on_tick(&mut self, _view: &ShipView<'_>) -> Vec<Action> {
        Vec::new()
    }

    fn on_crane_round(&mut self, view: &ShipView<'_>) -> Vec<Action> {
        let weights = self.weights(view);
        let effects = self
            .engine
            .start_crane_round(view.crane_round, view.fleet_size(), weights);
        Self::actions(view.me, effects)
    }

    fn on_ship_message(
        &mut self,
        sender: Address,
        message: &Message,
        view: &ShipView<'_>,
    ) -> Vec<Action> {
        let effects = self.engine.on_message(sender, message);
        Self::actions(view.me, effects)
    }

    fn on_timeout(&mut self, view: &ShipView<'_>) -> Vec<Action> {
        let effects = self.engine.on_timeout();
        Self::actions(view.me, effects)
    }
}
