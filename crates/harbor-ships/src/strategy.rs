//! Choosing and building a ship's coordinator.

use harbor_types::Address;
use rand::rngs::SmallRng;

use crate::consensus::{ConsensusCoordinator, ConsensusEngine, ConsensusSettings};
use crate::cooperation::{NearestPolicy, Negotiator};
use crate::coordinator::{Coordinator, FixedTactic, StrategyKind};
use crate::neighbourhood::RootedStrategy;
use crate::tactics::AxisPriority;

/// Everything needed to build any coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategySettings {
    /// Which coordinator to run.
    pub kind: StrategyKind,
    /// Candidate filter for cooperation partners.
    pub nearest: NearestPolicy,
    /// Axis order used when weighting consensus proposals.
    pub axis: AxisPriority,
    /// Consensus timing and limits.
    pub consensus: ConsensusSettings,
    /// Weight of the preferred command in consensus proposals.
    pub preferred_weight: u32,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            kind: StrategyKind::default(),
            nearest: NearestPolicy::default(),
            axis: AxisPriority::default(),
            consensus: ConsensusSettings::default(),
            preferred_weight: 4,
        }
    }
}

impl StrategySettings {
    /// Build the configured coordinator for ship `me`.
    ///
    /// `rng` only feeds the consensus engine's proposals.
    pub fn build(&self, me: Address, rng: SmallRng) -> Box<dyn Coordinator> {
        match self.kind {
            StrategyKind::Cooperation => Box::new(Negotiator::new(self.nearest)),
            StrategyKind::Neighbourhood => Box::new(RootedStrategy::new()),
            StrategyKind::Consensus => Box::new(ConsensusCoordinator::new(
                ConsensusEngine::new(me, self.consensus, rng),
                self.preferred_weight,
                self.axis,
            )),
            StrategyKind::SelfServe => Box::new(FixedTactic::self_serve(me)),
            StrategyKind::Popular => Box::new(FixedTactic::popular()),
            StrategyKind::Idle => Box::new(FixedTactic::idle()),
        }
    }
}
