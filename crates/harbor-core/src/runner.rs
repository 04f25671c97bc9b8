//! Game runner.
//!
//! [`run_game`] builds the radio, one crane node and one node per ship,
//! runs them as tokio tasks until the crane declares the game over, then
//! stops the ships and collects a [`GameReport`].

use std::time::Duration;

use futures::future::join_all;
use harbor_crane::Crane;
use harbor_ships::Ship;
use harbor_types::{Address, CRANE_ADDRESS, GridPoint};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::GameConfig;
use crate::crane_node::{CraneNode, CraneReport, GameEnd};
use crate::error::GameError;
use crate::radio::Radio;
use crate::ship_node::{ShipNode, ShipSummary, ShipTiming};

/// Result of one game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameReport {
    /// Why the game ended.
    pub end: GameEnd,
    /// Crane rounds played.
    pub crane_rounds: u32,
    /// Where the crane stopped.
    pub final_position: GridPoint,
    /// Ships the crane registered, ascending.
    pub registered: Vec<Address>,
    /// Ships that received cargo, ascending.
    pub served: Vec<Address>,
    /// Each ship's own view at the end.
    pub ships: Vec<ShipSummary>,
}

impl GameReport {
    fn new(crane: CraneReport, ships: Vec<ShipSummary>) -> Self {
        Self {
            end: crane.end,
            crane_rounds: crane.crane_rounds,
            final_position: crane.final_state.position,
            registered: crane.ships.iter().map(|r| r.address).collect(),
            served: crane
                .ships
                .iter()
                .filter(|r| r.cargo_loaded)
                .map(|r| r.address)
                .collect(),
            ships,
        }
    }
}

/// Play one game to the end.
///
/// # Errors
///
/// Returns [`GameError::Config`] if the configuration is invalid, or
/// [`GameError::Node`] if a node task fails.
pub async fn run_game(config: &GameConfig) -> Result<GameReport, GameError> {
    config.validate()?;

    let mut seeds = config
        .game
        .seed
        .map_or_else(|| SmallRng::from_rng(&mut rand::rng()), SmallRng::seed_from_u64);
    let mut child = move || SmallRng::seed_from_u64(seeds.random());

    let radio = Radio::new(config.radio_settings());
    let (stop, shutdown) = watch::channel(false);
    let mut gates = Vec::new();

    // Every inbox is attached before any task runs, so nobody misses the
    // opening frames.
    let (crane_tx, crane_gate) = radio.transmitter(CRANE_ADDRESS);
    gates.push(crane_gate);
    let expected = config
        .game
        .end_when_all_served
        .then(|| usize::from(config.game.ship_count));
    let crane = CraneNode::new(
        Crane::new(config.crane_settings()),
        radio.attach(CRANE_ADDRESS, child()),
        crane_tx,
        config.round_interval(),
        expected,
    );

    let strategy = config.strategy_settings();
    let jitter_ms = config.ships.startup_jitter_ms;
    let mut ships = Vec::new();
    for address in config.ship_addresses() {
        let mut rng = child();
        let startup_delay = Duration::from_millis(rng.random_range(0..=jitter_ms));
        let timing = ShipTiming {
            strategy_tick: Duration::from_millis(config.ships.strategy_tick_ms),
            registry_tick: Duration::from_millis(config.ships.registry_tick_ms),
            round_interval: config.round_interval(),
            vote_lead: Duration::from_millis(config.ships.vote_lead_ms),
            startup_delay,
        };
        let ship = Ship::new(config.ship_settings(address), strategy.build(address, child()));
        let (tx, gate) = radio.transmitter(address);
        gates.push(gate);
        ships.push((address, ShipNode::new(ship, radio.attach(address, rng), tx, timing)));
    }

    info!(
        ships = ships.len(),
        strategy = ?strategy.kind,
        seed = ?config.game.seed,
        round_interval_ms = config.crane.round_interval_ms,
        duration_secs = config.game.duration_secs,
        loss_probability = config.radio.loss_probability,
        "Game starting"
    );

    let crane_task = tokio::spawn(crane.run(shutdown.clone()));
    let (addresses, ship_tasks): (Vec<_>, Vec<_>) = ships
        .into_iter()
        .map(|(address, node)| (address, tokio::spawn(node.run(shutdown.clone()))))
        .unzip();
    drop(radio);

    let crane_report = crane_task.await.map_err(|source| GameError::Node {
        node: CRANE_ADDRESS.to_string(),
        source,
    })?;

    if stop.send(true).is_err() {
        debug!("Every node already stopped");
    }
    let mut summaries = Vec::new();
    for (address, result) in addresses.iter().zip(join_all(ship_tasks).await) {
        let summary = result.map_err(|source| GameError::Node {
            node: address.to_string(),
            source,
        })?;
        summaries.push(summary);
    }
    for gate in join_all(gates).await {
        if let Err(e) = gate {
            warn!(error = %e, "Transmit gate failed");
        }
    }

    let report = GameReport::new(crane_report, summaries);
    log_game_end(&report);
    Ok(report)
}

/// Log the outcome of a game.
pub fn log_game_end(report: &GameReport) {
    info!(
        end = ?report.end,
        crane_rounds = report.crane_rounds,
        registered = report.registered.len(),
        served = report.served.len(),
        final_position = %report.final_position,
        "Game ended"
    );
    for ship in &report.ships {
        if !ship.registered {
            warn!(ship = %ship.address, "Ship never registered");
        }
    }
}
