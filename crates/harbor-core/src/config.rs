//! Configuration loading and typed config structures for a Harbor game.
//!
//! The configuration lives in `harbor-config.yaml`. Every field has a
//! default, so an empty file (or no file at all) describes a playable
//! game. Loading always validates; a configuration that parses but cannot
//! be played is rejected with [`ConfigError::Invalid`].

use std::path::Path;
use std::time::Duration;

use harbor_crane::{ArbitratorSettings, CraneSettings, StartPosition};
use harbor_ships::{
    AxisPriority, ConsensusSettings, MoveSettings, NearestPolicy, ShipSettings, StrategyKind,
    StrategySettings,
};
use harbor_types::{Address, CRANE_ADDRESS, GridBounds, GridPoint, MAX_SHIPS};
use harbor_world::LoadingWindow;
use serde::Deserialize;

use crate::radio::RadioSettings;

/// Environment variable that overrides `game.seed`.
pub const SEED_ENV: &str = "HARBOR_SEED";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parses but describes an impossible game.
    #[error("invalid config: {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Top-level game configuration.
///
/// Mirrors the structure of `harbor-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GameConfig {
    /// Game length, fleet size and seed.
    #[serde(default)]
    pub game: GameRulesConfig,

    /// Crane timing and start position.
    #[serde(default)]
    pub crane: CraneConfig,

    /// Ship strategy and timing.
    #[serde(default)]
    pub ships: ShipsConfig,

    /// Consensus engine parameters.
    #[serde(default)]
    pub consensus: ConsensusConfig,

    /// Simulated radio medium.
    #[serde(default)]
    pub radio: RadioConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GameConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `HARBOR_SEED`, when set, overrides `game.seed`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.apply_seed_override(std::env::var(SEED_ENV).ok().as_deref())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace `game.seed` with `raw`, if given.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `raw` is not an unsigned integer.
    pub fn apply_seed_override(&mut self, raw: Option<&str>) -> Result<(), ConfigError> {
        if let Some(raw) = raw {
            let seed = raw
                .trim()
                .parse::<u64>()
                .map_err(|e| invalid("game.seed", format!("{SEED_ENV}={raw:?}: {e}")))?;
            self.game.seed = Some(seed);
        }
        Ok(())
    }

    /// Reject configurations that cannot be played.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let game = &self.game;
        if game.ship_count == 0 || usize::from(game.ship_count) > MAX_SHIPS {
            return Err(invalid(
                "game.ship_count",
                format!("must be between 1 and {MAX_SHIPS}"),
            ));
        }
        if game.first_ship_address == 0
            || game.first_ship_address.checked_add(game.ship_count).is_none()
        {
            return Err(invalid(
                "game.first_ship_address",
                "ship addresses must fit in 1..=65535",
            ));
        }
        if game.duration_secs == 0 || game.duration_secs > u64::from(u16::MAX) {
            return Err(invalid(
                "game.duration_secs",
                format!("must be between 1 and {}", u16::MAX),
            ));
        }
        if game.min_loading_secs > game.max_loading_secs {
            return Err(invalid(
                "game.min_loading_secs",
                "must not exceed game.max_loading_secs",
            ));
        }

        let crane = &self.crane;
        if crane.round_interval_ms == 0 {
            return Err(invalid("crane.round_interval_ms", "must be positive"));
        }
        let outside = matches!(
            crane.start,
            StartPosition::Fixed { x, y } if !GridBounds::STANDARD.contains(GridPoint::new(x, y))
        );
        if outside {
            return Err(invalid("crane.start", "fixed start must lie inside the grid"));
        }

        let ships = &self.ships;
        if ships.strategy_tick_ms == 0 {
            return Err(invalid("ships.strategy_tick_ms", "must be positive"));
        }
        if ships.registry_tick_ms == 0 {
            return Err(invalid("ships.registry_tick_ms", "must be positive"));
        }
        if ships.vote_lead_ms >= crane.round_interval_ms {
            return Err(invalid(
                "ships.vote_lead_ms",
                "must be shorter than crane.round_interval_ms",
            ));
        }

        let consensus = &self.consensus;
        if consensus.phase_timeout_ms == 0 {
            return Err(invalid("consensus.phase_timeout_ms", "must be positive"));
        }
        if consensus.max_rounds == 0 {
            return Err(invalid("consensus.max_rounds", "must be positive"));
        }

        let radio = &self.radio;
        if !(0.0..=1.0).contains(&radio.loss_probability) {
            return Err(invalid("radio.loss_probability", "must be within 0.0..=1.0"));
        }
        if radio.queue_capacity == 0 {
            return Err(invalid("radio.queue_capacity", "must be positive"));
        }
        if radio.channel_capacity == 0 {
            return Err(invalid("radio.channel_capacity", "must be positive"));
        }
        Ok(())
    }

    /// Ship addresses, counting up from `game.first_ship_address` and
    /// skipping the crane's address.
    pub fn ship_addresses(&self) -> Vec<Address> {
        (self.game.first_ship_address..=u16::MAX)
            .map(Address)
            .filter(|addr| *addr != CRANE_ADDRESS)
            .take(usize::from(self.game.ship_count))
            .collect()
    }

    /// Settings for the crane state machine.
    pub fn crane_settings(&self) -> CraneSettings {
        CraneSettings {
            arbitrator: ArbitratorSettings {
                bounds: GridBounds::STANDARD,
                max_voters: MAX_SHIPS,
                broadcast_idle_rounds: self.crane.broadcast_idle_rounds,
            },
            power_on: GridPoint::new(self.crane.power_on_x, self.crane.power_on_y),
            start: self.crane.start,
            game_duration: Duration::from_secs(self.game.duration_secs),
            loading_window: LoadingWindow {
                min_secs: self.game.min_loading_secs,
                max_secs: self.game.max_loading_secs,
            },
            seed: self.game.seed,
        }
    }

    /// Strategy-independent settings for ship `address`.
    pub fn ship_settings(&self, address: Address) -> ShipSettings {
        ShipSettings {
            address,
            moves: MoveSettings {
                axis: self.ships.axis,
                always_place_cargo: self.ships.always_place_cargo,
            },
            broadcast_commands: self.ships.broadcast_commands,
        }
    }

    /// Settings for building each ship's coordinator.
    pub fn strategy_settings(&self) -> StrategySettings {
        StrategySettings {
            kind: self.ships.strategy,
            nearest: self.ships.nearest_policy,
            axis: self.ships.axis,
            consensus: ConsensusSettings {
                phase_timeout: Duration::from_millis(self.consensus.phase_timeout_ms),
                max_rounds: self.consensus.max_rounds,
                retransmits: self.consensus.retransmits,
            },
            preferred_weight: self.consensus.preferred_weight,
        }
    }

    /// Settings for the radio medium.
    pub fn radio_settings(&self) -> RadioSettings {
        RadioSettings {
            loss_probability: self.radio.loss_probability,
            airtime: Duration::from_millis(self.radio.airtime_ms),
            queue_capacity: self.radio.queue_capacity,
            channel_capacity: self.radio.channel_capacity,
        }
    }

    /// Length of one crane round.
    pub const fn round_interval(&self) -> Duration {
        Duration::from_millis(self.crane.round_interval_ms)
    }
}

/// Game-wide rules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GameRulesConfig {
    /// Seed for every random draw in the game. Unset means a fresh seed
    /// each run.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Game length in seconds, counted from the first radio message.
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,

    /// Number of ships taking part.
    #[serde(default = "default_ship_count")]
    pub ship_count: u16,

    /// Address of the first ship.
    #[serde(default = "default_first_ship_address")]
    pub first_ship_address: u16,

    /// Shortest loading deadline after registration, in seconds.
    #[serde(default = "default_min_loading_secs")]
    pub min_loading_secs: u16,

    /// Longest loading deadline after registration, in seconds.
    #[serde(default = "default_max_loading_secs")]
    pub max_loading_secs: u16,

    /// End the game as soon as every ship is registered and served.
    #[serde(default = "default_true")]
    pub end_when_all_served: bool,
}

impl Default for GameRulesConfig {
    fn default() -> Self {
        Self {
            seed: None,
            duration_secs: default_duration_secs(),
            ship_count: default_ship_count(),
            first_ship_address: default_first_ship_address(),
            min_loading_secs: default_min_loading_secs(),
            max_loading_secs: default_max_loading_secs(),
            end_when_all_served: true,
        }
    }
}

/// Crane configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CraneConfig {
    /// Length of one crane round in milliseconds.
    #[serde(default = "default_round_interval_ms")]
    pub round_interval_ms: u64,

    /// Broadcast the crane state even after a round without votes.
    #[serde(default = "default_true")]
    pub broadcast_idle_rounds: bool,

    /// Where the crane goes when the game starts.
    #[serde(default)]
    pub start: StartPosition,

    /// Horizontal power-on coordinate.
    #[serde(default)]
    pub power_on_x: u8,

    /// Vertical power-on coordinate.
    #[serde(default)]
    pub power_on_y: u8,
}

impl Default for CraneConfig {
    fn default() -> Self {
        Self {
            round_interval_ms: default_round_interval_ms(),
            broadcast_idle_rounds: true,
            start: StartPosition::default(),
            power_on_x: 0,
            power_on_y: 0,
        }
    }
}

/// Ship configuration, shared by every ship.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShipsConfig {
    /// Coordinator every ship runs.
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Candidate filter for cooperation partners.
    #[serde(default)]
    pub nearest_policy: NearestPolicy,

    /// Axis the crane is moved along first.
    #[serde(default)]
    pub axis: AxisPriority,

    /// Place cargo whenever the crane stops over an unserved ship.
    #[serde(default = "default_true")]
    pub always_place_cargo: bool,

    /// Broadcast crane votes so other ships can observe them.
    #[serde(default = "default_true")]
    pub broadcast_commands: bool,

    /// Strategy tick in milliseconds.
    #[serde(default = "default_strategy_tick_ms")]
    pub strategy_tick_ms: u64,

    /// Registry refresh period in milliseconds.
    #[serde(default = "default_registry_tick_ms")]
    pub registry_tick_ms: u64,

    /// How long before the end of a crane round the vote is sent, in
    /// milliseconds.
    #[serde(default = "default_vote_lead_ms")]
    pub vote_lead_ms: u64,

    /// Upper bound of the random delay before a ship first transmits, in
    /// milliseconds.
    #[serde(default = "default_startup_jitter_ms")]
    pub startup_jitter_ms: u64,
}

impl Default for ShipsConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            nearest_policy: NearestPolicy::default(),
            axis: AxisPriority::default(),
            always_place_cargo: true,
            broadcast_commands: true,
            strategy_tick_ms: default_strategy_tick_ms(),
            registry_tick_ms: default_registry_tick_ms(),
            vote_lead_ms: default_vote_lead_ms(),
            startup_jitter_ms: default_startup_jitter_ms(),
        }
    }
}

/// Consensus engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConsensusConfig {
    /// How long a phase waits for its quorum, in milliseconds.
    #[serde(default = "default_phase_timeout_ms")]
    pub phase_timeout_ms: u64,

    /// Consensus rounds allowed per crane round.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u16,

    /// Retransmissions before a phase gives up.
    #[serde(default = "default_retransmits")]
    pub retransmits: u8,

    /// Weight of the command towards the nearest unserved ship.
    #[serde(default = "default_preferred_weight")]
    pub preferred_weight: u32,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            phase_timeout_ms: default_phase_timeout_ms(),
            max_rounds: default_max_rounds(),
            retransmits: default_retransmits(),
            preferred_weight: default_preferred_weight(),
        }
    }
}

/// Radio medium configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RadioConfig {
    /// Probability that a receiver misses a frame.
    #[serde(default)]
    pub loss_probability: f64,

    /// Time on air per frame in milliseconds.
    #[serde(default = "default_airtime_ms")]
    pub airtime_ms: u64,

    /// Frames a node may queue for transmission.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Frames buffered on the air for slow receivers.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            loss_probability: 0.0,
            airtime_ms: default_airtime_ms(),
            queue_capacity: default_queue_capacity(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions for serde
// ---------------------------------------------------------------------------

const fn default_duration_secs() -> u64 {
    900
}

const fn default_ship_count() -> u16 {
    6
}

const fn default_first_ship_address() -> u16 {
    1
}

const fn default_min_loading_secs() -> u16 {
    150
}

const fn default_max_loading_secs() -> u16 {
    600
}

const fn default_round_interval_ms() -> u64 {
    3000
}

const fn default_strategy_tick_ms() -> u64 {
    1000
}

const fn default_registry_tick_ms() -> u64 {
    10_000
}

const fn default_vote_lead_ms() -> u64 {
    500
}

const fn default_startup_jitter_ms() -> u64 {
    200
}

const fn default_phase_timeout_ms() -> u64 {
    250
}

const fn default_max_rounds() -> u16 {
    8
}

const fn default_retransmits() -> u8 {
    1
}

const fn default_preferred_weight() -> u32 {
    4
}

const fn default_airtime_ms() -> u64 {
    5
}

const fn default_queue_capacity() -> usize {
    16
}

const fn default_channel_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}
