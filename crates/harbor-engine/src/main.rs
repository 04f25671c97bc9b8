//! Harbor game engine.
//!
//! Plays one game of ships loading cargo with a shared crane over a
//! simulated radio, then prints the report as JSON on stdout.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from the path given as the first argument, else
//!    `harbor-config.yaml`, else defaults
//! 2. Initialize structured logging (tracing)
//! 3. Play the game
//! 4. Print the report

mod error;

use std::path::{Path, PathBuf};

use harbor_core::config::SEED_ENV;
use harbor_core::{GameConfig, run_game};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG: &str = "harbor-config.yaml";

#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config);
    info!(
        seed = ?config.game.seed,
        ships = config.game.ship_count,
        strategy = ?config.ships.strategy,
        "harbor-engine starting"
    );

    // 3. Play.
    let report = run_game(&config).await?;

    // 4. Report.
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn load_config() -> Result<GameConfig, EngineError> {
    let path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG), PathBuf::from);
    if path.exists() {
        return Ok(GameConfig::from_file(&path)?);
    }
    if path != Path::new(DEFAULT_CONFIG) {
        return Err(EngineError::Config {
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )
            .into(),
        });
    }
    let mut config = GameConfig::default();
    config.apply_seed_override(std::env::var(SEED_ENV).ok().as_deref())?;
    config.validate()?;
    Ok(config)
}

fn init_logging(config: &GameConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
