//! Error types for the engine binary.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: harbor_core::ConfigError,
    },

    /// The game could not be played.
    #[error("game error: {source}")]
    Game {
        /// The underlying runner error.
        #[from]
        source: harbor_core::GameError,
    },

    /// The report could not be serialized.
    #[error("report error: {source}")]
    Report {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}
