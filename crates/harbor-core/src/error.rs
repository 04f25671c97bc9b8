//! Errors surfaced by the runtime.

use crate::config::ConfigError;

/// Top-level failure of a game run.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// The configuration is unusable.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// A node task panicked or was cancelled.
    #[error("node {node} failed: {source}")]
    Node {
        /// Which node failed.
        node: String,
        /// The join failure.
        source: tokio::task::JoinError,
    },
}
