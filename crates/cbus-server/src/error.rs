//! Error types for the simulator server

use std::net::SocketAddr;

use thiserror::Error;

/// Errors that can occur running the simulator server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Listener could not bind
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The simulator actor has shut down
    #[error("simulator stopped")]
    Stopped,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Layout or module error
    #[error("simulation error: {0}")]
    Sim(#[from] cbus_sim::SimError),

    /// Malformed configuration file
    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),

    /// Configuration values the server cannot run with
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type for server operations
pub type Result<T> = std::result::Result<T, ServerError>;
