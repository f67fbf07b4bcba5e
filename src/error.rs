//! Error types for order-bots.
//!
//! The scheduling engine itself is total: queue and pool operations never
//! fail under normal use. Errors only surface while wiring the engine up
//! (configuration, runtime, HTTP listener).

use std::net::SocketAddr;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Bot pool errors.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Bot pool must be created inside a tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// HTTP / WebSocket server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: SocketAddr, reason: String },

    #[error("Server stopped: {0}")]
    Serve(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
