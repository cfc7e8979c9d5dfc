use inkboard_core::config::ConfigError;
use thiserror::Error;

/// Fatal server startup and runtime errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid board configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}
