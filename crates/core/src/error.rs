//! Core error types for Nexus

#[derive(thiserror::Error, Debug)]
pub enum NexusError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Authentication failed")]
    Authentication,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, NexusError>;
