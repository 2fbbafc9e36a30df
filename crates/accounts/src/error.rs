//! Account-related errors

use thiserror::Error;

/// Account-related errors
#[derive(Error, Debug)]
pub enum AccountError {
    #[error("Account not found: {0}")]
    NotFound(String),

    #[error("Account already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid account file format: {0}")]
    InvalidFormat(String),

    #[error("Invalid account data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<AccountError> for nexus_core::NexusError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::NotFound(name) => nexus_core::NexusError::NotFound(name),
            AccountError::Io(e) => nexus_core::NexusError::Io(e),
            other => nexus_core::NexusError::InvalidData(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AccountError>;
