//! Errors raised by the SRP6 exchange and the session cipher.
//!
//! Neither error carries detail about which check failed. Callers turn
//! both into a generic rejection on the wire.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrpError {
    /// Proof mismatch or a degenerate public value
    #[error("invalid proof")]
    InvalidProof,

    /// A public value or salt does not fit the expected size
    #[error("value of {0} bytes has an invalid length")]
    InvalidLength(usize),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherError {
    /// No cipher is active for this direction
    #[error("invalid cipher")]
    InvalidCipher,

    /// Key material is missing, cleared, or all zero
    #[error("invalid key")]
    InvalidKey,
}

impl From<SrpError> for nexus_core::NexusError {
    fn from(_: SrpError) -> Self {
        nexus_core::NexusError::Authentication
    }
}

impl From<CipherError> for nexus_core::NexusError {
    fn from(err: CipherError) -> Self {
        nexus_core::NexusError::Crypto(err.to_string())
    }
}
