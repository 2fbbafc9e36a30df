//! Nexus Core - Fundamental types and utilities shared by every tier

mod error;
mod types;
mod idgen;
mod positions;
mod token;
mod hex;

pub use error::*;
pub use types::*;
pub use idgen::*;
pub use positions::*;
pub use token::*;
pub use hex::*;
