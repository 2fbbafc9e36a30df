//! # Nexus Crypto
//!
//! SRP6 password-authenticated key exchange (server role, plus a client
//! role for tests and tooling) and the session cipher that protects
//! traffic once a key exists.
//!
//! All operations are synchronous and CPU-only. The modular
//! exponentiations in [`SrpServer::server_credentials`] and
//! [`SrpChallenge::key_exchange`] are the expensive part of a login.

pub mod cipher;
pub mod client;
pub mod error;
pub mod primes;
pub mod server;
mod srp_internal;

pub use cipher::{CipherPair, CipherSlot, KeyMaterial, PacketCipher, CIPHER_KEY_LENGTH, DEFAULT_BUILD_KEY};
pub use client::{SrpClient, SrpClientProof};
pub use error::{CipherError, SrpError};
pub use primes::{large_safe_prime_le, GENERATOR, LARGE_SAFE_PRIME_LENGTH, SALT_LENGTH};
pub use server::{generate_salt, generate_verifier, SrpChallenge, SrpServer, SrpSession, SrpVerifier};
pub use srp_internal::{PASSWORD_VERIFIER_LENGTH, PROOF_LENGTH, PUBLIC_KEY_LENGTH, SESSION_KEY_LENGTH};
