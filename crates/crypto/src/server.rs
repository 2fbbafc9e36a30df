//! Server role of the SRP6 exchange.
//!
//! The exchange is modelled as a chain of states, each produced by
//! consuming or borrowing the previous one:
//!
//! ```text
//! SrpVerifier ──into_server──▶ SrpServer ──server_credentials──▶ SrpChallenge
//!                                                                   │
//!                                              key_exchange(A, M1)  ▼
//!                                                               SrpSession (+ M2)
//! ```
//!
//! [`SrpChallenge::key_exchange`] borrows the challenge, so a failed proof
//! leaves it exactly as it was. Nothing here ever sees a plaintext
//! password except [`generate_verifier`] at registration time.
//!
//! ```
//! use nexus_crypto::{SrpClient, SrpVerifier};
//!
//! let verifier = SrpVerifier::from_username_and_password("user@example.com", "hunter2");
//! let (server_public_key, challenge) = verifier.clone().into_server().server_credentials();
//!
//! let client = SrpClient::new("user@example.com", "hunter2");
//! let proof = client
//!     .calculate_proof(verifier.salt(), &server_public_key)
//!     .unwrap();
//!
//! let (session, server_proof) = challenge
//!     .key_exchange(&client.public_key(), proof.client_proof())
//!     .unwrap();
//! assert!(proof.verify_server_proof(&server_proof).is_ok());
//! assert_eq!(session.session_key(), proof.session_key());
//! ```

use crate::cipher::CIPHER_KEY_LENGTH;
use crate::error::SrpError;
use crate::primes::{large_safe_prime, LARGE_SAFE_PRIME_LENGTH, SALT_LENGTH};
use crate::srp_internal::{
    calculate_client_proof, calculate_interleaved, calculate_password_verifier,
    calculate_server_proof, calculate_server_public_key, calculate_server_s, calculate_u,
    from_le, to_padded_le, PASSWORD_VERIFIER_LENGTH, PROOF_LENGTH, PUBLIC_KEY_LENGTH,
    SESSION_KEY_LENGTH,
};
use num_bigint::{BigUint, RandBigInt};
use rand::RngCore;
use std::fmt;
use subtle::ConstantTimeEq;

/// Derive the password verifier for an account.
///
/// Deterministic for the same inputs; the username is compared
/// case-insensitively.
pub fn generate_verifier(
    salt: &[u8; SALT_LENGTH],
    username: &str,
    password: &str,
) -> [u8; PASSWORD_VERIFIER_LENGTH] {
    calculate_password_verifier(username, password, salt)
}

/// Fresh random salt
pub fn generate_salt() -> [u8; SALT_LENGTH] {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Stored credentials for one account: username, salt and verifier
#[derive(Clone, PartialEq, Eq)]
pub struct SrpVerifier {
    username: String,
    salt: [u8; SALT_LENGTH],
    verifier: [u8; PASSWORD_VERIFIER_LENGTH],
}

impl SrpVerifier {
    /// Create credentials for a new account with a random salt
    pub fn from_username_and_password(username: &str, password: &str) -> Self {
        let salt = generate_salt();
        Self {
            username: username.to_string(),
            salt,
            verifier: generate_verifier(&salt, username, password),
        }
    }

    /// Restore credentials previously stored for an account
    pub fn from_database_values(
        username: &str,
        salt: [u8; SALT_LENGTH],
        verifier: [u8; PASSWORD_VERIFIER_LENGTH],
    ) -> Self {
        Self {
            username: username.to_string(),
            salt,
            verifier,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub const fn salt(&self) -> &[u8; SALT_LENGTH] {
        &self.salt
    }

    pub const fn password_verifier(&self) -> &[u8; PASSWORD_VERIFIER_LENGTH] {
        &self.verifier
    }

    /// Start a server session with a fresh private exponent
    pub fn into_server(self) -> SrpServer {
        SrpServer::new(&self.username, self.salt, self.verifier)
    }
}

impl fmt::Debug for SrpVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SrpVerifier")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Server session before credentials have been sent
pub struct SrpServer {
    username: String,
    salt: [u8; SALT_LENGTH],
    verifier: BigUint,
    private_key: BigUint,
}

impl SrpServer {
    /// Generate a random private exponent `b` in `[1, N)`.
    pub fn new(username: &str, salt: [u8; SALT_LENGTH], verifier: [u8; PASSWORD_VERIFIER_LENGTH]) -> Self {
        let private_key = rand::thread_rng().gen_biguint_range(&BigUint::from(1u8), &large_safe_prime());
        Self::with_private_key(username, salt, verifier, private_key)
    }

    fn with_private_key(
        username: &str,
        salt: [u8; SALT_LENGTH],
        verifier: [u8; PASSWORD_VERIFIER_LENGTH],
        private_key: BigUint,
    ) -> Self {
        Self {
            username: username.to_string(),
            salt,
            verifier: from_le(&verifier),
            private_key,
        }
    }

    /// Compute `B` and move to the challenge state
    pub fn server_credentials(self) -> ([u8; PUBLIC_KEY_LENGTH], SrpChallenge) {
        let public_key = to_padded_le(&calculate_server_public_key(&self.verifier, &self.private_key));

        let challenge = SrpChallenge {
            username: self.username,
            salt: self.salt,
            verifier: self.verifier,
            private_key: self.private_key,
            public_key,
        };
        (public_key, challenge)
    }
}

impl fmt::Debug for SrpServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SrpServer")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Server session after `B` has been sent, waiting for the client's proof
pub struct SrpChallenge {
    username: String,
    salt: [u8; SALT_LENGTH],
    verifier: BigUint,
    private_key: BigUint,
    public_key: [u8; PUBLIC_KEY_LENGTH],
}

impl SrpChallenge {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub const fn salt(&self) -> &[u8; SALT_LENGTH] {
        &self.salt
    }

    pub const fn server_public_key(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.public_key
    }

    /// Verify the client's proof and derive the session key.
    ///
    /// Every failure, a degenerate `A` included, is reported as
    /// [`SrpError::InvalidProof`] or [`SrpError::InvalidLength`] with no
    /// indication of which check failed.
    pub fn key_exchange(
        &self,
        client_public_key: &[u8],
        client_proof: &[u8],
    ) -> Result<(SrpSession, [u8; PROOF_LENGTH]), SrpError> {
        if client_public_key.len() > LARGE_SAFE_PRIME_LENGTH {
            return Err(SrpError::InvalidLength(client_public_key.len()));
        }
        if client_proof.len() != PROOF_LENGTH {
            return Err(SrpError::InvalidLength(client_proof.len()));
        }

        let prime = large_safe_prime();
        let a = from_le(client_public_key);
        if (&a % &prime) == BigUint::from(0u8) {
            tracing::debug!("rejected degenerate client public key for {}", self.username);
            return Err(SrpError::InvalidProof);
        }

        let client_public_key = to_padded_le(&a);
        let u = calculate_u(&client_public_key, &self.public_key);
        let s = calculate_server_s(&a, &self.verifier, &u, &self.private_key);
        let session_key = calculate_interleaved(&s);

        let expected = calculate_client_proof(
            &self.username,
            &self.salt,
            &client_public_key,
            &self.public_key,
            &session_key,
        );

        if !bool::from(expected[..].ct_eq(client_proof)) {
            tracing::debug!("client proof mismatch for {}", self.username);
            return Err(SrpError::InvalidProof);
        }

        let mut proof = [0u8; PROOF_LENGTH];
        proof.copy_from_slice(client_proof);
        let server_proof = calculate_server_proof(&client_public_key, &proof, &session_key);

        Ok((
            SrpSession {
                username: self.username.clone(),
                session_key,
            },
            server_proof,
        ))
    }
}

impl fmt::Debug for SrpChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SrpChallenge")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// An authenticated session holding the derived key `K`
#[derive(Clone)]
pub struct SrpSession {
    username: String,
    session_key: [u8; SESSION_KEY_LENGTH],
}

impl SrpSession {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub const fn session_key(&self) -> &[u8; SESSION_KEY_LENGTH] {
        &self.session_key
    }

    /// Key material for the session cipher: the first 16 bytes of `K`
    pub fn cipher_key(&self) -> [u8; CIPHER_KEY_LENGTH] {
        cipher_key_from(&self.session_key)
    }
}

impl fmt::Debug for SrpSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SrpSession")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

pub(crate) fn cipher_key_from(session_key: &[u8; SESSION_KEY_LENGTH]) -> [u8; CIPHER_KEY_LENGTH] {
    let mut key = [0u8; CIPHER_KEY_LENGTH];
    key.copy_from_slice(&session_key[..CIPHER_KEY_LENGTH]);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SrpClient;
    use crate::primes::large_safe_prime_le;

    const USERNAME: &str = "tester@example.com";
    const PASSWORD: &str = "correct horse";

    fn challenge_for(password: &str) -> ([u8; PUBLIC_KEY_LENGTH], SrpChallenge, SrpVerifier) {
        let verifier = SrpVerifier::from_username_and_password(USERNAME, password);
        let (b, challenge) = verifier.clone().into_server().server_credentials();
        (b, challenge, verifier)
    }

    #[test]
    fn test_verifier_is_deterministic() {
        let salt = [7u8; SALT_LENGTH];
        assert_eq!(
            generate_verifier(&salt, USERNAME, PASSWORD),
            generate_verifier(&salt, USERNAME, PASSWORD)
        );
    }

    #[test]
    fn test_verifier_depends_on_salt() {
        assert_ne!(
            generate_verifier(&[1u8; SALT_LENGTH], USERNAME, PASSWORD),
            generate_verifier(&[2u8; SALT_LENGTH], USERNAME, PASSWORD)
        );
    }

    #[test]
    fn test_verifier_ignores_username_case() {
        let salt = [9u8; SALT_LENGTH];
        assert_eq!(
            generate_verifier(&salt, "Tester@Example.COM", PASSWORD),
            generate_verifier(&salt, USERNAME, PASSWORD)
        );
    }

    #[test]
    fn test_honest_client_is_accepted() {
        let (b, challenge, verifier) = challenge_for(PASSWORD);

        let client = SrpClient::new(USERNAME, PASSWORD);
        let proof = client.calculate_proof(verifier.salt(), &b).unwrap();

        let (session, server_proof) = challenge
            .key_exchange(&client.public_key(), proof.client_proof())
            .unwrap();

        assert_eq!(session.username(), USERNAME);
        assert_eq!(session.session_key(), proof.session_key());
        assert_eq!(session.cipher_key(), proof.cipher_key());
        assert!(proof.verify_server_proof(&server_proof).is_ok());
    }

    #[test]
    fn test_login_name_case_does_not_matter() {
        let (b, challenge, verifier) = challenge_for(PASSWORD);

        let client = SrpClient::new("TESTER@example.com", PASSWORD);
        let proof = client.calculate_proof(verifier.salt(), &b).unwrap();
        assert!(challenge
            .key_exchange(&client.public_key(), proof.client_proof())
            .is_ok());
    }

    #[test]
    fn test_wrong_password_leaves_challenge_usable() {
        let (b, challenge, verifier) = challenge_for(PASSWORD);

        let intruder = SrpClient::new(USERNAME, "wrong password");
        let bad = intruder.calculate_proof(verifier.salt(), &b).unwrap();
        assert_eq!(
            challenge
                .key_exchange(&intruder.public_key(), bad.client_proof())
                .unwrap_err(),
            SrpError::InvalidProof
        );

        // Same challenge, still unauthenticated, still able to verify the right password.
        assert_eq!(challenge.server_public_key(), &b);
        let client = SrpClient::new(USERNAME, PASSWORD);
        let good = client.calculate_proof(verifier.salt(), &b).unwrap();
        assert!(challenge
            .key_exchange(&client.public_key(), good.client_proof())
            .is_ok());
    }

    #[test]
    fn test_degenerate_client_key_is_rejected() {
        let (_, challenge, _) = challenge_for(PASSWORD);
        let proof = [0u8; PROOF_LENGTH];

        assert_eq!(
            challenge.key_exchange(&[0u8; PUBLIC_KEY_LENGTH], &proof).unwrap_err(),
            SrpError::InvalidProof
        );
        assert_eq!(
            challenge.key_exchange(&large_safe_prime_le(), &proof).unwrap_err(),
            SrpError::InvalidProof
        );
    }

    #[test]
    fn test_bad_lengths_are_rejected() {
        let (_, challenge, _) = challenge_for(PASSWORD);
        assert_eq!(
            challenge.key_exchange(&[1u8; 129], &[0u8; PROOF_LENGTH]).unwrap_err(),
            SrpError::InvalidLength(129)
        );
        assert_eq!(
            challenge.key_exchange(&[1u8; 32], &[0u8; 31]).unwrap_err(),
            SrpError::InvalidLength(31)
        );
    }

    #[test]
    fn test_fixed_private_key_gives_fixed_public_key() {
        let salt = [5u8; SALT_LENGTH];
        let verifier = generate_verifier(&salt, USERNAME, PASSWORD);

        let (first, _) = SrpServer::with_private_key(USERNAME, salt, verifier, BigUint::from(12345u32))
            .server_credentials();
        let (second, _) = SrpServer::with_private_key(USERNAME, salt, verifier, BigUint::from(12345u32))
            .server_credentials();
        assert_eq!(first, second);
    }

    #[test]
    fn test_debug_hides_secrets() {
        let verifier = SrpVerifier::from_username_and_password(USERNAME, PASSWORD);
        let output = format!("{:?}", verifier);
        assert!(output.contains(USERNAME));
        assert!(!output.contains("verifier:"));
    }
}
