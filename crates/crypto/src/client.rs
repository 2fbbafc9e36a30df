//! Client role of the SRP6 exchange, for tests and tooling.

use crate::cipher::CIPHER_KEY_LENGTH;
use crate::error::SrpError;
use crate::primes::{large_safe_prime, LARGE_SAFE_PRIME_LENGTH};
use crate::server::cipher_key_from;
use crate::srp_internal::{
    calculate_client_proof, calculate_client_public_key, calculate_client_s, calculate_interleaved,
    calculate_server_proof, calculate_u, calculate_x, from_le, to_padded_le, PROOF_LENGTH,
    PUBLIC_KEY_LENGTH, SESSION_KEY_LENGTH,
};
use num_bigint::{BigUint, RandBigInt};
use subtle::ConstantTimeEq;

/// Client credentials plus a random private exponent `a`
pub struct SrpClient {
    username: String,
    password: String,
    private_key: BigUint,
    public_key: [u8; PUBLIC_KEY_LENGTH],
}

impl SrpClient {
    pub fn new(username: &str, password: &str) -> Self {
        let private_key = rand::thread_rng().gen_biguint_range(&BigUint::from(1u8), &large_safe_prime());
        let public_key = to_padded_le(&calculate_client_public_key(&private_key));

        Self {
            username: username.to_string(),
            password: password.to_string(),
            private_key,
            public_key,
        }
    }

    /// `A`, little endian
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.public_key
    }

    /// Compute `M1` and `K` from the server's salt and `B`
    pub fn calculate_proof(&self, salt: &[u8], server_public_key: &[u8]) -> Result<SrpClientProof, SrpError> {
        if server_public_key.len() > LARGE_SAFE_PRIME_LENGTH {
            return Err(SrpError::InvalidLength(server_public_key.len()));
        }

        let b = from_le(server_public_key);
        if (&b % large_safe_prime()) == BigUint::from(0u8) {
            return Err(SrpError::InvalidProof);
        }
        let server_public_key = to_padded_le(&b);

        let x = calculate_x(&self.username, &self.password, salt);
        let u = calculate_u(&self.public_key, &server_public_key);
        let s = calculate_client_s(&b, &x, &self.private_key, &u);
        let session_key = calculate_interleaved(&s);

        let client_proof = calculate_client_proof(
            &self.username,
            salt,
            &self.public_key,
            &server_public_key,
            &session_key,
        );
        let expected_server_proof = calculate_server_proof(&self.public_key, &client_proof, &session_key);

        Ok(SrpClientProof {
            client_proof,
            session_key,
            expected_server_proof,
        })
    }
}

/// Client side result: `M1` to send, plus what it needs to check `M2`
pub struct SrpClientProof {
    client_proof: [u8; PROOF_LENGTH],
    session_key: [u8; SESSION_KEY_LENGTH],
    expected_server_proof: [u8; PROOF_LENGTH],
}

impl SrpClientProof {
    pub const fn client_proof(&self) -> &[u8; PROOF_LENGTH] {
        &self.client_proof
    }

    pub const fn session_key(&self) -> &[u8; SESSION_KEY_LENGTH] {
        &self.session_key
    }

    pub fn cipher_key(&self) -> [u8; CIPHER_KEY_LENGTH] {
        cipher_key_from(&self.session_key)
    }

    pub fn verify_server_proof(&self, server_proof: &[u8]) -> Result<(), SrpError> {
        if bool::from(self.expected_server_proof[..].ct_eq(server_proof)) {
            Ok(())
        } else {
            Err(SrpError::InvalidProof)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_is_padded() {
        let client = SrpClient::new("a@b.c", "pw");
        assert_eq!(client.public_key().len(), PUBLIC_KEY_LENGTH);
        assert_ne!(client.public_key(), [0u8; PUBLIC_KEY_LENGTH]);
    }

    #[test]
    fn test_zero_server_key_is_rejected() {
        let client = SrpClient::new("a@b.c", "pw");
        assert!(matches!(
            client.calculate_proof(&[0u8; 16], &[0u8; PUBLIC_KEY_LENGTH]),
            Err(SrpError::InvalidProof)
        ));
    }

    #[test]
    fn test_server_proof_mismatch() {
        let client = SrpClient::new("a@b.c", "pw");
        let proof = client.calculate_proof(&[1u8; 16], &[5u8; PUBLIC_KEY_LENGTH]).unwrap();
        assert_eq!(
            proof.verify_server_proof(&[0u8; PROOF_LENGTH]),
            Err(SrpError::InvalidProof)
        );
        assert_eq!(proof.verify_server_proof(&[]), Err(SrpError::InvalidProof));
    }
}
