//! SRP6 arithmetic shared by the server and client roles.
//!
//! Conventions:
//! - `H()` is SHA-256.
//! - Big integers are read from and written to little-endian byte strings,
//!   padded to [`LARGE_SAFE_PRIME_LENGTH`] where they cross the wire.
//! - The account identifier is lowercased before hashing.

use crate::primes::{generator, large_safe_prime, large_safe_prime_le, GENERATOR, LARGE_SAFE_PRIME_LENGTH};
use num_bigint::BigUint;
use sha2::{Digest, Sha256};

pub const SHA256_HASH_LENGTH: usize = 32;

/// Size of `M1` and `M2`
pub const PROOF_LENGTH: usize = SHA256_HASH_LENGTH;

/// Size of the interleaved session key `K`
pub const SESSION_KEY_LENGTH: usize = SHA256_HASH_LENGTH * 2;

/// Size of a public value (`A` or `B`) on the wire
pub const PUBLIC_KEY_LENGTH: usize = LARGE_SAFE_PRIME_LENGTH;

/// Size of the password verifier on the wire and in account files
pub const PASSWORD_VERIFIER_LENGTH: usize = LARGE_SAFE_PRIME_LENGTH;

pub(crate) fn hash(parts: &[&[u8]]) -> [u8; SHA256_HASH_LENGTH] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

pub(crate) fn from_le(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_le(bytes)
}

/// Little-endian bytes of `value`, zero padded to the width of `N`
pub(crate) fn to_padded_le(value: &BigUint) -> [u8; LARGE_SAFE_PRIME_LENGTH] {
    let bytes = value.to_bytes_le();
    let mut out = [0u8; LARGE_SAFE_PRIME_LENGTH];
    let len = bytes.len().min(LARGE_SAFE_PRIME_LENGTH);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}

pub(crate) fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// `x = H(s | H(lower(I) | ":" | P))`
pub(crate) fn calculate_x(username: &str, password: &str, salt: &[u8]) -> BigUint {
    let identity = hash(&[
        normalize_username(username).as_bytes(),
        b":",
        password.as_bytes(),
    ]);
    from_le(&hash(&[salt, &identity]))
}

/// `v = g^x mod N`
pub(crate) fn calculate_password_verifier(
    username: &str,
    password: &str,
    salt: &[u8],
) -> [u8; PASSWORD_VERIFIER_LENGTH] {
    let x = calculate_x(username, password, salt);
    to_padded_le(&generator().modpow(&x, &large_safe_prime()))
}

/// `k = H(N | PAD(g))`
pub(crate) fn calculate_k() -> BigUint {
    let padded_generator = to_padded_le(&generator());
    from_le(&hash(&[&large_safe_prime_le(), &padded_generator]))
}

/// `B = (k * v + g^b) mod N`
pub(crate) fn calculate_server_public_key(verifier: &BigUint, private_key: &BigUint) -> BigUint {
    let prime = large_safe_prime();
    (calculate_k() * verifier + generator().modpow(private_key, &prime)) % &prime
}

/// `A = g^a mod N`
pub(crate) fn calculate_client_public_key(private_key: &BigUint) -> BigUint {
    generator().modpow(private_key, &large_safe_prime())
}

/// `u = H(A | B)`
pub(crate) fn calculate_u(client_public_key: &[u8], server_public_key: &[u8]) -> BigUint {
    from_le(&hash(&[client_public_key, server_public_key]))
}

/// Server side `S = (A * v^u)^b mod N`
pub(crate) fn calculate_server_s(
    client_public_key: &BigUint,
    verifier: &BigUint,
    u: &BigUint,
    server_private_key: &BigUint,
) -> BigUint {
    let prime = large_safe_prime();
    let base = (client_public_key * verifier.modpow(u, &prime)) % &prime;
    base.modpow(server_private_key, &prime)
}

/// Client side `S = (B - k * g^x)^(a + u * x) mod N`
pub(crate) fn calculate_client_s(
    server_public_key: &BigUint,
    x: &BigUint,
    client_private_key: &BigUint,
    u: &BigUint,
) -> BigUint {
    let prime = large_safe_prime();
    let kgx = (calculate_k() * generator().modpow(x, &prime)) % &prime;
    let base = ((server_public_key % &prime) + &prime - kgx) % &prime;
    base.modpow(&(client_private_key + u * x), &prime)
}

/// Interleaved hash of `S`: even and odd bytes hashed separately, digests interleaved
pub(crate) fn calculate_interleaved(s: &BigUint) -> [u8; SESSION_KEY_LENGTH] {
    let s = to_padded_le(s);

    let even: Vec<u8> = s.iter().step_by(2).copied().collect();
    let odd: Vec<u8> = s.iter().skip(1).step_by(2).copied().collect();

    let even = hash(&[&even]);
    let odd = hash(&[&odd]);

    let mut key = [0u8; SESSION_KEY_LENGTH];
    for i in 0..SHA256_HASH_LENGTH {
        key[i * 2] = even[i];
        key[i * 2 + 1] = odd[i];
    }
    key
}

/// `H(N) xor H(g)`
fn calculate_xor_hash() -> [u8; SHA256_HASH_LENGTH] {
    let prime = hash(&[&large_safe_prime_le()]);
    let generator = hash(&[&[GENERATOR]]);

    let mut out = [0u8; SHA256_HASH_LENGTH];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = prime[i] ^ generator[i];
    }
    out
}

/// `M1 = H(H(N) xor H(g) | H(lower(I)) | s | A | B | K)`
pub(crate) fn calculate_client_proof(
    username: &str,
    salt: &[u8],
    client_public_key: &[u8],
    server_public_key: &[u8],
    session_key: &[u8; SESSION_KEY_LENGTH],
) -> [u8; PROOF_LENGTH] {
    let username = hash(&[normalize_username(username).as_bytes()]);
    hash(&[
        &calculate_xor_hash(),
        &username,
        salt,
        client_public_key,
        server_public_key,
        session_key,
    ])
}

/// `M2 = H(A | M1 | K)`
pub(crate) fn calculate_server_proof(
    client_public_key: &[u8],
    client_proof: &[u8; PROOF_LENGTH],
    session_key: &[u8; SESSION_KEY_LENGTH],
) -> [u8; PROOF_LENGTH] {
    hash(&[client_public_key, client_proof, session_key])
}
