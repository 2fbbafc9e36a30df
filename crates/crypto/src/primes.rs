//! Fixed SRP6 group parameters.

use num_bigint::BigUint;

/// Size in bytes of the large safe prime, and of every public value on the wire
#[doc(alias = "N")]
pub const LARGE_SAFE_PRIME_LENGTH: usize = 128;

/// Size in bytes of an account salt
pub const SALT_LENGTH: usize = 16;

/// Generator `g`
#[doc(alias = "g")]
pub const GENERATOR: u8 = 2;

/// The 1024-bit safe prime `N` of RFC 5054, big endian.
///
/// Only here for reference; values on the wire are little endian, see
/// [`large_safe_prime_le`].
#[doc(alias = "N")]
pub const LARGE_SAFE_PRIME_BIG_ENDIAN: [u8; LARGE_SAFE_PRIME_LENGTH] = [
    0xee, 0xaf, 0x0a, 0xb9, 0xad, 0xb3, 0x8d, 0xd6, 0x9c, 0x33, 0xf8, 0x0a, 0xfa, 0x8f, 0xc5, 0xe8,
    0x60, 0x72, 0x61, 0x87, 0x75, 0xff, 0x3c, 0x0b, 0x9e, 0xa2, 0x31, 0x4c, 0x9c, 0x25, 0x65, 0x76,
    0xd6, 0x74, 0xdf, 0x74, 0x96, 0xea, 0x81, 0xd3, 0x38, 0x3b, 0x48, 0x13, 0xd6, 0x92, 0xc6, 0xe0,
    0xe0, 0xd5, 0xd8, 0xe2, 0x50, 0xb9, 0x8b, 0xe4, 0x8e, 0x49, 0x5c, 0x1d, 0x60, 0x89, 0xda, 0xd1,
    0x5d, 0xc7, 0xd7, 0xb4, 0x61, 0x54, 0xd6, 0xb6, 0xce, 0x8e, 0xf4, 0xad, 0x69, 0xb1, 0x5d, 0x49,
    0x82, 0x55, 0x9b, 0x29, 0x7b, 0xcf, 0x18, 0x85, 0xc5, 0x29, 0xf5, 0x66, 0x66, 0x0e, 0x57, 0xec,
    0x68, 0xed, 0xbc, 0x3c, 0x05, 0x72, 0x6c, 0xc0, 0x2f, 0xd4, 0xcb, 0xf4, 0x97, 0x6e, 0xaa, 0x9a,
    0xfd, 0x51, 0x38, 0xfe, 0x83, 0x76, 0x43, 0x5b, 0x9f, 0xc6, 0x1d, 0x2f, 0xc0, 0xeb, 0x06, 0xe3,
];

/// `N` in wire (little endian) byte order
pub fn large_safe_prime_le() -> [u8; LARGE_SAFE_PRIME_LENGTH] {
    let mut prime = LARGE_SAFE_PRIME_BIG_ENDIAN;
    prime.reverse();
    prime
}

pub(crate) fn large_safe_prime() -> BigUint {
    BigUint::from_bytes_be(&LARGE_SAFE_PRIME_BIG_ENDIAN)
}

pub(crate) fn generator() -> BigUint {
    BigUint::from(GENERATOR)
}
