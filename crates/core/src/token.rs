//! Game token handed from the STS tier to the realm tier
//!
//! The token is 16 random bytes. The client is shown a GUID string, while the
//! realm server compares the raw bytes the client echoes back, rendered as
//! uppercase hex. Both forms come from the same bytes but the GUID form
//! stores its first three groups little-endian, so the two strings do not
//! share a byte order.

use crate::hex::decode_hex_array;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a game token in bytes
pub const GAME_TOKEN_LENGTH: usize = 16;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameToken([u8; GAME_TOKEN_LENGTH]);

impl GameToken {
    pub const fn from_bytes(bytes: [u8; GAME_TOKEN_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh token from the thread-local CSPRNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; GAME_TOKEN_LENGTH];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; GAME_TOKEN_LENGTH] {
        &self.0
    }

    /// Client-facing GUID form, e.g. `33221100-5544-7766-8899-aabbccddeeff`
    pub fn display_form(&self) -> String {
        let b = &self.0;
        let data1 = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
        let data2 = u16::from_le_bytes([b[4], b[5]]);
        let data3 = u16::from_le_bytes([b[6], b[7]]);

        format!(
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            data1, data2, data3, b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
        )
    }

    /// Raw uppercase hex, in wire byte order
    pub fn raw_form(&self) -> String {
        self.0.iter().map(|b| format!("{:02X}", b)).collect()
    }

    /// Parse the raw uppercase (or lowercase) hex form back into a token
    pub fn from_raw_form(s: &str) -> Option<Self> {
        decode_hex_array(s).map(Self)
    }
}

// Never print the token bytes through Debug; they are a bearer credential.
impl fmt::Debug for GameToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GameToken(..)")
    }
}
