//! # Realm Tier Opcodes
//!
//! Every binary-tier payload starts with a little-endian `u16` opcode. The
//! full client catalog runs to hundreds of entries owned by the game logic;
//! the entries below are the ones the protocol core itself produces or
//! consumes during the realm handshake.
//!
//! ## Naming Convention
//!
//! - `CLIENT_*` = sent by the game client
//! - `SERVER_*` = sent by the server
//! - `ENCRYPTED` = wrapper used in both directions

use std::fmt;

/// Numeric packet identifier on the binary tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Opcode(pub u16);

impl Opcode {
    /// Wrapper whose body is the ciphertext of an inner payload
    pub const ENCRYPTED: Opcode = Opcode(0x0244);

    /// Client presents its game token to the realm server
    ///
    /// # Packet Format
    /// ```text
    /// {u32 build}{16 bytes token}{WSTRING email}
    /// ```
    pub const CLIENT_HELLO_REALM: Opcode = Opcode(0x058F);

    /// Server rejects a request (wrong state, bad token, bad build)
    ///
    /// # Packet Format
    /// ```text
    /// {5 bits reason}{flush}
    /// ```
    pub const SERVER_REJECTED: Opcode = Opcode(0x0590);

    /// Token accepted, realm session established
    ///
    /// # Packet Format
    /// ```text
    /// {u32 account_id}{WSTRING realm_name}{1 bit gm}{3 bits region}{flush}
    /// ```
    pub const SERVER_REALM_ACCEPTED: Opcode = Opcode(0x0591);

    /// Client selects a character and enters the world
    ///
    /// # Packet Format
    /// ```text
    /// {u64 character_id}
    /// ```
    pub const CLIENT_ENTER_WORLD: Opcode = Opcode(0x00F7);

    /// Server confirms world entry
    ///
    /// # Packet Format
    /// ```text
    /// {u64 character_id}{u32 map_id}{f32 x}{f32 y}{f32 z}
    /// ```
    pub const SERVER_ENTERED_WORLD: Opcode = Opcode(0x00F8);

    /// Keep-alive from the client
    pub const CLIENT_PING: Opcode = Opcode(0x0093);

    /// Keep-alive answer echoing the client timestamp
    pub const SERVER_PONG: Opcode = Opcode(0x0094);

    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u16 {
        self.0
    }

    /// Symbolic name for opcodes the core knows about
    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::ENCRYPTED => Some("Encrypted"),
            Self::CLIENT_HELLO_REALM => Some("ClientHelloRealm"),
            Self::SERVER_REJECTED => Some("ServerRejected"),
            Self::SERVER_REALM_ACCEPTED => Some("ServerRealmAccepted"),
            Self::CLIENT_ENTER_WORLD => Some("ClientEnterWorld"),
            Self::SERVER_ENTERED_WORLD => Some("ServerEnteredWorld"),
            Self::CLIENT_PING => Some("ClientPing"),
            Self::SERVER_PONG => Some("ServerPong"),
            _ => None,
        }
    }
}

impl From<u16> for Opcode {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}(0x{:04X})", name, self.0),
            None => write!(f, "0x{:04X}", self.0),
        }
    }
}
