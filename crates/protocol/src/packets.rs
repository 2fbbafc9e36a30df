//! # Realm Packets
//!
//! Message structures for the realm tier. Every field is bit-packed at the
//! codec cursor; the layouts below are listed in wire order.
//!
//! | Opcode | Message | Layout |
//! |--------|---------|--------|
//! | 0x058F | [`ClientHelloRealm`] | u32 build, 16-byte token, wide-string email |
//! | 0x0590 | [`ServerRejected`] | 5-bit reason, flush |
//! | 0x0591 | [`ServerRealmAccepted`] | u32 account, wide-string realm, 1-bit gm, 3-bit region, flush |
//! | 0x00F7 | [`ClientEnterWorld`] | u64 character id |
//! | 0x00F8 | [`ServerEnteredWorld`] | u64 character id, u32 map, 3 x f32 position |
//! | 0x0093 | [`ClientPing`] | u32 client time |
//! | 0x0094 | [`ServerPong`] | u32 echoed time |
//!
//! Every message implements both capabilities so that tooling can act as
//! either side; which ones a peer actually accepts is decided by the
//! [`OpcodeRegistry`](crate::OpcodeRegistry) it builds.

use crate::codec::{CodecResult, PacketReader, PacketWriter};
use crate::opcodes::Opcode;
use crate::registry::{Decodable, Encodable, Packet};
use nexus_core::{GameToken, Position, GAME_TOKEN_LENGTH};

/// First message on a realm connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHelloRealm {
    pub build: u32,
    /// Raw bytes of the game token issued by the login tier
    pub token: [u8; GAME_TOKEN_LENGTH],
    pub email: String,
}

impl ClientHelloRealm {
    pub fn game_token(&self) -> GameToken {
        GameToken::from_bytes(self.token)
    }
}

impl Packet for ClientHelloRealm {
    const OPCODE: Opcode = Opcode::CLIENT_HELLO_REALM;
    const NAME: &'static str = "ClientHelloRealm";
}

impl Decodable for ClientHelloRealm {
    fn decode(reader: &mut PacketReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            build: reader.read_u32()?,
            token: reader.read_array()?,
            email: reader.read_wide_string()?,
        })
    }
}

impl Encodable for ClientHelloRealm {
    fn encode(&self, writer: &mut PacketWriter) -> CodecResult<()> {
        writer.write_u32(self.build)?;
        writer.write_bytes(&self.token)?;
        writer.write_wide_string(&self.email)
    }
}

/// Why a realm connection or request was refused
///
/// Carried in 5 bits on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Unknown,
    /// Message not valid in the connection's current state
    WrongState,
    /// Token unknown, expired, already used, or for another account
    InvalidToken,
    /// Client build does not match the server's
    BuildMismatch,
    /// Body could not be decoded
    Malformed,
    /// Realm is at capacity
    RealmFull,
}

impl RejectReason {
    pub const BITS: u32 = 5;

    pub fn as_u8(self) -> u8 {
        match self {
            RejectReason::Unknown => 0,
            RejectReason::WrongState => 1,
            RejectReason::InvalidToken => 2,
            RejectReason::BuildMismatch => 3,
            RejectReason::Malformed => 4,
            RejectReason::RealmFull => 5,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => RejectReason::WrongState,
            2 => RejectReason::InvalidToken,
            3 => RejectReason::BuildMismatch,
            4 => RejectReason::Malformed,
            5 => RejectReason::RealmFull,
            _ => RejectReason::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerRejected {
    pub reason: RejectReason,
}

impl Packet for ServerRejected {
    const OPCODE: Opcode = Opcode::SERVER_REJECTED;
    const NAME: &'static str = "ServerRejected";
}

impl Decodable for ServerRejected {
    fn decode(reader: &mut PacketReader<'_>) -> CodecResult<Self> {
        let reason = RejectReason::from_u8(reader.read_bits(RejectReason::BITS)? as u8);
        reader.flush_bits();
        Ok(Self { reason })
    }
}

impl Encodable for ServerRejected {
    fn encode(&self, writer: &mut PacketWriter) -> CodecResult<()> {
        writer.write_bits(self.reason.as_u8() as u64, RejectReason::BITS)?;
        writer.flush_bits();
        Ok(())
    }
}

/// Sent once the game token checks out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRealmAccepted {
    pub account_id: u32,
    pub realm_name: String,
    pub gm: bool,
    /// 3-bit region code
    pub region: u8,
}

impl Packet for ServerRealmAccepted {
    const OPCODE: Opcode = Opcode::SERVER_REALM_ACCEPTED;
    const NAME: &'static str = "ServerRealmAccepted";
}

impl Decodable for ServerRealmAccepted {
    fn decode(reader: &mut PacketReader<'_>) -> CodecResult<Self> {
        let packet = Self {
            account_id: reader.read_u32()?,
            realm_name: reader.read_wide_string()?,
            gm: reader.read_bool()?,
            region: reader.read_bits(3)? as u8,
        };
        reader.flush_bits();
        Ok(packet)
    }
}

impl Encodable for ServerRealmAccepted {
    fn encode(&self, writer: &mut PacketWriter) -> CodecResult<()> {
        writer.write_u32(self.account_id)?;
        writer.write_wide_string(&self.realm_name)?;
        writer.write_bool(self.gm)?;
        writer.write_bits((self.region & 0x07) as u64, 3)?;
        writer.flush_bits();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientEnterWorld {
    pub character_id: u64,
}

impl Packet for ClientEnterWorld {
    const OPCODE: Opcode = Opcode::CLIENT_ENTER_WORLD;
    const NAME: &'static str = "ClientEnterWorld";
}

impl Decodable for ClientEnterWorld {
    fn decode(reader: &mut PacketReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            character_id: reader.read_u64()?,
        })
    }
}

impl Encodable for ClientEnterWorld {
    fn encode(&self, writer: &mut PacketWriter) -> CodecResult<()> {
        writer.write_u64(self.character_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServerEnteredWorld {
    pub character_id: u64,
    pub map_id: u32,
    pub position: Position,
}

impl Packet for ServerEnteredWorld {
    const OPCODE: Opcode = Opcode::SERVER_ENTERED_WORLD;
    const NAME: &'static str = "ServerEnteredWorld";
}

impl Decodable for ServerEnteredWorld {
    fn decode(reader: &mut PacketReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            character_id: reader.read_u64()?,
            map_id: reader.read_u32()?,
            position: Position::new(reader.read_f32()?, reader.read_f32()?, reader.read_f32()?),
        })
    }
}

impl Encodable for ServerEnteredWorld {
    fn encode(&self, writer: &mut PacketWriter) -> CodecResult<()> {
        writer.write_u64(self.character_id)?;
        writer.write_u32(self.map_id)?;
        writer.write_f32(self.position.x)?;
        writer.write_f32(self.position.y)?;
        writer.write_f32(self.position.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientPing {
    pub time: u32,
}

impl Packet for ClientPing {
    const OPCODE: Opcode = Opcode::CLIENT_PING;
    const NAME: &'static str = "ClientPing";
}

impl Decodable for ClientPing {
    fn decode(reader: &mut PacketReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            time: reader.read_u32()?,
        })
    }
}

impl Encodable for ClientPing {
    fn encode(&self, writer: &mut PacketWriter) -> CodecResult<()> {
        writer.write_u32(self.time)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerPong {
    pub time: u32,
}

impl Packet for ServerPong {
    const OPCODE: Opcode = Opcode::SERVER_PONG;
    const NAME: &'static str = "ServerPong";
}

impl Decodable for ServerPong {
    fn decode(reader: &mut PacketReader<'_>) -> CodecResult<Self> {
        Ok(Self {
            time: reader.read_u32()?,
        })
    }
}

impl Encodable for ServerPong {
    fn encode(&self, writer: &mut PacketWriter) -> CodecResult<()> {
        writer.write_u32(self.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode<T: Decodable>(bytes: &[u8]) -> T {
        T::decode(&mut PacketReader::new(bytes)).unwrap()
    }

    #[test]
    fn test_client_hello_layout() {
        let hello = ClientHelloRealm {
            build: 16042,
            token: [0xAB; GAME_TOKEN_LENGTH],
            email: "a@b".to_string(),
        };
        let raw = hello.to_raw().unwrap();
        assert_eq!(raw.opcode, Opcode::CLIENT_HELLO_REALM);

        let body = &raw.body[..];
        assert_eq!(&body[..4], &16042u32.to_le_bytes());
        assert_eq!(&body[4..20], &[0xAB; 16]);
        // 1 flag bit + 7 length bits = one byte holding len << 1
        assert_eq!(body[20], 3 << 1);
        assert_eq!(body.len(), 21 + 3 * 2);

        assert_eq!(decode::<ClientHelloRealm>(body), hello);
    }

    #[test]
    fn test_rejected_is_one_byte() {
        let raw = ServerRejected { reason: RejectReason::InvalidToken }.to_raw().unwrap();
        assert_eq!(&raw.body[..], &[2]);
        assert_eq!(
            decode::<ServerRejected>(&raw.body).reason,
            RejectReason::InvalidToken
        );
    }

    #[test]
    fn test_reject_reason_codes() {
        for code in 0..6u8 {
            assert_eq!(RejectReason::from_u8(code).as_u8(), code);
        }
        assert_eq!(RejectReason::from_u8(31), RejectReason::Unknown);
    }

    #[test]
    fn test_realm_accepted_trailing_bits() {
        let accepted = ServerRealmAccepted {
            account_id: 7,
            realm_name: String::new(),
            gm: true,
            region: 5,
        };
        let raw = accepted.to_raw().unwrap();
        // u32, empty string header (one byte), then gm + region packed into one byte
        assert_eq!(&raw.body[..], &[7, 0, 0, 0, 0, 0b1011]);
        assert_eq!(decode::<ServerRealmAccepted>(&raw.body), accepted);
    }

    #[test]
    fn test_entered_world() {
        let entered = ServerEnteredWorld {
            character_id: 42,
            map_id: 870,
            position: Position::new(1.5, -2.0, 300.25),
        };
        let raw = entered.to_raw().unwrap();
        assert_eq!(raw.body.len(), 8 + 4 + 12);
        assert_eq!(decode::<ServerEnteredWorld>(&raw.body), entered);
    }

    #[test]
    fn test_ping_pong_bodies() {
        let ping = ClientPing { time: 0x01020304 };
        assert_eq!(&ping.to_raw().unwrap().body[..], &[4, 3, 2, 1]);
        assert_eq!(ServerPong { time: 1 }.to_raw().unwrap().opcode, Opcode::SERVER_PONG);
    }

    #[test]
    fn test_truncated_hello() {
        let result = ClientHelloRealm::decode(&mut PacketReader::new(&[1, 2, 3]));
        assert!(result.is_err());
    }
}
