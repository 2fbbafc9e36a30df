//! # Opcode Registry
//!
//! Maps opcodes to names and to type-erased decode/encode functions.
//!
//! A message type opts into the capabilities it supports: an inbound-only
//! packet implements [`Decodable`], an outbound-only packet implements
//! [`Encodable`], and wrapper opcodes such as [`Opcode::ENCRYPTED`] may be
//! registered by name only. The registry is populated once at startup and
//! shared read-only behind an `Arc`.

use crate::codec::{CodecError, CodecResult, PacketReader, PacketWriter};
use crate::framing::RawPacket;
use crate::opcodes::Opcode;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Identity shared by every registered message type
pub trait Packet: Send + 'static {
    const OPCODE: Opcode;
    const NAME: &'static str;
}

/// A message that can be read from a frame body
pub trait Decodable: Packet + Sized {
    fn decode(reader: &mut PacketReader<'_>) -> CodecResult<Self>;
}

/// A message that can be written into a frame body
pub trait Encodable: Packet {
    fn encode(&self, writer: &mut PacketWriter) -> CodecResult<()>;

    /// Encode into a complete opcode + body packet
    fn to_raw(&self) -> CodecResult<RawPacket> {
        let mut writer = PacketWriter::new();
        self.encode(&mut writer)?;
        Ok(RawPacket::new(Self::OPCODE, writer.into_bytes()))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown opcode {0}")]
    UnknownOpcode(Opcode),

    #[error("opcode {0} has no decoder")]
    NotDecodable(Opcode),

    #[error("opcode {0} has no encoder")]
    NotEncodable(Opcode),

    #[error("value passed for opcode {0} has the wrong type")]
    TypeMismatch(Opcode),

    #[error("opcode {opcode}: {source}")]
    Codec {
        opcode: Opcode,
        #[source]
        source: CodecError,
    },
}

impl From<RegistryError> for nexus_core::NexusError {
    fn from(err: RegistryError) -> Self {
        nexus_core::NexusError::Protocol(err.to_string())
    }
}

type DecodeFn = fn(&mut PacketReader<'_>) -> CodecResult<Box<dyn Any + Send>>;
type EncodeFn = fn(&(dyn Any + Send), &mut PacketWriter) -> Result<(), RegistryError>;

fn decode_erased<T: Decodable>(reader: &mut PacketReader<'_>) -> CodecResult<Box<dyn Any + Send>> {
    Ok(Box::new(T::decode(reader)?))
}

fn encode_erased<T: Encodable>(value: &(dyn Any + Send), writer: &mut PacketWriter) -> Result<(), RegistryError> {
    let packet = value
        .downcast_ref::<T>()
        .ok_or(RegistryError::TypeMismatch(T::OPCODE))?;

    packet.encode(writer).map_err(|source| RegistryError::Codec {
        opcode: T::OPCODE,
        source,
    })
}

#[derive(Clone, Copy)]
struct Entry {
    name: &'static str,
    decode: Option<DecodeFn>,
    encode: Option<EncodeFn>,
}

/// A decoded message with its concrete type erased
pub struct DecodedPacket {
    pub opcode: Opcode,
    pub name: &'static str,
    value: Box<dyn Any + Send>,
}

impl DecodedPacket {
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Take the concrete message, or get `self` back on a type mismatch
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        let Self { opcode, name, value } = self;
        match value.downcast::<T>() {
            Ok(boxed) => Ok(*boxed),
            Err(value) => Err(Self { opcode, name, value }),
        }
    }
}

impl fmt::Debug for DecodedPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedPacket")
            .field("opcode", &self.opcode)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Opcode table
///
/// # Usage
/// ```no_run
/// use nexus_protocol::{OpcodeRegistry, packets::ClientPing};
/// use std::sync::Arc;
///
/// let mut registry = OpcodeRegistry::new();
/// registry.register_decodable::<ClientPing>();
/// let registry = Arc::new(registry);
/// ```
#[derive(Default)]
pub struct OpcodeRegistry {
    entries: HashMap<Opcode, Entry>,
}

impl OpcodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry_mut(&mut self, opcode: Opcode, name: &'static str) -> &mut Entry {
        self.entries.entry(opcode).or_insert(Entry {
            name,
            decode: None,
            encode: None,
        })
    }

    /// Register an opcode by name alone
    pub fn register_name(&mut self, opcode: Opcode, name: &'static str) -> &mut Self {
        self.entry_mut(opcode, name);
        self
    }

    pub fn register_decodable<T: Decodable>(&mut self) -> &mut Self {
        self.entry_mut(T::OPCODE, T::NAME).decode = Some(decode_erased::<T>);
        self
    }

    pub fn register_encodable<T: Encodable>(&mut self) -> &mut Self {
        self.entry_mut(T::OPCODE, T::NAME).encode = Some(encode_erased::<T>);
        self
    }

    pub fn contains(&self, opcode: Opcode) -> bool {
        self.entries.contains_key(&opcode)
    }

    pub fn name(&self, opcode: Opcode) -> Option<&'static str> {
        self.entries.get(&opcode).map(|entry| entry.name)
    }

    pub fn is_decodable(&self, opcode: Opcode) -> bool {
        self.entries
            .get(&opcode)
            .map_or(false, |entry| entry.decode.is_some())
    }

    pub fn is_encodable(&self, opcode: Opcode) -> bool {
        self.entries
            .get(&opcode)
            .map_or(false, |entry| entry.encode.is_some())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decode a packet body by its opcode
    ///
    /// Unknown opcodes are reported, never fatal: callers log and skip them.
    pub fn decode(&self, packet: &RawPacket) -> Result<DecodedPacket, RegistryError> {
        let entry = self
            .entries
            .get(&packet.opcode)
            .ok_or(RegistryError::UnknownOpcode(packet.opcode))?;
        let decode = entry
            .decode
            .ok_or(RegistryError::NotDecodable(packet.opcode))?;

        let mut reader = PacketReader::new(&packet.body);
        let value = decode(&mut reader).map_err(|source| RegistryError::Codec {
            opcode: packet.opcode,
            source,
        })?;

        if !reader.is_at_end() {
            tracing::trace!(
                "{} left {} unread bits",
                packet.opcode,
                reader.remaining_bits()
            );
        }

        Ok(DecodedPacket {
            opcode: packet.opcode,
            name: entry.name,
            value,
        })
    }

    /// Encode a type-erased value registered under `opcode`
    pub fn encode(&self, opcode: Opcode, value: &(dyn Any + Send)) -> Result<RawPacket, RegistryError> {
        let entry = self
            .entries
            .get(&opcode)
            .ok_or(RegistryError::UnknownOpcode(opcode))?;
        let encode = entry.encode.ok_or(RegistryError::NotEncodable(opcode))?;

        let mut writer = PacketWriter::new();
        encode(value, &mut writer)?;
        Ok(RawPacket::new(opcode, writer.into_bytes()))
    }

    /// Server-side table: decoders for client messages, encoders for replies
    pub fn realm_server() -> Self {
        use crate::packets::*;

        let mut registry = Self::new();
        registry
            .register_name(Opcode::ENCRYPTED, "Encrypted")
            .register_decodable::<ClientHelloRealm>()
            .register_decodable::<ClientEnterWorld>()
            .register_decodable::<ClientPing>()
            .register_encodable::<ServerRejected>()
            .register_encodable::<ServerRealmAccepted>()
            .register_encodable::<ServerEnteredWorld>()
            .register_encodable::<ServerPong>();
        registry
    }

    /// Client-side table, the mirror image of [`OpcodeRegistry::realm_server`]
    pub fn realm_client() -> Self {
        use crate::packets::*;

        let mut registry = Self::new();
        registry
            .register_name(Opcode::ENCRYPTED, "Encrypted")
            .register_encodable::<ClientHelloRealm>()
            .register_encodable::<ClientEnterWorld>()
            .register_encodable::<ClientPing>()
            .register_decodable::<ServerRejected>()
            .register_decodable::<ServerRealmAccepted>()
            .register_decodable::<ServerEnteredWorld>()
            .register_decodable::<ServerPong>();
        registry
    }
}

impl fmt::Debug for OpcodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut opcodes: Vec<_> = self.entries.keys().copied().collect();
        opcodes.sort();
        f.debug_struct("OpcodeRegistry")
            .field("opcodes", &opcodes)
            .finish()
    }
}
