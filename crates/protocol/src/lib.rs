//! # Nexus Protocol Library
//!
//! Wire formats for both server tiers.
//!
//! ## Layers
//!
//! ### 1. Bit Codec ([`codec`])
//! LSB-first bit packing with little-endian primitives and length-headed
//! UTF-16LE strings. Fields are written at the bit cursor; padding to a byte
//! boundary only happens on an explicit flush.
//!
//! ### 2. Binary Framing ([`framing`])
//! `u32 LE total length` (header included) + `u16 LE opcode` + body, used on
//! realm connections. Exposed both as a plain buffer and as a
//! `tokio_util` codec.
//!
//! ### 3. STS Text Framing ([`sts`], [`sts_body`])
//! The HTTP-like handshake protocol spoken by the login tier, plus helpers
//! for its XML bodies and base64 key blobs.
//!
//! ### 4. Opcodes and Messages ([`opcodes`], [`registry`], [`packets`])
//! An open opcode catalog, capability traits, and a registry that maps
//! opcodes to type-erased decoders and encoders.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use nexus_protocol::{OpcodeRegistry, RawPacket, packets::ClientPing, Encodable};
//!
//! let registry = OpcodeRegistry::realm_server();
//! let raw: RawPacket = ClientPing { time: 1 }.to_raw().unwrap();
//! let decoded = registry.decode(&raw).unwrap();
//! assert!(decoded.is::<ClientPing>());
//! ```

pub mod codec;
pub mod framing;
pub mod opcodes;
pub mod packets;
pub mod registry;
pub mod sts;
pub mod sts_body;

pub use codec::{CodecError, CodecResult, PacketReader, PacketWriter};
pub use framing::{FrameBuffer, FrameCodec, FramingError, RawPacket};
pub use opcodes::Opcode;
pub use registry::{Decodable, DecodedPacket, Encodable, OpcodeRegistry, Packet, RegistryError};
pub use sts::{ParseOutcome, StsRequest, StsResponse};
