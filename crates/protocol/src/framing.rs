//! Binary framing for the realm tier
//!
//! # Frame Format
//! ```text
//! {u32 LE total_length}{u16 LE opcode}{body}
//! ```
//! `total_length` counts the four length bytes themselves. The payload
//! (opcode + body) may already be an [`Opcode::ENCRYPTED`] wrapper; the framer
//! never looks past the opcode.
//!
//! One TCP read may carry zero, one or many frames plus a partial trailing
//! frame; [`FrameBuffer`] keeps the remainder for the next read.

use crate::opcodes::Opcode;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Size of the length prefix
pub const FRAME_HEADER_LEN: usize = 4;

/// Size of the opcode at the start of every payload
pub const OPCODE_LEN: usize = 2;

/// Smallest legal frame: length prefix plus opcode
pub const MIN_FRAME_LEN: usize = FRAME_HEADER_LEN + OPCODE_LEN;

/// Default upper bound for a single frame
pub const DEFAULT_MAX_FRAME_LEN: usize = 0x20000;

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FramingError> for nexus_core::NexusError {
    fn from(err: FramingError) -> Self {
        match err {
            FramingError::Io(e) => nexus_core::NexusError::Io(e),
            other => nexus_core::NexusError::Framing(other.to_string()),
        }
    }
}

/// Decode one frame from the front of `buf`, leaving the rest in place
///
/// Returns `Ok(None)` while the frame is still incomplete.
pub fn decode_frame(buf: &mut BytesMut, max_frame_len: usize) -> Result<Option<Bytes>, FramingError> {
    if buf.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }

    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

    if len < MIN_FRAME_LEN {
        return Err(FramingError::InvalidFormat(format!(
            "frame length {} below minimum {}",
            len, MIN_FRAME_LEN
        )));
    }

    if len > max_frame_len {
        return Err(FramingError::FrameTooLarge {
            len,
            max: max_frame_len,
        });
    }

    if buf.len() < len {
        buf.reserve(len - buf.len());
        return Ok(None);
    }

    let mut frame = buf.split_to(len);
    frame.advance(FRAME_HEADER_LEN);
    Ok(Some(frame.freeze()))
}

/// Prefix `payload` with its length and append it to `dst`
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut, max_frame_len: usize) -> Result<(), FramingError> {
    if payload.len() < OPCODE_LEN {
        return Err(FramingError::InvalidFormat("payload shorter than an opcode".into()));
    }

    let len = payload.len() + FRAME_HEADER_LEN;
    if len > max_frame_len {
        return Err(FramingError::FrameTooLarge {
            len,
            max: max_frame_len,
        });
    }

    dst.reserve(len);
    dst.put_u32_le(len as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Accumulates raw TCP chunks and yields complete frame payloads
#[derive(Debug)]
pub struct FrameBuffer {
    buf: BytesMut,
    max_frame_len: usize,
}

impl FrameBuffer {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(8192),
            max_frame_len,
        }
    }

    /// Append bytes from the network
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete frame payload, if one is buffered
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, FramingError> {
        decode_frame(&mut self.buf, self.max_frame_len)
    }

    /// Drain every complete frame currently buffered
    pub fn drain_frames(&mut self) -> Result<Vec<Bytes>, FramingError> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Bytes held back waiting for the rest of a frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

/// `tokio_util` codec over the same frame rules, for `Framed` transports
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_len: usize,
}

impl FrameCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(src, self.max_frame_len)
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FramingError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(&item, dst, self.max_frame_len)
    }
}

/// A framed payload split into opcode and body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub opcode: Opcode,
    pub body: Bytes,
}

impl RawPacket {
    pub fn new(opcode: Opcode, body: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            body: body.into(),
        }
    }

    /// Split a frame payload into opcode and body
    pub fn from_payload(mut payload: Bytes) -> Result<Self, FramingError> {
        if payload.len() < OPCODE_LEN {
            return Err(FramingError::InvalidFormat("payload shorter than an opcode".into()));
        }
        let opcode = Opcode::new(payload.get_u16_le());
        Ok(Self { opcode, body: payload })
    }

    /// Opcode followed by body, ready for framing or encryption
    pub fn to_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(OPCODE_LEN + self.body.len());
        payload.extend_from_slice(&self.opcode.get().to_le_bytes());
        payload.extend_from_slice(&self.body);
        payload
    }
}
