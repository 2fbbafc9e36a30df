//! Bit-packed binary codec
//!
//! Every field, byte-width primitives included, is written at the current bit
//! cursor. Bits are packed least-significant first into each byte, so a
//! byte-aligned `write_u32` produces the same four little-endian bytes a plain
//! `u32::to_le_bytes` would. Nothing is padded implicitly; only
//! [`PacketWriter::flush_bits`] / [`PacketReader::flush_bits`] move the cursor
//! to the next byte boundary.
//!
//! # Wide strings
//!
//! ```text
//! short form (< 128 UTF-16 units): {1 bit 0}{7 bits len}{len * u16 LE}
//! long form  (< 32768 units):      {1 bit 1}{15 bits len}{len * u16 LE}
//! ```

use thiserror::Error;

/// Longest wide string the 15-bit length header can express
pub const MAX_WIDE_STRING_LEN: usize = 0x7FFF;

/// Threshold below which the 7-bit short header is used
const SHORT_WIDE_STRING_LEN: usize = 0x80;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("End of data: needed {needed} bits, {available} available")]
    EndOfData { needed: usize, available: usize },

    #[error("Invalid bit width: {0} (must be 1-64)")]
    InvalidBitWidth(u32),

    #[error("Wide string too long: {0} UTF-16 units")]
    StringTooLong(usize),

    #[error("Wide string is not valid UTF-16")]
    InvalidUtf16,
}

pub type CodecResult<T> = std::result::Result<T, CodecError>;

impl From<CodecError> for nexus_core::NexusError {
    fn from(err: CodecError) -> Self {
        nexus_core::NexusError::Protocol(err.to_string())
    }
}

#[inline]
fn check_width(bits: u32) -> CodecResult<()> {
    if bits == 0 || bits > 64 {
        return Err(CodecError::InvalidBitWidth(bits));
    }
    Ok(())
}

/// Appending writer over an owned byte buffer
#[derive(Debug, Default, Clone)]
pub struct PacketWriter {
    buf: Vec<u8>,
    /// Bits already used in the last byte of `buf` (0 = byte aligned)
    bit_pos: u8,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            bit_pos: 0,
        }
    }

    /// Pack the low `bits` bits of `value` at the cursor
    pub fn write_bits(&mut self, value: u64, bits: u32) -> CodecResult<()> {
        check_width(bits)?;

        let mut value = if bits == 64 {
            value
        } else {
            value & ((1u64 << bits) - 1)
        };
        let mut remaining = bits;

        while remaining > 0 {
            if self.bit_pos == 0 {
                self.buf.push(0);
            }

            let free = 8 - self.bit_pos as u32;
            let take = free.min(remaining);
            let mask = ((1u16 << take) - 1) as u8;
            let chunk = (value as u8) & mask;

            // buf is never empty here, a byte was pushed above if needed
            if let Some(last) = self.buf.last_mut() {
                *last |= chunk << self.bit_pos;
            }

            value >>= take;
            remaining -= take;
            self.bit_pos = ((self.bit_pos as u32 + take) % 8) as u8;
        }

        Ok(())
    }

    /// Pad the partial byte with zeros and move to the next byte boundary
    pub fn flush_bits(&mut self) {
        self.bit_pos = 0;
    }

    pub fn write_bool(&mut self, value: bool) -> CodecResult<()> {
        self.write_bits(value as u64, 1)
    }

    pub fn write_u8(&mut self, value: u8) -> CodecResult<()> {
        self.write_bits(value as u64, 8)
    }

    pub fn write_u16(&mut self, value: u16) -> CodecResult<()> {
        self.write_bits(value as u64, 16)
    }

    pub fn write_u32(&mut self, value: u32) -> CodecResult<()> {
        self.write_bits(value as u64, 32)
    }

    pub fn write_i32(&mut self, value: i32) -> CodecResult<()> {
        self.write_bits(value as u32 as u64, 32)
    }

    pub fn write_u64(&mut self, value: u64) -> CodecResult<()> {
        self.write_bits(value, 64)
    }

    pub fn write_f32(&mut self, value: f32) -> CodecResult<()> {
        self.write_bits(value.to_bits() as u64, 32)
    }

    /// Write raw bytes at the cursor (fast path when byte aligned)
    pub fn write_bytes(&mut self, bytes: &[u8]) -> CodecResult<()> {
        if self.bit_pos == 0 {
            self.buf.extend_from_slice(bytes);
            return Ok(());
        }

        for byte in bytes {
            self.write_bits(*byte as u64, 8)?;
        }
        Ok(())
    }

    /// Write a length-headed UTF-16LE string
    pub fn write_wide_string(&mut self, value: &str) -> CodecResult<()> {
        let units: Vec<u16> = value.encode_utf16().collect();
        let len = units.len();

        if len > MAX_WIDE_STRING_LEN {
            return Err(CodecError::StringTooLong(len));
        }

        if len < SHORT_WIDE_STRING_LEN {
            self.write_bits(0, 1)?;
            self.write_bits(len as u64, 7)?;
        } else {
            self.write_bits(1, 1)?;
            self.write_bits(len as u64, 15)?;
        }

        for unit in units {
            self.write_bits(unit as u64, 16)?;
        }
        Ok(())
    }

    /// Number of bytes written so far, counting a partial byte as whole
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Finish writing; any partial byte is already zero padded
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Reading cursor over a borrowed byte slice
///
/// Any read that needs more bits than remain returns
/// [`CodecError::EndOfData`] and leaves the cursor where it was.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
    byte_pos: usize,
    bit_pos: u8,
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// Bits left between the cursor and the end of the buffer
    pub fn remaining_bits(&self) -> usize {
        (self.buf.len() - self.byte_pos) * 8 - self.bit_pos as usize
    }

    /// Current cursor as (byte offset, bit offset)
    pub fn position(&self) -> (usize, u8) {
        (self.byte_pos, self.bit_pos)
    }

    pub fn is_at_end(&self) -> bool {
        self.remaining_bits() == 0
    }

    #[inline]
    fn ensure(&self, bits: usize) -> CodecResult<()> {
        let available = self.remaining_bits();
        if available < bits {
            return Err(CodecError::EndOfData {
                needed: bits,
                available,
            });
        }
        Ok(())
    }

    /// Read `bits` bits from the cursor as an unsigned value
    pub fn read_bits(&mut self, bits: u32) -> CodecResult<u64> {
        check_width(bits)?;
        self.ensure(bits as usize)?;

        let mut value = 0u64;
        let mut shift = 0u32;
        let mut remaining = bits;

        while remaining > 0 {
            let byte = self.buf[self.byte_pos];
            let available = 8 - self.bit_pos as u32;
            let take = available.min(remaining);
            let mask = ((1u16 << take) - 1) as u8;
            let chunk = (byte >> self.bit_pos) & mask;

            value |= (chunk as u64) << shift;
            shift += take;
            remaining -= take;

            self.bit_pos += take as u8;
            if self.bit_pos == 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
        }

        Ok(value)
    }

    /// Skip the rest of a partial byte
    pub fn flush_bits(&mut self) {
        if self.bit_pos != 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    pub fn read_bool(&mut self) -> CodecResult<bool> {
        Ok(self.read_bits(1)? != 0)
    }

    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.read_bits(8)? as u8)
    }

    pub fn read_u16(&mut self) -> CodecResult<u16> {
        Ok(self.read_bits(16)? as u16)
    }

    pub fn read_u32(&mut self) -> CodecResult<u32> {
        Ok(self.read_bits(32)? as u32)
    }

    pub fn read_i32(&mut self) -> CodecResult<i32> {
        Ok(self.read_bits(32)? as u32 as i32)
    }

    pub fn read_u64(&mut self) -> CodecResult<u64> {
        self.read_bits(64)
    }

    pub fn read_f32(&mut self) -> CodecResult<f32> {
        Ok(f32::from_bits(self.read_bits(32)? as u32))
    }

    pub fn read_bytes(&mut self, len: usize) -> CodecResult<Vec<u8>> {
        self.ensure(len * 8)?;

        if self.bit_pos == 0 {
            let bytes = self.buf[self.byte_pos..self.byte_pos + len].to_vec();
            self.byte_pos += len;
            return Ok(bytes);
        }

        let mut bytes = Vec::with_capacity(len);
        for _ in 0..len {
            bytes.push(self.read_bits(8)? as u8);
        }
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        self.ensure(N * 8)?;

        let mut out = [0u8; N];
        for byte in out.iter_mut() {
            *byte = self.read_bits(8)? as u8;
        }
        Ok(out)
    }

    /// Everything from the cursor to the end of the buffer (must be aligned)
    pub fn read_remaining(&mut self) -> Vec<u8> {
        self.flush_bits();
        let start = self.byte_pos.min(self.buf.len());
        self.byte_pos = self.buf.len();
        self.buf[start..].to_vec()
    }

    pub fn read_wide_string(&mut self) -> CodecResult<String> {
        let saved = (self.byte_pos, self.bit_pos);

        let result = self.read_wide_string_inner();
        if result.is_err() {
            self.byte_pos = saved.0;
            self.bit_pos = saved.1;
        }
        result
    }

    fn read_wide_string_inner(&mut self) -> CodecResult<String> {
        let extended = self.read_bool()?;
        let len = self.read_bits(if extended { 15 } else { 7 })? as usize;

        self.ensure(len * 16)?;

        let mut units = Vec::with_capacity(len);
        for _ in 0..len {
            units.push(self.read_bits(16)? as u16);
        }

        String::from_utf16(&units).map_err(|_| CodecError::InvalidUtf16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bits_are_packed_lsb_first() {
        let mut writer = PacketWriter::new();
        writer.write_bits(1, 1).unwrap();
        writer.write_bits(0b101, 3).unwrap();
        assert_eq!(writer.as_bytes(), &[0b0000_1011]);

        writer.write_bits(0xF, 4).unwrap();
        assert_eq!(writer.as_bytes(), &[0b1111_1011]);
    }

    #[test]
    fn test_aligned_primitives_are_little_endian() {
        let mut writer = PacketWriter::new();
        writer.write_u16(0x1234).unwrap();
        writer.write_u32(0xDEADBEEF).unwrap();
        assert_eq!(writer.as_bytes(), &[0x34, 0x12, 0xEF, 0xBE, 0xAD, 0xDE]);
    }

    #[test]
    fn test_unaligned_primitive_spans_bytes() {
        let mut writer = PacketWriter::new();
        writer.write_bits(0b111, 3).unwrap();
        writer.write_u8(0xFF).unwrap();
        // 3 + 8 bits -> 2 bytes, second byte holds the top 3 bits of 0xFF
        assert_eq!(writer.as_bytes(), &[0xFF, 0b0000_0111]);
    }

    #[test]
    fn test_flush_pads_with_zeros() {
        let mut writer = PacketWriter::new();
        writer.write_bits(1, 1).unwrap();
        writer.flush_bits();
        writer.write_u8(0xAA).unwrap();
        assert_eq!(writer.as_bytes(), &[0x01, 0xAA]);

        let mut reader = PacketReader::new(writer.as_bytes());
        assert!(reader.read_bool().unwrap());
        reader.flush_bits();
        assert_eq!(reader.read_u8().unwrap(), 0xAA);
        assert!(reader.is_at_end());
    }

    #[test]
    fn test_flush_when_aligned_is_noop() {
        let mut writer = PacketWriter::new();
        writer.write_u8(1).unwrap();
        writer.flush_bits();
        writer.write_u8(2).unwrap();
        assert_eq!(writer.as_bytes(), &[1, 2]);

        let mut reader = PacketReader::new(writer.as_bytes());
        reader.read_u8().unwrap();
        reader.flush_bits();
        assert_eq!(reader.read_u8().unwrap(), 2);
    }

    #[test]
    fn test_invalid_bit_width() {
        let mut writer = PacketWriter::new();
        assert_eq!(writer.write_bits(0, 0), Err(CodecError::InvalidBitWidth(0)));
        assert_eq!(writer.write_bits(0, 65), Err(CodecError::InvalidBitWidth(65)));

        let mut reader = PacketReader::new(&[0u8; 16]);
        assert_eq!(reader.read_bits(65), Err(CodecError::InvalidBitWidth(65)));
    }

    #[test]
    fn test_mixed_fields_roundtrip() {
        let mut writer = PacketWriter::new();
        writer.write_bits(5, 3).unwrap();
        writer.write_u32(123_456).unwrap();
        writer.write_bool(true).unwrap();
        writer.write_f32(-1.5).unwrap();
        writer.write_wide_string("Nexus").unwrap();
        writer.write_u64(u64::MAX - 7).unwrap();
        writer.write_bytes(&[9, 8, 7]).unwrap();
        writer.write_i32(-42).unwrap();

        let bytes = writer.into_bytes();
        let mut reader = PacketReader::new(&bytes);
        assert_eq!(reader.read_bits(3).unwrap(), 5);
        assert_eq!(reader.read_u32().unwrap(), 123_456);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_f32().unwrap(), -1.5);
        assert_eq!(reader.read_wide_string().unwrap(), "Nexus");
        assert_eq!(reader.read_u64().unwrap(), u64::MAX - 7);
        assert_eq!(reader.read_bytes(3).unwrap(), vec![9, 8, 7]);
        assert_eq!(reader.read_i32().unwrap(), -42);
    }

    #[test]
    fn test_empty_wide_string_is_single_zero_byte() {
        let mut writer = PacketWriter::new();
        writer.write_wide_string("").unwrap();
        assert_eq!(writer.as_bytes(), &[0x00]);

        let mut reader = PacketReader::new(writer.as_bytes());
        assert_eq!(reader.read_wide_string().unwrap(), "");
    }

    #[test]
    fn test_wide_string_header_boundary() {
        for len in [0usize, 1, 127, 128, 1000] {
            let value: String = std::iter::repeat('x').take(len).collect();

            let mut writer = PacketWriter::new();
            writer.write_wide_string(&value).unwrap();

            let header_bytes = if len < 128 { 1 } else { 2 };
            assert_eq!(writer.len(), header_bytes + len * 2, "length {}", len);

            let mut reader = PacketReader::new(writer.as_bytes());
            assert_eq!(reader.read_wide_string().unwrap(), value, "length {}", len);
            assert!(reader.is_at_end());
        }
    }

    #[test]
    fn test_long_wide_string_header_flag() {
        let value: String = std::iter::repeat('a').take(128).collect();
        let mut writer = PacketWriter::new();
        writer.write_wide_string(&value).unwrap();

        // flag bit 1, then 128 in 15 bits: 1 | (128 << 1) = 0x0101
        assert_eq!(&writer.as_bytes()[..2], &[0x01, 0x01]);
    }

    #[test]
    fn test_wide_string_non_ascii() {
        let mut writer = PacketWriter::new();
        writer.write_wide_string("Ŝtåŕ ✓ 🚀").unwrap();
        let mut reader = PacketReader::new(writer.as_bytes());
        assert_eq!(reader.read_wide_string().unwrap(), "Ŝtåŕ ✓ 🚀");
    }

    #[test]
    fn test_wide_string_too_long() {
        let value: String = std::iter::repeat('x').take(MAX_WIDE_STRING_LEN + 1).collect();
        let mut writer = PacketWriter::new();
        assert_eq!(
            writer.write_wide_string(&value),
            Err(CodecError::StringTooLong(MAX_WIDE_STRING_LEN + 1))
        );
    }

    #[test]
    fn test_truncated_read_returns_end_of_data() {
        let mut reader = PacketReader::new(&[0x01, 0x02, 0x03]);
        assert_eq!(
            reader.read_u32(),
            Err(CodecError::EndOfData {
                needed: 32,
                available: 24
            })
        );
        // Cursor untouched, the shorter read still works
        assert_eq!(reader.position(), (0, 0));
        assert_eq!(reader.read_u16().unwrap(), 0x0201);
    }

    #[test]
    fn test_empty_buffer_reads() {
        let mut reader = PacketReader::new(&[]);
        assert!(matches!(reader.read_bool(), Err(CodecError::EndOfData { .. })));
        assert!(matches!(reader.read_u64(), Err(CodecError::EndOfData { .. })));
        assert!(matches!(reader.read_bytes(1), Err(CodecError::EndOfData { .. })));
        assert!(matches!(reader.read_array::<4>(), Err(CodecError::EndOfData { .. })));
        assert!(matches!(reader.read_wide_string(), Err(CodecError::EndOfData { .. })));
    }

    #[test]
    fn test_truncated_wide_string_restores_cursor() {
        let mut writer = PacketWriter::new();
        writer.write_wide_string("hello").unwrap();
        let bytes = writer.into_bytes();
        let truncated = &bytes[..bytes.len() - 1];

        let mut reader = PacketReader::new(truncated);
        assert!(matches!(
            reader.read_wide_string(),
            Err(CodecError::EndOfData { .. })
        ));
        assert_eq!(reader.position(), (0, 0));
    }

    #[test]
    fn test_invalid_utf16() {
        let mut writer = PacketWriter::new();
        writer.write_bits(0, 1).unwrap();
        writer.write_bits(1, 7).unwrap();
        // Lone high surrogate
        writer.write_u16(0xD800).unwrap();

        let mut reader = PacketReader::new(writer.as_bytes());
        assert_eq!(reader.read_wide_string(), Err(CodecError::InvalidUtf16));
    }

    #[test]
    fn test_unaligned_bytes_roundtrip() {
        let mut writer = PacketWriter::new();
        writer.write_bits(0b10, 2).unwrap();
        writer.write_bytes(&[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();

        let mut reader = PacketReader::new(writer.as_bytes());
        assert_eq!(reader.read_bits(2).unwrap(), 0b10);
        assert_eq!(reader.read_array::<4>().unwrap(), [0xDE, 0xAD, 0xBE, 0xEF]);
    }

    proptest! {
        #[test]
        fn prop_bits_roundtrip(value in any::<u64>(), bits in 1u32..=64) {
            let masked = if bits == 64 { value } else { value & ((1u64 << bits) - 1) };

            let mut writer = PacketWriter::new();
            writer.write_bits(value, bits).unwrap();
            prop_assert_eq!(writer.len(), (bits as usize + 7) / 8);

            let bytes = writer.into_bytes();
            let mut reader = PacketReader::new(&bytes);
            prop_assert_eq!(reader.read_bits(bits).unwrap(), masked);
        }

        #[test]
        fn prop_bit_sequences_roundtrip(fields in prop::collection::vec((any::<u64>(), 1u32..=64), 0..40)) {
            let mut writer = PacketWriter::new();
            for (value, bits) in &fields {
                writer.write_bits(*value, *bits).unwrap();
            }

            let bytes = writer.into_bytes();
            let mut reader = PacketReader::new(&bytes);
            for (value, bits) in &fields {
                let masked = if *bits == 64 { *value } else { value & ((1u64 << bits) - 1) };
                prop_assert_eq!(reader.read_bits(*bits).unwrap(), masked);
            }
            prop_assert!(reader.remaining_bits() < 8);
        }

        #[test]
        fn prop_wide_string_roundtrip(value in "\\PC{0,300}", lead in 0u32..8) {
            let mut writer = PacketWriter::new();
            if lead > 0 {
                writer.write_bits(0, lead).unwrap();
            }
            writer.write_wide_string(&value).unwrap();

            let bytes = writer.into_bytes();
            let mut reader = PacketReader::new(&bytes);
            if lead > 0 {
                reader.read_bits(lead).unwrap();
            }
            prop_assert_eq!(reader.read_wide_string().unwrap(), value);
        }

        #[test]
        fn prop_truncated_reads_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..16), bits in 1u32..=64) {
            let mut reader = PacketReader::new(&bytes);
            let _ = reader.read_wide_string();
            while reader.read_bits(bits).is_ok() {}
            prop_assert!(reader.remaining_bits() < bits as usize);
        }
    }
}
