//! Packet buffer implementation
//!
//! Provides a byte buffer with the read/write operations used by the entity
//! wire protocol:
//! - Standard big-endian integer and floating point types
//! - VarInt encoding for variable-length integers
//! - Length-prefixed UTF-8 strings
//! - 128-bit unique ids and packed block positions

use bytes::{BufMut, Bytes, BytesMut};
use glam::IVec3;
use uuid::Uuid;

use crate::error::ProtocolError;

/// Maximum packet size (2MB)
pub const MAX_PACKET_SIZE: usize = 2_097_151;

/// Maximum length of a protocol string in bytes
pub const MAX_STRING_LENGTH: usize = 32767 * 4;

/// Maximum number of bytes in an encoded VarInt
const MAX_VARINT_BYTES: usize = 5;

type ReadResult<T> = std::result::Result<T, ProtocolError>;

/// Packet buffer for reading and writing entity protocol data
#[derive(Debug, Clone, Default)]
pub struct PacketBuffer {
    /// Internal byte buffer
    data: BytesMut,
    /// Current read position
    read_pos: usize,
}

impl PacketBuffer {
    /// Create a new empty packet buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a packet buffer with a specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            read_pos: 0,
        }
    }

    /// Create a packet buffer from existing bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: BytesMut::from(bytes),
            read_pos: 0,
        }
    }

    // ============ Properties ============

    /// Get the current read offset
    #[inline]
    pub fn read_offset(&self) -> usize {
        self.read_pos
    }

    /// Get the total length of the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the number of bytes remaining to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.read_pos)
    }

    /// Check if there are bytes remaining to read
    #[inline]
    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Get a reference to the underlying bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Freeze the written bytes into an immutable, cheaply clonable buffer
    pub fn freeze(self) -> Bytes {
        self.data.freeze()
    }

    /// Reset read position to start
    pub fn reset(&mut self) {
        self.read_pos = 0;
    }

    fn take(&mut self, count: usize) -> ReadResult<&[u8]> {
        let remaining = self.remaining();
        if remaining < count {
            return Err(ProtocolError::BufferUnderflow {
                needed: count,
                remaining,
            });
        }
        let start = self.read_pos;
        self.read_pos += count;
        Ok(&self.data[start..start + count])
    }

    fn take_array<const N: usize>(&mut self) -> ReadResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    // ============ Reading Methods ============

    /// Read a signed byte
    pub fn read_byte(&mut self) -> ReadResult<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    /// Read an unsigned byte
    pub fn read_ubyte(&mut self) -> ReadResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a boolean (any non-zero byte is true)
    pub fn read_bool(&mut self) -> ReadResult<bool> {
        Ok(self.read_ubyte()? != 0)
    }

    /// Read a signed big-endian short
    pub fn read_short(&mut self) -> ReadResult<i16> {
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    /// Read a signed big-endian int
    pub fn read_int(&mut self) -> ReadResult<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    /// Read a signed big-endian long
    pub fn read_long(&mut self) -> ReadResult<i64> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    /// Read a big-endian IEEE 754 float
    pub fn read_float(&mut self) -> ReadResult<f32> {
        Ok(f32::from_be_bytes(self.take_array()?))
    }

    /// Read a big-endian IEEE 754 double
    pub fn read_double(&mut self) -> ReadResult<f64> {
        Ok(f64::from_be_bytes(self.take_array()?))
    }

    /// Read a VarInt (7 bits per byte, least significant group first)
    pub fn read_varint(&mut self) -> ReadResult<i32> {
        let mut value: u32 = 0;
        for i in 0..MAX_VARINT_BYTES {
            let byte = self.read_ubyte()?;
            value |= ((byte & 0x7f) as u32) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value as i32);
            }
        }
        Err(ProtocolError::VarIntTooLong)
    }

    /// Read a VarInt length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> ReadResult<String> {
        let length = self.read_varint()?;
        let length = usize::try_from(length).map_err(|_| ProtocolError::StringTooLong {
            length: usize::MAX,
            max: MAX_STRING_LENGTH,
        })?;
        if length > MAX_STRING_LENGTH {
            return Err(ProtocolError::StringTooLong {
                length,
                max: MAX_STRING_LENGTH,
            });
        }
        let bytes = self.take(length)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// Read a 128-bit unique id (most significant half first)
    pub fn read_uuid(&mut self) -> ReadResult<Uuid> {
        Ok(Uuid::from_bytes(self.take_array()?))
    }

    /// Read a block position packed into a single long
    pub fn read_position(&mut self) -> ReadResult<IVec3> {
        let packed = self.read_long()?;
        let x = (packed >> 38) as i32;
        let y = ((packed << 26) >> 52) as i32;
        let z = ((packed << 38) >> 38) as i32;
        Ok(IVec3::new(x, y, z))
    }

    /// Read a specific number of bytes
    pub fn read_bytes(&mut self, length: usize) -> ReadResult<Vec<u8>> {
        Ok(self.take(length)?.to_vec())
    }

    // ============ Writing Methods ============

    /// Write a signed byte
    pub fn write_byte(&mut self, value: i8) {
        self.data.put_i8(value);
    }

    /// Write an unsigned byte
    pub fn write_ubyte(&mut self, value: u8) {
        self.data.put_u8(value);
    }

    /// Write a boolean as a single byte
    pub fn write_bool(&mut self, value: bool) {
        self.data.put_u8(value as u8);
    }

    /// Write a signed big-endian short
    pub fn write_short(&mut self, value: i16) {
        self.data.put_i16(value);
    }

    /// Write a signed big-endian int
    pub fn write_int(&mut self, value: i32) {
        self.data.put_i32(value);
    }

    /// Write a signed big-endian long
    pub fn write_long(&mut self, value: i64) {
        self.data.put_i64(value);
    }

    /// Write a big-endian IEEE 754 float
    pub fn write_float(&mut self, value: f32) {
        self.data.put_f32(value);
    }

    /// Write a big-endian IEEE 754 double
    pub fn write_double(&mut self, value: f64) {
        self.data.put_f64(value);
    }

    /// Write a VarInt (1 to 5 bytes depending on magnitude)
    pub fn write_varint(&mut self, value: i32) {
        let mut value = value as u32;
        loop {
            if value & !0x7f == 0 {
                self.data.put_u8(value as u8);
                return;
            }
            self.data.put_u8(((value & 0x7f) | 0x80) as u8);
            value >>= 7;
        }
    }

    /// Write a VarInt length-prefixed UTF-8 string
    pub fn write_string(&mut self, value: &str) {
        self.write_varint(value.len() as i32);
        self.data.extend_from_slice(value.as_bytes());
    }

    /// Write a 128-bit unique id (most significant half first)
    pub fn write_uuid(&mut self, value: &Uuid) {
        self.data.extend_from_slice(value.as_bytes());
    }

    /// Write a block position packed into a single long
    /// (26 bits x, 12 bits y, 26 bits z)
    pub fn write_position(&mut self, value: IVec3) {
        let packed = ((value.x as i64 & 0x3ff_ffff) << 38)
            | ((value.y as i64 & 0xfff) << 26)
            | (value.z as i64 & 0x3ff_ffff);
        self.write_long(packed);
    }

    /// Write raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Get the number of bytes a VarInt encoding of `value` occupies
    pub fn varint_size(value: i32) -> usize {
        let value = value as u32;
        match value {
            0..=0x7f => 1,
            0x80..=0x3fff => 2,
            0x4000..=0x1f_ffff => 3,
            0x20_0000..=0xfff_ffff => 4,
            _ => 5,
        }
    }
}

impl From<Vec<u8>> for PacketBuffer {
    fn from(vec: Vec<u8>) -> Self {
        Self::from_bytes(&vec)
    }
}

impl From<&[u8]> for PacketBuffer {
    fn from(slice: &[u8]) -> Self {
        Self::from_bytes(slice)
    }
}

impl AsRef<[u8]> for PacketBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_read_write() {
        let mut buf = PacketBuffer::new();

        buf.write_byte(42);
        buf.write_ubyte(255);
        buf.write_short(-1234);
        buf.write_int(987654);
        buf.write_long(123456789012345);
        buf.write_bool(true);

        buf.reset();

        assert_eq!(buf.read_byte().unwrap(), 42);
        assert_eq!(buf.read_ubyte().unwrap(), 255);
        assert_eq!(buf.read_short().unwrap(), -1234);
        assert_eq!(buf.read_int().unwrap(), 987654);
        assert_eq!(buf.read_long().unwrap(), 123456789012345);
        assert!(buf.read_bool().unwrap());
    }

    #[test]
    fn test_floating_point() {
        let mut buf = PacketBuffer::new();
        buf.write_float(15.0);
        buf.write_double(-64.125);

        assert_eq!(buf.as_bytes()[..4], 15.0f32.to_be_bytes());

        buf.reset();
        assert_eq!(buf.read_float().unwrap(), 15.0);
        assert_eq!(buf.read_double().unwrap(), -64.125);
    }

    #[test]
    fn test_varint_encoding() {
        let cases: [(i32, &[u8]); 6] = [
            (0, &[0x00]),
            (1, &[0x01]),
            (127, &[0x7f]),
            (128, &[0x80, 0x01]),
            (300, &[0xac, 0x02]),
            (-1, &[0xff, 0xff, 0xff, 0xff, 0x0f]),
        ];

        for (value, expected) in cases {
            let mut buf = PacketBuffer::new();
            buf.write_varint(value);
            assert_eq!(buf.as_bytes(), expected, "encoding of {}", value);
            assert_eq!(PacketBuffer::varint_size(value), expected.len());
            buf.reset();
            assert_eq!(buf.read_varint().unwrap(), value);
        }
    }

    #[test]
    fn test_varint_too_long() {
        let mut buf = PacketBuffer::from_bytes(&[0xff, 0xff, 0xff, 0xff, 0xff, 0x01]);
        assert_eq!(buf.read_varint(), Err(ProtocolError::VarIntTooLong));
    }

    #[test]
    fn test_string() {
        let mut buf = PacketBuffer::new();
        buf.write_string("Hello, World!");
        assert_eq!(buf.as_bytes()[0], 13);

        buf.reset();
        assert_eq!(buf.read_string().unwrap(), "Hello, World!");
    }

    #[test]
    fn test_uuid() {
        let id = Uuid::new_v4();
        let mut buf = PacketBuffer::new();
        buf.write_uuid(&id);
        assert_eq!(buf.len(), 16);

        buf.reset();
        assert_eq!(buf.read_uuid().unwrap(), id);
    }

    #[test]
    fn test_packed_position() {
        let mut buf = PacketBuffer::new();
        buf.write_position(IVec3::new(-100, 64, 2000));
        buf.write_position(IVec3::new(33_554_431, 0, -33_554_432));

        buf.reset();
        assert_eq!(buf.read_position().unwrap(), IVec3::new(-100, 64, 2000));
        assert_eq!(
            buf.read_position().unwrap(),
            IVec3::new(33_554_431, 0, -33_554_432)
        );
    }

    #[test]
    fn test_underflow() {
        let mut buf = PacketBuffer::from_bytes(&[1, 2]);
        assert_eq!(
            buf.read_int(),
            Err(ProtocolError::BufferUnderflow {
                needed: 4,
                remaining: 2
            })
        );
        // A failed read does not consume anything
        assert_eq!(buf.remaining(), 2);
    }

    #[test]
    fn test_remaining() {
        let mut buf = PacketBuffer::new();
        buf.write_int(12345);

        buf.reset();
        assert_eq!(buf.remaining(), 4);

        buf.read_short().unwrap();
        assert_eq!(buf.remaining(), 2);

        buf.read_short().unwrap();
        assert_eq!(buf.remaining(), 0);
        assert!(!buf.has_remaining());
    }
}
