use byteorder::{BigEndian, ByteOrder};
use lodestone_common::{BlockPosition, LodestoneError, ProtocolState, ProtocolVersion, Result};
use lodestone_nbt::Tag;
use std::io::{self, Read};
use uuid::Uuid;

const VARINT_MAX_BYTES: usize = 5;
const VARLONG_MAX_BYTES: usize = 10;

/// Identifies a packet type: ids are only unique within a protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketKey {
    pub state: ProtocolState,
    pub id: i32,
}

impl PacketKey {
    pub fn new(state: ProtocolState, id: i32) -> Self {
        Self { state, id }
    }
}

/// Everything a clientbound decoder needs besides the bytes themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeContext {
    pub version: ProtocolVersion,
    /// Whether the current dimension carries sky light. Only matters for pre-1.14 chunk data.
    pub skylight: bool,
}

impl DecodeContext {
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            version,
            skylight: true,
        }
    }
}

/// Release lines with distinct play packet ids: 1.12.2, 1.13, 1.14, 1.15, 1.16.0-1.16.1
/// and 1.16.2+.
pub const RELEASE_LINES: usize = 6;

/// Picks the id of a play packet for `version` from its per-release-line ids.
pub fn versioned_id(version: ProtocolVersion, ids: [i32; RELEASE_LINES]) -> i32 {
    let line = match version.0 {
        i32::MIN..=340 => 0,
        341..=404 => 1,
        405..=498 => 2,
        499..=578 => 3,
        579..=736 => 4,
        _ => 5,
    };
    ids[line]
}

/// Packet trait. Contains the packet ID and the state it belongs to.
pub trait Packet {
    /// Packet ID in the latest protocol. Dispatch keys are built from it whatever version the
    /// connection speaks.
    fn packet_id() -> i32
    where
        Self: Sized;

    /// Packet ID on the wire for `version`.
    fn wire_id(version: ProtocolVersion) -> i32
    where
        Self: Sized,
    {
        let _ = version;
        Self::packet_id()
    }

    /// Protocol state the ID is valid in.
    fn state() -> ProtocolState
    where
        Self: Sized;

    fn key() -> PacketKey
    where
        Self: Sized,
    {
        PacketKey::new(Self::state(), Self::packet_id())
    }
}

/// Packets sent by the server. Only decoding is needed.
pub trait Clientbound: Packet + Sized {
    /// Reads the packet body. The packet id has already been consumed.
    fn read_from_buffer(buffer: &mut PacketBuffer, ctx: &DecodeContext) -> Result<Self>;
}

/// Packets sent by the client. Only encoding is needed.
pub trait Serverbound: Packet {
    /// Writes the packet body. The packet id is written by the caller.
    fn write_to_buffer(&self, buffer: &mut PacketBuffer);
}

/// Growable byte buffer with a read cursor.
///
/// Writes always append to the end, reads consume from the cursor. A read that would run past
/// the end fails with [`LodestoneError::Underrun`] and leaves the cursor where it was.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PacketBuffer {
    buffer: Vec<u8>,
    cursor: usize,
}

impl PacketBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            cursor: 0,
        }
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            buffer: bytes.into(),
            cursor: 0,
        }
    }

    /// Every byte in the buffer, read or not.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Bytes not yet consumed.
    pub fn unread(&self) -> &[u8] {
        &self.buffer[self.cursor..]
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.buffer.len()
    }

    /// Moves the cursor back to an offset previously returned by [`PacketBuffer::position`].
    pub fn rewind_to(&mut self, position: usize) {
        self.cursor = position.min(self.buffer.len());
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Drops consumed bytes so the cursor returns to offset 0.
    pub fn compact(&mut self) {
        if self.cursor > 0 {
            self.buffer.drain(..self.cursor);
            self.cursor = 0;
        }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
    }

    pub fn peek_byte(&self) -> Option<u8> {
        self.buffer.get(self.cursor).copied()
    }

    fn underrun(&self, needed: usize) -> LodestoneError {
        LodestoneError::Underrun {
            needed,
            remaining: self.remaining(),
        }
    }

    /// Consumes exactly `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&[u8]> {
        if self.remaining() < n {
            return Err(self.underrun(n));
        }
        let start = self.cursor;
        self.cursor += n;
        Ok(&self.buffer[start..self.cursor])
    }

    /// Consumes everything left.
    pub fn take_remaining(&mut self) -> &[u8] {
        let start = self.cursor;
        self.cursor = self.buffer.len();
        &self.buffer[start..]
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Writes a VarInt to the buffer.
    /// 7 bits per byte, least significant group first, with the high bit set on every byte
    /// except the last. Negative values always take five bytes.
    pub fn write_varint(&mut self, value: i32) {
        let mut value = value as u32;
        while value & !0x7F != 0 {
            self.buffer.push((value & 0x7F) as u8 | 0x80);
            value >>= 7;
        }
        self.buffer.push(value as u8);
    }

    /// Reads a VarInt from the buffer. Encodings longer than five bytes are rejected.
    pub fn read_varint(&mut self) -> Result<i32> {
        let (value, len) = self.peek_var(VARINT_MAX_BYTES, "VarInt")?;
        self.cursor += len;
        Ok(value as u32 as i32)
    }

    pub fn write_varlong(&mut self, value: i64) {
        let mut value = value as u64;
        while value & !0x7F != 0 {
            self.buffer.push((value & 0x7F) as u8 | 0x80);
            value >>= 7;
        }
        self.buffer.push(value as u8);
    }

    pub fn read_varlong(&mut self) -> Result<i64> {
        let (value, len) = self.peek_var(VARLONG_MAX_BYTES, "VarLong")?;
        self.cursor += len;
        Ok(value as i64)
    }

    fn peek_var(&self, max_bytes: usize, kind: &str) -> Result<(u64, usize)> {
        let mut result = 0u64;

        for (i, &byte) in self.unread().iter().enumerate() {
            if i >= max_bytes {
                return Err(LodestoneError::decode(format!("{kind} too big")));
            }

            result |= u64::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok((result, i + 1));
            }
        }

        if self.remaining() >= max_bytes {
            return Err(LodestoneError::decode(format!("{kind} too big")));
        }
        Err(self.underrun(self.remaining() + 1))
    }

    /// Reads a VarInt that must not be negative, for lengths and counts.
    pub fn read_length(&mut self) -> Result<usize> {
        let start = self.cursor;
        let length = self.read_varint()?;
        if length < 0 {
            self.cursor = start;
            return Err(LodestoneError::decode(format!("negative length {length}")));
        }
        Ok(length as usize)
    }

    pub fn write_string(&mut self, value: &str) {
        self.write_byte_array(value.as_bytes());
    }

    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_byte_array()?;
        String::from_utf8(bytes)
            .map_err(|_| LodestoneError::decode("failed to convert bytes to UTF-8 string"))
    }

    pub fn write_byte_array(&mut self, value: &[u8]) {
        self.write_varint(value.len() as i32);
        self.buffer.extend_from_slice(value);
    }

    pub fn read_byte_array(&mut self) -> Result<Vec<u8>> {
        let start = self.cursor;
        let length = self.read_length()?;
        match self.take(length) {
            Ok(bytes) => Ok(bytes.to_vec()),
            Err(e) => {
                self.cursor = start;
                Err(e)
            }
        }
    }

    /// Writes a UUID as two big-endian longs.
    pub fn write_uuid(&mut self, value: Uuid) {
        self.buffer.extend_from_slice(value.as_bytes());
    }

    pub fn read_uuid(&mut self) -> Result<Uuid> {
        let bytes: [u8; 16] = self
            .take(16)?
            .try_into()
            .map_err(|_| LodestoneError::decode("UUID must be 16 bytes"))?;
        Ok(Uuid::from_bytes(bytes))
    }

    pub fn write_position(&mut self, position: BlockPosition, version: ProtocolVersion) {
        self.write_u64(position.encode(version));
    }

    pub fn read_position(&mut self, version: ProtocolVersion) -> Result<BlockPosition> {
        Ok(BlockPosition::decode(self.read_u64()?, version))
    }

    /// Reads a named NBT tag from the cursor. A lone `TAG_End` comes back as [`Tag::End`].
    pub fn read_nbt(&mut self) -> Result<Tag> {
        let start = self.cursor;
        match Tag::read(self) {
            Ok((_, tag)) => Ok(tag),
            Err(e) => {
                self.cursor = start;
                Err(LodestoneError::decode(format!("NBT: {e}")))
            }
        }
    }

    pub fn write_nbt(&mut self, tag: &Tag) -> Result<()> {
        tag.write(&mut self.buffer, "")
            .map_err(|e| LodestoneError::decode(format!("NBT: {e}")))
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buffer.push(value as u8);
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buffer.push(u8::from(value));
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(BigEndian::read_i16(self.take(2)?))
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(BigEndian::read_i64(self.take(8)?))
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(BigEndian::read_u64(self.take(8)?))
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(BigEndian::read_f32(self.take(4)?))
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(BigEndian::read_f64(self.take(8)?))
    }
}

impl Read for PacketBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let to_read = buf.len().min(self.remaining());
        buf[..to_read].copy_from_slice(&self.buffer[self.cursor..self.cursor + to_read]);
        self.cursor += to_read;
        Ok(to_read)
    }
}

/// Number of bytes `value` takes as a VarInt.
pub fn varint_len(value: i32) -> usize {
    let value = value as u32;
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0x0FFF_FFFF => 4,
        _ => 5,
    }
}
