use crate::packet::PacketBuffer;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use lodestone_common::{LodestoneError, Result};
use std::io::{Read, Write};

/// Largest uncompressed payload the server is allowed to announce.
pub const MAX_UNCOMPRESSED_SIZE: usize = 8_388_608;

/// Payload compression. Swapped by assignment when the server sends Set Compression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    None,
    /// Payloads of at least `threshold` bytes are deflated.
    Zlib { threshold: usize },
}

impl Compression {
    /// Maps the threshold announced by the server. A negative threshold turns compression off.
    pub fn for_threshold(threshold: i32) -> Self {
        if threshold < 0 {
            Compression::None
        } else {
            Compression::Zlib {
                threshold: threshold as usize,
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Compression::Zlib { .. })
    }

    /// Wraps a `packet id | body` payload into a length-prefixed frame.
    pub fn frame(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut inner = PacketBuffer::with_capacity(payload.len() + 5);

        match *self {
            Compression::None => inner.write_bytes(payload),
            Compression::Zlib { threshold } if payload.len() >= threshold => {
                inner.write_varint(payload.len() as i32);
                inner.write_bytes(&deflate(payload)?);
            }
            Compression::Zlib { .. } => {
                inner.write_varint(0);
                inner.write_bytes(payload);
            }
        }

        let mut framed = PacketBuffer::with_capacity(inner.len() + 5);
        framed.write_varint(inner.len() as i32);
        framed.write_bytes(inner.as_slice());
        Ok(framed.into_inner())
    }

    /// Turns the contents of one frame (length prefix already removed) back into a payload.
    pub fn unframe(&self, frame: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::None => Ok(frame.to_vec()),
            Compression::Zlib { .. } => {
                let mut buffer = PacketBuffer::from_bytes(frame);
                let data_len = buffer
                    .read_length()
                    .map_err(|e| LodestoneError::Compression(format!("bad data length: {e}")))?;

                if data_len == 0 {
                    return Ok(buffer.take_remaining().to_vec());
                }
                if data_len > MAX_UNCOMPRESSED_SIZE {
                    return Err(LodestoneError::Compression(format!(
                        "declared size {data_len} exceeds {MAX_UNCOMPRESSED_SIZE}"
                    )));
                }

                inflate(buffer.take_remaining(), data_len)
            }
        }
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| LodestoneError::Compression(format!("zlib compression failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| LodestoneError::Compression(format!("zlib finish failed: {e}")))
}

fn inflate(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    let mut decompressed = Vec::with_capacity(expected);
    // One extra byte lets an oversized stream show up as a size mismatch
    ZlibDecoder::new(data)
        .take(expected as u64 + 1)
        .read_to_end(&mut decompressed)
        .map_err(|e| LodestoneError::Compression(format!("zlib decompression failed: {e}")))?;

    if decompressed.len() != expected {
        return Err(LodestoneError::Compression(format!(
            "declared size {expected} but inflated {} bytes",
            decompressed.len()
        )));
    }
    Ok(decompressed)
}
