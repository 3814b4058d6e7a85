#![allow(dead_code)]

use lodestone_common::ProtocolVersion;
use lodestone_protocol::{Compression, Encryption, PacketBuffer};

/// Produces bytes the way a server would: framed, compressed and encrypted.
#[derive(Default)]
pub struct ServerStream {
    compression: Compression,
    encryption: Encryption,
}

impl ServerStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compression(mut self, threshold: i32) -> Self {
        self.compression = Compression::for_threshold(threshold);
        self
    }

    pub fn with_encryption(mut self, secret: &[u8]) -> Self {
        self.encryption = Encryption::aes(secret).unwrap();
        self
    }

    pub fn packet(&mut self, id: i32, body: impl FnOnce(&mut PacketBuffer)) -> Vec<u8> {
        let mut payload = PacketBuffer::new();
        payload.write_varint(id);
        body(&mut payload);

        let mut frame = self.compression.frame(payload.as_slice()).unwrap();
        self.encryption.encrypt(&mut frame);
        frame
    }

    pub fn keep_alive(&mut self, id: i64) -> Vec<u8> {
        self.packet(0x1F, |buffer| buffer.write_i64(id))
    }

    pub fn chat(&mut self, text: &str) -> Vec<u8> {
        let json = format!(r#"{{"text":"{text}"}}"#);
        self.packet(0x0E, |buffer| {
            buffer.write_string(&json);
            buffer.write_i8(0);
            buffer.write_uuid(uuid::Uuid::nil());
        })
    }
}

/// Writes a section of `values` (one per block, palette indices or ids) in the wire layout
/// `version` uses, with an identity palette when the bits allow one.
pub fn write_section(
    buffer: &mut PacketBuffer,
    bits: u8,
    values: &[u64],
    version: ProtocolVersion,
) {
    assert_eq!(values.len(), 4096);
    if version.has_section_block_count() {
        buffer.write_i16(4096);
    }
    buffer.write_u8(bits);
    if bits <= 8 {
        buffer.write_varint(1 << bits);
        for id in 0..(1 << bits) {
            buffer.write_varint(id);
        }
    }

    let bits = bits as usize;
    let mut data;
    if version.has_padded_long_arrays() {
        let per_long = 64 / bits;
        data = vec![0u64; 4096usize.div_ceil(per_long)];
        for (index, &value) in values.iter().enumerate() {
            data[index / per_long] |= value << (bits * (index % per_long));
        }
    } else {
        data = vec![0u64; 4096 * bits / 64];
        for (index, &value) in values.iter().enumerate() {
            let bit = index * bits;
            let (long, offset) = (bit / 64, bit % 64);
            data[long] |= value << offset;
            if offset + bits > 64 {
                data[long + 1] |= value >> (64 - offset);
            }
        }
    }

    buffer.write_varint(data.len() as i32);
    for long in data {
        buffer.write_u64(long);
    }
    if version.has_section_light() {
        buffer.write_bytes(&[0u8; 4096]);
    }
}

/// Section-relative coordinates of a block index.
pub fn coordinates(index: usize) -> (i32, i32, i32) {
    ((index % 16) as i32, (index / 256) as i32, ((index / 16) % 16) as i32)
}
