#![allow(dead_code)]

use lodestone_client::ClientConfig;
use lodestone_protocol::{Compression, Encryption, PacketBuffer};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

pub fn config(username: &str) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.account.username = username.to_owned();
    config
}

/// Frames `id | body` the way either side of the connection would.
pub fn frame(
    compression: Compression,
    id: i32,
    body: impl FnOnce(&mut PacketBuffer),
) -> Vec<u8> {
    let mut payload = PacketBuffer::new();
    payload.write_varint(id);
    body(&mut payload);
    compression.frame(payload.as_slice()).unwrap()
}

pub fn plain(id: i32, body: impl FnOnce(&mut PacketBuffer)) -> Vec<u8> {
    frame(Compression::None, id, body)
}

pub fn handshake(config: &ClientConfig) -> Vec<u8> {
    plain(0x00, |buffer| {
        buffer.write_varint(config.server.protocol_version.0);
        buffer.write_string(&config.server.host);
        buffer.write_u16(config.server.port);
        buffer.write_varint(2);
    })
}

pub fn login_start(username: &str) -> Vec<u8> {
    plain(0x00, |buffer| buffer.write_string(username))
}

pub fn login_success(compression: Compression, username: &str) -> Vec<u8> {
    frame(compression, 0x02, |buffer| {
        buffer.write_uuid(uuid::Uuid::from_u128(0x0123_4567_89ab_cdef));
        buffer.write_string(username);
    })
}

/// Server end of an in-memory connection with its own transforms.
pub struct ServerSide {
    pub stream: DuplexStream,
    pub compression: Compression,
    pub encryption: Encryption,
    inbound: PacketBuffer,
}

impl ServerSide {
    pub fn new(stream: DuplexStream) -> Self {
        Self {
            stream,
            compression: Compression::None,
            encryption: Encryption::None,
            inbound: PacketBuffer::new(),
        }
    }

    pub async fn send(&mut self, id: i32, body: impl FnOnce(&mut PacketBuffer)) {
        let mut bytes = frame(self.compression, id, body);
        self.encryption.encrypt(&mut bytes);
        self.stream.write_all(&bytes).await.unwrap();
    }

    /// Next `id | body` payload sent by the client.
    pub async fn read_payload(&mut self) -> PacketBuffer {
        loop {
            let start = self.inbound.position();
            if let Ok(length) = self.inbound.read_varint() {
                if self.inbound.remaining() >= length as usize {
                    let frame = self.inbound.take(length as usize).unwrap().to_vec();
                    return PacketBuffer::from_bytes(self.compression.unframe(&frame).unwrap());
                }
            }
            self.inbound.rewind_to(start);

            let mut chunk = [0u8; 1024];
            let n = self.stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed the connection");
            let mut received = chunk[..n].to_vec();
            self.encryption.decrypt(&mut received);
            self.inbound.append(&received);
        }
    }
}
