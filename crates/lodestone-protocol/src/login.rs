use crate::packet::{Clientbound, DecodeContext, Packet, PacketBuffer, Serverbound};
use lodestone_common::{LodestoneError, ProtocolState, Result};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct LoginStartPacket {
    pub username: String,
}

impl LoginStartPacket {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

impl Packet for LoginStartPacket {
    fn packet_id() -> i32 {
        0x00
    }

    fn state() -> ProtocolState {
        ProtocolState::Login
    }
}

impl Serverbound for LoginStartPacket {
    fn write_to_buffer(&self, buffer: &mut PacketBuffer) {
        buffer.write_string(&self.username);
    }
}

/// Both fields are RSA-encrypted with the server's public key.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionResponsePacket {
    pub shared_secret: Vec<u8>,
    pub verify_token: Vec<u8>,
}

impl Packet for EncryptionResponsePacket {
    fn packet_id() -> i32 {
        0x01
    }

    fn state() -> ProtocolState {
        ProtocolState::Login
    }
}

impl Serverbound for EncryptionResponsePacket {
    fn write_to_buffer(&self, buffer: &mut PacketBuffer) {
        buffer.write_byte_array(&self.shared_secret);
        buffer.write_byte_array(&self.verify_token);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginDisconnectPacket {
    /// JSON chat component.
    pub reason: String,
}

impl Packet for LoginDisconnectPacket {
    fn packet_id() -> i32 {
        0x00
    }

    fn state() -> ProtocolState {
        ProtocolState::Login
    }
}

impl Clientbound for LoginDisconnectPacket {
    fn read_from_buffer(buffer: &mut PacketBuffer, _ctx: &DecodeContext) -> Result<Self> {
        Ok(Self {
            reason: buffer.read_string()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionRequestPacket {
    /// Empty on vanilla servers, still part of the session hash.
    pub server_id: String,
    /// DER encoded SubjectPublicKeyInfo.
    pub public_key: Vec<u8>,
    pub verify_token: Vec<u8>,
}

impl Packet for EncryptionRequestPacket {
    fn packet_id() -> i32 {
        0x01
    }

    fn state() -> ProtocolState {
        ProtocolState::Login
    }
}

impl Clientbound for EncryptionRequestPacket {
    fn read_from_buffer(buffer: &mut PacketBuffer, _ctx: &DecodeContext) -> Result<Self> {
        Ok(Self {
            server_id: buffer.read_string()?,
            public_key: buffer.read_byte_array()?,
            verify_token: buffer.read_byte_array()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginSuccessPacket {
    pub uuid: Uuid,
    pub username: String,
}

impl LoginSuccessPacket {
    /// UUID an offline-mode server assigns to `username`.
    pub fn offline_uuid(username: &str) -> Uuid {
        Uuid::new_v3(
            &Uuid::NAMESPACE_DNS,
            format!("OfflinePlayer:{username}").as_bytes(),
        )
    }
}

impl Packet for LoginSuccessPacket {
    fn packet_id() -> i32 {
        0x02
    }

    fn state() -> ProtocolState {
        ProtocolState::Login
    }
}

impl Clientbound for LoginSuccessPacket {
    fn read_from_buffer(buffer: &mut PacketBuffer, ctx: &DecodeContext) -> Result<Self> {
        let uuid = if ctx.version.has_binary_login_uuid() {
            buffer.read_uuid()?
        } else {
            let text = buffer.read_string()?;
            Uuid::parse_str(&text)
                .map_err(|e| LodestoneError::decode(format!("login UUID {text:?}: {e}")))?
        };

        Ok(Self {
            uuid,
            username: buffer.read_string()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetCompressionPacket {
    /// Negative disables compression.
    pub threshold: i32,
}

impl Packet for SetCompressionPacket {
    fn packet_id() -> i32 {
        0x03
    }

    fn state() -> ProtocolState {
        ProtocolState::Login
    }
}

impl Clientbound for SetCompressionPacket {
    fn read_from_buffer(buffer: &mut PacketBuffer, _ctx: &DecodeContext) -> Result<Self> {
        Ok(Self {
            threshold: buffer.read_varint()?,
        })
    }
}
