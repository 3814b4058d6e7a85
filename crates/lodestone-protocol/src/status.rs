use crate::packet::{Clientbound, DecodeContext, Packet, PacketBuffer, Serverbound};
use lodestone_common::{LodestoneError, ProtocolState, Result};
use serde::Deserialize;

/// Status request, answered by [`StatusResponsePacket`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusRequestPacket;

impl Packet for StatusRequestPacket {
    fn packet_id() -> i32 {
        0x00
    }

    fn state() -> ProtocolState {
        ProtocolState::Status
    }
}

impl Serverbound for StatusRequestPacket {
    fn write_to_buffer(&self, _buffer: &mut PacketBuffer) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct PingPacket {
    pub payload: i64,
}

impl Packet for PingPacket {
    fn packet_id() -> i32 {
        0x01
    }

    fn state() -> ProtocolState {
        ProtocolState::Status
    }
}

impl Serverbound for PingPacket {
    fn write_to_buffer(&self, buffer: &mut PacketBuffer) {
        buffer.write_i64(self.payload);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusResponsePacket {
    pub json: String,
}

/// The parts of the server list ping JSON the client cares about.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerStatus {
    pub version: StatusVersion,
    pub players: Option<StatusPlayers>,
    #[serde(default)]
    pub description: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusVersion {
    pub name: String,
    pub protocol: i32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusPlayers {
    pub max: i32,
    pub online: i32,
}

impl StatusResponsePacket {
    pub fn status(&self) -> Result<ServerStatus> {
        serde_json::from_str(&self.json)
            .map_err(|e| LodestoneError::decode(format!("status JSON: {e}")))
    }
}

impl Packet for StatusResponsePacket {
    fn packet_id() -> i32 {
        0x00
    }

    fn state() -> ProtocolState {
        ProtocolState::Status
    }
}

impl Clientbound for StatusResponsePacket {
    fn read_from_buffer(buffer: &mut PacketBuffer, _ctx: &DecodeContext) -> Result<Self> {
        Ok(Self {
            json: buffer.read_string()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PongPacket {
    pub payload: i64,
}

impl Packet for PongPacket {
    fn packet_id() -> i32 {
        0x01
    }

    fn state() -> ProtocolState {
        ProtocolState::Status
    }
}

impl Clientbound for PongPacket {
    fn read_from_buffer(buffer: &mut PacketBuffer, _ctx: &DecodeContext) -> Result<Self> {
        Ok(Self {
            payload: buffer.read_i64()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestone_common::ProtocolVersion;

    #[test]
    fn test_status_json() {
        let mut buffer = PacketBuffer::new();
        buffer.write_string(
            r#"{"version":{"name":"1.16.5","protocol":754},"players":{"max":20,"online":3},"description":{"text":"A Minecraft Server"}}"#,
        );
        let ctx = DecodeContext::new(ProtocolVersion::V1_16_5);
        let packet = StatusResponsePacket::read_from_buffer(&mut buffer, &ctx).unwrap();
        let status = packet.status().unwrap();

        assert_eq!(status.version.protocol, 754);
        assert_eq!(status.players.map(|p| p.online), Some(3));
        assert_eq!(status.description["text"], "A Minecraft Server");
    }

    #[test]
    fn test_status_json_invalid() {
        let packet = StatusResponsePacket {
            json: "not json".to_owned(),
        };
        assert!(packet.status().is_err());
    }
}
