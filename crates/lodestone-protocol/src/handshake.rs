use crate::packet::{Packet, PacketBuffer, Serverbound};
use lodestone_common::{ProtocolState, ProtocolVersion};

/// Handshake packet. Sending it moves the connection to `next_state`.
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakePacket {
    pub protocol_version: ProtocolVersion,
    pub server_address: String,
    pub server_port: u16,
    pub next_state: ProtocolState,
}

impl HandshakePacket {
    pub fn new(
        protocol_version: ProtocolVersion,
        server_address: impl Into<String>,
        server_port: u16,
        next_state: ProtocolState,
    ) -> Self {
        Self {
            protocol_version,
            server_address: server_address.into(),
            server_port,
            next_state,
        }
    }
}

impl Packet for HandshakePacket {
    fn packet_id() -> i32 {
        0x00
    }

    fn state() -> ProtocolState {
        ProtocolState::Handshake
    }
}

impl Serverbound for HandshakePacket {
    fn write_to_buffer(&self, buffer: &mut PacketBuffer) {
        buffer.write_varint(self.protocol_version.0);
        buffer.write_string(&self.server_address);
        buffer.write_u16(self.server_port);
        buffer.write_varint(self.next_state.handshake_id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_layout() {
        let packet = HandshakePacket::new(
            ProtocolVersion::V1_16_5,
            "localhost",
            25565,
            ProtocolState::Login,
        );
        let mut buffer = PacketBuffer::new();
        packet.write_to_buffer(&mut buffer);

        assert_eq!(buffer.read_varint().unwrap(), 754);
        assert_eq!(buffer.read_string().unwrap(), "localhost");
        assert_eq!(buffer.read_u16().unwrap(), 25565);
        assert_eq!(buffer.read_varint().unwrap(), 2);
        assert!(buffer.is_finished());
    }
}
