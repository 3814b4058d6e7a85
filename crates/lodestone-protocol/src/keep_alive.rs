use crate::packet::{
    versioned_id, Clientbound, DecodeContext, Packet, PacketBuffer, Serverbound,
};
use lodestone_common::{ProtocolState, ProtocolVersion, Result};

/// Keep alive sent by the server; must be echoed back with the same id.
#[derive(Debug, Clone, PartialEq)]
pub struct KeepAlivePacket {
    pub keep_alive_id: i64,
}

impl Packet for KeepAlivePacket {
    fn packet_id() -> i32 {
        0x1F
    }

    fn state() -> ProtocolState {
        ProtocolState::Play
    }

    fn wire_id(version: ProtocolVersion) -> i32 {
        versioned_id(version, [0x1F, 0x21, 0x20, 0x21, 0x20, 0x1F])
    }
}

impl Clientbound for KeepAlivePacket {
    fn read_from_buffer(buffer: &mut PacketBuffer, _ctx: &DecodeContext) -> Result<Self> {
        Ok(KeepAlivePacket {
            keep_alive_id: buffer.read_i64()?,
        })
    }
}

/// Client's answer to [`KeepAlivePacket`].
#[derive(Debug, Clone, PartialEq)]
pub struct KeepAliveResponsePacket {
    pub keep_alive_id: i64,
}

impl KeepAliveResponsePacket {
    pub fn new(keep_alive_id: i64) -> Self {
        Self { keep_alive_id }
    }
}

impl Packet for KeepAliveResponsePacket {
    fn packet_id() -> i32 {
        0x10
    }

    fn state() -> ProtocolState {
        ProtocolState::Play
    }

    fn wire_id(version: ProtocolVersion) -> i32 {
        versioned_id(version, [0x0B, 0x0E, 0x0F, 0x0F, 0x10, 0x10])
    }
}

impl Serverbound for KeepAliveResponsePacket {
    fn write_to_buffer(&self, buffer: &mut PacketBuffer) {
        buffer.write_i64(self.keep_alive_id);
    }
}
