use crate::packet::{
    versioned_id, Clientbound, DecodeContext, Packet, PacketBuffer, Serverbound,
};
use lodestone_common::{BlockPosition, ProtocolState, ProtocolVersion, Result};
use lodestone_nbt::Tag;

/// Updates (or, with an empty compound, removes) one block entity.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockEntityDataPacket {
    pub position: BlockPosition,
    pub action: u8,
    /// `Tag::End` when the block entity is removed.
    pub nbt: Tag,
}

impl Packet for BlockEntityDataPacket {
    fn packet_id() -> i32 {
        0x09
    }

    fn state() -> ProtocolState {
        ProtocolState::Play
    }

    fn wire_id(version: ProtocolVersion) -> i32 {
        versioned_id(version, [0x09, 0x09, 0x09, 0x0A, 0x09, 0x09])
    }
}

impl Clientbound for BlockEntityDataPacket {
    fn read_from_buffer(buffer: &mut PacketBuffer, ctx: &DecodeContext) -> Result<Self> {
        Ok(Self {
            position: buffer.read_position(ctx.version)?,
            action: buffer.read_u8()?,
            nbt: buffer.read_nbt()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockChangePacket {
    pub position: BlockPosition,
    pub block_state: i32,
}

impl Packet for BlockChangePacket {
    fn packet_id() -> i32 {
        0x0B
    }

    fn state() -> ProtocolState {
        ProtocolState::Play
    }

    fn wire_id(version: ProtocolVersion) -> i32 {
        versioned_id(version, [0x0B, 0x0B, 0x0B, 0x0C, 0x0B, 0x0B])
    }
}

impl Clientbound for BlockChangePacket {
    fn read_from_buffer(buffer: &mut PacketBuffer, ctx: &DecodeContext) -> Result<Self> {
        Ok(Self {
            position: buffer.read_position(ctx.version)?,
            block_state: buffer.read_varint()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnloadChunkPacket {
    pub chunk_x: i32,
    pub chunk_z: i32,
}

impl Packet for UnloadChunkPacket {
    fn packet_id() -> i32 {
        0x1C
    }

    fn state() -> ProtocolState {
        ProtocolState::Play
    }

    fn wire_id(version: ProtocolVersion) -> i32 {
        versioned_id(version, [0x1D, 0x1F, 0x1D, 0x1E, 0x1D, 0x1C])
    }
}

impl Clientbound for UnloadChunkPacket {
    fn read_from_buffer(buffer: &mut PacketBuffer, _ctx: &DecodeContext) -> Result<Self> {
        Ok(Self {
            chunk_x: buffer.read_i32()?,
            chunk_z: buffer.read_i32()?,
        })
    }
}

/// One entry of a [`MultiBlockChangePacket`], already in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockChangeRecord {
    pub position: BlockPosition,
    pub block_state: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultiBlockChangePacket {
    pub suppress_light_updates: bool,
    pub records: Vec<BlockChangeRecord>,
}

impl MultiBlockChangePacket {
    /// 1.16.2+: one section, records packed as `state << 12 | x << 8 | z << 4 | y`.
    fn read_sectioned(buffer: &mut PacketBuffer) -> Result<Self> {
        let section = buffer.read_i64()?;
        let section_x = (section >> 42) as i32;
        let section_y = ((section << 44) >> 44) as i32;
        let section_z = ((section << 22) >> 42) as i32;
        let suppress_light_updates = buffer.read_bool()?;

        let count = buffer.read_length()?;
        let mut records = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            let record = buffer.read_varlong()?;
            let local = record & 0xFFF;
            records.push(BlockChangeRecord {
                position: BlockPosition::new(
                    section_x * 16 + ((local >> 8) & 0xF) as i32,
                    section_y * 16 + (local & 0xF) as i32,
                    section_z * 16 + ((local >> 4) & 0xF) as i32,
                ),
                block_state: (record >> 12) as i32,
            });
        }

        Ok(Self {
            suppress_light_updates,
            records,
        })
    }

    /// Before 1.16.2: a whole column, records as `xz: u8, y: u8, state: varint`.
    fn read_columned(buffer: &mut PacketBuffer) -> Result<Self> {
        let chunk_x = buffer.read_i32()?;
        let chunk_z = buffer.read_i32()?;

        let count = buffer.read_length()?;
        let mut records = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            let horizontal = buffer.read_u8()?;
            let y = buffer.read_u8()?;
            records.push(BlockChangeRecord {
                position: BlockPosition::new(
                    chunk_x * 16 + (horizontal >> 4) as i32,
                    y as i32,
                    chunk_z * 16 + (horizontal & 0xF) as i32,
                ),
                block_state: buffer.read_varint()?,
            });
        }

        Ok(Self {
            suppress_light_updates: false,
            records,
        })
    }
}

impl Packet for MultiBlockChangePacket {
    fn packet_id() -> i32 {
        0x3B
    }

    fn state() -> ProtocolState {
        ProtocolState::Play
    }

    fn wire_id(version: ProtocolVersion) -> i32 {
        versioned_id(version, [0x10, 0x0F, 0x0F, 0x10, 0x0F, 0x3B])
    }
}

impl Clientbound for MultiBlockChangePacket {
    fn read_from_buffer(buffer: &mut PacketBuffer, ctx: &DecodeContext) -> Result<Self> {
        if ctx.version >= ProtocolVersion::V1_16_2 {
            Self::read_sectioned(buffer)
        } else {
            Self::read_columned(buffer)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpawnPositionPacket {
    pub position: BlockPosition,
}

impl Packet for SpawnPositionPacket {
    fn packet_id() -> i32 {
        0x42
    }

    fn state() -> ProtocolState {
        ProtocolState::Play
    }

    fn wire_id(version: ProtocolVersion) -> i32 {
        versioned_id(version, [0x46, 0x49, 0x4D, 0x4E, 0x42, 0x42])
    }
}

impl Clientbound for SpawnPositionPacket {
    fn read_from_buffer(buffer: &mut PacketBuffer, ctx: &DecodeContext) -> Result<Self> {
        Ok(Self {
            position: buffer.read_position(ctx.version)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateHealthPacket {
    /// 0 or less means dead
    pub health: f32,
    pub food: i32,
    pub saturation: f32,
}

impl UpdateHealthPacket {
    pub fn is_dead(&self) -> bool {
        self.health <= 0.0
    }
}

impl Packet for UpdateHealthPacket {
    fn packet_id() -> i32 {
        0x49
    }

    fn state() -> ProtocolState {
        ProtocolState::Play
    }

    fn wire_id(version: ProtocolVersion) -> i32 {
        versioned_id(version, [0x41, 0x44, 0x48, 0x49, 0x49, 0x49])
    }
}

impl Clientbound for UpdateHealthPacket {
    fn read_from_buffer(buffer: &mut PacketBuffer, _ctx: &DecodeContext) -> Result<Self> {
        Ok(Self {
            health: buffer.read_f32()?,
            food: buffer.read_varint()?,
            saturation: buffer.read_f32()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatusAction {
    PerformRespawn = 0,
    RequestStats = 1,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientStatusPacket {
    pub action: ClientStatusAction,
}

impl Packet for ClientStatusPacket {
    fn packet_id() -> i32 {
        0x04
    }

    fn state() -> ProtocolState {
        ProtocolState::Play
    }

    fn wire_id(version: ProtocolVersion) -> i32 {
        versioned_id(version, [0x03, 0x03, 0x04, 0x04, 0x04, 0x04])
    }
}

impl Serverbound for ClientStatusPacket {
    fn write_to_buffer(&self, buffer: &mut PacketBuffer) {
        buffer.write_varint(self.action as i32);
    }
}
