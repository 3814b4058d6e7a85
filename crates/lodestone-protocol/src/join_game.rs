use crate::packet::{versioned_id, Clientbound, DecodeContext, Packet, PacketBuffer};
use lodestone_common::{ProtocolState, ProtocolVersion, Result};
use lodestone_nbt::Tag;

fn dimension_has_skylight(
    dimension: &Tag,
    dimension_name: Option<&str>,
    legacy_dimension: Option<i32>,
) -> bool {
    if let Some(skylight) = dimension.get("has_skylight").and_then(Tag::as_bool) {
        return skylight;
    }
    if let Some(dimension) = legacy_dimension {
        return dimension == 0;
    }
    !matches!(
        dimension_name,
        Some("minecraft:the_nether") | Some("minecraft:the_end")
    )
}

/// Join Game. Layout follows the 1.16.2+ packet; older servers fill what they send and leave
/// the rest at defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinGamePacket {
    pub entity_id: i32,
    pub is_hardcore: bool,
    pub gamemode: u8,
    pub previous_gamemode: i8,    // -1 if no previous gamemode
    pub world_names: Vec<String>, // Array of Identifier
    pub dimension_codec: Tag,
    /// Dimension type compound (1.16.2+), `Tag::End` otherwise.
    pub dimension: Tag,
    /// Dimension identifier on 1.16/1.16.1.
    pub dimension_name: Option<String>,
    /// Numeric dimension before 1.16: -1 nether, 0 overworld, 1 end.
    pub legacy_dimension: Option<i32>,
    pub world_name: String,
    pub hashed_seed: i64,
    pub max_players: i32,
    pub view_distance: i32,
    pub reduced_debug_info: bool,
    pub enable_respawn_screen: bool,
    pub is_debug: bool,
    pub is_flat: bool,
}

impl JoinGamePacket {
    /// Whether chunks in this dimension carry sky light.
    pub fn has_skylight(&self) -> bool {
        dimension_has_skylight(
            &self.dimension,
            self.dimension_name.as_deref(),
            self.legacy_dimension,
        )
    }

    fn read_modern(buffer: &mut PacketBuffer, version: ProtocolVersion) -> Result<Self> {
        let entity_id = buffer.read_i32()?;
        let is_hardcore = if version >= ProtocolVersion::V1_16_2 {
            buffer.read_bool()?
        } else {
            false
        };
        let gamemode = buffer.read_u8()?;
        let previous_gamemode = buffer.read_i8()?;

        let world_count = buffer.read_length()?;
        let mut world_names = Vec::with_capacity(world_count.min(64));
        for _ in 0..world_count {
            world_names.push(buffer.read_string()?);
        }

        let dimension_codec = buffer.read_nbt()?;
        let (dimension, dimension_name) = if version >= ProtocolVersion::V1_16_2 {
            (buffer.read_nbt()?, None)
        } else {
            (Tag::End, Some(buffer.read_string()?))
        };
        let world_name = buffer.read_string()?;
        let hashed_seed = buffer.read_i64()?;
        let max_players = if version >= ProtocolVersion::V1_16_2 {
            buffer.read_varint()?
        } else {
            buffer.read_u8()? as i32
        };

        Ok(JoinGamePacket {
            entity_id,
            is_hardcore,
            gamemode,
            previous_gamemode,
            world_names,
            dimension_codec,
            dimension,
            dimension_name,
            legacy_dimension: None,
            world_name,
            hashed_seed,
            max_players,
            view_distance: buffer.read_varint()?,
            reduced_debug_info: buffer.read_bool()?,
            enable_respawn_screen: buffer.read_bool()?,
            is_debug: buffer.read_bool()?,
            is_flat: buffer.read_bool()?,
        })
    }

    fn read_legacy(buffer: &mut PacketBuffer, version: ProtocolVersion) -> Result<Self> {
        let entity_id = buffer.read_i32()?;
        let raw_gamemode = buffer.read_u8()?;
        let dimension = buffer.read_i32()?;

        let hashed_seed = if version.has_biomes_before_data() {
            buffer.read_i64()?
        } else {
            0
        };
        if !version.has_section_block_count() {
            let _difficulty = buffer.read_u8()?;
        }
        let max_players = buffer.read_u8()? as i32;
        let level_type = buffer.read_string()?;
        let view_distance = if version.has_section_block_count() {
            buffer.read_varint()?
        } else {
            0
        };
        let reduced_debug_info = buffer.read_bool()?;
        let enable_respawn_screen = if version.has_biomes_before_data() {
            buffer.read_bool()?
        } else {
            true
        };

        Ok(JoinGamePacket {
            entity_id,
            // Bit 3 of the legacy gamemode byte is the hardcore flag
            is_hardcore: raw_gamemode & 0x08 != 0,
            gamemode: raw_gamemode & 0x07,
            previous_gamemode: -1,
            world_names: Vec::new(),
            dimension_codec: Tag::End,
            dimension: Tag::End,
            dimension_name: None,
            legacy_dimension: Some(dimension),
            is_flat: level_type == "flat",
            world_name: level_type,
            hashed_seed,
            max_players,
            view_distance,
            reduced_debug_info,
            enable_respawn_screen,
            is_debug: false,
        })
    }
}

impl Packet for JoinGamePacket {
    fn packet_id() -> i32 {
        0x24
    }

    fn state() -> ProtocolState {
        ProtocolState::Play
    }

    fn wire_id(version: ProtocolVersion) -> i32 {
        versioned_id(version, [0x23, 0x25, 0x25, 0x26, 0x25, 0x24])
    }
}

impl Clientbound for JoinGamePacket {
    fn read_from_buffer(buffer: &mut PacketBuffer, ctx: &DecodeContext) -> Result<Self> {
        if ctx.version >= ProtocolVersion::V1_16 {
            Self::read_modern(buffer, ctx.version)
        } else {
            Self::read_legacy(buffer, ctx.version)
        }
    }
}

/// Sent on every dimension change. Carries the same dimension data as [`JoinGamePacket`].
#[derive(Debug, Clone, PartialEq)]
pub struct RespawnPacket {
    /// Dimension type compound (1.16.2+), `Tag::End` otherwise.
    pub dimension: Tag,
    /// Dimension identifier on 1.16/1.16.1.
    pub dimension_name: Option<String>,
    /// Numeric dimension before 1.16.
    pub legacy_dimension: Option<i32>,
    /// World identifier from 1.16, level type before.
    pub world_name: String,
    pub hashed_seed: i64,
    pub gamemode: u8,
    pub previous_gamemode: i8,
    pub is_debug: bool,
    pub is_flat: bool,
    pub copy_metadata: bool,
}

impl RespawnPacket {
    pub fn has_skylight(&self) -> bool {
        dimension_has_skylight(
            &self.dimension,
            self.dimension_name.as_deref(),
            self.legacy_dimension,
        )
    }

    fn read_modern(buffer: &mut PacketBuffer, version: ProtocolVersion) -> Result<Self> {
        let (dimension, dimension_name) = if version >= ProtocolVersion::V1_16_2 {
            (buffer.read_nbt()?, None)
        } else {
            (Tag::End, Some(buffer.read_string()?))
        };

        Ok(Self {
            dimension,
            dimension_name,
            legacy_dimension: None,
            world_name: buffer.read_string()?,
            hashed_seed: buffer.read_i64()?,
            gamemode: buffer.read_u8()?,
            previous_gamemode: buffer.read_i8()?,
            is_debug: buffer.read_bool()?,
            is_flat: buffer.read_bool()?,
            copy_metadata: buffer.read_bool()?,
        })
    }

    fn read_legacy(buffer: &mut PacketBuffer, version: ProtocolVersion) -> Result<Self> {
        let dimension = buffer.read_i32()?;
        let hashed_seed = if version.has_biomes_before_data() {
            buffer.read_i64()?
        } else {
            0
        };
        if !version.has_section_block_count() {
            let _difficulty = buffer.read_u8()?;
        }
        let gamemode = buffer.read_u8()? & 0x07;
        let level_type = buffer.read_string()?;

        Ok(Self {
            dimension: Tag::End,
            dimension_name: None,
            legacy_dimension: Some(dimension),
            is_flat: level_type == "flat",
            world_name: level_type,
            hashed_seed,
            gamemode,
            previous_gamemode: -1,
            is_debug: false,
            copy_metadata: false,
        })
    }
}

impl Packet for RespawnPacket {
    fn packet_id() -> i32 {
        0x39
    }

    fn state() -> ProtocolState {
        ProtocolState::Play
    }

    fn wire_id(version: ProtocolVersion) -> i32 {
        versioned_id(version, [0x35, 0x38, 0x3A, 0x3B, 0x3A, 0x39])
    }
}

impl Clientbound for RespawnPacket {
    fn read_from_buffer(buffer: &mut PacketBuffer, ctx: &DecodeContext) -> Result<Self> {
        if ctx.version >= ProtocolVersion::V1_16 {
            Self::read_modern(buffer, ctx.version)
        } else {
            Self::read_legacy(buffer, ctx.version)
        }
    }
}
