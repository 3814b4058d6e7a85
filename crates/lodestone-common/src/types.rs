use serde::{Deserialize, Serialize};
use std::fmt;

pub type Result<T> = std::result::Result<T, crate::error::LodestoneError>;

/// Protocol state of a connection. Packet ids are only meaningful within a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolState {
    Handshake,
    Status,
    Login,
    Play,
}

impl ProtocolState {
    /// Value sent as `next_state` in the handshake packet.
    pub fn handshake_id(self) -> i32 {
        match self {
            ProtocolState::Handshake => 0,
            ProtocolState::Status => 1,
            ProtocolState::Login => 2,
            ProtocolState::Play => 3,
        }
    }

    /// States only move forward; `Play` is terminal.
    pub fn can_transition_to(self, next: ProtocolState) -> bool {
        matches!(
            (self, next),
            (ProtocolState::Handshake, ProtocolState::Status)
                | (ProtocolState::Handshake, ProtocolState::Login)
                | (ProtocolState::Login, ProtocolState::Play)
        )
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolState::Handshake => write!(f, "handshake"),
            ProtocolState::Status => write!(f, "status"),
            ProtocolState::Login => write!(f, "login"),
            ProtocolState::Play => write!(f, "play"),
        }
    }
}

/// Numeric protocol version as sent in the handshake.
///
/// Wire layouts that changed between releases are exposed as predicates so callers never
/// compare raw numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolVersion(pub i32);

impl ProtocolVersion {
    pub const V1_12_2: ProtocolVersion = ProtocolVersion(340);
    pub const V1_13_2: ProtocolVersion = ProtocolVersion(404);
    pub const V1_14: ProtocolVersion = ProtocolVersion(477);
    pub const V1_14_4: ProtocolVersion = ProtocolVersion(498);
    pub const V1_15: ProtocolVersion = ProtocolVersion(573);
    pub const V1_15_2: ProtocolVersion = ProtocolVersion(578);
    pub const V1_16: ProtocolVersion = ProtocolVersion(735);
    pub const V1_16_1: ProtocolVersion = ProtocolVersion(736);
    pub const V1_16_2: ProtocolVersion = ProtocolVersion(751);
    pub const V1_16_5: ProtocolVersion = ProtocolVersion(754);

    pub const LATEST: ProtocolVersion = ProtocolVersion::V1_16_5;

    /// 1.14 moved `y` to the low 12 bits of a packed position.
    pub fn packs_y_low(self) -> bool {
        self >= Self::V1_14
    }

    /// 1.14 added a non-air block count to each chunk section.
    pub fn has_section_block_count(self) -> bool {
        self >= Self::V1_14
    }

    /// Up to 1.13.2 light arrays travel inside every chunk section.
    pub fn has_section_light(self) -> bool {
        self < Self::V1_14
    }

    /// 1.14 added the heightmaps NBT to chunk data.
    pub fn has_heightmaps(self) -> bool {
        self >= Self::V1_14
    }

    /// 1.15 moved biomes out of the section data and in front of it.
    pub fn has_biomes_before_data(self) -> bool {
        self >= Self::V1_15
    }

    /// From 1.16 packed long arrays no longer let entries straddle two longs.
    pub fn has_padded_long_arrays(self) -> bool {
        self >= Self::V1_16
    }

    /// 1.16 and 1.16.1 carry an "ignore old data" flag in chunk data.
    pub fn has_ignore_old_data(self) -> bool {
        self >= Self::V1_16 && self < Self::V1_16_2
    }

    /// 1.16.2 switched the biome array to a varint-prefixed list of varints.
    pub fn has_varint_biomes(self) -> bool {
        self >= Self::V1_16_2
    }

    /// 1.16 sends the login success UUID as 16 raw bytes instead of a string.
    pub fn has_binary_login_uuid(self) -> bool {
        self >= Self::V1_16
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        ProtocolVersion::LATEST
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Absolute block position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPosition {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

const XZ_BITS: u32 = 26;
const Y_BITS: u32 = 12;
const XZ_MASK: u64 = (1 << XZ_BITS) - 1;
const Y_MASK: u64 = (1 << Y_BITS) - 1;

impl BlockPosition {
    pub const MIN_XZ: i32 = -(1 << (XZ_BITS - 1));
    pub const MAX_XZ: i32 = (1 << (XZ_BITS - 1)) - 1;
    pub const MIN_Y: i32 = -(1 << (Y_BITS - 1));
    pub const MAX_Y: i32 = (1 << (Y_BITS - 1)) - 1;

    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Chunk column coordinates containing this block.
    pub fn chunk(&self) -> (i32, i32) {
        (self.x >> 4, self.z >> 4)
    }

    /// Packs the position into a single long.
    ///
    /// Legacy layout: `x:26 | y:12 | z:26`. From 1.14: `x:26 | z:26 | y:12`.
    pub fn encode(&self, version: ProtocolVersion) -> u64 {
        let x = self.x as i64 as u64 & XZ_MASK;
        let y = self.y as i64 as u64 & Y_MASK;
        let z = self.z as i64 as u64 & XZ_MASK;

        if version.packs_y_low() {
            (x << 38) | (z << 12) | y
        } else {
            (x << 38) | (y << 26) | z
        }
    }

    /// Unpacks a long produced by [`BlockPosition::encode`], sign extending every field on
    /// its own.
    pub fn decode(value: u64, version: ProtocolVersion) -> Self {
        let value = value as i64;
        // Shift the field to the top of the word, then arithmetic-shift it back down.
        let x = value >> 38;
        let (y, z) = if version.packs_y_low() {
            ((value << 52) >> 52, (value << 26) >> 38)
        } else {
            ((value << 26) >> 52, (value << 38) >> 38)
        };

        Self {
            x: x as i32,
            y: y as i32,
            z: z as i32,
        }
    }
}

impl fmt::Display for BlockPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}
