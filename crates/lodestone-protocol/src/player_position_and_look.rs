use crate::packet::{
    versioned_id, Clientbound, DecodeContext, Packet, PacketBuffer, Serverbound,
};
use lodestone_common::{ProtocolState, ProtocolVersion, Result};

/// Where the player is and where they look.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerPose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
}

/// Player Position And Look (clientbound)
/// Teleports the player. Has to be confirmed with [`TeleportConfirmPacket`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerPositionAndLookPacket {
    /// Absolute or relative position, depending on Flags
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Absolute or relative rotation, in degrees
    pub yaw: f32,
    pub pitch: f32,
    /// Bit field marking which of the fields above are relative
    pub flags: u8,
    pub teleport_id: i32,
}

impl PlayerPositionAndLookPacket {
    pub const RELATIVE_X: u8 = 0x01;
    pub const RELATIVE_Y: u8 = 0x02;
    pub const RELATIVE_Z: u8 = 0x04;
    pub const RELATIVE_YAW: u8 = 0x08;
    pub const RELATIVE_PITCH: u8 = 0x10;

    /// Resolves relative fields against `current`.
    pub fn apply(&self, current: PlayerPose) -> PlayerPose {
        let pick = |flag: u8, value: f64, base: f64| {
            if self.flags & flag != 0 {
                base + value
            } else {
                value
            }
        };
        let pick_angle = |flag: u8, value: f32, base: f32| {
            if self.flags & flag != 0 {
                base + value
            } else {
                value
            }
        };

        PlayerPose {
            x: pick(Self::RELATIVE_X, self.x, current.x),
            y: pick(Self::RELATIVE_Y, self.y, current.y),
            z: pick(Self::RELATIVE_Z, self.z, current.z),
            yaw: pick_angle(Self::RELATIVE_YAW, self.yaw, current.yaw),
            pitch: pick_angle(Self::RELATIVE_PITCH, self.pitch, current.pitch),
        }
    }
}

impl Packet for PlayerPositionAndLookPacket {
    fn packet_id() -> i32 {
        0x34
    }

    fn state() -> ProtocolState {
        ProtocolState::Play
    }

    fn wire_id(version: ProtocolVersion) -> i32 {
        versioned_id(version, [0x2F, 0x32, 0x35, 0x36, 0x35, 0x34])
    }
}

impl Clientbound for PlayerPositionAndLookPacket {
    fn read_from_buffer(buffer: &mut PacketBuffer, _ctx: &DecodeContext) -> Result<Self> {
        Ok(Self {
            x: buffer.read_f64()?,
            y: buffer.read_f64()?,
            z: buffer.read_f64()?,
            yaw: buffer.read_f32()?,
            pitch: buffer.read_f32()?,
            flags: buffer.read_u8()?,
            teleport_id: buffer.read_varint()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeleportConfirmPacket {
    pub teleport_id: i32,
}

impl Packet for TeleportConfirmPacket {
    fn packet_id() -> i32 {
        0x00
    }

    fn state() -> ProtocolState {
        ProtocolState::Play
    }
}

impl Serverbound for TeleportConfirmPacket {
    fn write_to_buffer(&self, buffer: &mut PacketBuffer) {
        buffer.write_varint(self.teleport_id);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerPositionAndRotationPacket {
    pub x: f64,
    /// Feet position
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
    pub on_ground: bool,
}

impl PlayerPositionAndRotationPacket {
    pub fn from_pose(pose: PlayerPose, on_ground: bool) -> Self {
        Self {
            x: pose.x,
            y: pose.y,
            z: pose.z,
            yaw: pose.yaw,
            pitch: pose.pitch,
            on_ground,
        }
    }
}

impl Packet for PlayerPositionAndRotationPacket {
    fn packet_id() -> i32 {
        0x13
    }

    fn state() -> ProtocolState {
        ProtocolState::Play
    }

    fn wire_id(version: ProtocolVersion) -> i32 {
        versioned_id(version, [0x0E, 0x11, 0x12, 0x12, 0x13, 0x13])
    }
}

impl Serverbound for PlayerPositionAndRotationPacket {
    fn write_to_buffer(&self, buffer: &mut PacketBuffer) {
        buffer.write_f64(self.x);
        buffer.write_f64(self.y);
        buffer.write_f64(self.z);
        buffer.write_f32(self.yaw);
        buffer.write_f32(self.pitch);
        buffer.write_bool(self.on_ground);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_and_apply_relative() {
        let mut buffer = PacketBuffer::new();
        buffer.write_f64(1.0);
        buffer.write_f64(64.0);
        buffer.write_f64(-2.5);
        buffer.write_f32(90.0);
        buffer.write_f32(10.0);
        buffer.write_u8(PlayerPositionAndLookPacket::RELATIVE_X | PlayerPositionAndLookPacket::RELATIVE_YAW);
        buffer.write_varint(3);

        let ctx = DecodeContext::new(ProtocolVersion::V1_16_5);
        let packet = PlayerPositionAndLookPacket::read_from_buffer(&mut buffer, &ctx).unwrap();
        assert_eq!(packet.teleport_id, 3);

        let current = PlayerPose {
            x: 10.0,
            y: 70.0,
            z: 5.0,
            yaw: 45.0,
            pitch: 0.0,
        };
        let pose = packet.apply(current);
        assert_eq!(pose.x, 11.0);
        assert_eq!(pose.y, 64.0);
        assert_eq!(pose.z, -2.5);
        assert_eq!(pose.yaw, 135.0);
        assert_eq!(pose.pitch, 10.0);
    }

    #[test]
    fn test_position_rotation_layout() {
        let packet = PlayerPositionAndRotationPacket::from_pose(
            PlayerPose {
                x: 1.0,
                y: 2.0,
                z: 3.0,
                yaw: 4.0,
                pitch: 5.0,
            },
            true,
        );
        let mut buffer = PacketBuffer::new();
        packet.write_to_buffer(&mut buffer);
        assert_eq!(buffer.len(), 8 * 3 + 4 * 2 + 1);
    }
}
