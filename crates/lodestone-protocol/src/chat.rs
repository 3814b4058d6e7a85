use crate::packet::{
    versioned_id, Clientbound, DecodeContext, Packet, PacketBuffer, Serverbound,
};
use lodestone_common::{ProtocolState, ProtocolVersion, Result};
use serde_json::Value;
use uuid::Uuid;

/// Flattens a JSON chat component to plain text. Anything that is not JSON is returned as is.
pub fn plain_text(json: &str) -> String {
    match serde_json::from_str::<Value>(json) {
        Ok(value) => {
            let mut out = String::new();
            flatten(&value, &mut out);
            out
        }
        Err(_) => json.to_owned(),
    }
}

fn flatten(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => out.push_str(s),
        Value::Array(parts) => parts.iter().for_each(|part| flatten(part, out)),
        Value::Object(map) => {
            if let Some(text) = map.get("text").and_then(Value::as_str) {
                out.push_str(text);
            } else if let Some(key) = map.get("translate").and_then(Value::as_str) {
                out.push_str(key);
                if let Some(Value::Array(args)) = map.get("with") {
                    for arg in args {
                        out.push(' ');
                        flatten(arg, out);
                    }
                }
            }
            if let Some(extra) = map.get("extra") {
                flatten(extra, out);
            }
        }
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Null => {}
    }
}

/// Chat message (clientbound).
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessagePacket {
    pub json: String,
    /// 0: chat box, 1: system message, 2: game info above the hotbar
    pub position: i8,
    pub sender: Uuid,
}

impl ChatMessagePacket {
    pub fn text(&self) -> String {
        plain_text(&self.json)
    }
}

impl Packet for ChatMessagePacket {
    fn packet_id() -> i32 {
        0x0E
    }

    fn state() -> ProtocolState {
        ProtocolState::Play
    }

    fn wire_id(version: ProtocolVersion) -> i32 {
        versioned_id(version, [0x0F, 0x0E, 0x0E, 0x0F, 0x0E, 0x0E])
    }
}

impl Clientbound for ChatMessagePacket {
    fn read_from_buffer(buffer: &mut PacketBuffer, ctx: &DecodeContext) -> Result<Self> {
        let json = buffer.read_string()?;
        let position = buffer.read_i8()?;
        // The sender field was added in 1.16
        let sender = if ctx.version.has_binary_login_uuid() {
            buffer.read_uuid()?
        } else {
            Uuid::nil()
        };
        Ok(Self {
            json,
            position,
            sender,
        })
    }
}

/// Play state disconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct DisconnectPacket {
    pub reason: String,
}

impl DisconnectPacket {
    pub fn text(&self) -> String {
        plain_text(&self.reason)
    }
}

impl Packet for DisconnectPacket {
    fn packet_id() -> i32 {
        0x19
    }

    fn state() -> ProtocolState {
        ProtocolState::Play
    }

    fn wire_id(version: ProtocolVersion) -> i32 {
        versioned_id(version, [0x1A, 0x1B, 0x1A, 0x1B, 0x1A, 0x19])
    }
}

impl Clientbound for DisconnectPacket {
    fn read_from_buffer(buffer: &mut PacketBuffer, _ctx: &DecodeContext) -> Result<Self> {
        Ok(Self {
            reason: buffer.read_string()?,
        })
    }
}

/// Chat message (serverbound). Messages starting with `/` are commands.
#[derive(Debug, Clone, PartialEq)]
pub struct SendChatMessagePacket {
    pub message: String,
}

impl SendChatMessagePacket {
    /// Vanilla servers kick for messages over 256 characters.
    pub const MAX_LEN: usize = 256;

    pub fn new(message: impl Into<String>) -> Self {
        let mut message: String = message.into();
        if let Some((cut, _)) = message.char_indices().nth(Self::MAX_LEN) {
            message.truncate(cut);
        }
        Self { message }
    }
}

impl Packet for SendChatMessagePacket {
    fn packet_id() -> i32 {
        0x03
    }

    fn state() -> ProtocolState {
        ProtocolState::Play
    }

    fn wire_id(version: ProtocolVersion) -> i32 {
        versioned_id(version, [0x02, 0x02, 0x03, 0x03, 0x03, 0x03])
    }
}

impl Serverbound for SendChatMessagePacket {
    fn write_to_buffer(&self, buffer: &mut PacketBuffer) {
        buffer.write_string(&self.message);
    }
}
