use crate::chat::{ChatMessagePacket, DisconnectPacket};
use crate::chunk_data::ChunkDataPacket;
use crate::join_game::{JoinGamePacket, RespawnPacket};
use crate::keep_alive::KeepAlivePacket;
use crate::login::{
    EncryptionRequestPacket, LoginDisconnectPacket, LoginSuccessPacket, SetCompressionPacket,
};
use crate::packet::{Clientbound, DecodeContext, Packet, PacketBuffer, PacketKey};
use crate::play::{
    BlockChangePacket, BlockEntityDataPacket, MultiBlockChangePacket, SpawnPositionPacket,
    UnloadChunkPacket, UpdateHealthPacket,
};
use crate::player_position_and_look::PlayerPositionAndLookPacket;
use crate::status::{PongPacket, StatusResponsePacket};
use lodestone_common::{LodestoneError, ProtocolState, ProtocolVersion, Result};
use std::collections::HashMap;
use tracing::trace;

/// Every clientbound packet the client understands.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientboundPacket {
    StatusResponse(StatusResponsePacket),
    Pong(PongPacket),
    LoginDisconnect(LoginDisconnectPacket),
    EncryptionRequest(EncryptionRequestPacket),
    LoginSuccess(LoginSuccessPacket),
    SetCompression(SetCompressionPacket),
    BlockEntityData(BlockEntityDataPacket),
    BlockChange(BlockChangePacket),
    ChatMessage(ChatMessagePacket),
    Disconnect(DisconnectPacket),
    UnloadChunk(UnloadChunkPacket),
    KeepAlive(KeepAlivePacket),
    ChunkData(Box<ChunkDataPacket>),
    JoinGame(Box<JoinGamePacket>),
    Respawn(Box<RespawnPacket>),
    PlayerPositionAndLook(PlayerPositionAndLookPacket),
    MultiBlockChange(MultiBlockChangePacket),
    SpawnPosition(SpawnPositionPacket),
    UpdateHealth(UpdateHealthPacket),
}

impl ClientboundPacket {
    /// Dispatch key. Uses the latest protocol's id for every version.
    pub fn key(&self) -> PacketKey {
        match self {
            ClientboundPacket::StatusResponse(_) => StatusResponsePacket::key(),
            ClientboundPacket::Pong(_) => PongPacket::key(),
            ClientboundPacket::LoginDisconnect(_) => LoginDisconnectPacket::key(),
            ClientboundPacket::EncryptionRequest(_) => EncryptionRequestPacket::key(),
            ClientboundPacket::LoginSuccess(_) => LoginSuccessPacket::key(),
            ClientboundPacket::SetCompression(_) => SetCompressionPacket::key(),
            ClientboundPacket::BlockEntityData(_) => BlockEntityDataPacket::key(),
            ClientboundPacket::BlockChange(_) => BlockChangePacket::key(),
            ClientboundPacket::ChatMessage(_) => ChatMessagePacket::key(),
            ClientboundPacket::Disconnect(_) => DisconnectPacket::key(),
            ClientboundPacket::UnloadChunk(_) => UnloadChunkPacket::key(),
            ClientboundPacket::KeepAlive(_) => KeepAlivePacket::key(),
            ClientboundPacket::ChunkData(_) => ChunkDataPacket::key(),
            ClientboundPacket::JoinGame(_) => JoinGamePacket::key(),
            ClientboundPacket::Respawn(_) => RespawnPacket::key(),
            ClientboundPacket::PlayerPositionAndLook(_) => PlayerPositionAndLookPacket::key(),
            ClientboundPacket::MultiBlockChange(_) => MultiBlockChangePacket::key(),
            ClientboundPacket::SpawnPosition(_) => SpawnPositionPacket::key(),
            ClientboundPacket::UpdateHealth(_) => UpdateHealthPacket::key(),
        }
    }
}

macro_rules! impl_from_packet {
    ($($packet:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$packet> for ClientboundPacket {
                fn from(packet: $packet) -> Self {
                    ClientboundPacket::$variant(packet.into())
                }
            }
        )*
    };
}

impl_from_packet! {
    StatusResponsePacket => StatusResponse,
    PongPacket => Pong,
    LoginDisconnectPacket => LoginDisconnect,
    EncryptionRequestPacket => EncryptionRequest,
    LoginSuccessPacket => LoginSuccess,
    SetCompressionPacket => SetCompression,
    BlockEntityDataPacket => BlockEntityData,
    BlockChangePacket => BlockChange,
    ChatMessagePacket => ChatMessage,
    DisconnectPacket => Disconnect,
    UnloadChunkPacket => UnloadChunk,
    KeepAlivePacket => KeepAlive,
    ChunkDataPacket => ChunkData,
    JoinGamePacket => JoinGame,
    RespawnPacket => Respawn,
    PlayerPositionAndLookPacket => PlayerPositionAndLook,
    MultiBlockChangePacket => MultiBlockChange,
    SpawnPositionPacket => SpawnPosition,
    UpdateHealthPacket => UpdateHealth,
}

type DecodeFn = fn(&mut PacketBuffer, &DecodeContext) -> Result<ClientboundPacket>;

fn decode_as<P>(buffer: &mut PacketBuffer, ctx: &DecodeContext) -> Result<ClientboundPacket>
where
    P: Clientbound + Into<ClientboundPacket>,
{
    P::read_from_buffer(buffer, ctx).map(Into::into)
}

/// Reads the leading packet id of a payload.
pub fn peek_packet_id(payload: &[u8]) -> Result<i32> {
    PacketBuffer::from_bytes(payload)
        .read_varint()
        .map_err(|e| LodestoneError::decode(format!("missing packet id: {e}")))
}

/// Table of clientbound decoders keyed by `(state, id)` as they appear on the wire for one
/// protocol version.
pub struct PacketFactory {
    version: ProtocolVersion,
    decoders: HashMap<PacketKey, DecodeFn>,
}

impl PacketFactory {
    /// A factory for the latest protocol knowing every packet in [`ClientboundPacket`].
    pub fn new() -> Self {
        Self::for_version(ProtocolVersion::LATEST)
    }

    /// A factory knowing every packet in [`ClientboundPacket`], routed by `version`'s ids.
    pub fn for_version(version: ProtocolVersion) -> Self {
        let mut factory = Self::empty(version);
        factory.register::<StatusResponsePacket>();
        factory.register::<PongPacket>();
        factory.register::<LoginDisconnectPacket>();
        factory.register::<EncryptionRequestPacket>();
        factory.register::<LoginSuccessPacket>();
        factory.register::<SetCompressionPacket>();
        factory.register::<BlockEntityDataPacket>();
        factory.register::<BlockChangePacket>();
        factory.register::<ChatMessagePacket>();
        factory.register::<DisconnectPacket>();
        factory.register::<UnloadChunkPacket>();
        factory.register::<KeepAlivePacket>();
        factory.register::<ChunkDataPacket>();
        factory.register::<JoinGamePacket>();
        factory.register::<RespawnPacket>();
        factory.register::<PlayerPositionAndLookPacket>();
        factory.register::<MultiBlockChangePacket>();
        factory.register::<SpawnPositionPacket>();
        factory.register::<UpdateHealthPacket>();
        factory
    }

    pub fn empty(version: ProtocolVersion) -> Self {
        Self {
            version,
            decoders: HashMap::new(),
        }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Registers `P` under its wire id for this factory's version, replacing any previous
    /// decoder for that key.
    pub fn register<P>(&mut self)
    where
        P: Clientbound + Into<ClientboundPacket>,
    {
        let key = PacketKey::new(P::state(), P::wire_id(self.version));
        self.decoders.insert(key, decode_as::<P> as DecodeFn);
    }

    pub fn is_registered(&self, key: PacketKey) -> bool {
        self.decoders.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Decodes one `id | body` payload.
    ///
    /// Unregistered ids return `Ok(None)`. A registered decoder that runs out of bytes or meets
    /// a malformed field fails with `Decode`. Trailing bytes are ignored.
    pub fn decode(
        &self,
        state: ProtocolState,
        payload: &[u8],
        ctx: &DecodeContext,
    ) -> Result<Option<ClientboundPacket>> {
        let mut buffer = PacketBuffer::from_bytes(payload);
        let id = buffer
            .read_varint()
            .map_err(|e| LodestoneError::decode(format!("missing packet id: {e}")))?;
        let key = PacketKey::new(state, id);

        let Some(decoder) = self.decoders.get(&key) else {
            trace!(%state, id, "no decoder registered");
            return Ok(None);
        };

        let packet = decoder(&mut buffer, ctx).map_err(|e| match e {
            LodestoneError::Underrun { .. } => {
                LodestoneError::decode(format!("{state} packet {id:#04x} truncated: {e}"))
            }
            other => other,
        })?;

        if !buffer.is_finished() {
            trace!(%state, id, trailing = buffer.remaining(), "ignoring trailing bytes");
        }
        Ok(Some(packet))
    }
}

impl Default for PacketFactory {
    fn default() -> Self {
        Self::new()
    }
}
