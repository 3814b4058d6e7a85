use crate::compression::Compression;
use crate::encryption::Encryption;
use crate::factory::{peek_packet_id, ClientboundPacket, PacketFactory};
use crate::packet::{DecodeContext, PacketBuffer, Serverbound};
use bytes::Bytes;
use lodestone_common::{LodestoneError, ProtocolState, ProtocolVersion, Result};
use tracing::{debug, info, trace, warn};

/// Largest frame length a three byte VarInt can announce.
pub const MAX_FRAME_LEN: usize = 2_097_151;

/// What became of one complete frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Packet(ClientboundPacket),
    /// No decoder is registered for this wire id; the frame was skipped.
    Unknown { state: ProtocolState, id: i32 },
    /// The frame failed to decompress or decode and was dropped.
    DecodeFailure {
        state: ProtocolState,
        reason: String,
    },
}

impl FrameOutcome {
    /// For callers that cannot continue without the packet: anything else becomes an error.
    pub fn into_packet(self) -> Result<ClientboundPacket> {
        match self {
            FrameOutcome::Packet(packet) => Ok(packet),
            FrameOutcome::Unknown { state, id } => {
                Err(LodestoneError::UnknownPacket { state, id })
            }
            FrameOutcome::DecodeFailure { reason, .. } => Err(LodestoneError::Decode(reason)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub bytes_received: u64,
    pub frames: u64,
    pub packets: u64,
    pub unknown: u64,
    pub decode_failures: u64,
}

/// Protocol state machine for one connection.
///
/// Owns the residual input buffer and both stream transforms. Bytes go in through
/// [`Session::receive`], complete frames come out of [`Session::poll_frame`]. Nothing here
/// touches a socket.
pub struct Session {
    state: ProtocolState,
    ctx: DecodeContext,
    compression: Compression,
    encryption: Encryption,
    residual: PacketBuffer,
    factory: PacketFactory,
    stats: FrameStats,
}

impl Session {
    pub fn new(version: ProtocolVersion) -> Self {
        Self::with_factory(version, PacketFactory::for_version(version))
    }

    pub fn with_factory(version: ProtocolVersion, factory: PacketFactory) -> Self {
        if factory.version() != version {
            warn!(
                %version,
                factory_version = %factory.version(),
                "packet factory routes ids of another version"
            );
        }
        Self {
            state: ProtocolState::Handshake,
            ctx: DecodeContext::new(version),
            compression: Compression::None,
            encryption: Encryption::None,
            residual: PacketBuffer::new(),
            factory,
            stats: FrameStats::default(),
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn version(&self) -> ProtocolVersion {
        self.ctx.version
    }

    pub fn context(&self) -> &DecodeContext {
        &self.ctx
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_enabled()
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Bytes received but not yet consumed as frames.
    pub fn buffered(&self) -> usize {
        self.residual.remaining()
    }

    pub fn transition(&mut self, next: ProtocolState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(LodestoneError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        info!(from = %self.state, to = %next, "protocol state changed");
        self.state = next;
        Ok(())
    }

    pub fn set_compression(&mut self, compression: Compression) {
        debug!(?compression, "compression changed");
        self.compression = compression;
    }

    /// Turns on AES/CFB-8 for every byte received or encoded from now on.
    pub fn enable_encryption(&mut self, shared_secret: &[u8]) -> Result<()> {
        if self.encryption.is_enabled() {
            return Err(LodestoneError::Security("encryption is already enabled".into()));
        }
        self.encryption = Encryption::aes(shared_secret)?;
        info!("encryption enabled");
        Ok(())
    }

    /// Decrypts freshly received bytes and queues them for framing.
    pub fn receive(&mut self, bytes: &[u8]) {
        self.stats.bytes_received += bytes.len() as u64;
        if self.encryption.is_enabled() {
            let mut decrypted = bytes.to_vec();
            self.encryption.decrypt(&mut decrypted);
            self.residual.append(&decrypted);
        } else {
            self.residual.append(bytes);
        }
    }

    /// Extracts and decodes the next complete frame, or `None` if more bytes are needed.
    ///
    /// Frame-local problems come back as [`FrameOutcome`] values. An `Err` means the stream
    /// itself is broken and the session cannot continue.
    pub fn poll_frame(&mut self) -> Result<Option<FrameOutcome>> {
        let start = self.residual.position();

        let length = match self.residual.read_varint() {
            Ok(length) => length as u32 as usize,
            Err(e) if e.is_underrun() => {
                self.residual.rewind_to(start);
                self.residual.compact();
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if length > MAX_FRAME_LEN {
            return Err(LodestoneError::OversizedFrame(length));
        }

        if self.residual.remaining() < length {
            trace!(length, buffered = self.residual.remaining(), "waiting for frame");
            self.residual.rewind_to(start);
            self.residual.compact();
            return Ok(None);
        }

        let frame = self.residual.take(length)?.to_vec();
        if self.residual.is_finished() {
            self.residual.reset();
        }

        self.stats.frames += 1;
        self.process_frame(&frame).map(Some)
    }

    /// Polls until no complete frame is left.
    pub fn drain(&mut self) -> Result<Vec<FrameOutcome>> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.poll_frame()? {
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn process_frame(&mut self, frame: &[u8]) -> Result<FrameOutcome> {
        let payload = match self.compression.unframe(frame) {
            Ok(payload) => payload,
            Err(e) => return Ok(self.failure(e)),
        };

        match self.factory.decode(self.state, &payload, &self.ctx) {
            Ok(Some(packet)) => {
                self.react(&packet)?;
                self.stats.packets += 1;
                Ok(FrameOutcome::Packet(packet))
            }
            Ok(None) => match peek_packet_id(&payload) {
                Ok(id) => {
                    self.stats.unknown += 1;
                    trace!(state = %self.state, id, len = payload.len(), "skipped unknown packet");
                    Ok(FrameOutcome::Unknown {
                        state: self.state,
                        id,
                    })
                }
                Err(e) => Ok(self.failure(e)),
            },
            Err(e) => Ok(self.failure(e)),
        }
    }

    fn failure(&mut self, error: LodestoneError) -> FrameOutcome {
        self.stats.decode_failures += 1;
        debug!(state = %self.state, %error, "dropped frame");
        FrameOutcome::DecodeFailure {
            state: self.state,
            reason: error.to_string(),
        }
    }

    /// Protocol control packets change how the following frames are read.
    fn react(&mut self, packet: &ClientboundPacket) -> Result<()> {
        match packet {
            ClientboundPacket::LoginSuccess(success) => {
                info!(username = %success.username, uuid = %success.uuid, "login succeeded");
                self.transition(ProtocolState::Play)?;
            }
            ClientboundPacket::SetCompression(set) => {
                self.set_compression(Compression::for_threshold(set.threshold));
            }
            ClientboundPacket::JoinGame(join) => {
                self.ctx.skylight = join.has_skylight();
            }
            ClientboundPacket::Respawn(respawn) => {
                self.ctx.skylight = respawn.has_skylight();
            }
            _ => {}
        }
        Ok(())
    }

    /// Builds the wire bytes for a serverbound packet with the current transforms.
    pub fn encode<P: Serverbound>(&mut self, packet: &P) -> Result<Bytes> {
        let id = P::wire_id(self.ctx.version);
        if P::state() != self.state {
            warn!(
                packet_state = %P::state(),
                state = %self.state,
                id,
                "encoding packet outside its state"
            );
        }

        let mut payload = PacketBuffer::new();
        payload.write_varint(id);
        packet.write_to_buffer(&mut payload);

        let mut frame = self.compression.frame(payload.as_slice())?;
        self.encryption.encrypt(&mut frame);
        Ok(Bytes::from(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::HandshakePacket;
    use crate::keep_alive::KeepAliveResponsePacket;
    use crate::login::LoginStartPacket;
    use assert_matches::assert_matches;

    fn frame(payload: &[u8]) -> Vec<u8> {
        Compression::None.frame(payload).unwrap()
    }

    fn login_session() -> Session {
        let mut session = Session::new(ProtocolVersion::V1_16_5);
        session.transition(ProtocolState::Login).unwrap();
        session
    }

    #[test]
    fn test_transitions() {
        let mut session = Session::new(ProtocolVersion::V1_16_5);
        assert_eq!(session.state(), ProtocolState::Handshake);
        assert_matches!(
            session.transition(ProtocolState::Play),
            Err(LodestoneError::InvalidTransition { .. })
        );
        session.transition(ProtocolState::Login).unwrap();
        session.transition(ProtocolState::Play).unwrap();
        assert!(session.transition(ProtocolState::Login).is_err());
    }

    #[test]
    fn test_partial_frame_waits() {
        let mut session = login_session();
        let bytes = frame(&[0x03, 0x80, 0x02]);

        session.receive(&bytes[..2]);
        assert_matches!(session.poll_frame(), Ok(None));
        assert_eq!(session.buffered(), 2);

        session.receive(&bytes[2..]);
        let outcome = session.poll_frame().unwrap().unwrap();
        assert_matches!(outcome, FrameOutcome::Packet(ClientboundPacket::SetCompression(ref p)) if p.threshold == 256);
        assert_eq!(session.compression(), Compression::Zlib { threshold: 256 });
        assert_eq!(session.buffered(), 0);
    }

    #[test]
    fn test_truncated_length_prefix() {
        let mut session = login_session();
        session.receive(&[0x80]);
        assert_matches!(session.poll_frame(), Ok(None));
        session.receive(&[0x01]);
        // 128 bytes announced, none present yet
        assert_matches!(session.poll_frame(), Ok(None));
        assert_eq!(session.buffered(), 2);
    }

    #[test]
    fn test_oversized_frame_is_fatal() {
        let mut session = login_session();
        let mut prefix = PacketBuffer::new();
        prefix.write_varint(MAX_FRAME_LEN as i32 + 1);
        session.receive(prefix.as_slice());
        assert_matches!(session.poll_frame(), Err(LodestoneError::OversizedFrame(_)));

        let mut session = login_session();
        session.receive(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert_matches!(session.poll_frame(), Err(LodestoneError::OversizedFrame(_)));
    }

    #[test]
    fn test_unknown_and_failed_frames_continue() {
        let mut session = login_session();
        session.receive(&frame(&[0x7E, 1, 2]));
        session.receive(&frame(&[0x01, 0x05]));
        session.receive(&frame(&[0x00, 0x02, b'{', b'}']));

        let outcomes = session.drain().unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes[0],
            FrameOutcome::Unknown {
                state: ProtocolState::Login,
                id: 0x7E
            }
        );
        assert_matches!(outcomes[1], FrameOutcome::DecodeFailure { .. });
        assert_matches!(
            &outcomes[2],
            FrameOutcome::Packet(ClientboundPacket::LoginDisconnect(p)) if p.reason == "{}"
        );

        let stats = session.stats();
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.packets, 1);
        assert_eq!(stats.unknown, 1);
        assert_eq!(stats.decode_failures, 1);
    }

    #[test]
    fn test_login_success_enters_play() {
        let mut session = login_session();
        let mut payload = PacketBuffer::new();
        payload.write_varint(0x02);
        payload.write_uuid(uuid::Uuid::nil());
        payload.write_string("Steve");
        // Keep Alive right behind it must already decode in the play state
        let mut keep_alive = PacketBuffer::new();
        keep_alive.write_varint(0x1F);
        keep_alive.write_i64(42);

        session.receive(&frame(payload.as_slice()));
        session.receive(&frame(keep_alive.as_slice()));
        let outcomes = session.drain().unwrap();

        assert_eq!(session.state(), ProtocolState::Play);
        assert_matches!(
            &outcomes[1],
            FrameOutcome::Packet(ClientboundPacket::KeepAlive(p)) if p.keep_alive_id == 42
        );
    }

    #[test]
    fn test_encode_frames_and_compresses() {
        let mut session = Session::new(ProtocolVersion::V1_16_5);
        let handshake = HandshakePacket::new(
            ProtocolVersion::V1_16_5,
            "localhost",
            25565,
            ProtocolState::Login,
        );
        let bytes = session.encode(&handshake).unwrap();
        assert_eq!(bytes[0] as usize, bytes.len() - 1);
        assert_eq!(bytes[1], 0x00);

        session.transition(ProtocolState::Login).unwrap();
        session.set_compression(Compression::Zlib { threshold: 256 });
        let bytes = session.encode(&LoginStartPacket::new("Steve")).unwrap();
        assert_eq!(&bytes[..], &[0x08, 0x00, 0x00, 0x05, b'S', b't', b'e', b'v', b'e']);
    }

    #[test]
    fn test_encryption_applies_to_later_bytes() {
        let secret = [7u8; 16];
        let mut session = login_session();
        session.transition(ProtocolState::Play).unwrap();
        session.enable_encryption(&secret).unwrap();
        assert!(session.enable_encryption(&secret).is_err());

        let mut server = Encryption::aes(&secret).unwrap();
        let mut payload = PacketBuffer::new();
        payload.write_varint(0x1F);
        payload.write_i64(-5);
        let mut wire = frame(payload.as_slice());
        server.encrypt(&mut wire);

        session.receive(&wire[..4]);
        session.receive(&wire[4..]);
        assert_matches!(
            session.poll_frame(),
            Ok(Some(FrameOutcome::Packet(ClientboundPacket::KeepAlive(p)))) if p.keep_alive_id == -5
        );

        let mut sent = session
            .encode(&KeepAliveResponsePacket::new(-5))
            .unwrap()
            .to_vec();
        Encryption::aes(&secret).unwrap().decrypt(&mut sent);
        assert_eq!(sent[1], 0x10);
    }

    fn play_session(version: ProtocolVersion) -> Session {
        let mut session = Session::new(version);
        session.transition(ProtocolState::Login).unwrap();
        session.transition(ProtocolState::Play).unwrap();
        session
    }

    #[test]
    fn test_play_ids_follow_session_version() {
        let mut unload = PacketBuffer::new();
        unload.write_varint(0x1F);
        unload.write_i32(3);
        unload.write_i32(-4);

        let mut session = play_session(ProtocolVersion::V1_13_2);
        session.receive(&frame(unload.as_slice()));
        assert_matches!(
            session.poll_frame(),
            Ok(Some(FrameOutcome::Packet(ClientboundPacket::UnloadChunk(p))))
                if p.chunk_x == 3 && p.chunk_z == -4
        );

        let mut keep_alive = PacketBuffer::new();
        keep_alive.write_varint(0x21);
        keep_alive.write_i64(42);

        let mut session = play_session(ProtocolVersion::V1_15_2);
        session.receive(&frame(keep_alive.as_slice()));
        assert_matches!(
            session.poll_frame(),
            Ok(Some(FrameOutcome::Packet(ClientboundPacket::KeepAlive(p)))) if p.keep_alive_id == 42
        );
    }

    #[test]
    fn test_encode_uses_version_ids() {
        let expected = [
            (ProtocolVersion::V1_12_2, 0x0B),
            (ProtocolVersion::V1_13_2, 0x0E),
            (ProtocolVersion::V1_15_2, 0x0F),
            (ProtocolVersion::V1_16_5, 0x10),
        ];
        for (version, id) in expected {
            let mut session = play_session(version);
            let bytes = session.encode(&KeepAliveResponsePacket::new(1)).unwrap();
            assert_eq!(bytes[1], id, "keep alive id for {version}");
        }
    }

    #[test]
    fn test_respawn_updates_skylight() {
        let mut session = play_session(ProtocolVersion::V1_12_2);
        assert!(session.context().skylight);

        let mut respawn = PacketBuffer::new();
        respawn.write_varint(0x35);
        respawn.write_i32(-1);
        respawn.write_u8(2);
        respawn.write_u8(0);
        respawn.write_string("default");
        session.receive(&frame(respawn.as_slice()));
        assert_matches!(
            session.poll_frame(),
            Ok(Some(FrameOutcome::Packet(ClientboundPacket::Respawn(_))))
        );
        assert!(!session.context().skylight);
    }

    #[test]
    fn test_into_packet() {
        let unknown = FrameOutcome::Unknown {
            state: ProtocolState::Play,
            id: 0x7E,
        };
        assert_matches!(
            unknown.into_packet(),
            Err(LodestoneError::UnknownPacket { state: ProtocolState::Play, id: 0x7E })
        );

        let failure = FrameOutcome::DecodeFailure {
            state: ProtocolState::Play,
            reason: "bad".into(),
        };
        assert_matches!(failure.into_packet(), Err(LodestoneError::Decode(r)) if r == "bad");
    }
}
