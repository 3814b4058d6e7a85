use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::world::World;
use lodestone_common::{LodestoneError, ProtocolState, Result};
use lodestone_protocol::auth::answer_encryption_request;
use lodestone_protocol::chat::{plain_text, SendChatMessagePacket};
use lodestone_protocol::handshake::HandshakePacket;
use lodestone_protocol::keep_alive::KeepAliveResponsePacket;
use lodestone_protocol::login::LoginStartPacket;
use lodestone_protocol::play::{ClientStatusAction, ClientStatusPacket};
use lodestone_protocol::player_position_and_look::{
    PlayerPose, PlayerPositionAndRotationPacket, TeleportConfirmPacket,
};
use lodestone_protocol::status::{PingPacket, ServerStatus, StatusRequestPacket};
use lodestone_protocol::{
    Authenticator, ClientboundPacket, Dispatcher, FrameOutcome, OfflineAuthenticator, Session,
};
use std::io;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Opens a TCP connection to the configured server within the connect timeout.
pub async fn connect_stream(config: &ClientConfig) -> Result<TcpStream> {
    let address = (config.server.host.as_str(), config.server.port);
    let connect_timeout = config.connection.connect_timeout();

    let stream = timeout(connect_timeout, TcpStream::connect(address))
        .await
        .map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!(
                    "connecting to {}:{} took longer than {connect_timeout:?}",
                    config.server.host, config.server.port
                ),
            )
        })??;
    stream.set_nodelay(true)?;
    info!(host = %config.server.host, port = config.server.port, "connected");
    Ok(stream)
}

/// Server list ping: returns the status JSON and the ping round trip.
pub async fn query_status<S>(stream: S, config: &ClientConfig) -> Result<(ServerStatus, Duration)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut connection = Connection::new(
        stream,
        config.server.protocol_version,
        config.connection.read_buffer_size,
    );
    connection
        .send(&HandshakePacket::new(
            config.server.protocol_version,
            config.server.host.as_str(),
            config.server.port,
            ProtocolState::Status,
        ))
        .await?;
    connection.session_mut().transition(ProtocolState::Status)?;
    connection.send(&StatusRequestPacket).await?;

    // Status only has two packets, so anything undecodable is a broken server
    let status = loop {
        if let ClientboundPacket::StatusResponse(response) = connection.poll().await?.into_packet()?
        {
            break response.status()?;
        }
    };

    let sent_at = Instant::now();
    let payload = 0x4C4F_4445;
    connection.send(&PingPacket { payload }).await?;
    loop {
        if let ClientboundPacket::Pong(pong) = connection.poll().await?.into_packet()? {
            if pong.payload != payload {
                warn!(expected = payload, got = pong.payload, "pong payload mismatch");
            }
            return Ok((status, sent_at.elapsed()));
        }
    }
}

/// A logged-in player: answers the protocol's housekeeping packets, tracks the world and
/// fans every packet out through its [`Dispatcher`].
pub struct Client<S> {
    connection: Connection<S>,
    dispatcher: Dispatcher,
    world: World,
    authenticator: Box<dyn Authenticator>,
    host: String,
    port: u16,
    username: String,
    pose: PlayerPose,
    entity_id: Option<i32>,
}

impl Client<TcpStream> {
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        Ok(Self::new(connect_stream(config).await?, config))
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, config: &ClientConfig) -> Self {
        Self {
            connection: Connection::new(
                stream,
                config.server.protocol_version,
                config.connection.read_buffer_size,
            ),
            dispatcher: Dispatcher::new(),
            world: World::new(),
            authenticator: Box::new(OfflineAuthenticator),
            host: config.server.host.clone(),
            port: config.server.port,
            username: config.account.username.clone(),
            pose: PlayerPose::default(),
            entity_id: None,
        }
    }

    pub fn with_authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Box::new(authenticator);
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn session(&self) -> &Session {
        self.connection.session()
    }

    pub fn pose(&self) -> PlayerPose {
        self.pose
    }

    pub fn entity_id(&self) -> Option<i32> {
        self.entity_id
    }

    /// Sends handshake and login start. The rest of the login runs inside [`Client::run`].
    pub async fn login(&mut self) -> Result<()> {
        let version = self.connection.session().version();
        self.connection
            .send(&HandshakePacket::new(
                version,
                self.host.as_str(),
                self.port,
                ProtocolState::Login,
            ))
            .await?;
        self.connection
            .session_mut()
            .transition(ProtocolState::Login)?;
        self.connection
            .send(&LoginStartPacket::new(self.username.as_str()))
            .await?;
        info!(username = %self.username, %version, "logging in");
        Ok(())
    }

    /// Processes packets until the connection ends. A server disconnect or EOF ends with
    /// `ConnectionClosed`.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            self.step().await?;
        }
    }

    /// Reads and handles the next frame.
    pub async fn step(&mut self) -> Result<()> {
        if let FrameOutcome::Packet(packet) = self.connection.poll().await? {
            self.dispatcher.dispatch(&packet);
            self.handle(packet).await?;
        }
        Ok(())
    }

    pub async fn send_chat(&mut self, message: &str) -> Result<()> {
        self.connection
            .send(&SendChatMessagePacket::new(message))
            .await
    }

    async fn handle(&mut self, packet: ClientboundPacket) -> Result<()> {
        match packet {
            ClientboundPacket::EncryptionRequest(request) => {
                let reply = answer_encryption_request(&request, self.authenticator.as_mut())?;
                // The response itself still travels in the clear
                self.connection.send(&reply.response).await?;
                self.connection
                    .session_mut()
                    .enable_encryption(&reply.shared_secret)?;
            }
            ClientboundPacket::LoginDisconnect(disconnect) => {
                warn!(reason = %plain_text(&disconnect.reason), "disconnected during login");
                return Err(LodestoneError::ConnectionClosed);
            }
            ClientboundPacket::Disconnect(disconnect) => {
                warn!(reason = %disconnect.text(), "disconnected");
                return Err(LodestoneError::ConnectionClosed);
            }
            ClientboundPacket::LoginSuccess(success) => {
                debug!(uuid = %success.uuid, "server accepted login");
            }
            ClientboundPacket::JoinGame(join) => {
                self.entity_id = Some(join.entity_id);
                info!(
                    entity_id = join.entity_id,
                    world = %join.world_name,
                    gamemode = join.gamemode,
                    "joined game"
                );
            }
            ClientboundPacket::KeepAlive(keep_alive) => {
                self.connection
                    .send(&KeepAliveResponsePacket::new(keep_alive.keep_alive_id))
                    .await?;
            }
            ClientboundPacket::PlayerPositionAndLook(teleport) => {
                self.pose = teleport.apply(self.pose);
                self.connection
                    .send(&TeleportConfirmPacket {
                        teleport_id: teleport.teleport_id,
                    })
                    .await?;
                self.connection
                    .send(&PlayerPositionAndRotationPacket::from_pose(self.pose, false))
                    .await?;
                debug!(x = self.pose.x, y = self.pose.y, z = self.pose.z, "teleported");
            }
            ClientboundPacket::UpdateHealth(health) => {
                if health.is_dead() {
                    info!("died, respawning");
                    self.connection
                        .send(&ClientStatusPacket {
                            action: ClientStatusAction::PerformRespawn,
                        })
                        .await?;
                }
            }
            ClientboundPacket::ChunkData(chunk) => self.world.load_chunk(*chunk),
            ClientboundPacket::UnloadChunk(unload) => {
                self.world.unload_chunk(unload.chunk_x, unload.chunk_z);
            }
            ClientboundPacket::BlockChange(change) => {
                if let Err(e) = self
                    .world
                    .set_block(change.position, change.block_state as u32)
                {
                    warn!(position = %change.position, error = %e, "block change not applied");
                }
            }
            ClientboundPacket::MultiBlockChange(change) => {
                if let Err(e) = self.world.apply_multi_block_change(&change) {
                    warn!(error = %e, "multi block change not fully applied");
                }
            }
            ClientboundPacket::BlockEntityData(data) => self.world.apply_block_entity_data(data),
            ClientboundPacket::ChatMessage(chat) => {
                debug!(position = chat.position, text = %chat.text(), "chat message");
            }
            ClientboundPacket::Respawn(respawn) => {
                info!(world = %respawn.world_name, gamemode = respawn.gamemode, "respawned");
            }
            ClientboundPacket::SpawnPosition(spawn) => {
                debug!(position = %spawn.position, "spawn position");
            }
            ClientboundPacket::SetCompression(_)
            | ClientboundPacket::StatusResponse(_)
            | ClientboundPacket::Pong(_) => {}
        }
        Ok(())
    }
}
