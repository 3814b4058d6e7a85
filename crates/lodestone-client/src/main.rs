use lodestone_client::config::DEFAULT_CONFIG_FILE;
use lodestone_client::{Client, ClientConfig};
use lodestone_common::LodestoneError;
use lodestone_logger::LogSeverity;
use lodestone_protocol::chat::{ChatMessagePacket, DisconnectPacket};
use lodestone_protocol::ClientboundPacket;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match ClientConfig::load(DEFAULT_CONFIG_FILE) {
        Ok(config) => config,
        Err(e) => {
            lodestone_logger::init(LogSeverity::default());
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    lodestone_logger::init(config.logging.severity);
    info!("Lodestone init");

    if let Err(e) = config.validate_strict() {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    let mut client = match Client::connect(&config).await {
        Ok(client) => client,
        Err(e) => {
            error!("failed to connect: {e}");
            return ExitCode::FAILURE;
        }
    };

    let chat = client.dispatcher().subscribe(|packet| match packet {
        ClientboundPacket::ChatMessage(chat) => info!(target: "chat", "{}", chat.text()),
        ClientboundPacket::Disconnect(disconnect) => {
            info!(target: "chat", "kicked: {}", disconnect.text())
        }
        _ => {}
    });
    chat.listen_to::<ChatMessagePacket>()
        .listen_to::<DisconnectPacket>();

    if let Err(e) = client.login().await {
        error!("login failed: {e}");
        return ExitCode::FAILURE;
    }

    match client.run().await {
        Ok(()) | Err(LodestoneError::ConnectionClosed) => {
            info!(stats = ?client.session().stats(), "connection closed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("connection failed: {e}");
            ExitCode::FAILURE
        }
    }
}
