pub mod auth;
pub mod chat;
pub mod chunk_data;
pub mod compression;
pub mod dispatch;
pub mod encryption;
pub mod factory;
pub mod handshake;
pub mod join_game;
pub mod keep_alive;
pub mod login;
pub mod packet;
pub mod play;
pub mod player_position_and_look;
pub mod session;
pub mod status;

// Re-export commonly used items
pub use auth::{Authenticator, OfflineAuthenticator};
pub use chunk_data::{ChunkColumn, ChunkColumnMeta, ChunkSection};
pub use compression::Compression;
pub use dispatch::{Dispatcher, Subscription};
pub use encryption::Encryption;
pub use factory::{ClientboundPacket, PacketFactory};
pub use packet::{Clientbound, DecodeContext, Packet, PacketBuffer, PacketKey, Serverbound};
pub use session::{FrameOutcome, FrameStats, Session};
