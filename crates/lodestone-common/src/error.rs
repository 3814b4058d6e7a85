use crate::types::ProtocolState;
use std::io;
use thiserror::Error;

/// Errors produced anywhere in the protocol engine.
///
/// Only a subset of these ends a session, see [`LodestoneError::is_fatal`]. Frame level
/// problems (`Underrun`, `Decode`, `Compression`, `UnknownPacket`) are absorbed by the
/// session's frame loop.
#[derive(Debug, Error)]
pub enum LodestoneError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Not enough bytes buffered yet. Inside the framer this means "wait for more".
    #[error("buffer underrun: needed {needed} bytes, {remaining} remaining")]
    Underrun { needed: usize, remaining: usize },

    #[error("malformed packet data: {0}")]
    Decode(String),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("unknown packet 0x{id:02x} in state {state}")]
    UnknownPacket { state: ProtocolState, id: i32 },

    #[error("palette is full at {bits_per_block} bits per block")]
    PaletteFull { bits_per_block: u8 },

    #[error("invalid protocol state transition from {from} to {to}")]
    InvalidTransition {
        from: ProtocolState,
        to: ProtocolState,
    },

    #[error("frame of {0} bytes exceeds the protocol maximum")]
    OversizedFrame(usize),

    #[error("security failure: {0}")]
    Security(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("configuration error: {0}")]
    Config(String),
}

impl LodestoneError {
    /// Shorthand for building a [`LodestoneError::Decode`].
    pub fn decode(msg: impl Into<String>) -> Self {
        LodestoneError::Decode(msg.into())
    }

    /// Whether this error must terminate the session.
    pub fn is_fatal(&self) -> bool {
        match self {
            LodestoneError::Underrun { .. }
            | LodestoneError::Decode(_)
            | LodestoneError::Compression(_)
            | LodestoneError::UnknownPacket { .. }
            | LodestoneError::PaletteFull { .. } => false,
            LodestoneError::Io(_)
            | LodestoneError::InvalidTransition { .. }
            | LodestoneError::OversizedFrame(_)
            | LodestoneError::Security(_)
            | LodestoneError::ConnectionClosed
            | LodestoneError::Config(_) => true,
        }
    }

    pub fn is_underrun(&self) -> bool {
        matches!(self, LodestoneError::Underrun { .. })
    }
}
