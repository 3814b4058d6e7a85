use lodestone_common::{LodestoneError, ProtocolState, ProtocolVersion, Result};
use lodestone_protocol::{FrameOutcome, Serverbound, Session};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// A [`Session`] bound to a byte stream.
pub struct Connection<S> {
    stream: S,
    session: Session,
    read_buffer: Vec<u8>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, version: ProtocolVersion, read_buffer_size: usize) -> Self {
        Self {
            stream,
            session: Session::new(version),
            read_buffer: vec![0; read_buffer_size.max(1)],
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn state(&self) -> ProtocolState {
        self.session.state()
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Encodes and writes one packet with the session's current transforms.
    pub async fn send<P: Serverbound>(&mut self, packet: &P) -> Result<()> {
        let bytes = self.session.encode(packet)?;
        trace!(
            id = P::wire_id(self.session.version()),
            len = bytes.len(),
            "sending packet"
        );
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Reads whatever the stream has and hands it to the session.
    ///
    /// Zero bytes means the peer closed the connection.
    pub async fn receive(&mut self) -> Result<usize> {
        let n = self.stream.read(&mut self.read_buffer).await?;
        if n == 0 {
            return Err(LodestoneError::ConnectionClosed);
        }
        self.session.receive(&self.read_buffer[..n]);
        Ok(n)
    }

    /// Next frame outcome, reading from the stream until a whole frame is buffered.
    pub async fn poll(&mut self) -> Result<FrameOutcome> {
        loop {
            if let Some(outcome) = self.session.poll_frame()? {
                return Ok(outcome);
            }
            self.receive().await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use lodestone_protocol::keep_alive::KeepAliveResponsePacket;
    use lodestone_protocol::ClientboundPacket;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_poll_across_reads() {
        let mock = Builder::new()
            .read(&[0x09, 0x1F, 0, 0])
            .read(&[0, 0, 0, 0, 0, 0x2A])
            .build();
        let mut connection = Connection::new(mock, ProtocolVersion::V1_16_5, 64);
        connection.session_mut().transition(ProtocolState::Login).unwrap();
        connection.session_mut().transition(ProtocolState::Play).unwrap();

        let outcome = connection.poll().await.unwrap();
        assert_matches!(
            outcome,
            FrameOutcome::Packet(ClientboundPacket::KeepAlive(p)) if p.keep_alive_id == 42
        );
        assert_matches!(connection.poll().await, Err(LodestoneError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_send_writes_frame() {
        let mock = Builder::new()
            .write(&[0x09, 0x10, 0, 0, 0, 0, 0, 0, 0, 0x07])
            .build();
        let mut connection = Connection::new(mock, ProtocolVersion::V1_16_5, 64);
        connection.session_mut().transition(ProtocolState::Login).unwrap();
        connection.session_mut().transition(ProtocolState::Play).unwrap();
        connection
            .send(&KeepAliveResponsePacket::new(7))
            .await
            .unwrap();
    }
}
