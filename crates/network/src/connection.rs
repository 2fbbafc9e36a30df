//! # Connection Drivers
//!
//! One driver per accepted socket, running in its own Tokio task. A driver
//! owns its stream, its read buffer, its cipher pair and its session state
//! machine; nothing here is shared with other connections.
//!
//! The drivers are generic over `AsyncRead + AsyncWrite` so tests can run
//! them over `tokio::io::duplex` pipes.
//!
//! # Lifecycle
//!
//! ```text
//! read bytes → (decrypt) → frame → state machine → (encrypt) → write
//!                                        ↓
//!                               cipher activation / re-key
//! ```

use crate::config::NetworkConfig;
use crate::handlers::HandlerRegistry;
use crate::realm_session::{RealmAction, RealmSession, RealmState};
use crate::sts_session::{StsAction, StsSession};
use bytes::{Buf, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use nexus_core::{ConnectionId, NexusError, Result};
use nexus_crypto::{CipherPair, KeyMaterial};
use nexus_protocol::sts::{self, ParseOutcome};
use nexus_protocol::{FrameCodec, FramingError, Opcode, RawPacket, StsResponse};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Framed;
use tracing::{debug, info, trace, warn};

/// Text handshake connection
///
/// Requests are parsed from a growing buffer. Once the key exchange
/// succeeds the reply goes out in the clear and every byte after it, in
/// both directions, passes through the session cipher.
pub struct StsConnection<S> {
    id: ConnectionId,
    stream: S,
    session: StsSession,
    ciphers: CipherPair,
    buffer: BytesMut,
    read_buffer_size: usize,
    max_request_size: usize,
}

impl<S> StsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(id: ConnectionId, stream: S, session: StsSession, config: &NetworkConfig) -> Self {
        Self {
            id,
            stream,
            session,
            ciphers: CipherPair::new(),
            buffer: BytesMut::with_capacity(config.read_buffer_size),
            read_buffer_size: config.read_buffer_size,
            max_request_size: config.max_request_size,
        }
    }

    pub fn session(&self) -> &StsSession {
        &self.session
    }

    /// Run until the peer closes the stream
    ///
    /// # Errors
    /// Socket failures, malformed requests and cipher failures end the
    /// connection.
    pub async fn run(mut self) -> Result<()> {
        debug!("Connection {} starting STS loop", self.id);
        let mut chunk = vec![0u8; self.read_buffer_size];

        loop {
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                info!("Connection {} closed by client", self.id);
                return Ok(());
            }

            let data = &mut chunk[..n];
            if self.ciphers.recv.is_active() {
                self.ciphers.recv.decrypt(data)?;
            }
            self.buffer.extend_from_slice(data);

            self.process_buffered().await?;
        }
    }

    /// Handle every complete request in the buffer
    async fn process_buffered(&mut self) -> Result<()> {
        loop {
            let (request, consumed) = match sts::parse_request(&self.buffer, self.max_request_size)? {
                ParseOutcome::Complete { message, rest } => {
                    let consumed = self.buffer.len() - rest.len();
                    (message, consumed)
                }
                ParseOutcome::Incomplete(_) => return Ok(()),
            };
            self.buffer.advance(consumed);

            match self.session.handle(&request) {
                StsAction::Silent => {}
                StsAction::Respond(response) => self.send(&response).await?,
                StsAction::RespondThenEncrypt { response, key } => {
                    self.send(&response).await?;
                    self.ciphers.activate(KeyMaterial::Session(key))?;

                    // Anything already buffered arrived after the key exchange
                    if !self.buffer.is_empty() {
                        self.ciphers.recv.decrypt(&mut self.buffer)?;
                    }
                    debug!("Connection {} stream encryption active", self.id);
                }
            }
        }
    }

    async fn send(&mut self, response: &StsResponse) -> Result<()> {
        let mut bytes = response.to_bytes();
        if self.ciphers.send.is_active() {
            self.ciphers.send.encrypt(&mut bytes)?;
        }
        trace!("Connection {} sending {} bytes", self.id, bytes.len());

        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

/// Binary realm connection
///
/// Every outbound packet is encrypted and wrapped in an
/// [`Opcode::ENCRYPTED`] frame. Inbound `ENCRYPTED` frames are decrypted
/// and unwrapped; a bare frame is taken as plaintext until the token is
/// validated and ends the connection afterwards.
pub struct RealmConnection<S> {
    id: ConnectionId,
    framed: Framed<S, FrameCodec>,
    session: RealmSession,
    ciphers: CipherPair,
    handlers: Arc<HandlerRegistry>,
}

impl<S> RealmConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Create a driver with both directions keyed from the build key
    pub fn new(
        id: ConnectionId,
        stream: S,
        session: RealmSession,
        handlers: Arc<HandlerRegistry>,
        config: &NetworkConfig,
    ) -> Result<Self> {
        let mut ciphers = CipherPair::new();
        ciphers.activate(KeyMaterial::Build(config.build_key))?;

        Ok(Self {
            id,
            framed: Framed::with_capacity(stream, FrameCodec::new(config.max_frame_size), config.read_buffer_size),
            session,
            ciphers,
            handlers,
        })
    }

    pub fn session(&self) -> &RealmSession {
        &self.session
    }

    /// Run until the peer closes the stream
    pub async fn run(mut self) -> Result<()> {
        debug!("Connection {} starting realm loop", self.id);

        while let Some(frame) = self.framed.next().await {
            let packet = self.open(frame?)?;
            trace!("Connection {} received {} ({} bytes)", self.id, packet.opcode, packet.body.len());
            self.process(packet).await?;
        }

        info!("Connection {} closed by client", self.id);
        Ok(())
    }

    /// Split a frame payload and strip the encryption wrapper
    ///
    /// Bare frames are only accepted before the token is validated; after
    /// the re-key every inbound packet must arrive inside the wrapper.
    fn open(&mut self, payload: Bytes) -> Result<RawPacket> {
        let packet = RawPacket::from_payload(payload)?;
        if packet.opcode != Opcode::ENCRYPTED {
            if self.session.state() != RealmState::AwaitingToken {
                warn!("Connection {} sent unencrypted {} after re-key", self.id, packet.opcode);
                return Err(FramingError::InvalidFormat(format!("unencrypted {} after re-key", packet.opcode)).into());
            }
            return Ok(packet);
        }

        let mut inner = packet.body.to_vec();
        self.ciphers.recv.decrypt(&mut inner)?;
        Ok(RawPacket::from_payload(Bytes::from(inner))?)
    }

    async fn process(&mut self, packet: RawPacket) -> Result<()> {
        match self.session.handle(&packet)? {
            RealmAction::Ignore => {}
            RealmAction::Reply(reply) => self.send(&reply).await?,
            RealmAction::ReplyThenRekey { reply, key } => {
                self.send(&reply).await?;
                self.ciphers.activate(key)?;
                debug!("Connection {} re-keyed from session key", self.id);
            }
            RealmAction::Dispatch { ctx, packet } => {
                let name = packet.name;
                match self.handlers.dispatch(ctx, packet).await {
                    Ok(replies) => {
                        for reply in &replies {
                            self.send(reply).await?;
                        }
                    }
                    Err(e) => warn!("Connection {} world handler for {} failed: {}", self.id, name, e),
                }
            }
        }
        Ok(())
    }

    /// Encrypt, wrap and frame one packet
    pub async fn send(&mut self, packet: &RawPacket) -> Result<()> {
        let mut payload = packet.to_payload();
        self.ciphers.send.encrypt(&mut payload)?;
        let wrapped = RawPacket::new(Opcode::ENCRYPTED, payload);

        trace!("Connection {} sending {}", self.id, packet.opcode);
        self.framed
            .send(Bytes::from(wrapped.to_payload()))
            .await
            .map_err(NexusError::from)
    }
}
