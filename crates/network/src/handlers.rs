//! # World Packet Handlers
//!
//! Once a realm connection is in the world, decoded packets the connection
//! itself does not own are routed to handlers registered here. Game logic
//! lives behind this seam.
//!
//! # Thread Safety
//!
//! The registry is built before the listeners start and shared read-only
//! through an `Arc`; handlers can be called from many connection tasks at
//! once and must synchronise their own state.
//!
//! # Example
//!
//! ```no_run
//! use nexus_network::{HandlerRegistry, WorldContext};
//! use nexus_protocol::Opcode;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register_function(Opcode::new(0x0635), |ctx: WorldContext, packet| async move {
//!     tracing::info!("{} sent {}", ctx.connection_id, packet.name);
//!     Ok::<_, nexus_core::NexusError>(Vec::new())
//! });
//! ```

use async_trait::async_trait;
use nexus_core::{AccountId, ConnectionId, NexusError, Result};
use nexus_protocol::{DecodedPacket, Opcode, RawPacket};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Who sent a world packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldContext {
    pub connection_id: ConnectionId,
    pub account_id: AccountId,
    pub character_id: u64,
}

/// Game logic for one or more opcodes
///
/// Returned packets are encrypted, framed and sent back on the same
/// connection in order.
#[async_trait]
pub trait WorldHandler: Send + Sync {
    async fn handle(&self, ctx: WorldContext, packet: DecodedPacket) -> Result<Vec<RawPacket>>;
}

struct FunctionHandler<F>(F);

#[async_trait]
impl<F, Fut> WorldHandler for FunctionHandler<F>
where
    F: Fn(WorldContext, DecodedPacket) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<RawPacket>>> + Send + 'static,
{
    async fn handle(&self, ctx: WorldContext, packet: DecodedPacket) -> Result<Vec<RawPacket>> {
        (self.0)(ctx, packet).await
    }
}

/// Registry of world packet handlers keyed by opcode
pub struct HandlerRegistry {
    handlers: HashMap<Opcode, Arc<dyn WorldHandler>>,
}

impl HandlerRegistry {
    #[inline]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler object for an opcode, replacing any previous one
    pub fn register(&mut self, opcode: Opcode, handler: Arc<dyn WorldHandler>) {
        tracing::debug!("Registered world handler for {}", opcode);
        self.handlers.insert(opcode, handler);
    }

    /// Register a function-based handler
    pub fn register_function<F, Fut>(&mut self, opcode: Opcode, handler: F)
    where
        F: Fn(WorldContext, DecodedPacket) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<RawPacket>>> + Send + 'static,
    {
        self.register(opcode, Arc::new(FunctionHandler(handler)));
    }

    /// Dispatch a packet to its registered handler
    ///
    /// # Errors
    /// - No handler is registered for the packet's opcode
    /// - The handler itself returns an error
    pub async fn dispatch(&self, ctx: WorldContext, packet: DecodedPacket) -> Result<Vec<RawPacket>> {
        let handler = self.handlers.get(&packet.opcode).cloned().ok_or_else(|| {
            NexusError::Protocol(format!("No world handler registered for {}", packet.opcode))
        })?;

        handler.handle(ctx, packet).await
    }

    pub fn has_handler(&self, opcode: Opcode) -> bool {
        self.handlers.contains_key(&opcode)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
