//! # Realm State Machine
//!
//! Per-connection state for the binary realm tier:
//!
//! ```text
//! AwaitingToken --ClientHelloRealm (token ok)--> Validated --ClientEnterWorld--> InWorld
//! ```
//!
//! The connection starts under the build-key cipher. Accepting the game
//! token sends `ServerRealmAccepted` under that cipher and then re-keys both
//! directions from the session key the login tier derived.

use crate::handlers::WorldContext;
use nexus_accounts::{GameGrant, SessionDirectory};
use nexus_core::{AccountId, ConnectionId, Position, Result};
use nexus_crypto::KeyMaterial;
use nexus_protocol::packets::{
    ClientEnterWorld, ClientHelloRealm, ClientPing, RejectReason, ServerEnteredWorld, ServerPong,
    ServerRealmAccepted, ServerRejected,
};
use nexus_protocol::{DecodedPacket, Encodable, Opcode, OpcodeRegistry, RawPacket, RegistryError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Map a character enters on `ClientEnterWorld`
pub const START_MAP_ID: u32 = 870;

/// Spawn point on [`START_MAP_ID`]
pub const START_POSITION: Position = Position::new(-3835.0, -980.0, -6050.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealmState {
    AwaitingToken,
    Validated,
    InWorld,
}

/// What the driver must do with one inbound packet
#[derive(Debug)]
pub enum RealmAction {
    /// Nothing to send (unknown opcode)
    Ignore,
    /// Send under the current cipher
    Reply(RawPacket),
    /// Send under the current cipher, then re-key both directions
    ReplyThenRekey { reply: RawPacket, key: KeyMaterial },
    /// Hand to the world handler registry
    Dispatch { ctx: WorldContext, packet: DecodedPacket },
}

/// Options the realm compares clients against
#[derive(Debug, Clone)]
pub struct RealmSettings {
    pub client_build: u32,
    pub realm_name: String,
}

/// Realm progress of one connection
pub struct RealmSession {
    connection_id: ConnectionId,
    state: RealmState,
    settings: Arc<RealmSettings>,
    registry: Arc<OpcodeRegistry>,
    directory: Arc<SessionDirectory>,
    grant: Option<GameGrant>,
    character_id: u64,
}

impl RealmSession {
    pub fn new(
        connection_id: ConnectionId,
        settings: Arc<RealmSettings>,
        registry: Arc<OpcodeRegistry>,
        directory: Arc<SessionDirectory>,
    ) -> Self {
        Self {
            connection_id,
            state: RealmState::AwaitingToken,
            settings,
            registry,
            directory,
            grant: None,
            character_id: 0,
        }
    }

    pub fn state(&self) -> RealmState {
        self.state
    }

    /// The grant redeemed by this connection's hello
    pub fn grant(&self) -> Option<&GameGrant> {
        self.grant.as_ref()
    }

    /// Decode and process one plaintext packet
    ///
    /// Only encoding failures are errors; everything a client can get wrong
    /// is answered with `ServerRejected` or skipped.
    pub fn handle(&mut self, raw: &RawPacket) -> Result<RealmAction> {
        let packet = match self.registry.decode(raw) {
            Ok(packet) => packet,
            Err(RegistryError::Codec { opcode, source }) => {
                debug!("Connection {} sent malformed {}: {}", self.connection_id, opcode, source);
                return reject(RejectReason::Malformed);
            }
            Err(e) => {
                warn!("Connection {} skipping packet: {}", self.connection_id, e);
                return Ok(RealmAction::Ignore);
            }
        };

        match (self.state, packet.opcode) {
            (RealmState::AwaitingToken, Opcode::CLIENT_HELLO_REALM) => match packet.downcast::<ClientHelloRealm>() {
                Ok(hello) => self.hello(hello),
                Err(_) => reject(RejectReason::Unknown),
            },
            (RealmState::Validated, Opcode::CLIENT_ENTER_WORLD) => match packet.downcast::<ClientEnterWorld>() {
                Ok(enter) => self.enter_world(enter),
                Err(_) => reject(RejectReason::Unknown),
            },
            (RealmState::Validated | RealmState::InWorld, Opcode::CLIENT_PING) => {
                let time = packet.downcast_ref::<ClientPing>().map(|ping| ping.time).unwrap_or(0);
                Ok(RealmAction::Reply(ServerPong { time }.to_raw()?))
            }
            (RealmState::InWorld, opcode)
                if opcode != Opcode::CLIENT_HELLO_REALM && opcode != Opcode::CLIENT_ENTER_WORLD =>
            {
                let ctx = self.world_context();
                Ok(RealmAction::Dispatch { ctx, packet })
            }
            (state, opcode) => {
                warn!("Connection {} sent {} in state {:?}", self.connection_id, opcode, state);
                reject(RejectReason::WrongState)
            }
        }
    }

    fn hello(&mut self, hello: ClientHelloRealm) -> Result<RealmAction> {
        if hello.build != self.settings.client_build {
            info!(
                "Connection {} has build {}, expected {}",
                self.connection_id, hello.build, self.settings.client_build
            );
            return reject(RejectReason::BuildMismatch);
        }

        // Tokens are single use: a mismatched email still burns it
        let grant = match self.directory.redeem(&hello.game_token().raw_form()) {
            Some(grant) if grant.email.eq_ignore_ascii_case(hello.email.trim()) => grant,
            Some(grant) => {
                warn!(
                    "Connection {} presented the token of account {} as {}",
                    self.connection_id,
                    grant.account_id.get(),
                    hello.email
                );
                return reject(RejectReason::InvalidToken);
            }
            None => {
                info!("Connection {} presented an unknown or expired token", self.connection_id);
                return reject(RejectReason::InvalidToken);
            }
        };

        let reply = ServerRealmAccepted {
            account_id: grant.account_id.get(),
            realm_name: self.settings.realm_name.clone(),
            gm: grant.is_gm(),
            region: 0,
        }
        .to_raw()?;
        let key = KeyMaterial::Session(grant.cipher_key);

        info!("Connection {} joined realm as account {}", self.connection_id, grant.account_id.get());
        self.grant = Some(grant);
        self.state = RealmState::Validated;
        Ok(RealmAction::ReplyThenRekey { reply, key })
    }

    fn enter_world(&mut self, enter: ClientEnterWorld) -> Result<RealmAction> {
        let reply = ServerEnteredWorld {
            character_id: enter.character_id,
            map_id: START_MAP_ID,
            position: START_POSITION,
        }
        .to_raw()?;

        debug!("Connection {} entered world with character {}", self.connection_id, enter.character_id);
        self.character_id = enter.character_id;
        self.state = RealmState::InWorld;
        Ok(RealmAction::Reply(reply))
    }

    fn world_context(&self) -> WorldContext {
        WorldContext {
            connection_id: self.connection_id,
            account_id: self.grant.as_ref().map(|grant| grant.account_id).unwrap_or(AccountId::new(0)),
            character_id: self.character_id,
        }
    }
}

fn reject(reason: RejectReason) -> Result<RealmAction> {
    Ok(RealmAction::Reply(ServerRejected { reason }.to_raw()?))
}
