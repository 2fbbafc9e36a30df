//! # Nexus Server - Listener Implementation
//!
//! Accepts connections on the login (STS) and realm listeners and spawns one
//! driver task per socket.
//!
//! # Architecture
//!
//! ## Components
//!
//! 1. **TCP Listeners** - one per tier
//! 2. **Connection Map** - every live connection (`DashMap` for concurrent access)
//! 3. **Shared tables** - opcode registry, world handlers, account store and
//!    session directory, built before the listeners start and shared read-only
//! 4. **ID Generator** - assigns connection IDs
//!
//! # Fault Isolation
//!
//! Each connection task catches its own panic. A failing or panicking
//! connection is logged, its slot is released, and no other connection
//! notices.
//!
//! # Example
//!
//! ```rust,no_run
//! use nexus_accounts::MemoryAccountStore;
//! use nexus_network::{HandlerRegistry, NetworkConfig, NexusServer};
//! use nexus_protocol::OpcodeRegistry;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> nexus_core::Result<()> {
//!     let server = NexusServer::bind(
//!         NetworkConfig::default(),
//!         Arc::new(MemoryAccountStore::new()),
//!         OpcodeRegistry::realm_server(),
//!         HandlerRegistry::new(),
//!     )
//!     .await?;
//!     server.run().await
//! }
//! ```

use crate::config::NetworkConfig;
use crate::connection::{RealmConnection, StsConnection};
use crate::handlers::HandlerRegistry;
use crate::realm_session::{RealmSession, RealmSettings};
use crate::sts_session::StsSession;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use nexus_accounts::{AccountStore, SessionDirectory};
use nexus_core::{ConnectionId, IdGenerator, NexusError, Result, Tier};
use nexus_protocol::OpcodeRegistry;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

/// How often expired game tokens are swept
const TOKEN_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// A live connection, as seen by the listener
#[derive(Debug, Clone, Copy)]
pub struct ConnectionInfo {
    pub tier: Tier,
    pub peer_addr: SocketAddr,
    pub connected_at: Instant,
}

/// Main server instance
///
/// # Shutdown
///
/// The accept loop runs until the shutdown future passed to
/// [`NexusServer::run_until`] completes (Ctrl-C for [`NexusServer::run`]).
/// Connection tasks already running are left to finish on their own.
pub struct NexusServer {
    config: Arc<NetworkConfig>,
    sts_listener: TcpListener,
    realm_listener: TcpListener,
    accounts: Arc<dyn AccountStore>,
    directory: Arc<SessionDirectory>,
    registry: Arc<OpcodeRegistry>,
    handlers: Arc<HandlerRegistry>,
    realm_settings: Arc<RealmSettings>,
    connections: Arc<DashMap<ConnectionId, ConnectionInfo>>,
    ids: IdGenerator,
}

impl NexusServer {
    /// Validate the configuration and bind both listeners
    ///
    /// # Errors
    /// - Configuration is invalid
    /// - A listener cannot be bound
    pub async fn bind(
        config: NetworkConfig,
        accounts: Arc<dyn AccountStore>,
        registry: OpcodeRegistry,
        handlers: HandlerRegistry,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| NexusError::Config(format!("Invalid configuration: {}", e)))?;

        let sts_listener = bind_listener(config.sts_address).await?;
        let realm_listener = bind_listener(config.realm_address).await?;

        tracing::info!("STS listening on {}", sts_listener.local_addr()?);
        tracing::info!("Realm listening on {}", realm_listener.local_addr()?);
        tracing::info!(
            "Configuration: max_connections={}, opcodes={}, world handlers={}",
            config.max_connections,
            registry.len(),
            handlers.handler_count()
        );

        let realm_settings = Arc::new(RealmSettings {
            client_build: config.client_build,
            realm_name: config.realm_name.clone(),
        });

        Ok(Self {
            config: Arc::new(config),
            sts_listener,
            realm_listener,
            accounts,
            directory: Arc::new(SessionDirectory::new()),
            registry: Arc::new(registry),
            handlers: Arc::new(handlers),
            realm_settings,
            connections: Arc::new(DashMap::new()),
            ids: IdGenerator::new(),
        })
    }

    /// Bound addresses of the STS and realm listeners
    pub fn local_addrs(&self) -> Result<(SocketAddr, SocketAddr)> {
        Ok((self.sts_listener.local_addr()?, self.realm_listener.local_addr()?))
    }

    /// Game tokens shared by both tiers
    pub fn directory(&self) -> &Arc<SessionDirectory> {
        &self.directory
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of live connections on one tier
    pub fn connection_count_on(&self, tier: Tier) -> usize {
        self.connections.iter().filter(|entry| entry.value().tier == tier).count()
    }

    /// Run until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Cannot listen for Ctrl-C: {}", e);
                futures::future::pending::<()>().await;
            }
            tracing::info!("Ctrl-C received, initiating shutdown");
        })
        .await
    }

    /// Accept connections until `shutdown` completes
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!("Server starting main loop");
        tokio::pin!(shutdown);

        let mut purge = tokio::time::interval(TOKEN_PURGE_INTERVAL);

        loop {
            tokio::select! {
                result = self.sts_listener.accept() => self.accept(Tier::Sts, result).await,
                result = self.realm_listener.accept() => self.accept(Tier::Realm, result).await,
                _ = purge.tick() => {
                    let purged = self.directory.purge_expired();
                    if purged > 0 {
                        tracing::debug!("Purged {} expired game tokens", purged);
                    }
                }
                _ = &mut shutdown => break,
            }
        }

        tracing::info!(
            "Server main loop ended with {} connections still open",
            self.connections.len()
        );
        Ok(())
    }

    async fn accept(&self, tier: Tier, result: std::io::Result<(TcpStream, SocketAddr)>) {
        let (mut socket, addr) = match result {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::error!("Error accepting {} connection: {:?}", tier.as_str(), e);
                return;
            }
        };

        if self.connections.len() >= self.config.max_connections {
            tracing::warn!(
                "Connection from {} rejected: server full ({} connections)",
                addr,
                self.connections.len()
            );
            let _ = socket.shutdown().await;
            return;
        }

        if let Err(e) = socket.set_nodelay(true) {
            tracing::debug!("Cannot disable Nagle for {}: {}", addr, e);
        }

        let id = self.ids.next_connection_id();
        self.connections.insert(
            id,
            ConnectionInfo {
                tier,
                peer_addr: addr,
                connected_at: Instant::now(),
            },
        );
        tracing::debug!("New {} connection {} from {}", tier.as_str(), id, addr);

        let task = self.connection_task(id, tier, socket);
        tokio::spawn(supervise(id, tier, task, self.connections.clone()));
    }

    fn connection_task(&self, id: ConnectionId, tier: Tier, socket: TcpStream) -> BoxFuture<'static, Result<()>> {
        let config = self.config.clone();
        match tier {
            Tier::Sts => {
                let session = StsSession::new(self.accounts.clone(), self.directory.clone());
                async move { StsConnection::new(id, socket, session, &config).run().await }.boxed()
            }
            Tier::Realm => {
                let session = RealmSession::new(
                    id,
                    self.realm_settings.clone(),
                    self.registry.clone(),
                    self.directory.clone(),
                );
                let handlers = self.handlers.clone();
                async move {
                    RealmConnection::new(id, socket, session, handlers, &config)?
                        .run()
                        .await
                }
                .boxed()
            }
        }
    }
}

/// Run one connection task, contain its panic and release its slot
pub async fn supervise<F>(id: ConnectionId, tier: Tier, task: F, connections: Arc<DashMap<ConnectionId, ConnectionInfo>>)
where
    F: Future<Output = Result<()>>,
{
    tracing::info!("Connection {} ({}) task started", id, tier.as_str());

    let result = AssertUnwindSafe(task).catch_unwind().await;
    connections.remove(&id);

    match result {
        Ok(Ok(())) => tracing::info!("Connection {} task completed", id),
        Ok(Err(e)) => tracing::warn!("Connection {} task failed: {}", id, e),
        Err(_) => tracing::error!("Connection {} task panicked", id),
    }
}

async fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr).await.map_err(|e| {
        NexusError::Io(std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            format!("Failed to bind to {}: {}", addr, e),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_accounts::MemoryAccountStore;
    use nexus_protocol::sts_body::XmlBody;
    use nexus_protocol::sts::parse_response;
    use nexus_protocol::{ParseOutcome, StsRequest};
    use tokio::io::AsyncReadExt;
    use tokio::sync::oneshot;

    fn local_config() -> NetworkConfig {
        NetworkConfig {
            sts_address: "127.0.0.1:0".parse().unwrap(),
            realm_address: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        }
    }

    async fn bind(config: NetworkConfig) -> Arc<NexusServer> {
        let store = MemoryAccountStore::new();
        store.register("player@example.com", "pw").unwrap();
        let server = NexusServer::bind(config, Arc::new(store), OpcodeRegistry::realm_server(), HandlerRegistry::new())
            .await
            .unwrap();
        Arc::new(server)
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let config = NetworkConfig {
            max_connections: 0,
            ..local_config()
        };
        let result = NexusServer::bind(
            config,
            Arc::new(MemoryAccountStore::new()),
            OpcodeRegistry::realm_server(),
            HandlerRegistry::new(),
        )
        .await;
        assert!(matches!(result, Err(NexusError::Config(_))));
    }

    #[tokio::test]
    async fn test_sts_over_tcp() {
        let server = bind(local_config()).await;
        let (sts_addr, _) = server.local_addrs().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let running = server.clone();
        let handle = tokio::spawn(async move {
            running
                .run_until(async {
                    let _ = stop_rx.await;
                })
                .await
        });

        let mut client = TcpStream::connect(sts_addr).await.unwrap();
        let body = XmlBody::request().element("LoginName", "player@example.com").finish();
        let mut bytes = StsRequest::new("POST", "/Sts/Connect", None, "").to_bytes();
        bytes.extend(StsRequest::new("POST", "/Auth/LoginStart", Some("1"), body).to_bytes());
        client.write_all(&bytes).await.unwrap();

        let mut received = Vec::new();
        let response = loop {
            let mut chunk = [0u8; 1024];
            let n = client.read(&mut chunk).await.unwrap();
            assert!(n > 0, "server closed the connection");
            received.extend_from_slice(&chunk[..n]);
            if let ParseOutcome::Complete { message, .. } = parse_response(&received, 0x10000).unwrap() {
                break message;
            }
        };
        assert!(response.is_success());
        assert_eq!(response.sequence.as_deref(), Some("1"));
        assert_eq!(server.connection_count_on(Tier::Sts), 1);

        drop(client);
        let _ = stop_tx.send(());
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let config = NetworkConfig {
            max_connections: 1,
            ..local_config()
        };
        let server = bind(config).await;
        let (sts_addr, realm_addr) = server.local_addrs().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let running = server.clone();
        let handle = tokio::spawn(async move {
            running
                .run_until(async {
                    let _ = stop_rx.await;
                })
                .await
        });

        let _first = TcpStream::connect(sts_addr).await.unwrap();
        while server.connection_count() == 0 {
            tokio::task::yield_now().await;
        }

        let mut second = TcpStream::connect(realm_addr).await.unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(second.read(&mut buf).await.unwrap(), 0);
        assert_eq!(server.connection_count(), 1);

        let _ = stop_tx.send(());
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_supervise_contains_panics() {
        let connections = Arc::new(DashMap::new());
        let id = ConnectionId::new(5);
        connections.insert(
            id,
            ConnectionInfo {
                tier: Tier::Realm,
                peer_addr: "127.0.0.1:1".parse().unwrap(),
                connected_at: Instant::now(),
            },
        );

        let task = async {
            if !connections.is_empty() {
                panic!("connection bug");
            }
            Ok::<(), NexusError>(())
        };
        supervise(id, Tier::Realm, task, connections.clone()).await;
        assert!(connections.is_empty());
    }
}
