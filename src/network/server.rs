//! WebSocket Relay Server
//!
//! Async WebSocket server for two-player rooms.
//! Parses client frames, runs them through the [`Coordinator`] and fans the
//! resulting messages out to the addressed connections.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock, broadcast};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::network::protocol::{ClientMessage, ServerMessage, ErrorCode};
use crate::network::session::{ConnectionId, Coordinator, Outbound};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 3000;

/// Per-connection outbound queue depth.
const OUTBOUND_QUEUE: usize = 64;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_connections: 1000,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    ///
    /// `BIND_ADDR` sets the interface, `PORT` the port and
    /// `MAX_CONNECTIONS` the connection cap. Unparseable values fall back
    /// to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(ip) = lookup("BIND_ADDR") {
            match ip.parse() {
                Ok(ip) => config.bind_addr.set_ip(ip),
                Err(_) => warn!("Ignoring invalid BIND_ADDR {:?}", ip),
            }
        }
        if let Some(port) = lookup("PORT") {
            match port.parse() {
                Ok(port) => config.bind_addr.set_port(port),
                Err(_) => warn!("Ignoring invalid PORT {:?}", port),
            }
        }
        if let Some(max) = lookup("MAX_CONNECTIONS") {
            match max.parse() {
                Ok(max) => config.max_connections = max,
                Err(_) => warn!("Ignoring invalid MAX_CONNECTIONS {:?}", max),
            }
        }

        config
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,
}

type Clients = Arc<RwLock<BTreeMap<ConnectionId, mpsc::Sender<ServerMessage>>>>;

/// The relay server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Room table. Every room mutation goes through this one lock.
    coordinator: Arc<RwLock<Coordinator>>,
    /// Outbound queues of connected clients.
    clients: Clients,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            coordinator: Arc::new(RwLock::new(Coordinator::new())),
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind the configured address and run until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Relay server v{} listening on {}", self.config.version, listener.local_addr()?);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("{} for {}", GameServerError::ConnectionLimitReached, addr);
                                self.reject_connection(stream, addr);
                                continue;
                            }

                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Tell a client over the connection cap why it is being dropped.
    fn reject_connection(&self, stream: TcpStream, addr: SocketAddr) {
        tokio::spawn(async move {
            let mut ws = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    debug!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };
            let reply = ServerMessage::error(ErrorCode::ServerFull, "Server is full");
            if let Ok(text) = reply.to_json() {
                let _ = ws.send(Message::Text(text)).await;
            }
            let _ = ws.close(None).await;
        });
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let coordinator = self.coordinator.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let conn = ConnectionId::new();
            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_QUEUE);

            clients.write().await.insert(conn, msg_tx.clone());
            info!("Client {} connected from {}", conn, addr);

            // Writer task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", conn, e);
                                        let _ = msg_tx.send(ServerMessage::error(
                                            ErrorCode::InvalidInput,
                                            "Invalid message format",
                                        )).await;
                                        continue;
                                    }
                                };

                                // State is committed before the lock is released
                                // and anything is delivered.
                                let outbound = coordinator.write().await.handle(conn, client_msg);
                                Self::dispatch(&clients, outbound).await;
                            }
                            Some(Ok(Message::Binary(_))) => {
                                let _ = msg_tx.send(ServerMessage::error(
                                    ErrorCode::InvalidInput,
                                    "Binary frames are not supported",
                                )).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", conn);
                                break;
                            }
                            Some(Err(e)) => {
                                warn!("WebSocket error for {}: {}", conn, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup
            clients.write().await.remove(&conn);
            drop(msg_tx);

            let outbound = coordinator.write().await.disconnect(conn);
            Self::dispatch(&clients, outbound).await;

            // The writer drains what is queued, then exits once the last
            // sender is gone.
            let _ = sender_task.await;
            info!("Client {} cleaned up", conn);
        });
    }

    /// Deliver each message to its recipient's queue.
    ///
    /// Recipients that have gone away are skipped; delivery to one never
    /// blocks on another being slow to drain.
    async fn dispatch(clients: &Clients, outbound: Vec<Outbound>) {
        let deliveries: Vec<_> = {
            let clients = clients.read().await;
            outbound.into_iter()
                .filter_map(|o| clients.get(&o.to).map(|tx| (o.to, tx.clone(), o.message)))
                .collect()
        };

        for (to, tx, message) in deliveries {
            if let Err(e) = tx.try_send(message) {
                warn!("Dropping message for {}: {}", to, e);
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get resident room count.
    pub async fn room_count(&self) -> usize {
        self.coordinator.read().await.room_count()
    }
}
