//! WebSocket Game Server
//!
//! Async WebSocket server for country connections.
//! Handles authentication and routes orders and readiness to the match host.
//! Every connection receives the current snapshot on connect and each
//! snapshot the host publishes afterwards.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::config::ConfigError;
use crate::game::state::CountryId;
use crate::network::auth::{resolve_identity, AuthConfig};
use crate::network::host::{EngineHandle, HostError};
use crate::network::protocol::{
    AuthRequest, AuthResult, ClientMessage, ErrorCode, OrderReceipt, ServerMessage,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Outbound messages queued per connection.
    pub snapshot_buffer: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            snapshot_buffer: 64,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Read `WEGO_BIND_ADDR` and `WEGO_MAX_CONNECTIONS`, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("WEGO_BIND_ADDR") {
            config.bind_addr = raw.parse().map_err(|_| ConfigError::Invalid {
                var: "WEGO_BIND_ADDR",
                value: raw,
            })?;
        }
        if let Ok(raw) = std::env::var("WEGO_MAX_CONNECTIONS") {
            config.max_connections = raw.parse().map_err(|_| ConfigError::Invalid {
                var: "WEGO_MAX_CONNECTIONS",
                value: raw,
            })?;
        }
        Ok(config)
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
}

/// Connected client state.
struct ConnectedClient {
    /// Country (after auth).
    country: Option<CountryId>,
    /// Connection time.
    connected_at: Instant,
    /// Last activity.
    last_activity: Instant,
}

type Clients = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Identity rules.
    auth: Arc<AuthConfig>,
    /// Match host.
    engine: EngineHandle,
    /// Connected clients.
    clients: Clients,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig, auth: AuthConfig, engine: EngineHandle) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            auth: Arc::new(auth),
            engine,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Run the server.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Game server listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
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

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let engine = self.engine.clone();
        let auth = self.auth.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(config.snapshot_buffer.max(1));

            // Register client
            {
                let mut clients = clients.write().await;
                clients.insert(addr, ConnectedClient {
                    country: None,
                    connected_at: Instant::now(),
                    last_activity: Instant::now(),
                });
            }

            // Spawn message sender task
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
            });

            // Subscribe before reading the current snapshot so nothing published
            // in between is missed.
            let mut pushes = engine.subscribe();
            let _ = msg_tx.send(ServerMessage::Snapshot((*engine.snapshot()).clone())).await;

            let push_tx = msg_tx.clone();
            let push_engine = engine.clone();
            let push_task = tokio::spawn(async move {
                loop {
                    let snapshot = match pushes.recv().await {
                        Ok(snapshot) => snapshot,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!("Client {} skipped {} snapshots", addr, skipped);
                            push_engine.snapshot()
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    };
                    if push_tx.send(ServerMessage::Snapshot((*snapshot).clone())).await.is_err() {
                        break;
                    }
                }
            });

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::error(
                                            ErrorCode::InvalidInput,
                                            "Invalid message format",
                                        )).await;
                                        continue;
                                    }
                                };

                                {
                                    let mut clients = clients.write().await;
                                    if let Some(client) = clients.get_mut(&addr) {
                                        client.last_activity = Instant::now();
                                    }
                                }

                                Self::handle_client_message(
                                    addr,
                                    client_msg,
                                    &clients,
                                    &engine,
                                    &auth,
                                    &config,
                                    &msg_tx,
                                ).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
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
            push_task.abort();
            drop(msg_tx);
            let _ = sender_task.await;

            if let Some(client) = clients.write().await.remove(&addr) {
                info!(
                    "Client {} ({}) cleaned up after {:?}, idle {:?}",
                    addr,
                    client.country.as_ref().map(CountryId::as_str).unwrap_or("anonymous"),
                    client.connected_at.elapsed(),
                    client.last_activity.elapsed(),
                );
            }
        });
    }

    /// Handle a client message.
    async fn handle_client_message(
        addr: SocketAddr,
        msg: ClientMessage,
        clients: &Clients,
        engine: &EngineHandle,
        auth: &AuthConfig,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match msg {
            ClientMessage::Auth(request) => {
                Self::handle_auth(addr, request, clients, engine, auth, config, sender).await;
            }
            ClientMessage::SubmitOrder { order } => {
                let Some(country) = Self::require_country(addr, clients, sender).await else {
                    return;
                };
                let reply = match engine.submit_order(country, order).await {
                    Ok(submission) => ServerMessage::OrderAccepted(OrderReceipt::from(&submission)),
                    Err(e) => Self::host_error(&e),
                };
                let _ = sender.send(reply).await;
            }
            ClientMessage::Ready => {
                let Some(country) = Self::require_country(addr, clients, sender).await else {
                    return;
                };
                if let Err(e) = engine.mark_ready(country).await {
                    let _ = sender.send(Self::host_error(&e)).await;
                }
            }
            ClientMessage::SyncRequest => {
                let _ = sender.send(ServerMessage::Snapshot((*engine.snapshot()).clone())).await;
            }
            ClientMessage::Ping { timestamp } => {
                let _ = sender.send(ServerMessage::Pong {
                    timestamp,
                    server_time: chrono::Utc::now().timestamp_millis().max(0) as u64,
                }).await;
            }
        }
    }

    /// Handle authentication.
    async fn handle_auth(
        addr: SocketAddr,
        request: AuthRequest,
        clients: &Clients,
        engine: &EngineHandle,
        auth: &AuthConfig,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let country = match resolve_identity(&request, auth) {
            Ok(country) => country,
            Err(e) => {
                debug!("Client {} failed auth: {}", addr, e);
                let _ = sender.send(ServerMessage::AuthResult(AuthResult {
                    success: false,
                    country_id: None,
                    error: Some(e.to_string()),
                    server_version: config.version.clone(),
                })).await;
                let _ = sender.send(ServerMessage::error(e.code(), e.to_string())).await;
                return;
            }
        };

        if let Err(e) = engine.join(country.clone()).await {
            let _ = sender.send(Self::host_error(&e)).await;
            return;
        }

        if let Some(client) = clients.write().await.get_mut(&addr) {
            client.country = Some(country.clone());
        }

        let _ = sender.send(ServerMessage::AuthResult(AuthResult {
            success: true,
            country_id: Some(country.to_string()),
            error: None,
            server_version: config.version.clone(),
        })).await;

        debug!("Client {} authenticated as {} (client {})", addr, country, request.client_version);
    }

    /// Country bound to a connection, or an error sent to it.
    async fn require_country(
        addr: SocketAddr,
        clients: &Clients,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> Option<CountryId> {
        let country = clients.read().await.get(&addr).and_then(|c| c.country.clone());
        if country.is_none() {
            let _ = sender.send(ServerMessage::error(
                ErrorCode::NotAuthenticated,
                "Must authenticate first",
            )).await;
        }
        country
    }

    fn host_error(err: &HostError) -> ServerMessage {
        match err {
            HostError::Rejected(e) => ServerMessage::error(ErrorCode::from(e), e.to_string()),
            HostError::Engine(e) => {
                error!("Engine error: {}", e);
                ServerMessage::error(ErrorCode::InternalError, "Internal error")
            }
            HostError::Closed => ServerMessage::error(ErrorCode::ServerOverloaded, "Match host unavailable"),
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
}
