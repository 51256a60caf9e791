//! Core game server implementation.
//!
//! `GameServer` owns the UDP socket, the connection and lobby tables and the
//! frozen packet registries. Datagrams are handled by one receive task, in
//! arrival order; everything a connection sends goes through one outbound
//! queue drained by a send task.

use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionManager, DisconnectReason, OutboundDatagram};
use crate::context::ServerPacketRegistries;
use crate::error::ServerError;
use crate::lobby::{LobbyCode, LobbyTable, SharedJoinHook};
use crate::plugin::Plugin;
use crate::preprocess::InboundPacketTransformer;
use bytes::Bytes;
use polaris_event_system::{
    current_timestamp, ConnectionAuthenticatedEvent, ConnectionDisconnectedEvent, Event, EventSystem,
    ServerReadyEvent,
};
use polaris_protocol::MessageReader;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

/// Largest datagram the receive loop accepts.
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Shortest interval between idle sweeps.
const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(100);

/// Reason sent to peers dropped by the idle sweep.
pub const IDLE_DISCONNECT_MESSAGE: &str = "Timed out";

/// The core game server structure.
///
/// The server contains no game logic. Plugins register packets, install the
/// inbound transformer and the lobby join hook on the
/// [`ServerBuilder`](super::ServerBuilder), and observe traffic through the
/// event system.
pub struct GameServer {
    config: ServerConfig,
    events: Arc<EventSystem>,
    pub(super) registries: Arc<ServerPacketRegistries>,
    transformer: Arc<dyn InboundPacketTransformer>,
    join_hook: SharedJoinHook,
    connections: Arc<ConnectionManager>,
    lobbies: Arc<LobbyTable>,
    plugins: Mutex<Vec<Box<dyn Plugin>>>,
    plugin_count: usize,
    outbound: Mutex<Option<mpsc::UnboundedReceiver<OutboundDatagram>>>,
    shutdown_sender: broadcast::Sender<()>,
    closed: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    local_addr: OnceLock<SocketAddr>,
}

impl GameServer {
    pub(super) fn new(
        config: ServerConfig,
        events: Arc<EventSystem>,
        registries: ServerPacketRegistries,
        transformer: Arc<dyn InboundPacketTransformer>,
        join_hook: SharedJoinHook,
        plugins: Vec<Box<dyn Plugin>>,
    ) -> Self {
        let (outbound_sender, outbound_receiver) = mpsc::unbounded_channel();
        let (shutdown_sender, _) = broadcast::channel(1);
        let connections = Arc::new(ConnectionManager::new(config.max_connections, outbound_sender));

        Self {
            config,
            events,
            registries: Arc::new(registries),
            transformer,
            join_hook,
            connections,
            lobbies: Arc::new(LobbyTable::new()),
            plugin_count: plugins.len(),
            plugins: Mutex::new(plugins),
            outbound: Mutex::new(Some(outbound_receiver)),
            shutdown_sender,
            closed: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            local_addr: OnceLock::new(),
        }
    }

    /// Binds the UDP socket and starts the receive and send loops.
    ///
    /// Emits `core:server_ready` once the socket is bound.
    ///
    /// # Returns
    ///
    /// The bound local address, or a `ServerError` if the socket could not
    /// be bound or the server already listened once.
    pub async fn listen(self: &Arc<Self>) -> Result<SocketAddr, ServerError> {
        if self.is_closed() {
            return Err(ServerError::Internal("Server is closed".to_string()));
        }

        let outbound = self
            .outbound
            .lock()
            .await
            .take()
            .ok_or_else(|| ServerError::Internal("Server is already listening".to_string()))?;

        self.register_core_handlers().await?;

        let socket = UdpSocket::bind(self.config.bind_address)
            .await
            .map_err(|e| ServerError::Network(format!("Failed to bind {}: {e}", self.config.bind_address)))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| ServerError::Network(format!("Failed to read local address: {e}")))?;
        let _ = self.local_addr.set(local_addr);
        let socket = Arc::new(socket);

        let receive_task = tokio::spawn(Self::receive_loop(
            self.clone(),
            socket.clone(),
            self.shutdown_sender.subscribe(),
        ));
        let send_task = tokio::spawn(Self::send_loop(socket, outbound, self.shutdown_sender.subscribe()));
        let mut tasks = self.tasks.lock().await;
        tasks.extend([receive_task, send_task]);
        if let Some(timeout) = self.config.idle_timeout() {
            tasks.push(tokio::spawn(Self::idle_sweep_loop(
                self.clone(),
                timeout,
                self.shutdown_sender.subscribe(),
            )));
        }
        drop(tasks);

        info!("🚀 Server listening on {}", local_addr);
        self.emit(
            "server_ready",
            &ServerReadyEvent {
                bind_address: local_addr.to_string(),
                plugin_count: self.plugin_count,
                timestamp: current_timestamp(),
            },
        )
        .await;

        Ok(local_addr)
    }

    async fn receive_loop(server: Arc<Self>, socket: Arc<UdpSocket>, mut shutdown: broadcast::Receiver<()>) {
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                received = socket.recv_from(&mut buffer) => match received {
                    Ok((length, remote_addr)) => {
                        let datagram = Bytes::copy_from_slice(&buffer[..length]);
                        server.handle_datagram(remote_addr, datagram).await;
                    }
                    // ICMP unreachable replies surface here on some platforms
                    Err(e) => warn!("⚠️ Failed to receive datagram: {}", e),
                },
            }
        }

        debug!("Receive loop stopped");
    }

    async fn send_loop(
        socket: Arc<UdpSocket>,
        mut outbound: mpsc::UnboundedReceiver<OutboundDatagram>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                queued = outbound.recv() => match queued {
                    Some((remote_addr, datagram)) => Self::send_to(&socket, remote_addr, &datagram).await,
                    None => break,
                },
                _ = shutdown.recv() => {
                    while let Ok((remote_addr, datagram)) = outbound.try_recv() {
                        Self::send_to(&socket, remote_addr, &datagram).await;
                    }
                    break;
                }
            }
        }

        debug!("Send loop stopped");
    }

    async fn idle_sweep_loop(server: Arc<Self>, timeout: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval((timeout / 2).max(MIN_SWEEP_PERIOD));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = interval.tick() => {
                    server.expire_idle(timeout).await;
                }
            }
        }

        debug!("Idle sweep stopped");
    }

    /// Disconnects every peer that has been silent for at least `timeout`.
    ///
    /// Returns the number of connections dropped.
    pub async fn expire_idle(&self, timeout: Duration) -> usize {
        if self.is_closed() {
            return 0;
        }

        let mut expired = 0;
        for connection in self.connections.all() {
            if connection.idle_for() < timeout {
                continue;
            }

            connection.disconnect(DisconnectReason::custom(IDLE_DISCONNECT_MESSAGE));
            self.finalize_disconnect(&connection).await;
            expired += 1;
        }

        if expired > 0 {
            debug!("⏱️ Expired {} idle connection(s)", expired);
        }
        expired
    }

    async fn send_to(socket: &UdpSocket, remote_addr: SocketAddr, datagram: &[u8]) {
        if let Err(e) = socket.send_to(datagram, remote_addr).await {
            warn!("⚠️ Failed to send {} bytes to {}: {}", datagram.len(), remote_addr, e);
        } else {
            trace!("📤 {} bytes to {}", datagram.len(), remote_addr);
        }
    }

    /// Runs one datagram through preprocessing, transport parsing and dispatch.
    ///
    /// Returns the connection the datagram was attributed to, or `None` if it
    /// was dropped (server closed or at capacity).
    pub async fn handle_datagram(&self, remote_addr: SocketAddr, datagram: Bytes) -> Option<Arc<Connection>> {
        if self.is_closed() {
            return None;
        }

        let connection = self.connections.get_or_create(remote_addr)?;
        connection.touch();
        if connection.is_disconnected() {
            return Some(connection);
        }

        let transformed = self
            .transformer
            .transform_inbound(&connection, MessageReader::new(datagram));

        if let Some(user) = transformed.newly_authenticated {
            self.emit(
                "connection_authenticated",
                &ConnectionAuthenticatedEvent {
                    connection_id: connection.id(),
                    client_id: user.client_id,
                    display_name: user.display_name,
                    timestamp: current_timestamp(),
                },
            )
            .await;
        }

        if !connection.is_disconnected() {
            self.process_transport(&connection, transformed.payload).await;
        }

        if connection.is_disconnected() {
            self.finalize_disconnect(&connection).await;
        }

        Some(connection)
    }

    /// Drops a disconnected connection from the tables and announces it.
    async fn finalize_disconnect(&self, connection: &Arc<Connection>) {
        let remote_addr = connection.remote_addr();
        match self.connections.get(&remote_addr) {
            Some(current) if current.id() == connection.id() => {}
            _ => return,
        }
        if self.connections.remove(&remote_addr).is_none() {
            return;
        }

        self.lobbies.leave(connection);

        let reason = connection
            .disconnect_reason()
            .map(ToString::to_string)
            .unwrap_or_default();
        self.emit(
            "connection_disconnected",
            &ConnectionDisconnectedEvent {
                connection_id: connection.id(),
                remote_addr: remote_addr.to_string(),
                reason,
                timestamp: current_timestamp(),
            },
        )
        .await;
    }

    /// Moves `connection` into the lobby the join hook resolves `requested` to.
    pub fn join_lobby(&self, connection: &Connection, requested: &str) -> Option<LobbyCode> {
        let code = self.join_hook.resolve(requested, &self.lobbies)?;
        if self.lobbies.join(connection, code) {
            Some(code)
        } else {
            debug!("Connection {} could not join lobby {}", connection.id(), code);
            None
        }
    }

    /// Disconnects every connection and stops the network loops.
    ///
    /// Idempotent: only the first call does any work. Disconnect datagrams
    /// queued before the loops stop are still sent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("🛑 Closing server...");

        for connection in self.connections.all() {
            connection.disconnect(DisconnectReason::ServerRequest);
            self.finalize_disconnect(&connection).await;
        }

        let _ = self.shutdown_sender.send(());
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if let Err(e) = task.await {
                error!("Network task ended abnormally: {}", e);
            }
        }

        let mut plugins = self.plugins.lock().await;
        for plugin in plugins.iter_mut() {
            if let Err(e) = plugin.on_shutdown().await {
                error!("❌ Plugin {} failed to shut down: {}", plugin.name(), e);
            }
        }

        info!("✅ Server closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Registers the server's own logging subscribers.
    async fn register_core_handlers(&self) -> Result<(), ServerError> {
        self.events
            .on_core("connection_disconnected", |event: ConnectionDisconnectedEvent| {
                info!(
                    "👋 Connection {} ({}) disconnected: {}",
                    event.connection_id, event.remote_addr, event.reason
                );
                Ok(())
            })
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        self.events
            .on_core("server_ready", |event: ServerReadyEvent| {
                info!(
                    "🌍 Server ready on {} with {} plugin(s)",
                    event.bind_address, event.plugin_count
                );
                Ok(())
            })
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        Ok(())
    }

    /// Emits a core event; emission failures are logged, never propagated.
    pub(super) async fn emit<T: Event>(&self, event_name: &str, event: &T) {
        if let Err(e) = self.events.emit_core(event_name, event).await {
            error!("Failed to emit core:{} event: {}", event_name, e);
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn events(&self) -> Arc<EventSystem> {
        self.events.clone()
    }

    pub fn connections(&self) -> Arc<ConnectionManager> {
        self.connections.clone()
    }

    pub fn lobbies(&self) -> Arc<LobbyTable> {
        self.lobbies.clone()
    }

    pub fn registries(&self) -> Arc<ServerPacketRegistries> {
        self.registries.clone()
    }

    pub fn plugin_count(&self) -> usize {
        self.plugin_count
    }

    #[cfg(test)]
    pub(crate) async fn take_outbound(&self) -> Option<mpsc::UnboundedReceiver<OutboundDatagram>> {
        self.outbound.lock().await.take()
    }

    /// Address the socket is bound to, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }
}

impl std::fmt::Debug for GameServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameServer")
            .field("config", &self.config)
            .field("connections", &self.connections.len())
            .field("lobbies", &self.lobbies.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
