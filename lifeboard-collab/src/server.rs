//! WebSocket lobby server.
//!
//! Architecture:
//! ```text
//! Client A ──┐                 ┌── MutationRouter ──┐
//!            ├── connection ───┤                    ├── Lobby (doc + lock)
//! Client B ──┘    task         └── RoomBroadcaster ─┘        │
//!                                                      BroadcastGroup
//!                                                            │
//!                                              ┌─────────────┼─────────────┐
//!                                              ▼             ▼             ▼
//!                                          Client A      Client B      Client C
//!
//! LobbyReaper ── sweeps LobbyStore every `sweep_interval`
//! ```
//!
//! Each connection runs in its own task and belongs to at most one lobby at
//! a time. Rejected events are answered on the sender's socket only.

use std::net::SocketAddr;
use std::sync::Arc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::broadcast::{Membership, PeerInfo, RoomBroadcaster};
use crate::config::ServerConfig;
use crate::error::{NamingError, RouterError};
use crate::naming::{IdentifierGenerator, NameSource, ScryfallSource};
use crate::protocol::{ClientEvent, Frame, ProtocolError, ServerEvent};
use crate::reaper::start_lobby_reaper;
use crate::router::{validate_key, MutationRouter};
use crate::store::LobbyStore;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_events: u64,
    pub rejected_events: u64,
    pub active_lobbies: usize,
}

/// State shared by every connection task.
#[derive(Clone)]
struct Shared {
    store: Arc<LobbyStore>,
    broadcaster: Arc<RoomBroadcaster>,
    router: Arc<MutationRouter>,
    generator: Arc<IdentifierGenerator>,
    stats: Arc<RwLock<ServerStats>>,
    verbose_errors: bool,
}

impl Shared {
    /// Handle one text frame. Returns the reply for the sender, if any.
    async fn dispatch(
        &self,
        peer: &PeerInfo,
        membership: &mut Option<Membership>,
        text: &str,
    ) -> Option<ServerEvent> {
        {
            let mut s = self.stats.write().await;
            s.total_events += 1;
        }

        let event = match ClientEvent::decode(text) {
            Ok(event) => event,
            Err(e) => return Some(self.reject(peer, RouterError::MalformedPayload(e.to_string())).await),
        };

        match event {
            ClientEvent::Join { lobby } => {
                match self.join(peer, membership, &lobby).await {
                    Ok(()) => None,
                    Err(e) => Some(self.reject(peer, e).await),
                }
            }
            ClientEvent::CreateLobby { lobby } => Some(ServerEvent::LobbyCreated {
                lobby: self.resolve_key(lobby).await,
            }),
            mutation => {
                let joined = membership.as_ref().map(|m| &*m.lobby);
                match self.router.route_joined(joined, mutation).await {
                    Ok(_) => None,
                    Err(e) => {
                        self.drop_if_evicted(membership).await;
                        Some(self.reject(peer, e).await)
                    }
                }
            }
        }
    }

    /// Move the connection into `lobby`, leaving any lobby it was in.
    async fn join(
        &self,
        peer: &PeerInfo,
        membership: &mut Option<Membership>,
        lobby: &str,
    ) -> Result<(), RouterError> {
        let key = validate_key(lobby)?;
        if let Some(previous) = membership.take() {
            self.broadcaster.leave(&previous).await;
        }
        *membership = Some(self.broadcaster.join(peer.clone(), key).await?);
        Ok(())
    }

    /// Forget a membership whose lobby has been evicted.
    async fn drop_if_evicted(&self, membership: &mut Option<Membership>) {
        let evicted = match membership.as_ref() {
            Some(m) => m.lobby.is_evicted().await,
            None => false,
        };
        if !evicted {
            return;
        }
        if let Some(m) = membership.take() {
            log::debug!("Peer {} dropped from evicted lobby {:?}", m.peer_id, m.lobby.key());
            self.broadcaster.leave(&m).await;
        }
    }

    /// The supplied key if it is not blank, otherwise a generated one.
    async fn resolve_key(&self, requested: Option<String>) -> String {
        match requested {
            Some(key) if !key.trim().is_empty() => key,
            _ => self.generator.generate().await,
        }
    }

    async fn reject(&self, peer: &PeerInfo, error: RouterError) -> ServerEvent {
        log::warn!("Rejected event from peer {}: {error}", peer.peer_id);
        {
            let mut s = self.stats.write().await;
            s.rejected_events += 1;
        }
        ServerEvent::Error {
            kind: error.kind(),
            message: error.client_message(self.verbose_errors),
        }
    }
}

/// The lobby server.
pub struct LobbyServer {
    config: ServerConfig,
    shared: Shared,
}

impl LobbyServer {
    /// Server using the configured HTTP naming source.
    pub fn new(config: ServerConfig) -> Result<Self, NamingError> {
        let source = Arc::new(ScryfallSource::new(&config.naming)?);
        Ok(Self::with_name_source(config, source))
    }

    /// Server with a caller-supplied naming source.
    pub fn with_name_source(config: ServerConfig, source: Arc<dyn NameSource>) -> Self {
        let store = Arc::new(LobbyStore::new(config.broadcast_capacity));
        let shared = Shared {
            broadcaster: Arc::new(RoomBroadcaster::new(store.clone())),
            router: Arc::new(MutationRouter::new(store.clone())),
            generator: Arc::new(IdentifierGenerator::new(
                source,
                store.clone(),
                config.naming.max_attempts,
            )),
            stats: Arc::new(RwLock::new(ServerStats::default())),
            verbose_errors: config.debug,
            store,
        };
        Self { config, shared }
    }

    /// Bind the configured address and serve until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), BoxError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` is cancelled.
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<(), BoxError> {
        log::info!("Lobby server listening on {}", listener.local_addr()?);

        let reaper = tokio::spawn(start_lobby_reaper(
            self.shared.store.clone(),
            self.config.reaper.clone(),
            shutdown.child_token(),
        ));

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            log::error!("Failed to accept connection: {e}");
                            continue;
                        }
                    };
                    log::debug!("New TCP connection from {addr}");

                    let shared = self.shared.clone();
                    let token = shutdown.child_token();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, addr, shared, token).await {
                            log::error!("Connection error from {addr}: {e}");
                        }
                    });
                }
                _ = shutdown.cancelled() => {
                    log::info!("Lobby server shutting down");
                    break;
                }
            }
        }

        if let Err(e) = reaper.await {
            log::error!("Lobby reaper task failed: {e}");
        }
        Ok(())
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        shared: Shared,
        shutdown: CancellationToken,
    ) -> Result<(), BoxError> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let peer = PeerInfo::new(addr);
        log::info!("WebSocket connection established from {addr} (peer {})", peer.peer_id);

        {
            let mut s = shared.stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let mut membership: Option<Membership> = None;
        let result = Self::connection_loop(
            &shared,
            &peer,
            &mut membership,
            &mut ws_sender,
            &mut ws_receiver,
            shutdown,
        )
        .await;

        if let Some(m) = membership.take() {
            shared.broadcaster.leave(&m).await;
        }
        {
            let mut s = shared.stats.write().await;
            s.active_connections = s.active_connections.saturating_sub(1);
        }
        log::info!("Connection closed from {addr}");
        result
    }

    async fn connection_loop<S, R>(
        shared: &Shared,
        peer: &PeerInfo,
        membership: &mut Option<Membership>,
        ws_sender: &mut S,
        ws_receiver: &mut R,
        shutdown: CancellationToken,
    ) -> Result<(), BoxError>
    where
        S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
        R: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            tokio::select! {
                // Incoming WebSocket message
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(reply) = shared.dispatch(peer, membership, text.as_str()).await {
                                ws_sender.send(Message::text(reply.encode()?)).await?;
                            }
                        }

                        Some(Ok(Message::Binary(_))) => {
                            let error = RouterError::MalformedPayload(ProtocolError::BinaryFrame.to_string());
                            let reply = shared.reject(peer, error).await;
                            ws_sender.send(Message::text(reply.encode()?)).await?;
                        }

                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                        }

                        Some(Ok(Message::Close(_))) | None => break,

                        Some(Err(e)) => {
                            log::error!("WebSocket error from peer {}: {e}", peer.peer_id);
                            break;
                        }

                        _ => {}
                    }
                }

                // Outgoing lobby frame
                frame = next_frame(membership) => {
                    match frame {
                        Ok(frame) => {
                            ws_sender.send(Message::text(frame.to_string())).await?;
                            // `lobby_closed` is the last frame an evicted lobby sends.
                            shared.drop_if_evicted(membership).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            // Frames are full snapshots; the next one catches the peer up.
                            log::warn!("Peer {} lagged by {n} frames", peer.peer_id);
                            if let Some(m) = membership.as_ref() {
                                m.lobby.group().record_lag(n);
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            *membership = None;
                        }
                    }
                }

                _ = shutdown.cancelled() => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
        Ok(())
    }

    pub async fn stats(&self) -> ServerStats {
        let mut stats = self.shared.stats.read().await.clone();
        stats.active_lobbies = self.shared.store.len().await;
        stats
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn store(&self) -> &Arc<LobbyStore> {
        &self.shared.store
    }

    pub fn broadcaster(&self) -> &Arc<RoomBroadcaster> {
        &self.shared.broadcaster
    }

    pub fn router(&self) -> &Arc<MutationRouter> {
        &self.shared.router
    }

    pub fn generator(&self) -> &Arc<IdentifierGenerator> {
        &self.shared.generator
    }
}

/// Next frame for the connection's lobby; pending while it has none.
async fn next_frame(membership: &mut Option<Membership>) -> Result<Frame, broadcast::error::RecvError> {
    match membership {
        Some(m) => m.receiver.recv().await,
        None => std::future::pending().await,
    }
}
