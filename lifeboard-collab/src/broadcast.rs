//! Room membership and fan-out of lobby snapshots.
//!
//! Each lobby owns one [`BroadcastGroup`]: a membership set plus a tokio
//! broadcast channel of pre-encoded JSON frames. A frame is encoded once
//! and shared by every receiver.
//!
//! [`RoomBroadcaster`] is the entry point connections use to join, leave
//! and request a fresh snapshot for a lobby.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::error::RouterError;
use crate::protocol::{Frame, ProtocolError, ServerEvent};
use crate::store::{Lobby, LobbyStore};

/// Attempts at joining a lobby that is evicted mid-join before giving up.
const JOIN_ATTEMPTS: usize = 3;

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub active_peers: usize,
}

/// Lock-free counters for the send path.
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

impl AtomicBroadcastStats {
    fn new() -> Self {
        Self {
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }
}

/// A connected client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub peer_id: Uuid,
    pub addr: Option<SocketAddr>,
}

impl PeerInfo {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            peer_id: Uuid::new_v4(),
            addr: Some(addr),
        }
    }

    /// Peer without a socket address (for tests and in-process callers).
    pub fn detached() -> Self {
        Self {
            peer_id: Uuid::new_v4(),
            addr: None,
        }
    }
}

/// Membership set and fan-out channel of a single lobby.
pub struct BroadcastGroup {
    sender: broadcast::Sender<Frame>,
    peers: RwLock<HashMap<Uuid, PeerInfo>>,
    /// Frames buffered per receiver before it starts lagging
    capacity: usize,
    atomic_stats: AtomicBroadcastStats,
}

impl BroadcastGroup {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            peers: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            atomic_stats: AtomicBroadcastStats::new(),
        }
    }

    /// Admit a peer. The returned receiver sees every frame sent after
    /// this call.
    pub async fn add_peer(&self, info: PeerInfo) -> broadcast::Receiver<Frame> {
        let mut peers = self.peers.write().await;
        peers.insert(info.peer_id, info);
        self.sender.subscribe()
    }

    pub async fn remove_peer(&self, peer_id: &Uuid) -> Option<PeerInfo> {
        self.peers.write().await.remove(peer_id)
    }

    /// Encode an event once and send it to every member.
    ///
    /// Returns the number of receivers reached.
    pub fn send(&self, event: &ServerEvent) -> Result<usize, ProtocolError> {
        Ok(self.send_frame(event.to_frame()?))
    }

    /// Send an already encoded frame.
    pub fn send_frame(&self, frame: Frame) -> usize {
        let count = self.sender.send(frame).unwrap_or(0);
        self.atomic_stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    /// Record frames a lagging receiver skipped.
    pub fn record_lag(&self, skipped: u64) {
        self.atomic_stats
            .messages_dropped
            .fetch_add(skipped, Ordering::Relaxed);
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn peers(&self) -> Vec<PeerInfo> {
        self.peers.read().await.values().cloned().collect()
    }

    pub async fn has_peer(&self, peer_id: &Uuid) -> bool {
        self.peers.read().await.contains_key(peer_id)
    }

    pub async fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.atomic_stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.atomic_stats.messages_dropped.load(Ordering::Relaxed),
            active_peers: self.peers.read().await.len(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A connection's seat in one lobby's broadcast group.
pub struct Membership {
    pub lobby: Arc<Lobby>,
    pub peer_id: Uuid,
    pub receiver: broadcast::Receiver<Frame>,
}

impl std::fmt::Debug for Membership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Membership")
            .field("lobby", &self.lobby.key())
            .field("peer_id", &self.peer_id)
            .finish_non_exhaustive()
    }
}

/// Join/leave/broadcast over the lobbies held by a [`LobbyStore`].
pub struct RoomBroadcaster {
    store: Arc<LobbyStore>,
}

impl RoomBroadcaster {
    pub fn new(store: Arc<LobbyStore>) -> Self {
        Self { store }
    }

    /// Add `peer` to the lobby `key`, creating the lobby if needed, then send
    /// the current document to every member (the joiner included).
    pub async fn join(&self, peer: PeerInfo, key: &str) -> Result<Membership, RouterError> {
        let mut last_err = RouterError::InvalidRoom(key.to_string());
        for _ in 0..JOIN_ATTEMPTS {
            let lobby = self.store.get_or_create(key).await;
            match Self::admit(lobby, &peer).await {
                Ok(membership) => return Ok(membership),
                // Evicted between lookup and publish: retry against a fresh lobby.
                Err(e @ RouterError::InvalidRoom(_)) => last_err = e,
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }

    /// Subscribe `peer` to `lobby` and publish its document.
    ///
    /// On failure the peer is removed from the group again.
    async fn admit(lobby: Arc<Lobby>, peer: &PeerInfo) -> Result<Membership, RouterError> {
        let receiver = lobby.group().add_peer(peer.clone()).await;
        match lobby.publish().await {
            Ok(reached) => {
                log::info!(
                    "Peer {} joined lobby {:?} ({reached} members)",
                    peer.peer_id,
                    lobby.key()
                );
                Ok(Membership {
                    lobby,
                    peer_id: peer.peer_id,
                    receiver,
                })
            }
            Err(e) => {
                lobby.group().remove_peer(&peer.peer_id).await;
                Err(e)
            }
        }
    }

    /// Remove a connection from the lobby it joined.
    pub async fn leave(&self, membership: &Membership) {
        if membership
            .lobby
            .group()
            .remove_peer(&membership.peer_id)
            .await
            .is_some()
        {
            log::debug!(
                "Peer {} left lobby {:?}",
                membership.peer_id,
                membership.lobby.key()
            );
        }
    }

    /// Send the current document of `key` to all of its members.
    pub async fn broadcast(&self, key: &str) -> Result<usize, RouterError> {
        let lobby = self
            .store
            .get(key)
            .await
            .ok_or_else(|| RouterError::InvalidRoom(key.to_string()))?;
        lobby.publish().await
    }

    pub fn store(&self) -> &Arc<LobbyStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeboard_core::LobbyDocument;
    use tokio::time::{timeout, Duration};

    fn update_of(frame: &Frame) -> (String, LobbyDocument) {
        match ServerEvent::decode(frame).unwrap() {
            ServerEvent::Update { lobby, players } => (lobby, players),
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_broadcast_group_add_remove() {
        let group = BroadcastGroup::new(16);
        let peer = PeerInfo::detached();
        let peer_id = peer.peer_id;

        let _rx = group.add_peer(peer).await;
        assert_eq!(group.peer_count().await, 1);
        assert!(group.has_peer(&peer_id).await);

        group.remove_peer(&peer_id).await;
        assert_eq!(group.peer_count().await, 0);
        assert!(!group.has_peer(&peer_id).await);
    }

    #[tokio::test]
    async fn test_broadcast_fan_out() {
        let group = BroadcastGroup::new(16);
        let mut rx1 = group.add_peer(PeerInfo::detached()).await;
        let mut rx2 = group.add_peer(PeerInfo::detached()).await;
        let mut rx3 = group.add_peer(PeerInfo::detached()).await;

        let event = ServerEvent::update("squirrel", &LobbyDocument::default());
        assert_eq!(group.send(&event).unwrap(), 3);

        for rx in [&mut rx1, &mut rx2, &mut rx3] {
            let (lobby, doc) = update_of(&rx.recv().await.unwrap());
            assert_eq!(lobby, "squirrel");
            assert_eq!(doc.len(), 4);
        }
    }

    #[tokio::test]
    async fn test_send_frame_is_shared() {
        let group = BroadcastGroup::new(16);
        let mut rx = group.add_peer(PeerInfo::detached()).await;

        let frame: Frame = Frame::from("{\"event\":\"lobby_closed\",\"lobby\":\"x\"}");
        assert_eq!(group.send_frame(frame.clone()), 1);
        assert!(Arc::ptr_eq(&rx.recv().await.unwrap(), &frame));
    }

    #[tokio::test]
    async fn test_broadcast_stats() {
        let group = BroadcastGroup::new(16);
        let _rx = group.add_peer(PeerInfo::detached()).await;

        let event = ServerEvent::LobbyClosed { lobby: "x".into() };
        group.send(&event).unwrap();
        group.send(&event).unwrap();
        group.record_lag(3);

        let stats = group.stats().await;
        assert_eq!(stats.messages_sent, 2);
        assert_eq!(stats.messages_dropped, 3);
        assert_eq!(stats.active_peers, 1);
    }

    #[tokio::test]
    async fn test_send_without_members() {
        let group = BroadcastGroup::new(4);
        let event = ServerEvent::LobbyClosed { lobby: "x".into() };
        assert_eq!(group.send(&event).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        assert_eq!(BroadcastGroup::new(0).capacity(), 1);
    }

    #[tokio::test]
    async fn test_join_sends_snapshot_to_every_member() {
        let store = Arc::new(LobbyStore::new(16));
        let broadcaster = RoomBroadcaster::new(store.clone());

        let mut first = broadcaster.join(PeerInfo::detached(), "squirrel").await.unwrap();
        let (_, doc) = update_of(&first.receiver.recv().await.unwrap());
        assert_eq!(doc, LobbyDocument::default());

        let mut second = broadcaster.join(PeerInfo::detached(), "squirrel").await.unwrap();
        // Both the joiner and the existing member get the snapshot.
        update_of(&second.receiver.recv().await.unwrap());
        update_of(&first.receiver.recv().await.unwrap());

        assert!(Arc::ptr_eq(&first.lobby, &second.lobby));
        assert_eq!(first.lobby.group().peer_count().await, 2);
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let store = Arc::new(LobbyStore::new(16));
        let broadcaster = RoomBroadcaster::new(store);

        let mut a = broadcaster.join(PeerInfo::detached(), "alpha").await.unwrap();
        let _ = a.receiver.recv().await.unwrap();
        let _b = broadcaster.join(PeerInfo::detached(), "beta").await.unwrap();

        broadcaster.broadcast("beta").await.unwrap();
        let result = timeout(Duration::from_millis(50), a.receiver.recv()).await;
        assert!(result.is_err(), "alpha must not see beta's frames");
    }

    #[tokio::test]
    async fn test_leave_removes_membership() {
        let store = Arc::new(LobbyStore::new(16));
        let broadcaster = RoomBroadcaster::new(store);

        let membership = broadcaster.join(PeerInfo::detached(), "squirrel").await.unwrap();
        broadcaster.leave(&membership).await;
        assert_eq!(membership.lobby.group().peer_count().await, 0);
    }

    #[tokio::test]
    async fn test_admit_to_evicted_lobby_leaves_no_member_behind() {
        let store = Arc::new(LobbyStore::new(16));
        let stale = store.get_or_create("squirrel").await;
        store.evict("squirrel").await;

        let peer = PeerInfo::detached();
        let err = RoomBroadcaster::admit(stale.clone(), &peer).await.unwrap_err();
        assert_eq!(err, RouterError::InvalidRoom("squirrel".into()));
        assert!(!stale.group().has_peer(&peer.peer_id).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_join_survives_concurrent_eviction() {
        let store = Arc::new(LobbyStore::new(256));
        let broadcaster = Arc::new(RoomBroadcaster::new(store.clone()));

        let evictor = {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..500 {
                    store.evict("hot").await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut joiners = Vec::new();
        for _ in 0..4 {
            let broadcaster = broadcaster.clone();
            joiners.push(tokio::spawn(async move {
                for _ in 0..100 {
                    if let Ok(mut m) = broadcaster.join(PeerInfo::detached(), "hot").await {
                        // A successful join always starts with the snapshot.
                        let (lobby, _) = update_of(&m.receiver.recv().await.unwrap());
                        assert_eq!(lobby, "hot");
                        broadcaster.leave(&m).await;
                    }
                }
            }));
        }
        for joiner in joiners {
            joiner.await.unwrap();
        }
        evictor.await.unwrap();

        if let Some(lobby) = store.get("hot").await {
            assert_eq!(lobby.group().peer_count().await, 0);
        }
    }

    #[tokio::test]
    async fn test_broadcast_unknown_room() {
        let broadcaster = RoomBroadcaster::new(Arc::new(LobbyStore::new(16)));
        assert_eq!(
            broadcaster.broadcast("nowhere").await.unwrap_err(),
            RouterError::InvalidRoom("nowhere".into())
        );
    }
}
