//! Lobby storage with per-lobby locking.
//!
//! ```text
//! LobbyStore
//!   RwLock<HashMap<key, Arc<Lobby>>>      key space, held briefly
//!        │
//!        ▼
//!   Lobby
//!     Mutex<LobbyState>                   document + last_seen + evicted
//!     BroadcastGroup                      members of this lobby
//! ```
//!
//! Lock order is always map then lobby. Mutations resolve their handle under
//! the map read lock, release it, then take only the lobby lock, so lobbies
//! never contend with each other. Eviction holds the map write lock and the
//! lobby lock together and flags the lobby, so a mutation that resolved its
//! handle before the eviction fails with `InvalidRoom` instead of writing
//! into a document nobody can see.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use lifeboard_core::{LobbyDocument, Mutation, Outcome};

use crate::broadcast::BroadcastGroup;
use crate::error::RouterError;
use crate::protocol::ServerEvent;

struct LobbyState {
    document: LobbyDocument,
    last_seen: Instant,
    evicted: bool,
}

/// One lobby: its document, liveness clock and members.
pub struct Lobby {
    key: String,
    state: Mutex<LobbyState>,
    group: BroadcastGroup,
}

impl Lobby {
    fn new(key: String, document: LobbyDocument, broadcast_capacity: usize) -> Self {
        Self {
            key,
            state: Mutex::new(LobbyState {
                document,
                last_seen: Instant::now(),
                evicted: false,
            }),
            group: BroadcastGroup::new(broadcast_capacity),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn group(&self) -> &BroadcastGroup {
        &self.group
    }

    fn gone(&self) -> RouterError {
        RouterError::InvalidRoom(self.key.clone())
    }

    /// Apply a mutation, refresh the liveness clock and, if anything changed,
    /// broadcast the new document.
    ///
    /// The broadcast is sent while the lobby lock is held, so members observe
    /// updates in the order they were applied.
    pub async fn mutate(&self, mutation: Mutation) -> Result<Outcome, RouterError> {
        let mut state = self.state.lock().await;
        if state.evicted {
            return Err(self.gone());
        }

        let outcome = state
            .document
            .apply(mutation)
            .map_err(|source| RouterError::InvalidPlayer {
                lobby: self.key.clone(),
                source,
            })?;
        state.last_seen = Instant::now();

        if outcome == Outcome::Changed {
            self.group
                .send(&ServerEvent::update(&self.key, &state.document))?;
        }
        Ok(outcome)
    }

    /// Broadcast the current document to every member.
    pub async fn publish(&self) -> Result<usize, RouterError> {
        let state = self.state.lock().await;
        if state.evicted {
            return Err(self.gone());
        }
        Ok(self
            .group
            .send(&ServerEvent::update(&self.key, &state.document))?)
    }

    /// Copy of the current document.
    pub async fn snapshot(&self) -> Result<LobbyDocument, RouterError> {
        let state = self.state.lock().await;
        if state.evicted {
            return Err(self.gone());
        }
        Ok(state.document.clone())
    }

    pub async fn last_seen(&self) -> Instant {
        self.state.lock().await.last_seen
    }

    pub async fn is_evicted(&self) -> bool {
        self.state.lock().await.evicted
    }

    /// Refresh the liveness clock. Returns false if the lobby was evicted.
    async fn touch(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.evicted {
            return false;
        }
        state.last_seen = Instant::now();
        true
    }

    /// Flag as evicted and tell members. Caller holds the store's write lock.
    async fn close(&self) {
        let mut state = self.state.lock().await;
        state.evicted = true;
        let event = ServerEvent::LobbyClosed {
            lobby: self.key.clone(),
        };
        if let Err(e) = self.group.send(&event) {
            log::error!("Failed to notify members of closed lobby {:?}: {e}", self.key);
        }
    }
}

/// Every resident lobby, keyed by lobby key.
pub struct LobbyStore {
    lobbies: RwLock<HashMap<String, Arc<Lobby>>>,
    /// Copied into each new lobby
    template: LobbyDocument,
    broadcast_capacity: usize,
}

impl LobbyStore {
    /// Store whose lobbies start from the default four-seat document.
    pub fn new(broadcast_capacity: usize) -> Self {
        Self::with_template(LobbyDocument::default(), broadcast_capacity)
    }

    pub fn with_template(template: LobbyDocument, broadcast_capacity: usize) -> Self {
        Self {
            lobbies: RwLock::new(HashMap::new()),
            template,
            broadcast_capacity,
        }
    }

    /// Existing lobby for `key`, or a new one built from the template.
    /// Either way its liveness clock is refreshed.
    pub async fn get_or_create(&self, key: &str) -> Arc<Lobby> {
        // Fast path: read lock
        let existing = self.lobbies.read().await.get(key).cloned();
        if let Some(lobby) = existing {
            if lobby.touch().await {
                return lobby;
            }
        }

        // Slow path: nobody can evict while we hold the write lock.
        let mut lobbies = self.lobbies.write().await;
        if let Some(lobby) = lobbies.get(key) {
            let lobby = lobby.clone();
            lobby.touch().await;
            return lobby;
        }

        let lobby = Arc::new(Lobby::new(
            key.to_string(),
            self.template.clone(),
            self.broadcast_capacity,
        ));
        lobbies.insert(key.to_string(), lobby.clone());
        log::info!("Lobby {key:?} created ({} resident)", lobbies.len());
        lobby
    }

    pub async fn get(&self, key: &str) -> Option<Arc<Lobby>> {
        self.lobbies.read().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.lobbies.read().await.contains_key(key)
    }

    /// Snapshot of resident keys.
    pub async fn keys(&self) -> Vec<String> {
        self.lobbies.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.lobbies.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.lobbies.read().await.is_empty()
    }

    /// Remove a lobby regardless of activity.
    pub async fn evict(&self, key: &str) -> Option<Arc<Lobby>> {
        let mut lobbies = self.lobbies.write().await;
        let lobby = lobbies.remove(key)?;
        lobby.close().await;
        log::info!("Lobby {key:?} evicted ({} resident)", lobbies.len());
        Some(lobby)
    }

    /// Remove `key` if it has been idle for longer than `ttl` as of `now`.
    ///
    /// Idleness is first read under the lobby lock alone, so live lobbies
    /// never hold up the key space. Candidates are re-checked with the map
    /// write lock held, so activity that landed in between keeps the lobby
    /// alive.
    pub async fn evict_if_stale(&self, key: &str, ttl: Duration, now: Instant) -> bool {
        let Some(candidate) = self.get(key).await else {
            return false;
        };
        if now.saturating_duration_since(candidate.last_seen().await) <= ttl {
            return false;
        }

        let mut lobbies = self.lobbies.write().await;
        // The key may have been evicted and recreated since the first check.
        match lobbies.get(key) {
            Some(current) if Arc::ptr_eq(current, &candidate) => {}
            _ => return false,
        }

        let idle = {
            let state = candidate.state.lock().await;
            now.saturating_duration_since(state.last_seen)
        };
        if idle <= ttl {
            return false;
        }

        lobbies.remove(key);
        candidate.close().await;
        log::info!(
            "Lobby {key:?} evicted after {}s idle ({} resident)",
            idle.as_secs(),
            lobbies.len()
        );
        true
    }
}
