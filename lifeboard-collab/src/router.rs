//! Routes mutation events to the lobby they address.
//!
//! Every handler validates the lobby key and player identifiers before
//! touching the document, applies one [`Mutation`] under the lobby lock and
//! lets the lobby broadcast the result. Failures come back as
//! [`RouterError`] for the caller to report to the sender.

use std::sync::Arc;

use lifeboard_core::{DocumentError, Mutation, Outcome, PlayerId};

use crate::error::RouterError;
use crate::protocol::ClientEvent;
use crate::store::{Lobby, LobbyStore};

/// Reject blank keys; anything else is accepted verbatim.
pub fn validate_key(key: &str) -> Result<&str, RouterError> {
    if key.trim().is_empty() {
        Err(RouterError::MalformedPayload("lobby key is empty".to_string()))
    } else {
        Ok(key)
    }
}

pub struct MutationRouter {
    store: Arc<LobbyStore>,
}

impl MutationRouter {
    pub fn new(store: Arc<LobbyStore>) -> Self {
        Self { store }
    }

    fn player(lobby: &str, raw: &str) -> Result<PlayerId, RouterError> {
        raw.parse().map_err(|source: DocumentError| RouterError::InvalidPlayer {
            lobby: lobby.to_string(),
            source,
        })
    }

    /// Apply `mutation` to an existing lobby. Never creates one.
    pub async fn apply(&self, lobby: &str, mutation: Mutation) -> Result<Outcome, RouterError> {
        let key = validate_key(lobby)?;
        let handle = self
            .store
            .get(key)
            .await
            .ok_or_else(|| RouterError::InvalidRoom(key.to_string()))?;

        let kind = mutation.kind();
        let outcome = handle.mutate(mutation).await?;
        log::debug!("Applied {kind} to lobby {key:?} ({outcome:?})");
        Ok(outcome)
    }

    pub async fn change(&self, lobby: &str, player: &str, delta: i64) -> Result<Outcome, RouterError> {
        let player = Self::player(lobby, player)?;
        self.apply(lobby, Mutation::ChangeLife { player, delta }).await
    }

    pub async fn change_commander_damage(
        &self,
        lobby: &str,
        identifier: &str,
        other_id: &str,
        delta: i64,
    ) -> Result<Outcome, RouterError> {
        let player = Self::player(lobby, identifier)?;
        let opponent = Self::player(lobby, other_id)?;
        self.apply(
            lobby,
            Mutation::ChangeCommanderDamage {
                player,
                opponent,
                delta,
            },
        )
        .await
    }

    pub async fn change_poison(&self, lobby: &str, player: &str, delta: i64) -> Result<Outcome, RouterError> {
        let player = Self::player(lobby, player)?;
        self.apply(lobby, Mutation::ChangePoison { player, delta }).await
    }

    pub async fn rename(&self, lobby: &str, player: &str, name: String) -> Result<Outcome, RouterError> {
        let player = Self::player(lobby, player)?;
        self.apply(lobby, Mutation::Rename { player, name }).await
    }

    pub async fn add_player(&self, lobby: &str) -> Result<Outcome, RouterError> {
        self.apply(lobby, Mutation::AddPlayer).await
    }

    pub async fn remove_player(&self, lobby: &str) -> Result<Outcome, RouterError> {
        self.apply(lobby, Mutation::RemovePlayer).await
    }

    pub async fn reset(&self, lobby: &str) -> Result<Outcome, RouterError> {
        self.apply(lobby, Mutation::Reset).await
    }

    /// Apply a mutation event through the lobby a connection has joined.
    ///
    /// Events for any other key are rejected with `InvalidRoom`, as are
    /// events after `joined` was evicted, even if the key has since been
    /// recreated.
    pub async fn route_joined(
        &self,
        joined: Option<&Lobby>,
        event: ClientEvent,
    ) -> Result<Outcome, RouterError> {
        let (key, mutation) = Self::split_event(event)?;
        let lobby = joined
            .filter(|lobby| lobby.key() == key)
            .ok_or_else(|| RouterError::InvalidRoom(key.clone()))?;

        let kind = mutation.kind();
        let outcome = lobby.mutate(mutation).await?;
        log::debug!("Applied {kind} to lobby {key:?} ({outcome:?})");
        Ok(outcome)
    }

    /// Validate a mutation event into its lobby key and [`Mutation`].
    fn split_event(event: ClientEvent) -> Result<(String, Mutation), RouterError> {
        let (lobby, mutation) = match event {
            ClientEvent::Change { lobby, player, delta } => {
                let player = Self::player(&lobby, &player)?;
                (lobby, Mutation::ChangeLife { player, delta })
            }
            ClientEvent::ChangeCommanderDamage {
                lobby,
                identifier,
                other_id,
                delta,
            } => {
                let player = Self::player(&lobby, &identifier)?;
                let opponent = Self::player(&lobby, &other_id)?;
                (
                    lobby,
                    Mutation::ChangeCommanderDamage {
                        player,
                        opponent,
                        delta,
                    },
                )
            }
            ClientEvent::ChangePoison { lobby, player, delta } => {
                let player = Self::player(&lobby, &player)?;
                (lobby, Mutation::ChangePoison { player, delta })
            }
            ClientEvent::Rename { lobby, player, name } => {
                let player = Self::player(&lobby, &player)?;
                (lobby, Mutation::Rename { player, name })
            }
            ClientEvent::AddPlayer { lobby } => (lobby, Mutation::AddPlayer),
            ClientEvent::RemovePlayer { lobby } => (lobby, Mutation::RemovePlayer),
            ClientEvent::Reset { lobby } => (lobby, Mutation::Reset),
            other @ (ClientEvent::Join { .. } | ClientEvent::CreateLobby { .. }) => {
                return Err(RouterError::MalformedPayload(format!(
                    "{} is not a mutation",
                    other.name()
                )))
            }
        };
        validate_key(&lobby)?;
        Ok((lobby, mutation))
    }

    /// Apply a decoded mutation event to the lobby it names.
    ///
    /// `join` and `create_lobby` are connection-level and are rejected here.
    pub async fn route(&self, event: ClientEvent) -> Result<Outcome, RouterError> {
        let (key, mutation) = Self::split_event(event)?;
        self.apply(&key, mutation).await
    }
}
