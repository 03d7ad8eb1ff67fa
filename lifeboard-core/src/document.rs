//! The shared per-lobby document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::mutation::{Mutation, Outcome};
use crate::player::{PlayerId, PlayerState};

/// Number of seats a new lobby starts with.
pub const DEFAULT_PLAYER_COUNT: u32 = 4;

/// Errors raised while applying a mutation to a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("not a player identifier: {0:?}")]
    InvalidPlayerId(String),

    #[error("no such player: {0}")]
    UnknownPlayer(PlayerId),
}

/// All players of one lobby, keyed by seat.
///
/// Seats always form the dense prefix `P1..Pk` with `k >= 1`; only
/// [`LobbyDocument::add_player`] and [`LobbyDocument::remove_player`]
/// change the key set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LobbyDocument {
    players: BTreeMap<PlayerId, PlayerState>,
}

impl Default for LobbyDocument {
    fn default() -> Self {
        Self::with_players(DEFAULT_PLAYER_COUNT)
    }
}

impl LobbyDocument {
    /// Document with `count` fresh seats (at least one).
    pub fn with_players(count: u32) -> Self {
        let players = (1..=count.max(1))
            .filter_map(PlayerId::new)
            .map(|id| (id, PlayerState::new(id)))
            .collect();
        Self { players }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Always false for a well-formed document; provided for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerState> {
        self.players.get(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = (&PlayerId, &PlayerState)> {
        self.players.iter()
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    fn player_mut(&mut self, id: PlayerId) -> Result<&mut PlayerState, DocumentError> {
        self.players
            .get_mut(&id)
            .ok_or(DocumentError::UnknownPlayer(id))
    }

    fn next_id(&self) -> Option<PlayerId> {
        u32::try_from(self.players.len())
            .ok()
            .and_then(|n| n.checked_add(1))
            .and_then(PlayerId::new)
    }

    /// Append the next seat, `P{count+1}`, and return its id.
    pub fn add_player(&mut self) -> Option<PlayerId> {
        let id = self.next_id()?;
        self.players.insert(id, PlayerState::new(id));
        Some(id)
    }

    /// Drop the highest seat. Returns `None` when only one seat is left.
    pub fn remove_player(&mut self) -> Option<PlayerId> {
        if self.players.len() <= 1 {
            return None;
        }
        let (id, _) = self.players.pop_last()?;
        Some(id)
    }

    /// Reset every player's counters. Names are preserved.
    pub fn reset(&mut self) {
        self.players.values_mut().for_each(PlayerState::reset);
    }

    /// Apply a mutation in place.
    ///
    /// Validation happens before any write, so on `Err` the document is
    /// untouched.
    pub fn apply(&mut self, mutation: Mutation) -> Result<Outcome, DocumentError> {
        match mutation {
            Mutation::ChangeLife { player, delta } => {
                let state = self.player_mut(player)?;
                state.life = state.life.saturating_add(delta);
            }
            Mutation::ChangeCommanderDamage {
                player,
                opponent,
                delta,
            } => {
                if !self.contains(opponent) {
                    return Err(DocumentError::UnknownPlayer(opponent));
                }
                let state = self.player_mut(player)?;
                let damage = state.commander_damage.entry(opponent).or_insert(0);
                *damage = damage.saturating_add(delta);
            }
            Mutation::ChangePoison { player, delta } => {
                let state = self.player_mut(player)?;
                state.poison = state.poison.saturating_add(delta);
            }
            Mutation::Rename { player, name } => {
                self.player_mut(player)?.name = name;
            }
            Mutation::AddPlayer => {
                if self.add_player().is_none() {
                    return Ok(Outcome::Unchanged);
                }
            }
            Mutation::RemovePlayer => {
                if self.remove_player().is_none() {
                    return Ok(Outcome::Unchanged);
                }
            }
            Mutation::Reset => self.reset(),
        }
        Ok(Outcome::Changed)
    }
}
