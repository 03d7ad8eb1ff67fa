//! Discrete edits clients can make to a lobby document.

use crate::player::PlayerId;

/// A single edit to a [`LobbyDocument`](crate::LobbyDocument).
///
/// Applied with last-write-wins semantics; there is no merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// `life += delta`
    ChangeLife { player: PlayerId, delta: i64 },
    /// `commander_damage[opponent] += delta` on `player`
    ChangeCommanderDamage {
        player: PlayerId,
        opponent: PlayerId,
        delta: i64,
    },
    /// `poison += delta`
    ChangePoison { player: PlayerId, delta: i64 },
    Rename { player: PlayerId, name: String },
    AddPlayer,
    RemovePlayer,
    Reset,
}

impl Mutation {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChangeLife { .. } => "change",
            Self::ChangeCommanderDamage { .. } => "change_commander_damage",
            Self::ChangePoison { .. } => "change_poison",
            Self::Rename { .. } => "rename",
            Self::AddPlayer => "add_player",
            Self::RemovePlayer => "remove_player",
            Self::Reset => "reset",
        }
    }
}

/// Whether applying a mutation changed the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Changed,
    /// Valid but had no effect, e.g. removing the last seat.
    Unchanged,
}
