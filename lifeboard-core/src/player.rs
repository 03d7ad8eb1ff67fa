//! Player identifiers and per-player counters.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::document::DocumentError;

/// Starting life total for every player.
pub const STARTING_LIFE: i64 = 40;

/// Player identifier, `P1`..`Pn`.
///
/// Stored as its 1-based ordinal so that ordering is numeric
/// (`P2 < P10`). Serialized as the `P{n}` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayerId(u32);

impl PlayerId {
    /// Create from a 1-based ordinal. Returns `None` for zero.
    pub fn new(ordinal: u32) -> Option<Self> {
        if ordinal == 0 {
            None
        } else {
            Some(Self(ordinal))
        }
    }

    pub fn ordinal(&self) -> u32 {
        self.0
    }

    /// Default display name for this seat.
    pub fn default_name(&self) -> String {
        format!("Player {}", self.0)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl FromStr for PlayerId {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix('P')
            .ok_or_else(|| DocumentError::InvalidPlayerId(s.to_string()))?;
        // Reject signs and leading zeros so that every id has one spelling.
        if digits.is_empty()
            || digits.starts_with('0')
            || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(DocumentError::InvalidPlayerId(s.to_string()));
        }
        digits
            .parse::<u32>()
            .ok()
            .and_then(PlayerId::new)
            .ok_or_else(|| DocumentError::InvalidPlayerId(s.to_string()))
    }
}

impl Serialize for PlayerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PlayerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PlayerIdVisitor;

        impl Visitor<'_> for PlayerIdVisitor {
            type Value = PlayerId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a player identifier such as \"P1\"")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<PlayerId, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(PlayerIdVisitor)
    }
}

/// Counters for a single seat at the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub life: i64,
    pub name: String,
    /// Damage received from each opposing commander, keyed by the opponent.
    pub commander_damage: BTreeMap<PlayerId, i64>,
    pub poison: i64,
}

impl PlayerState {
    /// Fresh state for the given seat.
    pub fn new(id: PlayerId) -> Self {
        Self {
            life: STARTING_LIFE,
            name: id.default_name(),
            commander_damage: BTreeMap::new(),
            poison: 0,
        }
    }

    /// Restore counters to their starting values. The name is kept.
    pub fn reset(&mut self) {
        self.life = STARTING_LIFE;
        self.commander_damage.clear();
        self.poison = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_id_display_and_parse() {
        let id: PlayerId = "P12".parse().unwrap();
        assert_eq!(id.ordinal(), 12);
        assert_eq!(id.to_string(), "P12");
    }

    #[test]
    fn test_player_id_rejects_garbage() {
        for bad in ["", "P", "P0", "p1", "P01", "P-1", "P+1", "Q1", "P1x", "P99999999999"] {
            assert!(bad.parse::<PlayerId>().is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn test_player_id_numeric_ordering() {
        let p2: PlayerId = "P2".parse().unwrap();
        let p10: PlayerId = "P10".parse().unwrap();
        assert!(p2 < p10);
    }

    #[test]
    fn test_player_id_serde_as_string() {
        let id = PlayerId::new(3).unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"P3\"");
        let back: PlayerId = serde_json::from_str("\"P3\"").unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<PlayerId>("3").is_err());
    }

    #[test]
    fn test_new_player_defaults() {
        let state = PlayerState::new(PlayerId::new(5).unwrap());
        assert_eq!(state.life, 40);
        assert_eq!(state.name, "Player 5");
        assert!(state.commander_damage.is_empty());
        assert_eq!(state.poison, 0);
    }

    #[test]
    fn test_reset_keeps_name() {
        let mut state = PlayerState::new(PlayerId::new(1).unwrap());
        state.life = 3;
        state.poison = 9;
        state.name = "Atraxa".to_string();
        state.commander_damage.insert(PlayerId::new(2).unwrap(), 21);

        state.reset();
        assert_eq!(state.life, 40);
        assert_eq!(state.poison, 0);
        assert!(state.commander_damage.is_empty());
        assert_eq!(state.name, "Atraxa");
    }
}
