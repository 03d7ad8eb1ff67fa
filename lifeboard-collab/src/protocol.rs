//! JSON event protocol spoken over the WebSocket.
//!
//! Every frame is a single JSON object tagged by its `event` field:
//! ```text
//! → {"event":"join","lobby":"squirrel"}
//! → {"event":"change","lobby":"squirrel","player":"P1","delta":-5}
//! ← {"event":"update","lobby":"squirrel","players":{"P1":{...},...}}
//! ← {"event":"error","kind":"invalid_player","message":"..."}
//! ```
//!
//! Outbound state is always the full document, never a delta.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use lifeboard_core::LobbyDocument;

/// A pre-encoded outbound text frame, shared between all receivers.
pub type Frame = Arc<str>;

/// Events sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Enter a lobby, creating it on first use.
    Join { lobby: String },
    /// Resolve a lobby key: echo the given one, or generate one when blank.
    CreateLobby {
        #[serde(default)]
        lobby: Option<String>,
    },
    Change {
        lobby: String,
        player: String,
        delta: i64,
    },
    ChangeCommanderDamage {
        lobby: String,
        identifier: String,
        #[serde(rename = "otherId")]
        other_id: String,
        delta: i64,
    },
    ChangePoison {
        lobby: String,
        player: String,
        delta: i64,
    },
    Rename {
        lobby: String,
        player: String,
        name: String,
    },
    AddPlayer { lobby: String },
    RemovePlayer { lobby: String },
    Reset { lobby: String },
}

impl ClientEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::CreateLobby { .. } => "create_lobby",
            Self::Change { .. } => "change",
            Self::ChangeCommanderDamage { .. } => "change_commander_damage",
            Self::ChangePoison { .. } => "change_poison",
            Self::Rename { .. } => "rename",
            Self::AddPlayer { .. } => "add_player",
            Self::RemovePlayer { .. } => "remove_player",
            Self::Reset { .. } => "reset",
        }
    }

    /// Decode a client text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }

    /// Encode as a text frame (used by clients and tests).
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }
}

/// Category of a rejected client event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRoom,
    InvalidPlayer,
    MalformedPayload,
    Internal,
}

/// Events sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full snapshot of a lobby, sent to every member.
    Update {
        lobby: String,
        players: LobbyDocument,
    },
    /// Rejection of the sender's last event. Sent to the sender only.
    Error { kind: ErrorKind, message: String },
    /// Reply to `create_lobby`.
    LobbyCreated { lobby: String },
    /// The lobby was reclaimed for inactivity.
    LobbyClosed { lobby: String },
}

impl ServerEvent {
    pub fn update(lobby: impl Into<String>, document: &LobbyDocument) -> Self {
        Self::Update {
            lobby: lobby.into(),
            players: document.clone(),
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Encode into a shareable frame for fan-out.
    pub fn to_frame(&self) -> Result<Frame, ProtocolError> {
        self.encode().map(Frame::from)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Binary frames are not supported")]
    BinaryFrame,
}
