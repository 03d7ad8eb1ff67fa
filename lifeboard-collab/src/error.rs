//! Error types for routing events and naming lobbies.

use thiserror::Error;

use lifeboard_core::DocumentError;

use crate::protocol::{ErrorKind, ProtocolError};

/// Why a client event was rejected.
///
/// Reported to the originating connection only; the lobby is left as it
/// was and nothing is broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("no such lobby: {0:?}")]
    InvalidRoom(String),

    #[error("invalid player in lobby {lobby:?}: {source}")]
    InvalidPlayer {
        lobby: String,
        #[source]
        source: DocumentError,
    },

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("failed to encode update: {0}")]
    Encoding(#[from] ProtocolError),
}

impl RouterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRoom(_) => ErrorKind::InvalidRoom,
            Self::InvalidPlayer { .. } => ErrorKind::InvalidPlayer,
            Self::MalformedPayload(_) => ErrorKind::MalformedPayload,
            Self::Encoding(_) => ErrorKind::Internal,
        }
    }

    /// Text for the client-facing `error` event.
    ///
    /// With `verbose` off, details such as parser output stay server-side.
    pub fn client_message(&self, verbose: bool) -> String {
        if verbose {
            return self.to_string();
        }
        match self {
            Self::InvalidRoom(_) => "Lobby does not exist".to_string(),
            Self::InvalidPlayer { .. } => "Player does not exist".to_string(),
            Self::MalformedPayload(_) => "Malformed event".to_string(),
            Self::Encoding(_) => "Internal server error".to_string(),
        }
    }
}

/// Failures fetching a lobby name from the external source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingError {
    #[error("naming source request failed: {0}")]
    Request(String),

    #[error("naming source timed out")]
    Timeout,

    #[error("naming source returned HTTP {0}")]
    Status(u16),

    #[error("naming source returned an unusable name: {0:?}")]
    UnusableName(String),
}

impl From<reqwest::Error> for NamingError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if let Some(status) = e.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Request(e.to_string())
        }
    }
}
