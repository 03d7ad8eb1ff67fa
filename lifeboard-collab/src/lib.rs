//! # lifeboard-collab: Realtime lobby server for Lifeboard
//!
//! Keeps one authoritative [`LobbyDocument`](lifeboard_core::LobbyDocument)
//! per lobby in memory and pushes the whole document to every member of the
//! lobby after each accepted change.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   WebSocket (JSON)  ┌──────────────┐
//! │ Browser     │ ◄─────────────────► │ LobbyServer  │
//! │ (per seat)  │   {"event": ...}    │ (central)    │
//! └─────────────┘                     └──────┬───────┘
//!                                            │
//!                              ┌─────────────┼──────────────┐
//!                              ▼             ▼              ▼
//!                       MutationRouter  RoomBroadcaster  IdentifierGenerator
//!                              │             │
//!                              └──────┬──────┘
//!                                     ▼
//!                              ┌─────────────┐      ┌─────────────┐
//!                              │ LobbyStore  │ ◄─── │ LobbyReaper │
//!                              └─────────────┘      └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: JSON wire events
//! - [`store`]: Lobby registry with per-lobby locking
//! - [`broadcast`]: Room membership and fan-out
//! - [`router`]: Mutation event handlers
//! - [`naming`]: Human-readable lobby keys
//! - [`reaper`]: Idle lobby expiry
//! - [`server`]: WebSocket server

pub mod broadcast;
pub mod config;
pub mod error;
pub mod naming;
pub mod protocol;
pub mod reaper;
pub mod router;
pub mod server;
pub mod store;

// Re-exports for convenience
pub use broadcast::{BroadcastGroup, BroadcastStats, Membership, PeerInfo, RoomBroadcaster};
pub use config::{NamingConfig, ReaperConfig, ServerConfig};
pub use error::{NamingError, RouterError};
pub use naming::{IdentifierGenerator, NameSource, ScryfallSource};
pub use protocol::{ClientEvent, ErrorKind, Frame, ProtocolError, ServerEvent};
pub use reaper::{run_sweep, start_lobby_reaper};
pub use router::MutationRouter;
pub use server::{LobbyServer, ServerStats};
pub use store::{Lobby, LobbyStore};
