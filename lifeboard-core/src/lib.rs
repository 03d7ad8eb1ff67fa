//! # lifeboard-core: shared table state
//!
//! The document every lobby holds: one [`PlayerState`] per seat, keyed by
//! [`PlayerId`], plus the [`Mutation`]s clients may apply to it.
//!
//! Nothing here is concurrent. Locking and fan-out live in
//! `lifeboard-collab`.

pub mod document;
pub mod mutation;
pub mod player;

pub use document::{DocumentError, LobbyDocument, DEFAULT_PLAYER_COUNT};
pub use mutation::{Mutation, Outcome};
pub use player::{PlayerId, PlayerState, STARTING_LIFE};
