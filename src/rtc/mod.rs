//! Client-side engine for a room's real-time features: the signaling
//! and negotiation core, presence heartbeats, last-write-wins text sync,
//! cursor broadcast and the moderation guard. Platform media APIs and
//! the transport sit behind traits so the whole engine runs hermetically
//! in tests.

pub mod cursor;
pub mod peer;
pub mod presence;
pub mod session;
pub mod signal;
pub mod transport;

use thiserror::Error;

/// Errors surfaced by the real-time engine
#[derive(Debug, Error)]
pub enum RtcError {
    #[error("media failure: {0}")]
    Media(String),
    #[error("transport failure: {0}")]
    Transport(String),
}
