//! Authoritative realtime match runtime.
//!
//! Each match runs as an isolated Tokio task (actor model): a single-writer
//! dispatcher owns the opaque match state and serializes every mutation —
//! ticks, inbound data, joins, leaves, admission decisions, termination —
//! onto a user-supplied [`MatchCore`]. Producers communicate through
//! bounded queues with explicit per-queue backpressure policies, so one
//! hostile or overloaded match degrades (or stops) in isolation.
//!
//! The entry point is [`MatchHandler::spawn`]; everything cross-match lives
//! behind the collaborator traits in [`MatchRegistry`], [`Tracker`], and
//! [`MessageRouter`].

mod config;
mod core;
mod error;
mod handler;
mod message;
mod presence;
mod registry;

pub use config::MatchConfig;
pub use self::core::{
    CoreError, DataDrain, JoinAttemptRequest, JoinVerdict, MatchCore, MatchInit, MatchState,
};
pub use error::MatchError;
pub use handler::MatchHandler;
pub use message::MatchDataMessage;
pub use presence::{MatchPresence, PresenceId, PresenceList, PresenceStream, StreamMode};
pub use registry::{MatchJoinResult, MatchRegistry, MessageRouter, Tracker};
