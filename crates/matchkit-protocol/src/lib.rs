//! Wire protocol for Matchkit's realtime match messages.
//!
//! This crate defines the external contract of the match runtime:
//!
//! - **Types** ([`Envelope`], [`MatchMessage`], [`UserPresence`],
//!   [`ErrorCode`]) — the structures that travel on the wire between
//!   clients and the server's realtime socket.
//! - **Codec** ([`Codec`], [`JsonCodec`]) — how those structures become
//!   bytes and back.
//! - **Errors** ([`ProtocolError`]) — what can go wrong at the boundary.
//!
//! The match runtime itself (`matchkit-runtime`) never serializes; layers
//! outside the runtime translate these envelopes into queue operations on a
//! match handler and translate the handler's replies back into envelopes.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{Envelope, ErrorCode, MatchJoinTarget, MatchMessage, UserPresence};
