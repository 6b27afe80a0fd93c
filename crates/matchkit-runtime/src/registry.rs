//! Collaborator contracts: the boundary interfaces the runtime is wired to.
//!
//! The runtime core owns one match; everything cross-match lives behind
//! these traits. The registry maps match IDs to handlers and is told about
//! label changes and removals. Tracker and router are referenced here for
//! the layers that construct match cores — cores use them to publish
//! presence changes and ship outbound frames — but the dispatcher itself
//! never calls them.

use uuid::Uuid;

use crate::{CoreError, PresenceId, PresenceStream};

/// The reply streamed back to a join-attempt caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchJoinResult {
    pub allow: bool,
    /// Rejection reason from the match core, if it gave one.
    pub reason: Option<String>,
    /// The match label at the time the decision was made.
    pub label: String,
}

impl MatchJoinResult {
    /// A denial carrying no reason and no label, used on every
    /// short-circuit path (cancelled caller, stopped or failed match).
    pub fn rejected() -> Self {
        Self {
            allow: false,
            reason: None,
            label: String::new(),
        }
    }
}

/// The cross-match registry.
///
/// Implementations must tolerate [`remove_match`](Self::remove_match) for a
/// match they no longer know: a match that stops itself races the registry's
/// own close path, and both sides may issue the removal.
pub trait MatchRegistry: Send + Sync + 'static {
    /// Publishes a new label for the match, making it visible to listings.
    fn update_match_label(&self, id: Uuid, label: &str) -> Result<(), CoreError>;

    /// Removes a stopped match from the registry.
    fn remove_match(&self, id: Uuid, stream: &PresenceStream);
}

/// Presence tracking across streams.
///
/// Match cores use this to publish their participants to the rest of the
/// cluster; the runtime only carries the contract.
pub trait Tracker: Send + Sync + 'static {
    /// Registers a presence on a stream. Returns `false` if the session is
    /// unknown to this node.
    fn track(&self, session_id: Uuid, stream: &PresenceStream, user_id: Uuid, username: &str)
        -> bool;

    /// Removes a presence from a stream. Unknown presences are ignored.
    fn untrack(&self, session_id: Uuid, stream: &PresenceStream, user_id: Uuid);

    /// Lists the presences currently tracked on a stream.
    fn list_by_stream(&self, stream: &PresenceStream) -> Vec<PresenceId>;
}

/// Outbound frame delivery.
///
/// Payloads are already-encoded wire bytes; the runtime never serializes.
pub trait MessageRouter: Send + Sync + 'static {
    /// Delivers a payload to every presence on a stream.
    fn send_to_stream(&self, stream: &PresenceStream, payload: &[u8]);

    /// Delivers a payload to a specific set of presences.
    fn send_to_presences(&self, presences: &[PresenceId], payload: &[u8]);
}
