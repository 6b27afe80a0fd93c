//! Presence identity and the per-match presence list.
//!
//! A presence is one live connection participating in a match, identified by
//! its `(node, session)` pair. The [`PresenceList`] is the only piece of
//! handler state with concurrent external readers: match cores may call
//! [`PresenceList::list`] or [`PresenceList::contains`] from other threads
//! while a callback is executing, so it carries its own reader/writer lock.
//! Everything else in the handler is touched only by the dispatcher.

use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The identity of one live connection inside a match.
///
/// Equality is structural on both fields. Two sessions with the same UUID on
/// different nodes are different presences.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresenceId {
    /// Name of the server node the session is connected to.
    pub node: String,
    /// The session's unique ID on that node.
    pub session_id: Uuid,
}

impl fmt::Display for PresenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.session_id, self.node)
    }
}

/// A participant joining or leaving a match.
///
/// Carries the user-facing fields alongside the identity; only
/// `(node, session_id)` participate in presence identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPresence {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub username: String,
    pub node: String,
    /// Whether data sent by this presence should be persisted server-side.
    #[serde(default)]
    pub persistence: bool,
    /// Optional free-form status string set by the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl MatchPresence {
    /// The `(node, session)` identity of this presence.
    pub fn presence_id(&self) -> PresenceId {
        PresenceId {
            node: self.node.clone(),
            session_id: self.session_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Stream identity
// ---------------------------------------------------------------------------

/// Pub/sub stream modes. The numeric values are stable across nodes — they
/// are compared and routed by integer, never by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum StreamMode {
    Notifications = 0,
    Status = 1,
    Channel = 2,
    Group = 3,
    DirectMessage = 4,
    /// A match whose state is relayed between peers.
    MatchRelayed = 5,
    /// A match whose state is owned and advanced server-side.
    MatchAuthoritative = 6,
}

/// The stream address collaborators use to reach one match:
/// `(mode = authoritative match, subject = match ID, label = node name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresenceStream {
    pub mode: StreamMode,
    pub subject: Uuid,
    pub label: String,
}

// ---------------------------------------------------------------------------
// PresenceList
// ---------------------------------------------------------------------------

/// The ordered set of presences currently in one match.
///
/// Join order is preserved; snapshots returned by [`list`](Self::list) are
/// independent copies that stay stable while the caller iterates. Writers
/// (the dispatcher) take the exclusive lock, readers share it.
#[derive(Debug, Default)]
pub struct PresenceList {
    presences: RwLock<Vec<PresenceId>>,
}

impl PresenceList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self {
            presences: RwLock::new(Vec::with_capacity(10)),
        }
    }

    /// Appends the identity of each joining presence.
    ///
    /// Callers gate admission before joining (the handler runs the match
    /// core's join-attempt decision first), so no deduplication happens
    /// here; duplicate inputs are tolerated and land as repeated entries,
    /// with the first occurrence winning for identity purposes.
    pub fn join(&self, joins: &[MatchPresence]) {
        let mut presences = self.presences.write();
        for join in joins {
            presences.push(join.presence_id());
        }
    }

    /// Removes the first entry matching each leaving presence.
    ///
    /// At most one entry is removed per input; inputs with no matching
    /// entry are silently ignored.
    pub fn leave(&self, leaves: &[MatchPresence]) {
        let mut presences = self.presences.write();
        for leave in leaves {
            if let Some(i) = presences
                .iter()
                .position(|p| p.session_id == leave.session_id && p.node == leave.node)
            {
                presences.remove(i);
            }
        }
    }

    /// Whether the given `(node, session)` pair is present.
    pub fn contains(&self, presence: &PresenceId) -> bool {
        self.presences
            .read()
            .iter()
            .any(|p| p.session_id == presence.session_id && p.node == presence.node)
    }

    /// An independent snapshot of the current presences, in join order.
    pub fn list(&self) -> Vec<PresenceId> {
        self.presences.read().clone()
    }

    /// Number of presences currently in the match.
    pub fn count(&self) -> usize {
        self.presences.read().len()
    }

    /// Whether the match currently has no presences.
    pub fn is_empty(&self) -> bool {
        self.presences.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presence(node: &str, session_id: Uuid) -> MatchPresence {
        MatchPresence {
            user_id: Uuid::new_v4(),
            session_id,
            username: "user".into(),
            node: node.into(),
            persistence: false,
            status: None,
        }
    }

    #[test]
    fn join_preserves_insertion_order() {
        let list = PresenceList::new();
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();
        let s3 = Uuid::new_v4();

        list.join(&[presence("n1", s1), presence("n1", s2)]);
        list.join(&[presence("n2", s3)]);

        let ids: Vec<Uuid> = list.list().iter().map(|p| p.session_id).collect();
        assert_eq!(ids, vec![s1, s2, s3]);
    }

    #[test]
    fn leave_removes_first_match_only() {
        let list = PresenceList::new();
        let s = Uuid::new_v4();

        // Duplicate joins are tolerated without corrupting the list.
        list.join(&[presence("n", s), presence("n", s)]);
        assert_eq!(list.count(), 2);

        list.leave(&[presence("n", s)]);
        assert_eq!(list.count(), 1);
        assert!(list.contains(&PresenceId {
            node: "n".into(),
            session_id: s
        }));
    }

    #[test]
    fn leave_of_missing_presence_is_ignored() {
        let list = PresenceList::new();
        list.join(&[presence("n", Uuid::new_v4())]);

        list.leave(&[presence("n", Uuid::new_v4())]);
        assert_eq!(list.count(), 1);
    }

    #[test]
    fn leave_matches_on_node_and_session() {
        let list = PresenceList::new();
        let s = Uuid::new_v4();
        list.join(&[presence("n1", s), presence("n2", s)]);

        // Same session ID, different node: only the n1 entry goes.
        list.leave(&[presence("n1", s)]);

        let remaining = list.list();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].node, "n2");
    }

    #[test]
    fn contains_distinguishes_nodes() {
        let list = PresenceList::new();
        let s = Uuid::new_v4();
        list.join(&[presence("n1", s)]);

        // A presence with the same session on a different node must not
        // count as present.
        assert!(list.contains(&PresenceId {
            node: "n1".into(),
            session_id: s
        }));
        assert!(!list.contains(&PresenceId {
            node: "n2".into(),
            session_id: s
        }));
    }

    #[test]
    fn list_returns_independent_snapshot() {
        let list = PresenceList::new();
        let s1 = Uuid::new_v4();
        list.join(&[presence("n", s1)]);

        let snapshot = list.list();
        list.leave(&[presence("n", s1)]);

        // The snapshot is unaffected by later mutations.
        assert_eq!(snapshot.len(), 1);
        assert!(list.is_empty());
    }

    #[test]
    fn join_leave_sequence_replays_onto_empty_list() {
        let list = PresenceList::new();
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();

        list.join(&[presence("n", s1), presence("n", s2)]);
        list.leave(&[presence("n", s1)]);

        assert_eq!(
            list.list(),
            vec![PresenceId {
                node: "n".into(),
                session_id: s2
            }]
        );
    }
}
