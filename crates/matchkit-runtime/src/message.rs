//! Inbound data frames delivered into a match.

use uuid::Uuid;

/// One data frame sent by a client into a match.
///
/// Built by the network ingress layer and enqueued through
/// [`MatchHandler::queue_data`](crate::MatchHandler::queue_data); immutable
/// from then on. The match loop drains these in per-tick batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchDataMessage {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub username: String,
    pub node: String,
    /// Application-defined operation code.
    pub op_code: i64,
    /// Opaque payload bytes.
    pub data: Vec<u8>,
    /// Wallclock receive time in unix nanoseconds, stamped at ingress.
    pub receive_time: i64,
}

impl MatchDataMessage {
    /// Data messages present a presence-shaped view to match logic; the
    /// sender of a data frame is never hidden.
    pub fn hidden(&self) -> bool {
        false
    }

    /// Data frames themselves are never persisted.
    pub fn persistence(&self) -> bool {
        false
    }

    /// Data frames carry no status string.
    pub fn status(&self) -> &str {
        ""
    }
}
