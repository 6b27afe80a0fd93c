//! The `MatchCore` trait — the contract between the runtime and user match
//! logic.
//!
//! A match core is the user-scriptable half of a match: it decides
//! admissions, advances the simulation each tick, and reacts to joins,
//! leaves, and termination. The runtime guarantees every callback is
//! invoked serially by a single dispatcher task; the core sees a
//! single-threaded view of its state and the current tick.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{MatchDataMessage, MatchPresence, PresenceList};

/// The user match state, owned exclusively by the dispatcher.
///
/// The runtime never inspects it — every callback consumes the current
/// state and returns the next one, which replaces it atomically.
pub type MatchState = Box<dyn Any + Send>;

/// Errors surfaced by match core callbacks.
///
/// Cores are user code; the runtime does not constrain what can go wrong,
/// it only reacts: any callback error stops the affected match in
/// isolation.
pub type CoreError = Box<dyn std::error::Error + Send + Sync>;

/// What a successful [`MatchCore::match_init`] produces.
pub struct MatchInit {
    /// The initial match state.
    pub state: MatchState,
    /// Tick rate in Hz, fixed for the lifetime of the match.
    pub rate_hz: u32,
    /// The match's initial label, registered for listing/matchmaking.
    pub label: String,
}

/// The admission decision for one join attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinVerdict {
    pub allow: bool,
    /// Optional human-readable rejection reason, relayed to the client.
    pub reason: Option<String>,
}

impl JoinVerdict {
    /// Admit the candidate.
    pub fn allow() -> Self {
        Self {
            allow: true,
            reason: None,
        }
    }

    /// Reject the candidate with a reason.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allow: false,
            reason: Some(reason.into()),
        }
    }
}

/// A candidate participant awaiting an admission decision.
#[derive(Debug, Clone)]
pub struct JoinAttemptRequest {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub username: String,
    pub node: String,
    /// Opaque per-join metadata from the client's join message.
    pub metadata: HashMap<String, String>,
}

/// Consume-only view over a match's data queue, handed to
/// [`MatchCore::match_loop`].
///
/// Pulls are non-blocking: [`next`](Iterator::next) returns `None` as soon
/// as the queue is momentarily empty, so a loop callback drains exactly the
/// batch that was buffered when (and while) it runs. Messages left undrained
/// stay queued for the next tick. Only the dispatcher ever sees the channel
/// itself.
pub struct DataDrain<'a> {
    rx: &'a mut mpsc::Receiver<MatchDataMessage>,
}

impl<'a> DataDrain<'a> {
    pub(crate) fn new(rx: &'a mut mpsc::Receiver<MatchDataMessage>) -> Self {
        Self { rx }
    }
}

impl Iterator for DataDrain<'_> {
    type Item = MatchDataMessage;

    fn next(&mut self) -> Option<MatchDataMessage> {
        self.rx.try_recv().ok()
    }
}

/// User-supplied match logic.
///
/// # Call discipline
///
/// All callbacks except [`cancel`](Self::cancel) are invoked serially on
/// the match's dispatcher task — implementations never see two callbacks
/// running at once and may keep per-match invariants without locking.
/// `cancel` is the exception: it is the runtime-resource release hook,
/// invoked exactly once when the match stops, possibly from another thread
/// and possibly while a callback is still executing.
///
/// # State handling
///
/// Every callback consumes the current [`MatchState`] and returns the next
/// one. Returning `Ok(None)` is the cooperative termination signal: the
/// runtime stops the match. Returning `Err` also stops the match — the
/// runtime never attempts to recover from a failed core.
///
/// Implementations must not retain the presence slices or the
/// [`DataDrain`] past the call.
pub trait MatchCore: Send + Sync + 'static {
    /// Creates the initial state. Invoked once, before the dispatcher
    /// starts. Failure aborts match construction.
    fn match_init(
        &self,
        presences: Arc<PresenceList>,
        params: serde_json::Map<String, serde_json::Value>,
    ) -> Result<MatchInit, CoreError>;

    /// Advances the match by one tick, draining whatever data frames are
    /// currently buffered.
    fn match_loop(
        &self,
        tick: u64,
        state: MatchState,
        data: &mut DataDrain<'_>,
    ) -> Result<Option<MatchState>, CoreError>;

    /// Decides whether a candidate participant may join.
    ///
    /// `Ok(None)` and `Err` both stop the match *and* deny the candidate.
    fn match_join_attempt(
        &self,
        tick: u64,
        state: MatchState,
        request: &JoinAttemptRequest,
    ) -> Result<Option<(MatchState, JoinVerdict)>, CoreError>;

    /// Notifies the core that admitted participants have joined. The
    /// presence list already reflects them when this runs.
    fn match_join(
        &self,
        tick: u64,
        state: MatchState,
        joins: &[MatchPresence],
    ) -> Result<Option<MatchState>, CoreError>;

    /// Notifies the core that participants have left. The presence list
    /// already reflects the removals when this runs.
    fn match_leave(
        &self,
        tick: u64,
        state: MatchState,
        leaves: &[MatchPresence],
    ) -> Result<Option<MatchState>, CoreError>;

    /// Informs the core the match is being terminated. With a grace period
    /// of zero the runtime stops the match immediately after this returns;
    /// otherwise the match keeps running until closed externally.
    fn match_terminate(
        &self,
        tick: u64,
        state: MatchState,
        grace_seconds: u64,
    ) -> Result<Option<MatchState>, CoreError>;

    /// Releases any runtime resources the core holds (script contexts,
    /// router subscriptions). Invoked exactly once when the match stops.
    fn cancel(&self);
}
