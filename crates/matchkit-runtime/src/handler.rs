//! Match handler: the per-match scheduler and state-ownership boundary.
//!
//! Each match runs as an isolated Tokio task — a single-writer dispatcher
//! that owns the opaque match state and serializes every mutation onto the
//! [`MatchCore`]: the tick loop, inbound data, joins, leaves, admission
//! decisions, and termination. Producers (network ingress, the registry)
//! talk to the dispatcher exclusively through bounded queues and never
//! block; what happens when a queue fills is a per-queue policy:
//!
//! | queue        | full policy                                |
//! |--------------|--------------------------------------------|
//! | data         | drop the new message, warn                 |
//! | call         | stop the match (it cannot keep pace)       |
//! | join attempt | reject the admission, match unaffected     |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use matchkit_tick::{TickConfig, Ticker};

use crate::{
    DataDrain, JoinAttemptRequest, MatchConfig, MatchCore, MatchDataMessage, MatchError,
    MatchInit, MatchJoinResult, MatchPresence, MatchRegistry, MatchState, PresenceList,
    PresenceStream, StreamMode,
};

// ---------------------------------------------------------------------------
// Queue payloads
// ---------------------------------------------------------------------------

/// An operation bound for the call queue. Ticks, joins, leaves, and
/// terminates all flow through here; join attempts have their own queue so
/// admission pressure can't kill a healthy match.
enum MatchCall {
    Loop,
    Join(Vec<MatchPresence>),
    Leave(Vec<MatchPresence>),
    Terminate { grace_seconds: u64 },
}

/// A queued admission decision.
struct JoinAttempt {
    request: JoinAttemptRequest,
    /// Caller-supplied cancellation: if the client goes away between
    /// enqueue and dispatch, the decision is skipped entirely.
    ctx: CancellationToken,
    reply: oneshot::Sender<MatchJoinResult>,
}

// ---------------------------------------------------------------------------
// MatchHandler
// ---------------------------------------------------------------------------

/// State shared between the handler handles and the dispatcher.
struct Shared {
    id: Uuid,
    node: String,
    id_str: String,
    stream: PresenceStream,
    rate_hz: u32,
    label: RwLock<String>,
    /// Written once via compare-and-set in [`MatchHandler::close`]; read
    /// everywhere to gate enqueues and in-flight calls.
    stopped: AtomicBool,
    presence_list: Arc<PresenceList>,
    core: Arc<dyn MatchCore>,
    registry: Arc<dyn MatchRegistry>,
    input_tx: mpsc::Sender<MatchDataMessage>,
    call_tx: mpsc::Sender<MatchCall>,
    join_attempt_tx: mpsc::Sender<JoinAttempt>,
    stop_tx: watch::Sender<bool>,
}

/// Handle to a running match. Cheap to clone; the registry holds one per
/// match, network ingress holds others.
///
/// All operations return quickly and are safe to call concurrently. The
/// `queue_*` family reports enqueue success — once one returns `true`, the
/// operation is durably queued (though the match may still stop before it
/// is dispatched).
#[derive(Clone)]
pub struct MatchHandler {
    shared: Arc<Shared>,
}

impl MatchHandler {
    /// Creates a match and starts its dispatcher task.
    ///
    /// Runs the core's init callback synchronously: the core produces the
    /// initial state, tick rate, and label, the label is registered, and
    /// only then is the dispatcher spawned. On any init failure the core is
    /// cancelled and no handler exists.
    ///
    /// Must be called within a Tokio runtime.
    pub fn spawn(
        config: &MatchConfig,
        registry: Arc<dyn MatchRegistry>,
        core: Arc<dyn MatchCore>,
        id: Uuid,
        node: impl Into<String>,
        params: serde_json::Map<String, serde_json::Value>,
    ) -> Result<MatchHandler, MatchError> {
        let node = node.into();
        let presence_list = Arc::new(PresenceList::new());

        let MatchInit {
            state,
            rate_hz,
            label,
        } = match core.match_init(Arc::clone(&presence_list), params) {
            Ok(init) => init,
            Err(e) => {
                core.cancel();
                return Err(MatchError::Init(e));
            }
        };

        if let Err(e) = registry.update_match_label(id, &label) {
            core.cancel();
            return Err(MatchError::LabelRegistration(e));
        }

        let config = config.clone().validated();
        let ticker = Ticker::new(TickConfig::with_rate(rate_hz));

        let (input_tx, input_rx) = mpsc::channel(config.input_queue_size);
        let (call_tx, call_rx) = mpsc::channel(config.call_queue_size);
        let (join_attempt_tx, join_attempt_rx) = mpsc::channel(config.join_attempt_queue_size);
        let (stop_tx, stop_rx) = watch::channel(false);

        let handler = MatchHandler {
            shared: Arc::new(Shared {
                id,
                id_str: format!("{id}.{node}"),
                stream: PresenceStream {
                    mode: StreamMode::MatchAuthoritative,
                    subject: id,
                    label: node.clone(),
                },
                node,
                rate_hz: ticker.rate_hz(),
                label: RwLock::new(label),
                stopped: AtomicBool::new(false),
                presence_list,
                core,
                registry,
                input_tx,
                call_tx,
                join_attempt_tx,
                stop_tx,
            }),
        };

        let dispatcher = Dispatcher {
            handler: handler.clone(),
            state: Some(state),
            tick: 0,
            ticker,
            input_rx,
            call_rx,
            join_attempt_rx,
            stop_rx,
        };
        tokio::spawn(dispatcher.run());

        info!(
            match_id = %handler.shared.id_str,
            rate_hz = handler.shared.rate_hz,
            "match started"
        );

        Ok(handler)
    }

    // -- Identity ----------------------------------------------------------

    /// The match UUID.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// The node this match runs on.
    pub fn node(&self) -> &str {
        &self.shared.node
    }

    /// The composite `"{uuid}.{node}"` match ID used on the wire.
    pub fn id_str(&self) -> &str {
        &self.shared.id_str
    }

    /// The stream address collaborators use to reach this match.
    pub fn stream(&self) -> &PresenceStream {
        &self.shared.stream
    }

    /// The tick rate fixed at init.
    pub fn rate_hz(&self) -> u32 {
        self.shared.rate_hz
    }

    /// The current match label.
    pub fn label(&self) -> String {
        self.shared.label.read().clone()
    }

    /// The match's presence list.
    pub fn presence_list(&self) -> &Arc<PresenceList> {
        &self.shared.presence_list
    }

    /// Whether the match has stopped. Once `true` it never reverts.
    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    // -- Producers ---------------------------------------------------------

    /// Enqueues an inbound data frame for the next match loop.
    ///
    /// Data is lossy under overload: if the queue is full the message is
    /// dropped with a warning and the match keeps running. No-op once the
    /// match has stopped.
    pub fn queue_data(&self, message: MatchDataMessage) {
        if self.is_stopped() {
            return;
        }

        match self.shared.input_tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(
                    match_id = %self.shared.id_str,
                    "match data processing too slow, dropping data message"
                );
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Enqueues an admission decision for a candidate participant.
    ///
    /// The decision is streamed to `reply` once dispatched; if `ctx` is
    /// cancelled before then, the reply is `{allow: false}` and the core is
    /// never consulted. Returns `false` without affecting match health when
    /// the join-attempt queue is full or the match has stopped — in both
    /// cases nothing is ever sent on `reply`.
    pub fn queue_join_attempt(
        &self,
        ctx: CancellationToken,
        reply: oneshot::Sender<MatchJoinResult>,
        request: JoinAttemptRequest,
    ) -> bool {
        if self.is_stopped() {
            return false;
        }

        match self.shared.join_attempt_tx.try_send(JoinAttempt {
            request,
            ctx,
            reply,
        }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                // Admission pressure, not a processing-speed problem: the
                // match is not closed for these.
                warn!(match_id = %self.shared.id_str, "match join attempt queue full");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Enqueues a notification that admitted participants have joined.
    pub fn queue_join(&self, joins: Vec<MatchPresence>) -> bool {
        self.queue_call(MatchCall::Join(joins))
    }

    /// Enqueues a notification that participants have left.
    pub fn queue_leave(&self, leaves: Vec<MatchPresence>) -> bool {
        self.queue_call(MatchCall::Leave(leaves))
    }

    /// Schedules termination. With `grace_seconds == 0` the match stops
    /// immediately after the terminate callback returns; otherwise the
    /// callback is informed and the match keeps running until the registry
    /// issues a final close.
    pub fn queue_terminate(&self, grace_seconds: u64) -> bool {
        self.queue_call(MatchCall::Terminate { grace_seconds })
    }

    /// Enqueues onto the call queue. A full call queue means the core
    /// cannot keep pace with its own tick rate — the match is unhealthy and
    /// is stopped.
    fn queue_call(&self, call: MatchCall) -> bool {
        if self.is_stopped() {
            return false;
        }

        match self.shared.call_tx.try_send(call) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    match_id = %self.shared.id_str,
                    "match call processing too slow, closing match"
                );
                self.stop();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    // -- Lifecycle ---------------------------------------------------------

    /// Stops the match. Idempotent: only the first call has any effect.
    ///
    /// Flips `stopped` (gating all enqueues and in-flight calls), cancels
    /// the core exactly once, and signals the dispatcher to exit, which
    /// releases the ticker and the queues. No core callback runs after
    /// `close` returns.
    pub fn close(&self) {
        if self
            .shared
            .stopped
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        self.shared.core.cancel();
        let _ = self.shared.stop_tx.send(true);

        info!(match_id = %self.shared.id_str, "match stopped");
    }

    /// [`close`](Self::close) plus removal from the registry. Used when an
    /// internal match process (or error) requires the match to stop.
    pub fn stop(&self) {
        self.close();
        self.shared
            .registry
            .remove_match(self.shared.id, &self.shared.stream);
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// The single-writer task behind a match handler.
///
/// Owns the opaque state, the tick counter, and the queue receivers. Runs
/// until the stop signal fires or a tick can no longer be enqueued.
struct Dispatcher {
    handler: MatchHandler,
    /// `None` only transiently while a callback holds the state, or after
    /// a failed callback consumed it on the way to stopping.
    state: Option<MatchState>,
    /// Advances only after a successful loop callback; every other callback
    /// observes the tick at which it is serviced.
    tick: u64,
    ticker: Ticker,
    input_rx: mpsc::Receiver<MatchDataMessage>,
    call_rx: mpsc::Receiver<MatchCall>,
    join_attempt_rx: mpsc::Receiver<JoinAttempt>,
    stop_rx: watch::Receiver<bool>,
}

impl Dispatcher {
    async fn run(mut self) {
        loop {
            // Deliberately unbiased: joins, leaves, terminates, and ticks
            // interleave naturally among ready branches. Starvation is
            // bounded by the queue capacities.
            tokio::select! {
                _ = self.stop_rx.changed() => break,
                _ = self.ticker.wait() => {
                    if !self.handler.queue_call(MatchCall::Loop) {
                        break;
                    }
                }
                Some(call) = self.call_rx.recv() => self.dispatch(call),
                Some(attempt) = self.join_attempt_rx.recv() => self.join_attempt(attempt),
            }
        }

        debug!(match_id = %self.handler.shared.id_str, "match dispatcher exited");
    }

    /// `close` may have run between enqueue and dispatch; every dequeued
    /// operation re-checks before touching state.
    fn stopped(&self) -> bool {
        self.handler.is_stopped()
    }

    fn dispatch(&mut self, call: MatchCall) {
        if self.stopped() {
            return;
        }

        match call {
            MatchCall::Loop => self.run_loop(),
            MatchCall::Join(joins) => self.run_join(joins),
            MatchCall::Leave(leaves) => self.run_leave(leaves),
            MatchCall::Terminate { grace_seconds } => self.run_terminate(grace_seconds),
        }
    }

    fn run_loop(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };

        let core = Arc::clone(&self.handler.shared.core);
        let result = {
            let mut drain = DataDrain::new(&mut self.input_rx);
            core.match_loop(self.tick, state, &mut drain)
        };

        match result {
            Err(e) => {
                self.handler.stop();
                warn!(
                    match_id = %self.handler.shared.id_str,
                    tick = self.tick,
                    error = %e,
                    "stopping match after error from match loop execution"
                );
            }
            Ok(None) => {
                self.handler.stop();
                info!(
                    match_id = %self.handler.shared.id_str,
                    tick = self.tick,
                    "match loop returned no state, stopping match"
                );
            }
            Ok(Some(state)) => {
                self.state = Some(state);
                self.tick += 1;
            }
        }
    }

    fn run_join(&mut self, joins: Vec<MatchPresence>) {
        let Some(state) = self.state.take() else {
            return;
        };

        self.handler.shared.presence_list.join(&joins);

        let core = Arc::clone(&self.handler.shared.core);
        match core.match_join(self.tick, state, &joins) {
            Err(e) => {
                self.handler.stop();
                warn!(
                    match_id = %self.handler.shared.id_str,
                    tick = self.tick,
                    error = %e,
                    "stopping match after error from match join execution"
                );
            }
            Ok(None) => {
                self.handler.stop();
                info!(
                    match_id = %self.handler.shared.id_str,
                    tick = self.tick,
                    "match join returned no state, stopping match"
                );
            }
            Ok(Some(state)) => self.state = Some(state),
        }
    }

    fn run_leave(&mut self, leaves: Vec<MatchPresence>) {
        let Some(state) = self.state.take() else {
            return;
        };

        self.handler.shared.presence_list.leave(&leaves);

        let core = Arc::clone(&self.handler.shared.core);
        match core.match_leave(self.tick, state, &leaves) {
            Err(e) => {
                self.handler.stop();
                warn!(
                    match_id = %self.handler.shared.id_str,
                    tick = self.tick,
                    error = %e,
                    "stopping match after error from match leave execution"
                );
            }
            Ok(None) => {
                self.handler.stop();
                info!(
                    match_id = %self.handler.shared.id_str,
                    tick = self.tick,
                    "match leave returned no state, stopping match"
                );
            }
            Ok(Some(state)) => self.state = Some(state),
        }
    }

    fn run_terminate(&mut self, grace_seconds: u64) {
        let Some(state) = self.state.take() else {
            return;
        };

        let core = Arc::clone(&self.handler.shared.core);
        match core.match_terminate(self.tick, state, grace_seconds) {
            Err(e) => {
                self.handler.stop();
                warn!(
                    match_id = %self.handler.shared.id_str,
                    tick = self.tick,
                    error = %e,
                    "stopping match after error from match terminate execution"
                );
            }
            Ok(None) => {
                self.handler.stop();
                info!(
                    match_id = %self.handler.shared.id_str,
                    tick = self.tick,
                    "match terminate returned no state, stopping match"
                );
            }
            Ok(Some(state)) => {
                self.state = Some(state);

                // A zero grace period ends the match immediately after the
                // callback has been informed.
                if grace_seconds == 0 {
                    self.handler.stop();
                }
            }
        }
    }

    fn join_attempt(&mut self, attempt: JoinAttempt) {
        let JoinAttempt {
            request,
            ctx,
            reply,
        } = attempt;

        // The client may have gone away between when this was queued and
        // when it's due for processing: don't consult the core at all.
        if ctx.is_cancelled() {
            let _ = reply.send(MatchJoinResult::rejected());
            return;
        }

        if self.stopped() {
            let _ = reply.send(MatchJoinResult::rejected());
            return;
        }

        let Some(state) = self.state.take() else {
            let _ = reply.send(MatchJoinResult::rejected());
            return;
        };

        let core = Arc::clone(&self.handler.shared.core);
        match core.match_join_attempt(self.tick, state, &request) {
            Err(e) => {
                self.handler.stop();
                warn!(
                    match_id = %self.handler.shared.id_str,
                    tick = self.tick,
                    error = %e,
                    "stopping match after error from match join attempt execution"
                );
                let _ = reply.send(MatchJoinResult::rejected());
            }
            Ok(None) => {
                self.handler.stop();
                info!(
                    match_id = %self.handler.shared.id_str,
                    tick = self.tick,
                    "match join attempt returned no state, stopping match"
                );
                let _ = reply.send(MatchJoinResult::rejected());
            }
            Ok(Some((state, verdict))) => {
                self.state = Some(state);
                let _ = reply.send(MatchJoinResult {
                    allow: verdict.allow,
                    reason: verdict.reason,
                    label: self.handler.label(),
                });
            }
        }
    }
}
