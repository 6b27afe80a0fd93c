//! A runnable end-to-end demo of the match runtime.
//!
//! Spins up one authoritative match whose core echoes every inbound data
//! frame back to all presences, drives it through the public handler
//! surface (join attempt → join → data → leave → terminate), and prints
//! what the router would put on the wire.
//!
//! ```bash
//! RUST_LOG=debug cargo run -p echo-match
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use matchkit_protocol::{Codec, Envelope, JsonCodec, MatchMessage, UserPresence};
use matchkit_runtime::{
    CoreError, DataDrain, JoinAttemptRequest, JoinVerdict, MatchConfig, MatchCore,
    MatchDataMessage, MatchHandler, MatchInit, MatchPresence, MatchRegistry, MatchState,
    MessageRouter, PresenceId, PresenceList, PresenceStream,
};

// ---------------------------------------------------------------------------
// Collaborators: a registry and router that print what they're told.
// ---------------------------------------------------------------------------

struct LoggingRegistry;

impl MatchRegistry for LoggingRegistry {
    fn update_match_label(&self, id: Uuid, label: &str) -> Result<(), CoreError> {
        tracing::info!(match_id = %id, label, "registry: label updated");
        Ok(())
    }

    fn remove_match(&self, id: Uuid, _stream: &PresenceStream) {
        tracing::info!(match_id = %id, "registry: match removed");
    }
}

/// Prints outbound frames instead of shipping them to sockets.
struct StdoutRouter {
    sent: Mutex<usize>,
}

impl MessageRouter for StdoutRouter {
    fn send_to_stream(&self, stream: &PresenceStream, payload: &[u8]) {
        *self.sent.lock().unwrap() += 1;
        println!(
            "→ stream {}: {}",
            stream.subject,
            String::from_utf8_lossy(payload)
        );
    }

    fn send_to_presences(&self, presences: &[PresenceId], payload: &[u8]) {
        *self.sent.lock().unwrap() += presences.len();
        for p in presences {
            println!("→ {p}: {}", String::from_utf8_lossy(payload));
        }
    }
}

// ---------------------------------------------------------------------------
// The echo core
// ---------------------------------------------------------------------------

struct EchoState {
    frames_seen: u64,
}

/// Echoes every inbound frame back to all current presences as a
/// `MatchData` envelope.
struct EchoCore {
    router: Arc<StdoutRouter>,
    codec: JsonCodec,
}

impl EchoCore {
    fn echo(&self, match_id: &str, presences: &[PresenceId], msg: &MatchDataMessage) {
        let envelope = Envelope::new(MatchMessage::MatchData {
            match_id: match_id.to_string(),
            presence: UserPresence {
                user_id: msg.user_id,
                session_id: msg.session_id,
                username: msg.username.clone(),
                persistence: msg.persistence(),
                status: None,
            },
            op_code: msg.op_code,
            data: msg.data.clone(),
        });
        match self.codec.encode(&envelope) {
            Ok(bytes) => self.router.send_to_presences(presences, &bytes),
            Err(e) => tracing::warn!(error = %e, "failed to encode echo frame"),
        }
    }
}

struct EchoHandle {
    presences: Arc<PresenceList>,
    match_id: String,
}

impl MatchCore for EchoCore {
    fn match_init(
        &self,
        presences: Arc<PresenceList>,
        params: serde_json::Map<String, serde_json::Value>,
    ) -> Result<MatchInit, CoreError> {
        let label = params
            .get("label")
            .and_then(|v| v.as_str())
            .unwrap_or("echo")
            .to_string();

        // The match ID isn't known until the handler exists; the echo core
        // only needs a display name, so it derives one from the label.
        let handle = EchoHandle {
            presences,
            match_id: format!("echo:{label}"),
        };

        Ok(MatchInit {
            state: Box::new((handle, EchoState { frames_seen: 0 })),
            rate_hz: 5,
            label,
        })
    }

    fn match_loop(
        &self,
        tick: u64,
        state: MatchState,
        data: &mut DataDrain<'_>,
    ) -> Result<Option<MatchState>, CoreError> {
        let mut boxed = state
            .downcast::<(EchoHandle, EchoState)>()
            .map_err(|_| "unexpected state type")?;
        let (handle, echo) = &mut *boxed;

        let snapshot = handle.presences.list();
        for msg in data {
            echo.frames_seen += 1;
            tracing::debug!(tick, op_code = msg.op_code, "echoing frame");
            self.echo(&handle.match_id, &snapshot, &msg);
        }

        Ok(Some(boxed as MatchState))
    }

    fn match_join_attempt(
        &self,
        tick: u64,
        state: MatchState,
        request: &JoinAttemptRequest,
    ) -> Result<Option<(MatchState, JoinVerdict)>, CoreError> {
        tracing::info!(tick, username = %request.username, "join attempt");
        Ok(Some((state, JoinVerdict::allow())))
    }

    fn match_join(
        &self,
        tick: u64,
        state: MatchState,
        joins: &[MatchPresence],
    ) -> Result<Option<MatchState>, CoreError> {
        for join in joins {
            tracing::info!(tick, username = %join.username, "joined");
        }
        Ok(Some(state))
    }

    fn match_leave(
        &self,
        tick: u64,
        state: MatchState,
        leaves: &[MatchPresence],
    ) -> Result<Option<MatchState>, CoreError> {
        for leave in leaves {
            tracing::info!(tick, username = %leave.username, "left");
        }
        Ok(Some(state))
    }

    fn match_terminate(
        &self,
        tick: u64,
        state: MatchState,
        grace_seconds: u64,
    ) -> Result<Option<MatchState>, CoreError> {
        let boxed = state
            .downcast::<(EchoHandle, EchoState)>()
            .map_err(|_| "unexpected state type")?;
        tracing::info!(
            tick,
            grace_seconds,
            frames_seen = boxed.1.frames_seen,
            "terminating"
        );
        Ok(Some(boxed as MatchState))
    }

    fn cancel(&self) {
        tracing::info!("echo core cancelled");
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let router = Arc::new(StdoutRouter {
        sent: Mutex::new(0),
    });
    let core = Arc::new(EchoCore {
        router: Arc::clone(&router),
        codec: JsonCodec,
    });

    let mut params = serde_json::Map::new();
    params.insert("label".into(), serde_json::Value::from("lobby-1"));

    let handler = MatchHandler::spawn(
        &MatchConfig::default(),
        Arc::new(LoggingRegistry),
        core,
        Uuid::new_v4(),
        "node1",
        params,
    )
    .expect("match should start");

    println!("match {} running at {} Hz", handler.id_str(), handler.rate_hz());

    // Admit and join a participant.
    let alice = MatchPresence {
        user_id: Uuid::new_v4(),
        session_id: Uuid::new_v4(),
        username: "alice".into(),
        node: "node1".into(),
        persistence: false,
        status: None,
    };

    let (tx, rx) = oneshot::channel();
    handler.queue_join_attempt(
        CancellationToken::new(),
        tx,
        JoinAttemptRequest {
            user_id: alice.user_id,
            session_id: alice.session_id,
            username: alice.username.clone(),
            node: alice.node.clone(),
            metadata: HashMap::new(),
        },
    );
    let decision = rx.await.expect("handler should reply");
    println!("join decision: allow={} label={}", decision.allow, decision.label);

    handler.queue_join(vec![alice.clone()]);

    // Send a few frames and let a couple of ticks drain them.
    for (i, text) in ["hello", "echo", "world"].iter().enumerate() {
        handler.queue_data(MatchDataMessage {
            user_id: alice.user_id,
            session_id: alice.session_id,
            username: alice.username.clone(),
            node: alice.node.clone(),
            op_code: i as i64 + 1,
            data: text.as_bytes().to_vec(),
            receive_time: 0,
        });
    }
    tokio::time::sleep(Duration::from_millis(600)).await;

    handler.queue_leave(vec![alice]);
    tokio::time::sleep(Duration::from_millis(100)).await;

    handler.queue_terminate(0);
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!(
        "done: stopped={} frames routed={}",
        handler.is_stopped(),
        router.sent.lock().unwrap()
    );
}
