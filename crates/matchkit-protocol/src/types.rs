//! Core types of Matchkit's realtime wire format.
//!
//! Every structure here travels "on the wire": serialized to bytes, sent
//! over a realtime transport, and deserialized on the other side. The match
//! runtime itself never touches these — they define the external contract
//! that ultimately feeds the runtime's queue operations.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// UserPresence
// ---------------------------------------------------------------------------

/// A participant as seen by other clients of a match.
///
/// This is the client-facing view of a presence. The server-side identity of
/// a presence is the `(node, session)` pair; users never see node names, so
/// the wire shape carries user/session/username plus the per-connection
/// metadata flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPresence {
    /// The user owning this presence.
    pub user_id: Uuid,
    /// The connection this presence belongs to.
    pub session_id: Uuid,
    /// Username at the time the presence was created.
    pub username: String,
    /// Whether data sent by this presence should be persisted server-side.
    #[serde(default)]
    pub persistence: bool,
    /// Optional free-form status string set by the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl fmt::Display for UserPresence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.username, self.session_id)
    }
}

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

/// Stable error codes carried by [`MatchMessage::Error`].
///
/// The numeric values are part of the wire contract — client SDKs switch on
/// them — so each variant pins its discriminant explicitly and serializes as
/// the plain integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum ErrorCode {
    /// An unexpected error occurred in server runtime code.
    RuntimeException = 0,
    /// The envelope could not be recognized.
    UnrecognizedPayload = 1,
    /// The envelope carried no message.
    MissingPayload = 2,
    /// A message field failed validation.
    BadInput = 3,
    /// The addressed match does not exist on this server.
    MatchNotFound = 4,
    /// The match rejected the join attempt, or its admission queue was full.
    MatchJoinRejected = 5,
    /// The named server runtime function does not exist.
    RuntimeFunctionNotFound = 6,
    /// A server runtime function raised an error.
    RuntimeFunctionException = 7,
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> u16 {
        code as u16
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, String> {
        match value {
            0 => Ok(Self::RuntimeException),
            1 => Ok(Self::UnrecognizedPayload),
            2 => Ok(Self::MissingPayload),
            3 => Ok(Self::BadInput),
            4 => Ok(Self::MatchNotFound),
            5 => Ok(Self::MatchJoinRejected),
            6 => Ok(Self::RuntimeFunctionNotFound),
            7 => Ok(Self::RuntimeFunctionException),
            other => Err(format!("unknown error code {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// MatchMessage — the one-of payload
// ---------------------------------------------------------------------------

/// How a client addresses the match it wants to join.
///
/// Either a match ID obtained from a listing or presence event, or an opaque
/// matchmaker token that the server resolves to a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchJoinTarget {
    /// Join by `"{uuid}.{node}"` match ID.
    MatchId(String),
    /// Join by matchmaker token.
    Token(String),
}

/// The one-of message set of the realtime match protocol.
///
/// Internally tagged so the JSON shape is `{ "type": "MatchDataSend", ... }`,
/// which client SDKs can switch on without a second lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MatchMessage {
    /// Client → Server: create a new authoritative match.
    MatchCreate {},

    /// Client → Server: join an existing match.
    MatchJoin {
        #[serde(flatten)]
        target: MatchJoinTarget,
        /// Opaque per-join metadata handed to the match's admission logic.
        #[serde(default)]
        metadata: HashMap<String, String>,
    },

    /// Client → Server: leave a match.
    MatchLeave { match_id: String },

    /// Client → Server: send a data frame into a match.
    MatchDataSend {
        match_id: String,
        op_code: i64,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        /// Restrict delivery to these presences; `None` means everyone.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        presences: Option<Vec<UserPresence>>,
    },

    /// Server → Client: a data frame emitted by the match.
    MatchData {
        match_id: String,
        presence: UserPresence,
        op_code: i64,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },

    /// Server → Client: participants joined or left a match.
    MatchPresenceEvent {
        match_id: String,
        #[serde(default)]
        joins: Vec<UserPresence>,
        #[serde(default)]
        leaves: Vec<UserPresence>,
    },

    /// Server → Client: something went wrong.
    Error {
        code: ErrorCode,
        message: String,
        /// Additional machine-readable details, e.g. the rejection reason
        /// produced by a match's admission logic.
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        context: HashMap<String, String>,
    },
}

// Binary payloads cross the wire base64-encoded so the envelope stays valid
// JSON regardless of content.
mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    const ALPHABET: &[u8; 64] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    pub fn serialize<S: Serializer>(data: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        decode(&s).map_err(serde::de::Error::custom)
    }

    fn encode(data: &[u8]) -> String {
        let mut out = String::with_capacity(data.len().div_ceil(3) * 4);
        for chunk in data.chunks(3) {
            let b = [chunk[0], *chunk.get(1).unwrap_or(&0), *chunk.get(2).unwrap_or(&0)];
            let n = u32::from_be_bytes([0, b[0], b[1], b[2]]);
            out.push(ALPHABET[(n >> 18) as usize & 63] as char);
            out.push(ALPHABET[(n >> 12) as usize & 63] as char);
            out.push(if chunk.len() > 1 {
                ALPHABET[(n >> 6) as usize & 63] as char
            } else {
                '='
            });
            out.push(if chunk.len() > 2 {
                ALPHABET[n as usize & 63] as char
            } else {
                '='
            });
        }
        out
    }

    fn decode(s: &str) -> Result<Vec<u8>, String> {
        let s = s.trim_end_matches('=');
        let mut out = Vec::with_capacity(s.len() * 3 / 4);
        let mut buf = 0u32;
        let mut bits = 0u8;
        for c in s.bytes() {
            let v = ALPHABET
                .iter()
                .position(|&a| a == c)
                .ok_or_else(|| format!("invalid base64 byte {c:#04x}"))? as u32;
            buf = (buf << 6) | v;
            bits += 6;
            if bits >= 8 {
                bits -= 8;
                out.push((buf >> bits) as u8);
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The top-level wrapper: every message on the wire is an `Envelope`.
///
/// `cid` is the client-assigned correlation ID. Requests that expect a reply
/// set it; the server echoes it on the response so the client can pair them.
/// Server-initiated messages (presence events, match data) carry no `cid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    #[serde(flatten)]
    pub message: MatchMessage,
}

impl Envelope {
    /// Wraps a message with no correlation ID.
    pub fn new(message: MatchMessage) -> Self {
        Self { cid: None, message }
    }

    /// Wraps a message that replies to (or initiates) the given correlation ID.
    pub fn with_cid(cid: impl Into<String>, message: MatchMessage) -> Self {
        Self {
            cid: Some(cid.into()),
            message,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The wire shapes are a compatibility contract with client SDKs, so
    //! these tests pin the exact JSON produced by the serde attributes.

    use super::*;

    fn presence(name: &str) -> UserPresence {
        UserPresence {
            user_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            username: name.into(),
            persistence: false,
            status: None,
        }
    }

    #[test]
    fn error_code_serializes_as_plain_integer() {
        let json = serde_json::to_string(&ErrorCode::MatchJoinRejected).unwrap();
        assert_eq!(json, "5");
    }

    #[test]
    fn error_code_deserializes_from_integer() {
        let code: ErrorCode = serde_json::from_str("4").unwrap();
        assert_eq!(code, ErrorCode::MatchNotFound);
    }

    #[test]
    fn error_code_rejects_unknown_value() {
        let result: Result<ErrorCode, _> = serde_json::from_str("99");
        assert!(result.is_err());
    }

    #[test]
    fn match_join_by_id_json_shape() {
        let msg = MatchMessage::MatchJoin {
            target: MatchJoinTarget::MatchId("abc.node1".into()),
            metadata: HashMap::new(),
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "MatchJoin");
        assert_eq!(json["match_id"], "abc.node1");
    }

    #[test]
    fn match_join_by_token_json_shape() {
        let msg = MatchMessage::MatchJoin {
            target: MatchJoinTarget::Token("mm-token".into()),
            metadata: HashMap::from([("mode".to_string(), "ranked".to_string())]),
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "MatchJoin");
        assert_eq!(json["token"], "mm-token");
        assert_eq!(json["metadata"]["mode"], "ranked");
    }

    #[test]
    fn match_join_round_trips_both_targets() {
        for target in [
            MatchJoinTarget::MatchId("abc.node1".into()),
            MatchJoinTarget::Token("mm-token".into()),
        ] {
            let msg = MatchMessage::MatchJoin {
                target,
                metadata: HashMap::from([("k".to_string(), "v".to_string())]),
            };
            let bytes = serde_json::to_vec(&msg).unwrap();
            let decoded: MatchMessage = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(msg, decoded);
        }
    }

    #[test]
    fn match_data_send_round_trip() {
        let msg = MatchMessage::MatchDataSend {
            match_id: "abc.node1".into(),
            op_code: 42,
            data: vec![0x01, 0x02, 0xff],
            presences: None,
        };
        let bytes = serde_json::to_vec(&msg).unwrap();
        let decoded: MatchMessage = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn match_data_payload_is_base64_text() {
        let msg = MatchMessage::MatchData {
            match_id: "abc.node1".into(),
            presence: presence("alice"),
            op_code: 1,
            data: b"hello".to_vec(),
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["data"], "aGVsbG8=");
    }

    #[test]
    fn match_data_base64_round_trips_all_lengths() {
        // Padding differs for each input length mod 3.
        for len in 0..8usize {
            let msg = MatchMessage::MatchDataSend {
                match_id: "m.n".into(),
                op_code: 0,
                data: (0..len as u8).collect(),
                presences: None,
            };
            let bytes = serde_json::to_vec(&msg).unwrap();
            let decoded: MatchMessage = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(msg, decoded, "length {len}");
        }
    }

    #[test]
    fn presence_event_round_trip() {
        let msg = MatchMessage::MatchPresenceEvent {
            match_id: "abc.node1".into(),
            joins: vec![presence("alice"), presence("bob")],
            leaves: vec![],
        };
        let bytes = serde_json::to_vec(&msg).unwrap();
        let decoded: MatchMessage = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn error_message_json_shape() {
        let msg = MatchMessage::Error {
            code: ErrorCode::MatchNotFound,
            message: "match not found".into(),
            context: HashMap::new(),
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "Error");
        assert_eq!(json["code"], 4);
        assert_eq!(json["message"], "match not found");
        // Empty context is omitted entirely.
        assert!(json.get("context").is_none());
    }

    #[test]
    fn envelope_echoes_cid() {
        let env = Envelope::with_cid("17", MatchMessage::MatchCreate {});
        let json: serde_json::Value = serde_json::to_value(&env).unwrap();
        assert_eq!(json["cid"], "17");
        assert_eq!(json["type"], "MatchCreate");
    }

    #[test]
    fn envelope_without_cid_omits_field() {
        let env = Envelope::new(MatchMessage::MatchLeave {
            match_id: "abc.node1".into(),
        });
        let json: serde_json::Value = serde_json::to_value(&env).unwrap();
        assert!(json.get("cid").is_none());
    }

    #[test]
    fn envelope_round_trip() {
        let env = Envelope::with_cid(
            "9",
            MatchMessage::MatchDataSend {
                match_id: "abc.node1".into(),
                op_code: 7,
                data: vec![1, 2, 3],
                presences: Some(vec![presence("carol")]),
            },
        );
        let bytes = serde_json::to_vec(&env).unwrap();
        let decoded: Envelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(env, decoded);
    }

    #[test]
    fn decode_garbage_returns_error() {
        let garbage = b"not json at all";
        let result: Result<Envelope, _> = serde_json::from_slice(garbage);
        assert!(result.is_err());
    }

    #[test]
    fn decode_unknown_message_type_returns_error() {
        let unknown = r#"{"type": "MatchTeleport", "speed": 9000}"#;
        let result: Result<Envelope, _> = serde_json::from_str(unknown);
        assert!(result.is_err());
    }

    #[test]
    fn user_presence_defaults_optional_fields() {
        let json = format!(
            r#"{{"user_id": "{}", "session_id": "{}", "username": "dave"}}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        let p: UserPresence = serde_json::from_str(&json).unwrap();
        assert!(!p.persistence);
        assert!(p.status.is_none());
    }
}
