//! Codec trait and implementations for serializing wire messages.
//!
//! The protocol layer doesn't care how envelopes become bytes — transports
//! pick a [`Codec`] implementation and everything else stays format-agnostic.
//! [`JsonCodec`] is the default; a compact binary codec can be added behind
//! the same trait without touching callers.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Converts between Rust types and wire bytes.
///
/// `Send + Sync + 'static` because a codec is shared across the connection
/// tasks of a server and lives as long as they do.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the bytes are malformed,
    /// truncated, or don't match the expected shape.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// Human-readable, so envelopes can be inspected in logs and browser dev
/// tools. Behind the `json` feature flag (enabled by default).
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{Envelope, MatchMessage};

    #[test]
    fn json_codec_round_trips_envelope() {
        let codec = JsonCodec;
        let env = Envelope::new(MatchMessage::MatchCreate {});

        let bytes = codec.encode(&env).unwrap();
        let decoded: Envelope = codec.decode(&bytes).unwrap();
        assert_eq!(env, decoded);
    }

    #[test]
    fn json_codec_decode_rejects_truncated_input() {
        let codec = JsonCodec;
        let env = Envelope::new(MatchMessage::MatchLeave {
            match_id: "m.n".into(),
        });
        let bytes = codec.encode(&env).unwrap();

        let result: Result<Envelope, _> = codec.decode(&bytes[..bytes.len() - 2]);
        assert!(result.is_err());
    }
}
