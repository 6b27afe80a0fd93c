//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding wire messages.
///
/// Kept separate from the runtime's errors: a `ProtocolError` always means
/// the problem is at the serialization boundary, never inside a match.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed input, missing fields, a shape
    /// mismatch against the expected message type, or a field value outside
    /// its valid range (e.g. an unknown error code).
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
