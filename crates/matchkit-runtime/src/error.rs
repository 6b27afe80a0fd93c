//! Error types for the match runtime.

use crate::CoreError;

/// Errors surfaced when constructing a match handler.
///
/// Only construction reports errors to a caller. Once a match is running,
/// callback failures are terminal for that match alone: the handler logs,
/// stops itself, and removes itself from the registry — there is no error
/// to return because the producers are fire-and-forget.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// The match core's init callback failed; the core has been cancelled
    /// and the handler was not created.
    #[error("match init failed: {0}")]
    Init(#[source] CoreError),

    /// Registering the initial label with the registry failed; the core has
    /// been cancelled and the handler was not created.
    #[error("match label registration failed: {0}")]
    LabelRegistration(#[source] CoreError),
}
