//! Engine error taxonomy.

use thiserror::Error;

/// Every failure the engine surfaces to its caller.
///
/// The UI layer is expected to map these to user-facing messages; the engine
/// itself never produces localized text.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The execution environment lacks something the operation needs
    /// (no output device, unsupported sample format, stream refused to build).
    #[error("unsupported audio capability: {0}")]
    Unsupported(String),

    /// Caller error: non-positive durations, degenerate geometry, non-finite gains.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The engine was disposed and must be reconstructed.
    #[error("engine has been disposed")]
    Disposed,

    /// The backend failed while resuming or closing the context.
    #[error("audio backend error: {0}")]
    Backend(String),
}

impl EngineError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
