//! Error types shared by capturers, streams and latches.

use thiserror::Error;

use crate::capture::LifecycleState;
use crate::latch::Outcome;

/// Errors raised by video capturers and capture engines.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The source could not be built. It never becomes usable.
    #[error("cannot construct {source_name}: {reason}")]
    SourceConstruction {
        source_name: &'static str,
        reason: String,
        #[source]
        cause: Option<std::io::Error>,
    },

    /// A lifecycle method was called out of order. The capture session is
    /// over; dispose the source and build a new one.
    #[error("{operation} is not allowed while the capturer is {state}")]
    State {
        operation: &'static str,
        state: LifecycleState,
    },

    /// The underlying engine did not stop cleanly.
    #[error("capture interrupted: {0}")]
    Interrupted(String),

    /// The capture engine reported a failure.
    #[error("capture engine error: {0}")]
    Engine(String),

    /// The engine does not implement the requested operation.
    #[error("{0} is not supported by this capture engine")]
    Unsupported(&'static str),

    #[error("no alternate camera to switch to")]
    NoAlternateCamera,

    /// The platform revoked the screen projection grant.
    #[error("screen projection was revoked")]
    ProjectionRevoked,
}

impl CaptureError {
    pub(crate) fn construction(source_name: &'static str, reason: impl Into<String>) -> Self {
        Self::SourceConstruction {
            source_name,
            reason: reason.into(),
            cause: None,
        }
    }

    pub(crate) fn construction_io(
        source_name: &'static str,
        reason: impl Into<String>,
        cause: std::io::Error,
    ) -> Self {
        Self::SourceConstruction {
            source_name,
            reason: reason.into(),
            cause: Some(cause),
        }
    }

    /// True for errors raised while building a source.
    pub fn is_construction(&self) -> bool {
        matches!(self, Self::SourceConstruction { .. })
    }
}

/// Errors raised by `LocalStream`.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("a local stream needs a video capturer or audio constraints")]
    NoTracks,

    #[error("stream has no video track")]
    NoVideoTrack,

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// One-shot protocol violations on latches.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LatchError {
    /// A second completion signal reached an already terminal callback latch.
    #[error("callback already completed ({outcome}); a second completion is a protocol violation")]
    AlreadyCompleted { outcome: Outcome },

    /// `count_down` was called more times than the latch was armed for.
    #[error("unexpected event: latch count already reached zero")]
    Exhausted,
}

/// Error reported to an `ActionCallback` by an asynchronous SDK action.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("error {code}: {message}")]
pub struct RtcError {
    /// 0 when the action reported no specific code.
    pub code: i32,
    pub message: String,
}

impl RtcError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_code(0, message)
    }

    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
