//! Local media capture for a WebRTC conferencing SDK.
//!
//! This crate models the capture side of a local stream: frame-producing
//! sources behind one capturer capability, and the one-shot latch the SDK uses
//! to wait on asynchronous callbacks.
//!
//! # Module Structure
//!
//! - `capture`: the `VideoCapturer` capability and its camera, screen-cast,
//!   file and synthetic variants
//! - `frame`: I420 frames, capture formats and frame sinks
//! - `stream`: `LocalStream`, which owns a capturer and drives its lifecycle
//! - `latch`: `Latch`, `CallbackLatch` and `EventObserver`
//! - `config`: capture defaults from file and environment
//! - `error`: error types for capture, streams and latches

pub mod capture;
pub mod config;
pub mod error;
pub mod frame;
pub mod latch;
pub mod stream;

pub use capture::{
    CameraCapturer, CameraEnumerator, CaptureContext, CaptureEngine, CaptureJournal,
    CaptureLifecycle, CaptureMetadata, Facing, FileCapturer, LifecycleCall, LifecycleState,
    PatternEngine, PlaybackEngine, ProjectionGrant, ProjectionStopHandle, ScreenCapturer,
    SourceKind, StaticEnumerator, SyntheticCapturer, VideoCapturer, VideoTrackConstraints,
};
pub use config::CaptureConfig;
pub use error::{CaptureError, LatchError, RtcError, StreamError};
pub use frame::{CaptureFormat, FrameCounter, FrameSink, VideoFrame};
pub use latch::{ActionCallback, CallbackLatch, EventObserver, Latch, Outcome};
pub use stream::{
    AudioSourceKind, AudioTrackConstraints, LocalStream, StreamObserver, StreamSourceInfo,
};
