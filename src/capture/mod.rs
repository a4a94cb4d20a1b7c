//! Video capturers.
//!
//! Every frame-producing source implements `VideoCapturer`:
//! - `CameraCapturer`: a physical camera, metadata from track constraints
//! - `ScreenCapturer`: screen projection, fixed capture region, engine-driven fps
//! - `FileCapturer`: file playback at 30 fps through `PlaybackEngine`, dimensions
//!   embedded in the file
//! - `SyntheticCapturer`: fixed 640x480@30 test double with no engine
//!
//! Metadata is what the capturer declares, not what the engine negotiates.
//! Consumers trust non-zero metadata and otherwise derive the format from the
//! first delivered frame.
//!
//! The owner drives the lifecycle in order, once each:
//! `initialize -> start_capture -> ... -> stop_capture -> dispose`.
//! `dispose` consumes the capturer, so it cannot run twice.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::CaptureError;
use crate::frame::FrameSink;

pub mod camera;
pub mod engine;
#[cfg(feature = "file-ffmpeg")]
mod ffmpeg;
pub mod file;
pub mod playback;
pub mod screen;
pub mod synthetic;
mod y4m;

pub use camera::{CameraCapturer, CameraEnumerator, Facing, StaticEnumerator, VideoTrackConstraints};
pub use engine::{CaptureEngine, PatternEngine};
pub use file::FileCapturer;
pub use playback::PlaybackEngine;
pub use screen::{ProjectionGrant, ProjectionStopHandle, ScreenCapturer};
pub use synthetic::{CaptureJournal, LifecycleCall, SyntheticCapturer};

/// Origin of a video source's frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Camera,
    ScreenCast,
    RawFile,
    EncodedFile,
    Mixed,
    Other,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Camera => "camera",
            SourceKind::ScreenCast => "screen-cast",
            SourceKind::RawFile => "raw-file",
            SourceKind::EncodedFile => "encoded-file",
            SourceKind::Mixed => "mixed",
            SourceKind::Other => "other",
        }
    }

    /// Parse a source label. Unknown labels map to `Other`.
    pub fn from_label(label: &str) -> Self {
        match label {
            "camera" => SourceKind::Camera,
            "screen-cast" => SourceKind::ScreenCast,
            "raw-file" => SourceKind::RawFile,
            "encoded-file" => SourceKind::EncodedFile,
            "mixed" => SourceKind::Mixed,
            _ => SourceKind::Other,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Self-reported capture metadata. A zero width, height or fps means the
/// consumer must negotiate or derive that value elsewhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub source_kind: SourceKind,
}

impl CaptureMetadata {
    pub fn has_resolution(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Execution context handed to a capturer on `initialize`.
#[derive(Clone, Debug)]
pub struct CaptureContext {
    /// Prefix for threads the capturer spawns.
    pub thread_name: String,
    /// Deliver frames as textures rather than byte buffers where the engine can.
    pub capture_to_texture: bool,
}

impl Default for CaptureContext {
    fn default() -> Self {
        Self {
            thread_name: "capture".to_string(),
            capture_to_texture: true,
        }
    }
}

/// A source of video frames.
///
/// Implementations are exclusively owned by one stream, which serialises all
/// lifecycle calls.
pub trait VideoCapturer: Send {
    fn metadata(&self) -> CaptureMetadata;

    /// Bind the capturer to `sink`. Allowed once, before the first `start_capture`.
    fn initialize(
        &mut self,
        sink: Arc<dyn FrameSink>,
        context: CaptureContext,
    ) -> Result<(), CaptureError>;

    /// Begin producing frames. The request is a hint; sources with their own
    /// cadence ignore it.
    fn start_capture(&mut self, width: u32, height: u32, fps: u32) -> Result<(), CaptureError>;

    /// Halt frame production. Fails with `CaptureError::State` if capture is not
    /// running and `CaptureError::Interrupted` if the engine cannot stop cleanly.
    fn stop_capture(&mut self) -> Result<(), CaptureError>;

    /// Best-effort live format change.
    fn change_capture_format(
        &mut self,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<(), CaptureError>;

    /// Release every resource held by the capturer.
    fn dispose(self: Box<Self>);

    fn is_screencast(&self) -> bool {
        self.metadata().source_kind == SourceKind::ScreenCast
    }

    /// Access to the concrete capturer for variant-specific operations.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Position of a capturer in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Initialized,
    Capturing,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LifecycleState::Created => "not initialized",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Capturing => "capturing",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Lifecycle guard shared by the capturer implementations.
#[derive(Debug)]
pub struct CaptureLifecycle {
    state: LifecycleState,
}

impl Default for CaptureLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureLifecycle {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Created,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        self.state == LifecycleState::Capturing
    }

    pub fn check_initialize(&self) -> Result<(), CaptureError> {
        self.require("initialize", &[LifecycleState::Created])
    }

    pub fn check_start(&self) -> Result<(), CaptureError> {
        self.require(
            "start_capture",
            &[LifecycleState::Initialized, LifecycleState::Stopped],
        )
    }

    pub fn check_stop(&self) -> Result<(), CaptureError> {
        self.require("stop_capture", &[LifecycleState::Capturing])
    }

    pub fn check_change_format(&self) -> Result<(), CaptureError> {
        self.require("change_capture_format", &[LifecycleState::Capturing])
    }

    /// Record a transition after the guarded operation succeeded.
    pub fn advance(&mut self, next: LifecycleState) {
        self.state = next;
    }

    fn require(
        &self,
        operation: &'static str,
        allowed: &[LifecycleState],
    ) -> Result<(), CaptureError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(CaptureError::State {
                operation,
                state: self.state,
            })
        }
    }
}
