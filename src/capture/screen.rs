//! Screen-cast capturer.
//!
//! The capture region is fixed at construction; the frame rate is left to the
//! engine, so metadata reports fps 0.
//!
//! The platform may revoke the projection at any time. It reports this through
//! a `ProjectionStopHandle`, from any thread. The first notification marks the
//! grant revoked and forwards end-of-stream to the bound sink. No frame reaches
//! the sink after `notify_stopped` returns, even while the engine is still
//! running. A revoked capturer refuses to start again but can still be stopped
//! and disposed.

use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};

use super::engine::CaptureEngine;
use super::{
    CaptureContext, CaptureLifecycle, CaptureMetadata, LifecycleState, SourceKind, VideoCapturer,
};
use crate::error::CaptureError;
use crate::frame::{i420_len, CaptureFormat, FrameSink, VideoFrame, MAX_FRAME_DIMENSION};

const SOURCE_NAME: &str = "screen capturer";

/// Opaque token proving the user granted screen projection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectionGrant(String);

impl ProjectionGrant {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

#[derive(Default)]
struct ProjectionState {
    sink: Option<Arc<dyn FrameSink>>,
    revoked: bool,
}

/// Handle the projection service uses to report that it stopped.
#[derive(Clone)]
pub struct ProjectionStopHandle {
    state: Arc<Mutex<ProjectionState>>,
}

impl ProjectionStopHandle {
    /// Report that the platform stopped the projection. Only the first call
    /// has an effect.
    pub fn notify_stopped(&self) {
        let sink = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.revoked {
                return;
            }
            state.revoked = true;
            state.sink.clone()
        };
        log::info!("ScreenCapturer: projection stopped by platform");
        if let Some(sink) = sink {
            sink.on_end_of_stream();
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .revoked
    }
}

/// Sink handed to the engine. Frames are forwarded under the projection lock,
/// so none is delivered once the projection is revoked.
struct ProjectionGate {
    state: Arc<Mutex<ProjectionState>>,
}

impl ProjectionGate {
    fn sink(&self) -> Option<Arc<dyn FrameSink>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sink
            .clone()
    }
}

impl FrameSink for ProjectionGate {
    fn on_capturer_started(&self, success: bool) {
        if let Some(sink) = self.sink() {
            sink.on_capturer_started(success);
        }
    }

    fn on_frame(&self, frame: &VideoFrame) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.revoked {
            return;
        }
        if let Some(sink) = &state.sink {
            sink.on_frame(frame);
        }
    }

    fn on_capturer_stopped(&self) {
        if let Some(sink) = self.sink() {
            sink.on_capturer_stopped();
        }
    }
}

/// Screen projection capturer.
pub struct ScreenCapturer {
    grant: ProjectionGrant,
    width: u32,
    height: u32,
    engine: Box<dyn CaptureEngine>,
    lifecycle: CaptureLifecycle,
    projection: Arc<Mutex<ProjectionState>>,
    context: CaptureContext,
}

impl ScreenCapturer {
    pub fn new(
        grant: ProjectionGrant,
        width: u32,
        height: u32,
        engine: Box<dyn CaptureEngine>,
    ) -> Result<Self, CaptureError> {
        if grant.token().trim().is_empty() {
            return Err(CaptureError::construction(
                SOURCE_NAME,
                "projection grant is empty",
            ));
        }
        if i420_len(width, height).is_none() {
            return Err(CaptureError::construction(
                SOURCE_NAME,
                format!(
                    "capture region must be 1 to {} pixels per side, got {}x{}",
                    MAX_FRAME_DIMENSION, width, height
                ),
            ));
        }
        Ok(Self {
            grant,
            width,
            height,
            engine,
            lifecycle: CaptureLifecycle::new(),
            projection: Arc::new(Mutex::new(ProjectionState::default())),
            context: CaptureContext::default(),
        })
    }

    pub fn grant(&self) -> &ProjectionGrant {
        &self.grant
    }

    /// Handle to give to the projection service for stop notifications.
    pub fn stop_handle(&self) -> ProjectionStopHandle {
        ProjectionStopHandle {
            state: Arc::clone(&self.projection),
        }
    }

    fn has_sink(&self) -> bool {
        self.projection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sink
            .is_some()
    }
}

impl VideoCapturer for ScreenCapturer {
    fn metadata(&self) -> CaptureMetadata {
        CaptureMetadata {
            width: self.width,
            height: self.height,
            fps: 0,
            source_kind: SourceKind::ScreenCast,
        }
    }

    fn initialize(
        &mut self,
        sink: Arc<dyn FrameSink>,
        context: CaptureContext,
    ) -> Result<(), CaptureError> {
        self.lifecycle.check_initialize()?;
        self.projection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sink = Some(sink);
        self.context = context;
        self.lifecycle.advance(LifecycleState::Initialized);
        Ok(())
    }

    fn start_capture(&mut self, width: u32, height: u32, fps: u32) -> Result<(), CaptureError> {
        self.lifecycle.check_start()?;
        if self.stop_handle().is_revoked() {
            return Err(CaptureError::ProjectionRevoked);
        }
        if !self.has_sink() {
            return Err(CaptureError::State {
                operation: "start_capture",
                state: LifecycleState::Created,
            });
        }
        let gate = Arc::new(ProjectionGate {
            state: Arc::clone(&self.projection),
        });
        self.engine
            .start(CaptureFormat::new(width, height, fps), gate, &self.context)?;
        self.lifecycle.advance(LifecycleState::Capturing);
        Ok(())
    }

    fn stop_capture(&mut self) -> Result<(), CaptureError> {
        self.lifecycle.check_stop()?;
        let result = self.engine.stop();
        self.lifecycle.advance(LifecycleState::Stopped);
        result
    }

    fn change_capture_format(
        &mut self,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<(), CaptureError> {
        self.lifecycle.check_change_format()?;
        self.engine
            .change_format(CaptureFormat::new(width, height, fps))
    }

    fn dispose(mut self: Box<Self>) {
        if self.lifecycle.is_capturing() {
            if let Err(e) = self.engine.stop() {
                log::warn!("ScreenCapturer: stop during dispose failed: {}", e);
            }
        }
        self.engine.release();
        self.projection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sink = None;
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn is_screencast(&self) -> bool {
        true
    }
}
