//! Raw file capturer.
//!
//! Plays a local video file at a fixed 30 fps, looping back to the first frame
//! at end of file. Decoding is the `PlaybackEngine`'s job; this wrapper only
//! applies the file policy. Dimensions live in the file, so metadata reports
//! 0x0 and the consumer learns the real size from the first delivered frame.
//! Start and format requests are ignored.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::engine::CaptureEngine;
use super::playback::PlaybackEngine;
use super::{
    CaptureContext, CaptureLifecycle, CaptureMetadata, LifecycleState, SourceKind, VideoCapturer,
};
use crate::error::CaptureError;
use crate::frame::{CaptureFormat, FrameSink};

/// Playback cadence for raw files.
pub const FILE_PLAYBACK_FPS: u32 = 30;

/// File-backed capturer.
pub struct FileCapturer {
    path: PathBuf,
    dimensions: (u32, u32),
    engine: Box<dyn CaptureEngine>,
    lifecycle: CaptureLifecycle,
    sink: Option<Arc<dyn FrameSink>>,
    context: CaptureContext,
}

impl FileCapturer {
    /// Open `path` with a `PlaybackEngine`. Fails if the file cannot be opened
    /// or its format is not supported.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let engine = PlaybackEngine::open(path)?;
        Ok(Self {
            path: engine.path().to_path_buf(),
            dimensions: engine.dimensions(),
            engine: Box::new(engine),
            lifecycle: CaptureLifecycle::new(),
            sink: None,
            context: CaptureContext::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dimensions embedded in the file.
    pub fn frame_dimensions(&self) -> (u32, u32) {
        self.dimensions
    }
}

impl VideoCapturer for FileCapturer {
    fn metadata(&self) -> CaptureMetadata {
        CaptureMetadata {
            width: 0,
            height: 0,
            fps: FILE_PLAYBACK_FPS,
            source_kind: SourceKind::RawFile,
        }
    }

    fn initialize(
        &mut self,
        sink: Arc<dyn FrameSink>,
        context: CaptureContext,
    ) -> Result<(), CaptureError> {
        self.lifecycle.check_initialize()?;
        self.sink = Some(sink);
        self.context = context;
        self.lifecycle.advance(LifecycleState::Initialized);
        Ok(())
    }

    fn start_capture(&mut self, width: u32, height: u32, fps: u32) -> Result<(), CaptureError> {
        self.lifecycle.check_start()?;
        log::debug!(
            "FileCapturer: ignoring requested format {}x{}@{}",
            width,
            height,
            fps
        );
        let sink = self.sink.clone().ok_or(CaptureError::State {
            operation: "start_capture",
            state: LifecycleState::Created,
        })?;
        self.engine.start(
            CaptureFormat::new(0, 0, FILE_PLAYBACK_FPS),
            sink,
            &self.context,
        )?;
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
        log::debug!(
            "FileCapturer: format change to {}x{}@{} ignored",
            width,
            height,
            fps
        );
        Ok(())
    }

    fn dispose(mut self: Box<Self>) {
        if self.lifecycle.is_capturing() {
            if let Err(e) = self.engine.stop() {
                log::warn!("FileCapturer: stop during dispose failed: {}", e);
            }
        }
        self.engine.release();
        self.sink = None;
        log::debug!("FileCapturer: disposed {}", self.path.display());
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
