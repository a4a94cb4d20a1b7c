//! Synthetic capturer for exercising stream construction without hardware.
//!
//! Reports fixed 640x480@30 camera metadata, produces no frames, and records
//! every lifecycle call in a `CaptureJournal` that stays readable after the
//! capturer has been boxed and disposed.

use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};

use super::{
    CaptureContext, CaptureLifecycle, CaptureMetadata, LifecycleState, SourceKind, VideoCapturer,
};
use crate::error::CaptureError;
use crate::frame::FrameSink;

pub const SYNTHETIC_WIDTH: u32 = 640;
pub const SYNTHETIC_HEIGHT: u32 = 480;
pub const SYNTHETIC_FPS: u32 = 30;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleCall {
    Initialize,
    StartCapture { width: u32, height: u32, fps: u32 },
    StopCapture,
    ChangeCaptureFormat { width: u32, height: u32, fps: u32 },
    Dispose,
}

/// Shared record of the lifecycle calls a `SyntheticCapturer` received.
#[derive(Clone, Debug, Default)]
pub struct CaptureJournal {
    calls: Arc<Mutex<Vec<LifecycleCall>>>,
}

impl CaptureJournal {
    pub fn calls(&self) -> Vec<LifecycleCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, call: LifecycleCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

#[derive(Default)]
pub struct SyntheticCapturer {
    journal: CaptureJournal,
    lifecycle: CaptureLifecycle,
    sink: Option<Arc<dyn FrameSink>>,
}

impl SyntheticCapturer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn journal(&self) -> CaptureJournal {
        self.journal.clone()
    }
}

impl VideoCapturer for SyntheticCapturer {
    fn metadata(&self) -> CaptureMetadata {
        CaptureMetadata {
            width: SYNTHETIC_WIDTH,
            height: SYNTHETIC_HEIGHT,
            fps: SYNTHETIC_FPS,
            source_kind: SourceKind::Camera,
        }
    }

    fn initialize(
        &mut self,
        sink: Arc<dyn FrameSink>,
        _context: CaptureContext,
    ) -> Result<(), CaptureError> {
        self.lifecycle.check_initialize()?;
        self.sink = Some(sink);
        self.lifecycle.advance(LifecycleState::Initialized);
        self.journal.record(LifecycleCall::Initialize);
        Ok(())
    }

    fn start_capture(&mut self, width: u32, height: u32, fps: u32) -> Result<(), CaptureError> {
        self.lifecycle.check_start()?;
        if let Some(sink) = &self.sink {
            sink.on_capturer_started(true);
        }
        self.lifecycle.advance(LifecycleState::Capturing);
        self.journal
            .record(LifecycleCall::StartCapture { width, height, fps });
        Ok(())
    }

    fn stop_capture(&mut self) -> Result<(), CaptureError> {
        self.lifecycle.check_stop()?;
        if let Some(sink) = &self.sink {
            sink.on_capturer_stopped();
        }
        self.lifecycle.advance(LifecycleState::Stopped);
        self.journal.record(LifecycleCall::StopCapture);
        Ok(())
    }

    fn change_capture_format(
        &mut self,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<(), CaptureError> {
        self.lifecycle.check_change_format()?;
        self.journal
            .record(LifecycleCall::ChangeCaptureFormat { width, height, fps });
        Ok(())
    }

    fn dispose(self: Box<Self>) {
        self.journal.record(LifecycleCall::Dispose);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameCounter;

    #[test]
    fn reports_fixed_reference_metadata() {
        let capturer = SyntheticCapturer::new();
        assert_eq!(
            capturer.metadata(),
            CaptureMetadata {
                width: 640,
                height: 480,
                fps: 30,
                source_kind: SourceKind::Camera,
            }
        );
        assert!(!capturer.is_screencast());
    }

    #[test]
    fn journal_survives_dispose() -> anyhow::Result<()> {
        let mut capturer = SyntheticCapturer::new();
        let journal = capturer.journal();
        capturer.initialize(Arc::new(FrameCounter::new()), CaptureContext::default())?;
        capturer.start_capture(640, 480, 30)?;
        capturer.change_capture_format(320, 240, 15)?;
        capturer.stop_capture()?;
        Box::new(capturer).dispose();

        assert_eq!(
            journal.calls(),
            vec![
                LifecycleCall::Initialize,
                LifecycleCall::StartCapture {
                    width: 640,
                    height: 480,
                    fps: 30
                },
                LifecycleCall::ChangeCaptureFormat {
                    width: 320,
                    height: 240,
                    fps: 15
                },
                LifecycleCall::StopCapture,
                LifecycleCall::Dispose,
            ]
        );
        Ok(())
    }

    #[test]
    fn double_initialize_is_a_state_error() -> anyhow::Result<()> {
        let mut capturer = SyntheticCapturer::new();
        capturer.initialize(Arc::new(FrameCounter::new()), CaptureContext::default())?;
        let err = capturer
            .initialize(Arc::new(FrameCounter::new()), CaptureContext::default())
            .unwrap_err();
        assert!(matches!(err, CaptureError::State { .. }));
        Ok(())
    }
}
