//! Capture engines.
//!
//! A `CaptureEngine` is the platform primitive that actually produces pixels
//! (camera driver, screen projection service). Capturers delegate to it and
//! translate its lifecycle into the `VideoCapturer` contract.
//!
//! `PatternEngine` is the in-process engine: it renders a moving gradient on a
//! dedicated thread. It backs the camera and screen capturers in tests and in
//! the demo binary.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use super::CaptureContext;
use crate::error::CaptureError;
use crate::frame::{pattern_i420, CaptureFormat, FrameSink, VideoFrame, MAX_FRAME_DIMENSION};

/// Cadence used when a start request leaves fps unspecified.
pub const DEFAULT_ENGINE_FPS: u32 = 30;
pub const DEFAULT_ENGINE_WIDTH: u32 = 640;
pub const DEFAULT_ENGINE_HEIGHT: u32 = 480;

/// Platform capture primitive.
pub trait CaptureEngine: Send {
    fn name(&self) -> &str;

    /// Start delivering frames to `sink`.
    fn start(
        &mut self,
        format: CaptureFormat,
        sink: Arc<dyn FrameSink>,
        context: &CaptureContext,
    ) -> Result<(), CaptureError>;

    fn stop(&mut self) -> Result<(), CaptureError>;

    fn change_format(&mut self, _format: CaptureFormat) -> Result<(), CaptureError> {
        Err(CaptureError::Unsupported("change_format"))
    }

    /// Point the engine at another physical device.
    fn select_device(&mut self, _device: &str) -> Result<(), CaptureError> {
        Err(CaptureError::Unsupported("select_device"))
    }

    /// Free engine resources. Called once, from the capturer's `dispose`.
    fn release(&mut self) {}
}

/// Synthetic engine producing gradient frames on its own thread.
pub struct PatternEngine {
    name: String,
    device: Option<String>,
    format: Arc<Mutex<CaptureFormat>>,
    seed: Arc<AtomicU8>,
    running: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl PatternEngine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device: None,
            format: Arc::new(Mutex::new(CaptureFormat::default())),
            seed: Arc::new(AtomicU8::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            frames: Arc::new(AtomicU64::new(0)),
            worker: None,
        }
    }

    /// Frames delivered since construction.
    pub fn frames_produced(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Shared counter readable after the engine is boxed into a capturer.
    pub fn frame_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.frames)
    }

    pub fn current_format(&self) -> CaptureFormat {
        *self.format.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(format: CaptureFormat) -> CaptureFormat {
        CaptureFormat {
            width: if format.width == 0 {
                DEFAULT_ENGINE_WIDTH
            } else {
                format.width.min(MAX_FRAME_DIMENSION)
            },
            height: if format.height == 0 {
                DEFAULT_ENGINE_HEIGHT
            } else {
                format.height.min(MAX_FRAME_DIMENSION)
            },
            fps: if format.fps == 0 {
                DEFAULT_ENGINE_FPS
            } else {
                format.fps
            },
        }
    }
}

impl CaptureEngine for PatternEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(
        &mut self,
        format: CaptureFormat,
        sink: Arc<dyn FrameSink>,
        context: &CaptureContext,
    ) -> Result<(), CaptureError> {
        if self.worker.is_some() {
            return Err(CaptureError::Engine(format!(
                "{} is already running",
                self.name
            )));
        }

        let resolved = Self::resolve(format);
        *self.format.lock().unwrap_or_else(PoisonError::into_inner) = resolved;
        self.running.store(true, Ordering::Release);

        let shared_format = Arc::clone(&self.format);
        let seed = Arc::clone(&self.seed);
        let running = Arc::clone(&self.running);
        let frames = Arc::clone(&self.frames);

        let worker = thread::Builder::new()
            .name(format!("{}-{}", context.thread_name, self.name))
            .spawn(move || {
                let started = Instant::now();
                let mut index = 0u64;
                sink.on_capturer_started(true);
                while running.load(Ordering::Acquire) {
                    let format = *shared_format.lock().unwrap_or_else(PoisonError::into_inner);
                    let frame = pattern_i420(
                        format.width,
                        format.height,
                        index,
                        seed.load(Ordering::Relaxed),
                    )
                    .and_then(|pixels| {
                        VideoFrame::from_i420(format.width, format.height, started.elapsed(), pixels)
                    });
                    if let Some(frame) = frame {
                        sink.on_frame(&frame);
                        frames.fetch_add(1, Ordering::Relaxed);
                    }
                    index += 1;
                    thread::park_timeout(format.frame_interval(DEFAULT_ENGINE_FPS));
                }
                sink.on_capturer_stopped();
            })
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                CaptureError::Engine(format!("failed to spawn {} worker: {}", self.name, e))
            })?;

        log::debug!(
            "PatternEngine: {} started at {}x{}@{}",
            self.name,
            resolved.width,
            resolved.height,
            resolved.fps
        );
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        let Some(worker) = self.worker.take() else {
            return Err(CaptureError::Engine(format!("{} is not running", self.name)));
        };
        self.running.store(false, Ordering::Release);
        worker.thread().unpark();
        worker
            .join()
            .map_err(|_| CaptureError::Interrupted(format!("{} worker panicked", self.name)))?;
        log::debug!(
            "PatternEngine: {} stopped after {} frames",
            self.name,
            self.frames_produced()
        );
        Ok(())
    }

    fn change_format(&mut self, format: CaptureFormat) -> Result<(), CaptureError> {
        let mut current = self.format.lock().unwrap_or_else(PoisonError::into_inner);
        if format.width > 0 {
            current.width = format.width.min(MAX_FRAME_DIMENSION);
        }
        if format.height > 0 {
            current.height = format.height.min(MAX_FRAME_DIMENSION);
        }
        if format.fps > 0 {
            current.fps = format.fps;
        }
        Ok(())
    }

    fn select_device(&mut self, device: &str) -> Result<(), CaptureError> {
        let seed = device.bytes().fold(0u8, |acc, b| acc.wrapping_add(b));
        self.seed.store(seed, Ordering::Relaxed);
        self.device = Some(device.to_string());
        Ok(())
    }

    fn release(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.stop() {
                log::warn!("PatternEngine: {} release: {}", self.name, e);
            }
        }
    }
}

impl Drop for PatternEngine {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameCounter;
    use std::time::Duration;

    struct PanickingSink;

    impl FrameSink for PanickingSink {
        fn on_capturer_started(&self, _success: bool) {}

        fn on_frame(&self, _frame: &VideoFrame) {
            panic!("sink rejected frame");
        }

        fn on_capturer_stopped(&self) {}
    }

    fn wait_for_frames(counter: &FrameCounter, min: u64) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while counter.frames_rendered() < min && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn pattern_engine_uses_defaults_for_zero_request() -> anyhow::Result<()> {
        let mut engine = PatternEngine::new("pattern");
        let counter = Arc::new(FrameCounter::new());
        engine.start(
            CaptureFormat::default(),
            counter.clone(),
            &CaptureContext::default(),
        )?;
        wait_for_frames(&counter, 1);
        engine.stop()?;

        assert!(counter.started());
        assert!(counter.stopped());
        assert_eq!(counter.frame_dimensions(), (640, 480));
        assert_eq!(engine.current_format().fps, DEFAULT_ENGINE_FPS);
        Ok(())
    }

    #[test]
    fn pattern_engine_applies_live_format_change() -> anyhow::Result<()> {
        let mut engine = PatternEngine::new("pattern");
        let counter = Arc::new(FrameCounter::new());
        engine.start(
            CaptureFormat::new(320, 240, 60),
            counter.clone(),
            &CaptureContext::default(),
        )?;
        engine.change_format(CaptureFormat::new(160, 120, 0))?;
        let before = counter.frames_rendered();
        wait_for_frames(&counter, before + 2);
        engine.stop()?;

        assert_eq!(counter.frame_dimensions(), (160, 120));
        assert_eq!(engine.current_format().fps, 60);
        Ok(())
    }

    #[test]
    fn stop_without_start_is_an_engine_error() {
        let mut engine = PatternEngine::new("pattern");
        assert!(matches!(engine.stop(), Err(CaptureError::Engine(_))));
    }

    #[test]
    fn panicked_worker_surfaces_as_interrupted() -> anyhow::Result<()> {
        let mut engine = PatternEngine::new("pattern");
        engine.start(
            CaptureFormat::new(16, 16, 30),
            Arc::new(PanickingSink),
            &CaptureContext::default(),
        )?;
        thread::sleep(Duration::from_millis(50));
        assert!(matches!(engine.stop(), Err(CaptureError::Interrupted(_))));
        Ok(())
    }
}
