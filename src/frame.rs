//! Video frames and the sinks that receive them.
//!
//! - `VideoFrame`: an I420 planar buffer produced by a capturer.
//! - `FrameSink`: the consumer a capturer is bound to by `initialize`.
//! - `FrameCounter`: a recording sink for tests and diagnostics.
//!
//! Sinks are shared between the capture thread and the owner of the stream, so
//! every method takes `&self` and implementations must be `Send + Sync`.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Requested or negotiated capture format. Zero fields mean "unspecified".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl CaptureFormat {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self { width, height, fps }
    }

    /// Frame interval for this format, falling back to `default_fps` when fps is 0.
    pub fn frame_interval(&self, default_fps: u32) -> Duration {
        let fps = if self.fps == 0 { default_fps } else { self.fps };
        Duration::from_micros(1_000_000 / u64::from(fps.max(1)))
    }
}

/// A decoded I420 frame.
#[derive(Clone, Debug)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Time since the capture session started.
    pub timestamp: Duration,
    data: Vec<u8>,
}

impl VideoFrame {
    /// Wrap an I420 buffer. Returns `None` if the buffer length does not match
    /// the dimensions or the dimensions are out of range.
    pub fn from_i420(width: u32, height: u32, timestamp: Duration, data: Vec<u8>) -> Option<Self> {
        if i420_len(width, height) != Some(data.len()) {
            return None;
        }
        Some(Self {
            width,
            height,
            timestamp,
            data,
        })
    }

    /// Luma plane.
    pub fn y_plane(&self) -> &[u8] {
        &self.data[..(self.width as usize * self.height as usize)]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Largest width or height a frame may have.
pub const MAX_FRAME_DIMENSION: u32 = 16_384;

/// Byte length of an I420 frame. Chroma planes round odd dimensions up.
/// `None` for zero dimensions or dimensions above `MAX_FRAME_DIMENSION`.
pub fn i420_len(width: u32, height: u32) -> Option<usize> {
    if width == 0 || height == 0 || width > MAX_FRAME_DIMENSION || height > MAX_FRAME_DIMENSION {
        return None;
    }
    let luma = (width as usize).checked_mul(height as usize)?;
    let chroma = (width.div_ceil(2) as usize).checked_mul(height.div_ceil(2) as usize)?;
    chroma.checked_mul(2)?.checked_add(luma)
}

/// Destination for frames produced by a capturer.
pub trait FrameSink: Send + Sync {
    /// The engine finished starting. `success` is false if it could not start.
    fn on_capturer_started(&self, success: bool);

    fn on_frame(&self, frame: &VideoFrame);

    fn on_capturer_stopped(&self);

    /// The source will not produce any further frames (e.g. the screen
    /// projection was revoked by the platform).
    fn on_end_of_stream(&self) {}
}

/// Sink that records what it receives.
#[derive(Debug, Default)]
pub struct FrameCounter {
    state: Mutex<CounterState>,
}

#[derive(Debug, Default, Clone, Copy)]
struct CounterState {
    frames_rendered: u64,
    width: u32,
    height: u32,
    started: bool,
    stopped: bool,
    ended: bool,
}

impl FrameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.snapshot().frames_rendered
    }

    /// Dimensions of the last rendered frame, `(0, 0)` before the first one.
    pub fn frame_dimensions(&self) -> (u32, u32) {
        let state = self.snapshot();
        (state.width, state.height)
    }

    pub fn started(&self) -> bool {
        self.snapshot().started
    }

    pub fn stopped(&self) -> bool {
        self.snapshot().stopped
    }

    pub fn ended(&self) -> bool {
        self.snapshot().ended
    }

    fn snapshot(&self) -> CounterState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(&mut CounterState)) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
    }
}

impl FrameSink for FrameCounter {
    fn on_capturer_started(&self, success: bool) {
        self.update(|state| state.started = success);
    }

    fn on_frame(&self, frame: &VideoFrame) {
        self.update(|state| {
            state.frames_rendered += 1;
            state.width = frame.width;
            state.height = frame.height;
        });
    }

    fn on_capturer_stopped(&self) {
        self.update(|state| state.stopped = true);
    }

    fn on_end_of_stream(&self) {
        self.update(|state| state.ended = true);
    }
}

/// Fill an I420 buffer with a moving gradient. Used by synthetic engines.
pub(crate) fn pattern_i420(width: u32, height: u32, frame_index: u64, seed: u8) -> Option<Vec<u8>> {
    let mut data = vec![128u8; i420_len(width, height)?];
    let luma = width as usize * height as usize;
    for (i, pixel) in data[..luma].iter_mut().enumerate() {
        *pixel = ((i as u64 + frame_index + seed as u64) % 256) as u8;
    }
    Some(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i420_len_rounds_chroma_up() {
        assert_eq!(i420_len(640, 480), Some(640 * 480 * 3 / 2));
        assert_eq!(i420_len(3, 3), Some(9 + 2 * 4));
    }

    #[test]
    fn i420_len_rejects_zero_and_oversized_dimensions() {
        assert_eq!(i420_len(0, 480), None);
        assert_eq!(i420_len(MAX_FRAME_DIMENSION + 1, 2), None);
        assert_eq!(i420_len(4_000_000_000, 4_000_000_000), None);
        assert!(i420_len(MAX_FRAME_DIMENSION, MAX_FRAME_DIMENSION).is_some());
    }

    #[test]
    fn from_i420_rejects_wrong_length() {
        assert!(VideoFrame::from_i420(4, 4, Duration::ZERO, vec![0; 10]).is_none());
        let frame = VideoFrame::from_i420(4, 4, Duration::ZERO, vec![0; 24]).expect("frame");
        assert_eq!(frame.y_plane().len(), 16);
    }

    #[test]
    fn frame_interval_falls_back_when_fps_is_zero() {
        let format = CaptureFormat::new(0, 0, 0);
        assert_eq!(format.frame_interval(30), Duration::from_micros(33_333));
        assert_eq!(
            CaptureFormat::new(0, 0, 10).frame_interval(30),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn frame_counter_tracks_last_dimensions() {
        let counter = FrameCounter::new();
        let data = pattern_i420(8, 6, 0, 0).expect("pattern");
        let frame = VideoFrame::from_i420(8, 6, Duration::ZERO, data).expect("frame");
        counter.on_capturer_started(true);
        counter.on_frame(&frame);
        counter.on_frame(&frame);
        assert!(counter.started());
        assert_eq!(counter.frames_rendered(), 2);
        assert_eq!(counter.frame_dimensions(), (8, 6));
        assert!(!counter.ended());
    }
}
