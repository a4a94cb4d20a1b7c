//! File playback engine.
//!
//! `PlaybackEngine` is the capture engine behind `FileCapturer`. It decodes
//! through a `FileBackend`:
//! - `Y4m`: YUV4MPEG2 4:2:0, always available
//! - `Ffmpeg`: any container FFmpeg can demux (`file-ffmpeg` feature)
//!
//! The backend is picked by sniffing the file signature. Each start opens a
//! fresh reader on the playback thread, so playback restarts from the first
//! frame and loops at end of file.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[cfg(feature = "file-ffmpeg")]
use super::ffmpeg::FfmpegFile;
use super::engine::CaptureEngine;
use super::y4m::{self, Y4mHeader, Y4mReader};
use super::CaptureContext;
use crate::error::CaptureError;
use crate::frame::{CaptureFormat, FrameSink, VideoFrame};

const SOURCE_NAME: &str = "file capturer";

/// Cadence used when a start request leaves fps unspecified.
pub const DEFAULT_PLAYBACK_FPS: u32 = 30;

/// Sequential decoder over one opened file.
pub(crate) trait FrameReader {
    fn dimensions(&self) -> (u32, u32);

    /// Next packed I420 frame, or `None` at end of file.
    fn read_frame(&mut self) -> io::Result<Option<Vec<u8>>>;

    /// Seek back to the first frame.
    fn rewind(&mut self) -> io::Result<()>;
}

#[derive(Clone, Debug)]
pub(crate) enum FileBackend {
    Y4m { path: PathBuf, header: Y4mHeader },
    #[cfg(feature = "file-ffmpeg")]
    Ffmpeg(FfmpegFile),
}

impl FileBackend {
    fn sniff(path: &Path) -> Result<Self, CaptureError> {
        let file = File::open(path).map_err(|e| {
            CaptureError::construction_io(SOURCE_NAME, format!("open {}", path.display()), e)
        })?;
        let mut reader = BufReader::new(file);
        let is_y4m = reader
            .fill_buf()
            .map_err(|e| {
                CaptureError::construction_io(SOURCE_NAME, format!("read {}", path.display()), e)
            })?
            .starts_with(y4m::MAGIC.as_bytes());

        if is_y4m {
            let y4m = Y4mReader::new(reader).map_err(|reason| {
                CaptureError::construction(SOURCE_NAME, format!("{}: {}", path.display(), reason))
            })?;
            return Ok(FileBackend::Y4m {
                path: path.to_path_buf(),
                header: y4m.header(),
            });
        }

        #[cfg(feature = "file-ffmpeg")]
        {
            FfmpegFile::inspect(path).map(FileBackend::Ffmpeg).map_err(|reason| {
                CaptureError::construction(SOURCE_NAME, format!("{}: {}", path.display(), reason))
            })
        }
        #[cfg(not(feature = "file-ffmpeg"))]
        {
            Err(CaptureError::construction(
                SOURCE_NAME,
                format!(
                    "{} is not a YUV4MPEG2 file; other formats require the file-ffmpeg feature",
                    path.display()
                ),
            ))
        }
    }

    fn open_reader(&self) -> io::Result<Box<dyn FrameReader>> {
        match self {
            FileBackend::Y4m { path, .. } => {
                let reader = Y4mReader::new(BufReader::new(File::open(path)?))
                    .map_err(|reason| io::Error::new(io::ErrorKind::InvalidData, reason))?;
                Ok(Box::new(reader))
            }
            #[cfg(feature = "file-ffmpeg")]
            FileBackend::Ffmpeg(file) => Ok(Box::new(file.open_reader()?)),
        }
    }

    fn path(&self) -> &Path {
        match self {
            FileBackend::Y4m { path, .. } => path,
            #[cfg(feature = "file-ffmpeg")]
            FileBackend::Ffmpeg(file) => &file.path,
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        match self {
            FileBackend::Y4m { header, .. } => (header.width, header.height),
            #[cfg(feature = "file-ffmpeg")]
            FileBackend::Ffmpeg(file) => (file.width, file.height),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            FileBackend::Y4m { .. } => "y4m",
            #[cfg(feature = "file-ffmpeg")]
            FileBackend::Ffmpeg(_) => "ffmpeg",
        }
    }
}

/// Capture engine that plays a local video file on its own thread.
pub struct PlaybackEngine {
    backend: FileBackend,
    running: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    worker: Option<JoinHandle<Option<io::Error>>>,
}

impl PlaybackEngine {
    /// Open `path` and read enough of it to know its format and dimensions.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let backend = FileBackend::sniff(path.as_ref())?;
        let (width, height) = backend.dimensions();
        log::info!(
            "PlaybackEngine: opened {} ({}, {}x{})",
            backend.path().display(),
            backend.name(),
            width,
            height
        );
        Ok(Self {
            backend,
            running: Arc::new(AtomicBool::new(false)),
            frames: Arc::new(AtomicU64::new(0)),
            worker: None,
        })
    }

    pub fn path(&self) -> &Path {
        self.backend.path()
    }

    /// Frame dimensions stored in the file.
    pub fn dimensions(&self) -> (u32, u32) {
        self.backend.dimensions()
    }

    /// Frames delivered since construction.
    pub fn frames_produced(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl CaptureEngine for PlaybackEngine {
    fn name(&self) -> &str {
        self.backend.name()
    }

    fn start(
        &mut self,
        format: CaptureFormat,
        sink: Arc<dyn FrameSink>,
        context: &CaptureContext,
    ) -> Result<(), CaptureError> {
        if self.worker.is_some() {
            return Err(CaptureError::Engine(format!(
                "playback of {} is already running",
                self.path().display()
            )));
        }

        let interval = format.frame_interval(DEFAULT_PLAYBACK_FPS);
        let backend = self.backend.clone();
        let running = Arc::clone(&self.running);
        let frames = Arc::clone(&self.frames);
        self.running.store(true, Ordering::Release);

        let worker = thread::Builder::new()
            .name(format!("{}-file", context.thread_name))
            .spawn(move || play(&backend, interval, sink, &running, &frames))
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                CaptureError::Engine(format!("failed to spawn playback thread: {}", e))
            })?;
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        let Some(worker) = self.worker.take() else {
            return Err(CaptureError::Engine(format!(
                "playback of {} is not running",
                self.path().display()
            )));
        };
        self.running.store(false, Ordering::Release);
        worker.thread().unpark();
        let failure = worker
            .join()
            .map_err(|_| CaptureError::Interrupted("file playback thread panicked".to_string()))?;
        match failure {
            Some(e) => Err(CaptureError::Interrupted(format!(
                "playback of {} failed: {}",
                self.path().display(),
                e
            ))),
            None => Ok(()),
        }
    }

    fn release(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.stop() {
                log::warn!("PlaybackEngine: release: {}", e);
            }
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.release();
    }
}

fn play(
    backend: &FileBackend,
    interval: Duration,
    sink: Arc<dyn FrameSink>,
    running: &AtomicBool,
    frames: &AtomicU64,
) -> Option<io::Error> {
    let mut reader = match backend.open_reader() {
        Ok(reader) => reader,
        Err(e) => {
            log::error!(
                "PlaybackEngine: cannot reopen {}: {}",
                backend.path().display(),
                e
            );
            sink.on_capturer_started(false);
            return Some(e);
        }
    };
    let (width, height) = reader.dimensions();
    let started = Instant::now();
    let mut frames_since_rewind = 0u64;
    let mut failure = None;

    sink.on_capturer_started(true);
    while running.load(Ordering::Acquire) {
        let data = match reader.read_frame() {
            Ok(Some(data)) => data,
            Ok(None) if frames_since_rewind == 0 => {
                log::warn!("PlaybackEngine: file has no frames, ending playback");
                sink.on_end_of_stream();
                break;
            }
            Ok(None) => {
                log::debug!("PlaybackEngine: end of file, looping");
                frames_since_rewind = 0;
                if let Err(e) = reader.rewind() {
                    failure = Some(e);
                    break;
                }
                continue;
            }
            Err(e) => {
                log::error!("PlaybackEngine: read failed: {}", e);
                failure = Some(e);
                break;
            }
        };
        frames_since_rewind += 1;
        if let Some(frame) = VideoFrame::from_i420(width, height, started.elapsed(), data) {
            sink.on_frame(&frame);
            frames.fetch_add(1, Ordering::Relaxed);
        }
        thread::park_timeout(interval);
    }
    sink.on_capturer_stopped();
    failure
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::y4m::encode;
    use crate::frame::FrameCounter;
    use std::io::Write;

    fn y4m_file(width: u32, height: u32, frames: &[u8]) -> anyhow::Result<tempfile::NamedTempFile> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(&encode(width, height, frames))?;
        file.flush()?;
        Ok(file)
    }

    fn wait_for(counter: &FrameCounter, min: u64) {
        let deadline = Instant::now() + Duration::from_secs(3);
        while counter.frames_rendered() < min && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn sniffs_y4m_backend_and_dimensions() -> anyhow::Result<()> {
        let file = y4m_file(8, 4, &[0])?;
        let engine = PlaybackEngine::open(file.path())?;
        assert_eq!(engine.name(), "y4m");
        assert_eq!(engine.dimensions(), (8, 4));
        assert_eq!(engine.path(), file.path());
        Ok(())
    }

    #[test]
    fn plays_at_requested_cadence_and_loops() -> anyhow::Result<()> {
        let file = y4m_file(8, 4, &[10, 20])?;
        let mut engine = PlaybackEngine::open(file.path())?;
        let counter = Arc::new(FrameCounter::new());
        engine.start(
            CaptureFormat::new(0, 0, 120),
            counter.clone(),
            &CaptureContext::default(),
        )?;
        wait_for(&counter, 5);
        engine.stop()?;

        assert!(counter.frames_rendered() >= 5, "playback should loop past 2 frames");
        assert_eq!(engine.frames_produced(), counter.frames_rendered());
        assert!(counter.stopped());
        Ok(())
    }

    #[test]
    fn stop_without_start_is_an_engine_error() -> anyhow::Result<()> {
        let file = y4m_file(8, 4, &[0])?;
        let mut engine = PlaybackEngine::open(file.path())?;
        assert!(matches!(engine.stop(), Err(CaptureError::Engine(_))));
        Ok(())
    }

    #[test]
    fn deleted_file_fails_on_start_as_interrupted() -> anyhow::Result<()> {
        let file = y4m_file(8, 4, &[0])?;
        let mut engine = PlaybackEngine::open(file.path())?;
        file.close()?;

        let counter = Arc::new(FrameCounter::new());
        engine.start(
            CaptureFormat::default(),
            counter.clone(),
            &CaptureContext::default(),
        )?;
        assert!(matches!(engine.stop(), Err(CaptureError::Interrupted(_))));
        assert!(!counter.started());
        Ok(())
    }
}
