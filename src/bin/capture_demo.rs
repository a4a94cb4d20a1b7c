//! capture_demo - run one capture source through a local stream.
//!
//! This binary:
//! 1. Builds the selected capturer (synthetic, camera, screen or file)
//! 2. Wraps it in a `LocalStream`, which initializes and starts it
//! 3. Waits for the first frame through a `CallbackLatch`
//! 4. Counts frames until the duration elapses or Ctrl-C arrives
//! 5. Disposes the stream

use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use rtc_capture::{
    CallbackLatch, CameraCapturer, CaptureConfig, Facing, FileCapturer, FrameCounter, FrameSink,
    LocalStream, PatternEngine, ProjectionGrant, ScreenCapturer, StaticEnumerator,
    SyntheticCapturer, VideoCapturer, VideoFrame,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Source {
    Synthetic,
    Camera,
    Screen,
    File,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Drive a video capturer through a local stream and report what it delivers"
)]
struct Args {
    /// Capture source to run.
    #[arg(long, value_enum, default_value = "camera")]
    source: Source,

    /// YUV4MPEG2 file for --source file (defaults to the configured raw file).
    #[arg(long)]
    path: Option<PathBuf>,

    /// How long to capture before disposing the stream.
    #[arg(long, default_value = "3")]
    seconds: u64,

    /// Wait for the first frame (defaults to the configured latch timeout).
    #[arg(long, env = "RTC_CAPTURE_TIMEOUT_MS")]
    timeout_ms: Option<u64>,
}

/// Signals the latch with the dimensions of the first frame, then only counts.
struct FirstFrame {
    latch: Arc<CallbackLatch<(u32, u32)>>,
    seen: AtomicBool,
    counter: FrameCounter,
}

impl FrameSink for FirstFrame {
    fn on_capturer_started(&self, success: bool) {
        self.counter.on_capturer_started(success);
    }

    fn on_frame(&self, frame: &VideoFrame) {
        self.counter.on_frame(frame);
        if !self.seen.swap(true, Ordering::AcqRel) {
            if let Err(e) = self.latch.signal_success(frame.dimensions()) {
                log::warn!("first frame latch: {}", e);
            }
        }
    }

    fn on_capturer_stopped(&self) {
        self.counter.on_capturer_stopped();
    }

    fn on_end_of_stream(&self) {
        self.counter.on_end_of_stream();
    }
}

fn build_capturer(args: &Args, config: &CaptureConfig) -> Result<Box<dyn VideoCapturer>> {
    let capturer: Box<dyn VideoCapturer> = match args.source {
        Source::Synthetic => Box::new(SyntheticCapturer::new()),
        Source::Camera => {
            let enumerator = StaticEnumerator::new()
                .with_device("pattern:front", Facing::Front)
                .with_device("pattern:back", Facing::Back);
            Box::new(CameraCapturer::new(
                config.camera.clone(),
                &enumerator,
                Box::new(PatternEngine::new("camera")),
            )?)
        }
        Source::Screen => Box::new(ScreenCapturer::new(
            ProjectionGrant::new("capture-demo"),
            config.screen.width,
            config.screen.height,
            Box::new(PatternEngine::new("screen")),
        )?),
        Source::File => {
            let path = args
                .path
                .clone()
                .or_else(|| config.raw_file.clone())
                .ok_or_else(|| anyhow!("--source file needs --path or RTC_CAPTURE_RAW_FILE"))?;
            Box::new(FileCapturer::open(path)?)
        }
    };
    Ok(capturer)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = CaptureConfig::load()?;
    let timeout = args
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(config.timeout);

    let capturer = build_capturer(&args, &config)?;
    let metadata = capturer.metadata();
    log::info!(
        "capture_demo: {} source declares {}x{}@{}",
        metadata.source_kind,
        metadata.width,
        metadata.height,
        metadata.fps
    );

    let stream = LocalStream::with_video(capturer)?;
    log::info!("capture_demo: stream {} started", stream.id());

    let latch = Arc::new(CallbackLatch::new());
    let sink = Arc::new(FirstFrame {
        latch: Arc::clone(&latch),
        seen: AtomicBool::new(false),
        counter: FrameCounter::new(),
    });
    stream.attach(sink.clone())?;

    if matches!(args.source, Source::Synthetic) {
        log::info!("capture_demo: synthetic capturer produces no frames");
    } else if latch.await_result(true, timeout) {
        if let Some((width, height)) = latch.value() {
            log::info!(
                "capture_demo: first frame {}x{} after {:?}",
                width,
                height,
                latch.completion_latency().unwrap_or_default()
            );
        }
    } else {
        log::warn!("capture_demo: no frame within {:?}", timeout);
    }

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    match rx.recv_timeout(Duration::from_secs(args.seconds)) {
        Ok(()) => log::info!("capture_demo: shutdown signal received"),
        Err(_) => log::info!("capture_demo: capture window elapsed"),
    }

    let resolution = stream.effective_resolution();
    let delivered = stream.frames_delivered();
    stream.dispose()?;

    log::info!(
        "capture_demo: {} frames delivered, {} rendered, resolution {:?}, ended {}",
        delivered,
        sink.counter.frames_rendered(),
        resolution,
        sink.counter.ended()
    );
    Ok(())
}
