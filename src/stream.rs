//! Local media streams.
//!
//! A `LocalStream` owns at most one video capturer and one audio track. On
//! construction it binds the capturer to the stream's video track and starts
//! capture with the capturer's declared metadata. `dispose` stops capture,
//! disposes the capturer and notifies observers. Nothing is finalised
//! implicitly; the owner must call `dispose`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rand::RngCore;

use crate::capture::{CaptureContext, CaptureMetadata, SourceKind, VideoCapturer};
use crate::error::{CaptureError, StreamError};
use crate::frame::{FrameSink, VideoFrame};

/// Notified about stream-level events.
pub trait StreamObserver: Send + Sync {
    fn on_ended(&self);

    fn on_updated(&self) {}
}

/// Origin of a stream's audio.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AudioSourceKind {
    Mic,
    File,
    Mixed,
    Other,
}

impl AudioSourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AudioSourceKind::Mic => "mic",
            AudioSourceKind::File => "file",
            AudioSourceKind::Mixed => "mixed",
            AudioSourceKind::Other => "other",
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label {
            "mic" => AudioSourceKind::Mic,
            "file" => AudioSourceKind::File,
            "mixed" => AudioSourceKind::Mixed,
            _ => AudioSourceKind::Other,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamSourceInfo {
    pub video: Option<SourceKind>,
    pub audio: Option<AudioSourceKind>,
}

/// Audio processing options for a local audio track.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AudioTrackConstraints {
    pub echo_cancellation: bool,
    pub extended_filter_echo_cancellation: bool,
    pub delay_agnostic_echo_cancellation: bool,
}

impl AudioTrackConstraints {
    /// Mandatory media-engine constraints for the enabled options.
    pub fn constraint_pairs(&self) -> Vec<(&'static str, &'static str)> {
        let mut pairs = Vec::new();
        if self.echo_cancellation {
            pairs.push(("googEchoCancellation", "true"));
        }
        if self.extended_filter_echo_cancellation {
            pairs.push(("googEchoCancellation2", "true"));
        }
        if self.delay_agnostic_echo_cancellation {
            pairs.push(("googDAEchoCancellation", "true"));
        }
        pairs
    }
}

/// Video track: the sink a capturer is bound to. Fans frames out to attached
/// renderers while enabled.
struct VideoTrack {
    id: String,
    enabled: AtomicBool,
    frames: AtomicU64,
    first_frame: Mutex<Option<(u32, u32)>>,
    sinks: Mutex<Vec<Arc<dyn FrameSink>>>,
}

impl VideoTrack {
    fn new(id: String) -> Self {
        Self {
            id,
            enabled: AtomicBool::new(true),
            frames: AtomicU64::new(0),
            first_frame: Mutex::new(None),
            sinks: Mutex::new(Vec::new()),
        }
    }

    fn sinks(&self) -> Vec<Arc<dyn FrameSink>> {
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn first_frame(&self) -> Option<(u32, u32)> {
        *self.first_frame.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FrameSink for VideoTrack {
    fn on_capturer_started(&self, success: bool) {
        if !success {
            log::warn!("LocalStream: capturer for {} failed to start", self.id);
        }
        for sink in self.sinks() {
            sink.on_capturer_started(success);
        }
    }

    fn on_frame(&self, frame: &VideoFrame) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.first_frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert((frame.width, frame.height));
        if !self.enabled.load(Ordering::Acquire) {
            return;
        }
        for sink in self.sinks() {
            sink.on_frame(frame);
        }
    }

    fn on_capturer_stopped(&self) {
        for sink in self.sinks() {
            sink.on_capturer_stopped();
        }
    }

    fn on_end_of_stream(&self) {
        log::info!("LocalStream: source of {} ended", self.id);
        for sink in self.sinks() {
            sink.on_end_of_stream();
        }
    }
}

struct AudioTrack {
    id: String,
    constraints: AudioTrackConstraints,
    enabled: bool,
}

/// A stream created by this client from local sources.
pub struct LocalStream {
    id: String,
    source_info: StreamSourceInfo,
    metadata: Option<CaptureMetadata>,
    capturer: Option<Box<dyn VideoCapturer>>,
    video: Option<Arc<VideoTrack>>,
    audio: Option<AudioTrack>,
    attributes: HashMap<String, String>,
    observers: Vec<Arc<dyn StreamObserver>>,
}

impl LocalStream {
    /// Video-only stream.
    pub fn with_video(capturer: Box<dyn VideoCapturer>) -> Result<Self, StreamError> {
        Self::new(Some(capturer), None)
    }

    /// Audio-only stream.
    pub fn with_audio(constraints: AudioTrackConstraints) -> Result<Self, StreamError> {
        Self::new(None, Some(constraints))
    }

    /// Build a stream and start capture. A capturer that fails to initialise or
    /// start is disposed before the error is returned.
    pub fn new(
        video: Option<Box<dyn VideoCapturer>>,
        audio: Option<AudioTrackConstraints>,
    ) -> Result<Self, StreamError> {
        if video.is_none() && audio.is_none() {
            return Err(StreamError::NoTracks);
        }

        let id = random_stream_id();
        let mut stream = Self {
            source_info: StreamSourceInfo {
                video: None,
                audio: audio.as_ref().map(|_| AudioSourceKind::Mic),
            },
            metadata: None,
            capturer: None,
            video: None,
            audio: audio.map(|constraints| AudioTrack {
                id: format!("{}a0", id),
                constraints,
                enabled: true,
            }),
            attributes: HashMap::new(),
            observers: Vec::new(),
            id,
        };

        if let Some(mut capturer) = video {
            let metadata = capturer.metadata();
            let track = Arc::new(VideoTrack::new(format!("{}v0", stream.id)));
            let context = CaptureContext {
                thread_name: format!("stream-{}", &stream.id[..8]),
                ..CaptureContext::default()
            };
            let started = capturer
                .initialize(track.clone(), context)
                .and_then(|()| {
                    capturer.start_capture(metadata.width, metadata.height, metadata.fps)
                });
            if let Err(e) = started {
                log::warn!("LocalStream: {} capturer failed: {}", metadata.source_kind, e);
                capturer.dispose();
                return Err(e.into());
            }
            log::info!(
                "LocalStream: {} capturing from {} ({}x{}@{})",
                stream.id,
                metadata.source_kind,
                metadata.width,
                metadata.height,
                metadata.fps
            );
            stream.source_info.video = Some(metadata.source_kind);
            stream.metadata = Some(metadata);
            stream.capturer = Some(capturer);
            stream.video = Some(track);
        }

        Ok(stream)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn source_info(&self) -> StreamSourceInfo {
        self.source_info
    }

    pub fn video_track_id(&self) -> Option<&str> {
        self.video.as_ref().map(|track| track.id.as_str())
    }

    pub fn audio_track_id(&self) -> Option<&str> {
        self.audio.as_ref().map(|track| track.id.as_str())
    }

    pub fn audio_constraints(&self) -> Option<&AudioTrackConstraints> {
        self.audio.as_ref().map(|track| &track.constraints)
    }

    /// Metadata declared by the capturer, if the stream has video.
    pub fn metadata(&self) -> Option<CaptureMetadata> {
        self.metadata
    }

    pub fn resolution_width(&self) -> u32 {
        self.metadata.map_or(0, |m| m.width)
    }

    pub fn resolution_height(&self) -> u32 {
        self.metadata.map_or(0, |m| m.height)
    }

    pub fn frame_rate(&self) -> u32 {
        self.metadata.map_or(0, |m| m.fps)
    }

    /// Declared resolution when non-zero, otherwise the first delivered frame's.
    pub fn effective_resolution(&self) -> Option<(u32, u32)> {
        match self.metadata {
            Some(metadata) if metadata.has_resolution() => Some((metadata.width, metadata.height)),
            _ => self.video.as_ref().and_then(|track| track.first_frame()),
        }
    }

    /// Frames the capturer delivered to the video track, enabled or not.
    pub fn frames_delivered(&self) -> u64 {
        self.video
            .as_ref()
            .map_or(0, |track| track.frames.load(Ordering::Relaxed))
    }

    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }

    pub fn set_attributes(&mut self, attributes: HashMap<String, String>) {
        self.attributes = attributes;
    }

    pub fn enable_video(&self) {
        self.set_video_enabled(true);
    }

    pub fn disable_video(&self) {
        self.set_video_enabled(false);
    }

    pub fn is_video_enabled(&self) -> bool {
        self.video
            .as_ref()
            .is_some_and(|track| track.enabled.load(Ordering::Acquire))
    }

    fn set_video_enabled(&self, enabled: bool) {
        if let Some(track) = &self.video {
            track.enabled.store(enabled, Ordering::Release);
        }
    }

    pub fn enable_audio(&mut self) {
        if let Some(track) = &mut self.audio {
            track.enabled = true;
        }
    }

    pub fn disable_audio(&mut self) {
        if let Some(track) = &mut self.audio {
            track.enabled = false;
        }
    }

    pub fn is_audio_enabled(&self) -> bool {
        self.audio.as_ref().is_some_and(|track| track.enabled)
    }

    /// Render the video track into `sink`.
    pub fn attach(&self, sink: Arc<dyn FrameSink>) -> Result<(), StreamError> {
        let track = self.video.as_ref().ok_or(StreamError::NoVideoTrack)?;
        track
            .sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink);
        Ok(())
    }

    /// Stop rendering into `sink`. Detaching a sink that is not attached is a no-op.
    pub fn detach<S: FrameSink + ?Sized>(&self, sink: &Arc<S>) -> Result<(), StreamError> {
        let track = self.video.as_ref().ok_or(StreamError::NoVideoTrack)?;
        let target = Arc::as_ptr(sink).cast::<()>();
        track
            .sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|attached| Arc::as_ptr(attached).cast::<()>() != target);
        Ok(())
    }

    pub fn add_observer(&mut self, observer: Arc<dyn StreamObserver>) {
        self.observers.push(observer);
    }

    /// Forward a live format change to the capturer.
    pub fn change_capture_format(
        &mut self,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<(), StreamError> {
        let capturer = self.capturer.as_mut().ok_or(StreamError::NoVideoTrack)?;
        capturer.change_capture_format(width, height, fps)?;
        Ok(())
    }

    /// Concrete capturer, for variant-specific operations such as
    /// `CameraCapturer::switch_camera`.
    pub fn capturer_mut<C: VideoCapturer + 'static>(&mut self) -> Option<&mut C> {
        self.capturer.as_mut()?.as_any_mut().downcast_mut::<C>()
    }

    /// Stop capture, dispose the capturer and notify observers. A capturer
    /// that fails to stop cleanly is still disposed; the stop error is
    /// returned afterwards.
    pub fn dispose(mut self) -> Result<(), StreamError> {
        let mut result = Ok(());
        if let Some(mut capturer) = self.capturer.take() {
            match capturer.stop_capture() {
                Ok(()) | Err(CaptureError::State { .. }) => {}
                Err(e) => {
                    log::warn!("LocalStream: {} stop failed: {}", self.id, e);
                    result = Err(e.into());
                }
            }
            capturer.dispose();
        }
        self.video = None;
        self.audio = None;
        for observer in &self.observers {
            observer.on_ended();
        }
        log::info!("LocalStream: {} disposed", self.id);
        result
    }
}

fn random_stream_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
