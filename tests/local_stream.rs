use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;

use rtc_capture::frame::i420_len;
use rtc_capture::{
    AudioSourceKind, AudioTrackConstraints, CallbackLatch, CameraCapturer, EventObserver, Facing,
    FileCapturer, FrameCounter, LifecycleCall, LocalStream, PatternEngine, ProjectionGrant,
    ScreenCapturer, SourceKind, StaticEnumerator, StreamError, SyntheticCapturer,
    VideoTrackConstraints,
};

fn wait_for(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let until = Instant::now() + deadline;
    while Instant::now() < until {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

fn pattern_camera(width: u32, height: u32) -> CameraCapturer {
    let enumerator = StaticEnumerator::new()
        .with_device("front", Facing::Front)
        .with_device("back", Facing::Back);
    CameraCapturer::new(
        VideoTrackConstraints {
            width,
            height,
            fps: 60,
            ..VideoTrackConstraints::default()
        },
        &enumerator,
        Box::new(PatternEngine::new("camera")),
    )
    .expect("camera")
}

#[test]
fn synthetic_stream_drives_capturer_lifecycle() {
    let capturer = SyntheticCapturer::new();
    let journal = capturer.journal();

    let stream = LocalStream::with_video(Box::new(capturer)).expect("stream");
    assert!(stream.has_video());
    assert!(!stream.has_audio());
    assert_eq!(stream.resolution_width(), 640);
    assert_eq!(stream.resolution_height(), 480);
    assert_eq!(stream.frame_rate(), 30);
    assert_eq!(stream.source_info().video, Some(SourceKind::Camera));
    assert_eq!(stream.id().len(), 32);
    assert_eq!(stream.video_track_id(), Some(format!("{}v0", stream.id()).as_str()));

    stream.dispose().expect("dispose");
    assert_eq!(
        journal.calls(),
        vec![
            LifecycleCall::Initialize,
            LifecycleCall::StartCapture {
                width: 640,
                height: 480,
                fps: 30
            },
            LifecycleCall::StopCapture,
            LifecycleCall::Dispose,
        ]
    );
}

#[test]
fn stream_without_tracks_is_rejected() {
    assert!(matches!(
        LocalStream::new(None, None),
        Err(StreamError::NoTracks)
    ));
}

#[test]
fn audio_only_stream_has_no_video_track() {
    let constraints = AudioTrackConstraints {
        echo_cancellation: true,
        ..AudioTrackConstraints::default()
    };
    let mut stream = LocalStream::with_audio(constraints).expect("audio stream");
    assert!(stream.has_audio());
    assert!(!stream.has_video());
    assert_eq!(stream.source_info().audio, Some(AudioSourceKind::Mic));
    assert_eq!(
        stream.audio_constraints().map(|c| c.constraint_pairs()),
        Some(vec![("googEchoCancellation", "true")])
    );
    assert!(matches!(
        stream.attach(Arc::new(FrameCounter::new())),
        Err(StreamError::NoVideoTrack)
    ));

    stream.disable_audio();
    assert!(!stream.is_audio_enabled());
    stream.enable_audio();
    assert!(stream.is_audio_enabled());
    stream.dispose().expect("dispose");
}

#[test]
fn camera_frames_reach_attached_sink_until_disabled() {
    let stream = LocalStream::with_video(Box::new(pattern_camera(32, 16))).expect("stream");
    let renderer = Arc::new(FrameCounter::new());
    stream.attach(renderer.clone()).expect("attach");

    assert!(wait_for(Duration::from_secs(3), || renderer.frames_rendered() >= 2));
    assert_eq!(renderer.frame_dimensions(), (32, 16));

    stream.disable_video();
    assert!(!stream.is_video_enabled());
    // Let any frame already in flight land before sampling.
    thread::sleep(Duration::from_millis(50));
    let rendered = renderer.frames_rendered();
    let delivered = stream.frames_delivered();
    assert!(wait_for(Duration::from_secs(3), || stream.frames_delivered() > delivered + 2));
    assert_eq!(renderer.frames_rendered(), rendered);

    stream.enable_video();
    assert!(wait_for(Duration::from_secs(3), || renderer.frames_rendered() > rendered));

    stream.detach(&renderer).expect("detach");
    stream.dispose().expect("dispose");
}

#[test]
fn first_frame_latch_observes_capture() {
    struct FirstFrame {
        latch: CallbackLatch<(u32, u32)>,
        seen: AtomicBool,
    }

    impl rtc_capture::FrameSink for FirstFrame {
        fn on_capturer_started(&self, _success: bool) {}

        fn on_frame(&self, frame: &rtc_capture::VideoFrame) {
            if !self.seen.swap(true, Ordering::AcqRel) {
                self.latch
                    .signal_success(frame.dimensions())
                    .expect("first frame");
            }
        }

        fn on_capturer_stopped(&self) {}
    }

    let stream = LocalStream::with_video(Box::new(pattern_camera(24, 12))).expect("stream");
    let sink = Arc::new(FirstFrame {
        latch: CallbackLatch::new(),
        seen: AtomicBool::new(false),
    });
    stream.attach(sink.clone()).expect("attach");

    assert!(sink.latch.await_result(true, Duration::from_secs(5)));
    assert_eq!(sink.latch.value(), Some((24, 12)));
    stream.dispose().expect("dispose");
}

#[test]
fn file_stream_learns_resolution_from_first_frame() {
    let mut clip = NamedTempFile::new().expect("temp clip");
    let mut bytes = b"YUV4MPEG2 W20 H10 F30:1 C420jpeg\n".to_vec();
    for value in [0u8, 90, 180] {
        bytes.extend_from_slice(b"FRAME\n");
        bytes.extend(std::iter::repeat(value).take(i420_len(20, 10).expect("frame size")));
    }
    clip.write_all(&bytes).expect("write clip");
    clip.flush().expect("flush clip");

    let stream = LocalStream::with_video(Box::new(FileCapturer::open(clip.path()).expect("file")))
        .expect("stream");
    assert_eq!(stream.resolution_width(), 0);
    assert_eq!(stream.resolution_height(), 0);
    assert_eq!(stream.frame_rate(), 30);
    assert_eq!(stream.source_info().video, Some(SourceKind::RawFile));

    assert!(wait_for(Duration::from_secs(3), || stream.effective_resolution().is_some()));
    assert_eq!(stream.effective_resolution(), Some((20, 10)));
    stream.dispose().expect("dispose");
}

#[test]
fn screen_stop_notification_ends_attached_renderers() {
    let capturer = ScreenCapturer::new(
        ProjectionGrant::new("grant"),
        64,
        32,
        Box::new(PatternEngine::new("screen")),
    )
    .expect("screen");
    let stop = capturer.stop_handle();

    let stream = LocalStream::with_video(Box::new(capturer)).expect("stream");
    assert_eq!(stream.source_info().video, Some(SourceKind::ScreenCast));
    let renderer = Arc::new(FrameCounter::new());
    stream.attach(renderer.clone()).expect("attach");
    assert!(wait_for(Duration::from_secs(3), || renderer.frames_rendered() >= 1));
    assert!(!renderer.ended());

    thread::spawn(move || stop.notify_stopped())
        .join()
        .expect("notify thread");
    assert!(renderer.ended());

    let rendered = renderer.frames_rendered();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(renderer.frames_rendered(), rendered);
    stream.dispose().expect("dispose");
}

#[test]
fn observer_sees_stream_end_on_dispose() {
    let mut stream = LocalStream::with_video(Box::new(SyntheticCapturer::new())).expect("stream");
    let observer = Arc::new(EventObserver::new("local", "stream-1"));
    stream.add_observer(observer.clone());

    assert!(!observer.await_event(Duration::from_millis(50)));
    stream.dispose().expect("dispose");
    assert!(observer.await_event(Duration::from_millis(1000)));
}

#[test]
fn switch_camera_through_stream() {
    let mut stream = LocalStream::with_video(Box::new(pattern_camera(16, 16))).expect("stream");
    let camera = stream
        .capturer_mut::<CameraCapturer>()
        .expect("camera capturer");
    assert_eq!(camera.device_name(), "front");
    assert_eq!(camera.switch_camera().expect("switch"), "back");
    assert!(stream.capturer_mut::<SyntheticCapturer>().is_none());

    stream
        .change_capture_format(32, 32, 15)
        .expect("format change");
    stream.dispose().expect("dispose");
}

#[test]
fn attributes_are_replaced_wholesale() {
    let mut stream = LocalStream::with_video(Box::new(SyntheticCapturer::new())).expect("stream");
    assert!(stream.attributes().is_empty());

    let mut attributes = HashMap::new();
    attributes.insert("role".to_string(), "presenter".to_string());
    stream.set_attributes(attributes.clone());
    assert_eq!(stream.attributes(), &attributes);
    stream.dispose().expect("dispose");
}
