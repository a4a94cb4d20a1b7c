use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::Builder;

use rtc_capture::CaptureConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "RTC_CAPTURE_CONFIG",
        "RTC_CAPTURE_CAMERA_WIDTH",
        "RTC_CAPTURE_CAMERA_HEIGHT",
        "RTC_CAPTURE_CAMERA_FPS",
        "RTC_CAPTURE_RAW_FILE",
        "RTC_CAPTURE_TIMEOUT_MS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let cfg = CaptureConfig::load().expect("load defaults");
    assert_eq!(cfg.camera.width, 1280);
    assert_eq!(cfg.camera.height, 720);
    assert_eq!(cfg.camera.fps, 30);
    assert!(cfg.camera.front_facing);
    assert!(cfg.camera.capture_to_texture);
    assert_eq!((cfg.screen.width, cfg.screen.height), (1280, 720));
    assert!(cfg.raw_file.is_none());
    assert_eq!(cfg.timeout, Duration::from_millis(5000));
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let mut file = Builder::new().suffix(".json").tempfile().expect("temp config");
    let json = r#"{
        "camera": { "width": 640, "height": 360, "fps": 15, "front_facing": false },
        "screen": { "width": 1920, "height": 1080 },
        "raw_file": { "path": "/var/media/clip.y4m" },
        "latch": { "timeout_ms": 2500 }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("RTC_CAPTURE_CONFIG", file.path());
    std::env::set_var("RTC_CAPTURE_CAMERA_FPS", "24");
    std::env::set_var("RTC_CAPTURE_RAW_FILE", "/tmp/override.y4m");

    let cfg = CaptureConfig::load().expect("load config");
    clear_env();

    assert_eq!((cfg.camera.width, cfg.camera.height), (640, 360));
    assert_eq!(cfg.camera.fps, 24);
    assert!(!cfg.camera.front_facing);
    assert!(cfg.camera.capture_to_texture);
    assert_eq!((cfg.screen.width, cfg.screen.height), (1920, 1080));
    assert_eq!(cfg.raw_file, Some(PathBuf::from("/tmp/override.y4m")));
    assert_eq!(cfg.timeout, Duration::from_millis(2500));
}

#[test]
fn loads_toml_file_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
[camera]
width = 320
height = 240

[latch]
timeout_ms = 750
"#;
    file.write_all(toml.as_bytes()).expect("write config");
    std::env::set_var("RTC_CAPTURE_CONFIG", file.path());

    let cfg = CaptureConfig::load().expect("load toml config");
    clear_env();

    assert_eq!((cfg.camera.width, cfg.camera.height, cfg.camera.fps), (320, 240, 30));
    assert_eq!(cfg.timeout, Duration::from_millis(750));
}

#[test]
fn blank_env_overrides_are_skipped() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    std::env::set_var("RTC_CAPTURE_TIMEOUT_MS", "");
    std::env::set_var("RTC_CAPTURE_CAMERA_FPS", "  ");
    let cfg = CaptureConfig::load();
    clear_env();

    let cfg = cfg.expect("blank overrides keep defaults");
    assert_eq!(cfg.timeout, Duration::from_millis(5000));
    assert_eq!(cfg.camera.fps, 30);
}

#[test]
fn rejects_invalid_env_and_zero_values() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    std::env::set_var("RTC_CAPTURE_CAMERA_WIDTH", "wide");
    assert!(CaptureConfig::load().is_err());
    clear_env();

    std::env::set_var("RTC_CAPTURE_TIMEOUT_MS", "0");
    assert!(CaptureConfig::load().is_err());
    clear_env();

    std::env::set_var("RTC_CAPTURE_TIMEOUT_MS", "soon");
    assert!(CaptureConfig::load().is_err());
    clear_env();

    std::env::set_var("RTC_CAPTURE_CAMERA_HEIGHT", "0");
    assert!(CaptureConfig::load().is_err());
    clear_env();
}

#[test]
fn rejects_unknown_fields_and_missing_file() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let mut file = Builder::new().suffix(".json").tempfile().expect("temp config");
    file.write_all(br#"{ "microphone": {} }"#).expect("write config");
    std::env::set_var("RTC_CAPTURE_CONFIG", file.path());
    assert!(CaptureConfig::load().is_err());

    std::env::set_var("RTC_CAPTURE_CONFIG", "/nonexistent/rtc-capture.json");
    assert!(CaptureConfig::load().is_err());
    clear_env();
}
