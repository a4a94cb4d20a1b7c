//! Camera capturer.
//!
//! `CameraCapturer` reports the resolution and frame rate from the track
//! constraints it was built with. The engine may renegotiate the actual format;
//! the declared metadata does not change.
//!
//! Device selection follows the constraints' facing preference and falls back
//! to the first enumerated device. `switch_camera` cycles through devices in
//! enumeration order without rebuilding the capturer.

use std::any::Any;
use std::sync::Arc;

use super::engine::CaptureEngine;
use super::{
    CaptureContext, CaptureLifecycle, CaptureMetadata, LifecycleState, SourceKind, VideoCapturer,
};
use crate::error::CaptureError;
use crate::frame::{CaptureFormat, FrameSink, MAX_FRAME_DIMENSION};

const SOURCE_NAME: &str = "camera capturer";

/// Constraints for a camera video track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoTrackConstraints {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Prefer a front-facing camera over a back-facing one.
    pub front_facing: bool,
    pub capture_to_texture: bool,
}

impl Default for VideoTrackConstraints {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            front_facing: true,
            capture_to_texture: true,
        }
    }
}

/// Lists the cameras available to the capture engine.
pub trait CameraEnumerator {
    fn device_names(&self) -> Vec<String>;
    fn is_front_facing(&self, device: &str) -> bool;
    fn is_back_facing(&self, device: &str) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Facing {
    Front,
    Back,
    External,
}

/// Enumerator over a fixed device list.
#[derive(Clone, Debug, Default)]
pub struct StaticEnumerator {
    devices: Vec<(String, Facing)>,
}

impl StaticEnumerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, name: impl Into<String>, facing: Facing) -> Self {
        self.devices.push((name.into(), facing));
        self
    }

    fn facing(&self, device: &str) -> Option<Facing> {
        self.devices
            .iter()
            .find(|(name, _)| name == device)
            .map(|(_, facing)| *facing)
    }
}

impl CameraEnumerator for StaticEnumerator {
    fn device_names(&self) -> Vec<String> {
        self.devices.iter().map(|(name, _)| name.clone()).collect()
    }

    fn is_front_facing(&self, device: &str) -> bool {
        self.facing(device) == Some(Facing::Front)
    }

    fn is_back_facing(&self, device: &str) -> bool {
        self.facing(device) == Some(Facing::Back)
    }
}

/// Camera-backed video capturer.
pub struct CameraCapturer {
    constraints: VideoTrackConstraints,
    devices: Vec<String>,
    device_index: usize,
    engine: Box<dyn CaptureEngine>,
    lifecycle: CaptureLifecycle,
    sink: Option<Arc<dyn FrameSink>>,
    context: CaptureContext,
}

impl CameraCapturer {
    pub fn new(
        constraints: VideoTrackConstraints,
        enumerator: &dyn CameraEnumerator,
        mut engine: Box<dyn CaptureEngine>,
    ) -> Result<Self, CaptureError> {
        if constraints.width == 0 || constraints.height == 0 || constraints.fps == 0 {
            return Err(CaptureError::construction(
                SOURCE_NAME,
                format!(
                    "constraints must be non-zero, got {}x{}@{}",
                    constraints.width, constraints.height, constraints.fps
                ),
            ));
        }

        if constraints.width > MAX_FRAME_DIMENSION || constraints.height > MAX_FRAME_DIMENSION {
            return Err(CaptureError::construction(
                SOURCE_NAME,
                format!(
                    "constraints exceed {} pixels per side, got {}x{}",
                    MAX_FRAME_DIMENSION, constraints.width, constraints.height
                ),
            ));
        }

        let devices = enumerator.device_names();
        if devices.is_empty() {
            return Err(CaptureError::construction(SOURCE_NAME, "no camera devices"));
        }
        let device_index = devices
            .iter()
            .position(|device| {
                if constraints.front_facing {
                    enumerator.is_front_facing(device)
                } else {
                    enumerator.is_back_facing(device)
                }
            })
            .unwrap_or(0);

        engine
            .select_device(&devices[device_index])
            .map_err(|e| CaptureError::construction(SOURCE_NAME, e.to_string()))?;

        log::info!(
            "CameraCapturer: using {} at {}x{}@{}",
            devices[device_index],
            constraints.width,
            constraints.height,
            constraints.fps
        );

        let context = CaptureContext {
            capture_to_texture: constraints.capture_to_texture,
            ..CaptureContext::default()
        };
        Ok(Self {
            constraints,
            devices,
            device_index,
            engine,
            lifecycle: CaptureLifecycle::new(),
            sink: None,
            context,
        })
    }

    /// Name of the active device.
    pub fn device_name(&self) -> &str {
        &self.devices[self.device_index]
    }

    pub fn constraints(&self) -> &VideoTrackConstraints {
        &self.constraints
    }

    /// Swap to the next physical camera. Works in any lifecycle state; a
    /// running capture continues on the new device.
    pub fn switch_camera(&mut self) -> Result<&str, CaptureError> {
        if self.devices.len() < 2 {
            return Err(CaptureError::NoAlternateCamera);
        }
        let next = (self.device_index + 1) % self.devices.len();
        self.engine.select_device(&self.devices[next])?;
        self.device_index = next;
        log::info!("CameraCapturer: switched to {}", self.devices[next]);
        Ok(self.device_name())
    }
}

impl VideoCapturer for CameraCapturer {
    fn metadata(&self) -> CaptureMetadata {
        CaptureMetadata {
            width: self.constraints.width,
            height: self.constraints.height,
            fps: self.constraints.fps,
            source_kind: SourceKind::Camera,
        }
    }

    fn initialize(
        &mut self,
        sink: Arc<dyn FrameSink>,
        context: CaptureContext,
    ) -> Result<(), CaptureError> {
        self.lifecycle.check_initialize()?;
        self.sink = Some(sink);
        self.context = CaptureContext {
            capture_to_texture: context.capture_to_texture && self.constraints.capture_to_texture,
            ..context
        };
        self.lifecycle.advance(LifecycleState::Initialized);
        Ok(())
    }

    fn start_capture(&mut self, width: u32, height: u32, fps: u32) -> Result<(), CaptureError> {
        self.lifecycle.check_start()?;
        let sink = self.sink.clone().ok_or(CaptureError::State {
            operation: "start_capture",
            state: LifecycleState::Created,
        })?;
        self.engine
            .start(CaptureFormat::new(width, height, fps), sink, &self.context)?;
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
            log::warn!("CameraCapturer: disposed while capturing, stopping engine");
            if let Err(e) = self.engine.stop() {
                log::warn!("CameraCapturer: stop during dispose failed: {}", e);
            }
        }
        self.engine.release();
        self.sink = None;
        log::debug!("CameraCapturer: disposed {}", self.device_name());
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
