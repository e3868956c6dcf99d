//! Deterministic stand-in for the synchronous camera API.

use super::synthetic_data::{synthetic_frame, synthetic_jpeg, PhoneCameraProfile, SYNTHETIC_FRAME_SIZE};
use crate::backend::legacy::{
    FLASH_MODE_AUTO, FLASH_MODE_OFF, FLASH_MODE_ON, FLASH_MODE_TORCH, FOCUS_MODE_AUTO,
    FOCUS_MODE_CONTINUOUS_PICTURE, FOCUS_MODE_FIXED,
};
use crate::backend::{
    LegacyCamera, LegacyCameraInfo, LegacyDriver, LegacyErrorCallback, LegacyParameters,
};
use crate::errors::CameraError;
use crate::surface::SurfaceHandle;
use crate::types::Facing;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

/// One camera the simulated driver exposes.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyCameraModel {
    pub info: LegacyCameraInfo,
    pub parameters: LegacyParameters,
}

impl LegacyCameraModel {
    pub fn new(facing: Facing, orientation: u32, parameters: LegacyParameters) -> Self {
        Self {
            info: LegacyCameraInfo {
                facing,
                orientation,
            },
            parameters,
        }
    }
}

/// What the driver has been asked to do so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyDriverLog {
    pub opened: Vec<usize>,
    pub released: usize,
    pub preview_starts: usize,
    pub preview_stops: usize,
    pub pictures: usize,
    pub display_orientations: Vec<u32>,
    /// Parameter block of the most recent `set_parameters`.
    pub last_parameters: Option<LegacyParameters>,
}

impl LegacyDriverLog {
    /// Cameras opened and not yet released.
    pub fn open_cameras(&self) -> usize {
        self.opened.len().saturating_sub(self.released)
    }
}

#[derive(Debug, Default)]
struct Faults {
    deny_open: bool,
    unqueryable: HashSet<usize>,
    fail_parameters: bool,
    fail_start_preview: bool,
    fail_capture: bool,
    capture_delay: Duration,
}

#[derive(Default)]
struct Shared {
    faults: Mutex<Faults>,
    log: Mutex<LegacyDriverLog>,
    error_callback: Mutex<Option<LegacyErrorCallback>>,
    frames: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Simulated [`LegacyDriver`] with fault injection.
///
/// Only one camera may be open at a time, as on real hardware; a second
/// `open` fails with `OpenDenied` until the first is released.
pub struct SimulatedLegacyDriver {
    cameras: Vec<LegacyCameraModel>,
    shared: Arc<Shared>,
}

impl SimulatedLegacyDriver {
    pub fn new(cameras: Vec<LegacyCameraModel>) -> Self {
        Self {
            cameras,
            shared: Arc::new(Shared::default()),
        }
    }

    /// A back camera at 90 degrees with every mode, and a front camera at 270
    /// without flash or zoom.
    pub fn phone() -> Self {
        let profile = PhoneCameraProfile::typical();
        let back = LegacyParameters {
            preview_size: profile.preview_sizes.first().copied(),
            supported_preview_sizes: profile.preview_sizes.clone(),
            picture_size: profile.picture_sizes.first().copied(),
            supported_picture_sizes: profile.picture_sizes.clone(),
            flash_mode: Some(FLASH_MODE_OFF.to_string()),
            supported_flash_modes: [FLASH_MODE_OFF, FLASH_MODE_ON, FLASH_MODE_AUTO, FLASH_MODE_TORCH]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            focus_mode: Some(FOCUS_MODE_AUTO.to_string()),
            supported_focus_modes: [FOCUS_MODE_FIXED, FOCUS_MODE_AUTO, FOCUS_MODE_CONTINUOUS_PICTURE]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            scene_mode: Some("auto".to_string()),
            supported_scene_modes: ["auto", "night", "portrait", "landscape", "sports", "barcode"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            color_effect: Some("none".to_string()),
            supported_color_effects: ["none", "mono", "negative", "sepia"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            zoom: 0,
            zoom_ratios: profile.zoom_ratios.clone(),
        };
        let front = LegacyParameters {
            supported_flash_modes: vec![FLASH_MODE_OFF.to_string()],
            flash_mode: Some(FLASH_MODE_OFF.to_string()),
            supported_focus_modes: vec![FOCUS_MODE_FIXED.to_string()],
            focus_mode: Some(FOCUS_MODE_FIXED.to_string()),
            zoom_ratios: Vec::new(),
            ..back.clone()
        };

        Self::new(vec![
            LegacyCameraModel::new(Facing::Back, profile.back_orientation, back),
            LegacyCameraModel::new(Facing::Front, profile.front_orientation, front),
        ])
    }

    /// Refuse every open, as when another app holds the camera.
    pub fn deny_open(&self, deny: bool) {
        lock(&self.shared.faults).deny_open = deny;
    }

    /// Make `camera_info(index)` fail.
    pub fn make_unqueryable(&self, index: usize) {
        lock(&self.shared.faults).unqueryable.insert(index);
    }

    pub fn fail_parameters(&self, fail: bool) {
        lock(&self.shared.faults).fail_parameters = fail;
    }

    pub fn fail_start_preview(&self, fail: bool) {
        lock(&self.shared.faults).fail_start_preview = fail;
    }

    pub fn fail_capture(&self, fail: bool) {
        lock(&self.shared.faults).fail_capture = fail;
    }

    /// Make `take_picture` block this long, like a slow shutter.
    pub fn set_capture_delay(&self, delay: Duration) {
        lock(&self.shared.faults).capture_delay = delay;
    }

    /// Fire the open camera's error callback, as the hardware does on a
    /// media server crash. Returns false when no callback is installed.
    pub fn trigger_hardware_error(&self, code: i32) -> bool {
        match lock(&self.shared.error_callback).as_ref() {
            Some(callback) => {
                callback(code);
                true
            }
            None => false,
        }
    }

    pub fn log(&self) -> LegacyDriverLog {
        lock(&self.shared.log).clone()
    }
}

impl LegacyDriver for SimulatedLegacyDriver {
    fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    fn camera_info(&self, index: usize) -> Result<LegacyCameraInfo, CameraError> {
        if lock(&self.shared.faults).unqueryable.contains(&index) {
            return Err(CameraError::DeviceUnavailable(format!(
                "camera {} info unavailable",
                index
            )));
        }
        self.cameras
            .get(index)
            .map(|model| model.info)
            .ok_or_else(|| CameraError::DeviceUnavailable(format!("no camera {}", index)))
    }

    fn open(&self, index: usize) -> Result<Box<dyn LegacyCamera>, CameraError> {
        let model = self
            .cameras
            .get(index)
            .ok_or_else(|| CameraError::DeviceUnavailable(format!("no camera {}", index)))?;
        if lock(&self.shared.faults).deny_open {
            return Err(CameraError::OpenDenied(format!(
                "camera {} is in use by another client",
                index
            )));
        }

        let mut log = lock(&self.shared.log);
        if log.open_cameras() > 0 {
            return Err(CameraError::OpenDenied("camera service busy".to_string()));
        }
        log.opened.push(index);
        drop(log);

        Ok(Box::new(SimulatedLegacyCamera {
            parameters: model.parameters.clone(),
            shared: self.shared.clone(),
            surface: None,
            previewing: false,
            released: false,
        }))
    }
}

struct SimulatedLegacyCamera {
    parameters: LegacyParameters,
    shared: Arc<Shared>,
    surface: Option<SurfaceHandle>,
    previewing: bool,
    released: bool,
}

impl SimulatedLegacyCamera {
    fn check_released(&self) -> Result<(), CameraError> {
        if self.released {
            return Err(CameraError::DeviceUnavailable(
                "camera has been released".to_string(),
            ));
        }
        Ok(())
    }

    fn present_frame(&self) {
        if let Some(surface) = self.surface.as_ref().filter(|s| s.is_valid()) {
            let n = self.shared.frames.fetch_add(1, Ordering::AcqRel);
            surface.present(synthetic_frame(
                n,
                SYNTHETIC_FRAME_SIZE.width,
                SYNTHETIC_FRAME_SIZE.height,
            ));
        }
    }
}

impl LegacyCamera for SimulatedLegacyCamera {
    fn parameters(&mut self) -> Result<LegacyParameters, CameraError> {
        self.check_released()?;
        if lock(&self.shared.faults).fail_parameters {
            return Err(CameraError::DeviceUnavailable(
                "getParameters failed".to_string(),
            ));
        }
        Ok(self.parameters.clone())
    }

    fn set_parameters(&mut self, parameters: &LegacyParameters) -> Result<(), CameraError> {
        self.check_released()?;
        if let Some(size) = parameters.preview_size {
            if !parameters.supported_preview_sizes.contains(&size) {
                return Err(CameraError::ConfigurationFailed(format!(
                    "setParameters failed: preview size {}",
                    size
                )));
            }
        }
        self.parameters = parameters.clone();
        lock(&self.shared.log).last_parameters = Some(parameters.clone());
        Ok(())
    }

    fn set_error_callback(&mut self, callback: LegacyErrorCallback) {
        *lock(&self.shared.error_callback) = Some(callback);
    }

    fn set_preview_display(&mut self, surface: &SurfaceHandle) -> Result<(), CameraError> {
        self.check_released()?;
        if !surface.is_valid() {
            return Err(CameraError::SurfaceInvalid(
                "setPreviewDisplay failed".to_string(),
            ));
        }
        self.surface = Some(surface.clone());
        Ok(())
    }

    fn set_display_orientation(&mut self, degrees: u32) -> Result<(), CameraError> {
        self.check_released()?;
        lock(&self.shared.log).display_orientations.push(degrees);
        Ok(())
    }

    fn start_preview(&mut self) -> Result<(), CameraError> {
        self.check_released()?;
        if lock(&self.shared.faults).fail_start_preview {
            return Err(CameraError::ConfigurationFailed(
                "startPreview failed".to_string(),
            ));
        }
        self.previewing = true;
        lock(&self.shared.log).preview_starts += 1;
        self.present_frame();
        Ok(())
    }

    fn stop_preview(&mut self) {
        if self.previewing {
            self.previewing = false;
            lock(&self.shared.log).preview_stops += 1;
        }
    }

    fn take_picture(&mut self) -> Result<Vec<u8>, CameraError> {
        self.check_released()?;
        if !self.previewing {
            return Err(CameraError::CaptureFailed(
                "takePicture without preview".to_string(),
            ));
        }
        // The shutter always ends the preview.
        self.previewing = false;
        let (fail, delay) = {
            let faults = lock(&self.shared.faults);
            (faults.fail_capture, faults.capture_delay)
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        if fail {
            return Err(CameraError::CaptureFailed("takePicture failed".to_string()));
        }
        let mut log = lock(&self.shared.log);
        log.pictures += 1;
        let n = log.pictures as u64;
        drop(log);
        Ok(synthetic_jpeg(n, SYNTHETIC_FRAME_SIZE))
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.previewing = false;
        self.surface = None;
        *lock(&self.shared.error_callback) = None;
        lock(&self.shared.log).released += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_open_is_busy_until_release() {
        let driver = SimulatedLegacyDriver::phone();
        let mut first = driver.open(0).unwrap();
        assert!(matches!(driver.open(1), Err(CameraError::OpenDenied(_))));
        first.release();
        first.release();
        assert!(driver.open(1).is_ok());
        assert_eq!(driver.log().released, 1);
    }

    #[test]
    fn test_unqueryable_camera_info() {
        let driver = SimulatedLegacyDriver::phone();
        driver.make_unqueryable(0);
        assert!(driver.camera_info(0).is_err());
        assert_eq!(driver.camera_info(1).unwrap().facing, Facing::Front);
    }
}
