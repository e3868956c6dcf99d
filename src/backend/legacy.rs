//! Adapter for the older, synchronous camera API.
//!
//! Every driver call blocks, so all of them run on the backend worker. The
//! hardware hands back raw sensor-oriented JPEGs; rotation and mirroring are
//! applied here before the image leaves the backend.

use super::{
    BackendCore, BackendEvent, BackendEvents, CameraBackend, CapabilitySlot, CaptureGuard,
    DeviceLifecycle, PreviewLifecycle, StillCapture,
};
use crate::config::{CameraConfig, ImageConfig};
use crate::errors::CameraError;
use crate::rotation::preview_rotation_degrees;
use crate::selection::select_image_size;
use crate::surface::SurfaceHandle;
use crate::transform::ImageTransform;
use crate::types::{
    BackendKind, CameraCapabilities, Facing, Flash, Focus, PreviewEffect, SensorPreset, Size,
};
use crate::worker::Worker;
use std::sync::Arc;
use std::time::Duration;

pub const FLASH_MODE_OFF: &str = "off";
pub const FLASH_MODE_ON: &str = "on";
pub const FLASH_MODE_AUTO: &str = "auto";
pub const FLASH_MODE_TORCH: &str = "torch";

pub const FOCUS_MODE_FIXED: &str = "fixed";
pub const FOCUS_MODE_AUTO: &str = "auto";
pub const FOCUS_MODE_CONTINUOUS_PICTURE: &str = "continuous-picture";

/// Invoked by the hardware, from any thread, with a driver error code.
pub type LegacyErrorCallback = Box<dyn Fn(i32) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyCameraInfo {
    pub facing: Facing,
    /// Clockwise rotation of the sensor relative to the device's natural orientation.
    pub orientation: u32,
}

/// Mutable parameter block of an open legacy camera.
///
/// Mode values are the hardware's own strings; a mode is only ever set when
/// it appears in the matching `supported_*` list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LegacyParameters {
    pub preview_size: Option<Size>,
    pub supported_preview_sizes: Vec<Size>,
    pub picture_size: Option<Size>,
    pub supported_picture_sizes: Vec<Size>,
    pub flash_mode: Option<String>,
    pub supported_flash_modes: Vec<String>,
    pub focus_mode: Option<String>,
    pub supported_focus_modes: Vec<String>,
    pub scene_mode: Option<String>,
    pub supported_scene_modes: Vec<String>,
    pub color_effect: Option<String>,
    pub supported_color_effects: Vec<String>,
    /// Index into `zoom_ratios`.
    pub zoom: usize,
    /// Zoom ratios in hundredths; empty when zoom is unsupported.
    pub zoom_ratios: Vec<u32>,
}

impl LegacyParameters {
    pub fn flash_modes(&self) -> Vec<Flash> {
        Flash::ALL
            .iter()
            .copied()
            .filter(|flash| contains(&self.supported_flash_modes, flash_mode_name(*flash)))
            .collect()
    }

    pub fn focus_modes(&self) -> Vec<Focus> {
        Focus::ALL
            .iter()
            .copied()
            .filter(|focus| contains(&self.supported_focus_modes, focus_mode_name(*focus)))
            .collect()
    }
}

/// Enumerates and opens cameras of the synchronous API.
pub trait LegacyDriver: Send + Sync {
    fn camera_count(&self) -> usize;

    fn camera_info(&self, index: usize) -> Result<LegacyCameraInfo, CameraError>;

    fn open(&self, index: usize) -> Result<Box<dyn LegacyCamera>, CameraError>;
}

/// An open legacy camera. Only ever touched from the backend worker.
pub trait LegacyCamera: Send {
    fn parameters(&mut self) -> Result<LegacyParameters, CameraError>;

    fn set_parameters(&mut self, parameters: &LegacyParameters) -> Result<(), CameraError>;

    fn set_error_callback(&mut self, callback: LegacyErrorCallback);

    fn set_preview_display(&mut self, surface: &SurfaceHandle) -> Result<(), CameraError>;

    fn set_display_orientation(&mut self, degrees: u32) -> Result<(), CameraError>;

    fn start_preview(&mut self) -> Result<(), CameraError>;

    fn stop_preview(&mut self);

    /// Blocks until the JPEG is ready. The preview is stopped afterwards.
    fn take_picture(&mut self) -> Result<Vec<u8>, CameraError>;

    fn release(&mut self);
}

pub fn flash_mode_name(flash: Flash) -> &'static str {
    match flash {
        Flash::Off => FLASH_MODE_OFF,
        Flash::On => FLASH_MODE_ON,
        Flash::Auto => FLASH_MODE_AUTO,
        Flash::Torch => FLASH_MODE_TORCH,
    }
}

pub fn focus_mode_name(focus: Focus) -> &'static str {
    match focus {
        Focus::Off => FOCUS_MODE_FIXED,
        Focus::Auto => FOCUS_MODE_AUTO,
        Focus::Continuous => FOCUS_MODE_CONTINUOUS_PICTURE,
    }
}

pub fn scene_mode_name(preset: SensorPreset) -> &'static str {
    match preset {
        SensorPreset::None => "auto",
        SensorPreset::Action => "action",
        SensorPreset::Portrait => "portrait",
        SensorPreset::Landscape => "landscape",
        SensorPreset::Night => "night",
        SensorPreset::NightPortrait => "night-portrait",
        SensorPreset::Theatre => "theatre",
        SensorPreset::Beach => "beach",
        SensorPreset::Snow => "snow",
        SensorPreset::Sunset => "sunset",
        SensorPreset::SteadyPhoto => "steadyphoto",
        SensorPreset::Fireworks => "fireworks",
        SensorPreset::Sports => "sports",
        SensorPreset::Party => "party",
        SensorPreset::Candlelight => "candlelight",
        SensorPreset::Barcode => "barcode",
    }
}

pub fn color_effect_name(effect: PreviewEffect) -> &'static str {
    match effect {
        PreviewEffect::None => "none",
        PreviewEffect::Mono => "mono",
        PreviewEffect::Negative => "negative",
        PreviewEffect::Solarize => "solarize",
        PreviewEffect::Sepia => "sepia",
        PreviewEffect::Posterize => "posterize",
        PreviewEffect::Whiteboard => "whiteboard",
        PreviewEffect::Blackboard => "blackboard",
        PreviewEffect::Aqua => "aqua",
    }
}

/// Largest zoom step not exceeding `zoom_factor`.
pub fn zoom_index(zoom_ratios: &[u32], zoom_factor: f32) -> usize {
    let wanted = (zoom_factor.max(1.0) * 100.0).round() as u32;
    zoom_ratios
        .iter()
        .rposition(|ratio| *ratio <= wanted)
        .unwrap_or(0)
}

fn contains(supported: &[String], mode: &str) -> bool {
    supported.iter().any(|m| m == mode)
}

fn pick(supported: &[String], mode: &str) -> Option<String> {
    contains(supported, mode).then(|| mode.to_string())
}

/// Copy the knobs into a parameter block, skipping anything the hardware
/// does not list as supported.
pub fn configure(parameters: &mut LegacyParameters, settings: &CameraConfig) {
    if let Some(mode) = pick(&parameters.supported_flash_modes, flash_mode_name(settings.flash)) {
        parameters.flash_mode = Some(mode);
    }
    if let Some(mode) = pick(&parameters.supported_focus_modes, focus_mode_name(settings.focus)) {
        parameters.focus_mode = Some(mode);
    }
    if let Some(mode) = pick(
        &parameters.supported_scene_modes,
        scene_mode_name(settings.sensor_preset),
    ) {
        parameters.scene_mode = Some(mode);
    }
    if let Some(effect) = pick(
        &parameters.supported_color_effects,
        color_effect_name(settings.preview_effect),
    ) {
        parameters.color_effect = Some(effect);
    }
    if !parameters.zoom_ratios.is_empty() {
        parameters.zoom = zoom_index(&parameters.zoom_ratios, settings.zoom_factor);
    }
}

fn describe(
    camera: &mut dyn LegacyCamera,
    info: LegacyCameraInfo,
) -> Result<CameraCapabilities, CameraError> {
    let parameters = camera.parameters()?;
    Ok(CameraCapabilities::new(
        info.facing,
        info.orientation,
        parameters.supported_preview_sizes.clone(),
    )?
    .with_image_sizes(parameters.supported_picture_sizes.clone())
    .with_focus_modes(parameters.focus_modes())
    .with_flash_modes(parameters.flash_modes()))
}

/// Hardware state owned by the worker thread.
struct LegacyState {
    driver: Arc<dyn LegacyDriver>,
    facing: Facing,
    camera: Option<Box<dyn LegacyCamera>>,
    sensor_orientation: u32,
    device: DeviceLifecycle,
    preview: PreviewLifecycle,
    display_rotation: u32,
    settings: CameraConfig,
    image: ImageConfig,
    transform: Arc<dyn ImageTransform>,
    capabilities: CapabilitySlot,
    capture_guard: CaptureGuard,
    events: BackendEvents,
}

impl LegacyState {
    fn open(&mut self) {
        if self.camera.is_some() {
            self.events.emit(BackendEvent::OpenFailed(CameraError::AlreadyOpen(format!(
                "{} camera is already open",
                self.facing
            ))));
            return;
        }

        match self.acquire() {
            Ok(capabilities) => {
                log::info!(
                    "Opened legacy {} camera (sensor orientation {})",
                    self.facing,
                    capabilities.sensor_orientation()
                );
                self.device = DeviceLifecycle::Open;
                self.capabilities.publish(capabilities);
                self.events.emit(BackendEvent::Opened);
            }
            Err(e) => {
                log::warn!("Failed to open legacy {} camera: {}", self.facing, e);
                self.device = DeviceLifecycle::Failed;
                self.events.emit(BackendEvent::OpenFailed(e));
            }
        }
    }

    fn acquire(&mut self) -> Result<CameraCapabilities, CameraError> {
        let (index, info) = self.find_camera()?;
        let mut camera = self.driver.open(index)?;

        let capabilities = match describe(camera.as_mut(), info) {
            Ok(capabilities) => capabilities,
            Err(e) => {
                camera.release();
                return Err(e);
            }
        };

        let events = self.events.clone();
        camera.set_error_callback(Box::new(move |code| {
            events.emit(BackendEvent::DeviceError(CameraError::DeviceUnavailable(
                format!("Camera hardware error {}", code),
            )));
        }));

        self.sensor_orientation = info.orientation;
        self.camera = Some(camera);
        self.apply_settings();
        Ok(capabilities)
    }

    fn find_camera(&self) -> Result<(usize, LegacyCameraInfo), CameraError> {
        for index in 0..self.driver.camera_count() {
            match self.driver.camera_info(index) {
                Ok(info) if info.facing == self.facing => return Ok((index, info)),
                Ok(_) => {}
                Err(e) => log::debug!("Skipping camera {}: {}", index, e),
            }
        }
        Err(CameraError::DeviceUnavailable(format!(
            "no {} camera present",
            self.facing
        )))
    }

    fn close(&mut self) {
        if self.device == DeviceLifecycle::Closed {
            log::debug!("Legacy {} camera already closed", self.facing);
            return;
        }

        if let Some(mut camera) = self.camera.take() {
            if self.preview != PreviewLifecycle::Stopped {
                camera.stop_preview();
            }
            camera.release();
        }
        self.preview = PreviewLifecycle::Stopped;
        self.device = DeviceLifecycle::Closed;
        self.capabilities.clear();
        log::info!("Closed legacy {} camera", self.facing);
        self.events.emit(BackendEvent::Closed);
    }

    fn start_preview(&mut self, size: Size, surface: SurfaceHandle) {
        match self.try_start_preview(size, &surface) {
            Ok(()) => {
                log::info!("Legacy preview started at {}", size);
                self.preview = PreviewLifecycle::Running;
                self.events.emit(BackendEvent::PreviewStarted { size });
            }
            Err(e) => {
                log::warn!("Failed to start legacy preview: {}", e);
                self.preview = PreviewLifecycle::Stopped;
                self.events.emit(BackendEvent::PreviewFailed(e));
            }
        }
    }

    fn try_start_preview(&mut self, size: Size, surface: &SurfaceHandle) -> Result<(), CameraError> {
        let Some(camera) = self.camera.as_mut() else {
            return Err(CameraError::DeviceUnavailable(
                "camera is not open".to_string(),
            ));
        };
        if !surface.is_valid() {
            return Err(CameraError::SurfaceInvalid(
                "preview surface is no longer valid".to_string(),
            ));
        }
        if self.preview != PreviewLifecycle::Stopped {
            camera.stop_preview();
            self.preview = PreviewLifecycle::Stopped;
        }

        let mut parameters = camera.parameters()?;
        if !parameters.supported_preview_sizes.contains(&size) {
            return Err(CameraError::ConfigurationFailed(format!(
                "preview size {} is not supported",
                size
            )));
        }
        parameters.preview_size = Some(size);
        parameters.picture_size =
            select_image_size(self.image.megapixels, &parameters.supported_picture_sizes);
        configure(&mut parameters, &self.settings);
        camera
            .set_parameters(&parameters)
            .map_err(|e| CameraError::ConfigurationFailed(e.message().to_string()))?;

        camera.set_display_orientation(preview_rotation_degrees(
            self.sensor_orientation,
            self.display_rotation,
            self.facing,
        ))?;
        surface.set_buffer_size(size);
        camera.set_preview_display(surface)?;
        camera.start_preview()
    }

    fn stop_preview(&mut self) {
        if self.preview == PreviewLifecycle::Stopped {
            log::debug!("Legacy preview already stopped");
            return;
        }
        if let Some(camera) = self.camera.as_mut() {
            camera.stop_preview();
        }
        self.preview = PreviewLifecycle::Stopped;
        log::info!("Legacy preview stopped");
        self.events.emit(BackendEvent::PreviewStopped);
    }

    fn set_display_rotation(&mut self, degrees: u32) {
        self.display_rotation = degrees;
        let orientation = preview_rotation_degrees(self.sensor_orientation, degrees, self.facing);
        if let Some(camera) = self.camera.as_mut() {
            if let Err(e) = camera.set_display_orientation(orientation) {
                log::warn!("Failed to set display orientation {}: {}", orientation, e);
            }
        }
    }

    fn apply_settings(&mut self) {
        let Some(camera) = self.camera.as_mut() else {
            return;
        };
        let result = camera.parameters().and_then(|mut parameters| {
            configure(&mut parameters, &self.settings);
            camera.set_parameters(&parameters)
        });
        if let Err(e) = result {
            log::warn!("Failed to apply camera settings: {}", e);
        }
    }

    fn capture(&mut self, capture: StillCapture) {
        let result = self.take_still(capture);
        self.capture_guard.release();
        match result {
            Ok(data) => {
                log::info!("Captured image {} ({} bytes)", capture.id, data.len());
                self.events.emit(BackendEvent::ImageCaptured {
                    id: capture.id,
                    data,
                    rotation_degrees: capture.rotation_degrees,
                    mirrored: capture.flip_horizontal,
                });
            }
            Err(error) => {
                log::warn!("Capture {} failed: {}", capture.id, error);
                self.events.emit(BackendEvent::CaptureFailed {
                    id: capture.id,
                    error,
                });
            }
        }
    }

    fn take_still(&mut self, capture: StillCapture) -> Result<Vec<u8>, CameraError> {
        if self.preview != PreviewLifecycle::Running {
            return Err(CameraError::CaptureFailed(
                "preview is not running".to_string(),
            ));
        }
        let Some(camera) = self.camera.as_mut() else {
            return Err(CameraError::CaptureFailed("camera is not open".to_string()));
        };

        let taken = camera.take_picture();
        // The shutter stops the stream; bring it back whatever the outcome.
        if let Err(e) = camera.start_preview() {
            log::warn!("Failed to resume preview after capture: {}", e);
            self.preview = PreviewLifecycle::Stopped;
            self.events.emit(BackendEvent::DeviceError(e));
        }

        let raw = taken.map_err(|e| CameraError::CaptureFailed(e.message().to_string()))?;
        self.transform
            .apply(&raw, capture.rotation_degrees, capture.flip_horizontal)
    }
}

impl Drop for LegacyState {
    fn drop(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            log::debug!("Releasing legacy {} camera on worker exit", self.facing);
            camera.release();
        }
    }
}

/// [`CameraBackend`] over a [`LegacyDriver`].
pub struct LegacyBackend {
    core: BackendCore<LegacyState>,
}

impl LegacyBackend {
    pub fn new(
        worker_name: &str,
        driver: Arc<dyn LegacyDriver>,
        settings: CameraConfig,
        image: ImageConfig,
        transform: Arc<dyn ImageTransform>,
        events: BackendEvents,
    ) -> Result<Self, CameraError> {
        let facing = settings.facing;
        let capabilities = CapabilitySlot::default();
        let capture_guard = CaptureGuard::default();
        let state = LegacyState {
            driver,
            facing,
            camera: None,
            sensor_orientation: 0,
            device: DeviceLifecycle::Closed,
            preview: PreviewLifecycle::Stopped,
            display_rotation: 0,
            settings,
            image,
            transform,
            capabilities: capabilities.clone(),
            capture_guard: capture_guard.clone(),
            events: events.clone(),
        };

        Ok(Self {
            core: BackendCore {
                facing,
                worker: Worker::spawn(worker_name, state)?,
                capabilities,
                capture_guard,
                events,
            },
        })
    }
}

impl CameraBackend for LegacyBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Legacy
    }

    fn facing(&self) -> Facing {
        self.core.facing
    }

    fn fetch_capabilities(&self) -> Result<CameraCapabilities, CameraError> {
        self.core.capabilities.get()
    }

    fn open(&self) {
        self.core.post(|state| state.open());
    }

    fn close(&self) {
        self.core.post(|state| state.close());
    }

    fn start_preview(&self, target_size: Size, surface: SurfaceHandle) {
        self.core
            .post(move |state| state.start_preview(target_size, surface));
    }

    fn stop_preview(&self) {
        self.core.post(|state| state.stop_preview());
    }

    fn set_display_rotation(&self, degrees: u32) {
        self.core
            .post(move |state| state.set_display_rotation(degrees));
    }

    fn set_flash(&self, flash: Flash) {
        self.core.post(move |state| {
            state.settings.flash = flash;
            state.apply_settings();
        });
    }

    fn set_focus(&self, focus: Focus) {
        self.core.post(move |state| {
            state.settings.focus = focus;
            state.apply_settings();
        });
    }

    fn set_sensor_preset(&self, preset: SensorPreset) {
        self.core.post(move |state| {
            state.settings.sensor_preset = preset;
            state.apply_settings();
        });
    }

    fn set_preview_effect(&self, effect: PreviewEffect) {
        self.core.post(move |state| {
            state.settings.preview_effect = effect;
            state.apply_settings();
        });
    }

    fn set_zoom(&self, zoom_factor: f32) {
        self.core.post(move |state| {
            state.settings.zoom_factor = zoom_factor;
            state.apply_settings();
        });
    }

    fn capture_image(&self, capture: StillCapture) {
        self.core
            .capture(capture, move |state| state.capture(capture));
    }

    fn shutdown(&mut self, timeout: Duration) -> Result<(), CameraError> {
        self.core.shutdown(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameters() -> LegacyParameters {
        LegacyParameters {
            supported_preview_sizes: vec![Size::new(640, 480), Size::new(1920, 1080)],
            supported_flash_modes: vec![FLASH_MODE_OFF.into(), FLASH_MODE_TORCH.into()],
            supported_focus_modes: vec![FOCUS_MODE_AUTO.into()],
            supported_scene_modes: vec!["auto".into(), "night".into()],
            supported_color_effects: vec!["none".into(), "mono".into()],
            zoom_ratios: vec![100, 150, 200, 400],
            ..Default::default()
        }
    }

    #[test]
    fn test_configure_applies_supported_modes() {
        let mut params = parameters();
        let settings = CameraConfig {
            flash: Flash::Torch,
            focus: Focus::Auto,
            sensor_preset: SensorPreset::Night,
            preview_effect: PreviewEffect::Mono,
            zoom_factor: 1.8,
            ..Default::default()
        };
        configure(&mut params, &settings);
        assert_eq!(params.flash_mode.as_deref(), Some(FLASH_MODE_TORCH));
        assert_eq!(params.focus_mode.as_deref(), Some(FOCUS_MODE_AUTO));
        assert_eq!(params.scene_mode.as_deref(), Some("night"));
        assert_eq!(params.color_effect.as_deref(), Some("mono"));
        assert_eq!(params.zoom, 1);
    }

    #[test]
    fn test_configure_skips_unsupported_modes() {
        let mut params = parameters();
        params.focus_mode = Some(FOCUS_MODE_AUTO.into());
        let settings = CameraConfig {
            flash: Flash::Auto,
            focus: Focus::Continuous,
            preview_effect: PreviewEffect::Aqua,
            ..Default::default()
        };
        configure(&mut params, &settings);
        assert_eq!(params.flash_mode, None);
        assert_eq!(params.focus_mode.as_deref(), Some(FOCUS_MODE_AUTO));
        assert_eq!(params.color_effect, None);
    }

    #[test]
    fn test_zoom_index() {
        let ratios = [100, 150, 200, 400];
        assert_eq!(zoom_index(&ratios, 1.0), 0);
        assert_eq!(zoom_index(&ratios, 0.5), 0);
        assert_eq!(zoom_index(&ratios, 2.0), 2);
        assert_eq!(zoom_index(&ratios, 10.0), 3);
        assert_eq!(zoom_index(&[], 3.0), 0);
    }

    #[test]
    fn test_typed_mode_lists() {
        let params = parameters();
        assert_eq!(params.flash_modes(), vec![Flash::Off, Flash::Torch]);
        assert_eq!(params.focus_modes(), vec![Focus::Auto]);
    }
}
