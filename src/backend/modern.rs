//! Adapter for the newer, asynchronous session-based camera API.
//!
//! Opening a device and configuring a capture session both complete through
//! driver callbacks that may fire on any thread. Each callback re-posts onto
//! the backend worker and carries a generation number, so a completion that
//! arrives after the request was abandoned only releases what it delivered.

use super::{
    BackendCore, BackendEvent, BackendEvents, CameraBackend, CapabilitySlot, CaptureGuard,
    DeviceLifecycle, PreviewLifecycle, StillCapture,
};
use crate::config::{CameraConfig, ImageConfig};
use crate::errors::CameraError;
use crate::rotation::capture_rotation_degrees;
use crate::surface::SurfaceHandle;
use crate::transform::encode_jpeg;
use crate::types::{
    BackendKind, CameraCapabilities, Facing, Flash, Focus, PreviewEffect, SensorPreset, Size,
};
use crate::worker::{Worker, WorkerHandle};
use std::sync::Arc;
use std::time::Duration;

/// Static description of one camera device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCharacteristics {
    /// `None` when the device does not report a facing; such devices match any request.
    pub lens_facing: Option<Facing>,
    pub sensor_orientation: Option<u32>,
    /// Preview output sizes; `None` when the device has no stream configuration map.
    pub output_sizes: Option<Vec<Size>>,
    pub af_modes: Vec<Focus>,
    pub flash_available: bool,
    pub max_digital_zoom: f32,
}

impl Default for DeviceCharacteristics {
    fn default() -> Self {
        Self {
            lens_facing: None,
            sensor_orientation: None,
            output_sizes: None,
            af_modes: Vec::new(),
            flash_available: false,
            max_digital_zoom: 1.0,
        }
    }
}

pub enum DeviceStateEvent {
    Opened(Box<dyn ModernDevice>),
    Disconnected,
    Error(i32),
}

impl std::fmt::Debug for DeviceStateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStateEvent::Opened(device) => write!(f, "Opened({})", device.id()),
            DeviceStateEvent::Disconnected => write!(f, "Disconnected"),
            DeviceStateEvent::Error(code) => write!(f, "Error({})", code),
        }
    }
}

/// Device state callback. May be invoked more than once and from any thread.
pub type DeviceCallback = Arc<dyn Fn(DeviceStateEvent) + Send + Sync>;

pub enum SessionStateEvent {
    Configured(Box<dyn ModernCaptureSession>),
    ConfigureFailed,
}

/// Capture session callback, invoked exactly once from any thread.
pub type SessionCallback = Box<dyn FnOnce(SessionStateEvent) + Send>;

/// Enumerates and opens devices of the session-based API.
pub trait ModernDriver: Send + Sync {
    fn camera_ids(&self) -> Result<Vec<String>, CameraError>;

    fn characteristics(&self, id: &str) -> Result<DeviceCharacteristics, CameraError>;

    /// Returns once the request is accepted; the outcome arrives on `callback`.
    fn open_device(&self, id: &str, callback: DeviceCallback) -> Result<(), CameraError>;
}

pub trait ModernDevice: Send {
    fn id(&self) -> &str;

    fn create_capture_session(
        &mut self,
        surface: SurfaceHandle,
        callback: SessionCallback,
    ) -> Result<(), CameraError>;

    fn close(&mut self);
}

pub trait ModernCaptureSession: Send {
    fn set_repeating_request(&mut self, request: &PreviewRequest) -> Result<(), CameraError>;

    fn close(&mut self);
}

/// Repeating preview request.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewRequest {
    /// `None` leaves the device's autofocus mode untouched.
    pub focus: Option<Focus>,
    pub flash: Flash,
    pub scene: SensorPreset,
    pub effect: PreviewEffect,
    pub zoom_factor: f32,
    /// Rotation the hardware encodes into still captures.
    pub jpeg_orientation: u32,
}

/// What the backend learned about the device it opened.
#[derive(Debug, Clone)]
struct DeviceProfile {
    capabilities: CameraCapabilities,
    flash_available: bool,
    max_digital_zoom: f32,
}

impl DeviceProfile {
    fn from_characteristics(
        facing: Facing,
        characteristics: &DeviceCharacteristics,
        output_sizes: Vec<Size>,
    ) -> Result<Self, CameraError> {
        let flash_modes = if characteristics.flash_available {
            Flash::ALL.to_vec()
        } else {
            vec![Flash::Off]
        };
        let capabilities = CameraCapabilities::new(
            facing,
            characteristics.sensor_orientation.unwrap_or(0),
            output_sizes,
        )?
        .with_focus_modes(characteristics.af_modes.clone())
        .with_flash_modes(flash_modes);

        Ok(Self {
            capabilities,
            flash_available: characteristics.flash_available,
            max_digital_zoom: characteristics.max_digital_zoom.max(1.0),
        })
    }
}

struct ModernState {
    driver: Arc<dyn ModernDriver>,
    facing: Facing,
    handle: WorkerHandle<ModernState>,
    device: Option<Box<dyn ModernDevice>>,
    device_state: DeviceLifecycle,
    open_generation: u64,
    /// Profile of the device being opened, promoted to `profile` on success.
    candidate: Option<DeviceProfile>,
    profile: Option<DeviceProfile>,
    session: Option<Box<dyn ModernCaptureSession>>,
    preview: PreviewLifecycle,
    preview_generation: u64,
    surface: Option<SurfaceHandle>,
    display_rotation: u32,
    settings: CameraConfig,
    image: ImageConfig,
    capabilities: CapabilitySlot,
    capture_guard: CaptureGuard,
    events: BackendEvents,
}

impl ModernState {
    fn open(&mut self) {
        if matches!(
            self.device_state,
            DeviceLifecycle::Opening | DeviceLifecycle::Open
        ) {
            self.events.emit(BackendEvent::OpenFailed(CameraError::AlreadyOpen(format!(
                "{} camera is already open",
                self.facing
            ))));
            return;
        }

        match self.request_open() {
            Ok(id) => {
                log::debug!("Requested open of camera {}", id);
                self.device_state = DeviceLifecycle::Opening;
            }
            Err(e) => {
                log::warn!("Failed to open {} camera: {}", self.facing, e);
                self.device_state = DeviceLifecycle::Failed;
                self.events.emit(BackendEvent::OpenFailed(e));
            }
        }
    }

    /// Ask the driver to open the first device facing the right way that has
    /// a stream configuration. Devices that fail to describe themselves are
    /// skipped.
    fn request_open(&mut self) -> Result<String, CameraError> {
        let ids = self.driver.camera_ids().map_err(|e| {
            CameraError::DeviceUnavailable(format!("Failed to list cameras: {}", e.message()))
        })?;

        let mut last_error = None;
        for id in ids {
            let characteristics = match self.driver.characteristics(&id) {
                Ok(characteristics) => characteristics,
                Err(e) => {
                    log::debug!("Skipping camera {}: {}", id, e);
                    continue;
                }
            };
            if characteristics
                .lens_facing
                .is_some_and(|facing| facing != self.facing)
            {
                continue;
            }
            let Some(output_sizes) = characteristics.output_sizes.clone() else {
                log::debug!("Skipping camera {}: no stream configuration", id);
                continue;
            };
            let profile =
                match DeviceProfile::from_characteristics(self.facing, &characteristics, output_sizes)
                {
                    Ok(profile) => profile,
                    Err(e) => {
                        log::debug!("Skipping camera {}: {}", id, e);
                        continue;
                    }
                };

            self.open_generation += 1;
            let generation = self.open_generation;
            let handle = self.handle.clone();
            let callback: DeviceCallback = Arc::new(move |event: DeviceStateEvent| {
                if !handle.post(move |state: &mut ModernState| {
                    state.on_device_event(generation, event)
                }) {
                    log::debug!("Device callback after backend shutdown");
                }
            });

            match self.driver.open_device(&id, callback) {
                Ok(()) => {
                    self.candidate = Some(profile);
                    return Ok(id);
                }
                Err(e) => {
                    log::warn!("Camera {} refused to open: {}", id, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            CameraError::DeviceUnavailable(format!(
                "no {} camera with a stream configuration",
                self.facing
            ))
        }))
    }

    fn on_device_event(&mut self, generation: u64, event: DeviceStateEvent) {
        if generation != self.open_generation {
            if let DeviceStateEvent::Opened(mut device) = event {
                log::debug!("Closing device {} opened after it was abandoned", device.id());
                device.close();
            }
            return;
        }

        match event {
            DeviceStateEvent::Opened(mut device) => {
                let profile = self.candidate.take();
                match (self.device_state, profile) {
                    (DeviceLifecycle::Opening, Some(profile)) => {
                        log::info!(
                            "Opened {} camera {} (sensor orientation {})",
                            self.facing,
                            device.id(),
                            profile.capabilities.sensor_orientation()
                        );
                        self.capabilities.publish(profile.capabilities.clone());
                        self.profile = Some(profile);
                        self.device = Some(device);
                        self.device_state = DeviceLifecycle::Open;
                        self.events.emit(BackendEvent::Opened);
                    }
                    _ => device.close(),
                }
            }
            DeviceStateEvent::Error(code) => {
                self.fail_device(CameraError::OpenDenied(format!(
                    "Camera device error {}",
                    code
                )));
            }
            DeviceStateEvent::Disconnected => {
                self.fail_device(CameraError::DeviceUnavailable(
                    "camera disconnected".to_string(),
                ));
            }
        }
    }

    fn fail_device(&mut self, error: CameraError) {
        self.teardown_session();
        if let Some(mut device) = self.device.take() {
            device.close();
        }
        let previous = self.device_state;
        self.device_state = DeviceLifecycle::Failed;
        self.candidate = None;

        match previous {
            DeviceLifecycle::Opening => {
                log::warn!("Open of {} camera failed: {}", self.facing, error);
                self.events.emit(BackendEvent::OpenFailed(error));
            }
            DeviceLifecycle::Open => {
                log::warn!("{} camera failed: {}", self.facing, error);
                self.events.emit(BackendEvent::DeviceError(error));
            }
            DeviceLifecycle::Closed | DeviceLifecycle::Failed => {}
        }
    }

    fn close(&mut self) {
        if self.device_state == DeviceLifecycle::Closed {
            log::debug!("{} camera already closed", self.facing);
            return;
        }

        // Late open completions for this device are released on arrival.
        self.open_generation += 1;
        self.teardown_session();
        if let Some(mut device) = self.device.take() {
            device.close();
        }
        self.device_state = DeviceLifecycle::Closed;
        self.candidate = None;
        self.profile = None;
        self.capabilities.clear();
        log::info!("Closed {} camera", self.facing);
        self.events.emit(BackendEvent::Closed);
    }

    fn teardown_session(&mut self) {
        self.preview_generation += 1;
        self.preview = PreviewLifecycle::Stopped;
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }

    fn start_preview(&mut self, size: Size, surface: SurfaceHandle) {
        if let Err(e) = self.request_session(size, surface) {
            log::warn!("Failed to start preview: {}", e);
            self.preview = PreviewLifecycle::Stopped;
            self.events.emit(BackendEvent::PreviewFailed(e));
        }
    }

    fn request_session(&mut self, size: Size, surface: SurfaceHandle) -> Result<(), CameraError> {
        if self.device.is_none() {
            return Err(CameraError::DeviceUnavailable(
                "camera is not open".to_string(),
            ));
        }
        if !surface.is_valid() {
            return Err(CameraError::SurfaceInvalid(
                "preview surface is no longer valid".to_string(),
            ));
        }
        if self.preview != PreviewLifecycle::Stopped {
            self.teardown_session();
        }

        surface.set_buffer_size(size);
        self.preview_generation += 1;
        let generation = self.preview_generation;
        let handle = self.handle.clone();
        let callback: SessionCallback = Box::new(move |event: SessionStateEvent| {
            if !handle.post(move |state: &mut ModernState| {
                state.on_session_event(generation, size, event)
            }) {
                log::debug!("Session callback after backend shutdown");
            }
        });

        let Some(device) = self.device.as_mut() else {
            return Err(CameraError::DeviceUnavailable(
                "camera is not open".to_string(),
            ));
        };
        device
            .create_capture_session(surface.clone(), callback)
            .map_err(|e| CameraError::ConfigurationFailed(e.message().to_string()))?;

        self.preview = PreviewLifecycle::Starting;
        self.surface = Some(surface);
        Ok(())
    }

    fn on_session_event(&mut self, generation: u64, size: Size, event: SessionStateEvent) {
        if generation != self.preview_generation || self.preview != PreviewLifecycle::Starting {
            if let SessionStateEvent::Configured(mut session) = event {
                log::debug!("Closing capture session configured after it was abandoned");
                session.close();
            }
            return;
        }

        match event {
            SessionStateEvent::Configured(mut session) => {
                let request = self.preview_request();
                match session.set_repeating_request(&request) {
                    Ok(()) => {
                        log::info!("Preview started at {}", size);
                        self.session = Some(session);
                        self.preview = PreviewLifecycle::Running;
                        self.events.emit(BackendEvent::PreviewStarted { size });
                    }
                    Err(e) => {
                        log::warn!("Repeating request rejected: {}", e);
                        session.close();
                        self.preview = PreviewLifecycle::Stopped;
                        self.events
                            .emit(BackendEvent::PreviewFailed(CameraError::ConfigurationFailed(
                                e.message().to_string(),
                            )));
                    }
                }
            }
            SessionStateEvent::ConfigureFailed => {
                log::warn!("Capture session configuration failed");
                self.preview = PreviewLifecycle::Stopped;
                self.events
                    .emit(BackendEvent::PreviewFailed(CameraError::ConfigurationFailed(
                        "capture session configuration failed".to_string(),
                    )));
            }
        }
    }

    fn stop_preview(&mut self) {
        if self.preview == PreviewLifecycle::Stopped {
            log::debug!("Preview already stopped");
            return;
        }
        self.teardown_session();
        log::info!("Preview stopped");
        self.events.emit(BackendEvent::PreviewStopped);
    }

    fn preview_request(&self) -> PreviewRequest {
        let (focus, flash, max_zoom, sensor_orientation) = match &self.profile {
            Some(profile) => (
                Some(self.settings.focus)
                    .filter(|focus| profile.capabilities.supports_focus(*focus)),
                if profile.flash_available {
                    self.settings.flash
                } else {
                    Flash::Off
                },
                profile.max_digital_zoom,
                profile.capabilities.sensor_orientation(),
            ),
            None => (None, Flash::Off, 1.0, 0),
        };

        PreviewRequest {
            focus,
            flash,
            scene: self.settings.sensor_preset,
            effect: self.settings.preview_effect,
            zoom_factor: self.settings.zoom_factor.clamp(1.0, max_zoom),
            jpeg_orientation: capture_rotation_degrees(
                sensor_orientation,
                self.display_rotation,
                self.facing,
            ),
        }
    }

    /// Resubmit the repeating request after a knob changed.
    fn update_request(&mut self) {
        if self.preview != PreviewLifecycle::Running {
            return;
        }
        let request = self.preview_request();
        if let Some(session) = self.session.as_mut() {
            if let Err(e) = session.set_repeating_request(&request) {
                log::warn!("Failed to update preview request: {}", e);
            }
        }
    }

    fn capture(&mut self, capture: StillCapture) {
        let result = self.snapshot();
        self.capture_guard.release();
        match result {
            Ok(data) => {
                log::info!("Captured image {} ({} bytes)", capture.id, data.len());
                self.events.emit(BackendEvent::ImageCaptured {
                    id: capture.id,
                    data,
                    rotation_degrees: 0,
                    mirrored: false,
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

    /// The last rendered preview frame, already display-oriented.
    fn snapshot(&self) -> Result<Vec<u8>, CameraError> {
        if self.preview != PreviewLifecycle::Running {
            return Err(CameraError::CaptureFailed(
                "preview is not running".to_string(),
            ));
        }
        let surface = self
            .surface
            .as_ref()
            .filter(|surface| surface.is_valid())
            .ok_or_else(|| CameraError::CaptureFailed("preview surface is gone".to_string()))?;
        let frame = surface.snapshot().ok_or_else(|| {
            CameraError::CaptureFailed("no preview frame has been rendered yet".to_string())
        })?;
        encode_jpeg(&frame, self.image.jpeg_quality)
    }
}

impl Drop for ModernState {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        if let Some(mut device) = self.device.take() {
            log::debug!("Closing {} camera on worker exit", self.facing);
            device.close();
        }
    }
}

/// [`CameraBackend`] over a [`ModernDriver`].
pub struct ModernBackend {
    core: BackendCore<ModernState>,
}

impl ModernBackend {
    pub fn new(
        worker_name: &str,
        driver: Arc<dyn ModernDriver>,
        settings: CameraConfig,
        image: ImageConfig,
        events: BackendEvents,
    ) -> Result<Self, CameraError> {
        let facing = settings.facing;
        let capabilities = CapabilitySlot::default();
        let capture_guard = CaptureGuard::default();
        let state_capabilities = capabilities.clone();
        let state_guard = capture_guard.clone();
        let state_events = events.clone();

        let worker = Worker::spawn_with(worker_name, move |handle| ModernState {
            driver,
            facing,
            handle,
            device: None,
            device_state: DeviceLifecycle::Closed,
            open_generation: 0,
            candidate: None,
            profile: None,
            session: None,
            preview: PreviewLifecycle::Stopped,
            preview_generation: 0,
            surface: None,
            display_rotation: 0,
            settings,
            image,
            capabilities: state_capabilities,
            capture_guard: state_guard,
            events: state_events,
        })?;

        Ok(Self {
            core: BackendCore {
                facing,
                worker,
                capabilities,
                capture_guard,
                events,
            },
        })
    }
}

impl CameraBackend for ModernBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Modern
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
        self.core.post(move |state| {
            state.display_rotation = degrees;
            state.update_request();
        });
    }

    fn set_flash(&self, flash: Flash) {
        self.core.post(move |state| {
            state.settings.flash = flash;
            state.update_request();
        });
    }

    fn set_focus(&self, focus: Focus) {
        self.core.post(move |state| {
            state.settings.focus = focus;
            state.update_request();
        });
    }

    fn set_sensor_preset(&self, preset: SensorPreset) {
        self.core.post(move |state| {
            state.settings.sensor_preset = preset;
            state.update_request();
        });
    }

    fn set_preview_effect(&self, effect: PreviewEffect) {
        self.core.post(move |state| {
            state.settings.preview_effect = effect;
            state.update_request();
        });
    }

    fn set_zoom(&self, zoom_factor: f32) {
        self.core.post(move |state| {
            state.settings.zoom_factor = zoom_factor;
            state.update_request();
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

    #[test]
    fn test_profile_without_flash_only_offers_off() {
        let characteristics = DeviceCharacteristics {
            lens_facing: Some(Facing::Back),
            sensor_orientation: Some(90),
            output_sizes: Some(vec![Size::new(1920, 1080)]),
            af_modes: vec![Focus::Auto, Focus::Continuous],
            ..Default::default()
        };
        let profile = DeviceProfile::from_characteristics(
            Facing::Back,
            &characteristics,
            vec![Size::new(1920, 1080)],
        )
        .unwrap();
        assert_eq!(profile.capabilities.supported_flash_modes(), &[Flash::Off]);
        assert!(profile.capabilities.supports_focus(Focus::Continuous));
        assert_eq!(profile.capabilities.sensor_orientation(), 90);
    }

    #[test]
    fn test_profile_defaults_missing_orientation_to_zero() {
        let characteristics = DeviceCharacteristics {
            output_sizes: Some(vec![Size::new(640, 480)]),
            flash_available: true,
            max_digital_zoom: 0.5,
            ..Default::default()
        };
        let profile = DeviceProfile::from_characteristics(
            Facing::Front,
            &characteristics,
            vec![Size::new(640, 480)],
        )
        .unwrap();
        assert_eq!(profile.capabilities.sensor_orientation(), 0);
        assert_eq!(profile.capabilities.supported_flash_modes().len(), 4);
        assert_eq!(profile.max_digital_zoom, 1.0);
    }

    #[test]
    fn test_profile_rejects_skewed_sensor() {
        let characteristics = DeviceCharacteristics {
            sensor_orientation: Some(45),
            output_sizes: Some(vec![Size::new(640, 480)]),
            ..Default::default()
        };
        assert!(DeviceProfile::from_characteristics(
            Facing::Back,
            &characteristics,
            vec![Size::new(640, 480)],
        )
        .is_err());
    }
}
