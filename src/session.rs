//! Session lifecycle: one state machine over whichever backend the platform has.
//!
//! Host notifications and backend completions both funnel through
//! [`Session::handle`], so transitions happen one at a time on the thread that
//! owns the session. Backend completions queue on a channel until the host
//! drains them with [`Session::dispatch_pending`] or
//! [`Session::wait_for_event`].

use crate::backend::{BackendEvent, BackendFactory, CameraBackend, StillCapture};
use crate::config::CameraKitConfig;
use crate::errors::{CameraError, ErrorKind};
use crate::layout::{self, preview_transform, surface_frame, LayoutDimension};
use crate::rotation::{capture_rotation_degrees, needs_horizontal_flip, DisplayRotation};
use crate::selection::{adjusted_preview_size, select_preview_size};
use crate::surface::{PreviewHost, SurfaceHandle};
use crate::types::{
    BackendKind, CameraCapabilities, CapturedImage, Facing, Flash, Focus, PreviewEffect,
    SensorPreset, Size,
};
use bytes::Bytes;
use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use uuid::Uuid;

/// Receives every reported error as `(kind, message, fatal)`.
pub type ErrorListener = Box<dyn FnMut(ErrorKind, &str, bool)>;

pub type CaptureResult = Result<CapturedImage, CameraError>;

type CaptureCompletion = Box<dyn FnOnce(CaptureResult)>;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    SurfaceReady,
    CameraOpening,
    CameraOpen,
    PreviewStarting,
    PreviewActive,
    Stopping,
    Closed,
    /// Something failed; the session still accepts teardown and re-open.
    Error(CameraError),
}

impl SessionState {
    /// True while a device may be held.
    pub fn holds_device(&self) -> bool {
        matches!(
            self,
            SessionState::SurfaceReady
                | SessionState::CameraOpening
                | SessionState::CameraOpen
                | SessionState::PreviewStarting
                | SessionState::PreviewActive
                | SessionState::Stopping
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::SurfaceReady => write!(f, "surface_ready"),
            SessionState::CameraOpening => write!(f, "camera_opening"),
            SessionState::CameraOpen => write!(f, "camera_open"),
            SessionState::PreviewStarting => write!(f, "preview_starting"),
            SessionState::PreviewActive => write!(f, "preview_active"),
            SessionState::Stopping => write!(f, "stopping"),
            SessionState::Closed => write!(f, "closed"),
            SessionState::Error(e) => write!(f, "error({})", e.kind()),
        }
    }
}

/// Everything that can move the state machine.
#[derive(Debug)]
pub enum SessionEvent {
    SurfaceCreated(SurfaceHandle),
    SurfaceChanged { width: u32, height: u32 },
    SurfaceDestroyed,
    /// Raw device orientation reading in degrees.
    OrientationChanged(i32),
    Stop,
    Backend(BackendEvent),
}

impl SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            SessionEvent::SurfaceCreated(_) => "surface_created",
            SessionEvent::SurfaceChanged { .. } => "surface_changed",
            SessionEvent::SurfaceDestroyed => "surface_destroyed",
            SessionEvent::OrientationChanged(_) => "orientation_changed",
            SessionEvent::Stop => "stop",
            SessionEvent::Backend(event) => match event {
                BackendEvent::Opened => "camera_opened",
                BackendEvent::OpenFailed(_) => "open_failed",
                BackendEvent::Closed => "camera_closed",
                BackendEvent::PreviewStarted { .. } => "preview_started",
                BackendEvent::PreviewFailed(_) => "preview_failed",
                BackendEvent::PreviewStopped => "preview_stopped",
                BackendEvent::ImageCaptured { .. } => "image_captured",
                BackendEvent::CaptureFailed { .. } => "capture_failed",
                BackendEvent::DeviceError(_) => "camera_error",
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopIntent {
    /// Stop the preview only, then start it again with new geometry.
    Restart,
    /// Stop the preview and close the device.
    Teardown,
}

struct PendingCapture {
    id: u64,
    facing: Facing,
    completion: CaptureCompletion,
}

pub struct SessionBuilder {
    factory: BackendFactory,
    host: Box<dyn PreviewHost>,
    config: CameraKitConfig,
    on_error: Option<ErrorListener>,
}

impl SessionBuilder {
    pub fn config(mut self, config: CameraKitConfig) -> Self {
        self.config = config;
        self
    }

    pub fn on_error<F>(mut self, listener: F) -> Self
    where
        F: FnMut(ErrorKind, &str, bool) + 'static,
    {
        self.on_error = Some(Box::new(listener));
        self
    }

    pub fn build(self) -> Result<Session, CameraError> {
        self.config.validate()?;

        let id = Uuid::new_v4();
        let worker_name = format!("camerakit-worker-{}", id);
        let (backend, events) =
            self.factory
                .create(&worker_name, &self.config.camera, &self.config.image)?;
        let rotation = DisplayRotation::new(self.config.session.initial_display_rotation);
        backend.set_display_rotation(rotation.degrees());

        log::info!(
            "Created {} camera session {} ({} facing)",
            self.factory.kind(),
            id,
            self.config.camera.facing
        );

        Ok(Session {
            id,
            factory: self.factory,
            backend,
            events,
            host: self.host,
            on_error: self.on_error,
            config: self.config,
            state: SessionState::Idle,
            stop_intent: StopIntent::Teardown,
            restart_pending: false,
            reopen_after_close: false,
            start_after_close: false,
            image_changed: false,
            surface: None,
            surface_size: None,
            rotation,
            capabilities: None,
            preview_size: None,
            pending_capture: None,
            next_capture_id: 1,
        })
    }
}

/// One camera preview bound to one host view.
pub struct Session {
    id: Uuid,
    factory: BackendFactory,
    backend: Box<dyn CameraBackend>,
    events: Receiver<BackendEvent>,
    host: Box<dyn PreviewHost>,
    on_error: Option<ErrorListener>,
    config: CameraKitConfig,
    state: SessionState,
    stop_intent: StopIntent,
    /// Geometry changed while the preview was starting.
    restart_pending: bool,
    /// Facing changed; build a fresh backend once the old one has closed.
    reopen_after_close: bool,
    /// The host asked to run again before the teardown finished.
    start_after_close: bool,
    /// Image settings changed while the device was held.
    image_changed: bool,
    surface: Option<SurfaceHandle>,
    surface_size: Option<Size>,
    rotation: DisplayRotation,
    capabilities: Option<CameraCapabilities>,
    preview_size: Option<Size>,
    pending_capture: Option<PendingCapture>,
    next_capture_id: u64,
}

impl Session {
    pub fn builder<H>(factory: BackendFactory, host: H) -> SessionBuilder
    where
        H: PreviewHost + 'static,
    {
        SessionBuilder {
            factory,
            host: Box::new(host),
            config: CameraKitConfig::default(),
            on_error: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn facing(&self) -> Facing {
        self.config.camera.facing
    }

    pub fn config(&self) -> &CameraKitConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Option<&CameraCapabilities> {
        self.capabilities.as_ref()
    }

    /// Stream resolution chosen for the running preview, in sensor orientation.
    pub fn preview_size(&self) -> Option<Size> {
        self.preview_size
    }

    /// [`preview_size`](Self::preview_size) in display orientation.
    pub fn adjusted_preview_size(&self) -> Option<Size> {
        let preview = self.preview_size?;
        let capabilities = self.capabilities.as_ref()?;
        Some(adjusted_preview_size(
            preview,
            capabilities.sensor_orientation(),
            self.rotation.degrees(),
        ))
    }

    pub fn display_rotation(&self) -> u32 {
        self.rotation.degrees()
    }

    /// A capture was requested and its result has not been dispatched yet.
    pub fn capture_pending(&self) -> bool {
        self.pending_capture.is_some()
    }

    pub fn notify_surface_created(&mut self, surface: SurfaceHandle) {
        self.handle(SessionEvent::SurfaceCreated(surface));
    }

    pub fn notify_surface_changed(&mut self, width: u32, height: u32) {
        self.handle(SessionEvent::SurfaceChanged { width, height });
    }

    pub fn notify_surface_destroyed(&mut self) {
        self.handle(SessionEvent::SurfaceDestroyed);
    }

    pub fn notify_orientation_changed(&mut self, reading: i32) {
        self.handle(SessionEvent::OrientationChanged(reading));
    }

    /// Close the camera. The surface is kept so [`start`](Self::start) can reopen.
    pub fn stop(&mut self) {
        self.handle(SessionEvent::Stop);
    }

    /// Reopen after [`stop`](Self::stop) when the surface is still valid.
    /// During a teardown the reopen waits for the camera to close.
    pub fn start(&mut self) {
        if self.state == SessionState::Stopping && self.stop_intent == StopIntent::Teardown {
            log::debug!("Session {} will start once the camera closes", self.id);
            self.start_after_close = true;
            return;
        }
        if !matches!(self.state, SessionState::Idle | SessionState::Closed) {
            log::debug!("Session {} already started ({})", self.id, self.state);
            return;
        }
        if self.surface.as_ref().is_some_and(|s| s.is_valid()) {
            self.transition(SessionState::SurfaceReady);
            self.open_camera();
        } else {
            log::debug!("Session {} has no surface to start on", self.id);
        }
    }

    /// Apply one event. Every state change goes through here.
    pub fn handle(&mut self, event: SessionEvent) {
        log::debug!("Session {} [{}] <- {}", self.id, self.state, event.name());
        match event {
            SessionEvent::SurfaceCreated(surface) => self.on_surface_created(surface),
            SessionEvent::SurfaceChanged { width, height } => {
                self.on_surface_changed(width, height)
            }
            SessionEvent::SurfaceDestroyed => {
                self.surface = None;
                self.surface_size = None;
                self.teardown();
            }
            SessionEvent::OrientationChanged(reading) => self.on_orientation_changed(reading),
            SessionEvent::Stop => self.teardown(),
            SessionEvent::Backend(event) => self.on_backend_event(event),
        }
    }

    /// Apply every backend completion received so far. Returns how many ran.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut dispatched = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle(SessionEvent::Backend(event));
            dispatched += 1;
        }
        dispatched
    }

    /// Block up to `timeout` for one backend completion, then drain the rest.
    pub fn wait_for_event(&mut self, timeout: Duration) -> bool {
        match self.events.recv_timeout(timeout) {
            Ok(event) => {
                self.handle(SessionEvent::Backend(event));
                self.dispatch_pending();
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                log::warn!("Session {} backend went away", self.id);
                false
            }
        }
    }

    /// Dispatch events until `done` holds for the state or `timeout` passes.
    pub fn run_until<P>(&mut self, timeout: Duration, done: P) -> bool
    where
        P: Fn(&SessionState) -> bool,
    {
        let deadline = Instant::now() + timeout;
        self.dispatch_pending();
        loop {
            if done(&self.state) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.wait_for_event(deadline - now);
        }
    }

    /// Take a still image. `completion` runs on the thread that dispatches
    /// events, exactly once, unless this returns an error.
    pub fn request_capture<F>(&mut self, completion: F) -> Result<(), CameraError>
    where
        F: FnOnce(CaptureResult) + 'static,
    {
        if self.state != SessionState::PreviewActive {
            return Err(CameraError::NotReady(format!(
                "cannot capture while {}",
                self.state
            )));
        }
        if self.pending_capture.is_some() {
            return Err(CameraError::CaptureFailed(
                "a capture is already in progress".to_string(),
            ));
        }
        let sensor_orientation = self
            .capabilities
            .as_ref()
            .map(|capabilities| capabilities.sensor_orientation())
            .ok_or_else(|| CameraError::NotReady("camera capabilities unknown".to_string()))?;

        let facing = self.backend.facing();
        let capture = StillCapture {
            id: self.next_capture_id,
            rotation_degrees: capture_rotation_degrees(
                sensor_orientation,
                self.rotation.degrees(),
                facing,
            ),
            flip_horizontal: needs_horizontal_flip(facing),
        };
        self.next_capture_id += 1;
        self.pending_capture = Some(PendingCapture {
            id: capture.id,
            facing,
            completion: Box::new(completion),
        });

        log::debug!(
            "Session {} capture {} (rotation {}, flip {})",
            self.id,
            capture.id,
            capture.rotation_degrees,
            capture.flip_horizontal
        );
        self.backend.capture_image(capture);
        Ok(())
    }

    /// [`request_capture`](Self::request_capture) for async callers. The
    /// receiver resolves once the session dispatches the result.
    pub fn capture(&mut self) -> Result<oneshot::Receiver<CaptureResult>, CameraError> {
        let (tx, rx) = oneshot::channel();
        self.request_capture(move |result| {
            let _ = tx.send(result);
        })?;
        Ok(rx)
    }

    /// Switch cameras. A running session is torn down and reopened on the
    /// other camera.
    pub fn set_facing(&mut self, facing: Facing) {
        if facing == self.config.camera.facing {
            return;
        }
        log::info!("Session {} switching to {} camera", self.id, facing);
        self.config.camera.facing = facing;

        match self.state {
            SessionState::Idle | SessionState::Closed => {
                if let Err(e) = self.rebuild_backend() {
                    self.fail(e);
                }
            }
            SessionState::Error(_) => {
                self.backend.stop_preview();
                self.backend.close();
                self.reopen();
            }
            SessionState::Stopping => {
                self.reopen_after_close = true;
                if self.stop_intent == StopIntent::Restart {
                    self.stop_intent = StopIntent::Teardown;
                    self.start_after_close = true;
                    self.backend.close();
                }
            }
            _ => {
                self.reopen_after_close = true;
                self.begin_stop(StopIntent::Teardown);
                self.start_after_close = true;
            }
        }
    }

    pub fn toggle_facing(&mut self) {
        self.set_facing(self.config.camera.facing.opposite());
    }

    pub fn set_flash(&mut self, flash: Flash) {
        self.config.camera.flash = flash;
        self.backend.set_flash(flash);
    }

    pub fn set_focus(&mut self, focus: Focus) {
        self.config.camera.focus = focus;
        self.backend.set_focus(focus);
    }

    pub fn set_sensor_preset(&mut self, preset: SensorPreset) {
        self.config.camera.sensor_preset = preset;
        self.backend.set_sensor_preset(preset);
    }

    pub fn set_preview_effect(&mut self, effect: PreviewEffect) {
        self.config.camera.preview_effect = effect;
        self.backend.set_preview_effect(effect);
    }

    pub fn set_zoom(&mut self, zoom_factor: f32) -> Result<(), CameraError> {
        if !zoom_factor.is_finite() || zoom_factor <= 0.0 {
            return Err(CameraError::Config(format!(
                "zoom factor must be positive, got {}",
                zoom_factor
            )));
        }
        self.config.camera.zoom_factor = zoom_factor;
        self.backend.set_zoom(zoom_factor);
        Ok(())
    }

    /// Target picture resolution. Applies the next time the camera opens.
    pub fn set_image_megapixels(&mut self, megapixels: f32) -> Result<(), CameraError> {
        if !megapixels.is_finite() || megapixels <= 0.0 {
            return Err(CameraError::Config(format!(
                "megapixels must be positive, got {}",
                megapixels
            )));
        }
        self.config.image.megapixels = megapixels;
        self.image_settings_changed();
        Ok(())
    }

    /// JPEG quality for captures. Applies the next time the camera opens.
    pub fn set_jpeg_quality(&mut self, quality: u8) -> Result<(), CameraError> {
        if quality == 0 || quality > 100 {
            return Err(CameraError::Config(format!(
                "JPEG quality must be between 1 and 100, got {}",
                quality
            )));
        }
        self.config.image.jpeg_quality = quality;
        self.image_settings_changed();
        Ok(())
    }

    pub fn set_adjust_view_bounds(&mut self, adjust: bool) {
        self.config.layout.adjust_view_bounds = adjust;
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: Option<f32>) -> Result<(), CameraError> {
        if let Some(ratio) = aspect_ratio {
            if !ratio.is_finite() || ratio <= 0.0 {
                return Err(CameraError::Config(format!(
                    "aspect ratio must be positive, got {}",
                    ratio
                )));
            }
        }
        self.config.layout.aspect_ratio = aspect_ratio;
        Ok(())
    }

    /// Measure the host view. Asking both axes to wrap content while
    /// adjust-view-bounds is on fails with a fatal `InvalidLayout`.
    pub fn measure(
        &mut self,
        width: LayoutDimension,
        height: LayoutDimension,
        available: Size,
    ) -> Result<Size, CameraError> {
        let result = layout::measure(
            self.config.layout.adjust_view_bounds,
            self.config.layout.aspect_ratio,
            width,
            height,
            available,
            self.adjusted_preview_size(),
        );
        if let Err(e) = &result {
            self.report(e);
        }
        result
    }

    /// Place the preview inside a host view of the given size.
    pub fn on_layout(&mut self, width: u32, height: u32) {
        let view = Size::new(width, height);
        let adjusted = self.adjusted_preview_size();
        match self.backend.kind() {
            BackendKind::Legacy => {
                let frame = surface_frame(view, adjusted.unwrap_or(Size::new(0, 0)));
                self.host.layout_surface(frame);
            }
            BackendKind::Modern => {
                if let Some(adjusted) = adjusted {
                    self.host
                        .apply_transform_matrix(preview_transform(view, adjusted));
                }
            }
        }
    }

    /// Tear down and stop the backend worker, waiting up to the configured
    /// shutdown timeout for queued hardware work to finish.
    pub fn shutdown(mut self) -> Result<(), CameraError> {
        if self.state.holds_device() || matches!(self.state, SessionState::Error(_)) {
            self.backend.stop_preview();
            self.backend.close();
        }
        self.fail_pending_capture(CameraError::NotReady("session shut down".to_string()));
        let timeout = self.config.session.shutdown_timeout();
        log::info!("Shutting down camera session {}", self.id);
        self.backend.shutdown(timeout)
    }

    fn on_surface_created(&mut self, surface: SurfaceHandle) {
        match self.state {
            SessionState::Idle | SessionState::Closed => {
                if !surface.is_valid() {
                    self.report(&CameraError::SurfaceInvalid(
                        "created surface is not valid".to_string(),
                    ));
                    return;
                }
                self.surface = Some(surface);
                self.transition(SessionState::SurfaceReady);
                self.open_camera();
            }
            SessionState::Stopping if self.stop_intent == StopIntent::Teardown => {
                if !surface.is_valid() {
                    self.report(&CameraError::SurfaceInvalid(
                        "created surface is not valid".to_string(),
                    ));
                    return;
                }
                self.surface = Some(surface);
                self.start_after_close = true;
            }
            _ => {
                log::warn!(
                    "Session {} ignoring surface_created while {}",
                    self.id,
                    self.state
                );
            }
        }
    }

    fn on_surface_changed(&mut self, width: u32, height: u32) {
        let valid = self.surface.as_ref().is_some_and(|s| s.is_valid());
        if !valid {
            self.report(&CameraError::SurfaceInvalid(
                "surface changed without a valid surface".to_string(),
            ));
            return;
        }
        let size = Size::new(width, height);
        if size.is_empty() {
            self.report(&CameraError::SurfaceInvalid(format!(
                "surface changed to empty size {}",
                size
            )));
            return;
        }
        self.surface_size = Some(size);

        match self.state {
            SessionState::CameraOpen => self.start_preview(),
            SessionState::PreviewStarting => self.restart_pending = true,
            SessionState::PreviewActive => self.begin_stop(StopIntent::Restart),
            _ => {}
        }
    }

    fn on_orientation_changed(&mut self, reading: i32) {
        if !self.rotation.update(reading) {
            return;
        }
        self.backend.set_display_rotation(self.rotation.degrees());
        if self.state == SessionState::PreviewActive {
            self.host.request_relayout();
        }
    }

    fn on_backend_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::Opened => self.on_opened(),
            BackendEvent::OpenFailed(error) => {
                if self.state == SessionState::CameraOpening {
                    self.fail(error);
                } else {
                    log::debug!("Session {} open failed while {}: {}", self.id, self.state, error);
                }
            }
            BackendEvent::PreviewStarted { size } => self.on_preview_started(size),
            BackendEvent::PreviewFailed(error) => {
                if self.state == SessionState::PreviewStarting {
                    self.fail(error);
                } else {
                    log::debug!("Session {} preview failed while {}: {}", self.id, self.state, error);
                }
            }
            BackendEvent::PreviewStopped => {
                if self.state == SessionState::Stopping && self.stop_intent == StopIntent::Restart
                {
                    self.start_preview();
                }
            }
            BackendEvent::Closed => {
                if self.state == SessionState::Stopping && self.stop_intent == StopIntent::Teardown
                {
                    self.finish_close();
                }
            }
            BackendEvent::ImageCaptured {
                id,
                data,
                rotation_degrees,
                mirrored,
            } => {
                let backend = self.backend.kind();
                self.complete_capture(id, |facing| {
                    Ok(CapturedImage {
                        data: Bytes::from(data),
                        facing,
                        backend,
                        rotation_degrees,
                        mirrored,
                        captured_at: Utc::now(),
                    })
                });
            }
            BackendEvent::CaptureFailed { id, error } => {
                self.report(&error);
                self.complete_capture(id, |_| Err(error));
            }
            BackendEvent::DeviceError(error) => self.on_device_error(error),
        }
    }

    fn on_opened(&mut self) {
        if self.state != SessionState::CameraOpening {
            log::debug!("Session {} ignoring camera_opened while {}", self.id, self.state);
            return;
        }
        match self.backend.fetch_capabilities() {
            Ok(capabilities) => {
                self.capabilities = Some(capabilities);
                self.transition(SessionState::CameraOpen);
                if self.surface_size.is_some() {
                    self.start_preview();
                }
            }
            Err(e) => self.fail(e),
        }
    }

    fn on_preview_started(&mut self, size: Size) {
        if self.state != SessionState::PreviewStarting {
            log::debug!("Session {} ignoring preview_started while {}", self.id, self.state);
            return;
        }
        self.transition(SessionState::PreviewActive);
        self.backend.set_display_rotation(self.rotation.degrees());
        if let Some(surface) = &self.surface {
            self.host.bind_surface(surface, size);
        }
        self.host.request_relayout();

        if self.restart_pending {
            self.begin_stop(StopIntent::Restart);
        }
    }

    fn on_device_error(&mut self, error: CameraError) {
        match self.state {
            SessionState::Idle | SessionState::Closed | SessionState::Error(_) => {
                log::debug!("Session {} ignoring camera_error while {}: {}", self.id, self.state, error);
            }
            SessionState::Stopping if self.stop_intent == StopIntent::Teardown => {
                log::debug!("Session {} camera_error during teardown: {}", self.id, error);
            }
            _ => {
                self.backend.stop_preview();
                self.backend.close();
                self.fail(error);
            }
        }
    }

    fn open_camera(&mut self) {
        self.backend.open();
        self.transition(SessionState::CameraOpening);
    }

    fn start_preview(&mut self) {
        let (Some(surface), Some(target)) = (self.surface.clone(), self.surface_size) else {
            self.transition(SessionState::CameraOpen);
            return;
        };
        let selected = match &self.capabilities {
            Some(capabilities) => select_preview_size(
                target.width,
                target.height,
                capabilities.sensor_orientation(),
                self.rotation.degrees(),
                capabilities.supported_preview_sizes(),
            ),
            None => Err(CameraError::DeviceUnavailable(
                "camera capabilities unknown".to_string(),
            )),
        };

        match selected {
            Ok(size) => {
                self.preview_size = Some(size);
                self.restart_pending = false;
                self.backend.start_preview(size, surface);
                self.transition(SessionState::PreviewStarting);
            }
            Err(e) => self.fail(e),
        }
    }

    fn begin_stop(&mut self, intent: StopIntent) {
        self.stop_intent = intent;
        self.restart_pending = false;
        self.backend.stop_preview();
        if intent == StopIntent::Teardown {
            self.backend.close();
        }
        self.transition(SessionState::Stopping);
    }

    fn teardown(&mut self) {
        match self.state {
            SessionState::Idle | SessionState::Closed => {}
            SessionState::Stopping => {
                self.start_after_close = false;
                if self.stop_intent == StopIntent::Restart {
                    self.stop_intent = StopIntent::Teardown;
                    self.backend.close();
                }
            }
            SessionState::Error(_) => {
                self.backend.stop_preview();
                self.backend.close();
                self.finish_close();
            }
            _ => self.begin_stop(StopIntent::Teardown),
        }
    }

    fn finish_close(&mut self) {
        self.transition(SessionState::Closed);
        self.capabilities = None;
        self.preview_size = None;
        self.restart_pending = false;
        self.fail_pending_capture(CameraError::NotReady("camera closed".to_string()));

        let start = std::mem::take(&mut self.start_after_close);
        if self.reopen_after_close {
            self.reopen_after_close = false;
            if let Err(e) = self.rebuild_backend() {
                self.fail(e);
                return;
            }
            self.transition(SessionState::Idle);
        } else if self.image_changed {
            if let Err(e) = self.rebuild_backend() {
                self.fail(e);
                return;
            }
        }
        if start {
            self.start();
        }
    }

    /// Backends take image settings at construction, so an idle session gets
    /// a fresh one now and an open one gets it once the device closes.
    fn image_settings_changed(&mut self) {
        match self.state {
            SessionState::Idle | SessionState::Closed => {
                if let Err(e) = self.rebuild_backend() {
                    self.fail(e);
                }
            }
            _ => self.image_changed = true,
        }
    }

    /// Replace the backend for the current facing and open it if a surface
    /// is waiting.
    fn reopen(&mut self) {
        self.reopen_after_close = false;
        if let Err(e) = self.rebuild_backend() {
            self.fail(e);
            return;
        }
        self.capabilities = None;
        self.preview_size = None;
        self.transition(SessionState::Idle);
        self.start();
    }

    fn rebuild_backend(&mut self) -> Result<(), CameraError> {
        let worker_name = format!("camerakit-worker-{}", self.id);
        let (backend, events) =
            self.factory
                .create(&worker_name, &self.config.camera, &self.config.image)?;
        backend.set_display_rotation(self.rotation.degrees());
        self.image_changed = false;

        // One live backend per session: the old worker finishes its queued
        // teardown before the new one may touch the hardware.
        let mut previous = std::mem::replace(&mut self.backend, backend);
        if let Err(e) = previous.shutdown(self.config.session.shutdown_timeout()) {
            log::warn!("Session {} previous backend did not stop: {}", self.id, e);
        }
        self.events = events;
        log::info!(
            "Session {} rebuilt {} backend for {} camera",
            self.id,
            self.backend.kind(),
            self.config.camera.facing
        );
        Ok(())
    }

    fn complete_capture<F>(&mut self, id: u64, result: F)
    where
        F: FnOnce(Facing) -> CaptureResult,
    {
        match self.pending_capture.take() {
            Some(pending) if pending.id == id => (pending.completion)(result(pending.facing)),
            other => {
                log::debug!("Session {} dropping result of stale capture {}", self.id, id);
                self.pending_capture = other;
            }
        }
    }

    fn fail_pending_capture(&mut self, error: CameraError) {
        if let Some(pending) = self.pending_capture.take() {
            (pending.completion)(Err(error));
        }
    }

    fn fail(&mut self, error: CameraError) {
        log::warn!("Session {} failed: {}", self.id, error);
        self.fail_pending_capture(error.clone());
        self.report(&error);
        self.transition(SessionState::Error(error));
    }

    fn report(&mut self, error: &CameraError) {
        if error.is_fatal() {
            log::error!("Session {}: {}", self.id, error);
        }
        if let Some(listener) = self.on_error.as_mut() {
            listener(error.kind(), error.message(), error.is_fatal());
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            log::info!("Session {}: {} -> {}", self.id, self.state, next);
        }
        self.state = next;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("backend", &self.backend.kind())
            .field("state", &self.state)
            .field("facing", &self.config.camera.facing)
            .field("preview_size", &self.preview_size)
            .finish()
    }
}
