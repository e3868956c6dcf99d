//! Hardware backends behind one capability contract.
//!
//! Every operation is asynchronous relative to the caller: it queues work on
//! the backend's worker and the outcome comes back later as a
//! [`BackendEvent`] on the channel handed out at construction.

pub mod legacy;
pub mod modern;
#[cfg(feature = "native")]
pub mod native;

use crate::config::{CameraConfig, ImageConfig};
use crate::errors::CameraError;
use crate::surface::SurfaceHandle;
use crate::transform::{ImageTransform, JpegTransform};
use crate::types::{
    BackendKind, CameraCapabilities, Facing, Flash, Focus, PreviewEffect, SensorPreset, Size,
};
use crate::worker::Worker;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use legacy::{
    LegacyBackend, LegacyCamera, LegacyCameraInfo, LegacyDriver, LegacyErrorCallback,
    LegacyParameters,
};
pub use modern::{
    DeviceCallback, DeviceCharacteristics, DeviceStateEvent, ModernBackend, ModernCaptureSession,
    ModernDevice, ModernDriver, PreviewRequest, SessionCallback, SessionStateEvent,
};

/// One still capture as requested by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StillCapture {
    pub id: u64,
    /// Rotation the encoded image needs to display upright.
    pub rotation_degrees: u32,
    /// Mirror the image horizontally (front cameras).
    pub flip_horizontal: bool,
}

/// Completion notifications from a backend, in completion order.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    Opened,
    OpenFailed(CameraError),
    Closed,
    PreviewStarted { size: Size },
    PreviewFailed(CameraError),
    PreviewStopped,
    ImageCaptured {
        id: u64,
        data: Vec<u8>,
        rotation_degrees: u32,
        mirrored: bool,
    },
    CaptureFailed { id: u64, error: CameraError },
    /// Asynchronous device failure or disconnect.
    DeviceError(CameraError),
}

/// Sending side of a backend's event channel.
#[derive(Debug, Clone)]
pub struct BackendEvents {
    sender: Sender<BackendEvent>,
}

impl BackendEvents {
    pub fn channel() -> (Self, Receiver<BackendEvent>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: BackendEvent) {
        if self.sender.send(event).is_err() {
            log::debug!("Backend event dropped; session is gone");
        }
    }
}

/// Capabilities published by the worker on open, read by the controlling
/// thread. Written once per open and cleared on close.
#[derive(Debug, Clone, Default)]
pub(crate) struct CapabilitySlot {
    inner: Arc<Mutex<Option<CameraCapabilities>>>,
}

impl CapabilitySlot {
    pub(crate) fn publish(&self, capabilities: CameraCapabilities) {
        let mut slot = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(capabilities);
    }

    pub(crate) fn clear(&self) {
        let mut slot = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }

    pub(crate) fn get(&self) -> Result<CameraCapabilities, CameraError> {
        self.inner
            .lock()
            .map_err(|_| CameraError::DeviceUnavailable("capability lock poisoned".to_string()))?
            .clone()
            .ok_or_else(|| CameraError::DeviceUnavailable("camera is not open".to_string()))
    }
}

/// At most one capture in flight per backend.
#[derive(Debug, Clone, Default)]
pub(crate) struct CaptureGuard {
    busy: Arc<AtomicBool>,
}

impl CaptureGuard {
    /// False when a capture is already running.
    pub(crate) fn try_acquire(&self) -> bool {
        !self.busy.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Controlling-thread half shared by both backends: the worker plus the
/// state published back from it.
pub(crate) struct BackendCore<S> {
    pub(crate) facing: Facing,
    pub(crate) worker: Worker<S>,
    pub(crate) capabilities: CapabilitySlot,
    pub(crate) capture_guard: CaptureGuard,
    pub(crate) events: BackendEvents,
}

impl<S: Send + 'static> BackendCore<S> {
    pub(crate) fn post<F>(&self, task: F)
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.worker.post(task);
    }

    /// Queue a capture unless one is already in flight.
    pub(crate) fn capture<F>(&self, capture: StillCapture, task: F)
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        if !self.capture_guard.try_acquire() {
            log::warn!("Capture {} rejected: another capture is in progress", capture.id);
            self.events.emit(BackendEvent::CaptureFailed {
                id: capture.id,
                error: CameraError::CaptureFailed("a capture is already in progress".to_string()),
            });
            return;
        }
        if !self.worker.post(task) {
            self.capture_guard.release();
            self.events.emit(BackendEvent::CaptureFailed {
                id: capture.id,
                error: CameraError::NotReady("backend worker has stopped".to_string()),
            });
        }
    }

    pub(crate) fn shutdown(&mut self, timeout: Duration) -> Result<(), CameraError> {
        self.worker.shutdown(timeout)
    }
}

/// Whether the device handle has an outstanding close notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeviceLifecycle {
    /// Nothing acquired and nothing owed.
    Closed,
    Opening,
    Open,
    /// The last open attempt failed; the next close still reports `Closed`.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PreviewLifecycle {
    Stopped,
    Starting,
    Running,
}

/// The capability contract shared by both hardware API families.
pub trait CameraBackend {
    fn kind(&self) -> BackendKind;

    fn facing(&self) -> Facing;

    /// Snapshot taken on the last successful open.
    fn fetch_capabilities(&self) -> Result<CameraCapabilities, CameraError>;

    /// Emits `Opened` or `OpenFailed`.
    fn open(&self);

    /// Emits `Closed` once; closing an already-closed device is a no-op.
    fn close(&self);

    /// Emits `PreviewStarted` or `PreviewFailed`.
    fn start_preview(&self, target_size: Size, surface: SurfaceHandle);

    /// Emits `PreviewStopped` once; stopping a stopped preview is a no-op.
    fn stop_preview(&self);

    /// Applied opportunistically; buffered while the camera is closed.
    fn set_display_rotation(&self, degrees: u32);

    fn set_flash(&self, flash: Flash);

    fn set_focus(&self, focus: Focus);

    fn set_sensor_preset(&self, preset: SensorPreset);

    fn set_preview_effect(&self, effect: PreviewEffect);

    fn set_zoom(&self, zoom_factor: f32);

    /// Emits `ImageCaptured` or `CaptureFailed`; the preview keeps running.
    fn capture_image(&self, capture: StillCapture);

    /// Stop the worker once queued work has drained.
    fn shutdown(&mut self, timeout: Duration) -> Result<(), CameraError>;
}

/// Picks and builds backends for a session. Chosen once per session.
#[derive(Clone)]
pub enum BackendFactory {
    Legacy(Arc<dyn LegacyDriver>),
    Modern(Arc<dyn ModernDriver>),
}

impl std::fmt::Debug for BackendFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BackendFactory({})", self.kind())
    }
}

impl BackendFactory {
    /// Use the session-based API where the platform level has it.
    pub fn for_api_level(
        api_level: u32,
        legacy: Arc<dyn LegacyDriver>,
        modern: Arc<dyn ModernDriver>,
    ) -> Self {
        Self::select(BackendKind::for_api_level(api_level), legacy, modern)
    }

    pub fn select(
        kind: BackendKind,
        legacy: Arc<dyn LegacyDriver>,
        modern: Arc<dyn ModernDriver>,
    ) -> Self {
        match kind {
            BackendKind::Legacy => BackendFactory::Legacy(legacy),
            BackendKind::Modern => BackendFactory::Modern(modern),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            BackendFactory::Legacy(_) => BackendKind::Legacy,
            BackendFactory::Modern(_) => BackendKind::Modern,
        }
    }

    /// Build a fresh backend instance with its own worker and event channel.
    pub fn create(
        &self,
        worker_name: &str,
        camera: &CameraConfig,
        image: &ImageConfig,
    ) -> Result<(Box<dyn CameraBackend>, Receiver<BackendEvent>), CameraError> {
        let (events, receiver) = BackendEvents::channel();
        let backend: Box<dyn CameraBackend> = match self {
            BackendFactory::Legacy(driver) => {
                let transform: Arc<dyn ImageTransform> =
                    Arc::new(JpegTransform::new(image.jpeg_quality));
                Box::new(LegacyBackend::new(
                    worker_name,
                    driver.clone(),
                    camera.clone(),
                    image.clone(),
                    transform,
                    events,
                )?)
            }
            BackendFactory::Modern(driver) => Box::new(ModernBackend::new(
                worker_name,
                driver.clone(),
                camera.clone(),
                image.clone(),
                events,
            )?),
        };
        Ok((backend, receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Size;

    #[test]
    fn test_capture_guard_rejects_second_capture() {
        let guard = CaptureGuard::default();
        assert!(guard.try_acquire());
        assert!(!guard.try_acquire());
        guard.release();
        assert!(guard.try_acquire());
    }

    #[test]
    fn test_capability_slot_lifecycle() {
        let slot = CapabilitySlot::default();
        assert!(matches!(slot.get(), Err(CameraError::DeviceUnavailable(_))));

        let caps = CameraCapabilities::new(Facing::Back, 90, vec![Size::new(640, 480)]).unwrap();
        slot.publish(caps.clone());
        assert_eq!(slot.get().unwrap(), caps);

        slot.clear();
        assert!(slot.get().is_err());
    }

    #[test]
    fn test_events_survive_dropped_receiver() {
        let (events, receiver) = BackendEvents::channel();
        drop(receiver);
        events.emit(BackendEvent::Opened);
    }
}
