//! Stand-in for the session-based camera API.
//!
//! Device opens and session configuration complete on short-lived threads,
//! so callbacks arrive from outside the backend worker the way real driver
//! callbacks do.

use super::synthetic_data::{synthetic_frame, PhoneCameraProfile, SYNTHETIC_FRAME_SIZE};
use crate::backend::{
    DeviceCallback, DeviceCharacteristics, DeviceStateEvent, ModernCaptureSession, ModernDevice,
    ModernDriver, PreviewRequest, SessionCallback, SessionStateEvent,
};
use crate::errors::CameraError;
use crate::surface::SurfaceHandle;
use crate::types::{Facing, Focus};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

/// What the driver has been asked to do so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModernDriverLog {
    pub open_requests: Vec<String>,
    pub devices_opened: usize,
    pub devices_closed: usize,
    pub sessions_created: usize,
    pub sessions_closed: usize,
    /// Every repeating request accepted, in order.
    pub requests: Vec<PreviewRequest>,
}

impl ModernDriverLog {
    pub fn open_devices(&self) -> usize {
        self.devices_opened.saturating_sub(self.devices_closed)
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions_created.saturating_sub(self.sessions_closed)
    }
}

#[derive(Debug, Default)]
struct Faults {
    list_fails: bool,
    unqueryable: HashSet<String>,
    refuse_open: HashSet<String>,
    deny_open: Option<i32>,
    configure_fails: bool,
    request_fails: bool,
    open_delay: Duration,
}

#[derive(Default)]
struct Shared {
    faults: Mutex<Faults>,
    log: Mutex<ModernDriverLog>,
    callbacks: Mutex<HashMap<String, DeviceCallback>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Simulated [`ModernDriver`] with fault injection.
pub struct SimulatedModernDriver {
    devices: Vec<(String, DeviceCharacteristics)>,
    shared: Arc<Shared>,
}

impl SimulatedModernDriver {
    pub fn new(devices: Vec<(String, DeviceCharacteristics)>) -> Self {
        Self {
            devices,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Device "0" faces back at 90 degrees with flash and autofocus; device
    /// "1" faces front at 270 degrees with fixed focus.
    pub fn phone() -> Self {
        let profile = PhoneCameraProfile::typical();
        let back = DeviceCharacteristics {
            lens_facing: Some(Facing::Back),
            sensor_orientation: Some(profile.back_orientation),
            output_sizes: Some(profile.preview_sizes.clone()),
            af_modes: vec![Focus::Off, Focus::Auto, Focus::Continuous],
            flash_available: true,
            max_digital_zoom: profile.max_digital_zoom,
        };
        let front = DeviceCharacteristics {
            lens_facing: Some(Facing::Front),
            sensor_orientation: Some(profile.front_orientation),
            output_sizes: Some(profile.preview_sizes),
            af_modes: vec![Focus::Off],
            flash_available: false,
            max_digital_zoom: 1.0,
        };
        Self::new(vec![("0".to_string(), back), ("1".to_string(), front)])
    }

    pub fn fail_listing(&self, fail: bool) {
        lock(&self.shared.faults).list_fails = fail;
    }

    /// Make `characteristics(id)` fail.
    pub fn make_unqueryable(&self, id: &str) {
        lock(&self.shared.faults).unqueryable.insert(id.to_string());
    }

    /// Make `open_device(id)` fail synchronously.
    pub fn refuse_open(&self, id: &str) {
        lock(&self.shared.faults).refuse_open.insert(id.to_string());
    }

    /// Accept open requests but report this error code through the callback.
    pub fn deny_open(&self, code: Option<i32>) {
        lock(&self.shared.faults).deny_open = code;
    }

    pub fn fail_configure(&self, fail: bool) {
        lock(&self.shared.faults).configure_fails = fail;
    }

    pub fn fail_requests(&self, fail: bool) {
        lock(&self.shared.faults).request_fails = fail;
    }

    /// Delay before open callbacks fire.
    pub fn set_open_delay(&self, delay: Duration) {
        lock(&self.shared.faults).open_delay = delay;
    }

    /// Report a disconnect for an opened device. Returns false when the
    /// device was never opened.
    pub fn disconnect(&self, id: &str) -> bool {
        self.notify(id, DeviceStateEvent::Disconnected)
    }

    pub fn raise_device_error(&self, id: &str, code: i32) -> bool {
        self.notify(id, DeviceStateEvent::Error(code))
    }

    fn notify(&self, id: &str, event: DeviceStateEvent) -> bool {
        let callback = lock(&self.shared.callbacks).get(id).cloned();
        match callback {
            Some(callback) => {
                callback(event);
                true
            }
            None => false,
        }
    }

    pub fn log(&self) -> ModernDriverLog {
        lock(&self.shared.log).clone()
    }
}

impl ModernDriver for SimulatedModernDriver {
    fn camera_ids(&self) -> Result<Vec<String>, CameraError> {
        if lock(&self.shared.faults).list_fails {
            return Err(CameraError::DeviceUnavailable(
                "camera service unavailable".to_string(),
            ));
        }
        Ok(self.devices.iter().map(|(id, _)| id.clone()).collect())
    }

    fn characteristics(&self, id: &str) -> Result<DeviceCharacteristics, CameraError> {
        if lock(&self.shared.faults).unqueryable.contains(id) {
            return Err(CameraError::DeviceUnavailable(format!(
                "characteristics of {} unavailable",
                id
            )));
        }
        self.devices
            .iter()
            .find(|(device_id, _)| device_id == id)
            .map(|(_, characteristics)| characteristics.clone())
            .ok_or_else(|| CameraError::DeviceUnavailable(format!("unknown camera {}", id)))
    }

    fn open_device(&self, id: &str, callback: DeviceCallback) -> Result<(), CameraError> {
        let (refused, deny, delay) = {
            let faults = lock(&self.shared.faults);
            (faults.refuse_open.contains(id), faults.deny_open, faults.open_delay)
        };
        lock(&self.shared.log).open_requests.push(id.to_string());
        if refused {
            return Err(CameraError::OpenDenied(format!("camera {} is disabled", id)));
        }
        lock(&self.shared.callbacks).insert(id.to_string(), callback.clone());

        let shared = self.shared.clone();
        let id = id.to_string();
        thread::spawn(move || {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            match deny {
                Some(code) => callback(DeviceStateEvent::Error(code)),
                None => {
                    lock(&shared.log).devices_opened += 1;
                    callback(DeviceStateEvent::Opened(Box::new(SimulatedDevice {
                        id,
                        shared: shared.clone(),
                        closed: false,
                    })));
                }
            }
        });
        Ok(())
    }
}

struct SimulatedDevice {
    id: String,
    shared: Arc<Shared>,
    closed: bool,
}

impl ModernDevice for SimulatedDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_capture_session(
        &mut self,
        surface: SurfaceHandle,
        callback: SessionCallback,
    ) -> Result<(), CameraError> {
        if self.closed {
            return Err(CameraError::DeviceUnavailable(format!(
                "camera {} is closed",
                self.id
            )));
        }
        if !surface.is_valid() {
            return Err(CameraError::SurfaceInvalid(
                "output surface was abandoned".to_string(),
            ));
        }
        let configure_fails = lock(&self.shared.faults).configure_fails;
        let shared = self.shared.clone();
        thread::spawn(move || {
            if configure_fails {
                callback(SessionStateEvent::ConfigureFailed);
                return;
            }
            lock(&shared.log).sessions_created += 1;
            callback(SessionStateEvent::Configured(Box::new(SimulatedSession {
                surface,
                shared: shared.clone(),
                frames: 0,
                closed: false,
            })));
        });
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        lock(&self.shared.log).devices_closed += 1;
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        self.close();
    }
}

struct SimulatedSession {
    surface: SurfaceHandle,
    shared: Arc<Shared>,
    frames: u64,
    closed: bool,
}

impl ModernCaptureSession for SimulatedSession {
    fn set_repeating_request(&mut self, request: &PreviewRequest) -> Result<(), CameraError> {
        if self.closed {
            return Err(CameraError::ConfigurationFailed(
                "session is closed".to_string(),
            ));
        }
        if lock(&self.shared.faults).request_fails {
            return Err(CameraError::ConfigurationFailed(
                "repeating request rejected".to_string(),
            ));
        }
        lock(&self.shared.log).requests.push(request.clone());
        if self.surface.is_valid() {
            self.frames += 1;
            self.surface.present(synthetic_frame(
                self.frames,
                SYNTHETIC_FRAME_SIZE.width,
                SYNTHETIC_FRAME_SIZE.height,
            ));
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        lock(&self.shared.log).sessions_closed += 1;
    }
}

impl Drop for SimulatedSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_open_completes_from_another_thread() {
        let driver = SimulatedModernDriver::phone();
        let caller = thread::current().id();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let callback: DeviceCallback = Arc::new(move |event: DeviceStateEvent| {
            let opened = matches!(event, DeviceStateEvent::Opened(_));
            let _ = lock(&tx).send((opened, thread::current().id()));
        });
        driver.open_device("0", callback).unwrap();

        let (opened, thread_id) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(opened);
        assert_ne!(thread_id, caller);
    }

    #[test]
    fn test_refused_open_fails_synchronously() {
        let driver = SimulatedModernDriver::phone();
        driver.refuse_open("1");
        let callback: DeviceCallback = Arc::new(|_: DeviceStateEvent| {});
        assert!(matches!(
            driver.open_device("1", callback),
            Err(CameraError::OpenDenied(_))
        ));
        assert_eq!(driver.log().open_requests, vec!["1".to_string()]);
    }
}
