//! Webcam-backed legacy driver
//!
//! Run with: cargo test --test native_driver_test --features native
//! Hardware tests are ignored by default: cargo test --features native -- --ignored

use camerakit::backend::legacy::LegacyCamera;
use camerakit::backend::native::NokhwaDriver;
use camerakit::backend::{BackendFactory, LegacyDriver};
use camerakit::testing::{MemorySurface, RecordingHost};
use camerakit::{CameraError, CameraKitConfig, Facing, Session, SessionState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot::error::TryRecvError;

#[test]
fn test_out_of_range_camera_is_unavailable() {
    let driver = NokhwaDriver::new();
    let result = driver.camera_info(usize::MAX);
    assert!(matches!(result, Err(CameraError::DeviceUnavailable(_))));
}

#[test]
#[ignore = "needs a webcam"]
fn test_webcams_report_front_facing() {
    let driver = NokhwaDriver::new();
    assert!(driver.camera_count() > 0, "no webcam attached");
    let info = driver.camera_info(0).unwrap();
    assert_eq!(info.facing, Facing::Front);
    assert_eq!(info.orientation, 0);
}

#[test]
#[ignore = "needs a webcam"]
fn test_missed_frame_fails_capture_without_device_error() {
    let driver = NokhwaDriver::new();
    let mut camera = driver.open(0).unwrap();
    let raised = Arc::new(AtomicBool::new(false));
    let flag = raised.clone();
    camera.set_error_callback(Box::new(move |_| flag.store(true, Ordering::SeqCst)));

    // No stream is open, so there is no frame to take.
    let result = camera.take_picture();
    assert!(matches!(result, Err(CameraError::CaptureFailed(_))));
    assert!(!raised.load(Ordering::SeqCst));
    camera.release();
}

#[test]
#[ignore = "needs a webcam"]
fn test_webcam_session_captures() {
    let mut config = CameraKitConfig::default();
    config.camera.facing = Facing::Front;
    let (host, _log) = RecordingHost::new();
    let mut session = Session::builder(BackendFactory::Legacy(Arc::new(NokhwaDriver::new())), host)
        .config(config)
        .build()
        .unwrap();

    session.notify_surface_created(MemorySurface::new());
    session.notify_surface_changed(1280, 720);
    assert!(session.run_until(Duration::from_secs(10), |state| {
        *state == SessionState::PreviewActive
    }));

    let mut receiver = session.capture().unwrap();
    let image = loop {
        match receiver.try_recv() {
            Ok(result) => break result.unwrap(),
            Err(TryRecvError::Empty) => {
                session.wait_for_event(Duration::from_millis(50));
            }
            Err(TryRecvError::Closed) => panic!("capture was dropped"),
        }
    };
    assert!(image.mirrored);
    assert!(!image.data.is_empty());
    session.shutdown().unwrap();
}
