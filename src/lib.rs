//! CameraKit: one preview/capture interface over two incompatible camera APIs
//!
//! The older synchronous API and the newer asynchronous, session-based API
//! sit behind a single [`CameraBackend`](backend::CameraBackend) contract. A
//! [`Session`] sequences surface and camera lifecycle events into backend
//! calls, picks the stream resolution for the on-screen surface and keeps
//! preview and capture rotation in step with the display.
//!
//! # Features
//! - Legacy and modern backends selected once per session
//! - Best-cover preview size selection with sensor/display rotation handling
//! - Rotated and mirrored still captures
//! - Single background worker per backend, FIFO ordered
//! - Simulated drivers for hardware-free testing
//!
//! # Usage
//! ```rust,no_run
//! use camerakit::backend::BackendFactory;
//! use camerakit::testing::{MemorySurface, RecordingHost, SimulatedLegacyDriver, SimulatedModernDriver};
//! use camerakit::Session;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let factory = BackendFactory::for_api_level(
//!     28,
//!     Arc::new(SimulatedLegacyDriver::phone()),
//!     Arc::new(SimulatedModernDriver::phone()),
//! );
//! let (host, _log) = RecordingHost::new();
//! let mut session = Session::builder(factory, host).build()?;
//!
//! session.notify_surface_created(MemorySurface::new());
//! session.notify_surface_changed(1080, 1920);
//! session.run_until(Duration::from_secs(2), |state| {
//!     *state == camerakit::SessionState::PreviewActive
//! });
//! # Ok::<(), camerakit::CameraError>(())
//! ```
pub mod backend;
pub mod config;
pub mod errors;
pub mod layout;
pub mod rotation;
pub mod selection;
pub mod session;
pub mod surface;
pub mod transform;
pub mod types;
pub mod worker;

// Simulated hardware for offline testing
pub mod testing;

// Re-exports for convenience
pub use backend::{BackendEvent, BackendFactory, CameraBackend};
pub use config::CameraKitConfig;
pub use errors::{CameraError, ErrorKind};
pub use session::{Session, SessionBuilder, SessionEvent, SessionState};
pub use surface::{PreviewHost, PreviewSurface, SurfaceHandle};
pub use types::{
    BackendKind, CameraCapabilities, CapturedImage, Facing, Flash, Focus, PreviewEffect,
    SensorPreset, Size,
};

/// Initialize logging for the camera system
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "camerakit=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        native_driver: cfg!(feature = "native"),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Built with the webcam-backed legacy driver.
    pub native_driver: bool,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "camerakit");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
    }

    #[test]
    fn test_init_logging_is_repeatable() {
        init_logging();
        init_logging();
    }
}
