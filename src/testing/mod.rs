//! Testing utilities for CameraKit
//!
//! Simulated hardware for both camera APIs, an in-memory preview surface and
//! a recording preview host, so sessions can run end to end without a
//! device.

pub mod host;
pub mod legacy_sim;
pub mod modern_sim;
pub mod synthetic_data;

pub use host::{HostCall, HostLog, MemorySurface, RecordingHost};
pub use legacy_sim::{LegacyCameraModel, LegacyDriverLog, SimulatedLegacyDriver};
pub use modern_sim::{ModernDriverLog, SimulatedModernDriver};
pub use synthetic_data::{
    synthetic_frame, synthetic_jpeg, PhoneCameraProfile, SYNTHETIC_FRAME_SIZE,
};
