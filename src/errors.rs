use serde::{Deserialize, Serialize};

/// Every failure the camera core can report.
///
/// Adapter-level failures (surface races, a single failed capture) are
/// non-fatal: the session absorbs them into its `Error` state and can still be
/// torn down and reopened. Caller misconfiguration is fatal and is returned
/// synchronously instead of being queued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    #[error("Camera device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Camera open denied: {0}")]
    OpenDenied(String),
    #[error("Camera already open: {0}")]
    AlreadyOpen(String),
    #[error("Preview surface invalid: {0}")]
    SurfaceInvalid(String),
    #[error("Camera configuration failed: {0}")]
    ConfigurationFailed(String),
    #[error("Capture error: {0}")]
    CaptureFailed(String),
    #[error("No supported size: {0}")]
    NoSupportedSize(String),
    #[error("Camera not ready: {0}")]
    NotReady(String),
    #[error("Invalid layout: {0}")]
    InvalidLayout(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Copyable discriminant of [`CameraError`], handed to error listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    DeviceUnavailable,
    OpenDenied,
    AlreadyOpen,
    SurfaceInvalid,
    ConfigurationFailed,
    CaptureFailed,
    NoSupportedSize,
    NotReady,
    InvalidLayout,
    Config,
}

impl CameraError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CameraError::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            CameraError::OpenDenied(_) => ErrorKind::OpenDenied,
            CameraError::AlreadyOpen(_) => ErrorKind::AlreadyOpen,
            CameraError::SurfaceInvalid(_) => ErrorKind::SurfaceInvalid,
            CameraError::ConfigurationFailed(_) => ErrorKind::ConfigurationFailed,
            CameraError::CaptureFailed(_) => ErrorKind::CaptureFailed,
            CameraError::NoSupportedSize(_) => ErrorKind::NoSupportedSize,
            CameraError::NotReady(_) => ErrorKind::NotReady,
            CameraError::InvalidLayout(_) => ErrorKind::InvalidLayout,
            CameraError::Config(_) => ErrorKind::Config,
        }
    }

    /// Fatal errors are caller bugs; retrying the lifecycle will not help.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CameraError::InvalidLayout(_) | CameraError::Config(_))
    }

    pub fn message(&self) -> &str {
        match self {
            CameraError::DeviceUnavailable(msg)
            | CameraError::OpenDenied(msg)
            | CameraError::AlreadyOpen(msg)
            | CameraError::SurfaceInvalid(msg)
            | CameraError::ConfigurationFailed(msg)
            | CameraError::CaptureFailed(msg)
            | CameraError::NoSupportedSize(msg)
            | CameraError::NotReady(msg)
            | CameraError::InvalidLayout(msg)
            | CameraError::Config(msg) => msg,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::DeviceUnavailable => "device_unavailable",
            ErrorKind::OpenDenied => "open_denied",
            ErrorKind::AlreadyOpen => "already_open",
            ErrorKind::SurfaceInvalid => "surface_invalid",
            ErrorKind::ConfigurationFailed => "configuration_failed",
            ErrorKind::CaptureFailed => "capture_failed",
            ErrorKind::NoSupportedSize => "no_supported_size",
            ErrorKind::NotReady => "not_ready",
            ErrorKind::InvalidLayout => "invalid_layout",
            ErrorKind::Config => "config",
        };
        write!(f, "{}", name)
    }
}

impl From<config::ConfigError> for CameraError {
    fn from(e: config::ConfigError) -> Self {
        CameraError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(
            CameraError::NotReady("x".to_string()).kind(),
            ErrorKind::NotReady
        );
        assert_eq!(
            CameraError::CaptureFailed("x".to_string()).kind(),
            ErrorKind::CaptureFailed
        );
    }

    #[test]
    fn test_only_caller_errors_are_fatal() {
        assert!(CameraError::InvalidLayout("both wrap".to_string()).is_fatal());
        assert!(CameraError::Config("bad".to_string()).is_fatal());
        assert!(!CameraError::SurfaceInvalid("gone".to_string()).is_fatal());
        assert!(!CameraError::OpenDenied("busy".to_string()).is_fatal());
    }

    #[test]
    fn test_display_includes_message() {
        let error = CameraError::OpenDenied("camera busy".to_string());
        assert_eq!(error.to_string(), "Camera open denied: camera busy");
        assert_eq!(error.message(), "camera busy");
    }
}
