//! Configuration file and environment override tests

use camerakit::config::CameraKitConfig;
use camerakit::{BackendKind, CameraError, Facing, Flash, SensorPreset};
use std::fs;
use tempfile::tempdir;

#[cfg(test)]
mod file_tests {
    use super::*;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("camerakit.toml");

        let mut config = CameraKitConfig::default();
        config.camera.facing = Facing::Front;
        config.camera.flash = Flash::Torch;
        config.camera.zoom_factor = 2.5;
        config.camera.sensor_preset = SensorPreset::NightPortrait;
        config.image.jpeg_quality = 85;
        config.layout.adjust_view_bounds = true;
        config.layout.aspect_ratio = Some(0.75);
        config.session.backend = Some(BackendKind::Legacy);
        config.session.initial_display_rotation = 270;

        config.save_to_file(&path).unwrap();
        assert!(path.exists());

        let loaded = CameraKitConfig::load_with_prefix(&path, "CAMERAKIT_IT_ROUND_TRIP").unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        fs::write(&path, "[camera]\nfacing = \"front\"\n").unwrap();

        let loaded = CameraKitConfig::load_with_prefix(&path, "CAMERAKIT_IT_PARTIAL").unwrap();
        assert_eq!(loaded.camera.facing, Facing::Front);
        assert_eq!(loaded.camera.flash, Flash::Off);
        assert_eq!(loaded.image, CameraKitConfig::default().image);
        assert_eq!(loaded.session, CameraKitConfig::default().session);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let loaded =
            CameraKitConfig::load_with_prefix(dir.path().join("absent.toml"), "CAMERAKIT_IT_ABSENT")
                .unwrap();
        assert_eq!(loaded, CameraKitConfig::default());
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[camera\nfacing = ").unwrap();

        let result = CameraKitConfig::load_with_prefix(&path, "CAMERAKIT_IT_BROKEN");
        assert!(matches!(result, Err(CameraError::Config(_))));
    }

    #[test]
    fn test_unknown_enum_value_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sideways.toml");
        fs::write(&path, "[camera]\nfacing = \"sideways\"\n").unwrap();

        assert!(CameraKitConfig::load_with_prefix(&path, "CAMERAKIT_IT_SIDEWAYS").is_err());
    }

    #[test]
    fn test_invalid_values_fail_validation_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("invalid.toml");
        fs::write(&path, "[image]\njpeg_quality = 0\n").unwrap();

        let err = CameraKitConfig::load_with_prefix(&path, "CAMERAKIT_IT_INVALID").unwrap_err();
        assert!(err.is_fatal());
        assert!(err.message().contains("JPEG quality"));
    }
}

#[cfg(test)]
mod env_tests {
    use super::*;

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("camerakit.toml");
        fs::write(&path, "[camera]\nfacing = \"back\"\n\n[image]\njpeg_quality = 90\n").unwrap();

        std::env::set_var("CAMERAKIT_IT_ENV_CAMERA__FACING", "front");
        std::env::set_var("CAMERAKIT_IT_ENV_IMAGE__JPEG_QUALITY", "70");
        std::env::set_var("CAMERAKIT_IT_ENV_SESSION__BACKEND", "legacy");
        let loaded = CameraKitConfig::load_with_prefix(&path, "CAMERAKIT_IT_ENV");
        std::env::remove_var("CAMERAKIT_IT_ENV_CAMERA__FACING");
        std::env::remove_var("CAMERAKIT_IT_ENV_IMAGE__JPEG_QUALITY");
        std::env::remove_var("CAMERAKIT_IT_ENV_SESSION__BACKEND");

        let loaded = loaded.unwrap();
        assert_eq!(loaded.camera.facing, Facing::Front);
        assert_eq!(loaded.image.jpeg_quality, 70);
        assert_eq!(loaded.session.backend_kind(), BackendKind::Legacy);
    }

    #[test]
    fn test_invalid_environment_value_fails_validation() {
        let dir = tempdir().unwrap();
        std::env::set_var("CAMERAKIT_IT_BAD_ENV_SESSION__INITIAL_DISPLAY_ROTATION", "45");
        let loaded =
            CameraKitConfig::load_with_prefix(dir.path().join("none.toml"), "CAMERAKIT_IT_BAD_ENV");
        std::env::remove_var("CAMERAKIT_IT_BAD_ENV_SESSION__INITIAL_DISPLAY_ROTATION");

        assert!(matches!(loaded, Err(CameraError::Config(_))));
    }
}
