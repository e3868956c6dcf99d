//! Configuration management for CameraKit
//!
//! Runtime knobs for the camera, still images, preview layout and the session
//! itself. Loaded from an optional TOML file with `CAMERAKIT_*` environment
//! overrides layered on top.

use crate::errors::CameraError;
use crate::rotation::display_rotation_degrees;
use crate::types::{BackendKind, Facing, Flash, Focus, PreviewEffect, SensorPreset};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for overrides, e.g. `CAMERAKIT_CAMERA__FACING=front`.
pub const ENV_PREFIX: &str = "CAMERAKIT";

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraKitConfig {
    pub camera: CameraConfig,
    pub image: ImageConfig,
    pub layout: LayoutConfig,
    pub session: SessionConfig,
}

/// Camera knobs, all adjustable on a live session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub facing: Facing,
    pub flash: Flash,
    pub focus: Focus,
    /// 1.0 means no zoom
    pub zoom_factor: f32,
    pub sensor_preset: SensorPreset,
    pub preview_effect: PreviewEffect,
}

/// Still image output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Target picture resolution in megapixels
    pub megapixels: f32,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

/// Preview view sizing
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Let one wrap-content axis follow the preview's aspect ratio
    pub adjust_view_bounds: bool,
    /// Width / height override for the derived axis
    pub aspect_ratio: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Force a backend instead of detecting from the API level
    pub backend: Option<BackendKind>,
    /// Platform API level used for backend detection
    pub api_level: u32,
    /// Display rotation assumed before the first orientation reading
    pub initial_display_rotation: i32,
    /// How long shutdown waits for the worker to drain
    pub shutdown_timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            facing: Facing::Back,
            flash: Flash::Off,
            focus: Focus::Auto,
            zoom_factor: 1.0,
            sensor_preset: SensorPreset::None,
            preview_effect: PreviewEffect::None,
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            megapixels: 2.0,
            jpeg_quality: 100,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: None,
            api_level: BackendKind::MODERN_API_LEVEL,
            initial_display_rotation: 0,
            shutdown_timeout_ms: 2000,
        }
    }
}

impl SessionConfig {
    pub fn backend_kind(&self) -> BackendKind {
        self.backend
            .unwrap_or_else(|| BackendKind::for_api_level(self.api_level))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl CameraKitConfig {
    /// Load configuration from an optional TOML file plus `CAMERAKIT_*` overrides
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CameraError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Same as [`load_from_file`](Self::load_from_file) with a custom
    /// environment prefix.
    pub fn load_with_prefix<P: AsRef<Path>>(path: P, prefix: &str) -> Result<Self, CameraError> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
        }

        let config: CameraKitConfig = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CameraError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CameraError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| CameraError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| CameraError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("camerakit.toml")
    }

    /// Load from default location, falling back to defaults on any problem
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), CameraError> {
        if !(self.camera.zoom_factor > 0.0) {
            return Err(CameraError::Config(format!(
                "Zoom factor must be positive, got {}",
                self.camera.zoom_factor
            )));
        }
        if !(self.image.megapixels > 0.0) {
            return Err(CameraError::Config(format!(
                "Megapixels must be positive, got {}",
                self.image.megapixels
            )));
        }
        if self.image.jpeg_quality == 0 || self.image.jpeg_quality > 100 {
            return Err(CameraError::Config(
                "JPEG quality must be between 1 and 100".to_string(),
            ));
        }
        if let Some(ratio) = self.layout.aspect_ratio {
            if !(ratio > 0.0) {
                return Err(CameraError::Config(format!(
                    "Aspect ratio must be positive, got {}",
                    ratio
                )));
            }
        }
        if display_rotation_degrees(self.session.initial_display_rotation).is_none() {
            return Err(CameraError::Config(format!(
                "Initial display rotation must be 0, 90, 180 or 270, got {}",
                self.session.initial_display_rotation
            )));
        }
        if self.session.shutdown_timeout_ms == 0 {
            return Err(CameraError::Config(
                "Shutdown timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
