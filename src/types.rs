//! Capability model and configuration enumerations shared by every layer.

use crate::errors::CameraError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Right angles a sensor or display may be rotated by.
pub const CARDINAL_DEGREES: [u32; 4] = [0, 90, 180, 270];

/// Stream or image resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Same resolution with the axes exchanged.
    pub fn swapped(&self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Area ordering. Sizes with equal area compare equal here even when
    /// they are structurally different, so pair this with a stable sort.
    pub fn cmp_area(&self, other: &Size) -> Ordering {
        self.area().cmp(&other.area())
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Size {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| CameraError::Config(format!("expected WIDTHxHEIGHT, got '{}'", s)))?;
        let width = w
            .trim()
            .parse::<u32>()
            .map_err(|e| CameraError::Config(format!("invalid width '{}': {}", w, e)))?;
        let height = h
            .trim()
            .parse::<u32>()
            .map_err(|e| CameraError::Config(format!("invalid height '{}': {}", h, e)))?;
        let size = Size::new(width, height);
        if size.is_empty() {
            return Err(CameraError::Config(format!("size must be non-zero: {}", size)));
        }
        Ok(size)
    }
}

/// Stable in-place sort by area, smallest first.
pub fn sort_by_area(sizes: &mut [Size]) {
    sizes.sort_by(Size::cmp_area);
}

macro_rules! closed_int_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_i32(self) -> i32 {
                self as i32
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl TryFrom<i32> for $name {
            type Error = CameraError;

            fn try_from(value: i32) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err(CameraError::Config(format!(
                        concat!("invalid ", stringify!($name), " value: {}"),
                        other
                    ))),
                }
            }
        }
    };
}

closed_int_enum! {
    /// Which way the lens points relative to the screen.
    Facing, default = Back {
        /// Away from the user.
        Back = 0,
        /// Toward the user; captures are mirrored.
        Front = 1,
    }
}

closed_int_enum! {
    Flash, default = Off {
        Off = 0,
        /// Fires during the capture shutter.
        On = 1,
        /// Fires during the capture shutter when the scene needs it.
        Auto = 2,
        /// Constantly lit while the preview shows.
        Torch = 3,
    }
}

closed_int_enum! {
    /// Background focus strategy when focus is not triggered manually.
    Focus, default = Auto {
        Off = 0,
        Auto = 1,
        Continuous = 2,
    }
}

closed_int_enum! {
    /// Scene mode hint passed to the sensor.
    SensorPreset, default = None {
        None = 0,
        Action = 1,
        Portrait = 2,
        Landscape = 3,
        Night = 4,
        NightPortrait = 5,
        Theatre = 6,
        Beach = 7,
        Snow = 8,
        Sunset = 9,
        SteadyPhoto = 10,
        Fireworks = 11,
        Sports = 12,
        Party = 13,
        Candlelight = 14,
        Barcode = 15,
    }
}

closed_int_enum! {
    /// Color effect applied to the preview stream.
    PreviewEffect, default = None {
        None = 0,
        Mono = 1,
        Negative = 2,
        Solarize = 3,
        Sepia = 4,
        Posterize = 5,
        Whiteboard = 6,
        Blackboard = 7,
        Aqua = 8,
    }
}

impl Facing {
    pub fn opposite(self) -> Facing {
        match self {
            Facing::Back => Facing::Front,
            Facing::Front => Facing::Back,
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Facing::Back => write!(f, "back"),
            Facing::Front => write!(f, "front"),
        }
    }
}

/// Which hardware API family a session drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Older synchronous API.
    Legacy,
    /// Newer asynchronous, session-based API.
    Modern,
}

impl BackendKind {
    /// First platform API level that ships the session-based camera API.
    pub const MODERN_API_LEVEL: u32 = 21;

    pub fn for_api_level(api_level: u32) -> Self {
        if api_level < Self::MODERN_API_LEVEL {
            BackendKind::Legacy
        } else {
            BackendKind::Modern
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Legacy => write!(f, "legacy"),
            BackendKind::Modern => write!(f, "modern"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" => Ok(BackendKind::Legacy),
            "modern" => Ok(BackendKind::Modern),
            other => Err(CameraError::Config(format!("unknown backend '{}'", other))),
        }
    }
}

/// Immutable description of one opened camera device.
///
/// Fetched once per successful open. The preview size list keeps the
/// hardware's enumeration order, which decides ties during size selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraCapabilities {
    facing: Facing,
    sensor_orientation: u32,
    supported_preview_sizes: Vec<Size>,
    supported_image_sizes: Vec<Size>,
    supported_focus_modes: Vec<Focus>,
    supported_flash_modes: Vec<Flash>,
}

impl CameraCapabilities {
    pub fn new(
        facing: Facing,
        sensor_orientation: u32,
        supported_preview_sizes: Vec<Size>,
    ) -> Result<Self, CameraError> {
        if !CARDINAL_DEGREES.contains(&sensor_orientation) {
            return Err(CameraError::DeviceUnavailable(format!(
                "sensor orientation {} is not a right angle",
                sensor_orientation
            )));
        }
        if supported_preview_sizes.is_empty() {
            return Err(CameraError::NoSupportedSize(
                "device reported no preview sizes".to_string(),
            ));
        }
        Ok(Self {
            facing,
            sensor_orientation,
            supported_preview_sizes,
            supported_image_sizes: Vec::new(),
            supported_focus_modes: Vec::new(),
            supported_flash_modes: Vec::new(),
        })
    }

    pub fn with_image_sizes(mut self, sizes: Vec<Size>) -> Self {
        self.supported_image_sizes = sizes;
        self
    }

    pub fn with_focus_modes(mut self, modes: Vec<Focus>) -> Self {
        self.supported_focus_modes = modes;
        self
    }

    pub fn with_flash_modes(mut self, modes: Vec<Flash>) -> Self {
        self.supported_flash_modes = modes;
        self
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn sensor_orientation(&self) -> u32 {
        self.sensor_orientation
    }

    pub fn supported_preview_sizes(&self) -> &[Size] {
        &self.supported_preview_sizes
    }

    pub fn supported_image_sizes(&self) -> &[Size] {
        &self.supported_image_sizes
    }

    pub fn supported_focus_modes(&self) -> &[Focus] {
        &self.supported_focus_modes
    }

    pub fn supported_flash_modes(&self) -> &[Flash] {
        &self.supported_flash_modes
    }

    pub fn supports_focus(&self, focus: Focus) -> bool {
        self.supported_focus_modes.contains(&focus)
    }

    pub fn supports_flash(&self, flash: Flash) -> bool {
        self.supported_flash_modes.contains(&flash)
    }
}

/// Encoded still image delivered to the caller.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    /// Encoded bytes, already rotated and mirrored for display.
    pub data: Bytes,
    pub facing: Facing,
    pub backend: BackendKind,
    /// Rotation applied after capture; 0 when the hardware applied it.
    pub rotation_degrees: u32,
    pub mirrored: bool,
    pub captured_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_display_and_parse() {
        let size: Size = "1920x1080".parse().unwrap();
        assert_eq!(size, Size::new(1920, 1080));
        assert_eq!(size.to_string(), "1920x1080");
        assert!("1920".parse::<Size>().is_err());
        assert!("0x1080".parse::<Size>().is_err());
    }

    #[test]
    fn test_sort_by_area_is_stable() {
        let mut sizes = vec![
            Size::new(1920, 1080),
            Size::new(400, 300),
            Size::new(300, 400),
            Size::new(640, 480),
        ];
        sort_by_area(&mut sizes);
        assert_eq!(
            sizes,
            vec![
                Size::new(400, 300),
                Size::new(300, 400),
                Size::new(640, 480),
                Size::new(1920, 1080),
            ]
        );
    }

    #[test]
    fn test_closed_enums_round_trip_integers() {
        for facing in Facing::ALL {
            assert_eq!(Facing::try_from(facing.as_i32()).unwrap(), *facing);
        }
        assert_eq!(SensorPreset::try_from(15).unwrap(), SensorPreset::Barcode);
        assert_eq!(PreviewEffect::try_from(8).unwrap(), PreviewEffect::Aqua);
        assert!(Flash::try_from(4).is_err());
        assert!(Focus::try_from(-1).is_err());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Facing::default(), Facing::Back);
        assert_eq!(Flash::default(), Flash::Off);
        assert_eq!(Focus::default(), Focus::Auto);
    }

    #[test]
    fn test_backend_kind_for_api_level() {
        assert_eq!(BackendKind::for_api_level(19), BackendKind::Legacy);
        assert_eq!(BackendKind::for_api_level(21), BackendKind::Modern);
        assert_eq!(BackendKind::for_api_level(34), BackendKind::Modern);
    }

    #[test]
    fn test_capabilities_validation() {
        assert!(CameraCapabilities::new(Facing::Back, 45, vec![Size::new(640, 480)]).is_err());
        let err = CameraCapabilities::new(Facing::Back, 90, Vec::new()).unwrap_err();
        assert!(matches!(err, CameraError::NoSupportedSize(_)));

        let caps = CameraCapabilities::new(Facing::Front, 270, vec![Size::new(640, 480)])
            .unwrap()
            .with_focus_modes(vec![Focus::Auto, Focus::Continuous]);
        assert_eq!(caps.sensor_orientation(), 270);
        assert!(caps.supports_focus(Focus::Continuous));
        assert!(!caps.supports_flash(Flash::Torch));
    }
}
