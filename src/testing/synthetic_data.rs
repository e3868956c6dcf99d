//! Synthetic frames and camera profiles for offline testing
//!
//! Profiles follow what typical phone hardware reports: a back sensor mounted
//! at 90 degrees, a front sensor at 270, and the usual 4:3 and 16:9 stream
//! sizes.

use crate::transform::encode_jpeg;
use crate::types::Size;
use image::{Rgb, RgbImage};

/// Size of frames and still captures produced by the simulated drivers.
pub const SYNTHETIC_FRAME_SIZE: Size = Size::new(64, 48);

/// Create a gradient frame that changes with `frame_number`.
///
/// The left half is tinted red and the right half blue so tests can tell a
/// mirrored image from an unmirrored one.
pub fn synthetic_frame(frame_number: u64, width: u32, height: u32) -> RgbImage {
    let base = (frame_number % 256) as u8;
    RgbImage::from_fn(width, height, |x, y| {
        let shade = base.wrapping_add(((x + y) % 64) as u8);
        if x < width / 2 {
            Rgb([200, shade / 4, 20])
        } else {
            Rgb([20, shade / 4, 200])
        }
    })
}

/// JPEG-encoded [`synthetic_frame`], as a sensor would deliver it.
pub fn synthetic_jpeg(frame_number: u64, size: Size) -> Vec<u8> {
    let frame = synthetic_frame(frame_number, size.width, size.height);
    // Encoding a small in-memory RGB buffer cannot fail; fall back to empty.
    encode_jpeg(&frame, 90).unwrap_or_default()
}

/// Hardware characteristics of a typical phone camera pair
#[derive(Debug, Clone, PartialEq)]
pub struct PhoneCameraProfile {
    pub back_orientation: u32,
    pub front_orientation: u32,
    pub preview_sizes: Vec<Size>,
    pub picture_sizes: Vec<Size>,
    /// Zoom steps in hundredths, as the synchronous API lists them.
    pub zoom_ratios: Vec<u32>,
    pub max_digital_zoom: f32,
}

impl PhoneCameraProfile {
    pub fn typical() -> Self {
        Self {
            back_orientation: 90,
            front_orientation: 270,
            preview_sizes: vec![
                Size::new(1920, 1080),
                Size::new(1280, 720),
                Size::new(960, 720),
                Size::new(640, 480),
                Size::new(320, 240),
            ],
            picture_sizes: vec![
                Size::new(4032, 3024),
                Size::new(3264, 2448),
                Size::new(1920, 1080),
                Size::new(1600, 1200),
                Size::new(640, 480),
            ],
            zoom_ratios: vec![100, 125, 150, 200, 300, 400],
            max_digital_zoom: 4.0,
        }
    }
}
