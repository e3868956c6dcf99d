//! Post-capture rotation and mirroring of encoded images.

use crate::errors::CameraError;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};

/// Rotates and optionally mirrors an encoded image.
///
/// Only the legacy backend needs this; the session treats it as opaque.
pub trait ImageTransform: Send + Sync {
    fn apply(
        &self,
        encoded: &[u8],
        rotation_degrees: u32,
        flip_horizontal: bool,
    ) -> Result<Vec<u8>, CameraError>;
}

/// Decode, transform and re-encode as JPEG.
#[derive(Debug, Clone, Copy)]
pub struct JpegTransform {
    quality: u8,
}

impl JpegTransform {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegTransform {
    fn default() -> Self {
        Self::new(100)
    }
}

impl ImageTransform for JpegTransform {
    fn apply(
        &self,
        encoded: &[u8],
        rotation_degrees: u32,
        flip_horizontal: bool,
    ) -> Result<Vec<u8>, CameraError> {
        if rotation_degrees % 360 == 0 && !flip_horizontal {
            return Ok(encoded.to_vec());
        }

        let decoded = image::load_from_memory_with_format(encoded, ImageFormat::Jpeg)
            .map_err(|e| CameraError::CaptureFailed(format!("Failed to decode JPEG: {}", e)))?;

        let rotated = match rotation_degrees % 360 {
            0 => decoded,
            90 => decoded.rotate90(),
            180 => decoded.rotate180(),
            270 => decoded.rotate270(),
            other => {
                return Err(CameraError::CaptureFailed(format!(
                    "Unsupported capture rotation: {}",
                    other
                )))
            }
        };
        let oriented = if flip_horizontal {
            rotated.fliph()
        } else {
            rotated
        };

        encode_jpeg(&oriented.into_rgb8(), self.quality)
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, CameraError> {
    let mut jpeg_data = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg_data, quality.clamp(1, 100));
    encoder
        .encode_image(image)
        .map_err(|e| CameraError::CaptureFailed(format!("Failed to encode JPEG: {}", e)))?;
    Ok(jpeg_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
        let mut img = RgbImage::new(width, height);
        for (x, _, pixel) in img.enumerate_pixels_mut() {
            *pixel = if x < width / 2 {
                Rgb([250, 10, 10])
            } else {
                Rgb([10, 10, 250])
            };
        }
        encode_jpeg(&img, 95).unwrap()
    }

    fn decode(bytes: &[u8]) -> RgbImage {
        image::load_from_memory(bytes).unwrap().into_rgb8()
    }

    #[test]
    fn test_rotation_swaps_dimensions() {
        let out = JpegTransform::default()
            .apply(&sample_jpeg(64, 32), 90, false)
            .unwrap();
        let img = decode(&out);
        assert_eq!((img.width(), img.height()), (32, 64));
    }

    #[test]
    fn test_flip_mirrors_columns() {
        let out = JpegTransform::default()
            .apply(&sample_jpeg(64, 32), 0, true)
            .unwrap();
        let img = decode(&out);
        // Red half moved to the right.
        assert!(img.get_pixel(60, 16)[0] > 200);
        assert!(img.get_pixel(4, 16)[2] > 200);
    }

    #[test]
    fn test_identity_passes_bytes_through() {
        let jpeg = sample_jpeg(16, 16);
        let out = JpegTransform::default().apply(&jpeg, 360, false).unwrap();
        assert_eq!(out, jpeg);
    }

    #[test]
    fn test_garbage_input_is_capture_failure() {
        let err = JpegTransform::default()
            .apply(b"not a jpeg", 90, true)
            .unwrap_err();
        assert!(matches!(err, CameraError::CaptureFailed(_)));
    }
}
