//! Preview and picture resolution selection.
//!
//! The preview size is a "best cover" fit: the candidate needing the smallest
//! scale factor to cover the target surface in both dimensions. The target is
//! compared in the sensor's coordinate frame, so a portrait surface fed by a
//! landscape sensor is swapped before comparison.

use crate::errors::CameraError;
use crate::types::Size;

/// True when sensor and display disagree on which axis is the long one.
pub fn orientation_mismatch(sensor_orientation: u32, display_rotation: u32) -> bool {
    display_rotation % 180 != sensor_orientation % 180
}

/// Pick the hardware stream resolution for a target surface.
///
/// Ties keep the first candidate in enumeration order.
pub fn select_preview_size(
    target_width: u32,
    target_height: u32,
    sensor_orientation: u32,
    display_rotation: u32,
    candidates: &[Size],
) -> Result<Size, CameraError> {
    let (width, height) = if orientation_mismatch(sensor_orientation, display_rotation) {
        (target_height, target_width)
    } else {
        (target_width, target_height)
    };

    let mut best: Option<(Size, f64)> = None;
    for candidate in candidates {
        let ratio = cover_ratio(width, height, candidate);
        match best {
            Some((_, best_ratio)) if ratio >= best_ratio => {}
            _ => best = Some((*candidate, ratio)),
        }
    }

    let (size, ratio) = best.ok_or_else(|| {
        CameraError::NoSupportedSize(format!(
            "no candidates for target {}x{}",
            target_width, target_height
        ))
    })?;
    log::debug!(
        "Selected preview size {} for target {}x{} (cover ratio {:.3})",
        size,
        width,
        height,
        ratio
    );
    Ok(size)
}

/// The selected size expressed in display orientation, for layout.
pub fn adjusted_preview_size(
    preview_size: Size,
    sensor_orientation: u32,
    display_rotation: u32,
) -> Size {
    if orientation_mismatch(sensor_orientation, display_rotation) {
        preview_size.swapped()
    } else {
        preview_size
    }
}

/// Pick the picture size whose pixel count is closest to `megapixels`.
pub fn select_image_size(megapixels: f32, candidates: &[Size]) -> Option<Size> {
    let target = (megapixels.max(0.0) as f64) * 1_000_000.0;
    let mut best: Option<(Size, f64)> = None;
    for candidate in candidates {
        let distance = (candidate.area() as f64 - target).abs();
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((*candidate, distance)),
        }
    }
    best.map(|(size, _)| size)
}

fn cover_ratio(width: u32, height: u32, candidate: &Size) -> f64 {
    if candidate.is_empty() {
        return f64::INFINITY;
    }
    let width_ratio = width as f64 / candidate.width as f64;
    let height_ratio = height as f64 / candidate.height as f64;
    width_ratio.max(height_ratio)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<Size> {
        vec![
            Size::new(640, 480),
            Size::new(1280, 720),
            Size::new(1920, 1080),
        ]
    }

    #[test]
    fn test_portrait_surface_on_landscape_sensor() {
        let size = select_preview_size(1080, 1920, 90, 0, &candidates()).unwrap();
        assert_eq!(size, Size::new(1920, 1080));
        assert_eq!(adjusted_preview_size(size, 90, 0), Size::new(1080, 1920));
    }

    #[test]
    fn test_no_swap_when_orientations_agree() {
        assert!(!orientation_mismatch(90, 270));
        assert!(!orientation_mismatch(0, 180));
        assert!(orientation_mismatch(90, 180));

        let size = select_preview_size(1280, 720, 0, 0, &candidates()).unwrap();
        assert_eq!(size, Size::new(1920, 1080));
        assert_eq!(adjusted_preview_size(size, 0, 0), size);
    }

    #[test]
    fn test_ties_keep_first_candidate() {
        let sizes = vec![Size::new(800, 600), Size::new(600, 800)];
        // 600x600 target: both cover with ratio 1.0
        let size = select_preview_size(600, 600, 0, 0, &sizes).unwrap();
        assert_eq!(size, Size::new(800, 600));

        let reversed: Vec<Size> = sizes.iter().rev().copied().collect();
        let size = select_preview_size(600, 600, 0, 0, &reversed).unwrap();
        assert_eq!(size, Size::new(600, 800));
    }

    #[test]
    fn test_empty_candidates() {
        let err = select_preview_size(100, 100, 0, 0, &[]).unwrap_err();
        assert!(matches!(err, CameraError::NoSupportedSize(_)));
    }

    #[test]
    fn test_zero_sized_candidate_never_wins_over_real_one() {
        let sizes = vec![Size::new(0, 480), Size::new(320, 240)];
        let size = select_preview_size(320, 240, 0, 0, &sizes).unwrap();
        assert_eq!(size, Size::new(320, 240));
    }

    #[test]
    fn test_select_image_size_by_megapixels() {
        let sizes = vec![
            Size::new(4032, 3024),
            Size::new(1600, 1200),
            Size::new(640, 480),
        ];
        assert_eq!(select_image_size(2.0, &sizes), Some(Size::new(1600, 1200)));
        assert_eq!(select_image_size(12.0, &sizes), Some(Size::new(4032, 3024)));
        assert_eq!(select_image_size(2.0, &[]), None);
    }
}
