//! Geometry the preview host needs to size and place the preview surface.

use crate::errors::CameraError;
use crate::types::Size;
use serde::{Deserialize, Serialize};

/// How the host sizes one axis of the preview view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutDimension {
    /// Fixed by the parent layout.
    Exact(u32),
    /// Derived from the content (aspect ratio or preview size).
    WrapContent,
}

/// Placement of the preview surface inside the host view, in view pixels.
/// May extend past the view bounds when the preview is center-cropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// Scale followed by translation, applied to a texture-backed preview.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformMatrix {
    pub scale_x: f32,
    pub scale_y: f32,
    pub translate_x: f32,
    pub translate_y: f32,
}

impl TransformMatrix {
    pub fn identity() -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
            translate_x: 0.0,
            translate_y: 0.0,
        }
    }

    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.scale_x + self.translate_x,
            y * self.scale_y + self.translate_y,
        )
    }
}

impl Default for TransformMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

/// Resolve the view size, deriving at most one content-driven axis.
///
/// With `adjust_view_bounds` set, a wrap-content axis follows `aspect_ratio`
/// when given, else the adjusted preview size once it is known. Asking for
/// both axes to wrap is a caller error.
pub fn measure(
    adjust_view_bounds: bool,
    aspect_ratio: Option<f32>,
    width: LayoutDimension,
    height: LayoutDimension,
    available: Size,
    adjusted_preview: Option<Size>,
) -> Result<Size, CameraError> {
    let resolve = |dimension: LayoutDimension, fallback: u32| match dimension {
        LayoutDimension::Exact(value) => value,
        LayoutDimension::WrapContent => fallback,
    };
    let mut measured = Size::new(
        resolve(width, available.width),
        resolve(height, available.height),
    );

    if !adjust_view_bounds {
        return Ok(measured);
    }

    let aspect_ratio = aspect_ratio.filter(|ratio| *ratio > 0.0);
    let preview = adjusted_preview.filter(|size| !size.is_empty());

    match (width, height) {
        (LayoutDimension::WrapContent, LayoutDimension::WrapContent) => {
            log::error!("adjust_view_bounds with both dimensions wrap_content");
            return Err(CameraError::InvalidLayout(
                "adjust_view_bounds is set while both width and height wrap content; only one may"
                    .to_string(),
            ));
        }
        (LayoutDimension::WrapContent, _) => {
            if let Some(ratio) = aspect_ratio {
                measured.width = (measured.height as f32 * ratio) as u32;
            } else if let Some(preview) = preview {
                measured.width =
                    (measured.height as f32 / preview.height as f32 * preview.width as f32) as u32;
            }
        }
        (_, LayoutDimension::WrapContent) => {
            if let Some(ratio) = aspect_ratio {
                measured.height = (measured.width as f32 * ratio) as u32;
            } else if let Some(preview) = preview {
                measured.height =
                    (measured.width as f32 / preview.width as f32 * preview.height as f32) as u32;
            }
        }
        _ => {}
    }
    Ok(measured)
}

/// Center-crop placement of a push-buffer surface so the preview fills the
/// view without distortion.
pub fn surface_frame(view: Size, adjusted_preview: Size) -> Rect {
    let full = Rect {
        left: 0,
        top: 0,
        right: view.width as i32,
        bottom: view.height as i32,
    };
    if adjusted_preview.is_empty() {
        return full;
    }

    let width_ratio = view.width as f32 / adjusted_preview.width as f32;
    let height_ratio = view.height as f32 / adjusted_preview.height as f32;

    if width_ratio > height_ratio {
        let width = view.width as i32;
        let height = (adjusted_preview.height as f32 * width_ratio) as i32;
        let offset = (height - view.height as i32) / 2;
        Rect {
            left: 0,
            top: -offset,
            right: width,
            bottom: height - offset,
        }
    } else if height_ratio > width_ratio {
        let width = (adjusted_preview.width as f32 * height_ratio) as i32;
        let height = view.height as i32;
        let offset = (width - view.width as i32) / 2;
        Rect {
            left: -offset,
            top: 0,
            right: width - offset,
            bottom: height,
        }
    } else {
        full
    }
}

/// Scale and centering that make a texture preview fill the view while
/// keeping the buffer's aspect ratio.
pub fn preview_transform(view: Size, adjusted_preview: Size) -> TransformMatrix {
    if view.is_empty() || adjusted_preview.is_empty() {
        return TransformMatrix::identity();
    }

    let view_ratio = view.aspect_ratio();
    let preview_ratio = adjusted_preview.aspect_ratio();
    let (scale_x, scale_y) = if view_ratio < preview_ratio {
        (preview_ratio / view_ratio, 1.0)
    } else {
        (1.0, view_ratio / preview_ratio)
    };

    let scaled_width = view.width as f32 * scale_x;
    let scaled_height = view.height as f32 * scale_y;
    TransformMatrix {
        scale_x,
        scale_y,
        translate_x: (view.width as f32 - scaled_width) / 2.0,
        translate_y: (view.height as f32 - scaled_height) / 2.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_rejects_both_wrap() {
        let err = measure(
            true,
            None,
            LayoutDimension::WrapContent,
            LayoutDimension::WrapContent,
            Size::new(1080, 1920),
            None,
        )
        .unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, CameraError::InvalidLayout(_)));
    }

    #[test]
    fn test_measure_both_wrap_without_adjust_is_fine() {
        let size = measure(
            false,
            None,
            LayoutDimension::WrapContent,
            LayoutDimension::WrapContent,
            Size::new(1080, 1920),
            None,
        )
        .unwrap();
        assert_eq!(size, Size::new(1080, 1920));
    }

    #[test]
    fn test_measure_height_from_preview() {
        let size = measure(
            true,
            None,
            LayoutDimension::Exact(1080),
            LayoutDimension::WrapContent,
            Size::new(1080, 2400),
            Some(Size::new(1080, 1920)),
        )
        .unwrap();
        assert_eq!(size, Size::new(1080, 1920));
    }

    #[test]
    fn test_measure_width_from_aspect_ratio() {
        let size = measure(
            true,
            Some(0.5),
            LayoutDimension::WrapContent,
            LayoutDimension::Exact(800),
            Size::new(1080, 2400),
            Some(Size::new(1080, 1920)),
        )
        .unwrap();
        assert_eq!(size, Size::new(400, 800));
    }

    #[test]
    fn test_surface_frame_crops_vertically() {
        // Wide view over a 4:3 preview: scale to width, crop top and bottom.
        let frame = surface_frame(Size::new(800, 400), Size::new(400, 300));
        assert_eq!(frame.width(), 800);
        assert_eq!(frame.height(), 600);
        assert_eq!(frame.top, -100);
    }

    #[test]
    fn test_surface_frame_crops_horizontally() {
        let frame = surface_frame(Size::new(300, 600), Size::new(400, 300));
        assert_eq!(frame.height(), 600);
        assert_eq!(frame.width(), 800);
        assert_eq!(frame.left, -250);
    }

    #[test]
    fn test_preview_transform_centers() {
        let matrix = preview_transform(Size::new(1000, 1000), Size::new(2000, 1000));
        assert_eq!(matrix.scale_x, 2.0);
        assert_eq!(matrix.scale_y, 1.0);
        assert_eq!(matrix.translate_x, -500.0);
        assert_eq!(matrix.map_point(500.0, 500.0), (500.0, 500.0));

        let same = preview_transform(Size::new(1920, 1080), Size::new(1920, 1080));
        assert_eq!(same, TransformMatrix::identity());
    }
}
