//! The on-screen preview target and the host that owns it.

use crate::layout::{Rect, TransformMatrix};
use crate::types::Size;
use image::RgbImage;
use std::fmt;
use std::sync::Arc;

/// Drawing target the hardware streams preview frames into.
///
/// Owned by the preview host; backends only hold a shared handle and must
/// check `is_valid` before binding, since the host may destroy the surface at
/// any time.
pub trait PreviewSurface: Send + Sync + fmt::Debug {
    fn is_valid(&self) -> bool;

    /// Size the surface's backing buffer for the selected stream resolution.
    fn set_buffer_size(&self, size: Size);

    /// Receive one rendered preview frame.
    fn present(&self, frame: RgbImage);

    /// The most recently presented frame, if any.
    fn snapshot(&self) -> Option<RgbImage>;
}

pub type SurfaceHandle = Arc<dyn PreviewSurface>;

/// Callbacks from the camera core into the view layer hosting the preview.
///
/// Invoked only from the thread that drives the session.
pub trait PreviewHost {
    /// Measure and lay the view out again; the adjusted preview size changed.
    fn request_relayout(&mut self);

    /// The surface is now fed by a stream of `buffer_size`.
    fn bind_surface(&mut self, surface: &SurfaceHandle, buffer_size: Size);

    /// Texture-backed previews: compensate buffer/view aspect mismatch.
    fn apply_transform_matrix(&mut self, matrix: TransformMatrix);

    /// Push-buffer previews: place the surface, possibly outside the view bounds.
    fn layout_surface(&mut self, _frame: Rect) {}
}
