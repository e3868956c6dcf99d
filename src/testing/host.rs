//! In-memory preview surface and a preview host that records what it is told.

use crate::layout::{Rect, TransformMatrix};
use crate::surface::{PreviewHost, PreviewSurface, SurfaceHandle};
use crate::types::Size;
use image::RgbImage;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Surface that keeps the last presented frame in memory.
pub struct MemorySurface {
    valid: AtomicBool,
    buffer_size: Mutex<Option<Size>>,
    last_frame: Mutex<Option<RgbImage>>,
    frames: AtomicUsize,
}

impl MemorySurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            valid: AtomicBool::new(true),
            buffer_size: Mutex::new(None),
            last_frame: Mutex::new(None),
            frames: AtomicUsize::new(0),
        })
    }

    /// Simulate the host destroying the surface underneath the camera.
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    pub fn buffer_size(&self) -> Option<Size> {
        *self.buffer_size.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn frames_presented(&self) -> usize {
        self.frames.load(Ordering::Acquire)
    }

    pub fn handle(self: &Arc<Self>) -> SurfaceHandle {
        self.clone()
    }
}

impl fmt::Debug for MemorySurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySurface")
            .field("valid", &self.is_valid())
            .field("buffer_size", &self.buffer_size())
            .field("frames", &self.frames_presented())
            .finish()
    }
}

impl PreviewSurface for MemorySurface {
    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn set_buffer_size(&self, size: Size) {
        *self.buffer_size.lock().unwrap_or_else(|e| e.into_inner()) = Some(size);
    }

    fn present(&self, frame: RgbImage) {
        *self.last_frame.lock().unwrap_or_else(|e| e.into_inner()) = Some(frame);
        self.frames.fetch_add(1, Ordering::AcqRel);
    }

    fn snapshot(&self) -> Option<RgbImage> {
        self.last_frame
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// One call made by the session into its host.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    RequestRelayout,
    BindSurface(Size),
    ApplyTransform(TransformMatrix),
    LayoutSurface(Rect),
}

/// Shared view of the calls a [`RecordingHost`] received.
#[derive(Debug, Clone, Default)]
pub struct HostLog {
    calls: Arc<Mutex<Vec<HostCall>>>,
}

impl HostLog {
    fn push(&self, call: HostCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn relayout_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == HostCall::RequestRelayout)
            .count()
    }

    pub fn bound_sizes(&self) -> Vec<Size> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HostCall::BindSurface(size) => Some(size),
                _ => None,
            })
            .collect()
    }

    pub fn last_transform(&self) -> Option<TransformMatrix> {
        self.calls().into_iter().rev().find_map(|call| match call {
            HostCall::ApplyTransform(matrix) => Some(matrix),
            _ => None,
        })
    }

    pub fn last_surface_frame(&self) -> Option<Rect> {
        self.calls().into_iter().rev().find_map(|call| match call {
            HostCall::LayoutSurface(frame) => Some(frame),
            _ => None,
        })
    }
}

/// [`PreviewHost`] that only records.
#[derive(Debug)]
pub struct RecordingHost {
    log: HostLog,
}

impl RecordingHost {
    pub fn new() -> (Self, HostLog) {
        let log = HostLog::default();
        (Self { log: log.clone() }, log)
    }
}

impl PreviewHost for RecordingHost {
    fn request_relayout(&mut self) {
        self.log.push(HostCall::RequestRelayout);
    }

    fn bind_surface(&mut self, _surface: &SurfaceHandle, buffer_size: Size) {
        self.log.push(HostCall::BindSurface(buffer_size));
    }

    fn apply_transform_matrix(&mut self, matrix: TransformMatrix) {
        self.log.push(HostCall::ApplyTransform(matrix));
    }

    fn layout_surface(&mut self, frame: Rect) {
        self.log.push(HostCall::LayoutSurface(frame));
    }
}
