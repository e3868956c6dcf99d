//! Legacy driver backed by a real webcam through `nokhwa`.
//!
//! Desktop webcams have no sensor rotation and face the user, so every device
//! reports as front-facing with orientation 0.

use super::legacy::{
    LegacyCamera, LegacyCameraInfo, LegacyDriver, LegacyErrorCallback, LegacyParameters,
    FLASH_MODE_OFF, FOCUS_MODE_FIXED,
};
use crate::errors::CameraError;
use crate::surface::SurfaceHandle;
use crate::transform::encode_jpeg;
use crate::types::{Facing, Size};
use image::RgbImage;
use nokhwa::{
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType},
    Buffer, CallbackCamera,
};
use std::sync::{Arc, Mutex};

/// Resolutions offered to the size selector; webcams rescale on request.
const COMMON_SIZES: [Size; 3] = [
    Size::new(1920, 1080),
    Size::new(1280, 720),
    Size::new(640, 480),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct NokhwaDriver;

impl NokhwaDriver {
    pub fn new() -> Self {
        Self
    }
}

impl LegacyDriver for NokhwaDriver {
    fn camera_count(&self) -> usize {
        match query(ApiBackend::Auto) {
            Ok(cameras) => cameras.len(),
            Err(e) => {
                log::warn!("Failed to query cameras: {}", e);
                0
            }
        }
    }

    fn camera_info(&self, index: usize) -> Result<LegacyCameraInfo, CameraError> {
        if index >= self.camera_count() {
            return Err(CameraError::DeviceUnavailable(format!(
                "no camera at index {}",
                index
            )));
        }
        Ok(LegacyCameraInfo {
            facing: Facing::Front,
            orientation: 0,
        })
    }

    fn open(&self, index: usize) -> Result<Box<dyn LegacyCamera>, CameraError> {
        let device_index = u32::try_from(index)
            .map_err(|_| CameraError::DeviceUnavailable(format!("bad camera index {}", index)))?;
        let requested_format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
        let camera = CallbackCamera::new(CameraIndex::Index(device_index), requested_format, |_| {})
            .map_err(|e| CameraError::OpenDenied(format!("Failed to open camera: {}", e)))?;

        log::info!("Opened webcam {}", device_index);
        Ok(Box::new(NokhwaCamera {
            camera: Arc::new(Mutex::new(camera)),
            parameters: LegacyParameters {
                preview_size: Some(COMMON_SIZES[0]),
                supported_preview_sizes: COMMON_SIZES.to_vec(),
                picture_size: Some(COMMON_SIZES[0]),
                supported_picture_sizes: COMMON_SIZES.to_vec(),
                flash_mode: Some(FLASH_MODE_OFF.to_string()),
                supported_flash_modes: vec![FLASH_MODE_OFF.to_string()],
                focus_mode: Some(FOCUS_MODE_FIXED.to_string()),
                supported_focus_modes: vec![FOCUS_MODE_FIXED.to_string()],
                ..Default::default()
            },
        }))
    }
}

fn decode_frame(buffer: &Buffer) -> Result<RgbImage, CameraError> {
    let resolution = buffer.resolution();
    let decoded = buffer
        .decode_image::<RgbFormat>()
        .map_err(|e| CameraError::CaptureFailed(format!("Failed to decode frame: {}", e)))?;
    RgbImage::from_raw(resolution.width_x, resolution.height_y, decoded.into_raw()).ok_or_else(
        || CameraError::CaptureFailed("frame buffer does not match its resolution".to_string()),
    )
}

struct NokhwaCamera {
    camera: Arc<Mutex<CallbackCamera>>,
    parameters: LegacyParameters,
}

impl NokhwaCamera {
    fn with_camera<T>(
        &self,
        f: impl FnOnce(&mut CallbackCamera) -> Result<T, CameraError>,
    ) -> Result<T, CameraError> {
        let mut camera = self
            .camera
            .lock()
            .map_err(|_| CameraError::DeviceUnavailable("Failed to lock camera".to_string()))?;
        f(&mut camera)
    }
}

impl LegacyCamera for NokhwaCamera {
    fn parameters(&mut self) -> Result<LegacyParameters, CameraError> {
        Ok(self.parameters.clone())
    }

    fn set_parameters(&mut self, parameters: &LegacyParameters) -> Result<(), CameraError> {
        self.parameters = parameters.clone();
        Ok(())
    }

    // nokhwa reports every failure from the call that hit it.
    fn set_error_callback(&mut self, _callback: LegacyErrorCallback) {}

    fn set_preview_display(&mut self, surface: &SurfaceHandle) -> Result<(), CameraError> {
        let surface = surface.clone();
        self.with_camera(|camera| {
            camera
                .set_callback(move |buffer: Buffer| match decode_frame(&buffer) {
                    Ok(frame) if surface.is_valid() => surface.present(frame),
                    Ok(_) => {}
                    Err(e) => log::debug!("Dropping preview frame: {}", e),
                })
                .map_err(|e| {
                    CameraError::SurfaceInvalid(format!("Failed to attach preview: {}", e))
                })
        })
    }

    fn set_display_orientation(&mut self, _degrees: u32) -> Result<(), CameraError> {
        Ok(())
    }

    fn start_preview(&mut self) -> Result<(), CameraError> {
        self.with_camera(|camera| {
            camera.open_stream().map_err(|e| {
                CameraError::ConfigurationFailed(format!("Failed to start stream: {}", e))
            })
        })
    }

    fn stop_preview(&mut self) {
        if let Err(e) = self.with_camera(|camera| {
            camera
                .stop_stream()
                .map_err(|e| CameraError::DeviceUnavailable(e.to_string()))
        }) {
            log::warn!("Failed to stop stream: {}", e);
        }
    }

    fn take_picture(&mut self) -> Result<Vec<u8>, CameraError> {
        // A missed frame fails this capture only; the stream stays up.
        let frame = self.with_camera(|camera| {
            camera
                .poll_frame()
                .map_err(|e| CameraError::CaptureFailed(format!("Failed to capture frame: {}", e)))
        })?;
        self.stop_preview();
        encode_jpeg(&decode_frame(&frame)?, 100)
    }

    fn release(&mut self) {
        self.stop_preview();
    }
}

// CallbackCamera is only touched behind its mutex from the backend worker.
unsafe impl Send for NokhwaCamera {}
