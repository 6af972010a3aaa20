//! Live camera capture through nokhwa.

use super::{CaptureBackend, CaptureConfig, ThreadedCapture};
use crate::error::CaptureError;
use crate::frame::{PixelFormat, VideoFrame};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use tracing::info;

/// Information about a camera device.
#[derive(Debug, Clone)]
pub struct CameraInfo {
    pub index: u32,
    pub name: String,
}

/// Webcam capture using the nokhwa library.
pub struct NokhwaCapture {
    camera: Camera,
    width: u32,
    height: u32,
}

impl NokhwaCapture {
    pub fn list_devices() -> Result<Vec<CameraInfo>, CaptureError> {
        let devices = nokhwa::query(ApiBackend::Auto).map_err(|e| CaptureError::Unavailable(e.to_string()))?;
        Ok(devices
            .into_iter()
            .map(|d| CameraInfo {
                index: d.index().as_index().unwrap_or(0),
                name: d.human_name().to_string(),
            })
            .collect())
    }

    /// Opens the device, trying the requested mode first and then a few
    /// common ones; some drivers reject anything not close to a mode they list.
    pub fn open(config: &CaptureConfig) -> Result<Self, CaptureError> {
        let requested = Resolution::new(config.width, config.height);
        let seeds = [
            CameraFormat::new(requested, FrameFormat::MJPEG, config.fps),
            CameraFormat::new(requested, FrameFormat::YUYV, config.fps),
            CameraFormat::new(requested, FrameFormat::NV12, config.fps),
            CameraFormat::new(Resolution::new(1280, 720), FrameFormat::MJPEG, 30),
            CameraFormat::new(Resolution::new(1280, 720), FrameFormat::YUYV, 30),
            CameraFormat::new(Resolution::new(640, 480), FrameFormat::YUYV, 30),
        ];

        let mut camera = None;
        for seed in seeds {
            let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(seed));
            if let Ok(mut cam) = Camera::new(CameraIndex::Index(config.device_index), format) {
                // Creating the object is not enough for some drivers.
                if cam.open_stream().is_ok() {
                    info!("Camera stream opened with seed format {:?}", seed);
                    camera = Some(cam);
                    break;
                }
            }
        }
        let camera = camera.ok_or_else(|| {
            CaptureError::Unavailable(format!(
                "could not open a stream on camera {} with any standard format",
                config.device_index
            ))
        })?;

        let resolution = camera.resolution();
        info!("Camera opened with resolution {}", resolution);
        Ok(Self {
            camera,
            width: resolution.width(),
            height: resolution.height(),
        })
    }

    /// Opens the camera on a capture thread. `Camera::frame` waits for the
    /// device, so the frame loop only ever sees the thread's latest frame.
    pub fn open_threaded(config: &CaptureConfig) -> Result<ThreadedCapture, CaptureError> {
        let config = config.clone();
        ThreadedCapture::spawn(move || Self::open(&config))
    }
}

impl CaptureBackend for NokhwaCapture {
    /// Blocks until the camera delivers the next frame.
    fn capture_frame(&mut self) -> Result<VideoFrame, CaptureError> {
        let frame = self.camera.frame().map_err(|e| CaptureError::Grab(e.to_string()))?;
        let decoded = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| CaptureError::Grab(e.to_string()))?;
        let (width, height) = decoded.dimensions();
        self.width = width;
        self.height = height;
        Ok(VideoFrame::from_data(width, height, PixelFormat::Rgb, decoded.into_raw()))
    }

    fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
