//! V4L2 webcam capture implementing the core frame-source seam.
//!
//! The device is held open only between `acquire` and `release`, matching
//! the kiosk's scoped camera use: acquire on session start, release on
//! every stop path.

use crate::frame;
use std::path::Path;
use tally_core::session::{CaptureError, FrameSource};
use tally_core::FramePixels;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
}

impl From<CameraError> for CaptureError {
    fn from(err: CameraError) -> Self {
        match err {
            CameraError::CaptureFailed(msg) => CaptureError::Failed(msg),
            other => CaptureError::Unavailable(other.to_string()),
        }
    }
}

/// Negotiated pixel format for the webcam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, extract Y channel).
    Yuyv,
    /// 8-bit grayscale (1 byte/pixel).
    Grey,
}

struct OpenDevice {
    device: Device,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
}

/// A V4L2 webcam, identified by device path, opened lazily.
pub struct Camera {
    device_path: String,
    open: Option<OpenDevice>,
}

impl Camera {
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            device_path: device_path.into(),
            open: None,
        }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    fn open_device(&self) -> Result<OpenDevice, CameraError> {
        let path = &self.device_path;
        if !Path::new(path).exists() {
            return Err(CameraError::DeviceNotFound(path.clone()));
        }

        let device = Device::with_path(path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{path}: {e}"))
            }
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to query capabilities: {e}")))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut fmt = device
            .format()
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to get format: {e}")))?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = CAPTURE_WIDTH;
        fmt.height = CAPTURE_HEIGHT;

        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to set format: {e}")))?;

        let pixel_format = if negotiated.fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if negotiated.fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need YUYV or GREY)",
                negotiated.fourcc
            )));
        };

        tracing::info!(
            device = %path,
            driver = %caps.driver,
            card = %caps.card,
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            "camera opened"
        );

        Ok(OpenDevice {
            device,
            width: negotiated.width,
            height: negotiated.height,
            pixel_format,
        })
    }

    /// Capture one grayscale frame from an acquired camera.
    pub fn capture_frame(&mut self) -> Result<FramePixels, CameraError> {
        let open = self
            .open
            .as_ref()
            .ok_or_else(|| CameraError::CaptureFailed("camera not acquired".into()))?;

        let mut stream = MmapStream::with_buffers(&open.device, BufType::VideoCapture, 4)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;

        let (buf, _meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let pixels = (open.width * open.height) as usize;
        let data = match open.pixel_format {
            PixelFormat::Grey => {
                if buf.len() < pixels {
                    return Err(CameraError::CaptureFailed(format!(
                        "GREY buffer too short: expected {pixels}, got {}",
                        buf.len()
                    )));
                }
                buf[..pixels].to_vec()
            }
            PixelFormat::Yuyv => frame::yuyv_to_grayscale(buf, open.width, open.height)
                .map_err(|e| CameraError::CaptureFailed(format!("YUYV conversion failed: {e}")))?,
        };

        Ok(FramePixels {
            data,
            width: open.width,
            height: open.height,
        })
    }
}

impl FrameSource for Camera {
    fn acquire(&mut self) -> Result<(), CaptureError> {
        if self.open.is_none() {
            self.open = Some(self.open_device()?);
        }
        Ok(())
    }

    fn grab(&mut self) -> Result<FramePixels, CaptureError> {
        Ok(self.capture_frame()?)
    }

    fn release(&mut self) {
        if self.open.take().is_some() {
            tracing::debug!(device = %self.device_path, "camera released");
        }
    }
}
