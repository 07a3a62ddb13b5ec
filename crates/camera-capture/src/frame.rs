//! Video frame types and still encoding

use crate::CameraError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Mime type of encoded stills
pub const JPEG_MIME: &str = "image/jpeg";

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Resolution a device settles on when asked for `ideal`.
    ///
    /// A native resolution that already fits is kept; a larger one is
    /// scaled down, preserving aspect ratio, until it fits.
    pub fn negotiate(ideal: Resolution, native: Resolution) -> Resolution {
        if native.width == 0 || native.height == 0 {
            return ideal;
        }
        if native.fits_within(&ideal) {
            return native;
        }

        let scale = f64::min(
            ideal.width as f64 / native.width as f64,
            ideal.height as f64 / native.height as f64,
        );
        Resolution {
            width: ((native.width as f64 * scale).round() as u32).max(1),
            height: ((native.height as f64 * scale).round() as u32).max(1),
        }
    }

    pub fn fits_within(&self, other: &Resolution) -> bool {
        self.width <= other.width && self.height <= other.height
    }
}

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds since stream start)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Encode as a JPEG still, downscaled to `target` if the frame is larger.
    pub fn encode_jpeg(&self, quality: u8, target: Resolution) -> Result<JpegStill, CameraError> {
        let img = RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            CameraError::Format(format!(
                "{} bytes is not a {}x{} RGB frame",
                self.data.len(),
                self.width,
                self.height
            ))
        })?;

        let img = if self.resolution().fits_within(&target) {
            img
        } else {
            let fitted = Resolution::negotiate(target, self.resolution());
            image::imageops::resize(&img, fitted.width, fitted.height, FilterType::Triangle)
        };

        let mut data = Vec::new();
        JpegEncoder::new_with_quality(&mut data, quality.clamp(1, 100))
            .encode_image(&img)
            .map_err(|e| CameraError::Encode(e.to_string()))?;

        Ok(JpegStill {
            data,
            width: img.width(),
            height: img.height(),
            sequence: self.sequence,
        })
    }
}

/// A compressed still taken from one frame
#[derive(Debug, Clone)]
pub struct JpegStill {
    /// JPEG bytes
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Sequence number of the source frame
    pub sequence: u32,
}

impl JpegStill {
    pub fn mime_type(&self) -> &'static str {
        JPEG_MIME
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
