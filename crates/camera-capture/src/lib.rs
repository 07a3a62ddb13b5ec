//! Camera Capture Library for Driver Monitoring
//!
//! Provides the camera port used by the monitoring loop:
//! - Acquisition with negotiated constraints (user-facing, ideal 640x480)
//! - Latest-frame access on a live stream
//! - Still encoding (JPEG) of a frame for remote analysis
//!
//! Live hardware capture (OpenCV) is behind the `device` feature.

#[cfg(feature = "device")]
mod device;
pub mod frame;
pub mod source;

#[cfg(feature = "device")]
pub use device::DeviceCamera;
pub use frame::{JpegStill, Resolution, VideoFrame, JPEG_MIME};
pub use source::{StillFileCamera, StreamTracker, SyntheticCamera};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("No camera device found: {0}")]
    NoDevice(String),

    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Still encoding failed: {0}")]
    Encode(String),

    #[error("Camera stream ended")]
    Disconnected,
}

impl CameraError {
    /// Message suitable for showing to the driver
    pub fn user_message(&self) -> String {
        match self {
            CameraError::PermissionDenied(_) => {
                "Could not access camera. Please allow permissions.".to_string()
            }
            CameraError::NoDevice(_) => "No camera found. Connect a camera and retry.".to_string(),
            CameraError::Disconnected => {
                "Camera disconnected. Check the connection and start again.".to_string()
            }
            other => format!("Camera unavailable: {}", other),
        }
    }
}

/// Which way the camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Facing the occupant (driver monitoring)
    #[default]
    User,
    /// Facing away from the occupant
    Environment,
}

/// Constraints requested when acquiring a camera
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Requested facing mode
    pub facing: FacingMode,
    /// Ideal capture width
    pub ideal_width: u32,
    /// Ideal capture height
    pub ideal_height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            facing: FacingMode::User,
            ideal_width: 640,
            ideal_height: 480,
        }
    }
}

impl CameraConfig {
    /// Ideal resolution as requested
    pub fn ideal(&self) -> Resolution {
        Resolution::new(self.ideal_width, self.ideal_height)
    }
}

/// Something that can hand out a live camera stream
#[async_trait]
pub trait CameraSource: Send {
    /// Acquire a stream honouring the constraints as closely as possible
    async fn acquire(
        &mut self,
        config: &CameraConfig,
    ) -> Result<Box<dyn CameraStream>, CameraError>;
}

/// An acquired, exclusively owned camera stream
pub trait CameraStream: Send {
    /// Resolution negotiated at acquisition
    fn resolution(&self) -> Resolution;

    /// Current frame, if the stream has produced one yet
    fn latest_frame(&mut self) -> Option<VideoFrame>;

    /// Stop the stream. Calling this more than once is a no-op.
    fn release(&mut self);

    /// Whether the stream is held and still delivering frames. False once
    /// released, or when the device went away.
    fn is_live(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constraints() {
        let config = CameraConfig::default();
        assert_eq!(config.facing, FacingMode::User);
        assert_eq!(config.ideal(), Resolution::new(640, 480));
    }

    #[test]
    fn test_permission_message() {
        let err = CameraError::PermissionDenied("denied by user".into());
        assert!(err.user_message().contains("allow permissions"));
    }

    #[test]
    fn test_disconnect_message() {
        assert!(CameraError::Disconnected.user_message().contains("disconnected"));
    }
}
