//! Concrete camera sources

use crate::frame::{Resolution, VideoFrame};
use crate::{CameraConfig, CameraError, CameraSource, CameraStream, FacingMode};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Counts streams that have been acquired and not yet released
#[derive(Debug, Clone, Default)]
pub struct StreamTracker {
    open: Arc<AtomicUsize>,
    acquired: Arc<AtomicUsize>,
}

impl StreamTracker {
    /// Streams currently held
    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Successful acquisitions so far
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    fn opened(&self) {
        self.open.fetch_add(1, Ordering::SeqCst);
        self.acquired.fetch_add(1, Ordering::SeqCst);
    }

    fn closed(&self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Availability {
    Available,
    PermissionDenied,
    NoDevice,
}

/// Synthetic test-pattern camera (no hardware required)
pub struct SyntheticCamera {
    availability: Availability,
    native: Resolution,
    warmup_frames: u32,
    frame_limit: Option<u32>,
    tracker: StreamTracker,
}

impl SyntheticCamera {
    /// Camera that always grants access
    pub fn new() -> Self {
        Self {
            availability: Availability::Available,
            native: Resolution::new(640, 480),
            warmup_frames: 0,
            frame_limit: None,
            tracker: StreamTracker::default(),
        }
    }

    /// Camera whose access is refused
    pub fn denied() -> Self {
        Self {
            availability: Availability::PermissionDenied,
            ..Self::new()
        }
    }

    /// No camera attached
    pub fn absent() -> Self {
        Self {
            availability: Availability::NoDevice,
            ..Self::new()
        }
    }

    /// Native sensor resolution
    pub fn with_native(mut self, native: Resolution) -> Self {
        self.native = native;
        self
    }

    /// Number of `latest_frame` calls that return nothing after acquisition
    pub fn with_warmup(mut self, frames: u32) -> Self {
        self.warmup_frames = frames;
        self
    }

    /// End the stream on its own after `frames` frames, like an unplugged device
    pub fn with_frame_limit(mut self, frames: u32) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    pub fn tracker(&self) -> StreamTracker {
        self.tracker.clone()
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraSource for SyntheticCamera {
    async fn acquire(
        &mut self,
        config: &CameraConfig,
    ) -> Result<Box<dyn CameraStream>, CameraError> {
        match self.availability {
            Availability::PermissionDenied => {
                return Err(CameraError::PermissionDenied(
                    "synthetic camera refused access".into(),
                ))
            }
            Availability::NoDevice => {
                return Err(CameraError::NoDevice("synthetic camera absent".into()))
            }
            Availability::Available => {}
        }

        if config.facing != FacingMode::User {
            debug!("Synthetic camera ignores facing mode {:?}", config.facing);
        }

        let resolution = Resolution::negotiate(config.ideal(), self.native);
        info!(
            "Synthetic camera acquired at {}x{}",
            resolution.width, resolution.height
        );
        self.tracker.opened();

        Ok(Box::new(SyntheticStream {
            resolution,
            warmup_remaining: self.warmup_frames,
            frame_limit: self.frame_limit,
            sequence: 0,
            started: Instant::now(),
            live: true,
            tracker: self.tracker.clone(),
        }))
    }
}

struct SyntheticStream {
    resolution: Resolution,
    warmup_remaining: u32,
    frame_limit: Option<u32>,
    sequence: u32,
    started: Instant,
    live: bool,
    tracker: StreamTracker,
}

impl SyntheticStream {
    fn ended(&self) -> bool {
        self.frame_limit.is_some_and(|limit| self.sequence >= limit)
    }
}

impl CameraStream for SyntheticStream {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn latest_frame(&mut self) -> Option<VideoFrame> {
        if !self.is_live() {
            return None;
        }
        if self.warmup_remaining > 0 {
            self.warmup_remaining -= 1;
            return None;
        }

        let Resolution { width, height } = self.resolution;
        let shift = (self.sequence % 256) as u8;
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(((x * 255) / width.max(1)) as u8);
                data.push(((y * 255) / height.max(1)) as u8);
                data.push(shift);
            }
        }

        let frame = VideoFrame::new(
            data,
            width,
            height,
            self.started.elapsed().as_nanos() as u64,
            self.sequence,
        );
        self.sequence = self.sequence.wrapping_add(1);
        Some(frame)
    }

    fn release(&mut self) {
        if self.live {
            self.live = false;
            self.tracker.closed();
            debug!("Synthetic stream released after {} frames", self.sequence);
        }
    }

    fn is_live(&self) -> bool {
        self.live && !self.ended()
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.release();
    }
}

/// Camera that replays a still image from disk as its feed
pub struct StillFileCamera {
    path: PathBuf,
}

impl StillFileCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CameraSource for StillFileCamera {
    async fn acquire(
        &mut self,
        config: &CameraConfig,
    ) -> Result<Box<dyn CameraStream>, CameraError> {
        let path = self.path.display().to_string();
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => CameraError::NoDevice(path.clone()),
            ErrorKind::PermissionDenied => CameraError::PermissionDenied(path.clone()),
            _ => CameraError::Open(format!("{}: {}", path, e)),
        })?;

        let img = image::load_from_memory(&bytes)
            .map_err(|e| CameraError::Format(format!("{}: {}", path, e)))?
            .to_rgb8();
        let native = Resolution::new(img.width(), img.height());
        let resolution = Resolution::negotiate(config.ideal(), native);
        if resolution != native {
            warn!(
                "Still {} is {}x{}, frames will be scaled to {}x{}",
                path, native.width, native.height, resolution.width, resolution.height
            );
        }
        info!("File camera acquired from {}", path);

        Ok(Box::new(StillFileStream {
            frame: VideoFrame::new(img.into_raw(), native.width, native.height, 0, 0),
            resolution,
            started: Instant::now(),
            live: true,
        }))
    }
}

struct StillFileStream {
    frame: VideoFrame,
    resolution: Resolution,
    started: Instant,
    live: bool,
}

impl CameraStream for StillFileStream {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn latest_frame(&mut self) -> Option<VideoFrame> {
        if !self.live {
            return None;
        }
        let mut frame = self.frame.clone();
        frame.timestamp_ns = self.started.elapsed().as_nanos() as u64;
        self.frame.sequence = self.frame.sequence.wrapping_add(1);
        Some(frame)
    }

    fn release(&mut self) {
        self.live = false;
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_synthetic_acquire_and_release() {
        let mut camera = SyntheticCamera::new();
        let tracker = camera.tracker();

        let mut stream = camera.acquire(&CameraConfig::default()).await.unwrap();
        assert_eq!(tracker.open(), 1);
        assert_eq!(stream.resolution(), Resolution::new(640, 480));

        let frame = stream.latest_frame().unwrap();
        assert_eq!(frame.data.len(), 640 * 480 * 3);

        stream.release();
        stream.release();
        assert_eq!(tracker.open(), 0);
        assert!(stream.latest_frame().is_none());
    }

    #[tokio::test]
    async fn test_synthetic_denied() {
        let mut camera = SyntheticCamera::denied();
        let result = camera.acquire(&CameraConfig::default()).await;
        assert!(matches!(result, Err(CameraError::PermissionDenied(_))));
        assert_eq!(camera.tracker().acquired(), 0);
    }

    #[tokio::test]
    async fn test_synthetic_warmup() {
        let mut camera = SyntheticCamera::new().with_warmup(2);
        let mut stream = camera.acquire(&CameraConfig::default()).await.unwrap();
        assert!(stream.latest_frame().is_none());
        assert!(stream.latest_frame().is_none());
        assert!(stream.latest_frame().is_some());
    }

    #[tokio::test]
    async fn test_frame_limit_ends_stream() {
        let mut camera = SyntheticCamera::new().with_frame_limit(2);
        let tracker = camera.tracker();
        let mut stream = camera.acquire(&CameraConfig::default()).await.unwrap();

        assert!(stream.latest_frame().is_some());
        assert!(stream.latest_frame().is_some());
        assert!(!stream.is_live());
        assert!(stream.latest_frame().is_none());

        // Still held until released
        assert_eq!(tracker.open(), 1);
        stream.release();
        assert_eq!(tracker.open(), 0);
    }

    #[tokio::test]
    async fn test_dropping_stream_releases() {
        let mut camera = SyntheticCamera::new();
        let tracker = camera.tracker();
        let stream = camera.acquire(&CameraConfig::default()).await.unwrap();
        drop(stream);
        assert_eq!(tracker.open(), 0);
    }

    #[tokio::test]
    async fn test_missing_file_is_no_device() {
        let mut camera = StillFileCamera::new("/nonexistent/driver.jpg");
        let result = camera.acquire(&CameraConfig::default()).await;
        assert!(matches!(result, Err(CameraError::NoDevice(_))));
    }
}
