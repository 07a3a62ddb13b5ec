//! Live camera capture via OpenCV

use crate::frame::{Resolution, VideoFrame};
use crate::{CameraConfig, CameraError, CameraSource, CameraStream, FacingMode};
use async_trait::async_trait;
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::{imgproc, videoio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Consecutive failed reads before the stream counts as lost
const MAX_READ_FAILURES: u32 = 30;
const READ_RETRY: Duration = Duration::from_millis(10);

/// Camera attached to this machine, selected by index
pub struct DeviceCamera {
    index: i32,
}

impl DeviceCamera {
    pub fn new(index: i32) -> Self {
        Self { index }
    }
}

#[derive(Default)]
struct Shared {
    latest: Mutex<Option<VideoFrame>>,
    lost: AtomicBool,
    stop: AtomicBool,
}

#[async_trait]
impl CameraSource for DeviceCamera {
    async fn acquire(
        &mut self,
        config: &CameraConfig,
    ) -> Result<Box<dyn CameraStream>, CameraError> {
        if config.facing != FacingMode::User {
            debug!("Device camera {} ignores facing mode {:?}", self.index, config.facing);
        }

        // Opening blocks in the driver, so it happens on the capture thread.
        let (ready_tx, ready_rx) = oneshot::channel();
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);
        let index = self.index;
        let ideal = config.ideal();

        let worker = thread::Builder::new()
            .name("camera-capture".into())
            .spawn(move || match open_capture(index, ideal) {
                Ok((capture, resolution)) => {
                    let _ = ready_tx.send(Ok(resolution));
                    capture_loop(capture, &worker_shared);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| CameraError::Open(e.to_string()))?;

        let resolution = ready_rx
            .await
            .map_err(|_| CameraError::Open("capture thread exited".into()))??;
        info!(
            "Device camera {} acquired at {}x{}",
            index, resolution.width, resolution.height
        );

        Ok(Box::new(DeviceStream {
            shared,
            worker: Some(worker),
            resolution,
        }))
    }
}

fn open_capture(
    index: i32,
    ideal: Resolution,
) -> Result<(videoio::VideoCapture, Resolution), CameraError> {
    let mut capture = videoio::VideoCapture::new(index, videoio::CAP_ANY)
        .map_err(|e| classify_open_error(index, &e.message))?;
    let opened = capture
        .is_opened()
        .map_err(|e| classify_open_error(index, &e.message))?;
    if !opened {
        return Err(diagnose_unopened(index));
    }

    // Drivers settle on the closest mode they support
    if let Err(e) = capture.set(videoio::CAP_PROP_FRAME_WIDTH, ideal.width as f64) {
        debug!("Camera {} rejected width {}: {}", index, ideal.width, e.message);
    }
    if let Err(e) = capture.set(videoio::CAP_PROP_FRAME_HEIGHT, ideal.height as f64) {
        debug!("Camera {} rejected height {}: {}", index, ideal.height, e.message);
    }
    let native = Resolution::new(
        capture.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or(0.0) as u32,
        capture.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0) as u32,
    );

    Ok((capture, Resolution::negotiate(ideal, native)))
}

fn classify_open_error(index: i32, message: &str) -> CameraError {
    let lowered = message.to_lowercase();
    if lowered.contains("permission") || lowered.contains("not authorized") {
        CameraError::PermissionDenied(format!("camera {}: {}", index, message))
    } else {
        CameraError::Open(format!("camera {}: {}", index, message))
    }
}

/// OpenCV reports only "not opened"; the device node says why.
#[cfg(target_os = "linux")]
fn diagnose_unopened(index: i32) -> CameraError {
    let node = format!("/dev/video{}", index);
    match std::fs::File::open(&node) {
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            CameraError::PermissionDenied(node)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => CameraError::NoDevice(node),
        _ => CameraError::Open(format!("{} could not be opened", node)),
    }
}

#[cfg(not(target_os = "linux"))]
fn diagnose_unopened(index: i32) -> CameraError {
    CameraError::NoDevice(format!("camera {} could not be opened", index))
}

fn capture_loop(mut capture: videoio::VideoCapture, shared: &Shared) {
    let started = Instant::now();
    let mut raw = Mat::default();
    let mut rgb = Mat::default();
    let mut sequence = 0u32;
    let mut failures = 0u32;

    while !shared.stop.load(Ordering::SeqCst) {
        match read_frame(&mut capture, &mut raw, &mut rgb, started, sequence) {
            Ok(frame) => {
                failures = 0;
                sequence = sequence.wrapping_add(1);
                if let Ok(mut latest) = shared.latest.lock() {
                    *latest = Some(frame);
                }
            }
            Err(e) => {
                failures += 1;
                if failures >= MAX_READ_FAILURES {
                    warn!("Camera stream lost: {}", e);
                    shared.lost.store(true, Ordering::SeqCst);
                    break;
                }
                thread::sleep(READ_RETRY);
            }
        }
    }

    if let Err(e) = capture.release() {
        warn!("Camera release failed: {}", e.message);
    }
    debug!("Capture thread stopped after {} frames", sequence);
}

fn read_frame(
    capture: &mut videoio::VideoCapture,
    raw: &mut Mat,
    rgb: &mut Mat,
    started: Instant,
    sequence: u32,
) -> Result<VideoFrame, CameraError> {
    let grabbed = capture
        .read(raw)
        .map_err(|e| CameraError::Open(e.message))?;
    if !grabbed || raw.empty() {
        return Err(CameraError::Format("empty frame".into()));
    }

    imgproc::cvt_color(&*raw, rgb, imgproc::COLOR_BGR2RGB, 0)
        .map_err(|e| CameraError::Format(e.message))?;
    let data = rgb
        .data_bytes()
        .map_err(|e| CameraError::Format(e.message))?
        .to_vec();

    Ok(VideoFrame::new(
        data,
        rgb.cols() as u32,
        rgb.rows() as u32,
        started.elapsed().as_nanos() as u64,
        sequence,
    ))
}

struct DeviceStream {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    resolution: Resolution,
}

impl CameraStream for DeviceStream {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn latest_frame(&mut self) -> Option<VideoFrame> {
        if self.worker.is_none() {
            return None;
        }
        self.shared.latest.lock().ok()?.clone()
    }

    fn release(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.shared.stop.store(true, Ordering::SeqCst);
            // Bounded by one frame read
            if worker.join().is_err() {
                warn!("Capture thread panicked");
            }
            info!("Device camera released");
        }
    }

    fn is_live(&self) -> bool {
        self.worker.is_some() && !self.shared.lost.load(Ordering::SeqCst)
    }
}

impl Drop for DeviceStream {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_errors_are_permission_denied() {
        let err = classify_open_error(0, "AVFoundation: not authorized to capture video");
        assert!(matches!(err, CameraError::PermissionDenied(_)));

        let err = classify_open_error(0, "open: Permission denied");
        assert!(matches!(err, CameraError::PermissionDenied(_)));
    }

    #[test]
    fn test_other_errors_are_open_failures() {
        let err = classify_open_error(2, "backend GStreamer not available");
        assert!(matches!(err, CameraError::Open(ref m) if m.contains("camera 2")));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_missing_device_node_is_no_device() {
        assert!(matches!(diagnose_unopened(9999), CameraError::NoDevice(_)));
    }

    #[test]
    fn test_released_stream_is_not_live() {
        let mut stream = DeviceStream {
            shared: Arc::new(Shared::default()),
            worker: Some(thread::spawn(|| {})),
            resolution: Resolution::new(640, 480),
        };
        assert!(stream.is_live());
        stream.release();
        stream.release();
        assert!(!stream.is_live());
        assert!(stream.latest_frame().is_none());
    }

    #[test]
    fn test_lost_stream_is_not_live() {
        let shared = Arc::new(Shared::default());
        shared.lost.store(true, Ordering::SeqCst);
        let stream = DeviceStream {
            shared,
            worker: Some(thread::spawn(|| {})),
            resolution: Resolution::new(640, 480),
        };
        assert!(!stream.is_live());
    }
}
