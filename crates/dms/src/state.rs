//! Detection state and the per-run session

use crate::analysis::AnalysisVerdict;
use camera_capture::CameraStream;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Monitoring state. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionState {
    /// Camera off, nothing armed
    #[default]
    Idle,
    /// Camera on, sampling every interval
    Scanning,
    /// Drowsiness detected, counting down to resume
    Alert,
    /// Camera could not be acquired
    Error,
}

impl DetectionState {
    /// True while the camera is held
    pub fn is_active(&self) -> bool {
        matches!(self, DetectionState::Scanning | DetectionState::Alert)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionState::Idle => "idle",
            DetectionState::Scanning => "scanning",
            DetectionState::Alert => "alert",
            DetectionState::Error => "error",
        }
    }
}

/// State of one monitoring instance
pub struct Session {
    /// Identifier of the current run, assigned when a camera is acquired
    pub id: Option<Uuid>,
    pub state: DetectionState,
    /// Exclusively owned while Scanning or Alert
    pub camera: Option<Box<dyn CameraStream>>,
    pub last_verdict: Option<AnalysisVerdict>,
    /// Seconds until sampling resumes; meaningful only in Alert
    pub cooldown_remaining: u32,
    /// User-facing message while in Error
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: None,
            state: DetectionState::Idle,
            camera: None,
            last_verdict: None,
            cooldown_remaining: 0,
            error: None,
            started_at: None,
        }
    }

    pub fn has_camera(&self) -> bool {
        self.camera.is_some()
    }

    /// Stop and drop the camera stream, if any
    pub fn release_camera(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            camera.release();
        }
    }

    /// Adopt a freshly acquired camera, starting a new run
    pub fn attach_camera(&mut self, camera: Box<dyn CameraStream>) {
        self.release_camera();
        self.camera = Some(camera);
        self.id = Some(Uuid::new_v4());
        self.started_at = Some(Utc::now());
        self.error = None;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
