//! Monitoring state machine
//!
//! One task owns the session: it acquires and releases the camera, samples
//! a still every interval while scanning, hands each still to the frame
//! analyzer without waiting on it, and runs the alert cooldown. Every state
//! change goes through [`Monitor::transition`], which arms or disarms the
//! single timer, stops the alarm and releases the camera as the target
//! state requires.

use crate::analysis::AnalysisVerdict;
use crate::analyzer::{analyze_fail_open, FrameAnalyzer};
use crate::config::MonitorConfig;
use crate::schedule::{Schedule, TimerKind};
use crate::state::{DetectionState, Session};
use crate::MonitorError;
use alerting::AlarmEmitter;
use camera_capture::{CameraError, CameraSource};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const COOLDOWN_TICK: Duration = Duration::from_secs(1);
const COMMAND_QUEUE: usize = 16;

/// Commands accepted from the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Begin monitoring (no-op while Scanning or Alert)
    Start,
    /// Stop monitoring (no-op while Idle)
    Stop,
    /// Stop and end the monitor task
    Shutdown,
}

/// Snapshot of everything the presentation layer may show
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorStatus {
    pub session_id: Option<Uuid>,
    pub state: DetectionState,
    pub is_active: bool,
    pub last_verdict: Option<AnalysisVerdict>,
    /// Seconds until sampling resumes, present only in Alert
    pub cooldown_remaining: Option<u32>,
    /// User-facing message, present only in Error
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub alarm_playing: bool,
}

impl Default for MonitorStatus {
    fn default() -> Self {
        Self {
            session_id: None,
            state: DetectionState::Idle,
            is_active: false,
            last_verdict: None,
            cooldown_remaining: None,
            error: None,
            started_at: None,
            alarm_playing: false,
        }
    }
}

/// Outcome of one analyzer call, tagged with the generation it was issued in
#[derive(Debug)]
pub struct SampleResult {
    pub generation: u64,
    pub sequence: u32,
    pub verdict: AnalysisVerdict,
}

struct Request {
    command: Command,
    reply: oneshot::Sender<MonitorStatus>,
}

enum Event {
    Request(Request),
    Closed,
    Timer(TimerKind),
    Sample(Result<SampleResult, JoinError>),
    AlarmExpired,
}

/// Cloneable handle for issuing commands and observing status
#[derive(Clone)]
pub struct MonitorHandle {
    requests: mpsc::Sender<Request>,
    status: watch::Receiver<MonitorStatus>,
}

impl MonitorHandle {
    /// Start monitoring; resolves once the command has been processed
    pub async fn start(&self) -> Result<MonitorStatus, MonitorError> {
        self.send(Command::Start).await
    }

    pub async fn stop(&self) -> Result<MonitorStatus, MonitorError> {
        self.send(Command::Stop).await
    }

    pub async fn shutdown(&self) -> Result<MonitorStatus, MonitorError> {
        self.send(Command::Shutdown).await
    }

    pub async fn send(&self, command: Command) -> Result<MonitorStatus, MonitorError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request { command, reply })
            .await
            .map_err(|_| MonitorError::ChannelClosed)?;
        response.await.map_err(|_| MonitorError::ChannelClosed)
    }

    /// Latest published status
    pub fn status(&self) -> MonitorStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change
    pub fn subscribe(&self) -> watch::Receiver<MonitorStatus> {
        self.status.clone()
    }
}

/// The monitoring state machine
pub struct Monitor {
    config: MonitorConfig,
    camera_source: Box<dyn CameraSource>,
    analyzer: Arc<dyn FrameAnalyzer>,
    alarm: AlarmEmitter,
    session: Session,
    schedule: Schedule,
    /// Bumped on every transition; results from older generations are stale
    generation: u64,
    in_flight: JoinSet<SampleResult>,
    status_tx: watch::Sender<MonitorStatus>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        camera_source: Box<dyn CameraSource>,
        analyzer: Arc<dyn FrameAnalyzer>,
        alarm: AlarmEmitter,
    ) -> Self {
        let (status_tx, _) = watch::channel(MonitorStatus::default());
        Self {
            config,
            camera_source,
            analyzer,
            alarm,
            session: Session::new(),
            schedule: Schedule::new(),
            generation: 0,
            in_flight: JoinSet::new(),
            status_tx,
        }
    }

    /// Run the monitor on its own task
    pub fn spawn(self) -> (MonitorHandle, JoinHandle<()>) {
        let (requests, receiver) = mpsc::channel(COMMAND_QUEUE);
        let handle = MonitorHandle {
            requests,
            status: self.status_tx.subscribe(),
        };
        (handle, tokio::spawn(self.run(receiver)))
    }

    /// Event loop. Ends on `Shutdown` or when every handle is dropped.
    async fn run(mut self, mut requests: mpsc::Receiver<Request>) {
        info!(
            "Monitor loop started (sample every {:?}, cooldown {}s)",
            self.config.sample_interval(),
            self.config.cooldown_ticks()
        );
        self.publish();

        loop {
            let event = tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => Event::Request(request),
                    None => Event::Closed,
                },
                kind = self.schedule.tick() => Event::Timer(kind),
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    Event::Sample(joined)
                }
                () = self.alarm.expired() => Event::AlarmExpired,
            };

            match event {
                Event::Request(Request { command, reply }) => {
                    self.handle_command(command).await;
                    self.publish();
                    let _ = reply.send(self.status());
                    if command == Command::Shutdown {
                        break;
                    }
                }
                Event::Closed => {
                    debug!("All monitor handles dropped");
                    self.handle_command(Command::Shutdown).await;
                    break;
                }
                Event::Timer(kind) => {
                    self.on_timer(kind);
                    self.publish();
                }
                Event::Sample(Ok(result)) => {
                    self.on_sample(result);
                    self.publish();
                }
                Event::Sample(Err(e)) => warn!("Analyzer task ended abnormally: {}", e),
                Event::AlarmExpired => {
                    debug!("Alarm reached its hard stop");
                    self.publish();
                }
            }
        }

        self.in_flight.abort_all();
        self.publish();
        info!("Monitor loop stopped");
    }

    /// Apply a user command
    pub async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start => match self.session.state {
                DetectionState::Idle | DetectionState::Error => self.acquire_and_scan().await,
                state => debug!("Start ignored, already {}", state.as_str()),
            },
            Command::Stop | Command::Shutdown => {
                if self.session.state == DetectionState::Idle {
                    debug!("Stop ignored, already idle");
                } else {
                    self.transition(DetectionState::Idle);
                }
            }
        }
    }

    /// Apply a fired timer
    pub fn on_timer(&mut self, kind: TimerKind) {
        match (kind, self.session.state) {
            (TimerKind::Sampling, DetectionState::Scanning) => self.sample(),
            (TimerKind::Cooldown, DetectionState::Alert) => self.cool_down(),
            (kind, state) => debug!("Ignoring {:?} tick in {}", kind, state.as_str()),
        }
    }

    /// Apply a finished analyzer call
    pub fn on_sample(&mut self, result: SampleResult) {
        if result.generation != self.generation || self.session.state != DetectionState::Scanning {
            debug!(
                "Discarding verdict for sample {} (generation {} vs {}, state {})",
                result.sequence,
                result.generation,
                self.generation,
                self.session.state.as_str()
            );
            metrics::counter!("dms_stale_verdicts_total").increment(1);
            return;
        }

        let verdict = result.verdict;
        let drowsy = verdict.is_drowsy;
        if drowsy {
            let signs: Vec<&str> = verdict.known_signs().iter().map(|s| s.as_str()).collect();
            warn!(
                "Drowsiness detected in sample {}: {} ({:.0}%, signs: {:?})",
                result.sequence,
                verdict.reason,
                verdict.confidence * 100.0,
                signs
            );
        }
        self.session.last_verdict = Some(verdict);

        if drowsy {
            self.transition(DetectionState::Alert);
        }
    }

    async fn acquire_and_scan(&mut self) {
        info!("Acquiring camera");
        match self.camera_source.acquire(&self.config.camera).await {
            Ok(stream) => {
                let resolution = stream.resolution();
                self.session.attach_camera(stream);
                self.session.last_verdict = None;
                info!(
                    "Camera ready at {}x{}, session {:?}",
                    resolution.width, resolution.height, self.session.id
                );
                self.transition(DetectionState::Scanning);
            }
            Err(e) => {
                error!("Camera acquisition failed: {}", e);
                metrics::counter!("dms_camera_failures_total").increment(1);
                self.session.error = Some(e.user_message());
                self.transition(DetectionState::Error);
            }
        }
    }

    fn sample(&mut self) {
        match self.session.camera.as_ref().map(|camera| camera.is_live()) {
            None => {
                warn!("Sampling tick without a camera");
                return;
            }
            Some(false) => {
                self.camera_lost();
                return;
            }
            Some(true) => {}
        }
        let Some(camera) = self.session.camera.as_mut() else {
            return;
        };
        let Some(frame) = camera.latest_frame() else {
            debug!("No camera frame available yet, skipping sample");
            return;
        };

        let still = match frame.encode_jpeg(self.config.jpeg_quality, camera.resolution()) {
            Ok(still) => still,
            Err(e) => {
                warn!("Could not encode sample {}: {}", frame.sequence, e);
                return;
            }
        };

        metrics::counter!("dms_samples_total").increment(1);
        debug!("Sample {} captured ({} bytes)", still.sequence, still.len());

        let analyzer = Arc::clone(&self.analyzer);
        let generation = self.generation;
        let timeout = self.config.analyzer_timeout();
        self.in_flight.spawn(async move {
            let verdict = analyze_fail_open(analyzer.as_ref(), &still, timeout).await;
            SampleResult {
                generation,
                sequence: still.sequence,
                verdict,
            }
        });
    }

    fn camera_lost(&mut self) {
        error!("Camera stream ended while scanning");
        metrics::counter!("dms_camera_failures_total").increment(1);
        self.session.error = Some(CameraError::Disconnected.user_message());
        self.transition(DetectionState::Error);
    }

    fn cool_down(&mut self) {
        self.session.cooldown_remaining = self.session.cooldown_remaining.saturating_sub(1);
        if self.session.cooldown_remaining == 0 {
            self.transition(DetectionState::Scanning);
        } else {
            debug!("Resuming in {}s", self.session.cooldown_remaining);
        }
    }

    /// Move to `next`, setting up exactly the timers and resources it needs
    fn transition(&mut self, next: DetectionState) {
        let previous = self.session.state;
        self.generation = self.generation.wrapping_add(1);

        match next {
            DetectionState::Idle | DetectionState::Error => {
                self.schedule.disarm();
                self.alarm.stop();
                self.session.release_camera();
                self.session.cooldown_remaining = 0;
                if next == DetectionState::Idle {
                    self.session.error = None;
                }
            }
            DetectionState::Scanning => {
                self.alarm.stop();
                if previous == DetectionState::Alert {
                    self.session.last_verdict = None;
                }
                self.session.cooldown_remaining = 0;
                self.schedule.arm(TimerKind::Sampling, self.config.sample_interval());
            }
            DetectionState::Alert => {
                self.session.cooldown_remaining = self.config.cooldown_ticks();
                self.schedule.arm(TimerKind::Cooldown, COOLDOWN_TICK);
                metrics::counter!("dms_alerts_total").increment(1);
                self.alarm.start();
            }
        }

        self.session.state = next;
        info!("Monitor {} -> {}", previous.as_str(), next.as_str());
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }

    pub fn status(&self) -> MonitorStatus {
        let state = self.session.state;
        MonitorStatus {
            session_id: self.session.id,
            state,
            is_active: state.is_active(),
            last_verdict: self.session.last_verdict.clone(),
            cooldown_remaining: (state == DetectionState::Alert)
                .then_some(self.session.cooldown_remaining),
            error: self.session.error.clone(),
            started_at: self.session.started_at,
            alarm_playing: self.alarm.is_playing(),
        }
    }

    pub fn state(&self) -> DetectionState {
        self.session.state
    }

    pub fn is_active(&self) -> bool {
        self.session.state.is_active()
    }

    pub fn last_verdict(&self) -> Option<&AnalysisVerdict> {
        self.session.last_verdict.as_ref()
    }

    pub fn cooldown_remaining(&self) -> u32 {
        self.session.cooldown_remaining
    }

    pub fn armed_timer(&self) -> Option<TimerKind> {
        self.schedule.armed()
    }

    pub fn has_camera(&self) -> bool {
        self.session.has_camera()
    }

    pub fn alarm_playing(&self) -> bool {
        self.alarm.is_playing()
    }

    /// Analyzer calls not yet collected
    pub fn pending_samples(&self) -> usize {
        self.in_flight.len()
    }
}
