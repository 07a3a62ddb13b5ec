//! Sentinel Driver Monitor
//!
//! Wires the camera, analyzer and alarm into a running monitor and exposes
//! it over a small HTTP control surface.

use alerting::{AlarmEmitter, AudioOutput};
use anyhow::{bail, Context};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use camera_capture::{CameraSource, StillFileCamera, SyntheticCamera};
use dms::{GeminiAnalyzer, Monitor, MonitorHandle};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod routes;
pub mod settings;

pub use settings::{AudioSettings, CameraSourceKind, LogSettings, Settings};

/// Application state shared across handlers
pub struct AppState {
    pub monitor: MonitorHandle,
    /// Absent when no recorder is installed
    pub metrics: Option<PrometheusHandle>,
    pub version: String,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(monitor: MonitorHandle, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            monitor,
            metrics,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub monitor_state: String,
    pub alarm_playing: bool,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/monitor", get(routes::monitor::get_status))
        .route("/api/v1/monitor/start", post(routes::monitor::post_start))
        .route("/api/v1/monitor/stop", post(routes::monitor::post_stop))
        .route("/metrics", get(routes::metrics::get_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let status = state.monitor.status();

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        monitor_state: status.state.as_str().to_string(),
        alarm_playing: status.alarm_playing,
    })
}

/// Initialize logging. `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(settings: &LogSettings) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .context("Invalid log level")?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if settings.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {e}"))
}

#[cfg(feature = "camera")]
fn device_camera(index: i32) -> anyhow::Result<Box<dyn CameraSource>> {
    Ok(Box::new(camera_capture::DeviceCamera::new(index)))
}

#[cfg(not(feature = "camera"))]
fn device_camera(_index: i32) -> anyhow::Result<Box<dyn CameraSource>> {
    bail!("camera.source = \"device\" needs a build with the `camera` feature")
}

fn camera_source(settings: &Settings) -> anyhow::Result<Box<dyn CameraSource>> {
    match settings.camera.source {
        CameraSourceKind::Device => device_camera(settings.camera.index),
        CameraSourceKind::Synthetic => Ok(Box::new(SyntheticCamera::new())),
        CameraSourceKind::File => match &settings.camera.path {
            Some(path) => Ok(Box::new(StillFileCamera::new(path.clone()))),
            None => bail!("camera.source = \"file\" requires camera.path"),
        },
    }
}

#[cfg(feature = "audio")]
fn audio_output(settings: &AudioSettings) -> Box<dyn AudioOutput> {
    use alerting::{DeviceOutput, SilentOutput};

    if !settings.enabled {
        return Box::new(SilentOutput);
    }
    match &settings.device {
        Some(name) => Box::new(DeviceOutput::named(name.clone())),
        None => Box::new(DeviceOutput::default_device()),
    }
}

#[cfg(not(feature = "audio"))]
fn audio_output(settings: &AudioSettings) -> Box<dyn AudioOutput> {
    if settings.enabled {
        warn!("Built without the `audio` feature, alarm will be silent");
    }
    Box::new(alerting::SilentOutput)
}

/// Assemble a monitor from settings; nothing is acquired until it is started
pub fn build_monitor(settings: &Settings) -> anyhow::Result<Monitor> {
    let camera = camera_source(settings)?;
    let analyzer = GeminiAnalyzer::new(&settings.analyzer)
        .context("Set SENTINEL__ANALYZER__API_KEY or GEMINI_API_KEY")?;
    let alarm = AlarmEmitter::new(audio_output(&settings.audio));

    Ok(Monitor::new(
        settings.monitor.clone(),
        camera,
        Arc::new(analyzer),
        alarm,
    ))
}

/// Run the monitor and HTTP server until Ctrl-C
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install metrics recorder")?;
    let (monitor, task) = build_monitor(&settings)?.spawn();

    let state = Arc::new(AppState::new(monitor.clone(), Some(metrics)));
    let app = create_router(state);

    info!("Starting API server on {}", settings.server.bind);

    let listener = tokio::net::TcpListener::bind(&settings.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", settings.server.bind))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, releasing camera");
    if let Err(e) = monitor.shutdown().await {
        warn!(error = %e, "Monitor already stopped");
    }
    task.await.context("Monitor task failed")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use camera_capture::JpegStill;
    use dms::{AnalysisVerdict, AnalyzerError, FrameAnalyzer, MonitorConfig};
    use serde_json::Value;
    use tower::ServiceExt;

    struct Attentive;

    #[async_trait]
    impl FrameAnalyzer for Attentive {
        async fn analyze(&self, _still: &JpegStill) -> Result<AnalysisVerdict, AnalyzerError> {
            Ok(AnalysisVerdict {
                is_drowsy: false,
                reason: "Driver attentive".to_string(),
                confidence: 0.9,
                detected_signs: vec![],
            })
        }
    }

    fn test_state(camera: SyntheticCamera) -> (Arc<AppState>, MonitorHandle) {
        let (monitor, _task) = Monitor::new(
            MonitorConfig::default(),
            Box::new(camera),
            Arc::new(Attentive),
            AlarmEmitter::silent(),
        )
        .spawn();
        (Arc::new(AppState::new(monitor.clone(), None)), monitor)
    }

    async fn call(state: &Arc<AppState>, method: Method, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _monitor) = test_state(SyntheticCamera::new());
        let (status, body) = call(&state, Method::GET, "/api/v1/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["monitor_state"], "idle");
        assert_eq!(body["alarm_playing"], false);
    }

    #[tokio::test]
    async fn test_start_then_stop() {
        let (state, _monitor) = test_state(SyntheticCamera::new());

        let (status, body) = call(&state, Method::POST, "/api/v1/monitor/start").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "scanning");
        assert_eq!(body["is_active"], true);
        assert!(body["session_id"].is_string());

        let (_, body) = call(&state, Method::GET, "/api/v1/monitor").await;
        assert_eq!(body["state"], "scanning");

        let (status, body) = call(&state, Method::POST, "/api/v1/monitor/stop").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "idle");
        assert_eq!(body["is_active"], false);
    }

    #[tokio::test]
    async fn test_denied_camera_reports_error_state() {
        let (state, _monitor) = test_state(SyntheticCamera::denied());

        let (status, body) = call(&state, Method::POST, "/api/v1/monitor/start").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "error");
        assert_eq!(
            body["error"],
            "Could not access camera. Please allow permissions."
        );
    }

    #[tokio::test]
    async fn test_commands_after_shutdown_are_unavailable() {
        let (state, monitor) = test_state(SyntheticCamera::new());
        monitor.shutdown().await.unwrap();

        let (status, body) = call(&state, Method::POST, "/api/v1/monitor/start").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let (state, _monitor) = test_state(SyntheticCamera::new());
        let request = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let response = create_router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_file_camera_requires_path() {
        let mut settings = Settings::default();
        settings.camera.source = CameraSourceKind::File;
        settings.analyzer.api_key = Some("test-key".to_string());
        assert!(build_monitor(&settings).is_err());
    }

    #[cfg(not(feature = "camera"))]
    #[test]
    fn test_device_camera_needs_camera_feature() {
        let mut settings = Settings::default();
        settings.camera.source = CameraSourceKind::Device;
        settings.analyzer.api_key = Some("test-key".to_string());
        let err = build_monitor(&settings).err().unwrap();
        assert!(err.to_string().contains("`camera` feature"));
    }

    #[test]
    fn test_missing_api_key_fails_setup() {
        let mut settings = Settings::default();
        settings.audio.enabled = false;
        let err = build_monitor(&settings).err().unwrap();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_build_with_key() {
        let mut settings = Settings::default();
        settings.audio.enabled = false;
        settings.analyzer.api_key = Some("test-key".to_string());
        assert!(build_monitor(&settings).is_ok());
    }
}
