//! Monitor Routes

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dms::{Command, MonitorError, MonitorStatus};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use crate::AppState;

/// Errors surfaced to HTTP clients
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Monitor(#[from] MonitorError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Monitor(MonitorError::ChannelClosed) => StatusCode::SERVICE_UNAVAILABLE,
        };
        error!(error = %self, "monitor request failed");
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

/// Current monitor snapshot
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<MonitorStatus> {
    Json(state.monitor.status())
}

/// Begin monitoring; answers once the camera request has settled
pub async fn post_start(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MonitorStatus>, ApiError> {
    let status = state.monitor.send(Command::Start).await?;
    info!(state = status.state.as_str(), "start requested");
    Ok(Json(status))
}

/// Stop monitoring and release the camera
pub async fn post_stop(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MonitorStatus>, ApiError> {
    let status = state.monitor.send(Command::Stop).await?;
    info!(state = status.state.as_str(), "stop requested");
    Ok(Json(status))
}
