pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::device::{DeviceError, DeviceManager};
use crate::history::HistoryError;

pub use handlers::*;

#[derive(Clone)]
pub struct ApiState {
    pub device_manager: Arc<DeviceManager>,
    pub setpoint_gap: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Device(#[from] DeviceError),

    #[error("{0}")]
    Storage(#[from] HistoryError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Device(DeviceError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Device(DeviceError::InvalidCommand(_)) => StatusCode::BAD_REQUEST,
            ApiError::Device(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::warn!("API request failed: {}", self);
        }
        (status, Json(json!({ "ok": false, "error": self.to_string() }))).into_response()
    }
}

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/mode/:mode", post(set_mode))
        .route("/api/set/:device/:state", post(set_device))
        .route("/api/setpoints", post(set_setpoints))
        .route("/api/history", get(get_history))
        .with_state(state)
}
