use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{ApiError, ApiState};
use crate::device::{Command, Device, DeviceState, Mode, Threshold};

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub minutes: Option<f64>,
}

fn flag(on: bool) -> u8 {
    on as u8
}

fn actuator_summary(state: &DeviceState) -> Value {
    json!({
        "ok": true,
        "mode": state.mode,
        "heater": flag(state.heater_on),
        "fan": flag(state.fan_on),
        "temp": state.temperature,
        "hum": state.humidity,
    })
}

pub async fn get_status(State(state): State<ApiState>) -> Json<Value> {
    let manager = &state.device_manager;
    let snapshot = manager.ensure_fresh(manager.stale_after()).await;

    let updated = snapshot
        .last_updated_at
        .map(|at| at.timestamp_millis() as f64 / 1000.0);

    Json(json!({
        "ok": true,
        "temp": snapshot.temperature,
        "hum": snapshot.humidity,
        "heater": flag(snapshot.heater_on),
        "fan": flag(snapshot.fan_on),
        "mode": snapshot.mode,
        "temp_on": snapshot.temp_on,
        "temp_off": snapshot.temp_off,
        "hum_on": snapshot.hum_on,
        "hum_off": snapshot.hum_off,
        "updated": updated,
        "port": snapshot.active_port,
    }))
}

pub async fn set_mode(
    Path(mode): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<Value>, ApiError> {
    let mode: Mode = mode
        .parse()
        .map_err(|_| ApiError::BadRequest("bad mode".to_string()))?;

    let updated = state.device_manager.issue(Command::SetMode(mode)).await?;
    Ok(Json(actuator_summary(&updated)))
}

pub async fn set_device(
    Path((device, requested)): Path<(String, String)>,
    State(state): State<ApiState>,
) -> Result<Json<Value>, ApiError> {
    let device: Device = device
        .parse()
        .map_err(|_| ApiError::BadRequest("bad device".to_string()))?;
    let on = requested == "1";

    let updated = state.device_manager.issue(Command::SetDevice(device, on)).await?;
    Ok(Json(actuator_summary(&updated)))
}

/// Writes each threshold present in the body, then re-reads the controller.
/// A failed write does not stop the remaining ones; it only clears `ok`.
pub async fn set_setpoints(State(state): State<ApiState>, body: Bytes) -> Json<Value> {
    let fields: Map<String, Value> = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default();

    let manager = &state.device_manager;
    let mut all_written = true;

    for threshold in Threshold::ALL {
        let Some(value) = fields.get(threshold.key()).and_then(Value::as_f64) else {
            continue;
        };
        if let Err(e) = manager.issue(Command::SetThreshold(threshold, value)).await {
            log::warn!("Setting {} to {} failed: {}", threshold.key(), value, e);
            all_written = false;
        }
        tokio::time::sleep(state.setpoint_gap).await;
    }

    match manager.issue(Command::Query).await {
        Ok(current) => Json(json!({
            "ok": all_written,
            "temp_on": current.temp_on,
            "temp_off": current.temp_off,
            "hum_on": current.hum_on,
            "hum_off": current.hum_off,
        })),
        Err(e) => {
            log::warn!("Read-back after setpoint update failed: {}", e);
            Json(json!({ "ok": false }))
        }
    }
}

pub async fn get_history(
    Query(query): Query<HistoryQuery>,
    State(state): State<ApiState>,
) -> Result<Json<Value>, ApiError> {
    let minutes = query.minutes.unwrap_or(60.0);
    if !minutes.is_finite() {
        return Err(ApiError::BadRequest("bad minutes".to_string()));
    }
    let since = (Utc::now().timestamp() as f64 - minutes * 60.0) as i64;

    let rows = state.device_manager.history(since).await?;

    let mut ts = Vec::with_capacity(rows.len());
    let mut temp = Vec::with_capacity(rows.len());
    let mut hum = Vec::with_capacity(rows.len());
    let mut heater = Vec::with_capacity(rows.len());
    let mut fan = Vec::with_capacity(rows.len());
    for row in rows {
        ts.push(row.timestamp);
        temp.push(row.temperature);
        hum.push(row.humidity);
        heater.push(row.heater_on);
        fan.push(row.fan_on);
    }

    Ok(Json(json!({
        "ts": ts,
        "temp": temp,
        "hum": hum,
        "heater": heater,
        "fan": fan,
    })))
}
