mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::Value;
use tower::ServiceExt;

use climate_one_lib::api::{create_router, ApiState};
use climate_one_lib::device::{CommandChannel, DeviceManager, StateCache};
use climate_one_lib::history::{HistoryStore, Reading, SqliteHistory};
use climate_one_lib::serial::{SimulatedTransport, Transport};

use common::{fast_exchange, ScriptedTransport};

async fn app_with(transport: Box<dyn Transport>) -> (Router, Arc<DeviceManager>) {
    let history: Arc<dyn HistoryStore> = Arc::new(SqliteHistory::open("sqlite::memory:").await.unwrap());
    let cache = StateCache::new();
    let channel = CommandChannel::spawn(transport, cache.clone(), fast_exchange()).unwrap();
    let manager = Arc::new(DeviceManager::new(channel, cache, history, Duration::from_secs(10)));

    let router = create_router(ApiState {
        device_manager: manager.clone(),
        setpoint_gap: Duration::from_millis(1),
    });
    (router, manager)
}

async fn simulated_app() -> (Router, Arc<DeviceManager>) {
    app_with(Box::new(SimulatedTransport::new())).await
}

async fn send(app: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_status_refreshes_stale_state() {
    let (app, manager) = simulated_app().await;
    assert!(manager.get_snapshot().last_updated_at.is_none());

    let (status, body) = send(&app, "GET", "/api/status", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["mode"], "AUTO");
    assert_eq!(body["port"], "sim://climate-one");
    assert!(body["temp"].is_number());
    assert!(body["updated"].is_f64());
    assert_eq!(body["temp_off"], 24.0);
}

#[tokio::test]
async fn test_status_without_device_reports_cached_state() {
    let transport = ScriptedTransport::new();
    transport.script().fail_opens = usize::MAX;
    let (app, _manager) = app_with(Box::new(transport)).await;

    let (status, body) = send(&app, "GET", "/api/status", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert!(body["temp"].is_null());
    assert!(body["updated"].is_null());
    assert!(body["port"].is_null());
}

#[tokio::test]
async fn test_mode_and_device_switching() {
    let (app, manager) = simulated_app().await;

    let (status, body) = send(&app, "POST", "/api/mode/manual", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["mode"], "MANUAL");

    let (status, body) = send(&app, "POST", "/api/set/HEATER/1", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["heater"], 1);

    let (_, body) = send(&app, "POST", "/api/set/heater/yes", "").await;
    assert_eq!(body["heater"], 0);
    assert!(!manager.get_snapshot().heater_on);
}

#[tokio::test]
async fn test_bad_path_parameters_are_rejected() {
    let (app, _manager) = simulated_app().await;

    let (status, body) = send(&app, "POST", "/api/mode/turbo", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "bad mode");

    let (status, body) = send(&app, "POST", "/api/set/lamp/1", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad device");
}

#[tokio::test]
async fn test_write_to_unreachable_device_is_unavailable() {
    let transport = ScriptedTransport::new();
    transport.script().fail_opens = usize::MAX;
    let (app, _manager) = app_with(Box::new(transport)).await;

    let (status, body) = send(&app, "POST", "/api/mode/auto", "").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ok"], false);
    assert!(body["error"].as_str().unwrap().contains("unreachable"));
}

#[tokio::test]
async fn test_setpoints_write_numeric_fields() {
    let (app, _manager) = simulated_app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/setpoints",
        r#"{"temp_on": 18.5, "temp_off": 22, "hum_off": "high", "extra": 1}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["temp_on"], 18.5);
    assert_eq!(body["temp_off"], 22.0);
    assert_eq!(body["hum_off"], 60.0);
}

#[tokio::test]
async fn test_setpoints_with_malformed_body_only_reads_back() {
    let transport = ScriptedTransport::new();
    transport.push_line("STATUS,temp_on=19.0,temp_off=23.0,hum_on=55.0,hum_off=50.0");
    let (app, _manager) = app_with(Box::new(transport.clone())).await;

    let (status, body) = send(&app, "POST", "/api/setpoints", "{not json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["hum_off"], 50.0);
    assert_eq!(transport.script().written, vec!["GET"]);
}

#[tokio::test]
async fn test_setpoints_continue_after_failed_write() {
    let transport = ScriptedTransport::new();
    transport.push_io_error();
    transport.push_line("STATUS,temp_off=25.0");
    transport.push_line("STATUS,temp_on=20.0,temp_off=25.0,hum_on=60.0,hum_off=60.0");
    let (app, _manager) = app_with(Box::new(transport.clone())).await;

    let (status, body) = send(&app, "POST", "/api/setpoints", r#"{"temp_on": 17, "temp_off": 25}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], false);
    assert_eq!(body["temp_off"], 25.0);
    assert_eq!(
        transport.script().written,
        vec!["SETPT,temp_on,17.0", "SETPT,temp_off,25.0", "GET"]
    );
}

#[tokio::test]
async fn test_history_window() {
    let (app, manager) = simulated_app().await;
    let store = manager.history_store();
    let now = Utc::now().timestamp();

    for (ts, temp) in [(now - 7200, Some(18.0)), (now - 600, None), (now - 60, Some(21.5))] {
        store
            .append(&Reading {
                timestamp: ts,
                temperature: temp,
                humidity: Some(50.0),
                heater_on: Some(1),
                fan_on: Some(0),
            })
            .await
            .unwrap();
    }

    let (status, body) = send(&app, "GET", "/api/history", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ts"], serde_json::json!([now - 600, now - 60]));
    assert_eq!(body["temp"], serde_json::json!([null, 21.5]));
    assert_eq!(body["heater"], serde_json::json!([1, 1]));

    let (_, body) = send(&app, "GET", "/api/history?minutes=180", "").await;
    assert_eq!(body["ts"].as_array().unwrap().len(), 3);
}
