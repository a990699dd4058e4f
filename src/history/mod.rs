pub mod sqlite;

pub use sqlite::SqliteHistory;

use async_trait::async_trait;
use serde::Serialize;

use crate::device::DeviceState;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, HistoryError>;

/// One persisted sample. Never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Reading {
    /// Unix seconds of the exchange that produced the sample.
    #[sqlx(rename = "ts")]
    pub timestamp: i64,
    #[sqlx(rename = "temp")]
    pub temperature: Option<f64>,
    #[sqlx(rename = "hum")]
    pub humidity: Option<f64>,
    #[sqlx(rename = "heater")]
    pub heater_on: Option<i64>,
    #[sqlx(rename = "fan")]
    pub fan_on: Option<i64>,
}

impl Reading {
    /// Build a sample from a state that has been updated at least once.
    /// NaN sensor values become `None`.
    pub fn from_snapshot(state: &DeviceState) -> Option<Self> {
        let updated = state.last_updated_at?;
        Some(Self {
            timestamp: updated.timestamp(),
            temperature: state.temperature.filter(|v| !v.is_nan()),
            humidity: state.humidity.filter(|v| !v.is_nan()),
            heater_on: Some(state.heater_on as i64),
            fan_on: Some(state.fan_on as i64),
        })
    }
}

/// Append-only time series of readings.
///
/// Implementations must tolerate concurrent `append` and `query` calls;
/// a reader never observes a partially written row.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, reading: &Reading) -> Result<()>;

    /// Rows with `timestamp >= since`, ascending by timestamp, ties in
    /// insertion order.
    async fn query(&self, since: i64) -> Result<Vec<Reading>>;
}
