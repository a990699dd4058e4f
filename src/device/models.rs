use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

// Re-export serial protocol models
pub use crate::serial::protocol::{Command, Device, Mode, StatusUpdate, Threshold};

/// Latest known controller state.
///
/// Fields missing from a status line keep their previous value; everything
/// that arrived in one exchange becomes visible together with
/// `last_updated_at`.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceState {
    /// May be NaN when the controller's sensor read failed.
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub heater_on: bool,
    pub fan_on: bool,
    pub mode: Mode,
    pub temp_on: f64,
    pub temp_off: f64,
    pub hum_on: f64,
    pub hum_off: f64,
    pub active_port: Option<String>,
    pub last_raw_line: String,
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            temperature: None,
            humidity: None,
            heater_on: false,
            fan_on: false,
            mode: Mode::Auto,
            temp_on: 20.0,
            temp_off: 24.0,
            hum_on: 60.0,
            hum_off: 60.0,
            active_port: None,
            last_raw_line: String::new(),
            last_updated_at: None,
        }
    }
}

impl DeviceState {
    /// Apply one decoded status line.
    pub fn apply(&mut self, update: &StatusUpdate, raw_line: &str, port: &str, at: DateTime<Utc>) {
        if let Some(v) = update.temperature {
            self.temperature = Some(v);
        }
        if let Some(v) = update.humidity {
            self.humidity = Some(v);
        }
        if let Some(v) = update.heater_on {
            self.heater_on = v;
        }
        if let Some(v) = update.fan_on {
            self.fan_on = v;
        }
        if let Some(v) = &update.mode {
            self.mode = v.clone();
        }
        if let Some(v) = update.temp_on {
            self.temp_on = v;
        }
        if let Some(v) = update.temp_off {
            self.temp_off = v;
        }
        if let Some(v) = update.hum_on {
            self.hum_on = v;
        }
        if let Some(v) = update.hum_off {
            self.hum_off = v;
        }
        self.active_port = Some(port.to_string());
        self.last_raw_line = raw_line.to_string();
        self.last_updated_at = Some(at);
    }

    /// True when the state was never updated or is older than `max_age`.
    pub fn is_stale(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        match self.last_updated_at {
            None => true,
            Some(updated) => match (now - updated).to_std() {
                Ok(age) => age > max_age,
                // Updated "in the future" (clock step); treat as fresh.
                Err(_) => false,
            },
        }
    }
}
