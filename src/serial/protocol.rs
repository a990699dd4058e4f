use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use super::{Result, SerialError};

/// Prefix of the controller's status line.
pub const STATUS_MARKER: &str = "STATUS";

/// Controller operating mode.
///
/// The device may report a mode this crate does not know about; it is kept
/// verbatim in `Other` instead of being rejected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Auto,
    Manual,
    Other(String),
}

impl Mode {
    pub fn as_str(&self) -> &str {
        match self {
            Mode::Auto => "AUTO",
            Mode::Manual => "MANUAL",
            Mode::Other(s) => s,
        }
    }

    /// Lenient conversion used for device output: upper-cased, never fails.
    pub fn from_device(value: &str) -> Self {
        let upper = value.to_uppercase();
        match upper.as_str() {
            "AUTO" => Mode::Auto,
            "MANUAL" => Mode::Manual,
            _ => Mode::Other(upper),
        }
    }
}

/// Strict conversion used for caller input. Case-insensitive, but only the
/// two modes the firmware accepts.
impl FromStr for Mode {
    type Err = SerialError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "AUTO" => Ok(Mode::Auto),
            "MANUAL" => Ok(Mode::Manual),
            _ => Err(SerialError::InvalidCommand(format!("unknown mode '{}'", s))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Mode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Switchable outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Heater,
    Fan,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Heater => "heater",
            Device::Fan => "fan",
        }
    }
}

impl FromStr for Device {
    type Err = SerialError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "heater" => Ok(Device::Heater),
            "fan" => Ok(Device::Fan),
            _ => Err(SerialError::InvalidCommand(format!("unknown device '{}'", s))),
        }
    }
}

/// Hysteresis thresholds the controller uses in AUTO mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    TempOn,
    TempOff,
    HumOn,
    HumOff,
}

impl Threshold {
    pub const ALL: [Threshold; 4] = [
        Threshold::TempOn,
        Threshold::TempOff,
        Threshold::HumOn,
        Threshold::HumOff,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Threshold::TempOn => "temp_on",
            Threshold::TempOff => "temp_off",
            Threshold::HumOn => "hum_on",
            Threshold::HumOff => "hum_off",
        }
    }
}

impl FromStr for Threshold {
    type Err = SerialError;

    fn from_str(s: &str) -> Result<Self> {
        Threshold::ALL
            .iter()
            .copied()
            .find(|t| t.key() == s)
            .ok_or_else(|| SerialError::InvalidCommand(format!("unknown threshold '{}'", s)))
    }
}

/// A request to the controller. Every command is answered with a status line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Query,
    SetMode(Mode),
    SetDevice(Device, bool),
    SetThreshold(Threshold, f64),
}

impl Command {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Query => "GET",
            Command::SetMode(_) => "MODE",
            Command::SetDevice(..) => "SET",
            Command::SetThreshold(..) => "SETPT",
        }
    }

    /// Encode as a single protocol line, without the newline.
    ///
    /// Encoding is strict: only modes and values the firmware understands
    /// are ever put on the wire.
    pub fn encode(&self) -> Result<String> {
        match self {
            Command::Query => Ok("GET".to_string()),
            Command::SetMode(Mode::Other(m)) => {
                Err(SerialError::InvalidCommand(format!("unknown mode '{}'", m)))
            }
            Command::SetMode(mode) => Ok(format!("MODE,{}", mode)),
            Command::SetDevice(device, on) => {
                Ok(format!("SET,{},{}", device.as_str(), if *on { 1 } else { 0 }))
            }
            Command::SetThreshold(threshold, value) => {
                if !value.is_finite() {
                    return Err(SerialError::InvalidCommand(format!(
                        "{} must be a finite number, got {}",
                        threshold.key(),
                        value
                    )));
                }
                Ok(format!("SETPT,{},{}", threshold.key(), format_value(*value)))
            }
        }
    }
}

// Integral values keep one decimal so the firmware always sees a float.
fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Fields decoded from one status line. Absent keys stay `None` and leave
/// the cached value untouched when merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub heater_on: Option<bool>,
    pub fan_on: Option<bool>,
    pub mode: Option<Mode>,
    pub temp_on: Option<f64>,
    pub temp_off: Option<f64>,
    pub hum_on: Option<f64>,
    pub hum_off: Option<f64>,
}

/// Decode a `STATUS,k=v,...` line.
///
/// Returns `None` for lines that are not status lines and for status lines
/// with any malformed pair; a half-decoded status is never returned.
/// Unknown keys are ignored.
pub fn decode_status(line: &str) -> Option<StatusUpdate> {
    let payload = line.trim().strip_prefix(STATUS_MARKER)?.strip_prefix(',')?;

    let mut update = StatusUpdate::default();
    for pair in payload.split(',') {
        let (key, value) = pair.split_once('=')?;
        let value = value.trim();
        match key.trim() {
            "temp" => update.temperature = Some(parse_number(value)?),
            "hum" => update.humidity = Some(parse_number(value)?),
            "temp_on" => update.temp_on = Some(parse_number(value)?),
            "temp_off" => update.temp_off = Some(parse_number(value)?),
            "hum_on" => update.hum_on = Some(parse_number(value)?),
            "hum_off" => update.hum_off = Some(parse_number(value)?),
            "heater" => update.heater_on = Some(parse_switch(value)?),
            "fan" => update.fan_on = Some(parse_switch(value)?),
            "mode" => update.mode = Some(Mode::from_device(value)),
            _ => {}
        }
    }

    Some(update)
}

fn parse_number(value: &str) -> Option<f64> {
    if value.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    value.parse().ok()
}

fn parse_switch(value: &str) -> Option<bool> {
    value.parse::<i64>().ok().map(|v| v != 0)
}
