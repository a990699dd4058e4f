use std::env;
use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::device::ExchangeConfig;

/// Longest accepted poll interval. Staleness is derived from it, so it has
/// to stay well inside `Duration` arithmetic.
pub const MAX_POLL_INTERVAL_SECS: u64 = 86_400;
use crate::serial::SerialConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logger {
    pub level: String,
}

impl Default for Logger {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Serial {
    /// Tried in order; see `PortLocator`.
    pub port_globs: Vec<String>,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub settle_ms: u64,
    pub exchange_deadline_ms: u64,
    /// Talk to the built-in firmware emulation instead of a real port.
    pub simulate: bool,
}

impl Default for Serial {
    fn default() -> Self {
        Self {
            port_globs: vec!["/dev/ttyACM*".to_string(), "/dev/ttyUSB*".to_string()],
            baud_rate: crate::serial::interface::DEFAULT_BAUD_RATE,
            read_timeout_ms: 1500,
            settle_ms: 2000,
            exchange_deadline_ms: 2000,
            simulate: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerSettings {
    pub interval_secs: u64,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self { interval_secs: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Database {
    pub url: String,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            url: "sqlite://smarthome.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Api {
    /// Pause between consecutive setpoint writes of one request.
    pub setpoint_gap_ms: u64,
}

impl Default for Api {
    fn default() -> Self {
        Self { setpoint_gap_ms: 50 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: Server,
    pub logger: Logger,
    pub serial: Serial,
    pub poller: PollerSettings,
    pub database: Database,
    pub api: Api,
}

impl Settings {
    /// Defaults, then `config/default`, then `config/$RUN_MODE`, then
    /// `CLIMATE_*` environment variables (`CLIMATE_SERIAL__BAUD_RATE`).
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        Self::from_dir(Path::new("config"), &run_mode)
    }

    pub fn from_dir(dir: &Path, run_mode: &str) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::with_name(&dir.join("default").to_string_lossy()).required(false))
            .add_source(File::with_name(&dir.join(run_mode).to_string_lossy()).required(false))
            .add_source(
                Environment::with_prefix("CLIMATE")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("serial.port_globs")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.port_globs.is_empty() && !self.serial.simulate {
            return Err(ConfigError::Message("serial.port_globs must not be empty".into()));
        }
        if self.poller.interval_secs == 0 || self.poller.interval_secs > MAX_POLL_INTERVAL_SECS {
            return Err(ConfigError::Message(format!(
                "poller.interval_secs must be between 1 and {}",
                MAX_POLL_INTERVAL_SECS
            )));
        }
        if self.serial.read_timeout_ms == 0 {
            return Err(ConfigError::Message("serial.read_timeout_ms must be positive".into()));
        }
        if self.serial.exchange_deadline_ms == 0 {
            return Err(ConfigError::Message("serial.exchange_deadline_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn serial_config(&self) -> SerialConfig {
        SerialConfig {
            baud_rate: self.serial.baud_rate,
            read_timeout: Duration::from_millis(self.serial.read_timeout_ms),
            settle_delay: Duration::from_millis(self.serial.settle_ms),
        }
    }

    pub fn exchange_config(&self) -> ExchangeConfig {
        ExchangeConfig {
            deadline: Duration::from_millis(self.serial.exchange_deadline_ms),
            read_timeout: Duration::from_millis(self.serial.read_timeout_ms),
        }
    }

    /// Worst case for one exchange on a fresh port: settle delay plus the
    /// exchange deadline.
    pub fn exchange_budget(&self) -> Duration {
        Duration::from_millis(self.serial.settle_ms) + Duration::from_millis(self.serial.exchange_deadline_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poller.interval_secs)
    }

    pub fn setpoint_gap(&self) -> Duration {
        Duration::from_millis(self.api.setpoint_gap_ms)
    }
}
