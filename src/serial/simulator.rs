//! In-process emulation of the climate controller firmware.
//!
//! Lets the service run end-to-end without hardware (`serial.simulate`) and
//! gives tests a device that answers like the real one.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::protocol::{Device, Mode, Threshold};
use super::{Result, Session, Transport};

pub const SIMULATED_PORT: &str = "sim://climate-one";

#[derive(Debug, Clone)]
struct Firmware {
    temperature: f64,
    humidity: f64,
    heater: bool,
    fan: bool,
    mode: Mode,
    temp_on: f64,
    temp_off: f64,
    hum_on: f64,
    hum_off: f64,
    sensor_ok: bool,
}

impl Default for Firmware {
    fn default() -> Self {
        Self {
            temperature: 21.0,
            humidity: 55.0,
            heater: false,
            fan: false,
            mode: Mode::Auto,
            temp_on: 20.0,
            temp_off: 24.0,
            hum_on: 60.0,
            hum_off: 60.0,
            sensor_ok: true,
        }
    }
}

impl Firmware {
    /// One control-loop step: drift the environment, then apply hysteresis.
    fn tick(&mut self) {
        self.temperature += if self.heater { 0.15 } else { -0.05 };
        self.humidity += if self.fan { -0.4 } else { 0.2 };
        self.humidity = self.humidity.clamp(0.0, 100.0);

        if self.mode == Mode::Auto {
            if self.temperature < self.temp_on {
                self.heater = true;
            } else if self.temperature > self.temp_off {
                self.heater = false;
            }
            if self.humidity > self.hum_on {
                self.fan = true;
            } else if self.humidity < self.hum_off {
                self.fan = false;
            }
        }
    }

    fn handle(&mut self, line: &str) -> std::result::Result<(), &'static str> {
        let parts: Vec<&str> = line.trim().split(',').collect();
        match parts.as_slice() {
            ["GET"] => {
                self.tick();
                Ok(())
            }
            ["MODE", mode] => match mode.parse::<Mode>() {
                Ok(mode) => {
                    self.mode = mode;
                    Ok(())
                }
                Err(_) => Err("bad mode"),
            },
            ["SET", device, state] => {
                let device = device.parse::<Device>().map_err(|_| "bad device")?;
                let on = match *state {
                    "1" => true,
                    "0" => false,
                    _ => return Err("bad state"),
                };
                match device {
                    Device::Heater => self.heater = on,
                    Device::Fan => self.fan = on,
                }
                Ok(())
            }
            ["SETPT", name, value] => {
                let threshold = name.parse::<Threshold>().map_err(|_| "bad setpoint")?;
                let value: f64 = value.parse().map_err(|_| "bad value")?;
                match threshold {
                    Threshold::TempOn => self.temp_on = value,
                    Threshold::TempOff => self.temp_off = value,
                    Threshold::HumOn => self.hum_on = value,
                    Threshold::HumOff => self.hum_off = value,
                }
                Ok(())
            }
            _ => Err("unknown command"),
        }
    }

    fn status_line(&self) -> String {
        let (temp, hum) = if self.sensor_ok {
            (format!("{:.2}", self.temperature), format!("{:.2}", self.humidity))
        } else {
            ("nan".to_string(), "nan".to_string())
        };
        format!(
            "STATUS,temp={},hum={},heater={},fan={},mode={},temp_on={:.1},temp_off={:.1},hum_on={:.1},hum_off={:.1}",
            temp,
            hum,
            self.heater as u8,
            self.fan as u8,
            self.mode,
            self.temp_on,
            self.temp_off,
            self.hum_on,
            self.hum_off,
        )
    }
}

/// Transport backed by the emulated firmware. The firmware state outlives
/// individual sessions, as a real device does across reconnects.
#[derive(Clone, Default)]
pub struct SimulatedTransport {
    firmware: Arc<Mutex<Firmware>>,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the emulated sensor report `nan`, as the firmware does when the
    /// DHT read fails.
    pub fn set_sensor_ok(&self, ok: bool) {
        lock(&self.firmware).sensor_ok = ok;
    }
}

impl Transport for SimulatedTransport {
    fn open(&mut self) -> Result<Box<dyn Session>> {
        log::info!("Opened simulated controller on {}", SIMULATED_PORT);
        Ok(Box::new(SimulatedSession {
            firmware: self.firmware.clone(),
            outbox: VecDeque::new(),
        }))
    }
}

struct SimulatedSession {
    firmware: Arc<Mutex<Firmware>>,
    outbox: VecDeque<String>,
}

impl Session for SimulatedSession {
    fn port_name(&self) -> &str {
        SIMULATED_PORT
    }

    fn clear_input(&mut self) -> Result<()> {
        self.outbox.clear();
        Ok(())
    }

    fn write_line(&mut self, text: &str) -> Result<()> {
        let mut firmware = lock(&self.firmware);
        self.outbox.push_back(format!("DBG,rx={}", text));
        match firmware.handle(text) {
            Ok(()) => self.outbox.push_back(firmware.status_line()),
            Err(reason) => self.outbox.push_back(format!("ERR,{}", reason)),
        }
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>> {
        match self.outbox.pop_front() {
            Some(line) => Ok(Some(line)),
            None => {
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }

    fn close(self: Box<Self>) {}
}

fn lock(firmware: &Mutex<Firmware>) -> MutexGuard<'_, Firmware> {
    firmware.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::protocol::decode_status;

    fn exchange(session: &mut Box<dyn Session>, command: &str) -> Vec<String> {
        session.write_line(command).unwrap();
        let mut lines = Vec::new();
        while let Some(line) = session.read_line(Duration::from_millis(1)).unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_answers_with_diagnostic_then_status() {
        let mut transport = SimulatedTransport::new();
        let mut session = transport.open().unwrap();

        let lines = exchange(&mut session, "GET");
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("DBG,"));
        assert!(decode_status(&lines[0]).is_none());
        let status = decode_status(&lines[1]).unwrap();
        assert_eq!(status.mode, Some(Mode::Auto));
        assert_eq!(status.temp_on, Some(20.0));
    }

    #[test]
    fn test_manual_switching() {
        let mut transport = SimulatedTransport::new();
        let mut session = transport.open().unwrap();

        exchange(&mut session, "MODE,MANUAL");
        let lines = exchange(&mut session, "SET,fan,1");
        let status = decode_status(lines.last().unwrap()).unwrap();
        assert_eq!(status.mode, Some(Mode::Manual));
        assert_eq!(status.fan_on, Some(true));

        let lines = exchange(&mut session, "SETPT,hum_on,70.0");
        let status = decode_status(lines.last().unwrap()).unwrap();
        assert_eq!(status.hum_on, Some(70.0));
    }

    #[test]
    fn test_rejects_unknown_command_without_status() {
        let mut transport = SimulatedTransport::new();
        let mut session = transport.open().unwrap();

        let lines = exchange(&mut session, "REBOOT");
        assert_eq!(lines.last().map(String::as_str), Some("ERR,unknown command"));
        assert!(lines.iter().all(|l| decode_status(l).is_none()));
    }

    #[test]
    fn test_auto_mode_heats_when_cold() {
        let mut transport = SimulatedTransport::new();
        let mut session = transport.open().unwrap();

        exchange(&mut session, "SETPT,temp_on,30.0");
        exchange(&mut session, "SETPT,temp_off,32.0");
        let lines = exchange(&mut session, "GET");
        let status = decode_status(lines.last().unwrap()).unwrap();
        assert_eq!(status.heater_on, Some(true));
    }

    #[test]
    fn test_state_survives_reconnect() {
        let mut transport = SimulatedTransport::new();
        let mut session = transport.open().unwrap();
        exchange(&mut session, "MODE,MANUAL");
        session.close();

        let mut session = transport.open().unwrap();
        let lines = exchange(&mut session, "GET");
        let status = decode_status(lines.last().unwrap()).unwrap();
        assert_eq!(status.mode, Some(Mode::Manual));
    }

    #[test]
    fn test_sensor_failure_reports_nan() {
        let mut transport = SimulatedTransport::new();
        transport.set_sensor_ok(false);
        let mut session = transport.open().unwrap();

        let lines = exchange(&mut session, "GET");
        let status = decode_status(lines.last().unwrap()).unwrap();
        assert!(status.temperature.unwrap().is_nan());
        assert!(status.humidity.unwrap().is_nan());
    }
}
