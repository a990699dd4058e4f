use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, SerialPort};

use super::{PortLocator, Result, SerialError, Session, Transport};

pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Longest line kept while waiting for a newline. Anything beyond is noise.
const MAX_LINE_BYTES: usize = 4096;

#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baud_rate: u32,
    /// Upper bound for a single `read_line` call.
    pub read_timeout: Duration,
    /// The controller resets when the port opens; give it time to boot.
    pub settle_delay: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(1500),
            settle_delay: Duration::from_millis(2000),
        }
    }
}

/// Hardware transport: locates the port, opens it and waits for the
/// controller to come out of reset.
pub struct SerialInterface {
    locator: PortLocator,
    config: SerialConfig,
}

impl SerialInterface {
    pub fn new(locator: PortLocator, config: SerialConfig) -> Self {
        Self { locator, config }
    }
}

impl Transport for SerialInterface {
    fn open(&mut self) -> Result<Box<dyn Session>> {
        let port_name = self.locator.find_port().ok_or(SerialError::NoPortFound)?;

        let port = serialport::new(&port_name, self.config.baud_rate)
            .timeout(self.config.read_timeout)
            .open()
            .map_err(|e| SerialError::OpenFailed(format!("{}: {}", port_name, e)))?;

        log::info!("Opened {} at {} baud", port_name, self.config.baud_rate);
        std::thread::sleep(self.config.settle_delay);

        Ok(Box::new(SerialSession {
            port,
            port_name,
            read_timeout: self.config.read_timeout,
            lines: LineBuffer::default(),
        }))
    }
}

/// Reassembles newline-terminated lines from arbitrary read chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append received bytes. If no newline has arrived within
    /// `MAX_LINE_BYTES`, the partial line is dropped and its length returned.
    pub fn push(&mut self, bytes: &[u8]) -> Option<usize> {
        self.pending.extend_from_slice(bytes);
        if self.pending.len() > MAX_LINE_BYTES && !self.pending.contains(&b'\n') {
            let dropped = self.pending.len();
            self.pending.clear();
            return Some(dropped);
        }
        None
    }

    /// Next complete line, trimmed, with invalid UTF-8 replaced.
    pub fn take_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&raw).trim().to_string())
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

pub struct SerialSession {
    port: Box<dyn SerialPort>,
    port_name: String,
    read_timeout: Duration,
    lines: LineBuffer,
}

impl Session for SerialSession {
    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn clear_input(&mut self) -> Result<()> {
        self.lines.clear();
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn write_line(&mut self, text: &str) -> Result<()> {
        let line = format!("{}\n", text);
        self.port.write_all(line.as_bytes())?;
        self.port.flush()?;
        log::debug!("[{}] -> {}", self.port_name, text);
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>> {
        if let Some(line) = self.lines.take_line() {
            return Ok(Some(line));
        }

        let timeout = timeout.min(self.read_timeout);
        let started = Instant::now();
        let mut buffer = [0u8; 256];

        loop {
            let remaining = match timeout.checked_sub(started.elapsed()) {
                Some(r) if !r.is_zero() => r,
                _ => return Ok(None),
            };
            self.port.set_timeout(remaining)?;

            match self.port.read(&mut buffer) {
                Ok(0) => {}
                Ok(n) => {
                    if let Some(dropped) = self.lines.push(&buffer[..n]) {
                        log::warn!("[{}] dropping {} bytes without newline", self.port_name, dropped);
                    }
                    if let Some(line) = self.lines.take_line() {
                        log::debug!("[{}] <- {}", self.port_name, line);
                        return Ok(Some(line));
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::TimedOut => return Ok(None),
                Err(e) => return Err(SerialError::IoError(e)),
            }
        }
    }

    fn close(self: Box<Self>) {
        log::info!("Closing {}", self.port_name);
        // The OS handle is released on drop; nothing here can fail loudly.
        drop(self);
    }
}
