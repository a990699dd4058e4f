//! Single owner of the serial link.
//!
//! Every device interaction is queued to one worker thread that owns the
//! open session, so at most one request/response exchange is ever in flight.
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};

use super::models::{Command, DeviceState};
use super::state::StateCache;
use super::{DeviceError, Result};
use crate::serial::protocol::{decode_status, StatusUpdate};
use crate::serial::{SerialError, Session, Transport};

const COMMAND_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Wall-clock budget for write + read-until-status.
    pub deadline: Duration,
    /// Longest single read inside an exchange.
    pub read_timeout: Duration,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(2),
            read_timeout: Duration::from_millis(1500),
        }
    }
}

struct Request {
    command: Command,
    responder: oneshot::Sender<Result<DeviceState>>,
}

/// Cloneable handle to the serial worker.
#[derive(Clone)]
pub struct CommandChannel {
    cmd_tx: mpsc::Sender<Request>,
}

impl CommandChannel {
    /// Start the worker. It runs until every handle has been dropped, then
    /// closes the session.
    pub fn spawn(
        transport: Box<dyn Transport>,
        cache: StateCache,
        config: ExchangeConfig,
    ) -> std::io::Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);
        let worker = Worker {
            transport,
            session: None,
            cache,
            config,
        };

        std::thread::Builder::new()
            .name("serial-worker".to_string())
            .spawn(move || worker.run(cmd_rx))?;

        Ok(Self { cmd_tx })
    }

    /// Run one exchange and return the merged state it produced.
    pub async fn execute(&self, command: Command) -> Result<DeviceState> {
        let (responder, rx) = oneshot::channel();
        self.cmd_tx
            .send(Request { command, responder })
            .await
            .map_err(|_| DeviceError::ChannelClosed)?;
        rx.await.map_err(|_| DeviceError::ChannelClosed)?
    }
}

struct Worker {
    transport: Box<dyn Transport>,
    session: Option<Box<dyn Session>>,
    cache: StateCache,
    config: ExchangeConfig,
}

impl Worker {
    fn run(mut self, mut cmd_rx: mpsc::Receiver<Request>) {
        while let Some(Request { command, responder }) = cmd_rx.blocking_recv() {
            let result = self.exchange(&command);
            if let Err(e) = &result {
                log::debug!("{} failed: {}", command.name(), e);
            }
            let _ = responder.send(result);
        }

        if let Some(session) = self.session.take() {
            session.close();
        }
        log::info!("Serial worker stopped");
    }

    fn exchange(&mut self, command: &Command) -> Result<DeviceState> {
        let line = command
            .encode()
            .map_err(|e| DeviceError::InvalidCommand(e.to_string()))?;

        let mut session = match self.session.take() {
            Some(session) => session,
            None => {
                let session = self.transport.open().map_err(|e| {
                    log::warn!("Cannot open controller port: {}", e);
                    DeviceError::Unreachable(e)
                })?;
                self.cache.set_active_port(session.port_name());
                session
            }
        };

        match converse(session.as_mut(), &line, &self.config) {
            Ok(Some((raw, update))) => {
                let merged = self
                    .cache
                    .merge(&update, &raw, session.port_name(), Utc::now());
                self.session = Some(session);
                Ok(merged)
            }
            Ok(None) => {
                // Silence is not a link fault; keep the session.
                log::warn!(
                    "No status from {} within {:?} after {}",
                    session.port_name(),
                    self.config.deadline,
                    command.name()
                );
                self.session = Some(session);
                Err(DeviceError::NoResponse(self.config.deadline))
            }
            Err(e) => {
                log::warn!("Discarding session on {}: {}", session.port_name(), e);
                session.close();
                Err(DeviceError::Io(e))
            }
        }
    }
}

/// Write `line` and read until a status line decodes or the deadline passes.
fn converse(
    session: &mut dyn Session,
    line: &str,
    config: &ExchangeConfig,
) -> std::result::Result<Option<(String, StatusUpdate)>, SerialError> {
    session.clear_input()?;
    session.write_line(line)?;

    let started = Instant::now();
    loop {
        let remaining = match config.deadline.checked_sub(started.elapsed()) {
            Some(r) if !r.is_zero() => r,
            _ => return Ok(None),
        };

        match session.read_line(remaining.min(config.read_timeout))? {
            None => continue,
            Some(raw) if raw.is_empty() => continue,
            Some(raw) => match decode_status(&raw) {
                Some(update) => return Ok(Some((raw, update))),
                None => log::debug!("[{}] ignoring: {}", session.port_name(), raw),
            },
        }
    }
}
