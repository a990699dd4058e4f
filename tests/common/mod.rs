#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use climate_one_lib::device::{CommandChannel, ExchangeConfig, StateCache};
use climate_one_lib::serial::{Result, SerialError, Session, Transport};

pub const SCRIPTED_PORT: &str = "/dev/ttyTEST0";

pub enum Reply {
    Line(String),
    IoError,
}

/// Everything a scripted transport has seen, shared with the test body.
#[derive(Default)]
pub struct Script {
    pub opens: usize,
    pub closes: usize,
    pub fail_opens: usize,
    pub replies: VecDeque<Reply>,
    pub written: Vec<String>,
    pub read_delay: Duration,
    in_flight: usize,
    pub max_in_flight: usize,
}

/// Transport whose sessions replay queued lines.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn push_line(&self, line: &str) {
        self.script().replies.push_back(Reply::Line(line.to_string()));
    }

    pub fn push_io_error(&self) {
        self.script().replies.push_back(Reply::IoError);
    }
}

impl Transport for ScriptedTransport {
    fn open(&mut self) -> Result<Box<dyn Session>> {
        let mut script = self.script();
        if script.fail_opens > 0 {
            script.fail_opens -= 1;
            return Err(SerialError::NoPortFound);
        }
        script.opens += 1;
        Ok(Box::new(ScriptedSession {
            script: self.script.clone(),
        }))
    }
}

struct ScriptedSession {
    script: Arc<Mutex<Script>>,
}

impl Session for ScriptedSession {
    fn port_name(&self) -> &str {
        SCRIPTED_PORT
    }

    fn clear_input(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_line(&mut self, text: &str) -> Result<()> {
        let mut script = self.script.lock().unwrap();
        script.written.push(text.to_string());
        script.in_flight += 1;
        script.max_in_flight = script.max_in_flight.max(script.in_flight);
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>> {
        let (reply, delay) = {
            let mut script = self.script.lock().unwrap();
            (script.replies.pop_front(), script.read_delay)
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        match reply {
            Some(Reply::Line(line)) => {
                if line.starts_with("STATUS") {
                    let mut script = self.script.lock().unwrap();
                    script.in_flight = script.in_flight.saturating_sub(1);
                }
                Ok(Some(line))
            }
            Some(Reply::IoError) => {
                let mut script = self.script.lock().unwrap();
                script.in_flight = script.in_flight.saturating_sub(1);
                Err(SerialError::IoError(io::Error::new(io::ErrorKind::BrokenPipe, "cable pulled")))
            }
            None => {
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }

    fn close(self: Box<Self>) {
        self.script.lock().unwrap().closes += 1;
    }
}

pub fn fast_exchange() -> ExchangeConfig {
    ExchangeConfig {
        deadline: Duration::from_millis(150),
        read_timeout: Duration::from_millis(20),
    }
}

pub fn scripted_channel() -> (CommandChannel, StateCache, ScriptedTransport) {
    let transport = ScriptedTransport::new();
    let cache = StateCache::new();
    let channel = CommandChannel::spawn(Box::new(transport.clone()), cache.clone(), fast_exchange()).unwrap();
    (channel, cache, transport)
}
