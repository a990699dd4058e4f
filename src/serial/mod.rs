pub mod interface;
pub mod locator;
pub mod protocol;
pub mod simulator;

pub use interface::{SerialConfig, SerialInterface};
pub use locator::PortLocator;
pub use protocol::{Command, Device, Mode, StatusUpdate, Threshold};
pub use simulator::SimulatedTransport;

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("No serial port matched the configured patterns")]
    NoPortFound,

    #[error("Connection failed: {0}")]
    OpenFailed(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;

/// Opens sessions to the device. Every call resolves the port afresh, so a
/// device that re-enumerates on a different path is picked up.
pub trait Transport: Send {
    fn open(&mut self) -> Result<Box<dyn Session>>;
}

/// An open, exclusively owned link to the device.
///
/// Any error returned by a session method means the link can no longer be
/// trusted; the owner must close it and open a new one.
pub trait Session: Send {
    fn port_name(&self) -> &str;

    /// Drop unread input, including any partially received line.
    fn clear_input(&mut self) -> Result<()>;

    /// Write `text` followed by a newline and flush.
    fn write_line(&mut self, text: &str) -> Result<()>;

    /// Wait up to `timeout` for one complete line. `Ok(None)` means the
    /// timeout elapsed, which is not an error.
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>>;

    /// Best-effort close; failures are swallowed.
    fn close(self: Box<Self>);
}
