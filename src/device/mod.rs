pub mod channel;
pub mod manager;
pub mod models;
pub mod poller;
pub mod state;

pub use channel::{CommandChannel, ExchangeConfig};
pub use manager::DeviceManager;
pub use models::*;
pub use poller::{Poller, PollerHandle, PollerState};
pub use state::StateCache;

use std::time::Duration;

use crate::history::HistoryError;
use crate::serial::SerialError;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Device unreachable: {0}")]
    Unreachable(#[source] SerialError),

    #[error("No status response within {0:?}")]
    NoResponse(Duration),

    #[error("Serial communication error: {0}")]
    Io(#[source] SerialError),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Command channel closed")]
    ChannelClosed,

    #[error("History storage error: {0}")]
    Storage(#[from] HistoryError),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
