use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::channel::CommandChannel;
use super::models::{Command, DeviceState};
use super::state::StateCache;
use super::Result;
use crate::history::{self, HistoryStore, Reading};

/// Facade the HTTP layer talks to.
/// Reads come from the state cache; anything that touches the controller
/// goes through the command channel.
pub struct DeviceManager {
    channel: CommandChannel,
    cache: StateCache,
    history: Arc<dyn HistoryStore>,
    poll_interval: Duration,
}

impl DeviceManager {
    pub fn new(
        channel: CommandChannel,
        cache: StateCache,
        history: Arc<dyn HistoryStore>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            channel,
            cache,
            history,
            poll_interval,
        }
    }

    /// Latest cached state; never touches the device.
    pub fn get_snapshot(&self) -> DeviceState {
        self.cache.snapshot()
    }

    /// Cached state, refreshed first with a query if it is older than
    /// `max_age`. A failed refresh is logged and the cached state returned.
    pub async fn ensure_fresh(&self, max_age: Duration) -> DeviceState {
        let snapshot = self.cache.snapshot();
        if !snapshot.is_stale(max_age, Utc::now()) {
            return snapshot;
        }

        match self.channel.execute(Command::Query).await {
            Ok(state) => state,
            Err(e) => {
                log::warn!("Refresh of stale state failed: {}", e);
                self.cache.snapshot()
            }
        }
    }

    /// Send one command and return the state it produced. No retries.
    pub async fn issue(&self, command: Command) -> Result<DeviceState> {
        self.channel.execute(command).await
    }

    /// Stored readings with `timestamp >= since`, oldest first.
    pub async fn history(&self, since: i64) -> history::Result<Vec<Reading>> {
        self.history.query(since).await
    }

    /// Age past which API reads trigger an out-of-band query.
    pub fn stale_after(&self) -> Duration {
        self.poll_interval.mul_f64(1.5)
    }

    pub fn history_store(&self) -> Arc<dyn HistoryStore> {
        self.history.clone()
    }
}
