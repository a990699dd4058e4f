use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::models::{DeviceState, StatusUpdate};

/// Shared view of the controller state.
///
/// Readers take whole-state snapshots without waiting on the serial link;
/// the only writer is the command channel worker, which swaps in a merged
/// state in one short critical section.
#[derive(Clone)]
pub struct StateCache {
    tx: Arc<watch::Sender<DeviceState>>,
}

impl StateCache {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(DeviceState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> DeviceState {
        self.tx.borrow().clone()
    }

    pub(crate) fn merge(
        &self,
        update: &StatusUpdate,
        raw_line: &str,
        port: &str,
        at: DateTime<Utc>,
    ) -> DeviceState {
        let mut merged = None;
        self.tx.send_modify(|state| {
            state.apply(update, raw_line, port, at);
            merged = Some(state.clone());
        });
        merged.unwrap_or_else(|| self.snapshot())
    }

    /// Record the port a session was just opened on, before any status
    /// line has arrived over it.
    pub(crate) fn set_active_port(&self, port: &str) {
        self.tx.send_if_modified(|state| {
            if state.active_port.as_deref() == Some(port) {
                return false;
            }
            state.active_port = Some(port.to_string());
            true
        });
    }
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new()
    }
}
