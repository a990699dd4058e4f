use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, MissedTickBehavior};

use super::channel::CommandChannel;
use super::models::Command;
use super::Result;
use crate::history::{HistoryStore, Reading};

const STOP_MARGIN: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Polling,
}

/// Periodically queries the controller and records each reading.
///
/// The cadence is fixed: failures are logged and the next attempt waits for
/// the next tick, so worst-case staleness stays predictable.
pub struct Poller {
    channel: CommandChannel,
    history: Arc<dyn HistoryStore>,
    interval: Duration,
    stop_timeout: Duration,
    state_tx: watch::Sender<PollerState>,
}

pub struct PollerHandle {
    task_handle: tokio::task::JoinHandle<()>,
    stop_tx: mpsc::Sender<()>,
    stop_timeout: Duration,
}

impl Poller {
    /// `exchange_budget` is the longest a single exchange can take, port
    /// open and settle included; `stop` waits that long plus a margin for
    /// the history write.
    pub fn new(
        channel: CommandChannel,
        history: Arc<dyn HistoryStore>,
        interval: Duration,
        exchange_budget: Duration,
    ) -> Self {
        let (state_tx, _state_rx) = watch::channel(PollerState::Idle);
        Self {
            channel,
            history,
            interval,
            stop_timeout: exchange_budget + STOP_MARGIN,
            state_tx,
        }
    }

    pub fn state(&self) -> PollerState {
        *self.state_tx.borrow()
    }

    /// One cycle: query, then append a reading if the state carries a
    /// timestamp. Storage errors are returned, not retried.
    pub async fn poll_once(&self) -> Result<Option<Reading>> {
        self.state_tx.send_replace(PollerState::Polling);
        let result = self.channel.execute(Command::Query).await;
        self.state_tx.send_replace(PollerState::Idle);

        let Some(reading) = Reading::from_snapshot(&result?) else {
            return Ok(None);
        };
        self.history.append(&reading).await?;
        Ok(Some(reading))
    }

    /// Run on the tokio runtime. The first poll happens immediately.
    pub fn spawn(self) -> PollerHandle {
        let (stop_tx, mut stop_rx) = mpsc::channel(1);
        let stop_timeout = self.stop_timeout;

        let task_handle = tokio::spawn(async move {
            log::info!("Poller started, interval {:?}", self.interval);
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => {
                        log::info!("Poller stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        match self.poll_once().await {
                            Ok(Some(reading)) => log::debug!("Recorded reading at {}", reading.timestamp),
                            Ok(None) => log::debug!("Query succeeded without a timestamp; nothing recorded"),
                            Err(e) => log::warn!("Poll cycle skipped: {}", e),
                        }
                    }
                }
            }
        });

        PollerHandle {
            task_handle,
            stop_tx,
            stop_timeout,
        }
    }
}

impl PollerHandle {
    /// Signal the loop and wait for it. A poll already in progress is
    /// allowed to finish. Returns false if the loop outlived the budget.
    pub async fn stop(self) -> bool {
        let _ = self.stop_tx.send(()).await;
        match timeout(self.stop_timeout, self.task_handle).await {
            Ok(_) => true,
            Err(_) => {
                log::warn!("Poller did not stop within {:?}", self.stop_timeout);
                false
            }
        }
    }
}
