use std::future::Future;
use std::time::Duration;

use gridwatch_classifier::ClassifiedEvent;
use gridwatch_log::LogTailer;
use tokio::sync::watch;

use crate::error::{BroadcasterError, Result};
use crate::registry::SubscriberRegistry;
use crate::watcher::LogWatcher;

/// Where the broadcast loop is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcasterState {
    Idle,
    Polling,
    Delivering,
    Sleeping,
    Stopped,
}

impl std::fmt::Display for BroadcasterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BroadcasterState::Idle => write!(f, "idle"),
            BroadcasterState::Polling => write!(f, "polling"),
            BroadcasterState::Delivering => write!(f, "delivering"),
            BroadcasterState::Sleeping => write!(f, "sleeping"),
            BroadcasterState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Broadcast loop settings
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    /// Sleep between polls of the event log
    pub poll_interval: Duration,
    /// Failed polls in a row before the loop gives up
    pub max_consecutive_failures: u32,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            max_consecutive_failures: 20,
        }
    }
}

/// What one poll-and-deliver cycle did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Valid events broadcast
    pub records: usize,
    /// Complete lines that were not a valid event
    pub skipped: usize,
    /// Successful per-subscriber deliveries
    pub delivered: usize,
    /// Subscribers dropped after a failed delivery
    pub evicted: usize,
}

/// Bridges the event log tailer and the subscriber registry on a fixed
/// cadence.
pub struct EventBroadcaster {
    tailer: LogTailer,
    registry: SubscriberRegistry,
    config: BroadcasterConfig,
    watcher: Option<LogWatcher>,
    state: watch::Sender<BroadcasterState>,
    consecutive_failures: u32,
}

impl EventBroadcaster {
    pub fn new(tailer: LogTailer, registry: SubscriberRegistry, config: BroadcasterConfig) -> Self {
        let (state, _) = watch::channel(BroadcasterState::Idle);
        Self {
            tailer,
            registry,
            config,
            watcher: None,
            state,
            consecutive_failures: 0,
        }
    }

    /// Wake early whenever `watcher` reports a change to the log.
    pub fn with_watcher(mut self, watcher: LogWatcher) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    pub fn cursor(&self) -> u64 {
        self.tailer.cursor()
    }

    pub fn state(&self) -> BroadcasterState {
        *self.state.borrow()
    }

    /// Follow state transitions from another task.
    pub fn subscribe_state(&self) -> watch::Receiver<BroadcasterState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: BroadcasterState) {
        self.state.send_replace(state);
    }

    /// Poll the log once and broadcast every new, valid event in order.
    ///
    /// Lines that do not parse as a [`ClassifiedEvent`] are skipped with a
    /// warning; the raw line is what subscribers receive.
    pub async fn tick(&mut self) -> Result<TickReport> {
        self.set_state(BroadcasterState::Polling);
        let records = self.tailer.poll().await?;

        let mut report = TickReport::default();
        if records.is_empty() {
            return Ok(report);
        }

        self.set_state(BroadcasterState::Delivering);
        for record in records {
            if let Err(e) = serde_json::from_str::<ClassifiedEvent>(&record) {
                tracing::warn!("Skipping malformed event log record: {} ({})", record, e);
                report.skipped += 1;
                continue;
            }

            let outcome = self.registry.broadcast(&record).await;
            report.records += 1;
            report.delivered += outcome.delivered;
            report.evicted += outcome.evicted;
        }

        Ok(report)
    }

    /// Run until `shutdown` resolves.
    ///
    /// A failed poll is retried on the next cycle. A truncated log, or
    /// `max_consecutive_failures` failed polls in a row, ends the loop with
    /// [`BroadcasterError::TailerGaveUp`].
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        tracing::info!(
            path = %self.tailer.path().display(),
            cursor = self.tailer.cursor(),
            interval_ms = self.config.poll_interval.as_millis() as u64,
            "Event broadcaster started"
        );

        loop {
            match self.tick().await {
                Ok(report) => {
                    self.consecutive_failures = 0;
                    if report.records > 0 || report.skipped > 0 {
                        tracing::debug!(
                            records = report.records,
                            skipped = report.skipped,
                            delivered = report.delivered,
                            evicted = report.evicted,
                            "Broadcast cycle complete"
                        );
                    }
                }
                Err(BroadcasterError::Log(e)) => {
                    self.consecutive_failures += 1;
                    let attempts = self.consecutive_failures;

                    if e.is_fatal() || attempts >= self.config.max_consecutive_failures {
                        tracing::error!(attempts, "Event broadcaster stopping: {}", e);
                        self.set_state(BroadcasterState::Stopped);
                        return Err(BroadcasterError::TailerGaveUp { attempts, source: e });
                    }

                    tracing::warn!(attempts, "Failed to read event log, retrying: {}", e);
                }
                Err(e) => {
                    tracing::error!("Event broadcaster stopping: {}", e);
                    self.set_state(BroadcasterState::Stopped);
                    return Err(e);
                }
            }

            self.set_state(BroadcasterState::Sleeping);

            let interval = self.config.poll_interval;
            let changed = async {
                match &self.watcher {
                    Some(watcher) => watcher.changed().await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(interval) => {}
                _ = changed => {}
            }
        }

        self.set_state(BroadcasterState::Stopped);
        tracing::info!(cursor = self.tailer.cursor(), "Event broadcaster stopped");
        Ok(())
    }
}
