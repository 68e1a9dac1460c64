//! Enrichment stage: input log of readings → classified event log

use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use gridwatch_log::{EventLogWriter, LogTailer, Result, TailStart};

use crate::models::{ClassifiedEvent, SensorReading};

/// Enricher settings
#[derive(Debug, Clone)]
pub struct EnricherConfig {
    /// Delay between scans of the input log
    pub poll_interval: Duration,
    /// Where to start reading the input log
    pub start_from: TailStart,
}

impl Default for EnricherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            start_from: TailStart::End,
        }
    }
}

/// Counts for one pass over newly appended input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichStats {
    pub classified: usize,
    pub anomalies: usize,
    pub skipped: usize,
}

/// Follows the input log and appends one classified event per reading.
///
/// Events that could not be written stay queued and go out first on the
/// next pass, ahead of any newer input.
pub struct Enricher {
    tailer: LogTailer,
    writer: EventLogWriter,
    config: EnricherConfig,
    unwritten: VecDeque<ClassifiedEvent>,
}

impl Enricher {
    pub async fn open(
        input_path: impl AsRef<Path>,
        output_path: impl AsRef<Path>,
        config: EnricherConfig,
    ) -> Result<Self> {
        let tailer = LogTailer::open(input_path, config.start_from).await?;
        let writer = EventLogWriter::open(output_path).await?;

        Ok(Self {
            tailer,
            writer,
            config,
            unwritten: VecDeque::new(),
        })
    }

    /// Classified events still waiting for a successful write.
    pub fn unwritten(&self) -> usize {
        self.unwritten.len()
    }

    /// Classify everything appended to the input since the last pass.
    ///
    /// Lines that are not a valid reading are skipped with a warning. The
    /// input is only read again once every earlier event has been written.
    pub async fn process_pending(&mut self) -> Result<EnrichStats> {
        let mut stats = EnrichStats::default();

        self.flush_unwritten(&mut stats).await?;

        for record in self.tailer.poll().await? {
            let reading: SensorReading = match serde_json::from_str(&record) {
                Ok(reading) => reading,
                Err(e) => {
                    tracing::warn!("Skipping malformed sensor reading: {} ({})", record, e);
                    stats.skipped += 1;
                    continue;
                }
            };

            let event = ClassifiedEvent::from_reading(reading);
            if !event.anomaly.is_normal() {
                tracing::info!(
                    timestamp = %event.timestamp,
                    electricity = event.electricity,
                    water = event.water,
                    "{}",
                    event.anomaly
                );
                stats.anomalies += 1;
            }
            self.unwritten.push_back(event);
        }

        self.flush_unwritten(&mut stats).await?;
        Ok(stats)
    }

    async fn flush_unwritten(&mut self, stats: &mut EnrichStats) -> Result<()> {
        while let Some(event) = self.unwritten.front() {
            self.writer.append(event).await?;
            self.unwritten.pop_front();
            stats.classified += 1;
        }
        Ok(())
    }

    /// Run until `shutdown` resolves or the input log becomes unreadable for
    /// good.
    ///
    /// Transient read failures are logged and retried on the next pass.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        tracing::info!(
            input = %self.tailer.path().display(),
            output = %self.writer.path().display(),
            "Enricher started"
        );

        loop {
            match self.process_pending().await {
                Ok(stats) if stats.classified > 0 || stats.skipped > 0 => {
                    tracing::debug!(
                        classified = stats.classified,
                        anomalies = stats.anomalies,
                        skipped = stats.skipped,
                        "Enrichment pass complete"
                    );
                }
                Ok(_) => {}
                Err(e) if e.is_fatal() => {
                    tracing::error!("Enricher stopping: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("Enrichment pass failed, retrying: {}", e);
                }
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        tracing::info!(written = self.writer.written(), "Enricher stopped");
        Ok(())
    }
}
