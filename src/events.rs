//! Fire-and-forget notifications for observers of a scan or bulk run.
//!
//! Events carry no control semantics. Every event is also written to the
//! `tracing` log, so nothing is lost when nobody subscribes.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// Outcome counts of one bulk run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub stopped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    Log { message: String },
    #[serde(rename_all = "camelCase")]
    ScanProgress { step: usize, url: String, fields: usize },
    /// `row` is 1-based.
    #[serde(rename_all = "camelCase")]
    RowStarted { row: usize, total: usize },
    #[serde(rename_all = "camelCase")]
    StepAdvanced { row: usize, step: usize, navigated: bool },
    RowCompleted { row: usize },
    RowFailed { row: usize, reason: String },
    ScreenshotRequested { row: usize },
    Stopped { summary: RunSummary },
    Finished { summary: RunSummary },
}

impl Event {
    /// One human-readable line, as shown in a run log.
    pub fn describe(&self) -> String {
        match self {
            Event::Log { message } => message.clone(),
            Event::ScanProgress { step, url, fields } => {
                format!("Scanned step {step}: {fields} fields at {url}")
            }
            Event::RowStarted { row, total } => format!("Submitting row {row}/{total}"),
            Event::StepAdvanced {
                row,
                step,
                navigated,
            } => {
                let how = if *navigated { "navigated" } else { "in place" };
                format!("Row {row}: step {step} advanced ({how})")
            }
            Event::RowCompleted { row } => format!("Row {row} submitted"),
            Event::RowFailed { row, reason } => format!("Row {row} failed: {reason}"),
            Event::ScreenshotRequested { row } => format!("Screenshot requested for row {row}"),
            Event::Stopped { summary } => format!(
                "Stopped by user after {} of {} rows ({} failed)",
                summary.completed + summary.failed,
                summary.total,
                summary.failed
            ),
            Event::Finished { summary } => format!(
                "Bulk run finished: {} submitted, {} failed",
                summary.completed, summary.failed
            ),
        }
    }
}

/// Broadcast channel for [`Event`]s. Clones publish to the same subscribers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: Event) {
        match &event {
            Event::RowFailed { .. } => tracing::warn!("{}", event.describe()),
            Event::ScanProgress { .. } | Event::StepAdvanced { .. } => {
                tracing::debug!("{}", event.describe())
            }
            _ => tracing::info!("{}", event.describe()),
        }
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    pub fn log(&self, message: impl Into<String>) {
        self.emit(Event::Log {
            message: message.into(),
        });
    }
}
