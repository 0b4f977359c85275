//! Bulk replay: every row through every recorded step, one at a time.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ReplayConfig;
use crate::dom::Document;
use crate::error::{Error, Result};
use crate::events::{Event, EventBus, RunSummary};
use crate::fill;
use crate::heuristics::{self, Heuristics};
use crate::model::{DataRow, DataSet, FieldMapping, Flow, PageSnapshot};
use crate::selector;
use crate::sync::StepSynchronizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Stopping,
    Finished,
}

/// Where a run currently is. Rows and steps are 1-based; 0 means not started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunProgress {
    pub status: RunStatus,
    pub current_row: usize,
    pub current_step: usize,
}

#[derive(Debug, Default)]
struct Slot {
    progress: RunProgress,
    scanning: bool,
    cancel: CancellationToken,
}

/// Status, scan lease and stop token of one engine. At most one run or scan
/// is active per state.
#[derive(Debug, Default)]
pub struct RunState {
    slot: Mutex<Slot>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn progress(&self) -> RunProgress {
        self.lock().progress
    }

    pub fn status(&self) -> RunStatus {
        self.lock().progress.status
    }

    pub fn is_scanning(&self) -> bool {
        self.lock().scanning
    }

    pub fn stop_requested(&self) -> bool {
        self.lock().cancel.is_cancelled()
    }

    /// Token of the current run, cancelled when a stop is requested.
    pub fn cancel_token(&self) -> CancellationToken {
        self.lock().cancel.clone()
    }

    /// Claim the document for a scan. Rejected with [`Error::Busy`] while a
    /// run or another scan holds it; the claim ends when the lease drops.
    pub fn begin_scan(self: &Arc<Self>) -> Result<ScanLease> {
        let mut slot = self.lock();
        if slot.scanning || is_active(slot.progress.status) {
            return Err(Error::Busy);
        }
        slot.scanning = true;
        Ok(ScanLease {
            state: Arc::clone(self),
        })
    }

    fn begin(&self) -> Result<CancellationToken> {
        let mut slot = self.lock();
        if slot.scanning || is_active(slot.progress.status) {
            return Err(Error::Busy);
        }
        slot.progress = RunProgress {
            status: RunStatus::Running,
            current_row: 0,
            current_step: 0,
        };
        slot.cancel = CancellationToken::new();
        Ok(slot.cancel.clone())
    }

    /// Ask the active run to stop at its next checkpoint. Returns `false` when
    /// nothing is running.
    pub fn request_stop(&self) -> bool {
        let mut slot = self.lock();
        if slot.progress.status != RunStatus::Running {
            return false;
        }
        slot.progress.status = RunStatus::Stopping;
        slot.cancel.cancel();
        true
    }

    fn set_position(&self, row: usize, step: usize) {
        let mut slot = self.lock();
        slot.progress.current_row = row;
        slot.progress.current_step = step;
    }

    fn end(&self, stopped: bool) {
        self.lock().progress.status = if stopped {
            RunStatus::Idle
        } else {
            RunStatus::Finished
        };
    }
}

fn is_active(status: RunStatus) -> bool {
    matches!(status, RunStatus::Running | RunStatus::Stopping)
}

/// Holds a [`RunState`] in the scanning state until dropped.
#[derive(Debug)]
pub struct ScanLease {
    state: Arc<RunState>,
}

impl Drop for ScanLease {
    fn drop(&mut self) {
        self.state.lock().scanning = false;
    }
}

/// Sleep for `delay` unless `cancel` fires first. Returns whether the run
/// should go on.
async fn pause(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => !cancel.is_cancelled(),
        _ = cancel.cancelled() => false,
    }
}

/// Input of one bulk run. Rows are already keyed by column name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkJob {
    pub flow: Flow,
    pub rows: DataSet,
    pub mapping: FieldMapping,
    /// Overrides the configured pause between rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

enum RowOutcome {
    Completed,
    Stopped,
}

/// Replays rows against a document. Cheap to clone; clones share the run state.
pub struct BulkRunner<D: ?Sized> {
    doc: Arc<D>,
    heuristics: Arc<Heuristics>,
    state: Arc<RunState>,
    events: EventBus,
    config: ReplayConfig,
}

impl<D: ?Sized> Clone for BulkRunner<D> {
    fn clone(&self) -> Self {
        Self {
            doc: Arc::clone(&self.doc),
            heuristics: Arc::clone(&self.heuristics),
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            config: self.config.clone(),
        }
    }
}

impl<D: Document + ?Sized + 'static> BulkRunner<D> {
    pub fn new(doc: Arc<D>, state: Arc<RunState>, events: EventBus) -> Self {
        Self {
            doc,
            heuristics: Arc::new(Heuristics::default()),
            state,
            events,
            config: ReplayConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ReplayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_heuristics(mut self, heuristics: Arc<Heuristics>) -> Self {
        self.heuristics = heuristics;
        self
    }

    pub fn state(&self) -> &Arc<RunState> {
        &self.state
    }

    /// Start a run in the background. Rejected with [`Error::Busy`] while
    /// another run is active on the same state.
    pub fn start(&self, job: BulkJob) -> Result<JoinHandle<RunSummary>> {
        let cancel = self.state.begin()?;
        let runner = self.clone();
        Ok(tokio::spawn(async move {
            let total = job.rows.len();
            match AssertUnwindSafe(runner.execute(&job, &cancel))
                .catch_unwind()
                .await
            {
                Ok(summary) => summary,
                Err(_) => {
                    tracing::error!("bulk run panicked");
                    runner.state.end(true);
                    let summary = RunSummary {
                        total,
                        stopped: true,
                        ..RunSummary::default()
                    };
                    runner.events.emit(Event::Stopped { summary });
                    summary
                }
            }
        }))
    }

    /// Start a run and wait for it to end.
    pub async fn run(&self, job: BulkJob) -> Result<RunSummary> {
        let handle = self.start(job)?;
        handle
            .await
            .map_err(|e| Error::Task(e.to_string()))
    }

    /// Request a stop at the next checkpoint. A no-op when idle.
    pub fn stop(&self) -> bool {
        self.state.request_stop()
    }

    async fn execute(&self, job: &BulkJob, cancel: &CancellationToken) -> RunSummary {
        let total = job.rows.len();
        let delay = job
            .delay_ms
            .map(Duration::from_millis)
            .unwrap_or(self.config.row_delay);
        self.events.log(format!(
            "Bulk run started: {total} rows, {} steps, delay {}ms",
            job.flow.len(),
            delay.as_millis()
        ));

        let mut summary = RunSummary {
            total,
            ..RunSummary::default()
        };
        for (index, row) in job.rows.iter().enumerate() {
            let number = index + 1;
            if cancel.is_cancelled() {
                summary.stopped = true;
                break;
            }
            if index > 0 && !pause(cancel, delay).await {
                summary.stopped = true;
                break;
            }
            self.state.set_position(number, 0);
            self.events.emit(Event::RowStarted { row: number, total });

            match self.replay_row(number, row, job, cancel).await {
                Ok(RowOutcome::Completed) => {
                    summary.completed += 1;
                    self.events.emit(Event::RowCompleted { row: number });
                    if self.config.screenshot_each_row {
                        self.events.emit(Event::ScreenshotRequested { row: number });
                    }
                }
                Ok(RowOutcome::Stopped) => {
                    summary.failed += 1;
                    summary.stopped = true;
                    self.events.emit(Event::RowFailed {
                        row: number,
                        reason: "stopped before the row was complete".into(),
                    });
                    break;
                }
                Err(err) => {
                    summary.failed += 1;
                    self.events.emit(Event::RowFailed {
                        row: number,
                        reason: err.to_string(),
                    });
                }
            }
        }

        self.state.end(summary.stopped);
        if summary.stopped {
            self.events.emit(Event::Stopped { summary });
        } else {
            self.events.emit(Event::Finished { summary });
        }
        summary
    }

    async fn replay_row(
        &self,
        row_number: usize,
        row: &DataRow,
        job: &BulkJob,
        cancel: &CancellationToken,
    ) -> Result<RowOutcome> {
        let doc = self.doc.as_ref();
        let sync = StepSynchronizer::new(&self.heuristics, self.config.poll_interval);
        for (index, step) in job.flow.steps.iter().enumerate() {
            let step_number = index + 1;
            if cancel.is_cancelled() {
                return Ok(RowOutcome::Stopped);
            }
            self.state.set_position(row_number, step_number);

            let fields = job.mapping.apply(step);
            if !fill::fill(doc, &fields, row, cancel).await? {
                return Ok(RowOutcome::Stopped);
            }

            let previous_url = doc.url().await?;
            let mut mutations = doc.mutations();
            mutations.borrow_and_update();
            self.advance(step, step_number).await?;

            if cancel.is_cancelled() {
                return Ok(RowOutcome::Stopped);
            }
            let arrival = sync
                .await_next_step(doc, &previous_url, mutations, self.config.step_timeout)
                .await?;
            if arrival.timed_out() {
                tracing::debug!(
                    row = row_number,
                    step = step_number,
                    "next step did not appear in time, continuing"
                );
            }
            self.events.emit(Event::StepAdvanced {
                row: row_number,
                step: step_number,
                navigated: arrival.navigated,
            });
        }
        Ok(RowOutcome::Completed)
    }

    /// Leave the current step: explicit submit control, then the control the
    /// scanner used, then native submission, then any advance-like control.
    async fn advance(&self, step: &PageSnapshot, step_number: usize) -> Result<()> {
        let doc = self.doc.as_ref();
        let tree = doc.tree().await?;
        let form = self.heuristics.current_form(&tree);

        if let Some(control) = form.and_then(|f| heuristics::submit_control(&tree, f)) {
            tracing::debug!(step = step_number, "clicking submit control");
            return doc.click(control).await;
        }
        let recorded = step
            .advance
            .as_deref()
            .and_then(|locator| selector::resolve(&tree, locator));
        if let Some(control) = recorded {
            tracing::debug!(step = step_number, "clicking recorded advance control");
            return doc.click(control).await;
        }
        if let Some(form) = form {
            tracing::debug!(step = step_number, "submitting form natively");
            return doc.submit(form).await;
        }
        if let Some(control) = self.heuristics.find_advance(&tree) {
            tracing::debug!(step = step_number, "clicking advance-like control");
            return doc.click(control).await;
        }
        if step.fields.is_empty() {
            Err(Error::AdvanceNotFound { step: step_number })
        } else {
            Err(Error::NoFormFound { step: step_number })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_and_run_exclude_each_other() {
        let state = Arc::new(RunState::new());
        let lease = state.begin_scan().unwrap();
        assert!(state.is_scanning());
        assert!(matches!(state.begin(), Err(Error::Busy)));
        assert!(matches!(state.begin_scan(), Err(Error::Busy)));

        drop(lease);
        assert!(!state.is_scanning());
        state.begin().unwrap();
        assert!(matches!(state.begin_scan(), Err(Error::Busy)));
        assert_eq!(state.status(), RunStatus::Running);
    }

    #[test]
    fn each_run_gets_a_fresh_token() {
        let state = RunState::new();
        let first = state.begin().unwrap();
        assert!(state.request_stop());
        assert!(first.is_cancelled());
        state.end(true);

        let second = state.begin().unwrap();
        assert!(!second.is_cancelled());
        assert!(!state.stop_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_ends_early_on_cancel() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let began = tokio::time::Instant::now();
        assert!(!pause(&cancel, Duration::from_secs(60)).await);
        assert!(began.elapsed() < Duration::from_secs(1));
        assert!(pause(&CancellationToken::new(), Duration::from_millis(10)).await);
    }
}
