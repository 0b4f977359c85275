//! Read-only walk through a multi-step form flow.

use crate::config::ScanConfig;
use crate::discovery;
use crate::dom::Document;
use crate::error::Result;
use crate::events::{Event, EventBus};
use crate::heuristics::Heuristics;
use crate::model::{Flow, PageSnapshot};
use crate::selector;
use crate::snapshot;

/// Walks a flow step by step under discovery mode.
pub struct FlowScanner<'a> {
    heuristics: &'a Heuristics,
    config: ScanConfig,
    events: Option<&'a EventBus>,
}

impl<'a> FlowScanner<'a> {
    pub fn new(heuristics: &'a Heuristics, config: ScanConfig) -> Self {
        Self {
            heuristics,
            config,
            events: None,
        }
    }

    /// Publish a progress event per recorded step.
    pub fn with_events(mut self, events: &'a EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Record up to `max_steps` steps. Stops early when no advance control is
    /// found or when activating one leaves the step unchanged.
    ///
    /// Errors while walking end the scan with the steps recorded so far; only
    /// failing to enter or leave discovery mode is reported as an error.
    pub async fn scan<D: Document + ?Sized>(&self, doc: &D) -> Result<Flow> {
        let mut steps = Vec::new();
        discovery::scoped(doc, async {
            if let Err(err) = self.walk(doc, &mut steps).await {
                tracing::warn!(error = %err, recorded = steps.len(), "scan ended early");
            }
            Ok(())
        })
        .await?;
        tracing::info!(steps = steps.len(), "scan complete");
        Ok(Flow::new(steps))
    }

    async fn walk<D: Document + ?Sized>(
        &self,
        doc: &D,
        steps: &mut Vec<PageSnapshot>,
    ) -> Result<()> {
        if self.config.max_steps == 0 {
            return Ok(());
        }
        let mut current = snapshot::snapshot(doc, self.heuristics).await?;
        loop {
            self.record(&current, steps.len() + 1);
            steps.push(current.clone());
            if steps.len() >= self.config.max_steps {
                tracing::debug!(max_steps = self.config.max_steps, "step limit reached");
                return Ok(());
            }

            let tree = doc.tree().await?;
            let Some(control) = self.heuristics.find_advance(&tree) else {
                tracing::debug!(step = steps.len(), "no advance control, flow complete");
                return Ok(());
            };
            let locator = selector::synthesize(&tree, control);
            tracing::debug!(step = steps.len(), control = %locator, "activating advance control");
            doc.click(control).await?;
            tokio::time::sleep(self.config.settle_delay).await;

            let next = snapshot::snapshot(doc, self.heuristics).await?;
            if next.same_step_as(&current) {
                tracing::debug!(step = steps.len(), "advance control did not move the flow");
                return Ok(());
            }
            if let Some(last) = steps.last_mut() {
                last.advance = Some(locator);
            }
            current = next;
        }
    }

    fn record(&self, snap: &PageSnapshot, step: usize) {
        if let Some(events) = self.events {
            events.emit(Event::ScanProgress {
                step,
                url: snap.url.clone(),
                fields: snap.fields.len(),
            });
        }
    }
}
