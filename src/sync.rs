//! Waiting for the next step after an advance action.
//!
//! Three watchers race: structural changes (with a form present), a location
//! poll, and a deadline. The first to fire wins and the others are dropped with
//! the `select!`, so the wait resolves exactly once.

use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};

use crate::dom::{Document, NodeId};
use crate::error::Result;
use crate::heuristics::Heuristics;

/// Which watcher ended the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrivalTrigger {
    Mutation,
    LocationChange,
    Timeout,
}

/// What the document looked like when the wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepArrival {
    /// The location differs from the one before the advance action.
    pub navigated: bool,
    /// Current form, valid against the tree read when the wait ended.
    pub form: Option<NodeId>,
    pub trigger: ArrivalTrigger,
}

impl StepArrival {
    pub fn timed_out(&self) -> bool {
        self.trigger == ArrivalTrigger::Timeout
    }
}

pub struct StepSynchronizer<'a> {
    heuristics: &'a Heuristics,
    poll_interval: Duration,
}

impl<'a> StepSynchronizer<'a> {
    pub fn new(heuristics: &'a Heuristics, poll_interval: Duration) -> Self {
        Self {
            heuristics,
            poll_interval,
        }
    }

    /// Wait at most `timeout` for the document to present its next step.
    ///
    /// Subscribe to mutations before triggering the advance action and pass
    /// the receiver in, so that changes made by the action itself are seen.
    pub async fn await_next_step<D: Document + ?Sized>(
        &self,
        doc: &D,
        previous_url: &str,
        mut mutations: tokio::sync::watch::Receiver<u64>,
        timeout: Duration,
    ) -> Result<StepArrival> {
        let deadline = time::sleep(timeout);
        tokio::pin!(deadline);
        let first_poll = time::Instant::now() + self.poll_interval;
        let mut poll = time::interval_at(first_poll, self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut observing = true;

        loop {
            tokio::select! {
                changed = mutations.changed(), if observing => {
                    if changed.is_err() {
                        // Backend went away; keep polling until the deadline.
                        observing = false;
                        continue;
                    }
                    let tree = doc.tree().await?;
                    if let Some(form) = self.heuristics.current_form(&tree) {
                        let navigated = doc.url().await? != previous_url;
                        return Ok(self.arrive(navigated, Some(form), ArrivalTrigger::Mutation));
                    }
                }
                _ = poll.tick() => {
                    if doc.url().await? != previous_url {
                        let form = self.heuristics.current_form(&doc.tree().await?);
                        return Ok(self.arrive(true, form, ArrivalTrigger::LocationChange));
                    }
                }
                _ = &mut deadline => {
                    let form = self.heuristics.current_form(&doc.tree().await?);
                    let navigated = doc.url().await? != previous_url;
                    return Ok(self.arrive(navigated, form, ArrivalTrigger::Timeout));
                }
            }
        }
    }

    fn arrive(
        &self,
        navigated: bool,
        form: Option<NodeId>,
        trigger: ArrivalTrigger,
    ) -> StepArrival {
        tracing::debug!(?trigger, navigated, has_form = form.is_some(), "step settled");
        StepArrival {
            navigated,
            form,
            trigger,
        }
    }
}
