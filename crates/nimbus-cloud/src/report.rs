//! Batch results returned by the engine

use crate::aggregate::ErrorAggregator;
use crate::model::{Node, NodeStatus};
use crate::poller::PollOutcome;
use serde::Serialize;
use tokio::time::Instant;

/// Result of one batch operation
///
/// `resources` and `raw_responses` always line up with the batch input:
/// same length, same order. A non-empty `errors` does not mean nothing was
/// created; failed resources stay in `resources` so they can be cleaned up.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport<T> {
    /// One entry per input item
    pub resources: Vec<T>,

    /// Raw provider response per input item
    pub raw_responses: Vec<Option<serde_json::Value>>,

    /// Every failure observed during the batch
    pub errors: ErrorAggregator,

    /// How reconciliation ended, if the batch polled at all
    pub convergence: Option<PollOutcome>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl<T> BatchReport<T> {
    pub fn new() -> Self {
        Self {
            resources: Vec::new(),
            raw_responses: Vec::new(),
            errors: ErrorAggregator::new(),
            convergence: None,
            duration_ms: 0,
        }
    }

    /// The aggregated error, or `None` when the batch recorded nothing
    pub fn error(&self) -> Option<&ErrorAggregator> {
        self.errors.as_failure_or_nil()
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn is_fatal(&self) -> bool {
        self.errors.is_fatal()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub(crate) fn push(&mut self, resource: T, raw: Option<serde_json::Value>) {
        self.resources.push(resource);
        self.raw_responses.push(raw);
    }

    pub(crate) fn finish(mut self, started: Instant) -> Self {
        self.duration_ms = started.elapsed().as_millis() as u64;
        self
    }
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchReport<Node> {
    /// Count nodes per terminal class
    pub fn summary(&self) -> NodeSummary {
        let mut summary = NodeSummary::default();
        for node in &self.resources {
            match node.status {
                NodeStatus::Active => summary.active += 1,
                NodeStatus::Pending => summary.pending += 1,
                NodeStatus::Terminated | NodeStatus::NotFound => summary.gone += 1,
                NodeStatus::Error { .. } => summary.failed += 1,
            }
        }
        summary
    }
}

/// Per-status node counts of a report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeSummary {
    pub active: usize,
    pub pending: usize,
    pub failed: usize,
    pub gone: usize,
}

impl std::fmt::Display for NodeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} active, {} pending, {} failed, {} gone",
            self.active, self.pending, self.failed, self.gone
        )
    }
}
