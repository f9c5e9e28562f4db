//! Reconciliation polling
//!
//! After a batch is submitted, the provider's listing is re-read until every
//! submitted resource reached a terminal state or the poll budget ran out.
//! Each poll is one step of an explicit state machine: the state (resources
//! still queried, resources already failed, attempts and list failures left)
//! is plain data carried from one step to the next.
//!
//! Listing failures are retried after the interval without consuming an
//! attempt: a flaky listing is not evidence that any resource failed. They
//! draw from a separate budget so a provider that never answers still ends
//! the loop.

use crate::aggregate::ErrorAggregator;
use crate::error::{ErrorCode, ProviderError};
use crate::model::{Image, ImageStatus, Node, NodeStatus, Tags};
use crate::provider::ProviderAdapter;
use crate::region::{PollBudget, RegionContext};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// How a poll loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollOutcome {
    /// Every resource reached a terminal state
    Converged,
    /// The budget ran out with resources still pending
    TimedOut,
    /// There was nothing to converge
    NothingToPoll,
}

/// A node followed through polling
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedNode {
    /// Position of the node in the caller's batch
    pub origin: usize,

    /// Latest observed record
    pub node: Node,

    /// Caller tags, re-attached to every snapshot
    pub tags: Tags,
}

impl TrackedNode {
    pub fn new(origin: usize, node: Node, tags: Tags) -> Self {
        Self { origin, node, tags }
    }

    fn correlation_id(&self) -> String {
        if self.node.has_id() {
            self.node.id.clone()
        } else {
            format!("node-{}", self.origin)
        }
    }

    fn observe(&mut self, snapshot: &Node) {
        self.node = snapshot.clone();
        self.node.merge_tags(&self.tags);
    }
}

/// Result of node creation polling
#[derive(Debug, Clone)]
pub struct CreatePoll {
    pub outcome: PollOutcome,

    /// Queried nodes followed by failed nodes
    pub nodes: Vec<TrackedNode>,

    pub errors: ErrorAggregator,

    /// Listing calls that returned a snapshot
    pub attempts: u32,
}

/// Result of deletion polling
#[derive(Debug, Clone)]
pub struct DeletePoll {
    pub outcome: PollOutcome,

    /// Ids still present when the loop ended
    pub remaining: Vec<String>,

    pub errors: ErrorAggregator,

    pub attempts: u32,
}

/// Result of image polling
#[derive(Debug, Clone)]
pub struct ImagePoll {
    pub outcome: PollOutcome,

    /// Last observed record of the image
    pub image: Option<Image>,

    pub errors: ErrorAggregator,

    pub attempts: u32,
}

/// Attempt and list-failure accounting shared by every poll variant
#[derive(Debug, Clone, Copy)]
struct Budget {
    attempts_left: u32,
    list_failures_left: u32,
    attempts: u32,
}

impl Budget {
    fn new(budget: &PollBudget) -> Self {
        Self {
            attempts_left: budget.max_attempts,
            list_failures_left: budget.list_failure_budget(),
            attempts: 0,
        }
    }

    fn consume_attempt(&mut self) {
        self.attempts_left = self.attempts_left.saturating_sub(1);
        self.attempts += 1;
    }

    /// Returns `false` when a failure arrives with the budget already spent
    fn absorb_list_failure(&mut self) -> bool {
        if self.list_failures_left == 0 {
            return false;
        }
        self.list_failures_left -= 1;
        true
    }
}

/// Single step of a poll loop
enum Step<T> {
    Continue,
    Done(T),
}

/// Record the listing failure that ended a loop
fn record_list_exhausted(errors: &mut ErrorAggregator, error: &ProviderError, what: &str) {
    warn!(error = %error, "Listing failed too many times while polling {}", what);
    errors.add_provider_error(error, None);
}

fn record_timeout(errors: &mut ErrorAggregator, ids: impl IntoIterator<Item = String>) {
    for id in ids {
        errors.add_error(
            format!("polling exceeds attempt limit, {} is still pending", id),
            None,
            Some(id),
            false,
            ErrorCode::PollingTimeout,
        );
    }
}

fn record_nothing_to_poll(errors: &mut ErrorAggregator) {
    errors.add_error(
        "no resources to poll",
        None,
        None,
        false,
        ErrorCode::NothingToPoll,
    );
}

/// Convergence state of a node creation batch
struct CreationState {
    query: Vec<TrackedNode>,
    failed: Vec<TrackedNode>,
    errors: ErrorAggregator,
    budget: Budget,
}

impl CreationState {
    fn finish(self, outcome: PollOutcome) -> CreatePoll {
        let mut nodes = self.query;
        nodes.extend(self.failed);
        CreatePoll {
            outcome,
            nodes,
            errors: self.errors,
            attempts: self.budget.attempts,
        }
    }

    fn fail(&mut self, mut tracked: TrackedNode, message: String, code: ErrorCode) {
        let id = tracked.correlation_id();
        tracked.node.merge_tags(&tracked.tags);
        self.errors.add_error(message, None, Some(id), false, code);
        self.failed.push(tracked);
    }

    /// Ids of queried nodes not yet seen in a terminal state
    fn pending_ids(&self) -> Vec<String> {
        self.query
            .iter()
            .filter(|t| t.node.status == NodeStatus::Pending)
            .map(TrackedNode::correlation_id)
            .collect()
    }

    /// Classify every queried node against one listing snapshot
    fn classify(&mut self, snapshot: &[Node]) -> bool {
        let by_id: HashMap<&str, &Node> = snapshot.iter().map(|n| (n.id.as_str(), n)).collect();
        let mut still_pending = false;
        let mut kept = Vec::with_capacity(self.query.len());

        for mut tracked in std::mem::take(&mut self.query) {
            let listed = by_id
                .get(tracked.node.id.as_str())
                .copied()
                .filter(|n| n.status != NodeStatus::NotFound);

            match listed {
                None => {
                    tracked.node.status = NodeStatus::error_with(NodeStatus::NO_LONGER_FOUND);
                    let message = format!("node {} is no longer listed", tracked.correlation_id());
                    self.fail(tracked, message, ErrorCode::ResourceNotFound);
                }
                Some(found) if found.status.is_error() || found.status == NodeStatus::Terminated => {
                    tracked.observe(found);
                    let message = format!(
                        "node {} entered state {}",
                        tracked.correlation_id(),
                        found.status
                    );
                    self.fail(tracked, message, ErrorCode::Unspecified);
                }
                Some(found) => {
                    tracked.observe(found);
                    if found.status == NodeStatus::Pending {
                        still_pending = true;
                    }
                    kept.push(tracked);
                }
            }
        }

        self.query = kept;
        still_pending
    }

    async fn step(
        &mut self,
        adapter: &dyn ProviderAdapter,
        region: &RegionContext,
    ) -> Step<PollOutcome> {
        let snapshot = match adapter.list_nodes(region).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                debug!(error = %error, "Listing nodes failed, retrying");
                if self.budget.absorb_list_failure() {
                    return Step::Continue;
                }
                record_list_exhausted(&mut self.errors, &error, "nodes");
                let pending = self.pending_ids();
                record_timeout(&mut self.errors, pending);
                return Step::Done(PollOutcome::TimedOut);
            }
        };

        self.budget.consume_attempt();
        let still_pending = self.classify(&snapshot);

        if !still_pending {
            if !self.failed.is_empty() {
                let total = self.query.len() + self.failed.len();
                self.errors.add_error(
                    format!("{} of {} nodes failed to launch", self.failed.len(), total),
                    None,
                    None,
                    false,
                    ErrorCode::PartialFailure,
                );
            }
            return Step::Done(PollOutcome::Converged);
        }

        if self.budget.attempts_left == 0 {
            let pending = self.pending_ids();
            record_timeout(&mut self.errors, pending);
            return Step::Done(PollOutcome::TimedOut);
        }

        Step::Continue
    }
}

/// Poll until every node in `query` is active, failed, or gone
///
/// `failed` holds nodes already known to have failed; they are carried
/// through unchanged and returned after the queried nodes.
pub async fn poll_nodes_active(
    adapter: &dyn ProviderAdapter,
    region: &RegionContext,
    query: Vec<TrackedNode>,
    failed: Vec<TrackedNode>,
    budget: &PollBudget,
) -> CreatePoll {
    let mut state = CreationState {
        query,
        failed,
        errors: ErrorAggregator::new(),
        budget: Budget::new(budget),
    };

    if state.query.is_empty() {
        record_nothing_to_poll(&mut state.errors);
        return state.finish(PollOutcome::NothingToPoll);
    }

    if state.budget.attempts_left == 0 {
        let pending: Vec<String> = state.query.iter().map(TrackedNode::correlation_id).collect();
        record_timeout(&mut state.errors, pending);
        return state.finish(PollOutcome::TimedOut);
    }

    loop {
        match state.step(adapter, region).await {
            Step::Done(outcome) => {
                info!(
                    outcome = ?outcome,
                    attempts = state.budget.attempts,
                    failed = state.failed.len(),
                    "Node polling finished"
                );
                return state.finish(outcome);
            }
            Step::Continue => tokio::time::sleep(budget.interval()).await,
        }
    }
}

/// Poll until none of `ids` is listed any more
///
/// A listed node counts as gone once it reports `TERMINATED` or
/// `NOT_FOUND`. The first listing is always taken, so ids that are already
/// absent converge in one attempt whatever the budget.
pub async fn poll_nodes_deleted(
    adapter: &dyn ProviderAdapter,
    region: &RegionContext,
    ids: Vec<String>,
    budget: &PollBudget,
) -> DeletePoll {
    let mut errors = ErrorAggregator::new();
    let mut counter = Budget::new(budget);

    if ids.is_empty() {
        record_nothing_to_poll(&mut errors);
        return DeletePoll {
            outcome: PollOutcome::NothingToPoll,
            remaining: ids,
            errors,
            attempts: 0,
        };
    }

    let mut remaining = ids;
    loop {
        let snapshot = match adapter.list_nodes(region).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                debug!(error = %error, "Listing nodes failed, retrying");
                if counter.absorb_list_failure() {
                    tokio::time::sleep(budget.interval()).await;
                    continue;
                }
                record_list_exhausted(&mut errors, &error, "deleted nodes");
                record_timeout(&mut errors, remaining.iter().cloned());
                return DeletePoll {
                    outcome: PollOutcome::TimedOut,
                    remaining,
                    errors,
                    attempts: counter.attempts,
                };
            }
        };

        counter.consume_attempt();
        let present: HashSet<&str> = snapshot
            .iter()
            .filter(|n| !n.status.is_gone())
            .map(|n| n.id.as_str())
            .collect();
        remaining.retain(|id| present.contains(id.as_str()));

        if remaining.is_empty() {
            info!(attempts = counter.attempts, "Deletion converged");
            return DeletePoll {
                outcome: PollOutcome::Converged,
                remaining,
                errors,
                attempts: counter.attempts,
            };
        }

        if counter.attempts_left == 0 {
            record_timeout(&mut errors, remaining.iter().cloned());
            return DeletePoll {
                outcome: PollOutcome::TimedOut,
                remaining,
                errors,
                attempts: counter.attempts,
            };
        }

        tokio::time::sleep(budget.interval()).await;
    }
}

/// Poll a single image until it is `ACTIVE`
///
/// An image missing from the listing or reporting `ERROR` ends the loop
/// with an error.
pub async fn poll_image_active(
    adapter: &dyn ProviderAdapter,
    region: &RegionContext,
    image_id: &str,
    budget: &PollBudget,
) -> ImagePoll {
    let mut errors = ErrorAggregator::new();
    let mut counter = Budget::new(budget);

    if counter.attempts_left == 0 {
        record_timeout(&mut errors, [image_id.to_string()]);
        return ImagePoll {
            outcome: PollOutcome::TimedOut,
            image: None,
            errors,
            attempts: 0,
        };
    }

    loop {
        let images = match adapter.list_images(region).await {
            Ok(images) => images,
            Err(error) => {
                debug!(error = %error, "Listing images failed, retrying");
                if counter.absorb_list_failure() {
                    tokio::time::sleep(budget.interval()).await;
                    continue;
                }
                record_list_exhausted(&mut errors, &error, "images");
                record_timeout(&mut errors, [image_id.to_string()]);
                return ImagePoll {
                    outcome: PollOutcome::TimedOut,
                    image: None,
                    errors,
                    attempts: counter.attempts,
                };
            }
        };

        counter.consume_attempt();
        let found = images.into_iter().find(|i| i.id == image_id);

        match found {
            None => {
                errors.add_error(
                    format!("can not find image {} while polling", image_id),
                    None,
                    Some(image_id.to_string()),
                    false,
                    ErrorCode::ImageNotFound,
                );
                return ImagePoll {
                    outcome: PollOutcome::Converged,
                    image: None,
                    errors,
                    attempts: counter.attempts,
                };
            }
            Some(image) if image.status == ImageStatus::Error => {
                errors.add_error(
                    format!("image {} entered state ERROR", image_id),
                    None,
                    Some(image_id.to_string()),
                    false,
                    ErrorCode::Unspecified,
                );
                return ImagePoll {
                    outcome: PollOutcome::Converged,
                    image: Some(image),
                    errors,
                    attempts: counter.attempts,
                };
            }
            Some(image) if image.status == ImageStatus::Active => {
                info!(image_id, attempts = counter.attempts, "Image is active");
                return ImagePoll {
                    outcome: PollOutcome::Converged,
                    image: Some(image),
                    errors,
                    attempts: counter.attempts,
                };
            }
            Some(image) => {
                if counter.attempts_left == 0 {
                    record_timeout(&mut errors, [image_id.to_string()]);
                    return ImagePoll {
                        outcome: PollOutcome::TimedOut,
                        image: Some(image),
                        errors,
                        attempts: counter.attempts,
                    };
                }
            }
        }

        tokio::time::sleep(budget.interval()).await;
    }
}
