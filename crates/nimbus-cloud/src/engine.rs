//! Batch orchestration
//!
//! The engine composes the dispatcher, the pollers and the error aggregator.
//! It holds no provider registry: the adapter is passed to every call.

use crate::dispatch::RateLimitedDispatcher;
use crate::error::{ErrorCode, ProviderError};
use crate::model::{
    AddressPair, Image, ImageSpec, ImageStatus, LaunchPermissionChange, Node, NodeSpec,
    NodeStatus, OperationResult,
};
use crate::poller::{self, TrackedNode};
use crate::provider::{Preparation, ProviderAdapter, Reply};
use crate::region::RegionContext;
use crate::report::BatchReport;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Which rate limit an operation draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum OperationClass {
    Create,
    Delete,
}

type LimiterKey = (String, String, OperationClass);

/// Drives batch operations against provider adapters
///
/// Dispatch schedules are shared per provider, region and operation class,
/// so concurrent batches on one engine never exceed a region's rate limit.
#[derive(Debug, Default)]
pub struct OrchestrationEngine {
    limiters: Mutex<HashMap<LimiterKey, RateLimitedDispatcher>>,
}

impl OrchestrationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher on the shared schedule of this region and class, spaced at
    /// the rate `region` configures for the call at hand
    async fn dispatcher(&self, region: &RegionContext, class: OperationClass) -> RateLimitedDispatcher {
        let rate = match class {
            OperationClass::Create => region.limits.create_per_minute,
            OperationClass::Delete => region.limits.delete_rate(),
        };
        let key = (region.provider.clone(), region.region.clone(), class);
        let mut limiters = self.limiters.lock().await;
        limiters
            .entry(key)
            .or_insert_with(|| RateLimitedDispatcher::new(Some(rate)))
            .with_rate(Some(rate))
    }

    /// Create a batch of nodes and wait until each is active or failed
    #[tracing::instrument(
        skip_all,
        fields(provider = %region.provider, region = %region.region, count = specs.len())
    )]
    pub async fn create_nodes(
        &self,
        adapter: &dyn ProviderAdapter,
        region: &RegionContext,
        specs: &[NodeSpec],
    ) -> BatchReport<Node> {
        let started = Instant::now();
        let mut report = BatchReport::new();
        if specs.is_empty() {
            return report;
        }

        let preparation = match adapter.prepare(region).await {
            Ok(preparation) => preparation,
            Err(error) if error.fatal => {
                warn!(error = %error, "Preparation failed, aborting batch");
                report.errors.add_provider_error(&error, None);
                for spec in specs {
                    report.push(Node::failed(spec.tags.clone(), NodeStatus::error()), None);
                }
                return report.finish(started);
            }
            Err(error) => {
                debug!(error = %error, "Preparation reported a non-fatal error");
                report.errors.add_provider_error(&error, None);
                Preparation::default()
            }
        };

        let replies = self
            .dispatcher(region, OperationClass::Create)
            .await
            .dispatch(specs, |index, spec| {
                adapter.create_node(region, spec, &preparation, index)
            })
            .await;

        let mut raw_responses = Vec::with_capacity(specs.len());
        let mut query = Vec::new();
        let mut failed = Vec::new();

        for (index, (reply, spec)) in replies.into_iter().zip(specs).enumerate() {
            raw_responses.push(reply.raw);
            let mut node = reply.value;
            node.merge_tags(&spec.tags);
            let id = if node.has_id() {
                node.id.clone()
            } else {
                format!("node-{}", index)
            };

            match reply.error {
                Some(error) => {
                    if !node.status.is_error() {
                        node.status = NodeStatus::error();
                    }
                    report.errors.add_provider_error(&error, Some(id));
                    failed.push(TrackedNode::new(index, node, spec.tags.clone()));
                }
                None if !node.has_id() || node.status.is_error() => {
                    if !node.status.is_error() {
                        node.status = NodeStatus::error_with(NodeStatus::STATUS_UNDEFINED);
                    }
                    report.errors.add_error(
                        format!("node {} failed on submission with state {}", id, node.status),
                        None,
                        Some(id),
                        false,
                        ErrorCode::Unspecified,
                    );
                    failed.push(TrackedNode::new(index, node, spec.tags.clone()));
                }
                None => query.push(TrackedNode::new(index, node, spec.tags.clone())),
            }
        }

        info!(
            submitted = query.len(),
            failed = failed.len(),
            "Creation requests dispatched"
        );

        if !query.is_empty() {
            tokio::time::sleep(region.settle_delay()).await;
        }

        let poll =
            poller::poll_nodes_active(adapter, region, query, failed, &region.node_poll).await;
        report.errors.merge(poll.errors, None);
        report.convergence = Some(poll.outcome);

        let mut tracked = poll.nodes;
        tracked.sort_by_key(|t| t.origin);
        report.resources = tracked.into_iter().map(|t| t.node).collect();
        report.raw_responses = raw_responses;
        report.finish(started)
    }

    /// Delete a batch of nodes and wait until none of them is listed
    ///
    /// Confirmed nodes come back as `TERMINATED`; nodes whose delete request
    /// failed or that never disappeared are returned unchanged.
    #[tracing::instrument(
        skip_all,
        fields(provider = %region.provider, region = %region.region, count = nodes.len())
    )]
    pub async fn delete_nodes(
        &self,
        adapter: &dyn ProviderAdapter,
        region: &RegionContext,
        nodes: &[Node],
    ) -> BatchReport<Node> {
        let started = Instant::now();
        let mut report = BatchReport::new();
        if nodes.is_empty() {
            return report;
        }

        let replies = self
            .dispatcher(region, OperationClass::Delete)
            .await
            .dispatch(nodes, |_, node| adapter.delete_node(region, node))
            .await;

        let mut accepted = Vec::new();
        for (index, (reply, node)) in replies.into_iter().zip(nodes).enumerate() {
            match &reply.error {
                Some(error) => {
                    let id = if node.has_id() {
                        node.id.clone()
                    } else {
                        format!("node-{}", index)
                    };
                    report.errors.add_provider_error(error, Some(id));
                }
                None => accepted.push(node.id.clone()),
            }
            report.push(node.clone(), reply.raw);
        }

        if accepted.is_empty() {
            return report.finish(started);
        }

        let poll =
            poller::poll_nodes_deleted(adapter, region, accepted.clone(), &region.delete_poll)
                .await;
        report.convergence = Some(poll.outcome);

        for node in report.resources.iter_mut() {
            if accepted.contains(&node.id) && !poll.remaining.contains(&node.id) {
                node.status = NodeStatus::Terminated;
            }
        }
        report.errors.merge(poll.errors, None);

        info!(
            deleted = accepted.len() - poll.remaining.len(),
            remaining = poll.remaining.len(),
            "Deletion finished"
        );
        report.finish(started)
    }

    #[tracing::instrument(skip_all, fields(provider = %region.provider, region = %region.region))]
    pub async fn list_nodes(
        &self,
        adapter: &dyn ProviderAdapter,
        region: &RegionContext,
    ) -> Result<Vec<Node>, ProviderError> {
        adapter.list_nodes(region).await
    }

    #[tracing::instrument(skip_all, fields(provider = %region.provider, region = %region.region))]
    pub async fn list_images(
        &self,
        adapter: &dyn ProviderAdapter,
        region: &RegionContext,
    ) -> Result<Vec<Image>, ProviderError> {
        adapter.list_images(region).await
    }

    /// Capture an image and wait until it is active
    #[tracing::instrument(
        skip_all,
        fields(provider = %region.provider, region = %region.region, node_id = %spec.node_id)
    )]
    pub async fn create_image(
        &self,
        adapter: &dyn ProviderAdapter,
        region: &RegionContext,
        spec: &ImageSpec,
    ) -> BatchReport<Image> {
        let started = Instant::now();
        let mut report = BatchReport::new();

        let mut replies = self
            .dispatcher(region, OperationClass::Create)
            .await
            .dispatch(std::slice::from_ref(spec), |_, spec| adapter.create_image(region, spec))
            .await;
        let Some(reply) = replies.pop() else {
            return report.finish(started);
        };

        let image_id = match (reply.value, reply.error) {
            (_, Some(error)) => {
                report.errors.add_provider_error(&error, Some(spec.node_id.clone()));
                report.push(Image::new(String::new(), ImageStatus::Error), reply.raw);
                return report.finish(started);
            }
            (None, None) => {
                report.errors.add_error(
                    format!("no image id returned for node {}", spec.node_id),
                    None,
                    Some(spec.node_id.clone()),
                    false,
                    ErrorCode::Unspecified,
                );
                report.push(Image::new(String::new(), ImageStatus::Error), reply.raw);
                return report.finish(started);
            }
            (Some(image_id), None) => image_id,
        };

        let poll = poller::poll_image_active(adapter, region, &image_id, &region.image_poll).await;
        report.convergence = Some(poll.outcome);

        let image = match poll.image {
            Some(image) => image,
            None if poll.errors.is_empty() => Image::new(image_id.clone(), ImageStatus::Pending),
            None => Image::new(image_id.clone(), ImageStatus::Error),
        };
        report.errors.merge(poll.errors, Some(image_id.as_str()));
        report.push(image, reply.raw);
        report.finish(started)
    }

    /// Delete an image, refusing when it is listed in any state but `ACTIVE`
    ///
    /// An image missing from the listing is deleted anyway; the provider
    /// decides whether that is an error.
    #[tracing::instrument(
        skip_all,
        fields(provider = %region.provider, region = %region.region, image_id = %image_id)
    )]
    pub async fn delete_image(
        &self,
        adapter: &dyn ProviderAdapter,
        region: &RegionContext,
        image_id: &str,
    ) -> BatchReport<OperationResult> {
        let started = Instant::now();
        let mut report = BatchReport::new();
        let target = image_id.to_string();

        let images = match adapter.list_images(region).await {
            Ok(images) => images,
            Err(error) => {
                report.errors.add_provider_error(&error, Some(target.clone()));
                report.push(
                    OperationResult {
                        target,
                        succeeded: false,
                    },
                    None,
                );
                return report.finish(started);
            }
        };

        if let Some(image) = images.iter().find(|i| i.id == image_id) {
            if image.status != ImageStatus::Active {
                warn!(status = %image.status, "Refusing to delete image that is not active");
                report.errors.add_error(
                    format!(
                        "image {} is in state {}, only ACTIVE images can be deleted",
                        image_id, image.status
                    ),
                    None,
                    Some(target.clone()),
                    true,
                    ErrorCode::InvalidRequest,
                );
                report.push(
                    OperationResult {
                        target,
                        succeeded: false,
                    },
                    None,
                );
                return report.finish(started);
            }
        }

        let ids = [target];
        self.dispatch_operations(region, OperationClass::Delete, &ids, String::clone, |_, id| {
            adapter.delete_image(region, id)
        })
        .await
        .finish(started)
    }

    #[tracing::instrument(
        skip_all,
        fields(provider = %region.provider, region = %region.region, count = pairs.len())
    )]
    pub async fn associate_addresses(
        &self,
        adapter: &dyn ProviderAdapter,
        region: &RegionContext,
        pairs: &[AddressPair],
    ) -> BatchReport<OperationResult> {
        let started = Instant::now();
        self.dispatch_operations(
            region,
            OperationClass::Create,
            pairs,
            |pair| pair.public_ip.clone(),
            |_, pair| adapter.associate_address(region, pair),
        )
        .await
        .finish(started)
    }

    #[tracing::instrument(
        skip_all,
        fields(provider = %region.provider, region = %region.region, count = public_ips.len())
    )]
    pub async fn disassociate_addresses(
        &self,
        adapter: &dyn ProviderAdapter,
        region: &RegionContext,
        public_ips: &[String],
    ) -> BatchReport<OperationResult> {
        let started = Instant::now();
        self.dispatch_operations(
            region,
            OperationClass::Create,
            public_ips,
            String::clone,
            |_, ip| adapter.disassociate_address(region, ip),
        )
        .await
        .finish(started)
    }

    /// Allocate `count` public addresses
    ///
    /// Every slot of the report holds the allocated address, or `None` when
    /// that allocation failed.
    #[tracing::instrument(
        skip_all,
        fields(provider = %region.provider, region = %region.region, count = count)
    )]
    pub async fn allocate_addresses(
        &self,
        adapter: &dyn ProviderAdapter,
        region: &RegionContext,
        count: usize,
    ) -> BatchReport<Option<String>> {
        let started = Instant::now();
        let mut report = BatchReport::new();
        let slots: Vec<usize> = (0..count).collect();

        let replies = self
            .dispatcher(region, OperationClass::Create)
            .await
            .dispatch(&slots, |_, _| adapter.allocate_address(region))
            .await;

        for (index, reply) in replies.into_iter().enumerate() {
            let id = format!("IP-{}", index + 1);
            match (&reply.value, &reply.error) {
                (_, Some(error)) => report.errors.add_provider_error(error, Some(id)),
                (None, None) => report.errors.add_error(
                    format!("{} was not created", id),
                    None,
                    Some(id),
                    false,
                    ErrorCode::Unspecified,
                ),
                (Some(_), None) => {}
            }
            let address = if reply.error.is_none() { reply.value } else { None };
            report.push(address, reply.raw);
        }

        info!(
            allocated = report.resources.iter().filter(|a| a.is_some()).count(),
            "Address allocation finished"
        );
        report.finish(started)
    }

    #[tracing::instrument(
        skip_all,
        fields(provider = %region.provider, region = %region.region, count = public_ips.len())
    )]
    pub async fn release_addresses(
        &self,
        adapter: &dyn ProviderAdapter,
        region: &RegionContext,
        public_ips: &[String],
    ) -> BatchReport<OperationResult> {
        let started = Instant::now();
        self.dispatch_operations(
            region,
            OperationClass::Delete,
            public_ips,
            String::clone,
            |_, ip| adapter.release_address(region, ip),
        )
        .await
        .finish(started)
    }

    /// Grant or revoke launch permission on each image for one account
    #[tracing::instrument(
        skip_all,
        fields(
            provider = %region.provider,
            region = %region.region,
            change = %change,
            account_id = %account_id
        )
    )]
    pub async fn modify_launch_permissions(
        &self,
        adapter: &dyn ProviderAdapter,
        region: &RegionContext,
        image_ids: &[String],
        account_id: &str,
        change: LaunchPermissionChange,
    ) -> BatchReport<OperationResult> {
        let started = Instant::now();
        self.dispatch_operations(
            region,
            OperationClass::Create,
            image_ids,
            String::clone,
            |_, image_id| adapter.modify_launch_permission(region, image_id, account_id, change),
        )
        .await
        .finish(started)
    }

    #[tracing::instrument(
        skip_all,
        fields(provider = %region.provider, region = %region.region, count = image_ids.len())
    )]
    pub async fn reset_launch_permissions(
        &self,
        adapter: &dyn ProviderAdapter,
        region: &RegionContext,
        image_ids: &[String],
    ) -> BatchReport<OperationResult> {
        let started = Instant::now();
        self.dispatch_operations(
            region,
            OperationClass::Create,
            image_ids,
            String::clone,
            |_, image_id| adapter.reset_launch_permissions(region, image_id),
        )
        .await
        .finish(started)
    }

    /// Accounts allowed to launch each image, one entry per image
    #[tracing::instrument(
        skip_all,
        fields(provider = %region.provider, region = %region.region, count = image_ids.len())
    )]
    pub async fn get_launch_permissions(
        &self,
        adapter: &dyn ProviderAdapter,
        region: &RegionContext,
        image_ids: &[String],
    ) -> BatchReport<Vec<String>> {
        let started = Instant::now();
        let mut report = BatchReport::new();

        let replies = self
            .dispatcher(region, OperationClass::Create)
            .await
            .dispatch(image_ids, |_, image_id| {
                adapter.get_launch_permissions(region, image_id)
            })
            .await;

        for (reply, image_id) in replies.into_iter().zip(image_ids) {
            if let Some(error) = &reply.error {
                report.errors.add_provider_error(error, Some(image_id.clone()));
            }
            report.push(reply.value, reply.raw);
        }
        report.finish(started)
    }

    /// Dispatch one payload-free call per item and record each outcome
    async fn dispatch_operations<'a, T, F, Fut>(
        &self,
        region: &RegionContext,
        class: OperationClass,
        items: &'a [T],
        target: fn(&T) -> String,
        op: F,
    ) -> BatchReport<OperationResult>
    where
        F: Fn(usize, &'a T) -> Fut,
        Fut: Future<Output = Reply<()>>,
    {
        let mut report = BatchReport::new();
        let replies = self.dispatcher(region, class).await.dispatch(items, op).await;

        for (reply, item) in replies.into_iter().zip(items) {
            let target = target(item);
            if let Some(error) = &reply.error {
                report.errors.add_provider_error(error, Some(target.clone()));
            }
            report.push(
                OperationResult {
                    target,
                    succeeded: reply.error.is_none(),
                },
                reply.raw,
            );
        }

        let failed = report.resources.iter().filter(|r| !r.succeeded).count();
        debug!(total = report.resources.len(), failed, "Operations dispatched");
        report
    }
}
