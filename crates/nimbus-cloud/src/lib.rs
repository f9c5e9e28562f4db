//! Nimbus Cloud Orchestration
//!
//! This crate drives batches of provisioning operations (nodes, images,
//! public addresses) against independently operated cloud providers through
//! one normalized API.
//!
//! Providers are asynchronous and eventually consistent: a create request
//! returns long before the node exists. The engine therefore submits every
//! request of a batch on a rate-limited stagger, then polls the provider's
//! listing until each resource is active, failed or gone, and reports one
//! result per input item together with every error observed on the way.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                     Caller                       │
//! │       (create_nodes / delete_nodes / ...)        │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │              OrchestrationEngine                 │
//! │  ┌──────────────────┐  ┌──────────────────────┐ │
//! │  │ RateLimited      │  │ Reconciliation       │ │
//! │  │ Dispatcher       │─▶│ Poller               │ │
//! │  └──────────────────┘  └──────────────────────┘ │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │             ErrorAggregator              │   │
//! │  └──────────────────────────────────────────┘   │
//! └─────────────────┬───────────────────────────────┘
//!                   │ trait ProviderAdapter
//!         ┌─────────┴─────────┐
//! ┌───────▼───────┐   ┌───────▼───────┐
//! │  aws adapter  │   │ other adapter │
//! │ (SigV4 calls) │   │               │
//! └───────────────┘   └───────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use nimbus_cloud::{Credentials, NodeSpec, OrchestrationEngine, ProviderAdapter, RegionContext};
//!
//! async fn launch(adapter: &dyn ProviderAdapter) {
//!     let region = RegionContext::new("aws", "us-east-1", Credentials::new("AKID", "secret"));
//!     let specs = vec![NodeSpec::new("ami-12345678", "m1.small").with_tag("Name", "web-1")];
//!
//!     let report = OrchestrationEngine::new()
//!         .create_nodes(adapter, &region, &specs)
//!         .await;
//!
//!     if let Some(error) = report.error() {
//!         eprintln!("{}", error);
//!     }
//! }
//! ```

pub mod aggregate;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod model;
pub mod poller;
pub mod provider;
pub mod region;
pub mod report;

// Re-exports
pub use aggregate::{ErrorAggregator, ErrorRecord};
pub use dispatch::RateLimitedDispatcher;
pub use engine::OrchestrationEngine;
pub use error::{CloudError, ErrorCode, ErrorKind, ProviderError, Result};
pub use model::{
    AddressPair, Addresses, Image, ImageSpec, ImageStatus, LaunchPermissionChange, Node, NodeSpec,
    NodeStatus, OperationResult, Tags,
};
pub use poller::{
    CreatePoll, DeletePoll, ImagePoll, PollOutcome, TrackedNode, poll_image_active,
    poll_nodes_active, poll_nodes_deleted,
};
pub use provider::{Preparation, ProviderAdapter, Reply};
pub use region::{Credentials, DEFAULT_RATE_PER_MINUTE, PollBudget, RateLimits, RegionContext};
pub use report::{BatchReport, NodeSummary};
