//! Provider adapter trait definition

use crate::error::ProviderError;
use crate::model::{AddressPair, Image, ImageSpec, LaunchPermissionChange, Node, NodeSpec};
use crate::region::RegionContext;
use async_trait::async_trait;

/// Outcome of one adapter call
///
/// A reply always carries a value so the engine can keep input and output
/// positions aligned. On failure the value describes the failed resource
/// (e.g. a node in `ERROR` state) and `error` holds the normalized cause.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    pub value: T,

    /// Raw provider response, kept for callers that need provider details
    pub raw: Option<serde_json::Value>,

    pub error: Option<ProviderError>,
}

impl<T> Reply<T> {
    pub fn ok(value: T) -> Self {
        Self {
            value,
            raw: None,
            error: None,
        }
    }

    pub fn failed(value: T, error: ProviderError) -> Self {
        Self {
            value,
            raw: None,
            error: Some(error),
        }
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl<T: Default> Reply<T> {
    pub fn err(error: ProviderError) -> Self {
        Self::failed(T::default(), error)
    }
}

/// Opaque result of the adapter's one-time preparation hook
///
/// Handed unchanged to every `create_node` call of the batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preparation(pub serde_json::Value);

/// Cloud provider abstraction trait
///
/// One implementation per provider. Every call is a single request/response
/// pair: adapters must never wait for convergence themselves, and every
/// error they return must already be normalized into a [`ProviderError`].
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Returns the provider name (e.g., "aws", "azure")
    fn name(&self) -> &str;

    /// One-time hook run before a creation batch (security groups, key pairs).
    /// A fatal error aborts the whole batch.
    async fn prepare(&self, _region: &RegionContext) -> Result<Preparation, ProviderError> {
        Ok(Preparation::default())
    }

    /// Submit one creation request. Returns a `PENDING` node, or an `ERROR`
    /// node (possibly without id) together with the cause.
    async fn create_node(
        &self,
        region: &RegionContext,
        spec: &NodeSpec,
        preparation: &Preparation,
        index: usize,
    ) -> Reply<Node>;

    async fn delete_node(&self, region: &RegionContext, node: &Node) -> Reply<()>;

    /// Full snapshot of the region's nodes
    async fn list_nodes(&self, region: &RegionContext) -> Result<Vec<Node>, ProviderError>;

    /// Start capturing an image. The value is the new image id, if any.
    async fn create_image(&self, region: &RegionContext, spec: &ImageSpec)
    -> Reply<Option<String>>;

    async fn list_images(&self, region: &RegionContext) -> Result<Vec<Image>, ProviderError>;

    async fn delete_image(&self, region: &RegionContext, image_id: &str) -> Reply<()>;

    async fn associate_address(&self, region: &RegionContext, pair: &AddressPair) -> Reply<()>;

    async fn disassociate_address(&self, region: &RegionContext, public_ip: &str) -> Reply<()>;

    /// Allocate one public address. The value is the address, if any.
    async fn allocate_address(&self, _region: &RegionContext) -> Reply<Option<String>> {
        Reply::err(ProviderError::unsupported(self.name(), "allocate address"))
    }

    async fn release_address(&self, _region: &RegionContext, _public_ip: &str) -> Reply<()> {
        Reply::err(ProviderError::unsupported(self.name(), "release address"))
    }

    async fn modify_launch_permission(
        &self,
        _region: &RegionContext,
        _image_id: &str,
        _account_id: &str,
        _change: LaunchPermissionChange,
    ) -> Reply<()> {
        Reply::err(ProviderError::unsupported(self.name(), "launch permissions"))
    }

    async fn reset_launch_permissions(&self, _region: &RegionContext, _image_id: &str) -> Reply<()> {
        Reply::err(ProviderError::unsupported(self.name(), "launch permissions"))
    }

    /// Account ids allowed to launch the image
    async fn get_launch_permissions(
        &self,
        _region: &RegionContext,
        _image_id: &str,
    ) -> Reply<Vec<String>> {
        Reply::err(ProviderError::unsupported(self.name(), "launch permissions"))
    }
}
