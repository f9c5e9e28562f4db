//! Provider-neutral resource model
//!
//! Adapters translate their native payloads into these types so the
//! engine and the poller never look at provider-specific shapes.

use crate::error::CloudError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::str::FromStr;

pub type Tags = BTreeMap<String, String>;

/// Lifecycle state of a node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeStatus {
    Pending,
    Active,
    Terminated,
    /// The provider stopped listing the node
    NotFound,
    /// Error state, optionally qualified (`ERROR_QUOTA`, `ERROR_NO_LONGER_FOUND`)
    Error { reason: Option<String> },
}

impl NodeStatus {
    /// Reason used when a node disappears from listings while being created
    pub const NO_LONGER_FOUND: &'static str = "NO_LONGER_FOUND";

    /// Reason used when the provider reports a state we do not map
    pub const STATUS_UNDEFINED: &'static str = "STATUS_UNDEFINED";

    /// Reason used when the provider rejected the tagging request
    pub const TAGS: &'static str = "TAGS";

    pub fn error() -> Self {
        NodeStatus::Error { reason: None }
    }

    pub fn error_with(reason: impl Into<String>) -> Self {
        NodeStatus::Error {
            reason: Some(reason.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, NodeStatus::Error { .. })
    }

    /// Terminal for creation: the node will not change state by waiting
    pub fn is_terminal(&self) -> bool {
        !matches!(self, NodeStatus::Pending)
    }

    /// The node no longer exists from the provider's point of view
    pub fn is_gone(&self) -> bool {
        matches!(self, NodeStatus::Terminated | NodeStatus::NotFound)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Pending => write!(f, "PENDING"),
            NodeStatus::Active => write!(f, "ACTIVE"),
            NodeStatus::Terminated => write!(f, "TERMINATED"),
            NodeStatus::NotFound => write!(f, "NOT_FOUND"),
            NodeStatus::Error { reason: None } => write!(f, "ERROR"),
            NodeStatus::Error {
                reason: Some(reason),
            } => write!(f, "ERROR_{}", reason),
        }
    }
}

impl FromStr for NodeStatus {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(NodeStatus::Pending),
            "ACTIVE" => Ok(NodeStatus::Active),
            "TERMINATED" => Ok(NodeStatus::Terminated),
            "NOT_FOUND" => Ok(NodeStatus::NotFound),
            "ERROR" => Ok(NodeStatus::error()),
            other => match other.strip_prefix("ERROR_") {
                Some(reason) if !reason.is_empty() => Ok(NodeStatus::error_with(reason)),
                _ => Err(CloudError::InvalidStatus(other.to_string())),
            },
        }
    }
}

impl Serialize for NodeStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Public/private address pair of a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addresses {
    pub private: Option<String>,
    pub public: Option<String>,
}

/// A compute instance as seen by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Provider-assigned id. Empty when the provider never assigned one.
    #[serde(default)]
    pub id: String,

    pub status: NodeStatus,

    #[serde(default)]
    pub addresses: Addresses,

    #[serde(default)]
    pub tags: Tags,

    /// Provider-specific payload kept for the caller
    #[serde(default)]
    pub release_info: serde_json::Value,
}

impl Node {
    pub fn new(id: impl Into<String>, status: NodeStatus) -> Self {
        Self {
            id: id.into(),
            status,
            addresses: Addresses::default(),
            tags: Tags::new(),
            release_info: serde_json::Value::Null,
        }
    }

    /// Node that failed before the provider assigned an id
    pub fn failed(tags: Tags, status: NodeStatus) -> Self {
        Self {
            tags,
            ..Self::new(String::new(), status)
        }
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_addresses(mut self, private: Option<String>, public: Option<String>) -> Self {
        self.addresses = Addresses { private, public };
        self
    }

    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }

    /// Overlay `tags` on top of the node's own tags
    pub fn merge_tags(&mut self, tags: &Tags) {
        for (k, v) in tags {
            self.tags.insert(k.clone(), v.clone());
        }
    }
}

/// Lifecycle state of a machine image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageStatus {
    Pending,
    Active,
    Error,
}

impl std::fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageStatus::Pending => write!(f, "PENDING"),
            ImageStatus::Active => write!(f, "ACTIVE"),
            ImageStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// A machine image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub status: ImageStatus,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Tags,
}

impl Image {
    pub fn new(id: impl Into<String>, status: ImageStatus) -> Self {
        Self {
            id: id.into(),
            status,
            name: None,
            creation_time: None,
            tags: Tags::new(),
        }
    }
}

/// What the caller wants a new node to look like
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub image_id: String,
    pub instance_type: String,
    #[serde(default)]
    pub key_name: Option<String>,
    #[serde(default)]
    pub security_groups: Vec<String>,
    #[serde(default)]
    pub user_data: Option<String>,

    /// Caller tags. These are reapplied over provider snapshots during polling.
    #[serde(default)]
    pub tags: Tags,

    /// Provider-specific parameters passed through untouched
    #[serde(default)]
    pub vendor_params: serde_json::Value,
}

impl NodeSpec {
    pub fn new(image_id: impl Into<String>, instance_type: impl Into<String>) -> Self {
        Self {
            image_id: image_id.into(),
            instance_type: instance_type.into(),
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Request to capture an image from a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub node_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub vendor_params: serde_json::Value,
}

/// Public address and the node it is (or will be) attached to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPair {
    pub public_ip: String,
    pub instance_id: String,
}

impl AddressPair {
    pub fn new(public_ip: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            public_ip: public_ip.into(),
            instance_id: instance_id.into(),
        }
    }
}

/// Outcome of an operation with no resource payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    /// What the operation was applied to (address, image id, account id)
    pub target: String,
    pub succeeded: bool,
}

/// Direction of a launch permission change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchPermissionChange {
    Add,
    Remove,
}

impl std::fmt::Display for LaunchPermissionChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchPermissionChange::Add => write!(f, "add"),
            LaunchPermissionChange::Remove => write!(f, "remove"),
        }
    }
}
