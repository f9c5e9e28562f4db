//! EC2 state names mapped onto the canonical status vocabulary

use nimbus_cloud::{ImageStatus, NodeStatus};

/// Map an `instanceState.name` value
///
/// Stopped or stopping instances are not usable nodes and surface as
/// `ERROR_STOPPED` / `ERROR_STOPPING`.
pub fn instance_status(state: &str) -> NodeStatus {
    match state {
        "pending" => NodeStatus::Pending,
        "running" => NodeStatus::Active,
        "shutting-down" | "terminated" => NodeStatus::Terminated,
        other => NodeStatus::error_with(other.to_uppercase().replace('-', "_")),
    }
}

/// Map an `imageState` value
pub fn image_status(state: &str) -> ImageStatus {
    match state {
        "available" => ImageStatus::Active,
        "pending" => ImageStatus::Pending,
        _ => ImageStatus::Error,
    }
}
