//! EC2 plumbing for Nimbus
//!
//! Everything an AWS [`ProviderAdapter`](nimbus_cloud::ProviderAdapter)
//! needs below response shaping:
//!
//! - [`signing`]: Signature Version 4 for query-protocol requests
//! - [`endpoint`]: region to host mapping
//! - [`client`]: signed transport with timeout, proxy and endpoint override
//! - [`error`]: native XML errors normalized into `ProviderError`
//! - [`status`]: EC2 state names mapped onto canonical statuses

pub mod client;
pub mod endpoint;
pub mod error;
pub mod signing;
pub mod status;

pub use client::{API_VERSION, ClientConfig, DEFAULT_TIMEOUT, Ec2Client, SERVICE};
pub use endpoint::{domain_suffix, ec2_host};
pub use error::{AwsError, FATAL_CODES, Result, lookup_code, normalize_error_body};
pub use signing::{HttpMethod, SignedRequest, UnsignedRequest, sign};
pub use status::{image_status, instance_status};
