//! Cloud provider error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine-level errors
///
/// These never describe a single resource's failure; per-resource failures
/// travel inside an [`ErrorAggregator`](crate::aggregate::ErrorAggregator).
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// Normalized error codes shared by every provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    #[serde(rename = "authorization-error")]
    AuthError,
    AccountBlocked,
    InvalidRequest,
    AccountLimitsExceeded,
    ImageNotFound,
    ResourceNotFound,
    #[serde(rename = "unspecified-error")]
    Unspecified,
    InsufficientInstanceCapacity,
    /// Poll budget ran out while resources were still converging
    PollingTimeout,
    /// Some resources of a batch ended in an error state
    PartialFailure,
    /// Reconciliation was asked to converge an empty set
    NothingToPoll,
    UnsupportedOperation,
    TransportError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthError => "authorization-error",
            ErrorCode::AccountBlocked => "account-blocked",
            ErrorCode::InvalidRequest => "invalid-request",
            ErrorCode::AccountLimitsExceeded => "account-limits-exceeded",
            ErrorCode::ImageNotFound => "image-not-found",
            ErrorCode::ResourceNotFound => "resource-not-found",
            ErrorCode::Unspecified => "unspecified-error",
            ErrorCode::InsufficientInstanceCapacity => "insufficient-instance-capacity",
            ErrorCode::PollingTimeout => "polling-timeout",
            ErrorCode::PartialFailure => "partial-failure",
            ErrorCode::NothingToPoll => "nothing-to-poll",
            ErrorCode::UnsupportedOperation => "unsupported-operation",
            ErrorCode::TransportError => "transport-error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a provider error came from the network or from the provider itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request never produced a provider answer (connection, timeout, parse)
    Transport,
    /// The provider answered and rejected the request
    Resource,
}

/// A provider error, already normalized by the adapter that produced it
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
    pub kind: ErrorKind,
    pub fatal: bool,
    pub code: ErrorCode,
    pub provider_code: Option<String>,
    pub provider_message: Option<String>,
    pub details: Option<serde_json::Value>,
}

impl ProviderError {
    /// A network-level failure. Never fatal on its own.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::Transport,
            fatal: false,
            code: ErrorCode::TransportError,
            provider_code: None,
            provider_message: None,
            details: None,
        }
    }

    /// A failure reported by the provider for a specific request
    pub fn resource(message: impl Into<String>, code: ErrorCode, fatal: bool) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::Resource,
            fatal,
            code,
            provider_code: None,
            provider_message: None,
            details: None,
        }
    }

    /// The adapter does not implement an optional operation
    pub fn unsupported(provider: &str, operation: &str) -> Self {
        Self::resource(
            format!("{} not supported for this provider: {}", operation, provider),
            ErrorCode::UnsupportedOperation,
            true,
        )
    }

    pub fn with_provider_error(
        mut self,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.provider_code = Some(code.into());
        self.provider_message = Some(message.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn is_transport(&self) -> bool {
        self.kind == ErrorKind::Transport
    }
}
