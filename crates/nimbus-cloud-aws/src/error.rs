//! EC2 plumbing errors and native error normalization

use nimbus_cloud::{ErrorCode, ProviderError};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("request signing failed: {0}")]
    Signing(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Provider(#[from] ProviderError),
}

pub type Result<T> = std::result::Result<T, AwsError>;

impl From<AwsError> for ProviderError {
    fn from(error: AwsError) -> Self {
        match error {
            AwsError::Http(e) => ProviderError::transport(format!("problem in request: {}", e)),
            AwsError::Provider(e) => e,
            AwsError::Xml(e) => ProviderError::resource(
                format!("bad XML in response: {}", e),
                ErrorCode::Unspecified,
                false,
            ),
            AwsError::Signing(msg) | AwsError::InvalidConfig(msg) => {
                ProviderError::resource(msg, ErrorCode::InvalidRequest, true)
            }
        }
    }
}

/// Native codes that stop a batch, with the normalized code they map to
///
/// A table entry matches the code itself or any `Entry.Sub` refinement.
pub const FATAL_CODES: &[(&str, ErrorCode)] = &[
    ("AuthFailure", ErrorCode::AuthError),
    ("UnauthorizedOperation", ErrorCode::AuthError),
    ("Blocked", ErrorCode::AccountBlocked),
    ("ValidationError", ErrorCode::InvalidRequest),
    ("InvalidAction", ErrorCode::InvalidRequest),
    ("InvalidParameterValue", ErrorCode::InvalidRequest),
    ("InvalidAMIAttributeItemValue", ErrorCode::InvalidRequest),
    ("InvalidParameterCombination", ErrorCode::InvalidRequest),
    ("RequestLimitExceeded", ErrorCode::AccountLimitsExceeded),
    ("InvalidAMIID", ErrorCode::ImageNotFound),
    ("InvalidGroup", ErrorCode::ResourceNotFound),
    ("InvalidKey", ErrorCode::ResourceNotFound),
    ("InvalidKeyPair", ErrorCode::ResourceNotFound),
    ("InsufficientInstanceCapacity", ErrorCode::InsufficientInstanceCapacity),
];

fn matches_entry(code: &str, entry: &str) -> bool {
    match code.strip_prefix(entry) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('.')
            .is_some_and(|sub| !sub.is_empty() && sub.chars().all(|c| c.is_alphanumeric() || c == '_')),
        None => false,
    }
}

/// Look up a native code in the fatal table
pub fn lookup_code(code: &str) -> Option<ErrorCode> {
    FATAL_CODES
        .iter()
        .find(|(entry, _)| matches_entry(code, entry))
        .map(|(_, normalized)| *normalized)
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    /// EC2: `<Response><Errors><Error>...`
    #[serde(rename = "Errors", default)]
    errors: Option<ErrorList>,

    /// IAM: `<ErrorResponse><Error>...`
    #[serde(rename = "Error", default)]
    error: Option<ErrorEntry>,

    #[serde(rename = "RequestID", alias = "RequestId", default)]
    request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorList {
    #[serde(rename = "Error", default)]
    entries: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    #[serde(rename = "Code")]
    code: String,

    #[serde(rename = "Message", default)]
    message: Option<String>,
}

/// Which API family produced an error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorFamily {
    Ec2,
    Iam,
}

/// Turn a non-2xx response into a normalized `ProviderError`
///
/// EC2 errors are fatal when any listed code is in [`FATAL_CODES`]. IAM
/// errors are never fatal. Bodies that are not recognizable error documents
/// become a non-fatal `unspecified-error` carrying the raw body.
pub fn normalize_error_body(body: &str, status: u16) -> ProviderError {
    let envelope = match quick_xml::de::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(status, error = %e, "unparseable error body");
            return unrecognized(body, status);
        }
    };

    let (family, entries) = match (envelope.errors, envelope.error) {
        (Some(list), _) if !list.entries.is_empty() => (ErrorFamily::Ec2, list.entries),
        (_, Some(entry)) => (ErrorFamily::Iam, vec![entry]),
        _ => return unrecognized(body, status),
    };

    let first = &entries[0];
    let fatal = family == ErrorFamily::Ec2 && entries.iter().any(|e| lookup_code(&e.code).is_some());
    let code = first
        .code
        .split('.')
        .next()
        .and_then(lookup_code)
        .unwrap_or(ErrorCode::Unspecified);
    let provider_message = first.message.clone().unwrap_or_default();

    let details = serde_json::json!({
        "status": status,
        "family": match family {
            ErrorFamily::Ec2 => "ec2",
            ErrorFamily::Iam => "iam",
        },
        "requestId": envelope.request_id,
        "errors": entries
            .iter()
            .map(|e| serde_json::json!({"code": e.code, "message": e.message}))
            .collect::<Vec<_>>(),
    });

    ProviderError::resource(
        format!("{}: {}", first.code, provider_message),
        code,
        fatal,
    )
    .with_provider_error(first.code.clone(), provider_message)
    .with_details(details)
}

fn unrecognized(body: &str, status: u16) -> ProviderError {
    ProviderError::resource(
        format!("request failed with status {}", status),
        ErrorCode::Unspecified,
        false,
    )
    .with_details(serde_json::json!({"status": status, "body": body}))
}
