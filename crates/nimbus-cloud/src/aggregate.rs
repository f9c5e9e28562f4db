//! Multi-error aggregation
//!
//! A batch collects every failure it observes into one [`ErrorAggregator`].
//! Each record keeps its own correlation id, so "3 of 5 nodes failed" can be
//! reported without losing which nodes failed or why.

use crate::error::{ErrorCode, ProviderError};
use serde::{Deserialize, Serialize};

/// A single failure inside an aggregated error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Links the record back to the resource or request that produced it
    pub correlation_id: Option<String>,

    /// Human readable message
    pub message: String,

    pub fatal: bool,

    /// Normalized error code
    pub code: ErrorCode,

    /// Provider-native error code, when the provider reported one
    pub provider_code: Option<String>,

    /// Provider-native error message
    pub provider_message: Option<String>,

    /// Opaque provider-specific payload
    pub details: Option<serde_json::Value>,
}

impl ErrorRecord {
    pub fn from_provider(error: &ProviderError, correlation_id: Option<String>) -> Self {
        Self {
            correlation_id,
            message: error.message.clone(),
            fatal: error.fatal,
            code: error.code,
            provider_code: error.provider_code.clone(),
            provider_message: error.provider_message.clone(),
            details: error.details.clone(),
        }
    }
}

/// Ordered collection of error records
///
/// The aggregator's fatal flag is never stored: it is always the OR of its
/// members, so it cannot drift from the records it summarizes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorAggregator {
    records: Vec<ErrorRecord>,
}

impl ErrorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new record
    pub fn add_error(
        &mut self,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
        correlation_id: Option<String>,
        fatal: bool,
        code: ErrorCode,
    ) {
        self.records.push(ErrorRecord {
            correlation_id,
            message: message.into(),
            fatal,
            code,
            provider_code: None,
            provider_message: None,
            details,
        });
    }

    /// Append a normalized provider error, keeping its provider-native fields
    pub fn add_provider_error(&mut self, error: &ProviderError, correlation_id: Option<String>) {
        self.records
            .push(ErrorRecord::from_provider(error, correlation_id));
    }

    pub fn push(&mut self, record: ErrorRecord) {
        self.records.push(record);
    }

    /// Append every record of `other`
    ///
    /// With a `correlation_id`, the merged records are relabeled. When
    /// `other` holds more than one record, each relabeled id gets an index
    /// suffix (`id-0`, `id-1`, ...) so the records stay distinguishable.
    pub fn merge(&mut self, other: ErrorAggregator, correlation_id: Option<&str>) {
        let relabel_with_index = other.records.len() > 1;
        for (index, mut record) in other.records.into_iter().enumerate() {
            if let Some(id) = correlation_id {
                record.correlation_id = Some(if relabel_with_index {
                    format!("{}-{}", id, index)
                } else {
                    id.to_string()
                });
            }
            self.records.push(record);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_fatal(&self) -> bool {
        self.records.iter().any(|r| r.fatal)
    }

    /// `None` when nothing was recorded, the aggregator itself otherwise
    pub fn as_failure_or_nil(&self) -> Option<&Self> {
        if self.is_empty() { None } else { Some(self) }
    }

    /// Owned variant of [`as_failure_or_nil`](Self::as_failure_or_nil)
    pub fn into_failure_or_nil(self) -> Option<Self> {
        if self.is_empty() { None } else { Some(self) }
    }

    pub fn first_fatal(&self) -> Option<&ErrorRecord> {
        self.records.iter().find(|r| r.fatal)
    }

    pub fn all_fatal(&self) -> Vec<&ErrorRecord> {
        self.records.iter().filter(|r| r.fatal).collect()
    }

    pub fn get_by_id(&self, correlation_id: &str) -> Option<&ErrorRecord> {
        self.records
            .iter()
            .find(|r| r.correlation_id.as_deref() == Some(correlation_id))
    }

    pub fn first(&self) -> Option<&ErrorRecord> {
        self.records.first()
    }

    /// Normalized code of the first record
    pub fn code(&self) -> Option<ErrorCode> {
        self.first().map(|r| r.code)
    }

    pub fn provider_code(&self) -> Option<&str> {
        self.first().and_then(|r| r.provider_code.as_deref())
    }

    pub fn provider_message(&self) -> Option<&str> {
        self.first().and_then(|r| r.provider_message.as_deref())
    }

    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.records.iter()
    }
}

impl std::fmt::Display for ErrorAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, record) in self.records.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            match &record.correlation_id {
                Some(id) => write!(f, "[{}] {}", id, record.message)?,
                None => write!(f, "{}", record.message)?,
            }
        }
        Ok(())
    }
}

impl std::error::Error for ErrorAggregator {}

impl Extend<ErrorRecord> for ErrorAggregator {
    fn extend<I: IntoIterator<Item = ErrorRecord>>(&mut self, iter: I) {
        self.records.extend(iter);
    }
}

impl IntoIterator for ErrorAggregator {
    type Item = ErrorRecord;
    type IntoIter = std::vec::IntoIter<ErrorRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
