//! Per-region operating context
//!
//! A [`RegionContext`] bundles everything an operation needs to talk to one
//! provider region: credentials, rate limits and poll budgets.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Operations per minute applied when a region does not configure one
pub const DEFAULT_RATE_PER_MINUTE: u32 = 20;

/// Access credentials for a provider account
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Operations per minute, per operation class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    #[serde(default = "default_rate")]
    pub create_per_minute: u32,

    /// Falls back to `create_per_minute` when unset
    #[serde(default)]
    pub delete_per_minute: Option<u32>,
}

fn default_rate() -> u32 {
    DEFAULT_RATE_PER_MINUTE
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            create_per_minute: DEFAULT_RATE_PER_MINUTE,
            delete_per_minute: None,
        }
    }
}

impl RateLimits {
    pub fn per_minute(limit: u32) -> Self {
        Self {
            create_per_minute: limit,
            delete_per_minute: None,
        }
    }

    pub fn delete_rate(&self) -> u32 {
        self.delete_per_minute.unwrap_or(self.create_per_minute)
    }
}

/// Poll loop budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollBudget {
    /// Total list calls the loop may make
    pub max_attempts: u32,

    /// Delay between consecutive list calls
    pub interval_ms: u64,

    /// Failed list calls tolerated; the next failure ends the loop.
    /// Defaults to `max_attempts`.
    #[serde(default)]
    pub max_list_failures: Option<u32>,
}

impl PollBudget {
    pub fn new(max_attempts: u32, interval_ms: u64) -> Self {
        Self {
            max_attempts,
            interval_ms,
            max_list_failures: None,
        }
    }

    pub fn with_max_list_failures(mut self, failures: u32) -> Self {
        self.max_list_failures = Some(failures);
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn list_failure_budget(&self) -> u32 {
        self.max_list_failures.unwrap_or(self.max_attempts)
    }

    /// 10s x 180, used while waiting for new nodes
    pub fn default_node() -> Self {
        Self::new(180, 10_000)
    }

    /// 10s x 180, used while waiting for nodes to disappear
    pub fn default_delete() -> Self {
        Self::new(180, 10_000)
    }

    /// 5s x 84, used while waiting for images
    pub fn default_image() -> Self {
        Self::new(84, 5_000)
    }
}

fn default_node_poll() -> PollBudget {
    PollBudget::default_node()
}

fn default_delete_poll() -> PollBudget {
    PollBudget::default_delete()
}

fn default_image_poll() -> PollBudget {
    PollBudget::default_image()
}

fn default_settle_delay_ms() -> u64 {
    10_000
}

/// Everything an operation needs to talk to one provider region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionContext {
    /// Provider name (e.g. "aws", "azure")
    pub provider: String,

    /// Provider region identifier
    pub region: String,

    pub credentials: Credentials,

    #[serde(default)]
    pub limits: RateLimits,

    #[serde(default = "default_node_poll")]
    pub node_poll: PollBudget,

    #[serde(default = "default_delete_poll")]
    pub delete_poll: PollBudget,

    #[serde(default = "default_image_poll")]
    pub image_poll: PollBudget,

    /// Wait between the last create request and the first list call
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

impl RegionContext {
    pub fn new(
        provider: impl Into<String>,
        region: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            provider: provider.into(),
            region: region.into(),
            credentials,
            limits: RateLimits::default(),
            node_poll: default_node_poll(),
            delete_poll: default_delete_poll(),
            image_poll: default_image_poll(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }

    pub fn with_limits(mut self, limits: RateLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_node_poll(mut self, budget: PollBudget) -> Self {
        self.node_poll = budget;
        self
    }

    pub fn with_delete_poll(mut self, budget: PollBudget) -> Self {
        self.delete_poll = budget;
        self
    }

    pub fn with_image_poll(mut self, budget: PollBudget) -> Self {
        self.image_poll = budget;
        self
    }

    pub fn with_settle_delay_ms(mut self, delay_ms: u64) -> Self {
        self.settle_delay_ms = delay_ms;
        self
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let creds = Credentials::new("AKID", "super-secret");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("AKID"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn test_defaults() {
        let ctx = RegionContext::new("aws", "us-east-1", Credentials::new("a", "b"));
        assert_eq!(ctx.limits.create_per_minute, 20);
        assert_eq!(ctx.limits.delete_rate(), 20);
        assert_eq!(ctx.node_poll, PollBudget::new(180, 10_000));
        assert_eq!(ctx.image_poll, PollBudget::new(84, 5_000));
        assert_eq!(ctx.settle_delay(), Duration::from_secs(10));
    }

    #[test]
    fn test_list_failure_budget_defaults_to_attempts() {
        let budget = PollBudget::new(5, 100);
        assert_eq!(budget.list_failure_budget(), 5);
        assert_eq!(budget.with_max_list_failures(2).list_failure_budget(), 2);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = serde_json::json!({
            "provider": "aws",
            "region": "eu-west-1",
            "credentials": {"access_key": "a", "secret_key": "b"},
            "limits": {"delete_per_minute": 30}
        });
        let ctx: RegionContext = serde_json::from_value(json).unwrap();
        assert_eq!(ctx.limits.create_per_minute, 20);
        assert_eq!(ctx.limits.delete_rate(), 30);
        assert_eq!(ctx.delete_poll, PollBudget::default_delete());
        assert_eq!(ctx.settle_delay_ms, 10_000);
    }
}
