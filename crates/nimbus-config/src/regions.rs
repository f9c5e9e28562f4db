//! Region file model
//!
//! ```yaml
//! regions:
//!   - provider: aws
//!     region: us-east-1
//!     access_key_env: AWS_PROD_KEY
//!     secret_key_env: AWS_PROD_SECRET
//!     limits:
//!       create_per_minute: 30
//!   - provider: aws
//!     region: eu-west-1
//!     credentials:
//!       access_key: AKID...
//!       secret_key: ...
//!     node_poll:
//!       max_attempts: 60
//!       interval_ms: 5000
//! ```

use crate::error::{ConfigError, Result};
use nimbus_cloud::{Credentials, PollBudget, RateLimits, RegionContext};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

pub const DEFAULT_ACCESS_KEY_ENV: &str = "NIMBUS_ACCESS_KEY";
pub const DEFAULT_SECRET_KEY_ENV: &str = "NIMBUS_SECRET_KEY";

/// Top-level region file
#[derive(Debug, Clone, Deserialize)]
pub struct RegionFile {
    #[serde(default)]
    pub regions: Vec<RegionEntry>,
}

/// One region as written in the file
#[derive(Debug, Clone, Deserialize)]
pub struct RegionEntry {
    pub provider: String,
    pub region: String,

    /// Inline credentials; take precedence over the env vars
    #[serde(default)]
    pub credentials: Option<Credentials>,

    /// Variable holding the access key (default: `NIMBUS_ACCESS_KEY`)
    #[serde(default)]
    pub access_key_env: Option<String>,

    /// Variable holding the secret key (default: `NIMBUS_SECRET_KEY`)
    #[serde(default)]
    pub secret_key_env: Option<String>,

    #[serde(default)]
    pub limits: RateLimits,

    #[serde(default)]
    pub node_poll: Option<PollBudget>,

    #[serde(default)]
    pub delete_poll: Option<PollBudget>,

    #[serde(default)]
    pub image_poll: Option<PollBudget>,

    #[serde(default)]
    pub settle_delay_ms: Option<u64>,
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

impl RegionEntry {
    fn credentials(&self) -> Result<Credentials> {
        if let Some(credentials) = &self.credentials {
            return Ok(credentials.clone());
        }

        let access_key =
            env_var(self.access_key_env.as_deref().unwrap_or(DEFAULT_ACCESS_KEY_ENV))?;
        let secret_key =
            env_var(self.secret_key_env.as_deref().unwrap_or(DEFAULT_SECRET_KEY_ENV))?;
        Ok(Credentials::new(access_key, secret_key))
    }

    /// Resolve credentials and fill unset budgets with their defaults
    pub fn resolve(&self) -> Result<RegionContext> {
        if self.provider.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(format!(
                "region {} has no provider",
                self.region
            )));
        }
        if self.region.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(format!(
                "a {} region has no name",
                self.provider
            )));
        }

        let mut context = RegionContext::new(&self.provider, &self.region, self.credentials()?)
            .with_limits(self.limits);
        if let Some(budget) = self.node_poll {
            context = context.with_node_poll(budget);
        }
        if let Some(budget) = self.delete_poll {
            context = context.with_delete_poll(budget);
        }
        if let Some(budget) = self.image_poll {
            context = context.with_image_poll(budget);
        }
        if let Some(delay) = self.settle_delay_ms {
            context = context.with_settle_delay_ms(delay);
        }
        Ok(context)
    }
}

impl RegionFile {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Resolve every entry, rejecting duplicate provider/region pairs
    pub fn resolve(&self) -> Result<Vec<RegionContext>> {
        let mut seen = HashSet::new();
        let mut contexts = Vec::with_capacity(self.regions.len());

        for entry in &self.regions {
            if !seen.insert((entry.provider.as_str(), entry.region.as_str())) {
                return Err(ConfigError::DuplicateRegion {
                    provider: entry.provider.clone(),
                    region: entry.region.clone(),
                });
            }
            contexts.push(entry.resolve()?);
        }

        Ok(contexts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const INLINE: &str = r#"
regions:
  - provider: aws
    region: eu-west-1
    credentials:
      access_key: AKID
      secret_key: s3cr3t
    limits:
      create_per_minute: 30
    node_poll:
      max_attempts: 60
      interval_ms: 5000
    settle_delay_ms: 0
"#;

    #[test]
    fn test_inline_credentials() {
        let regions = RegionFile::from_yaml(INLINE).unwrap().resolve().unwrap();
        assert_eq!(regions.len(), 1);

        let region = &regions[0];
        assert_eq!(region.provider, "aws");
        assert_eq!(region.region, "eu-west-1");
        assert_eq!(region.credentials.access_key, "AKID");
        assert_eq!(region.limits.create_per_minute, 30);
        assert_eq!(region.node_poll, PollBudget::new(60, 5000));
        assert_eq!(region.delete_poll, PollBudget::default_delete());
        assert_eq!(region.image_poll, PollBudget::default_image());
        assert_eq!(region.settle_delay_ms, 0);
    }

    #[test]
    fn test_defaults_when_unset() {
        let yaml = r#"
regions:
  - provider: aws
    region: us-east-1
    credentials: { access_key: a, secret_key: b }
"#;
        let regions = RegionFile::from_yaml(yaml).unwrap().resolve().unwrap();
        assert_eq!(regions[0].limits, RateLimits::default());
        assert_eq!(regions[0].node_poll, PollBudget::default_node());
        assert_eq!(regions[0].settle_delay_ms, 10_000);
    }

    #[test]
    #[serial]
    fn test_default_env_credentials() {
        let yaml = "regions:\n  - provider: aws\n    region: us-east-1\n";
        temp_env::with_vars(
            [
                (DEFAULT_ACCESS_KEY_ENV, Some("env-key")),
                (DEFAULT_SECRET_KEY_ENV, Some("env-secret")),
            ],
            || {
                let regions = RegionFile::from_yaml(yaml).unwrap().resolve().unwrap();
                assert_eq!(
                    regions[0].credentials,
                    Credentials::new("env-key", "env-secret")
                );
            },
        );
    }

    #[test]
    #[serial]
    fn test_named_env_credentials() {
        let yaml = r#"
regions:
  - provider: aws
    region: us-east-1
    access_key_env: PROD_KEY
    secret_key_env: PROD_SECRET
"#;
        temp_env::with_vars(
            [("PROD_KEY", Some("k")), ("PROD_SECRET", Some("s"))],
            || {
                let regions = RegionFile::from_yaml(yaml).unwrap().resolve().unwrap();
                assert_eq!(regions[0].credentials, Credentials::new("k", "s"));
            },
        );
    }

    #[test]
    #[serial]
    fn test_missing_env_credentials() {
        let yaml = "regions:\n  - provider: aws\n    region: us-east-1\n";
        temp_env::with_vars_unset([DEFAULT_ACCESS_KEY_ENV, DEFAULT_SECRET_KEY_ENV], || {
            let err = RegionFile::from_yaml(yaml).unwrap().resolve().unwrap_err();
            match err {
                ConfigError::MissingEnvVar(name) => assert_eq!(name, DEFAULT_ACCESS_KEY_ENV),
                other => panic!("unexpected error: {}", other),
            }
        });
    }

    #[test]
    fn test_duplicate_region_rejected() {
        let yaml = r#"
regions:
  - provider: aws
    region: us-east-1
    credentials: { access_key: a, secret_key: b }
  - provider: aws
    region: us-east-1
    credentials: { access_key: c, secret_key: d }
"#;
        let err = RegionFile::from_yaml(yaml).unwrap().resolve().unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateRegion { .. }));
    }

    #[test]
    fn test_empty_region_name_rejected() {
        let yaml = r#"
regions:
  - provider: aws
    region: ""
    credentials: { access_key: a, secret_key: b }
"#;
        let err = RegionFile::from_yaml(yaml).unwrap().resolve().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_yaml() {
        let err = RegionFile::from_yaml("regions: [provider: ").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }
}
