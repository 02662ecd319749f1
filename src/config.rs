//! Provisioner configuration.
//!
//! Defaults cover the standard pipeline cadence and IAM construction; any
//! field can be overridden through `PROVISIONER_`-prefixed environment
//! variables (e.g. `PROVISIONER_DELAYS__CONTINUE_SECONDS=5`).

use crate::error::{ProvisionerError, Result};
use serde::{Deserialize, Serialize};

/// Re-invocation cadence returned to the host with each outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    /// Delay after a simple continuation.
    pub continue_seconds: u64,
    /// Delay while polling instance discovery and association changes.
    pub poll_seconds: u64,
    /// Delay while waiting for the management agent to report in.
    pub agent_poll_seconds: u64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            continue_seconds: 15,
            poll_seconds: 30,
            agent_poll_seconds: 60,
        }
    }
}

/// IAM construction parameters for the execution role and instance profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IamConfig {
    /// Path under which the execution role is created.
    pub role_path: String,
    /// Service principals allowed to assume the execution role.
    pub trust_services: Vec<String>,
    /// Baseline managed policies attached to every execution role.
    pub managed_policy_arns: Vec<String>,
    /// Prefix for derived role and profile names.
    pub name_prefix: String,
}

impl Default for IamConfig {
    fn default() -> Self {
        Self {
            role_path: "/devenv/provisioner/".to_string(),
            trust_services: vec![
                "ec2.amazonaws.com".to_string(),
                "cloud9.amazonaws.com".to_string(),
            ],
            managed_policy_arns: vec![
                "arn:aws:iam::aws:policy/AmazonSSMManagedInstanceCore".to_string(),
            ],
            name_prefix: "devenv".to_string(),
        }
    }
}

/// Top-level provisioner configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerConfig {
    pub delays: DelayConfig,
    pub iam: IamConfig,
}

impl ProvisionerConfig {
    /// Load defaults merged with `PROVISIONER_`-prefixed environment
    /// variable overrides.
    pub fn load() -> Result<Self> {
        let defaults = config::Config::try_from(&Self::default())
            .map_err(|e| ProvisionerError::configuration(e.to_string()))?;

        config::Config::builder()
            .add_source(defaults)
            .add_source(
                config::Environment::with_prefix("PROVISIONER")
                    .separator("__")
                    .list_separator(","),
            )
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| ProvisionerError::configuration(e.to_string()))
    }

    /// Derived execution role name for an environment. Deterministic so a
    /// retried step regenerates the identical name and create-or-get stays
    /// idempotent.
    pub fn role_name(&self, environment_id: &str) -> String {
        format!("{}-{}-role", self.iam.name_prefix, environment_id)
    }

    /// Derived instance profile name for an environment.
    pub fn profile_name(&self, environment_id: &str) -> String {
        format!("{}-{}-profile", self.iam.name_prefix, environment_id)
    }
}
