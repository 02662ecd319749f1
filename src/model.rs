//! Resource model and request envelope shared with the host orchestrator.
//!
//! Field names follow the host's PascalCase calling convention on the wire;
//! everything is optional because the host may send partial desired state
//! and the orchestrator fills identifiers in as provisioning progresses.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Desired and observed shape of the provisioned development environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ResourceModel {
    pub name: Option<String>,
    pub description: Option<String>,
    pub instance_type: Option<String>,
    pub operating_system: Option<String>,
    pub subnet_id: Option<String>,
    pub owner: Option<String>,
    /// Requested root volume size in GiB; resize is skipped when absent or
    /// already matching the attached volume.
    #[serde(rename = "VolumeSizeGiB")]
    pub volume_size_gib: Option<u32>,
    /// Managed policy to attach to the execution role in addition to the
    /// configured baseline policies.
    pub permissions_policy_arn: Option<String>,
    /// Remote-execution document to run on the instance once the profile is
    /// attached; when absent the pipeline completes at ProfileAttached.
    pub bootstrap_document: Option<String>,
    pub user_data: Option<String>,
    pub tags: Option<Vec<Tag>>,

    // Populated by the pipeline as the cloud objects come into existence.
    pub environment_id: Option<String>,
    pub instance_id: Option<String>,
    pub arn: Option<String>,
}

impl ResourceModel {
    /// Resolve the environment name, falling back to the logical resource
    /// identifier the host assigned when no explicit name was requested.
    pub fn resolved_name(&self, logical_resource_id: &str) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| logical_resource_id.to_string())
    }
}

/// Key/value tag; keys are unique within a model's tag set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One invocation's worth of input from the host orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    pub desired_resource_state: ResourceModel,
    pub previous_resource_state: Option<ResourceModel>,
    pub logical_resource_identifier: String,
    pub client_request_token: Uuid,
}

impl ProvisionRequest {
    /// Build a request with a fresh client token, primarily for tests and
    /// embedding hosts that do not supply their own.
    pub fn new(desired: ResourceModel, logical_resource_identifier: impl Into<String>) -> Self {
        Self {
            desired_resource_state: desired,
            previous_resource_state: None,
            logical_resource_identifier: logical_resource_identifier.into(),
            client_request_token: Uuid::new_v4(),
        }
    }
}
