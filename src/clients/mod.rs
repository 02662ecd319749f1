//! Cloud collaborator interfaces.
//!
//! The state machine never talks to a cloud SDK directly; every step
//! receives a [`CloudClients`] bundle of trait objects injected by the
//! embedding host. Production implementations wrap the real service SDKs;
//! tests substitute scripted doubles.
//!
//! Create-style calls return [`CreateOutcome`] instead of raising on
//! conflict, so the benign "already exists" branch is an explicit
//! conditional in the step body rather than an error handler.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::model::Tag;

/// Errors raised by cloud collaborators.
#[derive(Error, Debug, Clone)]
pub enum CloudError {
    #[error("resource not found: {resource}")]
    NotFound { resource: String },

    #[error("resource already exists: {resource}")]
    AlreadyExists { resource: String },

    #[error("request throttled by the service: {message}")]
    Throttled { message: String },

    #[error("cloud API error: {message}")]
    Api { message: String },
}

impl CloudError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn already_exists(resource: impl Into<String>) -> Self {
        Self::AlreadyExists {
            resource: resource.into(),
        }
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Benign during best-effort cleanup: the object is already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Benign during create-or-get: the object is already there.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

pub type CloudResult<T> = std::result::Result<T, CloudError>;

/// Whether a create-or-get call found existing state or made new state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateOutcome {
    Created,
    AlreadyPresent,
}

/// Inputs for creating the base environment object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentSpec {
    pub name: String,
    pub description: Option<String>,
    pub instance_type: Option<String>,
    pub operating_system: Option<String>,
    pub subnet_id: Option<String>,
    pub owner: Option<String>,
    pub user_data: Option<String>,
    pub tags: Vec<Tag>,
    /// Idempotency token forwarded from the host request.
    pub client_request_token: String,
}

/// Observed state of the base environment object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentDescription {
    pub environment_id: String,
    /// Durable reference (ARN) naming the environment.
    pub arn: String,
    pub lifecycle_status: String,
}

/// Compute instance resolved from an environment, with its root volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub instance_id: String,
    pub volume_id: String,
    pub volume_size_gib: u32,
}

/// Lifecycle state of an instance-profile association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationState {
    Associating,
    Associated,
    Disassociating,
    Disassociated,
}

/// An instance-profile association as reported by the compute service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileAssociation {
    pub association_id: String,
    pub state: AssociationState,
    pub profile_name: String,
}

/// Execution status of a dispatched command invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    InProgress,
    Delayed,
    Success,
    Failed,
    Cancelled,
    TimedOut,
}

impl CommandStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled | Self::TimedOut)
    }
}

/// Identity service: execution roles and their policies.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Idempotently ensure the role exists with the given trust services.
    async fn create_or_get_role(
        &self,
        role_name: &str,
        path: &str,
        trust_services: &[String],
        tags: &[Tag],
    ) -> CloudResult<CreateOutcome>;

    async fn attach_managed_policies(
        &self,
        role_name: &str,
        policy_arns: &[String],
    ) -> CloudResult<()>;

    async fn list_attached_policies(&self, role_name: &str) -> CloudResult<Vec<String>>;

    async fn detach_policy(&self, role_name: &str, policy_arn: &str) -> CloudResult<()>;

    async fn delete_role(&self, role_name: &str) -> CloudResult<()>;
}

/// Compute/environment service: the base environment object.
#[async_trait]
pub trait EnvironmentService: Send + Sync {
    async fn create_environment(&self, spec: &EnvironmentSpec) -> CloudResult<String>;

    async fn describe_environment(
        &self,
        environment_id: &str,
    ) -> CloudResult<Option<EnvironmentDescription>>;

    async fn delete_environment(&self, environment_id: &str) -> CloudResult<()>;
}

/// Instance service: instance discovery and storage resize.
#[async_trait]
pub trait InstanceService: Send + Sync {
    /// Resolve the instance (and its root volume) the environment service
    /// launched for this environment, once it is discoverable.
    async fn find_instance_by_environment(
        &self,
        environment_id: &str,
    ) -> CloudResult<Option<InstanceInfo>>;

    async fn resize_volume(&self, volume_id: &str, size_gib: u32) -> CloudResult<()>;
}

/// Profile/association service: instance profiles and their bindings.
#[async_trait]
pub trait ProfileService: Send + Sync {
    async fn create_or_get_instance_profile(
        &self,
        profile_name: &str,
        tags: &[Tag],
    ) -> CloudResult<CreateOutcome>;

    async fn add_role_to_profile(&self, profile_name: &str, role_name: &str) -> CloudResult<()>;

    async fn remove_role_from_profile(
        &self,
        profile_name: &str,
        role_name: &str,
    ) -> CloudResult<()>;

    async fn delete_instance_profile(&self, profile_name: &str) -> CloudResult<()>;

    /// The instance's currently active association, if any.
    async fn describe_default_association(
        &self,
        instance_id: &str,
    ) -> CloudResult<Option<ProfileAssociation>>;

    async fn disassociate(&self, association_id: &str) -> CloudResult<()>;

    async fn associate(&self, profile_name: &str, instance_id: &str) -> CloudResult<String>;

    async fn describe_association(
        &self,
        association_id: &str,
    ) -> CloudResult<Option<ProfileAssociation>>;
}

/// Agent/command service: agent inventory and remote execution.
#[async_trait]
pub trait CommandService: Send + Sync {
    /// Whether the management agent on the instance has reported in.
    async fn describe_agent_inventory(&self, instance_id: &str) -> CloudResult<bool>;

    async fn dispatch_command(&self, instance_id: &str, document: &str) -> CloudResult<String>;

    async fn describe_command_invocation(
        &self,
        command_id: &str,
        instance_id: &str,
    ) -> CloudResult<CommandStatus>;
}

/// Bundle of collaborator handles injected into every step invocation.
#[derive(Clone)]
pub struct CloudClients {
    pub roles: Arc<dyn RoleStore>,
    pub environments: Arc<dyn EnvironmentService>,
    pub instances: Arc<dyn InstanceService>,
    pub profiles: Arc<dyn ProfileService>,
    pub commands: Arc<dyn CommandService>,
}

impl CloudClients {
    pub fn new(
        roles: Arc<dyn RoleStore>,
        environments: Arc<dyn EnvironmentService>,
        instances: Arc<dyn InstanceService>,
        profiles: Arc<dyn ProfileService>,
        commands: Arc<dyn CommandService>,
    ) -> Self {
        Self {
            roles,
            environments,
            instances,
            profiles,
            commands,
        }
    }
}
