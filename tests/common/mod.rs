//! Shared test support: an in-memory cloud and request builders.
//!
//! `InMemoryCloud` implements every collaborator trait against a single
//! lock-protected state blob, with knobs for the scenarios the pipeline
//! tests need (invisible instance, absent agent, scripted command status)
//! and call counters for idempotency assertions.

#![allow(dead_code)] // not every test binary exercises every helper

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use devenv_provisioner::clients::{
    AssociationState, CloudClients, CloudError, CloudResult, CommandService, CommandStatus,
    CreateOutcome, EnvironmentDescription, EnvironmentService, EnvironmentSpec, InstanceInfo,
    InstanceService, ProfileAssociation, ProfileService, RoleStore,
};
use devenv_provisioner::model::Tag;
use devenv_provisioner::{
    ContextMap, ProgressEvent, ProvisionRequest, ProvisionerConfig, ResourceModel,
};

pub const DEFAULT_MANAGED_PROFILE: &str = "default-managed-profile";
pub const KNOWN_DOCUMENT: &str = "bootstrap-dev-tools";
pub const INITIAL_VOLUME_GIB: u32 = 10;

#[derive(Debug, Default)]
pub struct CloudState {
    next_id: u32,

    pub environments: BTreeMap<String, EnvironmentDescription>,
    pub create_environment_calls: u32,

    /// env id -> launched instance
    pub instances: BTreeMap<String, InstanceInfo>,
    /// When false, `find_instance_by_environment` reports nothing yet.
    pub instance_visible: bool,
    pub resize_calls: Vec<(String, u32)>,

    /// role name -> attached policy arns
    pub roles: BTreeMap<String, Vec<String>>,
    pub create_role_calls: u32,

    /// profile name -> role bound to it
    pub profiles: BTreeMap<String, Option<String>>,
    pub create_profile_calls: u32,

    pub associations: BTreeMap<String, ProfileAssociation>,
    /// instance id -> active association id
    pub instance_association: BTreeMap<String, String>,

    pub agent_present: bool,
    pub documents: Vec<String>,
    /// Scripted status progression returned by successive
    /// `describe_command_invocation` calls (last entry repeats).
    pub command_script: Vec<CommandStatus>,
    pub command_polls: usize,
    pub dispatched_commands: BTreeMap<String, String>,
}

impl CloudState {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

pub struct InMemoryCloud {
    pub state: Mutex<CloudState>,
}

impl InMemoryCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(CloudState {
                instance_visible: true,
                agent_present: true,
                documents: vec![KNOWN_DOCUMENT.to_string()],
                command_script: vec![CommandStatus::Success],
                ..Default::default()
            }),
        })
    }

    pub fn clients(self: &Arc<Self>) -> CloudClients {
        CloudClients::new(
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
        )
    }
}

#[async_trait]
impl EnvironmentService for InMemoryCloud {
    async fn create_environment(&self, _spec: &EnvironmentSpec) -> CloudResult<String> {
        let mut s = self.state.lock();
        s.create_environment_calls += 1;
        let n = s.next_id();
        let environment_id = format!("env-{n}");
        let arn = format!("arn:aws:cloud9:us-east-1:123456789012:environment:{environment_id}");
        s.environments.insert(
            environment_id.clone(),
            EnvironmentDescription {
                environment_id: environment_id.clone(),
                arn,
                lifecycle_status: "CREATING".to_string(),
            },
        );

        // The environment service launches an instance with the managed
        // default profile already associated, like the real backend does.
        let instance_id = format!("i-{n}");
        let volume_id = format!("vol-{n}");
        s.instances.insert(
            environment_id.clone(),
            InstanceInfo {
                instance_id: instance_id.clone(),
                volume_id,
                volume_size_gib: INITIAL_VOLUME_GIB,
            },
        );
        let association_id = format!("assoc-default-{n}");
        s.associations.insert(
            association_id.clone(),
            ProfileAssociation {
                association_id: association_id.clone(),
                state: AssociationState::Associated,
                profile_name: DEFAULT_MANAGED_PROFILE.to_string(),
            },
        );
        s.instance_association.insert(instance_id, association_id);

        Ok(environment_id)
    }

    async fn describe_environment(
        &self,
        environment_id: &str,
    ) -> CloudResult<Option<EnvironmentDescription>> {
        Ok(self.state.lock().environments.get(environment_id).cloned())
    }

    async fn delete_environment(&self, environment_id: &str) -> CloudResult<()> {
        let mut s = self.state.lock();
        if s.environments.remove(environment_id).is_none() {
            return Err(CloudError::not_found(format!("environment {environment_id}")));
        }
        s.instances.remove(environment_id);
        Ok(())
    }
}

#[async_trait]
impl InstanceService for InMemoryCloud {
    async fn find_instance_by_environment(
        &self,
        environment_id: &str,
    ) -> CloudResult<Option<InstanceInfo>> {
        let s = self.state.lock();
        if !s.instance_visible {
            return Ok(None);
        }
        Ok(s.instances.get(environment_id).cloned())
    }

    async fn resize_volume(&self, volume_id: &str, size_gib: u32) -> CloudResult<()> {
        let mut s = self.state.lock();
        s.resize_calls.push((volume_id.to_string(), size_gib));
        for info in s.instances.values_mut() {
            if info.volume_id == volume_id {
                info.volume_size_gib = size_gib;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RoleStore for InMemoryCloud {
    async fn create_or_get_role(
        &self,
        role_name: &str,
        _path: &str,
        _trust_services: &[String],
        _tags: &[Tag],
    ) -> CloudResult<CreateOutcome> {
        let mut s = self.state.lock();
        s.create_role_calls += 1;
        if s.roles.contains_key(role_name) {
            Ok(CreateOutcome::AlreadyPresent)
        } else {
            s.roles.insert(role_name.to_string(), Vec::new());
            Ok(CreateOutcome::Created)
        }
    }

    async fn attach_managed_policies(
        &self,
        role_name: &str,
        policy_arns: &[String],
    ) -> CloudResult<()> {
        let mut s = self.state.lock();
        let Some(attached) = s.roles.get_mut(role_name) else {
            return Err(CloudError::not_found(format!("role {role_name}")));
        };
        for arn in policy_arns {
            if !attached.contains(arn) {
                attached.push(arn.clone());
            }
        }
        Ok(())
    }

    async fn list_attached_policies(&self, role_name: &str) -> CloudResult<Vec<String>> {
        self.state
            .lock()
            .roles
            .get(role_name)
            .cloned()
            .ok_or_else(|| CloudError::not_found(format!("role {role_name}")))
    }

    async fn detach_policy(&self, role_name: &str, policy_arn: &str) -> CloudResult<()> {
        let mut s = self.state.lock();
        let Some(attached) = s.roles.get_mut(role_name) else {
            return Err(CloudError::not_found(format!("role {role_name}")));
        };
        attached.retain(|arn| arn != policy_arn);
        Ok(())
    }

    async fn delete_role(&self, role_name: &str) -> CloudResult<()> {
        let mut s = self.state.lock();
        if s.roles.remove(role_name).is_none() {
            return Err(CloudError::not_found(format!("role {role_name}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileService for InMemoryCloud {
    async fn create_or_get_instance_profile(
        &self,
        profile_name: &str,
        _tags: &[Tag],
    ) -> CloudResult<CreateOutcome> {
        let mut s = self.state.lock();
        s.create_profile_calls += 1;
        if s.profiles.contains_key(profile_name) {
            Ok(CreateOutcome::AlreadyPresent)
        } else {
            s.profiles.insert(profile_name.to_string(), None);
            Ok(CreateOutcome::Created)
        }
    }

    async fn add_role_to_profile(&self, profile_name: &str, role_name: &str) -> CloudResult<()> {
        let mut s = self.state.lock();
        let Some(bound) = s.profiles.get_mut(profile_name) else {
            return Err(CloudError::not_found(format!("profile {profile_name}")));
        };
        if bound.is_some() {
            return Err(CloudError::already_exists(format!(
                "profile {profile_name} already has a role"
            )));
        }
        *bound = Some(role_name.to_string());
        Ok(())
    }

    async fn remove_role_from_profile(
        &self,
        profile_name: &str,
        _role_name: &str,
    ) -> CloudResult<()> {
        let mut s = self.state.lock();
        let Some(bound) = s.profiles.get_mut(profile_name) else {
            return Err(CloudError::not_found(format!("profile {profile_name}")));
        };
        *bound = None;
        Ok(())
    }

    async fn delete_instance_profile(&self, profile_name: &str) -> CloudResult<()> {
        let mut s = self.state.lock();
        if s.profiles.remove(profile_name).is_none() {
            return Err(CloudError::not_found(format!("profile {profile_name}")));
        }
        Ok(())
    }

    async fn describe_default_association(
        &self,
        instance_id: &str,
    ) -> CloudResult<Option<ProfileAssociation>> {
        let s = self.state.lock();
        Ok(s.instance_association
            .get(instance_id)
            .and_then(|id| s.associations.get(id))
            .cloned())
    }

    async fn disassociate(&self, association_id: &str) -> CloudResult<()> {
        let mut s = self.state.lock();
        let Some(assoc) = s.associations.get_mut(association_id) else {
            return Err(CloudError::not_found(format!("association {association_id}")));
        };
        assoc.state = AssociationState::Disassociated;
        s.instance_association
            .retain(|_, active| active != association_id);
        Ok(())
    }

    async fn associate(&self, profile_name: &str, instance_id: &str) -> CloudResult<String> {
        let mut s = self.state.lock();
        if s.instance_association.contains_key(instance_id) {
            return Err(CloudError::already_exists(format!(
                "instance {instance_id} already has an association"
            )));
        }
        let n = s.next_id();
        let association_id = format!("assoc-{n}");
        s.associations.insert(
            association_id.clone(),
            ProfileAssociation {
                association_id: association_id.clone(),
                state: AssociationState::Associating,
                profile_name: profile_name.to_string(),
            },
        );
        s.instance_association
            .insert(instance_id.to_string(), association_id.clone());
        Ok(association_id)
    }

    async fn describe_association(
        &self,
        association_id: &str,
    ) -> CloudResult<Option<ProfileAssociation>> {
        let mut s = self.state.lock();
        let current = s.associations.get(association_id).cloned();
        // Associations progress one poll after they are observed.
        if let Some(assoc) = s.associations.get_mut(association_id) {
            if assoc.state == AssociationState::Associating {
                assoc.state = AssociationState::Associated;
            }
        }
        Ok(current)
    }
}

#[async_trait]
impl CommandService for InMemoryCloud {
    async fn describe_agent_inventory(&self, _instance_id: &str) -> CloudResult<bool> {
        Ok(self.state.lock().agent_present)
    }

    async fn dispatch_command(&self, instance_id: &str, document: &str) -> CloudResult<String> {
        let mut s = self.state.lock();
        if !s.documents.iter().any(|d| d == document) {
            return Err(CloudError::not_found(format!("document {document}")));
        }
        let n = s.next_id();
        let command_id = format!("cmd-{n}");
        s.dispatched_commands
            .insert(command_id.clone(), instance_id.to_string());
        Ok(command_id)
    }

    async fn describe_command_invocation(
        &self,
        command_id: &str,
        _instance_id: &str,
    ) -> CloudResult<CommandStatus> {
        let mut s = self.state.lock();
        if !s.dispatched_commands.contains_key(command_id) {
            return Err(CloudError::not_found(format!("command {command_id}")));
        }
        let index = s.command_polls.min(s.command_script.len() - 1);
        s.command_polls += 1;
        Ok(s.command_script[index])
    }
}

/// Desired state with every feature enabled (resize + bootstrap document).
pub fn full_model() -> ResourceModel {
    ResourceModel {
        name: Some("team-devenv".to_string()),
        instance_type: Some("t3.large".to_string()),
        operating_system: Some("amazonlinux-2023".to_string()),
        subnet_id: Some("subnet-0abc".to_string()),
        owner: Some("arn:aws:iam::123456789012:user/dev".to_string()),
        volume_size_gib: Some(64),
        bootstrap_document: Some(KNOWN_DOCUMENT.to_string()),
        tags: Some(vec![Tag::new("team", "platform")]),
        ..Default::default()
    }
}

pub fn request(model: ResourceModel) -> ProvisionRequest {
    ProvisionRequest::new(model, "DevEnvResource")
}

pub fn config() -> ProvisionerConfig {
    ProvisionerConfig::default()
}

/// Drive the create pipeline to a terminal event, feeding each returned
/// context back in, and record the status tag trail along the way.
pub async fn drive_to_completion(
    request: &ProvisionRequest,
    clients: &CloudClients,
    config: &ProvisionerConfig,
    max_invocations: usize,
) -> (ProgressEvent, Vec<Option<String>>) {
    let mut callback: Option<ContextMap> = None;
    let mut trail = Vec::new();

    for _ in 0..max_invocations {
        let event = devenv_provisioner::handlers::create_handler(
            request,
            callback.as_ref(),
            clients,
            config,
        )
        .await;

        match event.status {
            devenv_provisioner::OperationStatus::InProgress => {
                let ctx = event
                    .callback_context
                    .clone()
                    .expect("in-progress event must carry a context");
                trail.push(
                    ctx.get("provisioning_status")
                        .and_then(|v| v.as_str())
                        .map(ToString::to_string),
                );
                callback = Some(ctx);
            }
            _ => return (event, trail),
        }
    }

    panic!("pipeline did not terminate within {max_invocations} invocations");
}
