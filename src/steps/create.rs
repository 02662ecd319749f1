//! Forward (create) pipeline step functions.
//!
//! Each function performs the work that carries the resource from its
//! current milestone to the next one, against injected cloud collaborators.
//! Every sub-call is idempotent-or-caught: identifiers already recorded in
//! the progress context are reused, never recomputed, so a crash-and-retry
//! of any step cannot create a second cloud object of the same identity.

use tracing::{debug, info, warn};

use crate::clients::{AssociationState, CloudClients, CommandStatus, CreateOutcome, EnvironmentSpec};
use crate::config::ProvisionerConfig;
use crate::context::ProgressContext;
use crate::error::{ProvisionerError, Result};
use crate::model::{ProvisionRequest, ResourceModel};
use crate::outcome::StepOutcome;
use crate::states::ProvisioningStatus;

/// Initial step: create the base environment object and read back its
/// identifier and durable reference.
pub async fn start_environment(
    request: &ProvisionRequest,
    model: &mut ResourceModel,
    ctx: &mut ProgressContext,
    clients: &CloudClients,
    config: &ProvisionerConfig,
) -> Result<StepOutcome> {
    let environment_id = match &ctx.environment_id {
        // Crash-retry before the host persisted the advance: reuse the
        // environment we already created.
        Some(id) => id.clone(),
        None => {
            let name = model.resolved_name(&request.logical_resource_identifier);
            let spec = EnvironmentSpec {
                name: name.clone(),
                description: model.description.clone(),
                instance_type: model.instance_type.clone(),
                operating_system: model.operating_system.clone(),
                subnet_id: model.subnet_id.clone(),
                owner: model.owner.clone(),
                user_data: model.user_data.clone(),
                tags: model.tags.clone().unwrap_or_default(),
                client_request_token: request.client_request_token.to_string(),
            };
            let id = clients
                .environments
                .create_environment(&spec)
                .await
                .map_err(|e| ProvisionerError::cloud("create_environment", e))?;
            info!(environment_id = %id, environment_name = %name, "environment created");
            ctx.environment_id = Some(id.clone());
            id
        }
    };

    let Some(description) = clients
        .environments
        .describe_environment(&environment_id)
        .await
        .map_err(|e| ProvisionerError::cloud("describe_environment", e))?
    else {
        return Ok(StepOutcome::failed(format!(
            "environment {environment_id} not found after creation"
        )));
    };

    ctx.environment_arn = Some(description.arn.clone());
    model.environment_id = Some(environment_id);
    model.arn = Some(description.arn);

    Ok(StepOutcome::advance(
        ProvisioningStatus::EnvironmentCreated,
        config.delays.continue_seconds,
    ))
}

/// EnvironmentCreated -> RoleCreated: ensure the dedicated execution role
/// exists, creating or reusing it by its deterministic name.
pub async fn ensure_execution_role(
    _request: &ProvisionRequest,
    model: &mut ResourceModel,
    ctx: &mut ProgressContext,
    clients: &CloudClients,
    config: &ProvisionerConfig,
) -> Result<StepOutcome> {
    let environment_id = ctx
        .require("environment_id", ProvisioningStatus::EnvironmentCreated)?
        .to_string();
    let role_name = ctx
        .role_name
        .clone()
        .unwrap_or_else(|| config.role_name(&environment_id));

    let outcome = clients
        .roles
        .create_or_get_role(
            &role_name,
            &config.iam.role_path,
            &config.iam.trust_services,
            model.tags.as_deref().unwrap_or_default(),
        )
        .await
        .map_err(|e| ProvisionerError::cloud("create_or_get_role", e))?;

    match outcome {
        CreateOutcome::Created => info!(role_name = %role_name, "execution role created"),
        CreateOutcome::AlreadyPresent => {
            debug!(role_name = %role_name, "execution role already present, reusing")
        }
    }
    ctx.role_name = Some(role_name);

    Ok(StepOutcome::advance(
        ProvisioningStatus::RoleCreated,
        config.delays.continue_seconds,
    ))
}

/// RoleCreated -> ResizedInstance: resolve the instance the environment
/// launched, then request a root volume resize if the desired size differs.
pub async fn resolve_and_resize_instance(
    _request: &ProvisionRequest,
    model: &mut ResourceModel,
    ctx: &mut ProgressContext,
    clients: &CloudClients,
    config: &ProvisionerConfig,
) -> Result<StepOutcome> {
    let environment_id = ctx
        .require("environment_id", ProvisioningStatus::RoleCreated)?
        .to_string();

    if ctx.instance_id.is_none() {
        let Some(info) = clients
            .instances
            .find_instance_by_environment(&environment_id)
            .await
            .map_err(|e| ProvisionerError::cloud("find_instance_by_environment", e))?
        else {
            debug!(environment_id = %environment_id, "instance not yet discoverable");
            return Ok(StepOutcome::wait(config.delays.poll_seconds));
        };

        info!(
            environment_id = %environment_id,
            instance_id = %info.instance_id,
            volume_id = %info.volume_id,
            "instance resolved"
        );
        if let Some(requested) = model.volume_size_gib {
            if requested != info.volume_size_gib {
                clients
                    .instances
                    .resize_volume(&info.volume_id, requested)
                    .await
                    .map_err(|e| ProvisionerError::cloud("resize_volume", e))?;
                info!(
                    volume_id = %info.volume_id,
                    from_gib = info.volume_size_gib,
                    to_gib = requested,
                    "volume resize requested"
                );
            }
        }
        ctx.instance_id = Some(info.instance_id);
        ctx.volume_id = Some(info.volume_id);
    }

    model.instance_id = ctx.instance_id.clone();

    Ok(StepOutcome::advance(
        ProvisioningStatus::ResizedInstance,
        config.delays.continue_seconds,
    ))
}

/// ResizedInstance -> InstanceStable: poll agent inventory until the
/// management agent on the instance reports in.
pub async fn await_agent(
    _request: &ProvisionRequest,
    _model: &mut ResourceModel,
    ctx: &mut ProgressContext,
    clients: &CloudClients,
    config: &ProvisionerConfig,
) -> Result<StepOutcome> {
    let instance_id = ctx.require("instance_id", ProvisioningStatus::ResizedInstance)?;

    let present = clients
        .commands
        .describe_agent_inventory(instance_id)
        .await
        .map_err(|e| ProvisionerError::cloud("describe_agent_inventory", e))?;

    if !present {
        debug!(instance_id = %instance_id, "management agent not yet reporting");
        return Ok(StepOutcome::wait(config.delays.agent_poll_seconds));
    }

    Ok(StepOutcome::advance(
        ProvisioningStatus::InstanceStable,
        config.delays.continue_seconds,
    ))
}

/// InstanceStable -> NewProfileCreated | ProfileAttached: attach the managed
/// policies to the role and make the instance profile usable.
///
/// The machine branches here: normally the instance still carries its
/// auto-assigned profile association, which must be detached before the new
/// profile can be attached (NewProfileCreated path). Only when the expected
/// profile already exists *and* is already the instance's active association
/// -- a crash-resume of a later step -- does it shortcut to ProfileAttached.
pub async fn prepare_instance_profile(
    _request: &ProvisionRequest,
    model: &mut ResourceModel,
    ctx: &mut ProgressContext,
    clients: &CloudClients,
    config: &ProvisionerConfig,
) -> Result<StepOutcome> {
    let environment_id = ctx
        .require("environment_id", ProvisioningStatus::InstanceStable)?
        .to_string();
    let instance_id = ctx
        .require("instance_id", ProvisioningStatus::InstanceStable)?
        .to_string();
    let role_name = ctx
        .require("role_name", ProvisioningStatus::InstanceStable)?
        .to_string();

    let mut policy_arns = config.iam.managed_policy_arns.clone();
    if let Some(extra) = &model.permissions_policy_arn {
        if !policy_arns.contains(extra) {
            policy_arns.push(extra.clone());
        }
    }
    clients
        .roles
        .attach_managed_policies(&role_name, &policy_arns)
        .await
        .map_err(|e| ProvisionerError::cloud("attach_managed_policies", e))?;

    let profile_name = ctx
        .profile_name
        .clone()
        .unwrap_or_else(|| config.profile_name(&environment_id));
    let outcome = clients
        .profiles
        .create_or_get_instance_profile(&profile_name, model.tags.as_deref().unwrap_or_default())
        .await
        .map_err(|e| ProvisionerError::cloud("create_or_get_instance_profile", e))?;

    match clients
        .profiles
        .add_role_to_profile(&profile_name, &role_name)
        .await
    {
        Ok(()) => {}
        Err(e) if e.is_already_exists() => {
            debug!(profile_name = %profile_name, role_name = %role_name, "role already bound to profile");
        }
        Err(e) => return Err(ProvisionerError::cloud("add_role_to_profile", e)),
    }
    ctx.profile_name = Some(profile_name.clone());

    if outcome == CreateOutcome::AlreadyPresent {
        info!(profile_name = %profile_name, "instance profile already present, reusing");
        let association = clients
            .profiles
            .describe_default_association(&instance_id)
            .await
            .map_err(|e| ProvisionerError::cloud("describe_default_association", e))?;
        if let Some(assoc) = association {
            if assoc.profile_name == profile_name && assoc.state == AssociationState::Associated {
                // Resumed after a crash beyond association: nothing left to
                // detach or attach.
                ctx.association_id = Some(assoc.association_id);
                return Ok(StepOutcome::advance(
                    ProvisioningStatus::ProfileAttached,
                    config.delays.continue_seconds,
                ));
            }
        }
    }

    Ok(StepOutcome::advance(
        ProvisioningStatus::NewProfileCreated,
        config.delays.continue_seconds,
    ))
}

/// NewProfileCreated -> DefaultProfileDetached: detach the auto-assigned
/// profile association, polling until it is gone.
pub async fn detach_default_profile(
    _request: &ProvisionRequest,
    _model: &mut ResourceModel,
    ctx: &mut ProgressContext,
    clients: &CloudClients,
    config: &ProvisionerConfig,
) -> Result<StepOutcome> {
    let instance_id = ctx
        .require("instance_id", ProvisioningStatus::NewProfileCreated)?
        .to_string();
    let profile_name = ctx
        .require("profile_name", ProvisioningStatus::NewProfileCreated)?
        .to_string();

    let association = clients
        .profiles
        .describe_default_association(&instance_id)
        .await
        .map_err(|e| ProvisionerError::cloud("describe_default_association", e))?;

    let Some(assoc) = association else {
        return Ok(StepOutcome::advance(
            ProvisioningStatus::DefaultProfileDetached,
            config.delays.continue_seconds,
        ));
    };

    // The active association already points at our profile: a retry after
    // the association landed. Nothing to detach.
    if assoc.profile_name == profile_name {
        ctx.association_id = Some(assoc.association_id);
        return Ok(StepOutcome::advance(
            ProvisioningStatus::DefaultProfileDetached,
            config.delays.continue_seconds,
        ));
    }

    match assoc.state {
        AssociationState::Disassociated => Ok(StepOutcome::advance(
            ProvisioningStatus::DefaultProfileDetached,
            config.delays.continue_seconds,
        )),
        AssociationState::Disassociating => {
            ctx.default_association_id = Some(assoc.association_id);
            Ok(StepOutcome::wait(config.delays.poll_seconds))
        }
        AssociationState::Associating | AssociationState::Associated => {
            ctx.default_association_id = Some(assoc.association_id.clone());
            match clients.profiles.disassociate(&assoc.association_id).await {
                Ok(()) => {}
                // Already gone between describe and disassociate.
                Err(e) if e.is_not_found() => {
                    debug!(association_id = %assoc.association_id, "association already removed");
                }
                Err(e) => return Err(ProvisionerError::cloud("disassociate", e)),
            }
            info!(
                instance_id = %instance_id,
                association_id = %assoc.association_id,
                default_profile = %assoc.profile_name,
                "detaching auto-assigned instance profile"
            );
            Ok(StepOutcome::wait(config.delays.poll_seconds))
        }
    }
}

/// DefaultProfileDetached -> ProfileAttached: associate the new instance
/// profile, polling until the association completes.
pub async fn attach_new_profile(
    _request: &ProvisionRequest,
    _model: &mut ResourceModel,
    ctx: &mut ProgressContext,
    clients: &CloudClients,
    config: &ProvisionerConfig,
) -> Result<StepOutcome> {
    let instance_id = ctx
        .require("instance_id", ProvisioningStatus::DefaultProfileDetached)?
        .to_string();
    let profile_name = ctx
        .require("profile_name", ProvisioningStatus::DefaultProfileDetached)?
        .to_string();

    let Some(association_id) = ctx.association_id.clone() else {
        match clients.profiles.associate(&profile_name, &instance_id).await {
            Ok(association_id) => {
                info!(
                    instance_id = %instance_id,
                    profile_name = %profile_name,
                    association_id = %association_id,
                    "instance profile association requested"
                );
                ctx.association_id = Some(association_id);
            }
            // An association request already landed on a previous attempt;
            // resolve its id instead of issuing a duplicate. Only an
            // association pointing at our profile is ours to adopt.
            Err(e) if e.is_already_exists() => {
                let existing = clients
                    .profiles
                    .describe_default_association(&instance_id)
                    .await
                    .map_err(|e| ProvisionerError::cloud("describe_default_association", e))?;
                match existing {
                    Some(assoc) if assoc.profile_name == profile_name => {
                        ctx.association_id = Some(assoc.association_id);
                    }
                    Some(assoc) => match assoc.state {
                        // Still clearing out; the next poll retries the
                        // associate once the slot is free.
                        AssociationState::Disassociating | AssociationState::Disassociated => {
                            debug!(
                                association_id = %assoc.association_id,
                                profile_name = %assoc.profile_name,
                                "stale association still clearing before associate retry"
                            );
                        }
                        AssociationState::Associating | AssociationState::Associated => {
                            return Ok(StepOutcome::failed(format!(
                                "instance {instance_id} is associated with unexpected profile '{}'",
                                assoc.profile_name
                            )));
                        }
                    },
                    None => {}
                }
            }
            Err(e) => return Err(ProvisionerError::cloud("associate", e)),
        }
        return Ok(StepOutcome::wait(config.delays.poll_seconds));
    };

    let Some(assoc) = clients
        .profiles
        .describe_association(&association_id)
        .await
        .map_err(|e| ProvisionerError::cloud("describe_association", e))?
    else {
        return Ok(StepOutcome::failed(format!(
            "instance profile association {association_id} disappeared before completing"
        )));
    };

    match assoc.state {
        AssociationState::Associating => Ok(StepOutcome::wait(config.delays.poll_seconds)),
        AssociationState::Associated => Ok(StepOutcome::advance(
            ProvisioningStatus::ProfileAttached,
            config.delays.continue_seconds,
        )),
        AssociationState::Disassociating | AssociationState::Disassociated => {
            Ok(StepOutcome::failed(format!(
                "instance profile association {association_id} unexpectedly entered {:?} state",
                assoc.state
            )))
        }
    }
}

/// ProfileAttached -> CommandSent | SUCCESS: dispatch the bootstrap document
/// for remote execution, or finish immediately when none was requested.
pub async fn dispatch_bootstrap(
    _request: &ProvisionRequest,
    model: &mut ResourceModel,
    ctx: &mut ProgressContext,
    clients: &CloudClients,
    config: &ProvisionerConfig,
) -> Result<StepOutcome> {
    let Some(document) = model.bootstrap_document.clone() else {
        // Terminal shortcut: no bootstrap requested, the pipeline is done.
        return Ok(StepOutcome::Success);
    };

    let instance_id = ctx
        .require("instance_id", ProvisioningStatus::ProfileAttached)?
        .to_string();

    if ctx.command_id.is_some() {
        // Crash-retry after dispatch: the command is already in flight.
        return Ok(StepOutcome::advance(
            ProvisioningStatus::CommandSent,
            config.delays.continue_seconds,
        ));
    }

    match clients.commands.dispatch_command(&instance_id, &document).await {
        Ok(command_id) => {
            info!(
                instance_id = %instance_id,
                document = %document,
                command_id = %command_id,
                "bootstrap command dispatched"
            );
            ctx.command_id = Some(command_id);
            Ok(StepOutcome::advance(
                ProvisioningStatus::CommandSent,
                config.delays.continue_seconds,
            ))
        }
        Err(e) if e.is_not_found() => Ok(StepOutcome::failed(format!(
            "bootstrap document '{document}' does not exist"
        ))),
        Err(e) => Err(ProvisionerError::cloud("dispatch_command", e)),
    }
}

/// CommandSent -> SUCCESS: poll the dispatched command until it finishes.
pub async fn await_bootstrap(
    _request: &ProvisionRequest,
    _model: &mut ResourceModel,
    ctx: &mut ProgressContext,
    clients: &CloudClients,
    config: &ProvisionerConfig,
) -> Result<StepOutcome> {
    let instance_id = ctx
        .require("instance_id", ProvisioningStatus::CommandSent)?
        .to_string();
    let command_id = ctx
        .require("command_id", ProvisioningStatus::CommandSent)?
        .to_string();

    let status = clients
        .commands
        .describe_command_invocation(&command_id, &instance_id)
        .await
        .map_err(|e| ProvisionerError::cloud("describe_command_invocation", e))?;

    match status {
        CommandStatus::Pending | CommandStatus::InProgress | CommandStatus::Delayed => {
            debug!(command_id = %command_id, status = ?status, "bootstrap command still running");
            Ok(StepOutcome::wait(config.delays.poll_seconds))
        }
        CommandStatus::Success => Ok(StepOutcome::Success),
        CommandStatus::Failed | CommandStatus::Cancelled | CommandStatus::TimedOut => {
            warn!(command_id = %command_id, status = ?status, "bootstrap command did not complete");
            Ok(StepOutcome::failed(format!(
                "bootstrap command {command_id} finished with status {status:?}"
            )))
        }
    }
}
