//! Reverse (delete) pipeline: single-pass, best-effort teardown.
//!
//! Deletion must be safe to invoke against fully-provisioned,
//! partially-provisioned, and already-deleted resources alike, so every
//! constituent call treats "already gone" as success and any other failure
//! is logged and absorbed. The pass always terminates successfully.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::clients::{CloudClients, CloudError};
use crate::config::ProvisionerConfig;
use crate::context::ProgressContext;
use crate::model::ResourceModel;

/// What the teardown pass attempted and how far it got. Surfaced only
/// through logs and the delete response message.
#[derive(Debug, Clone)]
pub struct TeardownReport {
    pub environment_id: Option<String>,
    pub environment_deleted: bool,
    pub profile_cleaned: bool,
    pub role_cleaned: bool,
    pub completed_at: DateTime<Utc>,
}

impl TeardownReport {
    pub fn summary(&self) -> String {
        match &self.environment_id {
            Some(id) => format!(
                "teardown of environment {id} complete (environment deleted: {}, profile cleaned: {}, role cleaned: {})",
                self.environment_deleted, self.profile_cleaned, self.role_cleaned
            ),
            None => "teardown complete (no durable reference, nothing to delete)".to_string(),
        }
    }
}

/// Run the best-effort teardown pass. Never fails.
pub async fn run_teardown(
    model: &ResourceModel,
    ctx: &ProgressContext,
    clients: &CloudClients,
    config: &ProvisionerConfig,
) -> TeardownReport {
    let environment_id = resolve_environment_id(model, ctx);

    let Some(environment_id) = environment_id else {
        info!("no environment identifier on the resource, skipping teardown");
        return TeardownReport {
            environment_id: None,
            environment_deleted: false,
            profile_cleaned: false,
            role_cleaned: false,
            completed_at: Utc::now(),
        };
    };

    info!(environment_id = %environment_id, "starting best-effort teardown");

    let environment_deleted = best_effort(
        "delete_environment",
        clients.environments.delete_environment(&environment_id).await,
    );

    let role_name = ctx
        .role_name
        .clone()
        .unwrap_or_else(|| config.role_name(&environment_id));
    let profile_name = ctx
        .profile_name
        .clone()
        .unwrap_or_else(|| config.profile_name(&environment_id));

    let mut profile_cleaned = best_effort(
        "remove_role_from_profile",
        clients
            .profiles
            .remove_role_from_profile(&profile_name, &role_name)
            .await,
    );
    profile_cleaned &= best_effort(
        "delete_instance_profile",
        clients.profiles.delete_instance_profile(&profile_name).await,
    );

    let mut role_cleaned = true;
    match clients.roles.list_attached_policies(&role_name).await {
        Ok(policy_arns) => {
            for policy_arn in &policy_arns {
                role_cleaned &= best_effort(
                    "detach_policy",
                    clients.roles.detach_policy(&role_name, policy_arn).await,
                );
            }
        }
        Err(e) if e.is_not_found() => {
            debug!(role_name = %role_name, "role already gone, no policies to detach");
        }
        Err(e) => {
            warn!(role_name = %role_name, error = %e, "could not list attached policies");
            role_cleaned = false;
        }
    }
    role_cleaned &= best_effort("delete_role", clients.roles.delete_role(&role_name).await);

    let report = TeardownReport {
        environment_id: Some(environment_id),
        environment_deleted,
        profile_cleaned,
        role_cleaned,
        completed_at: Utc::now(),
    };
    info!(summary = %report.summary(), "teardown finished");
    report
}

/// Treat not-found as success, log and absorb everything else.
fn best_effort(operation: &str, result: Result<(), CloudError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) if e.is_not_found() => {
            debug!(operation = %operation, "object already gone");
            true
        }
        Err(e) => {
            warn!(operation = %operation, error = %e, "cleanup call failed, continuing");
            false
        }
    }
}

/// The environment id comes from the model or context when present, else is
/// derived from the durable reference (last path segment of the ARN).
fn resolve_environment_id(model: &ResourceModel, ctx: &ProgressContext) -> Option<String> {
    model
        .environment_id
        .clone()
        .or_else(|| ctx.environment_id.clone())
        .or_else(|| {
            model
                .arn
                .as_deref()
                .or(ctx.environment_arn.as_deref())
                .and_then(environment_id_from_arn)
        })
}

fn environment_id_from_arn(arn: &str) -> Option<String> {
    arn.rsplit([':', '/'])
        .next()
        .filter(|segment| !segment.is_empty())
        .map(ToString::to_string)
}
