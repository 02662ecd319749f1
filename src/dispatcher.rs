//! Dispatcher: one invocation of the forward state machine.
//!
//! Decodes the persisted progress context, runs exactly one step function,
//! and packages its outcome into the response envelope the host expects.
//! Structural problems (unknown status tag, missing context key) surface as
//! hard errors for the entry points to translate into internal failures.

use tracing::{debug, info};
use uuid::Uuid;

use crate::clients::CloudClients;
use crate::config::ProvisionerConfig;
use crate::context::{ContextMap, ProgressContext};
use crate::error::{ProvisionerError, Result};
use crate::model::ProvisionRequest;
use crate::outcome::{HandlerErrorCode, ProgressEvent, StepOutcome};
use crate::steps;

/// Run one step of the create pipeline and package the result.
pub async fn drive_create(
    request: &ProvisionRequest,
    callback_context: Option<&ContextMap>,
    clients: &CloudClients,
    config: &ProvisionerConfig,
) -> Result<ProgressEvent> {
    let mut ctx = match callback_context {
        Some(map) if !map.is_empty() => ProgressContext::decode(map)?,
        _ => ProgressContext::default(),
    };
    let status = ctx.status;

    let mut model = request.desired_resource_state.clone();
    // Carry identifiers resolved on earlier invocations back onto the model
    // so the host always sees the full observed state.
    if model.environment_id.is_none() {
        model.environment_id = ctx.environment_id.clone();
    }
    if model.instance_id.is_none() {
        model.instance_id = ctx.instance_id.clone();
    }
    if model.arn.is_none() {
        model.arn = ctx.environment_arn.clone();
    }

    let invocation_id = Uuid::new_v4();
    info!(
        %invocation_id,
        logical_resource_id = %request.logical_resource_identifier,
        status = ?status,
        "dispatching create step"
    );

    let outcome = steps::run_step(status, request, &mut model, &mut ctx, clients, config).await?;

    match outcome {
        StepOutcome::Continue {
            next,
            delay_seconds,
        } => {
            if let Some(current) = status {
                if next.order() < current.order() {
                    return Err(ProvisionerError::internal(format!(
                        "step for '{current}' attempted backward transition to '{next}'"
                    )));
                }
            }
            debug!(%invocation_id, next = %next, delay_seconds, "milestone reached");
            ctx.status = Some(next);
            Ok(ProgressEvent::in_progress(model, ctx.encode(), delay_seconds))
        }
        StepOutcome::Wait { delay_seconds } => {
            let polling = status.is_some_and(|s| s.is_polling());
            debug!(%invocation_id, status = ?status, polling, delay_seconds, "waiting on cloud-side state");
            // Status tag deliberately untouched: WAIT re-polls the same step.
            Ok(ProgressEvent::in_progress(model, ctx.encode(), delay_seconds))
        }
        StepOutcome::Success => {
            info!(%invocation_id, "create pipeline complete");
            Ok(ProgressEvent::success(model))
        }
        StepOutcome::Failed { message } => {
            info!(%invocation_id, message = %message, "create pipeline failed");
            Ok(ProgressEvent::failed(
                HandlerErrorCode::GeneralServiceException,
                message,
            ))
        }
    }
}
