//! Step registry for the provisioning pipelines.
//!
//! Exactly one step function is registered per status tag. Dispatch is an
//! exhaustive match over `Option<ProvisioningStatus>` so the transition
//! table is inspectable in one place and checked at compile time: adding a
//! milestone without registering its step is a build error.

pub mod create;
pub mod teardown;

use crate::clients::CloudClients;
use crate::config::ProvisionerConfig;
use crate::context::ProgressContext;
use crate::error::Result;
use crate::model::{ProvisionRequest, ResourceModel};
use crate::outcome::StepOutcome;
use crate::states::ProvisioningStatus;

/// Invoke the step function registered for the given milestone.
///
/// `None` means no milestone has been reached yet (first invocation). The
/// step mutates the model and context in place; the dispatcher owns
/// advancing the status tag afterwards.
pub async fn run_step(
    status: Option<ProvisioningStatus>,
    request: &ProvisionRequest,
    model: &mut ResourceModel,
    ctx: &mut ProgressContext,
    clients: &CloudClients,
    config: &ProvisionerConfig,
) -> Result<StepOutcome> {
    use ProvisioningStatus::*;

    match status {
        None => create::start_environment(request, model, ctx, clients, config).await,
        Some(EnvironmentCreated) => {
            create::ensure_execution_role(request, model, ctx, clients, config).await
        }
        Some(RoleCreated) => {
            create::resolve_and_resize_instance(request, model, ctx, clients, config).await
        }
        Some(ResizedInstance) => create::await_agent(request, model, ctx, clients, config).await,
        Some(InstanceStable) => {
            create::prepare_instance_profile(request, model, ctx, clients, config).await
        }
        Some(NewProfileCreated) => {
            create::detach_default_profile(request, model, ctx, clients, config).await
        }
        Some(DefaultProfileDetached) => {
            create::attach_new_profile(request, model, ctx, clients, config).await
        }
        Some(ProfileAttached) => {
            create::dispatch_bootstrap(request, model, ctx, clients, config).await
        }
        Some(CommandSent) => create::await_bootstrap(request, model, ctx, clients, config).await,
    }
}
