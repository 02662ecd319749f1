//! Lifecycle entry points exposed to the host orchestrator.
//!
//! Thin adapters over the dispatcher and teardown pass: create drives the
//! forward state machine, delete drives the best-effort teardown, update
//! degenerates to a read, read echoes the model, list is a stub.

use tracing::error;

use crate::clients::CloudClients;
use crate::config::ProvisionerConfig;
use crate::context::ContextMap;
use crate::dispatcher;
use crate::model::ProvisionRequest;
use crate::outcome::{HandlerErrorCode, OperationStatus, ProgressEvent};
use crate::steps::teardown;

/// Drive one invocation of the create pipeline.
///
/// Structural errors (corrupted context, unregistered status tag) are
/// reported as internal failures and must not be retried by the host.
pub async fn create_handler(
    request: &ProvisionRequest,
    callback_context: Option<&ContextMap>,
    clients: &CloudClients,
    config: &ProvisionerConfig,
) -> ProgressEvent {
    match dispatcher::drive_create(request, callback_context, clients, config).await {
        Ok(event) => event,
        Err(err) => {
            error!(error = %err, "create invocation failed");
            ProgressEvent::failed(HandlerErrorCode::InternalFailure, err.to_string())
        }
    }
}

/// Update degenerates to a full no-op resync of current state.
pub async fn update_handler(
    request: &ProvisionRequest,
    _callback_context: Option<&ContextMap>,
    _clients: &CloudClients,
    _config: &ProvisionerConfig,
) -> ProgressEvent {
    read_handler(request)
}

/// Best-effort teardown; always reports SUCCESS.
pub async fn delete_handler(
    request: &ProvisionRequest,
    callback_context: Option<&ContextMap>,
    clients: &CloudClients,
    config: &ProvisionerConfig,
) -> ProgressEvent {
    let ctx = callback_context
        .and_then(|map| crate::context::ProgressContext::decode(map).ok())
        .unwrap_or_default();

    let report =
        teardown::run_teardown(&request.desired_resource_state, &ctx, clients, config).await;

    ProgressEvent {
        status: OperationStatus::Success,
        resource_model: None,
        resource_models: Vec::new(),
        callback_context: None,
        callback_delay_seconds: 0,
        message: Some(report.summary()),
        error_code: None,
    }
}

/// Pure passthrough: return the model unchanged.
pub fn read_handler(request: &ProvisionRequest) -> ProgressEvent {
    ProgressEvent::success(request.desired_resource_state.clone())
}

/// Enumeration is out of scope; always an empty result set.
pub fn list_handler() -> ProgressEvent {
    ProgressEvent::success_list(Vec::new())
}
