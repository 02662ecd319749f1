//! Step outcomes and the response envelope returned to the host.

use crate::context::ContextMap;
use crate::model::ResourceModel;
use crate::states::ProvisioningStatus;
use serde::{Deserialize, Serialize};

/// Result of one step function invocation.
///
/// Exactly one outcome per invocation. `Wait` never advances the status tag;
/// `Continue` always names a registered tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Milestone reached; advance to the next tag and re-invoke after the
    /// given delay.
    Continue {
        next: ProvisioningStatus,
        delay_seconds: u64,
    },
    /// Cloud-side state change still in flight; stay on the current tag and
    /// re-poll after the given delay.
    Wait { delay_seconds: u64 },
    /// Terminal: all requested work completed.
    Success,
    /// Terminal: the request cannot proceed.
    Failed { message: String },
}

impl StepOutcome {
    pub fn advance(next: ProvisioningStatus, delay_seconds: u64) -> Self {
        Self::Continue {
            next,
            delay_seconds,
        }
    }

    pub fn wait(delay_seconds: u64) -> Self {
        Self::Wait {
            delay_seconds,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed { .. })
    }
}

/// Operation status reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    InProgress,
    Success,
    Failed,
}

/// Host-facing error codes attached to failed progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandlerErrorCode {
    InternalFailure,
    NotFound,
    InvalidRequest,
    GeneralServiceException,
}

/// Response envelope for a single invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub status: OperationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_model: Option<ResourceModel>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub resource_models: Vec<ResourceModel>,
    /// Serialized progress context the host must persist and replay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_context: Option<ContextMap>,
    pub callback_delay_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<HandlerErrorCode>,
}

impl ProgressEvent {
    /// Non-terminal progress: the host persists the context and re-invokes
    /// after the delay.
    pub fn in_progress(model: ResourceModel, context: ContextMap, delay_seconds: u64) -> Self {
        Self {
            status: OperationStatus::InProgress,
            resource_model: Some(model),
            resource_models: Vec::new(),
            callback_context: Some(context),
            callback_delay_seconds: delay_seconds,
            message: None,
            error_code: None,
        }
    }

    /// Terminal success carrying the final model.
    pub fn success(model: ResourceModel) -> Self {
        Self {
            status: OperationStatus::Success,
            resource_model: Some(model),
            resource_models: Vec::new(),
            callback_context: None,
            callback_delay_seconds: 0,
            message: None,
            error_code: None,
        }
    }

    /// Terminal success for list operations.
    pub fn success_list(models: Vec<ResourceModel>) -> Self {
        Self {
            status: OperationStatus::Success,
            resource_model: None,
            resource_models: models,
            callback_context: None,
            callback_delay_seconds: 0,
            message: None,
            error_code: None,
        }
    }

    /// Terminal failure with a host-facing error code and diagnostic.
    pub fn failed(error_code: HandlerErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Failed,
            resource_model: None,
            resource_models: Vec::new(),
            callback_context: None,
            callback_delay_seconds: 0,
            message: Some(message.into()),
            error_code: Some(error_code),
        }
    }

    /// Attach a message to an otherwise terminal event.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
