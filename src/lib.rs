#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # devenv-provisioner
//!
//! Resumable, step-wise provisioning state machine for cloud development
//! environments (compute instance, IAM identity, storage resize, bootstrap
//! command execution) exposed as a single logical resource.
//!
//! ## Overview
//!
//! A host orchestrator invokes the provisioner repeatedly with a persisted
//! progress token until the resource reaches a terminal state. Each
//! invocation is stateless apart from that token: the dispatcher decodes
//! the current status tag, runs exactly one step function against injected
//! cloud collaborators, and returns an updated model, an updated context,
//! and a delay hint. Waiting is always expressed by returning control to
//! the host; no step blocks beyond a single synchronous API exchange.
//!
//! ## Module Organization
//!
//! - [`states`] - Status tags (pipeline milestones) for the create pipeline
//! - [`context`] - Typed progress context and its flat wire codec
//! - [`model`] - Resource model and host request envelope
//! - [`outcome`] - Step outcomes and the host response envelope
//! - [`clients`] - Cloud collaborator traits (injected, mockable)
//! - [`steps`] - Step registry: forward pipeline and best-effort teardown
//! - [`dispatcher`] - Context decode -> step invoke -> envelope packaging
//! - [`handlers`] - Create/Update/Delete/Read/List entry points
//! - [`config`] - Delay cadence and IAM construction parameters
//! - [`error`] - Structured error handling
//!
//! ## Resume contract
//!
//! Once a step records an identifier in the progress context, later
//! invocations treat it as immutable input and never recreate the object it
//! names. Every create-style collaborator call is idempotent-or-caught, so
//! a crash-and-retry of any step converges on the same next milestone.

pub mod clients;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod model;
pub mod outcome;
pub mod states;
pub mod steps;

pub use clients::CloudClients;
pub use config::ProvisionerConfig;
pub use context::{ContextMap, ProgressContext};
pub use error::{ProvisionerError, Result};
pub use model::{ProvisionRequest, ResourceModel, Tag};
pub use outcome::{HandlerErrorCode, OperationStatus, ProgressEvent, StepOutcome};
pub use states::ProvisioningStatus;
