//! Provisioning milestone definitions for the create pipeline.
//!
//! Each variant names a milestone the resource has already reached; the step
//! registered for it performs the work required to reach the *next* one.
//! Absence of a tag in the incoming progress context means "first
//! invocation" and is represented as `Option::None` at the dispatch seam.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Milestones of the forward (create) pipeline, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningStatus {
    /// Base environment object exists; identifier and ARN recorded
    EnvironmentCreated,
    /// Dedicated execution role exists (created or reused)
    RoleCreated,
    /// Instance and root volume resolved; resize requested if needed
    ResizedInstance,
    /// Management agent reports in for the instance
    InstanceStable,
    /// Instance profile ready but the auto-assigned association remains
    NewProfileCreated,
    /// Auto-assigned profile association fully detached
    DefaultProfileDetached,
    /// New instance profile associated with the instance
    ProfileAttached,
    /// Bootstrap document dispatched for remote execution
    CommandSent,
}

impl ProvisioningStatus {
    /// Position in the pipeline order, used to assert that no step ever
    /// transitions backward.
    pub fn order(&self) -> u8 {
        match self {
            Self::EnvironmentCreated => 0,
            Self::RoleCreated => 1,
            Self::ResizedInstance => 2,
            Self::InstanceStable => 3,
            Self::NewProfileCreated => 4,
            Self::DefaultProfileDetached => 5,
            Self::ProfileAttached => 6,
            Self::CommandSent => 7,
        }
    }

    /// Check if the step for this milestone polls a cloud-side state change
    /// rather than performing a one-shot mutation.
    pub fn is_polling(&self) -> bool {
        matches!(
            self,
            Self::RoleCreated
                | Self::ResizedInstance
                | Self::NewProfileCreated
                | Self::DefaultProfileDetached
                | Self::CommandSent
        )
    }
}

impl fmt::Display for ProvisioningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnvironmentCreated => write!(f, "environment_created"),
            Self::RoleCreated => write!(f, "role_created"),
            Self::ResizedInstance => write!(f, "resized_instance"),
            Self::InstanceStable => write!(f, "instance_stable"),
            Self::NewProfileCreated => write!(f, "new_profile_created"),
            Self::DefaultProfileDetached => write!(f, "default_profile_detached"),
            Self::ProfileAttached => write!(f, "profile_attached"),
            Self::CommandSent => write!(f, "command_sent"),
        }
    }
}

impl std::str::FromStr for ProvisioningStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "environment_created" => Ok(Self::EnvironmentCreated),
            "role_created" => Ok(Self::RoleCreated),
            "resized_instance" => Ok(Self::ResizedInstance),
            "instance_stable" => Ok(Self::InstanceStable),
            "new_profile_created" => Ok(Self::NewProfileCreated),
            "default_profile_detached" => Ok(Self::DefaultProfileDetached),
            "profile_attached" => Ok(Self::ProfileAttached),
            "command_sent" => Ok(Self::CommandSent),
            _ => Err(format!("Invalid provisioning status: {s}")),
        }
    }
}
