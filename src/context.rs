//! Progress context carried between invocations.
//!
//! The host persists an opaque key/value map after every invocation and
//! replays it verbatim on the next one; this module owns both the typed
//! in-memory form and the flat wire codec. Once a step has written a field
//! it is immutable input for every later step, which is what makes resuming
//! after a crash safe: identifiers are reused, never recomputed.

use crate::error::{ProvisionerError, Result};
use crate::states::ProvisioningStatus;
use serde_json::Value;
use std::collections::BTreeMap;

const KEY_STATUS: &str = "provisioning_status";
const KEY_ENVIRONMENT_ID: &str = "environment_id";
const KEY_ENVIRONMENT_ARN: &str = "environment_arn";
const KEY_INSTANCE_ID: &str = "instance_id";
const KEY_VOLUME_ID: &str = "volume_id";
const KEY_ROLE_NAME: &str = "role_name";
const KEY_PROFILE_NAME: &str = "profile_name";
const KEY_DEFAULT_ASSOCIATION_ID: &str = "default_association_id";
const KEY_ASSOCIATION_ID: &str = "association_id";
const KEY_COMMAND_ID: &str = "command_id";

/// Wire representation of the progress token: a flat, ordered mapping from
/// string keys to scalar values.
pub type ContextMap = BTreeMap<String, Value>;

/// Typed view of the caller-persisted progress token.
///
/// Every field is a step-scoped accumulator: written once by the step that
/// brings the corresponding cloud object into existence, then read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressContext {
    /// Milestone already reached; `None` on the first invocation.
    pub status: Option<ProvisioningStatus>,
    pub environment_id: Option<String>,
    pub environment_arn: Option<String>,
    pub instance_id: Option<String>,
    pub volume_id: Option<String>,
    pub role_name: Option<String>,
    pub profile_name: Option<String>,
    /// Association id of the auto-assigned profile being detached.
    pub default_association_id: Option<String>,
    /// Association id of the profile this pipeline attaches.
    pub association_id: Option<String>,
    pub command_id: Option<String>,
}

impl ProgressContext {
    /// Serialize to the flat wire map the host persists. Only populated
    /// fields are emitted, so a fresh context encodes to an empty map.
    pub fn encode(&self) -> ContextMap {
        let mut map = ContextMap::new();
        if let Some(status) = self.status {
            map.insert(KEY_STATUS.to_string(), Value::String(status.to_string()));
        }
        let fields = [
            (KEY_ENVIRONMENT_ID, &self.environment_id),
            (KEY_ENVIRONMENT_ARN, &self.environment_arn),
            (KEY_INSTANCE_ID, &self.instance_id),
            (KEY_VOLUME_ID, &self.volume_id),
            (KEY_ROLE_NAME, &self.role_name),
            (KEY_PROFILE_NAME, &self.profile_name),
            (KEY_DEFAULT_ASSOCIATION_ID, &self.default_association_id),
            (KEY_ASSOCIATION_ID, &self.association_id),
            (KEY_COMMAND_ID, &self.command_id),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                map.insert(key.to_string(), Value::String(value.clone()));
            }
        }
        map
    }

    /// Decode the wire map back into the typed context.
    ///
    /// An unrecognized key, a non-scalar value, or an unknown status tag is
    /// a structural error: the persisted context has been corrupted and the
    /// invocation must fail hard rather than guess a resume point.
    pub fn decode(map: &ContextMap) -> Result<Self> {
        let mut ctx = Self::default();
        for (key, value) in map {
            match key.as_str() {
                KEY_STATUS => {
                    let tag = scalar_str(key, value)?;
                    let status = tag
                        .parse::<ProvisioningStatus>()
                        .map_err(|_| ProvisionerError::unknown_status_tag(tag))?;
                    ctx.status = Some(status);
                }
                KEY_ENVIRONMENT_ID => ctx.environment_id = Some(scalar_str(key, value)?.to_string()),
                KEY_ENVIRONMENT_ARN => {
                    ctx.environment_arn = Some(scalar_str(key, value)?.to_string())
                }
                KEY_INSTANCE_ID => ctx.instance_id = Some(scalar_str(key, value)?.to_string()),
                KEY_VOLUME_ID => ctx.volume_id = Some(scalar_str(key, value)?.to_string()),
                KEY_ROLE_NAME => ctx.role_name = Some(scalar_str(key, value)?.to_string()),
                KEY_PROFILE_NAME => ctx.profile_name = Some(scalar_str(key, value)?.to_string()),
                KEY_DEFAULT_ASSOCIATION_ID => {
                    ctx.default_association_id = Some(scalar_str(key, value)?.to_string())
                }
                KEY_ASSOCIATION_ID => ctx.association_id = Some(scalar_str(key, value)?.to_string()),
                KEY_COMMAND_ID => ctx.command_id = Some(scalar_str(key, value)?.to_string()),
                unknown => {
                    return Err(ProvisionerError::context_decode(format!(
                        "unrecognized context key '{unknown}'"
                    )))
                }
            }
        }
        Ok(ctx)
    }

    /// Require a key that an earlier step must already have written.
    pub fn require(&self, key: &str, status: ProvisioningStatus) -> Result<&str> {
        let field = match key {
            KEY_ENVIRONMENT_ID => &self.environment_id,
            KEY_ENVIRONMENT_ARN => &self.environment_arn,
            KEY_INSTANCE_ID => &self.instance_id,
            KEY_VOLUME_ID => &self.volume_id,
            KEY_ROLE_NAME => &self.role_name,
            KEY_PROFILE_NAME => &self.profile_name,
            KEY_DEFAULT_ASSOCIATION_ID => &self.default_association_id,
            KEY_ASSOCIATION_ID => &self.association_id,
            KEY_COMMAND_ID => &self.command_id,
            other => {
                return Err(ProvisionerError::internal(format!(
                    "unknown context key '{other}' requested"
                )))
            }
        };
        field
            .as_deref()
            .ok_or_else(|| ProvisionerError::missing_context_key(key, status.to_string()))
    }
}

fn scalar_str<'a>(key: &str, value: &'a Value) -> Result<&'a str> {
    value.as_str().ok_or_else(|| {
        ProvisionerError::context_decode(format!("context key '{key}' is not a string scalar"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_context_encodes_to_empty_map() {
        let ctx = ProgressContext::default();
        assert!(ctx.encode().is_empty());
        assert_eq!(ProgressContext::decode(&ContextMap::new()).unwrap(), ctx);
    }

    #[test]
    fn unknown_key_is_structural_error() {
        let mut map = ContextMap::new();
        map.insert("surprise".to_string(), Value::String("x".to_string()));
        let err = ProgressContext::decode(&map).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn unknown_status_tag_is_structural_error() {
        let mut map = ContextMap::new();
        map.insert(
            "provisioning_status".to_string(),
            Value::String("warp_drive_engaged".to_string()),
        );
        let err = ProgressContext::decode(&map).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn non_scalar_value_is_rejected() {
        let mut map = ContextMap::new();
        map.insert("environment_id".to_string(), serde_json::json!(["a", "b"]));
        assert!(ProgressContext::decode(&map).is_err());
    }

    #[test]
    fn require_reports_the_missing_key_and_state() {
        let ctx = ProgressContext::default();
        let err = ctx
            .require("instance_id", ProvisioningStatus::ResizedInstance)
            .unwrap_err();
        assert!(err.is_structural());
        assert!(err.to_string().contains("instance_id"));
        assert!(err.to_string().contains("resized_instance"));

        let ctx = ProgressContext {
            instance_id: Some("i-123".to_string()),
            ..Default::default()
        };
        assert_eq!(
            ctx.require("instance_id", ProvisioningStatus::ResizedInstance)
                .unwrap(),
            "i-123"
        );
    }

    fn arb_status() -> impl Strategy<Value = Option<ProvisioningStatus>> {
        prop_oneof![
            Just(None),
            Just(Some(ProvisioningStatus::EnvironmentCreated)),
            Just(Some(ProvisioningStatus::RoleCreated)),
            Just(Some(ProvisioningStatus::ResizedInstance)),
            Just(Some(ProvisioningStatus::InstanceStable)),
            Just(Some(ProvisioningStatus::NewProfileCreated)),
            Just(Some(ProvisioningStatus::DefaultProfileDetached)),
            Just(Some(ProvisioningStatus::ProfileAttached)),
            Just(Some(ProvisioningStatus::CommandSent)),
        ]
    }

    fn arb_field() -> impl Strategy<Value = Option<String>> {
        proptest::option::of("[a-zA-Z0-9:/_-]{1,40}")
    }

    proptest! {
        #[test]
        fn codec_round_trip(
            status in arb_status(),
            environment_id in arb_field(),
            environment_arn in arb_field(),
            instance_id in arb_field(),
            volume_id in arb_field(),
            role_name in arb_field(),
            profile_name in arb_field(),
            default_association_id in arb_field(),
            association_id in arb_field(),
            command_id in arb_field(),
        ) {
            let ctx = ProgressContext {
                status,
                environment_id,
                environment_arn,
                instance_id,
                volume_id,
                role_name,
                profile_name,
                default_association_id,
                association_id,
                command_id,
            };
            let decoded = ProgressContext::decode(&ctx.encode()).unwrap();
            prop_assert_eq!(decoded, ctx);
        }
    }
}
