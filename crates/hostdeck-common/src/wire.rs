//! JSON frames carried over a host channel.
//!
//! Outbound frames are always `{"action": "<kind>"}`. Inbound frames are a flat
//! object whose fields are all optional and independent; a single frame may
//! carry a status label, timestamps, a lifecycle tag and an error at once.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::operation::OperationKind;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Request sent to the backend when the user confirms an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub action: OperationKind,
}

impl OperationRequest {
    pub fn new(action: OperationKind) -> Self {
        Self { action }
    }

    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// One inbound frame. `null`, missing and wrongly typed fields all decode to
/// `None`; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub config_status: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_update: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_commit: Option<String>,
    #[serde(
        default,
        rename = "commitHash",
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub commit_hash: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub action: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<String>,
    /// Free-form progress text sent alongside `<kind>_started`.
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub message: Option<String>,
}

impl InboundMessage {
    /// Parse a raw text frame. Only JSON objects are accepted.
    pub fn parse(raw: &str) -> Result<Self, WireError> {
        let value: Value = serde_json::from_str(raw)?;
        let kind = match value {
            Value::Object(_) => return Ok(serde_json::from_value(value)?),
            Value::Null => "null",
            Value::Bool(_) => "a boolean",
            Value::Number(_) => "a number",
            Value::String(_) => "a string",
            Value::Array(_) => "an array",
        };
        Err(WireError::NotAnObject(kind))
    }

    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn action_tag(&self) -> Option<ActionTag> {
        self.action.as_deref().map(ActionTag::decode)
    }

    pub fn lifecycle(kind: OperationKind, stage: LifecycleStage) -> Self {
        Self {
            action: Some(ActionTag::encode(kind, stage)),
            ..Self::default()
        }
    }
}

/// A field that is not a string is dropped on its own so the rest of the
/// frame still applies.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Null => None,
        other => {
            warn!(value = %other, "ignoring non-string field in inbound frame");
            None
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleStage {
    Started,
    Completed,
    Failed,
}

impl LifecycleStage {
    const SUFFIXES: [(&'static str, LifecycleStage); 3] = [
        ("_started", LifecycleStage::Started),
        ("_completed", LifecycleStage::Completed),
        ("_failed", LifecycleStage::Failed),
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            LifecycleStage::Started => "_started",
            LifecycleStage::Completed => "_completed",
            LifecycleStage::Failed => "_failed",
        }
    }
}

/// Decoded `action` field of an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionTag {
    Lifecycle {
        kind: OperationKind,
        stage: LifecycleStage,
    },
    Unrecognized(String),
}

impl ActionTag {
    pub fn decode(tag: &str) -> Self {
        for (suffix, stage) in LifecycleStage::SUFFIXES {
            let Some(prefix) = tag.strip_suffix(suffix) else {
                continue;
            };
            if let Some(kind) = OperationKind::ALL
                .into_iter()
                .find(|kind| kind.matches_tag_prefix(prefix))
            {
                return ActionTag::Lifecycle { kind, stage };
            }
        }
        ActionTag::Unrecognized(tag.to_string())
    }

    /// Tag in the spelling the backend emits.
    pub fn encode(kind: OperationKind, stage: LifecycleStage) -> String {
        format!("{}{}", kind.tag_prefix(), stage.suffix())
    }
}
