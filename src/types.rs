use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ===================================================================
// Shared Enums
// ===================================================================

/// How a session was started (used by SessionStart).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStartSource {
    Startup,
    Resume,
    Clear,
}

/// Compaction trigger (used by PreCompact).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompactTrigger {
    Manual,
    Auto,
}

/// Every event kind the decoder understands, by wire name.
pub const EVENT_KINDS: &[&str] = &[
    "SessionStart",
    "UserPromptSubmit",
    "PreToolUse",
    "PostToolUse",
    "Notification",
    "Stop",
    "SubagentStop",
    "PreCompact",
];

/// Base fields every event must carry as non-empty strings.
const BASE_FIELDS: &[&str] = &["hook_event_name", "session_id", "transcript_path", "cwd"];

// ===================================================================
// Hook Input Types (received via stdin, snake_case JSON)
// ===================================================================

/// Fields shared by all hook event inputs.
#[derive(Debug, Clone, Deserialize)]
pub struct CommonInput {
    pub session_id: String,
    pub transcript_path: String,
    pub cwd: String,
}

// --- Per-event input structs ---

#[derive(Debug, Deserialize)]
pub struct SessionStartInput {
    #[serde(flatten)]
    pub common: CommonInput,
    pub source: SessionStartSource,
}

#[derive(Debug, Deserialize)]
pub struct UserPromptSubmitInput {
    #[serde(flatten)]
    pub common: CommonInput,
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct PreToolUseInput {
    #[serde(flatten)]
    pub common: CommonInput,
    pub tool_name: String,
    pub tool_input: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct PostToolUseInput {
    #[serde(flatten)]
    pub common: CommonInput,
    pub tool_name: String,
    pub tool_input: Map<String, Value>,
    pub tool_response: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationInput {
    #[serde(flatten)]
    pub common: CommonInput,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct StopInput {
    #[serde(flatten)]
    pub common: CommonInput,
    pub stop_hook_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct SubagentStopInput {
    #[serde(flatten)]
    pub common: CommonInput,
    pub stop_hook_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct PreCompactInput {
    #[serde(flatten)]
    pub common: CommonInput,
    pub trigger: CompactTrigger,
    #[serde(default)]
    pub custom_instructions: Option<String>,
}

/// Top-level hook input, deserialized from stdin JSON.
///
/// Tagged by the `hook_event_name` field to determine which event fired.
/// Use [`decode`] rather than deserializing directly: it separates unknown
/// event kinds from malformed payloads.
#[derive(Debug, Deserialize)]
#[serde(tag = "hook_event_name")]
pub enum HookInput {
    SessionStart(SessionStartInput),
    UserPromptSubmit(UserPromptSubmitInput),
    PreToolUse(PreToolUseInput),
    PostToolUse(PostToolUseInput),
    Notification(NotificationInput),
    Stop(StopInput),
    SubagentStop(SubagentStopInput),
    PreCompact(PreCompactInput),
}

impl HookInput {
    /// Access the common fields shared by all hook events.
    pub fn common(&self) -> &CommonInput {
        match self {
            Self::SessionStart(e) => &e.common,
            Self::UserPromptSubmit(e) => &e.common,
            Self::PreToolUse(e) => &e.common,
            Self::PostToolUse(e) => &e.common,
            Self::Notification(e) => &e.common,
            Self::Stop(e) => &e.common,
            Self::SubagentStop(e) => &e.common,
            Self::PreCompact(e) => &e.common,
        }
    }

    /// The wire name of this event kind.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::SessionStart(_) => "SessionStart",
            Self::UserPromptSubmit(_) => "UserPromptSubmit",
            Self::PreToolUse(_) => "PreToolUse",
            Self::PostToolUse(_) => "PostToolUse",
            Self::Notification(_) => "Notification",
            Self::Stop(_) => "Stop",
            Self::SubagentStop(_) => "SubagentStop",
            Self::PreCompact(_) => "PreCompact",
        }
    }
}

/// Decode a single hook event from the raw stdin payload.
///
/// Base fields are checked before the event kind so that a payload missing
/// `session_id` is a decode error even when its kind is unknown. Extra
/// fields are ignored.
pub fn decode(input: &str) -> Result<HookInput> {
    let value: Value = serde_json::from_str(input)
        .map_err(|e| Error::Decode(format!("malformed hook input: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| Error::Decode("hook input is not a JSON object".into()))?;

    for field in BASE_FIELDS {
        match object.get(*field) {
            Some(Value::String(s)) if !s.is_empty() => {}
            Some(Value::String(_)) => {
                return Err(Error::Decode(format!("`{field}` must not be empty")));
            }
            Some(_) => return Err(Error::Decode(format!("`{field}` must be a string"))),
            None => return Err(Error::Decode(format!("missing field `{field}`"))),
        }
    }

    let kind = object
        .get("hook_event_name")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if !EVENT_KINDS.contains(&kind) {
        return Err(Error::UnknownEvent(kind.to_string()));
    }
    let kind = kind.to_string();

    serde_json::from_value(value).map_err(|e| Error::Decode(format!("invalid {kind} event: {e}")))
}

// ===================================================================
// Hook Output Types (written to stdout as JSON, camelCase)
// ===================================================================

/// Top-level hook output written to stdout on exit code 0.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookOutput {
    /// Event-specific output fields.
    pub hook_specific_output: HookSpecificOutput,
}

/// Event-specific output, tagged by `hookEventName`.
#[derive(Debug, Serialize)]
#[serde(tag = "hookEventName")]
pub enum HookSpecificOutput {
    SessionStart(AdditionalContext),
    UserPromptSubmit(AdditionalContext),
}

/// Context string the Assistant appends to the conversation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalContext {
    pub additional_context: String,
}

impl HookOutput {
    pub fn session_start_context(text: impl Into<String>) -> Self {
        Self {
            hook_specific_output: HookSpecificOutput::SessionStart(AdditionalContext {
                additional_context: text.into(),
            }),
        }
    }

    pub fn prompt_context(text: impl Into<String>) -> Self {
        Self {
            hook_specific_output: HookSpecificOutput::UserPromptSubmit(AdditionalContext {
                additional_context: text.into(),
            }),
        }
    }
}
