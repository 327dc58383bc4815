//! Typed request bodies and results for each [`Method`](super::Method).
//!
//! Field names follow the wire format: camelCase except for the two
//! snake_case results (`ping`, `shutdown`) the protocol fixed early on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload of the `__ready__` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyInfo {
    /// Name of the hosted App.
    pub name: String,
    /// Framing name, always `ndjson`.
    pub protocol: String,
    /// Protocol version.
    pub version: String,
}

/// Result of `ping`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResult {
    /// Always `true`.
    pub pong: bool,
    /// Protocol version spoken by the host.
    pub protocol_version: String,
    /// Host wall clock, milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Result of `getAppInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    /// App name.
    pub name: String,
    /// Number of registered agents.
    pub agent_count: usize,
    /// Number of registered toolkits.
    pub toolkit_count: usize,
}

/// Reference to a secret resolved by the hosted application, never its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    /// Where the secret lives (`env`, `keychain`, ...).
    pub source: String,
    /// Lookup key within the source.
    pub name: String,
}

impl Secret {
    /// Secret read from the named environment variable.
    #[must_use]
    pub fn from_env(name: impl Into<String>) -> Self {
        Self {
            source: "env".into(),
            name: name.into(),
        }
    }
}

/// Model an agent is configured to use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Provider-specific model identifier.
    pub identifier: String,
    /// API key reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Secret>,
}

impl ModelDescriptor {
    /// Descriptor without a key reference.
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            key: None,
        }
    }

    /// Attach an API key reference.
    #[must_use]
    pub fn with_key(mut self, key: Secret) -> Self {
        self.key = Some(key);
        self
    }
}

/// One entry of the `listAgents` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    /// Agent name.
    pub name: String,
    /// System prompt.
    pub system_prompt: String,
    /// Model descriptor.
    pub model: ModelDescriptor,
    /// Names of the toolkits the agent may use.
    pub toolkits: Vec<String>,
}

/// Declared shape of one tool argument.
///
/// Descriptive only: the host passes arguments to the tool uninspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgSpec {
    /// JSON type name (`string`, `number`, `boolean`, `object`, `array`).
    #[serde(rename = "type")]
    pub arg_type: String,
    /// Human-readable description.
    pub description: String,
    /// Whether callers must supply the argument.
    #[serde(default)]
    pub required: bool,
    /// Value assumed when the argument is omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Closed set of accepted values.
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
}

impl ArgSpec {
    /// Optional argument of the given type.
    #[must_use]
    pub fn new(arg_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            arg_type: arg_type.into(),
            description: description.into(),
            required: false,
            default: None,
            allowed: None,
        }
    }

    /// Mark the argument as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the default value.
    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Restrict the argument to a set of values.
    #[must_use]
    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.allowed = Some(values);
        self
    }
}

/// Tool descriptor nested in a [`ToolkitInfo`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// Argument schema keyed by argument name.
    #[serde(default)]
    pub args: BTreeMap<String, ArgSpec>,
}

/// One entry of the `listToolkits` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolkitInfo {
    /// Toolkit name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Tools in registration order.
    pub tools: Vec<ToolInfo>,
}

/// One entry of the `listTools` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSummary {
    /// Tool name.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// Argument schema keyed by argument name.
    #[serde(default)]
    pub args: BTreeMap<String, ArgSpec>,
    /// Toolkit the tool belongs to.
    pub toolkit_name: String,
}

/// One entry of the `listPrompts` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptInfo {
    /// Agent the prompt belongs to.
    pub agent_name: String,
    /// The agent's system prompt.
    pub system_prompt: String,
}

/// Body of `invokeTool`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeToolParams {
    /// Toolkit name.
    pub toolkit: String,
    /// Tool name within the toolkit.
    pub tool: String,
    /// Arguments passed to the tool action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Map<String, Value>>,
}

/// Body of `invokeAgent`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeAgentParams {
    /// Agent name.
    pub agent: String,
    /// User prompt; the host substitutes `""` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Conversation thread to continue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Opaque attachments forwarded to the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Value>>,
}

impl InvokeAgentParams {
    /// Invoke `agent` with `prompt` on a new thread.
    #[must_use]
    pub fn new(agent: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            prompt: Some(prompt.into()),
            ..Self::default()
        }
    }
}

/// Result of `invokeAgent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeAgentResult {
    /// Thread the invocation runs on.
    pub thread_id: String,
    /// Always `invoked`.
    pub status: String,
}

/// Result of `shutdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownResult {
    /// Always `true`.
    pub shutting_down: bool,
}
