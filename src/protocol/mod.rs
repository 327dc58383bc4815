//! Wire protocol shared by the host dispatcher and the supervisor client.
//!
//! Messages are UTF-8 JSON objects, one per `\n`-terminated line, exchanged
//! over the host process's stdin (requests) and stdout (responses).
//!
//! Submodules:
//! - `message`: request/response envelopes and error codes.
//! - `payload`: typed bodies and results for each [`Method`].
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based line framing.
//! - `writer`: single-owner writer task that serializes outbound lines.

pub mod codec;
pub mod message;
pub mod payload;
pub mod writer;

use std::fmt::{Display, Formatter};

pub use message::{ErrorCode, ErrorObject, Request, Response, MISSING_ERROR_CODE};
pub use payload::{
    AgentInfo, AppInfo, ArgSpec, InvokeAgentParams, InvokeAgentResult, InvokeToolParams,
    ModelDescriptor, PingResult, PromptInfo, ReadyInfo, Secret, ShutdownResult, ToolInfo,
    ToolSummary, ToolkitInfo,
};

/// Framing name announced in the readiness signal.
pub const PROTOCOL_NAME: &str = "ndjson";

/// Protocol version announced in the readiness signal and in `ping`.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Reserved id of the one-time readiness response.
pub const READY_ID: &str = "__ready__";

/// Reserved id used when an input line is not a JSON object.
pub const PARSE_ERROR_ID: &str = "__parse_error__";

/// Reserved id used when a parsed request carries no usable `id`.
pub const INVALID_ID: &str = "__invalid__";

/// Returns `true` if `id` is one of the protocol's reserved identifiers.
#[must_use]
pub fn is_reserved_id(id: &str) -> bool {
    matches!(id, READY_ID | PARSE_ERROR_ID | INVALID_ID)
}

/// Every method the host understands.
///
/// The dispatcher matches on this enum exhaustively, so adding a variant
/// forces a handler to be written.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Method {
    /// Liveness check.
    Ping,
    /// App name and registry sizes.
    GetAppInfo,
    /// Agent descriptors.
    ListAgents,
    /// Toolkits with their tools.
    ListToolkits,
    /// Flattened tool list across all toolkits.
    ListTools,
    /// System prompt of every agent.
    ListPrompts,
    /// Distinct models the agents use.
    ListModels,
    /// Execute one tool.
    InvokeTool,
    /// Start an agent invocation.
    InvokeAgent,
    /// Stop the host's read loop.
    Shutdown,
}

impl Method {
    /// All methods in table order.
    pub const ALL: [Self; 10] = [
        Self::Ping,
        Self::GetAppInfo,
        Self::ListAgents,
        Self::ListToolkits,
        Self::ListTools,
        Self::ListPrompts,
        Self::ListModels,
        Self::InvokeTool,
        Self::InvokeAgent,
        Self::Shutdown,
    ];

    /// Wire name of the method.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::GetAppInfo => "getAppInfo",
            Self::ListAgents => "listAgents",
            Self::ListToolkits => "listToolkits",
            Self::ListTools => "listTools",
            Self::ListPrompts => "listPrompts",
            Self::ListModels => "listModels",
            Self::InvokeTool => "invokeTool",
            Self::InvokeAgent => "invokeAgent",
            Self::Shutdown => "shutdown",
        }
    }

    /// Look up a method by its wire name. Names are case-sensitive.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|method| method.as_str() == name)
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
