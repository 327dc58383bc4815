//! Error types shared across the application.

use std::fmt::{Display, Formatter};

use crate::protocol::ErrorObject;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Wire framing or message (de)serialization failure.
    Protocol(String),
    /// File-system or stream I/O failure.
    Io(String),
    /// The host process could not be started.
    Spawn(String),
    /// A call or the readiness wait exceeded its deadline.
    Timeout(String),
    /// The host process exited (or its output closed) while calls were pending.
    ProcessExited(String),
    /// The client is not spawned, closing, or already closed.
    Closed(String),
    /// The host answered with `success: false`.
    Remote(ErrorObject),
    /// Duplicate or otherwise invalid App model registration.
    Registry(String),
    /// A tool action failed.
    Tool(String),
    /// An agent invocation failed.
    Agent(String),
}

impl AppError {
    /// Message without the kind prefix.
    ///
    /// The host reports tool and agent failures with exactly the message the
    /// action produced, so the `Display` prefix must not leak onto the wire.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Config(msg)
            | Self::Protocol(msg)
            | Self::Io(msg)
            | Self::Spawn(msg)
            | Self::Timeout(msg)
            | Self::ProcessExited(msg)
            | Self::Closed(msg)
            | Self::Registry(msg)
            | Self::Tool(msg)
            | Self::Agent(msg) => msg,
            Self::Remote(obj) => &obj.message,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::ProcessExited(msg) => write!(f, "process exited: {msg}"),
            Self::Closed(msg) => write!(f, "closed: {msg}"),
            Self::Remote(obj) => write!(f, "remote: {}: {}", obj.code, obj.message),
            Self::Registry(msg) => write!(f, "registry: {msg}"),
            Self::Tool(msg) => write!(f, "tool: {msg}"),
            Self::Agent(msg) => write!(f, "agent: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}
