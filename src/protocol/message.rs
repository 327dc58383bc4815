//! Request and response envelopes.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AppError, Result};

/// Error classification carried in `errorObj.code`.
///
/// Serialized as its wire string. Codes this crate does not define decode
/// as [`ErrorCode::Other`] carrying the raw spelling.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCode {
    /// The line was not a JSON object.
    ParseError,
    /// `id` or `method` missing or not a string.
    InvalidRequest,
    /// Well-formed request naming a method outside the table.
    UnknownMethod,
    /// A method-specific body field is missing or malformed.
    InvalidParams,
    /// Referenced toolkit, tool, or agent does not exist.
    NotFound,
    /// A tool action failed.
    ToolError,
    /// An agent invocation failed.
    InternalError,
    /// Any code this crate does not know (foreign host implementations).
    Other(String),
}

/// Code reported when a failed response carries no `errorObj`.
pub const MISSING_ERROR_CODE: &str = "UNKNOWN";

impl ErrorCode {
    /// Wire spelling of the code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ParseError => "PARSE_ERROR",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::UnknownMethod => "UNKNOWN_METHOD",
            Self::InvalidParams => "INVALID_PARAMS",
            Self::NotFound => "NOT_FOUND",
            Self::ToolError => "TOOL_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for ErrorCode {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "PARSE_ERROR" => Self::ParseError,
            "INVALID_REQUEST" => Self::InvalidRequest,
            "UNKNOWN_METHOD" => Self::UnknownMethod,
            "INVALID_PARAMS" => Self::InvalidParams,
            "NOT_FOUND" => Self::NotFound,
            "TOOL_ERROR" => Self::ToolError,
            "INTERNAL_ERROR" => Self::InternalError,
            _ => Self::Other(raw),
        }
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Other(raw) => raw,
            known => known.as_str().to_owned(),
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure reported by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Failure classification.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional extra context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorObject {
    /// Build an error object without details.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }
}

/// Supervisor → host request line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Caller-assigned correlation id, echoed in the response.
    pub id: String,
    /// Method wire name.
    pub method: String,
    /// Method-specific body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Host → supervisor response line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Correlation id of the request, or one of the reserved ids.
    pub id: String,
    /// Whether `result` (true) or `errorObj` (false) is meaningful.
    pub success: bool,
    /// Method result on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure description when `success` is false.
    #[serde(
        rename = "errorObj",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub error_obj: Option<ErrorObject>,
}

impl Response {
    /// Successful response carrying `result`.
    #[must_use]
    pub fn ok(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            success: true,
            result: Some(result),
            error_obj: None,
        }
    }

    /// Failed response with the given code and message.
    #[must_use]
    pub fn error(id: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            result: None,
            error_obj: Some(ErrorObject::new(code, message)),
        }
    }

    /// Serialize to a single line (no trailing newline).
    ///
    /// `serde_json` escapes control characters inside strings, so the output
    /// never contains a raw newline.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] if the result value cannot be serialized.
    pub fn to_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| AppError::Protocol(format!("encode response: {e}")))
    }

    /// Collapse the envelope into the call outcome.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Remote`] when `success` is false. A failed
    /// response without an `errorObj` is reported as [`ErrorCode::Other`]
    /// with [`MISSING_ERROR_CODE`].
    pub fn into_result(self) -> Result<Value> {
        if self.success {
            return Ok(self.result.unwrap_or(Value::Null));
        }
        Err(AppError::Remote(self.error_obj.unwrap_or_else(|| {
            ErrorObject::new(
                ErrorCode::Other(MISSING_ERROR_CODE.to_owned()),
                "host reported failure without errorObj",
            )
        })))
    }
}
