//! Request classification and method dispatch.
//!
//! [`classify_line`] turns one raw input line into either nothing (blank
//! line), an immediate error response, or a [`Call`] ready for dispatch.
//! [`Dispatcher::dispatch`] executes a call against the [`App`] and always
//! produces exactly one [`Response`]: failures, including panics inside tool
//! actions and agent runners, are converted into error responses.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::app::{AgentInvocation, App, ResponseSink, Tool};
use crate::protocol::{
    ErrorCode, ErrorObject, InvokeAgentResult, Method, PingResult, ReadyInfo, Response,
    ShutdownResult, INVALID_ID, PARSE_ERROR_ID, PROTOCOL_NAME, PROTOCOL_VERSION, READY_ID,
};

type HandlerResult = std::result::Result<Value, ErrorObject>;

/// A validated request awaiting dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// Caller's correlation id.
    pub id: String,
    /// Resolved method.
    pub method: Method,
    /// Raw body, if any.
    pub body: Option<Value>,
}

/// What to do with one input line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Blank line: no response.
    Ignore,
    /// Malformed request: send this response as-is.
    Reply(Response),
    /// Well-formed request: dispatch it.
    Dispatch(Call),
}

/// Validate one input line.
///
/// Checks run in order: blank, JSON object, `id`, `method`, known method.
/// The first failing check decides the response.
#[must_use]
pub fn classify_line(line: &str) -> LineOutcome {
    if line.trim().is_empty() {
        return LineOutcome::Ignore;
    }

    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            return LineOutcome::Reply(Response::error(
                PARSE_ERROR_ID,
                ErrorCode::ParseError,
                format!("Failed to parse request: {e}"),
            ));
        }
    };

    let Value::Object(mut request) = value else {
        return LineOutcome::Reply(Response::error(
            PARSE_ERROR_ID,
            ErrorCode::ParseError,
            "Failed to parse request: expected a JSON object",
        ));
    };

    let Some(Value::String(id)) = request.remove("id") else {
        return LineOutcome::Reply(Response::error(
            INVALID_ID,
            ErrorCode::InvalidRequest,
            "Missing or invalid 'id' field",
        ));
    };

    let Some(Value::String(method_name)) = request.remove("method") else {
        return LineOutcome::Reply(Response::error(
            id,
            ErrorCode::InvalidRequest,
            "Missing or invalid 'method' field",
        ));
    };

    let Some(method) = Method::from_name(&method_name) else {
        return LineOutcome::Reply(Response::error(
            id,
            ErrorCode::UnknownMethod,
            format!("Unknown method: {method_name}"),
        ));
    };

    LineOutcome::Dispatch(Call {
        id,
        method,
        body: request.remove("body"),
    })
}

/// Executes calls against a shared [`App`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    app: Arc<App>,
}

impl Dispatcher {
    /// Dispatcher over `app`.
    #[must_use]
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }

    /// The hosted application.
    #[must_use]
    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    /// The one-time `__ready__` response.
    #[must_use]
    pub fn ready_response(&self) -> Response {
        let info = ReadyInfo {
            name: self.app.name().to_owned(),
            protocol: PROTOCOL_NAME.to_owned(),
            version: PROTOCOL_VERSION.to_owned(),
        };
        Response::from_handler(READY_ID, to_result(&info))
    }

    /// Classify and dispatch one line sequentially.
    ///
    /// `shutdown` is answered but has no further effect here; the serve
    /// loop owns termination.
    pub async fn handle_line(&self, line: &str) -> Option<Response> {
        match classify_line(line) {
            LineOutcome::Ignore => None,
            LineOutcome::Reply(response) => Some(response),
            LineOutcome::Dispatch(call) => Some(self.dispatch(call).await),
        }
    }

    /// Execute `call` and build its response.
    pub async fn dispatch(&self, call: Call) -> Response {
        let Call { id, method, body } = call;
        debug!(id, %method, "dispatching request");

        let outcome = match method {
            Method::Ping => to_result(&PingResult {
                pong: true,
                protocol_version: PROTOCOL_VERSION.to_owned(),
                timestamp: chrono::Utc::now().timestamp_millis(),
            }),
            Method::GetAppInfo => to_result(&self.app.app_info()),
            Method::ListAgents => to_result(&self.app.agent_infos()),
            Method::ListToolkits => to_result(&self.app.toolkit_infos()),
            Method::ListTools => to_result(&self.app.tool_summaries()),
            Method::ListPrompts => to_result(&self.app.prompt_infos()),
            Method::ListModels => to_result(&self.app.model_descriptors()),
            Method::InvokeTool => self.invoke_tool(body.unwrap_or(Value::Null)).await,
            Method::InvokeAgent => self.invoke_agent(body.unwrap_or(Value::Null)).await,
            Method::Shutdown => to_result(&ShutdownResult {
                shutting_down: true,
            }),
        };

        if let Err(ref err) = outcome {
            debug!(id, %method, code = %err.code, message = %err.message, "request failed");
        }
        Response::from_handler(id, outcome)
    }

    async fn invoke_tool(&self, body: Value) -> HandlerResult {
        let (Some(toolkit_name), Some(tool_name)) = (
            body.get("toolkit").and_then(Value::as_str),
            body.get("tool").and_then(Value::as_str),
        ) else {
            return Err(ErrorObject::new(
                ErrorCode::InvalidParams,
                "invokeTool requires 'toolkit' and 'tool' string fields",
            ));
        };

        let args = match body.get("args") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(args)) => args.clone(),
            Some(_) => {
                return Err(ErrorObject::new(
                    ErrorCode::InvalidParams,
                    "'args' must be an object",
                ));
            }
        };

        let toolkit = self.app.toolkit(toolkit_name).ok_or_else(|| {
            ErrorObject::new(
                ErrorCode::NotFound,
                format!("Toolkit not found: {toolkit_name}"),
            )
        })?;
        let tool = toolkit.tool(tool_name).ok_or_else(|| {
            ErrorObject::new(ErrorCode::NotFound, format!("Tool not found: {tool_name}"))
        })?;

        debug!(toolkit = toolkit_name, tool = tool_name, "invoking tool");
        run_tool(tool, args)
            .await
            .map_err(|message| ErrorObject::new(ErrorCode::ToolError, message))
    }

    async fn invoke_agent(&self, body: Value) -> HandlerResult {
        let Some(agent_name) = body.get("agent").and_then(Value::as_str) else {
            return Err(ErrorObject::new(
                ErrorCode::InvalidParams,
                "invokeAgent requires an 'agent' string field",
            ));
        };

        let agent = self.app.agent(agent_name).ok_or_else(|| {
            ErrorObject::new(
                ErrorCode::NotFound,
                format!("Agent not found: {agent_name}"),
            )
        })?;

        let invocation = AgentInvocation {
            agent: agent_name.to_owned(),
            prompt: body
                .get("prompt")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            thread_id: body
                .get("threadId")
                .and_then(Value::as_str)
                .map(str::to_owned),
            attachments: body.get("attachments").and_then(Value::as_array).cloned(),
        };

        let (sink, events) = ResponseSink::channel();
        tokio::spawn(log_agent_events(agent_name.to_owned(), events));

        let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| {
            agent.invoke(invocation, sink)
        })) {
            Ok(future) => AssertUnwindSafe(future)
                .catch_unwind()
                .await
                .map_err(|panic| panic_message(&*panic)),
            Err(panic) => Err(panic_message(&*panic)),
        };

        match outcome {
            Ok(Ok(thread_id)) => to_result(&InvokeAgentResult {
                thread_id,
                status: "invoked".to_owned(),
            }),
            Ok(Err(err)) => Err(ErrorObject::new(ErrorCode::InternalError, err.message())),
            Err(message) => Err(ErrorObject::new(ErrorCode::InternalError, message)),
        }
    }
}

impl Response {
    fn from_handler(id: impl Into<String>, outcome: HandlerResult) -> Self {
        match outcome {
            Ok(result) => Self::ok(id, result),
            Err(error_obj) => Self {
                id: id.into(),
                success: false,
                result: None,
                error_obj: Some(error_obj),
            },
        }
    }
}

/// Run a tool action, reducing every failure mode to its message.
async fn run_tool(tool: &Tool, args: Map<String, Value>) -> std::result::Result<Value, String> {
    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| tool.call(args))) {
        Ok(future) => future,
        Err(panic) => return Err(panic_message(&*panic)),
    };

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.message().to_owned()),
        Err(panic) => {
            warn!(tool = tool.name(), "tool action panicked");
            Err(panic_message(&*panic))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|msg| (*msg).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "action panicked".to_owned())
}

fn to_result<T: Serialize>(value: &T) -> HandlerResult {
    serde_json::to_value(value).map_err(|e| {
        ErrorObject::new(
            ErrorCode::InternalError,
            format!("failed to encode result: {e}"),
        )
    })
}

async fn log_agent_events(agent: String, mut events: mpsc::UnboundedReceiver<Value>) {
    while let Some(event) = events.recv().await {
        debug!(agent, %event, "agent event");
    }
}
