//! Demo application served by the `agent-bridge-demo-host` binary.
//!
//! Doubles as the fixture for end-to-end tests:
//!
//! | Toolkit          | Tool         | Result                                   |
//! |------------------|--------------|------------------------------------------|
//! | `UtilityToolkit` | `echo`       | `{echoed, timestamp}`                    |
//! | `UtilityToolkit` | `add`        | `{result, operation: "add"}`             |
//! | `UtilityToolkit` | `env`        | value of an environment variable or null |
//! | `AsyncToolkit`   | `delay`      | `{delayed: ms}` after sleeping `ms`      |
//! | `AsyncToolkit`   | `fail`       | fails with the given message             |
//! | `AsyncToolkit`   | `fail_async` | fails with the given message after a yield |

use std::time::Duration;

use serde_json::{json, Map, Value};

use crate::app::{Agent, App, Tool, Toolkit};
use crate::protocol::{ArgSpec, ModelDescriptor, Secret};
use crate::{AppError, Result};

/// Name announced in the readiness signal.
pub const DEMO_APP_NAME: &str = "DemoApp";

/// The demo agent's name.
pub const DEMO_AGENT_NAME: &str = "TestAgent";

const DEMO_SYSTEM_PROMPT: &str = "You are a helpful test agent for integration testing.";

/// Build the demo application.
///
/// # Errors
///
/// Returns [`AppError::Registry`] only if the fixed registrations conflict.
pub fn demo_app() -> Result<App> {
    let agent = Agent::new(
        DEMO_AGENT_NAME,
        DEMO_SYSTEM_PROMPT,
        ModelDescriptor::new("test-model").with_key(Secret::from_env("OPENAI_API_KEY")),
    )
    .with_toolkit("UtilityToolkit")
    .with_toolkit("AsyncToolkit");

    App::new(DEMO_APP_NAME)
        .with_toolkit(utility_toolkit()?)?
        .with_toolkit(async_toolkit()?)?
        .with_agent(agent)
}

fn utility_toolkit() -> Result<Toolkit> {
    Toolkit::new("UtilityToolkit")
        .with_description("Synchronous helper tools")
        .with_tool(
            Tool::new("echo", "Echo a message back with a timestamp", echo).with_arg(
                "message",
                ArgSpec::new("string", "Message to echo").required(),
            ),
        )?
        .with_tool(
            Tool::new("add", "Add two numbers", add)
                .with_arg("a", ArgSpec::new("number", "First operand").required())
                .with_arg("b", ArgSpec::new("number", "Second operand").required()),
        )?
        .with_tool(
            Tool::new("env", "Read an environment variable of the host", env_var).with_arg(
                "name",
                ArgSpec::new("string", "Variable name").required(),
            ),
        )
}

fn async_toolkit() -> Result<Toolkit> {
    Toolkit::new("AsyncToolkit")
        .with_description("Asynchronous and failing tools")
        .with_tool(
            Tool::new_async("delay", "Sleep, then report the delay", delay).with_arg(
                "ms",
                ArgSpec::new("integer", "Milliseconds to sleep").with_default(json!(100)),
            ),
        )?
        .with_tool(
            Tool::new("fail", "Fail immediately", |args| Err(failure(&args))).with_arg(
                "message",
                ArgSpec::new("string", "Failure message"),
            ),
        )?
        .with_tool(
            Tool::new_async("fail_async", "Fail after yielding", |args| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err::<Value, _>(failure(&args))
            })
            .with_arg("message", ArgSpec::new("string", "Failure message")),
        )
}

fn echo(args: Map<String, Value>) -> Result<Value> {
    let message = args.get("message").cloned().unwrap_or(Value::Null);
    Ok(json!({
        "echoed": message,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[allow(clippy::cast_precision_loss)]
fn add(args: Map<String, Value>) -> Result<Value> {
    let operand = |key: &str| args.get(key).cloned().unwrap_or(json!(0));
    let (a, b) = (operand("a"), operand("b"));

    let result = match (a.as_i64(), b.as_i64()) {
        (Some(a), Some(b)) => a
            .checked_add(b)
            .map_or_else(|| json!(a as f64 + b as f64), |sum| json!(sum)),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => json!(a + b),
            _ => return Err(AppError::Tool("'a' and 'b' must be numbers".into())),
        },
    };
    Ok(json!({ "result": result, "operation": "add" }))
}

fn env_var(args: Map<String, Value>) -> Result<Value> {
    let name = args
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Tool("'name' must be a string".into()))?;
    Ok(std::env::var(name).map_or(Value::Null, Value::String))
}

async fn delay(args: Map<String, Value>) -> Result<Value> {
    let ms = args.get("ms").and_then(Value::as_u64).unwrap_or(100);
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Ok(json!({ "delayed": ms }))
}

fn failure(args: &Map<String, Value>) -> AppError {
    let message = args
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("intentional failure");
    AppError::Tool(message.to_owned())
}
