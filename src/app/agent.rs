//! Agents and their invocation entry point.

use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::protocol::{AgentInfo, ModelDescriptor};
use crate::Result;

/// Future returned by an agent runner; resolves to the thread id.
pub type AgentFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// Arguments of one `invokeAgent` call.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentInvocation {
    /// Name of the invoked agent.
    pub agent: String,
    /// User prompt (`""` when the caller sent none).
    pub prompt: String,
    /// Thread to continue, if any.
    pub thread_id: Option<String>,
    /// Opaque attachments.
    pub attachments: Option<Vec<Value>>,
}

/// Channel an agent uses to report progress events while it runs.
///
/// Events stay on the host: the protocol has no streaming of partial
/// results, so the dispatcher only logs them.
#[derive(Debug, Clone)]
pub struct ResponseSink {
    tx: mpsc::UnboundedSender<Value>,
}

impl ResponseSink {
    /// Create a sink and the receiver its events arrive on.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit one event. Returns `false` once nobody is listening.
    pub fn emit(&self, event: Value) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Invocation entry point of an [`Agent`].
pub trait AgentRunner: Send + Sync {
    /// Start handling `invocation` and return the thread id it runs on.
    ///
    /// Failures should be reported as [`AppError::Agent`](crate::AppError::Agent).
    fn invoke(&self, invocation: AgentInvocation, sink: ResponseSink) -> AgentFuture<'_>;
}

/// Default runner: acknowledges the prompt on the sink and returns the
/// caller's thread id, or a fresh UUID when none was given.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcknowledgeRunner;

impl AgentRunner for AcknowledgeRunner {
    fn invoke(&self, invocation: AgentInvocation, sink: ResponseSink) -> AgentFuture<'_> {
        Box::pin(async move {
            let thread_id = invocation
                .thread_id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            sink.emit(json!({
                "type": "acknowledged",
                "agent": invocation.agent,
                "threadId": thread_id,
                "prompt": invocation.prompt,
                "attachments": invocation.attachments.as_ref().map_or(0, Vec::len),
            }));
            Ok(thread_id)
        })
    }
}

/// A named agent: prompt, model, usable toolkits, and a runner.
#[derive(Clone)]
pub struct Agent {
    name: String,
    system_prompt: String,
    model: ModelDescriptor,
    toolkits: Vec<String>,
    runner: Arc<dyn AgentRunner>,
}

impl Agent {
    /// Agent with no toolkits and the [`AcknowledgeRunner`].
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        model: ModelDescriptor,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            model,
            toolkits: Vec::new(),
            runner: Arc::new(AcknowledgeRunner),
        }
    }

    /// Allow the agent to use a toolkit (by name).
    #[must_use]
    pub fn with_toolkit(mut self, toolkit: impl Into<String>) -> Self {
        let toolkit = toolkit.into();
        if !self.toolkits.contains(&toolkit) {
            self.toolkits.push(toolkit);
        }
        self
    }

    /// Replace the runner.
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn AgentRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Agent name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// System prompt.
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Model descriptor.
    #[must_use]
    pub fn model(&self) -> &ModelDescriptor {
        &self.model
    }

    /// Names of usable toolkits.
    #[must_use]
    pub fn toolkits(&self) -> &[String] {
        &self.toolkits
    }

    /// Run the invocation entry point.
    pub fn invoke(&self, invocation: AgentInvocation, sink: ResponseSink) -> AgentFuture<'_> {
        self.runner.invoke(invocation, sink)
    }

    /// Wire descriptor of this agent.
    #[must_use]
    pub fn info(&self) -> AgentInfo {
        AgentInfo {
            name: self.name.clone(),
            system_prompt: self.system_prompt.clone(),
            model: self.model.clone(),
            toolkits: self.toolkits.clone(),
        }
    }
}

impl Debug for Agent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("toolkits", &self.toolkits)
            .finish_non_exhaustive()
    }
}
