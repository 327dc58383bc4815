//! Tools and toolkits.

use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::protocol::{ArgSpec, ToolInfo, ToolkitInfo};
use crate::{AppError, Result};

/// Future returned by a tool action.
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>>;

/// Executable body of a [`Tool`].
///
/// Synchronous and asynchronous actions share this one shape so the
/// dispatcher has a single code path. Failures should be reported as
/// [`AppError::Tool`]; the host forwards the message verbatim.
pub trait ToolAction: Send + Sync {
    /// Run the action with the caller's arguments (`{}` when none were sent).
    fn call(&self, args: Map<String, Value>) -> ToolFuture<'_>;
}

struct SyncAction<F>(F);

impl<F> ToolAction for SyncAction<F>
where
    F: Fn(Map<String, Value>) -> Result<Value> + Send + Sync,
{
    fn call(&self, args: Map<String, Value>) -> ToolFuture<'_> {
        // Run inside the future so a panic surfaces when it is polled.
        Box::pin(async move { (self.0)(args) })
    }
}

struct AsyncAction<F>(F);

impl<F, Fut> ToolAction for AsyncAction<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn call(&self, args: Map<String, Value>) -> ToolFuture<'_> {
        Box::pin((self.0)(args))
    }
}

/// A named, described, callable tool.
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    args: BTreeMap<String, ArgSpec>,
    action: Arc<dyn ToolAction>,
}

impl Tool {
    /// Tool backed by a synchronous closure.
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, action: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Result<Value> + Send + Sync + 'static,
    {
        Self::from_action(name, description, SyncAction(action))
    }

    /// Tool backed by a closure returning a future.
    pub fn new_async<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        action: F,
    ) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self::from_action(name, description, AsyncAction(action))
    }

    /// Tool backed by any [`ToolAction`] implementation.
    pub fn from_action(
        name: impl Into<String>,
        description: impl Into<String>,
        action: impl ToolAction + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            args: BTreeMap::new(),
            action: Arc::new(action),
        }
    }

    /// Declare an argument.
    #[must_use]
    pub fn with_arg(mut self, name: impl Into<String>, spec: ArgSpec) -> Self {
        self.args.insert(name.into(), spec);
        self
    }

    /// Tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tool description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Declared argument schema.
    #[must_use]
    pub fn args(&self) -> &BTreeMap<String, ArgSpec> {
        &self.args
    }

    /// Invoke the action. Arguments are not checked against [`Self::args`].
    pub fn call(&self, args: Map<String, Value>) -> ToolFuture<'_> {
        self.action.call(args)
    }

    /// Wire descriptor of this tool.
    #[must_use]
    pub fn info(&self) -> ToolInfo {
        ToolInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            args: self.args.clone(),
        }
    }
}

impl Debug for Tool {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// Named group of tools with unique tool names.
#[derive(Debug, Clone)]
pub struct Toolkit {
    name: String,
    description: Option<String>,
    tools: Vec<Tool>,
}

impl Toolkit {
    /// Empty toolkit.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            tools: Vec::new(),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Register a tool.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Registry`] if a tool with the same name exists.
    pub fn add_tool(&mut self, tool: Tool) -> Result<()> {
        if self.tool(tool.name()).is_some() {
            return Err(AppError::Registry(format!(
                "duplicate tool '{}' in toolkit '{}'",
                tool.name(),
                self.name
            )));
        }
        self.tools.push(tool);
        Ok(())
    }

    /// Builder form of [`Self::add_tool`].
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Registry`] on a duplicate tool name.
    pub fn with_tool(mut self, tool: Tool) -> Result<Self> {
        self.add_tool(tool)?;
        Ok(self)
    }

    /// Toolkit name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Tools in registration order.
    #[must_use]
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Find a tool by exact name.
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    /// Wire descriptor of this toolkit.
    #[must_use]
    pub fn info(&self) -> ToolkitInfo {
        ToolkitInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            tools: self.tools.iter().map(Tool::info).collect(),
        }
    }
}
