//! In-memory App model exposed by a host process.
//!
//! An [`App`] is built once, before the dispatcher starts, and is shared
//! read-only (`Arc<App>`) afterwards. Tool and agent side effects belong to
//! the actions themselves.

pub mod agent;
pub mod tool;

pub use agent::{AcknowledgeRunner, Agent, AgentFuture, AgentInvocation, AgentRunner, ResponseSink};
pub use tool::{Tool, ToolAction, ToolFuture, Toolkit};

use crate::protocol::{AgentInfo, AppInfo, ModelDescriptor, PromptInfo, ToolSummary, ToolkitInfo};
use crate::{AppError, Result};

/// Registry of agents and toolkits under one application name.
#[derive(Debug, Clone)]
pub struct App {
    name: String,
    agents: Vec<Agent>,
    toolkits: Vec<Toolkit>,
}

impl App {
    /// Empty application.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agents: Vec::new(),
            toolkits: Vec::new(),
        }
    }

    /// Register a toolkit.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Registry`] if a toolkit with the same name exists.
    pub fn add_toolkit(&mut self, toolkit: Toolkit) -> Result<()> {
        if self.toolkit(toolkit.name()).is_some() {
            return Err(AppError::Registry(format!(
                "duplicate toolkit '{}'",
                toolkit.name()
            )));
        }
        self.toolkits.push(toolkit);
        Ok(())
    }

    /// Register an agent. Every toolkit it names must already be registered.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Registry`] on a duplicate agent name or an unknown
    /// toolkit reference.
    pub fn add_agent(&mut self, agent: Agent) -> Result<()> {
        if self.agent(agent.name()).is_some() {
            return Err(AppError::Registry(format!(
                "duplicate agent '{}'",
                agent.name()
            )));
        }
        if let Some(missing) = agent
            .toolkits()
            .iter()
            .find(|name| self.toolkit(name).is_none())
        {
            return Err(AppError::Registry(format!(
                "agent '{}' references unknown toolkit '{missing}'",
                agent.name()
            )));
        }
        self.agents.push(agent);
        Ok(())
    }

    /// Builder form of [`Self::add_toolkit`].
    ///
    /// # Errors
    ///
    /// See [`Self::add_toolkit`].
    pub fn with_toolkit(mut self, toolkit: Toolkit) -> Result<Self> {
        self.add_toolkit(toolkit)?;
        Ok(self)
    }

    /// Builder form of [`Self::add_agent`].
    ///
    /// # Errors
    ///
    /// See [`Self::add_agent`].
    pub fn with_agent(mut self, agent: Agent) -> Result<Self> {
        self.add_agent(agent)?;
        Ok(self)
    }

    /// Application name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Agents in registration order.
    #[must_use]
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// Toolkits in registration order.
    #[must_use]
    pub fn toolkits(&self) -> &[Toolkit] {
        &self.toolkits
    }

    /// Find an agent by exact name.
    #[must_use]
    pub fn agent(&self, name: &str) -> Option<&Agent> {
        self.agents.iter().find(|agent| agent.name() == name)
    }

    /// Find a toolkit by exact name.
    #[must_use]
    pub fn toolkit(&self, name: &str) -> Option<&Toolkit> {
        self.toolkits.iter().find(|toolkit| toolkit.name() == name)
    }

    /// `getAppInfo` result.
    #[must_use]
    pub fn app_info(&self) -> AppInfo {
        AppInfo {
            name: self.name.clone(),
            agent_count: self.agents.len(),
            toolkit_count: self.toolkits.len(),
        }
    }

    /// `listAgents` result.
    #[must_use]
    pub fn agent_infos(&self) -> Vec<AgentInfo> {
        self.agents.iter().map(Agent::info).collect()
    }

    /// `listToolkits` result.
    #[must_use]
    pub fn toolkit_infos(&self) -> Vec<ToolkitInfo> {
        self.toolkits.iter().map(Toolkit::info).collect()
    }

    /// `listPrompts` result: one entry per agent, in registration order.
    #[must_use]
    pub fn prompt_infos(&self) -> Vec<PromptInfo> {
        self.agents
            .iter()
            .map(|agent| PromptInfo {
                agent_name: agent.name().to_owned(),
                system_prompt: agent.system_prompt().to_owned(),
            })
            .collect()
    }

    /// `listModels` result: each distinct model descriptor once, in the
    /// order agents were registered.
    #[must_use]
    pub fn model_descriptors(&self) -> Vec<ModelDescriptor> {
        let mut models: Vec<ModelDescriptor> = Vec::new();
        for agent in &self.agents {
            if !models.contains(agent.model()) {
                models.push(agent.model().clone());
            }
        }
        models
    }

    /// `listTools` result: every tool, tagged with its toolkit.
    #[must_use]
    pub fn tool_summaries(&self) -> Vec<ToolSummary> {
        self.toolkits
            .iter()
            .flat_map(|toolkit| {
                toolkit.tools().iter().map(move |tool| ToolSummary {
                    name: tool.name().to_owned(),
                    description: tool.description().to_owned(),
                    args: tool.args().clone(),
                    toolkit_name: toolkit.name().to_owned(),
                })
            })
            .collect()
    }
}
