#![forbid(unsafe_code)]

//! `agent-bridge` — supervisor CLI.
//!
//! Spawns a host application, waits for its readiness signal, issues one
//! call, prints the result as pretty JSON on stdout, and closes the host.
//! Logs go to stderr.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use agent_bridge::client::Client;
use agent_bridge::protocol::InvokeAgentParams;
use agent_bridge::{AppError, BridgeConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "agent-bridge",
    about = "Introspect and drive a hosted agent application over stdio",
    version,
    long_about = None
)]
struct Cli {
    /// Host command line, e.g. `"python3 app.py"`. Overrides the config file.
    #[arg(long)]
    host: Option<String>,

    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Per-call deadline in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check that the host answers.
    Ping,

    /// Show the app name and counts.
    Info,

    /// List agents.
    Agents,

    /// List toolkits and their tools.
    Toolkits,

    /// List every tool across toolkits.
    Tools,

    /// List each agent's system prompt.
    Prompts,

    /// List the models agents use.
    Models,

    /// Invoke a tool.
    InvokeTool {
        /// Toolkit name.
        toolkit: String,
        /// Tool name.
        tool: String,
        /// Arguments as a JSON object.
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// Invoke an agent.
    InvokeAgent {
        /// Agent name.
        agent: String,
        /// Prompt text.
        prompt: String,
        /// Continue an existing thread.
        #[arg(long)]
        thread_id: Option<String>,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = match (&args.config, &args.host) {
        (Some(path), host) => {
            let mut config = BridgeConfig::load_from_path(path)?;
            if let Some(line) = host {
                config.override_command(line)?;
            }
            config
        }
        (None, Some(line)) => BridgeConfig::from_command_line(line)?,
        (None, None) => {
            return Err(AppError::Config(
                "either --host or --config is required".into(),
            ));
        }
    };
    if let Some(seconds) = args.timeout {
        config.timeouts.request_seconds = seconds.max(1);
    }

    let mut client = Client::connect(config.client_config()).await?;
    info!(
        command = config.host.command.as_str(),
        pid = client.process_id(),
        "connected to host"
    );

    let outcome = execute(&client, args.command).await;
    client.close().await;

    match outcome {
        Ok(value) => {
            let text = serde_json::to_string_pretty(&value)?;
            println!("{text}");
            Ok(())
        }
        Err(err) => {
            error!(%err, "call failed");
            let tail = client.stderr_tail().await;
            if !tail.is_empty() {
                error!(lines = tail.len(), "host stderr:\n{}", tail.join("\n"));
            }
            Err(err)
        }
    }
}

async fn execute(client: &Client, command: Command) -> Result<Value> {
    match command {
        Command::Ping => to_json(&client.ping().await?),
        Command::Info => to_json(&client.app_info().await?),
        Command::Agents => to_json(&client.list_agents().await?),
        Command::Toolkits => to_json(&client.list_toolkits().await?),
        Command::Tools => to_json(&client.list_tools().await?),
        Command::Prompts => to_json(&client.list_prompts().await?),
        Command::Models => to_json(&client.list_models().await?),
        Command::InvokeTool {
            toolkit,
            tool,
            args,
        } => {
            let args: Value = serde_json::from_str(&args)
                .map_err(|err| AppError::Config(format!("--args is not valid JSON: {err}")))?;
            client.invoke_tool(&toolkit, &tool, args).await
        }
        Command::InvokeAgent {
            agent,
            prompt,
            thread_id,
        } => {
            let mut params = InvokeAgentParams::new(agent, prompt);
            params.thread_id = thread_id;
            to_json(&client.invoke_agent(params).await?)
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
