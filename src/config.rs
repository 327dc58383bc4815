//! Supervisor configuration parsing and validation.
//!
//! ```toml
//! [host]
//! command = "python3"
//! args = ["app.py"]
//! cwd = "."
//! inherit_env = true
//!
//! [host.env]
//! OPENAI_API_KEY = "sk-test"
//!
//! [timeouts]
//! request_seconds = 10
//! ready_seconds = 10
//! shutdown_millis = 500
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::client::{ClientConfig, SpawnConfig};
use crate::{AppError, Result};

/// How to launch the host process.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HostConfig {
    /// Executable to run.
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory; canonicalized during validation.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Inherit the supervisor's environment.
    #[serde(default = "default_true")]
    pub inherit_env: bool,
    /// Extra environment variables for the host.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Configurable deadlines.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Default per-call deadline.
    #[serde(default = "default_request_seconds")]
    pub request_seconds: u64,
    /// Wait for the host's readiness signal.
    #[serde(default = "default_ready_seconds")]
    pub ready_seconds: u64,
    /// Wait for the `shutdown` acknowledgement on close.
    #[serde(default = "default_shutdown_millis")]
    pub shutdown_millis: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_seconds: default_request_seconds(),
            ready_seconds: default_ready_seconds(),
            shutdown_millis: default_shutdown_millis(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_request_seconds() -> u64 {
    10
}

fn default_ready_seconds() -> u64 {
    10
}

fn default_shutdown_millis() -> u64 {
    500
}

/// Supervisor configuration parsed from a TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BridgeConfig {
    /// Host launch settings.
    pub host: HostConfig,
    /// Deadlines.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl BridgeConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration for a host given as a shell-like command line, with
    /// default timeouts.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the command line is empty or malformed.
    pub fn from_command_line(line: &str) -> Result<Self> {
        let spawn = SpawnConfig::from_command_line(line)?;
        Ok(Self {
            host: HostConfig {
                command: spawn.command,
                args: spawn.args,
                cwd: None,
                inherit_env: true,
                env: BTreeMap::new(),
            },
            timeouts: TimeoutConfig::default(),
        })
    }

    /// Replace the host command and arguments, keeping everything else.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the command line is empty or malformed.
    pub fn override_command(&mut self, line: &str) -> Result<()> {
        let spawn = SpawnConfig::from_command_line(line)?;
        self.host.command = spawn.command;
        self.host.args = spawn.args;
        Ok(())
    }

    /// Default per-call deadline.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.request_seconds)
    }

    /// Client settings derived from this configuration.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        let spawn = SpawnConfig {
            command: self.host.command.clone(),
            args: self.host.args.clone(),
            cwd: self.host.cwd.clone(),
            env: self.host.env.clone(),
            inherit_env: self.host.inherit_env,
        };
        ClientConfig::new(spawn)
            .with_request_timeout(self.request_timeout())
            .with_ready_timeout(Duration::from_secs(self.timeouts.ready_seconds))
            .with_shutdown_timeout(Duration::from_millis(self.timeouts.shutdown_millis))
    }

    fn validate(&mut self) -> Result<()> {
        if self.host.command.trim().is_empty() {
            return Err(AppError::Config("host.command must not be empty".into()));
        }

        if self.timeouts.request_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.request_seconds must be greater than zero".into(),
            ));
        }

        if self.timeouts.ready_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.ready_seconds must be greater than zero".into(),
            ));
        }

        if let Some(ref cwd) = self.host.cwd {
            let canonical = cwd
                .canonicalize()
                .map_err(|err| AppError::Config(format!("host.cwd invalid: {err}")))?;
            self.host.cwd = Some(canonical);
        }

        Ok(())
    }
}
