//! Host process spawner.
//!
//! Starts the host with:
//! - piped stdin/stdout/stderr,
//! - `kill_on_drop(true)` so a dropped handle never leaks a process,
//! - either the inherited environment plus overrides, or `env_clear()` with
//!   the [`ALLOWED_ENV_VARS`] allowlist plus overrides.
//!
//! Also provides the exit monitor and the stderr capture task used by
//! [`Client`](super::Client).

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{AppError, Result};

/// Variables kept when the environment is not inherited.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    "LANG",
    "TMPDIR",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// Number of stderr lines retained for diagnostics.
pub const STDERR_TAIL_LINES: usize = 256;

/// Longest stderr line retained; the rest of a longer line is dropped.
pub const STDERR_LINE_MAX_BYTES: usize = 8 * 1024;

/// How to start the host process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnConfig {
    /// Executable to run.
    pub command: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Working directory; the caller's when `None`.
    pub cwd: Option<PathBuf>,
    /// Variables set on top of the base environment.
    pub env: BTreeMap<String, String>,
    /// Inherit the caller's environment (`true`) or start from the allowlist.
    pub inherit_env: bool,
}

impl SpawnConfig {
    /// Run `command` with no arguments in the caller's environment.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            inherit_env: true,
        }
    }

    /// Build from a shell-like command line (see [`split_command`]).
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if the line is empty or has an
    /// unterminated quote.
    pub fn from_command_line(line: &str) -> Result<Self> {
        let mut parts = split_command(line)?.into_iter();
        let command = parts
            .next()
            .ok_or_else(|| AppError::Config("host command must not be empty".into()))?;
        Ok(Self::new(command).with_args(parts))
    }

    /// Append arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set one environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Choose between the inherited environment and the allowlist.
    #[must_use]
    pub fn inherit_env(mut self, inherit: bool) -> Self {
        self.inherit_env = inherit;
        self
    }
}

/// Split a command line into program and arguments.
///
/// Whitespace separates words; single or double quotes group words; a
/// backslash escapes the next character (also inside quotes).
///
/// # Errors
///
/// Returns [`AppError::Config`] on an unterminated quote.
pub fn split_command(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (c, quote) {
            ('\\', _) => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
                in_word = true;
            }
            (c, Some(open)) if c == open => quote = None,
            (c, Some(_)) => current.push(c),
            ('"' | '\'', None) => {
                quote = Some(c);
                in_word = true;
            }
            (c, None) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (c, None) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if let Some(open) = quote {
        return Err(AppError::Config(format!(
            "unterminated {open} quote in command line"
        )));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Handles of a freshly started host process.
#[derive(Debug)]
pub struct HostProcess {
    /// Child handle; `kill_on_drop` is set.
    pub child: Child,
    /// Host input (requests).
    pub stdin: ChildStdin,
    /// Host output (responses).
    pub stdout: ChildStdout,
    /// Host diagnostics.
    pub stderr: ChildStderr,
}

/// Start the host process described by `config`.
///
/// # Errors
///
/// - [`AppError::Spawn`]`("failed to spawn host: …")` — OS spawn failure.
/// - [`AppError::Spawn`]`("failed to capture host …")` — a pipe is missing.
pub fn spawn_host(config: &SpawnConfig) -> Result<HostProcess> {
    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args);

    if !config.inherit_env {
        cmd.env_clear();
        for &key in ALLOWED_ENV_VARS {
            if let Ok(val) = std::env::var(key) {
                cmd.env(key, val);
            }
        }
    }
    cmd.envs(&config.env);

    if let Some(ref cwd) = config.cwd {
        cmd.current_dir(cwd);
    }

    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|err| {
        AppError::Spawn(format!("failed to spawn host '{}': {err}", config.command))
    })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture host stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture host stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture host stderr".into()))?;

    info!(
        command = config.command.as_str(),
        pid = child.id(),
        "host process spawned"
    );

    Ok(HostProcess {
        child,
        stdin,
        stdout,
        stderr,
    })
}

/// Wait for the host to exit, or kill it when `kill` fires.
///
/// Returns a human-readable reason used to fail pending calls.
pub async fn wait_for_exit(mut child: Child, kill: CancellationToken) -> String {
    tokio::select! {
        result = child.wait() => {
            let reason = describe_exit(result);
            info!(reason = reason.as_str(), "host process exited");
            reason
        }
        () = kill.cancelled() => {
            if let Err(err) = child.kill().await {
                warn!(%err, "failed to kill host process");
            }
            debug!("host process killed by client");
            "host process killed by client".to_owned()
        }
    }
}

fn describe_exit(result: std::io::Result<ExitStatus>) -> String {
    match result {
        Ok(status) => status.code().map_or_else(
            || "host process terminated by signal".to_owned(),
            |code| format!("host process exited with code {code}"),
        ),
        Err(err) => format!("host process wait error: {err}"),
    }
}

/// Ring buffer of the host's most recent stderr lines.
#[derive(Debug, Clone)]
pub struct StderrLog {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl Default for StderrLog {
    fn default() -> Self {
        Self::with_capacity(STDERR_TAIL_LINES)
    }
}

impl StderrLog {
    /// Log retaining at most `capacity` lines.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Append one line, evicting the oldest when full.
    ///
    /// A log with capacity 0 retains nothing.
    pub async fn push(&self, line: String) {
        if self.capacity == 0 {
            return;
        }
        let mut guard = self.lines.lock().await;
        while guard.len() >= self.capacity {
            guard.pop_front();
        }
        guard.push_back(line);
    }

    /// Retained lines, oldest first.
    pub async fn tail(&self) -> Vec<String> {
        self.lines.lock().await.iter().cloned().collect()
    }

    /// Drain `stderr` to EOF, retaining and debug-logging each line.
    ///
    /// Bytes that are not UTF-8 are replaced, and lines are cut at
    /// [`STDERR_LINE_MAX_BYTES`]. The pipe is read until EOF regardless of
    /// content: a host writing to a closed stderr would die of `SIGPIPE`.
    pub async fn capture<R>(self, stderr: R)
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::with_capacity(256);
        let mut discarding = false;

        loop {
            buf.clear();
            let limit = STDERR_LINE_MAX_BYTES as u64;
            let read = (&mut reader).take(limit).read_until(b'\n', &mut buf).await;
            match read {
                Ok(0) => break,
                Ok(_) => {
                    let complete = buf.last() == Some(&b'\n');
                    if discarding {
                        discarding = !complete;
                        continue;
                    }
                    discarding = !complete && buf.len() >= STDERR_LINE_MAX_BYTES;

                    let text = String::from_utf8_lossy(trim_line_end(&buf));
                    let line = if discarding {
                        format!("{text} [truncated]")
                    } else {
                        text.into_owned()
                    };
                    debug!(line = line.as_str(), "host stderr");
                    self.push(line).await;
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(err) => {
                    debug!(%err, "host stderr read failed");
                    break;
                }
            }
        }
    }
}

fn trim_line_end(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    bytes.strip_suffix(b"\r").unwrap_or(bytes)
}
