//! Supervisor-side client.
//!
//! [`Client`] owns one host process and multiplexes concurrent calls over
//! its stdin/stdout. Each call gets a fresh id, registers a completion in
//! [`PendingCalls`], and waits with a deadline; the reader task completes
//! calls as responses arrive in any order.
//!
//! # Lifecycle
//!
//! ```text
//! Unspawned ──spawn()──▶ Spawning ──__ready__──▶ Ready ──close()──▶ Closing ──▶ Closed
//!                            │                     │
//!                            └──exit / timeout─────┴──host exit──────────────▶ Closed
//! ```
//!
//! Background tasks per spawned host:
//! - writer: owns stdin, drains the outbound channel;
//! - reader: owns stdout, routes responses;
//! - stderr: retains the last [`STDERR_TAIL_LINES`] lines;
//! - exit monitor: owns the child, fails pending calls on exit.

pub mod pending;
pub mod reader;
pub mod spawner;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::writer::run_writer;
use crate::protocol::{
    AgentInfo, AppInfo, InvokeAgentParams, InvokeAgentResult, InvokeToolParams, Method,
    ModelDescriptor, PingResult, PromptInfo, ReadyInfo, Request, ShutdownResult, ToolSummary,
    ToolkitInfo,
};
use crate::{AppError, Result};

pub use pending::{PendingCalls, PendingGuard};
pub use reader::{ResponseRouter, Routed};
pub use spawner::{
    split_command, SpawnConfig, StderrLog, ALLOWED_ENV_VARS, STDERR_LINE_MAX_BYTES, STDERR_TAIL_LINES,
};

/// Default per-call deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait for the readiness signal after spawning.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait for the `shutdown` acknowledgement during [`Client::close`].
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

const OUTBOUND_CAPACITY: usize = 64;

/// Client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// How to start the host.
    pub spawn: SpawnConfig,
    /// Deadline applied to calls that do not pass their own.
    pub request_timeout: Duration,
    /// Deadline for the readiness signal.
    pub ready_timeout: Duration,
    /// Deadline for the best-effort `shutdown` during close.
    pub shutdown_timeout: Duration,
}

impl ClientConfig {
    /// Settings with default timeouts.
    #[must_use]
    pub fn new(spawn: SpawnConfig) -> Self {
        Self {
            spawn,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Override the default call deadline.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Override the readiness deadline.
    #[must_use]
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Override the shutdown acknowledgement deadline.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Client lifecycle state.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ClientState {
    /// Constructed, no process yet.
    Unspawned,
    /// Process started, waiting for the readiness signal.
    Spawning,
    /// Accepting calls.
    Ready,
    /// `close` in progress; only `shutdown` is sent.
    Closing,
    /// Terminal.
    Closed,
}

/// State shared with the background tasks.
#[derive(Debug)]
struct Shared {
    state: watch::Sender<ClientState>,
    pending: PendingCalls,
    next_id: AtomicU64,
    orphaned: Arc<AtomicU64>,
    stderr: StderrLog,
}

impl Shared {
    fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    /// Move to `next` unless already closed; `Closed` is terminal.
    fn set_state(&self, next: ClientState) {
        self.state.send_if_modified(|state| {
            if *state == ClientState::Closed || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    /// Enter `Closed` and fail every pending call with `reason`.
    ///
    /// The state flips before the map is drained so a call registering
    /// concurrently either gets drained here or sees `Closed` afterwards.
    async fn shut(&self, reason: &str) {
        self.set_state(ClientState::Closed);
        let failed = self.pending.fail_all(reason).await;
        if failed > 0 {
            warn!(failed, reason, "client: failed pending calls");
        }
    }
}

/// Handles to one running host.
#[derive(Debug)]
struct Link {
    outbound: mpsc::Sender<String>,
    kill: CancellationToken,
    io_cancel: CancellationToken,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
    stderr: JoinHandle<()>,
    monitor: JoinHandle<()>,
    process_id: Option<u32>,
}

impl Link {
    /// Kill the host and stop every background task.
    async fn teardown(mut self) {
        self.kill.cancel();
        self.io_cancel.cancel();
        let _ = (&mut self.monitor).await;
        let _ = (&mut self.reader).await;
        let _ = (&mut self.writer).await;
        // A grandchild may still hold stderr open.
        self.stderr.abort();
        let _ = (&mut self.stderr).await;
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.kill.cancel();
        self.io_cancel.cancel();
    }
}

/// Supervisor handle to one host process.
#[derive(Debug)]
pub struct Client {
    config: ClientConfig,
    shared: Arc<Shared>,
    link: Option<Link>,
    ready: Option<ReadyInfo>,
}

impl Client {
    /// Unspawned client.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let (state, _) = watch::channel(ClientState::Unspawned);
        Self {
            config,
            shared: Arc::new(Shared {
                state,
                pending: PendingCalls::new(),
                next_id: AtomicU64::new(1),
                orphaned: Arc::new(AtomicU64::new(0)),
                stderr: StderrLog::default(),
            }),
            link: None,
            ready: None,
        }
    }

    /// Construct and spawn in one step.
    ///
    /// # Errors
    ///
    /// See [`Client::spawn`].
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let mut client = Self::new(config);
        client.spawn().await?;
        Ok(client)
    }

    /// Start the host and wait for its readiness signal.
    ///
    /// # Errors
    ///
    /// - [`AppError::Closed`] if the client was already spawned.
    /// - [`AppError::Spawn`] if the process cannot be started.
    /// - [`AppError::ProcessExited`] if it exits before signalling readiness.
    /// - [`AppError::Timeout`] if no readiness signal arrives in time; the
    ///   process is killed.
    /// - [`AppError::Remote`] / [`AppError::Protocol`] for a failed or
    ///   malformed readiness signal.
    pub async fn spawn(&mut self) -> Result<ReadyInfo> {
        if self.state() != ClientState::Unspawned {
            return Err(AppError::Closed("client already spawned".into()));
        }
        self.shared.set_state(ClientState::Spawning);

        // The ready channel exists before the process does, so an early
        // readiness line is never missed.
        let (ready_tx, ready_rx) = oneshot::channel();

        let host = match spawner::spawn_host(&self.config.spawn) {
            Ok(host) => host,
            Err(err) => {
                self.shared.shut("spawn failed").await;
                return Err(err);
            }
        };
        let spawner::HostProcess {
            child,
            stdin,
            stdout,
            stderr,
        } = host;
        let process_id = child.id();

        let kill = CancellationToken::new();
        let io_cancel = CancellationToken::new();
        let (outbound, outbound_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);

        let writer = tokio::spawn({
            let cancel = io_cancel.clone();
            async move {
                if let Err(err) = run_writer("client", stdin, outbound_rx, cancel).await {
                    warn!(error = %err, "client: writer failed");
                }
            }
        });

        let router = ResponseRouter::new(
            self.shared.pending.clone(),
            ready_tx,
            Arc::clone(&self.shared.orphaned),
        );
        let reader = tokio::spawn({
            let shared = Arc::clone(&self.shared);
            let cancel = io_cancel.clone();
            async move {
                if let Some(reason) = reader::run_reader(stdout, router, cancel).await {
                    shared.shut(&reason).await;
                }
            }
        });

        let stderr = tokio::spawn(self.shared.stderr.clone().capture(stderr));

        let monitor = tokio::spawn({
            let shared = Arc::clone(&self.shared);
            let kill = kill.clone();
            async move {
                let reason = spawner::wait_for_exit(child, kill).await;
                shared.shut(&reason).await;
            }
        });

        let link = Link {
            outbound,
            kill,
            io_cancel,
            writer,
            reader,
            stderr,
            monitor,
            process_id,
        };

        let ready_timeout = self.config.ready_timeout;
        let failure = match tokio::time::timeout(ready_timeout, ready_rx).await {
            Ok(Ok(Ok(info))) => {
                info!(
                    app = info.name.as_str(),
                    protocol = info.protocol.as_str(),
                    version = info.version.as_str(),
                    pid = process_id,
                    "host ready"
                );
                self.shared.set_state(ClientState::Ready);
                self.link = Some(link);
                self.ready = Some(info.clone());
                return Ok(info);
            }
            Ok(Ok(Err(err))) => err,
            Ok(Err(_)) => AppError::ProcessExited("host exited before signalling readiness".into()),
            Err(_) => AppError::Timeout(format!(
                "no readiness signal within {}ms",
                ready_timeout.as_millis()
            )),
        };

        warn!(error = %failure, "client: host failed to start");
        link.teardown().await;
        self.shared.shut(failure.message()).await;
        Err(failure)
    }

    /// Send `method` with `body` and wait for the result.
    ///
    /// `timeout` overrides the configured default deadline.
    ///
    /// # Errors
    ///
    /// - [`AppError::Closed`] if the client is not ready.
    /// - [`AppError::Timeout`] if the deadline passes; a late response is
    ///   counted as orphaned.
    /// - [`AppError::ProcessExited`] if the host exits first.
    /// - [`AppError::Remote`] if the host reports a failure.
    pub async fn request(
        &self,
        method: Method,
        body: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let link = self.usable_link(method)?;

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let rx = self.shared.pending.register(&id).await?;
        // Dropping this future at any await below must not leak the entry.
        let _abandon = self.shared.pending.guard(&id);
        if self.state() == ClientState::Closed {
            self.shared.pending.cancel(&id).await;
            return Err(AppError::Closed("client closed".into()));
        }

        let request = Request {
            id: id.clone(),
            method: method.as_str().to_owned(),
            body,
        };
        let line = match serde_json::to_string(&request) {
            Ok(line) => line,
            Err(err) => {
                self.shared.pending.cancel(&id).await;
                return Err(AppError::Protocol(format!("encode request: {err}")));
            }
        };

        debug!(id, %method, "client: sending request");
        if link.outbound.send(line).await.is_err() {
            self.shared.pending.cancel(&id).await;
            return Err(AppError::Closed("host input closed".into()));
        }

        let timeout = timeout.unwrap_or(self.config.request_timeout);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome?.into_result(),
            Ok(Err(_)) => Err(AppError::ProcessExited("pending call dropped".into())),
            Err(_) => {
                self.shared.pending.cancel(&id).await;
                Err(AppError::Timeout(format!(
                    "{method} (id {id}) timed out after {}ms",
                    timeout.as_millis()
                )))
            }
        }
    }

    fn usable_link(&self, method: Method) -> Result<&Link> {
        match (self.state(), &self.link) {
            (ClientState::Ready, Some(link)) => Ok(link),
            (ClientState::Closing, Some(link)) if method == Method::Shutdown => Ok(link),
            (ClientState::Unspawned | ClientState::Spawning, _) => {
                Err(AppError::Closed("client not spawned".into()))
            }
            (ClientState::Closing, _) => Err(AppError::Closed("client closing".into())),
            _ => Err(AppError::Closed("client closed".into())),
        }
    }

    /// Liveness check.
    ///
    /// # Errors
    ///
    /// See [`Client::request`].
    pub async fn ping(&self) -> Result<PingResult> {
        decode(self.request(Method::Ping, None, None).await?)
    }

    /// App name and counts.
    ///
    /// # Errors
    ///
    /// See [`Client::request`].
    pub async fn app_info(&self) -> Result<AppInfo> {
        decode(self.request(Method::GetAppInfo, None, None).await?)
    }

    /// Every agent with its model and toolkits.
    ///
    /// # Errors
    ///
    /// See [`Client::request`].
    pub async fn list_agents(&self) -> Result<Vec<AgentInfo>> {
        decode(self.request(Method::ListAgents, None, None).await?)
    }

    /// Every toolkit with its tools.
    ///
    /// # Errors
    ///
    /// See [`Client::request`].
    pub async fn list_toolkits(&self) -> Result<Vec<ToolkitInfo>> {
        decode(self.request(Method::ListToolkits, None, None).await?)
    }

    /// Every tool, flattened across toolkits.
    ///
    /// # Errors
    ///
    /// See [`Client::request`].
    pub async fn list_tools(&self) -> Result<Vec<ToolSummary>> {
        decode(self.request(Method::ListTools, None, None).await?)
    }

    /// System prompt of every agent.
    ///
    /// # Errors
    ///
    /// See [`Client::request`].
    pub async fn list_prompts(&self) -> Result<Vec<PromptInfo>> {
        decode(self.request(Method::ListPrompts, None, None).await?)
    }

    /// Models the agents are configured with, without duplicates.
    ///
    /// # Errors
    ///
    /// See [`Client::request`].
    pub async fn list_models(&self) -> Result<Vec<ModelDescriptor>> {
        decode(self.request(Method::ListModels, None, None).await?)
    }

    /// Invoke `toolkit.tool` with `args` (a JSON object, or null for none).
    ///
    /// # Errors
    ///
    /// [`AppError::Protocol`] if `args` is neither an object nor null;
    /// otherwise see [`Client::request`].
    pub async fn invoke_tool(&self, toolkit: &str, tool: &str, args: Value) -> Result<Value> {
        let args = match args {
            Value::Null => None,
            Value::Object(map) => Some(map),
            other => {
                return Err(AppError::Protocol(format!(
                    "tool args must be a JSON object, got {other}"
                )));
            }
        };
        let params = InvokeToolParams {
            toolkit: toolkit.to_owned(),
            tool: tool.to_owned(),
            args,
        };
        self.request(Method::InvokeTool, Some(serde_json::to_value(params)?), None)
            .await
    }

    /// Invoke an agent.
    ///
    /// # Errors
    ///
    /// See [`Client::request`].
    pub async fn invoke_agent(&self, params: InvokeAgentParams) -> Result<InvokeAgentResult> {
        let body = serde_json::to_value(params)?;
        decode(self.request(Method::InvokeAgent, Some(body), None).await?)
    }

    /// Ask the host to stop. The client stays usable until the host exits.
    ///
    /// # Errors
    ///
    /// See [`Client::request`].
    pub async fn shutdown(&self) -> Result<ShutdownResult> {
        decode(self.request(Method::Shutdown, None, None).await?)
    }

    /// Best-effort `shutdown`, then kill the host and stop all tasks.
    ///
    /// Idempotent. Pending calls fail with [`AppError::ProcessExited`].
    pub async fn close(&mut self) {
        if self.state() == ClientState::Ready {
            self.shared.set_state(ClientState::Closing);
            let timeout = Some(self.config.shutdown_timeout);
            if let Err(err) = self.request(Method::Shutdown, None, timeout).await {
                debug!(error = %err, "client: shutdown not acknowledged");
            }
        }
        if let Some(link) = self.link.take() {
            link.teardown().await;
        }
        self.shared.shut("client closed").await;
        info!("client closed");
    }

    /// Resolve once the client reaches [`ClientState::Closed`].
    pub async fn closed(&self) {
        let mut rx = self.shared.state.subscribe();
        let _ = rx.wait_for(|state| *state == ClientState::Closed).await;
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ClientState {
        self.shared.state()
    }

    /// The readiness signal received at spawn.
    #[must_use]
    pub fn ready_info(&self) -> Option<&ReadyInfo> {
        self.ready.as_ref()
    }

    /// OS process id of the host, while spawned.
    #[must_use]
    pub fn process_id(&self) -> Option<u32> {
        self.link.as_ref().and_then(|link| link.process_id)
    }

    /// Responses received with no pending call (late or unknown ids).
    #[must_use]
    pub fn orphaned_responses(&self) -> u64 {
        self.shared.orphaned.load(Ordering::Relaxed)
    }

    /// Calls currently awaiting a response.
    pub async fn pending_calls(&self) -> usize {
        self.shared.pending.len().await
    }

    /// The host's most recent stderr lines, oldest first.
    pub async fn stderr_tail(&self) -> Vec<String> {
        self.shared.stderr.tail().await
    }

    /// Settings this client was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| AppError::Protocol(format!("unexpected result shape: {e}")))
}
