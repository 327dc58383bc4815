#![forbid(unsafe_code)]

//! `agent-bridge-demo-host` — serves the demo application on stdio.
//!
//! Used by the end-to-end tests and as a reference host. Exits after a
//! `shutdown` request, at input EOF, or on Ctrl-C / SIGTERM.

use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use agent_bridge::demo::demo_app;
use agent_bridge::host::serve_stdio;
use agent_bridge::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "agent-bridge-demo-host",
    about = "Serve the demo application over stdio",
    version
)]
struct Args {
    /// Log output format (text or json). Logs always go to stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;

    let outcome = runtime.block_on(run());
    // Stdin is read on a blocking thread that cannot be interrupted.
    runtime.shutdown_background();
    outcome
}

async fn run() -> Result<()> {
    let app = Arc::new(demo_app()?);
    let cancel = CancellationToken::new();

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("signal received, stopping");
        signal_cancel.cancel();
    });

    let outcome = serve_stdio(app, cancel).await?;
    info!(?outcome, "demo host exiting");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            warn!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);

    let initialized = match log_format {
        LogFormat::Text => subscriber.try_init(),
        LogFormat::Json => subscriber.json().try_init(),
    };
    initialized.map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))
}
