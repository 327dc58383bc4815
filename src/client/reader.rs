//! Host output reader.
//!
//! Consumes response lines from the host's stdout and routes each one:
//! the readiness signal to the spawn handshake, correlated responses to
//! their pending callers, and anything else to the orphan counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::oneshot;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::pending::PendingCalls;
use crate::protocol::codec::{Frame, NdjsonCodec};
use crate::protocol::{ReadyInfo, Response, READY_ID};
use crate::{AppError, Result};

/// What happened to one routed line.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Routed {
    /// Blank line.
    Ignored,
    /// Readiness signal delivered to the handshake.
    Ready,
    /// Response delivered to its pending caller.
    Delivered,
    /// No caller waiting for this id.
    Orphaned,
    /// Not a response object.
    Malformed,
}

/// Routes host output lines to their destinations.
#[derive(Debug)]
pub struct ResponseRouter {
    pending: PendingCalls,
    ready: Option<oneshot::Sender<Result<ReadyInfo>>>,
    orphaned: Arc<AtomicU64>,
}

impl ResponseRouter {
    /// Router delivering into `pending`, signalling `ready` once.
    #[must_use]
    pub fn new(
        pending: PendingCalls,
        ready: oneshot::Sender<Result<ReadyInfo>>,
        orphaned: Arc<AtomicU64>,
    ) -> Self {
        Self {
            pending,
            ready: Some(ready),
            orphaned,
        }
    }

    /// Route one line.
    pub async fn route_line(&mut self, line: &str) -> Routed {
        if line.trim().is_empty() {
            return Routed::Ignored;
        }

        let response: Response = match serde_json::from_str(line) {
            Ok(response) => response,
            Err(err) => {
                warn!(%err, "client: discarding malformed host line");
                return Routed::Malformed;
            }
        };

        if response.id == READY_ID {
            if let Some(tx) = self.ready.take() {
                let info = response.into_result().and_then(|value| {
                    serde_json::from_value::<ReadyInfo>(value).map_err(|e| {
                        AppError::Protocol(format!("invalid readiness signal: {e}"))
                    })
                });
                let _ = tx.send(info);
                return Routed::Ready;
            }
            debug!("client: duplicate readiness signal ignored");
            return self.orphan(READY_ID);
        }

        let id = response.id.clone();
        if self.pending.complete(response).await {
            Routed::Delivered
        } else {
            self.orphan(&id)
        }
    }

    fn orphan(&self, id: &str) -> Routed {
        let total = self.orphaned.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(id, total, "client: response with no pending call");
        Routed::Orphaned
    }
}

/// Read host output until EOF or cancellation.
///
/// Returns `Some(reason)` when the stream ended on its own, `None` when
/// `cancel` fired. Lines that are too long or not UTF-8 are skipped.
pub async fn run_reader<R>(
    stdout: R,
    mut router: ResponseRouter,
    cancel: CancellationToken,
) -> Option<String>
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, NdjsonCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("client reader: cancellation received");
                return None;
            }

            item = framed.next() => match item {
                Some(Ok(Frame::Line(line))) => {
                    router.route_line(&line).await;
                }
                Some(Ok(Frame::Rejected(reason))) => {
                    warn!(error = reason.as_str(), "client reader: skipping unreadable line");
                }
                Some(Err(err)) => {
                    warn!(error = %err, "client reader: read failed");
                    return Some(format!("host output failed: {}", err.message()));
                }
                None => {
                    debug!("client reader: host output closed");
                    return Some("host output closed".to_owned());
                }
            }
        }
    }
}
