//! Host serve loop.
//!
//! Reads request lines from the input stream through [`NdjsonCodec`],
//! answers malformed lines immediately, and dispatches every well-formed
//! request on its own task so a slow tool never blocks later lines.
//! Responses funnel through one [`run_writer`] task that owns the output
//! stream.
//!
//! # Termination
//!
//! | Trigger            | In-flight requests           | Outcome                           |
//! |--------------------|------------------------------|-----------------------------------|
//! | `shutdown` request | aborted after the ack        | [`ServeOutcome::ShutdownRequested`] |
//! | input EOF          | awaited and answered         | [`ServeOutcome::InputClosed`]     |
//! | cancellation token | aborted, writer stopped      | [`ServeOutcome::Cancelled`]       |
//!
//! No single malformed or failing request ends the loop. Lines that are too
//! long or not UTF-8 are answered with `PARSE_ERROR` like any other
//! unparseable line.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::App;
use crate::host::dispatcher::{classify_line, Dispatcher, LineOutcome};
use crate::protocol::codec::{Frame, NdjsonCodec};
use crate::protocol::writer::run_writer;
use crate::protocol::{ErrorCode, Method, Response, PARSE_ERROR_ID};
use crate::{AppError, Result};

/// Capacity of the outbound response channel.
const OUTBOUND_CAPACITY: usize = 256;

/// Why the serve loop stopped.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ServeOutcome {
    /// A `shutdown` request was acknowledged.
    ShutdownRequested,
    /// The input stream reached EOF or failed.
    InputClosed,
    /// The cancellation token fired.
    Cancelled,
}

/// Serve the protocol for `app` over the process's own stdin/stdout.
///
/// # Errors
///
/// See [`serve`].
pub async fn serve_stdio(app: Arc<App>, cancel: CancellationToken) -> Result<ServeOutcome> {
    serve(app, tokio::io::stdin(), tokio::io::stdout(), cancel).await
}

/// Serve the protocol for `app` over an arbitrary stream pair.
///
/// Emits the `__ready__` response first, then processes input lines until
/// one of the termination triggers in the module docs occurs. The input
/// stream is dropped before the function waits for the writer to drain.
///
/// # Errors
///
/// Returns [`AppError::Io`] if the writer stops before the readiness signal
/// could be queued, or [`AppError::Protocol`] if it cannot be encoded.
pub async fn serve<R, W>(
    app: Arc<App>,
    input: R,
    output: W,
    cancel: CancellationToken,
) -> Result<ServeOutcome>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let dispatcher = Dispatcher::new(app);
    let (line_tx, line_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
    let writer_cancel = CancellationToken::new();
    let writer = tokio::spawn(run_writer(
        "host",
        output,
        line_rx,
        writer_cancel.clone(),
    ));

    let ready = dispatcher.ready_response().to_line()?;
    line_tx
        .send(ready)
        .await
        .map_err(|_| AppError::Io("writer stopped before readiness signal".into()))?;
    info!(app = dispatcher.app().name(), "host ready");

    let mut framed = FramedRead::new(input, NdjsonCodec::new());
    let mut in_flight: JoinSet<()> = JoinSet::new();

    let outcome = loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("host: cancellation received, stopping");
                break ServeOutcome::Cancelled;
            }

            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                log_join(joined);
            }

            item = framed.next() => match item {
                None => {
                    debug!("host: input closed");
                    break ServeOutcome::InputClosed;
                }
                Some(Err(err)) => {
                    warn!(error = %err, "host: input error, stopping");
                    break ServeOutcome::InputClosed;
                }
                Some(Ok(Frame::Rejected(reason))) => {
                    warn!(error = reason.as_str(), "host: rejecting unreadable line");
                    enqueue(
                        &line_tx,
                        Response::error(PARSE_ERROR_ID, ErrorCode::ParseError, reason),
                    )
                    .await;
                }
                Some(Ok(Frame::Line(line))) => match classify_line(&line) {
                    LineOutcome::Ignore => {}
                    LineOutcome::Reply(response) => {
                        debug!(id = response.id.as_str(), "host: rejecting malformed request");
                        enqueue(&line_tx, response).await;
                    }
                    LineOutcome::Dispatch(call) if call.method == Method::Shutdown => {
                        info!(id = call.id.as_str(), "host: shutdown requested");
                        enqueue(&line_tx, dispatcher.dispatch(call).await).await;
                        break ServeOutcome::ShutdownRequested;
                    }
                    LineOutcome::Dispatch(call) => {
                        let dispatcher = dispatcher.clone();
                        let tx = line_tx.clone();
                        in_flight.spawn(async move {
                            let response = dispatcher.dispatch(call).await;
                            enqueue(&tx, response).await;
                        });
                    }
                },
            }
        }
    };

    // Release the input before waiting on anything else.
    drop(framed);

    if outcome != ServeOutcome::InputClosed {
        in_flight.abort_all();
    }
    while let Some(joined) = in_flight.join_next().await {
        log_join(joined);
    }

    drop(line_tx);
    if outcome == ServeOutcome::Cancelled {
        writer_cancel.cancel();
    }
    match writer.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "host: writer failed"),
        Err(err) => warn!(error = %err, "host: writer task aborted"),
    }

    info!(?outcome, "host stopped");
    Ok(outcome)
}

/// Queue one response; a stopped writer only loses the line.
async fn enqueue(tx: &mpsc::Sender<String>, response: Response) {
    let line = match response.to_line() {
        Ok(line) => line,
        Err(err) => {
            warn!(id = response.id.as_str(), error = %err, "host: response encoding failed");
            match Response::error(response.id, ErrorCode::InternalError, err.message()).to_line() {
                Ok(line) => line,
                Err(_) => return,
            }
        }
    };

    if tx.send(line).await.is_err() {
        debug!("host: writer gone, dropping response");
    }
}

fn log_join(joined: std::result::Result<(), JoinError>) {
    if let Err(err) = joined {
        if err.is_panic() {
            warn!(error = %err, "host: request task panicked");
        }
    }
}
