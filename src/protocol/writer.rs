//! Outbound line writer task.
//!
//! Receives already-serialized JSON lines from a tokio [`mpsc`] channel,
//! frames each with [`NdjsonCodec`], and writes it to the underlying stream.
//! Owning the stream in one task keeps the output single-writer, so two
//! concurrent responses can never interleave partial lines.

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::codec::NdjsonCodec;
use crate::{AppError, Result};

/// Writer task: drain `line_rx` into `sink`, one `\n`-terminated line each.
///
/// Every line is flushed immediately; peers read line by line and a
/// buffered response would stall them.
///
/// The task exits cleanly when:
/// - `cancel` fires, or
/// - `line_rx` is closed and drained (all senders dropped).
///
/// # Errors
///
/// Returns [`AppError::Io`]`("write failed: …")` if writing to `sink` fails
/// (for example because the peer process has exited).
pub async fn run_writer<W>(
    label: &'static str,
    sink: W,
    mut line_rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut sink = sink;
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::new();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(label, "writer: cancellation received, stopping");
                break;
            }

            line = line_rx.recv() => {
                let Some(line) = line else {
                    debug!(label, "writer: line channel closed, stopping");
                    break;
                };

                codec.encode(line, &mut buf)?;
                sink.write_all(&buf).await.map_err(|e| {
                    warn!(label, error = %e, "writer: write failed");
                    AppError::Io(format!("write failed: {e}"))
                })?;
                buf.clear();
                sink.flush()
                    .await
                    .map_err(|e| AppError::Io(format!("flush failed: {e}")))?;
            }
        }
    }

    Ok(())
}
