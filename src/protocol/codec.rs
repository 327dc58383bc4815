//! NDJSON codec for bridge streams.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a configurable maximum line
//! length so an unterminated or oversized message from a misbehaving peer
//! cannot exhaust memory.
//!
//! # Usage
//!
//! Use [`NdjsonCodec`] as the codec parameter for
//! [`tokio_util::codec::FramedRead`]. Both directions use UTF-8 line framing
//! delimited by `\n`.
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use agent_bridge::protocol::codec::NdjsonCodec;
//!
//! let reader = FramedRead::new(child_stdout, NdjsonCodec::new());
//! ```

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum line length accepted by the codec: 1 MiB.
///
/// Lines exceeding this limit decode as [`Frame::Rejected`] with
/// `"line too long"`; the codec then discards input up to the next newline
/// and resumes.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// One decoded input line.
///
/// A bad line is an item rather than a decoder error: `FramedRead` pauses
/// after an error and would leave already-buffered lines unread until the
/// peer writes again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line without its terminator.
    Line(String),
    /// A line that was dropped, with the reason: too long or not UTF-8.
    Rejected(String),
}

/// Newline-delimited JSON line codec.
///
/// Yields each line without its terminator (a trailing `\r` is stripped as
/// well). Lines longer than the configured limit, and lines that are not
/// valid UTF-8, come out as [`Frame::Rejected`] and decoding continues with
/// the next line. Only I/O failures are errors ([`AppError::Io`]).
#[derive(Debug)]
pub struct NdjsonCodec(LinesCodec);

impl NdjsonCodec {
    /// Codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Codec with a custom line limit.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self(LinesCodec::new_with_max_length(max_length))
    }
}

impl Default for NdjsonCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for NdjsonCodec {
    type Item = Frame;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let max = self.0.max_length();
        to_frame(self.0.decode(src), max)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let max = self.0.max_length();
        to_frame(self.0.decode_eof(src), max)
    }
}

fn to_frame(
    decoded: std::result::Result<Option<String>, LinesCodecError>,
    max: usize,
) -> Result<Option<Frame>> {
    match decoded {
        Ok(line) => Ok(line.map(Frame::Line)),
        // LinesCodec has already consumed (or is discarding) the bad line.
        Err(e) => match map_codec_error(e, max) {
            AppError::Protocol(reason) => Ok(Some(Frame::Rejected(reason))),
            other => Err(other),
        },
    }
}

impl Encoder<String> for NdjsonCodec {
    type Error = AppError;

    /// Encode `item` as a `\n`-terminated line. The length limit is a
    /// decoder-side concern only.
    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        let max = self.0.max_length();
        self.0.encode(item, dst).map_err(|e| map_codec_error(e, max))
    }
}

fn map_codec_error(e: LinesCodecError, max: usize) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Protocol(format!("line too long: exceeded {max} bytes"))
        }
        LinesCodecError::Io(io_err) if io_err.kind() == std::io::ErrorKind::InvalidData => {
            AppError::Protocol(format!("invalid UTF-8 in line: {io_err}"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
