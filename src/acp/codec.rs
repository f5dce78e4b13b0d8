//! NDJSON frame codec for ACP byte streams.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a configurable maximum line
//! length so that an unterminated or maliciously large frame cannot exhaust
//! memory, and classifies each decoded line into an [`Incoming`] item.
//!
//! Framing is one compact JSON value per `\n`-terminated UTF-8 line, in both
//! directions.

use std::io;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::acp::error::ProtocolError;
use crate::acp::message::Message;
use crate::{AppError, Result};

/// Default maximum inbound line length: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// A well-formed, classified message.
    Message(Message),
    /// A frame that could not be turned into a message.
    ///
    /// Carries a `ParseError` (not JSON, line too long) or an
    /// `InvalidRequest` (JSON of the wrong shape). The stream stays usable.
    Malformed(ProtocolError),
}

/// Outcome of one line-decoding step.
enum Step {
    /// A blank line was consumed; keep decoding.
    Skip,
    /// Return this to the framed reader.
    Done(Option<Incoming>),
}

/// Line-framed JSON codec.
///
/// # Decoder
///
/// Blank lines are skipped. Lines longer than the configured limit yield
/// [`Incoming::Malformed`] and the remainder of that line is discarded.
/// A line that is not valid UTF-8 is also reported as malformed. Only
/// transport I/O failures surface as [`AppError::Io`], which ends the
/// framed stream.
///
/// # Encoder
///
/// Messages are serialised with [`Message::to_value`] and written as
/// `json\n`. The length limit applies to decoding only.
#[derive(Debug)]
pub struct FrameCodec {
    lines: LinesCodec,
    max_line_bytes: usize,
}

impl FrameCodec {
    /// Codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_line_bytes(MAX_LINE_BYTES)
    }

    /// Codec with a custom inbound line limit.
    #[must_use]
    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_line_bytes),
            max_line_bytes,
        }
    }

    fn classify(line: &str) -> Incoming {
        match Message::parse(line) {
            Ok(message) => Incoming::Message(message),
            Err(err) => Incoming::Malformed(err),
        }
    }

    /// Map one `LinesCodec` step to a decoder outcome.
    ///
    /// `LinesCodec` splits a line off the buffer before checking its UTF-8,
    /// so an `InvalidData` error is local to that line.
    fn settle(&self, step: std::result::Result<Option<String>, LinesCodecError>) -> Result<Step> {
        match step {
            Ok(Some(line)) if line.trim().is_empty() => Ok(Step::Skip),
            Ok(Some(line)) => Ok(Step::Done(Some(Self::classify(&line)))),
            Ok(None) => Ok(Step::Done(None)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Step::Done(Some(self.too_long()))),
            Err(LinesCodecError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => {
                Ok(Step::Done(Some(Incoming::Malformed(
                    ProtocolError::parse_error().with_details("frame is not valid UTF-8"),
                ))))
            }
            Err(LinesCodecError::Io(e)) => Err(AppError::Io(e.to_string())),
        }
    }

    fn too_long(&self) -> Incoming {
        Incoming::Malformed(ProtocolError::parse_error().with_details(format!(
            "line too long: exceeded {} bytes",
            self.max_line_bytes
        )))
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Incoming;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let step = self.lines.decode(src);
            if let Step::Done(item) = self.settle(step)? {
                return Ok(item);
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let step = self.lines.decode_eof(src);
            if let Step::Done(item) = self.settle(step)? {
                return Ok(item);
            }
        }
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = AppError;

    /// Encode `item` as one `\n`-terminated JSON line into `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] if serialisation fails.
    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        let line = serde_json::to_string(&item.to_value())?;
        self.lines
            .encode(line, dst)
            .map_err(|e| AppError::Transport(format!("frame encode failed: {e}")))
    }
}
