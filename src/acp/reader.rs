//! ACP inbound frame sequence.
//!
//! [`IncomingMessages`] drives a [`FramedRead`] over the inbound byte stream
//! using [`FrameCodec`], yielding one [`Incoming`] item per non-blank line.
//! Malformed lines are surfaced as [`Incoming::Malformed`] items and do
//! **not** end the sequence. The sequence ends on EOF or on an I/O error.

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures_util::{Stream, StreamExt};
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

use crate::acp::codec::{FrameCodec, Incoming};

type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;

/// Lazy, non-restartable sequence of inbound frames.
pub struct IncomingMessages {
    framed: FramedRead<BoxedReader, FrameCodec>,
    finished: bool,
}

impl IncomingMessages {
    /// Wrap `reader` with a codec enforcing `max_line_bytes` per frame.
    pub fn new<R>(reader: R, max_line_bytes: usize) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        let reader: BoxedReader = Box::pin(reader);
        Self {
            framed: FramedRead::new(reader, FrameCodec::with_max_line_bytes(max_line_bytes)),
            finished: false,
        }
    }
}

impl std::fmt::Debug for IncomingMessages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingMessages")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl Stream for IncomingMessages {
    type Item = Incoming;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match ready!(self.framed.poll_next_unpin(cx)) {
            Some(Ok(item)) => Poll::Ready(Some(item)),
            Some(Err(e)) => {
                warn!(error = %e, "acp reader: stream error, ending inbound sequence");
                self.finished = true;
                Poll::Ready(None)
            }
            None => {
                debug!("acp reader: EOF detected");
                self.finished = true;
                Poll::Ready(None)
            }
        }
    }
}
