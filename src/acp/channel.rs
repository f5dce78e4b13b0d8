//! Duplex message channel over a pair of byte streams.
//!
//! A [`MessageChannel`] owns the writer task for the outbound stream and the
//! not-yet-consumed [`IncomingMessages`] sequence for the inbound stream.
//! Outbound frames are written in the order [`MessageSender::send`] is
//! called.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::acp::message::Message;
use crate::acp::reader::IncomingMessages;
use crate::acp::writer::{run_writer, OutboundFrame};
use crate::config::ConnectionConfig;
use crate::{AppError, Result};

/// Cloneable handle for queueing outbound messages.
#[derive(Debug, Clone)]
pub struct MessageSender {
    tx: mpsc::Sender<OutboundFrame>,
}

impl MessageSender {
    /// Queue `message` and wait until it has been written and flushed.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] when the writer task has stopped or
    /// the write itself failed.
    pub async fn send(&self, message: Message) -> Result<()> {
        let (written, done) = oneshot::channel();
        self.tx
            .send(OutboundFrame { message, written })
            .await
            .map_err(|_| AppError::Transport("writer stopped".into()))?;

        done.await
            .map_err(|_| AppError::Transport("writer stopped before frame was written".into()))?
    }
}

/// Outbound writer plus inbound frame sequence for one endpoint.
#[derive(Debug)]
pub struct MessageChannel {
    sender: MessageSender,
    incoming: Option<IncomingMessages>,
    writer_task: JoinHandle<()>,
}

impl MessageChannel {
    /// Wire up `reader` and `writer`.
    ///
    /// Spawns the writer task on the current tokio runtime; the task stops
    /// when `cancel` fires or every [`MessageSender`] is dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new<R, W>(
        reader: R,
        writer: W,
        config: &ConnectionConfig,
        cancel: CancellationToken,
    ) -> Self
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(config.outbound_buffer.max(1));
        let writer_task = tokio::spawn(async move {
            if let Err(err) = run_writer(writer, rx, cancel).await {
                warn!(%err, "acp channel: writer task ended with error");
            }
        });

        Self {
            sender: MessageSender { tx },
            incoming: Some(IncomingMessages::new(reader, config.max_line_bytes)),
            writer_task,
        }
    }

    /// Write one message; see [`MessageSender::send`].
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] if the frame could not be written.
    pub async fn send(&self, message: Message) -> Result<()> {
        self.sender.send(message).await
    }

    /// A cloneable handle to the outbound side.
    #[must_use]
    pub fn sender(&self) -> MessageSender {
        self.sender.clone()
    }

    /// Take the inbound sequence. Returns `None` after the first call.
    pub fn incoming(&mut self) -> Option<IncomingMessages> {
        self.incoming.take()
    }

    /// Whether the writer task has exited.
    #[must_use]
    pub fn is_writer_finished(&self) -> bool {
        self.writer_task.is_finished()
    }
}
