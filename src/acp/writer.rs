//! ACP writer task.
//!
//! Receives outbound [`Message`]s from a tokio [`mpsc`] channel and writes
//! each one as a single NDJSON line through a [`FramedWrite`] backed by
//! [`FrameCodec`]. Frames are written strictly in the order they were
//! queued, and each sender is told once its frame has been flushed.

use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::acp::codec::FrameCodec;
use crate::acp::message::Message;
use crate::{AppError, Result};

/// A queued outbound frame plus its write acknowledgement.
#[derive(Debug)]
pub(crate) struct OutboundFrame {
    pub(crate) message: Message,
    pub(crate) written: oneshot::Sender<Result<()>>,
}

/// ACP writer task — serialises queued messages onto `writer`.
///
/// The task exits cleanly when:
/// - `cancel` is triggered (connection shutdown), or
/// - `frame_rx` is closed (all senders dropped).
///
/// A failed write is reported to the waiting sender, cancels `cancel` so
/// that the owning connection transitions to closed, and ends the task.
/// Frames still queued at exit are dropped; their senders observe the
/// dropped acknowledgement.
///
/// # Errors
///
/// Returns [`AppError::Transport`]`("write failed: …")` when the underlying
/// stream rejects a write or flush.
pub(crate) async fn run_writer<W>(
    writer: W,
    mut frame_rx: mpsc::Receiver<OutboundFrame>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut sink = FramedWrite::new(writer, FrameCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("acp writer: cancellation received, stopping");
                break;
            }

            frame = frame_rx.recv() => {
                let Some(OutboundFrame { message, written }) = frame else {
                    debug!("acp writer: frame channel closed, stopping");
                    break;
                };

                if let Err(e) = sink.send(message).await {
                    warn!(error = %e, "acp writer: write failed, closing connection");
                    let reason = format!("write failed: {e}");
                    // Receiver may already be gone; nothing else to notify.
                    let _ = written.send(Err(AppError::Transport(reason.clone())));
                    cancel.cancel();
                    return Err(AppError::Transport(reason));
                }

                let _ = written.send(Ok(()));
            }
        }
    }

    Ok(())
}
