//! Request/response correlation and inbound dispatch.
//!
//! A [`Connection`] sits on top of a [`MessageChannel`] and a
//! [`MethodHandler`]. Outbound requests get a fresh numeric id and a pending
//! entry; the dispatch task resolves that entry when the matching response
//! arrives. Inbound requests and notifications are handed to the handler on
//! their own tasks, so a slow handler never stalls frame consumption (unless
//! [`ConnectionConfig::max_in_flight_handlers`] is set).
//!
//! # Lifecycle
//!
//! `Open → Closed`. The transition happens on inbound EOF, on a write
//! failure, or on [`Connection::shutdown`]. Closing rejects every pending
//! request with [`AppError::ConnectionClosed`], and later `send_*` calls fail
//! the same way.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::acp::channel::{MessageChannel, MessageSender};
use crate::acp::codec::Incoming;
use crate::acp::error::{HandlerError, HandlerResult, ProtocolError};
use crate::acp::message::{Message, RequestId};
use crate::acp::reader::IncomingMessages;
use crate::acp::schema::MethodKind;
use crate::acp::BoxFuture;
use crate::config::ConnectionConfig;
use crate::{AppError, Result};

/// Services inbound requests and notifications for a [`Connection`].
///
/// For requests the returned value becomes the response `result`; a failure
/// is normalised into a [`ProtocolError`]. For notifications the value is
/// discarded and failures are only logged.
pub trait MethodHandler: Send + Sync + 'static {
    /// Handle one inbound `method` call.
    fn handle(&self, method: String, params: Value) -> BoxFuture<'_, HandlerResult<Value>>;

    /// How `method` must arrive, when the handler serves a fixed table.
    ///
    /// A request for a notification-only method is answered with
    /// `Invalid request`, and a notification for a request method is
    /// dropped. `None` accepts either.
    fn expected_kind(&self, method: &str) -> Option<MethodKind> {
        let _ = method;
        None
    }
}

/// [`MethodHandler`] backed by a closure; see [`handler_fn`].
#[derive(Debug, Clone)]
pub struct HandlerFn<F>(F);

/// Adapt an async closure `(method, params) -> HandlerResult<Value>` into a
/// [`MethodHandler`].
#[must_use]
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(String, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<Value>> + Send + 'static,
{
    HandlerFn(f)
}

impl<F, Fut> MethodHandler for HandlerFn<F>
where
    F: Fn(String, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<Value>> + Send + 'static,
{
    fn handle(&self, method: String, params: Value) -> BoxFuture<'_, HandlerResult<Value>> {
        Box::pin((self.0)(method, params))
    }
}

type Completion = oneshot::Sender<std::result::Result<Value, ProtocolError>>;

/// Outstanding outbound requests keyed by id.
#[derive(Default)]
struct PendingTable {
    closed: bool,
    waiters: HashMap<RequestId, Completion>,
}

struct ConnectionInner {
    sender: MessageSender,
    pending: Mutex<PendingTable>,
    next_id: AtomicI64,
    /// Fired to stop the dispatch loop and the writer task.
    cancel: CancellationToken,
    /// Fired once pending requests have been rejected.
    closed: CancellationToken,
}

impl ConnectionInner {
    async fn complete(&self, id: RequestId, result: std::result::Result<Value, ProtocolError>) {
        let waiter = self.pending.lock().await.waiters.remove(&id);
        match waiter {
            Some(tx) => {
                if tx.send(result).is_err() {
                    debug!(%id, "acp connection: requester gone before response arrived");
                }
            }
            None => {
                warn!(%id, "acp connection: response for unknown request id, dropping");
            }
        }
    }

    async fn close(&self, reason: &str) {
        self.cancel.cancel();

        let waiters = {
            let mut table = self.pending.lock().await;
            table.closed = true;
            std::mem::take(&mut table.waiters)
        };

        if !waiters.is_empty() {
            debug!(
                count = waiters.len(),
                reason, "acp connection: rejecting pending requests"
            );
        }
        // Dropping the completions wakes each waiter with a closed error.
        drop(waiters);

        if !self.closed.is_cancelled() {
            debug!(reason, "acp connection: closed");
        }
        self.closed.cancel();
    }

    /// Map a channel failure, preferring `ConnectionClosed` once shut down.
    fn send_failure(&self, err: AppError) -> AppError {
        if self.cancel.is_cancelled() {
            AppError::ConnectionClosed(format!("connection is closed ({err})"))
        } else {
            err
        }
    }
}

/// One endpoint of a bidirectional JSON-RPC connection.
///
/// Cheap to clone; all clones share the same pending table and transport.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Start a connection serving inbound calls with `handler`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn<R, W, H>(reader: R, writer: W, handler: H, config: &ConnectionConfig) -> Self
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
        H: MethodHandler,
    {
        Self::spawn_with(reader, writer, config, |_| handler)
    }

    /// Start a connection whose handler is built from a handle to the
    /// connection itself.
    ///
    /// `factory` runs before the dispatch task starts, so the handler can
    /// keep the [`Connection`] to issue its own outbound calls.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn_with<R, W, F, H>(
        reader: R,
        writer: W,
        config: &ConnectionConfig,
        factory: F,
    ) -> Self
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
        F: FnOnce(Connection) -> H,
        H: MethodHandler,
    {
        let cancel = CancellationToken::new();
        let mut channel = MessageChannel::new(reader, writer, config, cancel.clone());
        let incoming = channel.incoming();

        let connection = Self {
            inner: Arc::new(ConnectionInner {
                sender: channel.sender(),
                pending: Mutex::new(PendingTable::default()),
                next_id: AtomicI64::new(0),
                cancel,
                closed: CancellationToken::new(),
            }),
        };

        let handler: Arc<dyn MethodHandler> = Arc::new(factory(connection.clone()));
        let limiter = config
            .max_in_flight_handlers
            .map(|bound| Arc::new(Semaphore::new(bound)));

        tokio::spawn(run_dispatch(
            Arc::clone(&connection.inner),
            incoming,
            handler,
            limiter,
        ));

        connection
    }

    /// Send a request and wait for its response.
    ///
    /// # Errors
    ///
    /// - [`AppError::Rpc`] carrying the peer's error object.
    /// - [`AppError::ConnectionClosed`] if the connection is or becomes closed
    ///   before the response arrives.
    /// - [`AppError::Transport`] if the frame could not be written.
    pub async fn send_request(&self, method: &str, params: Value) -> Result<Value> {
        let id = RequestId::Number(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();

        {
            let mut table = self.inner.pending.lock().await;
            if table.closed {
                return Err(AppError::ConnectionClosed(format!(
                    "cannot send `{method}` request"
                )));
            }
            table.waiters.insert(id.clone(), tx);
        }

        debug!(%id, method, "acp connection: sending request");
        let request = Message::Request {
            id: id.clone(),
            method: method.to_owned(),
            params,
        };

        if let Err(err) = self.inner.sender.send(request).await {
            self.inner.pending.lock().await.waiters.remove(&id);
            return Err(self.inner.send_failure(err));
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(error)) => Err(AppError::Rpc(error)),
            Err(_) => Err(AppError::ConnectionClosed(format!(
                "no response to `{method}` request"
            ))),
        }
    }

    /// Send a notification; resolves once the frame is written.
    ///
    /// # Errors
    ///
    /// - [`AppError::ConnectionClosed`] if the connection is closed.
    /// - [`AppError::Transport`] if the frame could not be written.
    pub async fn send_notification(&self, method: &str, params: Value) -> Result<()> {
        if self.is_closed() {
            return Err(AppError::ConnectionClosed(format!(
                "cannot send `{method}` notification"
            )));
        }

        debug!(method, "acp connection: sending notification");
        let notification = Message::Notification {
            method: method.to_owned(),
            params,
        };

        self.inner
            .sender
            .send(notification)
            .await
            .map_err(|err| self.inner.send_failure(err))
    }

    /// Typed [`send_request`](Self::send_request).
    ///
    /// # Errors
    ///
    /// As [`send_request`](Self::send_request), plus
    /// [`AppError::InvalidResponse`] when the result does not deserialise
    /// into `Res`.
    pub async fn request<Req, Res>(&self, method: &str, params: &Req) -> Result<Res>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let result = self.send_request(method, params).await?;
        serde_json::from_value(result)
            .map_err(|e| AppError::InvalidResponse(format!("`{method}` result: {e}")))
    }

    /// Typed [`send_notification`](Self::send_notification).
    ///
    /// # Errors
    ///
    /// As [`send_notification`](Self::send_notification), plus
    /// [`AppError::Transport`] if `params` cannot be serialised.
    pub async fn notify<Req>(&self, method: &str, params: &Req) -> Result<()>
    where
        Req: Serialize + ?Sized,
    {
        let params = serde_json::to_value(params)?;
        self.send_notification(method, params).await
    }

    /// Whether the connection has reached its terminal state.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Wait until the connection is closed and pending requests are rejected.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await;
    }

    /// Close the connection.
    ///
    /// Pending requests are rejected; inbound handlers already running are
    /// left to finish, but their responses are not delivered.
    pub async fn shutdown(&self) {
        self.inner.close("shutdown requested").await;
    }
}

// ── Dispatch loop ─────────────────────────────────────────────────────────────

async fn run_dispatch(
    inner: Arc<ConnectionInner>,
    incoming: Option<IncomingMessages>,
    handler: Arc<dyn MethodHandler>,
    limiter: Option<Arc<Semaphore>>,
) {
    let Some(mut incoming) = incoming else {
        warn!("acp connection: inbound sequence already taken");
        inner.close("no inbound sequence").await;
        return;
    };

    let reason = loop {
        let next = tokio::select! {
            biased;

            () = inner.cancel.cancelled() => None,
            item = incoming.next() => Some(item),
        };

        let Some(item) = next else {
            break "cancelled";
        };
        let Some(item) = item else {
            break "inbound stream ended";
        };

        match item {
            Incoming::Malformed(err) => {
                warn!(
                    code = err.code(),
                    error = %err,
                    "acp connection: malformed frame, no reply possible"
                );
            }
            Incoming::Message(Message::Response { id, result }) => {
                inner.complete(id, result).await;
            }
            Incoming::Message(Message::Request { id, method, params }) => {
                let Some(permit) = acquire(&inner, limiter.as_ref()).await else {
                    break "cancelled";
                };
                tokio::spawn(serve_request(
                    Arc::clone(&inner),
                    Arc::clone(&handler),
                    id,
                    method,
                    params,
                    permit,
                ));
            }
            Incoming::Message(Message::Notification { method, params }) => {
                let Some(permit) = acquire(&inner, limiter.as_ref()).await else {
                    break "cancelled";
                };
                tokio::spawn(serve_notification(
                    Arc::clone(&handler),
                    method,
                    params,
                    permit,
                ));
            }
        }
    };

    inner.close(reason).await;
}

/// In-flight handler slot; empty when handler concurrency is unbounded.
struct Slot(Option<OwnedSemaphorePermit>);

/// Wait for an in-flight slot. `None` means the connection closed meanwhile.
async fn acquire(inner: &ConnectionInner, limiter: Option<&Arc<Semaphore>>) -> Option<Slot> {
    let Some(semaphore) = limiter else {
        return Some(Slot(None));
    };

    tokio::select! {
        () = inner.cancel.cancelled() => None,
        permit = Arc::clone(semaphore).acquire_owned() => Some(Slot(permit.ok())),
    }
}

/// Run `handler` on its own task so a panic becomes a normal failure.
async fn invoke(
    handler: Arc<dyn MethodHandler>,
    method: String,
    params: Value,
) -> HandlerResult<Value> {
    let task = tokio::spawn(async move { handler.handle(method, params).await });
    match task.await {
        Ok(outcome) => outcome,
        Err(join_err) => Err(HandlerError::other(format!(
            "handler task failed: {join_err}"
        ))),
    }
}

async fn serve_request(
    inner: Arc<ConnectionInner>,
    handler: Arc<dyn MethodHandler>,
    id: RequestId,
    method: String,
    params: Value,
    _slot: Slot,
) {
    debug!(%id, method, "acp connection: handling request");

    let result = if handler.expected_kind(&method) == Some(MethodKind::Notification) {
        warn!(%id, method, "acp connection: notification method sent as a request");
        Err(ProtocolError::invalid_request()
            .with_details(format!("{method} is a notification and takes no id")))
    } else {
        invoke(handler, method.clone(), params)
            .await
            .map_err(|err| {
                let err = ProtocolError::from(err);
                debug!(%id, method, error = %err, "acp connection: request failed");
                err
            })
    };

    if let Err(err) = inner.sender.send(Message::Response { id: id.clone(), result }).await {
        debug!(%id, method, error = %err, "acp connection: response not delivered");
    }
}

async fn serve_notification(
    handler: Arc<dyn MethodHandler>,
    method: String,
    params: Value,
    _slot: Slot,
) {
    debug!(method, "acp connection: handling notification");

    if handler.expected_kind(&method) == Some(MethodKind::Request) {
        warn!(method, "acp connection: request method sent as a notification, dropped");
        return;
    }

    if let Err(err) = invoke(handler, method.clone(), params).await {
        warn!(method, error = %err, "acp connection: notification handler failed");
    }
}
