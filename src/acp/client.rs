//! Client side of an ACP connection.
//!
//! [`ClientSideConnection`] serves the client-bound method set through a
//! [`Client`] implementation and exposes typed calls to the agent.
//!
//! # Routing
//!
//! | Method                       | Maps to                         |
//! |------------------------------|---------------------------------|
//! | `session/update`             | [`Client::session_update`]      |
//! | `session/request_permission` | [`Client::request_permission`]  |
//! | `fs/read_text_file`          | [`Client::read_text_file`]      |
//! | `fs/write_text_file`         | [`Client::write_text_file`]     |
//! | *(any other)*                | `Method not found`              |
//!
//! `session/update` sent with an id is answered with `Invalid request`; a
//! request method sent as a notification is dropped.

use serde::de::IgnoredAny;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::acp::agent::respond;
use crate::acp::connection::{Connection, MethodHandler};
use crate::acp::error::{HandlerResult, ProtocolError};
use crate::acp::schema::{
    method_info, parse_params, AgentMethod, AuthenticateRequest, CancelNotification, ClientMethod,
    Direction, InitializeRequest, InitializeResponse, LoadSessionRequest, MethodKind,
    NewSessionRequest, NewSessionResponse, PromptRequest, PromptResponse, ReadTextFileRequest,
    ReadTextFileResponse, RequestPermissionRequest, RequestPermissionResponse, SessionNotification,
    WriteTextFileRequest,
};
use crate::acp::BoxFuture;
use crate::config::ConnectionConfig;
use crate::Result;

/// Capabilities of the editor/host side of the protocol.
pub trait Client: Send + Sync + 'static {
    /// Decide whether the agent may run a tool call.
    fn request_permission(
        &self,
        args: RequestPermissionRequest,
    ) -> BoxFuture<'_, HandlerResult<RequestPermissionResponse>>;

    /// Receive streamed progress for a session.
    fn session_update(&self, args: SessionNotification) -> BoxFuture<'_, HandlerResult<()>>;

    /// Read a text file. Defaults to `Method not found`.
    fn read_text_file(
        &self,
        args: ReadTextFileRequest,
    ) -> BoxFuture<'_, HandlerResult<ReadTextFileResponse>> {
        let _ = args;
        Box::pin(async {
            Err(ProtocolError::method_not_found()
                .with_details(ClientMethod::ReadTextFile.name())
                .into())
        })
    }

    /// Write a text file. Defaults to `Method not found`.
    fn write_text_file(&self, args: WriteTextFileRequest) -> BoxFuture<'_, HandlerResult<()>> {
        let _ = args;
        Box::pin(async {
            Err(ProtocolError::method_not_found()
                .with_details(ClientMethod::WriteTextFile.name())
                .into())
        })
    }
}

/// [`MethodHandler`] dispatching the client-bound method set to a [`Client`].
#[derive(Debug)]
pub struct ClientRouter<C> {
    client: C,
}

impl<C: Client> ClientRouter<C> {
    /// Route inbound calls to `client`.
    #[must_use]
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

impl<C: Client> MethodHandler for ClientRouter<C> {
    fn handle(&self, method: String, params: Value) -> BoxFuture<'_, HandlerResult<Value>> {
        Box::pin(async move {
            let Some(target) = ClientMethod::from_name(&method) else {
                return Err(ProtocolError::method_not_found().with_details(method).into());
            };

            match target {
                ClientMethod::SessionUpdate => {
                    respond(self.client.session_update(parse_params(params)?).await?)
                }
                ClientMethod::RequestPermission => {
                    respond(self.client.request_permission(parse_params(params)?).await?)
                }
                ClientMethod::ReadTextFile => {
                    respond(self.client.read_text_file(parse_params(params)?).await?)
                }
                ClientMethod::WriteTextFile => {
                    respond(self.client.write_text_file(parse_params(params)?).await?)
                }
            }
        })
    }

    fn expected_kind(&self, method: &str) -> Option<MethodKind> {
        method_info(method)
            .filter(|(direction, _)| *direction == Direction::ClientBound)
            .map(|(_, kind)| kind)
    }
}

/// Client endpoint of an ACP connection.
#[derive(Debug, Clone)]
pub struct ClientSideConnection {
    conn: Connection,
}

impl ClientSideConnection {
    /// Talk to an agent over `reader`/`writer` with default settings.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new<C, F, R, W>(to_client: F, reader: R, writer: W) -> Self
    where
        C: Client,
        F: FnOnce(ClientSideConnection) -> C,
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::with_config(to_client, reader, writer, &ConnectionConfig::default())
    }

    /// As [`new`](Self::new) with explicit connection settings.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn with_config<C, F, R, W>(
        to_client: F,
        reader: R,
        writer: W,
        config: &ConnectionConfig,
    ) -> Self
    where
        C: Client,
        F: FnOnce(ClientSideConnection) -> C,
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let conn = Connection::spawn_with(reader, writer, config, |conn| {
            ClientRouter::new(to_client(Self { conn }))
        });
        Self { conn }
    }

    /// `initialize`
    ///
    /// # Errors
    ///
    /// Returns `AppError::Rpc` if the agent rejects the request, or a
    /// connection error.
    pub async fn initialize(&self, args: &InitializeRequest) -> Result<InitializeResponse> {
        self.conn.request(AgentMethod::Initialize.name(), args).await
    }

    /// `authenticate`
    ///
    /// # Errors
    ///
    /// Returns `AppError::Rpc` if the agent rejects the request, or a
    /// connection error.
    pub async fn authenticate(&self, args: &AuthenticateRequest) -> Result<()> {
        self.conn
            .request::<_, IgnoredAny>(AgentMethod::Authenticate.name(), args)
            .await
            .map(drop)
    }

    /// `session/new`
    ///
    /// # Errors
    ///
    /// Returns `AppError::Rpc` if the agent rejects the request, or a
    /// connection error.
    pub async fn new_session(&self, args: &NewSessionRequest) -> Result<NewSessionResponse> {
        self.conn.request(AgentMethod::NewSession.name(), args).await
    }

    /// `session/load`
    ///
    /// # Errors
    ///
    /// Returns `AppError::Rpc` if the agent rejects the request, or a
    /// connection error.
    pub async fn load_session(&self, args: &LoadSessionRequest) -> Result<()> {
        self.conn
            .request::<_, IgnoredAny>(AgentMethod::LoadSession.name(), args)
            .await
            .map(drop)
    }

    /// `session/prompt`; resolves when the turn ends.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Rpc` if the agent rejects the request, or a
    /// connection error.
    pub async fn prompt(&self, args: &PromptRequest) -> Result<PromptResponse> {
        self.conn.request(AgentMethod::Prompt.name(), args).await
    }

    /// `session/cancel` (notification).
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConnectionClosed` or `AppError::Transport` if the
    /// notification cannot be written.
    pub async fn cancel(&self, args: &CancelNotification) -> Result<()> {
        self.conn.notify(AgentMethod::Cancel.name(), args).await
    }

    /// The underlying connection.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Wait until the connection is closed.
    pub async fn closed(&self) {
        self.conn.closed().await;
    }
}
