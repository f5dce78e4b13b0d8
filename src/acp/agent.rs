//! Agent side of an ACP connection.
//!
//! [`AgentSideConnection`] serves the agent-bound method set by routing each
//! inbound call to an [`Agent`] implementation, and exposes typed calls to
//! the client-bound methods so the agent can stream updates, ask for
//! permission, and touch files through the client.
//!
//! # Routing
//!
//! | Method           | Maps to                  |
//! |------------------|--------------------------|
//! | `initialize`     | [`Agent::initialize`]    |
//! | `authenticate`   | [`Agent::authenticate`]  |
//! | `session/new`    | [`Agent::new_session`]   |
//! | `session/load`   | [`Agent::load_session`]  |
//! | `session/prompt` | [`Agent::prompt`]        |
//! | `session/cancel` | [`Agent::cancel`]        |
//! | *(any other)*    | `Method not found`       |
//!
//! `session/cancel` sent with an id is answered with `Invalid request`; a
//! request method sent as a notification is dropped.

use serde::de::IgnoredAny;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::acp::connection::{Connection, MethodHandler};
use crate::acp::error::{HandlerError, HandlerResult, ProtocolError};
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

/// Capabilities of the coding-agent side of the protocol.
///
/// Each method receives already-validated parameters. Failing with
/// [`HandlerError::Protocol`] sends that exact error to the client; any
/// other failure is reported as `Internal error`.
pub trait Agent: Send + Sync + 'static {
    /// Negotiate protocol version and capabilities.
    fn initialize(
        &self,
        args: InitializeRequest,
    ) -> BoxFuture<'_, HandlerResult<InitializeResponse>>;

    /// Authenticate with one of the advertised methods.
    fn authenticate(&self, args: AuthenticateRequest) -> BoxFuture<'_, HandlerResult<()>>;

    /// Create a session.
    fn new_session(
        &self,
        args: NewSessionRequest,
    ) -> BoxFuture<'_, HandlerResult<NewSessionResponse>>;

    /// Resume a session.
    ///
    /// Agents that do not advertise `loadSession` can keep the default,
    /// which answers `Method not found`.
    fn load_session(&self, args: LoadSessionRequest) -> BoxFuture<'_, HandlerResult<()>> {
        let _ = args;
        Box::pin(async {
            Err(ProtocolError::method_not_found()
                .with_details(AgentMethod::LoadSession.name())
                .into())
        })
    }

    /// Run one prompt turn to completion.
    fn prompt(&self, args: PromptRequest) -> BoxFuture<'_, HandlerResult<PromptResponse>>;

    /// Stop the running turn of a session.
    fn cancel(&self, args: CancelNotification) -> BoxFuture<'_, HandlerResult<()>>;
}

/// [`MethodHandler`] dispatching the agent-bound method set to an [`Agent`].
#[derive(Debug)]
pub struct AgentRouter<A> {
    agent: A,
}

impl<A: Agent> AgentRouter<A> {
    /// Route inbound calls to `agent`.
    #[must_use]
    pub fn new(agent: A) -> Self {
        Self { agent }
    }
}

impl<A: Agent> MethodHandler for AgentRouter<A> {
    fn handle(&self, method: String, params: Value) -> BoxFuture<'_, HandlerResult<Value>> {
        Box::pin(async move {
            let Some(target) = AgentMethod::from_name(&method) else {
                return Err(ProtocolError::method_not_found().with_details(method).into());
            };

            match target {
                AgentMethod::Initialize => {
                    respond(self.agent.initialize(parse_params(params)?).await?)
                }
                AgentMethod::Authenticate => {
                    respond(self.agent.authenticate(parse_params(params)?).await?)
                }
                AgentMethod::NewSession => {
                    respond(self.agent.new_session(parse_params(params)?).await?)
                }
                AgentMethod::LoadSession => {
                    respond(self.agent.load_session(parse_params(params)?).await?)
                }
                AgentMethod::Prompt => respond(self.agent.prompt(parse_params(params)?).await?),
                AgentMethod::Cancel => respond(self.agent.cancel(parse_params(params)?).await?),
            }
        })
    }

    fn expected_kind(&self, method: &str) -> Option<MethodKind> {
        method_info(method)
            .filter(|(direction, _)| *direction == Direction::AgentBound)
            .map(|(_, kind)| kind)
    }
}

/// Serialise a capability result into the response payload.
pub(crate) fn respond<T: Serialize>(value: T) -> HandlerResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| HandlerError::other(format!("result serialisation failed: {e}")))
}

/// Agent endpoint of an ACP connection.
///
/// Cheap to clone. Dropping every clone does not stop the connection; it
/// keeps serving until the client closes its stream.
#[derive(Debug, Clone)]
pub struct AgentSideConnection {
    conn: Connection,
}

impl AgentSideConnection {
    /// Serve an agent over `reader`/`writer` with default settings.
    ///
    /// `to_agent` receives a handle to this connection, which the agent may
    /// keep to call back into the client.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new<A, F, R, W>(to_agent: F, reader: R, writer: W) -> Self
    where
        A: Agent,
        F: FnOnce(AgentSideConnection) -> A,
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::with_config(to_agent, reader, writer, &ConnectionConfig::default())
    }

    /// As [`new`](Self::new) with explicit connection settings.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn with_config<A, F, R, W>(
        to_agent: F,
        reader: R,
        writer: W,
        config: &ConnectionConfig,
    ) -> Self
    where
        A: Agent,
        F: FnOnce(AgentSideConnection) -> A,
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let conn = Connection::spawn_with(reader, writer, config, |conn| {
            AgentRouter::new(to_agent(Self { conn }))
        });
        Self { conn }
    }

    /// Stream a session update to the client.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConnectionClosed` or `AppError::Transport` if the
    /// notification cannot be written.
    pub async fn session_update(&self, args: &SessionNotification) -> Result<()> {
        self.conn
            .notify(ClientMethod::SessionUpdate.name(), args)
            .await
    }

    /// Ask the client to approve a tool call.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Rpc` if the client rejects the request, or a
    /// connection error.
    pub async fn request_permission(
        &self,
        args: &RequestPermissionRequest,
    ) -> Result<RequestPermissionResponse> {
        self.conn
            .request(ClientMethod::RequestPermission.name(), args)
            .await
    }

    /// Read a text file through the client.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Rpc` if the client rejects the request, or a
    /// connection error.
    pub async fn read_text_file(&self, args: &ReadTextFileRequest) -> Result<ReadTextFileResponse> {
        self.conn
            .request(ClientMethod::ReadTextFile.name(), args)
            .await
    }

    /// Write a text file through the client.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Rpc` if the client rejects the request, or a
    /// connection error.
    pub async fn write_text_file(&self, args: &WriteTextFileRequest) -> Result<()> {
        self.conn
            .request::<_, IgnoredAny>(ClientMethod::WriteTextFile.name(), args)
            .await
            .map(drop)
    }

    /// The underlying connection.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Wait until the client side closes the connection.
    pub async fn closed(&self) {
        self.conn.closed().await;
    }
}
