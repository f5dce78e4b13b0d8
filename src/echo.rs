//! Reference [`Agent`] that echoes prompts back to the client.
//!
//! Every text block of a prompt is streamed back as an
//! `agent_message_chunk` session update before the turn ends. A
//! `session/cancel` received mid-turn stops the echo and ends the turn with
//! [`StopReason::Cancelled`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::acp::agent::{Agent, AgentSideConnection};
use crate::acp::error::{HandlerResult, ProtocolError};
use crate::acp::schema::{
    AgentCapabilities, AuthMethod, AuthenticateRequest, CancelNotification, ContentBlock,
    InitializeRequest, InitializeResponse, LoadSessionRequest, NewSessionRequest,
    NewSessionResponse, PromptRequest, PromptResponse, SessionId, SessionNotification,
    SessionUpdate, StopReason, PROTOCOL_VERSION,
};
use crate::acp::BoxFuture;

/// Identifier of the single authentication method offered when
/// authentication is required.
pub const ECHO_AUTH_METHOD: &str = "echo-token";

/// Echo agent bound to one client connection.
#[derive(Debug)]
pub struct EchoAgent {
    client: AgentSideConnection,
    require_auth: bool,
    authenticated: AtomicBool,
    /// Live sessions → cancellation token of the running turn.
    sessions: Mutex<HashMap<SessionId, CancellationToken>>,
}

impl EchoAgent {
    /// Echo agent that needs no authentication.
    #[must_use]
    pub fn new(client: AgentSideConnection) -> Self {
        Self {
            client,
            require_auth: false,
            authenticated: AtomicBool::new(false),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Require `authenticate` before sessions can be created.
    #[must_use]
    pub fn requiring_auth(mut self) -> Self {
        self.require_auth = true;
        self
    }

    fn ensure_authenticated(&self) -> HandlerResult<()> {
        if self.require_auth && !self.authenticated.load(Ordering::Acquire) {
            return Err(ProtocolError::auth_required().into());
        }
        Ok(())
    }

    async fn start_turn(&self, session_id: &SessionId) -> HandlerResult<CancellationToken> {
        let mut sessions = self.sessions.lock().await;
        let Some(slot) = sessions.get_mut(session_id) else {
            return Err(ProtocolError::invalid_params()
                .with_details(format!("unknown session: {session_id}"))
                .into());
        };
        let token = CancellationToken::new();
        *slot = token.clone();
        Ok(token)
    }
}

impl Agent for EchoAgent {
    fn initialize(
        &self,
        args: InitializeRequest,
    ) -> BoxFuture<'_, HandlerResult<InitializeResponse>> {
        Box::pin(async move {
            let auth_methods = if self.require_auth {
                vec![AuthMethod {
                    id: ECHO_AUTH_METHOD.to_owned(),
                    name: "Echo token".to_owned(),
                    description: None,
                }]
            } else {
                Vec::new()
            };

            Ok(InitializeResponse {
                protocol_version: args.protocol_version.min(PROTOCOL_VERSION),
                agent_capabilities: AgentCapabilities {
                    load_session: true,
                    ..AgentCapabilities::default()
                },
                auth_methods,
            })
        })
    }

    fn authenticate(&self, args: AuthenticateRequest) -> BoxFuture<'_, HandlerResult<()>> {
        Box::pin(async move {
            if args.method_id != ECHO_AUTH_METHOD {
                return Err(ProtocolError::invalid_params()
                    .with_details(format!("unknown auth method: {}", args.method_id))
                    .into());
            }
            self.authenticated.store(true, Ordering::Release);
            info!("echo agent: client authenticated");
            Ok(())
        })
    }

    fn new_session(
        &self,
        args: NewSessionRequest,
    ) -> BoxFuture<'_, HandlerResult<NewSessionResponse>> {
        Box::pin(async move {
            self.ensure_authenticated()?;

            let session_id = SessionId(uuid::Uuid::new_v4().to_string());
            self.sessions
                .lock()
                .await
                .insert(session_id.clone(), CancellationToken::new());

            info!(%session_id, cwd = %args.cwd.display(), "echo agent: session created");
            Ok(NewSessionResponse { session_id })
        })
    }

    fn load_session(&self, args: LoadSessionRequest) -> BoxFuture<'_, HandlerResult<()>> {
        Box::pin(async move {
            self.ensure_authenticated()?;

            if self.sessions.lock().await.contains_key(&args.session_id) {
                Ok(())
            } else {
                Err(ProtocolError::invalid_params()
                    .with_details(format!("unknown session: {}", args.session_id))
                    .into())
            }
        })
    }

    fn prompt(&self, args: PromptRequest) -> BoxFuture<'_, HandlerResult<PromptResponse>> {
        Box::pin(async move {
            self.ensure_authenticated()?;
            let turn = self.start_turn(&args.session_id).await?;

            for block in args.prompt {
                if turn.is_cancelled() {
                    debug!(session_id = %args.session_id, "echo agent: turn cancelled");
                    return Ok(PromptResponse {
                        stop_reason: StopReason::Cancelled,
                    });
                }

                let ContentBlock::Text { text } = block else {
                    continue;
                };

                self.client
                    .session_update(&SessionNotification {
                        session_id: args.session_id.clone(),
                        update: SessionUpdate::AgentMessageChunk {
                            content: ContentBlock::text(text),
                        },
                    })
                    .await?;
            }

            let stop_reason = if turn.is_cancelled() {
                StopReason::Cancelled
            } else {
                StopReason::EndTurn
            };
            Ok(PromptResponse { stop_reason })
        })
    }

    fn cancel(&self, args: CancelNotification) -> BoxFuture<'_, HandlerResult<()>> {
        Box::pin(async move {
            if let Some(turn) = self.sessions.lock().await.get(&args.session_id) {
                turn.cancel();
                debug!(session_id = %args.session_id, "echo agent: cancel requested");
            }
            Ok(())
        })
    }
}

