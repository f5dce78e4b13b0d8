//! ACP method table and wire types.
//!
//! The routers only ever dispatch the closed sets [`AgentMethod`] and
//! [`ClientMethod`]; any other method name is answered with
//! `Method not found`.
//!
//! | Method                       | Direction    | Kind         |
//! |------------------------------|--------------|--------------|
//! | `initialize`                 | agent-bound  | request      |
//! | `authenticate`               | agent-bound  | request      |
//! | `session/new`                | agent-bound  | request      |
//! | `session/load`               | agent-bound  | request      |
//! | `session/prompt`             | agent-bound  | request      |
//! | `session/cancel`             | agent-bound  | notification |
//! | `session/update`             | client-bound | notification |
//! | `session/request_permission` | client-bound | request      |
//! | `fs/read_text_file`          | client-bound | request      |
//! | `fs/write_text_file`         | client-bound | request      |

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::acp::error::ValidationError;

/// Protocol version spoken by this crate.
pub const PROTOCOL_VERSION: ProtocolVersion = 1;

/// Integer protocol version exchanged during `initialize`.
pub type ProtocolVersion = u16;

/// Whether a method expects a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Answered with exactly one response.
    Request,
    /// Never answered.
    Notification,
}

/// Which side of the connection serves a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sent by the client, served by the agent.
    AgentBound,
    /// Sent by the agent, served by the client.
    ClientBound,
}

/// Methods served by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentMethod {
    /// `initialize`
    Initialize,
    /// `authenticate`
    Authenticate,
    /// `session/new`
    NewSession,
    /// `session/load`
    LoadSession,
    /// `session/prompt`
    Prompt,
    /// `session/cancel`
    Cancel,
}

impl AgentMethod {
    /// The full agent-bound method set.
    pub const ALL: [Self; 6] = [
        Self::Initialize,
        Self::Authenticate,
        Self::NewSession,
        Self::LoadSession,
        Self::Prompt,
        Self::Cancel,
    ];

    /// Wire name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Authenticate => "authenticate",
            Self::NewSession => "session/new",
            Self::LoadSession => "session/load",
            Self::Prompt => "session/prompt",
            Self::Cancel => "session/cancel",
        }
    }

    /// Request or notification.
    #[must_use]
    pub const fn kind(self) -> MethodKind {
        match self {
            Self::Cancel => MethodKind::Notification,
            _ => MethodKind::Request,
        }
    }

    /// Look up a wire name in the agent-bound set.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|method| method.name() == name)
    }
}

/// Methods served by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientMethod {
    /// `session/update`
    SessionUpdate,
    /// `session/request_permission`
    RequestPermission,
    /// `fs/read_text_file`
    ReadTextFile,
    /// `fs/write_text_file`
    WriteTextFile,
}

impl ClientMethod {
    /// The full client-bound method set.
    pub const ALL: [Self; 4] = [
        Self::SessionUpdate,
        Self::RequestPermission,
        Self::ReadTextFile,
        Self::WriteTextFile,
    ];

    /// Wire name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SessionUpdate => "session/update",
            Self::RequestPermission => "session/request_permission",
            Self::ReadTextFile => "fs/read_text_file",
            Self::WriteTextFile => "fs/write_text_file",
        }
    }

    /// Request or notification.
    #[must_use]
    pub const fn kind(self) -> MethodKind {
        match self {
            Self::SessionUpdate => MethodKind::Notification,
            _ => MethodKind::Request,
        }
    }

    /// Look up a wire name in the client-bound set.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|method| method.name() == name)
    }
}

/// Direction and kind of any known method name.
#[must_use]
pub fn method_info(name: &str) -> Option<(Direction, MethodKind)> {
    if let Some(method) = AgentMethod::from_name(name) {
        return Some((Direction::AgentBound, method.kind()));
    }
    ClientMethod::from_name(name).map(|method| (Direction::ClientBound, method.kind()))
}

/// Validate `params` against the shape of `T`.
///
/// # Errors
///
/// Returns a [`ValidationError`] describing the first mismatch.
pub fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, ValidationError> {
    serde_json::from_value(params).map_err(ValidationError::from)
}

// ── Identifiers ───────────────────────────────────────────────────────────────

/// Opaque session identifier chosen by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

// ── initialize / authenticate ─────────────────────────────────────────────────

/// File-system operations the client offers to the agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSystemCapability {
    /// `fs/read_text_file` is available.
    #[serde(default)]
    pub read_text_file: bool,
    /// `fs/write_text_file` is available.
    #[serde(default)]
    pub write_text_file: bool,
}

/// Capabilities advertised by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCapabilities {
    /// File-system access.
    #[serde(default)]
    pub fs: FileSystemCapability,
}

/// `initialize` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequest {
    /// Latest protocol version the client supports.
    pub protocol_version: ProtocolVersion,
    /// Client capabilities.
    #[serde(default)]
    pub client_capabilities: ClientCapabilities,
}

/// Content kinds the agent accepts in prompts beyond plain text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptCapabilities {
    /// Image blocks.
    #[serde(default)]
    pub image: bool,
    /// Audio blocks.
    #[serde(default)]
    pub audio: bool,
    /// Embedded resource context.
    #[serde(default)]
    pub embedded_context: bool,
}

/// Capabilities advertised by the agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    /// `session/load` is supported.
    #[serde(default)]
    pub load_session: bool,
    /// Accepted prompt content.
    #[serde(default)]
    pub prompt_capabilities: PromptCapabilities,
}

/// An authentication method the agent accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthMethod {
    /// Identifier passed back in `authenticate`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// `initialize` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResponse {
    /// Protocol version the agent will speak.
    pub protocol_version: ProtocolVersion,
    /// Agent capabilities.
    #[serde(default)]
    pub agent_capabilities: AgentCapabilities,
    /// Accepted authentication methods; empty when none is required.
    #[serde(default)]
    pub auth_methods: Vec<AuthMethod>,
}

/// `authenticate` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateRequest {
    /// One of the advertised [`AuthMethod::id`]s.
    pub method_id: String,
}

// ── sessions ──────────────────────────────────────────────────────────────────

/// Environment variable handed to an MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVariable {
    /// Variable name.
    pub name: String,
    /// Variable value.
    pub value: String,
}

/// MCP server the agent should connect to for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServer {
    /// Display name.
    pub name: String,
    /// Executable.
    pub command: PathBuf,
    /// Arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment.
    #[serde(default)]
    pub env: Vec<EnvVariable>,
}

/// `session/new` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionRequest {
    /// Absolute working directory for the session.
    pub cwd: PathBuf,
    /// MCP servers to attach.
    #[serde(default)]
    pub mcp_servers: Vec<McpServer>,
}

/// `session/new` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionResponse {
    /// Identifier of the created session.
    pub session_id: SessionId,
}

/// `session/load` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSessionRequest {
    /// Session to resume.
    pub session_id: SessionId,
    /// Working directory.
    pub cwd: PathBuf,
    /// MCP servers to attach.
    #[serde(default)]
    pub mcp_servers: Vec<McpServer>,
}

/// A piece of prompt or message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Base64 image.
    Image {
        /// Base64 payload.
        data: String,
        /// MIME type of the payload.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// Reference to a resource the agent can fetch.
    ResourceLink {
        /// Resource URI.
        uri: String,
        /// Display name.
        name: String,
    },
}

impl ContentBlock {
    /// Text block shorthand.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// `session/prompt` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRequest {
    /// Target session.
    pub session_id: SessionId,
    /// User prompt content.
    pub prompt: Vec<ContentBlock>,
}

/// Why the agent ended a prompt turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The turn completed normally.
    EndTurn,
    /// Token limit reached.
    MaxTokens,
    /// Request limit for the turn reached.
    MaxTurnRequests,
    /// The model refused.
    Refusal,
    /// The client cancelled the turn.
    Cancelled,
}

impl StopReason {
    /// Wire name, as serialised.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EndTurn => "end_turn",
            Self::MaxTokens => "max_tokens",
            Self::MaxTurnRequests => "max_turn_requests",
            Self::Refusal => "refusal",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Display for StopReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `session/prompt` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    /// Reason the turn ended.
    pub stop_reason: StopReason,
}

/// `session/cancel` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelNotification {
    /// Session whose turn should stop.
    pub session_id: SessionId,
}

// ── client-bound ──────────────────────────────────────────────────────────────

/// Streaming progress reported by the agent during a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "sessionUpdate", rename_all = "snake_case")]
pub enum SessionUpdate {
    /// Echo of user content.
    UserMessageChunk {
        /// Chunk content.
        content: ContentBlock,
    },
    /// Agent reply content.
    AgentMessageChunk {
        /// Chunk content.
        content: ContentBlock,
    },
    /// Agent reasoning content.
    AgentThoughtChunk {
        /// Chunk content.
        content: ContentBlock,
    },
}

/// `session/update` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionNotification {
    /// Session the update belongs to.
    pub session_id: SessionId,
    /// The update.
    pub update: SessionUpdate,
}

/// Semantics of a permission option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOptionKind {
    /// Allow this once.
    AllowOnce,
    /// Allow from now on.
    AllowAlways,
    /// Reject this once.
    RejectOnce,
    /// Reject from now on.
    RejectAlways,
}

/// One choice offered to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionOption {
    /// Identifier returned when selected.
    pub option_id: String,
    /// Display label.
    pub name: String,
    /// Semantics.
    pub kind: PermissionOptionKind,
}

/// The tool call permission is requested for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallUpdate {
    /// Tool call identifier.
    pub tool_call_id: String,
    /// Human-readable title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// `session/request_permission` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPermissionRequest {
    /// Session the tool call belongs to.
    pub session_id: SessionId,
    /// The tool call.
    pub tool_call: ToolCallUpdate,
    /// Choices offered.
    pub options: Vec<PermissionOption>,
}

/// User decision on a permission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RequestPermissionOutcome {
    /// The turn was cancelled before a choice was made.
    Cancelled,
    /// An option was chosen.
    Selected {
        /// The chosen [`PermissionOption::option_id`].
        #[serde(rename = "optionId")]
        option_id: String,
    },
}

/// `session/request_permission` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPermissionResponse {
    /// The decision.
    pub outcome: RequestPermissionOutcome,
}

/// `fs/read_text_file` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadTextFileRequest {
    /// Requesting session.
    pub session_id: SessionId,
    /// Absolute file path.
    pub path: PathBuf,
    /// 1-based first line to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Maximum number of lines to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// `fs/read_text_file` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadTextFileResponse {
    /// File content (or the requested slice of it).
    pub content: String,
}

/// `fs/write_text_file` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteTextFileRequest {
    /// Requesting session.
    pub session_id: SessionId,
    /// Absolute file path.
    pub path: PathBuf,
    /// Full new content.
    pub content: String,
}
