#![forbid(unsafe_code)]

//! `acp-client` — minimal ACP client for driving an agent from a terminal.
//!
//! Spawns the agent process, performs the `initialize` handshake, opens a
//! session, sends one prompt, and prints the streamed reply to stdout.
//! Permission requests are answered with the first "allow" option offered;
//! file-system requests are served from the local disk.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use acp_link::acp::client::{Client, ClientSideConnection};
use acp_link::acp::error::{HandlerResult, ProtocolError};
use acp_link::acp::handshake;
use acp_link::acp::schema::{
    AuthenticateRequest, ClientCapabilities, ContentBlock, FileSystemCapability,
    NewSessionRequest, PermissionOptionKind, PromptRequest, ReadTextFileRequest,
    ReadTextFileResponse, RequestPermissionOutcome, RequestPermissionRequest,
    RequestPermissionResponse, SessionNotification, SessionUpdate, WriteTextFileRequest,
};
use acp_link::acp::spawner::{spawn_agent, AgentProcess};
use acp_link::acp::BoxFuture;
use acp_link::config::AgentCommandConfig;
use acp_link::{AppError, LinkConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "acp-client",
    about = "Drive an ACP agent from the terminal",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Prompt text sent to the agent.
    #[arg(long)]
    prompt: String,

    /// Session working directory; defaults to the current directory.
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Agent command and arguments; overrides `[agent]` from the config.
    #[arg(trailing_var_arg = true)]
    agent: Vec<String>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = match &args.config {
        Some(path) => LinkConfig::load_from_path(path)?,
        None => LinkConfig::default(),
    };
    config.connection.validate()?;

    let agent_config = resolve_agent(&args.agent, config.agent.as_ref())?;
    let AgentProcess {
        mut child,
        stdin,
        stdout,
    } = spawn_agent(&agent_config)?;

    let client =
        ClientSideConnection::with_config(|_| TerminalClient, stdout, stdin, &config.connection);

    let request = handshake::initialize_request(ClientCapabilities {
        fs: FileSystemCapability {
            read_text_file: true,
            write_text_file: true,
        },
    });
    let init = handshake::initialize(&client, &request, agent_config.handshake_timeout()).await?;

    if let Some(method) = init.auth_methods.first() {
        info!(method_id = method.id.as_str(), "authenticating");
        client
            .authenticate(&AuthenticateRequest {
                method_id: method.id.clone(),
            })
            .await?;
    }

    let cwd = match args.cwd {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let session = client
        .new_session(&NewSessionRequest {
            cwd,
            mcp_servers: Vec::new(),
        })
        .await?;
    info!(session_id = %session.session_id, "session created");

    let response = client
        .prompt(&PromptRequest {
            session_id: session.session_id,
            prompt: vec![ContentBlock::text(args.prompt)],
        })
        .await?;

    println!();
    println!("[stop reason: {}]", response.stop_reason);

    // Stopping the writer drops the agent's stdin; the agent exits on EOF.
    client.connection().shutdown().await;
    match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
        Ok(status) => {
            let status = status?;
            info!(%status, "agent exited");
        }
        Err(_) => {
            warn!("agent did not exit after shutdown, killing it");
            child.kill().await?;
        }
    }
    Ok(())
}

/// Pick the agent command from the CLI, falling back to the config file.
fn resolve_agent(
    cli_agent: &[String],
    configured: Option<&AgentCommandConfig>,
) -> Result<AgentCommandConfig> {
    match (cli_agent.split_first(), configured) {
        (Some((command, rest)), configured) => Ok(AgentCommandConfig {
            command: command.clone(),
            args: rest.to_vec(),
            cwd: configured.and_then(|c| c.cwd.clone()),
            handshake_timeout_seconds: configured.map_or(10, |c| c.handshake_timeout_seconds),
        }),
        (None, Some(configured)) => Ok(configured.clone()),
        (None, None) => Err(AppError::Config(
            "no agent command given on the command line or in [agent]".into(),
        )),
    }
}

/// Prints agent output and serves file-system calls from the local disk.
#[derive(Debug)]
struct TerminalClient;

impl Client for TerminalClient {
    fn request_permission(
        &self,
        args: RequestPermissionRequest,
    ) -> BoxFuture<'_, HandlerResult<RequestPermissionResponse>> {
        Box::pin(async move {
            let choice = args.options.iter().find(|option| {
                matches!(
                    option.kind,
                    PermissionOptionKind::AllowOnce | PermissionOptionKind::AllowAlways
                )
            });

            let outcome = match choice {
                Some(option) => {
                    info!(
                        tool_call_id = args.tool_call.tool_call_id.as_str(),
                        option_id = option.option_id.as_str(),
                        "permission granted"
                    );
                    RequestPermissionOutcome::Selected {
                        option_id: option.option_id.clone(),
                    }
                }
                None => {
                    warn!(
                        tool_call_id = args.tool_call.tool_call_id.as_str(),
                        "no allow option offered, cancelling"
                    );
                    RequestPermissionOutcome::Cancelled
                }
            };
            Ok(RequestPermissionResponse { outcome })
        })
    }

    fn session_update(&self, args: SessionNotification) -> BoxFuture<'_, HandlerResult<()>> {
        Box::pin(async move {
            match args.update {
                SessionUpdate::AgentMessageChunk {
                    content: ContentBlock::Text { text },
                } => print!("{text}"),
                SessionUpdate::AgentThoughtChunk {
                    content: ContentBlock::Text { text },
                } => debug!(thought = text.as_str(), "agent thought"),
                other => debug!(?other, "session update"),
            }
            Ok(())
        })
    }

    fn read_text_file(
        &self,
        args: ReadTextFileRequest,
    ) -> BoxFuture<'_, HandlerResult<ReadTextFileResponse>> {
        Box::pin(async move {
            let content = tokio::fs::read_to_string(&args.path).await.map_err(|err| {
                ProtocolError::internal_error()
                    .with_details(format!("{}: {err}", args.path.display()))
            })?;

            let skip = args.line.map_or(0, |line| line.saturating_sub(1)) as usize;
            let content = match args.limit {
                Some(limit) => content
                    .lines()
                    .skip(skip)
                    .take(limit as usize)
                    .collect::<Vec<_>>()
                    .join("\n"),
                None if skip > 0 => content.lines().skip(skip).collect::<Vec<_>>().join("\n"),
                None => content,
            };
            Ok(ReadTextFileResponse { content })
        })
    }

    fn write_text_file(&self, args: WriteTextFileRequest) -> BoxFuture<'_, HandlerResult<()>> {
        Box::pin(async move {
            tokio::fs::write(&args.path, args.content).await?;
            Ok(())
        })
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
