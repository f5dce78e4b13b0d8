#![forbid(unsafe_code)]

//! `acp-echo-agent` — reference ACP agent served over stdio.
//!
//! Reads NDJSON JSON-RPC frames from stdin and writes them to stdout.
//! Diagnostics go to stderr so they never interleave with protocol frames.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use acp_link::acp::agent::AgentSideConnection;
use acp_link::echo::EchoAgent;
use acp_link::{AppError, LinkConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "acp-echo-agent",
    about = "ACP agent that echoes prompts back",
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

    /// Require `authenticate` before sessions can be created.
    #[arg(long)]
    require_auth: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("acp-echo-agent bootstrap");

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
    info!("configuration loaded");

    let require_auth = args.require_auth;
    let agent = AgentSideConnection::with_config(
        move |client| {
            let agent = EchoAgent::new(client);
            if require_auth {
                agent.requiring_auth()
            } else {
                agent
            }
        },
        tokio::io::stdin(),
        tokio::io::stdout(),
        &config.connection,
    );
    info!("serving ACP over stdio");

    tokio::select! {
        () = agent.closed() => info!("client closed the connection"),
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("interrupt received, shutting down");
            agent.connection().shutdown().await;
        }
    }

    Ok(())
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
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
