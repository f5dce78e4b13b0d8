//! ACP agent process spawner.
//!
//! Spawns an agent process that speaks ACP over its stdio with:
//! - `kill_on_drop(true)` so the process is cleaned up with its handle.
//! - `env_clear()` + a safe variable allowlist so the client's secrets are
//!   not inherited by the agent.
//! - piped stdin/stdout for the protocol; stderr is inherited so agent logs
//!   stay visible.
//!
//! There is no ready-line convention in ACP: the process is usable as soon
//! as it is spawned, and readiness is established by the `initialize`
//! exchange (see [`handshake`](crate::acp::handshake)).

use std::path::PathBuf;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::info;

use crate::config::AgentCommandConfig;
use crate::{AppError, Result};

// ── Environment allowlist ────────────────────────────────────────────────────

/// Environment variables inherited by the spawned agent process.
///
/// Every other variable is stripped via `env_clear()` before launch.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    "LANG",
    "TERM",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

// ── Process handle ───────────────────────────────────────────────────────────

/// A running agent process with its protocol pipes.
///
/// `stdin` and `stdout` are meant to be handed to a
/// [`ClientSideConnection`](crate::acp::client::ClientSideConnection);
/// `child` must stay alive for as long as the connection is used.
#[derive(Debug)]
pub struct AgentProcess {
    /// Child process handle (killed on drop).
    pub child: Child,
    /// Writable end: client → agent.
    pub stdin: ChildStdin,
    /// Readable end: agent → client.
    pub stdout: ChildStdout,
}

// ── Spawner ──────────────────────────────────────────────────────────────────

/// Spawn the agent described by `config`.
///
/// # Errors
///
/// - `AppError::Spawn("agent command must not be empty")`.
/// - `AppError::Spawn("failed to spawn agent: …")` — OS spawn failure.
/// - `AppError::Spawn("failed to capture agent …")` — pipes unavailable.
pub fn spawn_agent(config: &AgentCommandConfig) -> Result<AgentProcess> {
    if config.command.trim().is_empty() {
        return Err(AppError::Spawn("agent command must not be empty".into()));
    }

    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args);

    // Strip inherited environment, then inject only the safe allowlist.
    cmd.env_clear();
    for &key in ALLOWED_ENV_VARS {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }

    let cwd = match &config.cwd {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };

    cmd.current_dir(&cwd)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::inherit())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Spawn(format!("failed to spawn agent: {err}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture agent stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture agent stdout".into()))?;

    info!(
        command = config.command.as_str(),
        cwd = %cwd.display(),
        pid = child.id(),
        "agent process spawned"
    );

    Ok(AgentProcess {
        child,
        stdin,
        stdout,
    })
}
