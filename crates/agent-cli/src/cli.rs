use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Wire message kind to fan out (maps onto [`agent_core::MessageType`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MessageKind {
    Ping,
    RevokeJobCredential,
    NodeRegistrationStatus,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "agentd", version, about = "Parallel RPC dispatch agent")]
pub struct Cli {
    /// Targets to dispatch to, as `node_name=host:port` pairs.
    #[arg(long = "target", value_name = "NODE=ADDR")]
    pub targets: Vec<String>,

    /// Message type to send to every target.
    #[arg(long, env = "AGENT_MESSAGE", value_enum, default_value_t = MessageKind::Ping)]
    pub message: MessageKind,

    /// Maximum number of workers dispatched concurrently.
    #[arg(long, env = "AGENT_THREAD_COUNT", default_value_t = 10)]
    pub agent_thread_count: usize,

    /// Per-worker timeout, in seconds, enforced by the watchdog.
    #[arg(long, env = "AGENT_COMMAND_TIMEOUT", default_value_t = 30)]
    pub command_timeout_secs: u64,

    /// Directory the burst-buffer config loader searches for
    /// `burst_buffer.conf` / `burst_buffer_<type>.conf`.
    #[arg(long, env = "AGENT_BB_CONFIG_DIR", default_value = ".")]
    pub bb_config_dir: PathBuf,

    /// Burst-buffer plugin type, used for the type-qualified config
    /// filename fallback.
    #[arg(long, env = "AGENT_BB_TYPE", default_value = "generic")]
    pub bb_type: String,

    /// Skip the dispatch step and only print the burst-buffer config.
    #[arg(long, default_value_t = false)]
    pub bb_config_only: bool,
}

/// Parse one `--target node_name=host:port` entry.
pub fn parse_target(raw: &str) -> anyhow::Result<(String, SocketAddr)> {
    let (name, addr) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("--target must be NODE=ADDR, got {raw:?}"))?;
    let addr: SocketAddr = addr
        .parse()
        .map_err(|err| anyhow::anyhow!("invalid address in --target {raw:?}: {err}"))?;
    Ok((name.to_string(), addr))
}
