mod cli;
mod shutdown;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use agent_bb::{find_config_path, parse_config};
use agent_core::{AgentRequest, MessageType, Target};
use agent_dispatch::{dispatch, ControllerLocks, DispatchConfig, InMemoryNodeTable, TcpJsonTransport};

use crate::cli::{parse_target, Cli, MessageKind};
use crate::shutdown::{spawn_ctrl_c_handler, ShutdownController, ShutdownEvent};

fn message_type_for(kind: MessageKind) -> MessageType {
    match kind {
        MessageKind::Ping => MessageType::Ping,
        MessageKind::RevokeJobCredential => MessageType::RevokeJobCredential,
        MessageKind::NodeRegistrationStatus => MessageType::NodeRegistrationStatus,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = find_config_path(&cli.bb_config_dir, &cli.bb_type);
    let config_text = std::fs::read_to_string(&config_path)
        .map_err(|err| anyhow::anyhow!("reading {}: {err}", config_path.display()))?;
    let bb_config = parse_config(&config_text);
    println!(
        "burst buffer config: granularity={}GB total={}GB boost_use={}",
        bb_config.granularity_gb, bb_config.total_space_gb, bb_config.prio_boost_use
    );

    if cli.bb_config_only {
        return Ok(());
    }

    if cli.targets.is_empty() {
        println!("no --target given, nothing to dispatch");
        return Ok(());
    }

    let mut targets = Vec::with_capacity(cli.targets.len());
    for raw in &cli.targets {
        let (node_name, addr) = parse_target(raw)?;
        targets.push(Target::new(addr, node_name));
    }

    let shutdown = Arc::new(ShutdownController::new());
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::unbounded_channel::<ShutdownEvent>();
    spawn_ctrl_c_handler(shutdown.clone(), shutdown_tx);

    let request = AgentRequest::new(message_type_for(cli.message), Vec::new(), targets);
    let node_table = Arc::new(InMemoryNodeTable::new());
    let config = DispatchConfig::new(
        cli.agent_thread_count,
        Duration::from_secs(cli.command_timeout_secs),
    );

    let dispatch_fut = dispatch(
        request,
        Arc::new(TcpJsonTransport),
        node_table.clone(),
        Arc::new(ControllerLocks::new()),
        config,
    );
    tokio::pin!(dispatch_fut);

    let outcome = loop {
        tokio::select! {
            outcome = &mut dispatch_fut => break outcome,
            ev = shutdown_rx.recv() => match ev {
                Some(ShutdownEvent::Graceful) => {
                    eprintln!("stop requested; dispatch has a bounded timeout and will finish on its own (press CTRL+C again to exit immediately)");
                }
                Some(ShutdownEvent::Immediate) => {
                    eprintln!("exiting immediately, not waiting for in-flight workers");
                    std::process::exit(130);
                }
                None => {}
            },
        }
    };

    println!(
        "dispatch complete: done={} failed={} max_delay={:.3}s",
        outcome.done, outcome.failed, outcome.max_delay_secs
    );
    for (node, responded) in node_table.snapshot() {
        println!("  {node}: {}", if responded { "responded" } else { "no response" });
    }

    Ok(())
}
