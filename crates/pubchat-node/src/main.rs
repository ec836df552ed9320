//! pubchat demo node.
//!
//! Usage:
//!
//!   pubchat-node [OPTIONS]
//!
//! Options:
//!
//!   --config <PATH>     Load a JSON `ChatConfig`
//!   --data-dir <PATH>   sled directory for the local participant
//!                       (default: temporary, discarded on exit)
//!   --room <NAME>       Room to join (default: lobby)
//!
//! Starts two participants on an in-process hub, lets the second one
//! greet the first, prints what the first one sees and exits.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pubchat_node::clock::SystemClock;
use pubchat_node::loopback::LoopbackHub;
use pubchat_node::node::ChatNode;
use pubchat_storage::engine::StorageEngine;
use pubchat_types::config::ChatConfig;
use pubchat_types::ChatEvent;

/// How long to wait for the greeting to arrive.
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CliArgs {
    config_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    room: Option<String>,
}

impl CliArgs {
    fn parse_from_env() -> Result<Self, String> {
        let mut args = std::env::args().skip(1);
        let mut cli = Self::default();
        while let Some(arg) = args.next() {
            let mut value = || args.next().ok_or_else(|| format!("{arg} needs a value"));
            match arg.as_str() {
                "--config" => cli.config_path = Some(PathBuf::from(value()?)),
                "--data-dir" => cli.data_dir = Some(PathBuf::from(value()?)),
                "--room" => cli.room = Some(value()?),
                other => return Err(format!("unknown argument: {other}")),
            }
        }
        Ok(cli)
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = match CliArgs::parse_from_env() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("pubchat-node: {e}");
            std::process::exit(2);
        }
    };

    if let Err(e) = run(cli).await {
        tracing::error!("demo failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config_path {
        Some(path) => ChatConfig::load(path)?,
        None => ChatConfig::default(),
    };
    let room = cli.room.unwrap_or_else(|| "lobby".to_string());

    let local_storage = match &cli.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            StorageEngine::open(dir)?
        }
        None => StorageEngine::temporary()?,
    };

    let hub = LoopbackHub::new();
    let clock = Arc::new(SystemClock);

    let mut local = ChatNode::new(
        config.clone(),
        Arc::new(hub.join()?),
        local_storage,
        clock.clone(),
    )?;
    let mut remote = ChatNode::new(
        config,
        Arc::new(hub.join()?),
        StorageEngine::temporary()?,
        clock,
    )?;

    let mut events = local
        .take_event_receiver()
        .ok_or("event receiver already taken")?;
    let local_task = local.start()?;
    let remote_task = remote.start()?;
    let local_handle = local.handle();
    let remote_handle = remote.handle();

    remote_handle.update_profile("demo-peer").await?;
    local_handle.connect(&room).await?;
    remote_handle.connect(&room).await?;
    tokio::time::sleep(Duration::from_millis(1100)).await;
    remote_handle.send_message("hi").await?;

    let received = tokio::time::timeout(RECEIVE_TIMEOUT, async {
        while let Some(event) = events.recv().await {
            match event {
                ChatEvent::MessageAdded(msg) => return Some(msg),
                other => tracing::info!(?other, "event"),
            }
        }
        None
    })
    .await;

    match received {
        Ok(Some(msg)) => tracing::info!(sender = %msg.sender, text = %msg.text, "message received"),
        Ok(None) => tracing::warn!("event channel closed before any message arrived"),
        Err(_) => tracing::warn!("no message within {RECEIVE_TIMEOUT:?}"),
    }

    let status = local_handle.status().await?;
    tracing::info!(
        accepted = status.rx.accepted,
        dropped = status.rx.dropped,
        peers = status.peer_count,
        "local receive stats"
    );

    local.shutdown()?;
    remote.shutdown()?;
    local_task.await?;
    remote_task.await?;
    Ok(())
}
