//! livescore - live game update CLI

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use livescore::{
    ConnectionManager, ConnectionState, GameUpdates, Interest, LiveConfig, StatusIndicator,
    UpdateKind,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Time given to the socket task to flush unsubscribe and close frames
const FLUSH_GRACE: Duration = Duration::from_millis(250);

/// Real-time game updates over one shared WebSocket
#[derive(Parser, Debug)]
#[command(name = "livescore")]
#[command(version)]
#[command(about = "Stream real-time game updates", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// WebSocket endpoint (overrides config and environment)
    #[arg(long, global = true, value_name = "URL")]
    url: Option<String>,

    /// TOML configuration file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print updates as JSON lines until interrupted
    Watch {
        /// Game to follow (repeatable)
        #[arg(long = "game", value_name = "ID")]
        games: Vec<String>,

        /// Follow every game (default when no --game is given)
        #[arg(long)]
        all: bool,

        /// Update kinds to print (repeatable; default: all)
        #[arg(long = "kind", value_name = "summary|pbp")]
        kinds: Vec<UpdateKind>,
    },
    /// Check whether the server is reachable
    Status {
        /// Seconds to wait for the connection
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args).await?;
    info!("Using live endpoint {}", config.ws_url);

    let manager = ConnectionManager::websocket(config);

    match args.command {
        Command::Watch { games, all, kinds } => watch(manager, games, all, kinds).await,
        Command::Status { timeout } => status(manager, Duration::from_secs(timeout)).await,
    }
}

/// Config file or environment, then the --url override
async fn load_config(args: &Args) -> anyhow::Result<LiveConfig> {
    let mut config = match &args.config {
        Some(path) => LiveConfig::from_file(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => LiveConfig::from_env().context("reading configuration from environment")?,
    };

    if let Some(url) = &args.url {
        config.ws_url = url.clone();
        config.validate()?;
    }

    Ok(config)
}

async fn watch(
    manager: ConnectionManager,
    games: Vec<String>,
    all: bool,
    kinds: Vec<UpdateKind>,
) -> anyhow::Result<()> {
    let mut interests: Vec<Interest> = games.into_iter().map(Interest::Game).collect();
    if all || interests.is_empty() {
        interests.push(Interest::All);
    }
    let kinds = if kinds.is_empty() {
        UpdateKind::ALL.to_vec()
    } else {
        kinds
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut facades = Vec::with_capacity(interests.len());
    for interest in interests {
        let tx = tx.clone();
        let mut updates = GameUpdates::new(manager.clone(), move |update| {
            let _ = tx.send(update);
        })
        .with_kinds(kinds.clone());
        info!("Following {}", interest);
        updates.activate(interest);
        facades.push(updates);
    }
    drop(tx);

    let mut status = manager.watch_status();
    let mut indicator = status.borrow().indicator();
    manager.connect();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(update) = rx.recv() => {
                println!("{}", serde_json::to_string(&update)?);
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                if current.indicator() != indicator {
                    indicator = current.indicator();
                    match indicator {
                        StatusIndicator::ConnectionLost => warn!(
                            "{}: {}",
                            indicator,
                            current.last_error.as_deref().unwrap_or("gave up reconnecting")
                        ),
                        _ => info!("{}", indicator),
                    }
                }
                if current.state == ConnectionState::GivenUp {
                    bail!("gave up reconnecting to {}", manager.config().ws_url);
                }
            }
            _ = &mut shutdown => {
                info!("Interrupted, unsubscribing");
                break;
            }
        }
    }

    drop(facades);
    manager.shutdown();
    tokio::time::sleep(FLUSH_GRACE).await;

    let metrics = manager.metrics();
    info!(
        "Received {} frames, sent {}, dropped {} sends",
        metrics.frames_received, metrics.frames_sent, metrics.sends_dropped
    );

    Ok(())
}

async fn status(manager: ConnectionManager, timeout: Duration) -> anyhow::Result<()> {
    let mut status = manager.watch_status();
    manager.connect();

    let settled = tokio::time::timeout(
        timeout,
        status.wait_for(|s| s.is_connected() || s.state == ConnectionState::GivenUp),
    )
    .await
    .is_ok();
    if !settled {
        warn!("Timed out after {:?}", timeout);
    }

    let current = manager.status();
    println!("{}", serde_json::to_string_pretty(&current)?);
    println!("{}", current.indicator());

    manager.disconnect();
    tokio::time::sleep(FLUSH_GRACE).await;

    if !current.is_connected() {
        bail!("not connected to {}", manager.config().ws_url);
    }
    Ok(())
}
