//! Hummingbot Bridge - tracks trading bots over MQTT
//!
//! Runs as a pipe between an MQTT client and the host:
//! 1. Reads `topic payload` lines from stdin (bot output and host actions)
//! 2. Feeds them to the bridge manager
//! 3. Writes bot commands and changed entity states to stdout

use anyhow::Context;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::interval;
use tracing::{error, info, warn};

use hbot_bridge::host::{self, HostAction};
use hbot_bridge::{BridgeConfig, BridgeManager, ChannelPublisher, OutboundMessage, HEALTH_CHECK_PERIOD};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BridgeConfig::load().context("Failed to load bridge configuration")?;

    // Logs go to stderr, stdout carries the publish stream
    tracing_subscriber::fmt()
        .with_max_level(config.log_level())
        .with_writer(std::io::stderr)
        .init();

    info!("Starting Hummingbot bridge...");
    info!(
        "Bot prefix: {}, control prefix: {}, state prefix: {}",
        config.topic_prefix, config.control_prefix, config.state_prefix
    );

    let (publisher, mut outbound) = ChannelPublisher::new();
    let mut manager = BridgeManager::new(&config, Arc::new(publisher));
    manager.register_services();

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
    };

    run(
        &config,
        &mut manager,
        &mut outbound,
        BufReader::new(tokio::io::stdin()),
        &mut tokio::io::stdout(),
        shutdown,
    )
    .await;

    info!("Hummingbot bridge stopped");
    Ok(())
}

/// Pump input lines into the manager until EOF, a write failure or shutdown.
/// The manager is always shut down before returning.
async fn run<R, W, S>(
    config: &BridgeConfig,
    manager: &mut BridgeManager,
    outbound: &mut UnboundedReceiver<OutboundMessage>,
    input: R,
    out: &mut W,
    shutdown: S,
) where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let mut lines = input.lines();

    // Picks up watchdog changes between messages
    let mut flush_interval = interval(HEALTH_CHECK_PERIOD);
    tokio::pin!(shutdown);

    loop {
        let written = tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    handle_line(config, manager, &line).await;
                    Ok(())
                }
                Ok(None) => {
                    info!("Input closed");
                    break;
                }
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            },
            Some(message) = outbound.recv() => write_message(out, &message).await,
            _ = flush_interval.tick() => Ok(()),
            _ = &mut shutdown => break,
        };

        let flushed = match written {
            Ok(()) => flush_states(config, manager, out).await,
            Err(e) => Err(e),
        };
        if let Err(e) = flushed {
            error!("Failed to write output: {:#}", e);
            break;
        }
    }

    manager.shutdown();

    while let Ok(message) = outbound.try_recv() {
        if let Err(e) = write_message(out, &message).await {
            error!("Failed to write output: {:#}", e);
            break;
        }
    }
}

async fn flush_states<W: AsyncWrite + Unpin>(
    config: &BridgeConfig,
    manager: &BridgeManager,
    out: &mut W,
) -> anyhow::Result<()> {
    for snapshot in manager.flush_entities().await {
        let message = host::state_message(&config.state_prefix, &snapshot);
        write_message(out, &message).await?;
    }
    Ok(())
}

async fn handle_line(config: &BridgeConfig, manager: &mut BridgeManager, line: &str) {
    let Some((topic, payload)) = host::split_line(line) else {
        return;
    };

    let action = match HostAction::parse(&config.control_prefix, topic, payload) {
        Ok(action) => action,
        Err(e) => {
            warn!("Ignoring host action: {}", e);
            return;
        }
    };

    if let Err(e) = action.dispatch(manager).await {
        warn!("Dropped {}: {}", topic, e);
    }
}

async fn write_message<W: AsyncWrite + Unpin>(out: &mut W, message: &OutboundMessage) -> anyhow::Result<()> {
    out.write_all(host::format_line(message).as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}
