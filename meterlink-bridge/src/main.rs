//! meterlink bridge node.
//!
//! Polls an upstream meter, answers a downstream panel and relays telemetry
//! to a peer node, as configured.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use meterlink_bridge::config::NodeConfig;
use meterlink_bridge::link::{PeerId, ZenohLink};
use meterlink_bridge::scheduler::{NodeIo, Scheduler};
use meterlink_bridge::serial::open_port;
use meterlink_bridge::status::NodeStatus;
use meterlink_common::{LoggingConfig, RelayKeys};
use meterlink_core::SharedStore;

/// Modbus RTU meter bridge with a zenoh relay link.
#[derive(Parser, Debug)]
#[command(name = "meterlink-bridge")]
#[command(about = "Bridges a Modbus RTU meter to a panel, locally or over a relay link")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "meterlink.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = NodeConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    // Initialize logging
    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    meterlink_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    let roles = config.roles();
    info!(node = %config.node.name, roles = ?roles, "Starting meterlink-bridge");
    info!("Loaded configuration from {:?}", args.config);

    let store = SharedStore::new(config.to_store().context("Failed to build register store")?);

    // Open serial lines
    let upstream = match &config.upstream {
        Some(upstream) => Some(
            open_port(&upstream.serial)
                .with_context(|| format!("Failed to open upstream port {}", upstream.serial.port))?,
        ),
        None => None,
    };
    let downstream = match &config.downstream {
        Some(downstream) => Some(open_port(&downstream.serial).with_context(|| {
            format!("Failed to open downstream port {}", downstream.serial.port)
        })?),
        None => None,
    };

    // Connect the relay link
    let mut session = None;
    let mut link_sender = None;
    let mut link_receiver = None;
    let mut status_key = None;

    if let Some(relay) = &config.relay {
        info!("Connecting to Zenoh...");
        let zenoh = Arc::new(
            meterlink_common::connect(&relay.zenoh)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to Zenoh: {}", e))?,
        );

        let keys = RelayKeys::new(relay.key_prefix.clone());
        let node = PeerId::new(relay.node_id.clone()).context("Invalid relay node_id")?;
        status_key = Some(keys.status_key(node.as_str()));

        let link = ZenohLink::new(zenoh.clone(), keys, node);
        if relay.receive {
            link_receiver = Some(
                link.receiver()
                    .await
                    .context("Failed to subscribe to relay inbox")?,
            );
        }
        if relay.send {
            link_sender = Some(link);
        }

        session = Some(zenoh);
    }

    let mut scheduler = Scheduler::new();
    scheduler
        .spawn_node(
            &config,
            &store,
            NodeIo {
                upstream,
                downstream,
                link_sender,
                link_receiver,
            },
        )
        .context("Failed to start node tasks")?;

    info!(tasks = ?scheduler.task_names(), "meterlink-bridge running");

    // Publish node status
    if let (Some(session), Some(key)) = (&session, &status_key) {
        let status = NodeStatus::running(&config.node.name, &roles);
        if let Err(e) = status.publish(session, key).await {
            error!("Failed to publish node status: {}", e);
        }
    }

    // Wait for shutdown signal
    scheduler.run_until_ctrl_c().await;

    if let (Some(session), Some(key)) = (&session, &status_key) {
        let status = NodeStatus::offline(&config.node.name, &roles).with_registers(store.snapshot());
        let _ = status.publish(session, key).await;

        session
            .close()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to close Zenoh session: {}", e))?;
    }

    info!("meterlink-bridge stopped");

    Ok(())
}
