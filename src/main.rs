use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

mod config;
mod control_plane;
mod engine;
mod models;
mod notify;
mod query;
mod render;

use crate::config::{MonitorConfig, TargetConfig};
use crate::control_plane::{ControlPlane, HttpControlPlane};
use crate::engine::StatusMonitor;
use crate::models::MonitoredTarget;
use crate::notify::DiscordSink;
use crate::query::UdpQueryClient;

const TOKEN_VAR: &str = "DISCORD_BOT_TOKEN";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into()))
        .with_ansi(true)
        .init();

    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));
    let config = MonitorConfig::load(&config_path)?;
    info!("Configuration loaded from {}", config_path.display());

    let token = std::env::var(TOKEN_VAR)
        .with_context(|| format!("{} is not set", TOKEN_VAR))?;
    let discord_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.discord.request_timeout_secs))
        .build()
        .context("Failed to build Discord HTTP client")?;
    let sink = Arc::new(DiscordSink::new(discord_client, &config.discord.api_base, token));

    let control_plane_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.control_plane_timeout_secs))
        .build()
        .context("Failed to build control plane HTTP client")?;
    let control_plane = Arc::new(HttpControlPlane::new(
        control_plane_client,
        &config.control_plane.endpoint,
    ));
    let query = Arc::new(UdpQueryClient);
    let settings = config.engine_settings();

    let mut monitors = JoinSet::new();
    for target_config in &config.targets {
        let target = match resolve_target(control_plane.as_ref(), target_config).await {
            Ok(target) => target,
            Err(e) => {
                error!(machine = %target_config.machine_id, "Skipping target: {:#}", e);
                continue;
            }
        };
        info!(
            "Adding Minecraft server checking for {}({})",
            target.name, target.machine_id
        );
        let monitor = StatusMonitor::new(
            target,
            settings,
            Arc::clone(&query),
            Arc::clone(&control_plane),
            Arc::clone(&sink),
        );
        monitors.spawn(monitor.run());
    }

    signal::ctrl_c().await?;
    info!("Shutdown signal received. Stopping {} monitors...", monitors.len());
    monitors.shutdown().await;

    Ok(())
}

/// Fills in any address missing from the config from the machine's description.
///
/// Only a missing query address is fatal for the target. A stopped machine has no
/// public IP, so the query address stands in for display.
async fn resolve_target<C: ControlPlane>(
    control_plane: &C,
    config: &TargetConfig,
) -> Result<MonitoredTarget> {
    let (public_address, query_address) = match (&config.public_address, &config.query_address) {
        (Some(public), Some(query)) => (public.clone(), query.clone()),
        (public, query) => {
            let machine = control_plane
                .describe_machine(&config.machine_id)
                .await
                .with_context(|| format!("Failed to describe machine {}", config.machine_id))?;
            info!(
                "Machine {} is {}, public {:?}, private {:?}",
                machine.machine_id, machine.state, machine.public_ip, machine.private_ip
            );
            let query = query
                .clone()
                .or(machine.private_ip)
                .with_context(|| format!("No query address for {}", config.machine_id))?;
            let public = match public.clone().or(machine.public_ip) {
                Some(public) => public,
                None => {
                    warn!(
                        machine = %config.machine_id,
                        "No public address, displaying query address {}", query
                    );
                    query.clone()
                }
            };
            (public, query)
        }
    };

    Ok(MonitoredTarget {
        machine_id: config.machine_id.clone(),
        name: config.name.clone(),
        public_address,
        query_address,
        port: config.port,
        bottom_comment: config.bottom_comment.clone(),
        destination: config.destination(),
    })
}
