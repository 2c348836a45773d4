use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::engine::EngineSettings;
use crate::models::{Destination, DEFAULT_QUERY_PORT};
use crate::notify::DEFAULT_API_BASE;
use crate::render::RenderOptions;

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    pub targets: Vec<TargetConfig>,
    pub control_plane: ControlPlaneConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub render: RenderOptions,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_control_plane_timeout")]
    pub control_plane_timeout_secs: u64,
}

fn default_poll_interval() -> u64 { 30 }
fn default_query_timeout() -> u64 { 10 }
fn default_control_plane_timeout() -> u64 { 10 }

#[derive(Debug, Deserialize, Clone)]
pub struct ControlPlaneConfig {
    pub endpoint: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscordConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_api_base() -> String { DEFAULT_API_BASE.to_string() }
fn default_request_timeout() -> u64 { 15 }

#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    pub machine_id: String,
    #[serde(default = "default_name")]
    pub name: String,
    /// Looked up from the control plane when absent.
    pub public_address: Option<String>,
    /// Looked up from the control plane when absent.
    pub query_address: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub bottom_comment: String,
    pub channel_id: String,
    pub message_id: String,
}

fn default_name() -> String { "Minecraft".into() }
fn default_port() -> u16 { DEFAULT_QUERY_PORT }

impl TargetConfig {
    pub fn destination(&self) -> Destination {
        Destination {
            channel_id: self.channel_id.clone(),
            message_id: self.message_id.clone(),
        }
    }
}

impl MonitorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: MonitorConfig = serde_json::from_str(content)?;
        anyhow::ensure!(config.poll_interval_secs > 0, "poll_interval_secs must be positive");
        anyhow::ensure!(config.query_timeout_secs > 0, "query_timeout_secs must be positive");
        Ok(config)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            query_timeout: Duration::from_secs(self.query_timeout_secs),
            control_plane_timeout: Duration::from_secs(self.control_plane_timeout_secs),
            render: self.render,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{ShutdownNotice, VersionSource};

    #[test]
    fn minimal_config_uses_defaults() {
        let config = MonitorConfig::parse(
            r#"{
                "control_plane": { "endpoint": "http://127.0.0.1:8080" },
                "targets": [
                    { "machine_id": "i-0abc", "channel_id": "100", "message_id": "200" }
                ]
            }"#,
        )
        .unwrap();

        let settings = config.engine_settings();
        assert_eq!(settings.poll_interval, Duration::from_secs(30));
        assert_eq!(settings.query_timeout, Duration::from_secs(10));
        assert_eq!(settings.render, RenderOptions::default());
        assert_eq!(config.discord.api_base, DEFAULT_API_BASE);

        let target = &config.targets[0];
        assert_eq!(target.name, "Minecraft");
        assert_eq!(target.port, 25565);
        assert_eq!(target.bottom_comment, "");
        assert!(target.query_address.is_none());
        assert_eq!(target.destination().message_id, "200");
    }

    #[test]
    fn render_options_are_read() {
        let config = MonitorConfig::parse(
            r#"{
                "control_plane": { "endpoint": "http://cp" },
                "render": { "version_source": "reported_version", "shutdown_notice": "when_occupied" },
                "targets": []
            }"#,
        )
        .unwrap();

        assert_eq!(config.render.version_source, VersionSource::ReportedVersion);
        assert_eq!(config.render.shutdown_notice, ShutdownNotice::WhenOccupied);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = MonitorConfig::parse(
            r#"{ "control_plane": { "endpoint": "http://cp" }, "targets": [], "poll_interval_secs": 0 }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("poll_interval_secs"));
    }
}
