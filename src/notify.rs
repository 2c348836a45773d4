use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, warn};

use crate::models::Destination;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("channel {0} not found")]
    ChannelNotFound(String),
    #[error("discord returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Pushes rendered status text to a chat destination.
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    /// Edits the message at `destination` in place, posting a new one if the edit fails.
    async fn upsert_message(&self, destination: &Destination, text: &str) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Deserialize)]
struct Channel {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Message {
    id: String,
}

/// Discord REST sink authenticated with a bot token.
pub struct DiscordSink {
    client: Client,
    api_base: String,
    token: String,
    /// One cell per channel id so concurrent misses share a single lookup.
    channels: RwLock<HashMap<String, Arc<OnceCell<Channel>>>>,
    /// Messages posted after an edit failed, keyed by the configured destination.
    replacements: Mutex<HashMap<Destination, String>>,
}

impl DiscordSink {
    pub fn new(client: Client, api_base: &str, token: String) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
            channels: RwLock::new(HashMap::new()),
            replacements: Mutex::new(HashMap::new()),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.api_base, path))
            .header(header::AUTHORIZATION, format!("Bot {}", self.token))
    }

    async fn channel(&self, channel_id: &str) -> Result<Channel, NotifyError> {
        let cached = self.channels.read().await.get(channel_id).cloned();
        let cell = match cached {
            Some(cell) => cell,
            None => self
                .channels
                .write()
                .await
                .entry(channel_id.to_string())
                .or_default()
                .clone(),
        };

        let channel = cell
            .get_or_try_init(|| self.fetch_channel(channel_id))
            .await?;
        Ok(channel.clone())
    }

    async fn fetch_channel(&self, channel_id: &str) -> Result<Channel, NotifyError> {
        let response = self
            .request(Method::GET, &format!("/channels/{}", channel_id))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(NotifyError::ChannelNotFound(channel_id.to_string()));
        }
        let channel: Channel = check(response).await?.json().await?;
        debug!(channel = %channel.id, name = ?channel.name, "resolved discord channel");
        Ok(channel)
    }

    async fn edit(&self, channel_id: &str, message_id: &str, text: &str) -> Result<(), NotifyError> {
        let response = self
            .request(
                Method::PATCH,
                &format!("/channels/{}/messages/{}", channel_id, message_id),
            )
            .json(&serde_json::json!({ "content": text }))
            .send()
            .await?;
        check(response).await.map(|_| ())
    }

    async fn create(&self, channel_id: &str, text: &str) -> Result<Message, NotifyError> {
        let response = self
            .request(Method::POST, &format!("/channels/{}/messages", channel_id))
            .json(&serde_json::json!({ "content": text }))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}

async fn check(response: Response) -> Result<Response, NotifyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error body".to_string());
    Err(NotifyError::Status { status, body })
}

#[async_trait]
impl NotificationSink for DiscordSink {
    async fn upsert_message(&self, destination: &Destination, text: &str) -> Result<(), NotifyError> {
        let channel = self.channel(&destination.channel_id).await?;
        let message_id = self
            .replacements
            .lock()
            .await
            .get(destination)
            .cloned()
            .unwrap_or_else(|| destination.message_id.clone());

        if let Err(e) = self.edit(&channel.id, &message_id, text).await {
            warn!(channel = %channel.id, message = %message_id, error = %e, "Failed to edit message, sending a new one");
            let created = self.create(&channel.id, text).await?;
            debug!(channel = %channel.id, message = %created.id, "posted replacement message");
            self.replacements
                .lock()
                .await
                .insert(destination.clone(), created.id);
        }
        Ok(())
    }
}
