use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::TransportError;
use crate::error::Result;
use crate::models::DiscordConfig;

const DISCORD_API_URL: &str = "https://discord.com/api/v10";

#[async_trait]
pub trait DiscordTransport: Send + Sync {
    async fn post_message(&self, config: &DiscordConfig, text: &str) -> std::result::Result<(), TransportError>;
}

/// Posts as a bot into a channel the user connected.
pub struct DiscordClient {
    client: Client,
    api_url: String,
    default_token: Option<String>,
}

impl DiscordClient {
    pub fn new(default_token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_url: DISCORD_API_URL.to_string(),
            default_token,
        })
    }
}

#[async_trait]
impl DiscordTransport for DiscordClient {
    async fn post_message(&self, config: &DiscordConfig, text: &str) -> std::result::Result<(), TransportError> {
        let token = config
            .access_token
            .as_ref()
            .or(self.default_token.as_ref())
            .ok_or_else(|| TransportError::Auth("no bot token for channel".into()))?;

        let resp = self
            .client
            .post(format!("{}/channels/{}/messages", self.api_url, config.channel_id))
            .header("Authorization", format!("Bot {token}"))
            .json(&serde_json::json!({ "content": text }))
            .send()
            .await
            .map_err(|e| TransportError::Failed(format!("Discord send failed: {e}")))?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(TransportError::Auth(format!("Discord API {}", resp.status())))
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(TransportError::Failed(format!("Discord API error {status}: {body}")))
            }
        }
    }
}
