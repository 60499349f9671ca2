//! Post-cycle credential upkeep.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::config::SlackAppConfig;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{ChannelKind, SlackConfig};

const SLACK_OAUTH_URL: &str = "https://slack.com/api/oauth.v2.access";

#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    /// Refresh credentials that are about to expire, returning how many were
    /// rewritten.
    async fn refresh(&self) -> Result<usize>;
}

#[derive(Debug, Deserialize)]
struct OAuthResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Exchanges Slack refresh tokens for channels whose access token expires
/// within the configured window.
pub struct SlackTokenRefresher {
    client: Client,
    repository: Repository,
    client_id: String,
    client_secret: String,
    window: chrono::Duration,
}

impl SlackTokenRefresher {
    /// `None` when the Slack app credentials are not configured.
    pub fn from_config(repository: Repository, config: &SlackAppConfig) -> Result<Option<Self>> {
        let (Some(client_id), Some(client_secret)) = (&config.client_id, &config.client_secret) else {
            return Ok(None);
        };
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Some(Self {
            client,
            repository,
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
            window: chrono::Duration::minutes(config.refresh_window_minutes),
        }))
    }

    async fn exchange(&self, refresh_token: &str) -> Result<OAuthResponse> {
        let resp = self
            .client
            .post(SLACK_OAUTH_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(AppError::provider("slack", format!("oauth HTTP {}", resp.status())));
        }
        let body: OAuthResponse = resp.json().await?;
        if !body.ok {
            let code = body.error.unwrap_or_else(|| "unknown_error".into());
            return Err(AppError::provider("slack", code));
        }
        Ok(body)
    }
}

/// Whether a token expiring at `expires_at` should be refreshed at `now`.
pub fn needs_refresh(
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window: chrono::Duration,
) -> bool {
    expires_at.is_some_and(|at| at <= now + window)
}

#[async_trait]
impl CredentialRefresher for SlackTokenRefresher {
    async fn refresh(&self) -> Result<usize> {
        let now = Utc::now();
        let channels = self
            .repository
            .channels_of_kind(ChannelKind::Slack.as_str())
            .await?;

        let mut refreshed = 0;
        for channel in channels {
            let mut config: SlackConfig = match channel.config() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(channel_id = channel.id, error = %e, "skipping slack channel with bad config");
                    continue;
                }
            };
            if !needs_refresh(config.expires_at, now, self.window) {
                continue;
            }
            let Some(refresh_token) = config.refresh_token.clone() else {
                continue;
            };

            let grant = match self.exchange(&refresh_token).await {
                Ok(grant) => grant,
                Err(e) => {
                    tracing::warn!(channel_id = channel.id, error = %e, "slack token refresh failed");
                    continue;
                }
            };

            if let Some(token) = grant.access_token {
                config.access_token = token;
            }
            if grant.refresh_token.is_some() {
                config.refresh_token = grant.refresh_token;
            }
            config.expires_at = grant.expires_in.map(|secs| now + chrono::Duration::seconds(secs));

            self.repository
                .update_channel_config(channel.id, serde_json::to_value(&config)?)
                .await?;
            tracing::debug!(channel_id = channel.id, "slack token refreshed");
            refreshed += 1;
        }
        Ok(refreshed)
    }
}
