use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::TransportError;
use crate::error::Result;
use crate::models::SlackConfig;

const SLACK_API_URL: &str = "https://slack.com/api";

/// Slack error codes that only a fresh OAuth grant can fix.
const AUTH_ERRORS: &[&str] = &[
    "invalid_auth",
    "not_authed",
    "token_revoked",
    "token_expired",
    "account_inactive",
    "missing_scope",
];

#[async_trait]
pub trait SlackTransport: Send + Sync {
    async fn post_message(&self, config: &SlackConfig, text: &str) -> std::result::Result<(), TransportError>;
}

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct SlackClient {
    client: Client,
    api_url: String,
}

impl SlackClient {
    pub fn new() -> Result<Self> {
        Self::with_api_url(SLACK_API_URL)
    }

    pub fn with_api_url(api_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Map a Slack `error` code to auth-class or transient.
pub(crate) fn classify(code: &str) -> TransportError {
    if AUTH_ERRORS.contains(&code) {
        TransportError::Auth(code.to_string())
    } else {
        TransportError::Failed(code.to_string())
    }
}

#[async_trait]
impl SlackTransport for SlackClient {
    async fn post_message(&self, config: &SlackConfig, text: &str) -> std::result::Result<(), TransportError> {
        let resp = self
            .client
            .post(format!("{}/chat.postMessage", self.api_url))
            .bearer_auth(&config.access_token)
            .json(&serde_json::json!({
                "channel": config.channel_id,
                "text": text,
                "unfurl_links": true,
            }))
            .send()
            .await
            .map_err(|e| TransportError::Failed(format!("Slack send failed: {e}")))?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(TransportError::Auth("HTTP 401".into()));
        }
        if !resp.status().is_success() {
            return Err(TransportError::Failed(format!("Slack API HTTP {}", resp.status())));
        }

        let body: SlackResponse = resp
            .json()
            .await
            .map_err(|e| TransportError::Failed(format!("Slack response: {e}")))?;
        if body.ok {
            Ok(())
        } else {
            Err(classify(body.error.as_deref().unwrap_or("unknown_error")))
        }
    }
}
