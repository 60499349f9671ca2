use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::TransportError;
use crate::config::TwilioConfig;
use crate::error::Result;

const TWILIO_API_URL: &str = "https://api.twilio.com/2010-04-01";

#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send_sms(&self, to: &str, body: &str) -> std::result::Result<(), TransportError>;
}

pub struct TwilioClient {
    client: Client,
    config: TwilioConfig,
}

impl TwilioClient {
    pub fn new(config: TwilioConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl SmsTransport for TwilioClient {
    async fn send_sms(&self, to: &str, body: &str) -> std::result::Result<(), TransportError> {
        let (Some(sid), Some(token), Some(from)) = (
            &self.config.account_sid,
            &self.config.auth_token,
            &self.config.from_number,
        ) else {
            return Err(TransportError::Failed("Twilio is not configured".into()));
        };

        let resp = self
            .client
            .post(format!("{TWILIO_API_URL}/Accounts/{sid}/Messages.json"))
            .basic_auth(sid, Some(token))
            .form(&[("To", to), ("From", from.as_str()), ("Body", body)])
            .send()
            .await
            .map_err(|e| TransportError::Failed(format!("Twilio send failed: {e}")))?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED => Err(TransportError::Auth("Twilio rejected credentials".into())),
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(TransportError::Failed(format!("Twilio API error {status}: {body}")))
            }
        }
    }
}
