//! Delivery of a batch of stories to one subscriber.
//!
//! Email gets a single rendered digest. Slack, Discord and SMS get one
//! message per story, sent in story order; the first failure stops the
//! remaining messages for that subscriber only.

mod digest;
mod discord;
mod email;
mod slack;
mod sms;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::db::{Repository, Scope};
use crate::error::{AppError, Result};
use crate::models::{Channel, ChannelKind, DiscordConfig, EmailConfig, PhoneConfig, SlackConfig, Story};

pub use digest::{permalink, Digest};
pub use discord::{DiscordClient, DiscordTransport};
pub use email::{MailTransport, SmtpMailer};
pub use slack::{SlackClient, SlackTransport};
pub use sms::{SmsTransport, TwilioClient};

/// Failure reported by a transport. `Auth` means the stored credential was
/// rejected; everything else is worth retrying later.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("channel {0} not found")]
    ChannelNotFound(i64),

    #[error("channel {0} has been removed")]
    ChannelDeleted(i64),

    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error("unsupported channel type '{0}'")]
    UnsupportedChannel(String),

    #[error("channel {channel_id} has invalid config: {reason}")]
    InvalidConfig { channel_id: i64, reason: String },

    #[error("channel {0} is not verified")]
    Unverified(i64),

    #[error("{kind} needs to be reconnected: {reason}")]
    ReconnectRequired { kind: ChannelKind, reason: String },

    #[error("{kind} delivery failed: {reason}")]
    Transport { kind: ChannelKind, reason: String },

    #[error(transparent)]
    Store(#[from] AppError),
}

impl DeliveryError {
    /// The user has to re-authorize the channel; retrying will not help.
    pub fn is_reconnect_required(&self) -> bool {
        matches!(self, DeliveryError::ReconnectRequired { .. })
    }

    fn from_transport(kind: ChannelKind, err: TransportError) -> Self {
        match (kind, err) {
            (ChannelKind::Slack | ChannelKind::Discord, TransportError::Auth(reason)) => {
                DeliveryError::ReconnectRequired { kind, reason }
            }
            (_, TransportError::Auth(reason) | TransportError::Failed(reason)) => {
                DeliveryError::Transport { kind, reason }
            }
        }
    }
}

/// Destination of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRef {
    /// The subscriber's account email.
    Default,
    Channel(i64),
}

impl From<Option<i64>> for ChannelRef {
    fn from(channel_id: Option<i64>) -> Self {
        channel_id.map_or(ChannelRef::Default, ChannelRef::Channel)
    }
}

/// Per-delivery details shared by all subscribers of an alert run.
#[derive(Debug, Clone)]
pub struct DeliveryContext {
    pub user_id: i64,
    pub cadence: String,
    pub readers: usize,
    pub base_url: String,
}

#[derive(Clone)]
pub struct Transports {
    pub mail: Arc<dyn MailTransport>,
    pub slack: Arc<dyn SlackTransport>,
    pub discord: Arc<dyn DiscordTransport>,
    pub sms: Arc<dyn SmsTransport>,
}

pub struct Herald {
    repository: Repository,
    transports: Transports,
    digest: Digest,
}

impl Herald {
    pub fn new(repository: Repository, transports: Transports) -> Result<Self> {
        Ok(Self {
            repository,
            transports,
            digest: Digest::new()?,
        })
    }

    pub async fn deliver(
        &self,
        channel: ChannelRef,
        alert_name: &str,
        stories: &[Story],
        ctx: &DeliveryContext,
    ) -> std::result::Result<(), DeliveryError> {
        if stories.is_empty() {
            return Ok(());
        }

        let channel_id = match channel {
            ChannelRef::Default => {
                let email = self
                    .repository
                    .get_user_email(ctx.user_id)
                    .await?
                    .ok_or(DeliveryError::UserNotFound(ctx.user_id))?;
                return self.send_digest(&email, alert_name, stories, ctx).await;
            }
            ChannelRef::Channel(id) => id,
        };

        let channel = self
            .repository
            .get_channel(channel_id, Scope::IncludeDeleted)
            .await?
            .ok_or(DeliveryError::ChannelNotFound(channel_id))?;
        if channel.deleted_at.is_some() {
            return Err(DeliveryError::ChannelDeleted(channel_id));
        }

        let kind = channel.kind().map_err(DeliveryError::UnsupportedChannel)?;
        match kind {
            ChannelKind::Email => {
                let config: EmailConfig = channel_config(&channel)?;
                self.send_digest(&config.address, alert_name, stories, ctx).await
            }
            ChannelKind::Slack => {
                let config: SlackConfig = channel_config(&channel)?;
                for story in stories {
                    let link = permalink(&ctx.base_url, story);
                    self.transports
                        .slack
                        .post_message(&config, &link)
                        .await
                        .map_err(|e| DeliveryError::from_transport(kind, e))?;
                }
                Ok(())
            }
            ChannelKind::Discord => {
                let config: DiscordConfig = channel_config(&channel)?;
                for story in stories {
                    let link = permalink(&ctx.base_url, story);
                    self.transports
                        .discord
                        .post_message(&config, &link)
                        .await
                        .map_err(|e| DeliveryError::from_transport(kind, e))?;
                }
                Ok(())
            }
            ChannelKind::Phone => {
                if !channel.verified {
                    return Err(DeliveryError::Unverified(channel.id));
                }
                let config: PhoneConfig = channel_config(&channel)?;
                for story in stories {
                    let body = format!("{}: {}\n{}", alert_name, story.title, permalink(&ctx.base_url, story));
                    self.transports
                        .sms
                        .send_sms(&config.number, &body)
                        .await
                        .map_err(|e| DeliveryError::from_transport(kind, e))?;
                }
                Ok(())
            }
        }
    }

    async fn send_digest(
        &self,
        to: &str,
        alert_name: &str,
        stories: &[Story],
        ctx: &DeliveryContext,
    ) -> std::result::Result<(), DeliveryError> {
        let html = self
            .digest
            .render(alert_name, &ctx.cadence, ctx.readers, stories, &ctx.base_url)?;
        let subject = match stories.len() {
            1 => format!("{alert_name}: 1 new story"),
            n => format!("{alert_name}: {n} new stories"),
        };
        self.transports
            .mail
            .send(to, &subject, &html)
            .await
            .map_err(|e| DeliveryError::from_transport(ChannelKind::Email, e))
    }
}

fn channel_config<T: DeserializeOwned>(channel: &Channel) -> std::result::Result<T, DeliveryError> {
    channel.config().map_err(|e| DeliveryError::InvalidConfig {
        channel_id: channel.id,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_on_token_channels_need_reconnect() {
        let err = DeliveryError::from_transport(ChannelKind::Slack, TransportError::Auth("token_revoked".into()));
        assert!(err.is_reconnect_required());

        let err = DeliveryError::from_transport(ChannelKind::Discord, TransportError::Auth("401".into()));
        assert!(err.is_reconnect_required());

        let err = DeliveryError::from_transport(ChannelKind::Slack, TransportError::Failed("ratelimited".into()));
        assert!(!err.is_reconnect_required());
    }

    #[test]
    fn smtp_auth_failure_is_a_plain_transport_error() {
        let err = DeliveryError::from_transport(ChannelKind::Email, TransportError::Auth("535".into()));
        assert!(matches!(err, DeliveryError::Transport { kind: ChannelKind::Email, .. }));
    }

    #[test]
    fn null_channel_means_default() {
        assert_eq!(ChannelRef::from(None), ChannelRef::Default);
        assert_eq!(ChannelRef::from(Some(4)), ChannelRef::Channel(4));
    }
}
