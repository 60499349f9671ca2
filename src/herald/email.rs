use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::TransportError;
use crate::config::SmtpConfig;
use crate::error::{AppError, Result};

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> std::result::Result<(), TransportError>;
}

/// SMTP delivery through lettre's async transport.
pub struct SmtpMailer {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| AppError::Config(format!("invalid smtp.from: {e}")))?;

        let mut builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| AppError::Config(format!("SMTP relay: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        builder = builder.port(config.port);
        if let (Some(user), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Self {
            from,
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> std::result::Result<(), TransportError> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| TransportError::Failed(format!("invalid recipient: {e}")))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())
            .map_err(|e| TransportError::Failed(format!("build email: {e}")))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| TransportError::Failed(format!("SMTP send: {e}")))?;
        Ok(())
    }
}
