use anyhow::{Result, anyhow};
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as Email, Tokio1Executor};
use tracing::info;

use super::{SendResult, Sender};
use crate::core::config::SmtpConfig;

/// Channel config: `{"email": "a@b.c", "subject": "optional"}`. Uses STARTTLS.
pub struct EmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    default_subject: String,
}

impl EmailSender {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let host = config
            .host
            .as_deref()
            .ok_or_else(|| anyhow!("smtp.host is not set"))?;
        let user = config
            .user
            .as_deref()
            .ok_or_else(|| anyhow!("smtp.user is not set"))?;

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?.port(config.port);
        if let Some(password) = &config.password {
            builder = builder.credentials(Credentials::new(user.to_string(), password.clone()));
        }
        let from: Mailbox = format!("{} <{}>", config.from_name, user).parse()?;
        info!("Email sender ready via {}:{}", host, config.port);

        Ok(Self {
            transport: builder.build(),
            from,
            default_subject: format!("{} Notification", config.from_name),
        })
    }

    fn build_email(&self, config: &serde_json::Value, content: &str) -> Result<Email> {
        let to: Mailbox = config
            .get("email")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("email channel has no address"))?
            .parse()?;
        let subject = config
            .get("subject")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.default_subject);

        Ok(Email::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(content.to_string())?)
    }
}

#[async_trait]
impl Sender for EmailSender {
    fn kind(&self) -> &str {
        "email"
    }

    async fn send(&self, config: &serde_json::Value, content: &str) -> SendResult {
        let email = match self.build_email(config, content) {
            Ok(email) => email,
            Err(e) => return SendResult::failed(e.to_string()),
        };
        match self.transport.send(email).await {
            Ok(_) => SendResult::ok(),
            Err(e) => SendResult::failed(format!("smtp: {}", e)),
        }
    }
}
