use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use pgharvest_core::{Credentials, Error, NotifySettings, Result};

use crate::notification::{Notification, Notifier};

/// Sends notifications through an authenticated SMTP relay using STARTTLS.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    recipient: Mailbox,
}

impl SmtpNotifier {
    pub fn from_settings(settings: &NotifySettings, credentials: Option<Credentials>) -> Result<Self> {
        let sender = parse_mailbox(&settings.sender)?;
        let recipient = parse_mailbox(&settings.recipient)?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_host)
            .map_err(|err| Error::Config(format!("smtp relay {}: {err}", settings.smtp_host)))?
            .port(settings.smtp_port);
        match credentials {
            Some(credentials) => {
                builder = builder.credentials(SmtpCredentials::new(
                    credentials.username().to_string(),
                    credentials.password().to_string(),
                ));
            }
            None => {
                tracing::warn!(event = "smtp_unauthenticated", host = %settings.smtp_host);
            }
        }

        Ok(Self {
            transport: builder.build(),
            sender,
            recipient,
        })
    }

    fn message(&self, notification: &Notification) -> Result<Message> {
        let recipient = match &notification.recipient {
            Some(address) => parse_mailbox(address)?,
            None => self.recipient.clone(),
        };
        Message::builder()
            .from(self.sender.clone())
            .to(recipient)
            .subject(notification.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(notification.body.clone())
            .map_err(|err| Error::Notify(err.to_string()))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let message = self.message(notification)?;
        self.transport
            .send(message)
            .await
            .map_err(|err| Error::Notify(err.to_string()))?;
        tracing::info!(event = "notification_sent", subject = %notification.subject);
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse::<Mailbox>()
        .map_err(|err| Error::Config(format!("invalid email address '{address}': {err}")))
}
