//! Notification mail delivery.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::core::config::EmailConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address '{0}'")]
    Address(String),
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("SMTP delivery failed: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingMail {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;

    fn name(&self) -> &'static str;
}

pub fn welcome_mail(email: &str) -> OutgoingMail {
    OutgoingMail::new(
        email,
        "Welcome to the app",
        "Hi,\n\nThanks for signing up. We're glad to have you onboard!",
    )
}

pub fn assignment_mail(moderator_email: &str, ticket_title: &str) -> OutgoingMail {
    OutgoingMail::new(
        moderator_email,
        "Ticket Assigned",
        format!("A new ticket is assigned to you: {ticket_title}"),
    )
}

/// Writes mails to the log instead of delivering them.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        info!(
            "Mail (not delivered, no SMTP configured) to={} subject={:?}",
            mail.to, mail.subject
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[cfg(feature = "mail")]
pub use smtp::SmtpMailer;

#[cfg(feature = "mail")]
mod smtp {
    use super::*;
    use lettre::{
        message::Mailbox, transport::smtp::authentication::Credentials, Message, SmtpTransport,
        Transport,
    };

    pub struct SmtpMailer {
        transport: SmtpTransport,
        from: Mailbox,
    }

    impl SmtpMailer {
        pub fn new(config: &EmailConfig) -> Result<Self, MailError> {
            let from: Mailbox = config
                .from
                .parse()
                .map_err(|_| MailError::Address(config.from.clone()))?;

            let mut builder = if config.starttls {
                SmtpTransport::starttls_relay(&config.smtp_host)
                    .map_err(|e| MailError::Transport(format!("Failed to create SMTP transport: {e}")))?
            } else {
                SmtpTransport::builder_dangerous(&config.smtp_host)
            };
            builder = builder.port(config.smtp_port);
            if let (Some(user), Some(pass)) = (&config.username, &config.password) {
                builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
            }

            Ok(Self {
                transport: builder.build(),
                from,
            })
        }
    }

    #[async_trait]
    impl Mailer for SmtpMailer {
        async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
            let to: Mailbox = mail
                .to
                .parse()
                .map_err(|_| MailError::Address(mail.to.clone()))?;
            let message = Message::builder()
                .from(self.from.clone())
                .to(to)
                .subject(mail.subject.clone())
                .body(mail.body)
                .map_err(|e| MailError::Build(e.to_string()))?;

            let transport = self.transport.clone();
            tokio::task::spawn_blocking(move || transport.send(&message))
                .await
                .map_err(|e| MailError::Transport(e.to_string()))?
                .map_err(|e| MailError::Transport(e.to_string()))?;

            info!("Mail sent to={} subject={:?}", mail.to, mail.subject);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "smtp"
        }
    }
}

/// SMTP when configured (and the `mail` feature is on), otherwise [`LogMailer`].
pub fn create_mailer(config: Option<&EmailConfig>) -> Arc<dyn Mailer> {
    let Some(config) = config else {
        info!("SMTP not configured, notification mails will only be logged");
        return Arc::new(LogMailer);
    };

    #[cfg(feature = "mail")]
    {
        match SmtpMailer::new(config) {
            Ok(mailer) => {
                info!("SMTP mailer ready host={}:{}", config.smtp_host, config.smtp_port);
                return Arc::new(mailer);
            }
            Err(e) => warn!("SMTP mailer unavailable, falling back to log-only: {e}"),
        }
    }

    #[cfg(not(feature = "mail"))]
    {
        warn!(
            "SMTP configured for {} but built without the mail feature",
            config.smtp_host
        );
    }

    Arc::new(LogMailer)
}
