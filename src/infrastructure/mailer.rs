//! Envoi des emails: SMTP via lettre, ou simple log en développement

use async_trait::async_trait;
use tracing::info;

use crate::utils::error::Result;

/// Email multipart (texte + HTML)
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
    pub from: String,
    pub to: Vec<String>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Implémentation pour les logs (développement)
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to = %message.to.join(", "),
            subject = %message.subject,
            "📧 [EMAIL]\n{}",
            message.text_body
        );
        Ok(())
    }
}

#[cfg(feature = "email")]
pub use smtp::SmtpMailer;

#[cfg(feature = "email")]
mod smtp {
    use super::*;
    use crate::utils::config::Config;
    use crate::utils::error::AppError;
    use lettre::{
        message::{Mailbox, MultiPart},
        transport::smtp::authentication::Credentials,
        AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    };

    fn mailbox(address: &str) -> Result<Mailbox> {
        address
            .parse()
            .map_err(|e: lettre::address::AddressError| AppError::Email(format!("{}: {}", address, e)))
    }

    /// Envoi SMTP (STARTTLS, TLS implicite sur le port 465, ou clair)
    pub struct SmtpMailer {
        transport: AsyncSmtpTransport<Tokio1Executor>,
    }

    impl SmtpMailer {
        pub fn new(
            host: &str,
            port: Option<u16>,
            tls: bool,
            username: Option<String>,
            password: Option<String>,
        ) -> Result<Self> {
            let port = port.unwrap_or(587);

            let mut builder = if port == 465 {
                AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                    .map_err(|e| AppError::Email(e.to_string()))?
                    .port(port)
            } else if tls {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                    .map_err(|e| AppError::Email(e.to_string()))?
                    .port(port)
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(port)
            };

            if let (Some(username), Some(password)) = (username, password) {
                builder = builder.credentials(Credentials::new(username, password));
            }

            Ok(Self {
                transport: builder.build(),
            })
        }

        pub fn from_config(config: &Config) -> Result<Self> {
            let host = config
                .smtp_host
                .as_deref()
                .ok_or_else(|| AppError::Configuration("SMTP_HOST is not set".to_string()))?;
            Self::new(
                host,
                config.smtp_port,
                config.smtp_tls,
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            )
        }

        pub(super) fn build(message: &EmailMessage) -> Result<Message> {
            let mut builder = Message::builder().from(mailbox(&message.from)?);
            for recipient in &message.to {
                builder = builder.to(mailbox(recipient)?);
            }

            builder
                .subject(message.subject.clone())
                .multipart(MultiPart::alternative_plain_html(
                    message.text_body.clone(),
                    message.html_body.clone(),
                ))
                .map_err(|e| AppError::Email(e.to_string()))
        }
    }

    #[async_trait]
    impl Mailer for SmtpMailer {
        async fn send(&self, message: &EmailMessage) -> Result<()> {
            let email = Self::build(message)?;
            self.transport
                .send(email)
                .await
                .map_err(|e| AppError::Email(e.to_string()))?;

            info!(
                subject = %message.subject,
                recipients = message.to.len(),
                "📧 Email envoyé"
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(to: &str) -> EmailMessage {
        EmailMessage {
            subject: "Your EventKit DataPack is set to expire.".into(),
            text_body: "text".into(),
            html_body: "<p>html</p>".into(),
            from: "Eventkit Team <eventkit.team@gmail.com>".into(),
            to: vec![to.into()],
        }
    }

    #[tokio::test]
    async fn test_log_mailer_accepts_everything() {
        assert!(LogMailer.send(&message("demo@demo.com")).await.is_ok());
    }

    #[cfg(feature = "email")]
    #[test]
    fn test_smtp_message_building() {
        use crate::utils::error::AppError;

        assert!(SmtpMailer::build(&message("demo@demo.com")).is_ok());
        assert!(matches!(
            SmtpMailer::build(&message("not an address")),
            Err(AppError::Email(_))
        ));
    }
}
