use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use crate::config::{EmailConfig, require_env};
use crate::notification_service::{EmailService, NotificationError};

const SEND_ATTEMPTS: u32 = 3;
const FIRST_RETRY_DELAY: Duration = Duration::from_secs(2);
const SMTP_TIMEOUT: Duration = Duration::from_secs(15);

/// SMTP email service
pub struct SmtpEmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailService {
    /// Creates an SMTP email service.
    ///
    /// Credentials are read from the environment variables named in the
    /// config; a missing variable is a configuration error.
    pub fn new(config: &EmailConfig) -> Result<Self, NotificationError> {
        let username = require_env(&config.username_env)?;
        let password = require_env(&config.password_env)?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host).map_err(|e| {
                NotificationError::Transport(format!("Failed to configure SMTP relay: {}", e))
            })?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };

        let transport = builder
            .port(config.smtp_port)
            .credentials(Credentials::new(username, password))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| NotificationError::Address(format!("{}: {}", config.from, e)))?;

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl EmailService for SmtpEmailService {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<String, NotificationError> {
        let recipient = to
            .parse::<Mailbox>()
            .map_err(|e| NotificationError::Address(format!("{}: {}", to, e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| NotificationError::Email(e.to_string()))?;

        let mut delay = FIRST_RETRY_DELAY;
        let mut last_error = String::new();

        for attempt in 1..=SEND_ATTEMPTS {
            match self.transport.send(message.clone()).await {
                Ok(response) => {
                    info!("Email to {} accepted on attempt {}", to, attempt);
                    return Ok(response.code().to_string());
                }
                Err(e) => {
                    warn!("Email attempt {}/{} to {} failed: {}", attempt, SEND_ATTEMPTS, to, e);
                    last_error = e.to_string();
                    if attempt < SEND_ATTEMPTS {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        Err(NotificationError::Transport(format!(
            "Failed to send email after {} attempts: {}",
            SEND_ATTEMPTS, last_error
        )))
    }
}

/// Mock email service for development/testing
pub struct MockEmailService;

#[async_trait]
impl EmailService for MockEmailService {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<String, NotificationError> {
        info!("[MOCK EMAIL] To: {}", to);
        info!("[MOCK EMAIL] Subject: {}", subject);
        info!("[MOCK EMAIL] Body:\n{}", body);

        Ok("mock".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;

    #[test]
    fn test_missing_credentials_are_config_errors() {
        let mut config = EmailConfig::default();
        config.username_env = "APPOINTMENT_SCAN_TEST_NO_SMTP_USER".to_string();
        config.password_env = "APPOINTMENT_SCAN_TEST_NO_SMTP_PASS".to_string();

        let err = SmtpEmailService::new(&config).err().unwrap();
        assert!(matches!(
            err,
            NotificationError::Config(ConfigError::MissingEnv(key)) if key == "APPOINTMENT_SCAN_TEST_NO_SMTP_USER"
        ));
    }

    #[tokio::test]
    async fn test_mock_email_service() {
        let reference = MockEmailService
            .send_email("me@example.com", "subject", "body")
            .await
            .unwrap();
        assert_eq!(reference, "mock");
    }
}
