use std::sync::Arc;

use tracing::{error, info};

use crate::config::{ConfigError, EmailConfig};
use crate::watch_types::CheckResult;

/// Errors raised while delivering a notification
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// Message could not be built
    #[error("Email error: {0}")]
    Email(String),
    /// Sender or recipient address is malformed
    #[error("Invalid address: {0}")]
    Address(String),
    /// Delivery failed
    #[error("Transport error: {0}")]
    Transport(String),
    /// Notifier is missing configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Sends a notification about a check result. Failures are returned, not swallowed.
#[async_trait::async_trait]
pub trait NotificationService: Send + Sync {
    /// Notify about `result`
    async fn send_result_notification(&self, result: &CheckResult) -> Result<(), NotificationError>;
}

/// Trait for email service implementations
#[async_trait::async_trait]
pub trait EmailService: Send + Sync {
    /// Sends a plain-text email and returns the transport's message reference
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<String, NotificationError>;
}

/// Notification service that emails every result it is given
pub struct EmailNotificationService {
    email_service: Arc<dyn EmailService>,
    settings: EmailConfig,
}

impl EmailNotificationService {
    /// Creates a notifier sending through `email_service` to `settings.to`
    pub fn new(email_service: Arc<dyn EmailService>, settings: EmailConfig) -> Self {
        Self {
            email_service,
            settings,
        }
    }
}

#[async_trait::async_trait]
impl NotificationService for EmailNotificationService {
    async fn send_result_notification(&self, result: &CheckResult) -> Result<(), NotificationError> {
        let (subject, body) = create_notification_content(result, self.settings.max_slots_in_email);

        match self
            .email_service
            .send_email(&self.settings.to, &subject, &body)
            .await
        {
            Ok(reference) => {
                info!(
                    "Email sent to {} for {} result ({})",
                    self.settings.to, result.status, reference
                );
                Ok(())
            }
            Err(e) => {
                error!("Failed to send email to {}: {}", self.settings.to, e);
                Err(e)
            }
        }
    }
}

/// Builds the subject and plain-text body for a result
pub fn create_notification_content(result: &CheckResult, max_slots: usize) -> (String, String) {
    let subject = format!(
        "[Appointment Watcher] Appointments {}",
        result.status.as_str().to_uppercase()
    );

    let mut lines = vec![
        format!("Status: {}", result.status),
        format!("Checked at: {}", result.checked_at.to_rfc3339()),
        format!("URL: {}", result.url().unwrap_or("-")),
        String::new(),
        "Evidence:".to_string(),
    ];

    for (key, value) in result.evidence.iter().filter(|(key, _)| key.as_str() != "url") {
        let rendered = match value.as_str() {
            Some(text) => text.to_string(),
            None => value.to_string(),
        };
        lines.push(format!("- {}: {}", key, rendered));
    }

    if !result.slots.is_empty() {
        lines.push(String::new());
        lines.push("Slots:".to_string());
        for slot in result.slots.iter().take(max_slots) {
            lines.push(format!("- {} {}", slot.date, slot.time));
        }
        if result.slots.len() > max_slots {
            lines.push(format!("(+{} more)", result.slots.len() - max_slots));
        }
    }

    (subject, lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch_types::{CheckStatus, Evidence, Slot};
    use chrono::{TimeZone, Utc};
    use tokio::sync::Mutex;

    struct RecordingEmailService {
        sent: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait::async_trait]
    impl EmailService for RecordingEmailService {
        async fn send_email(
            &self,
            to: &str,
            subject: &str,
            body: &str,
        ) -> Result<String, NotificationError> {
            self.sent
                .lock()
                .await
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok("250".to_string())
        }
    }

    struct FailingEmailService;

    #[async_trait::async_trait]
    impl EmailService for FailingEmailService {
        async fn send_email(
            &self,
            _to: &str,
            _subject: &str,
            _body: &str,
        ) -> Result<String, NotificationError> {
            Err(NotificationError::Transport("connection refused".to_string()))
        }
    }

    fn available_result() -> CheckResult {
        let mut evidence = Evidence::new();
        evidence.insert("url".to_string(), "http://example.com".into());
        evidence.insert("slot_time_count".to_string(), 3_u64.into());
        CheckResult::new(
            CheckStatus::Available,
            vec![
                Slot::new("2024-10-01", "09:30"),
                Slot::new("2024-10-01", "10:15"),
                Slot::new("2024-10-01", "11:00"),
            ],
            Utc.with_ymd_and_hms(2024, 9, 30, 8, 0, 0).unwrap(),
            evidence,
        )
    }

    #[test]
    fn test_notification_content() {
        let (subject, body) = create_notification_content(&available_result(), 2);

        assert_eq!(subject, "[Appointment Watcher] Appointments AVAILABLE");
        assert!(body.contains("Status: available"));
        assert!(body.contains("URL: http://example.com"));
        assert!(body.contains("- slot_time_count: 3"));
        assert!(!body.contains("- url:"));
        assert!(body.contains("- 2024-10-01 09:30"));
        assert!(body.contains("- 2024-10-01 10:15"));
        assert!(!body.contains("- 2024-10-01 11:00"));
        assert!(body.contains("(+1 more)"));
    }

    #[tokio::test]
    async fn test_sends_to_configured_recipient() {
        let email_service = Arc::new(RecordingEmailService {
            sent: Mutex::new(Vec::new()),
        });
        let mut settings = EmailConfig::default();
        settings.to = "me@example.org".to_string();
        let notifier = EmailNotificationService::new(email_service.clone(), settings);

        notifier
            .send_result_notification(&available_result())
            .await
            .unwrap();

        let sent = email_service.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "me@example.org");
        assert_eq!(sent[0].1, "[Appointment Watcher] Appointments AVAILABLE");
    }

    #[tokio::test]
    async fn test_failure_is_returned() {
        let notifier =
            EmailNotificationService::new(Arc::new(FailingEmailService), EmailConfig::default());

        let err = notifier
            .send_result_notification(&available_result())
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::Transport(_)));
    }
}
