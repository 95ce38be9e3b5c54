use std::sync::Arc;

use anyhow::Context;
use appointment_scan::{
    CheckResult, CheckStatus, Checker, EmailNotificationService, EmailService, EndpointChecker,
    Evidence, MockEmailService, NotificationService, PageChecker, SmtpEmailService,
    SystemTimeSource, TimeSource, WatchConfig, WatchExecutor,
};
use log::info;
use watch_store::{MemoryStateStore, StateStore, connect_state_store};

/// Wires the configured checkers, store and notifier into a [`WatchExecutor`].
pub struct WatchManager {
    config: Arc<WatchConfig>,
}

impl WatchManager {
    /// Create a new watch manager
    pub fn new(config: WatchConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Builds an executor. Without `persistent` the state lives in memory and
    /// is dropped with the executor, and notifications are only logged.
    ///
    /// A persistent executor can notify, so missing SMTP credentials fail here
    /// before the store is opened or any check runs.
    pub async fn executor(&self, persistent: bool) -> anyhow::Result<WatchExecutor> {
        let notifier = self.notifier(persistent)?;

        let store: Arc<dyn StateStore> = if persistent {
            connect_state_store(&self.config.storage)
                .await
                .context("Failed to open state store")?
        } else {
            Arc::new(MemoryStateStore::new())
        };

        let clock: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);
        let page_checker: Arc<dyn Checker> =
            Arc::new(PageChecker::new(&self.config)?.with_time_source(clock.clone()));
        let endpoint_checker: Arc<dyn Checker> =
            Arc::new(EndpointChecker::new(&self.config)?.with_time_source(clock.clone()));

        Ok(WatchExecutor::new(
            self.config.clone(),
            store,
            page_checker,
            endpoint_checker,
            notifier,
        )
        .with_time_source(clock))
    }

    fn notifier(&self, deliver: bool) -> anyhow::Result<Arc<dyn NotificationService>> {
        let email_service: Arc<dyn EmailService> = if deliver {
            Arc::new(
                SmtpEmailService::new(&self.config.notify.email)
                    .context("SMTP credentials are required to send notifications")?,
            )
        } else {
            Arc::new(MockEmailService)
        };

        Ok(Arc::new(EmailNotificationService::new(
            email_service,
            self.config.notify.email.clone(),
        )))
    }

    /// Sends a `test` notification through the real SMTP transport
    pub async fn send_test_email(&self) -> anyhow::Result<()> {
        let email_service = SmtpEmailService::new(&self.config.notify.email)
            .context("Failed to set up SMTP for the test email")?;
        let notifier =
            EmailNotificationService::new(Arc::new(email_service), self.config.notify.email.clone());

        notifier
            .send_result_notification(&test_result(&self.config))
            .await
            .context("Failed to send test email")?;

        info!("Sent test email");
        Ok(())
    }
}

fn test_result(config: &WatchConfig) -> CheckResult {
    let mut evidence = Evidence::new();
    evidence.insert("url".to_string(), config.target.url.as_str().into());
    evidence.insert("note".to_string(), "test email".into());

    CheckResult::new(CheckStatus::Test, Vec::new(), SystemTimeSource.now(), evidence)
}
