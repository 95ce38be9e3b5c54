use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use watch_store::{CheckLogEntry, StateStore};

use crate::checker::Checker;
use crate::config::{CheckMode, WatchConfig};
use crate::hashing::{hash_result, stable_json};
use crate::notification_service::NotificationService;
use crate::time_source::{SystemTimeSource, TimeSource};
use crate::watch_types::*;

/// A check that has been logged and run through the state machine
#[derive(Debug, Clone)]
pub struct RecordedCheck {
    /// The normalized result
    pub result: CheckResult,
    /// Hash of `{status, slots, evidence}`
    pub result_hash: String,
    /// Whether a notification was attempted for this check
    pub notified: bool,
}

/// Outcome of one run-forever cycle
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    /// The check performed in this cycle
    pub check: RecordedCheck,
    /// Delay slept after the check
    pub delay: Duration,
}

/// Main watch execution engine.
///
/// Runs strictly one check at a time. Every wait goes through the
/// [`TimeSource`], and every state change goes through the [`StateStore`].
pub struct WatchExecutor {
    pub(crate) config: Arc<WatchConfig>,
    pub(crate) store: Arc<dyn StateStore>,
    pub(crate) page_checker: Arc<dyn Checker>,
    pub(crate) endpoint_checker: Arc<dyn Checker>,
    pub(crate) notification_service: Arc<dyn NotificationService>,
    pub(crate) time_source: Arc<dyn TimeSource>,
}

impl WatchExecutor {
    /// Creates an executor using the system clock
    pub fn new(
        config: Arc<WatchConfig>,
        store: Arc<dyn StateStore>,
        page_checker: Arc<dyn Checker>,
        endpoint_checker: Arc<dyn Checker>,
        notification_service: Arc<dyn NotificationService>,
    ) -> Self {
        Self {
            config,
            store,
            page_checker,
            endpoint_checker,
            notification_service,
            time_source: Arc::new(SystemTimeSource),
        }
    }

    /// Replaces the time source
    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    /// Runs the configured checker once, without touching the store.
    ///
    /// In endpoint mode a checker error falls back to the page checker.
    pub async fn run_once(&self) -> CheckResult {
        if self.config.target.mode == CheckMode::Endpoint {
            match self.endpoint_checker.check(&self.config).await {
                Ok(result) => return result.with_normalized_slots(),
                Err(e) => warn!("Endpoint checker failed, falling back to page checker: {}", e),
            }
        }

        match self.page_checker.check(&self.config).await {
            Ok(result) => result.with_normalized_slots(),
            Err(e) => {
                error!("Page checker failed: {}", e);
                let mut evidence = Evidence::new();
                evidence.insert("url".to_string(), self.config.target.url.as_str().into());
                CheckResult::failed(self.time_source.now(), evidence, e.to_string())
            }
        }
    }

    /// Runs one check and records it, honoring an active blocked cooldown.
    ///
    /// While the cooldown lasts the checker is not called; a `blocked` entry is
    /// logged instead and routed through the usual state transition.
    pub async fn run_once_and_store(&self) -> Result<CheckResult, WatchError> {
        self.store.init().await?;

        let now = self.time_source.now();
        if let Some(blocked_until) = self.blocked_until().await? {
            if now < blocked_until {
                info!("Cooldown active until {}, skipping check", blocked_until);
                let result = self.cooldown_result(blocked_until);
                let recorded = self.record_result(result).await?;
                return Ok(recorded.result);
            }
        }

        let result = self.run_once().await;
        let recorded = self.record_result(result).await?;
        Ok(recorded.result)
    }

    /// Start the watch loop. Only returns when the state store fails.
    pub async fn start(&self) -> Result<(), WatchError> {
        info!(
            "Starting watch of {} every {}s (±{}%)",
            self.config.target.url,
            self.config.schedule.interval_seconds,
            self.config.schedule.jitter_percent
        );
        self.store.init().await?;

        loop {
            let outcome = self.run_cycle().await?;
            debug!(
                "Cycle finished with {} after sleeping {:?}",
                outcome.check.result.status, outcome.delay
            );
        }
    }

    /// One run-forever cycle: cooldown wait, rate limit, check, record,
    /// state transition, then the inter-cycle sleep.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, WatchError> {
        self.wait_for_block().await?;
        self.enforce_rate_limit().await?;

        let result = self.run_once().await;
        let check = self.record_result(result).await?;

        let delay = self.compute_next_delay(check.result.status).await?;
        info!("Sleeping for {} seconds", delay.as_secs());
        self.time_source.sleep(delay).await;

        Ok(CycleOutcome { check, delay })
    }

    /// Normalizes and hashes a result, appends it to the check log and
    /// applies the state transition.
    pub(crate) async fn record_result(&self, result: CheckResult) -> Result<RecordedCheck, WatchError> {
        let result = result.with_normalized_slots();
        let result_hash = hash_result(result.status, &result.slots, &result.evidence)?;

        let entry = CheckLogEntry {
            checked_at: result.checked_at,
            status: result.status.to_string(),
            slots_json: stable_json(&result.slots)?,
            result_hash: result_hash.clone(),
            evidence_json: stable_json(&result.evidence)?,
            error: result.error.clone(),
        };
        self.store.insert_check_log(&entry).await?;

        info!(
            "Check finished: {} ({} slots)",
            result.status,
            result.slots.len()
        );

        let notified = self.handle_state_and_notifications(&result, &result_hash).await?;

        Ok(RecordedCheck {
            result,
            result_hash,
            notified,
        })
    }
}
