// Continuation of executor.rs - Helper methods for WatchExecutor

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use tracing::{error, info, warn};
use watch_store::*;

use crate::WatchExecutor;
use crate::watch_types::*;

impl WatchExecutor {
    /// Applies the state transition for a recorded result and sends the
    /// notification it calls for. Returns whether a notification was attempted.
    pub(crate) async fn handle_state_and_notifications(
        &self,
        result: &CheckResult,
        result_hash: &str,
    ) -> Result<bool, WatchError> {
        let status = result.status;
        let last_status = self.store.get(LAST_STATUS).await?;
        let last_notified_hash = self.store.get(LAST_NOTIFIED_HASH).await?;
        let mut notified = false;

        if status.is_failure() {
            let failures = self.consecutive_failures().await? + 1;
            self.store
                .set(CONSECUTIVE_FAILURES, &failures.to_string())
                .await?;

            if status == CheckStatus::Blocked {
                let hours = i64::try_from(self.config.limits.blocked_cooldown_hours).unwrap_or(i64::MAX);
                let until = ChronoDuration::try_hours(hours)
                    .and_then(|cooldown| self.time_source.now().checked_add_signed(cooldown))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                self.store.set(BLOCKED_UNTIL, &format_timestamp(&until)).await?;
                warn!("Blocked by target, cooling down until {}", until);

                if last_status.as_deref() != Some(CheckStatus::Blocked.as_str()) {
                    self.safe_notify(result).await;
                    notified = true;
                }
            }

            self.store.set(LAST_STATUS, status.as_str()).await?;
            self.store.set(LAST_HASH, result_hash).await?;
            return Ok(notified);
        }

        self.store.set(CONSECUTIVE_FAILURES, "0").await?;
        self.store.set(BLOCKED_UNTIL, "").await?;

        let is_available = status == CheckStatus::Available;
        let entered_available = self.config.notify.on_available
            && is_available
            && last_status.as_deref() != Some(CheckStatus::Available.as_str());
        let content_changed = self.config.notify.on_change
            && is_available
            && last_notified_hash.as_deref() != Some(result_hash);

        if entered_available || content_changed {
            self.safe_notify(result).await;
            self.store.set(LAST_NOTIFIED_HASH, result_hash).await?;
            notified = true;
        }

        self.store.set(LAST_STATUS, status.as_str()).await?;
        self.store.set(LAST_HASH, result_hash).await?;
        Ok(notified)
    }

    /// Sends a notification, logging instead of propagating failures
    async fn safe_notify(&self, result: &CheckResult) {
        match self.notification_service.send_result_notification(result).await {
            Ok(()) => info!("Notification sent for {} result", result.status),
            Err(e) => error!("Failed to send {} notification: {}", result.status, e),
        }
    }

    pub(crate) async fn consecutive_failures(&self) -> Result<u32, WatchError> {
        let value = self.store.get(CONSECUTIVE_FAILURES).await?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    /// Stored cooldown end, if any. An unreadable value counts as no cooldown.
    pub(crate) async fn blocked_until(&self) -> Result<Option<DateTime<Utc>>, WatchError> {
        let Some(value) = self.store.get(BLOCKED_UNTIL).await? else {
            return Ok(None);
        };
        if value.is_empty() {
            return Ok(None);
        }

        match parse_timestamp(&value) {
            Ok(until) => Ok(Some(until)),
            Err(e) => {
                warn!("Ignoring unreadable blocked_until {:?}: {}", value, e);
                Ok(None)
            }
        }
    }

    /// Blocked result logged in place of a check while the cooldown lasts
    pub(crate) fn cooldown_result(&self, blocked_until: DateTime<Utc>) -> CheckResult {
        let mut evidence = Evidence::new();
        evidence.insert("url".to_string(), self.config.target.url.as_str().into());
        evidence.insert(
            "blocked_until".to_string(),
            format_timestamp(&blocked_until).into(),
        );
        evidence.insert("cooldown_active".to_string(), true.into());

        CheckResult::new(
            CheckStatus::Blocked,
            Vec::new(),
            self.time_source.now(),
            evidence,
        )
    }

    /// Sleeps through an active blocked cooldown
    pub(crate) async fn wait_for_block(&self) -> Result<(), WatchError> {
        let Some(until) = self.blocked_until().await? else {
            return Ok(());
        };

        let now = self.time_source.now();
        if until > now {
            let wait = (until - now)
                .to_std()
                .unwrap_or_default()
                .max(Duration::from_secs(1));
            warn!("Cooldown active, sleeping {} seconds", wait.as_secs());
            self.time_source.sleep(wait).await;
        }
        Ok(())
    }

    /// Sleeps until the trailing hour has room for another check
    pub(crate) async fn enforce_rate_limit(&self) -> Result<(), WatchError> {
        let max_checks = self.config.limits.max_checks_per_hour;
        if max_checks == 0 {
            return Ok(());
        }

        let now = self.time_source.now();
        let window_start = now - ChronoDuration::hours(1);
        let recent = self.store.count_since(window_start).await?;
        if recent < i64::from(max_checks) {
            return Ok(());
        }

        let Some(oldest) = self.store.oldest_since(window_start).await? else {
            return Ok(());
        };
        let wait = (oldest + ChronoDuration::hours(1) - now)
            .to_std()
            .unwrap_or_default();
        if !wait.is_zero() {
            warn!(
                "Rate limit reached ({} checks in the last hour), sleeping {} seconds",
                recent,
                wait.as_secs()
            );
            self.time_source.sleep(wait).await;
        }
        Ok(())
    }

    /// Delay before the next cycle: the jittered interval, stretched by
    /// backoff after failures.
    pub(crate) async fn compute_next_delay(&self, status: CheckStatus) -> Result<Duration, WatchError> {
        let base = self.jittered_base_interval();
        if !status.is_failure() {
            return Ok(Duration::from_secs(base));
        }

        let failures = self.consecutive_failures().await?;
        if failures == 0 {
            return Ok(Duration::from_secs(base));
        }

        let limits = &self.config.limits;
        let backoff = compute_backoff(failures, limits.backoff_base_seconds, limits.max_backoff_seconds);
        Ok(Duration::from_secs(base.max(backoff)))
    }

    fn jittered_base_interval(&self) -> u64 {
        let schedule = &self.config.schedule;
        jittered_interval(
            schedule.interval_seconds,
            schedule.jitter_percent,
            &mut rand::rng(),
        )
    }
}

/// `min(base * 2^(failures-1), max)`, in seconds. Zero failures means no backoff.
pub fn compute_backoff(failures: u32, base_seconds: u64, max_seconds: u64) -> u64 {
    if failures == 0 {
        return 0;
    }
    let factor = 1_u64.checked_shl(failures - 1).unwrap_or(u64::MAX);
    base_seconds.saturating_mul(factor).min(max_seconds)
}

/// `interval ± jitter_percent`, drawn uniformly and never below one second
pub fn jittered_interval<R: Rng>(interval_seconds: u64, jitter_percent: u32, rng: &mut R) -> u64 {
    let interval = interval_seconds as f64;
    let spread = interval * f64::from(jitter_percent) / 100.0;
    if spread <= 0.0 {
        return interval_seconds.max(1);
    }

    let value = interval + rng.random_range(-spread..=spread);
    (value as u64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_compute_backoff() {
        assert_eq!(compute_backoff(0, 60, 900), 0);
        assert_eq!(compute_backoff(1, 60, 900), 60);
        assert_eq!(compute_backoff(2, 60, 900), 120);
        assert_eq!(compute_backoff(3, 60, 900), 240);
        assert_eq!(compute_backoff(5, 60, 900), 900);
        assert_eq!(compute_backoff(200, 60, 900), 900);
    }

    #[test]
    fn test_jittered_interval_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let value = jittered_interval(420, 20, &mut rng);
            assert!((336..=504).contains(&value), "{} out of range", value);
        }
    }

    #[test]
    fn test_jittered_interval_without_jitter() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(jittered_interval(420, 0, &mut rng), 420);
    }

    #[test]
    fn test_jittered_interval_floor() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert!(jittered_interval(1, 100, &mut rng) >= 1);
        }
    }
}
