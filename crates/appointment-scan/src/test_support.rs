//! Test doubles shared by the engine tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use watch_store::MemoryStateStore;

use crate::checker::Checker;
use crate::config::WatchConfig;
use crate::notification_service::{NotificationError, NotificationService};
use crate::time_source::TimeSource;
use crate::watch_types::*;
use crate::WatchExecutor;

/// Clock that only moves when something sleeps on it
pub struct ManualTimeSource {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualTimeSource {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl TimeSource for ManualTimeSource {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(duration).unwrap();
    }
}

pub enum Scripted {
    Result(CheckStatus, Vec<Slot>),
    Fail(String),
}

impl Scripted {
    pub fn status(status: CheckStatus) -> Self {
        Scripted::Result(status, Vec::new())
    }

    pub fn available_at(date: &str, times: &[&str]) -> Self {
        let slots = times.iter().map(|time| Slot::new(date, *time)).collect();
        Scripted::Result(CheckStatus::Available, slots)
    }
}

/// Checker replaying queued outcomes, stamped with the manual clock
pub struct ScriptedChecker {
    script: Mutex<VecDeque<Scripted>>,
    calls: AtomicUsize,
    clock: Arc<ManualTimeSource>,
}

impl ScriptedChecker {
    pub fn new(clock: Arc<ManualTimeSource>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            clock,
        }
    }

    pub fn push(&self, step: Scripted) {
        self.script.lock().unwrap().push_back(step);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Checker for ScriptedChecker {
    async fn check(&self, config: &WatchConfig) -> Result<CheckResult, CheckerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Scripted::status(CheckStatus::Unavailable));

        match step {
            Scripted::Result(status, slots) => {
                let mut evidence = Evidence::new();
                evidence.insert("url".to_string(), config.target.url.as_str().into());
                if status == CheckStatus::Error {
                    return Ok(CheckResult::failed(self.clock.now(), evidence, "scripted failure"));
                }
                Ok(CheckResult::new(status, slots, self.clock.now(), evidence))
            }
            Scripted::Fail(message) => Err(CheckerError::Request(message)),
        }
    }
}

/// Notifier counting attempts, optionally failing every one
pub struct RecordingNotifier {
    attempts: AtomicUsize,
    fail: bool,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationService for RecordingNotifier {
    async fn send_result_notification(&self, _result: &CheckResult) -> Result<(), NotificationError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(NotificationError::Transport("smtp unreachable".to_string()));
        }
        Ok(())
    }
}

pub struct Harness {
    pub executor: WatchExecutor,
    pub store: Arc<MemoryStateStore>,
    pub checker: Arc<ScriptedChecker>,
    pub endpoint: Arc<ScriptedChecker>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualTimeSource>,
}

impl Harness {
    pub fn new(config: WatchConfig) -> Self {
        Self::build(config, false)
    }

    pub fn with_failing_notifier(config: WatchConfig) -> Self {
        Self::build(config, true)
    }

    fn build(config: WatchConfig, fail_notifications: bool) -> Self {
        let clock = Arc::new(ManualTimeSource::starting_at(
            Utc.with_ymd_and_hms(2024, 9, 30, 8, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStateStore::new());
        let checker = Arc::new(ScriptedChecker::new(clock.clone()));
        let endpoint = Arc::new(ScriptedChecker::new(clock.clone()));
        let notifier = Arc::new(RecordingNotifier {
            attempts: AtomicUsize::new(0),
            fail: fail_notifications,
        });

        let executor = WatchExecutor::new(
            Arc::new(config),
            store.clone(),
            checker.clone(),
            endpoint.clone(),
            notifier.clone(),
        )
        .with_time_source(clock.clone());

        Self {
            executor,
            store,
            checker,
            endpoint,
            notifier,
            clock,
        }
    }
}
