use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use watch_store::StoreError;

/// Diagnostic key-value bag attached to a check result.
///
/// A `BTreeMap` keeps keys sorted, so serialized evidence is stable regardless
/// of insertion order.
pub type Evidence = BTreeMap<String, serde_json::Value>;

/// Classification of a single availability check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// At least one opening was found on the page
    Available,
    /// The page reports no openings
    Unavailable,
    /// The target site refused or challenged the request
    Blocked,
    /// The check itself failed
    Error,
    /// Synthetic result used to test the notification path
    Test,
}

impl CheckStatus {
    /// Lowercase name as persisted in the state store
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Available => "available",
            CheckStatus::Unavailable => "unavailable",
            CheckStatus::Blocked => "blocked",
            CheckStatus::Error => "error",
            CheckStatus::Test => "test",
        }
    }

    /// Error and blocked results count as failures for backoff purposes
    pub fn is_failure(&self) -> bool {
        matches!(self, CheckStatus::Error | CheckStatus::Blocked)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single appointment opening.
///
/// Field order matters: the derived `Ord` sorts by date, then time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Slot {
    /// Calendar date, `YYYY-MM-DD`
    pub date: String,
    /// Time of day, `HH:MM`
    pub time: String,
}

impl Slot {
    /// Builds a slot from date and time strings
    pub fn new(date: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            time: time.into(),
        }
    }
}

/// Trims slot fields, drops slots missing a date or time, then sorts and
/// deduplicates by `(date, time)`.
pub fn normalize_slots<I>(slots: I) -> Vec<Slot>
where
    I: IntoIterator<Item = Slot>,
{
    let mut normalized: Vec<Slot> = slots
        .into_iter()
        .map(|slot| Slot::new(slot.date.trim(), slot.time.trim()))
        .filter(|slot| !slot.date.is_empty() && !slot.time.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

/// Outcome of one availability check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Classification of the page
    pub status: CheckStatus,
    /// Openings found on the page
    pub slots: Vec<Slot>,
    /// When the check ran
    pub checked_at: DateTime<Utc>,
    /// Diagnostics gathered while checking
    pub evidence: Evidence,
    /// Error message when the check failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    /// Creates a result without an error message
    pub fn new(
        status: CheckStatus,
        slots: Vec<Slot>,
        checked_at: DateTime<Utc>,
        evidence: Evidence,
    ) -> Self {
        Self {
            status,
            slots,
            checked_at,
            evidence,
            error: None,
        }
    }

    /// Creates an `error` result, recording the message in the evidence too
    pub fn failed(checked_at: DateTime<Utc>, mut evidence: Evidence, message: impl Into<String>) -> Self {
        let message = message.into();
        evidence.insert("error".to_string(), message.clone().into());
        Self {
            status: CheckStatus::Error,
            slots: Vec::new(),
            checked_at,
            evidence,
            error: Some(message),
        }
    }

    /// Returns the same result with its slots normalized
    pub fn with_normalized_slots(mut self) -> Self {
        self.slots = normalize_slots(std::mem::take(&mut self.slots));
        self
    }

    /// URL recorded in the evidence, if any
    pub fn url(&self) -> Option<&str> {
        self.evidence.get("url").and_then(|value| value.as_str())
    }
}

/// Reasons a checker declines to produce a result.
///
/// Only these errors trigger a fallback to another checker; ordinary fetch
/// failures are reported as a [`CheckStatus::Error`] result instead.
#[derive(thiserror::Error, Debug)]
pub enum CheckerError {
    /// The checker lacks the settings it needs
    #[error("Checker not configured: {0}")]
    NotConfigured(String),

    /// The request could not be completed
    #[error("Request failed: {0}")]
    Request(String),

    /// The HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Errors that abort a scheduling cycle
#[derive(thiserror::Error, Debug)]
pub enum WatchError {
    /// Persistence failed; state integrity can no longer be guaranteed
    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    /// Result could not be serialized for the check log
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
