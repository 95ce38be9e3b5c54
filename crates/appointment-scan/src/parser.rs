use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::watch_types::{CheckStatus, Evidence, Slot, normalize_slots};

static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b").expect("valid time regex"));

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})\.(\d{1,2})\.(\d{4})\b").expect("valid date regex")
});

/// Lowercase phrases that indicate the site is refusing automated access.
pub const BLOCKED_SUBSTRINGS: [&str; 8] = [
    "captcha",
    "access denied",
    "unusual traffic",
    "robot",
    "bot detection",
    "not authorized",
    "forbidden",
    "too many requests",
];

/// True when the page text carries one of the [`BLOCKED_SUBSTRINGS`].
///
/// Status-code based blocking (403/429) is decided by the checker.
pub fn detect_blocked(body_text: &str) -> bool {
    let lower = body_text.to_lowercase();
    BLOCKED_SUBSTRINGS.iter().any(|token| lower.contains(token))
}

/// Extracts slots from page text.
///
/// Returns the slots plus the number of distinct times and dates seen. Slots
/// are only built when the page mentions exactly one date; with several dates
/// there is no reliable way to tell which time belongs to which day.
pub fn extract_slots(body_text: &str) -> (Vec<Slot>, usize, usize) {
    let times: BTreeSet<String> = TIME_RE
        .captures_iter(body_text)
        .map(|caps| format!("{:0>2}:{}", &caps[1], &caps[2]))
        .collect();

    let dates: BTreeSet<String> = DATE_RE
        .captures_iter(body_text)
        .filter_map(|caps| normalize_date(&caps[1], &caps[2], &caps[3]))
        .collect();

    let slots = match dates.iter().next() {
        Some(date) if dates.len() == 1 => times
            .iter()
            .map(|time| Slot::new(date.clone(), time.clone()))
            .collect(),
        _ => Vec::new(),
    };

    (normalize_slots(slots), times.len(), dates.len())
}

/// Classifies page text and collects the evidence behind the decision.
///
/// The unavailable phrase only wins when no time was found; any time or date
/// token otherwise counts as availability, even if no slot could be paired.
pub fn parse_availability(
    body_text: &str,
    url: &str,
    unavailable_substrings: &[String],
) -> (CheckStatus, Vec<Slot>, Evidence) {
    let lowered = body_text.to_lowercase();
    let found_unavailable = unavailable_substrings
        .iter()
        .any(|token| lowered.contains(&token.to_lowercase()));

    let (slots, time_count, date_count) = extract_slots(body_text);

    let status = if found_unavailable && time_count == 0 {
        CheckStatus::Unavailable
    } else if time_count > 0 || date_count > 0 {
        CheckStatus::Available
    } else {
        CheckStatus::Unavailable
    };

    let mut evidence = Evidence::new();
    evidence.insert("url".to_string(), url.into());
    evidence.insert("found_unavailable_text".to_string(), found_unavailable.into());
    evidence.insert("slot_time_count".to_string(), time_count.into());
    evidence.insert("date_count".to_string(), date_count.into());

    (status, slots, evidence)
}

fn normalize_date(day: &str, month: &str, year: &str) -> Option<String> {
    let date = NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)?;
    Some(date.format("%Y-%m-%d").to_string())
}
