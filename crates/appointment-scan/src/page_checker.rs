use std::path::Path;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use tracing::{debug, warn};

use crate::checker::Checker;
use crate::config::WatchConfig;
use crate::parser::{detect_blocked, parse_availability};
use crate::time_source::{SystemTimeSource, TimeSource};
use crate::watch_types::{CheckResult, CheckStatus, CheckerError, Evidence};

static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)\s*>")
        .expect("valid script regex")
});
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));
static SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Raw response of a page fetch
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub html: String,
}

/// Ways a page fetch can fail
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// No response within the navigation timeout
    #[error("Navigation timed out after {0} ms")]
    NavigationTimeout(u64),
    /// The request itself failed
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),
    /// The body did not arrive within the selector timeout
    #[error("Reading page content timed out after {0} ms")]
    ContentTimeout(u64),
    /// The body could not be read
    #[error("Failed to read page content: {0}")]
    Body(#[source] reqwest::Error),
}

/// Checks the target page by fetching it over HTTP and reading its text.
pub struct PageChecker {
    client: Client,
    time_source: Arc<dyn TimeSource>,
}

impl PageChecker {
    /// Creates a page checker using the configured user agent and navigation timeout.
    pub fn new(config: &WatchConfig) -> Result<Self, CheckerError> {
        Ok(Self {
            client: build_http_client(config)?,
            time_source: Arc::new(SystemTimeSource),
        })
    }

    /// Replaces the clock used to stamp results
    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }
}

#[async_trait]
impl Checker for PageChecker {
    async fn check(&self, config: &WatchConfig) -> Result<CheckResult, CheckerError> {
        let url = &config.target.url;
        let checked_at = self.time_source.now();
        let mut evidence = Evidence::new();
        evidence.insert("url".to_string(), url.as_str().into());

        let result = match fetch_page(&self.client, url, config).await {
            Ok(page) => {
                let result = classify_page(&page, config, checked_at, evidence);
                if result.status.is_failure() {
                    save_debug_html(&config.runtime.html_dir, result.status, &page.html, checked_at).await;
                }
                result
            }
            Err(e) => {
                warn!("Page check of {} failed: {}", url, e);
                fetch_failure(e, checked_at, evidence)
            }
        };

        Ok(result)
    }
}

/// Builds the HTTP client shared by the page and endpoint checkers.
pub fn build_http_client(config: &WatchConfig) -> Result<Client, CheckerError> {
    Client::builder()
        .user_agent(config.runtime.user_agent.as_str())
        .connect_timeout(config.limits.navigation_timeout())
        .cookie_store(true)
        .build()
        .map_err(|e| CheckerError::Client(format!("Failed to create HTTP client: {}", e)))
}

/// Fetches `url`, bounding the response wait by the navigation timeout and the
/// body read by the selector timeout.
pub async fn fetch_page(client: &Client, url: &str, config: &WatchConfig) -> Result<FetchedPage, FetchError> {
    debug!("Fetching {}", url);

    let response = tokio::time::timeout(config.limits.navigation_timeout(), client.get(url).send())
        .await
        .map_err(|_| FetchError::NavigationTimeout(config.limits.navigation_timeout_ms))?
        .map_err(FetchError::Request)?;

    let status = response.status().as_u16();

    let html = tokio::time::timeout(config.limits.selector_timeout(), response.text())
        .await
        .map_err(|_| FetchError::ContentTimeout(config.limits.selector_timeout_ms))?
        .map_err(FetchError::Body)?;

    Ok(FetchedPage { status, html })
}

/// `error` result for a failed fetch. A body that timed out is flagged as
/// `network_idle_timeout` in the evidence.
pub fn fetch_failure(error: FetchError, checked_at: DateTime<Utc>, mut evidence: Evidence) -> CheckResult {
    if matches!(error, FetchError::ContentTimeout(_)) {
        evidence.insert("network_idle_timeout".to_string(), true.into());
    }
    CheckResult::failed(checked_at, evidence, error.to_string())
}

/// Turns a fetched page into a check result.
///
/// HTTP 403/429 or block-indicator text mark the check as blocked; otherwise
/// the visible text goes through the availability parser.
pub fn classify_page(
    page: &FetchedPage,
    config: &WatchConfig,
    checked_at: DateTime<Utc>,
    mut evidence: Evidence,
) -> CheckResult {
    evidence.insert("response_status".to_string(), page.status.into());

    let body_text = html_to_text(&page.html);
    let status_blocked = matches!(page.status, 403 | 429);

    if status_blocked || detect_blocked(&body_text) {
        let reason = if status_blocked { "status" } else { "text" };
        evidence.insert("blocked_reason".to_string(), reason.into());
        return CheckResult::new(CheckStatus::Blocked, Vec::new(), checked_at, evidence);
    }

    let url = evidence
        .get("url")
        .and_then(|value| value.as_str())
        .unwrap_or(config.target.url.as_str())
        .to_string();

    let (status, slots, parse_evidence) =
        parse_availability(&body_text, &url, &config.matchers.unavailable_text_substrings);
    evidence.extend(parse_evidence);

    CheckResult::new(status, slots, checked_at, evidence)
}

/// Reduces HTML to its visible text, one space between words.
pub fn html_to_text(html: &str) -> String {
    let without_scripts = SCRIPT_RE.replace_all(html, " ");
    let without_tags = TAG_RE.replace_all(&without_scripts, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&auml;", "ä")
        .replace("&ouml;", "ö")
        .replace("&uuml;", "ü")
        .replace("&szlig;", "ß")
        .replace("&amp;", "&");
    SPACE_RE.replace_all(decoded.trim(), " ").into_owned()
}

/// Keeps the raw HTML of a blocked or failed check for later inspection.
/// Failures are logged and otherwise ignored.
async fn save_debug_html(html_dir: &str, status: CheckStatus, html: &str, checked_at: DateTime<Utc>) {
    let file_name = format!("{}-{}.html", status, checked_at.format("%Y%m%d-%H%M%S"));
    let path = Path::new(html_dir).join(file_name);

    if let Err(e) = tokio::fs::create_dir_all(html_dir).await {
        debug!("Could not create {}: {}", html_dir, e);
        return;
    }
    match tokio::fs::write(&path, html).await {
        Ok(()) => debug!("Saved page HTML to {}", path.display()),
        Err(e) => debug!("Could not save page HTML to {}: {}", path.display(), e),
    }
}
