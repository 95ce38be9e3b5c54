use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::config::WatchConfig;
use crate::page_checker::{build_http_client, classify_page, fetch_page};
use crate::time_source::{SystemTimeSource, TimeSource};
use crate::watch_types::{CheckResult, CheckerError, Evidence};

/// Produces a [`CheckResult`] for the configured target.
///
/// Implementations report fetch and parse problems as an `error` result.
/// `Err` means the checker could not serve the request at all and another
/// checker may be tried instead.
#[async_trait]
pub trait Checker: Send + Sync {
    /// Runs one check
    async fn check(&self, config: &WatchConfig) -> Result<CheckResult, CheckerError>;
}

/// Checks availability through a dedicated endpoint (`target.endpoint_url`).
pub struct EndpointChecker {
    client: Client,
    time_source: Arc<dyn TimeSource>,
}

impl EndpointChecker {
    /// Creates an endpoint checker sharing the page checker's HTTP settings.
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
impl Checker for EndpointChecker {
    async fn check(&self, config: &WatchConfig) -> Result<CheckResult, CheckerError> {
        let endpoint_url = config.target.endpoint_url.as_deref().ok_or_else(|| {
            CheckerError::NotConfigured(
                "target.endpoint_url is not set; use target.mode=page or add endpoint settings"
                    .to_string(),
            )
        })?;

        debug!("Checking endpoint {}", endpoint_url);
        let checked_at = self.time_source.now();
        let page = fetch_page(&self.client, endpoint_url, config)
            .await
            .map_err(|e| CheckerError::Request(e.to_string()))?;

        let mut evidence = Evidence::new();
        evidence.insert("url".to_string(), config.target.url.as_str().into());
        evidence.insert("endpoint_url".to_string(), endpoint_url.into());

        Ok(classify_page(&page, config, checked_at, evidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_endpoint_without_url_is_not_configured() {
        let config = WatchConfig::default();
        let checker = EndpointChecker::new(&config).unwrap();

        let err = checker.check(&config).await.unwrap_err();
        assert!(matches!(err, CheckerError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_fallback_eligible() {
        let mut config = WatchConfig::default();
        config.target.endpoint_url = Some("http://127.0.0.1:1/slots".to_string());
        config.limits.navigation_timeout_ms = 2_000;
        let checker = EndpointChecker::new(&config).unwrap();

        let err = checker.check(&config).await.unwrap_err();
        assert!(matches!(err, CheckerError::Request(_)));
    }
}
