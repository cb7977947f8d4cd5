//! Outbound liveness probe for bookmarked URLs.
//!
//! A probe is one GET request. A 2xx response is "valid" and its body is
//! scanned for a `<title>`. Anything else (non-2xx status, DNS failure,
//! timeout, TLS error, URL that is not absolute http(s)) is "invalid".
//! Network errors never escape this module.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, warn};

/// Longest title stored for a link, matching the favourite title column.
pub const MAX_TITLE_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub is_valid: bool,
    /// Extracted page title; `Some("")` when the page has none, `None` when
    /// the probe failed.
    pub title: Option<String>,
}

impl ProbeOutcome {
    pub fn invalid() -> Self {
        Self { is_valid: false, title: None }
    }

    pub fn valid(title: impl Into<String>) -> Self {
        Self { is_valid: true, title: Some(title.into()) }
    }
}

#[async_trait]
pub trait LinkProber: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub max_body_bytes: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: concat!("favlinks/", env!("CARGO_PKG_VERSION")).to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// reqwest-backed prober used by the server and the maintenance jobs.
pub struct HttpLinkProber {
    client: Client,
    max_body_bytes: usize,
}

impl HttpLinkProber {
    pub fn new(config: &ProbeConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client, max_body_bytes: config.max_body_bytes })
    }

    async fn read_body(&self, mut response: reqwest::Response) -> Result<Vec<u8>, reqwest::Error> {
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let remaining = self.max_body_bytes.saturating_sub(body.len());
            if chunk.len() >= remaining {
                body.extend_from_slice(&chunk[..remaining]);
                break;
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl LinkProber for HttpLinkProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        if !is_probeable(url) {
            debug!(url, "Skipping probe for a url that is not absolute http(s).");
            return ProbeOutcome::invalid();
        }

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                if e.is_timeout() {
                    warn!(url, "Link probe timed out.");
                } else {
                    warn!(url, error = %e, "Link probe failed.");
                }
                return ProbeOutcome::invalid();
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!(url, %status, "Link probe returned a non-success status.");
            return ProbeOutcome::invalid();
        }

        // The status already proved liveness; a broken body only costs us the title.
        let title = match self.read_body(response).await {
            Ok(body) => extract_title(&String::from_utf8_lossy(&body)).unwrap_or_default(),
            Err(e) => {
                warn!(url, error = %e, "Failed to read probed page body.");
                String::new()
            }
        };

        ProbeOutcome::valid(title)
    }
}

/// Only absolute http and https URLs are ever fetched.
pub fn is_probeable(raw: &str) -> bool {
    match url::Url::parse(raw) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some(),
        Err(_) => false,
    }
}

/// Pulls the text of the first `<title>` element, whitespace-collapsed and
/// cut to [`MAX_TITLE_LEN`] characters.
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    let element = document.select(&selector).next()?;

    let text = element.text().collect::<Vec<_>>().join(" ");
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(collapsed.chars().take(MAX_TITLE_LEN).collect())
}
