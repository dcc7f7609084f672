//! HTTP client for fetching a host's studies page.

use std::time::{Duration, Instant};

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::error::IngestError;

const USER_AGENT: &str = "metatimeline/0.4 (github.com/monokrome/metatimeline)";

/// Real browser user agents for impersonate mode.
const IMPERSONATE_USER_AGENTS: &[&str] = &[
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Chrome on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Firefox on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    // Safari on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
];

fn random_user_agent() -> &'static str {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as usize)
        .unwrap_or(0);
    IMPERSONATE_USER_AGENTS[nanos % IMPERSONATE_USER_AGENTS.len()]
}

/// Resolve user agent from config value.
/// - None => default metatimeline user agent
/// - "impersonate" => random real browser user agent
/// - other => custom user agent string
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config {
        None => USER_AGENT.to_string(),
        Some("impersonate") => random_user_agent().to_string(),
        Some(custom) => custom.to_string(),
    }
}

/// Whether a `Content-Type` header value names an HTML document.
///
/// A missing header is given the benefit of the doubt.
fn is_html_content_type(content_type: Option<&str>) -> bool {
    content_type.map_or(true, |ct| {
        let mime = ct.split(';').next().unwrap_or("").trim();
        mime.eq_ignore_ascii_case("text/html") || mime.eq_ignore_ascii_case("application/xhtml+xml")
    })
}

/// HTTP client for studies pages.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, IngestError> {
        Self::with_user_agent(timeout, None)
    }

    /// Create a client with custom user agent configuration.
    /// - None: Use default metatimeline user agent
    /// - Some("impersonate"): Use random real browser user agent
    /// - Some(custom): Use custom user agent string
    pub fn with_user_agent(
        timeout: Duration,
        user_agent_config: Option<&str>,
    ) -> Result<Self, IngestError> {
        let user_agent = resolve_user_agent(user_agent_config);
        let client = Client::builder()
            .user_agent(&user_agent)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self { client })
    }

    /// GET a studies page and return its markup. Non-success statuses are errors.
    pub async fn fetch_studies_page(&self, url: &str) -> Result<String, IngestError> {
        debug!("Fetching studies page {}", url);
        let start = Instant::now();
        let response = self.client.get(url).send().await?.error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if !is_html_content_type(content_type.as_deref()) {
            warn!(
                "Studies page {} served as {}, parsing it as HTML anyway",
                url,
                content_type.as_deref().unwrap_or_default()
            );
        }

        let html = response.text().await?;
        info!(
            "Fetched {} ({} bytes) in {}ms",
            url,
            html.len(),
            start.elapsed().as_millis()
        );
        Ok(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_user_agent_default() {
        let ua = resolve_user_agent(None);
        assert!(ua.contains("metatimeline"));
    }

    #[test]
    fn test_resolve_user_agent_impersonate() {
        let ua = resolve_user_agent(Some("impersonate"));
        assert!(ua.contains("Mozilla"));
        assert!(!ua.contains("metatimeline"));
    }

    #[test]
    fn test_resolve_user_agent_custom() {
        let ua = resolve_user_agent(Some("MyBot/1.0"));
        assert_eq!(ua, "MyBot/1.0");
    }

    #[test]
    fn test_html_content_types() {
        assert!(is_html_content_type(Some("text/html")));
        assert!(is_html_content_type(Some("text/html; charset=utf-8")));
        assert!(is_html_content_type(Some("Application/XHTML+XML")));
        assert!(is_html_content_type(None));
        assert!(!is_html_content_type(Some("application/json")));
        assert!(!is_html_content_type(Some("text/plain; charset=utf-8")));
    }

    #[test]
    fn test_client_builds() {
        assert!(HttpClient::new(Duration::from_secs(5)).is_ok());
    }
}
