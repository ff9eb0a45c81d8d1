//! Research-page scrape client: direct fetch + content extraction.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use glossgen_shared::config::ScrapeSettings;
use glossgen_shared::{GlossgenError, ResourceKind, Result};

use crate::extract;

use super::{USER_AGENT, Upstream};

/// Runtime scrape client configuration.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    pub allow_localhost: bool,
}

impl ScrapeConfig {
    /// Build a runtime config from settings.
    pub fn from_settings(settings: &ScrapeSettings) -> Self {
        Self {
            timeout: Duration::from_secs(settings.timeout_secs),
            allow_localhost: false,
        }
    }
}

/// Client that fetches a research URL and extracts its content as Markdown.
pub struct ScrapeClient {
    client: reqwest::Client,
    config: ScrapeConfig,
}

impl ScrapeClient {
    /// Create a new scrape client with the given configuration.
    pub fn new(config: ScrapeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                GlossgenError::upstream(None, format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Allow scraping localhost/private IPs (for integration tests).
    #[cfg(test)]
    pub fn allow_localhost(mut self) -> Self {
        self.config.allow_localhost = true;
        self
    }
}

#[async_trait]
impl Upstream for ScrapeClient {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Scrape
    }

    async fn fetch(&self, key: &str) -> Result<String> {
        let url = Url::parse(key)
            .map_err(|e| GlossgenError::validation(format!("invalid scrape URL {key:?}: {e}")))?;

        if !self.config.allow_localhost && is_private_target(&url) {
            return Err(GlossgenError::validation(format!(
                "refusing to fetch private address: {url}"
            )));
        }

        debug!(%url, "fetching research page");

        let response = self.client.get(url.as_str()).send().await.map_err(|e| {
            GlossgenError::upstream(e.status().map(|s| s.as_u16()), format!("{url}: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GlossgenError::upstream(
                Some(status.as_u16()),
                format!("{url}: HTTP {status}"),
            ));
        }

        let body = response.text().await.map_err(|e| {
            GlossgenError::upstream(None, format!("{url}: body read failed: {e}"))
        })?;

        let page = extract::page_to_markdown(&body)?;
        Ok(page.markdown)
    }
}

// ---------------------------------------------------------------------------
// Private-address guard
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous local resource.
fn is_private_target(url: &Url) -> bool {
    // Block non-HTTP schemes
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    // Block private/loopback IPs and known local hostnames
    if let Some(host) = url.host_str() {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return is_private_ip(&ip);
        }
        if host == "localhost"
            || host == "[::1]"
            || host.ends_with(".local")
            || host.ends_with(".internal")
        {
            return true;
        }
    }

    false
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> ScrapeConfig {
        ScrapeConfig {
            timeout: Duration::from_secs(5),
            allow_localhost: false,
        }
    }

    #[test]
    fn private_targets_blocked() {
        for url in [
            "file:///etc/passwd",
            "http://localhost:3000/api",
            "http://127.0.0.1:8080/",
            "http://192.168.1.1/admin",
            "http://10.0.0.1/",
            "http://metadata.internal/creds",
        ] {
            let url = Url::parse(url).unwrap();
            assert!(is_private_target(&url), "{url} should be blocked");
        }
    }

    #[test]
    fn public_targets_allowed() {
        let url = Url::parse("https://docs.example.com/page").unwrap();
        assert!(!is_private_target(&url));
    }

    #[tokio::test]
    async fn fetch_extracts_markdown() {
        let server = MockServer::start().await;
        let html = r#"<html><body>
            <nav><a href="/">Home</a></nav>
            <main>
                <h1>Write-Ahead Logging</h1>
                <p>A write-ahead log records changes before they are applied.</p>
            </main>
        </body></html>"#;

        Mock::given(method("GET"))
            .and(path("/wal"))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(&server)
            .await;

        let client = ScrapeClient::new(test_config()).unwrap().allow_localhost();
        let markdown = client
            .fetch(&format!("{}/wal", server.uri()))
            .await
            .expect("fetch");

        assert!(markdown.contains("Write-Ahead Logging"));
        assert!(markdown.contains("records changes"));
        // Navigation chrome is stripped.
        assert!(!markdown.contains("Home"));
    }

    #[tokio::test]
    async fn http_errors_carry_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = ScrapeClient::new(test_config()).unwrap().allow_localhost();
        let err = client.fetch(&format!("{}/x", server.uri())).await.unwrap_err();
        assert_eq!(err.status(), Some(429));
    }

    #[tokio::test]
    async fn invalid_url_is_permanent() {
        let client = ScrapeClient::new(test_config()).unwrap();
        let err = client.fetch("not a url").await.unwrap_err();
        assert!(matches!(err, GlossgenError::Validation { .. }));
        assert!(!crate::classify::is_rate_limited(&err));
    }

    #[tokio::test]
    async fn private_address_rejected_without_request() {
        let client = ScrapeClient::new(test_config()).unwrap();
        let err = client.fetch("http://169.254.169.254/latest").await.unwrap_err();
        assert!(err.to_string().contains("private address"));
    }
}
