//! Page driver
//!
//! The crawl engine is generic over how a page is actually opened. The
//! default driver is plain HTTP plus HTML parsing; a headless-browser driver
//! can be injected through the same trait without touching the engine.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use scraper::{Html, Selector};
use thiserror::Error;
use url::Url;

use crate::config::DEFAULT_USER_AGENT;

/// Maximum response size accepted by the HTTP driver
const MAX_CONTENT_SIZE: usize = 10 * 1024 * 1024; // 10 MB

/// Maximum redirects followed per page
const MAX_REDIRECTS: usize = 10;

/// Errors that can occur opening a page
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("page load timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
    #[error("content too large: {0} bytes")]
    ContentTooLarge(usize),
    #[error("failed to parse page: {0}")]
    Parse(String),
}

/// A request to open one page
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub url: Url,
    /// Budget for the whole load
    pub timeout: Duration,
    /// Extra headers sent with the fetch
    pub headers: HashMap<String, String>,
    /// Overrides the driver's default user agent when set
    pub user_agent: Option<String>,
}

impl PageRequest {
    pub fn new(url: Url, timeout: Duration) -> Self {
        Self {
            url,
            timeout,
            headers: HashMap::new(),
            user_agent: None,
        }
    }
}

/// Timing and DOM snapshot of a loaded page
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    /// The requested URL
    pub url: Url,
    /// Where the load ended up after redirects
    pub final_url: Url,
    pub status_code: u16,
    pub title: Option<String>,
    /// Raw response body
    pub body: String,
    /// Words in the rendered text
    pub word_count: usize,
    /// Absolute http(s) links found on the page, deduplicated
    pub links: Vec<Url>,
    pub load_time: Duration,
}

impl PageSnapshot {
    pub fn load_time_ms(&self) -> u64 {
        self.load_time.as_millis() as u64
    }
}

/// Opens URLs and returns page snapshots
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn open(&self, request: &PageRequest) -> Result<PageSnapshot, DriverError>;
}

/// Default driver: HTTP fetch + HTML parsing
pub struct HttpPageDriver {
    client: reqwest::Client,
}

impl HttpPageDriver {
    pub fn new() -> Result<Self, DriverError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(DEFAULT_USER_AGENT)
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self { client })
    }

    async fn fetch(&self, request: &PageRequest) -> Result<PageSnapshot, DriverError> {
        let start = Instant::now();

        let mut req = self
            .client
            .get(request.url.as_str())
            .timeout(request.timeout);
        if let Some(ua) = &request.user_agent {
            req = req.header(reqwest::header::USER_AGENT, ua);
        }
        for (name, value) in &request.headers {
            req = req.header(name, value);
        }

        let response = req.send().await?;
        let status = response.status();
        let final_url = response.url().clone();

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();
        if !content_type.contains("text/html")
            && !content_type.contains("application/xhtml")
            && !content_type.contains("text/plain")
        {
            return Err(DriverError::UnsupportedContentType(content_type));
        }

        if let Some(len) = response.content_length() {
            if len as usize > MAX_CONTENT_SIZE {
                return Err(DriverError::ContentTooLarge(len as usize));
            }
        }

        if !status.is_success() {
            return Err(DriverError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        if body.len() > MAX_CONTENT_SIZE {
            return Err(DriverError::ContentTooLarge(body.len()));
        }

        // HTML parsing is CPU-bound; keep it off the async workers.
        let parse_url = final_url.clone();
        let parse_body = body.clone();
        let parsed = tokio::task::spawn_blocking(move || parse_page(&parse_body, &parse_url))
            .await
            .map_err(|e| DriverError::Parse(e.to_string()))?;

        Ok(PageSnapshot {
            url: request.url.clone(),
            final_url,
            status_code: status.as_u16(),
            title: parsed.title,
            body,
            word_count: parsed.word_count,
            links: parsed.links,
            load_time: start.elapsed(),
        })
    }
}

#[async_trait]
impl PageDriver for HttpPageDriver {
    async fn open(&self, request: &PageRequest) -> Result<PageSnapshot, DriverError> {
        match tokio::time::timeout(request.timeout, self.fetch(request)).await {
            Ok(result) => result,
            Err(_) => Err(DriverError::Timeout(request.timeout)),
        }
    }
}

struct ParsedPage {
    title: Option<String>,
    word_count: usize,
    links: Vec<Url>,
}

/// Extract title, visible word count, and outbound links from an HTML body.
fn parse_page(body: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(body);

    let title = Selector::parse("title").ok().and_then(|sel| {
        document
            .select(&sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    });

    let word_count = document
        .root_element()
        .text()
        .flat_map(|t| t.split_whitespace())
        .count();

    let links = extract_links(&document, base_url);

    ParsedPage {
        title,
        word_count,
        links,
    }
}

/// Collect absolute http(s) links from anchor tags, deduplicated in document
/// order.
fn extract_links(document: &Html, base_url: &Url) -> Vec<Url> {
    let selector = match Selector::parse("a[href]") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();
    for element in document.select(&selector) {
        if let Some(href) = element.value().attr("href") {
            if let Ok(url) = base_url.join(href) {
                if (url.scheme() == "http" || url.scheme() == "https")
                    && seen.insert(url.as_str().to_string())
                {
                    links.push(url);
                }
            }
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_extracts_title_words_and_links() {
        let base = Url::parse("https://example.com/page").unwrap();
        let body = r#"
            <html><head><title> Test Page </title></head>
            <body>
                <p>one two three</p>
                <a href="/about">About</a>
                <a href="https://example.com/contact">Contact</a>
                <a href="https://other.com/page">Other</a>
                <a href="mailto:x@example.com">Mail</a>
            </body></html>
        "#;

        let parsed = parse_page(body, &base);

        assert_eq!(parsed.title.as_deref(), Some("Test Page"));
        assert!(parsed.word_count >= 3);
        assert_eq!(parsed.links.len(), 3);
        assert!(parsed
            .links
            .iter()
            .any(|u| u.as_str() == "https://example.com/about"));
    }

    #[test]
    fn parse_deduplicates_links() {
        let base = Url::parse("https://example.com/").unwrap();
        let body = r#"<a href="/a">1</a><a href="/a">2</a><a href="/b">3</a>"#;
        let parsed = parse_page(body, &base);
        assert_eq!(parsed.links.len(), 2);
    }

    #[test]
    fn parse_handles_missing_title() {
        let base = Url::parse("https://example.com/").unwrap();
        let parsed = parse_page("<html><body>text</body></html>", &base);
        assert!(parsed.title.is_none());
    }

    #[test]
    fn relative_links_resolve_against_final_url() {
        let base = Url::parse("https://example.com/deep/dir/").unwrap();
        let parsed = parse_page(r#"<a href="sibling.html">s</a>"#, &base);
        assert_eq!(
            parsed.links[0].as_str(),
            "https://example.com/deep/dir/sibling.html"
        );
    }
}
