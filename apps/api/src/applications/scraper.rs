//! Fetches an application page and reduces it to readable text.

use std::time::Duration;

use rand::seq::SliceRandom;
use reqwest::{header, redirect, Client, Url};
use scraper::{ElementRef, Html, Node, Selector};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_REDIRECTS: usize = 10;

/// Elements whose text never reaches the scraped content.
const BOILERPLATE_TAGS: &[&str] = &["script", "style", "nav", "footer", "header"];

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:124.0) Gecko/20100101 Firefox/124.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
];

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Status(u16),

    #[error("Request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for ScrapeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ScrapeError::Timeout
        } else if let Some(status) = e.status() {
            ScrapeError::Status(status.as_u16())
        } else {
            ScrapeError::Request(e.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrapedPage {
    pub url: String,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageMetadata {
    pub title: String,
    pub company: String,
    pub location: String,
    pub deadline: String,
}

#[derive(Clone)]
pub struct ScraperService {
    client: Client,
    timeout: Duration,
}

impl ScraperService {
    pub fn new(timeout: Duration) -> Result<Self, ScrapeError> {
        let client = Client::builder()
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { client, timeout })
    }

    /// Fetches `url` and returns its title and cleaned text content.
    pub async fn scrape_url(&self, url: &str) -> Result<ScrapedPage, ScrapeError> {
        let parsed = validate_url(url)?;
        info!("Scraping URL: {}", url);

        let html = match self.fetch_html(parsed, self.timeout).await {
            Ok(html) => html,
            Err(e) => {
                error!("Error scraping URL {}: {}", url, e);
                return Err(e);
            }
        };

        let page = parse_page(url, &html);
        info!(
            "Successfully scraped {} ({} characters)",
            url,
            page.content.chars().count()
        );
        Ok(page)
    }

    /// Best-effort page metadata. Any failure yields empty metadata.
    pub async fn extract_metadata(&self, url: &str) -> PageMetadata {
        let result = match validate_url(url) {
            Ok(parsed) => self.fetch_html(parsed, METADATA_TIMEOUT).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(html) => parse_metadata(&html),
            Err(e) => {
                error!("Error extracting metadata from {}: {}", url, e);
                PageMetadata::default()
            }
        }
    }

    async fn fetch_html(&self, url: Url, timeout: Duration) -> Result<String, ScrapeError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .header(header::USER_AGENT, random_user_agent())
            .header(
                header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            )
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.5")
            .header(header::UPGRADE_INSECURE_REQUESTS, "1")
            .send()
            .await?
            .error_for_status()?;

        Ok(response.text().await?)
    }
}

pub(crate) fn validate_url(url: &str) -> Result<Url, ScrapeError> {
    let parsed = Url::parse(url.trim()).map_err(|_| ScrapeError::InvalidUrl(url.to_string()))?;
    match (parsed.scheme(), parsed.host_str()) {
        ("http" | "https", Some(host)) if !host.is_empty() => Ok(parsed),
        _ => Err(ScrapeError::InvalidUrl(url.to_string())),
    }
}

fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

// ────────────────────────────────────────────────────────────────────────────
// HTML reduction
// ────────────────────────────────────────────────────────────────────────────

fn parse_page(url: &str, html: &str) -> ScrapedPage {
    let document = Html::parse_document(html);

    let title = first_text(&document, "title")
        .or_else(|| first_text(&document, "h1"))
        .unwrap_or_default();

    let mut raw = String::new();
    collect_text(document.root_element(), &mut raw);

    ScrapedPage {
        url: url.to_string(),
        title,
        content: clean_text(&raw),
    }
}

fn parse_metadata(html: &str) -> PageMetadata {
    let document = Html::parse_document(html);
    PageMetadata {
        title: first_text(&document, "h1").unwrap_or_default(),
        company: first_attr(&document, r#"meta[property="og:site_name"]"#, "content")
            .unwrap_or_default(),
        ..Default::default()
    }
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    let text: String = document.select(&selector).next()?.text().collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn first_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    let value = document.select(&selector).next()?.value().attr(attr)?.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            if !BOILERPLATE_TAGS.contains(&child_element.value().name()) {
                collect_text(child_element, out);
            }
        } else if let Node::Text(text) = child.value() {
            out.push_str(text);
        }
    }
}

/// Trims every line, splits on runs of two spaces, drops empty chunks, one chunk per line.
fn clean_text(raw: &str) -> String {
    raw.lines()
        .flat_map(|line| line.trim().split("  "))
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
