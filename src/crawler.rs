use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::config::CrawlerConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{CrawlResult, Heading, Link};

/// Paragraph cap to bound downstream LLM payload size
const MAX_PARAGRAPHS: usize = 30;
/// Link cap
const MAX_LINKS: usize = 50;
/// Paragraphs shorter than this are navigation crumbs, not content
const MIN_PARAGRAPH_CHARS: usize = 40;

/// Elements stripped before extraction: page chrome, not content
const EXCLUDED_TAGS: &[&str] = &["script", "style", "nav", "footer", "header", "iframe", "svg", "noscript"];

/// Seam for page fetching so the pipeline and the competitor spy can be
/// exercised without network access
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> PipelineResult<CrawlResult>;
}

/// HTTP crawler: fetches one URL and extracts structured text.
///
/// No retries; a failure propagates to the caller, which treats it as
/// fatal because the pipeline cannot proceed without page content.
pub struct Crawler {
    client: Client,
    user_agent: String,
}

impl Crawler {
    pub fn new(config: &CrawlerConfig) -> PipelineResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Accept",
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert("Accept-Language", HeaderValue::from_static("en-US,en;q=0.5"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| PipelineError::config(format!("failed to build HTTP client: {}", e)))?;

        info!("Crawler initialized (timeout={}s)", config.request_timeout_seconds);

        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
        })
    }
}

#[async_trait]
impl PageFetcher for Crawler {
    async fn fetch(&self, url: &str) -> PipelineResult<CrawlResult> {
        let normalized = normalize_url(url)?;
        debug!("Crawling {}", normalized);

        let response = self
            .client
            .get(&normalized)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.to_string()
                };
                PipelineError::fetch(&normalized, reason)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::fetch(&normalized, format!("HTTP status {}", status)));
        }

        let final_url = response.url().to_string();
        let html = response
            .text()
            .await
            .map_err(|e| PipelineError::fetch(&normalized, format!("failed to read body: {}", e)))?;

        let result = extract_content(&final_url, &html);
        debug!(
            "Crawled {} - title={:?}, headings={}, paragraphs={}, links={}",
            final_url,
            result.title,
            result.headings.len(),
            result.paragraphs.len(),
            result.links.len()
        );
        Ok(result)
    }
}

/// Normalize a raw URL: auto-prefix `https://` when the scheme is
/// missing and strip any trailing slash so cache keys are stable.
pub fn normalize_url(raw: &str) -> PipelineResult<String> {
    let trimmed = raw.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&candidate)
        .map_err(|e| PipelineError::fetch(trimmed, format!("invalid URL: {}", e)))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(PipelineError::fetch(trimmed, format!("unsupported scheme: {}", parsed.scheme())));
    }

    Ok(parsed.to_string().trim_end_matches('/').to_string())
}

/// Extract structured content from raw HTML. Pure function of its
/// inputs, separated from fetching so it can be tested on fixtures.
pub fn extract_content(url: &str, html: &str) -> CrawlResult {
    let document = Html::parse_document(html);
    let base = Url::parse(url).ok();

    let title = select_first_text(&document, "title")
        .or_else(|| meta_content(&document, "meta[property=\"og:title\"]"))
        .unwrap_or_default();

    let meta_description = meta_content(&document, "meta[name=\"description\"]").unwrap_or_default();

    let meta_keywords = meta_content(&document, "meta[name=\"keywords\"]")
        .map(|raw| {
            raw.split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let mut og_data = BTreeMap::new();
    if let Ok(selector) = Selector::parse("meta[property]") {
        for el in document.select(&selector) {
            let property = el.value().attr("property").unwrap_or("");
            if let Some(stripped) = property.strip_prefix("og:") {
                if let Some(content) = el.value().attr("content") {
                    og_data.insert(stripped.to_string(), content.to_string());
                }
            }
        }
    }

    let mut headings = Vec::new();
    if let Ok(selector) = Selector::parse("h1, h2, h3, h4, h5, h6") {
        for el in document.select(&selector) {
            if in_excluded_subtree(&el) {
                continue;
            }
            let text = element_text(&el);
            if text.is_empty() {
                continue;
            }
            let level = el.value().name().as_bytes()[1] - b'0';
            headings.push(Heading { level, text });
        }
    }

    let mut paragraphs = Vec::new();
    if let Ok(selector) = Selector::parse("p") {
        for el in document.select(&selector) {
            if paragraphs.len() >= MAX_PARAGRAPHS {
                break;
            }
            if in_excluded_subtree(&el) {
                continue;
            }
            let text = element_text(&el);
            if text.len() >= MIN_PARAGRAPH_CHARS {
                paragraphs.push(text);
            }
        }
    }

    let mut links = Vec::new();
    if let Ok(selector) = Selector::parse("a[href]") {
        for el in document.select(&selector) {
            if links.len() >= MAX_LINKS {
                break;
            }
            if in_excluded_subtree(&el) {
                continue;
            }
            let href = el.value().attr("href").unwrap_or("");
            if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
                continue;
            }
            let absolute = base
                .as_ref()
                .and_then(|b| b.join(href).ok())
                .map(|u| u.to_string())
                .unwrap_or_else(|| href.to_string());
            links.push(Link {
                href: absolute,
                text: element_text(&el),
            });
        }
    }

    let structured_text = render_structured_text(&title, &meta_description, &headings, &paragraphs);

    CrawlResult {
        url: url.to_string(),
        title,
        meta_description,
        meta_keywords,
        headings,
        paragraphs,
        links,
        og_data,
        structured_text,
    }
}

/// Markdown-like flattening of the page used as LLM input
fn render_structured_text(
    title: &str,
    meta_description: &str,
    headings: &[Heading],
    paragraphs: &[String],
) -> String {
    let mut out = String::new();
    if !title.is_empty() {
        out.push_str(&format!("# {}\n\n", title));
    }
    if !meta_description.is_empty() {
        out.push_str(&format!("{}\n\n", meta_description));
    }
    for h in headings {
        out.push_str(&format!("{} {}\n", "#".repeat(h.level as usize), h.text));
    }
    if !headings.is_empty() {
        out.push('\n');
    }
    for p in paragraphs {
        out.push_str(p);
        out.push_str("\n\n");
    }
    out.trim_end().to_string()
}

fn in_excluded_subtree(el: &ElementRef<'_>) -> bool {
    for ancestor in el.ancestors() {
        if let Some(parent) = ElementRef::wrap(ancestor) {
            if EXCLUDED_TAGS.contains(&parent.value().name()) {
                return true;
            }
        }
    }
    EXCLUDED_TAGS.contains(&el.value().name())
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn select_first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty())
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
        <html>
        <head>
            <title>Acme Notes - Smart note taking</title>
            <meta name="description" content="Organize your research notes with AI.">
            <meta name="keywords" content="notes, research, ai">
            <meta property="og:title" content="Acme Notes">
            <meta property="og:type" content="website">
        </head>
        <body>
            <header><p>This header paragraph is page chrome and should never be extracted.</p></header>
            <nav><a href="/pricing">Pricing</a></nav>
            <h1>Smart note taking for researchers</h1>
            <h2>Why Acme Notes</h2>
            <p>Acme Notes keeps every source, quote and idea connected so you can write faster.</p>
            <p>Short one.</p>
            <script>var tracked = true;</script>
            <a href="/features">Features</a>
            <a href="https://example.org/blog">Blog</a>
            <a href="#section">Skip</a>
            <footer><a href="/imprint">Imprint</a></footer>
        </body>
        </html>
    "##;

    #[test]
    fn test_normalize_url_prefixes_scheme() {
        assert_eq!(normalize_url("example.com").unwrap(), "https://example.com");
        assert_eq!(normalize_url("http://example.com/a/").unwrap(), "http://example.com/a");
    }

    #[test]
    fn test_normalize_url_rejects_other_schemes() {
        assert!(normalize_url("ftp://example.com").is_err());
    }

    #[test]
    fn test_extract_title_and_meta() {
        let result = extract_content("https://acme.example", SAMPLE);
        assert_eq!(result.title, "Acme Notes - Smart note taking");
        assert_eq!(result.meta_description, "Organize your research notes with AI.");
        assert_eq!(result.meta_keywords, vec!["notes", "research", "ai"]);
        assert_eq!(result.og_data.get("title").unwrap(), "Acme Notes");
        assert_eq!(result.og_data.get("type").unwrap(), "website");
    }

    #[test]
    fn test_extract_skips_chrome_elements() {
        let result = extract_content("https://acme.example", SAMPLE);
        assert!(result.paragraphs.iter().all(|p| !p.contains("page chrome")));
        assert!(result.links.iter().all(|l| !l.href.contains("pricing")));
        assert!(result.links.iter().all(|l| !l.href.contains("imprint")));
    }

    #[test]
    fn test_extract_filters_short_paragraphs_and_fragment_links() {
        let result = extract_content("https://acme.example", SAMPLE);
        assert_eq!(result.paragraphs.len(), 1);
        assert_eq!(result.links.len(), 2);
        assert_eq!(result.links[0].href, "https://acme.example/features");
    }

    #[test]
    fn test_extract_headings_with_levels() {
        let result = extract_content("https://acme.example", SAMPLE);
        assert_eq!(result.headings.len(), 2);
        assert_eq!(result.headings[0].level, 1);
        assert_eq!(result.headings[1].level, 2);
    }

    #[test]
    fn test_structured_text_rendering() {
        let result = extract_content("https://acme.example", SAMPLE);
        assert!(result.structured_text.starts_with("# Acme Notes - Smart note taking"));
        assert!(result.structured_text.contains("## Why Acme Notes"));
        assert!(result.structured_text.contains("keeps every source"));
    }

    #[test]
    fn test_paragraph_cap() {
        let mut html = String::from("<html><body>");
        for i in 0..60 {
            html.push_str(&format!(
                "<p>Paragraph number {} with enough characters to clear the minimum length filter.</p>",
                i
            ));
        }
        html.push_str("</body></html>");
        let result = extract_content("https://acme.example", &html);
        assert_eq!(result.paragraphs.len(), 30);
    }
}
