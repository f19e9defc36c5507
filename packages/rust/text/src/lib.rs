//! Text handling for scraped articles.
//!
//! Converts feed HTML to Markdown using the `htmd` crate followed by a set of
//! cleanup passes, and provides the word, keyword and relevance helpers the
//! filter and research stages score articles with.

mod analysis;
mod cleanup;

use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use autopress_shared::{AutopressError, Result};

pub use analysis::{
    calculate_relevance, clean_text, count_urls, extract_keywords, link_density, shingle_overlap,
    shouting_ratio, word_count,
};

/// Tags whose content never belongs in an article body.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "nav", "iframe", "noscript", "svg", "form", "button",
];

/// Convert an article's HTML body to clean Markdown.
///
/// `base_url` is the article's own URL; relative links are resolved against
/// it. An unparsable base URL leaves links as they are.
#[instrument(skip(html), fields(len = html.len()))]
pub fn html_to_markdown(html: &str, base_url: Option<&str>) -> Result<String> {
    if html.trim().is_empty() {
        return Ok(String::new());
    }

    let body = extract_body_html(html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();

    let raw = converter
        .convert(&body)
        .map_err(|e| AutopressError::parse(format!("html conversion failed: {e}")))?;

    let base = base_url.and_then(|u| Url::parse(u).ok());
    let markdown = cleanup::run_pipeline(&raw, base.as_ref());

    debug!(raw_len = raw.len(), md_len = markdown.len(), "converted html");
    Ok(markdown)
}

/// Pick the article container out of a full page; feed fragments pass
/// through unchanged.
fn extract_body_html(html: &str) -> String {
    let doc = Html::parse_document(html);

    for sel in ["article", "main", "[role=\"main\"]"] {
        if let Ok(selector) = Selector::parse(sel) {
            if let Some(el) = doc.select(&selector).next() {
                return el.inner_html();
            }
        }
    }

    if let Ok(body) = Selector::parse("body") {
        if let Some(el) = doc.select(&body).next() {
            return el.inner_html();
        }
    }

    html.to_string()
}
