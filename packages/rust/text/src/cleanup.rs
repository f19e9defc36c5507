//! Cleanup passes applied to Markdown converted from feed HTML.
//!
//! Each pass is `&str -> String`; [`run_pipeline`] applies them in order.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Run every cleanup pass over freshly converted Markdown.
pub(crate) fn run_pipeline(md: &str, base_url: Option<&Url>) -> String {
    let mut result = strip_tracking_images(md);
    result = strip_wrapper_tags(&result);
    result = resolve_links(&result, base_url);
    result = collapse_blank_lines(&result);
    finish_lines(&result)
}

// ---------------------------------------------------------------------------
// Tracking pixels
// ---------------------------------------------------------------------------

/// Drop image lines pointing at analytics beacons (Medium appends one to
/// every feed item).
fn strip_tracking_images(md: &str) -> String {
    static BEACON_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"!\[[^\]]*\]\([^)]*(?:/_/stat|/pixel|[?&]utm_)[^)]*\)").expect("valid regex")
    });

    md.lines()
        .map(|line| BEACON_RE.replace_all(line, "").to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Wrapper tags
// ---------------------------------------------------------------------------

/// Remove layout tags htmd passes through, keeping their text. Fenced code
/// is left untouched.
fn strip_wrapper_tags(md: &str) -> String {
    static WRAPPER_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"</?(?:div|span|section|figure|figcaption|picture|source)(?:\s[^>]*)?/?>")
            .expect("valid regex")
    });

    let mut in_fence = false;
    md.lines()
        .map(|line| {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                return line.to_string();
            }
            if in_fence {
                line.to_string()
            } else {
                WRAPPER_RE.replace_all(line, "").to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

/// Make relative link targets absolute against the article URL.
fn resolve_links(md: &str, base_url: Option<&Url>) -> String {
    let Some(base) = base_url else {
        return md.to_string();
    };

    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\]\(([^)\s]+)\)").expect("valid regex"));

    LINK_RE
        .replace_all(md, |caps: &regex::Captures| {
            let href = &caps[1];
            let is_absolute = href.contains("://") || href.starts_with("mailto:");
            if is_absolute || href.starts_with('#') {
                return caps[0].to_string();
            }
            match base.join(href) {
                Ok(resolved) => format!("]({resolved})"),
                Err(_) => caps[0].to_string(),
            }
        })
        .to_string()
}

// ---------------------------------------------------------------------------
// Whitespace
// ---------------------------------------------------------------------------

/// Collapse runs of blank lines to a single blank line.
fn collapse_blank_lines(md: &str) -> String {
    static BLANKS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n[ \t]*(?:\n[ \t]*){2,}").expect("valid regex"));

    BLANKS_RE.replace_all(md, "\n\n").to_string()
}

/// Trim trailing whitespace per line, leading blank lines, and end with one newline.
fn finish_lines(md: &str) -> String {
    let body = md
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    let body = body.trim_matches('\n');
    format!("{body}\n")
}
