//! Offline HTML inspection. Pure string work, no network.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;

use crate::model::HeadingCounts;

static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<h([1-6])(?:\s[^>]*)?>").expect("valid regex"));
static HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a\s[^>]*?href\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});
static PASSWORD_INPUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<input[^>]*type\s*=\s*["']?password"#).expect("valid regex")
});
static DOCTYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<!doctype\s+([^>]*)>").expect("valid regex"));

/// Everything extracted from a single page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSummary {
    pub title: String,
    pub html_version: String,
    pub headings: HeadingCounts,
    pub has_login_form: bool,
    /// Same-host links, resolved against the page URL. Fragment-only links
    /// count as internal but are not listed.
    pub internal_links: Vec<Url>,
    pub internal_links_count: u32,
    pub external_links: Vec<Url>,
}

pub fn inspect(base: &Url, html: &str) -> PageSummary {
    let mut summary = PageSummary {
        title: TITLE
            .captures(html)
            .map(|c| collapse_whitespace(&c[1]))
            .unwrap_or_default(),
        html_version: html_version(html).to_string(),
        has_login_form: PASSWORD_INPUT.is_match(html),
        ..Default::default()
    };

    for cap in HEADING.captures_iter(html) {
        if let Ok(level) = cap[1].parse::<u8>() {
            summary.headings.record(level);
        }
    }

    for cap in HREF.captures_iter(html) {
        let href = cap[1].trim();
        if href.starts_with('#') {
            summary.internal_links_count += 1;
            continue;
        }
        let Ok(link) = base.join(href) else {
            continue;
        };
        if !matches!(link.scheme(), "http" | "https") {
            continue;
        }
        if link.host_str() == base.host_str() {
            summary.internal_links_count += 1;
            summary.internal_links.push(link);
        } else {
            summary.external_links.push(link);
        }
    }

    summary
}

fn html_version(html: &str) -> &'static str {
    let Some(cap) = DOCTYPE.captures(html) else {
        return "Unknown";
    };
    let decl = cap[1].to_ascii_uppercase();
    if decl.contains("XHTML 1.1") {
        "XHTML 1.1"
    } else if decl.contains("XHTML 1.0") {
        "XHTML 1.0"
    } else if decl.contains("HTML 4.01") {
        "HTML 4.01"
    } else if decl.contains("HTML 3.2") {
        "HTML 3.2"
    } else if decl.trim() == "HTML" {
        "HTML5"
    } else {
        "Unknown"
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
