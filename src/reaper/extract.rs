use std::sync::OnceLock;

use regex::Regex;

use crate::error::{AppError, Result};

/// Pages with less readable text than this are treated as failed
/// extractions (paywalls, consent walls, empty shells).
const MIN_TEXT_LEN: usize = 200;
const WRAP_WIDTH: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub title: String,
    pub markdown: String,
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title regex"))
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").expect("heading regex"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]+>").expect("tag regex"))
}

/// Title plus readable text of an HTML page.
pub fn extract(html: &str, url: &str) -> Result<Extracted> {
    let text = html2text::from_read(html.as_bytes(), WRAP_WIDTH).map_err(|e| AppError::Extraction {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let markdown: String = text
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if markdown.len() < MIN_TEXT_LEN {
        return Err(AppError::Extraction {
            url: url.to_string(),
            reason: format!("extracted content too short ({} chars)", markdown.len()),
        });
    }

    let title = find_title(html).unwrap_or_default();
    Ok(Extracted { title, markdown })
}

fn find_title(html: &str) -> Option<String> {
    [title_re(), heading_re()]
        .iter()
        .filter_map(|re| re.captures(html))
        .filter_map(|cap| cap.get(1))
        .map(|m| clean_inline(m.as_str()))
        .find(|t| !t.is_empty())
}

fn clean_inline(raw: &str) -> String {
    let stripped = tag_re().replace_all(raw, "");
    let decoded = stripped
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
