use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Extracted representation of one fetched URL. Rows are shared between
/// alerts and never re-extracted once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub id: i64,
    pub url: String,
    pub normalized_url: String,
    pub title: String,
    pub html_key: String,
    pub markdown_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewContent {
    pub url: String,
    pub normalized_url: String,
    pub title: String,
    pub html_key: String,
    pub markdown_key: String,
}

/// Cache key for a URL: scheme and a leading `www.` are dropped, the
/// fragment is ignored and a trailing slash is trimmed, so
/// `https://www.a.com/x/` and `http://a.com/x` share one row. Input that does
/// not parse as an absolute URL with a host has no key.
pub fn normalize_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);

    let mut key = host.to_string();
    if let Some(port) = parsed.port() {
        key.push_str(&format!(":{port}"));
    }
    key.push_str(parsed.path());
    if let Some(query) = parsed.query() {
        key.push('?');
        key.push_str(query);
    }
    Some(key.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::normalize_url;

    fn key(url: &str) -> String {
        normalize_url(url).unwrap()
    }

    #[test]
    fn strips_scheme_and_www() {
        assert_eq!(key("https://www.example.com/a"), "example.com/a");
        assert_eq!(key("http://example.com/a"), "example.com/a");
        assert_eq!(key("https://Example.com/a/"), "example.com/a");
        assert_eq!(key("https://example.com/"), "example.com");
    }

    #[test]
    fn keeps_other_subdomains_port_and_query() {
        assert_eq!(key("https://news.example.com/a?id=1"), "news.example.com/a?id=1");
        assert_eq!(key("http://example.com:8080/a#top"), "example.com:8080/a");
    }

    #[test]
    fn redirect_style_links_keep_their_own_host() {
        let target = key("https://target.com/a");
        let via_go = key("https://example.com/go?to=https://target.com/a");
        let via_share = key("https://other.org/share?u=https://target.com/a");

        assert_eq!(target, "target.com/a");
        assert_eq!(via_go, "example.com/go?to=https://target.com/a");
        assert_ne!(via_go, target);
        assert_ne!(via_share, target);
        assert_ne!(via_go, via_share);
    }

    #[test]
    fn relative_or_hostless_input_has_no_key() {
        assert_eq!(normalize_url("example.com/go?to=https://target.com/a"), None);
        assert_eq!(normalize_url("other.org/share?u=https://target.com/a"), None);
        assert_eq!(normalize_url("mailto:someone@example.com"), None);
        assert_eq!(normalize_url(""), None);
    }
}
