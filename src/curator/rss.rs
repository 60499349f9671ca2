use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use feed_rs::parser;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::Deserialize;

use super::{ensure_provider, Curator};
use crate::error::{AppError, Result};
use crate::models::Strategy;

/// Curator reading entry links from one or more RSS/Atom feeds.
pub struct RssCurator {
    client: Client,
}

#[derive(Debug, Deserialize)]
struct RssParams {
    feeds: Vec<String>,
    #[serde(default)]
    limit: Option<usize>,
}

impl RssCurator {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("alert-dispatch/1.0")
            .build()?;

        Ok(Self { client })
    }

    async fn fetch_links(&self, url: &str) -> Result<Vec<String>> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(AppError::provider(
                "rss",
                format!("failed to fetch {url}: HTTP {}", response.status()),
            ));
        }

        let bytes = response.bytes().await?;
        let feed = parser::parse(&bytes[..])?;
        Ok(entry_links(feed))
    }
}

/// First link of every entry, newest entries first when dates are known.
fn entry_links(feed: feed_rs::model::Feed) -> Vec<String> {
    let mut entries = feed.entries;
    entries.sort_by(|a, b| {
        let a = a.published.or(a.updated);
        let b = b.published.or(b.updated);
        b.cmp(&a)
    });
    entries
        .into_iter()
        .filter_map(|entry| entry.links.into_iter().next().map(|l| l.href))
        .collect()
}

#[async_trait]
impl Curator for RssCurator {
    fn provider(&self) -> &'static str {
        "rss"
    }

    async fn run(&self, strategy: &Strategy) -> Result<Vec<String>> {
        ensure_provider(self, strategy)?;
        let params: RssParams = strategy.params()?;

        // All feeds must succeed: a partial list would look like "no news".
        let fetched: Vec<Result<Vec<String>>> = stream::iter(params.feeds.clone())
            .map(|feed| async move { self.fetch_links(&feed).await })
            .buffered(4)
            .collect()
            .await;

        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        for links in fetched {
            for link in links? {
                if seen.insert(link.clone()) {
                    urls.push(link);
                }
            }
        }
        if let Some(limit) = params.limit {
            urls.truncate(limit);
        }
        Ok(urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>t</title>
<item><title>old</title><link>https://example.com/old</link><pubDate>Mon, 12 Oct 2026 08:00:00 GMT</pubDate></item>
<item><title>new</title><link>https://example.com/new</link><pubDate>Mon, 19 Oct 2026 08:00:00 GMT</pubDate></item>
</channel></rss>"#;

    #[test]
    fn newest_entries_come_first() {
        let feed = parser::parse(FEED.as_bytes()).unwrap();
        assert_eq!(
            entry_links(feed),
            vec!["https://example.com/new".to_string(), "https://example.com/old".to_string()]
        );
    }

    #[tokio::test]
    async fn run_can_be_spawned() {
        let curator = std::sync::Arc::new(RssCurator::new().unwrap());
        let strategy = Strategy::new("rss", serde_json::json!({ "feeds": [] }));

        let urls = tokio::spawn(async move { curator.run(&strategy).await })
            .await
            .unwrap()
            .unwrap();
        assert!(urls.is_empty());
    }
}
