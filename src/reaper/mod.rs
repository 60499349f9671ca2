//! Content extraction with a URL-keyed cache.
//!
//! Failure policy: URLs are isolated from each other. A URL that cannot be
//! fetched, extracted or persisted is logged and left out of the result; the
//! rest of the batch is returned. Only a failing cache lookup (the store
//! itself being unavailable) fails the whole call.

mod blob;
mod extract;
mod scraper;

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::db::Repository;
use crate::error::Result;
use crate::models::{normalize_url, Content, NewContent};

pub use blob::{BlobStore, FsBlobStore};
pub use extract::{extract, Extracted};
pub use scraper::{HttpScraper, Scraper};

/// Extractions in flight per batch.
const FETCH_CONCURRENCY: usize = 4;

pub struct Reaper {
    repository: Repository,
    scraper: Arc<dyn Scraper>,
    blobs: Arc<dyn BlobStore>,
}

impl Reaper {
    pub fn new(repository: Repository, scraper: Arc<dyn Scraper>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            repository,
            scraper,
            blobs,
        }
    }

    /// Cached or freshly extracted content for `urls`, in input order, one
    /// entry per distinct normalized URL.
    pub async fn run(&self, urls: &[String]) -> Result<Vec<Content>> {
        let mut seen = HashSet::new();
        let mut unique: Vec<(String, String)> = Vec::with_capacity(urls.len());
        for url in urls {
            let Some(normalized) = normalize_url(url) else {
                tracing::warn!(url = %url, "dropping unparseable url");
                continue;
            };
            if seen.insert(normalized.clone()) {
                unique.push((url.clone(), normalized));
            }
        }

        let results: Vec<Result<Option<Content>>> = stream::iter(unique)
            .map(|(url, normalized)| async move { self.reap_one(&url, normalized).await })
            .buffered(FETCH_CONCURRENCY)
            .collect()
            .await;

        let mut contents = Vec::with_capacity(results.len());
        for result in results {
            if let Some(content) = result? {
                contents.push(content);
            }
        }
        Ok(contents)
    }

    async fn reap_one(&self, url: &str, normalized: String) -> Result<Option<Content>> {
        if let Some(cached) = self.repository.find_content(&normalized).await? {
            tracing::debug!(url, "content cache hit");
            return Ok(Some(cached));
        }

        match self.extract_and_store(url, normalized).await {
            Ok(content) => Ok(Some(content)),
            Err(e) => {
                tracing::warn!(url, error = %e, "dropping url from batch");
                Ok(None)
            }
        }
    }

    async fn extract_and_store(&self, url: &str, normalized: String) -> Result<Content> {
        let html = self.scraper.fetch(url).await?;
        let Extracted { title, markdown } = extract(&html, url)?;

        let id = uuid::Uuid::new_v4();
        let html_key = format!("content/{id}.html");
        let markdown_key = format!("content/{id}.md");
        self.blobs.put(&html_key, html.into_bytes()).await?;
        self.blobs.put(&markdown_key, markdown.into_bytes()).await?;

        let content = self
            .repository
            .upsert_content(NewContent {
                url: url.to_string(),
                normalized_url: normalized,
                title,
                html_key,
                markdown_key,
            })
            .await?;
        tracing::debug!(url, content_id = content.id, "content extracted");
        Ok(content)
    }
}
