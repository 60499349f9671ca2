//! Story synthesis. Each piece of content becomes at most one story per
//! alert; a content item whose synthesis fails is dropped from the batch and
//! the rest still go through.

mod claude;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::db::{Repository, Scope};
use crate::error::Result;
use crate::models::{Alert, Content, NewStory, Story};
use crate::reaper::BlobStore;

pub use claude::ClaudeSynthesizer;

#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub alert_name: &'a str,
    pub prompt: Option<&'a str>,
    pub title: &'a str,
    pub url: &'a str,
    pub markdown: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    pub title: String,
    pub key_findings: Vec<String>,
    /// Whether the content matters for the alert at all.
    pub relevant: bool,
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<Synthesis>;
}

const SYNTHESIS_CONCURRENCY: usize = 4;

pub struct Sage {
    repository: Repository,
    blobs: Arc<dyn BlobStore>,
    synthesizer: Arc<dyn Synthesizer>,
}

impl Sage {
    pub fn new(repository: Repository, blobs: Arc<dyn BlobStore>, synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self {
            repository,
            blobs,
            synthesizer,
        }
    }

    /// Stories for `contents` under `alert`, existing ones reused.
    pub async fn run(&self, alert: &Alert, contents: &[Content]) -> Result<Vec<Story>> {
        let results: Vec<Result<Option<Story>>> = stream::iter(contents.to_vec())
            .map(|content| async move { self.story_for(alert, &content).await })
            .buffered(SYNTHESIS_CONCURRENCY)
            .collect()
            .await;

        let mut stories = Vec::with_capacity(results.len());
        for result in results {
            if let Some(story) = result? {
                stories.push(story);
            }
        }
        Ok(stories)
    }

    async fn story_for(&self, alert: &Alert, content: &Content) -> Result<Option<Story>> {
        if let Some(existing) = self
            .repository
            .find_story(alert.id, content.id, Scope::IncludeDeleted)
            .await?
        {
            // A tombstoned story stays gone; it is not re-synthesized.
            return Ok(existing.deleted_at.is_none().then_some(existing));
        }

        match self.synthesize(alert, content).await {
            Ok(story) => Ok(Some(story)),
            Err(e) => {
                tracing::warn!(url = %content.url, error = %e, "synthesis failed, skipping content");
                Ok(None)
            }
        }
    }

    async fn synthesize(&self, alert: &Alert, content: &Content) -> Result<Story> {
        let bytes = self.blobs.get(&content.markdown_key).await?;
        let markdown = String::from_utf8_lossy(&bytes);

        let synthesis = self
            .synthesizer
            .synthesize(SynthesisRequest {
                alert_name: &alert.name,
                prompt: alert.prompt.as_deref(),
                title: &content.title,
                url: &content.url,
                markdown: &markdown[..],
            })
            .await?;

        let story = self
            .repository
            .insert_story(NewStory {
                alert_id: alert.id,
                content_id: content.id,
                url: content.url.clone(),
                title: synthesis.title,
                key_findings: synthesis.key_findings,
                system_marked_irrelevant: !synthesis.relevant,
            })
            .await?;
        Ok(story)
    }
}
