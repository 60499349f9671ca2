//! Source discovery. Each provider turns an alert's strategy into candidate
//! URLs; the registry maps provider tags to implementations and is built
//! once at startup and handed to the dispatcher.

mod exa;
mod rss;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::Strategy;

pub use exa::ExaCurator;
pub use rss::RssCurator;

#[async_trait]
pub trait Curator: Send + Sync {
    /// Tag matched against `Strategy::provider`.
    fn provider(&self) -> &'static str;

    /// Candidate URLs for the strategy. No retries and no partial results:
    /// either the full list or an error that fails the alert's run.
    async fn run(&self, strategy: &Strategy) -> Result<Vec<String>>;
}

/// Fails fast when a strategy tagged for another provider reaches `curator`.
pub fn ensure_provider(curator: &dyn Curator, strategy: &Strategy) -> Result<()> {
    if strategy.provider != curator.provider() {
        return Err(AppError::ProviderMismatch {
            expected: curator.provider().to_string(),
            actual: strategy.provider.clone(),
        });
    }
    Ok(())
}

#[derive(Clone, Default)]
pub struct CuratorRegistry {
    curators: HashMap<String, Arc<dyn Curator>>,
}

impl CuratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, curator: Arc<dyn Curator>) -> &mut Self {
        let tag = curator.provider().to_string();
        if self.curators.insert(tag.clone(), curator).is_some() {
            tracing::warn!(provider = %tag, "curator registered twice, keeping the latest");
        }
        self
    }

    pub fn with(mut self, curator: Arc<dyn Curator>) -> Self {
        self.register(curator);
        self
    }

    pub fn get(&self, provider: &str) -> Result<Arc<dyn Curator>> {
        self.curators
            .get(provider)
            .cloned()
            .ok_or_else(|| AppError::UnknownProvider(provider.to_string()))
    }

    pub fn providers(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.curators.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Resolve the alert's provider and run it.
    pub async fn run(&self, strategy: &Strategy) -> Result<Vec<String>> {
        let curator = self.get(&strategy.provider)?;
        curator.run(strategy).await
    }
}
