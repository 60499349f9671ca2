use chrono::Utc;

use crate::db::Repository;
use crate::error::Result;
use crate::models::CleanupCounts;

/// Tombstones records that can no longer be delivered: stories that never got
/// a title and subscriptions pointing at removed channels. Alerts and content
/// are left alone, and nothing is ever hard-deleted.
pub struct Custodian {
    repository: Repository,
}

impl Custodian {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn sweep(&self) -> Result<CleanupCounts> {
        let now = Utc::now();
        let stories = self.repository.soft_delete_untitled_stories(now).await?;
        let subscriptions = self.repository.soft_delete_orphaned_subscriptions(now).await?;

        if stories > 0 || subscriptions > 0 {
            tracing::info!(stories, subscriptions, "custodian sweep tombstoned records");
        }
        Ok(CleanupCounts {
            stories,
            subscriptions,
        })
    }
}
