use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: i64,
    pub alert_id: i64,
    pub content_id: i64,
    pub url: String,
    pub title: String,
    pub key_findings: Vec<String>,
    pub user_marked_irrelevant: bool,
    pub system_marked_irrelevant: bool,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Story {
    /// Whether this story may go out in a delivery whose previous run was
    /// `last_run`.
    pub fn is_deliverable_since(&self, last_run: Option<DateTime<Utc>>) -> bool {
        if self.user_marked_irrelevant || self.system_marked_irrelevant {
            return false;
        }
        match last_run {
            Some(last) => self.created_at > last,
            None => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewStory {
    pub alert_id: i64,
    pub content_id: i64,
    pub url: String,
    pub title: String,
    pub key_findings: Vec<String>,
    pub system_marked_irrelevant: bool,
}
