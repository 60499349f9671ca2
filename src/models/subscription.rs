use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's binding to an alert. `channel_id = None` routes to the user's
/// account email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub alert_id: i64,
    pub channel_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}
