use serde::{Deserialize, Serialize};

/// Rows tombstoned by one custodian sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupCounts {
    pub stories: usize,
    pub subscriptions: usize,
}

/// Operator-facing outcome of one dispatch cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub alerts_found: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub stories_filtered: usize,
    pub stories_sent: usize,
    pub deliveries_attempted: usize,
    pub deliveries_failed: usize,
    pub reconnect_required: usize,
    pub stories_cleaned: usize,
    pub subscriptions_cleaned: usize,
    pub credentials_refreshed: usize,
    pub elapsed_ms: u64,
}
