use chrono::{DateTime, Utc, Weekday};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Where an alert's candidate items come from: a provider tag plus whatever
/// parameters that provider understands (a search query, a list of feeds...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub provider: String,
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl Strategy {
    pub fn new(provider: &str, params: serde_json::Value) -> Self {
        let params = match params {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            provider: provider.to_string(),
            params,
        }
    }

    /// Decode the provider-specific parameters.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T> {
        let value = serde_json::Value::Object(self.params.clone());
        Ok(serde_json::from_value(value)?)
    }
}

/// Delivery cadence of an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum WaitPolicy {
    /// Deliver once this many new stories have accumulated.
    Count(u32),
    /// Deliver at fixed local weekday/hour slots.
    Schedule(SchedulePolicy),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulePolicy {
    pub days: Vec<Weekday>,
    pub hours: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub strategy: Strategy,
    pub prompt: Option<String>,
    pub wait: WaitPolicy,
    pub active: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewAlert {
    pub user_id: i64,
    pub name: String,
    pub strategy: Strategy,
    pub prompt: Option<String>,
    pub wait: WaitPolicy,
    pub active: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_policy_uses_type_value_shape() {
        let count: WaitPolicy = serde_json::from_str(r#"{"type":"count","value":5}"#).unwrap();
        assert_eq!(count, WaitPolicy::Count(5));

        let schedule: WaitPolicy = serde_json::from_str(
            r#"{"type":"schedule","value":{"days":["monday","Fri"],"hours":[17,9]}}"#,
        )
        .unwrap();
        assert_eq!(
            schedule,
            WaitPolicy::Schedule(SchedulePolicy {
                days: vec![Weekday::Mon, Weekday::Fri],
                hours: vec![17, 9],
            })
        );
    }

    #[test]
    fn strategy_keeps_provider_params_alongside_tag() {
        let strategy: Strategy =
            serde_json::from_str(r#"{"provider":"exa","query":"rust async"}"#).unwrap();
        assert_eq!(strategy.provider, "exa");

        #[derive(Deserialize)]
        struct Params {
            query: String,
        }
        let params: Params = strategy.params().unwrap();
        assert_eq!(params.query, "rust async");
    }
}
