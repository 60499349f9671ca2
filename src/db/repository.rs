use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{
    Alert, Channel, Content, NewAlert, NewChannel, NewContent, NewStory, Story, Subscription,
};

use super::schema::SCHEMA;

/// Which rows a read may see. Reads default to live rows; tombstoned rows
/// are only visible when a caller asks for them explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Scope {
    #[default]
    Live,
    IncludeDeleted,
}

impl Scope {
    fn clause(self) -> &'static str {
        match self {
            Scope::Live => "deleted_at IS NULL",
            Scope::IncludeDeleted => "1 = 1",
        }
    }
}

const ALERT_COLUMNS: &str =
    "id, user_id, name, strategy, prompt, wait, active, last_run, next_run, created_at, deleted_at";
const CONTENT_COLUMNS: &str =
    "id, url, normalized_url, title, html_key, markdown_key, created_at";
const STORY_COLUMNS: &str = "id, alert_id, content_id, url, title, key_findings, user_marked_irrelevant, system_marked_irrelevant, created_at, deleted_at";
const CHANNEL_COLUMNS: &str = "id, user_id, type, config, verified, created_at, deleted_at";
const SUBSCRIPTION_COLUMNS: &str = "id, user_id, alert_id, channel_id, created_at, deleted_at";

#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // User operations

    pub async fn insert_user(&self, email: &str) -> Result<i64> {
        let email = email.to_string();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO users (email, created_at) VALUES (?1, ?2)",
                    params![email, format_ts(Utc::now())],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn get_user_email(&self, user_id: i64) -> Result<Option<String>> {
        let email = self
            .conn
            .call(move |conn| {
                let email = conn
                    .query_row(
                        "SELECT email FROM users WHERE id = ?1",
                        params![user_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(email)
            })
            .await?;
        Ok(email)
    }

    // Alert operations

    pub async fn insert_alert(&self, alert: NewAlert) -> Result<i64> {
        let strategy = serde_json::to_string(&alert.strategy)?;
        let wait = serde_json::to_string(&alert.wait)?;
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO alerts (user_id, name, strategy, prompt, wait, active, last_run, next_run, created_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
                    params![
                        alert.user_id,
                        alert.name,
                        strategy,
                        alert.prompt,
                        wait,
                        alert.active,
                        alert.last_run.map(format_ts),
                        alert.next_run.map(format_ts),
                        format_ts(Utc::now()),
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn get_alert(&self, id: i64, scope: Scope) -> Result<Option<Alert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?1 AND {}",
            scope.clause()
        );
        let alert = self
            .conn
            .call(move |conn| {
                let alert = conn
                    .query_row(&sql, params![id], alert_from_row)
                    .optional()?;
                Ok(alert)
            })
            .await?;
        Ok(alert)
    }

    /// Live, active alerts whose `next_run` has passed, longest-waiting first.
    pub async fn due_alerts(&self, now: DateTime<Utc>) -> Result<Vec<Alert>> {
        let sql = format!(
            r#"SELECT {ALERT_COLUMNS} FROM alerts
               WHERE active = 1 AND next_run < ?1 AND {}
               ORDER BY last_run ASC NULLS FIRST, id ASC"#,
            Scope::Live.clause()
        );
        let alerts = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let alerts = stmt
                    .query_map(params![format_ts(now)], alert_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(alerts)
            })
            .await?;
        Ok(alerts)
    }

    pub async fn update_alert_schedule(
        &self,
        id: i64,
        last_run: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE alerts SET last_run = ?1, next_run = ?2 WHERE id = ?3",
                    params![format_ts(last_run), next_run.map(format_ts), id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Advance only `next_run`, used when a run failed and `last_run` must
    /// keep pointing at the last successful cycle.
    pub async fn update_alert_next_run(&self, id: i64, next_run: Option<DateTime<Utc>>) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE alerts SET next_run = ?1 WHERE id = ?2",
                    params![next_run.map(format_ts), id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Content operations

    pub async fn find_content(&self, normalized_url: &str) -> Result<Option<Content>> {
        let normalized_url = normalized_url.to_string();
        let sql = format!("SELECT {CONTENT_COLUMNS} FROM content WHERE normalized_url = ?1");
        let content = self
            .conn
            .call(move |conn| {
                let content = conn
                    .query_row(&sql, params![normalized_url], content_from_row)
                    .optional()?;
                Ok(content)
            })
            .await?;
        Ok(content)
    }

    /// Insert or replace the cached extraction for a normalized URL. Two
    /// concurrent extractions of the same URL are equally valid, so the
    /// later write simply wins.
    pub async fn upsert_content(&self, content: NewContent) -> Result<Content> {
        let sql = format!("SELECT {CONTENT_COLUMNS} FROM content WHERE normalized_url = ?1");
        let content = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO content (url, normalized_url, title, html_key, markdown_key, created_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                       ON CONFLICT(normalized_url) DO UPDATE SET
                           url = excluded.url,
                           title = excluded.title,
                           html_key = excluded.html_key,
                           markdown_key = excluded.markdown_key"#,
                    params![
                        content.url,
                        content.normalized_url,
                        content.title,
                        content.html_key,
                        content.markdown_key,
                        format_ts(Utc::now()),
                    ],
                )?;
                let row = conn.query_row(&sql, params![content.normalized_url], content_from_row)?;
                Ok(row)
            })
            .await?;
        Ok(content)
    }

    pub async fn content_count(&self) -> Result<usize> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM content", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count as usize)
    }

    // Story operations

    pub async fn find_story(&self, alert_id: i64, content_id: i64, scope: Scope) -> Result<Option<Story>> {
        let sql = format!(
            "SELECT {STORY_COLUMNS} FROM stories WHERE alert_id = ?1 AND content_id = ?2 AND {}",
            scope.clause()
        );
        let story = self
            .conn
            .call(move |conn| {
                let story = conn
                    .query_row(&sql, params![alert_id, content_id], story_from_row)
                    .optional()?;
                Ok(story)
            })
            .await?;
        Ok(story)
    }

    pub async fn insert_story(&self, story: NewStory) -> Result<Story> {
        let key_findings = serde_json::to_string(&story.key_findings)?;
        let sql = format!("SELECT {STORY_COLUMNS} FROM stories WHERE id = ?1");
        let story = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO stories (alert_id, content_id, url, title, key_findings, system_marked_irrelevant, created_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
                    params![
                        story.alert_id,
                        story.content_id,
                        story.url,
                        story.title,
                        key_findings,
                        story.system_marked_irrelevant,
                        format_ts(Utc::now()),
                    ],
                )?;
                let id = conn.last_insert_rowid();
                let row = conn.query_row(&sql, params![id], story_from_row)?;
                Ok(row)
            })
            .await?;
        Ok(story)
    }

    pub async fn stories_for_alert(&self, alert_id: i64, scope: Scope) -> Result<Vec<Story>> {
        let sql = format!(
            "SELECT {STORY_COLUMNS} FROM stories WHERE alert_id = ?1 AND {} ORDER BY created_at, id",
            scope.clause()
        );
        let stories = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let stories = stmt
                    .query_map(params![alert_id], story_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(stories)
            })
            .await?;
        Ok(stories)
    }

    pub async fn set_user_marked_irrelevant(&self, story_id: i64, irrelevant: bool) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE stories SET user_marked_irrelevant = ?1 WHERE id = ?2",
                    params![irrelevant, story_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Tombstone live stories whose synthesis produced no title.
    pub async fn soft_delete_untitled_stories(&self, now: DateTime<Utc>) -> Result<usize> {
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE stories SET deleted_at = ?1 WHERE title = '' AND deleted_at IS NULL",
                    params![format_ts(now)],
                )?;
                Ok(changed)
            })
            .await?;
        Ok(changed)
    }

    // Channel operations

    pub async fn insert_channel(&self, channel: NewChannel) -> Result<i64> {
        let config = serde_json::to_string(&channel.config)?;
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO channels (user_id, type, config, verified, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![channel.user_id, channel.kind, config, channel.verified, format_ts(Utc::now())],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn get_channel(&self, id: i64, scope: Scope) -> Result<Option<Channel>> {
        let sql = format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?1 AND {}",
            scope.clause()
        );
        let channel = self
            .conn
            .call(move |conn| {
                let channel = conn
                    .query_row(&sql, params![id], channel_from_row)
                    .optional()?;
                Ok(channel)
            })
            .await?;
        Ok(channel)
    }

    pub async fn channels_of_kind(&self, kind: &str) -> Result<Vec<Channel>> {
        let kind = kind.to_string();
        let sql = format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels WHERE type = ?1 AND {} ORDER BY id",
            Scope::Live.clause()
        );
        let channels = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let channels = stmt
                    .query_map(params![kind], channel_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(channels)
            })
            .await?;
        Ok(channels)
    }

    pub async fn update_channel_config(&self, id: i64, config: serde_json::Value) -> Result<()> {
        let config = serde_json::to_string(&config)?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE channels SET config = ?1 WHERE id = ?2",
                    params![config, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn soft_delete_channel(&self, id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE channels SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
                    params![format_ts(Utc::now()), id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Subscription operations

    pub async fn insert_subscription(
        &self,
        user_id: i64,
        alert_id: i64,
        channel_id: Option<i64>,
    ) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO subscriptions (user_id, alert_id, channel_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                    params![user_id, alert_id, channel_id, format_ts(Utc::now())],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn subscriptions_for_alert(&self, alert_id: i64) -> Result<Vec<Subscription>> {
        let sql = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE alert_id = ?1 AND {} ORDER BY id",
            Scope::Live.clause()
        );
        let subscriptions = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let subscriptions = stmt
                    .query_map(params![alert_id], subscription_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(subscriptions)
            })
            .await?;
        Ok(subscriptions)
    }

    pub async fn get_subscription(&self, id: i64, scope: Scope) -> Result<Option<Subscription>> {
        let sql = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = ?1 AND {}",
            scope.clause()
        );
        let subscription = self
            .conn
            .call(move |conn| {
                let subscription = conn
                    .query_row(&sql, params![id], subscription_from_row)
                    .optional()?;
                Ok(subscription)
            })
            .await?;
        Ok(subscription)
    }

    /// Tombstone live subscriptions bound to a channel that is not live.
    /// With no live channels at all this covers every channel-bound row.
    pub async fn soft_delete_orphaned_subscriptions(&self, now: DateTime<Utc>) -> Result<usize> {
        let changed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let live_ids: Vec<i64> = {
                    let mut stmt = tx.prepare("SELECT id FROM channels WHERE deleted_at IS NULL")?;
                    let ids = stmt
                        .query_map([], |row| row.get(0))?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    ids
                };

                let sql = if live_ids.is_empty() {
                    "UPDATE subscriptions SET deleted_at = ?1 WHERE deleted_at IS NULL AND channel_id IS NOT NULL".to_string()
                } else {
                    let ids = live_ids
                        .iter()
                        .map(i64::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!(
                        "UPDATE subscriptions SET deleted_at = ?1 WHERE deleted_at IS NULL AND channel_id IS NOT NULL AND channel_id NOT IN ({ids})"
                    )
                };
                let changed = tx.execute(&sql, params![format_ts(now)])?;
                tx.commit()?;
                Ok(changed)
            })
            .await?;
        Ok(changed)
    }
}

/// Fixed-width UTC timestamps so text comparison in SQL matches time order.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn ts_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(idx, &raw)
}

fn opt_ts_column(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| parse_ts(idx, &raw))
        .transpose()
}

fn json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn alert_from_row(row: &Row) -> rusqlite::Result<Alert> {
    Ok(Alert {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        strategy: json_column(row, 3)?,
        prompt: row.get(4)?,
        wait: json_column(row, 5)?,
        active: row.get(6)?,
        last_run: opt_ts_column(row, 7)?,
        next_run: opt_ts_column(row, 8)?,
        created_at: ts_column(row, 9)?,
        deleted_at: opt_ts_column(row, 10)?,
    })
}

fn content_from_row(row: &Row) -> rusqlite::Result<Content> {
    Ok(Content {
        id: row.get(0)?,
        url: row.get(1)?,
        normalized_url: row.get(2)?,
        title: row.get(3)?,
        html_key: row.get(4)?,
        markdown_key: row.get(5)?,
        created_at: ts_column(row, 6)?,
    })
}

fn story_from_row(row: &Row) -> rusqlite::Result<Story> {
    Ok(Story {
        id: row.get(0)?,
        alert_id: row.get(1)?,
        content_id: row.get(2)?,
        url: row.get(3)?,
        title: row.get(4)?,
        key_findings: json_column(row, 5)?,
        user_marked_irrelevant: row.get(6)?,
        system_marked_irrelevant: row.get(7)?,
        created_at: ts_column(row, 8)?,
        deleted_at: opt_ts_column(row, 9)?,
    })
}

fn channel_from_row(row: &Row) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        config: json_column(row, 3)?,
        verified: row.get(4)?,
        created_at: ts_column(row, 5)?,
        deleted_at: opt_ts_column(row, 6)?,
    })
}

fn subscription_from_row(row: &Row) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: row.get(0)?,
        user_id: row.get(1)?,
        alert_id: row.get(2)?,
        channel_id: row.get(3)?,
        created_at: ts_column(row, 4)?,
        deleted_at: opt_ts_column(row, 5)?,
    })
}
