use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_blob_dir")]
    pub blob_dir: String,

    /// Public origin used to build story permalinks.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Shared secret the cron trigger must present as a bearer token.
    pub cron_secret: Option<String>,

    /// Offset used to interpret schedule weekday/hour slots.
    #[serde(default)]
    pub utc_offset_hours: i32,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub smtp: SmtpConfig,

    #[serde(default)]
    pub twilio: TwilioConfig,

    #[serde(default)]
    pub discord: DiscordBotConfig,

    #[serde(default)]
    pub slack: SlackAppConfig,
}

/// Worker cap and per-level deadlines, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub concurrency: usize,
    pub curator_timeout_secs: u64,
    pub reaper_timeout_secs: u64,
    pub sage_timeout_secs: u64,
    pub delivery_timeout_secs: u64,
    pub alert_timeout_secs: u64,
    pub custodian_timeout_secs: u64,
    pub maintenance_timeout_secs: u64,
    pub cycle_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 16,
            curator_timeout_secs: 30,
            reaper_timeout_secs: 120,
            sage_timeout_secs: 120,
            delivery_timeout_secs: 30,
            alert_timeout_secs: 420,
            custodian_timeout_secs: 60,
            maintenance_timeout_secs: 60,
            cycle_timeout_secs: 1800,
        }
    }
}

impl DispatchConfig {
    pub fn curator_timeout(&self) -> Duration {
        Duration::from_secs(self.curator_timeout_secs)
    }

    pub fn reaper_timeout(&self) -> Duration {
        Duration::from_secs(self.reaper_timeout_secs)
    }

    pub fn sage_timeout(&self) -> Duration {
        Duration::from_secs(self.sage_timeout_secs)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }

    pub fn alert_timeout(&self) -> Duration {
        Duration::from_secs(self.alert_timeout_secs)
    }

    pub fn custodian_timeout(&self) -> Duration {
        Duration::from_secs(self.custodian_timeout_secs)
    }

    pub fn maintenance_timeout(&self) -> Duration {
        Duration::from_secs(self.maintenance_timeout_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    /// Worst case for one alert: every stage plus the delivery fan-out, which
    /// runs its subscribers side by side under one delivery deadline.
    pub fn alert_budget_secs(&self) -> u64 {
        self.curator_timeout_secs + self.reaper_timeout_secs + self.sage_timeout_secs + self.delivery_timeout_secs
    }

    /// Whether an alert that uses up every stage and delivery deadline still
    /// finishes inside its own deadline, and an alert inside the cycle's.
    pub fn deadlines_nest(&self) -> bool {
        self.alert_timeout_secs > self.alert_budget_secs() && self.cycle_timeout_secs > self.alert_timeout_secs
    }

    /// Rejects settings that cannot work and warns about deadlines that do
    /// not nest.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(AppError::Config("dispatch.concurrency must be at least 1".into()));
        }

        let budget = self.alert_budget_secs();
        if self.alert_timeout_secs <= budget {
            tracing::warn!(
                alert = self.alert_timeout_secs,
                budget,
                "per-alert timeout does not exceed the stage and delivery timeouts; slow deliveries will be cut off"
            );
        }
        if self.cycle_timeout_secs <= self.alert_timeout_secs {
            tracing::warn!(
                cycle = self.cycle_timeout_secs,
                alert = self.alert_timeout_secs,
                "cycle timeout does not exceed the per-alert timeout"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub anthropic_api_key: Option<String>,
    pub exa_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    /// Upgrade with STARTTLS; disable only for a local relay.
    pub starttls: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 587,
            username: None,
            password: None,
            from: "Alerts <alerts@localhost>".to_string(),
            starttls: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TwilioConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscordBotConfig {
    pub bot_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackAppConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Tokens expiring within this many minutes are refreshed.
    pub refresh_window_minutes: i64,
}

impl Default for SlackAppConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            refresh_window_minutes: 120,
        }
    }
}

fn default_data_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("alert-dispatch");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir
}

fn default_db_path() -> String {
    default_data_dir().join("alerts.db").to_string_lossy().to_string()
}

fn default_blob_dir() -> String {
    default_data_dir().join("blobs").to_string_lossy().to_string()
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            blob_dir: default_blob_dir(),
            base_url: default_base_url(),
            cron_secret: None,
            utc_offset_hours: 0,
            log_json: false,
            dispatch: DispatchConfig::default(),
            providers: ProvidersConfig::default(),
            smtp: SmtpConfig::default(),
            twilio: TwilioConfig::default(),
            discord: DiscordBotConfig::default(),
            slack: SlackAppConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path` (or the default location), writing defaults when the
    /// file does not exist yet. Secrets in the environment win over the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_path);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Config>(&content)?
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            config
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("alert-dispatch")
            .join("config.toml")
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |slot: &mut Option<String>, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = Some(value);
            }
        };
        set(&mut self.cron_secret, "CRON_SECRET");
        set(&mut self.providers.anthropic_api_key, "ANTHROPIC_API_KEY");
        set(&mut self.providers.exa_api_key, "EXA_API_KEY");
        set(&mut self.smtp.password, "SMTP_PASSWORD");
        set(&mut self.twilio.auth_token, "TWILIO_AUTH_TOKEN");
        set(&mut self.discord.bot_token, "DISCORD_BOT_TOKEN");
        set(&mut self.slack.client_secret, "SLACK_CLIENT_SECRET");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            db_path = "/tmp/alerts.db"
            [dispatch]
            concurrency = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, "/tmp/alerts.db");
        assert_eq!(config.dispatch.concurrency, 4);
        assert_eq!(config.dispatch.reaper_timeout_secs, 120);
        assert_eq!(config.smtp.port, 587);
        assert!(config.cron_secret.is_none());
    }

    #[test]
    fn environment_overrides_secrets() {
        let mut config = Config::default();
        config.cron_secret = Some("from-file".into());
        config.apply_env(|key| match key {
            "CRON_SECRET" => Some("from-env".into()),
            "EXA_API_KEY" => Some(String::new()),
            _ => None,
        });

        assert_eq!(config.cron_secret.as_deref(), Some("from-env"));
        assert!(config.providers.exa_api_key.is_none());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let dispatch = DispatchConfig {
            concurrency: 0,
            ..DispatchConfig::default()
        };
        assert!(dispatch.validate().is_err());
    }

    #[test]
    fn default_deadlines_nest_including_delivery() {
        let dispatch = DispatchConfig::default();
        assert_eq!(dispatch.alert_budget_secs(), 30 + 120 + 120 + 30);
        assert!(dispatch.deadlines_nest());
        assert!(dispatch.validate().is_ok());
    }

    #[test]
    fn delivery_counts_toward_the_alert_budget() {
        // Stages alone fit; the fan-out pushes the alert past its deadline.
        let dispatch = DispatchConfig {
            alert_timeout_secs: 280,
            ..DispatchConfig::default()
        };
        assert!(dispatch.alert_timeout_secs > 30 + 120 + 120);
        assert!(!dispatch.deadlines_nest());

        let tight_cycle = DispatchConfig {
            cycle_timeout_secs: 420,
            ..DispatchConfig::default()
        };
        assert!(!tight_cycle.deadlines_nest());
    }

    #[test]
    fn writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.dispatch.concurrency, 16);
    }
}
