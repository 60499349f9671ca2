#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tempfile::TempDir;

use alert_dispatch::config::DispatchConfig;
use alert_dispatch::curator::{Curator, CuratorRegistry};
use alert_dispatch::db::Repository;
use alert_dispatch::dispatcher::Dispatcher;
use alert_dispatch::error::{AppError, Result};
use alert_dispatch::herald::{
    DiscordTransport, Herald, MailTransport, SlackTransport, SmsTransport, TransportError, Transports,
};
use alert_dispatch::models::{
    DiscordConfig, NewAlert, NewChannel, SlackConfig, Strategy, WaitPolicy,
};
use alert_dispatch::reaper::{FsBlobStore, Reaper, Scraper};
use alert_dispatch::sage::{Sage, Synthesis, SynthesisRequest, Synthesizer};

pub const BASE_URL: &str = "https://alerts.test";

/// Curator reading its URL list straight from the strategy params and
/// tracking how many runs overlap.
#[derive(Default)]
pub struct StaticCurator {
    pub delay: Option<Duration>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

#[derive(Deserialize)]
struct StaticParams {
    #[serde(default)]
    urls: Vec<String>,
    #[serde(default)]
    fail: bool,
    #[serde(default)]
    delay_ms: Option<u64>,
}

#[async_trait]
impl Curator for StaticCurator {
    fn provider(&self) -> &'static str {
        "static"
    }

    async fn run(&self, strategy: &Strategy) -> Result<Vec<String>> {
        let params: StaticParams = strategy.params()?;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = params.delay_ms.map(Duration::from_millis).or(self.delay) {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if params.fail {
            return Err(AppError::provider("static", "search backend unavailable"));
        }
        Ok(params.urls)
    }
}

pub fn static_strategy(urls: &[&str]) -> Strategy {
    Strategy::new("static", serde_json::json!({ "urls": urls }))
}

pub fn slow_strategy(urls: &[&str], delay: Duration) -> Strategy {
    Strategy::new(
        "static",
        serde_json::json!({ "urls": urls, "delay_ms": delay.as_millis() as u64 }),
    )
}

pub fn failing_strategy() -> Strategy {
    Strategy::new("static", serde_json::json!({ "fail": true }))
}

/// Serves a readable article for any URL not containing "broken".
#[derive(Default)]
pub struct FakeScraper {
    pub fetches: AtomicUsize,
}

impl FakeScraper {
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

pub fn article_html(title: &str) -> String {
    let paragraph = "Researchers published a detailed report on the subject with several \
                     measurements, a discussion of the methodology and a list of open problems. ";
    format!(
        "<html><head><title>{title}</title></head><body><h1>{title}</h1><p>{}</p></body></html>",
        paragraph.repeat(4)
    )
}

#[async_trait]
impl Scraper for FakeScraper {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if url.contains("broken") {
            return Err(AppError::Extraction {
                url: url.to_string(),
                reason: "HTTP 503".into(),
            });
        }
        let slug = url.rsplit('/').find(|s| !s.is_empty()).unwrap_or("index");
        Ok(article_html(&format!("Article {slug}")))
    }
}

/// Marks content irrelevant when its URL says so.
pub struct FakeSynthesizer;

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<Synthesis> {
        Ok(Synthesis {
            title: request.title.to_string(),
            key_findings: vec![format!("Key point from {}", request.title)],
            relevant: !request.url.contains("irrelevant"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub via: &'static str,
    pub to: String,
    pub body: String,
}

/// Records every outgoing message. A destination can be told to fail after a
/// number of successful sends.
#[derive(Default)]
pub struct Recorder {
    sent: Mutex<Vec<Sent>>,
    failures: Mutex<HashMap<String, (usize, TransportError)>>,
}

impl Recorder {
    pub fn fail(&self, destination: &str, after: usize, err: TransportError) {
        self.failures
            .lock()
            .unwrap()
            .insert(destination.to_string(), (after, err));
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, destination: &str) -> Vec<Sent> {
        self.sent().into_iter().filter(|s| s.to == destination).collect()
    }

    fn record(&self, via: &'static str, to: &str, body: &str) -> std::result::Result<(), TransportError> {
        let delivered = self.sent_to(to).len();
        if let Some((after, err)) = self.failures.lock().unwrap().get(to) {
            if delivered >= *after {
                return Err(err.clone());
            }
        }
        self.sent.lock().unwrap().push(Sent {
            via,
            to: to.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl MailTransport for Recorder {
    async fn send(&self, to: &str, subject: &str, html: &str) -> std::result::Result<(), TransportError> {
        self.record("email", to, &format!("{subject}\n{html}"))
    }
}

#[async_trait]
impl SlackTransport for Recorder {
    async fn post_message(&self, config: &SlackConfig, text: &str) -> std::result::Result<(), TransportError> {
        self.record("slack", &config.channel_id, text)
    }
}

#[async_trait]
impl DiscordTransport for Recorder {
    async fn post_message(&self, config: &DiscordConfig, text: &str) -> std::result::Result<(), TransportError> {
        self.record("discord", &config.channel_id, text)
    }
}

#[async_trait]
impl SmsTransport for Recorder {
    async fn send_sms(&self, to: &str, body: &str) -> std::result::Result<(), TransportError> {
        self.record("sms", to, body)
    }
}

pub struct Harness {
    pub repository: Repository,
    pub curator: Arc<StaticCurator>,
    pub scraper: Arc<FakeScraper>,
    pub recorder: Arc<Recorder>,
    pub blobs: Arc<FsBlobStore>,
    _dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_curator(StaticCurator::default()).await
    }

    pub async fn with_curator(curator: StaticCurator) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("alerts.db");
        let repository = Repository::new(db_path.to_str().unwrap()).await.unwrap();

        Self {
            repository,
            curator: Arc::new(curator),
            scraper: Arc::new(FakeScraper::default()),
            recorder: Arc::new(Recorder::default()),
            blobs: Arc::new(FsBlobStore::new(dir.path().join("blobs"))),
            _dir: dir,
        }
    }

    pub fn reaper(&self) -> Reaper {
        Reaper::new(self.repository.clone(), self.scraper.clone(), self.blobs.clone())
    }

    pub fn sage(&self) -> Sage {
        Sage::new(self.repository.clone(), self.blobs.clone(), Arc::new(FakeSynthesizer))
    }

    pub fn herald(&self) -> Herald {
        let transports = Transports {
            mail: self.recorder.clone(),
            slack: self.recorder.clone(),
            discord: self.recorder.clone(),
            sms: self.recorder.clone(),
        };
        Herald::new(self.repository.clone(), transports).unwrap()
    }

    pub fn dispatcher(&self, config: DispatchConfig) -> Dispatcher {
        let curators = CuratorRegistry::new().with(self.curator.clone());
        Dispatcher::new(
            self.repository.clone(),
            curators,
            self.reaper(),
            self.sage(),
            self.herald(),
            config,
        )
        .with_base_url(BASE_URL)
    }

    pub async fn user(&self, email: &str) -> i64 {
        self.repository.insert_user(email).await.unwrap()
    }

    /// An active alert that is already due.
    pub async fn due_alert(&self, user_id: i64, name: &str, strategy: Strategy, wait: WaitPolicy) -> i64 {
        self.repository
            .insert_alert(NewAlert {
                user_id,
                name: name.to_string(),
                strategy,
                prompt: None,
                wait,
                active: true,
                last_run: None,
                next_run: Some(Utc::now() - chrono::Duration::minutes(5)),
            })
            .await
            .unwrap()
    }

    pub async fn channel(&self, user_id: i64, kind: &str, config: serde_json::Value, verified: bool) -> i64 {
        self.repository
            .insert_channel(NewChannel {
                user_id,
                kind: kind.to_string(),
                config,
                verified,
            })
            .await
            .unwrap()
    }
}
