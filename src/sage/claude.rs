use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Synthesis, SynthesisRequest, Synthesizer};
use crate::error::{AppError, Result};

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const CLAUDE_MODEL: &str = "claude-3-5-haiku-20241022";
const MAX_CONTENT_CHARS: usize = 10_000;

const SYSTEM_PROMPT: &str = r#"You turn articles into short briefings for a news alert.
Reply with a single JSON object and nothing else:
{"title": string, "keyFindings": [string, ...], "relevant": boolean}
- title: a plain headline for the article, at most 15 words.
- keyFindings: 2 to 5 concise factual bullet points, most important first.
- relevant: false when the article does not match what the alert is about."#;

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoryJson {
    #[serde(default)]
    title: String,
    #[serde(default)]
    key_findings: Vec<String>,
    #[serde(default = "default_relevant")]
    relevant: bool,
}

fn default_relevant() -> bool {
    true
}

pub struct ClaudeSynthesizer {
    client: Client,
    api_key: String,
}

impl ClaudeSynthesizer {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { client, api_key })
    }

    pub fn model_version(&self) -> &'static str {
        CLAUDE_MODEL
    }
}

#[async_trait]
impl Synthesizer for ClaudeSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest<'_>) -> Result<Synthesis> {
        let content = truncate_chars(request.markdown, MAX_CONTENT_CHARS);

        let focus = request
            .prompt
            .map(|p| format!("\nWhat the reader cares about: {p}"))
            .unwrap_or_default();
        let user_message = format!(
            "Alert: {}{}\n\nTitle: {}\nURL: {}\n\nContent:\n{}",
            request.alert_name, focus, request.title, request.url, content
        );

        let body = MessageRequest {
            model: CLAUDE_MODEL.to_string(),
            max_tokens: 1024,
            messages: vec![Message {
                role: "user".to_string(),
                content: user_message,
            }],
            system: Some(SYSTEM_PROMPT.to_string()),
        };

        let response = self
            .client
            .post(CLAUDE_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(AppError::provider("claude", error_text));
        }

        let message_response: MessageResponse = response.json().await?;
        let text = message_response
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        parse_story(&text)
    }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Pull the JSON object out of the model reply, tolerating code fences or
/// stray prose around it.
fn parse_story(text: &str) -> Result<Synthesis> {
    let start = text.find('{');
    let end = text.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => return Err(AppError::Synthesis(format!("no JSON object in reply: {text}"))),
    };

    let story: StoryJson = serde_json::from_str(json)
        .map_err(|e| AppError::Synthesis(format!("malformed reply: {e}")))?;

    Ok(Synthesis {
        title: story.title.trim().to_string(),
        key_findings: story
            .key_findings
            .into_iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect(),
        relevant: story.relevant,
    })
}
