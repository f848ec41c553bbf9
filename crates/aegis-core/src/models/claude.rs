//! Anthropic messages-API client. Cloud backend: callable only after the
//! privacy controller has approved the `claude` provider for this session.

use super::{split_system, ModelClient, ModelKind, ModelStatus, PrivacyClass};
use crate::shared::ContextMessage;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::warn;

const API_BASE: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "String::is_empty")]
    system: String,
    messages: Vec<WireMessage>,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

pub struct ClaudeClient {
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
    /// Set on 401/403: the backend stays out for the rest of the session.
    auth_failed: AtomicBool,
}

impl ClaudeClient {
    pub fn new(api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key: api_key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()),
            model: DEFAULT_MODEL.to_string(),
            client,
            auth_failed: AtomicBool::new(false),
        }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("ANTHROPIC_API_KEY").ok())
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}

#[async_trait::async_trait]
impl ModelClient for ClaudeClient {
    fn name(&self) -> &'static str {
        "claude"
    }

    fn available(&self) -> bool {
        self.api_key.is_some() && !self.auth_failed.load(Ordering::Acquire)
    }

    fn status(&self) -> ModelStatus {
        ModelStatus {
            provider: "anthropic".to_string(),
            model: self.model.clone(),
            kind: ModelKind::Cloud,
            privacy: PrivacyClass::RequiresApproval,
            available: self.available(),
        }
    }

    async fn generate(
        &self,
        prompt: &str,
        context: &[ContextMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Option<String> {
        let key = self.api_key.as_deref()?;
        let (system, rest) = split_system(context);

        let mut messages: Vec<WireMessage> = rest
            .into_iter()
            .map(|m| WireMessage { role: m.role, content: m.content })
            .collect();
        messages.push(WireMessage { role: "user".to_string(), content: prompt.to_string() });

        let body = MessagesRequest {
            model: self.model.clone(),
            max_tokens,
            temperature,
            system,
            messages,
        };

        let resp = self
            .client
            .post(format!("{}/messages", API_BASE))
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            if matches!(resp.status().as_u16(), 401 | 403) {
                warn!("claude auth failed; backend disabled for this session");
                self.auth_failed.store(true, Ordering::SeqCst);
            } else {
                warn!("claude generate returned {}", resp.status());
            }
            return None;
        }
        let parsed: MessagesResponse = resp.json().await.ok()?;
        let text: String = parsed
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text)
            .collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}
