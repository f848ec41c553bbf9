//! OpenAI chat-completions client. Cloud backend, privacy-gated.

use super::{ModelClient, ModelKind, ModelStatus, PrivacyClass};
use crate::shared::ContextMessage;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::warn;

const API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

#[derive(Serialize)]
pub(super) struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Serialize)]
pub(super) struct WireMessage {
    pub role: String,
    pub content: String,
}

#[derive(Deserialize)]
pub(super) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
pub(super) struct ChatChoice {
    pub message: WireMessageOwned,
}

#[derive(Deserialize)]
pub(super) struct WireMessageOwned {
    #[serde(default)]
    pub content: String,
}

pub(super) fn build_messages(prompt: &str, context: &[ContextMessage]) -> Vec<WireMessage> {
    let mut messages: Vec<WireMessage> = context
        .iter()
        .map(|m| WireMessage { role: m.role.clone(), content: m.content.clone() })
        .collect();
    messages.push(WireMessage { role: "user".to_string(), content: prompt.to_string() });
    messages
}

pub struct OpenAiClient {
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
    /// Set on 401/403: the backend stays out for the rest of the session.
    auth_failed: AtomicBool,
}

impl OpenAiClient {
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
        Self::new(std::env::var("OPENAI_API_KEY").ok())
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}

#[async_trait::async_trait]
impl ModelClient for OpenAiClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn available(&self) -> bool {
        self.api_key.is_some() && !self.auth_failed.load(Ordering::Acquire)
    }

    fn status(&self) -> ModelStatus {
        ModelStatus {
            provider: "openai".to_string(),
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
        let body = ChatRequest {
            model: self.model.clone(),
            messages: build_messages(prompt, context),
            temperature,
            max_tokens,
        };

        let resp = self
            .client
            .post(format!("{}/chat/completions", API_BASE))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            if matches!(resp.status().as_u16(), 401 | 403) {
                warn!("openai auth failed; backend disabled for this session");
                self.auth_failed.store(true, Ordering::SeqCst);
            } else {
                warn!("openai generate returned {}", resp.status());
            }
            return None;
        }
        let parsed: ChatResponse = resp.json().await.ok()?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
    }
}
