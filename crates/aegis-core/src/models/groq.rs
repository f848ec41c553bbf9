//! Groq client (OpenAI-compatible chat completions, fast inference tier).

use super::openai::{build_messages, ChatRequest, ChatResponse};
use super::{ModelClient, ModelKind, ModelStatus, PrivacyClass};
use crate::shared::ContextMessage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::warn;

const API_BASE: &str = "https://api.groq.com/openai/v1";
const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

pub struct GroqClient {
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
    /// Set on 401/403: the backend stays out for the rest of the session.
    auth_failed: AtomicBool,
}

impl GroqClient {
    pub fn new(api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
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
        Self::new(std::env::var("GROQ_API_KEY").ok())
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}

#[async_trait::async_trait]
impl ModelClient for GroqClient {
    fn name(&self) -> &'static str {
        "groq"
    }

    fn available(&self) -> bool {
        self.api_key.is_some() && !self.auth_failed.load(Ordering::Acquire)
    }

    fn status(&self) -> ModelStatus {
        ModelStatus {
            provider: "groq".to_string(),
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
                warn!("groq auth failed; backend disabled for this session");
                self.auth_failed.store(true, Ordering::SeqCst);
            } else {
                warn!("groq generate returned {}", resp.status());
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
