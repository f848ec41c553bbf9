//! Local model runtime client (Ollama-compatible `/api/chat`).
//!
//! Privacy-first default: generation succeeds without any outbound internet
//! call when the local runtime is reachable. Timeout is 120 s to accommodate
//! large local models.

use super::{ModelClient, ModelKind, ModelStatus, PrivacyClass};
use crate::shared::ContextMessage;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_MODEL: &str = "llama3.1:8b";
const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

/// Local inference client. Reachability is probed at construction; the
/// configured model falls back to whatever the runtime actually has pulled.
pub struct OllamaClient {
    base_url: String,
    model: std::sync::RwLock<String>,
    client: reqwest::Client,
    available: AtomicBool,
}

impl OllamaClient {
    /// Connects to the runtime at `base_url`, probing `/api/tags`.
    pub async fn connect(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(GENERATE_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let this = Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: std::sync::RwLock::new(DEFAULT_MODEL.to_string()),
            client,
            available: AtomicBool::new(false),
        };
        this.probe().await;
        this
    }

    /// Re-checks reachability and resolves the model name against the
    /// runtime's pulled models.
    pub async fn probe(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        let res = self.client.get(&url).timeout(PROBE_TIMEOUT).send().await;
        match res {
            Ok(resp) if resp.status().is_success() => {
                if let Ok(tags) = resp.json::<TagsResponse>().await {
                    let names: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
                    let configured = self.model.read().map(|m| m.clone()).unwrap_or_default();
                    if !names.is_empty() && !names.iter().any(|n| n == &configured) {
                        if let Ok(mut m) = self.model.write() {
                            warn!("local model {} not pulled; using {}", configured, names[0]);
                            *m = names[0].clone();
                        }
                    }
                }
                self.available.store(true, Ordering::SeqCst);
                true
            }
            _ => {
                debug!("local runtime unreachable at {}", self.base_url);
                self.available.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    pub fn with_model(self, model: &str) -> Self {
        if let Ok(mut m) = self.model.write() {
            *m = model.to_string();
        }
        self
    }

    fn model_name(&self) -> String {
        self.model.read().map(|m| m.clone()).unwrap_or_else(|_| DEFAULT_MODEL.to_string())
    }

    fn build_messages(&self, prompt: &str, context: &[ContextMessage]) -> Vec<ChatMessage> {
        let mut messages: Vec<ChatMessage> = context
            .iter()
            .map(|m| ChatMessage { role: m.role.clone(), content: m.content.clone() })
            .collect();
        messages.push(ChatMessage { role: "user".to_string(), content: prompt.to_string() });
        messages
    }
}

#[async_trait::async_trait]
impl ModelClient for OllamaClient {
    fn name(&self) -> &'static str {
        "local"
    }

    fn available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    fn status(&self) -> ModelStatus {
        ModelStatus {
            provider: "ollama".to_string(),
            model: self.model_name(),
            kind: ModelKind::Local,
            privacy: PrivacyClass::Full,
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
        let body = ChatRequest {
            model: self.model_name(),
            messages: self.build_messages(prompt, context),
            stream: false,
            options: ChatOptions { temperature, num_predict: max_tokens },
        };

        let url = format!("{}/api/chat", self.base_url);
        let resp = self.client.post(&url).json(&body).send().await.ok()?;
        if !resp.status().is_success() {
            warn!("local generate returned {}", resp.status());
            return None;
        }
        let parsed: ChatResponse = resp.json().await.ok()?;
        parsed.message.map(|m| m.content).filter(|c| !c.trim().is_empty())
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        context: &[ContextMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Option<BoxStream<'static, String>> {
        let body = ChatRequest {
            model: self.model_name(),
            messages: self.build_messages(prompt, context),
            stream: true,
            options: ChatOptions { temperature, num_predict: max_tokens },
        };

        let url = format!("{}/api/chat", self.base_url);
        let resp = self.client.post(&url).json(&body).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }

        // One JSON object per line; each carries a message fragment.
        let stream = resp
            .bytes_stream()
            .filter_map(|chunk| async move {
                let bytes = chunk.ok()?;
                let text = String::from_utf8_lossy(&bytes).to_string();
                let mut parts = Vec::new();
                for line in text.lines() {
                    if let Ok(parsed) = serde_json::from_str::<ChatResponse>(line) {
                        if let Some(msg) = parsed.message {
                            if !msg.content.is_empty() {
                                parts.push(msg.content);
                            }
                        }
                    }
                }
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.concat())
                }
            })
            .boxed();

        Some(stream)
    }
}
