//! Google Gemini client (`generateContent`). Cloud backend, privacy-gated.

use super::{split_system, ModelClient, ModelKind, ModelStatus, PrivacyClass};
use crate::shared::ContextMessage;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::warn;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

pub struct GeminiClient {
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
    /// Set on 401/403: the backend stays out for the rest of the session.
    auth_failed: AtomicBool,
}

impl GeminiClient {
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
        Self::new(std::env::var("GOOGLE_API_KEY").ok())
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}

#[async_trait::async_trait]
impl ModelClient for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn available(&self) -> bool {
        self.api_key.is_some() && !self.auth_failed.load(Ordering::Acquire)
    }

    fn status(&self) -> ModelStatus {
        ModelStatus {
            provider: "google".to_string(),
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

        let mut contents: Vec<Content> = rest
            .into_iter()
            .map(|m| Content {
                // Gemini's role vocabulary is user/model.
                role: Some(if m.role == "assistant" { "model".to_string() } else { "user".to_string() }),
                parts: vec![Part { text: m.content }],
            })
            .collect();
        contents.push(Content {
            role: Some("user".to_string()),
            parts: vec![Part { text: prompt.to_string() }],
        });

        let body = GenerateRequest {
            contents,
            system_instruction: if system.is_empty() {
                None
            } else {
                Some(Content { role: None, parts: vec![Part { text: system }] })
            },
            generation_config: GenerationConfig { temperature, max_output_tokens: max_tokens },
        };

        let url = format!("{}/models/{}:generateContent?key={}", API_BASE, self.model, key);
        let resp = self.client.post(&url).json(&body).send().await.ok()?;
        if !resp.status().is_success() {
            if matches!(resp.status().as_u16(), 401 | 403) {
                warn!("gemini auth failed; backend disabled for this session");
                self.auth_failed.store(true, Ordering::SeqCst);
            } else {
                warn!("gemini generate returned {}", resp.status());
            }
            return None;
        }
        let parsed: GenerateResponse = resp.json().await.ok()?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}
