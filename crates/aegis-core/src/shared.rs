//! Shared types used across the core and the gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default user id when the caller does not identify the user (single-user mode).
pub const DEFAULT_USER_ID: &str = "default";

/// One cloud backend identity. The local runtime is not a `CloudProvider`;
/// it is never gated by the privacy controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    Claude,
    Gemini,
    OpenAi,
    Groq,
}

impl CloudProvider {
    pub const ALL: [CloudProvider; 4] = [
        CloudProvider::Claude,
        CloudProvider::Gemini,
        CloudProvider::OpenAi,
        CloudProvider::Groq,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CloudProvider::Claude => "claude",
            CloudProvider::Gemini => "gemini",
            CloudProvider::OpenAi => "openai",
            CloudProvider::Groq => "groq",
        }
    }

    /// Parses a provider name, case-insensitive. Accepts the API-surface
    /// spellings (`CLAUDE`, `OPENAI`, `GROQ`, `GEMINI`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Some(CloudProvider::Claude),
            "gemini" | "google" => Some(CloudProvider::Gemini),
            "openai" | "gpt" => Some(CloudProvider::OpenAi),
            "groq" => Some(CloudProvider::Groq),
            _ => None,
        }
    }
}

impl std::fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one processed request. Created on every turn, never
/// mutated afterwards; old turns are summarized into archives by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Unique id (`TRN-` + uuid fragment).
    pub id: String,
    /// Store-assigned timestamp; monotonically non-decreasing per process.
    pub timestamp: DateTime<Utc>,
    pub user_text: String,
    pub assistant_text: String,
    #[serde(default)]
    pub topics: Vec<String>,
    /// Importance on the 1–10 scale shared with CORTEX items.
    pub importance: f32,
    pub success: bool,
    /// Backend names that contributed to the answer.
    #[serde(default)]
    pub models_used: Vec<String>,
    #[serde(default)]
    pub context_hint: Option<String>,
}

impl ConversationTurn {
    pub fn new(user_text: impl Into<String>, assistant_text: impl Into<String>) -> Self {
        Self {
            id: format!("TRN-{}", &uuid::Uuid::new_v4().simple().to_string()[..12]),
            timestamp: Utc::now(),
            user_text: user_text.into(),
            assistant_text: assistant_text.into(),
            topics: Vec::new(),
            importance: 5.0,
            success: true,
            models_used: Vec::new(),
            context_hint: None,
        }
    }

    pub fn with_topics(mut self, topics: Vec<String>) -> Self {
        self.topics = topics;
        self
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models_used = models;
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance.clamp(1.0, 10.0);
        self
    }

    /// Clamps importance to the valid 1–10 range.
    pub fn clamp(&mut self) {
        self.importance = self.importance.clamp(1.0, 10.0);
    }
}

/// Durable keyed knowledge. `(category, key)` is unique; upserts overwrite the
/// value and only raise confidence/importance unless downgraded explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub category: String,
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub source: Option<String>,
    pub importance: f32,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    #[serde(default)]
    pub access_count: u32,
}

impl KnowledgeEntry {
    /// Clamps importance to [1, 10] and confidence to [0, 1].
    pub fn clamp(&mut self) {
        self.importance = self.importance.clamp(1.0, 10.0);
        self.confidence = self.confidence.clamp(0.0, 1.0);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}

/// One role-tagged context message passed to a model backend. The blob from
/// pre-lookup is prepended as `role: "system"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: String,
    pub content: String,
}

impl ContextMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

/// Free-form metadata blob attached to memory items and context hints.
pub type Metadata = HashMap<String, serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parse_accepts_api_spellings() {
        assert_eq!(CloudProvider::parse("CLAUDE"), Some(CloudProvider::Claude));
        assert_eq!(CloudProvider::parse("openai"), Some(CloudProvider::OpenAi));
        assert_eq!(CloudProvider::parse("Groq"), Some(CloudProvider::Groq));
        assert_eq!(CloudProvider::parse("GEMINI"), Some(CloudProvider::Gemini));
        assert_eq!(CloudProvider::parse("llama"), None);
    }

    #[test]
    fn turn_importance_is_clamped() {
        let turn = ConversationTurn::new("q", "a").with_importance(42.0);
        assert_eq!(turn.importance, 10.0);
    }

    #[test]
    fn knowledge_entry_roundtrip() {
        let entry = KnowledgeEntry {
            category: "facts".into(),
            key: "capital_fr".into(),
            value: "Paris".into(),
            source: Some("test".into()),
            importance: 5.0,
            confidence: 0.8,
            created_at: Utc::now(),
            last_accessed: Utc::now(),
            access_count: 0,
        };
        let restored = KnowledgeEntry::from_bytes(&entry.to_bytes()).unwrap();
        assert_eq!(restored.key, "capital_fr");
        assert_eq!(restored.value, "Paris");
    }
}
