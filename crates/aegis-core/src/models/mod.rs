//! Model backends behind a single polymorphic seam.
//!
//! Every backend, local or cloud, implements [`ModelClient`]. `generate`
//! returns `None` on transport failure, auth failure, or provider-side
//! error; never an `Err` across the trait boundary. The orchestrator treats
//! a `None` as "this backend failed" and moves on.

mod claude;
mod gemini;
mod groq;
mod ollama;
mod openai;

pub use claude::ClaudeClient;
pub use gemini::GeminiClient;
pub use groq::GroqClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use crate::shared::ContextMessage;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Whether a backend runs on this machine or behind someone else's API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Local,
    Cloud,
}

/// Privacy posture of a backend: local backends never leave the machine,
/// cloud backends require per-session approval from the privacy controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyClass {
    Full,
    RequiresApproval,
}

/// Snapshot of one backend's identity and posture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatus {
    pub provider: String,
    pub model: String,
    pub kind: ModelKind,
    pub privacy: PrivacyClass,
    pub available: bool,
}

/// Uniform interface over heterogeneous model backends.
#[async_trait::async_trait]
pub trait ModelClient: Send + Sync {
    /// Stable short name used in stats and fallback ordering.
    fn name(&self) -> &'static str;

    /// True iff the credential/reachability check succeeded at construction
    /// (or after an explicit re-probe).
    fn available(&self) -> bool;

    fn status(&self) -> ModelStatus;

    /// Generates a completion. `context` messages precede the prompt; the
    /// backend wraps them in whatever system/role scaffolding its provider
    /// requires. Returns `None` on any failure.
    async fn generate(
        &self,
        prompt: &str,
        context: &[ContextMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Option<String>;

    /// Optional streaming extension. Backends without native streaming
    /// return `None`; callers fall back to `generate`.
    async fn generate_stream(
        &self,
        _prompt: &str,
        _context: &[ContextMessage],
        _temperature: f32,
        _max_tokens: u32,
    ) -> Option<BoxStream<'static, String>> {
        None
    }
}

/// Splits role-tagged context into (system_prompt, chat_messages) for
/// providers that take the system prompt out-of-band.
pub(crate) fn split_system(context: &[ContextMessage]) -> (String, Vec<ContextMessage>) {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut rest = Vec::new();
    for msg in context {
        if msg.role == "system" {
            system_parts.push(&msg.content);
        } else {
            rest.push(msg.clone());
        }
    }
    (system_parts.join("\n\n"), rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_system_separates_roles() {
        let ctx = vec![
            ContextMessage::system("live data"),
            ContextMessage::user("hi"),
            ContextMessage::system("style guide"),
        ];
        let (system, rest) = split_system(&ctx);
        assert_eq!(system, "live data\n\nstyle guide");
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].role, "user");
    }
}
