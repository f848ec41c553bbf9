//! Shared test fixtures: scriptable in-process model backends.
#![allow(dead_code)]

use aegis_core::{ContextMessage, ModelClient, ModelKind, ModelStatus, PrivacyClass};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A scriptable backend: fixed reply (or scripted failure), optional
/// word-by-word streaming, call counting, and capture of the last prompt.
pub struct ScriptedClient {
    name: &'static str,
    kind: ModelKind,
    available: bool,
    reply: Option<String>,
    streaming: bool,
    pub calls: AtomicUsize,
    pub last_prompt: Mutex<Option<String>>,
}

impl ScriptedClient {
    pub fn local(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            name: "local",
            kind: ModelKind::Local,
            available: true,
            reply: Some(reply.to_string()),
            streaming: false,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        })
    }

    /// Local backend that streams its reply one word at a time.
    pub fn streaming_local(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            name: "local",
            kind: ModelKind::Local,
            available: true,
            reply: Some(reply.to_string()),
            streaming: true,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        })
    }

    pub fn cloud(name: &'static str, reply: &str) -> Arc<Self> {
        Arc::new(Self {
            name,
            kind: ModelKind::Cloud,
            available: true,
            reply: Some(reply.to_string()),
            streaming: false,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        })
    }

    pub fn failing(name: &'static str, kind: ModelKind) -> Arc<Self> {
        Arc::new(Self {
            name,
            kind,
            available: true,
            reply: None,
            streaming: false,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        })
    }

    pub fn unavailable(name: &'static str, kind: ModelKind) -> Arc<Self> {
        Arc::new(Self {
            name,
            kind,
            available: false,
            reply: None,
            streaming: false,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ModelClient for ScriptedClient {
    fn name(&self) -> &'static str {
        self.name
    }

    fn available(&self) -> bool {
        self.available
    }

    fn status(&self) -> ModelStatus {
        ModelStatus {
            provider: self.name.to_string(),
            model: "scripted".to_string(),
            kind: self.kind,
            privacy: match self.kind {
                ModelKind::Local => PrivacyClass::Full,
                ModelKind::Cloud => PrivacyClass::RequiresApproval,
            },
            available: self.available,
        }
    }

    async fn generate(
        &self,
        prompt: &str,
        _context: &[ContextMessage],
        _temperature: f32,
        _max_tokens: u32,
    ) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = Some(prompt.to_string());
        }
        self.reply.clone()
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        _context: &[ContextMessage],
        _temperature: f32,
        _max_tokens: u32,
    ) -> Option<BoxStream<'static, String>> {
        if !self.streaming {
            return None;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = Some(prompt.to_string());
        }
        // Word-by-word chunks whose concatenation reproduces the reply.
        let chunks: Vec<String> =
            self.reply.clone()?.split_inclusive(' ').map(String::from).collect();
        Some(futures_util::stream::iter(chunks).boxed())
    }
}
