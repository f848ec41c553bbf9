//! Multi-backend orchestrator: pre-lookup, consensus fan-out or cascading
//! fallback, synthesis, uncertainty retry, and per-backend statistics.
//!
//! Fallback chain: local first (privacy-first), then claude, gemini, groq,
//! openai, with each cloud backend gated by the privacy controller. Consensus
//! queries every eligible backend in parallel and synthesizes one answer
//! from the set of responses.

use crate::knowledge::PreLookup;
use crate::models::ModelClient;
use crate::privacy::PrivacyController;
use crate::shared::{CloudProvider, ContextMessage};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Bounded fan-out: at most this many backend calls in flight.
const CONSENSUS_POOL_SIZE: usize = 5;

/// Cloud fallback order after the local backend.
const CLOUD_ORDER: [CloudProvider; 4] = [
    CloudProvider::Claude,
    CloudProvider::Gemini,
    CloudProvider::Groq,
    CloudProvider::OpenAi,
];

/// Synthesis backend preference.
const SYNTHESIS_ORDER: [CloudProvider; 4] = [
    CloudProvider::Claude,
    CloudProvider::Gemini,
    CloudProvider::OpenAi,
    CloudProvider::Groq,
];

/// Knobs for one generation request.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Skip the local backend.
    pub force_cloud: bool,
    /// Multi-model consensus when at least two backends are eligible.
    pub consensus: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self { temperature: 0.7, max_tokens: 2000, force_cloud: false, consensus: true }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BackendCounters {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
}

/// Outcome of one orchestrated generation, with the backends that answered.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub text: String,
    pub models_used: Vec<String>,
    pub knowledge_injected: bool,
}

pub struct Orchestrator {
    local: Arc<dyn ModelClient>,
    cloud: Vec<(CloudProvider, Arc<dyn ModelClient>)>,
    privacy: Arc<PrivacyController>,
    prelookup: Option<Arc<PreLookup>>,
    stats: DashMap<String, BackendCounters>,
}

impl Orchestrator {
    pub fn new(
        local: Arc<dyn ModelClient>,
        cloud: Vec<(CloudProvider, Arc<dyn ModelClient>)>,
        privacy: Arc<PrivacyController>,
        prelookup: Option<Arc<PreLookup>>,
    ) -> Self {
        let this = Self { local, cloud, privacy, prelookup, stats: DashMap::new() };
        this.log_availability();
        this
    }

    fn log_availability(&self) {
        let mut available: Vec<String> = Vec::new();
        if self.local.available() {
            available.push(format!("{} ({})", self.local.name(), self.local.status().model));
        }
        for (_, client) in &self.cloud {
            if client.available() {
                available.push(format!("{} ({})", client.name(), client.status().model));
            }
        }
        if available.is_empty() {
            warn!("no model backends available");
        } else {
            info!("model backends available: {}", available.join(", "));
        }
    }

    /// True when at least one backend could serve a request right now.
    pub fn any_backend_available(&self) -> bool {
        self.local.available() || self.cloud.iter().any(|(_, c)| c.available())
    }

    /// Name of the local backend, as used in stats and `models_used`.
    pub fn local_name(&self) -> &'static str {
        self.local.name()
    }

    fn cloud_client(&self, provider: CloudProvider) -> Option<&Arc<dyn ModelClient>> {
        self.cloud.iter().find(|(p, _)| *p == provider).map(|(_, c)| c)
    }

    /// A cloud backend is eligible iff it reports available AND the privacy
    /// controller has approved it for this session.
    fn cloud_eligible(&self, provider: CloudProvider) -> bool {
        self.cloud_client(provider)
            .map(|c| c.available() && self.privacy.can_use(provider))
            .unwrap_or(false)
    }

    /// Eligible backends in fallback order.
    fn eligible_backends(&self, force_cloud: bool) -> Vec<(String, Arc<dyn ModelClient>)> {
        let mut backends: Vec<(String, Arc<dyn ModelClient>)> = Vec::new();
        if !force_cloud && self.local.available() {
            backends.push((self.local.name().to_string(), Arc::clone(&self.local)));
        }
        for provider in CLOUD_ORDER {
            if self.cloud_eligible(provider) {
                if let Some(client) = self.cloud_client(provider) {
                    backends.push((provider.as_str().to_string(), Arc::clone(client)));
                }
            }
        }
        backends
    }

    fn bump(&self, name: &str, success: Option<bool>) {
        let mut counters = self.stats.entry(name.to_string()).or_default();
        match success {
            None => counters.requests += 1,
            Some(true) => counters.successes += 1,
            Some(false) => counters.failures += 1,
        }
    }

    /// Full pipeline: pre-lookup, consensus or fallback, uncertainty retry.
    /// Returns `None` only when every eligible backend failed.
    pub async fn generate(
        &self,
        prompt: &str,
        context: &[ContextMessage],
        opts: &GenerateOptions,
    ) -> Option<GenerationOutcome> {
        // Phase 1: pre-lookup.
        let knowledge_context = match &self.prelookup {
            Some(prelookup) => prelookup.lookup(prompt).await,
            None => String::new(),
        };
        let mut augmented: Vec<ContextMessage> = Vec::with_capacity(context.len() + 1);
        if !knowledge_context.is_empty() {
            augmented.push(ContextMessage::system(knowledge_context.clone()));
        }
        augmented.extend_from_slice(context);

        // Phase 2: consensus or cascading fallback.
        let outcome = if opts.consensus {
            self.generate_with_consensus(prompt, &augmented, opts).await
        } else {
            self.generate_with_fallback(prompt, &augmented, opts).await
        };

        let mut outcome = outcome?;
        outcome.knowledge_injected = !knowledge_context.is_empty();

        // Phase 3: uncertainty retry, once, when no pre-lookup fired.
        if knowledge_context.is_empty() {
            if let Some(prelookup) = &self.prelookup {
                if prelookup.detector().needs_lookup_after(&outcome.text) {
                    info!("draft response uncertain; retrying with web lookup");
                    if let Some(blob) = prelookup.retry_web_lookup(prompt).await {
                        let mut retry_context: Vec<ContextMessage> =
                            Vec::with_capacity(context.len() + 1);
                        retry_context.push(ContextMessage::system(blob));
                        retry_context.extend_from_slice(context);
                        if let Some(retried) =
                            self.generate_with_fallback(prompt, &retry_context, opts).await
                        {
                            return Some(GenerationOutcome {
                                knowledge_injected: true,
                                ..retried
                            });
                        }
                    }
                }
            }
        }

        Some(outcome)
    }

    /// Cascading fallback: first backend to answer wins.
    async fn generate_with_fallback(
        &self,
        prompt: &str,
        context: &[ContextMessage],
        opts: &GenerateOptions,
    ) -> Option<GenerationOutcome> {
        let backends = self.eligible_backends(opts.force_cloud);
        if backends.is_empty() {
            error!("no eligible backends for fallback");
            return None;
        }

        for (name, client) in backends {
            self.bump(&name, None);
            match client.generate(prompt, context, opts.temperature, opts.max_tokens).await {
                Some(text) => {
                    self.bump(&name, Some(true));
                    return Some(GenerationOutcome {
                        text,
                        models_used: vec![name],
                        knowledge_injected: false,
                    });
                }
                None => {
                    self.bump(&name, Some(false));
                    warn!("{} failed; trying next backend", name);
                }
            }
        }
        error!("all model backends failed");
        None
    }

    /// Consensus: query every eligible backend in parallel (bounded pool),
    /// then synthesize one answer from the successful responses.
    async fn generate_with_consensus(
        &self,
        prompt: &str,
        context: &[ContextMessage],
        opts: &GenerateOptions,
    ) -> Option<GenerationOutcome> {
        let backends = self.eligible_backends(opts.force_cloud);
        if backends.is_empty() {
            error!("no eligible backends for consensus");
            return None;
        }
        if backends.len() == 1 {
            return self.generate_with_fallback(prompt, context, opts).await;
        }

        info!("consensus mode: querying {} backends", backends.len());
        let semaphore = Arc::new(Semaphore::new(CONSENSUS_POOL_SIZE));
        let mut set: JoinSet<(String, Option<String>)> = JoinSet::new();
        for (name, client) in &backends {
            let name = name.clone();
            let client = Arc::clone(client);
            let prompt = prompt.to_string();
            let context = context.to_vec();
            let temperature = opts.temperature;
            let max_tokens = opts.max_tokens;
            let semaphore = Arc::clone(&semaphore);
            self.bump(&name, None);
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let response = client.generate(&prompt, &context, temperature, max_tokens).await;
                (name, response)
            });
        }

        let mut responses: Vec<(String, String)> = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((name, Some(text))) => {
                    self.bump(&name, Some(true));
                    responses.push((name, text));
                }
                Ok((name, None)) => {
                    self.bump(&name, Some(false));
                }
                Err(err) => {
                    warn!("consensus task join failed: {}", err);
                }
            }
        }

        if responses.is_empty() {
            error!("all backends failed in consensus");
            return None;
        }
        let models_used: Vec<String> = responses.iter().map(|(n, _)| n.clone()).collect();
        if responses.len() == 1 {
            let (_, text) = responses.into_iter().next()?;
            return Some(GenerationOutcome { text, models_used, knowledge_injected: false });
        }

        let text = self.synthesize(prompt, &responses).await;
        Some(GenerationOutcome { text, models_used, knowledge_injected: false })
    }

    /// Builds the derive-truth meta-prompt and asks the preferred synthesis
    /// backend to fuse the responses. Falls back to the longest response.
    async fn synthesize(&self, original_prompt: &str, responses: &[(String, String)]) -> String {
        info!("synthesizing consensus from {} responses", responses.len());

        let mut meta = format!(
            "TASK: Derive truth from multiple AI responses.\n\nORIGINAL QUESTION: {}\n\nRESPONSES FROM DIFFERENT MODELS:\n",
            original_prompt
        );
        for (name, text) in responses {
            meta.push_str(&format!("\n--- {} ---\n{}\n", name.to_uppercase(), text));
        }
        meta.push_str(
            "\n--- END RESPONSES ---\n\nINSTRUCTIONS:\n\
             1. Find CONSISTENCIES - facts that multiple models agree on\n\
             2. Note DISAGREEMENTS - where models differ\n\
             3. For disagreements: favor verifiable facts, distrust speculation\n\
             4. NEVER add information not present in any response\n\
             5. If all models are uncertain, say \"insufficient data\"\n\
             6. Be concise. State facts only.\n\nSYNTHESIZED TRUTHFUL ANSWER:",
        );

        let synthesis_client: Option<Arc<dyn ModelClient>> = SYNTHESIS_ORDER
            .into_iter()
            .find(|p| self.cloud_eligible(*p))
            .and_then(|p| self.cloud_client(p).cloned())
            .or_else(|| {
                if self.local.available() {
                    Some(Arc::clone(&self.local))
                } else {
                    None
                }
            });

        if let Some(client) = synthesis_client {
            if let Some(synthesized) = client.generate(&meta, &[], 0.3, 1000).await {
                return synthesized;
            }
        }

        // Longest response is usually the most detailed.
        responses
            .iter()
            .max_by_key(|(_, text)| text.len())
            .map(|(_, text)| text.clone())
            .unwrap_or_default()
    }

    /// Streams from the local backend when possible, with the same pre-lookup
    /// injection as `generate`. `None` means streaming is unavailable and the
    /// caller should fall back to plain `generate`.
    pub async fn generate_stream_local(
        &self,
        prompt: &str,
        context: &[ContextMessage],
        opts: &GenerateOptions,
    ) -> Option<futures_util::stream::BoxStream<'static, String>> {
        if !self.local.available() || opts.force_cloud {
            return None;
        }

        let knowledge_context = match &self.prelookup {
            Some(prelookup) => prelookup.lookup(prompt).await,
            None => String::new(),
        };
        let mut augmented: Vec<ContextMessage> = Vec::with_capacity(context.len() + 1);
        if !knowledge_context.is_empty() {
            augmented.push(ContextMessage::system(knowledge_context));
        }
        augmented.extend_from_slice(context);

        let name = self.local.name();
        let stream = self
            .local
            .generate_stream(prompt, &augmented, opts.temperature, opts.max_tokens)
            .await;
        if stream.is_some() {
            self.bump(name, None);
            self.bump(name, Some(true));
        }
        stream
    }

    /// Comprehensive status: per-backend identity, counters, and lookup stats.
    pub fn status(&self) -> serde_json::Value {
        let mut backends = serde_json::Map::new();
        let mut insert = |name: &str, client: &Arc<dyn ModelClient>| {
            let counters = self.stats.get(name).map(|c| *c).unwrap_or_default();
            backends.insert(
                name.to_string(),
                serde_json::json!({
                    "status": client.status(),
                    "requests": counters.requests,
                    "successes": counters.successes,
                    "failures": counters.failures,
                }),
            );
        };
        insert(self.local.name(), &self.local);
        for (provider, client) in &self.cloud {
            insert(provider.as_str(), client);
        }

        let lookups: HashMap<String, serde_json::Value> =
            self.prelookup.as_ref().map(|p| p.stats()).unwrap_or_default();

        serde_json::json!({
            "backends": backends,
            "auto_lookup": lookups,
            "privacy": self.privacy.status(),
        })
    }

    pub fn backend_counters(&self) -> HashMap<String, BackendCounters> {
        self.stats.iter().map(|e| (e.key().clone(), *e.value())).collect()
    }
}
