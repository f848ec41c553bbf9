//! Startup wiring: builds the governance engine from config and environment
//! credentials. The gateway (and any embedding host) calls this once.

use crate::config::{CoreConfig, Credentials};
use crate::governance::GovernanceEngine;
use crate::knowledge::PreLookup;
use crate::memory::store::StoreResult;
use crate::memory::UnifiedMemory;
use crate::models::{
    ClaudeClient, GeminiClient, GroqClient, ModelClient, OllamaClient, OpenAiClient,
};
use crate::orchestrator::Orchestrator;
use crate::privacy::{PrivacyController, PrivacyMode};
use crate::shared::CloudProvider;
use std::sync::Arc;

/// Builds the fully wired engine: one shared store handle, the privacy
/// controller, every model backend, the pre-lookup pipeline, and the
/// orchestrator on top.
pub async fn build_engine(config: &CoreConfig, creds: &Credentials) -> StoreResult<GovernanceEngine> {
    let memory = Arc::new(UnifiedMemory::open_path(config.db_path())?);
    let privacy = Arc::new(PrivacyController::new(
        PrivacyMode::parse(&config.privacy_mode),
        config.auto_confirm_cloud,
    ));

    let local: Arc<dyn ModelClient> = Arc::new(OllamaClient::connect(&config.local_base_url).await);
    let cloud: Vec<(CloudProvider, Arc<dyn ModelClient>)> = vec![
        (
            CloudProvider::Claude,
            Arc::new(ClaudeClient::new(creds.anthropic_api_key.clone())) as Arc<dyn ModelClient>,
        ),
        (
            CloudProvider::Gemini,
            Arc::new(GeminiClient::new(creds.google_api_key.clone())) as Arc<dyn ModelClient>,
        ),
        (
            CloudProvider::Groq,
            Arc::new(GroqClient::new(creds.groq_api_key.clone())) as Arc<dyn ModelClient>,
        ),
        (
            CloudProvider::OpenAi,
            Arc::new(OpenAiClient::new(creds.openai_api_key.clone())) as Arc<dyn ModelClient>,
        ),
    ];

    let prelookup = if config.auto_lookup { Some(Arc::new(PreLookup::new(creds))) } else { None };
    let orchestrator = Arc::new(Orchestrator::new(local, cloud, Arc::clone(&privacy), prelookup));

    Ok(GovernanceEngine::new(memory, privacy, orchestrator))
}
