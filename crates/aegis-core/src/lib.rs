//! aegis-core: privacy-first, self-governing assistant core.
//!
//! The library composes five subsystems behind one public entry point
//! ([`GovernanceEngine::process_input`]): the multi-backend orchestrator with
//! consensus synthesis, the knowledge pre-lookup pipeline, the tiered memory
//! (CORTEX + permanent store + generative compression), the governance layer
//! (classification, agent selection, adaptive communication, quality
//! checking), and the privacy controller that gates every cloud call.

mod bootstrap;
mod config;
pub mod governance;
pub mod knowledge;
pub mod memory;
pub mod models;
pub mod orchestrator;
mod privacy;
mod shared;

pub use bootstrap::build_engine;
pub use config::{CoreConfig, Credentials};

// Shared data model.
pub use shared::{
    CloudProvider, ContextMessage, ConversationTurn, KnowledgeEntry, Metadata, DEFAULT_USER_ID,
};

// Privacy controller.
pub use privacy::{
    ApprovalCallback, PrivacyController, PrivacyMode, PrivacyStatus, SessionLogEntry,
};

// Model backends.
pub use models::{
    ClaudeClient, GeminiClient, GroqClient, ModelClient, ModelKind, ModelStatus, OllamaClient,
    OpenAiClient, PrivacyClass,
};

// Knowledge pre-lookup.
pub use knowledge::{
    CyberIntel, EncyclopediaLookup, KnowledgeProvider, LookupDetector, NewsLookup, PreLookup,
    StockLookup, TechPulse, WeatherLookup, WebLookup,
};

// Tiered memory.
pub use memory::{
    Cortex, CortexStats, ImportanceEvaluator, MemoryItem, MemoryLayer, MemoryStats,
    PermanentStore, RecallHit, SkillPerformance, StoreError, StoreResult, Thunk, ThunkCompressor,
    ThunkEngine, ThunkKind, ThunkStats, TickStats, UnifiedMemory,
};
pub use memory::compression::ClusterItem;

// Governance.
pub use governance::{
    AdaptiveComm, AgentSelection, AgentSelector, Classification, CommContext,
    CommunicationProfile, GovernanceEngine, GovernanceError, GovernanceMeta, GovernanceResponse,
    ModelTier, ProfileSummary, QualityAssessment, QualityChecker, QualityLevel, QualitySummary,
    StyleFeedback, TaskClassifier, TaskType,
};

// Orchestrator.
pub use orchestrator::{BackendCounters, GenerateOptions, GenerationOutcome, Orchestrator};
