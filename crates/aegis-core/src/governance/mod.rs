//! Governance engine: the public entry point that composes context
//! detection, task classification, agent selection, orchestration, quality
//! checking, response adaptation, and learning for every request.

pub mod agents;
pub mod classifier;
pub mod comm;
pub mod quality;

pub use agents::{AgentSelection, AgentSelector, ModelTier};
pub use classifier::{Classification, TaskClassifier, TaskType};
pub use comm::{AdaptiveComm, CommContext, CommunicationProfile, StyleFeedback};
pub use quality::{QualityAssessment, QualityChecker, QualityLevel};

use crate::memory::store::SkillPerformance;
use crate::memory::UnifiedMemory;
use crate::orchestrator::{GenerateOptions, GenerationOutcome, Orchestrator};
use crate::privacy::PrivacyController;
use crate::shared::{ContextMessage, ConversationTurn};
use futures_util::StreamExt;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Knowledge category for the per-user interaction history.
pub const CATEGORY_USER_HISTORY: &str = "user_history";

const INTERACTION_HISTORY_CAP: usize = 100;

/// Why a request could not be served.
#[derive(Debug, thiserror::Error)]
pub enum GovernanceError {
    #[error("empty user input")]
    EmptyInput,
    /// Every eligible backend returned nothing. Carries a profile-aware
    /// message the API surface may include in its error body.
    #[error("all model backends failed: {message}")]
    AllBackendsFailed { message: String },
}

/// The rich response object returned for every processed request.
#[derive(Debug, Clone, Serialize)]
pub struct GovernanceResponse {
    pub response: String,
    pub governance: GovernanceMeta,
    pub communication_profile: ProfileSummary,
    pub quality: QualitySummary,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub models_used: Vec<String>,
    /// Name of the first backend that contributed (for the simple HTTP body).
    pub provider: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GovernanceMeta {
    pub communication_context: CommContext,
    pub context_confidence: f32,
    pub task_type: TaskType,
    pub task_confidence: f32,
    pub selected_agents: Vec<AgentSelection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    pub formality: f32,
    pub empathy: f32,
    pub technical_depth: f32,
    pub verbosity: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct QualitySummary {
    pub level: QualityLevel,
    pub is_clean: bool,
    pub flags: Vec<String>,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize)]
struct InteractionRecord {
    timestamp: DateTime<Utc>,
    context: CommContext,
    task_type: TaskType,
    quality_level: QualityLevel,
}

/// Everything decided before generation: context, profile, classification,
/// agents, and the prepared generation call.
struct RequestPlan {
    context: CommContext,
    context_confidence: f32,
    profile: CommunicationProfile,
    classification: Classification,
    selections: Vec<AgentSelection>,
    generation_context: Vec<ContextMessage>,
    opts: GenerateOptions,
}

pub struct GovernanceEngine {
    memory: Arc<UnifiedMemory>,
    privacy: Arc<PrivacyController>,
    orchestrator: Arc<Orchestrator>,
    selector: AgentSelector,
    comm: AdaptiveComm,
    quality: QualityChecker,
    interaction_history: DashMap<String, Vec<InteractionRecord>>,
}

impl GovernanceEngine {
    pub fn new(
        memory: Arc<UnifiedMemory>,
        privacy: Arc<PrivacyController>,
        orchestrator: Arc<Orchestrator>,
    ) -> Self {
        let store = memory.store();
        Self {
            memory,
            privacy,
            orchestrator,
            selector: AgentSelector::new(Some(Arc::clone(&store))),
            comm: AdaptiveComm::new(Some(Arc::clone(&store))),
            quality: QualityChecker::new(Some(store)),
            interaction_history: DashMap::new(),
        }
    }

    pub fn privacy(&self) -> Arc<PrivacyController> {
        Arc::clone(&self.privacy)
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        Arc::clone(&self.orchestrator)
    }

    pub fn memory(&self) -> Arc<UnifiedMemory> {
        Arc::clone(&self.memory)
    }

    /// Best-effort classification preview (used by the streaming surface to
    /// send an early `task_classification` frame).
    pub fn classify_preview(&self, input: &str) -> (Classification, Vec<AgentSelection>) {
        let classification = self.selector.classifier().classify(input);
        let selections = self.selector.select_for_classification(input, &classification, 3);
        (classification, selections)
    }

    /// Processes one request with full governance. `history` is the caller's
    /// in-memory conversation context (cleared by the API's `/clear`).
    pub async fn process_input(
        &self,
        user_input: &str,
        user_id: &str,
        context_hints: &HashMap<String, String>,
        history: &[ContextMessage],
    ) -> Result<GovernanceResponse, GovernanceError> {
        let user_input = user_input.trim();
        let plan = self.plan_request(user_input, user_id, context_hints, history)?;

        let outcome = self
            .orchestrator
            .generate(user_input, &plan.generation_context, &plan.opts)
            .await
            .ok_or_else(|| GovernanceError::AllBackendsFailed {
                message: fallback_reply(&plan.profile, plan.classification.task_type),
            })?;

        Ok(self.complete_request(user_input, user_id, context_hints, plan, outcome))
    }

    /// Streaming variant: when the local backend can stream, every chunk is
    /// forwarded through `sink` as it arrives while the full draft
    /// accumulates; the rest of the pipeline (quality check, post-edit,
    /// persistence) then runs on the accumulated text. Falls back to plain
    /// generation when streaming is unavailable or yields nothing.
    pub async fn process_input_streaming(
        &self,
        user_input: &str,
        user_id: &str,
        context_hints: &HashMap<String, String>,
        history: &[ContextMessage],
        mut sink: impl FnMut(&str) + Send,
    ) -> Result<GovernanceResponse, GovernanceError> {
        let user_input = user_input.trim();
        let plan = self.plan_request(user_input, user_id, context_hints, history)?;

        let mut streamed: Option<GenerationOutcome> = None;
        if let Some(mut stream) = self
            .orchestrator
            .generate_stream_local(user_input, &plan.generation_context, &plan.opts)
            .await
        {
            let mut accumulated = String::new();
            while let Some(chunk) = stream.next().await {
                sink(&chunk);
                accumulated.push_str(&chunk);
            }
            if !accumulated.trim().is_empty() {
                streamed = Some(GenerationOutcome {
                    text: accumulated,
                    models_used: vec![self.orchestrator.local_name().to_string()],
                    knowledge_injected: false,
                });
            }
        }

        let outcome = match streamed {
            Some(outcome) => outcome,
            None => self
                .orchestrator
                .generate(user_input, &plan.generation_context, &plan.opts)
                .await
                .ok_or_else(|| GovernanceError::AllBackendsFailed {
                    message: fallback_reply(&plan.profile, plan.classification.task_type),
                })?,
        };

        Ok(self.complete_request(user_input, user_id, context_hints, plan, outcome))
    }

    /// Pre-generation steps: context detection, profile, classification,
    /// agent selection, and the prepared generation call.
    fn plan_request(
        &self,
        user_input: &str,
        user_id: &str,
        context_hints: &HashMap<String, String>,
        history: &[ContextMessage],
    ) -> Result<RequestPlan, GovernanceError> {
        if user_input.is_empty() {
            return Err(GovernanceError::EmptyInput);
        }

        // 1–2. Communication context and profile.
        let (context, context_confidence) =
            self.comm.detect_context(user_input, user_id, context_hints);
        let profile = self.comm.get_profile(user_id, context);

        // 3–4. Task classification and agent selection.
        let classification = self.selector.classifier().classify(user_input);
        let selections = self.selector.select_for_classification(user_input, &classification, 3);
        info!(
            "governance: context={} task={} agents={:?}",
            context.as_str(),
            classification.task_type.as_str(),
            selections.iter().map(|s| s.agent.as_str()).collect::<Vec<_>>()
        );

        // 5. System prompt from the profile.
        let system_prompt = self.comm.generate_system_prompt(&profile);
        let mut generation_context = Vec::with_capacity(history.len() + 1);
        generation_context.push(ContextMessage::system(system_prompt));
        generation_context.extend_from_slice(history);
        let opts = GenerateOptions {
            max_tokens: max_tokens_for(&profile),
            ..GenerateOptions::default()
        };

        Ok(RequestPlan {
            context,
            context_confidence,
            profile,
            classification,
            selections,
            generation_context,
            opts,
        })
    }

    /// Post-generation steps: quality check, post-edit, persistence, and the
    /// rich response object.
    fn complete_request(
        &self,
        user_input: &str,
        user_id: &str,
        context_hints: &HashMap<String, String>,
        plan: RequestPlan,
        outcome: GenerationOutcome,
    ) -> GovernanceResponse {
        // 6. Quality check on the raw draft.
        let assessment = self.quality.check_response(&outcome.text, user_input);

        // 7. Post-edit by profile; the full form is what gets stored.
        let adapted = self.comm.adapt_response(&outcome.text, &plan.profile);

        // 8. Persist and learn.
        self.store_and_learn(
            user_id,
            user_input,
            &adapted.full_text,
            plan.context,
            &plan.classification,
            &plan.selections,
            &assessment,
            &outcome.models_used,
            context_hints,
        );

        let provider = outcome.models_used.first().cloned().unwrap_or_default();
        GovernanceResponse {
            response: adapted.text,
            governance: GovernanceMeta {
                communication_context: plan.context,
                context_confidence: plan.context_confidence,
                task_type: plan.classification.task_type,
                task_confidence: plan.classification.confidence,
                selected_agents: plan.selections,
            },
            communication_profile: ProfileSummary {
                formality: plan.profile.formality,
                empathy: plan.profile.empathy,
                technical_depth: plan.profile.technical_depth,
                verbosity: plan.profile.verbosity,
            },
            quality: QualitySummary {
                level: assessment.quality_level,
                is_clean: assessment.is_clean,
                flags: assessment.flags,
                confidence: assessment.confidence,
            },
            timestamp: Utc::now(),
            user_id: user_id.to_string(),
            models_used: outcome.models_used,
            provider,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn store_and_learn(
        &self,
        user_id: &str,
        user_input: &str,
        response: &str,
        context: CommContext,
        classification: &Classification,
        selections: &[AgentSelection],
        assessment: &QualityAssessment,
        models_used: &[String],
        context_hints: &HashMap<String, String>,
    ) {
        // Cortex capture (tick + sync piggyback), then the full conversation
        // turn with models and outcome in the permanent log.
        self.memory.capture(user_input, None, Some(classification.task_type.as_str()), None);
        let turn = ConversationTurn::new(user_input, response)
            .with_topics(vec![
                context.as_str().to_string(),
                classification.task_type.as_str().to_string(),
            ])
            .with_models(models_used.to_vec())
            .with_success(assessment.is_clean);
        if let Err(err) = self.memory.store().store_conversation(&turn) {
            warn!("conversation store failed: {}", err);
        }

        if let Some(top) = selections.first() {
            self.selector.record_outcome(&top.agent, assessment.is_clean);
        }

        // Interaction history, capped per user, mirrored into knowledge.
        let record = InteractionRecord {
            timestamp: Utc::now(),
            context,
            task_type: classification.task_type,
            quality_level: assessment.quality_level,
        };
        let mut history = self.interaction_history.entry(user_id.to_string()).or_default();
        history.push(record);
        if history.len() > INTERACTION_HISTORY_CAP {
            let excess = history.len() - INTERACTION_HISTORY_CAP;
            history.drain(..excess);
        }
        if let Ok(serialized) = serde_json::to_string(&*history) {
            let result = self.memory.store().store_knowledge(
                CATEGORY_USER_HISTORY,
                &format!("{}_interactions", user_id),
                &serialized,
                5.0,
                0.9,
                Some("governance"),
            );
            if let Err(err) = result {
                warn!("interaction history store failed: {}", err);
            }
        }

        // Explicit style feedback arrives as a context hint.
        if let Some(feedback) = context_hints.get("feedback") {
            let feedback = StyleFeedback {
                too_formal: feedback == "too_formal",
                too_casual: feedback == "too_casual",
                not_empathetic: feedback == "not_empathetic",
                too_empathetic: feedback == "too_empathetic",
            };
            self.comm.learn_user_style(user_id, context, &feedback);
        }
    }

    /// Per-user turn history for the API surface, most recent first.
    pub fn task_history(&self, limit: usize) -> Vec<ConversationTurn> {
        self.memory.store().get_conversation_context(limit).unwrap_or_default()
    }

    /// Agent performance map for the API surface.
    pub fn agent_performance(&self) -> HashMap<String, SkillPerformance> {
        self.memory.store().skill_performance().unwrap_or_default()
    }

    /// Integer counters across all memory systems.
    pub fn brain_stats(&self) -> serde_json::Value {
        let store_stats = self.memory.store().get_memory_stats().ok();
        let cortex_stats = self.memory.cortex().get_stats();
        let thunk_stats = self.memory.thunks().get_stats();
        serde_json::json!({
            "store": store_stats,
            "cortex": cortex_stats,
            "thunks": thunk_stats,
            "integration": self.memory.integration_stats(),
        })
    }
}

/// Max tokens scaled by the profile's verbosity.
fn max_tokens_for(profile: &CommunicationProfile) -> u32 {
    const BASE: u32 = 2000;
    if profile.verbosity > 0.8 {
        BASE * 3 / 2
    } else if profile.verbosity > 0.5 {
        BASE
    } else {
        BASE / 2
    }
}

/// Profile-aware canned reply used when every backend failed.
fn fallback_reply(profile: &CommunicationProfile, task_type: TaskType) -> String {
    if profile.context == CommContext::System {
        format!("ERROR: unable to process {} task", task_type.as_str())
    } else if profile.empathy > 0.6 {
        "I apologize, but I'm having difficulty generating a response at the moment. \
         Could you try again?"
            .to_string()
    } else {
        "Unable to generate a response. Please retry or check the logs.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::comm::default_profile;

    #[test]
    fn max_tokens_scales_with_verbosity() {
        assert_eq!(max_tokens_for(&default_profile(CommContext::Research)), 3000);
        assert_eq!(max_tokens_for(&default_profile(CommContext::CasualChat)), 2000);
        assert_eq!(max_tokens_for(&default_profile(CommContext::Executive)), 1000);
    }

    #[test]
    fn fallback_reply_matches_profile() {
        let system = fallback_reply(&default_profile(CommContext::System), TaskType::Debugging);
        assert!(system.starts_with("ERROR:"));
        let support = fallback_reply(&default_profile(CommContext::Support), TaskType::Unknown);
        assert!(support.contains("apologize"));
        let business = fallback_reply(&default_profile(CommContext::Business), TaskType::Unknown);
        assert!(business.starts_with("Unable"));
    }
}
