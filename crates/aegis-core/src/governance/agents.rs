//! Agent selector: ranks specialist agents for a classified task, blending
//! the classifier's recommendation with historical success rates, and picks
//! a model tier from the task's complexity.

use super::classifier::{Classification, TaskClassifier, TaskType};
use crate::memory::store::PermanentStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Knowledge category for recorded selection decisions.
pub const CATEGORY_AGENT_DECISIONS: &str = "agent_decisions";

/// Model tier by task complexity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Fast, simple tasks.
    Haiku,
    /// Balanced default.
    Sonnet,
    /// Complex reasoning.
    Opus,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Haiku => "haiku",
            ModelTier::Sonnet => "sonnet",
            ModelTier::Opus => "opus",
        }
    }
}

/// One agent recommendation.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSelection {
    pub agent: String,
    pub suitability_score: f32,
    pub task_type: TaskType,
    pub task_confidence: f32,
    pub model_tier: ModelTier,
    pub rationale: String,
}

/// Static suitability of each agent per task type, before history blending.
fn suggested_agents(task_type: TaskType) -> &'static [(&'static str, f32)] {
    match task_type {
        TaskType::CodeModification => &[("engineer", 1.0), ("architect", 0.5), ("researcher", 0.3)],
        TaskType::CodeReview => &[("engineer", 0.95), ("architect", 0.6), ("researcher", 0.4)],
        TaskType::SystemLearning => &[("engineer", 0.9), ("architect", 0.8), ("researcher", 0.5)],
        TaskType::Cybersecurity => &[("pentester", 1.0), ("architect", 0.7), ("engineer", 0.5)],
        TaskType::Architecture => &[("architect", 1.0), ("engineer", 0.8), ("researcher", 0.4)],
        TaskType::Research => &[("researcher", 1.0), ("architect", 0.4), ("engineer", 0.3)],
        TaskType::Optimization => &[("architect", 0.95), ("engineer", 0.85), ("researcher", 0.3)],
        TaskType::Debugging => &[("engineer", 1.0), ("architect", 0.5), ("pentester", 0.3)],
        TaskType::DataAnalysis => &[("researcher", 0.95), ("architect", 0.5), ("engineer", 0.4)],
        TaskType::Documentation => &[("researcher", 0.9), ("engineer", 0.7), ("designer", 0.5)],
        TaskType::Unknown => &[("engineer", 0.5), ("researcher", 0.5)],
    }
}

/// Complexity map: which tier a task type wants at a given confidence.
fn select_model_tier(task_type: TaskType, confidence: f32) -> ModelTier {
    match task_type {
        TaskType::Architecture | TaskType::Cybersecurity | TaskType::SystemLearning => {
            if confidence >= 0.5 {
                ModelTier::Opus
            } else {
                ModelTier::Sonnet
            }
        }
        TaskType::CodeModification | TaskType::Debugging | TaskType::Optimization => {
            ModelTier::Sonnet
        }
        TaskType::Research | TaskType::DataAnalysis | TaskType::CodeReview => {
            if confidence >= 0.7 {
                ModelTier::Sonnet
            } else {
                ModelTier::Haiku
            }
        }
        TaskType::Documentation | TaskType::Unknown => ModelTier::Haiku,
    }
}

pub struct AgentSelector {
    store: Option<Arc<PermanentStore>>,
    classifier: TaskClassifier,
}

impl AgentSelector {
    pub fn new(store: Option<Arc<PermanentStore>>) -> Self {
        let classifier = TaskClassifier::new(store.clone());
        Self { store, classifier }
    }

    pub fn classifier(&self) -> &TaskClassifier {
        &self.classifier
    }

    /// Classifies the task and returns the top `max_agents` recommendations.
    pub fn select_agents(&self, task_input: &str, max_agents: usize) -> Vec<AgentSelection> {
        let classification = self.classifier.classify(task_input);
        self.select_for_classification(task_input, &classification, max_agents)
    }

    /// Ranks candidates for an already-computed classification:
    /// classifier recommendation × 0.6 + historical success rate × 0.4.
    pub fn select_for_classification(
        &self,
        task_input: &str,
        classification: &Classification,
        max_agents: usize,
    ) -> Vec<AgentSelection> {
        let candidates = suggested_agents(classification.task_type);

        let mut ranked: Vec<(&str, f32)> = candidates
            .iter()
            .map(|(agent, base)| {
                let adjusted = (base * classification.confidence).min(1.0);
                let success_rate = self
                    .store
                    .as_ref()
                    .map(|s| s.skill_success_rate(agent) as f32)
                    .unwrap_or(0.5);
                (*agent, adjusted * 0.6 + success_rate * 0.4)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(max_agents);

        let tier = select_model_tier(classification.task_type, classification.confidence);
        let selections: Vec<AgentSelection> = ranked
            .into_iter()
            .map(|(agent, score)| AgentSelection {
                agent: agent.to_string(),
                suitability_score: score,
                task_type: classification.task_type,
                task_confidence: classification.confidence,
                model_tier: tier,
                rationale: format!(
                    "{} ranked {:.2} for {} (confidence {:.2})",
                    agent,
                    score,
                    classification.task_type.as_str(),
                    classification.confidence
                ),
            })
            .collect();

        self.record_decision(task_input, classification, &selections);
        selections
    }

    /// Feeds an outcome back into the skills table so future rankings shift.
    pub fn record_outcome(&self, agent: &str, success: bool) {
        if let Some(store) = &self.store {
            let _ = store.track_skill_use(agent, success, None);
        }
    }

    fn record_decision(
        &self,
        task_input: &str,
        classification: &Classification,
        selections: &[AgentSelection],
    ) {
        let Some(store) = &self.store else { return };
        if selections.is_empty() {
            return;
        }
        let truncated: String = task_input.chars().take(200).collect();
        let record = serde_json::json!({
            "task_input": truncated,
            "selected_agents": selections.iter().map(|s| s.agent.clone()).collect::<Vec<_>>(),
            "task_type": classification.task_type.as_str(),
            "confidence": classification.confidence,
        });
        let key = format!("decision_{}", Utc::now().timestamp_millis());
        let _ = store.store_knowledge(
            CATEGORY_AGENT_DECISIONS,
            &key,
            &record.to_string(),
            7.0,
            classification.confidence.max(0.1),
            Some("agent_selector"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_tasks_route_to_pentester() {
        let selector = AgentSelector::new(None);
        let selections =
            selector.select_agents("run a vulnerability scan and identify security issues", 3);
        assert_eq!(selections.len(), 3);
        assert_eq!(selections[0].agent, "pentester");
    }

    #[test]
    fn history_shifts_ranking() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PermanentStore::open_path(dir.path().join("t.db")).unwrap());
        // The architect keeps failing; the engineer keeps succeeding.
        for _ in 0..10 {
            store.track_skill_use("architect", false, None).unwrap();
            store.track_skill_use("engineer", true, None).unwrap();
        }
        let selector = AgentSelector::new(Some(store));
        let selections = selector.select_agents("optimize the performance of this query", 2);
        assert_eq!(selections[0].agent, "engineer");
    }

    #[test]
    fn tier_follows_complexity() {
        assert_eq!(select_model_tier(TaskType::Architecture, 0.8), ModelTier::Opus);
        assert_eq!(select_model_tier(TaskType::CodeModification, 0.8), ModelTier::Sonnet);
        assert_eq!(select_model_tier(TaskType::Documentation, 0.8), ModelTier::Haiku);
        assert_eq!(select_model_tier(TaskType::Research, 0.2), ModelTier::Haiku);
    }

    #[test]
    fn unknown_tasks_still_produce_candidates() {
        let selector = AgentSelector::new(None);
        let selections = selector.select_agents("hmm", 3);
        assert!(!selections.is_empty());
        assert_eq!(selections[0].task_type, TaskType::Unknown);
    }
}
