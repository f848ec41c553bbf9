//! Adaptive communication: per-user, per-context style profiles that drive
//! system-prompt construction and response post-editing.

use crate::memory::store::PermanentStore;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Knowledge category for persisted learned profiles.
pub const CATEGORY_COMM_PROFILES: &str = "communication_profiles";

/// The ten communication contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommContext {
    CasualChat,
    Business,
    Technical,
    Support,
    System,
    Research,
    Learning,
    Executive,
    Security,
    Creative,
}

impl CommContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommContext::CasualChat => "casual_chat",
            CommContext::Business => "business",
            CommContext::Technical => "technical",
            CommContext::Support => "support",
            CommContext::System => "system",
            CommContext::Research => "research",
            CommContext::Learning => "learning",
            CommContext::Executive => "executive",
            CommContext::Security => "security",
            CommContext::Creative => "creative",
        }
    }
}

/// Style dimensions for one user in one context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationProfile {
    pub context: CommContext,
    /// 0.0 casual .. 1.0 formal.
    pub formality: f32,
    /// 0.0 none .. 1.0 deep.
    pub empathy: f32,
    /// 0.0 simple .. 1.0 expert.
    pub technical_depth: f32,
    /// 0.0 brief .. 1.0 detailed.
    pub verbosity: f32,
    pub response_speed_priority: bool,
    /// "direct", "guided", or "detailed".
    pub explanation_style: String,
    /// "direct", "cautious", or "humble".
    pub confidence_expression: String,
    /// "formal", "casual", or "empathetic".
    pub error_handling: String,
    /// 0.0 robotic .. 1.0 personable.
    pub personality_expression: f32,
}

impl CommunicationProfile {
    /// Clamps every numeric dimension to [0, 1].
    pub fn clamp(&mut self) {
        self.formality = self.formality.clamp(0.0, 1.0);
        self.empathy = self.empathy.clamp(0.0, 1.0);
        self.technical_depth = self.technical_depth.clamp(0.0, 1.0);
        self.verbosity = self.verbosity.clamp(0.0, 1.0);
        self.personality_expression = self.personality_expression.clamp(0.0, 1.0);
    }
}

fn profile(
    context: CommContext,
    formality: f32,
    empathy: f32,
    technical_depth: f32,
    verbosity: f32,
    speed: bool,
    explanation: &str,
    confidence: &str,
    errors: &str,
    personality: f32,
) -> CommunicationProfile {
    CommunicationProfile {
        context,
        formality,
        empathy,
        technical_depth,
        verbosity,
        response_speed_priority: speed,
        explanation_style: explanation.to_string(),
        confidence_expression: confidence.to_string(),
        error_handling: errors.to_string(),
        personality_expression: personality,
    }
}

/// Default profile for each context.
pub fn default_profile(context: CommContext) -> CommunicationProfile {
    match context {
        CommContext::CasualChat => {
            profile(context, 0.3, 0.8, 0.3, 0.7, false, "guided", "direct", "casual", 0.9)
        }
        CommContext::Business => {
            profile(context, 0.9, 0.4, 0.6, 0.5, true, "direct", "direct", "formal", 0.2)
        }
        CommContext::Technical => {
            profile(context, 0.7, 0.2, 0.95, 0.8, false, "detailed", "cautious", "formal", 0.1)
        }
        CommContext::Support => {
            profile(context, 0.6, 0.9, 0.5, 0.7, false, "guided", "humble", "empathetic", 0.7)
        }
        CommContext::System => {
            profile(context, 1.0, 0.0, 0.95, 0.2, true, "direct", "direct", "formal", 0.0)
        }
        CommContext::Research => {
            profile(context, 0.8, 0.3, 0.9, 0.9, false, "detailed", "cautious", "formal", 0.3)
        }
        CommContext::Learning => {
            profile(context, 0.5, 0.7, 0.4, 0.8, false, "guided", "humble", "empathetic", 0.8)
        }
        CommContext::Executive => {
            profile(context, 0.95, 0.5, 0.3, 0.3, true, "direct", "direct", "formal", 0.1)
        }
        CommContext::Security => {
            profile(context, 1.0, 0.1, 0.95, 0.6, true, "direct", "cautious", "formal", 0.0)
        }
        CommContext::Creative => {
            profile(context, 0.2, 0.6, 0.2, 0.9, false, "guided", "direct", "casual", 1.0)
        }
    }
}

static CONTEXT_KEYWORDS: Lazy<Vec<(CommContext, Vec<&'static str>)>> = Lazy::new(|| {
    vec![
        (
            CommContext::Business,
            vec![
                "quarterly", "revenue", "roi", "stakeholder", "deliverable", "meeting", "budget",
                "deadline", "proposal", "contract", "invoice", "payment", "client", "customer",
                "business",
            ],
        ),
        (
            CommContext::Technical,
            vec![
                "code", "function", "debug", "error", "algorithm", "database", "api", "server",
                "deploy", "git", "python", "rust", "implementation", "architecture", "performance",
            ],
        ),
        (
            CommContext::Support,
            vec![
                "help", "problem", "issue", "not working", "error", "stuck", "confused", "can't",
                "how do i", "what's", "explain", "understand", "don't know",
            ],
        ),
        (
            CommContext::Learning,
            vec![
                "learn", "teach", "how", "why", "explain", "understand", "tutorial", "example",
                "what is", "study", "course",
            ],
        ),
        (
            CommContext::Research,
            vec![
                "research", "study", "paper", "analysis", "data", "findings", "hypothesis",
                "methodology", "conclusion", "evidence",
            ],
        ),
        (
            CommContext::Security,
            vec![
                "security", "threat", "vulnerability", "exploit", "breach", "encryption",
                "authentication", "certificate", "attack", "malware", "penetration",
            ],
        ),
        (
            CommContext::Creative,
            vec![
                "create", "design", "art", "story", "poem", "music", "imagine", "idea",
                "inspiration", "creative", "visual",
            ],
        ),
    ]
});

static EMPATHETIC_PHRASES: &[&str] =
    &["I understand that", "I can see why", "That must be", "I appreciate that you"];

static CONTRACTIONS: &[(&str, &str)] = &[
    ("can't", "cannot"),
    ("don't", "do not"),
    ("won't", "will not"),
    ("you're", "you are"),
    ("it's", "it is"),
    ("isn't", "is not"),
    ("didn't", "did not"),
];

/// Feedback dimensions a user (or the quality checker) can report.
#[derive(Debug, Clone, Copy, Default)]
pub struct StyleFeedback {
    pub too_formal: bool,
    pub too_casual: bool,
    pub not_empathetic: bool,
    pub too_empathetic: bool,
}

/// A post-edited response: what goes to the user plus the untruncated form
/// kept for storage.
#[derive(Debug, Clone)]
pub struct AdaptedResponse {
    pub text: String,
    pub full_text: String,
}

pub struct AdaptiveComm {
    store: Option<Arc<PermanentStore>>,
    user_profiles: DashMap<String, CommunicationProfile>,
}

impl AdaptiveComm {
    pub fn new(store: Option<Arc<PermanentStore>>) -> Self {
        Self { store, user_profiles: DashMap::new() }
    }

    /// Detects the communication context of an input. Metadata hints
    /// (`role=executive`, `system_call=true`) override keyword scores; a weak
    /// winning score falls back to the user's last-learned profile.
    pub fn detect_context(
        &self,
        user_input: &str,
        user_id: &str,
        metadata: &HashMap<String, String>,
    ) -> (CommContext, f32) {
        if metadata.get("system_call").map(|v| v == "true").unwrap_or(false) {
            return (CommContext::System, 0.95);
        }
        if metadata.get("role").map(|v| v == "executive").unwrap_or(false) {
            return (CommContext::Executive, 0.9);
        }

        let lower = user_input.to_lowercase();
        let mut best = (CommContext::CasualChat, 0.0_f32);
        for (context, keywords) in CONTEXT_KEYWORDS.iter() {
            let matches = keywords.iter().filter(|kw| lower.contains(*kw)).count();
            let score = matches as f32 / keywords.len() as f32;
            if score > best.1 {
                best = (*context, score);
            }
        }

        if best.1 < 0.3 {
            if let Some(learned) = self.learned_context(user_id) {
                return (learned, 0.7);
            }
            if best.1 == 0.0 {
                return (CommContext::CasualChat, 0.5);
            }
        }
        best
    }

    fn learned_context(&self, user_id: &str) -> Option<CommContext> {
        if let Some(profile) = self.user_profiles.get(user_id) {
            return Some(profile.context);
        }
        self.read_through(user_id).map(|p| p.context)
    }

    /// Profile lookup: learned user profile first (in-memory, then stored),
    /// else the context default.
    pub fn get_profile(&self, user_id: &str, context: CommContext) -> CommunicationProfile {
        if let Some(profile) = self.user_profiles.get(user_id) {
            return profile.clone();
        }
        if let Some(stored) = self.read_through(user_id) {
            self.user_profiles.insert(user_id.to_string(), stored.clone());
            return stored;
        }
        default_profile(context)
    }

    fn read_through(&self, user_id: &str) -> Option<CommunicationProfile> {
        let store = self.store.as_ref()?;
        let entry = store
            .recall_knowledge(CATEGORY_COMM_PROFILES, &format!("user_{}", user_id))
            .ok()
            .flatten()?;
        let mut profile: CommunicationProfile = serde_json::from_str(&entry.value).ok()?;
        profile.clamp();
        Some(profile)
    }

    /// Converts the profile's numeric dimensions into imperative instructions
    /// for the model.
    pub fn generate_system_prompt(&self, profile: &CommunicationProfile) -> String {
        let formality = match profile.formality {
            f if f < 0.3 => "Be casual and conversational.",
            f if f < 0.6 => "Be reasonably professional but friendly.",
            f if f < 0.8 => "Be professional and businesslike.",
            _ => "Be formal and official.",
        };
        let empathy = match profile.empathy {
            e if e < 0.2 => "Focus on facts and efficiency.",
            e if e < 0.5 => "Maintain professional courtesy.",
            e if e < 0.8 => "Show genuine concern for the user's situation.",
            _ => "Demonstrate deep emotional intelligence and empathy.",
        };
        let technical = match profile.technical_depth {
            t if t > 0.7 => "Provide detailed technical information. Assume technical knowledge.",
            t if t > 0.4 => "Balance technical accuracy with accessibility.",
            _ => "Avoid jargon. Explain in simple terms.",
        };
        let verbosity = match profile.verbosity {
            v if v > 0.8 => "Provide comprehensive explanations with examples.",
            v if v > 0.5 => "Provide balanced explanations.",
            _ => "Keep responses concise and to the point.",
        };
        let confidence = match profile.confidence_expression.as_str() {
            "cautious" => "Acknowledge uncertainty when appropriate. State confidence levels.",
            "humble" => "Be humble about limitations. Admit when unsure.",
            _ => "State answers confidently when appropriate.",
        };

        format!(
            "You are an adaptive assistant with persistent memory.\n\
             COMMUNICATION CONTEXT: {}\n\
             TONE: {}\n\
             EMPATHY: {}\n\
             TECHNICAL DEPTH: {}\n\
             LENGTH: {}\n\
             CONFIDENCE: {}\n\
             STYLE: {} explanations; {} error handling; personality level {:.0}%.\n\
             Always be honest about limitations and learn from feedback.",
            profile.context.as_str(),
            formality,
            empathy,
            technical,
            verbosity,
            confidence,
            profile.explanation_style,
            profile.error_handling,
            profile.personality_expression * 100.0
        )
    }

    /// Post-edits a draft to match the profile. The full text is retained
    /// alongside any truncated rendering.
    pub fn adapt_response(&self, response: &str, profile: &CommunicationProfile) -> AdaptedResponse {
        let mut text = response.to_string();

        if profile.formality > 0.8 {
            for (contraction, expansion) in CONTRACTIONS {
                text = text.replace(contraction, expansion);
                let capitalized = capitalize(contraction);
                text = text.replace(&capitalized, &capitalize(expansion));
            }
        }

        if profile.formality < 0.4
            && !text.contains('!')
            && !text.contains("😊")
            && text.lines().count() > 3
        {
            text.push_str("\n\nHope that helps! Let me know if you have questions.");
        }

        if profile.empathy > 0.7 && !EMPATHETIC_PHRASES.iter().any(|p| text.contains(p)) {
            text = format!("I understand your concern. {}", text);
        }

        let full_text = text.clone();
        if profile.verbosity < 0.4 {
            let lines: Vec<&str> = text.lines().collect();
            if lines.len() > 5 {
                text = format!("{}\n...", lines[..3].join("\n"));
            }
        }

        AdaptedResponse { text, full_text }
    }

    /// Applies explicit style feedback: the named dimension shifts by ×0.8 or
    /// ×1.2 (clamped to [0, 1]) and the profile is persisted.
    pub fn learn_user_style(&self, user_id: &str, context: CommContext, feedback: &StyleFeedback) {
        let mut profile = self.get_profile(user_id, context);

        if feedback.too_formal {
            profile.formality *= 0.8;
        }
        if feedback.too_casual {
            profile.formality *= 1.2;
        }
        if feedback.not_empathetic {
            profile.empathy *= 1.2;
        }
        if feedback.too_empathetic {
            profile.empathy *= 0.8;
        }
        profile.clamp();

        if let Some(store) = &self.store {
            if let Ok(serialized) = serde_json::to_string(&profile) {
                let _ = store.store_knowledge(
                    CATEGORY_COMM_PROFILES,
                    &format!("user_{}", user_id),
                    &serialized,
                    8.0,
                    0.8,
                    Some("adaptive_comm"),
                );
            }
        }
        info!("learned communication adjustment for {}", user_id);
        self.user_profiles.insert(user_id.to_string(), profile);
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comm() -> AdaptiveComm {
        AdaptiveComm::new(None)
    }

    #[test]
    fn detects_technical_context() {
        let (context, score) =
            comm().detect_context("debug this rust function, the api error is in the server code", "u", &HashMap::new());
        assert_eq!(context, CommContext::Technical);
        assert!(score > 0.0);
    }

    #[test]
    fn metadata_hints_override() {
        let meta = HashMap::from([("system_call".to_string(), "true".to_string())]);
        let (context, score) = comm().detect_context("anything", "u", &meta);
        assert_eq!(context, CommContext::System);
        assert!(score >= 0.9);

        let meta = HashMap::from([("role".to_string(), "executive".to_string())]);
        let (context, _) = comm().detect_context("anything", "u", &meta);
        assert_eq!(context, CommContext::Executive);
    }

    #[test]
    fn unmatched_input_defaults_to_casual() {
        let (context, score) = comm().detect_context("zzz", "u", &HashMap::new());
        assert_eq!(context, CommContext::CasualChat);
        assert_eq!(score, 0.5);
    }

    #[test]
    fn formal_profile_expands_contractions() {
        let comm = comm();
        let profile = default_profile(CommContext::Business);
        let adapted = comm.adapt_response("I can't do that. It's blocked. Don't retry.", &profile);
        assert!(adapted.text.contains("cannot"));
        assert!(adapted.text.contains("It is blocked"));
        assert!(adapted.text.contains("Do not retry"));
    }

    #[test]
    fn empathetic_profile_prepends_acknowledgement() {
        let comm = comm();
        let profile = default_profile(CommContext::Support);
        let adapted = comm.adapt_response("Restart the router.", &profile);
        assert!(adapted.text.starts_with("I understand your concern."));
    }

    #[test]
    fn low_verbosity_truncates_but_keeps_full_text() {
        let comm = comm();
        let profile = default_profile(CommContext::Executive);
        let long: String = (0..8).map(|i| format!("line {}\n", i)).collect();
        let adapted = comm.adapt_response(&long, &profile);
        assert!(adapted.text.lines().count() <= 4);
        assert!(adapted.text.ends_with("..."));
        assert_eq!(adapted.full_text.lines().count(), 8);
    }

    #[test]
    fn system_prompt_reflects_dimensions() {
        let comm = comm();
        let technical = comm.generate_system_prompt(&default_profile(CommContext::Technical));
        assert!(technical.contains("Assume technical knowledge"));
        assert!(technical.contains("Acknowledge uncertainty"));

        let casual = comm.generate_system_prompt(&default_profile(CommContext::CasualChat));
        assert!(casual.contains("casual and conversational"));
    }

    #[test]
    fn feedback_learning_shifts_and_clamps() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            Arc::new(PermanentStore::open_path(dir.path().join("t.db")).unwrap());
        let comm = AdaptiveComm::new(Some(Arc::clone(&store)));

        let before = comm.get_profile("u1", CommContext::Business).formality;
        comm.learn_user_style(
            "u1",
            CommContext::Business,
            &StyleFeedback { too_formal: true, ..Default::default() },
        );
        let after = comm.get_profile("u1", CommContext::Business).formality;
        assert!((after - before * 0.8).abs() < 1e-6);

        // A fresh instance reads the learned profile through the store.
        let fresh = AdaptiveComm::new(Some(store));
        let reread = fresh.get_profile("u1", CommContext::Business).formality;
        assert!((reread - after).abs() < 1e-6);
    }
}
