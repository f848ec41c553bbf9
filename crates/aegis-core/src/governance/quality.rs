//! Response quality checker: repeat detection, claim verification,
//! contradiction detection, and limitation honesty.
//!
//! Honesty over precision: when a response cannot be verified, the checker
//! wants the response to say so rather than flagging nothing.

use crate::memory::store::{tokenize, PermanentStore};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Knowledge category for verified facts consulted by contradiction checks.
pub const CATEGORY_VERIFIED_FACTS: &str = "verified_facts";
/// Knowledge category where assessments are self-recorded.
pub const CATEGORY_QUALITY: &str = "response_quality";

const SIMILARITY_THRESHOLD: f64 = 0.75;

/// Quality assessment levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    Verified,
    LikelyAccurate,
    Unverified,
    HonestLimitation,
    Suspicious,
    Repeat,
    Contradicts,
}

impl QualityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLevel::Verified => "verified",
            QualityLevel::LikelyAccurate => "likely_accurate",
            QualityLevel::Unverified => "unverified",
            QualityLevel::HonestLimitation => "honest_limitation",
            QualityLevel::Suspicious => "suspicious",
            QualityLevel::Repeat => "repeat",
            QualityLevel::Contradicts => "contradicts",
        }
    }

    /// Fixed confidence table per level.
    pub fn confidence(&self) -> f32 {
        match self {
            QualityLevel::Verified => 0.95,
            QualityLevel::HonestLimitation => 0.85,
            QualityLevel::LikelyAccurate => 0.75,
            QualityLevel::Unverified => 0.7,
            QualityLevel::Suspicious => 0.4,
            QualityLevel::Repeat => 0.5,
            QualityLevel::Contradicts => 0.1,
        }
    }
}

/// Full assessment of one `(input, response)` pair.
#[derive(Debug, Clone, Serialize)]
pub struct QualityAssessment {
    pub quality_level: QualityLevel,
    pub is_clean: bool,
    pub flags: Vec<String>,
    pub recommendations: Vec<String>,
    pub confidence: f32,
    pub verified_claims: Vec<String>,
    pub unverified_claims: Vec<String>,
}

static HEDGING_PHRASES: &[&str] = &[
    "i think", "i believe", "my understanding", "could be", "might be", "seems like",
    "appears to", "likely",
];

static LIMITATION_PHRASES: &[&str] = &[
    "i cannot verify",
    "i'm not certain",
    "i lack",
    "i don't have",
    "i'm unable to",
    "limitation",
    "cannot confirm",
    "unverified",
    "please verify",
    "independently confirm",
    "cannot predict",
];

static UNCERTAIN_TRIGGERS: &[&str] = &[
    "future", "prediction", "forecast", "will happen", "private", "internal", "proprietary",
    "secret", "latest", "tomorrow", "next week",
];

pub struct QualityChecker {
    store: Option<Arc<PermanentStore>>,
}

impl QualityChecker {
    pub fn new(store: Option<Arc<PermanentStore>>) -> Self {
        Self { store }
    }

    /// Runs all four checks and derives the level/confidence.
    pub fn check_response(&self, response: &str, task_input: &str) -> QualityAssessment {
        let mut assessment = QualityAssessment {
            quality_level: QualityLevel::Unverified,
            is_clean: true,
            flags: Vec::new(),
            recommendations: Vec::new(),
            confidence: 0.7,
            verified_claims: Vec::new(),
            unverified_claims: Vec::new(),
        };

        // 1. Repeat detection.
        if let Some(similarity) = self.find_repeat(response, task_input) {
            assessment.quality_level = QualityLevel::Repeat;
            assessment.is_clean = false;
            assessment
                .flags
                .push(format!("REPEAT: {:.0}% similar to a previous response", similarity * 100.0));
            assessment
                .recommendations
                .push("Provide a fresh perspective instead of repeating the previous answer".into());
        }

        // 2. Claim verification.
        let (verified, unverified) = self.verify_claims(response);
        let has_unverified = !unverified.is_empty();
        assessment.verified_claims = verified;
        assessment.unverified_claims = unverified;
        if has_unverified && !acknowledges_limitation(response) {
            assessment
                .flags
                .push("UNVERIFIED_CLAIMS: contains unverified statements without acknowledgment".into());
            assessment
                .recommendations
                .push("Add a disclaimer about unverified claims or research them first".into());
        }

        // 3. Contradiction detection.
        let contradictions = self.find_contradictions(response);
        if !contradictions.is_empty() {
            assessment.quality_level = QualityLevel::Contradicts;
            assessment.is_clean = false;
            assessment
                .flags
                .push("CONTRADICTS_KNOWLEDGE: response conflicts with verified knowledge".into());
            for fact in contradictions {
                assessment.recommendations.push(format!("Reconcile with verified fact: {}", fact));
            }
        }

        // 4. Limitation honesty.
        let should_acknowledge = UNCERTAIN_TRIGGERS
            .iter()
            .any(|kw| task_input.to_lowercase().contains(kw));
        if should_acknowledge {
            if acknowledges_limitation(response) {
                assessment.quality_level = QualityLevel::HonestLimitation;
                assessment
                    .flags
                    .push("HONEST_LIMITATION: appropriately acknowledges capability boundary".into());
            } else {
                assessment.flags.push("MISSING_LIMITATION: should acknowledge but doesn't".into());
                assessment
                    .recommendations
                    .push("State explicitly what cannot be verified and why".into());
            }
        }

        // Final level for clean responses.
        if assessment.flags.is_empty() {
            assessment.quality_level = if assessment.unverified_claims.is_empty()
                && !assessment.verified_claims.is_empty()
            {
                QualityLevel::Verified
            } else {
                QualityLevel::LikelyAccurate
            };
            assessment.is_clean = true;
        }
        assessment.confidence = assessment.quality_level.confidence();

        self.record_assessment(&assessment);
        assessment
    }

    /// Searches past responses to similar inputs; returns the similarity of
    /// the closest match above threshold.
    fn find_repeat(&self, response: &str, task_input: &str) -> Option<f64> {
        let store = self.store.as_ref()?;
        let similar = store.search_conversations(task_input, 5, Some(5.0)).ok()?;
        for previous in similar {
            let similarity = sequence_similarity(response, &previous.assistant_text);
            if similarity > SIMILARITY_THRESHOLD {
                return Some(similarity);
            }
        }
        None
    }

    /// Splits the response into up to five leading sentences; hedged
    /// sentences are unverified, others verify against stored knowledge
    /// sharing any content token.
    fn verify_claims(&self, response: &str) -> (Vec<String>, Vec<String>) {
        let mut verified = Vec::new();
        let mut unverified = Vec::new();

        for sentence in response.split(". ").take(5) {
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }
            let snippet: String = sentence.chars().take(100).collect();
            let lower = sentence.to_lowercase();

            if HEDGING_PHRASES.iter().any(|p| lower.contains(p)) {
                unverified.push(snippet);
                continue;
            }

            let supported = match &self.store {
                Some(store) => tokenize(sentence).iter().take(3).any(|word| {
                    store
                        .search_knowledge(word, 3)
                        .map(|hits| !hits.is_empty())
                        .unwrap_or(false)
                }),
                None => false,
            };
            if supported {
                verified.push(snippet);
            } else {
                unverified.push(snippet);
            }
        }

        (verified, unverified)
    }

    /// Explicit negations of verified facts: `not <fact>`, `not a <fact>`,
    /// `isn't <fact>`, `is not <fact>`.
    fn find_contradictions(&self, response: &str) -> Vec<String> {
        let Some(store) = &self.store else { return Vec::new() };
        let facts = match store.recall_category(CATEGORY_VERIFIED_FACTS) {
            Ok(facts) => facts,
            Err(err) => {
                warn!("verified-fact read failed: {}", err);
                return Vec::new();
            }
        };

        let lower = response.to_lowercase();
        let mut contradictions = Vec::new();
        for entry in facts {
            let fact = entry.value.to_lowercase();
            if fact.is_empty() {
                continue;
            }
            let negations = [
                format!("not {}", fact),
                format!("not a {}", fact),
                format!("isn't {}", fact),
                format!("is not {}", fact),
            ];
            if negations.iter().any(|n| lower.contains(n.as_str())) {
                contradictions.push(entry.value);
            }
        }
        contradictions
    }

    fn record_assessment(&self, assessment: &QualityAssessment) {
        let Some(store) = &self.store else { return };
        let record = serde_json::json!({
            "quality": assessment.quality_level.as_str(),
            "is_clean": assessment.is_clean,
            "flags": assessment.flags,
            "confidence": assessment.confidence,
        });
        let key = format!("assessment_{}", Utc::now().timestamp_millis());
        let _ = store.store_knowledge(
            CATEGORY_QUALITY,
            &key,
            &record.to_string(),
            7.0,
            assessment.confidence,
            Some("quality_checker"),
        );
    }

    /// Marks a response as human-verified, stored at maximum confidence.
    pub fn mark_response_verified(&self, response_key: &str, feedback: &str) {
        if let Some(store) = &self.store {
            let _ = store.store_knowledge(
                "verified_responses",
                &format!("verified_{}", response_key),
                feedback,
                9.0,
                1.0,
                Some("human"),
            );
        }
    }
}

/// True when the response contains a limitation-acknowledging phrase.
pub fn acknowledges_limitation(response: &str) -> bool {
    let lower = response.to_lowercase();
    LIMITATION_PHRASES.iter().any(|p| lower.contains(p))
}

/// Token-sequence similarity in [0, 1]: twice the longest common
/// subsequence of words over the total word count, computed on normalized
/// text capped at 500 chars.
pub fn sequence_similarity(a: &str, b: &str) -> f64 {
    let normalize = |s: &str| -> Vec<String> {
        let joined = s.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
        let capped: String = joined.chars().take(500).collect();
        capped.split_whitespace().map(String::from).collect()
    };
    let words_a = normalize(a);
    let words_b = normalize(b);
    if words_a.is_empty() && words_b.is_empty() {
        return 1.0;
    }
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    // Word-level LCS.
    let mut dp = vec![vec![0usize; words_b.len() + 1]; words_a.len() + 1];
    for (i, wa) in words_a.iter().enumerate() {
        for (j, wb) in words_b.iter().enumerate() {
            dp[i + 1][j + 1] = if wa == wb {
                dp[i][j] + 1
            } else {
                dp[i][j + 1].max(dp[i + 1][j])
            };
        }
    }
    let lcs = dp[words_a.len()][words_b.len()];
    2.0 * lcs as f64 / (words_a.len() + words_b.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::ConversationTurn;

    fn with_store() -> (tempfile::TempDir, Arc<PermanentStore>, QualityChecker) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PermanentStore::open_path(dir.path().join("t.db")).unwrap());
        let checker = QualityChecker::new(Some(Arc::clone(&store)));
        (dir, store, checker)
    }

    #[test]
    fn identical_texts_have_full_similarity() {
        assert!((sequence_similarity("the answer is 42", "the answer is 42") - 1.0).abs() < 1e-9);
        assert!(sequence_similarity("completely different", "nothing alike here") < 0.4);
    }

    #[test]
    fn repeat_is_flagged_above_threshold() {
        let (_dir, store, checker) = with_store();
        store
            .store_conversation(
                &ConversationTurn::new("Who wrote Hamlet?", "William Shakespeare wrote Hamlet in the early 1600s.")
                    .with_importance(7.0),
            )
            .unwrap();

        let assessment = checker
            .check_response("William Shakespeare wrote Hamlet in the early 1600s.", "Who wrote Hamlet?");
        assert_eq!(assessment.quality_level, QualityLevel::Repeat);
        assert!(assessment.flags.iter().any(|f| f.starts_with("REPEAT")));
        assert!(!assessment.is_clean);
        assert_eq!(assessment.confidence, 0.5);
    }

    #[test]
    fn missing_limitation_is_flagged() {
        let (_dir, _store, checker) = with_store();
        let assessment = checker.check_response(
            "The index will close at 6000 points.",
            "What will the S&P close at tomorrow?",
        );
        assert!(assessment.flags.iter().any(|f| f.starts_with("MISSING_LIMITATION")));
    }

    #[test]
    fn honest_limitation_is_recognized() {
        let (_dir, _store, checker) = with_store();
        let assessment = checker.check_response(
            "I cannot verify future market movements; please verify with a financial source.",
            "What will the S&P close at tomorrow?",
        );
        assert_eq!(assessment.quality_level, QualityLevel::HonestLimitation);
        assert_eq!(assessment.confidence, 0.85);
    }

    #[test]
    fn contradiction_of_verified_fact_is_flagged() {
        let (_dir, store, checker) = with_store();
        store
            .store_knowledge(CATEGORY_VERIFIED_FACTS, "rust_safe", "memory safe", 8.0, 1.0, None)
            .unwrap();
        let assessment =
            checker.check_response("Rust is not memory safe at all.", "Is Rust memory safe?");
        assert_eq!(assessment.quality_level, QualityLevel::Contradicts);
        assert_eq!(assessment.confidence, 0.1);
    }

    #[test]
    fn hedged_sentences_are_unverified() {
        let (_dir, _store, checker) = with_store();
        let assessment = checker.check_response(
            "I think the build might be broken. It seems like a cache issue.",
            "Is the build broken?",
        );
        assert!(!assessment.unverified_claims.is_empty());
        assert!(assessment.verified_claims.is_empty());
    }

    #[test]
    fn supported_claims_verify_against_knowledge() {
        let (_dir, store, checker) = with_store();
        store
            .store_knowledge("facts", "tokio", "tokio is the rust async runtime", 6.0, 0.9, None)
            .unwrap();
        let assessment = checker.check_response("Tokio schedules async tasks.", "What does tokio do?");
        assert!(!assessment.verified_claims.is_empty());
    }
}
