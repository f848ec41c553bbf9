//! Generic web lookup (instant-answer API, no key) and the detector that
//! decides when a lookup is needed: before generation (real-time phrasing)
//! or after it (the draft tripped an uncertainty pattern).

use super::{vendor_client, KnowledgeProvider};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::info;

const DDG_URL: &str = "https://api.duckduckgo.com/";

#[derive(Deserialize)]
struct InstantAnswer {
    #[serde(rename = "Abstract", default)]
    abstract_text: String,
    #[serde(rename = "AbstractSource", default)]
    abstract_source: String,
    #[serde(rename = "Answer", default)]
    answer: String,
    #[serde(rename = "Definition", default)]
    definition: String,
    #[serde(rename = "RelatedTopics", default)]
    related_topics: Vec<serde_json::Value>,
}

pub struct WebLookup {
    client: reqwest::Client,
}

impl WebLookup {
    pub fn new() -> Self {
        Self { client: vendor_client(10) }
    }

    async fn search(&self, query: &str) -> Option<InstantAnswer> {
        let resp = self
            .client
            .get(DDG_URL)
            .query(&[("q", query), ("format", "json"), ("no_html", "1"), ("skip_disambig", "1")])
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.json().await.ok()
    }

    fn format_result(result: &InstantAnswer) -> String {
        let mut parts = Vec::new();
        if !result.answer.is_empty() {
            parts.push(format!("Direct Answer: {}", result.answer));
        }
        if !result.abstract_text.is_empty() {
            let source = if result.abstract_source.is_empty() {
                "Unknown"
            } else {
                &result.abstract_source
            };
            parts.push(format!("From {}: {}", source, result.abstract_text));
        }
        if !result.definition.is_empty() {
            parts.push(format!("Definition: {}", result.definition));
        }
        let related: Vec<String> = result
            .related_topics
            .iter()
            .filter_map(|t| t.get("Text").and_then(|v| v.as_str()))
            .take(3)
            .map(|t| format!("  - {}", t.chars().take(200).collect::<String>()))
            .collect();
        if !related.is_empty() {
            parts.push("Related information:".to_string());
            parts.extend(related);
        }
        parts.join("\n")
    }
}

impl Default for WebLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl KnowledgeProvider for WebLookup {
    fn name(&self) -> &'static str {
        "web"
    }

    /// Keyless endpoint: always available.
    fn available(&self) -> bool {
        true
    }

    /// The web fallback has no relevance test of its own; the router gates
    /// it with [`LookupDetector::needs_lookup_before`].
    fn is_relevant(&self, _query: &str) -> bool {
        true
    }

    async fn lookup_for_prompt(&self, query: &str) -> (bool, String) {
        info!("web lookup for: {}", query);
        let Some(result) = self.search(query).await else {
            return (false, String::new());
        };
        let formatted = Self::format_result(&result);
        if formatted.is_empty() {
            return (false, String::new());
        }
        let blob = format!(
            "[WEB KNOWLEDGE - Retrieved {}]\n{}\n[Use this information to answer the user's question]",
            Utc::now().format("%Y-%m-%d %H:%M"),
            formatted
        );
        (true, blob)
    }
}

/// Uncertainty phrasings in a draft response that mean "the model does not
/// actually know this".
static UNCERTAINTY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)i don'?t (?:know|have)",
        r"(?i)i'?m not (?:sure|certain|aware)",
        r"(?i)i cannot (?:provide|give|tell)",
        r"(?i)as of my (?:knowledge|training|last update)",
        r"(?i)my (?:knowledge|information) (?:cutoff|ends)",
        r"(?i)i don'?t have (?:access|information|data)",
        r"(?i)unable to (?:provide|access|retrieve)",
        r"(?i)no (?:information|data) (?:available|on)",
        r"(?i)beyond my (?:knowledge|capabilities)",
        r"(?i)i would need to (?:look|search|check)",
        r"(?i)real-?time (?:data|information|prices)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("uncertainty regex"))
    .collect()
});

/// Query phrasings that always want fresh data before generation.
static REALTIME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)what(?:'s| is) the (?:current|latest|today'?s?)",
        r"(?i)how much is .+ (?:right now|today|currently|trading)",
        r"(?i)(?:current|latest|today'?s?) (?:price|value|news|weather)",
        r"(?i)what(?:'s| is) .+ (?:trading|worth|valued) at",
        r"(?i)(?:stock|share|crypto) price",
        r"(?i)market (?:update|status|news)",
        r"(?i)(?:latest|recent|breaking) news",
        r"(?i)what(?:'s| is) happening (?:with|to|in)",
        r"(?i)weather (?:in|for|at)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("realtime regex"))
    .collect()
});

/// Question-word prefixes stripped when turning a question into a search.
static QUERY_PREFIXES: &[&str] = &[
    "what's", "what is", "who is", "where is", "when is", "how is", "how much is",
    "tell me about", "can you tell me", "do you know", "please",
];

/// Decides whether a query (or a draft response) calls for a web lookup.
pub struct LookupDetector;

impl LookupDetector {
    pub fn new() -> Self {
        Self
    }

    /// True when the query matches real-time phrasing and should be looked
    /// up before any model call.
    pub fn needs_lookup_before(&self, user_query: &str) -> bool {
        REALTIME_PATTERNS.iter().any(|p| p.is_match(user_query))
    }

    /// True when the draft response shows uncertainty and a retry with web
    /// context is warranted.
    pub fn needs_lookup_after(&self, response: &str) -> bool {
        UNCERTAINTY_PATTERNS.iter().any(|p| p.is_match(response))
    }

    /// Strips question scaffolding to get the core search terms.
    pub fn extract_lookup_query(&self, user_query: &str) -> String {
        let mut query = user_query.to_lowercase();
        for prefix in QUERY_PREFIXES {
            query = query.replace(prefix, "");
        }
        query.trim().trim_end_matches('?').trim().to_string()
    }
}

impl Default for LookupDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_phrasing_triggers_pre_lookup() {
        let detector = LookupDetector::new();
        assert!(detector.needs_lookup_before("what is the current price of gold"));
        assert!(detector.needs_lookup_before("latest news on the election"));
        assert!(!detector.needs_lookup_before("explain the borrow checker"));
    }

    #[test]
    fn uncertainty_phrasing_triggers_retry() {
        let detector = LookupDetector::new();
        assert!(detector.needs_lookup_after("I don't have access to real-time data."));
        assert!(detector.needs_lookup_after("As of my knowledge cutoff in 2023..."));
        assert!(detector.needs_lookup_after("I'm not sure about that."));
        assert!(!detector.needs_lookup_after("The capital of France is Paris."));
    }

    #[test]
    fn query_extraction_strips_scaffolding() {
        let detector = LookupDetector::new();
        assert_eq!(detector.extract_lookup_query("What is the CAP theorem?"), "the cap theorem");
        assert_eq!(detector.extract_lookup_query("tell me about rust async"), "rust async");
    }
}
