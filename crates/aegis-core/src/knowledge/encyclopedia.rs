//! Encyclopedia provider: one-paragraph topic summary plus related topics,
//! for "who/what/tell me about X" phrasings.

use super::{vendor_client, KnowledgeProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::info;

const WIKI_REST: &str = "https://en.wikipedia.org/api/rest_v1";
const WIKI_API: &str = "https://en.wikipedia.org/w/api.php";

static TOPIC_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)who (?:is|was|are) (.+?)(?:\?|$)",
        r"(?i)what (?:is|was|are) (?:an? |the )?(.+?)(?:\?|$)",
        r"(?i)tell me about (.+?)(?:\?|$)",
        r"(?i)explain (?:what )?(.+?)(?:\?| is|$)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("topic regex"))
    .collect()
});

/// Phrasings that are questions about the immediate conversation, not topics.
static NON_TOPICS: &[&str] = &["you", "your name", "it", "that", "this", "time", "the time"];

#[derive(Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    title: String,
    #[serde(default)]
    extract: String,
}

#[derive(Deserialize)]
struct LinksQueryResponse {
    #[serde(default)]
    query: Option<LinksQuery>,
}

#[derive(Deserialize)]
struct LinksQuery {
    #[serde(default)]
    pages: std::collections::HashMap<String, LinksPage>,
}

#[derive(Deserialize)]
struct LinksPage {
    #[serde(default)]
    links: Vec<LinkEntry>,
}

#[derive(Deserialize)]
struct LinkEntry {
    #[serde(default)]
    title: String,
}

pub struct EncyclopediaLookup {
    client: reqwest::Client,
}

impl EncyclopediaLookup {
    pub fn new() -> Self {
        Self { client: vendor_client(10) }
    }

    /// Extracts the topic from an encyclopedic phrasing, if any.
    pub fn extract_topic(text: &str) -> Option<String> {
        for pattern in TOPIC_PATTERNS.iter() {
            if let Some(cap) = pattern.captures(text) {
                let topic = cap[1].trim().trim_end_matches('.').to_string();
                let lower = topic.to_lowercase();
                if !topic.is_empty() && topic.len() < 80 && !NON_TOPICS.contains(&lower.as_str()) {
                    return Some(topic);
                }
            }
        }
        None
    }

    async fn summary(&self, topic: &str) -> Option<SummaryResponse> {
        let title = topic.replace(' ', "_");
        let url = format!("{}/page/summary/{}", WIKI_REST, title);
        let resp = self
            .client
            .get(&url)
            .header("User-Agent", "aegis-encyclopedia")
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let parsed: SummaryResponse = resp.json().await.ok()?;
        if parsed.extract.is_empty() {
            None
        } else {
            Some(parsed)
        }
    }

    async fn related_topics(&self, title: &str, limit: usize) -> Vec<String> {
        let Ok(resp) = self
            .client
            .get(WIKI_API)
            .header("User-Agent", "aegis-encyclopedia")
            .query(&[
                ("action", "query"),
                ("titles", title),
                ("prop", "links"),
                ("pllimit", "10"),
                ("format", "json"),
            ])
            .send()
            .await
        else {
            return Vec::new();
        };
        let Ok(parsed) = resp.json::<LinksQueryResponse>().await else { return Vec::new() };
        parsed
            .query
            .map(|q| {
                q.pages
                    .into_values()
                    .flat_map(|p| p.links)
                    .map(|l| l.title)
                    .filter(|t| !t.contains(':'))
                    .take(limit)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for EncyclopediaLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl KnowledgeProvider for EncyclopediaLookup {
    fn name(&self) -> &'static str {
        "encyclopedia"
    }

    fn available(&self) -> bool {
        true
    }

    fn is_relevant(&self, query: &str) -> bool {
        Self::extract_topic(query).is_some()
    }

    async fn lookup_for_prompt(&self, query: &str) -> (bool, String) {
        let Some(topic) = Self::extract_topic(query) else {
            return (false, String::new());
        };
        info!("detected encyclopedia query for '{}'", topic);

        let Some(summary) = self.summary(&topic).await else {
            return (true, String::new());
        };

        let mut blob = format!("[ENCYCLOPEDIA: {}]\n{}", summary.title, summary.extract);
        let related = self.related_topics(&summary.title, 3).await;
        if !related.is_empty() {
            blob.push_str(&format!("\nRelated topics: {}", related.join(", ")));
        }
        blob.push_str("\n[Use this background to answer the user's question]");
        (true, blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_topics() {
        assert_eq!(
            EncyclopediaLookup::extract_topic("Who was Ada Lovelace?"),
            Some("Ada Lovelace".to_string())
        );
        assert_eq!(
            EncyclopediaLookup::extract_topic("tell me about the CAP theorem"),
            Some("the CAP theorem".to_string())
        );
        assert_eq!(
            EncyclopediaLookup::extract_topic("What is a quasar?"),
            Some("quasar".to_string())
        );
    }

    #[test]
    fn ignores_conversational_questions() {
        assert_eq!(EncyclopediaLookup::extract_topic("who are you?"), None);
        assert_eq!(EncyclopediaLookup::extract_topic("what is the time?"), None);
    }
}
