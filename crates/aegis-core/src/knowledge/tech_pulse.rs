//! Tech-pulse provider: trending open-source repos, fresh security-tool
//! releases, and top community stories, scoped by detected tech domain.

use super::{vendor_client, KnowledgeProvider};
use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::info;

const GITHUB_API: &str = "https://api.github.com";
const HN_API: &str = "https://hacker-news.firebaseio.com/v0";

/// Tech domain → trigger keywords.
static DOMAINS: Lazy<HashMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
    HashMap::from([
        ("ai", vec!["ai", "machine learning", "llm", "neural", "gpt", "model", "agents"]),
        ("security", vec!["security", "pentest", "exploit", "vulnerability", "hacking tool"]),
        ("cloud", vec!["cloud", "kubernetes", "docker", "serverless", "aws", "azure"]),
        ("web3", vec!["web3", "blockchain", "smart contract", "defi", "ethereum"]),
        ("quantum", vec!["quantum", "qubit", "quantum computing"]),
        ("hardware", vec!["hardware", "chip", "gpu", "semiconductor", "fpga"]),
    ])
});

static TECH_KEYWORDS: &[&str] = &[
    "trending", "github", "open source", "hacker news", "new tools", "latest tech",
    "cutting edge", "tech pulse", "what's new in",
];

/// Security tools whose release feeds are checked for fresh versions.
static SECURITY_TOOLS: &[(&str, &str)] = &[
    ("metasploit-framework", "rapid7/metasploit-framework"),
    ("nuclei", "projectdiscovery/nuclei"),
    ("nmap", "nmap/nmap"),
    ("sqlmap", "sqlmapproject/sqlmap"),
];

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<RepoEntry>,
}

#[derive(Deserialize)]
struct RepoEntry {
    full_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
}

#[derive(Deserialize)]
struct ReleaseEntry {
    #[serde(default)]
    tag_name: String,
    #[serde(default)]
    published_at: Option<String>,
}

#[derive(Deserialize)]
struct HnItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    score: u64,
}

pub struct TechPulse {
    github_token: Option<String>,
    client: reqwest::Client,
}

impl TechPulse {
    pub fn new(github_token: Option<String>) -> Self {
        Self { github_token, client: vendor_client(10) }
    }

    /// Which tech domains the query touches (may be several).
    pub fn detect_domains(text: &str) -> Vec<&'static str> {
        let lower = text.to_lowercase();
        let mut hits: Vec<&'static str> = DOMAINS
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
            .map(|(domain, _)| *domain)
            .collect();
        hits.sort();
        hits
    }

    fn github_get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .get(url)
            .header("User-Agent", "aegis-tech-pulse")
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.github_token {
            req = req.bearer_auth(token);
        }
        req
    }

    /// Repos created in the last week with the most stars, per domain topic.
    async fn trending_repos(&self, domain: &str) -> Vec<String> {
        let since = (Utc::now() - Duration::days(7)).format("%Y-%m-%d").to_string();
        let query = format!("created:>{} topic:{}", since, domain);
        let url = format!("{}/search/repositories", GITHUB_API);
        let Ok(resp) = self
            .github_get(&url)
            .query(&[("q", query.as_str()), ("sort", "stars"), ("order", "desc"), ("per_page", "5")])
            .send()
            .await
        else {
            return Vec::new();
        };
        if !resp.status().is_success() {
            return Vec::new();
        }
        let Ok(parsed) = resp.json::<SearchResponse>().await else { return Vec::new() };
        parsed
            .items
            .into_iter()
            .map(|r| {
                let desc = r.description.unwrap_or_default();
                let snippet: String = desc.chars().take(100).collect();
                format!("- {} ({}★): {}", r.full_name, r.stargazers_count, snippet)
            })
            .collect()
    }

    async fn security_tool_releases(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for (name, repo) in SECURITY_TOOLS {
            let url = format!("{}/repos/{}/releases/latest", GITHUB_API, repo);
            let Ok(resp) = self.github_get(&url).send().await else { continue };
            if !resp.status().is_success() {
                continue;
            }
            if let Ok(release) = resp.json::<ReleaseEntry>().await {
                let published = release.published_at.unwrap_or_default();
                let date = published.split('T').next().unwrap_or("");
                lines.push(format!("- {} {} (released {})", name, release.tag_name, date));
            }
        }
        lines
    }

    async fn top_stories(&self, limit: usize) -> Vec<String> {
        let url = format!("{}/topstories.json", HN_API);
        let Ok(resp) = self.client.get(&url).send().await else { return Vec::new() };
        let Ok(ids) = resp.json::<Vec<u64>>().await else { return Vec::new() };

        let mut stories = Vec::new();
        for id in ids.into_iter().take(limit) {
            let item_url = format!("{}/item/{}.json", HN_API, id);
            let Ok(item_resp) = self.client.get(&item_url).send().await else { continue };
            if let Ok(item) = item_resp.json::<HnItem>().await {
                if !item.title.is_empty() {
                    stories.push(format!("- {} ({} points)", item.title, item.score));
                }
            }
        }
        stories
    }
}

#[async_trait::async_trait]
impl KnowledgeProvider for TechPulse {
    fn name(&self) -> &'static str {
        "tech"
    }

    /// Public endpoints work without a token (lower rate limits).
    fn available(&self) -> bool {
        true
    }

    fn is_relevant(&self, query: &str) -> bool {
        let lower = query.to_lowercase();
        TECH_KEYWORDS.iter().any(|kw| lower.contains(kw))
            || (!Self::detect_domains(query).is_empty()
                && ["latest", "trending", "recent", "this week"].iter().any(|kw| lower.contains(kw)))
    }

    async fn lookup_for_prompt(&self, query: &str) -> (bool, String) {
        if !self.is_relevant(query) {
            return (false, String::new());
        }
        let domains = Self::detect_domains(query);
        info!("detected tech pulse query, domains {:?}", domains);

        let mut sections = Vec::new();

        let domain = domains.first().copied().unwrap_or("ai");
        let repos = self.trending_repos(domain).await;
        if !repos.is_empty() {
            sections.push(format!("Trending {} repos this week:\n{}", domain, repos.join("\n")));
        }

        if domains.contains(&"security") {
            let releases = self.security_tool_releases().await;
            if !releases.is_empty() {
                sections.push(format!("Recent security tool releases:\n{}", releases.join("\n")));
            }
        }

        let stories = self.top_stories(5).await;
        if !stories.is_empty() {
            sections.push(format!("Top community stories:\n{}", stories.join("\n")));
        }

        if sections.is_empty() {
            return (true, String::new());
        }

        let blob = format!(
            "[TECH PULSE - Retrieved {}]\n{}\n[Use this data for the user's tech question]",
            Utc::now().format("%Y-%m-%d %H:%M"),
            sections.join("\n")
        );
        (true, blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_detection() {
        assert_eq!(TechPulse::detect_domains("new llm agents"), vec!["ai"]);
        let multi = TechPulse::detect_domains("quantum computing and kubernetes");
        assert_eq!(multi, vec!["cloud", "quantum"]);
        assert!(TechPulse::detect_domains("banana bread recipe").is_empty());
    }

    #[test]
    fn relevance_needs_freshness_or_pulse_phrasing() {
        let pulse = TechPulse::new(None);
        assert!(pulse.is_relevant("what's trending on github"));
        assert!(pulse.is_relevant("latest llm models"));
        assert!(!pulse.is_relevant("explain how a neural network works"));
    }
}
