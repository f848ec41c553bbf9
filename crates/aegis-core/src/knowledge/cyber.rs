//! Cybersecurity intelligence provider: CVE detail lookups cross-checked
//! against a cached known-exploited-vulnerabilities catalog.

use super::{vendor_client, KnowledgeProvider};
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::RwLock;
use tracing::{info, warn};

const NVD_URL: &str = "https://services.nvd.nist.gov/rest/json/cves/2.0";
const KEV_URL: &str =
    "https://www.cisa.gov/sites/default/files/feeds/known_exploited_vulnerabilities.json";

/// The KEV catalog is refreshed at most hourly.
const KEV_CACHE_TTL_MINUTES: i64 = 60;

static CVE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"CVE-\d{4}-\d{4,7}").expect("cve regex"));

static SECURITY_KEYWORDS: &[&str] = &[
    "cve", "vulnerability", "vulnerabilities", "exploit", "breach", "malware", "ransomware",
    "threat", "cybersecurity", "zero-day", "0day", "phishing", "backdoor", "trojan", "botnet",
    "injection", "xss", "csrf", "rce", "privilege escalation", "data breach",
    "indicators of compromise", "mitre", "att&ck", "pentest", "red team", "blue team",
];

#[derive(Deserialize)]
struct NvdResponse {
    #[serde(default)]
    vulnerabilities: Vec<NvdVulnWrapper>,
}

#[derive(Deserialize)]
struct NvdVulnWrapper {
    cve: NvdCve,
}

#[derive(Deserialize)]
struct NvdCve {
    #[serde(default)]
    descriptions: Vec<NvdDescription>,
    #[serde(default)]
    metrics: serde_json::Value,
    #[serde(default)]
    configurations: Vec<serde_json::Value>,
    #[serde(default)]
    references: Vec<NvdReference>,
}

#[derive(Deserialize)]
struct NvdDescription {
    lang: String,
    value: String,
}

#[derive(Deserialize)]
struct NvdReference {
    #[serde(default)]
    url: String,
}

#[derive(Deserialize)]
struct KevCatalog {
    #[serde(default)]
    vulnerabilities: Vec<KevEntry>,
}

#[derive(Deserialize)]
struct KevEntry {
    #[serde(rename = "cveID", default)]
    cve_id: String,
}

/// Parsed CVE detail, ready for prompt injection.
#[derive(Debug, Clone)]
pub struct CveDetails {
    pub id: String,
    pub description: String,
    pub cvss_score: Option<f64>,
    pub cvss_vector: Option<String>,
    pub severity: String,
    pub affected_products: Vec<String>,
    pub references: Vec<String>,
    pub actively_exploited: bool,
}

pub struct CyberIntel {
    nvd_api_key: Option<String>,
    client: reqwest::Client,
    kev_cache: RwLock<Option<(DateTime<Utc>, HashSet<String>)>>,
}

impl CyberIntel {
    pub fn new(nvd_api_key: Option<String>) -> Self {
        Self {
            nvd_api_key,
            client: vendor_client(15),
            kev_cache: RwLock::new(None),
        }
    }

    pub fn extract_cve_ids(&self, text: &str) -> Vec<String> {
        let upper = text.to_uppercase();
        let mut ids: Vec<String> = CVE_RE.find_iter(&upper).map(|m| m.as_str().to_string()).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Checks the cached KEV catalog, refetching when older than the TTL.
    async fn is_actively_exploited(&self, cve_id: &str) -> bool {
        let fresh = {
            let cache = self.kev_cache.read().ok();
            cache.as_ref().and_then(|c| c.as_ref()).and_then(|(fetched, set)| {
                if Utc::now() - *fetched < Duration::minutes(KEV_CACHE_TTL_MINUTES) {
                    Some(set.contains(cve_id))
                } else {
                    None
                }
            })
        };
        if let Some(hit) = fresh {
            return hit;
        }

        match self.fetch_kev_catalog().await {
            Some(set) => {
                let hit = set.contains(cve_id);
                if let Ok(mut cache) = self.kev_cache.write() {
                    *cache = Some((Utc::now(), set));
                }
                hit
            }
            None => false,
        }
    }

    async fn fetch_kev_catalog(&self) -> Option<HashSet<String>> {
        let resp = self.client.get(KEV_URL).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let catalog: KevCatalog = resp.json().await.ok()?;
        Some(catalog.vulnerabilities.into_iter().map(|e| e.cve_id).collect())
    }

    async fn get_cve_details(&self, cve_id: &str) -> Option<CveDetails> {
        let mut req = self.client.get(NVD_URL).query(&[("cveId", cve_id)]);
        if let Some(key) = &self.nvd_api_key {
            req = req.header("apiKey", key);
        }
        let resp = req.send().await.ok()?;
        if !resp.status().is_success() {
            warn!("nvd returned {} for {}", resp.status(), cve_id);
            return None;
        }
        let parsed: NvdResponse = resp.json().await.ok()?;
        let vuln = parsed.vulnerabilities.into_iter().next()?.cve;

        let description = vuln
            .descriptions
            .iter()
            .find(|d| d.lang == "en")
            .map(|d| d.value.clone())
            .unwrap_or_else(|| "No description available".to_string());

        // CVSS 3.1 first, then 3.0, then 2.0.
        let (score, vector, severity) = ["cvssMetricV31", "cvssMetricV30", "cvssMetricV2"]
            .iter()
            .find_map(|metric_key| {
                let data = vuln.metrics.get(metric_key)?.get(0)?.get("cvssData")?;
                Some((
                    data.get("baseScore").and_then(|v| v.as_f64()),
                    data.get("vectorString").and_then(|v| v.as_str()).map(String::from),
                    data.get("baseSeverity")
                        .and_then(|v| v.as_str())
                        .unwrap_or("UNKNOWN")
                        .to_string(),
                ))
            })
            .unwrap_or((None, None, "UNKNOWN".to_string()));

        let mut affected = Vec::new();
        for config in &vuln.configurations {
            if let Some(nodes) = config.get("nodes").and_then(|n| n.as_array()) {
                for node in nodes {
                    if let Some(matches) = node.get("cpeMatch").and_then(|m| m.as_array()) {
                        for cpe in matches {
                            if cpe.get("vulnerable").and_then(|v| v.as_bool()).unwrap_or(false) {
                                if let Some(criteria) = cpe.get("criteria").and_then(|c| c.as_str()) {
                                    affected.push(criteria.to_string());
                                }
                            }
                        }
                    }
                }
            }
        }
        affected.truncate(10);

        let references: Vec<String> =
            vuln.references.into_iter().take(5).map(|r| r.url).collect();
        let actively_exploited = self.is_actively_exploited(cve_id).await;

        Some(CveDetails {
            id: cve_id.to_string(),
            description,
            cvss_score: score,
            cvss_vector: vector,
            severity,
            affected_products: affected,
            references,
            actively_exploited,
        })
    }

    fn format_details(details: &CveDetails) -> String {
        let mut lines = vec![format!("{} [{}]", details.id, details.severity)];
        if let Some(score) = details.cvss_score {
            let vector = details.cvss_vector.as_deref().unwrap_or("n/a");
            lines.push(format!("  CVSS: {:.1} ({})", score, vector));
        }
        if details.actively_exploited {
            lines.push("  ACTIVELY EXPLOITED (listed in the KEV catalog)".to_string());
        }
        lines.push(format!("  {}", details.description));
        if !details.affected_products.is_empty() {
            lines.push(format!("  Affected: {}", details.affected_products.join(", ")));
        }
        if !details.references.is_empty() {
            lines.push(format!("  References: {}", details.references.join(" ")));
        }
        lines.join("\n")
    }
}

#[async_trait::async_trait]
impl KnowledgeProvider for CyberIntel {
    fn name(&self) -> &'static str {
        "cyber"
    }

    /// The vulnerability database is public; no key required.
    fn available(&self) -> bool {
        true
    }

    fn is_relevant(&self, query: &str) -> bool {
        if !self.extract_cve_ids(query).is_empty() {
            return true;
        }
        let lower = query.to_lowercase();
        SECURITY_KEYWORDS.iter().any(|kw| lower.contains(kw))
    }

    async fn lookup_for_prompt(&self, query: &str) -> (bool, String) {
        let cve_ids = self.extract_cve_ids(query);
        if cve_ids.is_empty() {
            // Security-flavored query without a concrete CVE: nothing to fetch.
            return (false, String::new());
        }
        info!("detected CVE query for {:?}", cve_ids);

        let mut sections = Vec::new();
        for id in cve_ids.iter().take(3) {
            if let Some(details) = self.get_cve_details(id).await {
                sections.push(Self::format_details(&details));
            }
        }
        if sections.is_empty() {
            return (true, String::new());
        }

        let blob = format!(
            "[CYBERSECURITY INTELLIGENCE - Retrieved {}]\n{}\n[Use this data to answer the security question]",
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
    fn extracts_cve_ids_case_insensitive() {
        let intel = CyberIntel::new(None);
        let ids = intel.extract_cve_ids("what about cve-2024-3094 and CVE-2021-44228?");
        assert_eq!(ids, vec!["CVE-2021-44228".to_string(), "CVE-2024-3094".to_string()]);
    }

    #[test]
    fn rejects_malformed_ids() {
        let intel = CyberIntel::new(None);
        assert!(intel.extract_cve_ids("CVE-24-1 is not real").is_empty());
    }

    #[test]
    fn security_keywords_are_relevant() {
        let intel = CyberIntel::new(None);
        assert!(intel.is_relevant("any new ransomware threat this week?"));
        assert!(!intel.is_relevant("what is the weather"));
    }
}
