//! Knowledge pre-lookup pipeline.
//!
//! Each provider answers two cheap questions, `available()` and
//! `is_relevant(query)`, before any network call happens. The router walks
//! the specialized providers in a fixed order, concatenates whatever context
//! blobs fire, and falls back to the encyclopedia and then generic web search
//! only when nothing specialized matched. Vendor failures are swallowed: a
//! missing blob is never fatal to the request.

mod cyber;
mod encyclopedia;
mod news;
mod stocks;
mod tech_pulse;
mod weather;
mod web;

pub use cyber::CyberIntel;
pub use encyclopedia::EncyclopediaLookup;
pub use news::NewsLookup;
pub use stocks::StockLookup;
pub use tech_pulse::TechPulse;
pub use weather::WeatherLookup;
pub use web::{LookupDetector, WebLookup};

use crate::config::Credentials;
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::info;

/// A domain-specific pre-lookup module.
#[async_trait::async_trait]
pub trait KnowledgeProvider: Send + Sync {
    /// Stable short name used in lookup counters.
    fn name(&self) -> &'static str;

    /// True when the provider has whatever credentials it needs.
    fn available(&self) -> bool;

    /// Cheap keyword/regex test; no network.
    fn is_relevant(&self, query: &str) -> bool;

    /// Fetches and formats an injectable context blob.
    /// Returns `(matched, blob)`; a match with an empty blob means the
    /// provider recognized the query but the vendor call failed.
    async fn lookup_for_prompt(&self, query: &str) -> (bool, String);
}

/// Pre-lookup router. Order matters: specialized providers first, then the
/// encyclopedia, then generic web, and only when nothing else produced
/// context.
pub struct PreLookup {
    stocks: StockLookup,
    weather: WeatherLookup,
    cyber: CyberIntel,
    tech: TechPulse,
    news: NewsLookup,
    encyclopedia: EncyclopediaLookup,
    web: WebLookup,
    detector: LookupDetector,
    counters: DashMap<&'static str, u64>,
}

impl PreLookup {
    pub fn new(creds: &Credentials) -> Self {
        Self {
            stocks: StockLookup::new(creds.polygon_api_key.clone()),
            weather: WeatherLookup::new(creds.open_weather_key.clone()),
            cyber: CyberIntel::new(creds.nvd_api_key.clone()),
            tech: TechPulse::new(creds.github_token.clone()),
            news: NewsLookup::new(
                creds.newsapi_key.clone(),
                creds.polygon_api_key.clone(),
                creds.alpha_vantage_api_key.clone(),
            ),
            encyclopedia: EncyclopediaLookup::new(),
            web: WebLookup::new(),
            detector: LookupDetector::new(),
            counters: DashMap::new(),
        }
    }

    pub fn detector(&self) -> &LookupDetector {
        &self.detector
    }

    fn bump(&self, kind: &'static str) {
        *self.counters.entry(kind).or_insert(0) += 1;
    }

    /// Runs the full routing policy for one query. Returns the aggregated
    /// context blob, possibly empty.
    pub async fn lookup(&self, query: &str) -> String {
        let mut parts: Vec<String> = Vec::new();

        let specialized: [&dyn KnowledgeProvider; 5] =
            [&self.stocks, &self.weather, &self.cyber, &self.tech, &self.news];
        for provider in specialized {
            if provider.available() && provider.is_relevant(query) {
                let (hit, blob) = provider.lookup_for_prompt(query).await;
                if hit && !blob.is_empty() {
                    self.bump(provider.name());
                    info!("pre-fetched {} context for query", provider.name());
                    parts.push(blob);
                }
            }
        }

        if parts.is_empty() && self.encyclopedia.is_relevant(query) {
            let (hit, blob) = self.encyclopedia.lookup_for_prompt(query).await;
            if hit && !blob.is_empty() {
                self.bump(self.encyclopedia.name());
                info!("pre-fetched encyclopedia context for query");
                parts.push(blob);
            }
        }

        if parts.is_empty() && self.detector.needs_lookup_before(query) {
            let search_query = self.detector.extract_lookup_query(query);
            let (hit, blob) = self.web.lookup_for_prompt(&search_query).await;
            if hit && !blob.is_empty() {
                self.bump(self.web.name());
                info!("pre-fetched web context for query");
                parts.push(blob);
            }
        }

        parts.join("\n")
    }

    /// Post-generation web retry: called when the draft response tripped the
    /// uncertainty detector and no pre-lookup fired.
    pub async fn retry_web_lookup(&self, query: &str) -> Option<String> {
        self.bump("retries");
        let search_query = self.detector.extract_lookup_query(query);
        let (hit, blob) = self.web.lookup_for_prompt(&search_query).await;
        if hit && !blob.is_empty() {
            Some(blob)
        } else {
            None
        }
    }

    /// Per-kind lookup counters plus provider availability, for `status()`.
    pub fn stats(&self) -> HashMap<String, serde_json::Value> {
        let mut out = HashMap::new();
        for entry in self.counters.iter() {
            out.insert(entry.key().to_string(), serde_json::json!(*entry.value()));
        }
        out.insert("stock_available".into(), serde_json::json!(self.stocks.available()));
        out.insert("weather_available".into(), serde_json::json!(self.weather.available()));
        out.insert("news_available".into(), serde_json::json!(self.news.available()));
        out.insert("cyber_available".into(), serde_json::json!(self.cyber.available()));
        out.insert("tech_available".into(), serde_json::json!(self.tech.available()));
        out.insert(
            "encyclopedia_available".into(),
            serde_json::json!(self.encyclopedia.available()),
        );
        out.insert("web_available".into(), serde_json::json!(self.web.available()));
        out
    }
}

/// Shared HTTP client for knowledge vendors (10 s timeout).
pub(crate) fn vendor_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
