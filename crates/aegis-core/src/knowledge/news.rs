//! News provider: general headlines with a financial-news fast path for
//! business queries, plus optional market sentiment for a detected ticker.

use super::{vendor_client, KnowledgeProvider};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

const NEWSAPI_URL: &str = "https://newsapi.org/v2";
const POLYGON_NEWS_URL: &str = "https://api.polygon.io/v2/reference/news";
const ALPHAVANTAGE_URL: &str = "https://www.alphavantage.co/query";

/// News category → trigger keywords, matched in declared priority order.
/// A query hitting several categories always resolves to the first one here.
static CATEGORIES: &[(&str, &[&str])] = &[
    (
        "business",
        &["business", "economy", "economic", "corporate", "company", "companies", "market", "markets"],
    ),
    ("technology", &["tech", "technology", "ai", "artificial intelligence", "software", "startup"]),
    (
        "finance",
        &["stock", "stocks", "trading", "finance", "financial", "investment", "crypto", "bitcoin"],
    ),
    ("politics", &["politics", "political", "government", "election", "congress", "senate"]),
    ("science", &["science", "research", "study", "discovery"]),
];

/// Company → search terms for targeted headlines, with the ticker first.
static COMPANY_TERMS: &[(&str, &str, &str)] = &[
    ("apple", "AAPL", "Apple Inc AAPL"),
    ("microsoft", "MSFT", "Microsoft MSFT"),
    ("google", "GOOGL", "Google Alphabet GOOGL"),
    ("amazon", "AMZN", "Amazon AMZN"),
    ("tesla", "TSLA", "Tesla TSLA"),
    ("meta", "META", "Meta Facebook META"),
    ("nvidia", "NVDA", "NVIDIA NVDA"),
];

static NEWS_KEYWORDS: &[&str] =
    &["news", "headline", "headlines", "breaking", "happening", "latest on", "update on"];

#[derive(Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Deserialize)]
struct NewsApiArticle {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    source: NewsApiSource,
}

#[derive(Deserialize, Default)]
struct NewsApiSource {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct PolygonNewsResponse {
    #[serde(default)]
    results: Vec<PolygonArticle>,
}

#[derive(Deserialize)]
struct PolygonArticle {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    publisher: PolygonPublisher,
}

#[derive(Deserialize, Default)]
struct PolygonPublisher {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct SentimentResponse {
    #[serde(default)]
    feed: Vec<SentimentArticle>,
}

#[derive(Deserialize)]
struct SentimentArticle {
    #[serde(default)]
    overall_sentiment_score: f64,
}

#[derive(Debug, Clone)]
struct Article {
    title: String,
    description: Option<String>,
    source: String,
}

pub struct NewsLookup {
    newsapi_key: Option<String>,
    polygon_key: Option<String>,
    alphavantage_key: Option<String>,
    client: reqwest::Client,
}

impl NewsLookup {
    pub fn new(
        newsapi_key: Option<String>,
        polygon_key: Option<String>,
        alphavantage_key: Option<String>,
    ) -> Self {
        if newsapi_key.is_none() && polygon_key.is_none() {
            tracing::debug!("no news API keys; news lookups limited");
        }
        Self { newsapi_key, polygon_key, alphavantage_key, client: vendor_client(10) }
    }

    /// Classifies a query into one of the six news categories, walking the
    /// category table in priority order so multi-category queries resolve
    /// deterministically.
    pub fn detect_category(text: &str) -> &'static str {
        let lower = text.to_lowercase();
        for &(category, keywords) in CATEGORIES {
            if keywords.iter().any(|kw| lower.contains(kw)) {
                return category;
            }
        }
        "general"
    }

    /// Extracts a targeted company term and its ticker, if one is named.
    pub fn extract_company(text: &str) -> Option<(&'static str, &'static str)> {
        let lower = text.to_lowercase();
        COMPANY_TERMS
            .iter()
            .find(|entry| lower.contains(entry.0))
            .map(|entry| (entry.1, entry.2))
    }

    async fn newsapi_headlines(&self, category: &str, query: Option<&str>) -> Vec<Article> {
        let Some(key) = self.newsapi_key.as_deref() else { return Vec::new() };
        let mut req = self
            .client
            .get(format!("{}/top-headlines", NEWSAPI_URL))
            .query(&[("apiKey", key), ("pageSize", "5"), ("language", "en")]);
        req = match query {
            Some(q) => req.query(&[("q", q)]),
            None => req.query(&[("category", category)]),
        };
        let Ok(resp) = req.send().await else { return Vec::new() };
        if !resp.status().is_success() {
            warn!("news vendor returned {}", resp.status());
            return Vec::new();
        }
        let Ok(parsed) = resp.json::<NewsApiResponse>().await else { return Vec::new() };
        parsed
            .articles
            .into_iter()
            .map(|a| Article { title: a.title, description: a.description, source: a.source.name })
            .collect()
    }

    async fn polygon_news(&self, ticker: Option<&str>) -> Vec<Article> {
        let Some(key) = self.polygon_key.as_deref() else { return Vec::new() };
        let mut req = self
            .client
            .get(POLYGON_NEWS_URL)
            .query(&[("apiKey", key), ("limit", "5"), ("order", "desc")]);
        if let Some(t) = ticker {
            req = req.query(&[("ticker", t)]);
        }
        let Ok(resp) = req.send().await else { return Vec::new() };
        if !resp.status().is_success() {
            return Vec::new();
        }
        let Ok(parsed) = resp.json::<PolygonNewsResponse>().await else { return Vec::new() };
        parsed
            .results
            .into_iter()
            .map(|a| Article { title: a.title, description: a.description, source: a.publisher.name })
            .collect()
    }

    /// Average sentiment score in [-1, 1] for a ticker, when a key is set.
    async fn market_sentiment(&self, ticker: &str) -> Option<f64> {
        let key = self.alphavantage_key.as_deref()?;
        let resp = self
            .client
            .get(ALPHAVANTAGE_URL)
            .query(&[("function", "NEWS_SENTIMENT"), ("tickers", ticker), ("apikey", key)])
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let parsed: SentimentResponse = resp.json().await.ok()?;
        if parsed.feed.is_empty() {
            return None;
        }
        let sum: f64 = parsed.feed.iter().map(|a| a.overall_sentiment_score).sum();
        Some(sum / parsed.feed.len() as f64)
    }

    fn format_articles(articles: &[Article], max_articles: usize) -> String {
        articles
            .iter()
            .take(max_articles)
            .map(|a| {
                let mut line = format!("- {} ({})", a.title, a.source);
                if let Some(desc) = &a.description {
                    if !desc.is_empty() {
                        let snippet: String = desc.chars().take(150).collect();
                        line.push_str(&format!(": {}", snippet));
                    }
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait::async_trait]
impl KnowledgeProvider for NewsLookup {
    fn name(&self) -> &'static str {
        "news"
    }

    fn available(&self) -> bool {
        self.newsapi_key.is_some() || self.polygon_key.is_some() || self.alphavantage_key.is_some()
    }

    fn is_relevant(&self, query: &str) -> bool {
        let lower = query.to_lowercase();
        NEWS_KEYWORDS.iter().any(|kw| lower.contains(kw))
    }

    async fn lookup_for_prompt(&self, query: &str) -> (bool, String) {
        if !self.is_relevant(query) {
            return (false, String::new());
        }

        let category = Self::detect_category(query);
        let company = Self::extract_company(query);
        info!("detected news query: category={} company={:?}", category, company.map(|c| c.0));

        // Business/finance queries try the financial provider first.
        let mut articles = if matches!(category, "business" | "finance") {
            self.polygon_news(company.map(|(t, _)| t)).await
        } else {
            Vec::new()
        };
        if articles.is_empty() {
            articles = self.newsapi_headlines(category, company.map(|(_, term)| term)).await;
        }
        if articles.is_empty() {
            return (true, String::new());
        }

        let mut blob = format!(
            "[LIVE NEWS - {} - Retrieved {}]\n{}",
            category.to_uppercase(),
            Utc::now().format("%Y-%m-%d %H:%M"),
            Self::format_articles(&articles, 5)
        );

        if let Some((ticker, _)) = company {
            if let Some(score) = self.market_sentiment(ticker).await {
                blob.push_str(&format!("\nMarket sentiment for {}: {:+.3}", ticker, score));
            }
        }

        blob.push_str("\n[Use these headlines to answer the user's news question]");
        (true, blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_detection() {
        assert_eq!(NewsLookup::detect_category("latest market news"), "business");
        assert_eq!(NewsLookup::detect_category("any ai startup news"), "technology");
        assert_eq!(NewsLookup::detect_category("breaking headlines"), "general");
        assert_eq!(NewsLookup::detect_category("election news today"), "politics");
    }

    #[test]
    fn multi_category_query_resolves_by_priority() {
        // Hits both "technology" ("tech") and "finance" ("stock"); the table
        // order decides, so the result is stable across runs.
        assert_eq!(NewsLookup::detect_category("latest tech stock news"), "technology");
        // "market" (business) outranks "trading" (finance).
        assert_eq!(NewsLookup::detect_category("market trading news"), "business");
    }

    #[test]
    fn company_extraction() {
        let (ticker, term) = NewsLookup::extract_company("news about Tesla today").unwrap();
        assert_eq!(ticker, "TSLA");
        assert!(term.contains("Tesla"));
        assert!(NewsLookup::extract_company("news about knitting").is_none());
    }

    #[test]
    fn relevance_requires_news_phrasing() {
        let lookup = NewsLookup::new(Some("k".into()), None, None);
        assert!(lookup.is_relevant("what are today's headlines"));
        assert!(!lookup.is_relevant("write me a poem"));
    }
}
