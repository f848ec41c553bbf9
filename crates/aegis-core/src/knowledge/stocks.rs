//! Stock and crypto quote provider (Polygon-style previous-close endpoint).

use super::{vendor_client, KnowledgeProvider};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

const BASE_URL: &str = "https://api.polygon.io";

/// Company-name lexicon. Matched as lowercase substrings of the query.
static COMPANY_TICKERS: &[(&str, &str)] = &[
    ("apple", "AAPL"),
    ("microsoft", "MSFT"),
    ("google", "GOOGL"),
    ("alphabet", "GOOGL"),
    ("amazon", "AMZN"),
    ("tesla", "TSLA"),
    ("meta", "META"),
    ("facebook", "META"),
    ("nvidia", "NVDA"),
    ("netflix", "NFLX"),
    ("amd", "AMD"),
    ("intel", "INTC"),
    ("disney", "DIS"),
    ("nike", "NKE"),
    ("coca-cola", "KO"),
    ("pepsi", "PEP"),
    ("walmart", "WMT"),
    ("costco", "COST"),
    ("starbucks", "SBUX"),
    ("boeing", "BA"),
    ("uber", "UBER"),
    ("lyft", "LYFT"),
    ("airbnb", "ABNB"),
    ("paypal", "PYPL"),
    ("visa", "V"),
    ("mastercard", "MA"),
    ("jpmorgan", "JPM"),
    ("goldman sachs", "GS"),
    ("bank of america", "BAC"),
    ("wells fargo", "WFC"),
    ("pfizer", "PFE"),
    ("moderna", "MRNA"),
    ("spotify", "SPOT"),
    ("salesforce", "CRM"),
    ("oracle", "ORCL"),
    ("ibm", "IBM"),
    ("cisco", "CSCO"),
    ("zoom", "ZM"),
    ("shopify", "SHOP"),
    ("coinbase", "COIN"),
    ("robinhood", "HOOD"),
    ("palantir", "PLTR"),
    ("snowflake", "SNOW"),
    ("crowdstrike", "CRWD"),
    ("datadog", "DDOG"),
    ("roblox", "RBLX"),
    ("gamestop", "GME"),
    ("blackberry", "BB"),
];

/// Crypto lexicon; the quote endpoint takes the `X:SYMUSD` rewrite.
static CRYPTO_TICKERS: &[(&str, &str)] = &[
    ("bitcoin", "X:BTCUSD"),
    ("btc", "X:BTCUSD"),
    ("ethereum", "X:ETHUSD"),
    ("eth", "X:ETHUSD"),
    ("dogecoin", "X:DOGEUSD"),
    ("doge", "X:DOGEUSD"),
    ("solana", "X:SOLUSD"),
    ("cardano", "X:ADAUSD"),
    ("xrp", "X:XRPUSD"),
    ("ripple", "X:XRPUSD"),
];

/// Common uppercase English tokens that are not tickers.
static TICKER_STOPLIST: &[&str] = &["I", "A", "THE", "IS", "AT", "FOR", "AND", "OR", "NOT"];

/// `$AAPL`, or a bare `AAPL` followed by a price/trade verb.
static DOLLAR_TICKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$([A-Z]{1,5})\b").expect("dollar ticker regex"));
static VERB_TICKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Z]{1,5})\b\s+(?:stock|price|trading|share|shares|at\?|today|quote)")
        .expect("verb ticker regex")
});

static STOCK_KEYWORDS: &[&str] = &[
    "stock", "price", "trading", "share", "shares", "market", "ticker", "quote", "worth",
    "value", "trading at", "currently at", "what's", "what is", "how much is", "check",
];

#[derive(Deserialize)]
struct PrevCloseResponse {
    #[serde(default)]
    results: Vec<PrevCloseBar>,
}

#[derive(Deserialize)]
struct PrevCloseBar {
    #[serde(default)]
    c: f64,
    #[serde(default)]
    o: f64,
}

/// One previous-close quote.
#[derive(Debug, Clone)]
pub struct Quote {
    pub ticker: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
}

pub struct StockLookup {
    api_key: Option<String>,
    client: reqwest::Client,
}

impl StockLookup {
    pub fn new(api_key: Option<String>) -> Self {
        if api_key.is_none() {
            tracing::debug!("no stock API key; stock lookups disabled");
        }
        Self { api_key, client: vendor_client(10) }
    }

    /// Extracts ticker symbols from natural language: company names, crypto
    /// names, `$SYM`, and bare uppercase symbols next to a trade verb.
    pub fn extract_tickers(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        let mut tickers: Vec<String> = Vec::new();

        for (company, ticker) in COMPANY_TICKERS {
            if lower.contains(company) {
                tickers.push((*ticker).to_string());
            }
        }
        for (crypto, ticker) in CRYPTO_TICKERS {
            if lower.contains(crypto) {
                tickers.push((*ticker).to_string());
            }
        }
        for cap in DOLLAR_TICKER_RE.captures_iter(text) {
            tickers.push(cap[1].to_string());
        }
        for cap in VERB_TICKER_RE.captures_iter(text) {
            let sym = cap[1].to_string();
            if !TICKER_STOPLIST.contains(&sym.as_str()) {
                tickers.push(sym);
            }
        }

        tickers.sort();
        tickers.dedup();
        tickers
    }

    async fn get_quote(&self, ticker: &str) -> Option<Quote> {
        let key = self.api_key.as_deref()?;
        let ticker = ticker.to_uppercase();
        let url = format!("{}/v2/aggs/ticker/{}/prev", BASE_URL, ticker);
        let resp = self.client.get(&url).query(&[("apiKey", key)]).send().await.ok()?;
        if !resp.status().is_success() {
            warn!("stock vendor returned {} for {}", resp.status(), ticker);
            return None;
        }
        let parsed: PrevCloseResponse = resp.json().await.ok()?;
        let bar = parsed.results.first()?;
        let change = bar.c - bar.o;
        let change_percent = if bar.o != 0.0 { change / bar.o * 100.0 } else { 0.0 };
        Some(Quote { ticker, price: bar.c, change, change_percent })
    }

    /// `TICKER: $P (+x.xx% up)` / `(-x.xx% down)`.
    pub fn format_quote(quote: &Quote) -> String {
        let direction = if quote.change >= 0.0 { "up" } else { "down" };
        let sign = if quote.change >= 0.0 { "+" } else { "" };
        format!(
            "{}: ${:.2} ({}{:.2}% {})",
            quote.ticker, quote.price, sign, quote.change_percent, direction
        )
    }
}

#[async_trait::async_trait]
impl KnowledgeProvider for StockLookup {
    fn name(&self) -> &'static str {
        "stock"
    }

    fn available(&self) -> bool {
        self.api_key.is_some()
    }

    fn is_relevant(&self, query: &str) -> bool {
        let lower = query.to_lowercase();
        let has_keyword = STOCK_KEYWORDS.iter().any(|kw| lower.contains(kw));
        has_keyword && !self.extract_tickers(query).is_empty()
    }

    async fn lookup_for_prompt(&self, query: &str) -> (bool, String) {
        if !self.is_relevant(query) {
            return (false, String::new());
        }
        let tickers = self.extract_tickers(query);
        info!("detected stock query for {:?}", tickers);

        let mut lines = Vec::new();
        for ticker in &tickers {
            if let Some(quote) = self.get_quote(ticker).await {
                lines.push(Self::format_quote(&quote));
            }
        }
        if lines.is_empty() {
            return (true, "[STOCK LOOKUP FAILED - markets may be closed or ticker not found]".to_string());
        }

        let mut context = format!(
            "[LIVE STOCK DATA - Retrieved {}]\n",
            Utc::now().format("%Y-%m-%d %H:%M")
        );
        context.push_str(&lines.join("\n"));
        context.push_str("\n[Use this data to answer the user's question about stock prices]");
        (true, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> StockLookup {
        StockLookup::new(Some("test-key".to_string()))
    }

    #[test]
    fn extracts_company_names() {
        let tickers = provider().extract_tickers("How is Apple doing in the stock market?");
        assert!(tickers.contains(&"AAPL".to_string()));
    }

    #[test]
    fn extracts_dollar_symbols() {
        let tickers = provider().extract_tickers("Is $TSLA a buy?");
        assert!(tickers.contains(&"TSLA".to_string()));
    }

    #[test]
    fn extracts_ticker_before_trade_verb() {
        let tickers = provider().extract_tickers("What's AAPL trading at?");
        assert!(tickers.contains(&"AAPL".to_string()));
    }

    #[test]
    fn stoplist_filters_common_words() {
        let tickers = provider().extract_tickers("THE price of things");
        assert!(!tickers.contains(&"THE".to_string()));
    }

    #[test]
    fn crypto_rewrites_to_x_prefix() {
        let tickers = provider().extract_tickers("bitcoin price today");
        assert!(tickers.contains(&"X:BTCUSD".to_string()));
    }

    #[test]
    fn relevance_needs_keyword_and_ticker() {
        let p = provider();
        assert!(p.is_relevant("What's AAPL trading at?"));
        assert!(!p.is_relevant("Tell me a story about an apple orchard")); // no price keyword match
        assert!(!p.is_relevant("what is the price of eggs"));
    }

    #[test]
    fn quote_formatting() {
        let quote = Quote { ticker: "AAPL".into(), price: 187.5, change: 2.5, change_percent: 1.35 };
        assert_eq!(StockLookup::format_quote(&quote), "AAPL: $187.50 (+1.35% up)");
        let down = Quote { ticker: "TSLA".into(), price: 240.0, change: -5.0, change_percent: -2.04 };
        assert_eq!(StockLookup::format_quote(&down), "TSLA: $240.00 (-2.04% down)");
    }
}
