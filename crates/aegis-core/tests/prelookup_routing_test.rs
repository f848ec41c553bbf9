//! Integration test: pre-lookup detection and routing order, exercised
//! without any network. Only the cheap `is_relevant` paths and the detector run.

use aegis_core::{
    Credentials, CyberIntel, EncyclopediaLookup, KnowledgeProvider, LookupDetector, NewsLookup,
    PreLookup, StockLookup, TechPulse, WeatherLookup,
};

#[test]
fn stock_queries_are_recognized_before_any_fetch() {
    let stocks = StockLookup::new(Some("key".into()));
    assert!(stocks.available());
    assert!(stocks.is_relevant("What's AAPL trading at?"));
    assert!(stocks.is_relevant("how much is bitcoin worth"));
    assert!(!stocks.is_relevant("write me a haiku about autumn"));
}

#[test]
fn providers_without_keys_report_unavailable() {
    assert!(!StockLookup::new(None).available());
    assert!(!WeatherLookup::new(None).available());
    assert!(!NewsLookup::new(None, None, None).available());
    // Public-endpoint providers stay available without credentials.
    assert!(CyberIntel::new(None).available());
    assert!(TechPulse::new(None).available());
    assert!(EncyclopediaLookup::new().available());
}

#[test]
fn relevance_tests_are_disjoint_for_typical_queries() {
    let stocks = StockLookup::new(Some("k".into()));
    let weather = WeatherLookup::new(Some("k".into()));
    let cyber = CyberIntel::new(None);

    let stock_query = "What's AAPL trading at?";
    assert!(stocks.is_relevant(stock_query));
    assert!(!weather.is_relevant(stock_query));
    assert!(!cyber.is_relevant(stock_query));

    let weather_query = "weather in Chicago tomorrow";
    assert!(weather.is_relevant(weather_query));
    assert!(!stocks.is_relevant(weather_query));

    let cve_query = "how bad is CVE-2024-3094";
    assert!(cyber.is_relevant(cve_query));
    assert!(!weather.is_relevant(cve_query));
}

#[test]
fn detector_gates_the_generic_web_fallback() {
    let detector = LookupDetector::new();
    assert!(detector.needs_lookup_before("what is the current exchange rate for euros"));
    assert!(detector.needs_lookup_before("latest news about the launch"));
    assert!(!detector.needs_lookup_before("explain how binary search works"));

    assert!(detector.needs_lookup_after("I don't have access to real-time data, sorry."));
    assert!(!detector.needs_lookup_after("Binary search halves the range each step."));
}

#[tokio::test]
async fn empty_credentials_produce_empty_context_for_offline_queries() {
    // No keys, and a query that no keyless provider considers relevant:
    // the router returns an empty blob without touching the network.
    let prelookup = PreLookup::new(&Credentials::default());
    let blob = prelookup.lookup("please refactor this rust function for clarity").await;
    assert!(blob.is_empty());

    let stats = prelookup.stats();
    assert_eq!(stats.get("stock_available"), Some(&serde_json::json!(false)));
    assert_eq!(stats.get("web_available"), Some(&serde_json::json!(true)));
}
