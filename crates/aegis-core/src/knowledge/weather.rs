//! Weather provider: geocode a spoken location, fetch current conditions
//! (Fahrenheit) and an optional 5-day forecast.

use super::{vendor_client, KnowledgeProvider};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::warn;

const BASE_URL: &str = "https://api.openweathermap.org/data/2.5";
const GEO_URL: &str = "https://api.openweathermap.org/geo/1.0";

static WEATHER_KEYWORDS: &[&str] = &[
    "weather", "temperature", "temp", "forecast", "rain", "raining", "snow", "snowing",
    "sunny", "cloudy", "storm", "humidity", "wind", "umbrella",
];

static FORECAST_KEYWORDS: &[&str] = &["forecast", "week", "tomorrow", "next", "days"];

static LOCATION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"weather (?:in|for|at) ([a-zA-Z\s,]+?)(?:\?|$|today|tomorrow|this|next)",
        r"(?:in|for|at) ([a-zA-Z\s,]+?)(?:'s)? weather",
        r"what(?:'s| is)(?: the)? weather (?:like )?(?:in|for|at) ([a-zA-Z\s,]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("location regex"))
    .collect()
});

static LOCATION_STOPWORDS: &[&str] =
    &["the", "today", "tomorrow", "now", "current", "right", "please", "like"];

#[derive(Deserialize)]
struct GeoEntry {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct CurrentResponse {
    #[serde(default)]
    name: String,
    main: CurrentMain,
    #[serde(default)]
    weather: Vec<ConditionEntry>,
    #[serde(default)]
    wind: Wind,
}

#[derive(Deserialize)]
struct CurrentMain {
    temp: f64,
    #[serde(default)]
    feels_like: f64,
    #[serde(default)]
    humidity: f64,
}

#[derive(Deserialize, Default)]
struct Wind {
    #[serde(default)]
    speed: f64,
}

#[derive(Deserialize)]
struct ConditionEntry {
    #[serde(default)]
    main: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    list: Vec<ForecastEntry>,
}

#[derive(Deserialize)]
struct ForecastEntry {
    #[serde(default)]
    dt_txt: String,
    main: CurrentMain,
    #[serde(default)]
    weather: Vec<ConditionEntry>,
}

pub struct WeatherLookup {
    api_key: Option<String>,
    default_location: String,
    client: reqwest::Client,
}

impl WeatherLookup {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            default_location: "New York".to_string(),
            client: vendor_client(10),
        }
    }

    pub fn with_default_location(mut self, location: &str) -> Self {
        self.default_location = location.to_string();
        self
    }

    /// Pulls a location out of phrasings like "weather in Chicago".
    pub fn extract_location(&self, text: &str) -> Option<String> {
        let lower = text.to_lowercase();
        for pattern in LOCATION_PATTERNS.iter() {
            if let Some(cap) = pattern.captures(&lower) {
                let location = cap[1].trim().to_string();
                if !location.is_empty() && !LOCATION_STOPWORDS.contains(&location.as_str()) {
                    return Some(title_case(&location));
                }
            }
        }
        None
    }

    /// Whether the query wants the multi-day forecast rather than just now.
    fn wants_forecast(text: &str) -> bool {
        let lower = text.to_lowercase();
        FORECAST_KEYWORDS.iter().any(|kw| lower.contains(kw))
    }

    async fn geocode(&self, location: &str) -> Option<GeoEntry> {
        let key = self.api_key.as_deref()?;
        let url = format!("{}/direct", GEO_URL);
        let resp = self
            .client
            .get(&url)
            .query(&[("q", location), ("limit", "1"), ("appid", key)])
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let mut entries: Vec<GeoEntry> = resp.json().await.ok()?;
        if entries.is_empty() {
            None
        } else {
            Some(entries.remove(0))
        }
    }

    async fn current_conditions(&self, location: &str) -> Option<String> {
        let key = self.api_key.as_deref()?;
        let url = format!("{}/weather", BASE_URL);
        let resp = self
            .client
            .get(&url)
            .query(&[("q", location), ("appid", key), ("units", "imperial")])
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            warn!("weather vendor returned {} for {}", resp.status(), location);
            return None;
        }
        let data: CurrentResponse = resp.json().await.ok()?;
        let condition = data
            .weather
            .first()
            .map(|c| if c.description.is_empty() { c.main.clone() } else { c.description.clone() })
            .unwrap_or_else(|| "unknown".to_string());
        Some(format!(
            "Current weather in {}: {}, {:.0}°F (feels like {:.0}°F), humidity {:.0}%, wind {:.0} mph",
            if data.name.is_empty() { location } else { &data.name },
            condition,
            data.main.temp,
            data.main.feels_like,
            data.main.humidity,
            data.wind.speed,
        ))
    }

    async fn forecast(&self, lat: f64, lon: f64) -> Option<String> {
        let key = self.api_key.as_deref()?;
        let url = format!("{}/forecast", BASE_URL);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("appid", key.to_string()),
                ("units", "imperial".to_string()),
            ])
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let data: ForecastResponse = resp.json().await.ok()?;

        // The 3-hourly feed: sample one entry per day (midday) for 5 days.
        let mut lines = Vec::new();
        for entry in data.list.iter().filter(|e| e.dt_txt.contains("12:00:00")).take(5) {
            let day = entry.dt_txt.split_whitespace().next().unwrap_or("");
            let condition = entry.weather.first().map(|c| c.main.as_str()).unwrap_or("unknown");
            lines.push(format!("  {}: {}, {:.0}°F", day, condition, entry.main.temp));
        }
        if lines.is_empty() {
            None
        } else {
            Some(format!("5-day forecast:\n{}", lines.join("\n")))
        }
    }
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait::async_trait]
impl KnowledgeProvider for WeatherLookup {
    fn name(&self) -> &'static str {
        "weather"
    }

    fn available(&self) -> bool {
        self.api_key.is_some()
    }

    fn is_relevant(&self, query: &str) -> bool {
        let lower = query.to_lowercase();
        WEATHER_KEYWORDS.iter().any(|kw| lower.contains(kw))
    }

    async fn lookup_for_prompt(&self, query: &str) -> (bool, String) {
        if !self.is_relevant(query) {
            return (false, String::new());
        }
        let location = self
            .extract_location(query)
            .unwrap_or_else(|| self.default_location.clone());

        let Some(current) = self.current_conditions(&location).await else {
            return (true, String::new());
        };

        let mut blob = format!(
            "[LIVE WEATHER DATA - Retrieved {}]\n{}",
            Utc::now().format("%Y-%m-%d %H:%M"),
            current
        );

        if Self::wants_forecast(query) {
            if let Some(geo) = self.geocode(&location).await {
                if let Some(fc) = self.forecast(geo.lat, geo.lon).await {
                    blob.push('\n');
                    blob.push_str(&fc);
                }
            }
        }

        blob.push_str("\n[Use this data to answer the user's weather question]");
        (true, blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_location_from_common_phrasings() {
        let provider = WeatherLookup::new(Some("k".into()));
        assert_eq!(provider.extract_location("weather in Chicago?"), Some("Chicago".into()));
        assert_eq!(
            provider.extract_location("What is the weather like in new york"),
            Some("New York".into())
        );
    }

    #[test]
    fn forecast_detection() {
        assert!(WeatherLookup::wants_forecast("weather forecast for Boston"));
        assert!(WeatherLookup::wants_forecast("weather in Boston tomorrow"));
        assert!(!WeatherLookup::wants_forecast("weather in Boston"));
    }

    #[test]
    fn relevance_is_keyword_based() {
        let provider = WeatherLookup::new(Some("k".into()));
        assert!(provider.is_relevant("Do I need an umbrella today?"));
        assert!(!provider.is_relevant("What's AAPL trading at?"));
    }
}
