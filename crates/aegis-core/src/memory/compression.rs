//! Generative compression: clusters of related memory items collapse into
//! thunks: a trigger pattern plus a template that regenerates an unbounded
//! family of outputs by variable substitution.
//!
//! Invariant: `thunk_bytes <= original_bytes` for every stored thunk; a
//! cluster that fails to compress is rejected rather than stored.

use chrono::{DateTime, Local, TimeZone, Timelike, Utc};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// What a thunk compresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThunkKind {
    /// Behavioral pattern (user preferences, recurring asks).
    Pattern,
    /// Response template shared across similar answers.
    Template,
    /// A cluster of distinct facts joined into one record.
    Knowledge,
    /// Time-triggered routine keyed on a peak hour.
    Routine,
}

impl ThunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThunkKind::Pattern => "pattern",
            ThunkKind::Template => "template",
            ThunkKind::Knowledge => "knowledge",
            ThunkKind::Routine => "routine",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "template" => ThunkKind::Template,
            "knowledge" => ThunkKind::Knowledge,
            "routine" => ThunkKind::Routine,
            _ => ThunkKind::Pattern,
        }
    }
}

/// One item fed into the compressor: content plus the optional response and
/// timestamp the extractors use.
#[derive(Debug, Clone)]
pub struct ClusterItem {
    pub content: String,
    pub response: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl ClusterItem {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into(), response: None, timestamp: None }
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }

    pub fn with_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }
}

/// The atomic unit of compressed intelligence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thunk {
    pub id: String,
    pub name: String,
    pub kind: ThunkKind,
    /// Regex (or plain keyword fallback) that activates this thunk.
    pub trigger_pattern: String,
    /// Output template with `{var}` placeholders.
    pub template: String,
    pub variables: HashMap<String, String>,
    pub confidence: f32,
    pub fire_count: u64,
    pub created_from_count: usize,
    pub original_bytes: usize,
    pub thunk_bytes: usize,
    pub created_at: DateTime<Utc>,
    pub last_fired: Option<DateTime<Utc>>,
}

impl Thunk {
    /// Reported, never stored.
    pub fn compression_ratio(&self) -> f64 {
        if self.thunk_bytes == 0 {
            0.0
        } else {
            self.original_bytes as f64 / self.thunk_bytes as f64
        }
    }

    /// True when this thunk should fire for the given context: regex match
    /// (case-insensitive), falling back to plain keyword containment when the
    /// stored pattern is not a valid regex.
    pub fn matches(&self, context: &str) -> bool {
        match Regex::new(&format!("(?i){}", self.trigger_pattern)) {
            Ok(re) => re.is_match(context),
            Err(_) => context.to_lowercase().contains(&self.trigger_pattern.to_lowercase()),
        }
    }

    /// Generates output: stored variables first, then caller overrides, then
    /// the time placeholders `{time}`, `{date}`, `{day}`, `{greeting}`.
    pub fn generate(&self, overrides: &HashMap<String, String>) -> String {
        let mut output = self.template.clone();
        for (name, value) in &self.variables {
            output = output.replace(&format!("{{{}}}", name), value);
        }
        for (name, value) in overrides {
            output = output.replace(&format!("{{{}}}", name), value);
        }
        let now = Local::now();
        output = output.replace("{time}", &now.format("%H:%M").to_string());
        output = output.replace("{date}", &now.format("%Y-%m-%d").to_string());
        output = output.replace("{day}", &now.format("%A").to_string());
        output = output.replace("{greeting}", time_greeting(now.hour()));
        output
    }
}

fn time_greeting(hour: u32) -> &'static str {
    if hour < 12 {
        "Good morning"
    } else if hour < 17 {
        "Good afternoon"
    } else {
        "Good evening"
    }
}

fn short_hash(input: &str) -> String {
    // FNV-1a; stable ids so recompressing a cluster is idempotent.
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in input.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{:010x}", hash & 0xffff_ffff_ff)
}

static CAPITALIZED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][a-z]+\b").expect("capitalized regex"));
static PREFERENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:prefer|like|want|love)\s+(\w+)").expect("preference regex"));

/// Turns clusters of at least three related items into thunks.
pub struct ThunkCompressor {
    min_items: usize,
}

impl ThunkCompressor {
    pub fn new() -> Self {
        Self { min_items: 3 }
    }

    /// Compresses a cluster. Returns `None` when the items do not form a
    /// compressible pattern or the result would not actually be smaller.
    pub fn compress(&self, items: &[ClusterItem], kind: ThunkKind) -> Option<Thunk> {
        if items.len() < self.min_items {
            return None;
        }
        let thunk = match kind {
            ThunkKind::Pattern => self.extract_pattern(items),
            ThunkKind::Template => self.extract_template(items),
            ThunkKind::Knowledge => self.extract_knowledge(items),
            ThunkKind::Routine => self.extract_routine(items),
        }?;
        if thunk.thunk_bytes > thunk.original_bytes {
            return None;
        }
        Some(thunk)
    }

    fn word_frequency(texts: &[&str], min_len: usize) -> HashMap<String, usize> {
        let mut freq = HashMap::new();
        for text in texts {
            for word in text.to_lowercase().split_whitespace() {
                let word: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
                if word.len() > min_len {
                    *freq.entry(word).or_insert(0) += 1;
                }
            }
        }
        freq
    }

    fn extract_pattern(&self, items: &[ClusterItem]) -> Option<Thunk> {
        let contents: Vec<&str> = items.iter().map(|i| i.content.as_str()).collect();
        let all_content = contents.join(" ");
        let original_bytes = all_content.len();

        // Tokens in at least half the items are trigger candidates.
        let freq = Self::word_frequency(&contents, 3);
        let threshold = (items.len() as f32 * 0.5).ceil() as usize;
        let mut trigger_words: Vec<(String, usize)> =
            freq.into_iter().filter(|(_, c)| *c >= threshold).collect();
        trigger_words.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        trigger_words.truncate(5);
        if trigger_words.is_empty() {
            return None;
        }
        let trigger_pattern =
            trigger_words.iter().map(|(w, _)| w.as_str()).collect::<Vec<_>>().join("|");

        let variables = Self::extract_variables(&all_content);
        let template = Self::base_template(items, &variables);

        let thunk_payload = serde_json::json!({
            "trigger": trigger_pattern,
            "template": template,
            "variables": variables,
        })
        .to_string();
        let thunk_bytes = thunk_payload.len();

        Some(Thunk {
            id: format!("UTK-{}", short_hash(&thunk_payload)),
            name: format!("Pattern: {}", trigger_words[0].0),
            kind: ThunkKind::Pattern,
            trigger_pattern,
            template,
            variables,
            confidence: (items.len() as f32 / 20.0).min(0.95),
            fire_count: 0,
            created_from_count: items.len(),
            original_bytes,
            thunk_bytes,
            created_at: Utc::now(),
            last_fired: None,
        })
    }

    fn extract_template(&self, items: &[ClusterItem]) -> Option<Thunk> {
        let responses: Vec<&str> = items
            .iter()
            .map(|i| i.response.as_deref().unwrap_or(i.content.as_str()))
            .collect();
        if responses.is_empty() {
            return None;
        }
        let original_bytes: usize = responses.iter().map(|r| r.len()).sum();

        // Words kept from the shortest response when they recur in >= 60% of
        // responses; the rest become `{variable}` slots.
        let base = responses.iter().min_by_key(|r| r.len())?;
        let template: Vec<String> = base
            .split_whitespace()
            .map(|word| {
                let lower = word.to_lowercase();
                let appearances =
                    responses.iter().filter(|r| r.to_lowercase().contains(&lower)).count();
                if appearances as f32 >= responses.len() as f32 * 0.6 {
                    word.to_string()
                } else {
                    "{variable}".to_string()
                }
            })
            .collect();
        if template.is_empty() {
            return None;
        }
        let template = template.join(" ");

        let variables = HashMap::from([("count".to_string(), responses.len().to_string())]);
        let thunk_payload =
            serde_json::json!({ "template": template, "variables": variables }).to_string();
        let thunk_bytes = thunk_payload.len();

        Some(Thunk {
            id: format!("UTK-{}", short_hash(&thunk_payload)),
            name: "Response Template".to_string(),
            kind: ThunkKind::Template,
            trigger_pattern: ".*".to_string(),
            template,
            variables,
            confidence: (items.len() as f32 / 10.0).min(0.9),
            fire_count: 0,
            created_from_count: items.len(),
            original_bytes,
            thunk_bytes,
            created_at: Utc::now(),
            last_fired: None,
        })
    }

    fn extract_knowledge(&self, items: &[ClusterItem]) -> Option<Thunk> {
        let facts: Vec<&str> = items.iter().map(|i| i.content.as_str()).collect();
        let original_bytes: usize = facts.iter().map(|f| f.len()).sum();

        let mut unique: Vec<&str> = Vec::new();
        for fact in &facts {
            if !unique.contains(fact) {
                unique.push(fact);
            }
        }
        let summary = unique.iter().take(10).copied().collect::<Vec<_>>().join(" | ");

        let freq = Self::word_frequency(&facts, 4);
        let mut top: Vec<(String, usize)> = freq.into_iter().collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        let trigger_pattern = if top.is_empty() {
            "knowledge".to_string()
        } else {
            top.iter().take(3).map(|(w, _)| w.as_str()).collect::<Vec<_>>().join("|")
        };

        let thunk_bytes = serde_json::json!({ "summary": summary }).to_string().len();

        Some(Thunk {
            id: format!("UTK-{}", short_hash(&summary)),
            name: "Knowledge Cluster".to_string(),
            kind: ThunkKind::Knowledge,
            trigger_pattern,
            template: summary,
            variables: HashMap::new(),
            confidence: (items.len() as f32 / 15.0).min(0.85),
            fire_count: 0,
            created_from_count: items.len(),
            original_bytes,
            thunk_bytes,
            created_at: Utc::now(),
            last_fired: None,
        })
    }

    fn extract_routine(&self, items: &[ClusterItem]) -> Option<Thunk> {
        let timestamps: Vec<DateTime<Utc>> = items.iter().filter_map(|i| i.timestamp).collect();
        if timestamps.len() < self.min_items {
            return None;
        }

        let mut hour_freq: HashMap<u32, usize> = HashMap::new();
        for ts in &timestamps {
            *hour_freq.entry(ts.hour()).or_insert(0) += 1;
        }
        let (peak_hour, peak_count) =
            hour_freq.into_iter().max_by_key(|(hour, count)| (*count, u32::MAX - *hour))?;

        let original_bytes: usize = items.iter().map(|i| i.content.len()).sum();
        let trigger_pattern = format!("time:{}", peak_hour);
        let template = "{greeting}. Time for your usual routine.".to_string();
        let variables = HashMap::from([("peak_hour".to_string(), peak_hour.to_string())]);
        let thunk_bytes = serde_json::json!({
            "trigger": trigger_pattern,
            "template": template,
            "variables": variables,
        })
        .to_string()
        .len();

        Some(Thunk {
            id: format!("UTK-{}", short_hash(&format!("routine_{}", peak_hour))),
            name: format!("Routine: {}:00", peak_hour),
            kind: ThunkKind::Routine,
            trigger_pattern,
            template,
            variables,
            confidence: (peak_count as f32 / items.len() as f32).min(0.8),
            fire_count: 0,
            created_from_count: items.len(),
            original_bytes,
            thunk_bytes,
            created_at: Utc::now(),
            last_fired: None,
        })
    }

    /// Named entities: capitalized tokens appearing at least twice become
    /// `name`; a lexically matched preference verb object becomes
    /// `preference`.
    fn extract_variables(all_content: &str) -> HashMap<String, String> {
        let mut variables = HashMap::new();

        let mut name_freq: HashMap<&str, usize> = HashMap::new();
        for m in CAPITALIZED_RE.find_iter(all_content) {
            *name_freq.entry(m.as_str()).or_insert(0) += 1;
        }
        if let Some((name, count)) =
            name_freq.into_iter().max_by_key(|(name, count)| (*count, std::cmp::Reverse(*name)))
        {
            if count >= 2 {
                variables.insert("name".to_string(), name.to_string());
            }
        }

        if let Some(cap) = PREFERENCE_RE.captures(&all_content.to_lowercase()) {
            variables.insert("preference".to_string(), cap[1].to_string());
        }

        variables
    }

    /// Shortest response in the cluster, with stored variable values replaced
    /// by `{var}` placeholders.
    fn base_template(items: &[ClusterItem], variables: &HashMap<String, String>) -> String {
        let responses: Vec<&str> = items.iter().filter_map(|i| i.response.as_deref()).collect();
        let base = responses.iter().min_by_key(|r| r.len()).copied().unwrap_or("Understood.");
        let mut template = base.to_string();
        for (name, value) in variables {
            if template.contains(value.as_str()) {
                template = template.replace(value.as_str(), &format!("{{{}}}", name));
            }
        }
        template
    }
}

impl Default for ThunkCompressor {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate compression statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ThunkStats {
    pub total_thunks: u64,
    pub original_bytes: u64,
    pub compressed_bytes: u64,
    pub total_fires: u64,
    pub avg_confidence: f64,
    pub compression_ratio: f64,
}

/// Storage and firing for thunks: SQLite table plus a hot cache.
pub struct ThunkEngine {
    db_path: PathBuf,
    compressor: ThunkCompressor,
    cache: DashMap<String, Thunk>,
}

impl ThunkEngine {
    pub fn open_path<P: AsRef<Path>>(db_path: P) -> Result<Self, rusqlite::Error> {
        let this = Self {
            db_path: db_path.as_ref().to_path_buf(),
            compressor: ThunkCompressor::new(),
            cache: DashMap::new(),
        };
        this.init()?;
        Ok(this)
    }

    fn open(&self) -> Result<Connection, rusqlite::Error> {
        Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
    }

    fn init(&self) -> Result<(), rusqlite::Error> {
        if let Some(parent) = self.db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = self.open()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS ultrathunks (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                trigger_pattern TEXT NOT NULL,
                template TEXT NOT NULL,
                variables TEXT NOT NULL DEFAULT '{}',
                confidence REAL NOT NULL DEFAULT 0.5,
                fire_count INTEGER NOT NULL DEFAULT 0,
                created_from_count INTEGER NOT NULL DEFAULT 0,
                original_bytes INTEGER NOT NULL DEFAULT 0,
                thunk_bytes INTEGER NOT NULL DEFAULT 0,
                created_at_ms INTEGER NOT NULL,
                last_fired_ms INTEGER NULL
            );
            CREATE INDEX IF NOT EXISTS idx_thunk_confidence ON ultrathunks(confidence DESC);
            "#,
        )?;
        Ok(())
    }

    /// Compresses a cluster and stores the resulting thunk.
    pub fn compress_and_store(&self, items: &[ClusterItem], kind: ThunkKind) -> Option<Thunk> {
        let thunk = self.compressor.compress(items, kind)?;
        if let Err(err) = self.store_thunk(&thunk) {
            warn!("thunk store failed: {}", err);
            return None;
        }
        self.cache.insert(thunk.id.clone(), thunk.clone());
        Some(thunk)
    }

    fn store_thunk(&self, thunk: &Thunk) -> Result<(), rusqlite::Error> {
        let conn = self.open()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO ultrathunks
                (id, name, kind, trigger_pattern, template, variables, confidence,
                 fire_count, created_from_count, original_bytes, thunk_bytes,
                 created_at_ms, last_fired_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                thunk.id,
                thunk.name,
                thunk.kind.as_str(),
                thunk.trigger_pattern,
                thunk.template,
                serde_json::to_string(&thunk.variables).unwrap_or_else(|_| "{}".into()),
                thunk.confidence as f64,
                thunk.fire_count as i64,
                thunk.created_from_count as i64,
                thunk.original_bytes as i64,
                thunk.thunk_bytes as i64,
                thunk.created_at.timestamp_millis(),
                thunk.last_fired.map(|t| t.timestamp_millis()),
            ],
        )?;
        Ok(())
    }

    /// All thunks matching the context, confidence-descending.
    pub fn find_matching(&self, context: &str, min_confidence: f32) -> Vec<Thunk> {
        let mut matching: Vec<Thunk> = Vec::new();
        for entry in self.cache.iter() {
            if entry.confidence >= min_confidence && entry.matches(context) {
                matching.push(entry.clone());
            }
        }

        if let Ok(conn) = self.open() {
            let loaded = conn
                .prepare(
                    "SELECT id, name, kind, trigger_pattern, template, variables, confidence,
                            fire_count, created_from_count, original_bytes, thunk_bytes,
                            created_at_ms, last_fired_ms
                     FROM ultrathunks WHERE confidence >= ?1
                     ORDER BY confidence DESC, fire_count DESC",
                )
                .and_then(|mut stmt| {
                    stmt.query_map(params![min_confidence as f64], row_to_thunk)
                        .map(|rows| rows.filter_map(|r| r.ok()).collect::<Vec<_>>())
                });
            if let Ok(thunks) = loaded {
                for thunk in thunks {
                    if !self.cache.contains_key(&thunk.id) && thunk.matches(context) {
                        self.cache.insert(thunk.id.clone(), thunk.clone());
                        matching.push(thunk);
                    }
                }
            }
        }

        matching.sort_by(|a, b| {
            b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal)
        });
        matching
    }

    /// Fires one thunk by id, recording the fire.
    pub fn fire(&self, thunk_id: &str, overrides: &HashMap<String, String>) -> Option<String> {
        let thunk = match self.cache.get(thunk_id) {
            Some(t) => t.clone(),
            None => {
                let conn = self.open().ok()?;
                let thunk = conn
                    .query_row(
                        "SELECT id, name, kind, trigger_pattern, template, variables, confidence,
                                fire_count, created_from_count, original_bytes, thunk_bytes,
                                created_at_ms, last_fired_ms
                         FROM ultrathunks WHERE id = ?1",
                        params![thunk_id],
                        row_to_thunk,
                    )
                    .ok()?;
                self.cache.insert(thunk.id.clone(), thunk.clone());
                thunk
            }
        };

        let output = thunk.generate(overrides);
        self.record_fire(thunk_id);
        Some(output)
    }

    /// Finds and fires the best matching thunk for a context.
    pub fn auto_generate(&self, context: &str) -> Option<(String, Thunk)> {
        let best = self.find_matching(context, 0.3).into_iter().next()?;
        let output = best.generate(&HashMap::new());
        self.record_fire(&best.id);
        Some((output, best))
    }

    fn record_fire(&self, thunk_id: &str) {
        let now = Utc::now();
        if let Some(mut cached) = self.cache.get_mut(thunk_id) {
            cached.fire_count += 1;
            cached.last_fired = Some(now);
        }
        if let Ok(conn) = self.open() {
            let result = conn.execute(
                "UPDATE ultrathunks SET fire_count = fire_count + 1, last_fired_ms = ?2
                 WHERE id = ?1",
                params![thunk_id, now.timestamp_millis()],
            );
            if let Err(err) = result {
                warn!("thunk fire update failed: {}", err);
            }
        }
    }

    pub fn list(&self, limit: usize) -> Vec<Thunk> {
        let Ok(conn) = self.open() else { return Vec::new() };
        conn.prepare(
            "SELECT id, name, kind, trigger_pattern, template, variables, confidence,
                    fire_count, created_from_count, original_bytes, thunk_bytes,
                    created_at_ms, last_fired_ms
             FROM ultrathunks ORDER BY fire_count DESC, confidence DESC LIMIT ?1",
        )
        .and_then(|mut stmt| {
            stmt.query_map(params![limit as i64], row_to_thunk)
                .map(|rows| rows.filter_map(|r| r.ok()).collect())
        })
        .unwrap_or_default()
    }

    pub fn get_stats(&self) -> ThunkStats {
        let empty = ThunkStats {
            total_thunks: 0,
            original_bytes: 0,
            compressed_bytes: 0,
            total_fires: 0,
            avg_confidence: 0.0,
            compression_ratio: 0.0,
        };
        let Ok(conn) = self.open() else { return empty };
        conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(original_bytes), 0), COALESCE(SUM(thunk_bytes), 0),
                    COALESCE(SUM(fire_count), 0), COALESCE(AVG(confidence), 0.0)
             FROM ultrathunks",
            [],
            |row| {
                let original: i64 = row.get(1)?;
                let compressed: i64 = row.get(2)?;
                Ok(ThunkStats {
                    total_thunks: row.get::<_, i64>(0)? as u64,
                    original_bytes: original as u64,
                    compressed_bytes: compressed as u64,
                    total_fires: row.get::<_, i64>(3)? as u64,
                    avg_confidence: row.get(4)?,
                    compression_ratio: if compressed > 0 {
                        original as f64 / compressed as f64
                    } else {
                        0.0
                    },
                })
            },
        )
        .unwrap_or(empty)
    }
}

fn row_to_thunk(row: &rusqlite::Row<'_>) -> Result<Thunk, rusqlite::Error> {
    let kind: String = row.get(2)?;
    let variables: String = row.get(5)?;
    Ok(Thunk {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: ThunkKind::parse(&kind),
        trigger_pattern: row.get(3)?,
        template: row.get(4)?,
        variables: serde_json::from_str(&variables).unwrap_or_default(),
        confidence: row.get::<_, f64>(6)? as f32,
        fire_count: row.get::<_, i64>(7)? as u64,
        created_from_count: row.get::<_, i64>(8)? as usize,
        original_bytes: row.get::<_, i64>(9)? as usize,
        thunk_bytes: row.get::<_, i64>(10)? as usize,
        created_at: Utc.timestamp_millis_opt(row.get(11)?).single().unwrap_or_else(Utc::now),
        last_fired: row.get::<_, Option<i64>>(12)?.and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weather_cluster() -> Vec<ClusterItem> {
        vec![
            ClusterItem::new("What is the weather in Chicago?")
                .with_response("Good morning. Chicago weather: partly cloudy, 45F."),
            ClusterItem::new("Weather update for Chicago please")
                .with_response("Good afternoon. Current conditions in Chicago: sunny, 52F."),
            ClusterItem::new("How is the weather in Chicago today?")
                .with_response("Good evening. Chicago weather: clear skies, 38F."),
            ClusterItem::new("Tell me the Chicago weather")
                .with_response("Of course. Chicago currently: overcast, 41F."),
        ]
    }

    #[test]
    fn pattern_compression_produces_smaller_thunk() {
        let compressor = ThunkCompressor::new();
        let thunk = compressor.compress(&weather_cluster(), ThunkKind::Pattern).unwrap();
        assert_eq!(thunk.kind, ThunkKind::Pattern);
        assert!(thunk.thunk_bytes <= thunk.original_bytes);
        assert!(thunk.compression_ratio() >= 1.0);
        assert!(thunk.trigger_pattern.contains("weather") || thunk.trigger_pattern.contains("chicago"));
        assert!(thunk.matches("what's the weather like"));
    }

    #[test]
    fn too_small_cluster_is_rejected() {
        let compressor = ThunkCompressor::new();
        let items = vec![ClusterItem::new("a"), ClusterItem::new("b")];
        assert!(compressor.compress(&items, ThunkKind::Pattern).is_none());
    }

    #[test]
    fn compression_is_deterministic() {
        let compressor = ThunkCompressor::new();
        let a = compressor.compress(&weather_cluster(), ThunkKind::Pattern).unwrap();
        let b = compressor.compress(&weather_cluster(), ThunkKind::Pattern).unwrap();
        assert_eq!(a.trigger_pattern, b.trigger_pattern);
        assert_eq!(a.template, b.template);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn generate_substitutes_all_placeholders() {
        let thunk = Thunk {
            id: "UTK-test".into(),
            name: "t".into(),
            kind: ThunkKind::Pattern,
            trigger_pattern: "greet".into(),
            template: "{greeting} {name}, it is {day}.".into(),
            variables: HashMap::from([("name".to_string(), "Morgan".to_string())]),
            confidence: 0.8,
            fire_count: 0,
            created_from_count: 3,
            original_bytes: 100,
            thunk_bytes: 50,
            created_at: Utc::now(),
            last_fired: None,
        };
        let output = thunk.generate(&HashMap::new());
        assert!(!output.contains('{'), "unsubstituted placeholder in: {}", output);
        assert!(output.contains("Morgan"));
    }

    #[test]
    fn knowledge_cluster_joins_distinct_facts() {
        let compressor = ThunkCompressor::new();
        let items = vec![
            ClusterItem::new("Rust compiles to native machine code"),
            ClusterItem::new("Rust ownership prevents data races"),
            ClusterItem::new("Rust compiles to native machine code"),
            ClusterItem::new("Rust has no garbage collector overhead"),
        ];
        let thunk = compressor.compress(&items, ThunkKind::Knowledge).unwrap();
        assert_eq!(thunk.kind, ThunkKind::Knowledge);
        // Duplicates collapse; the separator joins distinct facts.
        assert_eq!(thunk.template.matches(" | ").count(), 2);
    }

    #[test]
    fn routine_extracts_peak_hour() {
        let compressor = ThunkCompressor::new();
        let at_hour = |h: u32| Utc.with_ymd_and_hms(2025, 6, 1, h, 0, 0).unwrap();
        let items = vec![
            ClusterItem::new("morning briefing: overnight build status and inbox triage")
                .with_timestamp(at_hour(7)),
            ClusterItem::new("morning briefing: calendar review and standup preparation")
                .with_timestamp(at_hour(7)),
            ClusterItem::new("morning briefing: market open summary and alerts")
                .with_timestamp(at_hour(7)),
            ClusterItem::new("late evening systems check").with_timestamp(at_hour(22)),
        ];
        let thunk = compressor.compress(&items, ThunkKind::Routine).unwrap();
        assert_eq!(thunk.trigger_pattern, "time:7");
        assert_eq!(thunk.variables.get("peak_hour"), Some(&"7".to_string()));
    }

    #[test]
    fn engine_stores_fires_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ThunkEngine::open_path(dir.path().join("test.db")).unwrap();

        let thunk = engine.compress_and_store(&weather_cluster(), ThunkKind::Pattern).unwrap();
        let output = engine.fire(&thunk.id, &HashMap::new()).unwrap();
        assert!(!output.is_empty());

        let stats = engine.get_stats();
        assert_eq!(stats.total_thunks, 1);
        assert_eq!(stats.total_fires, 1);
        assert!(stats.compression_ratio >= 1.0);
    }

    #[test]
    fn auto_generate_picks_highest_confidence_match() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ThunkEngine::open_path(dir.path().join("test.db")).unwrap();
        // Eight items puts confidence at 0.4, above the 0.3 firing floor.
        let cluster: Vec<ClusterItem> = (0..8)
            .map(|i| {
                ClusterItem::new(format!("what is the weather in Chicago right now {}", i))
                    .with_response(format!("Chicago weather report number {}", i))
            })
            .collect();
        engine.compress_and_store(&cluster, ThunkKind::Pattern).unwrap();

        let (output, used) = engine.auto_generate("chicago weather check").unwrap();
        assert!(!output.is_empty());
        assert_eq!(used.kind, ThunkKind::Pattern);
        assert!(used.confidence >= 0.3);
        assert!(engine.auto_generate("completely unrelated text about turnips").is_none());
    }
}
