//! CORTEX: the five-layer decaying memory.
//!
//! Every capture enters FLASH. A periodic tick promotes items that earn their
//! keep (importance or access) and forgets the rest; an hourly consolidation
//! pass moves short-term survivors to long-term and compresses stale
//! long-term items into the archive. Flash and working live in memory; the
//! three lower layers persist in SQLite.
//!
//! Storage failures are logged and swallowed; memory is advisory, never
//! fatal to request handling.

use crate::memory::store::tokenize;
use crate::shared::Metadata;
use chrono::{DateTime, Duration, TimeZone, Utc};
use dashmap::DashMap;
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// The five layers, fastest-decaying first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLayer {
    Flash,
    Working,
    ShortTerm,
    LongTerm,
    Archive,
}

impl MemoryLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryLayer::Flash => "flash",
            MemoryLayer::Working => "working",
            MemoryLayer::ShortTerm => "short_term",
            MemoryLayer::LongTerm => "long_term",
            MemoryLayer::Archive => "archive",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "flash" => MemoryLayer::Flash,
            "working" => MemoryLayer::Working,
            "short_term" => MemoryLayer::ShortTerm,
            "long_term" => MemoryLayer::LongTerm,
            _ => MemoryLayer::Archive,
        }
    }
}

/// Per-layer tuning. Decay rate is the survival multiplier per unit of the
/// layer's native time scale (minute/hour/day/month/year).
#[derive(Debug, Clone, Copy)]
pub struct LayerConfig {
    pub max_capacity: usize,
    pub decay_rate: f32,
    pub promotion_threshold: f32,
}

pub const fn layer_config(layer: MemoryLayer) -> LayerConfig {
    match layer {
        MemoryLayer::Flash => LayerConfig { max_capacity: 100, decay_rate: 0.90, promotion_threshold: 3.0 },
        MemoryLayer::Working => LayerConfig { max_capacity: 500, decay_rate: 0.50, promotion_threshold: 5.0 },
        MemoryLayer::ShortTerm => {
            LayerConfig { max_capacity: 2_000, decay_rate: 0.25, promotion_threshold: 7.0 }
        }
        MemoryLayer::LongTerm => {
            LayerConfig { max_capacity: 50_000, decay_rate: 0.05, promotion_threshold: 8.0 }
        }
        // Archive never promotes.
        MemoryLayer::Archive => {
            LayerConfig { max_capacity: 100_000, decay_rate: 0.01, promotion_threshold: 10.0 }
        }
    }
}

/// A single unit of memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub content: String,
    pub layer: MemoryLayer,
    pub importance: f32,
    pub confidence: f32,
    pub access_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub promoted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub topic: Option<String>,
    pub source: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Quick/deep importance scoring on the shared 1–10 scale.
pub struct ImportanceEvaluator;

static HIGH_MARKERS: &[&str] = &[
    "important", "critical", "urgent", "remember", "never forget", "always", "password",
    "key", "secret", "deadline", "meeting", "birthday", "anniversary", "error", "bug", "fix",
    "todo",
];

static LOW_MARKERS: &[&str] = &[
    "weather", "hello", "hi", "thanks", "okay", "ok", "sure", "maybe", "perhaps", "test",
    "testing",
];

impl ImportanceEvaluator {
    /// Cheap score for flash capture: seeded at 5.0, marker hits ±, length
    /// and question bonuses, clamped to [1, 10].
    pub fn quick_evaluate(content: &str) -> f32 {
        let lower = content.to_lowercase();
        let mut score = 5.0_f32;
        for marker in HIGH_MARKERS {
            if lower.contains(marker) {
                score += 1.0;
            }
        }
        for marker in LOW_MARKERS {
            if lower.contains(marker) {
                score -= 0.5;
            }
        }
        if content.len() > 200 {
            score += 0.5;
        }
        if content.len() > 500 {
            score += 0.5;
        }
        if content.contains('?') {
            score += 0.5;
        }
        score.clamp(1.0, 10.0)
    }

    /// Consolidation-time score: quick score plus context overlap (up to +2)
    /// and access-frequency (up to +2) boosts.
    pub fn deep_evaluate(item: &MemoryItem, context: &[MemoryItem]) -> f32 {
        let mut score = Self::quick_evaluate(&item.content);
        if !context.is_empty() {
            score += Self::context_relevance(item, context) * 2.0;
        }
        if item.access_count > 0 {
            score += (item.access_count as f32 * 0.2).min(2.0);
        }
        score.clamp(1.0, 10.0)
    }

    fn context_relevance(item: &MemoryItem, context: &[MemoryItem]) -> f32 {
        let item_words: HashSet<String> = tokenize(&item.content).into_iter().collect();
        let mut context_words: HashSet<String> = HashSet::new();
        for ctx in context.iter().rev().take(5) {
            context_words.extend(tokenize(&ctx.content));
        }
        if item_words.is_empty() || context_words.is_empty() {
            return 0.0;
        }
        let overlap = item_words.intersection(&context_words).count();
        (overlap as f32 / 10.0).min(1.0)
    }
}

/// Counters returned from one tick.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TickStats {
    pub promoted: usize,
    pub forgotten: usize,
    pub archived: usize,
}

/// Per-layer counts plus utilization of the total storage bound.
#[derive(Debug, Clone, Serialize)]
pub struct CortexStats {
    pub flash_count: usize,
    pub working_count: usize,
    pub short_term_count: u64,
    pub long_term_count: u64,
    pub archive_count: u64,
    pub total_memories: u64,
    pub storage_bound: u64,
    pub utilization_percent: f32,
}

pub struct Cortex {
    db_path: PathBuf,
    flash: Mutex<Vec<MemoryItem>>,
    working: DashMap<String, MemoryItem>,
    last_consolidation: Mutex<DateTime<Utc>>,
}

fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

impl Cortex {
    /// Opens the persistent layers in the given SQLite file (shared with the
    /// permanent store) and empty in-memory flash/working layers.
    pub fn open_path<P: AsRef<Path>>(db_path: P) -> Result<Self, rusqlite::Error> {
        let this = Self {
            db_path: db_path.as_ref().to_path_buf(),
            flash: Mutex::new(Vec::new()),
            working: DashMap::new(),
            last_consolidation: Mutex::new(Utc::now()),
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
            CREATE TABLE IF NOT EXISTS cortex_memory (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                layer TEXT NOT NULL,
                importance REAL NOT NULL DEFAULT 5.0,
                confidence REAL NOT NULL DEFAULT 0.5,
                access_count INTEGER NOT NULL DEFAULT 0,
                created_at_ms INTEGER NOT NULL,
                last_accessed_ms INTEGER NOT NULL,
                promoted_at_ms INTEGER NULL,
                keywords TEXT NOT NULL DEFAULT '[]',
                topic TEXT NULL,
                source TEXT NOT NULL DEFAULT 'input',
                metadata TEXT NOT NULL DEFAULT '{}'
            );
            CREATE INDEX IF NOT EXISTS idx_cortex_layer ON cortex_memory(layer);
            CREATE INDEX IF NOT EXISTS idx_cortex_importance ON cortex_memory(importance DESC);
            "#,
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Capture
    // -----------------------------------------------------------------------

    /// Captures new content into FLASH, evaluating importance when the caller
    /// does not supply one. Oldest flash items drop past capacity.
    pub fn capture(
        &self,
        content: &str,
        importance: Option<f32>,
        topic: Option<&str>,
        metadata: Option<Metadata>,
    ) -> MemoryItem {
        let now = Utc::now();
        let importance = importance
            .map(|i| i.clamp(1.0, 10.0))
            .unwrap_or_else(|| ImportanceEvaluator::quick_evaluate(content));
        let item = MemoryItem {
            id: format!("MEM-{}", &uuid::Uuid::new_v4().simple().to_string()[..12]),
            content: content.to_string(),
            layer: MemoryLayer::Flash,
            importance,
            confidence: 0.5,
            access_count: 0,
            created_at: now,
            last_accessed: now,
            promoted_at: None,
            keywords: Vec::new(),
            topic: topic.map(String::from),
            source: "input".to_string(),
            metadata: metadata.unwrap_or_default(),
        };

        if let Ok(mut flash) = self.flash.lock() {
            flash.push(item.clone());
            let capacity = layer_config(MemoryLayer::Flash).max_capacity;
            if flash.len() > capacity {
                let excess = flash.len() - capacity;
                flash.drain(..excess);
            }
        }
        item
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Processes decay and promotion as of now.
    pub fn tick(&self) -> TickStats {
        self.tick_at(Utc::now())
    }

    /// Processes decay and promotion as of the given instant. Periodic
    /// callers and simulations share this one code path.
    pub fn tick_at(&self, now: DateTime<Utc>) -> TickStats {
        let mut stats = TickStats::default();

        // FLASH: items older than 30 s either promote (importance >= 3 or any
        // access) or are forgotten.
        let promoted_to_working = {
            let mut promoted = Vec::new();
            if let Ok(mut flash) = self.flash.lock() {
                let mut remaining = Vec::with_capacity(flash.len());
                let threshold = layer_config(MemoryLayer::Flash).promotion_threshold;
                for mut item in flash.drain(..) {
                    let age = now - item.created_at;
                    if age > Duration::seconds(30) {
                        if item.importance >= threshold || item.access_count > 0 {
                            item.layer = MemoryLayer::Working;
                            item.promoted_at = Some(now);
                            promoted.push(item);
                        } else {
                            stats.forgotten += 1;
                        }
                    } else {
                        remaining.push(item);
                    }
                }
                *flash = remaining;
            }
            promoted
        };
        stats.promoted += promoted_to_working.len();
        for item in promoted_to_working {
            self.add_to_working(item);
        }

        // WORKING: strength = importance × decay^hours. Promote on importance
        // or access; forget on weakness or age.
        let config = layer_config(MemoryLayer::Working);
        let mut to_persist = Vec::new();
        let mut to_forget = Vec::new();
        for entry in self.working.iter() {
            let item = entry.value();
            let age = now - item.promoted_at.unwrap_or(item.created_at);
            let age_hours = age.num_seconds() as f32 / 3600.0;
            let strength = item.importance * config.decay_rate.powf(age_hours);

            if item.importance >= config.promotion_threshold || item.access_count > 2 {
                to_persist.push(item.clone());
            } else if strength < 1.0 || age > Duration::minutes(30) {
                to_forget.push(item.id.clone());
            }
        }
        for id in &to_forget {
            self.working.remove(id);
            stats.forgotten += 1;
        }
        for mut item in to_persist {
            self.working.remove(&item.id);
            item.layer = MemoryLayer::ShortTerm;
            item.promoted_at = Some(now);
            if self.persist_item(&item).is_ok() {
                stats.promoted += 1;
            }
        }

        // Hourly consolidation.
        let due = {
            let mut last = match self.last_consolidation.lock() {
                Ok(guard) => guard,
                Err(_) => return stats,
            };
            if now - *last > Duration::hours(1) {
                *last = now;
                true
            } else {
                false
            }
        };
        if due {
            let consolidation = self.consolidate_at(now);
            stats.promoted += consolidation.promoted;
            stats.archived += consolidation.archived;
        }

        stats
    }

    fn add_to_working(&self, item: MemoryItem) {
        self.working.insert(item.id.clone(), item);
        let capacity = layer_config(MemoryLayer::Working).max_capacity;
        while self.working.len() > capacity {
            // Evict the lowest-importance item, never the highest.
            let weakest = self
                .working
                .iter()
                .min_by(|a, b| {
                    a.importance
                        .partial_cmp(&b.importance)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|e| e.key().clone());
            match weakest {
                Some(id) => {
                    self.working.remove(&id);
                }
                None => break,
            }
        }
    }

    // -----------------------------------------------------------------------
    // Consolidation
    // -----------------------------------------------------------------------

    /// Hourly pass: short-term survivors move to long-term; long-term items
    /// unaccessed for a year with importance < 5 are compressed into the
    /// archive (content truncated to 200 chars).
    pub fn consolidate_at(&self, now: DateTime<Utc>) -> TickStats {
        let mut stats = TickStats::default();
        let conn = match self.open() {
            Ok(conn) => conn,
            Err(err) => {
                warn!("cortex consolidation skipped: {}", err);
                return stats;
            }
        };

        let promote: Vec<MemoryItem> = {
            let mut stmt = match conn.prepare(
                "SELECT id, content, layer, importance, confidence, access_count,
                        created_at_ms, last_accessed_ms, promoted_at_ms, keywords, topic,
                        source, metadata
                 FROM cortex_memory
                 WHERE layer = 'short_term' AND (importance >= 7 OR access_count > 5)",
            ) {
                Ok(stmt) => stmt,
                Err(_) => return stats,
            };
            stmt.query_map([], row_to_item)
                .map(|rows| rows.filter_map(|r| r.ok()).collect())
                .unwrap_or_default()
        };
        for mut item in promote {
            item.layer = MemoryLayer::LongTerm;
            item.promoted_at = Some(now);
            if self.persist_item(&item).is_ok() {
                stats.promoted += 1;
            }
        }

        let cutoff_ms = (now - Duration::days(365)).timestamp_millis();
        let stale: Vec<MemoryItem> = {
            let mut stmt = match conn.prepare(
                "SELECT id, content, layer, importance, confidence, access_count,
                        created_at_ms, last_accessed_ms, promoted_at_ms, keywords, topic,
                        source, metadata
                 FROM cortex_memory
                 WHERE layer = 'long_term' AND last_accessed_ms < ?1 AND importance < 5",
            ) {
                Ok(stmt) => stmt,
                Err(_) => return stats,
            };
            stmt.query_map(params![cutoff_ms], row_to_item)
                .map(|rows| rows.filter_map(|r| r.ok()).collect())
                .unwrap_or_default()
        };
        for item in stale {
            if self.archive_item(&conn, &item, now).is_ok() {
                stats.archived += 1;
            }
        }

        stats
    }

    fn archive_item(
        &self,
        conn: &Connection,
        item: &MemoryItem,
        now: DateTime<Utc>,
    ) -> Result<(), rusqlite::Error> {
        let summary: String = if item.content.chars().count() > 200 {
            let truncated: String = item.content.chars().take(200).collect();
            format!("{}...", truncated)
        } else {
            item.content.clone()
        };
        let archived = MemoryItem {
            id: format!("ARC-{}", item.id),
            content: format!("[ARCHIVED] {}", summary),
            layer: MemoryLayer::Archive,
            importance: item.importance,
            confidence: item.confidence * 0.5,
            access_count: 0,
            created_at: item.created_at,
            last_accessed: now,
            promoted_at: Some(now),
            keywords: item.keywords.iter().take(5).cloned().collect(),
            topic: item.topic.clone(),
            source: "archive".to_string(),
            metadata: Metadata::from([(
                "original_id".to_string(),
                serde_json::json!(item.id.clone()),
            )]),
        };
        self.persist_with(conn, &archived)?;
        conn.execute("DELETE FROM cortex_memory WHERE id = ?1", params![item.id])?;
        Ok(())
    }

    fn persist_item(&self, item: &MemoryItem) -> Result<(), rusqlite::Error> {
        let conn = self.open().map_err(|err| {
            warn!("cortex persist failed to open db: {}", err);
            err
        })?;
        self.persist_with(&conn, item)?;
        self.enforce_layer_capacity(&conn, item.layer);
        Ok(())
    }

    fn persist_with(&self, conn: &Connection, item: &MemoryItem) -> Result<(), rusqlite::Error> {
        conn.execute(
            r#"
            INSERT OR REPLACE INTO cortex_memory
                (id, content, layer, importance, confidence, access_count,
                 created_at_ms, last_accessed_ms, promoted_at_ms, keywords, topic,
                 source, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                item.id,
                item.content,
                item.layer.as_str(),
                item.importance as f64,
                item.confidence as f64,
                item.access_count as i64,
                item.created_at.timestamp_millis(),
                item.last_accessed.timestamp_millis(),
                item.promoted_at.map(|t| t.timestamp_millis()),
                serde_json::to_string(&item.keywords).unwrap_or_else(|_| "[]".into()),
                item.topic,
                item.source,
                serde_json::to_string(&item.metadata).unwrap_or_else(|_| "{}".into()),
            ],
        )?;
        Ok(())
    }

    /// Past capacity, a persistent layer sheds its lowest-importance rows.
    fn enforce_layer_capacity(&self, conn: &Connection, layer: MemoryLayer) {
        let capacity = layer_config(layer).max_capacity;
        let result = conn.execute(
            "DELETE FROM cortex_memory WHERE id IN (
                SELECT id FROM cortex_memory WHERE layer = ?1
                ORDER BY importance ASC, last_accessed_ms ASC
                LIMIT MAX(0, (SELECT COUNT(*) FROM cortex_memory WHERE layer = ?1) - ?2)
            )",
            params![layer.as_str(), capacity as i64],
        );
        if let Err(err) = result {
            warn!("cortex capacity enforcement failed: {}", err);
        }
    }

    // -----------------------------------------------------------------------
    // Recall
    // -----------------------------------------------------------------------

    /// Recalls items matching the query: in-memory layers first, then
    /// persistent layers importance-descending. Every returned item has its
    /// access counters bumped. Ranked by importance × recency.
    pub fn recall(&self, query: &str, limit: usize, min_importance: f32) -> Vec<MemoryItem> {
        let now = Utc::now();
        let query_words: HashSet<String> = tokenize(query).into_iter().collect();
        let match_all = query_words.is_empty();
        let mut results: Vec<MemoryItem> = Vec::new();

        if let Ok(mut flash) = self.flash.lock() {
            for item in flash.iter_mut() {
                if item.importance >= min_importance && (match_all || matches_query(item, &query_words)) {
                    item.access_count += 1;
                    item.last_accessed = now;
                    results.push(item.clone());
                }
            }
        }
        for mut entry in self.working.iter_mut() {
            let item = entry.value_mut();
            if item.importance >= min_importance && (match_all || matches_query(item, &query_words)) {
                item.access_count += 1;
                item.last_accessed = now;
                results.push(item.clone());
            }
        }

        match self.recall_persistent(&query_words, match_all, limit * 3, min_importance, now) {
            Ok(mut persistent) => results.append(&mut persistent),
            Err(err) => warn!("cortex persistent recall failed: {}", err),
        }

        results.sort_by(|a, b| {
            let score = |item: &MemoryItem| {
                let days = (now - item.last_accessed).num_days().max(0) as f32;
                item.importance * (1.0 / (days + 1.0))
            };
            score(b).partial_cmp(&score(a)).unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);
        results
    }

    fn recall_persistent(
        &self,
        query_words: &HashSet<String>,
        match_all: bool,
        fetch: usize,
        min_importance: f32,
        now: DateTime<Utc>,
    ) -> Result<Vec<MemoryItem>, rusqlite::Error> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, content, layer, importance, confidence, access_count,
                    created_at_ms, last_accessed_ms, promoted_at_ms, keywords, topic,
                    source, metadata
             FROM cortex_memory WHERE importance >= ?1
             ORDER BY importance DESC, last_accessed_ms DESC LIMIT ?2",
        )?;
        let candidates: Vec<MemoryItem> = stmt
            .query_map(params![min_importance as f64, fetch as i64], row_to_item)?
            .filter_map(|r| r.ok())
            .collect();

        let mut matched = Vec::new();
        for mut item in candidates {
            if match_all || matches_query(&item, query_words) {
                item.access_count += 1;
                item.last_accessed = now;
                conn.execute(
                    "UPDATE cortex_memory
                     SET access_count = access_count + 1, last_accessed_ms = ?2
                     WHERE id = ?1",
                    params![item.id, now.timestamp_millis()],
                )?;
                matched.push(item);
            }
        }
        Ok(matched)
    }

    /// Explicitly forgets one item from any layer.
    pub fn forget(&self, item_id: &str) -> bool {
        if let Ok(mut flash) = self.flash.lock() {
            let before = flash.len();
            flash.retain(|i| i.id != item_id);
            if flash.len() < before {
                return true;
            }
        }
        if self.working.remove(item_id).is_some() {
            return true;
        }
        match self.open() {
            Ok(conn) => conn
                .execute("DELETE FROM cortex_memory WHERE id = ?1", params![item_id])
                .map(|n| n > 0)
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Snapshot of an item wherever it currently lives. Test and diagnostic
    /// surface; does not bump access counters.
    pub fn get_item(&self, item_id: &str) -> Option<MemoryItem> {
        if let Ok(flash) = self.flash.lock() {
            if let Some(item) = flash.iter().find(|i| i.id == item_id) {
                return Some(item.clone());
            }
        }
        if let Some(item) = self.working.get(item_id) {
            return Some(item.clone());
        }
        let conn = self.open().ok()?;
        conn.query_row(
            "SELECT id, content, layer, importance, confidence, access_count,
                    created_at_ms, last_accessed_ms, promoted_at_ms, keywords, topic,
                    source, metadata
             FROM cortex_memory WHERE id = ?1",
            params![item_id],
            row_to_item,
        )
        .ok()
    }

    /// Marks an in-memory item as accessed. Promotion paths honor access
    /// counts, so recalled flash items survive the 30-second gate.
    pub fn touch(&self, item_id: &str) {
        let now = Utc::now();
        if let Ok(mut flash) = self.flash.lock() {
            if let Some(item) = flash.iter_mut().find(|i| i.id == item_id) {
                item.access_count += 1;
                item.last_accessed = now;
                return;
            }
        }
        if let Some(mut item) = self.working.get_mut(item_id) {
            item.access_count += 1;
            item.last_accessed = now;
        }
    }

    pub fn get_stats(&self) -> CortexStats {
        let flash_count = self.flash.lock().map(|f| f.len()).unwrap_or(0);
        let working_count = self.working.len();

        let mut layer_counts = [0u64; 3];
        if let Ok(conn) = self.open() {
            for (i, layer) in ["short_term", "long_term", "archive"].iter().enumerate() {
                layer_counts[i] = conn
                    .query_row(
                        "SELECT COUNT(*) FROM cortex_memory WHERE layer = ?1",
                        params![layer],
                        |row| row.get::<_, i64>(0),
                    )
                    .unwrap_or(0) as u64;
            }
        }

        let total = flash_count as u64 + working_count as u64 + layer_counts.iter().sum::<u64>();
        let storage_bound: u64 = [
            MemoryLayer::Flash,
            MemoryLayer::Working,
            MemoryLayer::ShortTerm,
            MemoryLayer::LongTerm,
            MemoryLayer::Archive,
        ]
        .iter()
        .map(|l| layer_config(*l).max_capacity as u64)
        .sum();

        CortexStats {
            flash_count,
            working_count,
            short_term_count: layer_counts[0],
            long_term_count: layer_counts[1],
            archive_count: layer_counts[2],
            total_memories: total,
            storage_bound,
            utilization_percent: (total as f32 / storage_bound as f32) * 100.0,
        }
    }
}

fn matches_query(item: &MemoryItem, query_words: &HashSet<String>) -> bool {
    let content_words: HashSet<String> = tokenize(&item.content).into_iter().collect();
    if query_words.iter().any(|w| content_words.contains(w)) {
        return true;
    }
    item.keywords.iter().any(|k| query_words.contains(&k.to_lowercase()))
}

fn row_to_item(row: &rusqlite::Row<'_>) -> Result<MemoryItem, rusqlite::Error> {
    let keywords: String = row.get(9)?;
    let metadata: String = row.get(12)?;
    let layer: String = row.get(2)?;
    Ok(MemoryItem {
        id: row.get(0)?,
        content: row.get(1)?,
        layer: MemoryLayer::parse(&layer),
        importance: row.get::<_, f64>(3)? as f32,
        confidence: row.get::<_, f64>(4)? as f32,
        access_count: row.get::<_, i64>(5)? as u32,
        created_at: ms_to_datetime(row.get(6)?),
        last_accessed: ms_to_datetime(row.get(7)?),
        promoted_at: row.get::<_, Option<i64>>(8)?.map(ms_to_datetime),
        keywords: serde_json::from_str(&keywords).unwrap_or_default(),
        topic: row.get(10)?,
        source: row.get(11)?,
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cortex() -> (tempfile::TempDir, Cortex) {
        let dir = tempfile::tempdir().unwrap();
        let cortex = Cortex::open_path(dir.path().join("test.db")).unwrap();
        (dir, cortex)
    }

    #[test]
    fn quick_importance_scoring() {
        assert!(ImportanceEvaluator::quick_evaluate("remember this password") > 5.0);
        assert!(ImportanceEvaluator::quick_evaluate("hello hi thanks ok") < 5.0);
        assert_eq!(ImportanceEvaluator::quick_evaluate(""), 5.0);
        let long = "x".repeat(600);
        assert_eq!(ImportanceEvaluator::quick_evaluate(&long), 6.0);
    }

    #[test]
    fn capture_enters_flash() {
        let (_dir, cortex) = cortex();
        let item = cortex.capture("note the deadline", None, Some("work"), None);
        assert_eq!(item.layer, MemoryLayer::Flash);
        assert!(item.importance > 5.0);
        assert_eq!(cortex.get_stats().flash_count, 1);
    }

    #[test]
    fn low_importance_never_leaves_flash() {
        let (_dir, cortex) = cortex();
        let item = cortex.capture("hi", Some(1.0), None, None);
        let stats = cortex.tick_at(Utc::now() + Duration::seconds(31));
        assert_eq!(stats.promoted, 0);
        assert_eq!(stats.forgotten, 1);
        assert!(cortex.get_item(&item.id).is_none());
    }

    #[test]
    fn important_item_promotes_through_layers() {
        let (_dir, cortex) = cortex();
        let content = format!("important deadline {}", "x".repeat(280));
        let item = cortex.capture(&content, Some(7.5), Some("work"), None);

        // After 31 simulated seconds the item moves to WORKING.
        cortex.tick_at(Utc::now() + Duration::seconds(31));
        let moved = cortex.get_item(&item.id).unwrap();
        assert_eq!(moved.layer, MemoryLayer::Working);

        // Another tick: importance >= 5 promotes straight to SHORT_TERM,
        // which is persistent.
        cortex.tick_at(Utc::now() + Duration::seconds(32));
        let persisted = cortex.get_item(&item.id).unwrap();
        assert_eq!(persisted.layer, MemoryLayer::ShortTerm);
        assert!(cortex.get_stats().short_term_count >= 1);
    }

    #[test]
    fn hourly_consolidation_promotes_short_term() {
        let (_dir, cortex) = cortex();
        let item = cortex.capture("critical never forget this error", Some(8.0), None, None);
        let base = Utc::now();
        cortex.tick_at(base + Duration::seconds(31));
        cortex.tick_at(base + Duration::seconds(32));
        assert_eq!(cortex.get_item(&item.id).unwrap().layer, MemoryLayer::ShortTerm);

        // The next tick past the hour runs consolidation: importance >= 7
        // lifts the item into LONG_TERM.
        cortex.tick_at(base + Duration::hours(2));
        assert_eq!(cortex.get_item(&item.id).unwrap().layer, MemoryLayer::LongTerm);
    }

    #[test]
    fn recall_bumps_access_and_ranks() {
        let (_dir, cortex) = cortex();
        cortex.capture("the launch code is izanagi", Some(8.0), None, None);
        cortex.capture("lunch was a sandwich", Some(4.0), None, None);
        let hits = cortex.recall("launch code", 5, 0.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].access_count, 1);
        assert!(hits[0].content.contains("izanagi"));
    }

    #[test]
    fn forget_removes_from_any_layer() {
        let (_dir, cortex) = cortex();
        let item = cortex.capture("temporary thought", Some(5.0), None, None);
        assert!(cortex.forget(&item.id));
        assert!(cortex.get_item(&item.id).is_none());
        assert!(!cortex.forget(&item.id));
    }

    #[test]
    fn flash_capacity_drops_oldest() {
        let (_dir, cortex) = cortex();
        let first = cortex.capture("note zero", Some(5.0), None, None);
        for i in 1..110 {
            cortex.capture(&format!("note {}", i), Some(5.0), None, None);
        }
        let stats = cortex.get_stats();
        assert_eq!(stats.flash_count, 100);
        // The earliest capture is among the dropped.
        assert!(cortex.get_item(&first.id).is_none());
    }

    #[test]
    fn deep_evaluate_adds_context_and_access_boosts() {
        let (_dir, cortex) = cortex();
        let item = cortex.capture("rust borrow checker rules", Some(5.0), None, None);
        let mut accessed = item.clone();
        accessed.access_count = 10;
        let context = vec![cortex.capture("tell me about the rust borrow checker", None, None, None)];
        let deep = ImportanceEvaluator::deep_evaluate(&accessed, &context);
        assert!(deep > ImportanceEvaluator::quick_evaluate(&item.content));
    }
}
