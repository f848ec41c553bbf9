//! Permanent store: durable keyed knowledge, the conversation log, and the
//! pattern/skill tables, all in one SQLite file.
//!
//! Connections are opened per operation against a shared path; SQLite's own
//! locking serializes writers, and conversation timestamps are additionally
//! forced monotonically non-decreasing by a process-wide watermark.

use crate::shared::{ConversationTurn, KnowledgeEntry};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invariant violated: {0}")]
    Invariant(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Per-skill attempt/success counters.
#[derive(Debug, Clone, Serialize)]
pub struct SkillPerformance {
    pub attempts: u64,
    pub successes: u64,
    pub success_rate: f64,
}

/// Integer counters surfaced through the stats API.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub conversations: u64,
    pub knowledge: u64,
    pub patterns: u64,
    pub skills: u64,
}

pub struct PermanentStore {
    db_path: PathBuf,
    /// Millisecond watermark: no stored conversation timestamp goes backward.
    timestamp_watermark: AtomicI64,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

/// Content words of a query, lowercased, short tokens skipped.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(String::from)
        .collect()
}

impl PermanentStore {
    /// Opens (or creates) the store at the given SQLite path.
    pub fn open_path<P: AsRef<Path>>(db_path: P) -> StoreResult<Self> {
        let this = Self {
            db_path: db_path.as_ref().to_path_buf(),
            timestamp_watermark: AtomicI64::new(0),
        };
        this.init()?;
        // Resume the watermark from the newest stored turn.
        if let Some(latest) = this.latest_conversation_ms()? {
            this.timestamp_watermark.store(latest, Ordering::SeqCst);
        }
        Ok(this)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn open(&self) -> Result<Connection, rusqlite::Error> {
        Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
    }

    fn init(&self) -> StoreResult<()> {
        if let Some(parent) = self.db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = self.open()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                timestamp_ms INTEGER NOT NULL,
                user_text TEXT NOT NULL,
                assistant_text TEXT NOT NULL,
                topics TEXT NOT NULL DEFAULT '[]',
                importance REAL NOT NULL DEFAULT 5.0,
                success INTEGER NOT NULL DEFAULT 1,
                models_used TEXT NOT NULL DEFAULT '[]',
                context_hint TEXT NULL,
                metadata TEXT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_conversations_ts ON conversations(timestamp_ms);

            CREATE TABLE IF NOT EXISTS knowledge (
                category TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                source TEXT NULL,
                importance REAL NOT NULL DEFAULT 5.0,
                confidence REAL NOT NULL DEFAULT 0.8,
                created_at_ms INTEGER NOT NULL,
                last_accessed_ms INTEGER NOT NULL,
                access_count INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NULL,
                PRIMARY KEY (category, key)
            );
            CREATE INDEX IF NOT EXISTS idx_knowledge_category ON knowledge(category);

            CREATE TABLE IF NOT EXISTS patterns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pattern_type TEXT NOT NULL,
                data TEXT NOT NULL,
                success INTEGER NOT NULL DEFAULT 1,
                recorded_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS skills (
                skill TEXT PRIMARY KEY,
                attempts INTEGER NOT NULL DEFAULT 0,
                successes INTEGER NOT NULL DEFAULT 0,
                notes TEXT NULL,
                last_used_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS scan_findings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                target TEXT NOT NULL,
                severity TEXT NOT NULL,
                finding TEXT NOT NULL,
                metadata TEXT NULL,
                recorded_at_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_scan_findings_target ON scan_findings(target);
            "#,
        )?;
        Ok(())
    }

    fn latest_conversation_ms(&self) -> StoreResult<Option<i64>> {
        let conn = self.open()?;
        let latest: Option<i64> = conn
            .query_row("SELECT MAX(timestamp_ms) FROM conversations", [], |row| row.get(0))
            .optional()?
            .flatten();
        Ok(latest)
    }

    // -----------------------------------------------------------------------
    // Conversations
    // -----------------------------------------------------------------------

    /// Stores a turn, assigning it a timestamp that never goes backward.
    /// Returns the timestamp actually stored.
    pub fn store_conversation(&self, turn: &ConversationTurn) -> StoreResult<DateTime<Utc>> {
        let requested = turn.timestamp.timestamp_millis().max(now_ms());
        let ts = self
            .timestamp_watermark
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
                Some(prev.max(requested))
            })
            .map(|prev| prev.max(requested))
            .unwrap_or(requested);

        let conn = self.open()?;
        conn.execute(
            r#"
            INSERT INTO conversations
                (id, timestamp_ms, user_text, assistant_text, topics, importance,
                 success, models_used, context_hint)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                turn.id,
                ts,
                turn.user_text,
                turn.assistant_text,
                serde_json::to_string(&turn.topics)?,
                turn.importance.clamp(1.0, 10.0) as f64,
                turn.success as i64,
                serde_json::to_string(&turn.models_used)?,
                turn.context_hint,
            ],
        )?;
        Ok(ms_to_datetime(ts))
    }

    /// Most recent turns first.
    pub fn get_conversation_context(&self, limit: usize) -> StoreResult<Vec<ConversationTurn>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp_ms, user_text, assistant_text, topics, importance,
                    success, models_used, context_hint
             FROM conversations ORDER BY timestamp_ms DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_turn)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Token-overlap search over the conversation log.
    pub fn search_conversations(
        &self,
        query: &str,
        limit: usize,
        min_importance: Option<f32>,
    ) -> StoreResult<Vec<ConversationTurn>> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let min_importance = min_importance.unwrap_or(1.0) as f64;

        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp_ms, user_text, assistant_text, topics, importance,
                    success, models_used, context_hint
             FROM conversations WHERE importance >= ?1
             ORDER BY timestamp_ms DESC LIMIT 500",
        )?;
        let mut scored: Vec<(usize, ConversationTurn)> = stmt
            .query_map(params![min_importance], row_to_turn)?
            .filter_map(|r| r.ok())
            .filter_map(|turn| {
                let haystack: HashSet<String> = tokenize(&turn.user_text).into_iter().collect();
                let overlap = tokens.iter().filter(|t| haystack.contains(*t)).count();
                if overlap > 0 {
                    Some((overlap, turn))
                } else {
                    None
                }
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().take(limit).map(|(_, t)| t).collect())
    }

    // -----------------------------------------------------------------------
    // Knowledge
    // -----------------------------------------------------------------------

    /// Upserts a knowledge entry. On conflict the value and source are
    /// overwritten while importance/confidence only move upward; use
    /// [`PermanentStore::downgrade_knowledge`] to lower them explicitly.
    pub fn store_knowledge(
        &self,
        category: &str,
        key: &str,
        value: &str,
        importance: f32,
        confidence: f32,
        source: Option<&str>,
    ) -> StoreResult<()> {
        if category.is_empty() || key.is_empty() {
            return Err(StoreError::Invariant("knowledge category/key must be non-empty".into()));
        }
        let ts = now_ms();
        let conn = self.open()?;
        conn.execute(
            r#"
            INSERT INTO knowledge
                (category, key, value, source, importance, confidence,
                 created_at_ms, last_accessed_ms, access_count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, 0)
            ON CONFLICT(category, key) DO UPDATE SET
                value = excluded.value,
                source = COALESCE(excluded.source, knowledge.source),
                importance = MAX(knowledge.importance, excluded.importance),
                confidence = MAX(knowledge.confidence, excluded.confidence),
                last_accessed_ms = excluded.last_accessed_ms
            "#,
            params![
                category,
                key,
                value,
                source,
                importance.clamp(1.0, 10.0) as f64,
                confidence.clamp(0.0, 1.0) as f64,
                ts,
            ],
        )?;
        Ok(())
    }

    /// Explicit downgrade of importance/confidence for one entry.
    pub fn downgrade_knowledge(
        &self,
        category: &str,
        key: &str,
        importance: f32,
        confidence: f32,
    ) -> StoreResult<()> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE knowledge SET importance = ?3, confidence = ?4
             WHERE category = ?1 AND key = ?2",
            params![
                category,
                key,
                importance.clamp(1.0, 10.0) as f64,
                confidence.clamp(0.0, 1.0) as f64
            ],
        )?;
        Ok(())
    }

    /// Recalls one entry by `(category, key)`, bumping its access counters.
    pub fn recall_knowledge(&self, category: &str, key: &str) -> StoreResult<Option<KnowledgeEntry>> {
        let conn = self.open()?;
        let entry = conn
            .query_row(
                "SELECT category, key, value, source, importance, confidence,
                        created_at_ms, last_accessed_ms, access_count
                 FROM knowledge WHERE category = ?1 AND key = ?2",
                params![category, key],
                row_to_knowledge,
            )
            .optional()?;
        if entry.is_some() {
            conn.execute(
                "UPDATE knowledge SET access_count = access_count + 1, last_accessed_ms = ?3
                 WHERE category = ?1 AND key = ?2",
                params![category, key, now_ms()],
            )?;
        }
        Ok(entry)
    }

    /// All entries in one category, importance-descending.
    pub fn recall_category(&self, category: &str) -> StoreResult<Vec<KnowledgeEntry>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT category, key, value, source, importance, confidence,
                    created_at_ms, last_accessed_ms, access_count
             FROM knowledge WHERE category = ?1 ORDER BY importance DESC",
        )?;
        let rows = stmt.query_map(params![category], row_to_knowledge)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Token-overlap ranked search across all knowledge.
    pub fn search_knowledge(&self, query: &str, limit: usize) -> StoreResult<Vec<KnowledgeEntry>> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT category, key, value, source, importance, confidence,
                    created_at_ms, last_accessed_ms, access_count
             FROM knowledge ORDER BY importance DESC LIMIT 1000",
        )?;
        let mut scored: Vec<(f64, KnowledgeEntry)> = stmt
            .query_map([], row_to_knowledge)?
            .filter_map(|r| r.ok())
            .filter_map(|entry| {
                let mut haystack: HashSet<String> = tokenize(&entry.value).into_iter().collect();
                haystack.extend(tokenize(&entry.key));
                let overlap = tokens.iter().filter(|t| haystack.contains(*t)).count();
                if overlap > 0 {
                    Some((overlap as f64 * entry.importance as f64, entry))
                } else {
                    None
                }
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(limit).map(|(_, e)| e).collect())
    }

    // -----------------------------------------------------------------------
    // Patterns and skills
    // -----------------------------------------------------------------------

    pub fn record_pattern(
        &self,
        pattern_type: &str,
        data: &serde_json::Value,
        success: bool,
    ) -> StoreResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO patterns (pattern_type, data, success, recorded_at_ms)
             VALUES (?1, ?2, ?3, ?4)",
            params![pattern_type, data.to_string(), success as i64, now_ms()],
        )?;
        Ok(())
    }

    pub fn track_skill_use(&self, skill: &str, success: bool, notes: Option<&str>) -> StoreResult<()> {
        let conn = self.open()?;
        conn.execute(
            r#"
            INSERT INTO skills (skill, attempts, successes, notes, last_used_ms)
            VALUES (?1, 1, ?2, ?3, ?4)
            ON CONFLICT(skill) DO UPDATE SET
                attempts = skills.attempts + 1,
                successes = skills.successes + excluded.successes,
                notes = COALESCE(excluded.notes, skills.notes),
                last_used_ms = excluded.last_used_ms
            "#,
            params![skill, success as i64, notes, now_ms()],
        )?;
        Ok(())
    }

    /// Records one security-scan finding from an external scanner integration.
    pub fn record_scan_finding(
        &self,
        target: &str,
        severity: &str,
        finding: &str,
        metadata: Option<&serde_json::Value>,
    ) -> StoreResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO scan_findings (target, severity, finding, metadata, recorded_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![target, severity, finding, metadata.map(|m| m.to_string()), now_ms()],
        )?;
        Ok(())
    }

    /// Findings for one target, most recent first.
    pub fn scan_findings(&self, target: &str, limit: usize) -> StoreResult<Vec<(String, String)>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT severity, finding FROM scan_findings WHERE target = ?1
             ORDER BY recorded_at_ms DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![target, limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Per-skill attempt/success counters, for the agent-performance surface.
    pub fn skill_performance(&self) -> StoreResult<HashMap<String, SkillPerformance>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare("SELECT skill, attempts, successes FROM skills")?;
        let rows = stmt.query_map([], |row| {
            let skill: String = row.get(0)?;
            let attempts: u64 = row.get::<_, i64>(1)? as u64;
            let successes: u64 = row.get::<_, i64>(2)? as u64;
            Ok((skill, attempts, successes))
        })?;
        let mut out = HashMap::new();
        for row in rows.filter_map(|r| r.ok()) {
            let (skill, attempts, successes) = row;
            let success_rate = if attempts > 0 { successes as f64 / attempts as f64 } else { 0.0 };
            out.insert(skill, SkillPerformance { attempts, successes, success_rate });
        }
        Ok(out)
    }

    /// Success rate for one skill; 0.5 (neutral) when it has no history.
    pub fn skill_success_rate(&self, skill: &str) -> f64 {
        match self.skill_performance() {
            Ok(map) => map.get(skill).map(|p| p.success_rate).unwrap_or(0.5),
            Err(err) => {
                warn!("skill performance read failed: {}", err);
                0.5
            }
        }
    }

    // -----------------------------------------------------------------------
    // Stats and consolidation
    // -----------------------------------------------------------------------

    pub fn get_memory_stats(&self) -> StoreResult<MemoryStats> {
        let conn = self.open()?;
        let count = |table: &str| -> Result<u64, rusqlite::Error> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get::<_, i64>(0).map(|v| v as u64)
            })
        };
        Ok(MemoryStats {
            conversations: count("conversations")?,
            knowledge: count("knowledge")?,
            patterns: count("patterns")?,
            skills: count("skills")?,
        })
    }

    /// Opaque optimization pass: drops exact-duplicate pattern rows and
    /// refreshes the query planner statistics. Idempotent with respect to
    /// conversation and knowledge counts.
    pub fn consolidate_memory(&self) -> StoreResult<()> {
        let conn = self.open()?;
        conn.execute(
            "DELETE FROM patterns WHERE id NOT IN (
                SELECT MIN(id) FROM patterns GROUP BY pattern_type, data
            )",
            [],
        )?;
        conn.execute_batch("ANALYZE;")?;
        Ok(())
    }
}

fn row_to_turn(row: &rusqlite::Row<'_>) -> Result<ConversationTurn, rusqlite::Error> {
    let topics: String = row.get(4)?;
    let models: String = row.get(7)?;
    Ok(ConversationTurn {
        id: row.get(0)?,
        timestamp: ms_to_datetime(row.get(1)?),
        user_text: row.get(2)?,
        assistant_text: row.get(3)?,
        topics: serde_json::from_str(&topics).unwrap_or_default(),
        importance: row.get::<_, f64>(5)? as f32,
        success: row.get::<_, i64>(6)? != 0,
        models_used: serde_json::from_str(&models).unwrap_or_default(),
        context_hint: row.get(8)?,
    })
}

fn row_to_knowledge(row: &rusqlite::Row<'_>) -> Result<KnowledgeEntry, rusqlite::Error> {
    Ok(KnowledgeEntry {
        category: row.get(0)?,
        key: row.get(1)?,
        value: row.get(2)?,
        source: row.get(3)?,
        importance: row.get::<_, f64>(4)? as f32,
        confidence: row.get::<_, f64>(5)? as f32,
        created_at: ms_to_datetime(row.get(6)?),
        last_accessed: ms_to_datetime(row.get(7)?),
        access_count: row.get::<_, i64>(8)? as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, PermanentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PermanentStore::open_path(dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn knowledge_roundtrip() {
        let (_dir, store) = store();
        store.store_knowledge("facts", "capital_fr", "Paris", 6.0, 0.9, Some("test")).unwrap();
        let entry = store.recall_knowledge("facts", "capital_fr").unwrap().unwrap();
        assert_eq!(entry.value, "Paris");
        assert_eq!(entry.importance, 6.0);
        // Access counters bump on recall.
        let again = store.recall_knowledge("facts", "capital_fr").unwrap().unwrap();
        assert_eq!(again.access_count, 1);
    }

    #[test]
    fn knowledge_upsert_is_monotonic() {
        let (_dir, store) = store();
        store.store_knowledge("facts", "k", "v1", 7.0, 0.9, None).unwrap();
        store.store_knowledge("facts", "k", "v2", 3.0, 0.2, None).unwrap();
        let entry = store.recall_knowledge("facts", "k").unwrap().unwrap();
        assert_eq!(entry.value, "v2");
        assert_eq!(entry.importance, 7.0);
        assert_eq!(entry.confidence, 0.9);

        store.downgrade_knowledge("facts", "k", 2.0, 0.1).unwrap();
        let entry = store.recall_knowledge("facts", "k").unwrap().unwrap();
        assert_eq!(entry.importance, 2.0);
    }

    #[test]
    fn conversation_timestamps_never_regress() {
        let (_dir, store) = store();
        let mut turn = ConversationTurn::new("a", "b");
        let first = store.store_conversation(&turn).unwrap();
        // A turn constructed with an older clock still lands at or after the
        // watermark.
        turn.id = "TRN-second".into();
        turn.timestamp = first - chrono::Duration::seconds(30);
        let second = store.store_conversation(&turn).unwrap();
        assert!(second >= first);

        let context = store.get_conversation_context(10).unwrap();
        assert_eq!(context.len(), 2);
        assert!(context[0].timestamp >= context[1].timestamp);
    }

    #[test]
    fn knowledge_search_ranks_by_overlap() {
        let (_dir, store) = store();
        store
            .store_knowledge("facts", "rust", "Rust is a systems programming language", 5.0, 0.8, None)
            .unwrap();
        store
            .store_knowledge("facts", "go", "Go is a garbage collected language", 5.0, 0.8, None)
            .unwrap();
        let hits = store.search_knowledge("rust systems programming", 5).unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].key, "rust");
    }

    #[test]
    fn conversation_search_honors_min_importance() {
        let (_dir, store) = store();
        store
            .store_conversation(&ConversationTurn::new("who wrote hamlet", "Shakespeare").with_importance(7.0))
            .unwrap();
        store
            .store_conversation(&ConversationTurn::new("hamlet trivia", "ok").with_importance(2.0))
            .unwrap();
        let hits = store.search_conversations("hamlet", 10, Some(5.0)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].assistant_text, "Shakespeare");
    }

    #[test]
    fn skill_tracking_accumulates() {
        let (_dir, store) = store();
        store.track_skill_use("engineer", true, None).unwrap();
        store.track_skill_use("engineer", true, None).unwrap();
        store.track_skill_use("engineer", false, Some("flaky")).unwrap();
        let perf = store.skill_performance().unwrap();
        let engineer = perf.get("engineer").unwrap();
        assert_eq!(engineer.attempts, 3);
        assert_eq!(engineer.successes, 2);
        assert!((engineer.success_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn scan_findings_roundtrip() {
        let (_dir, store) = store();
        store
            .record_scan_finding("10.0.0.5", "HIGH", "open telnet port", None)
            .unwrap();
        store
            .record_scan_finding("10.0.0.5", "LOW", "banner disclosure", None)
            .unwrap();
        let findings = store.scan_findings("10.0.0.5", 10).unwrap();
        assert_eq!(findings.len(), 2);
        assert!(store.scan_findings("10.0.0.9", 10).unwrap().is_empty());
    }

    #[test]
    fn consolidation_is_idempotent_for_counts() {
        let (_dir, store) = store();
        store.store_conversation(&ConversationTurn::new("a", "b")).unwrap();
        store.store_knowledge("c", "k", "v", 5.0, 0.8, None).unwrap();
        let data = serde_json::json!({"x": 1});
        store.record_pattern("dup", &data, true).unwrap();
        store.record_pattern("dup", &data, true).unwrap();

        store.consolidate_memory().unwrap();
        let first = store.get_memory_stats().unwrap();
        store.consolidate_memory().unwrap();
        let second = store.get_memory_stats().unwrap();
        assert_eq!(first.conversations, second.conversations);
        assert_eq!(first.knowledge, second.knowledge);
        assert_eq!(first.patterns, second.patterns);
    }
}
