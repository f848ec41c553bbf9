//! Unified memory: one façade over the permanent store, CORTEX, and the
//! compression engine.
//!
//! Flow: input enters CORTEX flash; promoted items sync into permanent
//! knowledge under `cortex_promoted`; topic clusters compress into thunks
//! stored under `ultrathunk`. Recall merges all three sources.

use crate::memory::compression::{ClusterItem, ThunkEngine, ThunkKind};
use crate::memory::cortex::{Cortex, MemoryLayer};
use crate::memory::store::{PermanentStore, StoreResult};
use crate::shared::ConversationTurn;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Knowledge category for CORTEX items promoted into the permanent store.
pub const CATEGORY_CORTEX_PROMOTED: &str = "cortex_promoted";
/// Knowledge category for compressed thunk records.
pub const CATEGORY_THUNKS: &str = "ultrathunk";

const SYNC_INTERVAL_MINUTES: i64 = 5;

/// One merged recall result with its source system tag.
#[derive(Debug, Clone, Serialize)]
pub struct RecallHit {
    /// `cortex`, `brain`, or `ultrathunk`.
    pub source: &'static str,
    pub layer: String,
    pub content: String,
    pub importance: f32,
    pub confidence: f32,
    /// `recent`, `permanent`, or `generated`.
    pub recency: &'static str,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SyncStats {
    pub knowledge_synced: usize,
    pub patterns_compressed: usize,
    pub thunks_created: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IntegrationStats {
    pub syncs: u64,
    pub knowledge_synced: u64,
    pub patterns_compressed: u64,
    pub thunks_created: u64,
}

/// Result of one capture.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureResult {
    pub cortex_id: String,
    pub pattern_detected: bool,
}

pub struct UnifiedMemory {
    store: Arc<PermanentStore>,
    cortex: Arc<Cortex>,
    thunks: Arc<ThunkEngine>,
    last_sync: Mutex<DateTime<Utc>>,
    stats: Mutex<IntegrationStats>,
}

impl UnifiedMemory {
    /// Opens all three systems over one SQLite file.
    pub fn open_path<P: AsRef<Path>>(db_path: P) -> StoreResult<Self> {
        let path = db_path.as_ref();
        Ok(Self {
            store: Arc::new(PermanentStore::open_path(path)?),
            cortex: Arc::new(Cortex::open_path(path)?),
            thunks: Arc::new(ThunkEngine::open_path(path)?),
            last_sync: Mutex::new(Utc::now()),
            stats: Mutex::new(IntegrationStats::default()),
        })
    }

    pub fn store(&self) -> Arc<PermanentStore> {
        Arc::clone(&self.store)
    }

    pub fn cortex(&self) -> Arc<Cortex> {
        Arc::clone(&self.cortex)
    }

    pub fn thunks(&self) -> Arc<ThunkEngine> {
        Arc::clone(&self.thunks)
    }

    /// Captures new information everywhere it belongs: CORTEX flash always;
    /// the conversation log when a response is supplied; a compression pass
    /// over the topic; a full sync when the interval elapsed.
    pub fn capture(
        &self,
        content: &str,
        importance: Option<f32>,
        topic: Option<&str>,
        response: Option<&str>,
    ) -> CaptureResult {
        let item = self.cortex.capture(content, importance, topic, None);

        let tick = self.cortex.tick();
        if tick.promoted > 0 {
            self.sync_promoted_to_store();
        }

        if let Some(response) = response {
            let turn = ConversationTurn::new(content, response)
                .with_topics(topic.map(|t| vec![t.to_string()]).unwrap_or_default())
                .with_importance(item.importance);
            if let Err(err) = self.store.store_conversation(&turn) {
                warn!("conversation store failed: {}", err);
            }
        }

        let pattern_detected = !self.detect_and_compress(topic).is_empty();

        let due = self
            .last_sync
            .lock()
            .map(|last| Utc::now() - *last > Duration::minutes(SYNC_INTERVAL_MINUTES))
            .unwrap_or(false);
        if due {
            self.sync();
        }

        CaptureResult { cortex_id: item.id, pattern_detected }
    }

    /// Merged, deduplicated recall across CORTEX, the permanent store, and
    /// thunk firing.
    pub fn recall(&self, query: &str, limit: usize, use_cortex_first: bool) -> Vec<RecallHit> {
        let mut results: Vec<RecallHit> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        if use_cortex_first {
            for item in self.cortex.recall(query, limit, 0.0) {
                if seen.insert(item.content.clone()) {
                    results.push(RecallHit {
                        source: "cortex",
                        layer: item.layer.as_str().to_string(),
                        content: item.content,
                        importance: item.importance,
                        confidence: item.confidence,
                        recency: "recent",
                    });
                }
            }
        }

        if results.len() < limit {
            match self.store.search_knowledge(query, limit - results.len()) {
                Ok(entries) => {
                    for entry in entries {
                        if seen.insert(entry.value.clone()) {
                            results.push(RecallHit {
                                source: "brain",
                                layer: "knowledge".to_string(),
                                content: entry.value,
                                importance: entry.importance,
                                confidence: entry.confidence,
                                recency: "permanent",
                            });
                        }
                    }
                }
                Err(err) => warn!("knowledge recall failed: {}", err),
            }
        }

        if results.len() < limit {
            for thunk in self.thunks.find_matching(query, 0.3) {
                if results.len() >= limit {
                    break;
                }
                let generated = thunk.generate(&HashMap::new());
                if seen.insert(generated.clone()) {
                    results.push(RecallHit {
                        source: "ultrathunk",
                        layer: "compressed".to_string(),
                        content: generated,
                        importance: 8.0,
                        confidence: thunk.confidence,
                        recency: "generated",
                    });
                }
            }
        }

        results.truncate(limit);
        results
    }

    /// Synchronizes all systems: promoted CORTEX items into knowledge, then
    /// a compression pass whose thunks land under `ultrathunk`.
    pub fn sync(&self) -> SyncStats {
        let mut sync_stats = SyncStats {
            knowledge_synced: self.sync_promoted_to_store(),
            ..SyncStats::default()
        };

        let compressed = self.detect_and_compress(None);
        sync_stats.patterns_compressed = compressed.len();
        sync_stats.thunks_created = compressed.len();

        if let Ok(mut last) = self.last_sync.lock() {
            *last = Utc::now();
        }
        if let Ok(mut stats) = self.stats.lock() {
            stats.syncs += 1;
            stats.knowledge_synced += sync_stats.knowledge_synced as u64;
            stats.patterns_compressed += sync_stats.patterns_compressed as u64;
            stats.thunks_created += sync_stats.thunks_created as u64;
        }
        sync_stats
    }

    fn sync_promoted_to_store(&self) -> usize {
        let mut synced = 0;
        for item in self.cortex.recall("", 100, 7.0) {
            if matches!(item.layer, MemoryLayer::LongTerm | MemoryLayer::Archive) {
                let result = self.store.store_knowledge(
                    CATEGORY_CORTEX_PROMOTED,
                    &item.id,
                    &item.content,
                    item.importance,
                    item.confidence,
                    Some("cortex_sync"),
                );
                match result {
                    Ok(()) => synced += 1,
                    Err(err) => warn!("promoted-item sync failed: {}", err),
                }
            }
        }
        synced
    }

    /// Groups recent CORTEX items by topic and compresses every group of
    /// three or more. Resulting thunks are recorded as knowledge entries.
    fn detect_and_compress(&self, topic: Option<&str>) -> Vec<String> {
        let recent = self.cortex.recall("", 50, 0.0);
        let mut groups: HashMap<String, Vec<ClusterItem>> = HashMap::new();
        for item in recent {
            let item_topic = item.topic.clone().unwrap_or_else(|| "general".to_string());
            if let Some(filter) = topic {
                if item_topic != filter {
                    continue;
                }
            }
            groups.entry(item_topic).or_default().push(
                ClusterItem::new(item.content.clone()).with_timestamp(item.created_at),
            );
        }

        let mut created = Vec::new();
        for (group_topic, items) in groups {
            if items.len() < 3 {
                continue;
            }
            if let Some(thunk) = self.thunks.compress_and_store(&items, ThunkKind::Pattern) {
                debug!(
                    "compressed {} '{}' items into {} ({:.1}:1)",
                    items.len(),
                    group_topic,
                    thunk.id,
                    thunk.compression_ratio()
                );
                let record = serde_json::json!({
                    "name": thunk.name,
                    "type": thunk.kind.as_str(),
                    "trigger": thunk.trigger_pattern,
                    "template": thunk.template,
                    "compression_ratio": thunk.compression_ratio(),
                    "topic": group_topic,
                });
                let stored = self.store.store_knowledge(
                    CATEGORY_THUNKS,
                    &thunk.id,
                    &record.to_string(),
                    8.0,
                    thunk.confidence,
                    Some("thunk_compression"),
                );
                if let Err(err) = stored {
                    warn!("thunk knowledge record failed: {}", err);
                }
                created.push(thunk.id);
            }
        }
        created
    }

    /// Full consolidation across every system, with a report.
    pub fn consolidate(&self) -> serde_json::Value {
        let now = Utc::now();
        let cortex_before = self.cortex.get_stats();
        let consolidation = self.cortex.consolidate_at(now);
        let cortex_after = self.cortex.get_stats();

        let thunks_before = self.thunks.get_stats();
        self.detect_and_compress(None);
        let thunks_after = self.thunks.get_stats();

        if let Err(err) = self.store.consolidate_memory() {
            warn!("store consolidation failed: {}", err);
        }
        let store_stats = self.store.get_memory_stats().ok();
        let sync = self.sync();

        serde_json::json!({
            "timestamp": now.to_rfc3339(),
            "cortex": {
                "before": cortex_before.total_memories,
                "after": cortex_after.total_memories,
                "promoted": consolidation.promoted,
                "archived": consolidation.archived,
            },
            "thunks": {
                "before": thunks_before.total_thunks,
                "after": thunks_after.total_thunks,
                "compression_ratio": thunks_after.compression_ratio,
            },
            "store": store_stats,
            "sync": sync,
        })
    }

    pub fn integration_stats(&self) -> IntegrationStats {
        self.stats.lock().map(|s| *s).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> (tempfile::TempDir, UnifiedMemory) {
        let dir = tempfile::tempdir().unwrap();
        let memory = UnifiedMemory::open_path(dir.path().join("test.db")).unwrap();
        (dir, memory)
    }

    #[test]
    fn capture_stores_conversation_when_response_present() {
        let (_dir, memory) = memory();
        memory.capture("who wrote hamlet", Some(6.0), Some("literature"), Some("Shakespeare"));
        memory.capture("just thinking aloud", Some(4.0), None, None);
        let stats = memory.store().get_memory_stats().unwrap();
        assert_eq!(stats.conversations, 1);
    }

    #[test]
    fn recall_merges_and_dedupes_sources() {
        let (_dir, memory) = memory();
        memory.store().store_knowledge("facts", "k", "the moon orbits the earth", 6.0, 0.9, None).unwrap();
        memory.capture("the moon orbits the earth", Some(6.0), Some("space"), None);

        let hits = memory.recall("moon orbits", 10, true);
        // Identical content from CORTEX and the store collapses to one hit.
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "cortex");
    }

    #[test]
    fn recall_brain_only_when_cortex_disabled() {
        let (_dir, memory) = memory();
        memory.store().store_knowledge("facts", "k", "tokio is an async runtime", 6.0, 0.9, None).unwrap();
        let hits = memory.recall("tokio runtime", 10, false);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "brain");
        assert_eq!(hits[0].recency, "permanent");
    }

    #[test]
    fn topic_cluster_compresses_into_thunk_record() {
        let (_dir, memory) = memory();
        for i in 0..4 {
            memory.capture(
                &format!("user prefers dark roast coffee in the morning {}", i),
                Some(6.0),
                Some("coffee"),
                None,
            );
        }
        let sync = memory.sync();
        assert!(sync.thunks_created >= 1);
        let thunk_records = memory.store().recall_category(CATEGORY_THUNKS).unwrap();
        assert!(!thunk_records.is_empty());
    }

    #[test]
    fn consolidate_reports_every_system() {
        let (_dir, memory) = memory();
        memory.capture("a fact", Some(5.0), None, Some("ok"));
        let report = memory.consolidate();
        assert!(report.get("cortex").is_some());
        assert!(report.get("thunks").is_some());
        assert!(report.get("sync").is_some());
    }
}
