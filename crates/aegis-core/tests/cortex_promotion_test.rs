//! Integration test: CORTEX promotion paths and the promoted-item sync into
//! permanent knowledge.

use aegis_core::memory::integration::CATEGORY_CORTEX_PROMOTED;
use aegis_core::{Cortex, MemoryLayer, UnifiedMemory};
use chrono::{Duration, Utc};

#[test]
fn access_count_promotes_mediocre_item() {
    let dir = tempfile::tempdir().unwrap();
    let cortex = Cortex::open_path(dir.path().join("t.db")).unwrap();

    // Importance 4 is below both promotion thresholds; access carries it.
    let item = cortex.capture("the wifi password is on the fridge", Some(4.0), None, None);
    for _ in 0..3 {
        cortex.touch(&item.id);
    }

    let base = Utc::now();
    cortex.tick_at(base + Duration::seconds(31));
    assert_eq!(cortex.get_item(&item.id).unwrap().layer, MemoryLayer::Working);

    // access_count > 2 promotes out of WORKING into persistent SHORT_TERM.
    cortex.tick_at(base + Duration::seconds(40));
    let promoted = cortex.get_item(&item.id).unwrap();
    assert_eq!(promoted.layer, MemoryLayer::ShortTerm);
    assert!(cortex.get_stats().short_term_count >= 1);
}

#[test]
fn unaccessed_low_importance_item_decays_out_of_working() {
    let dir = tempfile::tempdir().unwrap();
    let cortex = Cortex::open_path(dir.path().join("t.db")).unwrap();

    let item = cortex.capture("minor passing note of little weight", Some(3.5), None, None);
    let base = Utc::now();
    cortex.tick_at(base + Duration::seconds(31));
    assert_eq!(cortex.get_item(&item.id).unwrap().layer, MemoryLayer::Working);

    // 31 minutes later the item is past working's max age and is forgotten.
    let stats = cortex.tick_at(base + Duration::minutes(32));
    assert!(stats.forgotten >= 1);
    assert!(cortex.get_item(&item.id).is_none());
}

#[test]
fn long_term_promotion_syncs_into_knowledge() {
    let dir = tempfile::tempdir().unwrap();
    let memory = UnifiedMemory::open_path(dir.path().join("t.db")).unwrap();
    let cortex = memory.cortex();

    let item = cortex.capture("critical deadline: remember the audit is due Friday", Some(9.0), None, None);
    let base = Utc::now();
    cortex.tick_at(base + Duration::seconds(31));
    cortex.tick_at(base + Duration::seconds(40));
    // Hourly consolidation lifts it to LONG_TERM.
    cortex.tick_at(base + Duration::hours(2));
    assert_eq!(cortex.get_item(&item.id).unwrap().layer, MemoryLayer::LongTerm);

    // Sync copies the promoted item into permanent knowledge.
    memory.sync();
    let promoted = memory.store().recall_knowledge(CATEGORY_CORTEX_PROMOTED, &item.id).unwrap();
    assert!(promoted.is_some());
    assert!(promoted.unwrap().value.contains("audit"));
}
