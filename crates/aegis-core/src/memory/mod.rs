//! Tiered memory: permanent SQLite store, the 5-layer decaying CORTEX, the
//! generative compression engine, and the unified façade over all three.

pub mod compression;
pub mod cortex;
pub mod integration;
pub mod store;

pub use compression::{Thunk, ThunkCompressor, ThunkEngine, ThunkKind, ThunkStats};
pub use cortex::{Cortex, CortexStats, ImportanceEvaluator, MemoryItem, MemoryLayer, TickStats};
pub use integration::{RecallHit, UnifiedMemory};
pub use store::{MemoryStats, PermanentStore, SkillPerformance, StoreError, StoreResult};
