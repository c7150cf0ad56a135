//! Configuration Surface
//!
//! One plain struct per tunable subsystem, each with a `Default` impl,
//! mirroring the teacher's `ConsolidationConfig` shape. The library itself
//! never reads environment variables or files: every constructor here takes
//! values the caller already has in hand. Loading `SubstrateConfig` from the
//! `session_config` table is the CLI's job, not this crate's.

use crate::compaction::CompactionConfig;
use crate::distill::DistillConfig;
use crate::store::StoreConfig;

/// Top-level configuration bundle for one substrate instance.
#[derive(Debug, Clone, Default)]
pub struct SubstrateConfig {
    pub store: StoreConfig,
    pub compaction: CompactionConfig,
    pub distill: DistillConfig,
    /// Whether FTS5 virtual tables and triggers are expected to be available.
    /// When `false`, search falls back to the substring scan every subsystem
    /// already carries alongside its FTS path.
    pub fts_enabled: bool,
}

impl SubstrateConfig {
    /// Decode a `SubstrateConfig` from the flat key/value rows of the
    /// `session_config` table. Unknown keys are ignored; missing or
    /// unparsable keys fall back to the corresponding `Default` field,
    /// mirroring the teacher's tolerant `Storage::new` fallback behavior.
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut cfg = Self::default();
        for (key, value) in rows {
            match key {
                "store.busy_timeout_ms" => {
                    if let Ok(v) = value.parse() {
                        cfg.store.busy_timeout_ms = v;
                    }
                }
                "compaction.threshold" => {
                    if let Ok(v) = value.parse() {
                        cfg.compaction.threshold = v;
                    }
                }
                "compaction.target" => {
                    if let Ok(v) = value.parse() {
                        cfg.compaction.target = v;
                    }
                }
                "distill.max_turns" => {
                    if let Ok(v) = value.parse() {
                        cfg.distill.max_turns = v;
                    }
                }
                "distill.recency_buffer" => {
                    if let Ok(v) = value.parse() {
                        cfg.distill.recency_buffer = v;
                    }
                }
                "distill.force" => {
                    if let Ok(v) = value.parse() {
                        cfg.distill.force = v;
                    }
                }
                "fts_enabled" => {
                    if let Ok(v) = value.parse() {
                        cfg.fts_enabled = v;
                    }
                }
                _ => {}
            }
        }
        cfg
    }

    /// Flatten back to the `(key, value)` rows `session_config` persists,
    /// the inverse of [`Self::from_rows`].
    pub fn to_rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("store.busy_timeout_ms", self.store.busy_timeout_ms.to_string()),
            ("compaction.threshold", self.compaction.threshold.to_string()),
            ("compaction.target", self.compaction.target.to_string()),
            ("distill.max_turns", self.distill.max_turns.to_string()),
            ("distill.recency_buffer", self.distill.recency_buffer.to_string()),
            ("distill.force", self.distill.force.to_string()),
            ("fts_enabled", self.fts_enabled.to_string()),
        ]
    }
}
