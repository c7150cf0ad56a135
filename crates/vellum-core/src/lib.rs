//! # Vellum Core
//!
//! A persistence substrate for long-running conversational agents:
//!
//! - **Temporal Log**: an append-only message log plus an immutable lattice
//!   of summaries built over it, with FTS5 search alongside exact-match
//!   context windows.
//! - **Coverage Algebra**: pure functions over the summary lattice that
//!   decide what a view needs to replay without double-counting anything a
//!   summary already distilled.
//! - **Compaction**: token accounting over the effective view, deciding when
//!   and how much of the log needs to be distilled.
//! - **Distillation Worker**: drives an external summarizer through an
//!   agentic create/finish protocol that writes new summary records over old
//!   message ranges.
//! - **Long-Term Memory**: a hierarchical, versioned tree of knowledge
//!   entries, mutated only by compare-and-swap and addressed by slug.
//! - **Background Registry**: worker lifecycle, an unsurfaced-report queue,
//!   background tasks, a task-result queue, and scheduled alarms.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vellum_core::{Store, StoreConfig, TemporalLog};
//!
//! let store = std::sync::Arc::new(Store::open_memory()?);
//! let temporal = TemporalLog::new(store.clone());
//! ```
//!
//! Everything here is a library, not a server: no subsystem reads
//! environment variables or files on its own. Callers hand in configuration
//! and own the process that drives the worker loops.

// ============================================================================
// MODULES
// ============================================================================

pub mod background;
pub mod compaction;
pub mod config;
pub mod coverage;
pub mod distill;
pub mod error;
pub mod id;
pub mod ltm;
pub mod store;
pub mod temporal;
pub mod view;

use std::sync::Arc;

use background::BackgroundRegistry;
use ltm::LtmStore;
use store::{Store, StoreConfig};
use temporal::TemporalLog;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use config::SubstrateConfig;
pub use error::{Error, Result};

pub use id::{Id, IdError, IdGen, Prefix, Variant};

pub use store::{Store, StoreConfig, StoreError};

pub use temporal::{
    sanitize_fts5_query, ContextWindow, FtsHit, MessageKind, MessageRecord, SearchHit,
    SearchParams, SummaryRecord, TagMode, TemporalLog, TemporalError,
};

pub use coverage::{covers, effective_summaries, gaps, subsumed, uncovered_messages, Gap};

pub use view::{build_view, Turn, TurnPart, TurnRole, View};

pub use compaction::{
    calculate_compaction_target, effective_view_tokens, get_compaction_state,
    get_messages_to_compact, should_create_higher_order_summary, should_trigger_compaction,
    CompactionConfig, CompactionState, FIXED_OVERHEAD_TOKENS,
};

pub use ltm::{AgentRole, LtmEntry, LtmError, LtmFtsHit, LtmSearchHit, LtmStore};

pub use background::{
    Alarm, BackgroundError, BackgroundRegistry, BackgroundReport, BackgroundTask,
    TaskResultQueueEntry, WorkerRecord, WorkerStatus,
};

pub use distill::{
    run_compaction_worker, CancelToken, CompactionResult, DistillConfig, DistillError, DistillRun,
    Summarizer, SummarizerError, SummarizerOp, SummarizerTurn,
};

/// A handle bundling every subsystem over one [`Store`], wired together the
/// way a caller actually needs them: opening a substrate also replays
/// crash recovery for both the worker registry and the background task
/// queue, so no caller can forget to call `recover_killed` themselves.
pub struct Substrate {
    pub store: Arc<Store>,
    pub temporal: TemporalLog,
    pub ltm: LtmStore,
    pub background: BackgroundRegistry,
}

impl Substrate {
    /// Open (or create) a substrate at `path`, or an in-memory one for
    /// `:memory:`, and recover any worker/task left `running` by a process
    /// that died without marking it `completed` or `failed`.
    pub fn open(path: impl AsRef<std::path::Path>, cfg: StoreConfig) -> Result<Self> {
        let store = Arc::new(Store::open(path, cfg)?);
        Self::from_store(store)
    }

    /// Wrap an already-open [`Store`], running the same crash recovery
    /// [`Self::open`] does. Lets a caller share one `Store` across multiple
    /// substrates or tests without reopening the database.
    pub fn from_store(store: Arc<Store>) -> Result<Self> {
        let temporal = TemporalLog::new(store.clone());
        let ltm = LtmStore::new(store.clone());
        let background = BackgroundRegistry::new(store.clone());

        background.recover_killed()?;
        background.recover_killed_tasks()?;

        Ok(Self {
            store,
            temporal,
            ltm,
            background,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_memory_substrate_recovers_nothing_on_first_open() {
        let substrate = Substrate::open(":memory:", StoreConfig::default()).unwrap();
        assert!(substrate.background.recover_killed().unwrap().is_empty());
    }

    #[test]
    fn from_store_shares_one_store_across_subsystems() {
        let store = Arc::new(Store::open_memory().unwrap());
        let substrate = Substrate::from_store(store.clone()).unwrap();
        assert!(Arc::ptr_eq(&substrate.store, &store));
    }
}
