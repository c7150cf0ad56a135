//! Scenario/property test harness
//!
//! A thin wrapper around [`Substrate`] backed by a [`tempfile::NamedTempFile`]
//! on-disk database, plus a deterministic summarizer stub, shared by the
//! scenario and invariant test binaries in this package.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use vellum_core::{
    Store, StoreConfig, Substrate, Summarizer, SummarizerError, SummarizerOp, SummarizerTurn, Turn,
};

/// An on-disk substrate living in a temp directory, torn down on drop.
pub struct Harness {
    pub substrate: Substrate,
    _dir: TempDir,
    db_path: PathBuf,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let db_path = dir.path().join("vellum.db");
        let substrate = Substrate::open(&db_path, StoreConfig::default()).expect("open substrate");
        Self {
            substrate,
            _dir: dir,
            db_path,
        }
    }

    /// An in-memory substrate sharing one store, for tests that don't care
    /// about on-disk persistence.
    pub fn memory() -> Substrate {
        let store = Arc::new(Store::open_memory().expect("open memory store"));
        Substrate::from_store(store).expect("wrap store")
    }

    pub fn db_path(&self) -> &std::path::Path {
        &self.db_path
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// A summarizer that always finishes immediately without creating any
/// distillations, for tests that only need the worker's "nothing to do"
/// path.
pub struct NoOpSummarizer;

#[async_trait]
impl Summarizer for NoOpSummarizer {
    async fn generate_distillation_turn(
        &self,
        _system_prompt: &str,
        _history_turns: &[Turn],
        _tools: &[&str],
    ) -> Result<SummarizerTurn, SummarizerError> {
        Ok(SummarizerTurn {
            text: None,
            tool_invocations: vec![SummarizerOp::FinishDistillation {
                summary: "nothing to distill".to_string(),
            }],
            input_tokens: 0,
            output_tokens: 0,
        })
    }
}

/// A scripted summarizer returning one fixed batch of operations on its
/// first call, then finishing on every call after.
pub struct ScriptedSummarizer {
    ops: std::sync::Mutex<Option<Vec<SummarizerOp>>>,
}

impl ScriptedSummarizer {
    pub fn new(ops: Vec<SummarizerOp>) -> Self {
        Self {
            ops: std::sync::Mutex::new(Some(ops)),
        }
    }
}

#[async_trait]
impl Summarizer for ScriptedSummarizer {
    async fn generate_distillation_turn(
        &self,
        _system_prompt: &str,
        _history_turns: &[Turn],
        _tools: &[&str],
    ) -> Result<SummarizerTurn, SummarizerError> {
        let batch = self.ops.lock().unwrap().take();
        let tool_invocations = batch.unwrap_or_else(|| {
            vec![SummarizerOp::FinishDistillation {
                summary: "done".to_string(),
            }]
        });
        Ok(SummarizerTurn {
            text: None,
            tool_invocations,
            input_tokens: 0,
            output_tokens: 0,
        })
    }
}
