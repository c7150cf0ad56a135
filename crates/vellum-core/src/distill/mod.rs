//! Distillation Worker
//!
//! Drives an external summarizer to reduce the effective view by writing new
//! summary records over old message ranges.

mod summarizer;
mod types;
mod worker;

pub use summarizer::Summarizer;
pub use types::{CancelToken, CompactionResult, DistillConfig, DistillRun, SummarizerError, SummarizerOp, SummarizerTurn};
pub use worker::{run_compaction_worker, DistillError};
