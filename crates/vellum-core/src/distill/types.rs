use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// A cooperative cancellation flag shared between a caller and a running
/// worker. Checked between turns and between summarizer invocations, never
/// pre-empted mid-call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tunable bounds on one compaction worker run.
#[derive(Debug, Clone)]
pub struct DistillConfig {
    /// Outer-loop iteration cap.
    pub max_turns: usize,
    /// Most-recent messages excluded from `valid_ids`, protecting the live
    /// edge of the conversation from being distilled away mid-turn.
    pub recency_buffer: usize,
    /// Run another pass even if already at or under `CompactionConfig::target`.
    pub force: bool,
}

impl Default for DistillConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            recency_buffer: 20,
            force: false,
        }
    }
}

/// One operation a summarizer turn may request.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "op")]
pub enum SummarizerOp {
    CreateDistillation {
        start_id: String,
        end_id: String,
        operational_context: String,
        #[serde(default)]
        retained_facts: Vec<String>,
    },
    FinishDistillation {
        summary: String,
    },
}

/// One response from the summarizer collaborator.
#[derive(Debug, Clone, Default)]
pub struct SummarizerTurn {
    pub text: Option<String>,
    pub tool_invocations: Vec<SummarizerOp>,
    pub input_tokens: i64,
    pub output_tokens: i64,
}

/// Opaque upstream failure from the summarizer collaborator.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    /// Triggers the one-time fallback to a larger-context summarizer role.
    #[error("prompt exceeded the summarizer's context window")]
    PromptTooLong,
    #[error("summarizer failure: {0}")]
    Opaque(String),
}

/// Tracks one compaction worker run in progress. Mirrors the accumulator
/// shape of a sleep-consolidation run tracker: plain counters bumped by
/// `record_*` methods, consumed by `finish()` into a result struct.
pub struct DistillRun {
    start_time: Instant,
    pub distillations_created: i64,
    pub turns_used: i64,
    pub warnings: Vec<String>,
    pub tokens_before: i64,
    final_summary: Option<String>,
}

impl DistillRun {
    pub fn start(tokens_before: i64) -> Self {
        Self {
            start_time: Instant::now(),
            distillations_created: 0,
            turns_used: 0,
            warnings: Vec::new(),
            tokens_before,
            final_summary: None,
        }
    }

    pub fn record_distillation(&mut self) {
        self.distillations_created += 1;
    }

    pub fn record_turn(&mut self) {
        self.turns_used += 1;
    }

    pub fn record_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn record_finish(&mut self, summary: impl Into<String>) {
        self.final_summary = Some(summary.into());
    }

    pub fn finish(self, tokens_after: i64) -> CompactionResult {
        CompactionResult {
            distillations_created: self.distillations_created,
            turns_used: self.turns_used,
            tokens_before: self.tokens_before,
            tokens_after,
            duration_ms: self.start_time.elapsed().as_millis() as i64,
            warnings: self.warnings,
            summary: self.final_summary,
        }
    }
}

/// Outcome of one compaction worker run, suitable for a background report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionResult {
    pub distillations_created: i64,
    pub turns_used: i64,
    pub tokens_before: i64,
    pub tokens_after: i64,
    pub duration_ms: i64,
    pub warnings: Vec<String>,
    /// The text passed to `finish_distillation`, if the summarizer called it.
    pub summary: Option<String>,
}
