//! Compaction Control
//!
//! Decides when and how much to compact. Mirrors the teacher's
//! `ConsolidationConfig` shape: one plain struct, a `Default` impl carrying
//! the tunable constants, and free functions operating on borrowed state
//! rather than a stateful driver.

use crate::background::WorkerRecord;
use crate::id::Id;
use crate::temporal::{MessageRecord, SummaryRecord};
use crate::view::{build_view, View};

/// Conservative allowance for system prompt, tool schemas, and formatting
/// overhead not represented in the temporal log itself.
pub const FIXED_OVERHEAD_TOKENS: i64 = 40_000;

/// Tunable compaction thresholds and compression targets.
#[derive(Debug, Clone)]
pub struct CompactionConfig {
    /// Trigger compaction once `effective_view_tokens` exceeds this.
    pub threshold: i64,
    /// Target `effective_view_tokens` to compact down to.
    pub target: i64,
    pub messages_per_order1_min: usize,
    pub messages_per_order1_max: usize,
    pub order1_output_tokens_min: i64,
    pub order1_output_tokens_max: i64,
    pub summaries_per_higher_order_min: usize,
    pub summaries_per_higher_order_max: usize,
    pub order2_output_tokens_min: i64,
    pub order2_output_tokens_max: i64,
    pub higher_order_output_tokens_min: i64,
    pub higher_order_output_tokens_max: i64,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            threshold: 120_000,
            target: 60_000,
            messages_per_order1_min: 15,
            messages_per_order1_max: 25,
            order1_output_tokens_min: 500,
            order1_output_tokens_max: 800,
            summaries_per_higher_order_min: 4,
            summaries_per_higher_order_max: 5,
            order2_output_tokens_min: 300,
            order2_output_tokens_max: 500,
            higher_order_output_tokens_min: 150,
            higher_order_output_tokens_max: 250,
        }
    }
}

/// The view's token total plus the fixed overhead allowance — what higher
/// layers compare against a context-window budget.
pub fn effective_view_tokens(view: &View) -> i64 {
    view.total_tokens + FIXED_OVERHEAD_TOKENS
}

/// True iff no `temporal-compact` worker is currently running and the
/// effective view exceeds the configured threshold.
pub fn should_trigger_compaction(
    messages: &[MessageRecord],
    summaries: &[SummaryRecord],
    workers: &[WorkerRecord],
    cfg: &CompactionConfig,
) -> bool {
    let state = get_compaction_state(workers);
    if state.running {
        return false;
    }
    let view = build_view(messages, summaries, cfg.threshold);
    effective_view_tokens(&view) > cfg.threshold
}

/// Whether a `temporal-compact` worker is currently running, and its id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompactionState {
    pub running: bool,
    pub worker_id: Option<Id>,
}

pub fn get_compaction_state(workers: &[WorkerRecord]) -> CompactionState {
    workers
        .iter()
        .find(|w| w.kind == "temporal-compact" && w.status == crate::background::WorkerStatus::Running)
        .map(|w| CompactionState {
            running: true,
            worker_id: Some(w.id.clone()),
        })
        .unwrap_or_default()
}

/// `max(0, effective_view_tokens - cfg.target)`.
pub fn calculate_compaction_target(
    messages: &[MessageRecord],
    summaries: &[SummaryRecord],
    cfg: &CompactionConfig,
) -> i64 {
    let view = build_view(messages, summaries, cfg.threshold);
    (effective_view_tokens(&view) - cfg.target).max(0)
}

/// All messages strictly after the last summary's `end_id`, or every message
/// when there are no summaries.
pub fn get_messages_to_compact<'a>(
    messages: &'a [MessageRecord],
    summaries: &[SummaryRecord],
) -> Vec<&'a MessageRecord> {
    let last_end = summaries.iter().map(|s| &s.end_id).max();
    match last_end {
        Some(end_id) => messages.iter().filter(|m| &m.id > end_id).collect(),
        None => messages.iter().collect(),
    }
}

/// True once enough order-N summaries have accumulated to roll them up into
/// an order-(N+1) summary.
pub fn should_create_higher_order_summary(summaries_at_order: usize, cfg: &CompactionConfig) -> bool {
    summaries_at_order >= cfg.summaries_per_higher_order_min
}
