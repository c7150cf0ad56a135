//! Distillation Worker
//!
//! Drives a [`Summarizer`] through the agentic protocol: rebuild the view,
//! offer the summarizer a vocabulary of referenceable ids, and apply whatever
//! `create_distillation`/`finish_distillation` operations it requests. The
//! outer loop shape — bounded iteration, cooperative cancellation checks,
//! a `*Run` accumulator consumed into a result struct — follows
//! `consolidation::sleep::SleepConsolidation`'s `ConsolidationRun`.

use std::collections::HashSet;

use crate::background::BackgroundRegistry;
use crate::compaction::{effective_view_tokens, CompactionConfig};
use crate::id::Id;
use crate::temporal::{MessageKind, MessageRecord, SummaryRecord, TemporalError, TemporalLog};
use crate::view::build_view;

use super::summarizer::Summarizer;
use super::types::{CancelToken, CompactionResult, DistillConfig, DistillRun, SummarizerError, SummarizerOp};

const DISTILLATION_SYSTEM_PROMPT: &str = "\
You are compacting an agent's conversation log. Preserve actionable facts; \
excise noise. Compress older content more aggressively than recent content. \
Be time-aware: note when events happened relative to each other. Eliminating \
a range that is pure noise (acknowledgements, dead ends) is a valid outcome. \
Call create_distillation for each range you summarize, and finish_distillation \
once the view is small enough.";

/// Errors produced by the distillation worker.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum DistillError {
    #[error("temporal log error: {0}")]
    Temporal(#[from] TemporalError),
    #[error("background registry error: {0}")]
    Background(#[from] crate::background::BackgroundError),
    #[error("summarizer error: {0}")]
    Summarizer(#[from] SummarizerError),
    #[error("invalid distillation range: start_id > end_id")]
    InvalidRange,
    #[error("id outside valid_ids: {0}")]
    UnknownId(String),
    #[error("worker was cancelled")]
    Cancelled,
}

type Result<T> = std::result::Result<T, DistillError>;

/// Wraps one compaction run with worker-record lifecycle tracking: `running`
/// on start, `completed` on success, `failed` (with the error message) on
/// exception. Startup recovery of stale `running` rows is the background
/// registry's `recover_killed`, invoked once by the top-level facade.
pub async fn run_compaction_worker(
    temporal: &TemporalLog,
    background: &BackgroundRegistry,
    summarizer: &dyn Summarizer,
    fallback_summarizer: Option<&dyn Summarizer>,
    distill_cfg: &DistillConfig,
    compaction_cfg: &CompactionConfig,
    cancel: &CancelToken,
) -> Result<CompactionResult> {
    let worker = background.create_worker("temporal-compact")?;

    match run_compaction(temporal, summarizer, fallback_summarizer, distill_cfg, compaction_cfg, cancel).await {
        Ok(result) => {
            background.complete_worker(&worker.id)?;
            Ok(result)
        }
        Err(err) => {
            background.fail_worker(&worker.id, err.to_string())?;
            Err(err)
        }
    }
}

async fn run_compaction(
    temporal: &TemporalLog,
    summarizer: &dyn Summarizer,
    fallback_summarizer: Option<&dyn Summarizer>,
    distill_cfg: &DistillConfig,
    compaction_cfg: &CompactionConfig,
    cancel: &CancelToken,
) -> Result<CompactionResult> {
    let tokens_before = current_effective_tokens(temporal, compaction_cfg)?;
    let mut run = DistillRun::start(tokens_before);
    let mut used_fallback = false;
    let tools = ["create_distillation", "finish_distillation"];

    for _ in 0..distill_cfg.max_turns {
        if cancel.is_cancelled() {
            return Err(DistillError::Cancelled);
        }

        let messages = temporal.get_messages(None, None)?;
        let summaries = temporal.get_summaries(None)?;
        let view = build_view(&messages, &summaries, compaction_cfg.threshold);

        if effective_view_tokens(&view) <= compaction_cfg.target && !distill_cfg.force {
            break;
        }

        let valid_ids = compute_valid_ids(&messages, &summaries, distill_cfg.recency_buffer);

        if cancel.is_cancelled() {
            return Err(DistillError::Cancelled);
        }

        let turn = match summarizer
            .generate_distillation_turn(DISTILLATION_SYSTEM_PROMPT, &view.turns, &tools)
            .await
        {
            Ok(turn) => turn,
            Err(SummarizerError::PromptTooLong) if !used_fallback && fallback_summarizer.is_some() => {
                used_fallback = true;
                run.record_warning("prompt too long; falling back to large-context summarizer role");
                fallback_summarizer
                    .expect("checked is_some above")
                    .generate_distillation_turn(DISTILLATION_SYSTEM_PROMPT, &view.turns, &tools)
                    .await?
            }
            Err(err) => return Err(DistillError::from(err)),
        };

        run.record_turn();

        if turn.tool_invocations.is_empty() {
            run.record_warning("summarizer issued no operations; ending run");
            break;
        }

        let mut finished = false;
        for op in turn.tool_invocations {
            match op {
                SummarizerOp::FinishDistillation { summary } => {
                    run.record_finish(summary);
                    finished = true;
                }
                SummarizerOp::CreateDistillation {
                    start_id,
                    end_id,
                    operational_context,
                    retained_facts,
                } => {
                    match create_distillation(
                        temporal,
                        &messages,
                        &summaries,
                        &valid_ids,
                        &start_id,
                        &end_id,
                        operational_context,
                        retained_facts,
                        cancel,
                    ) {
                        Ok(()) => run.record_distillation(),
                        Err(DistillError::Cancelled) => return Err(DistillError::Cancelled),
                        Err(err) => {
                            tracing::warn!("create_distillation rejected: {err}");
                            run.record_warning(format!("create_distillation rejected: {err}"));
                        }
                    }
                }
            }
        }

        if finished {
            break;
        }
    }

    let tokens_after = current_effective_tokens(temporal, compaction_cfg)?;
    Ok(run.finish(tokens_after))
}

fn current_effective_tokens(temporal: &TemporalLog, compaction_cfg: &CompactionConfig) -> Result<i64> {
    let messages = temporal.get_messages(None, None)?;
    let summaries = temporal.get_summaries(None)?;
    Ok(effective_view_tokens(&build_view(&messages, &summaries, compaction_cfg.threshold)))
}

/// All message ids outside the protected `recency_buffer`-sized tail, plus
/// the `start_id`/`end_id` of every summary that ends before that window
/// begins (a `recency_buffer` of 0 protects nothing — everything is valid).
fn compute_valid_ids(messages: &[MessageRecord], summaries: &[SummaryRecord], recency_buffer: usize) -> HashSet<Id> {
    let mut valid = HashSet::new();

    let protected_from = messages.len().saturating_sub(recency_buffer);
    for m in &messages[..protected_from] {
        valid.insert(m.id.clone());
    }

    let cutoff: Option<&Id> = messages.get(protected_from).map(|m| &m.id);
    for s in summaries {
        let before_window = match cutoff {
            Some(cutoff) => &s.end_id < cutoff,
            None => true,
        };
        if before_window {
            valid.insert(s.start_id.clone());
            valid.insert(s.end_id.clone());
        }
    }
    valid
}

/// Extend `start` backward to a preceding `tool_call` if it lands on an
/// orphaned `tool_result`, and `end` forward to a following `tool_result` if
/// it lands on a dangling `tool_call` — so a distillation never splits a
/// call/result pair across the summarized/unsummarized boundary.
fn adjust_boundaries(messages: &[MessageRecord], start: &Id, end: &Id) -> (Id, Id) {
    let mut lo = start.clone();
    let mut hi = end.clone();

    if messages.iter().any(|m| m.id == lo && m.kind == MessageKind::ToolResult) {
        if let Some(prev) = messages.iter().rev().find(|m| m.id < lo && m.kind == MessageKind::ToolCall) {
            lo = prev.id.clone();
        }
    }
    if messages.iter().any(|m| m.id == hi && m.kind == MessageKind::ToolCall) {
        if let Some(next) = messages.iter().find(|m| m.id > hi && m.kind == MessageKind::ToolResult) {
            hi = next.id.clone();
        }
    }

    (lo, hi)
}

/// `1 + max(order_num)` over summaries fully inside `[start, end]`, or `1`.
fn compute_order_num(summaries: &[SummaryRecord], start: &Id, end: &Id) -> i64 {
    summaries
        .iter()
        .filter(|s| &s.start_id >= start && &s.end_id <= end)
        .map(|s| s.order_num)
        .max()
        .map_or(1, |m| m + 1)
}

fn estimate_tokens(text: &str) -> i64 {
    (text.chars().count() as i64 / 4).max(1)
}

#[allow(clippy::too_many_arguments)]
fn create_distillation(
    temporal: &TemporalLog,
    messages: &[MessageRecord],
    summaries: &[SummaryRecord],
    valid_ids: &HashSet<Id>,
    start_id: &str,
    end_id: &str,
    operational_context: String,
    retained_facts: Vec<String>,
    cancel: &CancelToken,
) -> Result<()> {
    let start = Id::parse(start_id.to_string()).map_err(|_| DistillError::UnknownId(start_id.to_string()))?;
    let end = Id::parse(end_id.to_string()).map_err(|_| DistillError::UnknownId(end_id.to_string()))?;

    if start > end {
        return Err(DistillError::InvalidRange);
    }
    if !valid_ids.contains(&start) || !valid_ids.contains(&end) {
        return Err(DistillError::UnknownId(format!("{start_id}..{end_id}")));
    }

    let (start, end) = adjust_boundaries(messages, &start, &end);
    let order_num = compute_order_num(summaries, &start, &end);
    let token_estimate = estimate_tokens(&operational_context) + retained_facts.iter().map(|f| estimate_tokens(f)).sum::<i64>();

    let record = SummaryRecord {
        id: temporal.generate_summary_id()?,
        order_num,
        start_id: start,
        end_id: end,
        narrative: operational_context,
        key_observations: retained_facts,
        tags: Vec::new(),
        token_estimate,
        created_at: chrono::Utc::now(),
    };

    if cancel.is_cancelled() {
        return Err(DistillError::Cancelled);
    }
    temporal.create_summary(&record)?;
    Ok(())
}
