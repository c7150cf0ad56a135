//! A deterministic stand-in for an LLM-backed summarizer, for demo and
//! smoke-testing the compaction worker without a live model. Reads the
//! `[id:...]` tags the view builder renders into message/summary turns
//! (see `vellum_core::view`) rather than any structured id list, the same
//! way a real model would have to.

use async_trait::async_trait;

use vellum_core::{Summarizer, SummarizerError, SummarizerOp, SummarizerTurn, Turn, TurnPart};

#[derive(Default)]
pub struct StubSummarizer;

#[async_trait]
impl Summarizer for StubSummarizer {
    async fn generate_distillation_turn(
        &self,
        _system_prompt: &str,
        history_turns: &[Turn],
        _tools: &[&str],
    ) -> Result<SummarizerTurn, SummarizerError> {
        let ids = visible_ids(history_turns);

        // Leave the last couple of visible ids alone (mirrors the worker's
        // own recency protection) and fold everything older into one range.
        let tool_invocations = if ids.len() > 2 {
            vec![SummarizerOp::CreateDistillation {
                start_id: ids[0].clone(),
                end_id: ids[ids.len() - 3].clone(),
                operational_context: format!("Folded {} earlier turns into one summary.", ids.len() - 2),
                retained_facts: Vec::new(),
            }]
        } else {
            vec![SummarizerOp::FinishDistillation {
                summary: "Nothing left worth compacting.".to_string(),
            }]
        };

        Ok(SummarizerTurn {
            text: None,
            tool_invocations,
            input_tokens: 0,
            output_tokens: 0,
        })
    }
}

/// Every id visible in the rendered view, in the order they appear: tool
/// parts carry their id directly, text parts carry it in an `[id:...]` tag.
fn visible_ids(turns: &[Turn]) -> Vec<String> {
    let mut ids = Vec::new();
    for turn in turns {
        for part in &turn.parts {
            match part {
                TurnPart::ToolInvocation { id, .. } | TurnPart::ToolOutcome { id, .. } => {
                    ids.push(id.to_string());
                }
                TurnPart::Text { body } => ids.extend(extract_id_tags(body)),
            }
        }
    }
    ids
}

fn take_id_token(s: &str) -> (&str, &str) {
    let end = s
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(s.len());
    (&s[..end], &s[end..])
}

/// Matches both `id:<id>` and the range form `id:<id>…<id>` the view
/// builder emits for a run of collapsed tool calls.
fn extract_id_tags(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find("id:") {
        let after = &rest[pos + 3..];
        let (first, after) = take_id_token(after);
        if !first.is_empty() {
            out.push(first.to_string());
        }
        rest = if let Some(after) = after.strip_prefix('…') {
            let (second, after) = take_id_token(after);
            if !second.is_empty() {
                out.push(second.to_string());
            }
            after
        } else {
            after
        };
    }
    out
}
