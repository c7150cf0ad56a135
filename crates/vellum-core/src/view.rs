//! View Builder
//!
//! Assembles the complete-history view — raw recent messages interleaved
//! with effective summaries — into a sequence of conversational turns. The
//! view never drops content; exceeding the caller's budget only sets a hint.

use serde::{Deserialize, Serialize};

use crate::coverage::{effective_summaries, uncovered_messages};
use crate::id::Id;
use crate::temporal::{MessageKind, MessageRecord, SummaryRecord};

/// One part of a turn's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum TurnPart {
    Text { body: String },
    ToolInvocation { id: Id, content: String },
    ToolOutcome { id: Id, content: String },
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
    Tool,
}

/// A single emitted turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub role: TurnRole,
    pub parts: Vec<TurnPart>,
}

impl Turn {
    fn text(role: TurnRole, body: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![TurnPart::Text { body: body.into() }],
        }
    }
}

/// Result of [`build_view`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
    pub turns: Vec<Turn>,
    pub total_tokens: i64,
    /// Set when `total_tokens` exceeds the caller's informational budget.
    /// Never causes content to be dropped.
    pub compaction_hint: bool,
}

enum MergedItem<'a> {
    Summary(&'a SummaryRecord),
    Message(&'a MessageRecord),
}

impl MergedItem<'_> {
    fn sort_key(&self) -> &Id {
        match self {
            MergedItem::Summary(s) => &s.start_id,
            MergedItem::Message(m) => &m.id,
        }
    }

    fn token_estimate(&self) -> i64 {
        match self {
            MergedItem::Summary(s) => s.token_estimate,
            MergedItem::Message(m) => m.token_estimate,
        }
    }
}

/// Build the complete-history view from the full message log and summary
/// lattice. `budget` only affects `compaction_hint`, never which content is
/// emitted.
pub fn build_view(messages: &[MessageRecord], summaries: &[SummaryRecord], budget: i64) -> View {
    let eff = effective_summaries(summaries);
    let unc = uncovered_messages(messages, summaries);

    let mut items: Vec<MergedItem<'_>> = Vec::with_capacity(eff.len() + unc.len());
    items.extend(eff.iter().map(MergedItem::Summary));
    items.extend(unc.into_iter().map(MergedItem::Message));

    // Stable sort on sort_key; ties break toward summaries because they were
    // pushed first and `sort_by` is stable.
    items.sort_by(|a, b| a.sort_key().cmp(b.sort_key()));

    let mut turns = Vec::new();
    let mut total_tokens = 0i64;
    let mut pending_calls: Vec<(Id, String)> = Vec::new();
    let mut pending_assistant: Option<(Id, String)> = None;
    let mut pending_outcomes: Vec<(Id, String)> = Vec::new();

    fn flush_assistant(
        turns: &mut Vec<Turn>,
        pending_assistant: &mut Option<(Id, String)>,
        pending_calls: &mut Vec<(Id, String)>,
    ) {
        if pending_assistant.is_none() && pending_calls.is_empty() {
            return;
        }
        let text = match pending_assistant.take() {
            Some((assistant_id, content)) => {
                let mut ids = vec![assistant_id];
                ids.extend(pending_calls.iter().map(|(id, _)| id.clone()));
                let tag = tag_only(&ids);
                if content.is_empty() {
                    tag
                } else {
                    format!("{tag} {content}")
                }
            }
            None => {
                let ids: Vec<Id> = pending_calls.iter().map(|(id, _)| id.clone()).collect();
                tag_only(&ids)
            }
        };
        let mut parts = vec![TurnPart::Text { body: text }];
        for (id, content) in pending_calls.drain(..) {
            parts.push(TurnPart::ToolInvocation { id, content });
        }
        turns.push(Turn {
            role: TurnRole::Assistant,
            parts,
        });
    }

    fn flush_outcomes(turns: &mut Vec<Turn>, pending_outcomes: &mut Vec<(Id, String)>) {
        if pending_outcomes.is_empty() {
            return;
        }
        let parts = pending_outcomes
            .drain(..)
            .map(|(id, content)| TurnPart::ToolOutcome { id, content })
            .collect();
        turns.push(Turn {
            role: TurnRole::Tool,
            parts,
        });
    }

    for item in &items {
        total_tokens += item.token_estimate();
        if !matches!(item, MergedItem::Message(m) if m.kind == MessageKind::ToolResult) {
            flush_outcomes(&mut turns, &mut pending_outcomes);
        }
        match item {
            MergedItem::Summary(s) => {
                flush_assistant(&mut turns, &mut pending_assistant, &mut pending_calls);
                turns.push(render_summary(s));
            }
            MergedItem::Message(m) => match m.kind {
                MessageKind::User => {
                    flush_assistant(&mut turns, &mut pending_assistant, &mut pending_calls);
                    turns.push(Turn::text(TurnRole::User, render_user(m)));
                }
                MessageKind::System => {
                    flush_assistant(&mut turns, &mut pending_assistant, &mut pending_calls);
                    turns.push(Turn::text(
                        TurnRole::Assistant,
                        format!("[system id:{}] {}", m.id, m.content),
                    ));
                }
                MessageKind::Assistant => {
                    flush_assistant(&mut turns, &mut pending_assistant, &mut pending_calls);
                    pending_assistant = Some((m.id.clone(), m.content.clone()));
                }
                MessageKind::ToolCall => {
                    pending_calls.push((m.id.clone(), m.content.clone()));
                }
                MessageKind::ToolResult => {
                    if pending_calls.is_empty() && pending_assistant.is_none() && pending_outcomes.is_empty() {
                        tracing::warn!("dropping orphan tool_result {}", m.id);
                        continue;
                    }
                    flush_assistant(&mut turns, &mut pending_assistant, &mut pending_calls);
                    pending_outcomes.push((m.id.clone(), m.content.clone()));
                }
            },
        }
    }
    flush_assistant(&mut turns, &mut pending_assistant, &mut pending_calls);
    flush_outcomes(&mut turns, &mut pending_outcomes);

    let compaction_hint = total_tokens > budget;
    View {
        turns,
        total_tokens,
        compaction_hint,
    }
}

fn tag_only(ids: &[Id]) -> String {
    match ids {
        [] => String::new(),
        [only] => format!("[id:{}]", only),
        [first, .., last] => format!("[id:{}…{}]", first, last),
    }
}

fn render_user(m: &MessageRecord) -> String {
    format!(
        "[{} id:{}] {}",
        m.created_at.format("%Y-%m-%d %H:%M"),
        m.id,
        m.content
    )
}

fn render_summary(s: &SummaryRecord) -> Turn {
    let mut body = format!("[distilled from:{} to:{}]\n{}", s.start_id, s.end_id, s.narrative);
    if !s.key_observations.is_empty() {
        body.push_str("\n\nRetained facts:\n");
        for obs in &s.key_observations {
            body.push_str(&format!("• {}\n", obs));
        }
        body = body.trim_end().to_string();
    }
    Turn::text(TurnRole::Assistant, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn msg(prefix_ord: u64, kind: MessageKind, content: &str, tokens: i64) -> MessageRecord {
        MessageRecord {
            id: Id::parse(format!("msg_{:012x}{}", prefix_ord, "0".repeat(14))).unwrap(),
            kind,
            content: content.to_string(),
            token_estimate: tokens,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn user_message_renders_single_turn_with_id_tag() {
        let view = build_view(&[msg(1, MessageKind::User, "hi", 2)], &[], 1000);
        assert_eq!(view.turns.len(), 1);
        assert_eq!(view.turns[0].role, TurnRole::User);
        match &view.turns[0].parts[0] {
            TurnPart::Text { body } => assert!(body.contains("id:msg_")),
            _ => panic!("expected text part"),
        }
    }

    #[test]
    fn assistant_tool_call_result_becomes_three_turns() {
        let messages = vec![
            msg(1, MessageKind::Assistant, "let me check", 1),
            msg(2, MessageKind::ToolCall, "{\"tool\":\"x\"}", 1),
            msg(3, MessageKind::ToolResult, "{\"ok\":true}", 1),
        ];
        let view = build_view(&messages, &[], 1000);
        assert_eq!(view.turns.len(), 2);
        assert_eq!(view.turns[0].role, TurnRole::Assistant);
        assert_eq!(view.turns[0].parts.len(), 2);
        assert_eq!(view.turns[1].role, TurnRole::Tool);
    }

    #[test]
    fn assistant_with_trailing_tool_calls_emits_range_tag() {
        let assistant = msg(1, MessageKind::Assistant, "let me check", 1);
        let call = msg(2, MessageKind::ToolCall, "{\"tool\":\"x\"}", 1);
        let messages = vec![assistant.clone(), call.clone()];
        let view = build_view(&messages, &[], 1000);
        match &view.turns[0].parts[0] {
            TurnPart::Text { body } => {
                assert_eq!(body, &format!("[id:{}…{}] let me check", assistant.id, call.id));
            }
            _ => panic!("expected text part"),
        }
    }

    #[test]
    fn assistant_with_no_tool_calls_emits_bare_tag() {
        let assistant = msg(1, MessageKind::Assistant, "hello there", 1);
        let user = msg(2, MessageKind::User, "hi", 1);
        let view = build_view(&[assistant.clone(), user], &[], 1000);
        match &view.turns[0].parts[0] {
            TurnPart::Text { body } => assert_eq!(body, &format!("[id:{}] hello there", assistant.id)),
            _ => panic!("expected text part"),
        }
    }

    #[test]
    fn assistant_with_empty_content_emits_tag_with_no_trailing_space() {
        let assistant = msg(1, MessageKind::Assistant, "", 1);
        let call = msg(2, MessageKind::ToolCall, "{}", 1);
        let view = build_view(&[assistant.clone(), call.clone()], &[], 1000);
        match &view.turns[0].parts[0] {
            TurnPart::Text { body } => assert_eq!(body, &format!("[id:{}…{}]", assistant.id, call.id)),
            _ => panic!("expected text part"),
        }
    }

    #[test]
    fn orphan_tool_result_is_dropped() {
        let messages = vec![msg(1, MessageKind::ToolResult, "{}", 1)];
        let view = build_view(&messages, &[], 1000);
        assert!(view.turns.is_empty());
    }

    #[test]
    fn budget_sets_hint_without_dropping_content() {
        let messages = vec![msg(1, MessageKind::User, "hi", 5000)];
        let view = build_view(&messages, &[], 10);
        assert!(view.compaction_hint);
        assert_eq!(view.turns.len(), 1);
    }

    #[test]
    fn summary_renders_with_observations() {
        let s = SummaryRecord {
            id: Id::parse(format!("sum_{:012x}{}", 1u64, "0".repeat(14))).unwrap(),
            order_num: 1,
            start_id: Id::parse(format!("msg_{:012x}{}", 1u64, "0".repeat(14))).unwrap(),
            end_id: Id::parse(format!("msg_{:012x}{}", 2u64, "0".repeat(14))).unwrap(),
            narrative: "stuff happened".into(),
            key_observations: vec!["fact one".into(), "fact two".into()],
            tags: vec![],
            token_estimate: 10,
            created_at: Utc::now(),
        };
        let view = build_view(&[], &[s], 1000);
        assert_eq!(view.turns.len(), 1);
        match &view.turns[0].parts[0] {
            TurnPart::Text { body } => {
                assert!(body.contains("distilled from:"));
                assert!(body.contains("Retained facts"));
                assert!(body.contains("fact one"));
            }
            _ => panic!("expected text part"),
        }
    }
}
