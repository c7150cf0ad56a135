use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::Id;

/// The kind of a [`MessageRecord`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    User,
    Assistant,
    ToolCall,
    ToolResult,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::User => "user",
            MessageKind::Assistant => "assistant",
            MessageKind::ToolCall => "tool_call",
            MessageKind::ToolResult => "tool_result",
            MessageKind::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageKind::User),
            "assistant" => Some(MessageKind::Assistant),
            "tool_call" => Some(MessageKind::ToolCall),
            "tool_result" => Some(MessageKind::ToolResult),
            "system" => Some(MessageKind::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An append-only entry in the temporal log. Never mutated once written.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: Id,
    pub kind: MessageKind,
    pub content: String,
    pub token_estimate: i64,
    pub created_at: DateTime<Utc>,
}

/// An immutable distillation covering a contiguous, inclusive id range.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRecord {
    pub id: Id,
    pub order_num: i64,
    pub start_id: Id,
    pub end_id: Id,
    pub narrative: String,
    pub key_observations: Vec<String>,
    pub tags: Vec<String>,
    pub token_estimate: i64,
    pub created_at: DateTime<Utc>,
}

/// Filters accepted by [`crate::temporal::TemporalLog::search`].
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub query: String,
    pub from: Option<Id>,
    pub to: Option<Id>,
    pub kinds: Vec<MessageKind>,
    pub tags: Vec<String>,
    pub tag_mode: TagMode,
}

/// How `tags` in a [`SearchParams`] combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagMode {
    #[default]
    Any,
    All,
}

/// One linear-scan search hit, from either a message or a summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchHit {
    Message(MessageRecord),
    Summary(SummaryRecord),
}

/// One relevance-ranked FTS hit, with a highlighted excerpt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtsHit {
    pub id: Id,
    /// Excerpt with matched terms wrapped in `>>>`/`<<<` markers.
    pub excerpt: String,
    pub rank: f64,
}

/// Window parameters for [`crate::temporal::TemporalLog::get_message_with_context`].
#[derive(Debug, Clone, Copy)]
pub struct ContextWindow {
    pub before: usize,
    pub after: usize,
}
