use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of agent-role tags recorded in `created_by`/`updated_by`.
/// Unknown values are accepted as free text but SHOULD be validated at the
/// boundary by callers.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentRole {
    Main,
    LtmConsolidate,
    LtmReflect,
    Research,
    /// Any other free-text tag, accepted but not in the closed set.
    Other(String),
}

impl AgentRole {
    pub fn as_str(&self) -> &str {
        match self {
            AgentRole::Main => "main",
            AgentRole::LtmConsolidate => "ltm-consolidate",
            AgentRole::LtmReflect => "ltm-reflect",
            AgentRole::Research => "research",
            AgentRole::Other(s) => s,
        }
    }

    pub fn parse(s: impl Into<String>) -> Self {
        let s = s.into();
        match s.as_str() {
            "main" => AgentRole::Main,
            "ltm-consolidate" => AgentRole::LtmConsolidate,
            "ltm-reflect" => AgentRole::LtmReflect,
            "research" => AgentRole::Research,
            _ => AgentRole::Other(s),
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node in the long-term knowledge tree.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LtmEntry {
    pub slug: String,
    pub parent_slug: Option<String>,
    pub path: String,
    pub title: String,
    pub body: String,
    pub links: Vec<String>,
    pub version: i64,
    pub created_by: String,
    pub updated_by: String,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LtmEntry {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    pub fn depth(&self) -> usize {
        self.path.trim_start_matches('/').split('/').filter(|s| !s.is_empty()).count()
    }
}

/// A scored full-text or substring search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LtmSearchHit {
    pub entry: LtmEntry,
    pub score: i64,
}

/// An FTS5 search hit over LTM entries, keyed by slug rather than by the
/// crate's generated id scheme (entries are identified by slug, not `Id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LtmFtsHit {
    pub slug: String,
    pub excerpt: String,
    pub rank: f64,
}
