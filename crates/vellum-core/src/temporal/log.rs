use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::id::{Id, IdError, Prefix};
use crate::store::Store;

use super::types::{
    ContextWindow, FtsHit, MessageKind, MessageRecord, SearchHit, SearchParams, SummaryRecord,
    TagMode,
};

/// Errors produced by the temporal log.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum TemporalError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("id error: {0}")]
    Id(#[from] IdError),
    #[error("a message or summary with id {0} already exists")]
    DuplicateId(String),
    #[error("unknown message kind: {0}")]
    UnknownKind(String),
}

pub type Result<T> = std::result::Result<T, TemporalError>;

/// Append-only message log and immutable summary lattice.
///
/// All methods take `&self`; the underlying [`Store`] serializes concurrent
/// writers.
pub struct TemporalLog {
    store: Arc<Store>,
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRecord> {
    let id: String = row.get("id")?;
    let kind: String = row.get("type")?;
    Ok(MessageRecord {
        id: Id::parse(id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?,
        kind: MessageKind::parse(&kind).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(TemporalError::UnknownKind(kind.clone())),
            )
        })?,
        content: row.get("content")?,
        token_estimate: row.get("token_estimate")?,
        created_at: row.get("created_at")?,
    })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<SummaryRecord> {
    let id: String = row.get("id")?;
    let start_id: String = row.get("start_id")?;
    let end_id: String = row.get("end_id")?;
    let key_observations: String = row.get("key_observations")?;
    let tags: String = row.get("tags")?;
    Ok(SummaryRecord {
        id: parse_id_col(id)?,
        order_num: row.get("order_num")?,
        start_id: parse_id_col(start_id)?,
        end_id: parse_id_col(end_id)?,
        narrative: row.get("narrative")?,
        key_observations: serde_json::from_str(&key_observations).unwrap_or_default(),
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        token_estimate: row.get("token_estimate")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_id_col(s: String) -> rusqlite::Result<Id> {
    Id::parse(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Strip or escape FTS5 special characters and wrap each remaining term in
/// double quotes, so stray punctuation in message content never becomes
/// broken `MATCH` syntax.
pub fn sanitize_fts5_query(raw: &str) -> String {
    raw.split_whitespace()
        .map(|term| {
            let cleaned: String = term
                .chars()
                .filter(|c| !matches!(c, '"' | '*' | '^' | ':' | '(' | ')'))
                .collect();
            format!("\"{}\"", cleaned.replace('"', "\"\""))
        })
        .filter(|t| *t != "\"\"")
        .collect::<Vec<_>>()
        .join(" ")
}

impl TemporalLog {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Mint a fresh summary id, for callers (the distillation worker) that
    /// build a [`SummaryRecord`] themselves before calling [`Self::create_summary`].
    pub fn generate_summary_id(&self) -> Result<Id> {
        Ok(self.store.ids().generate_ascending(Prefix::Summary)?)
    }

    /// Mint and append a new message record, returning the generated id.
    pub fn append_message(
        &self,
        kind: MessageKind,
        content: impl Into<String>,
        token_estimate: i64,
    ) -> Result<MessageRecord> {
        let id = self.store.ids().generate_ascending(Prefix::Message)?;
        let created_at = Utc::now();
        let content = content.into();

        let conn = self.store.writer();
        conn.execute(
            "INSERT INTO temporal_messages (id, type, content, token_estimate, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id.as_str(), kind.as_str(), content, token_estimate, created_at],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                TemporalError::DuplicateId(id.to_string())
            }
            other => TemporalError::Database(other),
        })?;

        Ok(MessageRecord {
            id,
            kind,
            content,
            token_estimate,
            created_at,
        })
    }

    /// Insert a fully-formed summary record. Summaries are never updated.
    pub fn create_summary(&self, record: &SummaryRecord) -> Result<()> {
        let conn = self.store.writer();
        let key_observations = serde_json::to_string(&record.key_observations).unwrap();
        let tags = serde_json::to_string(&record.tags).unwrap();
        conn.execute(
            "INSERT INTO temporal_summaries
                (id, order_num, start_id, end_id, narrative, key_observations, tags, token_estimate, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id.as_str(),
                record.order_num,
                record.start_id.as_str(),
                record.end_id.as_str(),
                record.narrative,
                key_observations,
                tags,
                record.token_estimate,
                record.created_at,
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                TemporalError::DuplicateId(record.id.to_string())
            }
            other => TemporalError::Database(other),
        })?;
        Ok(())
    }

    /// Inclusive id range, ascending.
    pub fn get_messages(&self, from: Option<&Id>, to: Option<&Id>) -> Result<Vec<MessageRecord>> {
        let conn = self.store.reader();
        let lo = from.map(Id::as_str).unwrap_or("");
        let hi = to.map(Id::as_str).unwrap_or("\u{10FFFF}");
        let mut stmt = conn.prepare(
            "SELECT id, type, content, token_estimate, created_at FROM temporal_messages
             WHERE id >= ?1 AND id <= ?2 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![lo, hi], message_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(TemporalError::from)
    }

    pub fn get_message(&self, id: &Id) -> Result<Option<MessageRecord>> {
        let conn = self.store.reader();
        conn.query_row(
            "SELECT id, type, content, token_estimate, created_at FROM temporal_messages WHERE id = ?1",
            params![id.as_str()],
            message_from_row,
        )
        .optional()
        .map_err(TemporalError::from)
    }

    /// The target flanked by up to `window.before`/`window.after` messages,
    /// all ascending. Empty if the target is missing.
    pub fn get_message_with_context(
        &self,
        id: &Id,
        window: ContextWindow,
    ) -> Result<Vec<MessageRecord>> {
        if self.get_message(id)?.is_none() {
            return Ok(Vec::new());
        }

        let conn = self.store.reader();

        let mut before_stmt = conn.prepare(
            "SELECT id, type, content, token_estimate, created_at FROM temporal_messages
             WHERE id < ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let mut before: Vec<MessageRecord> = before_stmt
            .query_map(params![id.as_str(), window.before as i64], message_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        before.reverse();

        let target = self
            .get_message(id)?
            .expect("checked non-none above, no concurrent deletion of messages is possible");

        let mut after_stmt = conn.prepare(
            "SELECT id, type, content, token_estimate, created_at FROM temporal_messages
             WHERE id > ?1 ORDER BY id ASC LIMIT ?2",
        )?;
        let after: Vec<MessageRecord> = after_stmt
            .query_map(params![id.as_str(), window.after as i64], message_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        before.push(target);
        before.extend(after);
        Ok(before)
    }

    /// If `order` given, only that order; otherwise all, sorted by
    /// `(order_num ASC, id ASC)`.
    pub fn get_summaries(&self, order: Option<i64>) -> Result<Vec<SummaryRecord>> {
        let conn = self.store.reader();
        match order {
            Some(order_num) => {
                let mut stmt = conn.prepare(
                    "SELECT id, order_num, start_id, end_id, narrative, key_observations, tags,
                            token_estimate, created_at
                     FROM temporal_summaries WHERE order_num = ?1 ORDER BY id ASC",
                )?;
                let rows = stmt.query_map(params![order_num], summary_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(TemporalError::from)
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, order_num, start_id, end_id, narrative, key_observations, tags,
                            token_estimate, created_at
                     FROM temporal_summaries ORDER BY order_num ASC, id ASC",
                )?;
                let rows = stmt.query_map([], summary_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(TemporalError::from)
            }
        }
    }

    /// The subsumption-maximal set (see [`crate::coverage`]), sorted by `start_id`.
    pub fn get_highest_order_summaries(&self) -> Result<Vec<SummaryRecord>> {
        let all = self.get_summaries(None)?;
        let mut effective = crate::coverage::effective_summaries(&all);
        effective.sort_by(|a, b| a.start_id.cmp(&b.start_id));
        Ok(effective)
    }

    /// Linear keyword match over message content and summary
    /// narrative+observations.
    pub fn search(&self, params: &SearchParams) -> Result<Vec<SearchHit>> {
        let needle = params.query.to_lowercase();
        let mut hits = Vec::new();

        for msg in self.get_messages(params.from.as_ref(), params.to.as_ref())? {
            if !params.kinds.is_empty() && !params.kinds.contains(&msg.kind) {
                continue;
            }
            if msg.content.to_lowercase().contains(&needle) {
                hits.push(SearchHit::Message(msg));
            }
        }

        for summary in self.get_summaries(None)? {
            if let Some(from) = &params.from {
                if &summary.end_id < from {
                    continue;
                }
            }
            if let Some(to) = &params.to {
                if &summary.start_id > to {
                    continue;
                }
            }
            if !tags_match(&summary.tags, &params.tags, params.tag_mode) {
                continue;
            }
            let haystack = format!(
                "{} {}",
                summary.narrative.to_lowercase(),
                summary.key_observations.join(" ").to_lowercase()
            );
            if haystack.contains(&needle) {
                hits.push(SearchHit::Summary(summary));
            }
        }

        Ok(hits)
    }

    /// Relevance-ranked snippet search over the FTS5 index.
    pub fn search_fts(&self, query: &str, limit: usize) -> Result<Vec<FtsHit>> {
        let sanitized = sanitize_fts5_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.store.reader();
        let mut stmt = conn.prepare(
            "SELECT id,
                    snippet(temporal_messages_fts, 1, '>>>', '<<<', '...', 10) AS excerpt,
                    bm25(temporal_messages_fts) AS rank
             FROM temporal_messages_fts
             WHERE temporal_messages_fts MATCH ?1
             ORDER BY rank LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![sanitized, limit as i64], |row| {
            let id: String = row.get(0)?;
            Ok(FtsHit {
                id: parse_id_col(id)?,
                excerpt: row.get(1)?,
                rank: row.get(2)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(TemporalError::from)
    }

    /// Sum of `token_estimate` over messages strictly after the last
    /// summary's `end_id` (0 if there are no summaries).
    pub fn estimate_uncompacted_tokens(&self) -> Result<i64> {
        let conn = self.store.reader();
        let last_end: Option<String> =
            conn.query_row("SELECT MAX(end_id) FROM temporal_summaries", [], |r| r.get(0))?;
        let total: i64 = match last_end {
            Some(end_id) => conn.query_row(
                "SELECT COALESCE(SUM(token_estimate), 0) FROM temporal_messages WHERE id > ?1",
                params![end_id],
                |r| r.get(0),
            )?,
            None => conn.query_row(
                "SELECT COALESCE(SUM(token_estimate), 0) FROM temporal_messages",
                [],
                |r| r.get(0),
            )?,
        };
        Ok(total)
    }

    /// The greatest `end_id` over all summaries, if any exist.
    pub fn get_last_summary_end_id(&self) -> Result<Option<Id>> {
        let conn = self.store.reader();
        let end_id: Option<String> =
            conn.query_row("SELECT MAX(end_id) FROM temporal_summaries", [], |r| r.get(0))?;
        end_id.map(parse_id_col).transpose().map_err(TemporalError::from)
    }
}

fn tags_match(have: &[String], want: &[String], mode: TagMode) -> bool {
    if want.is_empty() {
        return true;
    }
    match mode {
        TagMode::Any => want.iter().any(|t| have.contains(t)),
        TagMode::All => want.iter().all(|t| have.contains(t)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreConfig;

    fn temporal() -> TemporalLog {
        let store = Arc::new(Store::open_memory().unwrap());
        TemporalLog::new(store)
    }

    #[test]
    fn append_then_get() {
        let log = temporal();
        let msg = log.append_message(MessageKind::User, "hello", 3).unwrap();
        let fetched = log.get_message(&msg.id).unwrap().unwrap();
        assert_eq!(fetched.content, "hello");
        assert_eq!(fetched.kind, MessageKind::User);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let log = temporal();
        let id = log.store.ids().generate_ascending(Prefix::Message).unwrap();
        let conn = log.store.writer();
        conn.execute(
            "INSERT INTO temporal_messages (id, type, content, token_estimate, created_at)
             VALUES (?1, 'user', 'x', 0, ?2)",
            params![id.as_str(), Utc::now()],
        )
        .unwrap();
        drop(conn);

        let conn = log.store.writer();
        let result = conn.execute(
            "INSERT INTO temporal_messages (id, type, content, token_estimate, created_at)
             VALUES (?1, 'user', 'y', 0, ?2)",
            params![id.as_str(), Utc::now()],
        );
        assert!(result.is_err());
    }

    #[test]
    fn context_window_is_empty_for_missing_target() {
        let log = temporal();
        let ghost = log.store.ids().generate_ascending(Prefix::Message).unwrap();
        let ctx = log
            .get_message_with_context(&ghost, ContextWindow { before: 2, after: 2 })
            .unwrap();
        assert!(ctx.is_empty());
    }

    #[test]
    fn context_window_respects_bounds() {
        let log = temporal();
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(log.append_message(MessageKind::User, format!("m{i}"), 1).unwrap().id);
        }
        let ctx = log
            .get_message_with_context(&ids[2], ContextWindow { before: 1, after: 1 })
            .unwrap();
        assert_eq!(ctx.len(), 3);
        assert_eq!(ctx[0].id, ids[1]);
        assert_eq!(ctx[1].id, ids[2]);
        assert_eq!(ctx[2].id, ids[3]);
    }

    #[test]
    fn uncompacted_tokens_counts_everything_without_summaries() {
        let log = temporal();
        log.append_message(MessageKind::User, "a", 10).unwrap();
        log.append_message(MessageKind::User, "b", 20).unwrap();
        assert_eq!(log.estimate_uncompacted_tokens().unwrap(), 30);
    }

    #[test]
    fn uncompacted_tokens_excludes_summarized_range() {
        let log = temporal();
        let m1 = log.append_message(MessageKind::User, "a", 10).unwrap();
        let m2 = log.append_message(MessageKind::User, "b", 20).unwrap();
        let _m3 = log.append_message(MessageKind::User, "c", 30).unwrap();

        let sum_id = log.store.ids().generate_ascending(Prefix::Summary).unwrap();
        log.create_summary(&SummaryRecord {
            id: sum_id,
            order_num: 1,
            start_id: m1.id,
            end_id: m2.id,
            narrative: "a and b happened".into(),
            key_observations: vec![],
            tags: vec![],
            token_estimate: 5,
            created_at: Utc::now(),
        })
        .unwrap();

        assert_eq!(log.estimate_uncompacted_tokens().unwrap(), 30);
        assert_eq!(log.get_last_summary_end_id().unwrap().unwrap(), m2.id);
    }

    #[test]
    fn search_matches_message_content_case_insensitively() {
        let log = temporal();
        log.append_message(MessageKind::User, "the QUICK brown fox", 1).unwrap();
        let hits = log
            .search(&SearchParams {
                query: "quick".into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn sanitize_strips_special_characters() {
        let sanitized = sanitize_fts5_query("foo* \"bar\" (baz)");
        assert_eq!(sanitized, "\"foo\" \"bar\" \"baz\"");
    }

    #[test]
    fn search_fts_finds_inserted_message() {
        let log = temporal();
        log.append_message(MessageKind::User, "a memorable phrase about whales", 1)
            .unwrap();
        let hits = log.search_fts("whales", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].excerpt.contains(">>>"));
    }
}
