use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::store::Store;
use crate::temporal::sanitize_fts5_query;

use super::glob;
use super::slug;
use super::types::{LtmEntry, LtmFtsHit, LtmSearchHit};

/// Errors produced by the LTM store.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum LtmError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("entry not found: {0}")]
    NotFound(String),
    #[error("entry already exists: {0}")]
    AlreadyExists(String),
    #[error("parent not found: {0}")]
    ParentNotFound(String),
    #[error("entry is archived: {0}")]
    Archived(String),
    #[error("version conflict: expected {expected}, actual {actual}")]
    Conflict { expected: i64, actual: i64 },
    #[error("would create a circular parent relationship")]
    CircularParent,
    #[error("invalid slug: {0}")]
    InvalidSlug(String),
    #[error("text to replace not found in body")]
    TextNotFound,
    #[error("text to replace occurs more than once in body")]
    AmbiguousEdit,
}

pub type Result<T> = std::result::Result<T, LtmError>;

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LtmEntry> {
    let links: String = row.get("links")?;
    Ok(LtmEntry {
        slug: row.get("slug")?,
        parent_slug: row.get("parent_slug")?,
        path: row.get("path")?,
        title: row.get("title")?,
        body: row.get("body")?,
        links: serde_json::from_str(&links).unwrap_or_default(),
        version: row.get("version")?,
        created_by: row.get("created_by")?,
        updated_by: row.get("updated_by")?,
        archived_at: row.get("archived_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn fetch_active(conn: &Connection, slug: &str) -> rusqlite::Result<Option<LtmEntry>> {
    conn.query_row(
        "SELECT slug, parent_slug, path, title, body, links, version, created_by, updated_by,
                archived_at, created_at, updated_at
         FROM ltm_entries WHERE slug = ?1 AND archived_at IS NULL",
        params![slug],
        entry_from_row,
    )
    .optional()
}

fn fetch_any(conn: &Connection, slug: &str) -> rusqlite::Result<Option<LtmEntry>> {
    conn.query_row(
        "SELECT slug, parent_slug, path, title, body, links, version, created_by, updated_by,
                archived_at, created_at, updated_at
         FROM ltm_entries WHERE slug = ?1",
        params![slug],
        entry_from_row,
    )
    .optional()
}

/// Precondition check shared by every CAS mutation: resolve the current
/// active row and compare its version against `expected_version`.
fn cas_precheck(conn: &Connection, target_slug: &str, expected_version: i64) -> Result<LtmEntry> {
    match fetch_any(conn, target_slug)? {
        None => Err(LtmError::NotFound(target_slug.to_string())),
        Some(entry) if entry.is_archived() => Err(LtmError::Archived(target_slug.to_string())),
        Some(entry) if entry.version != expected_version => Err(LtmError::Conflict {
            expected: expected_version,
            actual: entry.version,
        }),
        Some(entry) => Ok(entry),
    }
}

/// Tree of versioned long-term-memory entries, mutated only via
/// compare-and-swap.
pub struct LtmStore {
    store: Arc<Store>,
}

impl LtmStore {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn create(
        &self,
        new_slug: &str,
        parent_slug: Option<&str>,
        title: impl Into<String>,
        body: impl Into<String>,
        links: Vec<String>,
        created_by: impl Into<String>,
    ) -> Result<LtmEntry> {
        if !slug::is_valid(new_slug) {
            return Err(LtmError::InvalidSlug(new_slug.to_string()));
        }

        let conn = self.store.writer();

        if fetch_any(&conn, new_slug)?.is_some() {
            return Err(LtmError::AlreadyExists(new_slug.to_string()));
        }

        let parent_path = match parent_slug {
            Some(p) => match fetch_active(&conn, p)? {
                Some(parent) => Some(parent.path),
                None => return Err(LtmError::ParentNotFound(p.to_string())),
            },
            None => None,
        };

        let path = match &parent_path {
            Some(pp) => format!("{pp}/{new_slug}"),
            None => format!("/{new_slug}"),
        };

        let now = Utc::now();
        let created_by = created_by.into();
        let title = title.into();
        let body = body.into();
        let links_json = serde_json::to_string(&links).unwrap();

        conn.execute(
            "INSERT INTO ltm_entries
                (slug, parent_slug, path, title, body, links, version, created_by, updated_by,
                 archived_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7, NULL, ?8, ?8)",
            params![new_slug, parent_slug, path, title, body, links_json, created_by, now],
        )?;

        Ok(LtmEntry {
            slug: new_slug.to_string(),
            parent_slug: parent_slug.map(String::from),
            path,
            title,
            body,
            links,
            version: 1,
            created_by: created_by.clone(),
            updated_by: created_by,
            archived_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Archived entries are treated as missing.
    pub fn read(&self, target_slug: &str) -> Result<Option<LtmEntry>> {
        Ok(fetch_active(&self.store.reader(), target_slug)?)
    }

    pub fn update(
        &self,
        target_slug: &str,
        new_body: impl Into<String>,
        expected_version: i64,
        updated_by: impl Into<String>,
    ) -> Result<LtmEntry> {
        let conn = self.store.writer();
        let current = cas_precheck(&conn, target_slug, expected_version)?;
        let now = Utc::now();
        let updated_by = updated_by.into();
        let new_body = new_body.into();

        let affected = conn.execute(
            "UPDATE ltm_entries SET body = ?1, version = version + 1, updated_by = ?2, updated_at = ?3
             WHERE slug = ?4 AND version = ?5 AND archived_at IS NULL",
            params![new_body, updated_by, now, target_slug, expected_version],
        )?;
        if affected == 0 {
            return Err(LtmError::Conflict {
                expected: expected_version,
                actual: current.version,
            });
        }

        Ok(LtmEntry {
            body: new_body,
            version: current.version + 1,
            updated_by,
            updated_at: now,
            ..current
        })
    }

    pub fn edit(
        &self,
        target_slug: &str,
        old_text: &str,
        new_text: &str,
        expected_version: i64,
        updated_by: impl Into<String>,
    ) -> Result<LtmEntry> {
        let conn = self.store.writer();
        let current = cas_precheck(&conn, target_slug, expected_version)?;

        let occurrences = current.body.matches(old_text).count();
        if occurrences == 0 {
            return Err(LtmError::TextNotFound);
        }
        if occurrences > 1 {
            return Err(LtmError::AmbiguousEdit);
        }
        let new_body = current.body.replacen(old_text, new_text, 1);

        let now = Utc::now();
        let updated_by = updated_by.into();
        let affected = conn.execute(
            "UPDATE ltm_entries SET body = ?1, version = version + 1, updated_by = ?2, updated_at = ?3
             WHERE slug = ?4 AND version = ?5 AND archived_at IS NULL",
            params![new_body, updated_by, now, target_slug, expected_version],
        )?;
        if affected == 0 {
            return Err(LtmError::Conflict {
                expected: expected_version,
                actual: current.version,
            });
        }

        Ok(LtmEntry {
            body: new_body,
            version: current.version + 1,
            updated_by,
            updated_at: now,
            ..current
        })
    }

    pub fn reparent(
        &self,
        target_slug: &str,
        new_parent_slug: Option<&str>,
        expected_version: i64,
        updated_by: impl Into<String>,
    ) -> Result<LtmEntry> {
        let conn = self.store.writer();
        let current = cas_precheck(&conn, target_slug, expected_version)?;

        let new_parent_path = match new_parent_slug {
            Some(p) => match fetch_active(&conn, p)? {
                Some(parent) => {
                    if parent.path == current.path || parent.path.starts_with(&format!("{}/", current.path)) {
                        return Err(LtmError::CircularParent);
                    }
                    Some(parent.path)
                }
                None => return Err(LtmError::ParentNotFound(p.to_string())),
            },
            None => None,
        };

        let new_path = match &new_parent_path {
            Some(pp) => format!("{pp}/{target_slug}"),
            None => format!("/{target_slug}"),
        };

        let now = Utc::now();
        let updated_by = updated_by.into();

        let affected = conn.execute(
            "UPDATE ltm_entries SET parent_slug = ?1, path = ?2, version = version + 1,
                    updated_by = ?3, updated_at = ?4
             WHERE slug = ?5 AND version = ?6 AND archived_at IS NULL",
            params![new_parent_slug, new_path, updated_by, now, target_slug, expected_version],
        )?;
        if affected == 0 {
            return Err(LtmError::Conflict {
                expected: expected_version,
                actual: current.version,
            });
        }

        rewrite_descendant_paths(&conn, &current.path, &new_path)?;

        Ok(LtmEntry {
            parent_slug: new_parent_slug.map(String::from),
            path: new_path,
            version: current.version + 1,
            updated_by,
            updated_at: now,
            ..current
        })
    }

    pub fn rename(
        &self,
        target_slug: &str,
        new_slug: &str,
        expected_version: i64,
        updated_by: impl Into<String>,
    ) -> Result<LtmEntry> {
        if !slug::is_valid(new_slug) {
            return Err(LtmError::InvalidSlug(new_slug.to_string()));
        }

        let conn = self.store.writer();
        let current = cas_precheck(&conn, target_slug, expected_version)?;

        if fetch_any(&conn, new_slug)?.is_some() {
            return Err(LtmError::AlreadyExists(new_slug.to_string()));
        }

        let new_path = match current.path.rfind('/') {
            Some(idx) => format!("{}/{new_slug}", &current.path[..idx]),
            None => format!("/{new_slug}"),
        };

        let now = Utc::now();
        let updated_by = updated_by.into();

        let affected = conn.execute(
            "UPDATE ltm_entries SET slug = ?1, path = ?2, version = version + 1,
                    updated_by = ?3, updated_at = ?4
             WHERE slug = ?5 AND version = ?6 AND archived_at IS NULL",
            params![new_slug, new_path, updated_by, now, target_slug, expected_version],
        )?;
        if affected == 0 {
            return Err(LtmError::Conflict {
                expected: expected_version,
                actual: current.version,
            });
        }

        conn.execute(
            "UPDATE ltm_entries SET parent_slug = ?1 WHERE parent_slug = ?2",
            params![new_slug, target_slug],
        )?;
        rewrite_descendant_paths(&conn, &current.path, &new_path)?;

        Ok(LtmEntry {
            slug: new_slug.to_string(),
            path: new_path,
            version: current.version + 1,
            updated_by,
            updated_at: now,
            ..current
        })
    }

    /// Sets `archived_at`. Children are NOT archived.
    pub fn archive(&self, target_slug: &str, expected_version: i64) -> Result<()> {
        let conn = self.store.writer();
        let current = cas_precheck(&conn, target_slug, expected_version)?;
        let now = Utc::now();

        let affected = conn.execute(
            "UPDATE ltm_entries SET archived_at = ?1, version = version + 1
             WHERE slug = ?2 AND version = ?3 AND archived_at IS NULL",
            params![now, target_slug, expected_version],
        )?;
        if affected == 0 {
            return Err(LtmError::Conflict {
                expected: expected_version,
                actual: current.version,
            });
        }
        Ok(())
    }

    /// `**`/`*` path glob over active entries, ordered by path.
    pub fn glob(&self, pattern: &str, max_depth: Option<usize>) -> Result<Vec<LtmEntry>> {
        let conn = self.store.reader();
        let mut stmt = conn.prepare(
            "SELECT slug, parent_slug, path, title, body, links, version, created_by, updated_by,
                    archived_at, created_at, updated_at
             FROM ltm_entries WHERE archived_at IS NULL ORDER BY path ASC",
        )?;
        let rows = stmt.query_map([], entry_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            let entry = row?;
            if glob::matches(pattern, &entry.path) {
                if let Some(max) = max_depth {
                    if entry.depth() > max {
                        continue;
                    }
                }
                out.push(entry);
            }
        }
        Ok(out)
    }

    /// Case-insensitive substring match on `title`/`body`; excludes archived.
    /// `score = 2 * title_match + 1 * body_match`, sorted descending.
    pub fn search(&self, query: &str, path_prefix: Option<&str>) -> Result<Vec<LtmSearchHit>> {
        let needle = query.to_lowercase();
        let conn = self.store.reader();
        let mut stmt = conn.prepare(
            "SELECT slug, parent_slug, path, title, body, links, version, created_by, updated_by,
                    archived_at, created_at, updated_at
             FROM ltm_entries WHERE archived_at IS NULL",
        )?;
        let rows = stmt.query_map([], entry_from_row)?;
        let mut hits = Vec::new();
        for row in rows {
            let entry = row?;
            if let Some(prefix) = path_prefix {
                if !entry.path.starts_with(prefix) {
                    continue;
                }
            }
            let title_match = entry.title.to_lowercase().contains(&needle);
            let body_match = entry.body.to_lowercase().contains(&needle);
            let score = 2 * title_match as i64 + body_match as i64;
            if score > 0 {
                hits.push(LtmSearchHit { entry, score });
            }
        }
        hits.sort_by(|a, b| b.score.cmp(&a.score));
        Ok(hits)
    }

    /// FTS5 variant with snippet markers, ignoring archived entries.
    pub fn search_fts(&self, query: &str, limit: usize) -> Result<Vec<LtmFtsHit>> {
        let sanitized = sanitize_fts5_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.store.reader();
        let mut stmt = conn.prepare(
            "SELECT f.slug,
                    snippet(ltm_entries_fts, 2, '>>>', '<<<', '...', 10) AS excerpt,
                    bm25(ltm_entries_fts) AS rank
             FROM ltm_entries_fts f
             JOIN ltm_entries e ON e.slug = f.slug
             WHERE ltm_entries_fts MATCH ?1 AND e.archived_at IS NULL
             ORDER BY rank LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![sanitized, limit as i64], |row| {
            Ok(LtmFtsHit {
                slug: row.get(0)?,
                excerpt: row.get(1)?,
                rank: row.get(2)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(LtmError::from)
    }

    /// Active entries with `parent_slug` (or root-level when `None`),
    /// sorted by slug.
    pub fn get_children(&self, parent_slug: Option<&str>) -> Result<Vec<LtmEntry>> {
        let conn = self.store.reader();
        let rows = match parent_slug {
            Some(p) => {
                let mut stmt = conn.prepare(
                    "SELECT slug, parent_slug, path, title, body, links, version, created_by, updated_by,
                            archived_at, created_at, updated_at
                     FROM ltm_entries WHERE parent_slug = ?1 AND archived_at IS NULL ORDER BY slug ASC",
                )?;
                stmt.query_map(params![p], entry_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT slug, parent_slug, path, title, body, links, version, created_by, updated_by,
                            archived_at, created_at, updated_at
                     FROM ltm_entries WHERE parent_slug IS NULL AND archived_at IS NULL ORDER BY slug ASC",
                )?;
                stmt.query_map([], entry_from_row)?.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }
}

/// Slugs can't contain `%`/`_`, so a plain `LIKE` prefix match is safe
/// without an `ESCAPE` clause.
fn rewrite_descendant_paths(conn: &Connection, old_prefix: &str, new_prefix: &str) -> rusqlite::Result<()> {
    let old_prefix_slash = format!("{old_prefix}/");
    let mut stmt = conn.prepare(
        "SELECT slug, path FROM ltm_entries WHERE archived_at IS NULL AND path LIKE ?1",
    )?;
    let like_pattern = format!("{old_prefix_slash}%");
    let descendants: Vec<(String, String)> = stmt
        .query_map(params![like_pattern], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for (slug, path) in descendants {
        let rewritten = format!("{new_prefix}{}", &path[old_prefix.len()..]);
        conn.execute(
            "UPDATE ltm_entries SET path = ?1 WHERE slug = ?2",
            params![rewritten, slug],
        )?;
    }
    Ok(())
}
