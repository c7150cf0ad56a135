//! Database Migrations
//!
//! Schema migration definitions for the storage layer. Exact table and
//! column names here form the persistence contract described in the crate's
//! top-level documentation — external tooling may read the file directly.

/// A database migration.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

/// Migration definitions, applied in order against a fresh or partially
/// migrated database.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: temporal log, LTM tree, background registry",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "FTS5 indices over messages, summaries, and LTM entries",
        up: MIGRATION_V2_UP,
    },
];

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS temporal_messages (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    content TEXT NOT NULL,
    token_estimate INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_temporal_messages_created ON temporal_messages(created_at);

CREATE TABLE IF NOT EXISTS temporal_summaries (
    id TEXT PRIMARY KEY,
    order_num INTEGER NOT NULL,
    start_id TEXT NOT NULL,
    end_id TEXT NOT NULL,
    narrative TEXT NOT NULL,
    key_observations TEXT NOT NULL DEFAULT '[]',
    tags TEXT NOT NULL DEFAULT '[]',
    token_estimate INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_temporal_summaries_order ON temporal_summaries(order_num, id);
CREATE INDEX IF NOT EXISTS idx_temporal_summaries_start ON temporal_summaries(start_id);
CREATE INDEX IF NOT EXISTS idx_temporal_summaries_end ON temporal_summaries(end_id);

CREATE TABLE IF NOT EXISTS present_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    mission TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT '',
    tasks TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS ltm_entries (
    slug TEXT PRIMARY KEY,
    parent_slug TEXT,
    path TEXT NOT NULL,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    links TEXT NOT NULL DEFAULT '[]',
    version INTEGER NOT NULL DEFAULT 1,
    created_by TEXT NOT NULL,
    updated_by TEXT NOT NULL,
    archived_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ltm_entries_parent ON ltm_entries(parent_slug);
CREATE INDEX IF NOT EXISTS idx_ltm_entries_path ON ltm_entries(path);
CREATE INDEX IF NOT EXISTS idx_ltm_entries_archived ON ltm_entries(archived_at);

CREATE TABLE IF NOT EXISTS session_config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS workers (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_workers_status ON workers(status);

CREATE TABLE IF NOT EXISTS background_reports (
    id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    subsystem TEXT NOT NULL,
    report TEXT NOT NULL,
    surfaced_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_background_reports_surfaced ON background_reports(surfaced_at);
CREATE INDEX IF NOT EXISTS idx_background_reports_created ON background_reports(created_at);

CREATE TABLE IF NOT EXISTS background_tasks (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    description TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    completed_at TEXT,
    result TEXT,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_background_tasks_status ON background_tasks(status);

CREATE TABLE IF NOT EXISTS background_task_queue (
    id TEXT PRIMARY KEY,
    task_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    content TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_background_task_queue_created ON background_task_queue(created_at);

CREATE TABLE IF NOT EXISTS alarms (
    id TEXT PRIMARY KEY,
    fires_at TEXT NOT NULL,
    note TEXT NOT NULL,
    fired INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_alarms_fires ON alarms(fires_at);
CREATE INDEX IF NOT EXISTS idx_alarms_fired ON alarms(fired);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

const MIGRATION_V2_UP: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS temporal_messages_fts USING fts5(
    id,
    content,
    content='temporal_messages',
    content_rowid='rowid',
    tokenize='porter ascii'
);

CREATE TRIGGER IF NOT EXISTS temporal_messages_ai AFTER INSERT ON temporal_messages BEGIN
    INSERT INTO temporal_messages_fts(rowid, id, content) VALUES (new.rowid, new.id, new.content);
END;

CREATE TRIGGER IF NOT EXISTS temporal_messages_ad AFTER DELETE ON temporal_messages BEGIN
    INSERT INTO temporal_messages_fts(temporal_messages_fts, rowid, id, content)
    VALUES ('delete', old.rowid, old.id, old.content);
END;

CREATE VIRTUAL TABLE IF NOT EXISTS temporal_summaries_fts USING fts5(
    id,
    narrative,
    key_observations,
    content='temporal_summaries',
    content_rowid='rowid',
    tokenize='porter ascii'
);

CREATE TRIGGER IF NOT EXISTS temporal_summaries_ai AFTER INSERT ON temporal_summaries BEGIN
    INSERT INTO temporal_summaries_fts(rowid, id, narrative, key_observations)
    VALUES (new.rowid, new.id, new.narrative, new.key_observations);
END;

CREATE TRIGGER IF NOT EXISTS temporal_summaries_ad AFTER DELETE ON temporal_summaries BEGIN
    INSERT INTO temporal_summaries_fts(temporal_summaries_fts, rowid, id, narrative, key_observations)
    VALUES ('delete', old.rowid, old.id, old.narrative, old.key_observations);
END;

CREATE VIRTUAL TABLE IF NOT EXISTS ltm_entries_fts USING fts5(
    slug,
    title,
    body,
    content='ltm_entries',
    content_rowid='rowid',
    tokenize='porter ascii'
);

CREATE TRIGGER IF NOT EXISTS ltm_entries_ai AFTER INSERT ON ltm_entries BEGIN
    INSERT INTO ltm_entries_fts(rowid, slug, title, body) VALUES (new.rowid, new.slug, new.title, new.body);
END;

CREATE TRIGGER IF NOT EXISTS ltm_entries_ad AFTER DELETE ON ltm_entries BEGIN
    INSERT INTO ltm_entries_fts(ltm_entries_fts, rowid, slug, title, body)
    VALUES ('delete', old.rowid, old.slug, old.title, old.body);
END;

CREATE TRIGGER IF NOT EXISTS ltm_entries_au AFTER UPDATE ON ltm_entries BEGIN
    INSERT INTO ltm_entries_fts(ltm_entries_fts, rowid, slug, title, body)
    VALUES ('delete', old.rowid, old.slug, old.title, old.body);
    INSERT INTO ltm_entries_fts(rowid, slug, title, body) VALUES (new.rowid, new.slug, new.title, new.body);
END;

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let table_exists: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            [],
            |row| row.get::<_, i64>(0),
        )
        .map(|_| true)
        .unwrap_or(false);

    if !table_exists {
        return Ok(0);
    }

    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
        row.get(0)
    })
}

/// Apply any migrations newer than the database's current schema version.
/// Idempotent: calling this on an already-current database is a no-op.
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn applies_all_migrations_on_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        let applied = apply_migrations(&conn).unwrap();
        assert_eq!(applied, MIGRATIONS.len() as u32);

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, MIGRATIONS.last().unwrap().version);
    }

    #[test]
    fn is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        let applied_again = apply_migrations(&conn).unwrap();
        assert_eq!(applied_again, 0);
    }

    #[test]
    fn creates_expected_tables() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        for table in [
            "temporal_messages",
            "temporal_summaries",
            "present_state",
            "ltm_entries",
            "session_config",
            "workers",
            "background_reports",
            "background_tasks",
            "background_task_queue",
            "alarms",
        ] {
            let exists: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "expected table {table} to exist");
        }
    }
}
