use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::id::{Id, IdError, Prefix};
use crate::store::Store;

use super::types::{Alarm, BackgroundReport, BackgroundTask, TaskResultQueueEntry, WorkerRecord, WorkerStatus};

/// Errors produced by the background registry.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum BackgroundError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("id error: {0}")]
    Id(#[from] IdError),
    #[error("not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, BackgroundError>;

fn worker_from_row(row: &Row<'_>) -> rusqlite::Result<WorkerRecord> {
    let id: String = row.get("id")?;
    let status: String = row.get("status")?;
    Ok(WorkerRecord {
        id: parse_id(id)?,
        kind: row.get("type")?,
        status: WorkerStatus::parse(&status).unwrap_or(WorkerStatus::Failed),
        started_at: row.get("started_at")?,
        completed_at: row.get("completed_at")?,
        error: row.get("error")?,
    })
}

fn report_from_row(row: &Row<'_>) -> rusqlite::Result<BackgroundReport> {
    let id: String = row.get("id")?;
    Ok(BackgroundReport {
        id: parse_id(id)?,
        created_at: row.get("created_at")?,
        subsystem: row.get("subsystem")?,
        report: row.get("report")?,
        surfaced_at: row.get("surfaced_at")?,
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<BackgroundTask> {
    let id: String = row.get("id")?;
    let status: String = row.get("status")?;
    Ok(BackgroundTask {
        id: parse_id(id)?,
        kind: row.get("type")?,
        description: row.get("description")?,
        status: WorkerStatus::parse(&status).unwrap_or(WorkerStatus::Failed),
        created_at: row.get("created_at")?,
        completed_at: row.get("completed_at")?,
        result: row.get("result")?,
        error: row.get("error")?,
    })
}

fn queue_entry_from_row(row: &Row<'_>) -> rusqlite::Result<TaskResultQueueEntry> {
    let id: String = row.get("id")?;
    let task_id: String = row.get("task_id")?;
    Ok(TaskResultQueueEntry {
        id: parse_id(id)?,
        task_id: parse_id(task_id)?,
        created_at: row.get("created_at")?,
        content: row.get("content")?,
    })
}

fn alarm_from_row(row: &Row<'_>) -> rusqlite::Result<Alarm> {
    let id: String = row.get("id")?;
    let fired: i64 = row.get("fired")?;
    Ok(Alarm {
        id: parse_id(id)?,
        fires_at: row.get("fires_at")?,
        note: row.get("note")?,
        fired: fired != 0,
    })
}

fn parse_id(s: String) -> rusqlite::Result<Id> {
    Id::parse(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Worker-lifecycle records, the report queue, background tasks, the
/// task-result queue, and scheduled alarms.
pub struct BackgroundRegistry {
    store: Arc<Store>,
}

impl BackgroundRegistry {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    // -- workers --------------------------------------------------------

    pub fn create_worker(&self, kind: impl Into<String>) -> Result<WorkerRecord> {
        let id = self.store.ids().generate_ascending(Prefix::Worker)?;
        let started_at = Utc::now();
        let kind = kind.into();
        self.store.writer().execute(
            "INSERT INTO workers (id, type, status, started_at, completed_at, error)
             VALUES (?1, ?2, 'running', ?3, NULL, NULL)",
            params![id.as_str(), kind, started_at],
        )?;
        Ok(WorkerRecord {
            id,
            kind,
            status: WorkerStatus::Running,
            started_at,
            completed_at: None,
            error: None,
        })
    }

    pub fn complete_worker(&self, id: &Id) -> Result<()> {
        let affected = self.store.writer().execute(
            "UPDATE workers SET status = 'completed', completed_at = ?2 WHERE id = ?1",
            params![id.as_str(), Utc::now()],
        )?;
        if affected == 0 {
            return Err(BackgroundError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn fail_worker(&self, id: &Id, error: impl Into<String>) -> Result<()> {
        let affected = self.store.writer().execute(
            "UPDATE workers SET status = 'failed', completed_at = ?2, error = ?3 WHERE id = ?1",
            params![id.as_str(), Utc::now(), error.into()],
        )?;
        if affected == 0 {
            return Err(BackgroundError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn get_all_workers(&self) -> Result<Vec<WorkerRecord>> {
        let conn = self.store.reader();
        let mut stmt = conn.prepare(
            "SELECT id, type, status, started_at, completed_at, error FROM workers ORDER BY started_at ASC",
        )?;
        let rows = stmt.query_map([], worker_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(BackgroundError::from)
    }

    pub fn get_running_workers(&self) -> Result<Vec<WorkerRecord>> {
        let conn = self.store.reader();
        let mut stmt = conn.prepare(
            "SELECT id, type, status, started_at, completed_at, error FROM workers
             WHERE status = 'running' ORDER BY started_at ASC",
        )?;
        let rows = stmt.query_map([], worker_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(BackgroundError::from)
    }

    /// Transition every `running` worker row to `killed`, returning them.
    /// Invoked once at process start.
    pub fn recover_killed(&self) -> Result<Vec<WorkerRecord>> {
        let running = self.get_running_workers()?;
        if running.is_empty() {
            return Ok(running);
        }
        self.store
            .writer()
            .execute("UPDATE workers SET status = 'killed' WHERE status = 'running'", [])?;
        Ok(running
            .into_iter()
            .map(|mut w| {
                w.status = WorkerStatus::Killed;
                w
            })
            .collect())
    }

    // -- report queue -----------------------------------------------------

    pub fn file_report(&self, subsystem: impl Into<String>, payload: impl Into<String>) -> Result<BackgroundReport> {
        let id = self.store.ids().generate_ascending(Prefix::Report)?;
        let created_at = Utc::now();
        let subsystem = subsystem.into();
        let report = payload.into();
        self.store.writer().execute(
            "INSERT INTO background_reports (id, created_at, subsystem, report, surfaced_at)
             VALUES (?1, ?2, ?3, ?4, NULL)",
            params![id.as_str(), created_at, subsystem, report],
        )?;
        Ok(BackgroundReport {
            id,
            created_at,
            subsystem,
            report,
            surfaced_at: None,
        })
    }

    pub fn get_unsurfaced(&self) -> Result<Vec<BackgroundReport>> {
        let conn = self.store.reader();
        let mut stmt = conn.prepare(
            "SELECT id, created_at, subsystem, report, surfaced_at FROM background_reports
             WHERE surfaced_at IS NULL ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([], report_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(BackgroundError::from)
    }

    pub fn mark_surfaced(&self, ids: &[Id]) -> Result<()> {
        let conn = self.store.writer();
        let now = Utc::now();
        for id in ids {
            conn.execute(
                "UPDATE background_reports SET surfaced_at = ?2 WHERE id = ?1",
                params![id.as_str(), now],
            )?;
        }
        Ok(())
    }

    // -- background tasks -------------------------------------------------

    pub fn create_task(&self, kind: impl Into<String>, description: impl Into<String>) -> Result<BackgroundTask> {
        let id = self.store.ids().generate_ascending(Prefix::BackgroundTask)?;
        let created_at = Utc::now();
        let kind = kind.into();
        let description = description.into();
        self.store.writer().execute(
            "INSERT INTO background_tasks (id, type, description, status, created_at, completed_at, result, error)
             VALUES (?1, ?2, ?3, 'running', ?4, NULL, NULL, NULL)",
            params![id.as_str(), kind, description, created_at],
        )?;
        Ok(BackgroundTask {
            id,
            kind,
            description,
            status: WorkerStatus::Running,
            created_at,
            completed_at: None,
            result: None,
            error: None,
        })
    }

    pub fn get_task(&self, id: &Id) -> Result<Option<BackgroundTask>> {
        let conn = self.store.reader();
        conn.query_row(
            "SELECT id, type, description, status, created_at, completed_at, result, error
             FROM background_tasks WHERE id = ?1",
            params![id.as_str()],
            task_from_row,
        )
        .optional()
        .map_err(BackgroundError::from)
    }

    pub fn list_tasks(&self, status: Option<WorkerStatus>, limit: Option<usize>) -> Result<Vec<BackgroundTask>> {
        let conn = self.store.reader();
        let limit = limit.unwrap_or(usize::MAX) as i64;
        match status {
            Some(status) => {
                let mut stmt = conn.prepare(
                    "SELECT id, type, description, status, created_at, completed_at, result, error
                     FROM background_tasks WHERE status = ?1 ORDER BY created_at ASC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![status.as_str(), limit], task_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(BackgroundError::from)
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, type, description, status, created_at, completed_at, result, error
                     FROM background_tasks ORDER BY created_at ASC LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![limit], task_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(BackgroundError::from)
            }
        }
    }

    pub fn complete_task(&self, id: &Id, result: impl Into<String>) -> Result<()> {
        let affected = self.store.writer().execute(
            "UPDATE background_tasks SET status = 'completed', completed_at = ?2, result = ?3 WHERE id = ?1",
            params![id.as_str(), Utc::now(), result.into()],
        )?;
        if affected == 0 {
            return Err(BackgroundError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn fail_task(&self, id: &Id, error: impl Into<String>) -> Result<()> {
        let affected = self.store.writer().execute(
            "UPDATE background_tasks SET status = 'failed', completed_at = ?2, error = ?3 WHERE id = ?1",
            params![id.as_str(), Utc::now(), error.into()],
        )?;
        if affected == 0 {
            return Err(BackgroundError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Transition every `running` background task row to `killed`, returning them.
    pub fn recover_killed_tasks(&self) -> Result<Vec<BackgroundTask>> {
        let running = self.list_tasks(Some(WorkerStatus::Running), None)?;
        if running.is_empty() {
            return Ok(running);
        }
        self.store
            .writer()
            .execute("UPDATE background_tasks SET status = 'killed' WHERE status = 'running'", [])?;
        Ok(running
            .into_iter()
            .map(|mut t| {
                t.status = WorkerStatus::Killed;
                t
            })
            .collect())
    }

    // -- task-result queue -------------------------------------------------

    pub fn queue_result(&self, task_id: &Id, content: impl Into<String>) -> Result<()> {
        let id = self.store.ids().generate_ascending(Prefix::Queue)?;
        self.store.writer().execute(
            "INSERT INTO background_task_queue (id, task_id, created_at, content) VALUES (?1, ?2, ?3, ?4)",
            params![id.as_str(), task_id.as_str(), Utc::now(), content.into()],
        )?;
        Ok(())
    }

    /// Drain the FIFO queue in `created_at` order, deleting what it returns.
    pub fn drain_queue(&self) -> Result<Vec<TaskResultQueueEntry>> {
        let conn = self.store.writer();
        let entries: Vec<TaskResultQueueEntry> = {
            let mut stmt = conn.prepare(
                "SELECT id, task_id, created_at, content FROM background_task_queue ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map([], queue_entry_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        conn.execute("DELETE FROM background_task_queue", [])?;
        Ok(entries)
    }

    pub fn has_queued_results(&self) -> Result<bool> {
        let conn = self.store.reader();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM background_task_queue", [], |r| r.get(0))?;
        Ok(count > 0)
    }

    // -- alarms -------------------------------------------------------------

    pub fn create_alarm(&self, fires_at: chrono::DateTime<Utc>, note: impl Into<String>) -> Result<Alarm> {
        let id = self.store.ids().generate_ascending(Prefix::Alarm)?;
        let note = note.into();
        self.store.writer().execute(
            "INSERT INTO alarms (id, fires_at, note, fired) VALUES (?1, ?2, ?3, 0)",
            params![id.as_str(), fires_at, note],
        )?;
        Ok(Alarm {
            id,
            fires_at,
            note,
            fired: false,
        })
    }

    pub fn get_due_alarms(&self) -> Result<Vec<Alarm>> {
        let conn = self.store.reader();
        let mut stmt = conn.prepare(
            "SELECT id, fires_at, note, fired FROM alarms WHERE fired = 0 AND fires_at < ?1 ORDER BY fires_at ASC",
        )?;
        let rows = stmt.query_map(params![Utc::now()], alarm_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(BackgroundError::from)
    }

    pub fn mark_alarm_fired(&self, id: &Id) -> Result<()> {
        let affected = self
            .store
            .writer()
            .execute("UPDATE alarms SET fired = 1 WHERE id = ?1", params![id.as_str()])?;
        if affected == 0 {
            return Err(BackgroundError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn list_alarms(&self, include_fired: bool) -> Result<Vec<Alarm>> {
        let conn = self.store.reader();
        if include_fired {
            let mut stmt = conn.prepare("SELECT id, fires_at, note, fired FROM alarms ORDER BY fires_at ASC")?;
            let rows = stmt.query_map([], alarm_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(BackgroundError::from)
        } else {
            let mut stmt =
                conn.prepare("SELECT id, fires_at, note, fired FROM alarms WHERE fired = 0 ORDER BY fires_at ASC")?;
            let rows = stmt.query_map([], alarm_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(BackgroundError::from)
        }
    }
}
