use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::Id;

/// Lifecycle of a [`WorkerRecord`] or background task.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Killed,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Pending => "pending",
            WorkerStatus::Running => "running",
            WorkerStatus::Completed => "completed",
            WorkerStatus::Failed => "failed",
            WorkerStatus::Killed => "killed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(WorkerStatus::Pending),
            "running" => Some(WorkerStatus::Running),
            "completed" => Some(WorkerStatus::Completed),
            "failed" => Some(WorkerStatus::Failed),
            "killed" => Some(WorkerStatus::Killed),
            _ => None,
        }
    }
}

/// A background worker's lifecycle record.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRecord {
    pub id: Id,
    pub kind: String,
    pub status: WorkerStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// A report filed by a background subsystem for the agent loop to surface.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundReport {
    pub id: Id,
    pub created_at: DateTime<Utc>,
    pub subsystem: String,
    pub report: String,
    pub surfaced_at: Option<DateTime<Utc>>,
}

/// A unit of deferred work tracked independently of [`WorkerRecord`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundTask {
    pub id: Id,
    pub kind: String,
    pub description: String,
    pub status: WorkerStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub error: Option<String>,
}

/// One entry in the FIFO task-result queue.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResultQueueEntry {
    pub id: Id,
    pub task_id: Id,
    pub created_at: DateTime<Utc>,
    pub content: String,
}

/// A scheduled, one-shot wake-up for the agent loop.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    pub id: Id,
    pub fires_at: DateTime<Utc>,
    pub note: String,
    pub fired: bool,
}
