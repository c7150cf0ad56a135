//! Background Registry
//!
//! Worker-lifecycle records, the unsurfaced-report queue, background tasks,
//! the task-result queue, and scheduled alarms.

mod registry;
mod types;

pub use registry::{BackgroundError, BackgroundRegistry};
pub use types::{Alarm, BackgroundReport, BackgroundTask, TaskResultQueueEntry, WorkerRecord, WorkerStatus};
