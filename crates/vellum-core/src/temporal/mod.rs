//! Temporal Log
//!
//! The append-only message log and the immutable lattice of summaries built
//! over it.

mod log;
mod types;

pub use log::{sanitize_fts5_query, TemporalError, TemporalLog};
pub use types::{
    ContextWindow, FtsHit, MessageKind, MessageRecord, SearchHit, SearchParams, SummaryRecord,
    TagMode,
};
