//! Storage Layer
//!
//! Connection lifecycle and schema migrations for the SQLite-backed
//! persistence used by every other subsystem.

mod connection;
pub mod migrations;

pub use connection::{Store, StoreConfig, StoreError};
