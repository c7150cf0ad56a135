use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use super::migrations;
use crate::id::IdGen;

/// Storage-layer error type.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("initialization error: {0}")]
    Init(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Connection tuning, applied only to file-backed stores.
#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
        }
    }
}

/// The storage layer: connection lifecycle, schema migrations, and the
/// process-wide identifier generator.
///
/// Holds separate writer and reader connections for file-backed databases, so
/// a long-running writer transaction doesn't starve concurrent reads. An
/// `:memory:` store shares a single connection between both roles, since
/// separate `:memory:` connections are distinct, unconnected databases.
///
/// All methods take `&self` — `Store` is `Send + Sync` via its internal
/// mutexes, the same interior-mutability shape the wider substrate uses for
/// every subsystem built on top of it.
pub struct Store {
    writer: Arc<Mutex<Connection>>,
    reader: Arc<Mutex<Connection>>,
    ids: IdGen,
}

impl Store {
    /// Open a file-backed store at `path`, creating it and applying
    /// migrations if it doesn't already exist.
    pub fn open_file(path: impl AsRef<Path>, cfg: StoreConfig) -> Result<Self> {
        let path = path.as_ref();

        let writer_conn = Connection::open(path)?;
        Self::configure(&writer_conn, false, &cfg)?;
        migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(path)?;
        Self::configure(&reader_conn, false, &cfg)?;

        Ok(Self {
            writer: Arc::new(Mutex::new(writer_conn)),
            reader: Arc::new(Mutex::new(reader_conn)),
            ids: IdGen::new(),
        })
    }

    /// Open an ephemeral, process-local store backed by SQLite's `:memory:`.
    /// WAL mode and busy-timeout tuning are meaningless for an in-memory
    /// database and are not applied.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(&conn, true, &StoreConfig::default())?;
        migrations::apply_migrations(&conn)?;

        let shared = Arc::new(Mutex::new(conn));
        Ok(Self {
            writer: shared.clone(),
            reader: shared,
            ids: IdGen::new(),
        })
    }

    /// Open `path`, or an in-memory store if `path` is exactly `:memory:`.
    pub fn open(path: impl AsRef<Path>, cfg: StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        if path == Path::new(":memory:") {
            Self::open_memory()
        } else {
            Self::open_file(path, cfg)
        }
    }

    fn configure(conn: &Connection, in_memory: bool, cfg: &StoreConfig) -> Result<()> {
        if in_memory {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        } else {
            conn.execute_batch(&format!(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = {};",
                cfg.busy_timeout_ms
            ))?;
        }
        Ok(())
    }

    /// Lock the writer connection. Internal to the crate: every public
    /// operation goes through a subsystem method, never a raw connection.
    pub(crate) fn writer(&self) -> MutexGuard<'_, Connection> {
        self.writer.lock().expect("store writer mutex poisoned")
    }

    /// Lock the reader connection.
    pub(crate) fn reader(&self) -> MutexGuard<'_, Connection> {
        self.reader.lock().expect("store reader mutex poisoned")
    }

    /// The generator backing every identifier minted through this store.
    pub fn ids(&self) -> &IdGen {
        &self.ids
    }
}
