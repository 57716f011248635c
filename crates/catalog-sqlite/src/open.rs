use crate::schema::{MARKER_TABLE, SCHEMA_V1};
use anyhow::{Context, Result};
use rusqlite::{Connection, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One connection to the catalog. Not shared between workers.
pub struct Db {
    pub conn: Connection,
}

/// Where the catalog lives and how to connect. Each worker calls [`DbOptions::open`]
/// to get a connection of its own.
#[derive(Debug, Clone)]
pub struct DbOptions {
    pub path: PathBuf,
    /// How long a writer waits for another connection's write lock.
    pub busy_timeout: Duration,
}

impl DbOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbOptions { path: path.into(), busy_timeout: Duration::from_secs(30) }
    }

    pub fn open(&self) -> Result<Db> {
        let mut conn = Connection::open(&self.path)
            .with_context(|| format!("opening catalog {}", self.path.display()))?;
        conn.busy_timeout(self.busy_timeout)?;
        apply_pragmas(&conn).with_context(|| format!("configuring catalog {}", self.path.display()))?;
        ensure_schema(&mut conn)?;
        Ok(Db { conn })
    }
}

impl Db {
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        DbOptions::new(path.as_ref()).open()
    }
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

/// Create the full schema in one transaction unless the marker table exists.
/// The check runs under the write lock, so concurrent openers cannot both create.
pub(crate) fn ensure_schema(conn: &mut Connection) -> Result<bool> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let exists: i64 = tx.query_row(
        "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name=?",
        [MARKER_TABLE],
        |r| r.get(0),
    )?;
    if exists > 0 {
        tracing::debug!("found catalog tables");
        return Ok(false);
    }
    tracing::info!("catalog tables missing, creating schema");
    tx.execute_batch(SCHEMA_V1).context("creating catalog schema")?;
    tx.commit()?;
    tracing::info!("catalog schema created");
    Ok(true)
}
