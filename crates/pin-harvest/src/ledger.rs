//! Persistent dedup ledger backed by SQLite.
//!
//! One row per asset URL, ever. Rows are written with insert-or-ignore, so
//! the first run to see a URL owns it and later inserts are silent no-ops.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::types::{AssetRecord, HarvestResult};

/// Append-only URL ledger shared across harvest runs.
pub struct DedupLedger {
    db: Connection,
}

impl DedupLedger {
    /// Open or create a ledger database at `path`.
    pub fn open(path: &Path) -> HarvestResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Connection::open(path)?;
        Self::init(db)
    }

    /// Open a ledger that lives only as long as this value.
    pub fn open_in_memory() -> HarvestResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> HarvestResult<Self> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS assets (
                url TEXT PRIMARY KEY,
                resolution_descriptor TEXT,
                origin_run_directory TEXT NOT NULL
            );",
        )?;
        Ok(Self { db })
    }

    /// Point lookup by URL.
    pub fn exists(&self, url: &str) -> HarvestResult<Option<AssetRecord>> {
        let record = self
            .db
            .query_row(
                "SELECT url, resolution_descriptor, origin_run_directory
                 FROM assets WHERE url = ?1",
                params![url],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Record `url` as first seen by `run_directory`.
    ///
    /// Returns `false` when the URL was already present; the existing row is
    /// left untouched.
    pub fn insert(
        &self,
        url: &str,
        run_directory: &str,
        resolution_descriptor: Option<&str>,
    ) -> HarvestResult<bool> {
        let rows = self.db.execute(
            "INSERT OR IGNORE INTO assets (url, resolution_descriptor, origin_run_directory)
             VALUES (?1, ?2, ?3)",
            params![url, resolution_descriptor, run_directory],
        )?;
        Ok(rows > 0)
    }

    /// Total number of recorded URLs.
    pub fn count(&self) -> HarvestResult<usize> {
        let n: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM assets", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// All rows first recorded by the given run directory, ordered by URL.
    pub fn records_for_run(&self, run_directory: &str) -> HarvestResult<Vec<AssetRecord>> {
        let mut stmt = self.db.prepare(
            "SELECT url, resolution_descriptor, origin_run_directory
             FROM assets WHERE origin_run_directory = ?1 ORDER BY url",
        )?;
        let records = stmt
            .query_map(params![run_directory], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Close the connection, surfacing any error from SQLite.
    pub fn close(self) -> HarvestResult<()> {
        self.db.close().map_err(|(_, e)| e)?;
        Ok(())
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AssetRecord> {
    Ok(AssetRecord {
        url: row.get(0)?,
        resolution_descriptor: row.get(1)?,
        origin_run_directory: row.get(2)?,
    })
}
