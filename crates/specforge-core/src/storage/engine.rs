//! Storage engine implementation.

use parking_lot::{Mutex, MutexGuard};
use sled::{Db, Tree};

use super::key::{row_key, table_prefix};
use super::{Record, StorageConfig};
use crate::error::Error;

/// Tree name for row data.
const ROWS_TREE: &str = "rows";

/// The main storage engine wrapping sled.
///
/// Rows of every table live in one tree, keyed by table name and id. Writes
/// go through [`Transaction`](super::Transaction), and only one transaction
/// may be open at a time.
pub struct StorageEngine {
    /// The underlying sled database.
    db: Db,

    /// Tree for row data.
    rows: Tree,

    /// Held by the open write transaction.
    writer: Mutex<()>,
}

impl StorageEngine {
    /// Open or create a storage engine with the given configuration.
    pub fn open(config: StorageConfig) -> Result<Self, Error> {
        let db = config.to_sled_config().open()?;
        let rows = db.open_tree(ROWS_TREE)?;

        Ok(Self {
            db,
            rows,
            writer: Mutex::new(()),
        })
    }

    /// Check if the database was recovered from a previous crash.
    pub fn was_recovered(&self) -> bool {
        self.db.was_recovered()
    }

    /// The underlying database, for stores that keep their own trees.
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Get a live row. Tombstones read as absent.
    pub fn get(&self, table: &str, id: u64) -> Result<Option<Record>, Error> {
        Ok(self.get_raw(table, id)?.filter(|record| !record.is_deleted()))
    }

    /// Get a row including tombstones.
    pub fn get_raw(&self, table: &str, id: u64) -> Result<Option<Record>, Error> {
        match self.rows.get(row_key(table, id))? {
            Some(bytes) => Ok(Some(Record::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Scan the live rows of a table in id order.
    pub fn scan(&self, table: &str) -> impl Iterator<Item = Result<Record, Error>> + '_ {
        self.rows
            .scan_prefix(table_prefix(table))
            .values()
            .filter_map(|result| match result {
                Ok(bytes) => match Record::from_bytes(&bytes) {
                    Ok(record) if record.is_deleted() => None,
                    other => Some(other),
                },
                Err(e) => Some(Err(Error::Storage(e))),
            })
    }

    /// Count the live rows of a table.
    pub fn count(&self, table: &str) -> Result<usize, Error> {
        let mut count = 0;
        for record in self.scan(table) {
            record?;
            count += 1;
        }
        Ok(count)
    }

    /// Issue a fresh row identity.
    ///
    /// Identities are unique across tables and never reused, even when the
    /// transaction that drew one rolls back.
    pub fn next_id(&self) -> Result<u64, Error> {
        Ok(self.db.generate_id()? + 1)
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }

    pub(crate) fn rows_tree(&self) -> &Tree {
        &self.rows
    }

    pub(crate) fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock()
    }

    pub(crate) fn try_lock_writer(&self) -> Option<MutexGuard<'_, ()>> {
        self.writer.try_lock()
    }
}
