//! Buffered all-or-nothing transactions.

use std::collections::HashMap;

use parking_lot::MutexGuard;
use sled::transaction::{ConflictableTransactionError, TransactionError};

use super::key::{current_timestamp, row_key};
use super::{Record, StorageEngine};
use crate::error::Error;

/// A pending operation in a transaction.
#[derive(Debug, Clone)]
pub enum TransactionOp {
    /// Write a row.
    Put {
        /// Table name.
        table: String,
        /// Row to write.
        record: Record,
    },
    /// Remove a row.
    Remove {
        /// Table name.
        table: String,
        /// Row id.
        id: u64,
    },
}

/// A write transaction.
///
/// Operations are buffered and applied atomically on [`commit`](Self::commit).
/// Reads inside the transaction see its own pending writes. Dropping the
/// transaction without committing discards everything.
///
/// The engine's writer lock is held for the transaction's lifetime, so a
/// second transaction cannot start until this one is committed or dropped.
pub struct Transaction<'a> {
    engine: &'a StorageEngine,
    _writer: MutexGuard<'a, ()>,
    ops: Vec<TransactionOp>,
    /// Uncommitted row state by key. `None` marks a removed row.
    write_cache: HashMap<Vec<u8>, Option<Record>>,
}

impl<'a> Transaction<'a> {
    fn new(engine: &'a StorageEngine, writer: MutexGuard<'a, ()>) -> Self {
        Self {
            engine,
            _writer: writer,
            ops: Vec::new(),
            write_cache: HashMap::new(),
        }
    }

    /// Find a live row, preferring this transaction's pending writes.
    pub fn find(&self, table: &str, id: u64) -> Result<Option<Record>, Error> {
        if let Some(cached) = self.write_cache.get(&row_key(table, id)) {
            return Ok(cached.clone().filter(|record| !record.is_deleted()));
        }
        self.engine.get(table, id)
    }

    /// Queue a new row.
    pub fn insert(&mut self, table: &str, record: Record) -> &mut Self {
        self.put(table, record)
    }

    /// Queue an overwrite of an existing row, refreshing `updated_at`.
    pub fn update(&mut self, table: &str, mut record: Record) -> &mut Self {
        record.updated_at = current_timestamp();
        self.put(table, record)
    }

    /// Queue removal of a row.
    pub fn delete(&mut self, table: &str, id: u64) -> &mut Self {
        self.write_cache.insert(row_key(table, id), None);
        self.ops.push(TransactionOp::Remove {
            table: table.to_string(),
            id,
        });
        self
    }

    /// Queue a tombstone for a row.
    pub fn soft_delete(&mut self, table: &str, mut record: Record) -> &mut Self {
        let now = current_timestamp();
        record.deleted_at = Some(now);
        record.updated_at = now;
        self.put(table, record)
    }

    fn put(&mut self, table: &str, record: Record) -> &mut Self {
        self.write_cache
            .insert(row_key(table, record.id), Some(record.clone()));
        self.ops.push(TransactionOp::Put {
            table: table.to_string(),
            record,
        });
        self
    }

    /// Get the pending operations.
    pub fn operations(&self) -> &[TransactionOp] {
        &self.ops
    }

    /// Get the number of pending operations.
    pub fn operation_count(&self) -> usize {
        self.ops.len()
    }

    /// Commit the transaction atomically.
    ///
    /// All operations succeed or none do. Returns the number of operations
    /// applied.
    pub fn commit(self) -> Result<usize, Error> {
        if self.ops.is_empty() {
            return Ok(0);
        }

        let encoded = self
            .ops
            .iter()
            .map(|op| match op {
                TransactionOp::Put { table, record } => {
                    Ok((row_key(table, record.id), Some(record.to_bytes()?)))
                }
                TransactionOp::Remove { table, id } => Ok((row_key(table, *id), None)),
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let result: Result<(), TransactionError<Error>> =
            self.engine.rows_tree().transaction(|tx| {
                for (key, value) in &encoded {
                    match value {
                        Some(bytes) => {
                            tx.insert(key.as_slice(), bytes.as_slice())?;
                        }
                        None => {
                            tx.remove(key.as_slice())?;
                        }
                    }
                }
                Ok::<(), ConflictableTransactionError<Error>>(())
            });

        match result {
            Ok(()) => Ok(encoded.len()),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(Error::Storage(e)),
        }
    }

    /// Rollback the transaction (discard all pending operations).
    pub fn rollback(self) {
        drop(self);
    }
}

impl StorageEngine {
    /// Begin a write transaction, waiting for any open one to finish.
    pub fn transaction(&self) -> Transaction<'_> {
        Transaction::new(self, self.lock_writer())
    }

    /// Begin a write transaction unless one is already open.
    pub fn try_transaction(&self) -> Result<Transaction<'_>, Error> {
        match self.try_lock_writer() {
            Some(guard) => Ok(Transaction::new(self, guard)),
            None => Err(Error::Transaction(
                "another write transaction is open".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageConfig;
    use specforge_proto::{FieldValue, Value};

    fn test_engine() -> StorageEngine {
        StorageEngine::open(StorageConfig::temporary()).unwrap()
    }

    fn row(id: u64, title: &str) -> Record {
        Record::new(id, vec![FieldValue::new("title", title)])
    }

    #[test]
    fn test_transaction_commit() {
        let engine = test_engine();

        let mut tx = engine.transaction();
        tx.insert("article", row(1, "a"));
        tx.insert("article", row(2, "b"));
        assert_eq!(tx.commit().unwrap(), 2);

        assert!(engine.get("article", 1).unwrap().is_some());
        assert!(engine.get("article", 2).unwrap().is_some());
    }

    #[test]
    fn test_transaction_rollback() {
        let engine = test_engine();

        let mut tx = engine.transaction();
        tx.insert("article", row(1, "a"));
        tx.rollback();

        assert!(engine.get("article", 1).unwrap().is_none());
    }

    #[test]
    fn test_dropped_transaction_discards_writes() {
        let engine = test_engine();

        {
            let mut tx = engine.transaction();
            tx.insert("article", row(1, "a"));
        }

        assert!(engine.get("article", 1).unwrap().is_none());
        engine.transaction().commit().unwrap();
    }

    #[test]
    fn test_find_sees_uncommitted_writes() {
        let engine = test_engine();

        let mut tx = engine.transaction();
        tx.insert("article", row(1, "draft"));
        let found = tx.find("article", 1).unwrap().unwrap();
        assert_eq!(found.get("title"), Some(&Value::String("draft".into())));

        tx.delete("article", 1);
        assert!(tx.find("article", 1).unwrap().is_none());
    }

    #[test]
    fn test_update_and_delete() {
        let engine = test_engine();

        let mut tx = engine.transaction();
        tx.insert("article", row(1, "a"));
        tx.insert("article", row(2, "b"));
        tx.commit().unwrap();

        let mut tx = engine.transaction();
        let mut first = tx.find("article", 1).unwrap().unwrap();
        first.fields = vec![FieldValue::new("title", "changed")];
        tx.update("article", first);
        tx.delete("article", 2);
        tx.commit().unwrap();

        let first = engine.get("article", 1).unwrap().unwrap();
        assert_eq!(first.get("title"), Some(&Value::String("changed".into())));
        assert!(first.updated_at >= first.created_at);
        assert!(engine.get_raw("article", 2).unwrap().is_none());
    }

    #[test]
    fn test_soft_delete_hides_row() {
        let engine = test_engine();

        let mut tx = engine.transaction();
        tx.insert("article", row(1, "a"));
        tx.commit().unwrap();

        let mut tx = engine.transaction();
        let record = tx.find("article", 1).unwrap().unwrap();
        tx.soft_delete("article", record);
        assert!(tx.find("article", 1).unwrap().is_none());
        tx.commit().unwrap();

        assert!(engine.get("article", 1).unwrap().is_none());
        let tombstone = engine.get_raw("article", 1).unwrap().unwrap();
        assert!(tombstone.is_deleted());
        assert_eq!(engine.count("article").unwrap(), 0);
    }

    #[test]
    fn test_single_writer() {
        let engine = test_engine();

        let tx = engine.transaction();
        assert!(matches!(
            engine.try_transaction(),
            Err(Error::Transaction(_))
        ));
        tx.rollback();

        assert!(engine.try_transaction().is_ok());
    }

    #[test]
    fn test_empty_transaction() {
        let engine = test_engine();
        assert_eq!(engine.transaction().commit().unwrap(), 0);
    }
}
