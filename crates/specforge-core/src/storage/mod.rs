//! Row storage on sled.
//!
//! Rows are rkyv-encoded [`Record`]s keyed by table name and numeric id.
//! All writes go through a buffered [`Transaction`].

mod config;
mod engine;
pub mod key;
mod record;
mod transaction;

pub use config::StorageConfig;
pub use engine::StorageEngine;
pub use record::Record;
pub use transaction::{Transaction, TransactionOp};
